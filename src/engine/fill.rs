use super::StockView;
use crate::models::StockPatch;

/// Memoized fields written back by the fill pass.
pub const FILLED_FIELDS: [&str; 15] = [
    "mean_roe",
    "future_roe",
    "future_bps",
    "expected_rate",
    "invest_price",
    "expected_rate_by_current_pbr",
    "expected_rate_by_mid_pbr",
    "expected_rate_by_low_pbr",
    "intrinsic_value",
    "intrinsic_discount_rate",
    "peg_current_per",
    "peg_mean_per",
    "fscore_total_issued_stock",
    "fscore_profitable",
    "fscore_cfo",
];

/// Build the memoized-field patch for one stock.
///
/// Returns `None` for a stock without any ROE history; there is nothing
/// meaningful to memoize for it.
pub fn fill_patch(view: &StockView<'_>) -> Option<StockPatch> {
    let stock = view.stock();
    if stock.roes.is_empty() {
        return None;
    }

    let years = view.engine_params().future_years;
    let fscore = view.fscore(view.calendar().last_year);

    let patch = StockPatch::new(stock.code.clone())
        .set("mean_roe", view.mean_roe())
        .set("future_roe", view.future_roe())
        .set("future_bps", view.calc_future_bps(years))
        .set("expected_rate", view.expected_rate())
        .set("invest_price", view.invest_price())
        .set("expected_rate_by_current_pbr", view.expected_rate_by_current_pbr())
        .set("expected_rate_by_mid_pbr", view.expected_rate_by_mid_pbr())
        .set("expected_rate_by_low_pbr", view.expected_rate_by_low_pbr())
        .set("intrinsic_value", view.intrinsic_value())
        .set("intrinsic_discount_rate", view.intrinsic_discount_rate())
        .set("peg_current_per", view.peg_current_per())
        .set("peg_mean_per", view.peg_mean_per())
        .set("fscore_total_issued_stock", fscore.total_issued_stock)
        .set("fscore_profitable", fscore.profitable)
        .set("fscore_cfo", fscore.cfo);
    Some(patch)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{Calendar, Engine};
    use crate::models::StockRecord;
    use serde_json::{Value, json};

    fn stock() -> StockRecord {
        let mut s = StockRecord::new("0001");
        s.bps = 1000.0;
        s.current_price = 1200.0;
        s.roes = vec![Some(11.0), Some(8.0), Some(15.0), Some(10.0)];
        s.last_year_index = Some(2);
        s.dividend_rate = 4.5;
        s
    }

    #[test]
    fn test_fill_without_roes_is_skipped() {
        let engine = Engine::with_calendar(Calendar::from_last_year(2023));
        let s = StockRecord::new("0001");
        assert!(fill_patch(&engine.view(&s).unwrap()).is_none());
    }

    #[test]
    fn test_fill_writes_every_memoized_field() {
        let engine = Engine::with_calendar(Calendar::from_last_year(2023));
        let s = stock();
        let patch = fill_patch(&engine.view(&s).unwrap()).unwrap();

        assert_eq!(patch.code(), "0001");
        assert_eq!(patch.field_count(), FILLED_FIELDS.len());
        for key in FILLED_FIELDS {
            assert!(patch.get(key).is_some(), "missing {key}");
        }
        assert_eq!(patch.get("future_bps"), Some(&json!(2748)));
        assert_eq!(patch.get("invest_price"), Some(&json!(679)));
    }

    #[test]
    fn test_fill_is_idempotent() {
        let engine = Engine::with_calendar(Calendar::from_last_year(2023));
        let s = stock();
        let first = fill_patch(&engine.view(&s).unwrap()).unwrap();

        // Memoized output stored on the document must not feed back in.
        let mut doc = serde_json::to_value(&s).unwrap();
        if let Value::Object(map) = &mut doc {
            first.merge_into(map);
        }
        let refilled = StockRecord::from_value(doc).unwrap();
        let second = fill_patch(&engine.view(&refilled).unwrap()).unwrap();

        assert_eq!(first, second);
    }
}
