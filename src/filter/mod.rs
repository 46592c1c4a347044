use crate::engine::StockView;
use crate::error::{EngineResult, SnowballError};
use crate::metrics::resolve;
use crate::models::FilterOption;

/// Compiled filter clause.
pub type Predicate = Box<dyn Fn(&StockView<'_>) -> bool + Send + Sync>;

/// Options a user may pick from when composing a filter: `(key, title, is_boolean)`.
pub const AVAILABLE_FILTER_OPTIONS: &[(&str, &str, bool)] = &[
    ("expected_rate", "Expected rate", false),
    ("expected_rate_by_current_pbr", "Expected rate by current PBR", false),
    ("expected_rate_by_low_pbr", "Expected rate by low PBR", false),
    ("expected_rate_by_mid_pbr", "Expected rate by mid PBR", false),
    ("future_roe", "Future ROE", false),
    ("pbr", "PBR", false),
    ("per", "PER", false),
    ("low_pbr", "Low PBR", false),
    ("dividend_rate", "Dividend rate", false),
    ("intrinsic_discount_rate", "Intrinsic value discount", false),
    ("peg_current_per", "PEG (current PER)", false),
    ("peg_mean_per", "PEG (mean PER)", false),
    ("roe_max_diff", "ROE max difference", false),
    ("last_four_years_roe_max_diff", "ROE max difference (4 years)", false),
    ("latest_fscore", "F-Score", false),
    ("last_year_gpa", "GPA", false),
    ("mean_roic", "Mean ROIC", false),
    ("ncav_ratio", "NCAV ratio", false),
    ("last_year_current_ratio", "Current ratio", false),
    ("pfr", "PFR", false),
    ("beta", "Beta", false),
    ("agg_value", "Market cap", false),
    ("foreigner_weight", "Foreigner weight", false),
    ("floating_rate", "Floating rate", false),
    ("month1", "1M momentum", false),
    ("month3", "3M momentum", false),
    ("month6", "6M momentum", false),
    ("month12", "12M momentum", false),
    ("latest_quarter_roe", "Latest quarter ROE", false),
    ("is_five_years_record_low", "5-year record low PBR", true),
    ("has_consensus", "Has consensus", true),
    ("is_positive_consensus_roe", "Consensus ROE above future ROE", true),
    ("calculable", "Calculable", true),
    ("has_note", "Has note", true),
    ("starred", "Starred", true),
    ("owned", "Owned", true),
    ("doubtful", "Doubtful", true),
];

/// Build a concrete option from the catalog entry named `key`.
pub fn catalog_option(key: &str, more_than: bool, value: Option<f64>) -> EngineResult<FilterOption> {
    let (key, title, is_boolean) = AVAILABLE_FILTER_OPTIONS
        .iter()
        .find(|(k, _, _)| *k == key)
        .ok_or_else(|| SnowballError::UnknownFilterKey(key.to_string()))?;
    Ok(FilterOption {
        key: key.to_string(),
        title: title.to_string(),
        more_than,
        value: if *is_boolean { None } else { value },
        is_boolean: *is_boolean,
    })
}

/// Compile one filter option into a predicate.
///
/// Boolean options test truthiness. Numeric options test `>= value` when
/// `more_than`, else `<= value`; a missing threshold reads as 0 and a
/// non-numeric metric never matches.
pub fn build_predicate(option: &FilterOption) -> Predicate {
    let key = option.key.clone();
    if option.is_boolean {
        return Box::new(move |view: &StockView<'_>| resolve(view, &key).is_truthy());
    }
    let threshold = option.value.unwrap_or(0.0);
    let more_than = option.more_than;
    Box::new(move |view: &StockView<'_>| match resolve(view, &key).as_f64() {
        Some(v) if more_than => v >= threshold,
        Some(v) => v <= threshold,
        None => false,
    })
}

/// Base expected-rate sign filter: `filter_bad` keeps positive rates,
/// otherwise only negative ones.
pub fn expected_rate_sign(filter_bad: bool) -> Predicate {
    Box::new(move |view: &StockView<'_>| {
        let rate = view.expected_rate();
        if filter_bad { rate > 0.0 } else { rate < 0.0 }
    })
}

/// AND of every predicate; an empty set keeps everything.
pub fn matches_all(predicates: &[Predicate], view: &StockView<'_>) -> bool {
    predicates.iter().all(|p| p(view))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{Calendar, Engine};
    use crate::metrics::is_known;
    use crate::models::StockRecord;

    fn engine() -> Engine {
        Engine::with_calendar(Calendar::from_last_year(2023))
    }

    fn stock(pbr: f64, price: f64) -> StockRecord {
        let mut s = StockRecord::new("0001");
        s.bps = 1000.0;
        s.pbr = pbr;
        s.current_price = price;
        s.roes = vec![Some(11.0), Some(8.0), Some(15.0), Some(10.0)];
        s.last_year_index = Some(2);
        s.dividend_rate = 4.5;
        s
    }

    #[test]
    fn test_catalog_keys_are_registered_metrics() {
        for (key, _, _) in AVAILABLE_FILTER_OPTIONS {
            assert!(is_known(key), "{key} is not a registered metric");
        }
    }

    #[test]
    fn test_catalog_option_lookup() {
        let o = catalog_option("pbr", false, Some(1.0)).unwrap();
        assert_eq!(o.title, "PBR");
        assert!(!o.is_boolean);

        let b = catalog_option("starred", true, Some(3.0)).unwrap();
        assert!(b.is_boolean);
        assert_eq!(b.value, None);

        assert_eq!(
            catalog_option("nope", true, None),
            Err(SnowballError::UnknownFilterKey("nope".into()))
        );
    }

    #[test]
    fn test_numeric_predicate_bounds_are_inclusive() {
        let e = engine();
        let s = stock(0.8, 1200.0);
        let v = e.view(&s).unwrap();

        let at_most = build_predicate(&catalog_option("pbr", false, Some(0.8)).unwrap());
        let at_least = build_predicate(&catalog_option("pbr", true, Some(0.8)).unwrap());
        let above = build_predicate(&catalog_option("pbr", true, Some(0.9)).unwrap());
        assert!(at_most(&v));
        assert!(at_least(&v));
        assert!(!above(&v));
    }

    #[test]
    fn test_boolean_predicate_uses_truthiness() {
        let e = engine();
        let mut s = stock(0.8, 1200.0);
        let starred = build_predicate(&catalog_option("starred", true, None).unwrap());
        assert!(!starred(&e.view(&s).unwrap()));
        s.starred = true;
        assert!(starred(&e.view(&s).unwrap()));
    }

    #[test]
    fn test_null_metric_never_matches_numeric_option() {
        let e = engine();
        let s = stock(0.8, 1200.0);
        let gpa = build_predicate(&catalog_option("last_year_gpa", false, Some(10.0)).unwrap());
        assert!(!gpa(&e.view(&s).unwrap()));
    }

    #[test]
    fn test_expected_rate_sign() {
        let e = engine();
        let good = stock(0.8, 1200.0);
        let mut bad = stock(0.8, 1200.0);
        bad.current_price = 5000.0;

        let keep_good = expected_rate_sign(true);
        let keep_bad = expected_rate_sign(false);
        assert!(keep_good(&e.view(&good).unwrap()));
        assert!(!keep_good(&e.view(&bad).unwrap()));
        assert!(keep_bad(&e.view(&bad).unwrap()));
    }

    #[test]
    fn test_matches_all_is_conjunction() {
        let e = engine();
        let s = stock(0.8, 1200.0);
        let v = e.view(&s).unwrap();
        let preds = vec![
            build_predicate(&catalog_option("pbr", false, Some(1.0)).unwrap()),
            build_predicate(&catalog_option("expected_rate", true, Some(15.0)).unwrap()),
        ];
        assert!(!matches_all(&preds, &v));
        assert!(matches_all(&preds[..1], &v));
        assert!(matches_all(&[], &v));
    }
}
