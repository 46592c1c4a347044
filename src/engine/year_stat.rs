use super::Calendar;
use crate::error::{EngineResult, SnowballError};
use crate::models::{SeriesField, StockRecord, YearValue};

/// Pair returned for a missing or empty series: "no data", not an error.
pub const NO_DATA: YearValue = YearValue(0, Some(0.0));

/// Assign calendar years to a positional series.
///
/// When the series is shorter than the anchor implies it was truncated from
/// the front, so its last element is pinned to `last_year`. Otherwise years
/// count positionally from `last_year_index`. The two rules agree when
/// `len == last_year_index + 1`.
pub fn align_years(values: &[Option<f64>], last_year_index: usize, last_year: i32) -> Vec<YearValue> {
    let n = values.len() as i32;
    let anchor = last_year_index as i32;
    let year = |i: i32| {
        if n < anchor + 1 {
            last_year - n + i + 1
        } else {
            last_year - (anchor - i)
        }
    };
    values
        .iter()
        .enumerate()
        .map(|(i, v)| YearValue(year(i as i32), *v))
        .collect()
}

/// Year-aligned view of one positional series of `stock`.
///
/// `exclude_future` drops consensus years after `calendar.last_year`.
pub fn year_stat(
    stock: &StockRecord,
    field: SeriesField,
    calendar: &Calendar,
    exclude_future: bool,
) -> EngineResult<Vec<YearValue>> {
    let values = stock.series(field);
    if values.is_empty() {
        return Ok(vec![NO_DATA]);
    }
    let last_year_index = stock.last_year_index.ok_or_else(|| SnowballError::MissingAnchor {
        code: stock.code.clone(),
        field: field.to_string(),
    })?;
    Ok(select(align_years(values, last_year_index, calendar.last_year), calendar, exclude_future))
}

pub(crate) fn select(stats: Vec<YearValue>, calendar: &Calendar, exclude_future: bool) -> Vec<YearValue> {
    if !exclude_future {
        return stats;
    }
    stats.into_iter().filter(|s| s.year() <= calendar.last_year).collect()
}
