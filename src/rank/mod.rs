use crate::engine::StockView;
use crate::error::{EngineResult, SnowballError};
use crate::metrics::resolve;
use crate::models::{RankOption, StockPatch};
use tracing::debug;

/// One cross-sectional rank computed by the batch job.
#[derive(Debug, Clone, Copy)]
pub struct RankSpec {
    pub metric: &'static str,
    pub field: &'static str,
    /// Rank 1 goes to the largest value.
    pub descending: bool,
    pub title: &'static str,
}

const fn spec(metric: &'static str, field: &'static str, descending: bool, title: &'static str) -> RankSpec {
    RankSpec { metric, field, descending, title }
}

pub const RANK_BATTERY: &[RankSpec] = &[
    spec("last_year_gpa", "rank_last_year_gpa", true, "GPA rank"),
    spec("agg_value", "agg_rank", false, "Market cap rank"),
    spec("pbr", "rank_pbr", false, "PBR rank"),
    spec("per", "rank_per", false, "PER rank"),
    spec("dividend_rate", "rank_dividend", true, "Dividend rank"),
    spec("beta", "rank_beta", false, "Beta rank"),
    spec("floating_rate", "rank_floating_rate", true, "Floating rate rank"),
    spec("foreigner_weight", "rank_foreigner_weight", true, "Foreigner weight rank"),
    spec("month1", "rank_month1", true, "1M momentum rank"),
    spec("month3", "rank_month3", true, "3M momentum rank"),
    spec("month6", "rank_month6", true, "6M momentum rank"),
    spec("month12", "rank_month12", true, "12M momentum rank"),
    spec("relative_earning_rate", "rank_relative_earning_rate", true, "Relative earning rank"),
    spec("ncav_ratio", "rank_ncav", true, "NCAV rank"),
    spec("mean_roic", "rank_roic", true, "ROIC rank"),
    spec("last_year_current_ratio", "rank_current_ratio", true, "Current ratio rank"),
    spec("last_year_pcr", "rank_pcr", false, "PCR rank"),
    spec("last_year_psr", "rank_psr", false, "PSR rank"),
    spec("pfr", "rank_pfr", false, "PFR rank"),
];

/// Rank options a user may add to a filter. Every rank field sorts with
/// rank 1 first, so the option's direction mirrors the metric's.
pub fn rank_catalog() -> Vec<RankOption> {
    RANK_BATTERY
        .iter()
        .map(|s| RankOption {
            key: s.field.to_string(),
            title: s.title.to_string(),
            ascending: !s.descending,
        })
        .collect()
}

pub fn catalog_rank_option(key: &str) -> EngineResult<RankOption> {
    rank_catalog()
        .into_iter()
        .find(|o| o.key == key)
        .ok_or_else(|| SnowballError::UnknownRankKey(key.to_string()))
}

/// Rank every stock on `metric`, in input order.
///
/// Stocks whose value is truthy and positive get `1..=K` by sorted
/// position; ties keep input order. Every other stock gets the total
/// stock count, worse than any ranked one.
pub fn rank_by(views: &[StockView<'_>], metric: &str, descending: bool) -> Vec<usize> {
    let total = views.len();
    let mut countable: Vec<(usize, f64)> = views
        .iter()
        .enumerate()
        .filter_map(|(i, view)| {
            let value = resolve(view, metric);
            match value.as_f64() {
                Some(v) if value.is_truthy() && v > 0.0 => Some((i, v)),
                _ => None,
            }
        })
        .collect();

    if descending {
        countable.sort_by(|a, b| b.1.total_cmp(&a.1));
    } else {
        countable.sort_by(|a, b| a.1.total_cmp(&b.1));
    }

    let mut ranks = vec![total; total];
    for (rank, (i, _)) in countable.iter().enumerate() {
        ranks[*i] = rank + 1;
    }
    ranks
}

/// Write `rank_field` into each stock's patch. `patches` is index-aligned with `views`.
pub fn update_rank_by(
    views: &[StockView<'_>],
    patches: &mut [StockPatch],
    metric: &str,
    rank_field: &str,
    descending: bool,
) {
    for (patch, rank) in patches.iter_mut().zip(rank_by(views, metric, descending)) {
        patch.insert(rank_field, rank);
    }
}

/// Run the whole rank battery. Returns one patch per stock.
pub fn update_ranks(views: &[StockView<'_>]) -> Vec<StockPatch> {
    let mut patches: Vec<StockPatch> = views.iter().map(|v| StockPatch::new(v.code())).collect();
    for spec in RANK_BATTERY {
        update_rank_by(views, &mut patches, spec.metric, spec.field, spec.descending);
        debug!("Ranked {} stocks by {}", views.len(), spec.metric);
    }
    patches
}

/// Sum of the selected rank fields. A missing or non-numeric rank counts
/// as `unranked`, which callers set at or past the worst stored rank.
pub fn total_rank(view: &StockView<'_>, options: &[RankOption], unranked: f64) -> f64 {
    options
        .iter()
        .map(|o| view.stock().extra_number(&o.key).unwrap_or(unranked))
        .sum()
}

/// The rank a stock without the field is given within `views`: the number
/// of stocks, or the worst stored rank if that is larger.
pub fn unranked_value(views: &[StockView<'_>], options: &[RankOption]) -> f64 {
    views
        .iter()
        .flat_map(|v| options.iter().filter_map(|o| v.stock().extra_number(&o.key)))
        .fold(views.len() as f64, f64::max)
}
