use crate::engine::StockView;
use crate::filter::{build_predicate, expected_rate_sign, matches_all, Predicate};
use crate::metrics::resolve;
use crate::models::{Filter, FilterOption, Ordering, RankOption, StatusFilter};
use crate::rank::{total_rank, unranked_value};
use crate::utils::mean_or_zero;
use serde::Serialize;

pub const DEFAULT_ORDER_BY: &str = "expected_rate";

/// Everything that shapes one listing, after the store's coarse pre-filter.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryOptions {
    pub order_by: String,
    pub ordering: Ordering,
    pub filter_by_expected_rate: bool,
    /// `true` keeps positive expected rates, `false` negative ones.
    pub filter_bad: bool,
    pub filter_options: Vec<FilterOption>,
    pub rank_options: Vec<RankOption>,
}

impl Default for QueryOptions {
    fn default() -> Self {
        Self {
            order_by: DEFAULT_ORDER_BY.to_string(),
            ordering: Ordering::Desc,
            filter_by_expected_rate: true,
            filter_bad: true,
            filter_options: Vec::new(),
            rank_options: Vec::new(),
        }
    }
}

impl QueryOptions {
    pub fn new(status: StatusFilter, order_by: &str, ordering: Ordering, filter: Option<&Filter>) -> Self {
        Self {
            order_by: order_by.to_string(),
            ordering,
            filter_by_expected_rate: status.filter_by_expected_rate(),
            filter_bad: status.filter_bad(),
            filter_options: filter.map(Filter::filter_options).unwrap_or_default(),
            rank_options: filter.map(Filter::rank_options).unwrap_or_default(),
        }
    }

    /// The sign filter only applies to a plain listing; explicit filter or
    /// rank options replace it.
    fn applies_sign_filter(&self) -> bool {
        self.filter_by_expected_rate && self.filter_options.is_empty() && self.rank_options.is_empty()
    }

    fn predicates(&self) -> Vec<Predicate> {
        let mut predicates: Vec<Predicate> = self.filter_options.iter().map(build_predicate).collect();
        if self.applies_sign_filter() {
            predicates.push(expected_rate_sign(self.filter_bad));
        }
        predicates
    }
}

/// One stock in a listing. `total_rank` is set only for composite-ranked listings.
#[derive(Debug, Clone, Copy)]
pub struct Listed<'a> {
    pub view: StockView<'a>,
    pub total_rank: Option<f64>,
}

/// Filter and order `views`.
///
/// With rank options present the list is ordered ascending by composite
/// rank and `order_by`/`ordering` are ignored. Both sorts are stable.
pub fn query<'a>(views: Vec<StockView<'a>>, options: &QueryOptions) -> Vec<Listed<'a>> {
    let predicates = options.predicates();
    let mut listed: Vec<Listed<'a>> = views
        .into_iter()
        .filter(|v| matches_all(&predicates, v))
        .map(|view| Listed { view, total_rank: None })
        .collect();

    if !options.rank_options.is_empty() {
        let ranked: Vec<StockView<'a>> = listed.iter().map(|item| item.view).collect();
        let unranked = unranked_value(&ranked, &options.rank_options);
        for item in &mut listed {
            item.total_rank = Some(total_rank(&item.view, &options.rank_options, unranked));
        }
        listed.sort_by(|a, b| {
            a.total_rank.unwrap_or_default().total_cmp(&b.total_rank.unwrap_or_default())
        });
        return listed;
    }

    let mut keyed: Vec<_> = listed
        .into_iter()
        .map(|item| (resolve(&item.view, &options.order_by), item))
        .collect();
    match options.ordering {
        Ordering::Asc => keyed.sort_by(|a, b| a.0.sort_cmp(&b.0)),
        Ordering::Desc => keyed.sort_by(|a, b| b.0.sort_cmp(&a.0)),
    }
    keyed.into_iter().map(|(_, item)| item).collect()
}

/// Aggregate figures shown under a listing.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ListSummary {
    pub count: usize,
    pub low_pbr_count: usize,
    pub high_expected_rate_count: usize,
    pub fscore_count: usize,
    pub mean_expected_rate: f64,
    pub mean_expected_rate_by_low_pbr: f64,
    pub mean_future_roe: f64,
    pub mean_quarter_roe: f64,
    pub quarter_roe_count: usize,
}

impl ListSummary {
    pub fn from_listing(listed: &[Listed<'_>], target_rate: f64) -> Self {
        let views: Vec<&StockView<'_>> = listed.iter().map(|l| &l.view).collect();
        let expected: Vec<f64> = views.iter().map(|v| v.expected_rate()).collect();
        let by_low_pbr: Vec<f64> = views.iter().map(|v| v.expected_rate_by_low_pbr()).collect();
        let future_roe: Vec<f64> = views.iter().map(|v| v.future_roe()).collect();
        let quarter_roe: Vec<f64> = views.iter().filter_map(|v| v.latest_quarter_roe()).collect();

        Self {
            count: views.len(),
            low_pbr_count: views
                .iter()
                .filter(|v| v.stock().pbr > 0.0 && v.stock().pbr <= 1.0)
                .count(),
            high_expected_rate_count: expected.iter().filter(|r| **r >= target_rate).count(),
            fscore_count: views.iter().filter(|v| v.latest_fscore() >= 3).count(),
            mean_expected_rate: mean_or_zero(&expected),
            mean_expected_rate_by_low_pbr: mean_or_zero(&by_low_pbr),
            mean_future_roe: mean_or_zero(&future_roe),
            mean_quarter_roe: mean_or_zero(&quarter_roe),
            quarter_roe_count: quarter_roe.len(),
        }
    }
}
