//! Metric-key registry.
//!
//! Filters, sorting and ranking all name a metric by string key. Every key
//! resolves through [`resolve`], so the three consumers always agree on
//! what a key means. Unknown keys fall back to the raw document field.

use crate::engine::StockView;
use serde_json::Value;
use std::cmp::Ordering;
use std::fmt;

/// Value of one metric for one stock.
#[derive(Debug, Clone, PartialEq)]
pub enum MetricValue {
    Number(f64),
    Bool(bool),
    Text(String),
    Null,
}

impl MetricValue {
    pub fn is_truthy(&self) -> bool {
        match self {
            MetricValue::Number(n) => *n != 0.0 && !n.is_nan(),
            MetricValue::Bool(b) => *b,
            MetricValue::Text(s) => !s.is_empty(),
            MetricValue::Null => false,
        }
    }

    /// Numeric reading; booleans count as 0/1.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            MetricValue::Number(n) => Some(*n),
            MetricValue::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            _ => None,
        }
    }

    /// Total order for sorting: null < numbers < text.
    pub fn sort_cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (MetricValue::Text(a), MetricValue::Text(b)) => a.cmp(b),
            (MetricValue::Null, MetricValue::Null) => Ordering::Equal,
            (MetricValue::Null, _) => Ordering::Less,
            (_, MetricValue::Null) => Ordering::Greater,
            (MetricValue::Text(_), _) => Ordering::Greater,
            (_, MetricValue::Text(_)) => Ordering::Less,
            (a, b) => {
                let a = a.as_f64().unwrap_or_default();
                let b = b.as_f64().unwrap_or_default();
                a.total_cmp(&b)
            }
        }
    }

    pub fn from_json(value: &Value) -> Self {
        match value {
            Value::Number(n) => n.as_f64().map_or(MetricValue::Null, MetricValue::Number),
            Value::Bool(b) => MetricValue::Bool(*b),
            Value::String(s) => MetricValue::Text(s.clone()),
            _ => MetricValue::Null,
        }
    }
}

impl From<f64> for MetricValue {
    fn from(v: f64) -> Self {
        MetricValue::Number(v)
    }
}

impl From<i64> for MetricValue {
    fn from(v: i64) -> Self {
        MetricValue::Number(v as f64)
    }
}

impl From<i32> for MetricValue {
    fn from(v: i32) -> Self {
        MetricValue::Number(f64::from(v))
    }
}

impl From<bool> for MetricValue {
    fn from(v: bool) -> Self {
        MetricValue::Bool(v)
    }
}

impl From<Option<f64>> for MetricValue {
    fn from(v: Option<f64>) -> Self {
        v.map_or(MetricValue::Null, MetricValue::Number)
    }
}

impl From<&str> for MetricValue {
    fn from(v: &str) -> Self {
        MetricValue::Text(v.to_string())
    }
}

impl fmt::Display for MetricValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetricValue::Number(n) if n.fract() == 0.0 && n.abs() < 1e15 => write!(f, "{}", *n as i64),
            MetricValue::Number(n) => write!(f, "{n:.2}"),
            MetricValue::Bool(b) => write!(f, "{b}"),
            MetricValue::Text(s) => f.write_str(s),
            MetricValue::Null => f.write_str("-"),
        }
    }
}

/// A named metric and how to evaluate it.
pub struct Metric {
    pub key: &'static str,
    pub eval: fn(&StockView<'_>) -> MetricValue,
}

impl fmt::Debug for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Metric").field("key", &self.key).finish()
    }
}

pub static METRICS: &[Metric] = &[
    // Raw document fields
    Metric { key: "code", eval: |v| v.code().into() },
    Metric { key: "title", eval: |v| v.stock().title.as_str().into() },
    Metric { key: "current_price", eval: |v| v.stock().current_price.into() },
    Metric { key: "bps", eval: |v| v.stock().bps.into() },
    Metric { key: "per", eval: |v| v.stock().per.into() },
    Metric { key: "pbr", eval: |v| v.stock().pbr.into() },
    Metric { key: "dividend_rate", eval: |v| v.stock().dividend_rate.into() },
    Metric { key: "beta", eval: |v| v.stock().beta.into() },
    Metric { key: "foreigner_weight", eval: |v| v.stock().foreigner_weight.into() },
    Metric { key: "floating_rate", eval: |v| v.stock().floating_rate.into() },
    Metric { key: "month1", eval: |v| v.stock().month1.into() },
    Metric { key: "month3", eval: |v| v.stock().month3.into() },
    Metric { key: "month6", eval: |v| v.stock().month6.into() },
    Metric { key: "month12", eval: |v| v.stock().month12.into() },
    Metric { key: "relative_earning_rate", eval: |v| v.stock().relative_earning_rate.into() },
    Metric { key: "agg_value", eval: |v| v.stock().agg_value.into() },
    Metric { key: "adjusted_future_roe", eval: |v| v.stock().adjusted_future_roe.into() },
    Metric { key: "adjusted_future_pbr", eval: |v| v.stock().adjusted_future_pbr.into() },
    Metric { key: "my_price", eval: |v| v.stock().my_price.into() },
    Metric { key: "note", eval: |v| v.stock().note.as_str().into() },
    Metric { key: "starred", eval: |v| v.stock().starred.into() },
    Metric { key: "owned", eval: |v| v.stock().owned.into() },
    Metric { key: "doubtful", eval: |v| v.stock().doubtful.into() },
    // PBR band
    Metric { key: "low_pbr", eval: |v| v.low_pbr().into() },
    Metric { key: "high_pbr", eval: |v| v.high_pbr().into() },
    Metric { key: "mid_pbr", eval: |v| v.mid_pbr().into() },
    Metric { key: "is_five_years_record_low", eval: |v| v.is_five_years_record_low().into() },
    // ROE
    Metric { key: "mean_roe", eval: |v| v.mean_roe().into() },
    Metric { key: "dividend_tax_adjust", eval: |v| v.dividend_tax_adjust().into() },
    Metric { key: "future_roe", eval: |v| v.future_roe().into() },
    Metric { key: "calculable", eval: |v| v.calculable().into() },
    Metric { key: "roe_max_diff", eval: |v| v.roe_max_diff().into() },
    Metric { key: "last_four_years_roe_max_diff", eval: |v| v.last_four_years_roe_max_diff().into() },
    Metric { key: "has_consensus", eval: |v| v.has_consensus().into() },
    Metric { key: "is_positive_consensus_roe", eval: |v| v.is_positive_consensus_roe().into() },
    Metric { key: "latest_quarter_roe", eval: |v| v.latest_quarter_roe().into() },
    // Projection
    Metric { key: "future_bps", eval: |v| v.calc_future_bps(v.engine_params().future_years).into() },
    Metric { key: "expected_rate", eval: |v| v.expected_rate().into() },
    Metric { key: "expected_rate_by_current_pbr", eval: |v| v.expected_rate_by_current_pbr().into() },
    Metric { key: "expected_rate_by_low_pbr", eval: |v| v.expected_rate_by_low_pbr().into() },
    Metric { key: "expected_rate_by_mid_pbr", eval: |v| v.expected_rate_by_mid_pbr().into() },
    Metric {
        key: "expected_rate_by_adjusted_future_pbr",
        eval: |v| v.expected_rate_by_adjusted_future_pbr().into(),
    },
    Metric { key: "invest_price", eval: |v| v.invest_price().into() },
    // Earnings
    Metric { key: "adjusted_eps", eval: |v| v.adjusted_eps().into() },
    Metric { key: "intrinsic_value", eval: |v| v.intrinsic_value().into() },
    Metric { key: "intrinsic_discount_rate", eval: |v| v.intrinsic_discount_rate().into() },
    Metric { key: "eps_growth", eval: |v| v.eps_growth().into() },
    Metric { key: "mean_per", eval: |v| v.mean_per().into() },
    Metric { key: "peg_current_per", eval: |v| v.peg_current_per().into() },
    Metric { key: "peg_mean_per", eval: |v| v.peg_mean_per().into() },
    // Quality
    Metric { key: "latest_fscore", eval: |v| v.latest_fscore().into() },
    Metric { key: "last_year_gpa", eval: |v| v.last_year_gpa().into() },
    Metric { key: "mean_roic", eval: |v| v.mean_roic().into() },
    // Liquidity and multiples
    Metric { key: "last_year_current_ratio", eval: |v| v.last_year_current_ratio().into() },
    Metric { key: "ncav", eval: |v| v.ncav().into() },
    Metric { key: "ncav_ratio", eval: |v| v.ncav_ratio().into() },
    Metric { key: "last_year_pcr", eval: |v| v.last_year_pcr().into() },
    Metric { key: "last_year_psr", eval: |v| v.last_year_psr().into() },
    Metric { key: "pfr", eval: |v| v.pfr().into() },
    Metric { key: "has_note", eval: |v| v.has_note().into() },
];

pub fn lookup(key: &str) -> Option<&'static Metric> {
    METRICS.iter().find(|m| m.key == key)
}

pub fn is_known(key: &str) -> bool {
    lookup(key).is_some()
}

/// Resolve `key` for one stock.
///
/// Registered metrics are computed; any other key reads the raw document
/// field (memoized output, rank fields), defaulting to 0 when absent.
pub fn resolve(view: &StockView<'_>, key: &str) -> MetricValue {
    match lookup(key) {
        Some(metric) => (metric.eval)(view),
        None => view
            .stock()
            .extra
            .get(key)
            .map_or(MetricValue::Number(0.0), MetricValue::from_json),
    }
}
