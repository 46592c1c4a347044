//! Valuation engine: year-series alignment and per-stock derived metrics.
//!
//! Everything in here is pure. Date-dependent behaviour goes through an
//! explicit [`Calendar`], so the same document always yields the same
//! numbers for the same calendar.

pub mod fill;
pub mod view;
pub mod year_stat;

use crate::error::{EngineResult, SnowballError};
use crate::models::StockRecord;
use chrono::{Datelike, Local};

pub use fill::fill_patch;
pub use view::{FScore, StockView};
pub use year_stat::{align_years, year_stat};

/// Withholding tax on dividends, in percent.
pub const DIVIDEND_TAX_RATE: f64 = 15.40;
/// Projection horizon in years.
pub const FUTURE: u32 = 10;
/// Required annual return, in percent.
pub const TARGET_RATE: f64 = 15.0;

/// Wall-clock anchors used by the engine.
///
/// `last_year` is the latest completed fiscal year and anchors positional
/// series. `this_year` drives the rolling ROE window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Calendar {
    pub this_year: i32,
    pub last_year: i32,
}

impl Calendar {
    pub fn from_this_year(this_year: i32) -> Self {
        Self { this_year, last_year: this_year - 1 }
    }

    pub fn from_last_year(last_year: i32) -> Self {
        Self { this_year: last_year + 1, last_year }
    }

    /// Calendar for the local system clock.
    pub fn current() -> Self {
        Self::from_this_year(Local::now().year())
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EngineParams {
    pub dividend_tax_rate: f64,
    pub future_years: u32,
    pub target_rate: f64,
}

impl Default for EngineParams {
    fn default() -> Self {
        Self {
            dividend_tax_rate: DIVIDEND_TAX_RATE,
            future_years: FUTURE,
            target_rate: TARGET_RATE,
        }
    }
}

/// Calendar plus model parameters; hands out [`StockView`]s.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Engine {
    pub calendar: Calendar,
    pub params: EngineParams,
}

impl Engine {
    pub fn new(calendar: Calendar, params: EngineParams) -> Self {
        Self { calendar, params }
    }

    pub fn with_calendar(calendar: Calendar) -> Self {
        Self::new(calendar, EngineParams::default())
    }

    /// Read-only metric view over one stock.
    ///
    /// Fails when the document carries a positional series but no
    /// `last_year_index`; such a document cannot be interpreted at all.
    pub fn view<'a>(&'a self, stock: &'a StockRecord) -> EngineResult<StockView<'a>> {
        let anchor = match (stock.last_year_index, stock.first_present_series()) {
            (Some(index), _) => index,
            (None, None) => 0,
            (None, Some(field)) => {
                return Err(SnowballError::MissingAnchor {
                    code: stock.code.clone(),
                    field: field.to_string(),
                });
            }
        };
        Ok(StockView::new(stock, self, anchor))
    }
}

/// Annualised rate that grows `price` into `future_value` over `years`.
///
/// A negative future value has no real fractional root and maps to 0, as
/// does a non-positive price or a zero horizon.
pub fn compound_rate(future_value: f64, price: f64, years: u32) -> f64 {
    if future_value < 0.0 || price <= 0.0 || years == 0 {
        return 0.0;
    }
    ((future_value / price).powf(1.0 / years as f64) - 1.0) * 100.0
}
