//! Operations exposed to the CLI: listings, fill and rank batches, filter
//! editing, what-if pricing and user overrides.

use crate::engine::{fill_patch, year_stat, Engine, StockView};
use crate::error::SnowballError;
use crate::filter::catalog_option;
use crate::history::{history, YearHistory};
use crate::loader::PricePoint;
use crate::models::{Filter, Ordering, SeriesField, StatusFilter, StockPatch, StockRecord, YearValue};
use crate::query::{query, ListSummary, QueryOptions};
use crate::rank::{catalog_rank_option, update_ranks};
use crate::storage::Repository;
use anyhow::Result;
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use tracing::{info, warn};

/// User-editable numeric or text override on a stock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Override {
    AdjustedFutureRoe,
    AdjustedFuturePbr,
    MyPrice,
    Note,
}

impl Override {
    pub fn key(&self) -> &'static str {
        match self {
            Override::AdjustedFutureRoe => "adjusted_future_roe",
            Override::AdjustedFuturePbr => "adjusted_future_pbr",
            Override::MyPrice => "my_price",
            Override::Note => "note",
        }
    }

    fn cleared(&self) -> Value {
        match self {
            Override::Note => Value::String(String::new()),
            _ => Value::from(0),
        }
    }
}

impl FromStr for Override {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().replace('-', "_").as_str() {
            "adjusted_future_roe" => Ok(Override::AdjustedFutureRoe),
            "adjusted_future_pbr" => Ok(Override::AdjustedFuturePbr),
            "my_price" => Ok(Override::MyPrice),
            "note" => Ok(Override::Note),
            other => Err(format!("unknown override: {other}")),
        }
    }
}

/// Status flags a user can toggle. `Owned` and `Starred` exclude each other.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mark {
    Starred,
    Owned,
    Doubtful,
}

impl Mark {
    pub fn key(&self) -> &'static str {
        match self {
            Mark::Starred => "starred",
            Mark::Owned => "owned",
            Mark::Doubtful => "doubtful",
        }
    }

    fn excludes(&self) -> Option<Mark> {
        match self {
            Mark::Starred => Some(Mark::Owned),
            Mark::Owned => Some(Mark::Starred),
            Mark::Doubtful => None,
        }
    }
}

impl FromStr for Mark {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "starred" => Ok(Mark::Starred),
            "owned" => Ok(Mark::Owned),
            "doubtful" => Ok(Mark::Doubtful),
            other => Err(format!("unknown mark: {other}")),
        }
    }
}

impl fmt::Display for Mark {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// One row of a listing.
#[derive(Debug, Clone)]
pub struct ListedStock {
    pub stock: StockRecord,
    pub expected_rate: f64,
    pub future_roe: f64,
    pub total_rank: Option<f64>,
}

#[derive(Debug, Clone)]
pub struct StockListing {
    pub rows: Vec<ListedStock>,
    pub summary: ListSummary,
    pub filter: Option<Filter>,
}

pub struct SnowballService {
    repo: Repository,
    engine: Engine,
}

impl SnowballService {
    pub fn new(repo: Repository, engine: Engine) -> Self {
        Self { repo, engine }
    }

    pub fn repo(&self) -> &Repository {
        &self.repo
    }

    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    fn stock(&self, code: &str) -> Result<StockRecord> {
        Ok(self
            .repo
            .find_one_by_code(code)?
            .ok_or_else(|| SnowballError::StockNotFound(code.to_string()))?)
    }

    fn filter(&self, id: i64) -> Result<Filter> {
        Ok(self.repo.find_filter(id)?.ok_or(SnowballError::FilterNotFound(id))?)
    }

    fn views<'a>(&'a self, stocks: &'a [StockRecord]) -> Result<Vec<StockView<'a>>> {
        Ok(stocks
            .iter()
            .map(|s| self.engine.view(s))
            .collect::<Result<Vec<_>, SnowballError>>()?)
    }

    /// Run a stored document through the engine, e.g. for `show`.
    pub fn with_view<T>(&self, code: &str, f: impl FnOnce(&StockView<'_>) -> T) -> Result<T> {
        let stock = self.stock(code)?;
        let view = self.engine.view(&stock)?;
        Ok(f(&view))
    }

    // ── Listing ───────────────────────────────────────────────────────────────

    pub fn list_stocks(
        &self,
        status: StatusFilter,
        order_by: &str,
        ordering: Ordering,
        filter_id: Option<i64>,
    ) -> Result<StockListing> {
        let filter = filter_id.map(|id| self.filter(id)).transpose()?;
        let stocks = self.repo.find_all(status)?;
        let views = self.views(&stocks)?;

        let options = QueryOptions::new(status, order_by, ordering, filter.as_ref());
        let listed = query(views, &options);
        let summary = ListSummary::from_listing(&listed, self.engine.params.target_rate);
        let rows = listed
            .iter()
            .map(|l| ListedStock {
                stock: l.view.stock().clone(),
                expected_rate: l.view.expected_rate(),
                future_roe: l.view.future_roe(),
                total_rank: l.total_rank,
            })
            .collect();

        Ok(StockListing { rows, summary, filter })
    }

    // ── Batches ───────────────────────────────────────────────────────────────

    /// Recompute and persist the memoized fields of one stock. Returns
    /// `None` when the stock has no ROE history and was skipped.
    pub fn recompute_and_persist(&self, code: &str) -> Result<Option<StockRecord>> {
        let stock = self.stock(code)?;
        let view = self.engine.view(&stock)?;
        match fill_patch(&view) {
            Some(patch) => Ok(Some(self.repo.upsert_by_code(&patch)?)),
            None => {
                warn!("{}: no ROE history, fill skipped", stock);
                Ok(None)
            }
        }
    }

    /// Fill every stored stock. Returns how many were filled.
    pub fn fill_all(&self) -> Result<usize> {
        let mut filled = 0;
        for code in self.repo.list_codes()? {
            if self.recompute_and_persist(&code)?.is_some() {
                filled += 1;
            }
        }
        info!("Filled {} stocks", filled);
        Ok(filled)
    }

    /// Batch cross-sectional rank recompute over every stored stock.
    pub fn recompute_ranks(&self) -> Result<usize> {
        let stocks = self.repo.find_all(StatusFilter::All)?;
        let views = self.views(&stocks)?;
        let patches = update_ranks(&views);
        let n = self.repo.upsert_many(&patches)?;
        info!("Ranked {} stocks", n);
        Ok(n)
    }

    /// Codes to re-collect. `All` and `Bad` select by expected-rate sign, the
    /// mark statuses select by mark alone.
    pub fn codes_for_refresh(&self, status: StatusFilter) -> Result<Vec<String>> {
        let stocks = self.repo.find_all(status)?;
        let views = self.views(&stocks)?;
        let options = QueryOptions::new(status, "code", Ordering::Asc, None);
        Ok(query(views, &options).iter().map(|l| l.view.code().to_string()).collect())
    }

    // ── What-if and history ───────────────────────────────────────────────────

    /// Year-aligned values of one positional series, consensus years included.
    pub fn series(&self, code: &str, field: SeriesField) -> Result<Vec<YearValue>> {
        let stock = self.stock(code)?;
        Ok(year_stat(&stock, field, &self.engine.calendar, false)?)
    }

    pub fn expected_rate_at_price(&self, code: &str, price: f64) -> Result<f64> {
        self.with_view(code, |v| v.expected_rate_at_price(price))
    }

    pub fn history(&self, code: &str, prices: &[PricePoint]) -> Result<Vec<YearHistory>> {
        self.with_view(code, |v| history(v, prices))
    }

    // ── Overrides and marks ───────────────────────────────────────────────────

    pub fn set_override(&self, code: &str, field: Override, value: Value) -> Result<StockRecord> {
        self.stock(code)?;
        let patch = StockPatch::new(code).set(field.key(), value);
        self.repo.upsert_by_code(&patch)
    }

    pub fn clear_override(&self, code: &str, field: Override) -> Result<StockRecord> {
        self.set_override(code, field, field.cleared())
    }

    /// Turning `owned` on clears `starred` and vice versa.
    pub fn set_mark(&self, code: &str, mark: Mark, on: bool) -> Result<StockRecord> {
        self.stock(code)?;
        let mut patch = StockPatch::new(code).set(mark.key(), on);
        if on {
            if let Some(other) = mark.excludes() {
                patch.insert(other.key(), false);
            }
        }
        self.repo.upsert_by_code(&patch)
    }

    pub fn remove_stock(&self, code: &str) -> Result<()> {
        if !self.repo.delete_by_code(code)? {
            return Err(SnowballError::StockNotFound(code.to_string()).into());
        }
        info!("Removed {}", code);
        Ok(())
    }

    // ── Filters ───────────────────────────────────────────────────────────────

    pub fn filters(&self) -> Result<Vec<Filter>> {
        self.repo.all_filters()
    }

    /// Create an empty filter. Unnamed filters are numbered.
    pub fn new_filter(&self, name: Option<&str>) -> Result<Filter> {
        let name = match name {
            Some(n) if !n.trim().is_empty() => n.trim().to_string(),
            _ => format!("New filter {}", self.repo.filter_count()? + 1),
        };
        self.repo.insert_filter(&name)
    }

    pub fn rename_filter(&self, id: i64, name: &str) -> Result<Filter> {
        let mut filter = self.filter(id)?;
        filter.name = name.to_string();
        self.repo.save_filter(&filter)?;
        Ok(filter)
    }

    pub fn add_filter_option(&self, id: i64, key: &str, more_than: bool, value: Option<f64>) -> Result<u32> {
        let option = catalog_option(key, more_than, value)?;
        let mut filter = self.filter(id)?;
        let option_id = filter.push_filter_option(&option);
        self.repo.save_filter(&filter)?;
        Ok(option_id)
    }

    pub fn add_rank_option(&self, id: i64, key: &str) -> Result<u32> {
        let option = catalog_rank_option(key)?;
        let mut filter = self.filter(id)?;
        let option_id = filter.push_rank_option(&option);
        self.repo.save_filter(&filter)?;
        Ok(option_id)
    }

    pub fn remove_filter_option(&self, id: i64, option_id: u32) -> Result<Filter> {
        let mut filter = self.filter(id)?;
        if !filter.remove_option(option_id) {
            return Err(SnowballError::FilterOptionNotFound { filter_id: id, option_id }.into());
        }
        self.repo.save_filter(&filter)?;
        Ok(filter)
    }

    pub fn delete_filter(&self, id: i64) -> Result<()> {
        if !self.repo.delete_filter(id)? {
            return Err(SnowballError::FilterNotFound(id).into());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::Calendar;
    use serde_json::json;

    fn service() -> SnowballService {
        let repo = Repository::open_in_memory().unwrap();
        repo.run_migrations().unwrap();
        SnowballService::new(repo, Engine::with_calendar(Calendar::from_last_year(2023)))
    }

    fn seed(svc: &SnowballService, code: &str, price: f64, pbr: f64) {
        let doc = json!({
            "code": code,
            "title": code.to_uppercase(),
            "bps": 1000,
            "pbr": pbr,
            "current_price": price,
            "dividend_rate": 4.5,
            "ROEs": [11.0, 8.0, 15.0, 10.0],
            "last_year_index": 2
        });
        svc.repo().upsert_by_code(&StockPatch::from_value(doc).unwrap()).unwrap();
    }

    fn error_of(result: Result<impl fmt::Debug>) -> SnowballError {
        result.unwrap_err().downcast::<SnowballError>().unwrap()
    }

    #[test]
    fn test_recompute_and_persist_is_idempotent() {
        let svc = service();
        seed(&svc, "a", 1200.0, 1.2);

        let first = svc.recompute_and_persist("a").unwrap().unwrap();
        let second = svc.recompute_and_persist("a").unwrap().unwrap();
        assert_eq!(first, second);
        assert_eq!(first.extra_number("invest_price"), Some(679.0));
    }

    #[test]
    fn test_recompute_skips_stock_without_roes() {
        let svc = service();
        svc.repo().upsert_by_code(&StockPatch::new("empty")).unwrap();
        assert!(svc.recompute_and_persist("empty").unwrap().is_none());
        assert_eq!(svc.fill_all().unwrap(), 0);
        assert_eq!(error_of(svc.recompute_and_persist("nope")), SnowballError::StockNotFound("nope".into()));
    }

    #[test]
    fn test_missing_anchor_surfaces_as_failure() {
        let svc = service();
        let doc = json!({"code": "x", "ROEs": [1.0, 2.0]});
        svc.repo().upsert_by_code(&StockPatch::from_value(doc).unwrap()).unwrap();

        let err = error_of(svc.list_stocks(StatusFilter::All, "expected_rate", Ordering::Desc, None));
        assert!(matches!(err, SnowballError::MissingAnchor { .. }));
    }

    #[test]
    fn test_recompute_ranks_persists_rank_fields() {
        let svc = service();
        seed(&svc, "a", 1200.0, 1.2);
        seed(&svc, "b", 800.0, 0.8);
        seed(&svc, "c", 1000.0, 0.0);

        assert_eq!(svc.recompute_ranks().unwrap(), 3);
        let rank = |code: &str| svc.repo().find_one_by_code(code).unwrap().unwrap().extra_number("rank_pbr");
        assert_eq!(rank("a"), Some(2.0));
        assert_eq!(rank("b"), Some(1.0));
        assert_eq!(rank("c"), Some(3.0));
    }

    #[test]
    fn test_list_stocks_with_filter_and_summary() {
        let svc = service();
        seed(&svc, "a", 1200.0, 1.2);
        seed(&svc, "b", 800.0, 0.8);
        seed(&svc, "c", 5000.0, 5.0);

        let plain = svc.list_stocks(StatusFilter::All, "expected_rate", Ordering::Desc, None).unwrap();
        let codes: Vec<_> = plain.rows.iter().map(|r| r.stock.code.as_str()).collect();
        assert_eq!(codes, vec!["b", "a"]);
        assert_eq!(plain.summary.count, 2);
        assert_eq!(plain.summary.low_pbr_count, 1);

        let filter = svc.new_filter(None).unwrap();
        assert_eq!(filter.name, "New filter 1");
        svc.add_filter_option(filter.id, "pbr", true, Some(1.0)).unwrap();
        let filtered = svc.list_stocks(StatusFilter::All, "pbr", Ordering::Asc, Some(filter.id)).unwrap();
        let codes: Vec<_> = filtered.rows.iter().map(|r| r.stock.code.as_str()).collect();
        assert_eq!(codes, vec!["a", "c"]);
        assert_eq!(filtered.filter.map(|f| f.id), Some(filter.id));

        assert_eq!(
            error_of(svc.list_stocks(StatusFilter::All, "pbr", Ordering::Asc, Some(999))),
            SnowballError::FilterNotFound(999)
        );
    }

    #[test]
    fn test_expected_rate_at_price() {
        let svc = service();
        seed(&svc, "a", 1200.0, 1.2);
        let at_current = svc.expected_rate_at_price("a", 1200.0).unwrap();
        let cheaper = svc.expected_rate_at_price("a", 800.0).unwrap();
        assert!((at_current - 8.63).abs() < 0.05);
        assert!(cheaper > at_current);
    }

    #[test]
    fn test_series_is_year_aligned() {
        let svc = service();
        seed(&svc, "a", 1200.0, 1.2);

        let roes = svc.series("a", SeriesField::Roe).unwrap();
        assert_eq!(roes.first(), Some(&YearValue(2021, Some(11.0))));
        assert_eq!(roes.last(), Some(&YearValue(2024, Some(10.0))));
        assert_eq!(svc.series("a", SeriesField::Eps).unwrap(), vec![YearValue(0, Some(0.0))]);
    }

    #[test]
    fn test_overrides() {
        let svc = service();
        seed(&svc, "a", 1200.0, 1.2);

        let s = svc.set_override("a", Override::AdjustedFutureRoe, json!(12.0)).unwrap();
        assert_eq!(s.adjusted_future_roe, 12.0);
        let s = svc.set_override("a", Override::Note, json!("watch capex")).unwrap();
        assert_eq!(s.note, "watch capex");
        assert_eq!(s.adjusted_future_roe, 12.0);

        let s = svc.clear_override("a", Override::AdjustedFutureRoe).unwrap();
        assert_eq!(s.adjusted_future_roe, 0.0);
        assert!(svc.set_override("zzz", Override::MyPrice, json!(1)).is_err());
        assert_eq!("adjusted-future-pbr".parse(), Ok(Override::AdjustedFuturePbr));
    }

    #[test]
    fn test_marks_owned_and_starred_exclude_each_other() {
        let svc = service();
        seed(&svc, "a", 1200.0, 1.2);

        let s = svc.set_mark("a", Mark::Starred, true).unwrap();
        assert!(s.starred);
        let s = svc.set_mark("a", Mark::Owned, true).unwrap();
        assert!(s.owned && !s.starred);
        let s = svc.set_mark("a", Mark::Doubtful, true).unwrap();
        assert!(s.owned && s.doubtful);
        let s = svc.set_mark("a", Mark::Owned, false).unwrap();
        assert!(!s.owned && !s.starred);

        let doubtful = svc.list_stocks(StatusFilter::Doubtful, "code", Ordering::Asc, None).unwrap();
        assert_eq!(doubtful.rows.len(), 1);
    }

    #[test]
    fn test_filter_lifecycle() {
        let svc = service();
        let f = svc.new_filter(Some("value")).unwrap();
        assert_eq!(svc.add_filter_option(f.id, "pbr", false, Some(1.0)).unwrap(), 1);
        assert_eq!(svc.add_rank_option(f.id, "rank_per").unwrap(), 2);
        assert_eq!(error_of(svc.add_rank_option(f.id, "bogus")), SnowballError::UnknownRankKey("bogus".into()));
        assert_eq!(
            error_of(svc.add_filter_option(f.id, "bogus", true, None)),
            SnowballError::UnknownFilterKey("bogus".into())
        );

        let renamed = svc.rename_filter(f.id, "cheap").unwrap();
        assert_eq!(renamed.options.len(), 2);

        let after = svc.remove_filter_option(f.id, 1).unwrap();
        assert_eq!(after.options.len(), 1);
        assert_eq!(
            error_of(svc.remove_filter_option(f.id, 1)),
            SnowballError::FilterOptionNotFound { filter_id: f.id, option_id: 1 }
        );

        svc.delete_filter(f.id).unwrap();
        assert!(svc.filters().unwrap().is_empty());
        assert_eq!(error_of(svc.delete_filter(f.id)), SnowballError::FilterNotFound(f.id));
    }

    #[test]
    fn test_remove_and_refresh_candidates() {
        let svc = service();
        seed(&svc, "a", 1200.0, 1.2);
        seed(&svc, "c", 5000.0, 5.0);

        assert_eq!(svc.codes_for_refresh(StatusFilter::All).unwrap(), vec!["a"]);
        assert_eq!(svc.codes_for_refresh(StatusFilter::Bad).unwrap(), vec!["c"]);

        svc.remove_stock("a").unwrap();
        assert_eq!(error_of(svc.remove_stock("a")), SnowballError::StockNotFound("a".into()));
    }

    #[test]
    fn test_refresh_candidates_by_mark() {
        let svc = service();
        seed(&svc, "a", 1200.0, 1.2);
        seed(&svc, "b", 1100.0, 1.1);
        seed(&svc, "c", 5000.0, 5.0);
        svc.set_mark("b", Mark::Owned, true).unwrap();
        svc.set_mark("c", Mark::Starred, true).unwrap();

        // A bad expected rate does not exclude a marked stock.
        assert_eq!(svc.codes_for_refresh(StatusFilter::StarredOrOwned).unwrap(), vec!["b", "c"]);
        assert_eq!(svc.codes_for_refresh(StatusFilter::Starred).unwrap(), vec!["c"]);
        assert!(svc.codes_for_refresh(StatusFilter::Doubtful).unwrap().is_empty());
    }
}
