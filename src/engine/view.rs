use super::year_stat::{align_years, select, NO_DATA};
use super::{compound_rate, Calendar, Engine, EngineParams};
use crate::models::{QuarterValue, SeriesField, StockRecord, YearValue};
use crate::utils::mean_or_zero;
use serde::Serialize;

/// Three of the nine Piotroski signals, each 0 or 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct FScore {
    /// No dilution: the issued share count never changed.
    pub total_issued_stock: u8,
    /// Positive net profit.
    pub profitable: u8,
    /// Positive operating cash flow.
    pub cfo: u8,
}

impl FScore {
    pub fn total(&self) -> i32 {
        i32::from(self.total_issued_stock) + i32::from(self.profitable) + i32::from(self.cfo)
    }
}

fn pair_value(pairs: &[YearValue], year: i32) -> Option<f64> {
    pairs.iter().find(|p| p.year() == year).and_then(YearValue::value)
}

fn max_minus_min(values: &[f64]) -> f64 {
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let min = values.iter().copied().fold(f64::INFINITY, f64::min);
    max - min
}

/// Read-only metric view of one stock.
///
/// Built by [`Engine::view`], which has already checked that positional
/// series can be anchored, so every accessor here is infallible. Metrics are
/// recomputed on each call from raw document fields; memoized values stored
/// on the document are never read back.
#[derive(Debug, Clone, Copy)]
pub struct StockView<'a> {
    stock: &'a StockRecord,
    engine: &'a Engine,
    anchor: usize,
}

impl<'a> StockView<'a> {
    pub(super) fn new(stock: &'a StockRecord, engine: &'a Engine, anchor: usize) -> Self {
        Self { stock, engine, anchor }
    }

    pub fn stock(&self) -> &'a StockRecord {
        self.stock
    }

    pub fn code(&self) -> &'a str {
        &self.stock.code
    }

    pub fn calendar(&self) -> &'a Calendar {
        &self.engine.calendar
    }

    pub fn engine_params(&self) -> &'a EngineParams {
        &self.engine.params
    }

    fn last_year(&self) -> i32 {
        self.engine.calendar.last_year
    }

    fn future_years(&self) -> u32 {
        self.engine.params.future_years
    }

    // ── Series access ─────────────────────────────────────────────────────────

    pub fn year_stat(&self, field: SeriesField, exclude_future: bool) -> Vec<YearValue> {
        let values = self.stock.series(field);
        if values.is_empty() {
            return vec![NO_DATA];
        }
        let stats = align_years(values, self.anchor, self.last_year());
        select(stats, &self.engine.calendar, exclude_future)
    }

    /// Non-null values of a series, in order.
    pub fn countable(&self, field: SeriesField) -> Vec<f64> {
        self.year_stat(field, false).iter().filter_map(YearValue::value).collect()
    }

    fn value_in(&self, field: SeriesField, year: i32) -> Option<f64> {
        pair_value(&self.year_stat(field, false), year)
    }

    pub fn roes(&self) -> Vec<YearValue> {
        self.year_stat(SeriesField::Roe, false)
    }

    // ── PBR band ──────────────────────────────────────────────────────────────

    fn past_positive_pbrs(&self) -> Vec<f64> {
        self.year_stat(SeriesField::Pbr, true)
            .iter()
            .filter_map(YearValue::value)
            .filter(|v| *v > 0.0)
            .collect()
    }

    /// Lowest recorded PBR. A PBR of 0 means "not computable" and is skipped.
    pub fn low_pbr(&self) -> f64 {
        self.past_positive_pbrs().into_iter().reduce(f64::min).unwrap_or(0.0)
    }

    pub fn high_pbr(&self) -> f64 {
        self.past_positive_pbrs().into_iter().reduce(f64::max).unwrap_or(0.0)
    }

    pub fn mid_pbr(&self) -> f64 {
        (self.low_pbr() + self.stock.pbr) / 2.0
    }

    pub fn is_five_years_record_low(&self) -> bool {
        self.stock.pbr < self.low_pbr()
    }

    // ── ROE ───────────────────────────────────────────────────────────────────

    /// ROEs of the four calendar years before `this_year`.
    pub fn last_four_years_roe(&self) -> Vec<f64> {
        self.four_years_roe(self.engine.calendar.this_year)
    }

    /// ROEs whose year falls in `[year - 4, year)`.
    pub fn four_years_roe(&self, year: i32) -> Vec<f64> {
        self.roes()
            .iter()
            .filter(|r| year - 4 <= r.year() && r.year() < year)
            .filter_map(YearValue::value)
            .collect()
    }

    pub fn mean_roe(&self) -> f64 {
        mean_or_zero(&self.last_four_years_roe())
    }

    pub fn dividend_tax_adjust(&self) -> f64 {
        self.stock.dividend_rate * (self.engine.params.dividend_tax_rate / 100.0)
    }

    /// Sustainable post-tax ROE estimate.
    pub fn future_roe(&self) -> f64 {
        self.mean_roe() - self.dividend_tax_adjust()
    }

    /// The user's adjusted ROE when set, else [`Self::future_roe`].
    pub fn effective_future_roe(&self) -> f64 {
        if self.stock.adjusted_future_roe > 0.0 {
            self.stock.adjusted_future_roe
        } else {
            self.future_roe()
        }
    }

    /// Whether the compounding model applies at all.
    pub fn calculable(&self) -> bool {
        self.stock.bps > 0.0 && self.effective_future_roe() > 0.0
    }

    pub fn roe_max_diff(&self) -> f64 {
        let roes = self.countable(SeriesField::Roe);
        if roes.len() < 3 { 0.0 } else { max_minus_min(&roes) }
    }

    pub fn last_four_years_roe_max_diff(&self) -> f64 {
        let roes = self.last_four_years_roe();
        if roes.is_empty() { 0.0 } else { max_minus_min(&roes) }
    }

    /// Analyst estimates appended after the last completed year.
    pub fn consensus_roes(&self) -> Vec<f64> {
        let last_year = self.last_year();
        self.roes()
            .iter()
            .filter(|r| r.year() > last_year)
            .filter_map(YearValue::value)
            .collect()
    }

    pub fn has_consensus(&self) -> bool {
        !self.consensus_roes().is_empty()
    }

    pub fn is_positive_consensus_roe(&self) -> bool {
        let consensus = self.consensus_roes();
        !consensus.is_empty() && mean_or_zero(&consensus) >= self.future_roe()
    }

    // ── Projection ────────────────────────────────────────────────────────────

    /// BPS compounded `years` ahead at the effective future ROE.
    pub fn calc_future_bps(&self, years: u32) -> i64 {
        if !self.calculable() {
            return 0;
        }
        let rate = self.effective_future_roe() / 100.0;
        (self.stock.bps * (1.0 + rate).powf(years as f64)) as i64
    }

    fn future_price(&self, years: u32, pbr: f64) -> i64 {
        (self.calc_future_bps(years) as f64 * pbr) as i64
    }

    pub fn calc_future_price_low_pbr(&self, years: u32) -> i64 {
        self.future_price(years, self.low_pbr())
    }

    pub fn calc_future_price_high_pbr(&self, years: u32) -> i64 {
        self.future_price(years, self.high_pbr())
    }

    pub fn calc_future_price_current_pbr(&self, years: u32) -> i64 {
        self.future_price(years, self.stock.pbr)
    }

    pub fn calc_future_price_mid_pbr(&self, years: u32) -> i64 {
        self.future_price(years, self.mid_pbr())
    }

    pub fn calc_future_price_adjusted_future_pbr(&self, years: u32) -> i64 {
        self.future_price(years, self.stock.adjusted_future_pbr)
    }

    /// Annualised return implied by growing `price` into `future(years)`.
    pub fn calc_expected_rate<F>(&self, future: F, years: u32, price: f64) -> f64
    where
        F: Fn(&Self, u32) -> i64,
    {
        compound_rate(future(self, years) as f64, price, years)
    }

    fn expected_rate_by<F>(&self, future: F) -> f64
    where
        F: Fn(&Self, u32) -> i64,
    {
        self.calc_expected_rate(future, self.future_years(), self.stock.current_price)
    }

    pub fn expected_rate(&self) -> f64 {
        self.expected_rate_by(Self::calc_future_bps)
    }

    /// What-if expected rate for a hypothetical purchase price.
    pub fn expected_rate_at_price(&self, price: f64) -> f64 {
        self.calc_expected_rate(Self::calc_future_bps, self.future_years(), price)
    }

    pub fn expected_rate_by_current_pbr(&self) -> f64 {
        self.expected_rate_by(Self::calc_future_price_current_pbr)
    }

    pub fn expected_rate_by_low_pbr(&self) -> f64 {
        self.expected_rate_by(Self::calc_future_price_low_pbr)
    }

    pub fn expected_rate_by_mid_pbr(&self) -> f64 {
        self.expected_rate_by(Self::calc_future_price_mid_pbr)
    }

    pub fn expected_rate_by_adjusted_future_pbr(&self) -> f64 {
        self.expected_rate_by(Self::calc_future_price_adjusted_future_pbr)
    }

    /// Highest price that still returns the target rate per year.
    pub fn invest_price(&self) -> i64 {
        let years = self.future_years();
        let discount = (1.0 + self.engine.params.target_rate / 100.0).powf(years as f64);
        (self.calc_future_bps(years) as f64 / discount) as i64
    }

    // ── Earnings ──────────────────────────────────────────────────────────────

    /// 3:2:1 weighted average of the last three past EPS values.
    pub fn adjusted_eps(&self) -> i64 {
        let past: Vec<f64> = self
            .year_stat(SeriesField::Eps, true)
            .iter()
            .filter_map(YearValue::value)
            .collect();
        if self.stock.epss.is_empty() || past.len() < 3 {
            return 0;
        }
        let n = past.len();
        ((past[n - 1] * 3.0 + past[n - 2] * 2.0 + past[n - 3]) / 6.0) as i64
    }

    pub fn intrinsic_value(&self) -> i64 {
        ((self.stock.bps + self.adjusted_eps() as f64 * 10.0) / 2.0) as i64
    }

    pub fn intrinsic_discount_rate(&self) -> f64 {
        let price = self.stock.current_price;
        if price <= 0.0 {
            return 0.0;
        }
        (self.intrinsic_value() as f64 / price - 1.0) * 100.0
    }

    /// Mean period-over-period EPS growth in percent over the whole series.
    pub fn eps_growth(&self) -> f64 {
        let eps: Vec<f64> = self.stock.epss.iter().flatten().copied().collect();
        let mut growth = Vec::with_capacity(eps.len());
        for w in eps.windows(2) {
            if w[0] == 0.0 {
                return 0.0;
            }
            growth.push(w[1] / w[0] - 1.0);
        }
        mean_or_zero(&growth) * 100.0
    }

    pub fn mean_per(&self) -> f64 {
        let pers: Vec<f64> = self.stock.pers.iter().flatten().copied().collect();
        if pers.len() > 2 { mean_or_zero(&pers) } else { 0.0 }
    }

    fn peg(&self, per: f64) -> f64 {
        let growth = self.eps_growth();
        if growth == 0.0 { 0.0 } else { per / growth }
    }

    pub fn peg_current_per(&self) -> f64 {
        self.peg(self.stock.per)
    }

    pub fn peg_mean_per(&self) -> f64 {
        self.peg(self.mean_per())
    }

    // ── Quality ───────────────────────────────────────────────────────────────

    pub fn fscore(&self, year: i32) -> FScore {
        // A missing cell counts as a distinct value, so it breaks the streak.
        let issued = &self.stock.tis;
        let no_dilution = issued.len() > 2 && issued.iter().all(|v| *v == issued[0]);
        let positive = |field| self.value_in(field, year).is_some_and(|v| v > 0.0);

        FScore {
            total_issued_stock: u8::from(no_dilution),
            profitable: u8::from(positive(SeriesField::NetProfit)),
            cfo: u8::from(positive(SeriesField::Cfo)),
        }
    }

    /// F-Score for every year that has a net-profit entry.
    pub fn fscores(&self) -> Vec<(i32, FScore)> {
        if self.stock.nps.is_empty() {
            return Vec::new();
        }
        self.year_stat(SeriesField::NetProfit, false)
            .iter()
            .map(|np| (np.year(), self.fscore(np.year())))
            .collect()
    }

    /// F-Score of the last completed year, or `-1` when that year has no
    /// net-profit figure.
    pub fn latest_fscore(&self) -> i32 {
        let last_year = self.last_year();
        if self.stock.nps.is_empty() || self.value_in(SeriesField::NetProfit, last_year).is_none() {
            return -1;
        }
        self.fscore(last_year).total()
    }

    /// Gross profit over total assets.
    pub fn gpa(&self, year: i32) -> Option<f64> {
        let gross_profit = pair_value(&self.stock.gps, year)?;
        if self.stock.tas.is_empty() {
            return None;
        }
        let total_assets = self.value_in(SeriesField::TotalAssets, year)?;
        if total_assets == 0.0 {
            return None;
        }
        Some(gross_profit / total_assets)
    }

    pub fn last_year_gpa(&self) -> Option<f64> {
        self.gpa(self.last_year())
    }

    pub fn mean_roic(&self) -> f64 {
        let last_year = self.last_year();
        let roics: Vec<f64> = self
            .stock
            .roics
            .iter()
            .filter(|r| r.year() <= last_year)
            .filter_map(YearValue::value)
            .collect();
        mean_or_zero(&roics)
    }

    // ── Liquidity and price multiples ─────────────────────────────────────────

    pub fn current_ratio(&self, year: i32) -> f64 {
        let assets = pair_value(&self.stock.current_assets, year).unwrap_or(0.0);
        match pair_value(&self.stock.current_liability, year) {
            Some(liability) if liability != 0.0 => assets / liability * 100.0,
            _ => 0.0,
        }
    }

    pub fn last_year_current_ratio(&self) -> f64 {
        self.current_ratio(self.last_year())
    }

    /// Net current asset value: current assets minus total liabilities.
    pub fn ncav(&self) -> f64 {
        let last_year = self.last_year();
        pair_value(&self.stock.current_assets, last_year).unwrap_or(0.0)
            - pair_value(&self.stock.total_liability, last_year).unwrap_or(0.0)
    }

    pub fn ncav_ratio(&self) -> f64 {
        if self.stock.agg_value == 0.0 {
            return 0.0;
        }
        self.ncav() / self.stock.agg_value * 100.0
    }

    pub fn last_year_pcr(&self) -> f64 {
        pair_value(&self.stock.pcrs, self.last_year()).unwrap_or(0.0)
    }

    pub fn last_year_psr(&self) -> f64 {
        pair_value(&self.stock.psrs, self.last_year()).unwrap_or(0.0)
    }

    /// Market cap over last year's free cash flow.
    pub fn pfr(&self) -> f64 {
        if self.stock.fcfs.is_empty() {
            return 0.0;
        }
        match self.value_in(SeriesField::Fcf, self.last_year()) {
            Some(fcf) if fcf > 0.0 => self.stock.agg_value / fcf,
            _ => 0.0,
        }
    }

    /// Most recent reported (non-estimated) quarterly ROE.
    pub fn latest_quarter_roe(&self) -> Option<f64> {
        self.stock
            .qroes
            .iter()
            .filter_map(|QuarterValue(quarter, value)| Some((quarter.as_ref()?, value.as_ref()?)))
            .filter(|(quarter, _)| !quarter.estimated)
            .max_by_key(|(quarter, _)| (quarter.year, quarter.number))
            .map(|(_, value)| *value)
    }

    pub fn has_note(&self) -> bool {
        !self.stock.note.trim().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::Calendar;
    use crate::models::Quarter;
    use approx::assert_abs_diff_eq;

    const LAST_YEAR: i32 = 2023;

    fn engine() -> Engine {
        Engine::with_calendar(Calendar::from_last_year(LAST_YEAR))
    }

    fn series(values: &[f64]) -> Vec<Option<f64>> {
        values.iter().map(|v| Some(*v)).collect()
    }

    /// bps=1000, ROEs=[11, 8, 15, 10], last_year_index=2, dividend_rate=4.5
    fn snowball() -> StockRecord {
        let mut s = StockRecord::new("0001");
        s.bps = 1000.0;
        s.roes = series(&[11.0, 8.0, 15.0, 10.0]);
        s.last_year_index = Some(2);
        s.dividend_rate = 4.5;
        s
    }

    #[test]
    fn test_dividend_tax_adjust() {
        let e = engine();
        let mut s = StockRecord::new("0001");
        assert_eq!(e.view(&s).unwrap().dividend_tax_adjust(), 0.0);

        s.dividend_rate = 3.5;
        assert_abs_diff_eq!(e.view(&s).unwrap().dividend_tax_adjust(), 0.539, epsilon = 1e-9);
    }

    #[test]
    fn test_last_four_years_roe_window() {
        let e = engine();
        let mut s = StockRecord::new("0001");
        s.roes = series(&[3.0, 5.0, 4.0, 10.0]);

        s.last_year_index = Some(2);
        assert_eq!(e.view(&s).unwrap().last_four_years_roe(), vec![3.0, 5.0, 4.0]);

        s.last_year_index = Some(3);
        assert_eq!(e.view(&s).unwrap().last_four_years_roe(), vec![3.0, 5.0, 4.0, 10.0]);

        s.last_year_index = Some(0);
        assert_eq!(e.view(&s).unwrap().last_four_years_roe(), vec![3.0]);
    }

    #[test]
    fn test_mean_roe_skips_nulls() {
        let e = engine();
        let mut s = StockRecord::new("0001");
        s.roes = vec![Some(3.0), Some(5.0), None, Some(10.0)];
        s.last_year_index = Some(3);
        let v = e.view(&s).unwrap();
        assert_eq!(v.countable(SeriesField::Roe), vec![3.0, 5.0, 10.0]);
        assert_abs_diff_eq!(v.mean_roe(), 6.0, epsilon = 1e-9);

        let empty = StockRecord::new("0002");
        assert_eq!(e.view(&empty).unwrap().mean_roe(), 0.0);
    }

    #[test]
    fn test_future_roe() {
        let e = engine();
        let mut s = snowball();
        s.dividend_rate = 0.0;
        let v = e.view(&s).unwrap();
        assert_eq!(v.future_roe(), v.mean_roe());

        let s = snowball();
        let v = e.view(&s).unwrap();
        assert_abs_diff_eq!(v.dividend_tax_adjust(), 0.693, epsilon = 1e-9);
        assert_abs_diff_eq!(v.future_roe(), 10.64, epsilon = 0.01);
    }

    #[test]
    fn test_calc_future_bps() {
        let e = engine();
        let mut s = snowball();
        {
            let v = e.view(&s).unwrap();
            assert_eq!(v.calc_future_bps(1), 1106);
            assert_eq!(v.calc_future_bps(10), 2748);
        }

        s.adjusted_future_roe = 12.0;
        let v = e.view(&s).unwrap();
        assert_eq!(v.calc_future_bps(6), 1973);
        assert_eq!(v.calc_future_bps(10), 3105);
    }

    #[test]
    fn test_not_calculable_projects_nothing() {
        let e = engine();
        let mut s = snowball();
        s.bps = 0.0;
        let v = e.view(&s).unwrap();
        assert!(!v.calculable());
        assert_eq!(v.calc_future_bps(10), 0);
        assert_eq!(v.invest_price(), 0);

        let mut s = snowball();
        s.roes = series(&[-5.0, -3.0, -1.0]);
        assert!(!e.view(&s).unwrap().calculable());
    }

    #[test]
    fn test_expected_rate() {
        let e = engine();
        let mut s = snowball();
        for (price, expected) in [(1200.0, 8.63), (1000.0, 10.63), (800.0, 13.13)] {
            s.current_price = price;
            assert_abs_diff_eq!(e.view(&s).unwrap().expected_rate(), expected, epsilon = 0.05);
        }
    }

    #[test]
    fn test_expected_rate_at_price_matches_current_price() {
        let e = engine();
        let mut s = snowball();
        s.current_price = 1200.0;
        let v = e.view(&s).unwrap();
        assert_eq!(v.expected_rate_at_price(1200.0), v.expected_rate());
        assert!(v.expected_rate_at_price(800.0) > v.expected_rate());
    }

    #[test]
    fn test_expected_rate_negative_future_value_is_zero() {
        let e = engine();
        let mut s = snowball();
        s.current_price = 1200.0;
        s.pbr = -1.0;
        let v = e.view(&s).unwrap();
        assert!(v.calc_future_price_current_pbr(10) < 0);
        assert_eq!(v.expected_rate_by_current_pbr(), 0.0);
    }

    #[test]
    fn test_invest_price() {
        let e = engine();
        let mut s = snowball();
        assert_eq!(e.view(&s).unwrap().invest_price(), 679);
        s.bps = 1800.0;
        assert_eq!(e.view(&s).unwrap().invest_price(), 1222);
        s.roes = series(&[15.0, 18.0, 20.0, 22.0]);
        assert_eq!(e.view(&s).unwrap().invest_price(), 2133);
    }

    #[test]
    fn test_expected_rate_by_current_pbr() {
        let e = engine();
        let mut s = snowball();
        s.current_price = 1200.0;
        s.pbr = 1.2;
        let v = e.view(&s).unwrap();
        assert_eq!(v.calc_future_price_current_pbr(1), 1327);
        assert_abs_diff_eq!(v.expected_rate_by_current_pbr(), 10.63, epsilon = 0.05);
    }

    #[test]
    fn test_low_pbr_ignores_future_and_zero() {
        let e = engine();
        let mut s = snowball();
        s.current_price = 1200.0;
        s.pbrs = series(&[1.0, 0.8, 0.7, 0.5]);
        assert_eq!(e.view(&s).unwrap().low_pbr(), 0.7);
        assert_eq!(e.view(&s).unwrap().high_pbr(), 1.0);

        s.pbrs = series(&[0.0, 0.8, 0.7, 0.5]);
        let v = e.view(&s).unwrap();
        assert_eq!(v.low_pbr(), 0.7);
        assert_eq!(v.calc_future_price_low_pbr(1), 774);
        assert_abs_diff_eq!(v.expected_rate_by_low_pbr(), 4.82, epsilon = 0.05);

        s.pbrs = series(&[0.0, 0.0]);
        assert_eq!(e.view(&s).unwrap().low_pbr(), 0.0);
        assert_eq!(e.view(&s).unwrap().high_pbr(), 0.0);
    }

    #[test]
    fn test_expected_rate_by_mid_pbr() {
        let e = engine();
        let mut s = snowball();
        s.pbrs = series(&[0.0, 0.8, 0.7, 0.5]);
        s.current_price = 1200.0;
        s.pbr = 0.9;
        let v = e.view(&s).unwrap();
        assert_abs_diff_eq!(v.mid_pbr(), 0.8, epsilon = 1e-9);
        assert_abs_diff_eq!(v.expected_rate_by_mid_pbr(), 6.23, epsilon = 0.05);
    }

    #[test]
    fn test_five_years_record_low() {
        let e = engine();
        let mut s = snowball();
        s.pbrs = series(&[1.0, 0.8, 0.7, 0.5]);
        s.pbr = 0.6;
        assert!(e.view(&s).unwrap().is_five_years_record_low());
        s.pbr = 0.9;
        assert!(!e.view(&s).unwrap().is_five_years_record_low());
    }

    #[test]
    fn test_adjusted_eps() {
        let e = engine();
        let mut s = StockRecord::new("0001");
        assert_eq!(e.view(&s).unwrap().adjusted_eps(), 0);

        s.epss = series(&[1000.0, 1500.0]);
        s.last_year_index = Some(2);
        assert_eq!(e.view(&s).unwrap().adjusted_eps(), 0);

        s.epss = series(&[1000.0, 1500.0, 2000.0]);
        assert_eq!(e.view(&s).unwrap().adjusted_eps(), 1666);

        // Consensus EPS after last year does not count.
        s.epss = series(&[1000.0, 1500.0, 2000.0, 9000.0]);
        assert_eq!(e.view(&s).unwrap().adjusted_eps(), 1666);
    }

    #[test]
    fn test_intrinsic_value_and_discount() {
        let e = engine();
        let mut s = StockRecord::new("0001");
        s.bps = 1000.0;
        s.epss = series(&[100.0, 150.0, 200.0]);
        s.last_year_index = Some(2);
        s.current_price = 1200.0;
        let v = e.view(&s).unwrap();
        assert_eq!(v.adjusted_eps(), 166);
        assert_eq!(v.intrinsic_value(), 1330);
        assert_abs_diff_eq!(v.intrinsic_discount_rate(), 10.83, epsilon = 0.01);
    }

    #[test]
    fn test_eps_growth_and_peg() {
        let e = engine();
        let mut s = StockRecord::new("0001");
        s.last_year_index = Some(2);
        assert_eq!(e.view(&s).unwrap().eps_growth(), 0.0);
        assert_eq!(e.view(&s).unwrap().peg_current_per(), 0.0);

        s.epss = series(&[100.0, 150.0, 200.0]);
        assert_abs_diff_eq!(e.view(&s).unwrap().eps_growth(), 41.66, epsilon = 0.01);

        s.per = 6.0;
        s.epss = series(&[100.0, 110.0, 130.0]);
        assert_abs_diff_eq!(e.view(&s).unwrap().peg_current_per(), 0.42, epsilon = 0.01);
        s.per = 10.0;
        assert_abs_diff_eq!(e.view(&s).unwrap().peg_current_per(), 0.70, epsilon = 0.01);

        s.epss = series(&[0.0, 110.0, 130.0]);
        assert_eq!(e.view(&s).unwrap().eps_growth(), 0.0);
    }

    #[test]
    fn test_mean_per_and_peg_mean_per() {
        let e = engine();
        let mut s = StockRecord::new("0001");
        s.last_year_index = Some(2);
        assert_eq!(e.view(&s).unwrap().mean_per(), 0.0);

        s.pers = series(&[8.0, 5.5, 11.5]);
        assert_abs_diff_eq!(e.view(&s).unwrap().mean_per(), 8.33, epsilon = 0.01);

        s.epss = series(&[100.0, 110.0, 130.0]);
        assert_abs_diff_eq!(e.view(&s).unwrap().peg_mean_per(), 0.59, epsilon = 0.01);
    }

    #[test]
    fn test_roe_max_diff() {
        let e = engine();
        let mut s = StockRecord::new("0001");
        assert_eq!(e.view(&s).unwrap().roe_max_diff(), 0.0);

        s.roes = series(&[10.0, 5.0]);
        s.last_year_index = Some(1);
        assert_eq!(e.view(&s).unwrap().roe_max_diff(), 0.0);

        s.roes = series(&[10.0, 5.0, 11.0]);
        s.last_year_index = Some(2);
        assert_eq!(e.view(&s).unwrap().roe_max_diff(), 6.0);
        assert_eq!(e.view(&s).unwrap().last_four_years_roe_max_diff(), 6.0);
    }

    #[test]
    fn test_fscore() {
        let e = engine();
        let mut s = StockRecord::new("0001");
        s.last_year_index = Some(2);
        s.tis = series(&[100.0, 100.0, 100.0]);
        s.nps = series(&[10.0, -5.0, 20.0]);
        s.cfos = series(&[1.0, 2.0, 3.0]);
        let v = e.view(&s).unwrap();

        assert_eq!(v.fscore(LAST_YEAR), FScore { total_issued_stock: 1, profitable: 1, cfo: 1 });
        assert_eq!(v.fscore(LAST_YEAR - 1), FScore { total_issued_stock: 1, profitable: 0, cfo: 1 });
        assert_eq!(v.latest_fscore(), 3);
        assert_eq!(v.fscores().len(), 3);

        s.tis = series(&[100.0, 120.0, 120.0]);
        assert_eq!(e.view(&s).unwrap().latest_fscore(), 2);
    }

    #[test]
    fn test_fscore_missing_issued_stock_breaks_streak() {
        let e = engine();
        let mut s = StockRecord::new("0001");
        s.last_year_index = Some(3);
        s.nps = series(&[1.0, 1.0, 1.0, 1.0]);
        s.cfos = series(&[1.0, 1.0, 1.0, 1.0]);

        s.tis = vec![Some(100.0), Some(100.0), Some(100.0), None];
        assert_eq!(e.view(&s).unwrap().fscore(LAST_YEAR).total_issued_stock, 0);

        s.tis = vec![Some(100.0), Some(100.0), Some(100.0), Some(100.0)];
        assert_eq!(e.view(&s).unwrap().fscore(LAST_YEAR).total_issued_stock, 1);
    }

    #[test]
    fn test_latest_fscore_unknown_is_minus_one() {
        let e = engine();
        let mut s = StockRecord::new("0001");
        s.last_year_index = Some(2);
        s.cfos = series(&[1.0, 2.0, 3.0]);
        assert_eq!(e.view(&s).unwrap().latest_fscore(), -1);

        s.nps = vec![Some(1.0), Some(2.0), None];
        assert_eq!(e.view(&s).unwrap().latest_fscore(), -1);

        // A genuine zero is not the unknown sentinel.
        s.nps = series(&[1.0, 2.0, -3.0]);
        s.cfos = series(&[1.0, 2.0, -3.0]);
        assert_eq!(e.view(&s).unwrap().latest_fscore(), 0);
    }

    #[test]
    fn test_gpa() {
        let e = engine();
        let mut s = StockRecord::new("0001");
        s.last_year_index = Some(1);
        s.gps = vec![YearValue(2022, Some(50.0)), YearValue(2023, Some(60.0))];
        s.tas = series(&[500.0, 600.0]);
        let v = e.view(&s).unwrap();
        assert_abs_diff_eq!(v.gpa(2023).unwrap(), 0.1, epsilon = 1e-12);
        assert_eq!(v.last_year_gpa(), v.gpa(2023));
        assert_eq!(v.gpa(2021), None);

        s.gps = vec![YearValue(2023, None)];
        assert_eq!(e.view(&s).unwrap().last_year_gpa(), None);
    }

    #[test]
    fn test_consensus_roe() {
        let e = engine();
        let s = snowball();
        let v = e.view(&s).unwrap();
        assert_eq!(v.consensus_roes(), vec![10.0]);
        assert!(v.has_consensus());
        assert!(!v.is_positive_consensus_roe());

        let mut s = snowball();
        s.roes = series(&[11.0, 8.0, 15.0, 20.0]);
        assert!(e.view(&s).unwrap().is_positive_consensus_roe());

        s.roes = series(&[11.0, 8.0, 15.0]);
        let v = e.view(&s).unwrap();
        assert!(!v.has_consensus());
        assert!(!v.is_positive_consensus_roe());
    }

    #[test]
    fn test_liquidity() {
        let e = engine();
        let mut s = StockRecord::new("0001");
        s.agg_value = 1000.0;
        s.current_assets = vec![YearValue(LAST_YEAR, Some(300.0))];
        s.current_liability = vec![YearValue(LAST_YEAR, Some(150.0))];
        s.total_liability = vec![YearValue(LAST_YEAR, Some(200.0))];
        let v = e.view(&s).unwrap();
        assert_abs_diff_eq!(v.last_year_current_ratio(), 200.0, epsilon = 1e-9);
        assert_abs_diff_eq!(v.ncav(), 100.0, epsilon = 1e-9);
        assert_abs_diff_eq!(v.ncav_ratio(), 10.0, epsilon = 1e-9);

        s.current_liability = vec![YearValue(LAST_YEAR, Some(0.0))];
        s.agg_value = 0.0;
        let v = e.view(&s).unwrap();
        assert_eq!(v.last_year_current_ratio(), 0.0);
        assert_eq!(v.ncav_ratio(), 0.0);
    }

    #[test]
    fn test_price_multiples() {
        let e = engine();
        let mut s = StockRecord::new("0001");
        s.last_year_index = Some(1);
        s.agg_value = 4000.0;
        s.fcfs = series(&[100.0, 200.0]);
        s.pcrs = vec![YearValue(LAST_YEAR, Some(5.5))];
        s.roics = vec![YearValue(LAST_YEAR - 1, Some(8.0)), YearValue(LAST_YEAR, Some(12.0)), YearValue(LAST_YEAR + 1, Some(30.0))];
        let v = e.view(&s).unwrap();
        assert_abs_diff_eq!(v.pfr(), 20.0, epsilon = 1e-9);
        assert_eq!(v.last_year_pcr(), 5.5);
        assert_eq!(v.last_year_psr(), 0.0);
        assert_abs_diff_eq!(v.mean_roic(), 10.0, epsilon = 1e-9);

        s.fcfs = series(&[100.0, -200.0]);
        assert_eq!(e.view(&s).unwrap().pfr(), 0.0);
    }

    #[test]
    fn test_latest_quarter_roe() {
        let e = engine();
        let q = |year, number, estimated| Quarter { year, number, estimated };
        let mut s = StockRecord::new("0001");
        assert_eq!(e.view(&s).unwrap().latest_quarter_roe(), None);

        s.qroes = vec![
            QuarterValue(Some(q(2023, 3, false)), Some(5.0)),
            QuarterValue(Some(q(2023, 4, false)), Some(6.0)),
            QuarterValue(Some(q(2024, 1, true)), Some(7.0)),
        ];
        assert_eq!(e.view(&s).unwrap().latest_quarter_roe(), Some(6.0));

        s.qroes.push(QuarterValue(None, Some(9.0)));
        assert_eq!(e.view(&s).unwrap().latest_quarter_roe(), Some(6.0));
    }
}
