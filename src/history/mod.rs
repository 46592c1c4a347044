//! Historical expected rate from a daily price history, and a simple
//! buy/sell simulation on top of it.

use crate::engine::StockView;
use crate::loader::PricePoint;
use crate::models::SeriesField;
use crate::utils::mean_or_zero;
use chrono::{Datelike, NaiveDate};
use serde::Serialize;
use std::collections::HashMap;

/// Lowest expected rate that may trigger a buy.
pub const BUY_FLOOR_RATE: f64 = 13.5;
/// Sell once the expected rate fell this many points below the buy.
pub const SELL_RATE_DROP: f64 = 1.2;
/// Sell once the price gained this fraction over the buy price.
pub const TAKE_PROFIT: f64 = 0.13;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Record {
    pub date: NaiveDate,
    pub price: f64,
    pub expected_rate: f64,
    pub bps: f64,
    pub future_roe: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct YearStat {
    pub year: i32,
    pub high_price: f64,
    pub low_price: f64,
    pub high_expected_rate: f64,
    pub low_expected_rate: f64,
    pub bps: f64,
    pub future_roe: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Event {
    pub date: NaiveDate,
    pub record: Record,
    pub buy: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct YearHistory {
    pub stat: YearStat,
    pub records: Vec<Record>,
    pub events: Vec<Event>,
}

/// Expected rate as it would have read on `date` at `price`.
///
/// `bps` is the book value of the year before `date`. The future ROE is the
/// plain mean of the four ROEs before `date`'s year, without the dividend
/// tax adjustment. Missing BPS or ROE yields a zeroed record.
pub fn make_record(view: &StockView<'_>, date: NaiveDate, price: f64, bps: Option<f64>) -> Record {
    let zero = Record { date, price, expected_rate: 0.0, bps: 0.0, future_roe: 0.0 };
    let bps = match bps {
        Some(b) if b != 0.0 => b,
        _ => return zero,
    };
    let roes = view.four_years_roe(date.year());
    if roes.is_empty() {
        return zero;
    }

    let future_roe = mean_or_zero(&roes);
    let future_bps = |_: &StockView<'_>, years: u32| (bps * (1.0 + future_roe / 100.0).powf(years as f64)) as i64;
    let expected_rate = view.calc_expected_rate(future_bps, view.engine_params().future_years, price);
    Record { date, price, expected_rate, bps, future_roe }
}

/// One record per price point, using the BPS of the preceding year.
pub fn records(view: &StockView<'_>, prices: &[PricePoint]) -> Vec<Record> {
    let bps_by_year: HashMap<i32, f64> = view
        .year_stat(SeriesField::Bps, true)
        .iter()
        .filter_map(|yv| yv.value().map(|v| (yv.year(), v)))
        .collect();

    prices
        .iter()
        .map(|p| make_record(view, p.date, p.price, bps_by_year.get(&(p.date.year() - 1)).copied()))
        .collect()
}

fn make_year_stat(year: i32, records: &[Record]) -> YearStat {
    let fold = |f: fn(&Record) -> f64, pick: fn(f64, f64) -> f64, init: f64| {
        records.iter().map(f).fold(init, pick)
    };
    YearStat {
        year,
        high_price: fold(|r| r.price, f64::max, f64::NEG_INFINITY),
        low_price: fold(|r| r.price, f64::min, f64::INFINITY),
        high_expected_rate: fold(|r| r.expected_rate, f64::max, f64::NEG_INFINITY),
        low_expected_rate: fold(|r| r.expected_rate, f64::min, f64::INFINITY),
        bps: records[0].bps,
        future_roe: records[0].future_roe,
    }
}

/// Group consecutive records by calendar year.
pub fn records_by_year(records: &[Record]) -> Vec<(YearStat, Vec<Record>)> {
    records
        .chunk_by(|a, b| a.date.year() == b.date.year())
        .map(|chunk| (make_year_stat(chunk[0].date.year(), chunk), chunk.to_vec()))
        .collect()
}

/// Replay the buy/sell rule over the grouped records.
pub fn simulate(by_year: &[(YearStat, Vec<Record>)]) -> Vec<Event> {
    let mut events = Vec::new();
    let mut holding: Option<Record> = None;

    for (stat, records) in by_year {
        let threshold = ((stat.high_expected_rate + stat.low_expected_rate) / 2.0).max(BUY_FLOOR_RATE);
        for r in records {
            if holding.is_none() && r.expected_rate >= threshold {
                holding = Some(*r);
                events.push(Event { date: r.date, record: *r, buy: true });
            }
            if let Some(bought) = holding {
                let rate_dropped = bought.expected_rate - r.expected_rate >= SELL_RATE_DROP;
                let took_profit = bought.price * (1.0 + TAKE_PROFIT) <= r.price;
                if rate_dropped || took_profit {
                    events.push(Event { date: r.date, record: *r, buy: false });
                    holding = None;
                }
            }
        }
    }
    events
}

/// Full per-year history with the simulated events of each year.
pub fn history(view: &StockView<'_>, prices: &[PricePoint]) -> Vec<YearHistory> {
    let by_year = records_by_year(&records(view, prices));
    let events = simulate(&by_year);
    by_year
        .into_iter()
        .map(|(stat, records)| YearHistory {
            stat,
            records,
            events: events.iter().filter(|e| e.date.year() == stat.year).copied().collect(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{Calendar, Engine};
    use crate::models::StockRecord;
    use approx::assert_abs_diff_eq;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn stock() -> StockRecord {
        let mut s = StockRecord::new("0001");
        s.roes = vec![Some(11.0), Some(8.0), Some(15.0), Some(10.0)];
        s.bpss = vec![Some(900.0), Some(950.0), Some(1000.0), Some(1100.0)];
        s.last_year_index = Some(2);
        s
    }

    fn record(d: NaiveDate, price: f64, expected_rate: f64) -> Record {
        Record { date: d, price, expected_rate, bps: 1000.0, future_roe: 10.0 }
    }

    #[test]
    fn test_make_record() {
        let e = Engine::with_calendar(Calendar::from_last_year(2023));
        let s = stock();
        let v = e.view(&s).unwrap();

        let r = make_record(&v, date(2024, 3, 1), 1200.0, Some(1000.0));
        assert_abs_diff_eq!(r.future_roe, 34.0 / 3.0, epsilon = 1e-9);
        assert_abs_diff_eq!(r.expected_rate, 9.32, epsilon = 0.05);

        let no_bps = make_record(&v, date(2024, 3, 1), 1200.0, None);
        assert_eq!(no_bps.expected_rate, 0.0);
        assert_eq!(no_bps.bps, 0.0);

        let no_roe = make_record(&v, date(2010, 3, 1), 1200.0, Some(1000.0));
        assert_eq!(no_roe.future_roe, 0.0);
    }

    #[test]
    fn test_records_use_previous_year_bps() {
        let e = Engine::with_calendar(Calendar::from_last_year(2023));
        let s = stock();
        let v = e.view(&s).unwrap();
        let prices = vec![
            PricePoint { date: date(2023, 6, 1), price: 1000.0 },
            PricePoint { date: date(2024, 6, 1), price: 1000.0 },
        ];

        let rs = records(&v, &prices);
        assert_eq!(rs[0].bps, 950.0);
        assert_eq!(rs[1].bps, 1000.0);
    }

    #[test]
    fn test_records_by_year() {
        let rs = vec![
            record(date(2022, 1, 3), 100.0, 10.0),
            record(date(2022, 6, 1), 120.0, 8.0),
            record(date(2023, 1, 2), 90.0, 14.0),
        ];
        let by_year = records_by_year(&rs);

        assert_eq!(by_year.len(), 2);
        assert_eq!(by_year[0].0.year, 2022);
        assert_eq!(by_year[0].0.high_price, 120.0);
        assert_eq!(by_year[0].0.low_expected_rate, 8.0);
        assert_eq!(by_year[1].1.len(), 1);
    }

    #[test]
    fn test_simulate_sells_on_rate_drop() {
        let rates = [10.0, 14.0, 16.0, 14.5, 12.0];
        let rs: Vec<Record> = rates
            .iter()
            .enumerate()
            .map(|(i, rate)| record(date(2023, 1, i as u32 + 1), 100.0, *rate))
            .collect();

        let events = simulate(&records_by_year(&rs));
        assert_eq!(events.len(), 2);
        assert!(events[0].buy);
        assert_eq!(events[0].record.expected_rate, 14.0);
        assert!(!events[1].buy);
        assert_eq!(events[1].record.expected_rate, 12.0);
    }

    #[test]
    fn test_simulate_takes_profit() {
        let rs = vec![
            record(date(2023, 1, 1), 100.0, 15.0),
            record(date(2023, 1, 2), 105.0, 15.0),
            record(date(2023, 1, 3), 114.0, 15.0),
        ];
        let events = simulate(&records_by_year(&rs));
        assert_eq!(events.len(), 2);
        assert_eq!(events[1].date, date(2023, 1, 3));
    }

    #[test]
    fn test_simulate_floor_blocks_low_rates() {
        let rs = vec![record(date(2023, 1, 1), 100.0, 12.0), record(date(2023, 1, 2), 100.0, 13.0)];
        assert!(simulate(&records_by_year(&rs)).is_empty());
    }
}
