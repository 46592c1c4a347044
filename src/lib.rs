//! Value-investing screener: year-aligned fundamentals, a compounding-ROE
//! valuation model, filters, cross-sectional ranks and a DuckDB store.

pub mod config;
pub mod engine;
pub mod error;
pub mod filter;
pub mod history;
pub mod loader;
pub mod metrics;
pub mod models;
pub mod pipeline;
pub mod query;
pub mod rank;
pub mod service;
pub mod source;
pub mod storage;
pub mod utils;
