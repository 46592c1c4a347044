use crate::engine::{Calendar, DIVIDEND_TAX_RATE, Engine, EngineParams, FUTURE, TARGET_RATE};
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Top-level application configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AppConfig {
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
}

/// Storage configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,

    #[serde(default = "default_true")]
    pub run_migrations: bool,
}

/// Valuation model parameters
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EngineConfig {
    #[serde(default = "default_dividend_tax_rate")]
    pub dividend_tax_rate: f64,

    #[serde(default = "default_future_years")]
    pub future_years: u32,

    #[serde(default = "default_target_rate")]
    pub target_rate: f64,

    /// Latest completed fiscal year. Defaults to the wall-clock year - 1.
    #[serde(default)]
    pub last_year: Option<i32>,
}

/// Pipeline configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PipelineConfig {
    #[serde(default = "default_source_dir")]
    pub source_dir: PathBuf,

    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    #[serde(default = "default_true")]
    pub update_ranks: bool,
}

// ── Defaults ─────────────────────────────────────────────────────────────────

fn default_db_path() -> PathBuf {
    PathBuf::from("data/snowball.duckdb")
}
fn default_true() -> bool {
    true
}
fn default_dividend_tax_rate() -> f64 {
    DIVIDEND_TAX_RATE
}
fn default_future_years() -> u32 {
    FUTURE
}
fn default_target_rate() -> f64 {
    TARGET_RATE
}
fn default_source_dir() -> PathBuf {
    PathBuf::from("data/stocks")
}
fn default_concurrency() -> usize {
    4
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            run_migrations: true,
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            dividend_tax_rate: default_dividend_tax_rate(),
            future_years: default_future_years(),
            target_rate: default_target_rate(),
            last_year: None,
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            source_dir: default_source_dir(),
            concurrency: default_concurrency(),
            update_ranks: true,
        }
    }
}

impl EngineConfig {
    pub fn calendar(&self) -> Calendar {
        match self.last_year {
            Some(year) => Calendar::from_last_year(year),
            None => Calendar::current(),
        }
    }

    pub fn params(&self) -> EngineParams {
        EngineParams {
            dividend_tax_rate: self.dividend_tax_rate,
            future_years: self.future_years,
            target_rate: self.target_rate,
        }
    }

    /// Resolve the calendar once and build the engine every command shares.
    pub fn build(&self) -> Engine {
        Engine::new(self.calendar(), self.params())
    }
}

// ── Loader ───────────────────────────────────────────────────────────────────

impl AppConfig {
    /// Load configuration from file + environment overrides
    pub fn load() -> Result<Self> {
        dotenv::dotenv().ok();

        let cfg = config::Config::builder()
            .add_source(
                config::File::with_name("config/default")
                    .required(false)
                    .format(config::FileFormat::Toml),
            )
            .add_source(
                config::File::with_name("config/local")
                    .required(false)
                    .format(config::FileFormat::Toml),
            )
            .add_source(config::Environment::with_prefix("SNOWBALL").separator("__"))
            .build()?;

        let app_cfg: AppConfig = cfg.try_deserialize().unwrap_or_else(|_| AppConfig::default());
        Ok(app_cfg)
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            storage: StorageConfig::default(),
            engine: EngineConfig::default(),
            pipeline: PipelineConfig::default(),
        }
    }
}
