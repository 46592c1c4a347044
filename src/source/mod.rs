use crate::loader::parse_document;
use crate::models::StockPatch;
use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use std::path::PathBuf;
use tracing::debug;

// ── Source trait ──────────────────────────────────────────────────────────────

/// Swappable fundamentals source.
///
/// Implementations return whatever fields they managed to collect for one
/// stock. A failure leaves the stored document untouched.
#[async_trait]
pub trait FundamentalsSource: Send + Sync {
    async fn fetch_document(&self, code: &str) -> Result<StockPatch>;
}

// ── JSON directory ────────────────────────────────────────────────────────────

/// Reads scraped documents laid out as `<dir>/<code>.json`.
pub struct JsonDirSource {
    dir: PathBuf,
}

impl JsonDirSource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path_for(&self, code: &str) -> PathBuf {
        self.dir.join(format!("{}.json", code))
    }
}

#[async_trait]
impl FundamentalsSource for JsonDirSource {
    async fn fetch_document(&self, code: &str) -> Result<StockPatch> {
        let path = self.path_for(code);
        debug!("Reading document: {:?}", path);

        let text = tokio::fs::read_to_string(&path)
            .await
            .with_context(|| format!("No document for {} at {:?}", code, path))?;

        let patch = parse_document(&text, Some(code)).with_context(|| format!("Bad document {:?}", path))?;
        if patch.code() != code {
            bail!("{:?} carries code {} instead of {}", path, patch.code(), code);
        }
        Ok(patch)
    }
}
