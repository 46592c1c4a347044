//! Batch refresh: fetch → merge-upsert → fill → ranks.
//!
//! Documents are fetched concurrently, bounded by `pipeline.concurrency`.
//! The DuckDB connection stays on the calling task, so every write happens
//! sequentially once the fetches are in. A failed fetch leaves the stored
//! document untouched.

use crate::config::PipelineConfig;
use crate::service::SnowballService;
use crate::source::FundamentalsSource;
use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{error, info, warn};

pub struct Pipeline<S> {
    source: Arc<S>,
    config: PipelineConfig,
}

impl<S: FundamentalsSource + 'static> Pipeline<S> {
    pub fn new(source: S, config: PipelineConfig) -> Self {
        Self { source: Arc::new(source), config }
    }

    pub async fn run(&self, service: &SnowballService, codes: &[String]) -> Result<PipelineStats> {
        // ── 1. Fetch ──────────────────────────────────────────────────────────
        info!("=== Step 1: Fetching {} documents ===", codes.len());

        let sem = Arc::new(Semaphore::new(self.config.concurrency.max(1)));
        let mut handles = Vec::new();

        for code in codes {
            let task_code = code.clone();
            let source = Arc::clone(&self.source);
            let sem = Arc::clone(&sem);

            let handle = tokio::spawn(async move {
                let _permit = sem.acquire().await?;
                source
                    .fetch_document(&task_code)
                    .await
                    .with_context(|| format!("fetch_document({})", task_code))
            });

            handles.push((code.clone(), handle));
        }

        // ── 2. Merge-upsert ───────────────────────────────────────────────────
        let mut saved = Vec::new();
        let mut failed = 0usize;

        for (code, handle) in handles {
            let patch = match handle.await {
                Ok(Ok(patch)) => patch,
                Ok(Err(e)) => {
                    warn!("{}: {:#}", code, e);
                    failed += 1;
                    continue;
                }
                Err(e) => {
                    error!("Task panic for {}: {}", code, e);
                    failed += 1;
                    continue;
                }
            };
            match service.repo().upsert_by_code(&patch) {
                Ok(stock) => {
                    info!("{}: {} fields", stock, patch.field_count());
                    saved.push(code);
                }
                Err(e) => {
                    warn!("{}: {:#}", code, e);
                    failed += 1;
                }
            }
        }

        // ── 3. Fill ───────────────────────────────────────────────────────────
        info!("=== Step 2: Filling {} stocks ===", saved.len());
        let mut filled = 0usize;
        for code in &saved {
            match service.recompute_and_persist(code) {
                Ok(Some(_)) => filled += 1,
                Ok(None) => {}
                Err(e) => warn!("fill {}: {:#}", code, e),
            }
        }

        // ── 4. Ranks ──────────────────────────────────────────────────────────
        let ranked = if self.config.update_ranks && !saved.is_empty() {
            info!("=== Step 3: Updating ranks ===");
            service.recompute_ranks().context("rank update failed")?
        } else {
            0
        };

        let stats = PipelineStats {
            requested: codes.len(),
            saved: saved.len(),
            failed,
            filled,
            ranked,
        };
        info!(
            "=== Done: {} requested | {} saved | {} failed | {} filled | {} ranked ===",
            stats.requested, stats.saved, stats.failed, stats.filled, stats.ranked,
        );

        Ok(stats)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PipelineStats {
    pub requested: usize,
    pub saved: usize,
    pub failed: usize,
    pub filled: usize,
    pub ranked: usize,
}
