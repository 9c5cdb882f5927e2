//! # Night Session Loop
//! Time-boxed repeating fetch: Reddit, a courtesy pause, Instagram, then
//! sleep until the next cycle, until the wall-clock deadline passes. A
//! failed cycle pauses for a recovery interval and the loop carries on;
//! only the deadline ends a session.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use metrics::counter;
use tokio::time::Instant;
use tracing::{error, info};

use crate::ingest::{Harvester, SourcePlan};
use crate::pool::WorkerPool;

#[derive(Debug, Clone, Copy)]
pub struct SessionConfig {
    pub duration: Duration,
    /// Sleep between cycles.
    pub interval: Duration,
    /// Courtesy pause between the two sources inside one cycle.
    pub source_pause: Duration,
    /// Pause after a failed cycle before re-checking the deadline.
    pub recovery: Duration,
}

pub struct NightSession {
    cfg: SessionConfig,
    harvester: Arc<Harvester>,
    reddit: Arc<SourcePlan>,
    instagram: Arc<SourcePlan>,
    pool: Arc<WorkerPool>,
}

impl NightSession {
    pub fn new(
        cfg: SessionConfig,
        harvester: Arc<Harvester>,
        reddit: Arc<SourcePlan>,
        instagram: Arc<SourcePlan>,
        pool: Arc<WorkerPool>,
    ) -> Self {
        Self {
            cfg,
            harvester,
            reddit,
            instagram,
            pool,
        }
    }

    pub async fn run(&self) {
        let end = Instant::now() + self.cfg.duration;
        info!(
            duration_secs = self.cfg.duration.as_secs(),
            interval_secs = self.cfg.interval.as_secs(),
            "night session started"
        );

        while Instant::now() < end {
            match self.run_cycle().await {
                Ok(()) => {
                    counter!("night_cycles_total").increment(1);
                    info!(
                        interval_secs = self.cfg.interval.as_secs(),
                        "fetch cycle complete, waiting until next cycle"
                    );
                    tokio::time::sleep(self.cfg.interval).await;
                }
                Err(e) => {
                    counter!("night_cycle_errors_total").increment(1);
                    error!(
                        error = format!("{e:#}"),
                        recovery_secs = self.cfg.recovery.as_secs(),
                        "error in fetch cycle, pausing before retry"
                    );
                    tokio::time::sleep(self.cfg.recovery).await;
                }
            }
        }

        info!("night session ended");
    }

    /// Reddit is always attempted before Instagram; deterministic ordering
    /// keeps per-source pacing simple.
    async fn run_cycle(&self) -> Result<()> {
        self.fetch_via_pool(&self.reddit).await?;
        tokio::time::sleep(self.cfg.source_pause).await;
        self.fetch_via_pool(&self.instagram).await?;
        Ok(())
    }

    async fn fetch_via_pool(&self, plan: &Arc<SourcePlan>) -> Result<()> {
        let harvester = self.harvester.clone();
        let plan = plan.clone();
        let source = plan.adapter.name();
        let rx = self
            .pool
            .submit(async move { harvester.run_source(&plan).await })?;
        let stats = rx.await.context("fetch task dropped before completion")?;
        info!(
            source,
            inserted = stats.inserted,
            duplicates = stats.duplicates,
            "source fetch completed"
        );
        Ok(())
    }
}
