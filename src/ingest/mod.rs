// src/ingest/mod.rs
pub mod circuit;
pub mod dedup;
pub mod providers;
pub mod selector;
pub mod types;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Utc;
use metrics::{counter, describe_counter, describe_gauge, gauge};
use once_cell::sync::OnceCell;
use rand::seq::SliceRandom;
use tracing::{debug, info, warn};

use crate::ingest::circuit::CircuitBreaker;
use crate::ingest::dedup::DedupGuard;
use crate::ingest::types::{CandidateMeme, SourceAdapter, SubSource};
use crate::media::MediaMirror;
use crate::store::{MemeStore, NewMeme, StoreError};

/// One-time metrics registration (so series show up on /metrics).
fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("harvest_runs_total", "Fetch invocations started, per source.");
        describe_counter!("harvest_sweeps_total", "Sweeps over the selected sub-source list.");
        describe_counter!(
            "harvest_items_polled_total",
            "Candidate items parsed out of source polls."
        );
        describe_counter!("harvest_inserted_total", "New memes persisted.");
        describe_counter!(
            "harvest_duplicates_total",
            "Candidates skipped by dedup or store-level uniqueness."
        );
        describe_counter!(
            "harvest_item_errors_total",
            "Single items skipped after a media-copy or insert failure."
        );
        describe_counter!(
            "harvest_sub_sources_banned_total",
            "Sub-sources banned after a permanent error."
        );
        describe_counter!(
            "night_cycle_errors_total",
            "Night session cycles that failed and triggered the recovery pause."
        );
        describe_counter!("night_cycles_total", "Night session fetch cycles completed.");
        describe_gauge!("harvest_last_run_ts", "Unix ts when a fetch invocation last finished.");
        describe_gauge!("night_session_active", "1 while a night session is running.");
        describe_gauge!("scheduler_running", "1 while the recurring trigger is registered.");
    });
}

/// Per-invocation retry budget: sweeps stop at whichever cap hits first.
#[derive(Debug, Clone, Copy)]
pub struct SweepBudget {
    pub max_sweeps: u32,
    pub target_items: u32,
}

/// What to poll for one source: the adapter plus its sub-source pool and
/// per-cycle bounds.
pub struct SourcePlan {
    pub adapter: Arc<dyn SourceAdapter>,
    pub pool: Vec<SubSource>,
    /// How many sub-sources the selector picks per invocation.
    pub per_cycle: usize,
    /// Items inspected per sub-source poll.
    pub poll_limit: usize,
}

/// Counters from one fetch invocation.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct HarvestStats {
    pub inserted: u32,
    pub duplicates: u32,
    pub item_errors: u32,
    pub transient_errors: u32,
    pub banned: u32,
    pub sweeps: u32,
}

/// Runs fetch invocations: selection, sweeps, dedup-before-copy, pacing.
/// Shared by the night session loop and manual triggers; the circuit
/// breaker inside is the only state that outlives an invocation.
pub struct Harvester {
    store: Arc<dyn MemeStore>,
    dedup: DedupGuard,
    media: Arc<dyn MediaMirror>,
    circuit: Arc<CircuitBreaker>,
    budget: SweepBudget,
    pacing: Duration,
}

impl Harvester {
    pub fn new(
        store: Arc<dyn MemeStore>,
        media: Arc<dyn MediaMirror>,
        circuit: Arc<CircuitBreaker>,
        budget: SweepBudget,
        pacing: Duration,
    ) -> Self {
        Self {
            dedup: DedupGuard::new(store.clone()),
            store,
            media,
            circuit,
            budget,
            pacing,
        }
    }

    pub fn circuit(&self) -> &Arc<CircuitBreaker> {
        &self.circuit
    }

    /// One fetch invocation for one source. Never aborts the caller:
    /// everything below cycle level is recovered here (logged, skipped).
    pub async fn run_source(&self, plan: &SourcePlan) -> HarvestStats {
        ensure_metrics_described();
        counter!("harvest_runs_total").increment(1);

        let mut stats = HarvestStats::default();
        let selected = selector::select_sub_sources(&plan.pool, plan.per_cycle, &self.circuit);
        if selected.is_empty() {
            info!(source = plan.adapter.name(), "no eligible sub-sources, skipping invocation");
            return stats;
        }
        debug!(
            source = plan.adapter.name(),
            selected = selected.len(),
            "fetch invocation started"
        );

        while stats.inserted < self.budget.target_items && stats.sweeps < self.budget.max_sweeps {
            let mut order = selected.clone();
            order.shuffle(&mut rand::rng());

            for sub in &order {
                if stats.inserted >= self.budget.target_items {
                    break;
                }
                // A ban from an earlier sweep of this same invocation sticks.
                if self.circuit.is_banned(&sub.name) {
                    continue;
                }

                match plan.adapter.poll(sub, plan.poll_limit).await {
                    Ok(candidates) => {
                        let fresh = self.ingest_batch(&candidates, &mut stats).await;
                        if fresh == 0 {
                            debug!(sub_source = %sub.name, "no new items, moving to next sub-source");
                        } else {
                            info!(
                                sub_source = %sub.name,
                                fresh,
                                total = stats.inserted,
                                "ingested new items"
                            );
                        }
                    }
                    Err(e) if e.is_permanent() => {
                        self.circuit.ban(&sub.name);
                        stats.banned += 1;
                    }
                    Err(e) => {
                        stats.transient_errors += 1;
                        warn!(
                            sub_source = %sub.name,
                            error = %e,
                            "transient poll failure, eligible again next sweep"
                        );
                    }
                }

                // Cooperative pacing toward the source, success or not.
                tokio::time::sleep(self.pacing).await;
            }

            stats.sweeps += 1;
            counter!("harvest_sweeps_total").increment(1);
        }

        gauge!("harvest_last_run_ts").set(Utc::now().timestamp().max(0) as f64);
        info!(
            source = plan.adapter.name(),
            inserted = stats.inserted,
            duplicates = stats.duplicates,
            item_errors = stats.item_errors,
            sweeps = stats.sweeps,
            "fetch invocation finished"
        );
        stats
    }

    async fn ingest_batch(&self, candidates: &[CandidateMeme], stats: &mut HarvestStats) -> u32 {
        let mut fresh = 0u32;
        for candidate in candidates {
            if stats.inserted >= self.budget.target_items {
                break;
            }
            match self.ingest_candidate(candidate).await {
                Ok(true) => {
                    fresh += 1;
                    stats.inserted += 1;
                    counter!("harvest_inserted_total").increment(1);
                }
                Ok(false) => {
                    stats.duplicates += 1;
                    counter!("harvest_duplicates_total").increment(1);
                }
                Err(e) => {
                    stats.item_errors += 1;
                    counter!("harvest_item_errors_total").increment(1);
                    warn!(
                        source_url = %candidate.source_url,
                        error = format!("{e:#}"),
                        "item skipped"
                    );
                }
            }
        }
        fresh
    }

    /// Dedup check first, media copy second, insert last. Returns `Ok(true)`
    /// on a new record, `Ok(false)` for a duplicate (either path).
    async fn ingest_candidate(&self, candidate: &CandidateMeme) -> Result<bool> {
        if !self.dedup.should_ingest(&candidate.source_url).await? {
            return Ok(false);
        }

        let media_url = self
            .media
            .copy_to_storage(&candidate.media_url)
            .await
            .context("media copy failed")?;

        let meme = NewMeme {
            title: candidate.title.clone(),
            media_url,
            source_url: candidate.source_url.clone(),
            category: candidate.category.clone(),
            sub_source: candidate.sub_source.clone(),
            created_at: candidate.created_at,
        };
        match self.store.insert(meme).await {
            Ok(_) => Ok(true),
            // Concurrent invocation got there first; not a failure.
            Err(StoreError::Duplicate(_)) => Ok(false),
            Err(StoreError::Backend(e)) => Err(e.context("store insert failed")),
        }
    }
}
