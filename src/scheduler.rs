//! # Scheduler / Trigger Registry
//! Owns the one recurring job (the nightly fetch session) plus the manual
//! trigger paths. Explicitly constructed by the composition root; the
//! handle is cheap to clone and there is no global instance.

use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use chrono::{DateTime, Utc};
use cron::Schedule;
use metrics::gauge;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::config::AppConfig;
use crate::ingest::circuit::CircuitBreaker;
use crate::ingest::providers::{instagram::InstagramAdapter, reddit::RedditAdapter};
use crate::ingest::{Harvester, SourcePlan, SweepBudget};
use crate::media::MediaMirror;
use crate::pool::WorkerPool;
use crate::session::{NightSession, SessionConfig};
use crate::store::MemeStore;

const JOB_ID: &str = "night_fetch_session";
const JOB_NAME: &str = "Night Fetch Session";

/// Courtesy pause between the two sources inside one cycle.
const SOURCE_PAUSE: Duration = Duration::from_secs(2);
/// How long `stop` waits for in-flight fetch work before giving up.
const STOP_DRAIN_GRACE: Duration = Duration::from_secs(30);

/// Closed set of things a manual trigger can run. Adding a source is a
/// compile-time-checked change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerTarget {
    Reddit,
    Instagram,
    All,
    NightSession,
}

impl FromStr for TriggerTarget {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "reddit" => Ok(Self::Reddit),
            "instagram" => Ok(Self::Instagram),
            "all" => Ok(Self::All),
            "night-session" | "night_session" => Ok(Self::NightSession),
            other => Err(anyhow!("unknown trigger target: {other}")),
        }
    }
}

impl fmt::Display for TriggerTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Reddit => "reddit",
            Self::Instagram => "instagram",
            Self::All => "all",
            Self::NightSession => "night-session",
        };
        f.write_str(s)
    }
}

#[derive(Debug, serde::Serialize)]
pub struct SchedulerStatus {
    pub running: bool,
    pub jobs: Vec<JobStatus>,
}

#[derive(Debug, serde::Serialize)]
pub struct JobStatus {
    pub id: String,
    pub name: String,
    pub next_run: Option<DateTime<Utc>>,
}

#[derive(Default)]
struct Lifecycle {
    running: bool,
    stop_tx: Option<watch::Sender<bool>>,
    cron_task: Option<JoinHandle<()>>,
}

struct Core {
    enabled: bool,
    schedule: Schedule,
    session_cfg: SessionConfig,
    harvester: Arc<Harvester>,
    reddit: Arc<SourcePlan>,
    instagram: Arc<SourcePlan>,
    pool: Arc<WorkerPool>,
    lifecycle: std::sync::Mutex<Lifecycle>,
    session_active: AtomicBool,
}

/// Cheap-to-clone handle over the shared scheduler state.
#[derive(Clone)]
pub struct Scheduler {
    core: Arc<Core>,
}

impl Scheduler {
    /// Wire up the production adapters from configuration.
    pub fn new(
        cfg: &AppConfig,
        store: Arc<dyn MemeStore>,
        media: Arc<dyn MediaMirror>,
    ) -> Result<Self> {
        let reddit = SourcePlan {
            adapter: Arc::new(RedditAdapter::from_url(cfg.reddit.base_url.clone())),
            pool: cfg.reddit.sub_sources.clone(),
            per_cycle: cfg.harvest.categories_per_cycle,
            poll_limit: cfg.reddit.poll_limit,
        };
        let instagram = SourcePlan {
            adapter: Arc::new(InstagramAdapter::from_url(cfg.instagram.base_url.clone())),
            pool: cfg.instagram.accounts.clone(),
            per_cycle: cfg.instagram.accounts_per_cycle,
            poll_limit: cfg.instagram.posts_per_account,
        };
        Self::with_plans(cfg, store, media, reddit, instagram)
    }

    /// Same wiring with caller-supplied source plans. Tests use this to
    /// substitute scripted adapters.
    pub fn with_plans(
        cfg: &AppConfig,
        store: Arc<dyn MemeStore>,
        media: Arc<dyn MediaMirror>,
        reddit: SourcePlan,
        instagram: SourcePlan,
    ) -> Result<Self> {
        let schedule = Schedule::from_str(&cfg.schedule.cron_expr())
            .context("parsing night fetch cron expression")?;
        let circuit = Arc::new(CircuitBreaker::new());
        let harvester = Arc::new(Harvester::new(
            store,
            media,
            circuit,
            SweepBudget {
                max_sweeps: cfg.harvest.max_sweeps,
                target_items: cfg.harvest.target_items,
            },
            Duration::from_secs(cfg.harvest.fetch_delay_seconds),
        ));

        Ok(Self {
            core: Arc::new(Core {
                enabled: cfg.schedule.enabled,
                schedule,
                session_cfg: SessionConfig {
                    duration: Duration::from_secs(cfg.schedule.duration_minutes * 60),
                    interval: Duration::from_secs(cfg.schedule.interval_minutes * 60),
                    source_pause: SOURCE_PAUSE,
                    recovery: Duration::from_secs(cfg.schedule.recovery_seconds),
                },
                harvester,
                reddit: Arc::new(reddit),
                instagram: Arc::new(instagram),
                pool: Arc::new(WorkerPool::new(cfg.harvest.workers)),
                lifecycle: std::sync::Mutex::new(Lifecycle::default()),
                session_active: AtomicBool::new(false),
            }),
        })
    }

    /// Register the recurring job and begin the clock. Idempotent: calling
    /// while already running only logs.
    pub fn start(&self) -> Result<()> {
        if !self.core.enabled {
            info!("scheduler is disabled in configuration");
            return Ok(());
        }
        let mut lifecycle = self.core.lifecycle.lock().expect("scheduler lock poisoned");
        if lifecycle.running {
            info!("scheduler is already running");
            return Ok(());
        }

        let (stop_tx, stop_rx) = watch::channel(false);
        let sched = self.clone();
        let task = tokio::spawn(async move { sched.cron_loop(stop_rx).await });

        lifecycle.running = true;
        lifecycle.stop_tx = Some(stop_tx);
        lifecycle.cron_task = Some(task);
        gauge!("scheduler_running").set(1.0);
        info!(
            next_run = ?self.core.schedule.upcoming(Utc).next(),
            "scheduler started, night fetch registered"
        );
        Ok(())
    }

    /// Cancel the recurring trigger and wait (bounded) for in-flight fetch
    /// work. The pool stays usable for manual triggers and a later `start`.
    /// Idempotent.
    pub async fn stop(&self) -> Result<()> {
        let (stop_tx, cron_task, was_running) = {
            let mut lifecycle = self.core.lifecycle.lock().expect("scheduler lock poisoned");
            (
                lifecycle.stop_tx.take(),
                lifecycle.cron_task.take(),
                std::mem::replace(&mut lifecycle.running, false),
            )
        };
        if !was_running {
            info!("scheduler is not running");
            return Ok(());
        }

        if let Some(tx) = stop_tx {
            let _ = tx.send(true);
        }
        if let Some(task) = cron_task {
            // A task mid-session keeps running to its natural end; we only
            // wait for the idle-loop case.
            if tokio::time::timeout(Duration::from_secs(5), task).await.is_err() {
                warn!("cron task still busy after stop, leaving it to finish");
            }
        }
        if tokio::time::timeout(STOP_DRAIN_GRACE, self.core.pool.wait_idle())
            .await
            .is_err()
        {
            warn!("fetch work still in flight after drain grace period");
        }

        gauge!("scheduler_running").set(0.0);
        info!("scheduler stopped");
        Ok(())
    }

    /// Full teardown at process exit: stop, then close the worker pool.
    pub async fn shutdown(&self) {
        let _ = self.stop().await;
        self.core.pool.shutdown(STOP_DRAIN_GRACE).await;
    }

    pub fn status(&self) -> SchedulerStatus {
        let running = self
            .core
            .lifecycle
            .lock()
            .expect("scheduler lock poisoned")
            .running;
        let jobs = if running {
            vec![JobStatus {
                id: JOB_ID.to_string(),
                name: JOB_NAME.to_string(),
                next_run: self.core.schedule.upcoming(Utc).next(),
            }]
        } else {
            Vec::new()
        };
        SchedulerStatus { running, jobs }
    }

    /// Run a fetch path now, independent of the cron schedule. Returns once
    /// the work is dispatched; completion is visible via status and metrics.
    pub fn trigger(&self, target: TriggerTarget) -> Result<()> {
        match target {
            TriggerTarget::Reddit => self.dispatch_fetch(self.core.reddit.clone()),
            TriggerTarget::Instagram => self.dispatch_fetch(self.core.instagram.clone()),
            TriggerTarget::All => {
                self.dispatch_fetch(self.core.reddit.clone())?;
                self.dispatch_fetch(self.core.instagram.clone())
            }
            TriggerTarget::NightSession => {
                // Best-effort fail-fast; the session guard re-checks.
                if self.core.session_active.load(Ordering::Acquire) {
                    bail!("a night session is already running");
                }
                let sched = self.clone();
                tokio::spawn(async move { sched.run_session().await });
                info!("manual night session dispatched");
                Ok(())
            }
        }
    }

    fn dispatch_fetch(&self, plan: Arc<SourcePlan>) -> Result<()> {
        let harvester = self.core.harvester.clone();
        let source = plan.adapter.name();
        // Fire-and-forget: the result receiver is dropped, the job still runs.
        let _ = self.core.pool.submit(async move {
            let stats = harvester.run_source(&plan).await;
            info!(source, inserted = stats.inserted, "manual fetch completed");
        })?;
        info!(source, "manual fetch dispatched");
        Ok(())
    }

    async fn cron_loop(self, mut stop_rx: watch::Receiver<bool>) {
        loop {
            let Some(next) = self.core.schedule.upcoming(Utc).next() else {
                warn!("cron schedule has no upcoming fire time");
                break;
            };
            let wait = (next - Utc::now()).to_std().unwrap_or(Duration::ZERO);
            tokio::select! {
                _ = tokio::time::sleep(wait) => {
                    info!("night fetch trigger fired");
                    self.run_session().await;
                }
                _ = stop_rx.changed() => break,
            }
        }
    }

    /// At most one session per process at a time; a trigger that loses the
    /// race is skipped, overlap of plain fetches is handled by dedup.
    async fn run_session(&self) {
        if self
            .core
            .session_active
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            warn!("night session already active, skipping trigger");
            return;
        }
        gauge!("night_session_active").set(1.0);

        let session = NightSession::new(
            self.core.session_cfg,
            self.core.harvester.clone(),
            self.core.reddit.clone(),
            self.core.instagram.clone(),
            self.core.pool.clone(),
        );
        session.run().await;

        gauge!("night_session_active").set(0.0);
        self.core.session_active.store(false, Ordering::Release);
    }
}
