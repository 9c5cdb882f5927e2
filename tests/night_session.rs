// tests/night_session.rs
//
// Session time-boxing under a paused tokio clock: a 30-minute session with
// 5-minute intervals runs at most ceil(30/5) = 6 cycles, Reddit always
// before Instagram, and ends only when the deadline passes.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use meme_harvester::config::{
    AppConfig, HarvestConfig, InstagramConfig, RedditConfig, ScheduleConfig,
};
use meme_harvester::ingest::circuit::CircuitBreaker;
use meme_harvester::ingest::{Harvester, SourcePlan, SweepBudget};
use meme_harvester::media::PassthroughMirror;
use meme_harvester::pool::WorkerPool;
use meme_harvester::session::{NightSession, SessionConfig};
use meme_harvester::store::MemoryStore;
use meme_harvester::{
    CandidateMeme, FetchError, Scheduler, SourceAdapter, SubSource, TriggerTarget,
};

struct CountingAdapter {
    source: &'static str,
    log: Arc<Mutex<Vec<&'static str>>>,
}

#[async_trait::async_trait]
impl SourceAdapter for CountingAdapter {
    async fn poll(&self, _sub: &SubSource, _limit: usize) -> Result<Vec<CandidateMeme>, FetchError> {
        self.log.lock().unwrap().push(self.source);
        Ok(Vec::new())
    }

    fn name(&self) -> &'static str {
        self.source
    }
}

fn test_config() -> AppConfig {
    AppConfig {
        schedule: ScheduleConfig {
            enabled: true,
            start_hour: 3,
            duration_minutes: 30,
            interval_minutes: 5,
            recovery_seconds: 60,
        },
        harvest: HarvestConfig {
            categories_per_cycle: 1,
            fetch_delay_seconds: 0,
            max_sweeps: 1,
            target_items: 30,
            workers: 2,
        },
        reddit: RedditConfig {
            base_url: "http://reddit.invalid".into(),
            sub_sources: vec![SubSource::new("memes", "general")],
            poll_limit: 25,
        },
        instagram: InstagramConfig {
            base_url: "http://instagram.invalid".into(),
            accounts: vec![SubSource::new("weebily", "instagram")],
            accounts_per_cycle: 1,
            posts_per_account: 10,
        },
        port: 0,
        state_path: "state/test-memes.json".into(),
    }
}

fn counting_plans(log: &Arc<Mutex<Vec<&'static str>>>) -> (SourcePlan, SourcePlan) {
    let reddit = SourcePlan {
        adapter: Arc::new(CountingAdapter {
            source: "reddit",
            log: log.clone(),
        }),
        pool: vec![SubSource::new("memes", "general")],
        per_cycle: 1,
        poll_limit: 25,
    };
    let instagram = SourcePlan {
        adapter: Arc::new(CountingAdapter {
            source: "instagram",
            log: log.clone(),
        }),
        pool: vec![SubSource::new("weebily", "instagram")],
        per_cycle: 1,
        poll_limit: 10,
    };
    (reddit, instagram)
}

fn session_config() -> SessionConfig {
    SessionConfig {
        duration: Duration::from_secs(30 * 60),
        interval: Duration::from_secs(5 * 60),
        source_pause: Duration::from_secs(2),
        recovery: Duration::from_secs(60),
    }
}

fn test_harvester(store: Arc<MemoryStore>) -> Arc<Harvester> {
    Arc::new(Harvester::new(
        store,
        Arc::new(PassthroughMirror),
        Arc::new(CircuitBreaker::new()),
        SweepBudget {
            max_sweeps: 1,
            target_items: 30,
        },
        Duration::ZERO,
    ))
}

#[tokio::test(start_paused = true)]
async fn session_ends_only_at_the_deadline_with_bounded_cycles() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let (reddit, instagram) = counting_plans(&log);
    let session = NightSession::new(
        session_config(),
        test_harvester(Arc::new(MemoryStore::new())),
        Arc::new(reddit),
        Arc::new(instagram),
        Arc::new(WorkerPool::new(2)),
    );

    let t0 = tokio::time::Instant::now();
    session.run().await;
    let elapsed = t0.elapsed();

    assert!(
        elapsed >= Duration::from_secs(30 * 60),
        "session ended early: {elapsed:?}"
    );
    assert!(
        elapsed <= Duration::from_secs(31 * 60),
        "session overran: {elapsed:?}"
    );

    let log = log.lock().unwrap();
    let reddit_polls = log.iter().filter(|s| **s == "reddit").count();
    let instagram_polls = log.iter().filter(|s| **s == "instagram").count();
    assert_eq!(reddit_polls, 6, "ceil(30/5) cycles");
    assert_eq!(instagram_polls, 6);
    for cycle in log.chunks(2) {
        assert_eq!(cycle, ["reddit", "instagram"], "source order within a cycle");
    }
}

#[tokio::test(start_paused = true)]
async fn cycle_errors_never_abort_the_session() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let (reddit, instagram) = counting_plans(&log);

    // A closed pool makes every cycle fail at dispatch.
    let pool = Arc::new(WorkerPool::new(1));
    pool.shutdown(Duration::ZERO).await;

    let mut cfg = session_config();
    cfg.duration = Duration::from_secs(10 * 60);
    let session = NightSession::new(
        cfg,
        test_harvester(Arc::new(MemoryStore::new())),
        Arc::new(reddit),
        Arc::new(instagram),
        pool,
    );

    let t0 = tokio::time::Instant::now();
    session.run().await;
    let elapsed = t0.elapsed();

    // Recovery pauses kept the loop alive until wall-clock expiry.
    assert!(elapsed >= Duration::from_secs(10 * 60));
    assert!(log.lock().unwrap().is_empty());
}

#[tokio::test(start_paused = true)]
async fn manual_night_session_runs_once_and_excludes_overlap() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let (reddit, instagram) = counting_plans(&log);
    let cfg = test_config();
    let scheduler = Scheduler::with_plans(
        &cfg,
        Arc::new(MemoryStore::new()),
        Arc::new(PassthroughMirror),
        reddit,
        instagram,
    )
    .unwrap();

    scheduler.trigger(TriggerTarget::NightSession).unwrap();

    // Let the session actually start, then verify the fail-fast guard.
    tokio::time::sleep(Duration::from_secs(60)).await;
    assert!(
        scheduler.trigger(TriggerTarget::NightSession).is_err(),
        "second session must fail fast while one is active"
    );

    tokio::time::sleep(Duration::from_secs(35 * 60)).await;

    {
        let log = log.lock().unwrap();
        let reddit_polls = log.iter().filter(|s| **s == "reddit").count();
        assert_eq!(reddit_polls, 6);
    }

    // The session terminated on its own; a new one may start.
    assert!(scheduler.trigger(TriggerTarget::NightSession).is_ok());
}
