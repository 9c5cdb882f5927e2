// tests/api_http.rs
//
// HTTP-level tests for the control Router without opening sockets.
// We exercise the router directly via tower::ServiceExt::oneshot.
//
// Covered:
// - GET  /health
// - GET  /scheduler/status
// - POST /scheduler/start + /scheduler/stop round trip
// - POST /scheduler/trigger/{target} (valid and unknown targets)

use std::sync::Arc;

use axum::{
    body::{self, Body},
    http::{Request, StatusCode},
    Router,
};
use serde_json::Value as Json;
use tower::ServiceExt as _; // for `oneshot`

use meme_harvester::api::{self, AppState};
use meme_harvester::config::{
    AppConfig, HarvestConfig, InstagramConfig, RedditConfig, ScheduleConfig,
};
use meme_harvester::ingest::SourcePlan;
use meme_harvester::media::PassthroughMirror;
use meme_harvester::store::MemoryStore;
use meme_harvester::{CandidateMeme, FetchError, Scheduler, SourceAdapter, SubSource};

const BODY_LIMIT: usize = 1024 * 1024; // 1MB, safe for tests

struct EmptyAdapter(&'static str);

#[async_trait::async_trait]
impl SourceAdapter for EmptyAdapter {
    async fn poll(&self, _sub: &SubSource, _limit: usize) -> Result<Vec<CandidateMeme>, FetchError> {
        Ok(Vec::new())
    }

    fn name(&self) -> &'static str {
        self.0
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

/// Build the same Router the binary uses, on stub adapters.
fn test_router() -> Router {
    let reddit = SourcePlan {
        adapter: Arc::new(EmptyAdapter("reddit")),
        pool: vec![SubSource::new("memes", "general")],
        per_cycle: 1,
        poll_limit: 25,
    };
    let instagram = SourcePlan {
        adapter: Arc::new(EmptyAdapter("instagram")),
        pool: vec![SubSource::new("weebily", "instagram")],
        per_cycle: 1,
        poll_limit: 10,
    };
    let scheduler = Scheduler::with_plans(
        &test_config(),
        Arc::new(MemoryStore::new()),
        Arc::new(PassthroughMirror),
        reddit,
        instagram,
    )
    .expect("build scheduler");
    api::create_router(AppState { scheduler })
}

async fn body_json(resp: axum::response::Response) -> Json {
    let bytes = body::to_bytes(resp.into_body(), BODY_LIMIT)
        .await
        .expect("read body");
    serde_json::from_slice(&bytes).expect("json body")
}

#[tokio::test]
async fn health_returns_200_and_ok_body() {
    let app = test_router();

    let req = Request::builder()
        .method("GET")
        .uri("/health")
        .body(Body::empty())
        .expect("build GET /health");

    let resp = app.oneshot(req).await.expect("oneshot /health");
    assert_eq!(resp.status(), StatusCode::OK);

    let bytes = body::to_bytes(resp.into_body(), BODY_LIMIT)
        .await
        .expect("read body")
        .to_vec();
    assert_eq!(String::from_utf8(bytes).expect("utf8").trim(), "ok");
}

#[tokio::test]
async fn status_start_stop_round_trip() {
    let app = test_router();

    let resp = app
        .clone()
        .oneshot(
            Request::builder()
                .method("GET")
                .uri("/scheduler/status")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let json = body_json(resp).await;
    assert_eq!(json["running"], false);
    assert_eq!(json["jobs"].as_array().unwrap().len(), 0);

    let resp = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/scheduler/start")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(body_json(resp).await["status"], "running");

    let resp = app
        .clone()
        .oneshot(
            Request::builder()
                .method("GET")
                .uri("/scheduler/status")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let json = body_json(resp).await;
    assert_eq!(json["running"], true);
    let jobs = json["jobs"].as_array().unwrap();
    assert_eq!(jobs.len(), 1);
    assert_eq!(jobs[0]["id"], "night_fetch_session");
    assert!(jobs[0]["next_run"].is_string());

    let resp = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/scheduler/stop")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(body_json(resp).await["status"], "stopped");

    let resp = app
        .oneshot(
            Request::builder()
                .method("GET")
                .uri("/scheduler/status")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(body_json(resp).await["running"], false);
}

#[tokio::test]
async fn trigger_reddit_reports_dispatch() {
    let app = test_router();

    let resp = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/scheduler/trigger/reddit")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(body_json(resp).await["status"], "triggered");
}

#[tokio::test]
async fn unknown_trigger_target_is_a_bad_request() {
    let app = test_router();

    let resp = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/scheduler/trigger/facebook")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}
