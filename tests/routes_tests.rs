// HTTP query surface tests

mod common;

use axum_test::TestServer;
use common::{sample, test_repo};
use netscope::models::{EventKind, MetricKind, SpeedTestResult, SystemEvent, now_ms};
use netscope::routes;
use std::sync::Arc;

async fn test_server() -> (tempfile::TempDir, Arc<netscope::metrics_repo::MetricsRepo>, TestServer) {
    let (dir, repo) = test_repo().await;
    let repo = Arc::new(repo);
    let server = TestServer::new(routes::app(repo.clone()));
    (dir, repo, server)
}

#[tokio::test]
async fn test_root_endpoint() {
    let (_dir, _repo, server) = test_server().await;
    let response = server.get("/").await;
    response.assert_status_ok();
    response.assert_text("netscope collector");
}

#[tokio::test]
async fn test_version_endpoint() {
    let (_dir, _repo, server) = test_server().await;
    let response = server.get("/version").await;
    response.assert_status_ok();
    let json: serde_json::Value = response.json();
    assert_eq!(json.get("name").and_then(|v| v.as_str()), Some("netscope"));
    assert!(json.get("version").and_then(|v| v.as_str()).is_some());
}

#[tokio::test]
async fn test_window_endpoint_returns_trailing_points() {
    let (_dir, repo, server) = test_server().await;
    let now = now_ms();
    repo.append_samples(&[
        sample(now - 10_000, MetricKind::CpuPct, 21.0),
        sample(now - 5_000, MetricKind::CpuPct, 23.0),
    ])
    .await
    .unwrap();

    let response = server.get("/api/window/cpu_pct?duration=5m").await;
    response.assert_status_ok();
    let points: Vec<serde_json::Value> = response.json();
    assert_eq!(points.len(), 2);
    assert_eq!(points[0].get("value").and_then(|v| v.as_f64()), Some(21.0));
    assert!(
        points[0].get("timestamp").and_then(|v| v.as_i64()).unwrap()
            < points[1].get("timestamp").and_then(|v| v.as_i64()).unwrap()
    );
}

#[tokio::test]
async fn test_window_endpoint_defaults_to_one_hour() {
    let (_dir, repo, server) = test_server().await;
    let now = now_ms();
    repo.append_samples(&[
        sample(now - 1000, MetricKind::PingLatency, 15.0),
        sample(now - 2 * 3600 * 1000, MetricKind::PingLatency, 99.0),
    ])
    .await
    .unwrap();

    let response = server.get("/api/window/ping_latency").await;
    response.assert_status_ok();
    let points: Vec<serde_json::Value> = response.json();
    assert_eq!(points.len(), 1);
}

#[tokio::test]
async fn test_window_endpoint_rejects_unknown_kind() {
    let (_dir, _repo, server) = test_server().await;
    let response = server.get("/api/window/not_a_metric").await;
    response.assert_status_bad_request();
}

#[tokio::test]
async fn test_window_endpoint_rejects_unknown_duration() {
    let (_dir, _repo, server) = test_server().await;
    let response = server.get("/api/window/cpu_pct?duration=2h").await;
    response.assert_status_bad_request();
}

#[tokio::test]
async fn test_speedtests_endpoint() {
    let (_dir, repo, server) = test_server().await;
    repo.append_speed_test(&SpeedTestResult {
        timestamp: 1000,
        download_mbps: 94.2,
        upload_mbps: 18.7,
        server_id: "speed.cloudflare.com".into(),
    })
    .await
    .unwrap();

    let response = server.get("/api/speedtests").await;
    response.assert_status_ok();
    let results: Vec<SpeedTestResult> = response.json();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].download_mbps, 94.2);
}

#[tokio::test]
async fn test_events_endpoint_with_limit() {
    let (_dir, repo, server) = test_server().await;
    repo.append_event(&SystemEvent::at(1000, EventKind::Startup, "sampler started"))
        .await
        .unwrap();
    repo.append_event(&SystemEvent::at(2000, EventKind::Shutdown, "sampler stopped"))
        .await
        .unwrap();

    let response = server.get("/api/events?limit=1").await;
    response.assert_status_ok();
    let events: Vec<SystemEvent> = response.json();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].event_kind, EventKind::Shutdown);
}
