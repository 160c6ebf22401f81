// Sampler tests: rate derivation over ticks, adapter reconciliation, and the
// spawned loop end-to-end (startup/shutdown events, ping sentinel, probe
// failure containment)

mod common;

use common::test_repo;
use netscope::config::ProbeConfig;
use netscope::models::{
    AdapterSnapshot, EventKind, MetricKind, PING_UNREACHABLE, Sample,
};
use netscope::prober::Prober;
use netscope::sampler::{
    self, SamplerConfig, SamplerDeps, SamplerState, reconcile_and_rate,
};
use netscope::sysinfo_repo::SysinfoRepo;
use std::sync::Arc;
use std::sync::atomic::AtomicU64;

fn snap(adapter: &str, bytes_sent: u64, bytes_recv: u64, captured_at_ms: i64) -> AdapterSnapshot {
    AdapterSnapshot {
        adapter: adapter.into(),
        bytes_sent,
        bytes_recv,
        captured_at_ms,
    }
}

fn kinds(samples: &[Sample]) -> Vec<MetricKind> {
    samples.iter().map(|s| s.metric_kind).collect()
}

fn value_of(samples: &[Sample], kind: MetricKind) -> f64 {
    samples
        .iter()
        .find(|s| s.metric_kind == kind)
        .unwrap_or_else(|| panic!("missing {} sample", kind))
        .value
}

#[test]
fn first_tick_primes_without_rate_samples() {
    let mut state = SamplerState::new();
    let (samples, event) = reconcile_and_rate(&mut state, vec![snap("eth0", 100, 200, 0)], 0);

    assert!(event.is_none(), "initial adapter sighting is not a change");
    assert!(!kinds(&samples).contains(&MetricKind::DownloadRate));
    assert!(!kinds(&samples).contains(&MetricKind::UploadRate));
    assert_eq!(value_of(&samples, MetricKind::BytesSentTotal), 100.0);
    assert_eq!(value_of(&samples, MetricKind::BytesRecvTotal), 200.0);
}

#[test]
fn steady_counter_growth_yields_eight_mbps_each_tick() {
    let mut state = SamplerState::new();
    let (first, _) = reconcile_and_rate(&mut state, vec![snap("eth0", 0, 0, 0)], 0);
    assert!(!kinds(&first).contains(&MetricKind::DownloadRate));

    // 1,000,000 bytes per 1s interval = 8 Mbps
    for tick in 1..=3i64 {
        let ts = tick * 1000;
        let recv = (tick as u64) * 1_000_000;
        let (samples, _) = reconcile_and_rate(&mut state, vec![snap("eth0", 0, recv, ts)], ts);
        assert_eq!(value_of(&samples, MetricKind::DownloadRate), 8.0);
        assert_eq!(value_of(&samples, MetricKind::UploadRate), 0.0);
    }
}

#[test]
fn rates_sum_across_adapters() {
    let mut state = SamplerState::new();
    reconcile_and_rate(
        &mut state,
        vec![snap("eth0", 0, 0, 0), snap("wlan0", 0, 0, 0)],
        0,
    );
    let (samples, _) = reconcile_and_rate(
        &mut state,
        vec![
            snap("eth0", 0, 1_000_000, 1000),
            snap("wlan0", 0, 500_000, 1000),
        ],
        1000,
    );
    assert_eq!(value_of(&samples, MetricKind::DownloadRate), 12.0);
    assert_eq!(
        value_of(&samples, MetricKind::BytesRecvTotal),
        1_500_000.0
    );
}

#[test]
fn counter_reset_yields_zero_rate_and_reseeds() {
    let mut state = SamplerState::new();
    reconcile_and_rate(&mut state, vec![snap("eth0", 0, 9_000_000, 0)], 0);
    let (samples, _) = reconcile_and_rate(&mut state, vec![snap("eth0", 0, 1_000, 1000)], 1000);
    assert_eq!(value_of(&samples, MetricKind::DownloadRate), 0.0);

    // The reset value seeded the next interval
    let (samples, _) =
        reconcile_and_rate(&mut state, vec![snap("eth0", 0, 1_001_000, 2000)], 2000);
    assert_eq!(value_of(&samples, MetricKind::DownloadRate), 8.0);
}

#[test]
fn clock_anomaly_suppresses_rate_samples() {
    let mut state = SamplerState::new();
    reconcile_and_rate(&mut state, vec![snap("eth0", 0, 0, 1000)], 1000);
    // Clock went backward
    let (samples, _) = reconcile_and_rate(&mut state, vec![snap("eth0", 0, 500, 400)], 400);
    assert!(!kinds(&samples).contains(&MetricKind::DownloadRate));
    // Counters still flow as totals
    assert_eq!(value_of(&samples, MetricKind::BytesRecvTotal), 500.0);
}

#[test]
fn deferred_tick_retains_previous_snapshot() {
    let mut state = SamplerState::new();
    reconcile_and_rate(&mut state, vec![snap("eth0", 0, 0, 0)], 0);
    // 10ms later: deferred, no rate
    let (samples, _) = reconcile_and_rate(&mut state, vec![snap("eth0", 0, 10_000, 10)], 10);
    assert!(!kinds(&samples).contains(&MetricKind::DownloadRate));

    // Next tick computes over the full interval since the retained snapshot
    let (samples, _) =
        reconcile_and_rate(&mut state, vec![snap("eth0", 0, 1_000_000, 1000)], 1000);
    assert_eq!(value_of(&samples, MetricKind::DownloadRate), 8.0);
}

#[test]
fn adapter_diff_emits_change_event() {
    let mut state = SamplerState::new();
    reconcile_and_rate(&mut state, vec![snap("eth0", 0, 0, 0)], 0);
    assert_eq!(state.adapter_version(), 1);

    let (_, event) = reconcile_and_rate(
        &mut state,
        vec![snap("eth0", 0, 0, 1000), snap("wlan0", 0, 0, 1000)],
        1000,
    );
    let event = event.expect("adapter appeared");
    assert_eq!(event.event_kind, EventKind::AdapterChange);
    assert!(event.message.contains("wlan0"));
    assert_eq!(state.adapter_version(), 2);

    let (_, event) = reconcile_and_rate(&mut state, vec![snap("wlan0", 0, 0, 2000)], 2000);
    let event = event.expect("adapter disappeared");
    assert!(event.message.contains("eth0"));
    assert_eq!(state.tracked_adapters(), 1);
    assert_eq!(state.adapter_version(), 3);
}

fn unreachable_probe_config() -> ProbeConfig {
    ProbeConfig {
        // Closed local port: connections are refused immediately
        ping_endpoints: vec!["127.0.0.1:1".into()],
        ping_timeout_ms: 200,
        download_url: "http://127.0.0.1:1/down".into(),
        upload_url: "http://127.0.0.1:1/up".into(),
        upload_bytes: 1000,
        timeout_secs: 2,
        interval_secs: 3600,
    }
}

#[tokio::test]
async fn sampler_spawn_ticks_and_shutdown_flushes() {
    let (_dir, repo) = test_repo().await;
    let repo = Arc::new(repo);
    let sysinfo_repo = Arc::new(SysinfoRepo::new());
    let prober = Arc::new(Prober::new(&unreachable_probe_config()).unwrap());

    let samples_saved_total = Arc::new(AtomicU64::new(0));
    let (write_tx, write_rx) = tokio::sync::mpsc::channel(sampler::WRITER_CHANNEL_CAPACITY);
    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel();

    let writer_handle =
        sampler::spawn_store_writer(write_rx, repo.clone(), samples_saved_total.clone());
    let sampler_handle = sampler::spawn(
        SamplerDeps {
            sysinfo_repo,
            prober,
            write_tx,
            samples_saved_total,
            shutdown_rx,
        },
        SamplerConfig {
            sample_interval_ms: 25,
            probe_interval_secs: 3600,
            stats_log_interval_secs: 3600,
        },
    );

    tokio::time::sleep(tokio::time::Duration::from_millis(300)).await;
    let _ = shutdown_tx.send(());
    sampler_handle.await.unwrap();
    writer_handle.await.unwrap();

    let events = repo.recent_events(100).await.unwrap();
    assert!(
        events.iter().any(|e| e.event_kind == EventKind::Startup),
        "startup event recorded"
    );
    assert!(
        events.iter().any(|e| e.event_kind == EventKind::Shutdown),
        "shutdown event recorded before writer exit"
    );

    // All ping endpoints refuse: the gap is a sentinel sample, not silence,
    // and the cadence kept going (several ticks' worth)
    let pings = repo
        .query_window(MetricKind::PingLatency, 0, netscope::models::now_ms())
        .await
        .unwrap();
    assert!(pings.len() >= 2, "ping cadence continued, got {}", pings.len());
    assert!(pings.iter().all(|s| s.value == PING_UNREACHABLE));

    let totals = repo
        .query_window(MetricKind::BytesRecvTotal, 0, netscope::models::now_ms())
        .await
        .unwrap();
    assert!(!totals.is_empty(), "counter samples persisted");
}

#[tokio::test]
async fn failed_bandwidth_probe_records_error_and_cadence_continues() {
    let (_dir, repo) = test_repo().await;
    let repo = Arc::new(repo);
    let sysinfo_repo = Arc::new(SysinfoRepo::new());
    let prober = Arc::new(Prober::new(&unreachable_probe_config()).unwrap());

    let samples_saved_total = Arc::new(AtomicU64::new(0));
    let (write_tx, write_rx) = tokio::sync::mpsc::channel(sampler::WRITER_CHANNEL_CAPACITY);
    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel();

    let writer_handle =
        sampler::spawn_store_writer(write_rx, repo.clone(), samples_saved_total.clone());
    let sampler_handle = sampler::spawn(
        SamplerDeps {
            sysinfo_repo,
            prober,
            write_tx,
            samples_saved_total,
            shutdown_rx,
        },
        SamplerConfig {
            sample_interval_ms: 25,
            // Fires 1s in; the refused connection fails fast
            probe_interval_secs: 1,
            stats_log_interval_secs: 3600,
        },
    );

    tokio::time::sleep(tokio::time::Duration::from_millis(1600)).await;
    let _ = shutdown_tx.send(());
    sampler_handle.await.unwrap();
    writer_handle.await.unwrap();

    let events = repo.recent_events(200).await.unwrap();
    let probe_error = events
        .iter()
        .find(|e| e.event_kind == EventKind::Error && e.message.contains("bandwidth probe"))
        .expect("probe failure recorded as error event");

    // Fast ticks kept firing after the failed probe
    let totals = repo
        .query_window(MetricKind::BytesRecvTotal, 0, netscope::models::now_ms())
        .await
        .unwrap();
    let after_error = totals
        .iter()
        .filter(|s| s.timestamp >= probe_error.timestamp)
        .count();
    assert!(
        after_error >= 2,
        "expected fast ticks after the probe error, got {}",
        after_error
    );
}
