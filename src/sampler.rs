// Sampling scheduler. Three independently clocked periodic tasks (fast tick,
// ping tick, bandwidth probe tick) feed one store-writer task over a channel,
// so the store sees a single writer queue. Rate state is owned here and
// touched only by the fast tick.

use crate::metrics_repo::MetricsRepo;
use crate::models::{
    AdapterSnapshot, EventKind, MetricKind, PING_UNREACHABLE, Sample, SpeedTestResult, SystemEvent,
    format_bytes, now_ms,
};
use crate::prober::{PingOutcome, Prober};
use crate::rates::{self, RateOutcome};
use crate::sysinfo_repo::SysinfoRepo;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::sync::atomic::AtomicU64;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{Duration, Instant, interval, interval_at};

/// Capacity of the store-writer channel (backpressure if the writer falls behind).
pub const WRITER_CHANNEL_CAPACITY: usize = 64;

const APPEND_RETRY_BACKOFF: Duration = Duration::from_millis(250);

const UNIT_MBPS: &str = "Mbps";
const UNIT_MS: &str = "ms";
const UNIT_PERCENT: &str = "percent";
const UNIT_BYTES: &str = "bytes";

/// One unit of work for the store writer.
pub enum StoreRecord {
    Samples(Vec<Sample>),
    SpeedTest(SpeedTestResult),
    Event(SystemEvent),
}

/// Repos, channels, and shutdown for the sampler.
pub struct SamplerDeps {
    pub sysinfo_repo: Arc<SysinfoRepo>,
    pub prober: Arc<Prober>,
    pub write_tx: mpsc::Sender<StoreRecord>,
    pub samples_saved_total: Arc<AtomicU64>,
    pub shutdown_rx: oneshot::Receiver<()>,
}

/// Sampler timing config. Pings run on the fast cadence; the bandwidth probe
/// on its own long interval.
pub struct SamplerConfig {
    pub sample_interval_ms: u64,
    pub probe_interval_secs: u64,
    /// How often to log app stats (real seconds).
    pub stats_log_interval_secs: u64,
}

/// Transient sampling state: previous adapter snapshots for rate derivation
/// plus the versioned set of tracked adapters. Owned by the sampler task.
pub struct SamplerState {
    prev: HashMap<String, AdapterSnapshot>,
    tracked: BTreeSet<String>,
    adapter_version: u64,
    total_bytes_sent: u64,
    total_bytes_recv: u64,
}

impl Default for SamplerState {
    fn default() -> Self {
        Self::new()
    }
}

impl SamplerState {
    pub fn new() -> Self {
        Self {
            prev: HashMap::new(),
            tracked: BTreeSet::new(),
            adapter_version: 0,
            total_bytes_sent: 0,
            total_bytes_recv: 0,
        }
    }

    pub fn tracked_adapters(&self) -> usize {
        self.tracked.len()
    }

    pub fn adapter_version(&self) -> u64 {
        self.adapter_version
    }
}

/// Reconciles the tracked adapter set against one batch of counter snapshots
/// and derives this tick's samples. The first sighting of an adapter only
/// primes its snapshot; a clock anomaly or a too-short interval suppresses
/// the tick's rate samples (counter totals are still emitted).
pub fn reconcile_and_rate(
    state: &mut SamplerState,
    counters: Vec<AdapterSnapshot>,
    timestamp: i64,
) -> (Vec<Sample>, Option<SystemEvent>) {
    let current: BTreeSet<String> = counters.iter().map(|c| c.adapter.clone()).collect();

    let mut adapter_event = None;
    if current != state.tracked {
        let appeared: Vec<String> = current.difference(&state.tracked).cloned().collect();
        let disappeared: Vec<String> = state.tracked.difference(&current).cloned().collect();
        for gone in &disappeared {
            state.prev.remove(gone);
        }
        let first_sighting = state.adapter_version == 0 && state.tracked.is_empty();
        state.adapter_version += 1;
        state.tracked = current;
        if !first_sighting {
            adapter_event = Some(SystemEvent::at(
                timestamp,
                EventKind::AdapterChange,
                format!(
                    "adapter set v{}: appeared {:?}, disappeared {:?}",
                    state.adapter_version, appeared, disappeared
                ),
            ));
        }
    }

    let mut download_mbps = 0.0;
    let mut upload_mbps = 0.0;
    let mut have_rate = false;
    let mut suppressed = false;
    let mut total_sent: u64 = 0;
    let mut total_recv: u64 = 0;

    for snapshot in counters {
        total_sent += snapshot.bytes_sent;
        total_recv += snapshot.bytes_recv;
        match state.prev.get(&snapshot.adapter) {
            Some(previous) => match rates::rate(previous, &snapshot) {
                RateOutcome::Rate {
                    download_mbps: down,
                    upload_mbps: up,
                } => {
                    download_mbps += down;
                    upload_mbps += up;
                    have_rate = true;
                    state.prev.insert(snapshot.adapter.clone(), snapshot);
                }
                RateOutcome::NoSample => {
                    // Clock anomaly: reseed and skip this tick's rates
                    suppressed = true;
                    state.prev.insert(snapshot.adapter.clone(), snapshot);
                }
                RateOutcome::Deferred => {
                    // Keep the previous snapshot; the next tick gets the full interval
                    suppressed = true;
                }
            },
            None => {
                state.prev.insert(snapshot.adapter.clone(), snapshot);
            }
        }
    }

    state.total_bytes_sent = total_sent;
    state.total_bytes_recv = total_recv;

    let mut samples = Vec::with_capacity(4);
    if have_rate && !suppressed {
        samples.push(Sample::new(
            timestamp,
            MetricKind::DownloadRate,
            download_mbps,
            UNIT_MBPS,
        ));
        samples.push(Sample::new(
            timestamp,
            MetricKind::UploadRate,
            upload_mbps,
            UNIT_MBPS,
        ));
    }
    samples.push(Sample::new(
        timestamp,
        MetricKind::BytesSentTotal,
        total_sent as f64,
        UNIT_BYTES,
    ));
    samples.push(Sample::new(
        timestamp,
        MetricKind::BytesRecvTotal,
        total_recv as f64,
        UNIT_BYTES,
    ));

    (samples, adapter_event)
}

pub fn spawn(deps: SamplerDeps, config: SamplerConfig) -> tokio::task::JoinHandle<()> {
    let SamplerDeps {
        sysinfo_repo,
        prober,
        write_tx,
        samples_saved_total,
        mut shutdown_rx,
    } = deps;
    let SamplerConfig {
        sample_interval_ms,
        probe_interval_secs,
        stats_log_interval_secs,
    } = config;

    let probe_interval = Duration::from_secs(probe_interval_secs);

    tokio::spawn(async move {
        let mut fast_tick = interval(Duration::from_millis(sample_interval_ms));
        fast_tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        let mut ping_tick = interval(Duration::from_millis(sample_interval_ms));
        ping_tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        // First bandwidth probe one full interval after start, not immediately
        let mut probe_tick = interval_at(Instant::now() + probe_interval, probe_interval);
        probe_tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        let mut stats_log_tick = interval(Duration::from_secs(stats_log_interval_secs));
        stats_log_tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        let mut state = SamplerState::new();

        let sampler_span = tracing::span!(tracing::Level::DEBUG, "sampler", sample_interval_ms);
        let _guard = sampler_span.enter();

        send_event(&write_tx, EventKind::Startup, "sampler started".into()).await;

        loop {
            tokio::select! {
                // Fast-tick samples must reach the writer queue ahead of a
                // coinciding probe result
                biased;
                _ = fast_tick.tick() => {
                    let timestamp = now_ms();

                    let counters = match sysinfo_repo.get_adapter_counters().await {
                        Ok(c) => c,
                        Err(e) => {
                            tracing::warn!(error = %e, operation = "get_adapter_counters", "adapter counters failed");
                            send_event(&write_tx, EventKind::Error, format!("adapter counter read failed: {}", e)).await;
                            continue;
                        }
                    };
                    let (mut samples, adapter_event) = reconcile_and_rate(&mut state, counters, timestamp);
                    if let Some(event) = adapter_event {
                        tracing::info!(message = %event.message, "adapter set changed");
                        let _ = write_tx.send(StoreRecord::Event(event)).await;
                    }

                    let cpu = match sysinfo_repo.get_cpu_pct().await {
                        Ok(v) => v,
                        Err(e) => {
                            tracing::warn!(error = %e, operation = "get_cpu_pct", "CPU read failed");
                            send_event(&write_tx, EventKind::Error, format!("cpu read failed: {}", e)).await;
                            continue;
                        }
                    };
                    let ram = match sysinfo_repo.get_ram_pct().await {
                        Ok(v) => v,
                        Err(e) => {
                            tracing::warn!(error = %e, operation = "get_ram_pct", "RAM read failed");
                            send_event(&write_tx, EventKind::Error, format!("ram read failed: {}", e)).await;
                            continue;
                        }
                    };
                    let disk = match sysinfo_repo.get_disk_pct().await {
                        Ok(v) => v,
                        Err(e) => {
                            tracing::warn!(error = %e, operation = "get_disk_pct", "disk read failed");
                            send_event(&write_tx, EventKind::Error, format!("disk read failed: {}", e)).await;
                            continue;
                        }
                    };
                    samples.push(Sample::new(timestamp, MetricKind::CpuPct, cpu, UNIT_PERCENT));
                    samples.push(Sample::new(timestamp, MetricKind::RamPct, ram, UNIT_PERCENT));
                    samples.push(Sample::new(timestamp, MetricKind::DiskPct, disk, UNIT_PERCENT));

                    if write_tx.send(StoreRecord::Samples(samples)).await.is_err() {
                        tracing::debug!("store writer channel closed");
                    }
                }
                _ = ping_tick.tick() => {
                    let timestamp = now_ms();
                    let value = match prober.ping().await {
                        PingOutcome::ReachedMs(ms) => ms,
                        PingOutcome::Unreachable => {
                            tracing::debug!(operation = "ping", "all endpoints unreachable");
                            PING_UNREACHABLE
                        }
                    };
                    let sample = Sample::new(timestamp, MetricKind::PingLatency, value, UNIT_MS);
                    if write_tx.send(StoreRecord::Samples(vec![sample])).await.is_err() {
                        tracing::debug!("store writer channel closed");
                    }
                }
                _ = probe_tick.tick() => {
                    // Multi-second operation; run it off the scheduling task.
                    // The task holds only a weak sender so an in-flight probe
                    // never keeps the writer alive past shutdown; a result
                    // arriving after stop is discarded, not written.
                    let prober = prober.clone();
                    let weak_tx = write_tx.downgrade();
                    tokio::spawn(async move {
                        let outcome = prober.bandwidth_probe().await;
                        let Some(tx) = weak_tx.upgrade() else {
                            tracing::debug!("probe finished after shutdown; result discarded");
                            return;
                        };
                        match outcome {
                            Ok(result) => {
                                let message = format!(
                                    "speed test: {:.2} Mbps down / {:.2} Mbps up via {}",
                                    result.download_mbps, result.upload_mbps, result.server_id
                                );
                                if tx.send(StoreRecord::SpeedTest(result)).await.is_err() {
                                    tracing::debug!("store writer channel closed; result discarded");
                                    return;
                                }
                                let _ = tx
                                    .send(StoreRecord::Event(SystemEvent::new(
                                        EventKind::SpeedTestRun,
                                        message,
                                    )))
                                    .await;
                            }
                            Err(e) => {
                                tracing::warn!(error = %e, operation = "bandwidth_probe", "bandwidth probe failed");
                                let _ = tx
                                    .send(StoreRecord::Event(SystemEvent::new(
                                        EventKind::Error,
                                        format!("bandwidth probe failed: {}", e),
                                    )))
                                    .await;
                            }
                        }
                    });
                }
                _ = stats_log_tick.tick() => {
                    tracing::info!(
                        samples_saved_total =
                            samples_saved_total.load(std::sync::atomic::Ordering::Relaxed),
                        tracked_adapters = state.tracked_adapters(),
                        adapter_set_version = state.adapter_version(),
                        bytes_sent_total = %format_bytes(state.total_bytes_sent),
                        bytes_recv_total = %format_bytes(state.total_bytes_recv),
                        "app stats"
                    );
                }
                _ = &mut shutdown_rx => {
                    break;
                }
            }
        }

        // Any in-flight tick body above has completed; announce shutdown
        // before the writer channel closes so the event is flushed.
        send_event(&write_tx, EventKind::Shutdown, "sampler stopped".into()).await;
        tracing::debug!("Sampler shutting down");
    })
}

async fn send_event(tx: &mpsc::Sender<StoreRecord>, kind: EventKind, message: String) {
    if tx
        .send(StoreRecord::Event(SystemEvent::new(kind, message)))
        .await
        .is_err()
    {
        tracing::debug!("store writer channel closed");
    }
}

/// Spawns the task that drains the writer channel into the store. When the
/// sampler drops its sender the channel closes, remaining records are
/// appended, and the task exits.
pub fn spawn_store_writer(
    mut write_rx: mpsc::Receiver<StoreRecord>,
    repo: Arc<MetricsRepo>,
    samples_saved_total: Arc<AtomicU64>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(record) = write_rx.recv().await {
            append_with_retry(&repo, record, &samples_saved_total).await;
        }
        tracing::debug!("Store writer shutting down");
    })
}

/// One retry with backoff; a second failure drops the batch and records an
/// error event. A monitoring gap is preferable to a blocked sampler.
async fn append_with_retry(
    repo: &MetricsRepo,
    record: StoreRecord,
    samples_saved_total: &AtomicU64,
) {
    let result = match append_record(repo, &record).await {
        Ok(()) => Ok(()),
        Err(e) => {
            tracing::warn!(error = %e, operation = "append", "store append failed; retrying once");
            tokio::time::sleep(APPEND_RETRY_BACKOFF).await;
            append_record(repo, &record).await
        }
    };
    match result {
        Ok(()) => {
            if let StoreRecord::Samples(samples) = &record {
                samples_saved_total
                    .fetch_add(samples.len() as u64, std::sync::atomic::Ordering::Relaxed);
            }
        }
        Err(e) => {
            tracing::warn!(error = %e, operation = "append", "store append failed twice; dropping batch");
            let event = SystemEvent::new(
                EventKind::Error,
                format!("store append failed, batch dropped: {}", e),
            );
            if let Err(e2) = repo.append_event(&event).await {
                tracing::warn!(error = %e2, "could not record append failure event");
            }
        }
    }
}

async fn append_record(repo: &MetricsRepo, record: &StoreRecord) -> anyhow::Result<()> {
    match record {
        StoreRecord::Samples(samples) => repo.append_samples(samples).await,
        StoreRecord::SpeedTest(result) => repo.append_speed_test(result).await,
        StoreRecord::Event(event) => repo.append_event(event).await,
    }
}
