// Raw OS counters via sysinfo: adapter byte counters, CPU/RAM/disk usage.
// Stateless from the sampler's point of view; every read is on demand.

use crate::models::{AdapterSnapshot, now_ms};
use std::sync::Arc;
use std::time::Instant;
use sysinfo::{Disks, Networks, System};
use tracing::instrument;

pub struct SysinfoRepo {
    sys: Arc<std::sync::Mutex<System>>,
    disks: Arc<std::sync::Mutex<Disks>>,
    networks: Arc<std::sync::Mutex<Networks>>,
    last_cpu_refresh: Arc<std::sync::Mutex<Option<(Instant, f64)>>>,
}

impl Default for SysinfoRepo {
    fn default() -> Self {
        Self::new()
    }
}

fn is_loopback(name: &str) -> bool {
    name == "lo" || name.starts_with("lo0")
}

impl SysinfoRepo {
    pub fn new() -> Self {
        let mut sys = System::new_all();
        sys.refresh_all();
        let disks = Disks::new_with_refreshed_list();
        let networks = Networks::new_with_refreshed_list();
        Self {
            sys: Arc::new(std::sync::Mutex::new(sys)),
            disks: Arc::new(std::sync::Mutex::new(disks)),
            networks: Arc::new(std::sync::Mutex::new(networks)),
            last_cpu_refresh: Arc::new(std::sync::Mutex::new(None)),
        }
    }

    /// Cumulative send/receive byte counters per non-loopback adapter,
    /// stamped with a single capture timestamp for the whole read.
    #[instrument(skip(self), fields(repo = "sysinfo", operation = "get_adapter_counters"))]
    pub async fn get_adapter_counters(&self) -> anyhow::Result<Vec<AdapterSnapshot>> {
        let networks = self.networks.clone();
        tokio::task::spawn_blocking(move || {
            let mut networks_guard = networks
                .lock()
                .map_err(|e| anyhow::anyhow!("sysinfo networks lock poisoned: {}", e))?;
            networks_guard.refresh(true);
            let captured_at_ms = now_ms();
            let mut snapshots: Vec<AdapterSnapshot> = networks_guard
                .list()
                .iter()
                .filter(|(name, _)| !is_loopback(name))
                .map(|(name, data)| AdapterSnapshot {
                    adapter: name.clone(),
                    bytes_sent: data.total_transmitted(),
                    bytes_recv: data.total_received(),
                    captured_at_ms,
                })
                .collect();
            snapshots.sort_by(|a, b| a.adapter.cmp(&b.adapter));
            Ok(snapshots)
        })
        .await
        .map_err(|e| anyhow::anyhow!("sysinfo task join: {}", e))?
    }

    #[instrument(skip(self), fields(repo = "sysinfo", operation = "get_cpu_pct"))]
    pub async fn get_cpu_pct(&self) -> anyhow::Result<f64> {
        let sys = self.sys.clone();
        let last_cpu_refresh = self.last_cpu_refresh.clone();
        tokio::task::spawn_blocking(move || {
            let mut sys = sys
                .lock()
                .map_err(|e| anyhow::anyhow!("sysinfo lock poisoned: {}", e))?;

            let now = Instant::now();
            let usage = if let Ok(mut guard) = last_cpu_refresh.lock() {
                if let Some((prev_ts, prev_usage)) = *guard {
                    let dt = now.duration_since(prev_ts);
                    if dt >= sysinfo::MINIMUM_CPU_UPDATE_INTERVAL {
                        sys.refresh_cpu_all();
                        let new_usage = sys.global_cpu_usage() as f64;
                        *guard = Some((now, new_usage));
                        new_usage
                    } else {
                        // Too soon for a meaningful delta; reuse the cached value
                        prev_usage
                    }
                } else {
                    // First call establishes the baseline
                    sys.refresh_cpu_all();
                    *guard = Some((now, 0.0));
                    0.0
                }
            } else {
                sys.refresh_cpu_all();
                0.0
            };

            Ok(usage.clamp(0.0, 100.0))
        })
        .await
        .map_err(|e| anyhow::anyhow!("sysinfo task join: {}", e))?
    }

    #[instrument(skip(self), fields(repo = "sysinfo", operation = "get_ram_pct"))]
    pub async fn get_ram_pct(&self) -> anyhow::Result<f64> {
        let sys = self.sys.clone();
        tokio::task::spawn_blocking(move || {
            let mut sys = sys
                .lock()
                .map_err(|e| anyhow::anyhow!("sysinfo lock poisoned: {}", e))?;
            sys.refresh_memory();

            let total = sys.total_memory();
            let available = sys.available_memory();
            let used = total.saturating_sub(available);
            let pct = if total > 0 {
                (used as f64 / total as f64) * 100.0
            } else {
                0.0
            };
            Ok(pct)
        })
        .await
        .map_err(|e| anyhow::anyhow!("sysinfo task join: {}", e))?
    }

    /// Usage percentage of the primary partition (the root mount when
    /// present, otherwise the largest one).
    #[instrument(skip(self), fields(repo = "sysinfo", operation = "get_disk_pct"))]
    pub async fn get_disk_pct(&self) -> anyhow::Result<f64> {
        let disks = self.disks.clone();
        tokio::task::spawn_blocking(move || {
            let mut disks_guard = disks
                .lock()
                .map_err(|e| anyhow::anyhow!("sysinfo disks lock poisoned: {}", e))?;
            disks_guard.refresh(false);

            let list = disks_guard.list();
            let primary = list
                .iter()
                .find(|d| d.mount_point() == std::path::Path::new("/"))
                .or_else(|| list.iter().max_by_key(|d| d.total_space()));

            let Some(disk) = primary else {
                return Ok(0.0);
            };
            let total = disk.total_space();
            let used = total.saturating_sub(disk.available_space());
            let pct = if total > 0 {
                (used as f64 / total as f64) * 100.0
            } else {
                0.0
            };
            Ok(pct)
        })
        .await
        .map_err(|e| anyhow::anyhow!("sysinfo task join: {}", e))?
    }
}
