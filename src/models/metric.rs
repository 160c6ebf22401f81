// Metric kinds and the sample record persisted per tick

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Sentinel value for a ping that was attempted but got no answer.
/// Distinct from 0 so gaps stay visible in window queries.
pub const PING_UNREACHABLE: f64 = -1.0;

/// Which logical table a metric kind is persisted to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatFamily {
    Network,
    System,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricKind {
    DownloadRate,
    UploadRate,
    PingLatency,
    CpuPct,
    RamPct,
    DiskPct,
    BytesSentTotal,
    BytesRecvTotal,
}

impl MetricKind {
    pub const ALL: [MetricKind; 8] = [
        MetricKind::DownloadRate,
        MetricKind::UploadRate,
        MetricKind::PingLatency,
        MetricKind::CpuPct,
        MetricKind::RamPct,
        MetricKind::DiskPct,
        MetricKind::BytesSentTotal,
        MetricKind::BytesRecvTotal,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MetricKind::DownloadRate => "download_rate",
            MetricKind::UploadRate => "upload_rate",
            MetricKind::PingLatency => "ping_latency",
            MetricKind::CpuPct => "cpu_pct",
            MetricKind::RamPct => "ram_pct",
            MetricKind::DiskPct => "disk_pct",
            MetricKind::BytesSentTotal => "bytes_sent_total",
            MetricKind::BytesRecvTotal => "bytes_recv_total",
        }
    }

    pub fn family(&self) -> StatFamily {
        match self {
            MetricKind::CpuPct | MetricKind::RamPct | MetricKind::DiskPct => StatFamily::System,
            _ => StatFamily::Network,
        }
    }
}

impl fmt::Display for MetricKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MetricKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        MetricKind::ALL
            .into_iter()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| anyhow::anyhow!("unknown metric kind: {}", s))
    }
}

/// One persisted measurement. Field names match the stored schema exactly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub timestamp: i64,
    pub metric_kind: MetricKind,
    pub value: f64,
    pub unit: String,
}

impl Sample {
    pub fn new(timestamp: i64, metric_kind: MetricKind, value: f64, unit: &str) -> Self {
        Self {
            timestamp,
            metric_kind,
            value,
            unit: unit.to_string(),
        }
    }
}

/// Query window presets offered to the presentation layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowDuration {
    Secs30,
    Mins5,
    Mins10,
    Mins30,
    Hours1,
    Hours24,
}

impl WindowDuration {
    pub fn as_secs(&self) -> i64 {
        match self {
            WindowDuration::Secs30 => 30,
            WindowDuration::Mins5 => 5 * 60,
            WindowDuration::Mins10 => 10 * 60,
            WindowDuration::Mins30 => 30 * 60,
            WindowDuration::Hours1 => 3600,
            WindowDuration::Hours24 => 24 * 3600,
        }
    }

    pub fn as_millis(&self) -> i64 {
        self.as_secs() * 1000
    }
}

impl FromStr for WindowDuration {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "30s" => Ok(WindowDuration::Secs30),
            "5m" => Ok(WindowDuration::Mins5),
            "10m" => Ok(WindowDuration::Mins10),
            "30m" => Ok(WindowDuration::Mins30),
            "1h" => Ok(WindowDuration::Hours1),
            "24h" => Ok(WindowDuration::Hours24),
            other => anyhow::bail!("unknown window duration: {}", other),
        }
    }
}
