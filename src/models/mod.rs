// Domain models: samples, probe results, system events

mod adapter;
mod event;
mod metric;
mod probe;

pub use adapter::AdapterSnapshot;
pub use event::{EventKind, SystemEvent};
pub use metric::{MetricKind, PING_UNREACHABLE, Sample, StatFamily, WindowDuration};
pub use probe::SpeedTestResult;

/// Current wall-clock time as epoch milliseconds. Falls back to 0 on a clock
/// before the epoch (logged; downstream rate logic treats it as an anomaly).
pub fn now_ms() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or_else(|e| {
            tracing::warn!(error = %e, operation = "now_ms", "system time before epoch");
            0
        })
}

/// Human-readable byte count (log lines only; stored values stay raw).
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];
    let mut value = bytes as f64;
    for unit in UNITS {
        if value < 1024.0 {
            return format!("{:.2} {}", value, unit);
        }
        value /= 1024.0;
    }
    format!("{:.2} PB", value)
}

pub fn format_rate(bytes_per_sec: f64) -> String {
    format!("{}/s", format_bytes(bytes_per_sec as u64))
}
