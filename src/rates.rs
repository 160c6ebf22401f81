// Per-second rate derivation from two adapter counter snapshots.
// Wraparound, clock anomalies and near-simultaneous ticks never produce a
// negative or blown-up rate; they degrade to zero, no-sample or deferral.

use crate::models::AdapterSnapshot;

/// Ticks closer together than this are deferred (previous snapshot retained).
pub const MIN_ELAPSED_MS: i64 = 50;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RateOutcome {
    /// Valid interval: per-second throughput in Mbps for each direction.
    Rate {
        download_mbps: f64,
        upload_mbps: f64,
    },
    /// Clock went backward or stood still; skip the tick and reseed from
    /// the current snapshot.
    NoSample,
    /// Interval below MIN_ELAPSED_MS; keep the previous snapshot and emit
    /// nothing this tick.
    Deferred,
}

/// Derives download/upload rates from two successive snapshots of the same
/// adapter. A counter that moved backward (adapter reset or wraparound) is
/// reported as 0 for that direction, never negative.
pub fn rate(previous: &AdapterSnapshot, current: &AdapterSnapshot) -> RateOutcome {
    let elapsed_ms = current.captured_at_ms - previous.captured_at_ms;
    if elapsed_ms <= 0 {
        return RateOutcome::NoSample;
    }
    if elapsed_ms < MIN_ELAPSED_MS {
        return RateOutcome::Deferred;
    }
    let elapsed_secs = elapsed_ms as f64 / 1000.0;

    let recv_delta = counter_delta(previous.bytes_recv, current.bytes_recv);
    let sent_delta = counter_delta(previous.bytes_sent, current.bytes_sent);

    RateOutcome::Rate {
        download_mbps: mbps(recv_delta, elapsed_secs),
        upload_mbps: mbps(sent_delta, elapsed_secs),
    }
}

/// Counter delta; a decrease means the adapter reset, so the interval
/// contributes zero and the new value seeds the next one.
fn counter_delta(previous: u64, current: u64) -> u64 {
    current.saturating_sub(previous)
}

/// bytes over an interval -> megabits per second.
pub fn mbps(bytes: u64, elapsed_secs: f64) -> f64 {
    (bytes as f64) * 8.0 / elapsed_secs / 1_000_000.0
}
