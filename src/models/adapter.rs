// Raw per-adapter counter snapshot, held across two consecutive fast ticks

/// One read of an adapter's cumulative byte counters. Superseded each tick;
/// only the sampler's rate state keeps the previous one.
#[derive(Debug, Clone, PartialEq)]
pub struct AdapterSnapshot {
    pub adapter: String,
    pub bytes_sent: u64,
    pub bytes_recv: u64,
    pub captured_at_ms: i64,
}
