// Point-in-time lifecycle and anomaly records

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Startup,
    Shutdown,
    SpeedTestRun,
    AdapterChange,
    Error,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Startup => "startup",
            EventKind::Shutdown => "shutdown",
            EventKind::SpeedTestRun => "speed_test_run",
            EventKind::AdapterChange => "adapter_change",
            EventKind::Error => "error",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "startup" => Ok(EventKind::Startup),
            "shutdown" => Ok(EventKind::Shutdown),
            "speed_test_run" => Ok(EventKind::SpeedTestRun),
            "adapter_change" => Ok(EventKind::AdapterChange),
            "error" => Ok(EventKind::Error),
            other => anyhow::bail!("unknown event kind: {}", other),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemEvent {
    pub timestamp: i64,
    pub event_kind: EventKind,
    pub message: String,
}

impl SystemEvent {
    pub fn new(event_kind: EventKind, message: impl Into<String>) -> Self {
        Self {
            timestamp: super::now_ms(),
            event_kind,
            message: message.into(),
        }
    }

    pub fn at(timestamp: i64, event_kind: EventKind, message: impl Into<String>) -> Self {
        Self {
            timestamp,
            event_kind,
            message: message.into(),
        }
    }
}
