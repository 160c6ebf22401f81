// Bandwidth probe result

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpeedTestResult {
    pub timestamp: i64,
    pub download_mbps: f64,
    pub upload_mbps: f64,
    pub server_id: String,
}
