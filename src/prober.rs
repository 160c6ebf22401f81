// Active network measurements: TCP-connect latency against an ordered
// endpoint list, and a multi-second HTTP bandwidth probe. Both are fallible
// by design; callers record the failure and keep their cadence.

use crate::config::ProbeConfig;
use crate::models::{SpeedTestResult, now_ms};
use crate::rates;
use bytes::Bytes;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::{debug, instrument};

#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("http: {0}")]
    Http(#[from] reqwest::Error),
    #[error("download produced no data")]
    EmptyDownload,
}

/// Outcome of one latency check. Unreachable is a data point, not an error.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PingOutcome {
    ReachedMs(f64),
    Unreachable,
}

pub struct Prober {
    endpoints: Vec<String>,
    ping_timeout: Duration,
    http: reqwest::Client,
    download_url: String,
    upload_url: String,
    /// Zero-filled upload body, built once and cheaply cloned per probe.
    upload_payload: Bytes,
    server_id: String,
}

impl Prober {
    pub fn new(config: &ProbeConfig) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        let server_id = reqwest::Url::parse(&config.download_url)?
            .host_str()
            .map(str::to_string)
            .unwrap_or_else(|| "unknown".into());
        Ok(Self {
            endpoints: config.ping_endpoints.clone(),
            ping_timeout: Duration::from_millis(config.ping_timeout_ms),
            http,
            download_url: config.download_url.clone(),
            upload_url: config.upload_url.clone(),
            upload_payload: Bytes::from(vec![0u8; config.upload_bytes]),
            server_id,
        })
    }

    /// Round-trip estimate: TCP connect time to the first endpoint that
    /// answers within the per-endpoint timeout. All endpoints failing is
    /// reported as Unreachable, never as an error.
    #[instrument(skip(self), fields(operation = "ping"))]
    pub async fn ping(&self) -> PingOutcome {
        for endpoint in &self.endpoints {
            let started = Instant::now();
            match timeout(self.ping_timeout, TcpStream::connect(endpoint.as_str())).await {
                Ok(Ok(_stream)) => {
                    let ms = started.elapsed().as_secs_f64() * 1000.0;
                    return PingOutcome::ReachedMs(ms);
                }
                Ok(Err(e)) => {
                    debug!(endpoint = %endpoint, error = %e, "ping connect failed");
                }
                Err(_) => {
                    debug!(endpoint = %endpoint, "ping timed out");
                }
            }
        }
        PingOutcome::Unreachable
    }

    /// Timed download of a sized payload followed by a timed upload of a
    /// generated one. Blocking for several seconds; run off the fast tick.
    #[instrument(skip(self), fields(operation = "bandwidth_probe"))]
    pub async fn bandwidth_probe(&self) -> Result<SpeedTestResult, ProbeError> {
        let started = Instant::now();
        let mut response = self
            .http
            .get(&self.download_url)
            .send()
            .await?
            .error_for_status()?;
        let mut received: u64 = 0;
        while let Some(chunk) = response.chunk().await? {
            received += chunk.len() as u64;
        }
        if received == 0 {
            return Err(ProbeError::EmptyDownload);
        }
        let download_secs = started.elapsed().as_secs_f64().max(1e-3);
        let download_mbps = rates::mbps(received, download_secs);

        let started = Instant::now();
        self.http
            .post(&self.upload_url)
            .body(self.upload_payload.clone())
            .send()
            .await?
            .error_for_status()?;
        let upload_secs = started.elapsed().as_secs_f64().max(1e-3);
        let upload_mbps = rates::mbps(self.upload_payload.len() as u64, upload_secs);

        Ok(SpeedTestResult {
            timestamp: now_ms(),
            download_mbps: round2(download_mbps),
            upload_mbps: round2(upload_mbps),
            server_id: self.server_id.clone(),
        })
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
