use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub monitoring: MonitoringConfig,
    #[serde(default)]
    pub probe: ProbeConfig,
    pub export: ExportConfig,
    #[serde(default)]
    pub retention: RetentionConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub port: u16,
    pub host: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub path: String,
    pub max_pool_size: u32,
    #[serde(default = "default_retention_days")]
    pub retention_days: u32,
}

fn default_retention_days() -> u32 {
    7
}

/// Sampling cadence. sample_interval_ms is restricted to the supported
/// dashboard resolutions (1s, 3s, 5s).
#[derive(Debug, Clone, Deserialize)]
pub struct MonitoringConfig {
    pub sample_interval_ms: u64,
    /// How often to log app stats (samples saved, adapter set) at INFO level.
    pub stats_log_interval_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ProbeConfig {
    /// Bandwidth probe cadence; pings run on the fast cadence.
    pub interval_secs: u64,
    /// Latency endpoints tried in order; first successful connect wins.
    pub ping_endpoints: Vec<String>,
    pub ping_timeout_ms: u64,
    pub download_url: String,
    pub upload_url: String,
    pub upload_bytes: usize,
    /// Overall cap on one bandwidth probe direction.
    pub timeout_secs: u64,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            interval_secs: 300,
            ping_endpoints: vec!["1.1.1.1:53".into(), "8.8.8.8:53".into()],
            ping_timeout_ms: 1000,
            download_url: "https://speed.cloudflare.com/__down?bytes=10000000".into(),
            upload_url: "https://speed.cloudflare.com/__up".into(),
            upload_bytes: 2_000_000,
            timeout_secs: 60,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExportConfig {
    pub directory: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RetentionConfig {
    pub prune_interval_secs: u64,
    /// Optional cron expression for VACUUM (e.g. "0 0 3 * * *" = 03:00 daily). Uses local time.
    pub vacuum_schedule: Option<String>,
    /// Run VACUUM every N seconds when vacuum_schedule is not set.
    pub vacuum_interval_secs: u64,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            prune_interval_secs: 3600,
            vacuum_schedule: None,
            vacuum_interval_secs: 86_400,
        }
    }
}

const SUPPORTED_SAMPLE_INTERVALS_MS: [u64; 3] = [1000, 3000, 5000];

impl AppConfig {
    pub fn load() -> anyhow::Result<Self> {
        let path = std::env::var("CONFIG_FILE").unwrap_or_else(|_| "config.toml".into());
        let s = std::fs::read_to_string(&path)?;
        Self::load_from_str(&s)
    }

    /// Parse and validate config from a string (e.g. for tests).
    pub fn load_from_str(s: &str) -> anyhow::Result<Self> {
        let config: AppConfig = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(
            self.server.port > 0,
            "server.port must be between 1 and 65535, got {}",
            self.server.port
        );
        anyhow::ensure!(
            !self.database.path.is_empty(),
            "database.path must be non-empty"
        );
        anyhow::ensure!(
            self.database.max_pool_size > 0,
            "database.max_pool_size must be > 0, got {}",
            self.database.max_pool_size
        );
        anyhow::ensure!(
            self.database.retention_days > 0,
            "database.retention_days must be > 0, got {}",
            self.database.retention_days
        );
        anyhow::ensure!(
            SUPPORTED_SAMPLE_INTERVALS_MS.contains(&self.monitoring.sample_interval_ms),
            "monitoring.sample_interval_ms must be one of {:?}, got {}",
            SUPPORTED_SAMPLE_INTERVALS_MS,
            self.monitoring.sample_interval_ms
        );
        anyhow::ensure!(
            self.monitoring.stats_log_interval_secs > 0,
            "monitoring.stats_log_interval_secs must be > 0, got {}",
            self.monitoring.stats_log_interval_secs
        );
        anyhow::ensure!(
            self.probe.interval_secs > 0,
            "probe.interval_secs must be > 0, got {}",
            self.probe.interval_secs
        );
        anyhow::ensure!(
            !self.probe.ping_endpoints.is_empty(),
            "probe.ping_endpoints must list at least one endpoint"
        );
        anyhow::ensure!(
            self.probe.ping_timeout_ms > 0,
            "probe.ping_timeout_ms must be > 0, got {}",
            self.probe.ping_timeout_ms
        );
        anyhow::ensure!(
            !self.probe.download_url.is_empty(),
            "probe.download_url must be non-empty"
        );
        anyhow::ensure!(
            !self.probe.upload_url.is_empty(),
            "probe.upload_url must be non-empty"
        );
        anyhow::ensure!(
            self.probe.upload_bytes > 0,
            "probe.upload_bytes must be > 0, got {}",
            self.probe.upload_bytes
        );
        anyhow::ensure!(
            self.probe.timeout_secs > 0,
            "probe.timeout_secs must be > 0, got {}",
            self.probe.timeout_secs
        );
        anyhow::ensure!(
            !self.export.directory.is_empty(),
            "export.directory must be non-empty"
        );
        anyhow::ensure!(
            self.retention.prune_interval_secs > 0,
            "retention.prune_interval_secs must be > 0, got {}",
            self.retention.prune_interval_secs
        );
        anyhow::ensure!(
            self.retention.vacuum_interval_secs > 0,
            "retention.vacuum_interval_secs must be > 0, got {}",
            self.retention.vacuum_interval_secs
        );
        Ok(())
    }
}
