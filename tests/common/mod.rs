// Shared test helpers

use netscope::metrics_repo::MetricsRepo;
use netscope::models::{MetricKind, Sample, StatFamily};
use tempfile::TempDir;

pub async fn test_repo() -> (TempDir, MetricsRepo) {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("netscope.db");
    let repo = MetricsRepo::connect(path.to_str().unwrap(), 2, 7)
        .await
        .unwrap();
    repo.init().await.unwrap();
    (dir, repo)
}

pub fn sample(timestamp: i64, kind: MetricKind, value: f64) -> Sample {
    let unit = match kind {
        MetricKind::DownloadRate | MetricKind::UploadRate => "Mbps",
        MetricKind::PingLatency => "ms",
        k if k.family() == StatFamily::System => "percent",
        _ => "bytes",
    };
    Sample::new(timestamp, kind, value, unit)
}
