use anyhow::Result;
use netscope::*;
use std::sync::Arc;
use std::sync::atomic::AtomicU64;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::time::FormatTime;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

struct LocalTimer;

impl FormatTime for LocalTimer {
    fn format_time(&self, w: &mut tracing_subscriber::fmt::format::Writer<'_>) -> std::fmt::Result {
        write!(
            w,
            "{}",
            chrono::Local::now().format("%Y-%m-%dT%H:%M:%S%.3f%:z")
        )
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_timer(LocalTimer)
        .with_env_filter(filter)
        .init();

    let app_config = config::AppConfig::load()?;

    let sysinfo_repo = Arc::new(sysinfo_repo::SysinfoRepo::new());
    let prober = Arc::new(prober::Prober::new(&app_config.probe)?);
    let metrics_repo = Arc::new(
        metrics_repo::MetricsRepo::connect(
            &app_config.database.path,
            app_config.database.max_pool_size,
            app_config.database.retention_days,
        )
        .await?,
    );
    metrics_repo.init().await?;

    let samples_saved_total = Arc::new(AtomicU64::new(0));
    let (write_tx, write_rx) = tokio::sync::mpsc::channel(sampler::WRITER_CHANNEL_CAPACITY);
    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel();

    let writer_handle = sampler::spawn_store_writer(
        write_rx,
        metrics_repo.clone(),
        samples_saved_total.clone(),
    );
    let sampler_handle = sampler::spawn(
        sampler::SamplerDeps {
            sysinfo_repo: sysinfo_repo.clone(),
            prober: prober.clone(),
            write_tx,
            samples_saved_total,
            shutdown_rx,
        },
        sampler::SamplerConfig {
            sample_interval_ms: app_config.monitoring.sample_interval_ms,
            probe_interval_secs: app_config.probe.interval_secs,
            stats_log_interval_secs: app_config.monitoring.stats_log_interval_secs,
        },
    );
    let _retention_handle =
        retention_worker::spawn(metrics_repo.clone(), app_config.retention.clone());

    let app = routes::app(metrics_repo.clone());
    let addr = format!("{}:{}", app_config.server.host, app_config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Listening on http://{}", addr);

    tokio::select! {
        result = axum::serve(listener, app) => {
            result?;
        }
        _ = async {
            #[cfg(unix)]
            {
                let mut sigterm = match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                    Ok(s) => s,
                    Err(_) => {
                        let _ = tokio::signal::ctrl_c().await;
                        return;
                    }
                };
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = sigterm.recv() => {}
                }
            }
            #[cfg(not(unix))]
            {
                let _ = tokio::signal::ctrl_c().await;
            }
        } => {
            tracing::info!("Received shutdown signal");
            let _ = shutdown_tx.send(());
            // Sampler finishes its in-flight tick and emits the shutdown
            // event; the writer drains the queue before exiting.
            let _ = sampler_handle.await;
            let _ = writer_handle.await;
        }
    }

    Ok(())
}
