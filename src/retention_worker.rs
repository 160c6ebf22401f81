// Housekeeping worker: prunes rows past retention on a fixed interval and
// runs VACUUM on a configurable schedule (cron expression or fixed interval).
// Pruning happens in its own transaction, never interleaved with a query.

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use crate::config::RetentionConfig;
use crate::metrics_repo::MetricsRepo;
use tracing::{debug, info, instrument, warn};

pub fn spawn(repo: Arc<MetricsRepo>, config: RetentionConfig) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        run(repo, config).await;
    })
}

#[instrument(skip(repo), fields(prune_interval_secs = config.prune_interval_secs))]
async fn run(repo: Arc<MetricsRepo>, config: RetentionConfig) {
    let mut prune_tick = tokio::time::interval(Duration::from_secs(config.prune_interval_secs));
    prune_tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    let (vacuum_tx, mut vacuum_rx) = tokio::sync::mpsc::channel::<()>(1);
    tokio::spawn(vacuum_scheduler(config.clone(), vacuum_tx));

    loop {
        tokio::select! {
            _ = prune_tick.tick() => {
                match repo.prune_old_data().await {
                    Ok(deleted) => {
                        if deleted > 0 {
                            debug!(rows_deleted = deleted, operation = "prune_old_data", "old data pruned");
                        }
                    }
                    Err(e) => {
                        warn!(error = %e, operation = "prune_old_data", "prune failed");
                    }
                }
            }
            _ = vacuum_rx.recv() => {
                if let Err(e) = repo.vacuum().await {
                    warn!(error = %e, "vacuum failed");
                } else {
                    info!("vacuum complete");
                }
            }
        }
    }
}

/// Sends a message on `tx` at each VACUUM time (cron or fixed interval). Uses local time for cron.
async fn vacuum_scheduler(config: RetentionConfig, tx: tokio::sync::mpsc::Sender<()>) {
    if let Some(ref cron_str) = config.vacuum_schedule {
        let Ok(schedule) = cron::Schedule::from_str(cron_str) else {
            warn!(cron = %cron_str, "invalid vacuum_schedule; VACUUM will not run");
            return;
        };
        loop {
            let now = chrono::Local::now();
            let next = schedule.after(&now).next();
            if let Some(next) = next {
                let delay = (next - now).to_std().unwrap_or(Duration::from_secs(1));
                tokio::time::sleep(delay).await;
                if tx.send(()).await.is_err() {
                    break;
                }
            } else {
                tokio::time::sleep(Duration::from_secs(3600)).await;
            }
        }
    } else {
        let interval = Duration::from_secs(config.vacuum_interval_secs);
        loop {
            tokio::time::sleep(interval).await;
            if tx.send(()).await.is_err() {
                break;
            }
        }
    }
}
