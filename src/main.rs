use anyhow::Result;
use pulse::alerts::{DebouncedSink, LogSink};
use pulse::collectors::CollectorSet;
use pulse::config::AppConfig;
use pulse::engine::{EngineConfig, MetricEngine};
use pulse::history_repo::{HistoryRepo, HistoryStore};
use pulse::recorder::{HistoryRecorder, RecorderConfig};
use std::sync::Arc;
use tokio::time::{Duration, MissedTickBehavior, interval};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::time::FormatTime;

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

    let app_config = AppConfig::load()?;
    let once = std::env::args().skip(1).any(|a| a == "--once");

    if once {
        let engine = MetricEngine::new(
            CollectorSet::host(),
            EngineConfig::from_secs(app_config.engine.tick_interval_secs),
        );
        let snapshot = engine.tick_once().await;
        println!("{}", serde_json::to_string_pretty(&snapshot)?);
        return Ok(());
    }

    let history_repo = Arc::new(HistoryRepo::connect(&app_config.history.path).await?);
    history_repo.init().await?;

    let recorder = Arc::new(HistoryRecorder::new(
        history_repo.clone() as Arc<dyn HistoryStore>,
        RecorderConfig {
            batch_size: app_config.history.batch_size,
            flush_interval: Duration::from_secs(app_config.history.flush_interval_secs),
        },
    ));
    match recorder.prune_retention(app_config.history.retention_days).await {
        Ok(removed) => tracing::info!(removed, "startup prune done"),
        Err(e) => tracing::warn!(error = %e, operation = "prune", "startup prune failed"),
    }

    let engine = MetricEngine::new(
        CollectorSet::host(),
        EngineConfig::from_secs(app_config.engine.tick_interval_secs),
    )
    .with_history(recorder.clone());
    engine.set_thresholds(app_config.alerts.thresholds.clone());
    engine.set_alert_sink(Arc::new(DebouncedSink::new(
        LogSink,
        Duration::from_secs(app_config.alerts.debounce_secs),
    )));

    let mut snapshots = engine.subscribe(app_config.engine.snapshot_channel_capacity);
    engine.start();
    tracing::info!(
        db = %app_config.history.path,
        tick_interval_ms = engine.tick_interval().as_millis() as u64,
        "pulse started"
    );

    let mut prune_tick = interval(Duration::from_secs(app_config.history.prune_interval_secs));
    prune_tick.set_missed_tick_behavior(MissedTickBehavior::Skip);
    // first tick completes immediately; startup prune already ran
    prune_tick.tick().await;
    let mut stats_log_tick = interval(Duration::from_secs(
        app_config.monitoring.stats_log_interval_secs,
    ));
    stats_log_tick.set_missed_tick_behavior(MissedTickBehavior::Skip);

    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);
    let mut records_pruned_total: u64 = 0;

    loop {
        tokio::select! {
            snapshot = snapshots.recv() => {
                match snapshot {
                    Some(s) => tracing::debug!(
                        cpu = s.cpu.aggregate,
                        memory = s.memory.used_percent(),
                        gpu = s.gpu.utilization,
                        network = s.network_throughput(),
                        "snapshot"
                    ),
                    None => {
                        tracing::warn!("snapshot channel closed");
                        break;
                    }
                }
            }
            _ = prune_tick.tick() => {
                match recorder.prune_retention(app_config.history.retention_days).await {
                    Ok(removed) => {
                        records_pruned_total += removed;
                        if let Err(e) = history_repo.vacuum().await {
                            tracing::warn!(error = %e, operation = "vacuum", "VACUUM failed");
                        }
                    }
                    Err(e) => tracing::warn!(
                        error = %e,
                        operation = "prune",
                        "Failed to prune old data"
                    ),
                }
            }
            _ = stats_log_tick.tick() => {
                let stored = history_repo.count().await.unwrap_or_else(|e| {
                    tracing::warn!(error = %e, operation = "count", "count failed");
                    0
                });
                let unhealthy: Vec<&str> = engine
                    .unhealthy_collectors()
                    .iter()
                    .map(|k| k.as_str())
                    .collect();
                tracing::info!(
                    records_written_total = recorder.records_written_total(),
                    batches_dropped_total = recorder.batches_dropped_total(),
                    records_pruned_total,
                    records_stored = stored,
                    unhealthy = ?unhealthy,
                    "app stats"
                );
            }
            _ = &mut shutdown => {
                tracing::info!("Received shutdown signal");
                break;
            }
        }
    }

    engine.stop().await;
    recorder.flush().await;
    tracing::info!(
        records_written_total = recorder.records_written_total(),
        "pulse stopped"
    );
    Ok(())
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        let mut sigterm =
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
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
}
