use crate::engine::{MAX_TICK_INTERVAL_SECS, MIN_TICK_INTERVAL_SECS};
use crate::models::{ComparisonOp, MetricKind, ThresholdSpec};
use serde::Deserialize;
use std::path::Path;

const DEFAULT_CONFIG_PATH: &str = "pulse.toml";

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub engine: EngineSection,
    #[serde(default)]
    pub history: HistorySection,
    #[serde(default)]
    pub alerts: AlertsSection,
    #[serde(default)]
    pub monitoring: MonitoringConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EngineSection {
    /// Seconds between ticks; clamped to [0.25, 5] when applied.
    pub tick_interval_secs: f64,
    /// Snapshots buffered for the consumer before the loop waits on it.
    pub snapshot_channel_capacity: usize,
}

impl Default for EngineSection {
    fn default() -> Self {
        Self {
            tick_interval_secs: 1.0,
            snapshot_channel_capacity: 16,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HistorySection {
    pub path: String,
    pub retention_days: u32,
    pub batch_size: usize,
    pub flush_interval_secs: u64,
    /// How often to prune and vacuum (real seconds).
    pub prune_interval_secs: u64,
}

impl Default for HistorySection {
    fn default() -> Self {
        Self {
            path: "data/pulse.db".into(),
            retention_days: 30,
            batch_size: 50,
            flush_interval_secs: 5,
            prune_interval_secs: 3600,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AlertsSection {
    /// Minimum seconds between notifications for the same metric.
    pub debounce_secs: u64,
    pub thresholds: Vec<ThresholdSpec>,
}

impl Default for AlertsSection {
    fn default() -> Self {
        Self {
            debounce_secs: 60,
            thresholds: vec![
                ThresholdSpec::new(MetricKind::Cpu, ComparisonOp::GreaterThan, 90.0),
                ThresholdSpec::new(MetricKind::Disk, ComparisonOp::GreaterThan, 95.0),
            ],
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MonitoringConfig {
    /// How often to log app stats (records written, batches dropped, unhealthy collectors) at INFO level.
    pub stats_log_interval_secs: u64,
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            stats_log_interval_secs: 60,
        }
    }
}

impl AppConfig {
    /// Reads `$CONFIG_FILE`, else `pulse.toml`. Only a missing default file falls back to defaults.
    pub fn load() -> anyhow::Result<Self> {
        match std::env::var("CONFIG_FILE") {
            Ok(path) => Self::load_from_path(&path),
            Err(_) if !Path::new(DEFAULT_CONFIG_PATH).exists() => {
                tracing::info!(path = DEFAULT_CONFIG_PATH, "no config file; using defaults");
                Ok(Self::default())
            }
            Err(_) => Self::load_from_path(DEFAULT_CONFIG_PATH),
        }
    }

    pub fn load_from_path(path: &str) -> anyhow::Result<Self> {
        let s = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("reading config {}: {}", path, e))?;
        Self::load_from_str(&s)
    }

    /// Parse and validate config from a string (e.g. for tests).
    pub fn load_from_str(s: &str) -> anyhow::Result<Self> {
        let config: AppConfig = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> anyhow::Result<()> {
        let tick = self.engine.tick_interval_secs;
        anyhow::ensure!(
            tick.is_finite() && tick > 0.0,
            "engine.tick_interval_secs must be a positive number, got {}",
            tick
        );
        if !(MIN_TICK_INTERVAL_SECS..=MAX_TICK_INTERVAL_SECS).contains(&tick) {
            tracing::warn!(
                tick_interval_secs = tick,
                "engine.tick_interval_secs outside [{}, {}]; it will be clamped",
                MIN_TICK_INTERVAL_SECS,
                MAX_TICK_INTERVAL_SECS
            );
        }
        anyhow::ensure!(
            self.engine.snapshot_channel_capacity > 0,
            "engine.snapshot_channel_capacity must be > 0, got {}",
            self.engine.snapshot_channel_capacity
        );
        anyhow::ensure!(
            !self.history.path.is_empty(),
            "history.path must be non-empty"
        );
        anyhow::ensure!(
            self.history.retention_days > 0,
            "history.retention_days must be > 0, got {}",
            self.history.retention_days
        );
        anyhow::ensure!(
            self.history.batch_size > 0,
            "history.batch_size must be > 0, got {}",
            self.history.batch_size
        );
        anyhow::ensure!(
            self.history.flush_interval_secs > 0,
            "history.flush_interval_secs must be > 0, got {}",
            self.history.flush_interval_secs
        );
        anyhow::ensure!(
            self.history.prune_interval_secs > 0,
            "history.prune_interval_secs must be > 0, got {}",
            self.history.prune_interval_secs
        );
        for (i, t) in self.alerts.thresholds.iter().enumerate() {
            anyhow::ensure!(
                t.value.is_finite(),
                "alerts.thresholds[{}].value must be finite, got {}",
                i,
                t.value
            );
        }
        anyhow::ensure!(
            self.monitoring.stats_log_interval_secs > 0,
            "monitoring.stats_log_interval_secs must be > 0, got {}",
            self.monitoring.stats_log_interval_secs
        );
        Ok(())
    }
}
