// Config loading and validation tests

use pulse::config::AppConfig;
use pulse::models::{ComparisonOp, MetricKind};

const VALID_CONFIG: &str = r#"
[engine]
tick_interval_secs = 2.0
snapshot_channel_capacity = 8

[history]
path = "data/test.db"
retention_days = 7
batch_size = 20
flush_interval_secs = 3
prune_interval_secs = 600

[alerts]
debounce_secs = 30

[[alerts.thresholds]]
metric = "memory"
op = "greater_than"
value = 80.0

[[alerts.thresholds]]
metric = "gpu"
op = "less_than"
value = 5.0
enabled = false

[monitoring]
stats_log_interval_secs = 120
"#;

#[test]
fn test_config_loads_from_str() {
    let config = AppConfig::load_from_str(VALID_CONFIG).expect("load_from_str");
    assert_eq!(config.engine.tick_interval_secs, 2.0);
    assert_eq!(config.engine.snapshot_channel_capacity, 8);
    assert_eq!(config.history.path, "data/test.db");
    assert_eq!(config.history.retention_days, 7);
    assert_eq!(config.history.batch_size, 20);
    assert_eq!(config.alerts.debounce_secs, 30);
    assert_eq!(config.monitoring.stats_log_interval_secs, 120);

    let thresholds = &config.alerts.thresholds;
    assert_eq!(thresholds.len(), 2);
    assert_eq!(thresholds[0].metric, MetricKind::Memory);
    assert_eq!(thresholds[0].op, ComparisonOp::GreaterThan);
    assert!(thresholds[0].enabled);
    assert_eq!(thresholds[1].op, ComparisonOp::LessThan);
    assert!(!thresholds[1].enabled);
}

#[test]
fn test_empty_config_uses_defaults() {
    let config = AppConfig::load_from_str("").expect("defaults");
    assert_eq!(config.engine.tick_interval_secs, 1.0);
    assert_eq!(config.history.path, "data/pulse.db");
    assert_eq!(config.history.retention_days, 30);
    assert_eq!(config.history.batch_size, 50);
    assert_eq!(config.history.flush_interval_secs, 5);
    assert_eq!(config.alerts.debounce_secs, 60);

    let defaults: Vec<(MetricKind, f64)> = config
        .alerts
        .thresholds
        .iter()
        .map(|t| (t.metric, t.value))
        .collect();
    assert_eq!(defaults, vec![(MetricKind::Cpu, 90.0), (MetricKind::Disk, 95.0)]);
}

#[test]
fn test_out_of_range_tick_interval_is_accepted() {
    let cfg = VALID_CONFIG.replace("tick_interval_secs = 2.0", "tick_interval_secs = 30.0");
    let config = AppConfig::load_from_str(&cfg).expect("clamped later, not rejected");
    assert_eq!(config.engine.tick_interval_secs, 30.0);
}

#[test]
fn test_config_validation_rejects_non_positive_tick_interval() {
    let bad = VALID_CONFIG.replace("tick_interval_secs = 2.0", "tick_interval_secs = 0.0");
    let err = AppConfig::load_from_str(&bad).unwrap_err();
    assert!(err.to_string().contains("engine.tick_interval_secs"));
}

#[test]
fn test_config_validation_rejects_empty_db_path() {
    let bad = VALID_CONFIG.replace("path = \"data/test.db\"", "path = \"\"");
    let err = AppConfig::load_from_str(&bad).unwrap_err();
    assert!(err.to_string().contains("history.path"));
}

#[test]
fn test_config_validation_rejects_zero_retention() {
    let bad = VALID_CONFIG.replace("retention_days = 7", "retention_days = 0");
    let err = AppConfig::load_from_str(&bad).unwrap_err();
    assert!(err.to_string().contains("history.retention_days"));
}

#[test]
fn test_config_validation_rejects_zero_batch_size() {
    let bad = VALID_CONFIG.replace("batch_size = 20", "batch_size = 0");
    let err = AppConfig::load_from_str(&bad).unwrap_err();
    assert!(err.to_string().contains("history.batch_size"));
}

#[test]
fn test_config_rejects_unknown_metric() {
    let bad = VALID_CONFIG.replace("metric = \"memory\"", "metric = \"battery\"");
    assert!(AppConfig::load_from_str(&bad).is_err());
}

#[test]
fn test_config_load_from_path() {
    let dir = tempfile::TempDir::new().unwrap();
    let path = dir.path().join("pulse.toml");
    std::fs::write(&path, VALID_CONFIG).unwrap();
    let config = AppConfig::load_from_path(path.to_str().unwrap()).unwrap();
    assert_eq!(config.history.retention_days, 7);

    let missing = dir.path().join("missing.toml");
    assert!(AppConfig::load_from_path(missing.to_str().unwrap()).is_err());
}
