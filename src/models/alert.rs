// Alert thresholds and breach events

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{ComparisonOp, MetricKind};

/// A user-configured rule. Owned by the caller; the evaluator only reads it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThresholdSpec {
    pub metric: MetricKind,
    pub op: ComparisonOp,
    pub value: f64,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

impl ThresholdSpec {
    pub fn new(metric: MetricKind, op: ComparisonOp, value: f64) -> Self {
        Self {
            metric,
            op,
            value,
            enabled: true,
        }
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertEvent {
    pub metric: MetricKind,
    pub threshold: f64,
    pub op: ComparisonOp,
    pub current: f64,
    pub timestamp: DateTime<Utc>,
}
