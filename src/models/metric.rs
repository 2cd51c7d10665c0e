// Metric domains, comparison operators and memory pressure levels

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricKind {
    Cpu,
    Memory,
    Gpu,
    Disk,
    Network,
}

impl MetricKind {
    /// Canonical order; also the order collectors are sampled and failure counters indexed.
    pub const ALL: [MetricKind; 5] = [
        MetricKind::Cpu,
        MetricKind::Memory,
        MetricKind::Gpu,
        MetricKind::Disk,
        MetricKind::Network,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MetricKind::Cpu => "cpu",
            MetricKind::Memory => "memory",
            MetricKind::Gpu => "gpu",
            MetricKind::Disk => "disk",
            MetricKind::Network => "network",
        }
    }

    pub(crate) fn index(&self) -> usize {
        match self {
            MetricKind::Cpu => 0,
            MetricKind::Memory => 1,
            MetricKind::Gpu => 2,
            MetricKind::Disk => 3,
            MetricKind::Network => 4,
        }
    }
}

impl fmt::Display for MetricKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MetricKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "cpu" => Ok(MetricKind::Cpu),
            "memory" => Ok(MetricKind::Memory),
            "gpu" => Ok(MetricKind::Gpu),
            "disk" => Ok(MetricKind::Disk),
            "network" => Ok(MetricKind::Network),
            other => anyhow::bail!("unknown metric kind: {}", other),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComparisonOp {
    GreaterThan,
    LessThan,
}

impl ComparisonOp {
    /// Strict comparison: a value equal to the threshold never breaches.
    pub fn breaches(&self, current: f64, threshold: f64) -> bool {
        match self {
            ComparisonOp::GreaterThan => current > threshold,
            ComparisonOp::LessThan => current < threshold,
        }
    }

    pub fn symbol(&self) -> &'static str {
        match self {
            ComparisonOp::GreaterThan => ">",
            ComparisonOp::LessThan => "<",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemoryPressure {
    #[default]
    Nominal,
    Warning,
    Critical,
}

impl MemoryPressure {
    pub fn from_level(level: u32) -> Self {
        if level >= 90 {
            MemoryPressure::Critical
        } else if level >= 70 {
            MemoryPressure::Warning
        } else {
            MemoryPressure::Nominal
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MemoryPressure::Nominal => "nominal",
            MemoryPressure::Warning => "warning",
            MemoryPressure::Critical => "critical",
        }
    }
}
