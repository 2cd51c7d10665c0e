// Per-domain readings and the merged per-tick snapshot

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{MemoryPressure, MetricKind};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CpuReading {
    /// Aggregate utilization in [0, 100].
    pub aggregate: f64,
    pub per_core: Vec<f64>,
    pub timestamp: DateTime<Utc>,
}

impl CpuReading {
    pub fn zeroed(timestamp: DateTime<Utc>) -> Self {
        Self {
            aggregate: 0.0,
            per_core: vec![],
            timestamp,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemoryReading {
    pub used: u64,
    pub free: u64,
    pub total: u64,
    pub swap: u64,
    pub pressure: MemoryPressure,
    pub timestamp: DateTime<Utc>,
}

impl MemoryReading {
    /// Placeholder when memory could not be read: nothing used, everything free.
    pub fn unavailable(total: u64, timestamp: DateTime<Utc>) -> Self {
        Self {
            used: 0,
            free: total,
            total,
            swap: 0,
            pressure: MemoryPressure::Nominal,
            timestamp,
        }
    }

    pub fn used_percent(&self) -> f64 {
        self.used as f64 / self.total.max(1) as f64 * 100.0
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GpuReading {
    pub utilization: f64,
    pub vram_used: u64,
    /// Never 0; floored to 1 so ratios downstream are always defined.
    pub vram_total: u64,
    pub temperature: Option<f64>,
    pub timestamp: DateTime<Utc>,
}

impl GpuReading {
    pub fn zeroed(timestamp: DateTime<Utc>) -> Self {
        Self {
            utilization: 0.0,
            vram_used: 0,
            vram_total: 1,
            temperature: None,
            timestamp,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiskReading {
    pub mount_point: String,
    pub total_bytes: u64,
    pub used_bytes: u64,
    pub available_bytes: u64,
    pub timestamp: DateTime<Utc>,
}

impl DiskReading {
    /// `used = total - available`, or 0 when the filesystem reports more available than total.
    pub fn from_space(
        mount_point: impl Into<String>,
        total_bytes: u64,
        available_bytes: u64,
        timestamp: DateTime<Utc>,
    ) -> Self {
        let used_bytes = if total_bytes >= available_bytes {
            total_bytes - available_bytes
        } else {
            0
        };
        Self {
            mount_point: mount_point.into(),
            total_bytes,
            used_bytes,
            available_bytes,
            timestamp,
        }
    }

    pub fn used_percent(&self) -> f64 {
        if self.total_bytes > 0 {
            self.used_bytes as f64 / self.total_bytes as f64 * 100.0
        } else {
            0.0
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkReading {
    pub interface: String,
    pub bytes_in: u64,
    pub bytes_out: u64,
    pub bytes_in_per_sec: f64,
    pub bytes_out_per_sec: f64,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    pub cpu: CpuReading,
    pub memory: MemoryReading,
    pub gpu: GpuReading,
    pub disks: Vec<DiskReading>,
    pub network: Vec<NetworkReading>,
    pub timestamp: DateTime<Utc>,
}

impl Snapshot {
    /// Root volume if mounted, otherwise the first volume reported.
    pub fn primary_disk(&self) -> Option<&DiskReading> {
        self.disks
            .iter()
            .find(|d| d.mount_point == "/")
            .or_else(|| self.disks.first())
    }

    /// Sum of inbound and outbound bytes/sec across all interfaces.
    pub fn network_throughput(&self) -> f64 {
        self.network
            .iter()
            .map(|n| n.bytes_in_per_sec + n.bytes_out_per_sec)
            .sum()
    }

    /// Scalar used for alerting and history. `None` only for disk when no volume is known.
    pub fn scalar(&self, kind: MetricKind) -> Option<f64> {
        match kind {
            MetricKind::Cpu => Some(self.cpu.aggregate),
            MetricKind::Memory => Some(self.memory.used_percent()),
            MetricKind::Gpu => Some(self.gpu.utilization),
            MetricKind::Disk => self.primary_disk().map(DiskReading::used_percent),
            MetricKind::Network => Some(self.network_throughput()),
        }
    }
}
