// Shared test helpers
#![allow(dead_code)]

use chrono::{DateTime, Utc};
use pulse::collectors::cpu::{CoreTicks, CpuTickSource};
use pulse::collectors::gpu::{GpuDevice, GpuSource};
use pulse::collectors::network::{InterfaceCounters, InterfaceSource};
use pulse::error::{CollectionError, CollectionResult};
use pulse::models::*;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

const FIXED_TICKS: CoreTicks = CoreTicks {
    user: 30,
    system: 10,
    idle: 60,
    nice: 0,
};

pub fn snapshot_at(timestamp: DateTime<Utc>, cpu: f64) -> Snapshot {
    Snapshot {
        cpu: CpuReading {
            aggregate: cpu,
            per_core: vec![cpu],
            timestamp,
        },
        memory: MemoryReading {
            used: 512,
            free: 512,
            total: 1024,
            swap: 0,
            pressure: MemoryPressure::Nominal,
            timestamp,
        },
        gpu: GpuReading::zeroed(timestamp),
        disks: vec![DiskReading::from_space("/", 1000, 250, timestamp)],
        network: vec![],
        timestamp,
    }
}

pub fn records(metric: MetricKind, timestamps: &[DateTime<Utc>]) -> Vec<HistoryRecord> {
    timestamps
        .iter()
        .enumerate()
        .map(|(i, t)| HistoryRecord::new(metric, i as f64, *t))
        .collect()
}

/// CPU source that fails while `failing` is set and otherwise returns fixed ticks.
pub struct SwitchableCpu {
    pub failing: Arc<AtomicBool>,
}

impl SwitchableCpu {
    pub fn new() -> (Self, Arc<AtomicBool>) {
        let failing = Arc::new(AtomicBool::new(false));
        (
            Self {
                failing: failing.clone(),
            },
            failing,
        )
    }
}

impl CpuTickSource for SwitchableCpu {
    fn read_ticks(&mut self) -> CollectionResult<Vec<CoreTicks>> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(CollectionError::SyscallFailed { code: 5 });
        }
        Ok(vec![FIXED_TICKS])
    }
}

/// Sources that block the sampling thread for `delay` before answering.
pub struct SlowCpu(pub Duration);

impl CpuTickSource for SlowCpu {
    fn read_ticks(&mut self) -> CollectionResult<Vec<CoreTicks>> {
        std::thread::sleep(self.0);
        Ok(vec![FIXED_TICKS])
    }
}

pub struct SlowGpu(pub Duration);

impl GpuSource for SlowGpu {
    fn devices(&mut self) -> CollectionResult<Vec<GpuDevice>> {
        std::thread::sleep(self.0);
        Ok(vec![])
    }
}

pub struct SlowNetwork(pub Duration);

impl InterfaceSource for SlowNetwork {
    fn counters(&mut self) -> CollectionResult<Vec<InterfaceCounters>> {
        std::thread::sleep(self.0);
        Ok(vec![InterfaceCounters::new("eth0", 1000, 2000)])
    }
}
