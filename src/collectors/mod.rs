// Host metric collectors. One per domain; CPU and network keep rate state between calls.

pub mod cpu;
pub mod disk;
pub mod gpu;
mod linux;
pub mod memory;
pub mod network;

use crate::error::CollectionResult;
use crate::models::{
    CpuReading, DiskReading, GpuReading, MemoryReading, MetricKind, NetworkReading,
};
use tracing::instrument;

pub use cpu::CpuCollector;
pub use disk::DiskCollector;
pub use gpu::GpuCollector;
pub use memory::MemoryCollector;
pub use network::NetworkCollector;

/// The fixed set of collectors the engine drives.
pub enum Collector {
    Cpu(CpuCollector),
    Memory(MemoryCollector),
    Gpu(GpuCollector),
    Disk(DiskCollector),
    Network(NetworkCollector),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Reading {
    Cpu(CpuReading),
    Memory(MemoryReading),
    Gpu(GpuReading),
    Disk(Vec<DiskReading>),
    Network(Vec<NetworkReading>),
}

impl Reading {
    pub fn kind(&self) -> MetricKind {
        match self {
            Reading::Cpu(_) => MetricKind::Cpu,
            Reading::Memory(_) => MetricKind::Memory,
            Reading::Gpu(_) => MetricKind::Gpu,
            Reading::Disk(_) => MetricKind::Disk,
            Reading::Network(_) => MetricKind::Network,
        }
    }
}

impl Collector {
    pub fn kind(&self) -> MetricKind {
        match self {
            Collector::Cpu(_) => MetricKind::Cpu,
            Collector::Memory(_) => MetricKind::Memory,
            Collector::Gpu(_) => MetricKind::Gpu,
            Collector::Disk(_) => MetricKind::Disk,
            Collector::Network(_) => MetricKind::Network,
        }
    }

    /// Blocking; the engine runs it on the blocking pool.
    #[instrument(level = "trace", skip(self), fields(collector = %self.kind()))]
    pub fn sample(&mut self) -> CollectionResult<Reading> {
        match self {
            Collector::Cpu(c) => c.sample().map(Reading::Cpu),
            Collector::Memory(c) => c.sample().map(Reading::Memory),
            Collector::Gpu(c) => c.sample().map(Reading::Gpu),
            Collector::Disk(c) => c.sample().map(Reading::Disk),
            Collector::Network(c) => c.sample().map(Reading::Network),
        }
    }
}

pub struct CollectorSet {
    pub cpu: CpuCollector,
    pub memory: MemoryCollector,
    pub gpu: GpuCollector,
    pub disk: DiskCollector,
    pub network: NetworkCollector,
}

impl CollectorSet {
    pub fn host() -> Self {
        Self {
            cpu: CpuCollector::host(),
            memory: MemoryCollector::host(),
            gpu: GpuCollector::host(),
            disk: DiskCollector::host(),
            network: NetworkCollector::host(),
        }
    }

    /// In `MetricKind::ALL` order.
    pub fn into_collectors(self) -> [Collector; 5] {
        [
            Collector::Cpu(self.cpu),
            Collector::Memory(self.memory),
            Collector::Gpu(self.gpu),
            Collector::Disk(self.disk),
            Collector::Network(self.network),
        ]
    }
}
