// Domain models: metric kinds, readings, snapshots, thresholds, history samples

mod alert;
mod history;
mod metric;
mod readings;

pub use alert::{AlertEvent, ThresholdSpec};
pub use history::HistoryRecord;
pub use metric::{ComparisonOp, MemoryPressure, MetricKind};
pub use readings::{
    CpuReading, DiskReading, GpuReading, MemoryReading, NetworkReading, Snapshot,
};
