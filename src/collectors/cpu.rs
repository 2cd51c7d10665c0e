// CPU utilization from per-core tick counters

use chrono::{DateTime, Utc};

use super::linux;
use crate::error::CollectionResult;
use crate::models::CpuReading;

/// Cumulative scheduler ticks for one core.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CoreTicks {
    pub user: u64,
    pub system: u64,
    pub idle: u64,
    pub nice: u64,
}

impl CoreTicks {
    fn busy(&self) -> u64 {
        self.user
            .saturating_add(self.system)
            .saturating_add(self.nice)
    }

    fn total(&self) -> u64 {
        self.busy().saturating_add(self.idle)
    }

    /// Usage since boot, clamped to [0, 100].
    fn instantaneous_percent(&self) -> f64 {
        let total = self.total();
        if total == 0 {
            return 0.0;
        }
        (self.busy() as f64 / total as f64 * 100.0).clamp(0.0, 100.0)
    }
}

/// Raw tick vector retained between samples.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CpuState {
    ticks: Vec<CoreTicks>,
}

impl CpuState {
    pub fn core_count(&self) -> usize {
        self.ticks.len()
    }
}

pub trait CpuTickSource: Send {
    fn read_ticks(&mut self) -> CollectionResult<Vec<CoreTicks>>;
}

/// /proc/stat on Linux; unsupported elsewhere.
#[derive(Debug, Default)]
pub struct ProcStatSource;

impl CpuTickSource for ProcStatSource {
    fn read_ticks(&mut self) -> CollectionResult<Vec<CoreTicks>> {
        linux::read_core_ticks()
    }
}

/// Aggregate usage is delta-based when `previous` has the same core count and a positive
/// total delta; deltas are summed across cores before dividing. Otherwise it falls back to
/// the mean of the per-core instantaneous percentages. Per-core values are always instantaneous.
pub fn compute_cpu(
    current: &[CoreTicks],
    previous: Option<&CpuState>,
    now: DateTime<Utc>,
) -> (CpuReading, CpuState) {
    let per_core: Vec<f64> = current
        .iter()
        .map(CoreTicks::instantaneous_percent)
        .collect();
    let mean = if per_core.is_empty() {
        0.0
    } else {
        (per_core.iter().sum::<f64>() / per_core.len() as f64).clamp(0.0, 100.0)
    };

    let aggregate = previous
        .filter(|prev| !current.is_empty() && prev.ticks.len() == current.len())
        .and_then(|prev| delta_percent(&prev.ticks, current))
        .unwrap_or(mean);

    let reading = CpuReading {
        aggregate,
        per_core,
        timestamp: now,
    };
    let state = CpuState {
        ticks: current.to_vec(),
    };
    (reading, state)
}

fn delta_percent(previous: &[CoreTicks], current: &[CoreTicks]) -> Option<f64> {
    let mut used: i128 = 0;
    let mut total: i128 = 0;
    for (p, c) in previous.iter().zip(current) {
        let du = c.user as i128 - p.user as i128;
        let ds = c.system as i128 - p.system as i128;
        let di = c.idle as i128 - p.idle as i128;
        let dn = c.nice as i128 - p.nice as i128;
        used += du + ds + dn;
        total += du + ds + di + dn;
    }
    if total <= 0 {
        return None;
    }
    Some((used as f64 / total as f64 * 100.0).clamp(0.0, 100.0))
}

pub struct CpuCollector {
    source: Box<dyn CpuTickSource>,
    state: Option<CpuState>,
}

impl CpuCollector {
    pub fn new(source: impl CpuTickSource + 'static) -> Self {
        Self {
            source: Box::new(source),
            state: None,
        }
    }

    pub fn host() -> Self {
        Self::new(ProcStatSource)
    }

    /// The stored tick vector is replaced on every successful read, whichever path computed the aggregate.
    pub fn sample(&mut self) -> CollectionResult<CpuReading> {
        let ticks = self.source.read_ticks()?;
        let (reading, state) = compute_cpu(&ticks, self.state.as_ref(), Utc::now());
        self.state = Some(state);
        Ok(reading)
    }
}
