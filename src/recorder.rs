// Buffered history writer. Flushes on batch size or elapsed time, checked on every record() call.
// Writes are best effort: a failed batch is logged and dropped.

use crate::history_repo::HistoryStore;
use crate::models::{HistoryRecord, MetricKind, Snapshot};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::Mutex;
use tokio::time::{Duration, Instant};
use tracing::instrument;

pub const DEFAULT_BATCH_SIZE: usize = 50;
pub const DEFAULT_FLUSH_INTERVAL: Duration = Duration::from_secs(5);

#[derive(Debug, Clone)]
pub struct RecorderConfig {
    pub batch_size: usize,
    pub flush_interval: Duration,
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            flush_interval: DEFAULT_FLUSH_INTERVAL,
        }
    }
}

struct Buffer {
    records: Vec<HistoryRecord>,
    last_flush: Instant,
}

pub struct HistoryRecorder {
    store: Arc<dyn HistoryStore>,
    config: RecorderConfig,
    // held across the store write so record/flush never interleave
    buffer: Mutex<Buffer>,
    records_written_total: AtomicU64,
    batches_dropped_total: AtomicU64,
}

impl HistoryRecorder {
    pub fn new(store: Arc<dyn HistoryStore>, config: RecorderConfig) -> Self {
        Self {
            store,
            config,
            buffer: Mutex::new(Buffer {
                records: Vec::new(),
                last_flush: Instant::now(),
            }),
            records_written_total: AtomicU64::new(0),
            batches_dropped_total: AtomicU64::new(0),
        }
    }

    pub fn store(&self) -> &Arc<dyn HistoryStore> {
        &self.store
    }

    pub async fn record(&self, records: Vec<HistoryRecord>) {
        let mut buffer = self.buffer.lock().await;
        buffer.records.extend(records);
        if buffer.records.len() >= self.config.batch_size
            || buffer.last_flush.elapsed() >= self.config.flush_interval
        {
            self.flush_buffer(&mut buffer).await;
        }
    }

    pub async fn flush(&self) {
        let mut buffer = self.buffer.lock().await;
        self.flush_buffer(&mut buffer).await;
    }

    async fn flush_buffer(&self, buffer: &mut Buffer) {
        if buffer.records.is_empty() {
            return;
        }
        let batch = std::mem::take(&mut buffer.records);
        buffer.last_flush = Instant::now();
        let n = batch.len();
        match self.store.insert_batch(&batch).await {
            Ok(()) => {
                self.records_written_total
                    .fetch_add(n as u64, Ordering::Relaxed);
                tracing::debug!(operation = "insert_batch", records_count = n, "history batch written");
            }
            Err(e) => {
                self.batches_dropped_total.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(
                    error = %e,
                    operation = "insert_batch",
                    records_count = n,
                    "history write failed; batch dropped"
                );
            }
        }
    }

    /// Only flushed records are visible.
    pub async fn query(
        &self,
        metric: MetricKind,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> anyhow::Result<Vec<HistoryRecord>> {
        self.store.fetch_range(metric, from, to).await
    }

    /// Removes every record strictly older than `older_than`, across all metrics.
    #[instrument(skip(self), fields(operation = "prune"))]
    pub async fn prune(&self, older_than: DateTime<Utc>) -> anyhow::Result<u64> {
        let removed = self.store.delete_before(older_than).await?;
        tracing::debug!(removed, cutoff = %older_than, "history pruned");
        Ok(removed)
    }

    pub async fn prune_retention(&self, retention_days: u32) -> anyhow::Result<u64> {
        let cutoff = Utc::now() - chrono::Duration::days(retention_days as i64);
        self.prune(cutoff).await
    }

    pub async fn pending(&self) -> usize {
        self.buffer.lock().await.records.len()
    }

    pub fn records_written_total(&self) -> u64 {
        self.records_written_total.load(Ordering::Relaxed)
    }

    pub fn batches_dropped_total(&self) -> u64 {
        self.batches_dropped_total.load(Ordering::Relaxed)
    }
}

/// One scalar per domain; disk only when a volume is known.
pub fn records_from_snapshot(snapshot: &Snapshot) -> Vec<HistoryRecord> {
    let t = snapshot.timestamp;
    let mut out = vec![
        HistoryRecord::new(MetricKind::Cpu, snapshot.cpu.aggregate, t),
        HistoryRecord::new(MetricKind::Memory, snapshot.memory.used_percent(), t)
            .with_meta("pressure", snapshot.memory.pressure.as_str()),
        HistoryRecord::new(MetricKind::Gpu, snapshot.gpu.utilization, t),
    ];
    if let Some(disk) = snapshot.primary_disk() {
        out.push(
            HistoryRecord::new(MetricKind::Disk, disk.used_percent(), t)
                .with_meta("mount", disk.mount_point.clone()),
        );
    }
    out.push(
        HistoryRecord::new(MetricKind::Network, snapshot.network_throughput(), t)
            .with_meta("interfaces", snapshot.network.len().to_string()),
    );
    out
}
