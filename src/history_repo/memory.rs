// In-process history store with the same contract as the SQLite repo

use super::HistoryStore;
use crate::models::{HistoryRecord, MetricKind};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;

#[derive(Default)]
pub struct MemoryHistoryStore {
    records: Mutex<Vec<HistoryRecord>>,
}

impl MemoryHistoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }
}

#[async_trait]
impl HistoryStore for MemoryHistoryStore {
    async fn insert_batch(&self, records: &[HistoryRecord]) -> anyhow::Result<()> {
        self.records.lock().extend_from_slice(records);
        Ok(())
    }

    async fn fetch_range(
        &self,
        metric: MetricKind,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> anyhow::Result<Vec<HistoryRecord>> {
        let mut out: Vec<HistoryRecord> = self
            .records
            .lock()
            .iter()
            .filter(|r| r.metric == metric && r.timestamp >= from && r.timestamp <= to)
            .cloned()
            .collect();
        // stable: equal timestamps keep insertion order
        out.sort_by_key(|r| r.timestamp);
        Ok(out)
    }

    async fn delete_before(&self, cutoff: DateTime<Utc>) -> anyhow::Result<u64> {
        let mut records = self.records.lock();
        let before = records.len();
        records.retain(|r| r.timestamp >= cutoff);
        Ok((before - records.len()) as u64)
    }
}
