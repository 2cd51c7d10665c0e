// HistoryRecorder tests: size and time flush triggers, dropped batches, visibility

mod common;

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use pulse::history_repo::{HistoryRepo, HistoryStore, MemoryHistoryStore};
use pulse::models::{HistoryRecord, MetricKind};
use pulse::recorder::{HistoryRecorder, RecorderConfig, records_from_snapshot};
use std::sync::Arc;
use tokio::time::Duration;

struct FailingStore;

#[async_trait]
impl HistoryStore for FailingStore {
    async fn insert_batch(&self, _records: &[HistoryRecord]) -> anyhow::Result<()> {
        anyhow::bail!("disk full")
    }

    async fn fetch_range(
        &self,
        _metric: MetricKind,
        _from: DateTime<Utc>,
        _to: DateTime<Utc>,
    ) -> anyhow::Result<Vec<HistoryRecord>> {
        Ok(vec![])
    }

    async fn delete_before(&self, _cutoff: DateTime<Utc>) -> anyhow::Result<u64> {
        Ok(0)
    }
}

fn recorder_with(store: Arc<dyn HistoryStore>, flush_interval: Duration) -> HistoryRecorder {
    HistoryRecorder::new(
        store,
        RecorderConfig {
            batch_size: 50,
            flush_interval,
        },
    )
}

fn cpu_records(n: usize) -> Vec<HistoryRecord> {
    let now = Utc::now();
    (0..n)
        .map(|i| HistoryRecord::new(MetricKind::Cpu, i as f64, now))
        .collect()
}

#[tokio::test]
async fn fiftieth_record_triggers_flush() {
    let store = Arc::new(MemoryHistoryStore::new());
    let recorder = recorder_with(store.clone(), Duration::from_secs(3600));

    recorder.record(cpu_records(49)).await;
    assert_eq!(store.len(), 0);
    assert_eq!(recorder.pending().await, 49);

    recorder.record(cpu_records(1)).await;
    assert_eq!(store.len(), 50);
    assert_eq!(recorder.pending().await, 0);
    assert_eq!(recorder.records_written_total(), 50);
}

#[tokio::test(start_paused = true)]
async fn elapsed_interval_triggers_flush_on_next_record() {
    let store = Arc::new(MemoryHistoryStore::new());
    let recorder = recorder_with(store.clone(), Duration::from_secs(5));

    recorder.record(cpu_records(1)).await;
    assert_eq!(store.len(), 0);

    tokio::time::advance(Duration::from_secs(4)).await;
    recorder.record(cpu_records(1)).await;
    assert_eq!(store.len(), 0);

    tokio::time::advance(Duration::from_secs(1)).await;
    recorder.record(cpu_records(1)).await;
    assert_eq!(store.len(), 3);
    assert_eq!(recorder.pending().await, 0);
}

#[tokio::test]
async fn failed_write_drops_batch() {
    let recorder = recorder_with(Arc::new(FailingStore), Duration::from_secs(3600));

    recorder.record(cpu_records(50)).await;
    assert_eq!(recorder.pending().await, 0);
    assert_eq!(recorder.batches_dropped_total(), 1);
    assert_eq!(recorder.records_written_total(), 0);

    // nothing re-buffered
    recorder.flush().await;
    assert_eq!(recorder.batches_dropped_total(), 1);
}

#[tokio::test]
async fn unflushed_records_are_invisible_to_query() {
    let store = Arc::new(MemoryHistoryStore::new());
    let recorder = recorder_with(store, Duration::from_secs(3600));
    let from = Utc::now() - ChronoDuration::seconds(1);

    recorder.record(cpu_records(3)).await;
    let to = Utc::now() + ChronoDuration::seconds(1);
    assert!(recorder.query(MetricKind::Cpu, from, to).await.unwrap().is_empty());

    recorder.flush().await;
    let got = recorder.query(MetricKind::Cpu, from, to).await.unwrap();
    assert_eq!(got.len(), 3);
}

#[tokio::test]
async fn empty_flush_is_a_no_op() {
    let recorder = recorder_with(Arc::new(FailingStore), Duration::from_secs(3600));
    recorder.flush().await;
    assert_eq!(recorder.batches_dropped_total(), 0);
}

#[tokio::test]
async fn snapshot_records_persist_and_prune_through_sqlite() {
    let dir = tempfile::TempDir::new().unwrap();
    let path = dir.path().join("history.db");
    let repo = Arc::new(HistoryRepo::connect(path.to_str().unwrap()).await.unwrap());
    repo.init().await.unwrap();
    let recorder = recorder_with(repo.clone(), Duration::from_secs(3600));

    let now = Utc::now();
    let old = now - ChronoDuration::days(40);
    recorder
        .record(records_from_snapshot(&common::snapshot_at(old, 10.0)))
        .await;
    recorder
        .record(records_from_snapshot(&common::snapshot_at(now, 20.0)))
        .await;
    recorder.flush().await;
    assert_eq!(repo.count().await.unwrap(), 10);

    let removed = recorder.prune_retention(30).await.unwrap();
    assert_eq!(removed, 5);

    let cpu = recorder
        .query(MetricKind::Cpu, old, now)
        .await
        .unwrap();
    assert_eq!(cpu.len(), 1);
    assert_eq!(cpu[0].value, 20.0);

    let disk = recorder.query(MetricKind::Disk, old, now).await.unwrap();
    assert_eq!(disk[0].value, 75.0);
    assert_eq!(disk[0].metadata["mount"], "/");
}
