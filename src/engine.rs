// Polling loop: samples all five collectors concurrently each tick, merges a snapshot,
// then feeds history, alerts and the subscriber channel.

use crate::alerts::{self, AlertSink};
use crate::collectors::memory::host_physical_memory;
use crate::collectors::{Collector, CollectorSet, Reading};
use crate::error::{CollectionError, CollectionResult};
use crate::models::{CpuReading, GpuReading, MemoryReading, MetricKind, Snapshot, ThresholdSpec};
use crate::recorder::{HistoryRecorder, records_from_snapshot};
use chrono::Utc;
use parking_lot::{Mutex, RwLock};
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::Duration;
use tracing::instrument;

pub const MIN_TICK_INTERVAL_SECS: f64 = 0.25;
pub const MAX_TICK_INTERVAL_SECS: f64 = 5.0;
pub const DEFAULT_TICK_INTERVAL_SECS: f64 = 1.0;

/// Consecutive failures after which a caller should treat a collector as unhealthy.
pub const UNHEALTHY_AFTER: u32 = 3;

/// Clamps to [0.25s, 5s]; NaN falls back to the default.
pub fn clamp_tick_interval(secs: f64) -> Duration {
    let secs = if secs.is_nan() {
        DEFAULT_TICK_INTERVAL_SECS
    } else {
        secs.clamp(MIN_TICK_INTERVAL_SECS, MAX_TICK_INTERVAL_SECS)
    };
    Duration::from_secs_f64(secs)
}

#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub tick_interval: Duration,
}

impl EngineConfig {
    pub fn from_secs(tick_interval_secs: f64) -> Self {
        Self {
            tick_interval: clamp_tick_interval(tick_interval_secs),
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::from_secs(DEFAULT_TICK_INTERVAL_SECS)
    }
}

struct Shared {
    // indexed by MetricKind::index()
    collectors: [Arc<Mutex<Collector>>; 5],
    failures: [AtomicU32; 5],
    tick_interval_ms: AtomicU64,
    last: Mutex<Option<Snapshot>>,
    subscriber: Mutex<Option<mpsc::Sender<Snapshot>>>,
    thresholds: RwLock<Vec<ThresholdSpec>>,
    sink: RwLock<Option<Arc<dyn AlertSink>>>,
    history: RwLock<Option<Arc<HistoryRecorder>>>,
}

struct RunningLoop {
    shutdown_tx: oneshot::Sender<()>,
    handle: JoinHandle<()>,
}

pub struct MetricEngine {
    shared: Arc<Shared>,
    running: Mutex<Option<RunningLoop>>,
}

impl MetricEngine {
    pub fn new(collectors: CollectorSet, config: EngineConfig) -> Self {
        let collectors = collectors
            .into_collectors()
            .map(|c| Arc::new(Mutex::new(c)));
        let interval = clamp_tick_interval(config.tick_interval.as_secs_f64());
        Self {
            shared: Arc::new(Shared {
                collectors,
                failures: Default::default(),
                tick_interval_ms: AtomicU64::new(interval.as_millis() as u64),
                last: Mutex::new(None),
                subscriber: Mutex::new(None),
                thresholds: RwLock::new(Vec::new()),
                sink: RwLock::new(None),
                history: RwLock::new(None),
            }),
            running: Mutex::new(None),
        }
    }

    pub fn with_history(self, recorder: Arc<HistoryRecorder>) -> Self {
        *self.shared.history.write() = Some(recorder);
        self
    }

    /// Spawns the tick loop. No-op while a loop is already alive.
    pub fn start(&self) {
        let mut running = self.running.lock();
        if running.as_ref().is_some_and(|r| !r.handle.is_finished()) {
            return;
        }
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let handle = tokio::spawn(run(self.shared.clone(), shutdown_rx));
        *running = Some(RunningLoop { shutdown_tx, handle });
        tracing::debug!(
            tick_interval_ms = self.shared.tick_interval_ms.load(Ordering::Relaxed),
            "engine started"
        );
    }

    /// Signals the loop and waits for it to exit. Safe when idle.
    pub async fn stop(&self) {
        let running = self.running.lock().take();
        let Some(RunningLoop {
            shutdown_tx,
            handle,
        }) = running
        else {
            return;
        };
        let _ = shutdown_tx.send(());
        if let Err(e) = handle.await {
            tracing::warn!(error = %e, operation = "stop", "engine loop ended abnormally");
        }
        tracing::debug!("engine stopped");
    }

    pub fn is_running(&self) -> bool {
        self.running
            .lock()
            .as_ref()
            .is_some_and(|r| !r.handle.is_finished())
    }

    /// Replaces any previous subscriber. Snapshots arrive in tick order.
    pub fn subscribe(&self, capacity: usize) -> mpsc::Receiver<Snapshot> {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        *self.shared.subscriber.lock() = Some(tx);
        rx
    }

    /// Takes effect at the next sleep.
    pub fn set_tick_interval(&self, secs: f64) {
        let interval = clamp_tick_interval(secs);
        self.shared
            .tick_interval_ms
            .store(interval.as_millis() as u64, Ordering::Relaxed);
    }

    pub fn tick_interval(&self) -> Duration {
        self.shared.tick_interval()
    }

    pub fn set_thresholds(&self, thresholds: Vec<ThresholdSpec>) {
        *self.shared.thresholds.write() = thresholds;
    }

    pub fn set_alert_sink(&self, sink: Arc<dyn AlertSink>) {
        *self.shared.sink.write() = Some(sink);
    }

    pub fn consecutive_failures(&self, kind: MetricKind) -> u32 {
        self.shared.failures[kind.index()].load(Ordering::Relaxed)
    }

    pub fn unhealthy_collectors(&self) -> Vec<MetricKind> {
        MetricKind::ALL
            .into_iter()
            .filter(|k| self.consecutive_failures(*k) >= UNHEALTHY_AFTER)
            .collect()
    }

    pub fn last_snapshot(&self) -> Option<Snapshot> {
        self.shared.last.lock().clone()
    }

    /// Runs one tick outside the loop, delivering to the subscriber like the loop does.
    pub async fn tick_once(&self) -> Snapshot {
        let snapshot = self.shared.tick().await;
        self.shared.deliver(snapshot.clone()).await;
        snapshot
    }
}

async fn run(shared: Arc<Shared>, mut shutdown_rx: oneshot::Receiver<()>) {
    loop {
        if !matches!(
            shutdown_rx.try_recv(),
            Err(oneshot::error::TryRecvError::Empty)
        ) {
            break;
        }
        let snapshot = shared.tick().await;
        // a finished tick is always offered; only waiting on a full channel is cancellable
        if let Some(snapshot) = shared.try_deliver(snapshot) {
            tokio::select! {
                biased;
                _ = shared.deliver(snapshot) => {}
                _ = &mut shutdown_rx => break,
            }
        }
        tokio::select! {
            _ = tokio::time::sleep(shared.tick_interval()) => {}
            _ = &mut shutdown_rx => break,
        }
    }
    tracing::debug!("engine loop shutting down");
}

async fn sample(collector: Arc<Mutex<Collector>>) -> CollectionResult<Reading> {
    tokio::task::spawn_blocking(move || collector.lock().sample())
        .await
        .unwrap_or_else(|e| Err(CollectionError::TaskFailed(e.to_string())))
}

impl Shared {
    fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms.load(Ordering::Relaxed))
    }

    #[instrument(level = "debug", skip(self), fields(operation = "tick"))]
    async fn tick(&self) -> Snapshot {
        let now = Utc::now();
        let [cpu, memory, gpu, disk, network] = &self.collectors;
        let (cpu, memory, gpu, disk, network) = tokio::join!(
            sample(cpu.clone()),
            sample(memory.clone()),
            sample(gpu.clone()),
            sample(disk.clone()),
            sample(network.clone()),
        );

        let previous = self.last.lock().clone();
        let prev = previous.as_ref();
        let snapshot = Snapshot {
            cpu: match self.absorb(MetricKind::Cpu, cpu) {
                Some(Reading::Cpu(r)) => r,
                _ => prev.map_or_else(|| CpuReading::zeroed(now), |s| s.cpu.clone()),
            },
            memory: match self.absorb(MetricKind::Memory, memory) {
                Some(Reading::Memory(r)) => r,
                _ => prev.map_or_else(
                    || MemoryReading::unavailable(host_physical_memory(), now),
                    |s| s.memory.clone(),
                ),
            },
            gpu: match self.absorb(MetricKind::Gpu, gpu) {
                Some(Reading::Gpu(r)) => r,
                _ => prev.map_or_else(|| GpuReading::zeroed(now), |s| s.gpu.clone()),
            },
            disks: match self.absorb(MetricKind::Disk, disk) {
                Some(Reading::Disk(r)) => r,
                _ => prev.map(|s| s.disks.clone()).unwrap_or_default(),
            },
            network: match self.absorb(MetricKind::Network, network) {
                Some(Reading::Network(r)) => r,
                _ => prev.map(|s| s.network.clone()).unwrap_or_default(),
            },
            timestamp: now,
        };
        *self.last.lock() = Some(snapshot.clone());

        let history = self.history.read().clone();
        if let Some(recorder) = history {
            recorder.record(records_from_snapshot(&snapshot)).await;
        }

        let events = alerts::evaluate(&snapshot, &self.thresholds.read());
        if !events.is_empty() {
            let sink = self.sink.read().clone();
            match sink {
                Some(sink) => sink.notify(&events),
                None => tracing::debug!(events = events.len(), "thresholds breached; no alert sink"),
            }
        }

        snapshot
    }

    /// Success resets the domain's failure counter; failure bumps it and yields None.
    fn absorb(&self, kind: MetricKind, result: CollectionResult<Reading>) -> Option<Reading> {
        let counter = &self.failures[kind.index()];
        match result {
            Ok(reading) => {
                counter.store(0, Ordering::Relaxed);
                Some(reading)
            }
            Err(e) => {
                let failures = counter.fetch_add(1, Ordering::Relaxed) + 1;
                tracing::warn!(
                    error = %e,
                    collector = %kind,
                    consecutive_failures = failures,
                    operation = "sample",
                    "collector failed; using previous reading"
                );
                None
            }
        }
    }

    /// Hands the snapshot back only when the channel is full.
    fn try_deliver(&self, snapshot: Snapshot) -> Option<Snapshot> {
        let subscriber = self.subscriber.lock().clone();
        let tx = subscriber?;
        match tx.try_send(snapshot) {
            Ok(()) => None,
            Err(mpsc::error::TrySendError::Full(snapshot)) => Some(snapshot),
            Err(mpsc::error::TrySendError::Closed(_)) => {
                self.detach(&tx);
                None
            }
        }
    }

    fn detach(&self, tx: &mpsc::Sender<Snapshot>) {
        let mut subscriber = self.subscriber.lock();
        // a newer subscriber may have replaced the closed one meanwhile
        if subscriber.as_ref().is_some_and(|s| s.same_channel(tx)) {
            *subscriber = None;
            tracing::debug!("snapshot subscriber closed; detached");
        }
    }

    async fn deliver(&self, snapshot: Snapshot) {
        let subscriber = self.subscriber.lock().clone();
        let Some(tx) = subscriber else {
            return;
        };
        if tx.send(snapshot).await.is_err() {
            self.detach(&tx);
        }
    }
}
