// Threshold evaluation and the notification seam

use crate::models::{AlertEvent, MetricKind, Snapshot, ThresholdSpec};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Default minimum spacing between notifications for the same metric domain.
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_secs(60);

/// One event per enabled threshold that the snapshot breaches, in threshold order.
/// A disk threshold with no known volume produces nothing.
pub fn evaluate(snapshot: &Snapshot, thresholds: &[ThresholdSpec]) -> Vec<AlertEvent> {
    thresholds
        .iter()
        .filter(|t| t.enabled)
        .filter_map(|t| {
            let current = snapshot.scalar(t.metric)?;
            t.op.breaches(current, t.value).then(|| AlertEvent {
                metric: t.metric,
                threshold: t.value,
                op: t.op,
                current,
                timestamp: snapshot.timestamp,
            })
        })
        .collect()
}

/// Receives breach events; delivery (and any OS notification) is the sink's business.
pub trait AlertSink: Send + Sync {
    fn notify(&self, events: &[AlertEvent]);
}

/// Emits each event as a warning.
#[derive(Debug, Default)]
pub struct LogSink;

impl AlertSink for LogSink {
    fn notify(&self, events: &[AlertEvent]) {
        for e in events {
            tracing::warn!(
                metric = %e.metric,
                current = e.current,
                threshold = e.threshold,
                op = e.op.symbol(),
                "threshold breached"
            );
        }
    }
}

/// Forwards at most one event per metric domain per window.
pub struct DebouncedSink<S> {
    inner: S,
    window: Duration,
    last_fired: Mutex<HashMap<MetricKind, Instant>>,
}

impl<S: AlertSink> DebouncedSink<S> {
    pub fn new(inner: S, window: Duration) -> Self {
        Self {
            inner,
            window,
            last_fired: Mutex::new(HashMap::new()),
        }
    }

    /// Events allowed through at `now`; marks their domains as fired.
    pub fn admit(&self, events: &[AlertEvent], now: Instant) -> Vec<AlertEvent> {
        let mut last_fired = self.last_fired.lock();
        let mut out = Vec::new();
        for e in events {
            let recent = last_fired
                .get(&e.metric)
                .is_some_and(|t| now.saturating_duration_since(*t) < self.window);
            if recent {
                continue;
            }
            last_fired.insert(e.metric, now);
            out.push(e.clone());
        }
        out
    }
}

impl<S: AlertSink> AlertSink for DebouncedSink<S> {
    fn notify(&self, events: &[AlertEvent]) {
        let admitted = self.admit(events, Instant::now());
        if !admitted.is_empty() {
            self.inner.notify(&admitted);
        }
    }
}
