//! Activity logging for admitted, successfully handled requests.

use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::mpsc;

use catequesis_auth::{PrincipalId, Role};

/// One record per successfully handled request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActivityRecord {
    pub principal: PrincipalId,
    pub role: Role,
    pub action: String,
    pub path: String,
    pub at: DateTime<Utc>,
}

/// Destination for activity records.
///
/// `emit` runs on the response path and must not block it; sinks with
/// backpressure drop records instead of waiting.
pub trait ActivitySink: Send + Sync {
    fn emit(&self, record: ActivityRecord);
}

/// Default sink: one structured tracing event per record.
#[derive(Debug, Default)]
pub struct TracingActivitySink;

impl ActivitySink for TracingActivitySink {
    fn emit(&self, record: ActivityRecord) {
        tracing::info!(
            principal = %record.principal,
            role = %record.role,
            action = %record.action,
            path = %record.path,
            at = %record.at,
            "activity",
        );
    }
}

/// Bounded-channel sink for an external drain.
///
/// When the drain falls behind, records are dropped and counted (lossy; no
/// backpressure on the response path).
pub struct ChannelActivitySink {
    tx: mpsc::Sender<ActivityRecord>,
    dropped: AtomicU64,
}

impl ChannelActivitySink {
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<ActivityRecord>) {
        let (tx, rx) = mpsc::channel(capacity);
        (
            Self {
                tx,
                dropped: AtomicU64::new(0),
            },
            rx,
        )
    }

    /// Records dropped so far because the channel was full or closed.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

impl ActivitySink for ChannelActivitySink {
    fn emit(&self, record: ActivityRecord) {
        if self.tx.try_send(record).is_err() {
            self.dropped.fetch_add(1, Ordering::Relaxed);
        }
    }
}

/// In-memory sink for tests and dev.
#[derive(Debug, Default)]
pub struct MemoryActivitySink {
    records: Mutex<Vec<ActivityRecord>>,
}

impl MemoryActivitySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<ActivityRecord> {
        self.records.lock().expect("activity sink lock poisoned").clone()
    }
}

impl ActivitySink for MemoryActivitySink {
    fn emit(&self, record: ActivityRecord) {
        if let Ok(mut records) = self.records.lock() {
            records.push(record);
        }
    }
}
