use std::sync::Arc;

use gesbox_client::domain::Reading;
use serde::Serialize;
use time::OffsetDateTime;
use tokio::sync::watch;

use crate::pipeline::PipelineError;

/// The readings produced by one fetch cycle. Never mutated after creation.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    readings: Vec<Reading>,
    fetched_at: Option<OffsetDateTime>,
    rejected: usize,
    digest: String,
}

impl Snapshot {
    pub fn new(readings: Vec<Reading>, rejected: usize, digest: String) -> Self {
        Self {
            readings,
            fetched_at: Some(OffsetDateTime::now_utc()),
            rejected,
            digest,
        }
    }

    /// Placeholder held before the first successful cycle.
    pub fn empty() -> Self {
        Self {
            readings: Vec::new(),
            fetched_at: None,
            rejected: 0,
            digest: String::new(),
        }
    }

    /// Sorted ascending by timestamp.
    pub fn readings(&self) -> &[Reading] {
        &self.readings
    }

    pub fn len(&self) -> usize {
        self.readings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.readings.is_empty()
    }

    pub fn fetched_at(&self) -> Option<OffsetDateTime> {
        self.fetched_at
    }

    pub fn rejected(&self) -> usize {
        self.rejected
    }

    /// blake3 hex digest of the raw bodies this snapshot was parsed from.
    pub fn digest(&self) -> &str {
        &self.digest
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum CycleStatus {
    /// No cycle has finished yet.
    Pending,
    Fresh,
    /// Fetched fine, nothing valid in it. Rendered as an empty state.
    NoData,
    /// Last cycle was aborted; the previous snapshot is still served.
    /// `kind` is the error class (`transport`, `format`, ...).
    Failed {
        kind: &'static str,
        message: String,
        #[serde(with = "time::serde::rfc3339")]
        at: OffsetDateTime,
    },
}

/// Holder of the current snapshot and the latest cycle status.
///
/// Replacement is whole-snapshot, last writer wins; readers clone the `Arc`
/// and keep a consistent view while a newer cycle lands.
pub struct WorkingSet {
    snapshot: watch::Sender<Arc<Snapshot>>,
    status: watch::Sender<CycleStatus>,
}

impl Default for WorkingSet {
    fn default() -> Self {
        Self::new()
    }
}

impl WorkingSet {
    pub fn new() -> Self {
        let (snapshot, _) = watch::channel(Arc::new(Snapshot::empty()));
        let (status, _) = watch::channel(CycleStatus::Pending);
        Self { snapshot, status }
    }

    pub fn current(&self) -> Arc<Snapshot> {
        Arc::clone(&self.snapshot.borrow())
    }

    pub fn status(&self) -> CycleStatus {
        self.status.borrow().clone()
    }

    /// Receiver notified on every replacement.
    pub fn subscribe(&self) -> watch::Receiver<Arc<Snapshot>> {
        self.snapshot.subscribe()
    }

    /// Swap in a new snapshot and return the one it replaced.
    pub fn replace(&self, next: Arc<Snapshot>) -> Arc<Snapshot> {
        let status = if next.is_empty() {
            CycleStatus::NoData
        } else {
            CycleStatus::Fresh
        };
        let previous = self.snapshot.send_replace(next);
        self.status.send_replace(status);
        previous
    }

    /// Record a failed cycle without touching the snapshot.
    pub fn record_failure(&self, error: &PipelineError) {
        self.status.send_replace(CycleStatus::Failed {
            kind: error.kind(),
            message: error.to_string(),
            at: OffsetDateTime::now_utc(),
        });
    }
}
