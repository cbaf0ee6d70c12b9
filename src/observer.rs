//! Snapshot observers
//!
//! Every call that produced an invocation record is reported once, after its
//! outcome is known, as an [`InvocationSnapshot`].

use crate::invocation::InvocationSnapshot;
use std::sync::{Arc, Mutex, PoisonError};

/// Receives snapshots of finished calls.
///
/// Called synchronously on the thread that made the call.
pub trait SnapshotObserver: Send + Sync {
    fn on_snapshot(&self, snapshot: &InvocationSnapshot);
}

impl<F> SnapshotObserver for F
where
    F: Fn(&InvocationSnapshot) + Send + Sync,
{
    fn on_snapshot(&self, snapshot: &InvocationSnapshot) {
        self(snapshot)
    }
}

/// Handle returned when registering an observer, used to remove it again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObserverId(pub(crate) u64);

/// Logs every snapshot through `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl SnapshotObserver for TracingObserver {
    fn on_snapshot(&self, snapshot: &InvocationSnapshot) {
        match &snapshot.failure {
            None => tracing::debug!(
                proxy = %snapshot.proxy,
                receiver = %snapshot.receiver,
                operation = %snapshot.operation,
                fingerprint = %snapshot.fingerprint,
                forwarded = snapshot.forwarded,
                "{}",
                snapshot
            ),
            Some(failure) => tracing::warn!(
                proxy = %snapshot.proxy,
                receiver = %snapshot.receiver,
                operation = %snapshot.operation,
                fingerprint = %snapshot.fingerprint,
                forwarded = snapshot.forwarded,
                error = %failure,
                "invocation failed"
            ),
        }
    }
}

/// Collects snapshots in memory.
///
/// Clones share the same buffer, so one clone can be registered as an
/// observer while another is read.
#[derive(Debug, Default, Clone)]
pub struct SnapshotLog {
    entries: Arc<Mutex<Vec<InvocationSnapshot>>>,
}

impl SnapshotLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get all collected snapshots
    pub fn snapshots(&self) -> Vec<InvocationSnapshot> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn last(&self) -> Option<InvocationSnapshot> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .last()
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Clear collected snapshots
    pub fn clear(&self) {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

impl SnapshotObserver for SnapshotLog {
    fn on_snapshot(&self, snapshot: &InvocationSnapshot) {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(snapshot.clone());
    }
}
