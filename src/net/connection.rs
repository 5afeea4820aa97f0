//! Stream identity and lifetime tracking.
//!
//! # Responsibilities
//! - Generate unique connection IDs for subscriptions and tracing
//! - Count active discovery streams for status and shutdown
//! - Release the count on drop, even if a stream task panics

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::observability::metrics;

/// Relaxed ordering is enough; only uniqueness matters.
static CONNECTION_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Unique identifier for a discovery stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Generate a new unique connection ID.
    pub fn new() -> Self {
        Self(CONNECTION_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "stream-{}", self.0)
    }
}

/// Counts live discovery streams.
#[derive(Debug, Clone, Default)]
pub struct StreamTracker {
    active: Arc<AtomicU64>,
}

impl StreamTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a new stream. The guard decrements the count when dropped.
    pub fn track(&self) -> StreamGuard {
        let active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        metrics::record_active_streams(active);
        let guard = StreamGuard {
            active: Arc::clone(&self.active),
            id: ConnectionId::new(),
        };
        tracing::trace!(connection_id = %guard.id, active, "Stream opened");
        guard
    }

    pub fn active_count(&self) -> u64 {
        self.active.load(Ordering::SeqCst)
    }
}

/// Guard tying a [`ConnectionId`] to a stream's lifetime.
#[derive(Debug)]
pub struct StreamGuard {
    active: Arc<AtomicU64>,
    id: ConnectionId,
}

impl StreamGuard {
    pub fn id(&self) -> ConnectionId {
        self.id
    }
}

impl Drop for StreamGuard {
    fn drop(&mut self) {
        let active = self.active.fetch_sub(1, Ordering::SeqCst).saturating_sub(1);
        metrics::record_active_streams(active);
        tracing::trace!(connection_id = %self.id, active, "Stream closed");
    }
}
