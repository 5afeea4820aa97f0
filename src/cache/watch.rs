//! Cancellable snapshot watches.

use std::sync::Arc;

use tokio::sync::watch;

use crate::cache::store::{GroupSlot, Groups};
use crate::resources::{NodeGroup, ResourceType, Snapshot};

/// Keeps a node group's slot reachable while a watch holds it, and releases
/// the slot on drop once nothing else needs it.
#[derive(Debug)]
pub(crate) struct SlotLease {
    groups: Arc<Groups>,
    node_group: NodeGroup,
    slot: Arc<GroupSlot>,
}

impl SlotLease {
    pub(crate) fn new(groups: Arc<Groups>, node_group: NodeGroup, slot: Arc<GroupSlot>) -> Self {
        Self {
            groups,
            node_group,
            slot,
        }
    }
}

impl Drop for SlotLease {
    fn drop(&mut self) {
        let released = self.groups.remove_if(&self.node_group, |_, slot| {
            Arc::ptr_eq(slot, &self.slot) && slot.is_unused()
        });
        if released.is_some() {
            tracing::trace!(node_group = %self.node_group, "Idle node group released");
        }
    }
}

/// A registration for "tell me when the version is no longer X".
///
/// Dropping the watch cancels it; nothing is left behind in the store.
#[derive(Debug)]
pub struct SnapshotWatch {
    resource_type: ResourceType,
    signal: watch::Receiver<u64>,
    last_seen: Option<String>,
    // Dropped after `signal`, so the slot no longer counts this watch.
    lease: SlotLease,
}

impl SnapshotWatch {
    pub(crate) fn new(
        resource_type: ResourceType,
        signal: watch::Receiver<u64>,
        lease: SlotLease,
        last_seen: Option<String>,
    ) -> Self {
        Self {
            resource_type,
            signal,
            last_seen,
            lease,
        }
    }

    /// Wait until the current snapshot carries a version other than the last
    /// one this watch returned (or was created with).
    ///
    /// Cancel safe.
    pub async fn changed(&mut self) -> Arc<Snapshot> {
        loop {
            // Mark the signal seen before looking at the store so a publish
            // landing in between still wakes the wait below.
            self.signal.borrow_and_update();

            if let Some(current) = self.lease.slot.current() {
                if self.last_seen.as_deref() != Some(current.version()) {
                    self.last_seen = Some(current.version().to_string());
                    return current;
                }
            }

            if self.signal.changed().await.is_err() {
                // The sender lives in the slot we hold, so this cannot close.
                std::future::pending::<()>().await;
            }
        }
    }

    /// Snapshot current at this instant, without waiting.
    pub fn current(&self) -> Option<Arc<Snapshot>> {
        self.lease.slot.current()
    }

    pub fn node_group(&self) -> &NodeGroup {
        &self.lease.node_group
    }

    pub fn resource_type(&self) -> ResourceType {
        self.resource_type
    }

    pub fn last_seen(&self) -> Option<&str> {
        self.last_seen.as_deref()
    }
}
