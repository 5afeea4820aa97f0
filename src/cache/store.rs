//! Versioned snapshot store.
//!
//! # Responsibilities
//! - Hold exactly one current snapshot per node group
//! - Reject no-op publishes (same version as current, or as the snapshot
//!   most recently cleared)
//! - Wake watchers synchronously on publish
//!
//! # Design Decisions
//! - Copy-on-write: readers load an `Arc<Snapshot>` and never see a mix of versions
//! - One publish lock per node group; groups never contend with each other
//! - Generations are store-wide and strictly increasing, so consumers can
//!   order snapshots without interpreting producer version strings
//! - A group that never held a snapshot lives only as long as its watches

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use arc_swap::ArcSwapOption;
use dashmap::DashMap;
use serde::Serialize;
use tokio::sync::watch;

use crate::cache::watch::{SlotLease, SnapshotWatch};
use crate::error::{Result, XdsError};
use crate::observability::metrics;
use crate::resources::{NodeGroup, ResourceType, Snapshot, SnapshotDocument};

pub(crate) type Groups = DashMap<NodeGroup, Arc<GroupSlot>>;

/// Per node group state.
#[derive(Debug)]
pub(crate) struct GroupSlot {
    current: ArcSwapOption<Snapshot>,
    /// Held while publishing. Holds the version removed by the last clear.
    publish: Mutex<Option<String>>,
    signal: watch::Sender<u64>,
}

impl GroupSlot {
    fn new() -> Self {
        let (signal, _) = watch::channel(0);
        Self {
            current: ArcSwapOption::empty(),
            publish: Mutex::new(None),
            signal,
        }
    }

    pub(crate) fn current(&self) -> Option<Arc<Snapshot>> {
        self.current.load_full()
    }

    fn watchers(&self) -> usize {
        self.signal.receiver_count()
    }

    /// True when the slot carries no state worth keeping. A slot being
    /// published to is never unused.
    pub(crate) fn is_unused(&self) -> bool {
        match self.publish.try_lock() {
            Ok(cleared) => cleared.is_none() && self.current().is_none() && self.watchers() == 0,
            Err(_) => false,
        }
    }
}

/// Status of one node group, as reported by the admin API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SnapshotStatus {
    pub node_group: NodeGroup,
    pub version: Option<String>,
    pub generation: u64,
    pub resources: BTreeMap<&'static str, usize>,
    pub watchers: usize,
}

/// In-memory snapshot store shared by all streams.
///
/// Construct one per control plane and pass it around as `Arc<SnapshotStore>`;
/// independent instances never observe each other.
#[derive(Debug, Default)]
pub struct SnapshotStore {
    groups: Arc<Groups>,
    generation: AtomicU64,
}

impl SnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self, node_group: &NodeGroup) -> Arc<GroupSlot> {
        if let Some(slot) = self.groups.get(node_group) {
            return Arc::clone(slot.value());
        }
        Arc::clone(
            self.groups
                .entry(node_group.clone())
                .or_insert_with(|| Arc::new(GroupSlot::new()))
                .value(),
        )
    }

    /// Whether `slot` is still the one registered for `node_group`.
    fn is_registered(&self, node_group: &NodeGroup, slot: &Arc<GroupSlot>) -> bool {
        self.groups
            .get(node_group)
            .map_or(false, |registered| Arc::ptr_eq(registered.value(), slot))
    }

    /// Atomically replace the snapshot of a node group.
    ///
    /// Fails with [`XdsError::VersionConflict`] when `snapshot` carries the
    /// version that is already current. Returns the published snapshot with
    /// its generation assigned.
    pub fn set_snapshot(&self, node_group: &NodeGroup, mut snapshot: Snapshot) -> Result<Arc<Snapshot>> {
        loop {
            let slot = self.slot(node_group);
            let mut cleared = slot.publish.lock().unwrap_or_else(PoisonError::into_inner);
            // An idle slot may have been pruned between lookup and lock.
            if !self.is_registered(node_group, &slot) {
                continue;
            }

            let current = slot.current();
            let last_version = current.as_ref().map(|s| s.version()).or(cleared.as_deref());
            if last_version == Some(snapshot.version()) {
                metrics::record_snapshot_conflict(node_group.as_str());
                return Err(XdsError::VersionConflict {
                    node_group: node_group.to_string(),
                    version: snapshot.version().to_string(),
                });
            }

            let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
            snapshot.set_generation(generation);
            let snapshot = Arc::new(snapshot);

            slot.current.store(Some(Arc::clone(&snapshot)));
            *cleared = None;
            slot.signal.send_replace(generation);

            metrics::record_snapshot_published(node_group.as_str());
            tracing::info!(
                node_group = %node_group,
                version = %snapshot.version(),
                generation,
                watchers = slot.watchers(),
                "Snapshot published"
            );
            return Ok(snapshot);
        }
    }

    /// Convert and publish a producer document.
    pub fn publish_document(&self, node_group: &NodeGroup, document: SnapshotDocument) -> Result<Arc<Snapshot>> {
        let snapshot = document.into_snapshot()?;
        self.set_snapshot(node_group, snapshot)
    }

    /// Current snapshot of a node group.
    pub fn get_snapshot(&self, node_group: &NodeGroup) -> Result<Arc<Snapshot>> {
        self.groups
            .get(node_group)
            .and_then(|slot| slot.current())
            .ok_or_else(|| XdsError::NotFound(node_group.to_string()))
    }

    /// Remove the snapshot of a node group. Watchers stay registered and are
    /// woken by the next publish, which must carry a new version.
    pub fn clear_snapshot(&self, node_group: &NodeGroup) -> Result<Arc<Snapshot>> {
        let slot = self
            .groups
            .get(node_group)
            .map(|slot| Arc::clone(slot.value()))
            .ok_or_else(|| XdsError::NotFound(node_group.to_string()))?;
        let mut cleared = slot.publish.lock().unwrap_or_else(PoisonError::into_inner);

        let removed = slot
            .current
            .swap(None)
            .ok_or_else(|| XdsError::NotFound(node_group.to_string()))?;
        *cleared = Some(removed.version().to_string());

        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        slot.signal.send_replace(generation);

        tracing::info!(node_group = %node_group, version = %removed.version(), "Snapshot cleared");
        Ok(removed)
    }

    /// Register interest in versions other than `last_known_version`.
    ///
    /// The watch is registered before it first inspects the store, so a
    /// publish racing with this call is never missed. Dropping the last watch
    /// of a group that holds no snapshot releases the group.
    pub fn watch(
        &self,
        node_group: &NodeGroup,
        resource_type: ResourceType,
        last_known_version: Option<String>,
    ) -> SnapshotWatch {
        // Subscribe under the shard lock so pruning cannot detach the slot first.
        let entry = self
            .groups
            .entry(node_group.clone())
            .or_insert_with(|| Arc::new(GroupSlot::new()));
        let signal = entry.signal.subscribe();
        let slot = Arc::clone(entry.value());
        drop(entry);

        tracing::trace!(
            node_group = %node_group,
            resource_type = %resource_type,
            last_known_version = ?last_known_version,
            "Watch registered"
        );
        let lease = SlotLease::new(Arc::clone(&self.groups), node_group.clone(), slot);
        SnapshotWatch::new(resource_type, signal, lease, last_known_version)
    }

    /// Status for a single node group.
    pub fn status(&self, node_group: &NodeGroup) -> Option<SnapshotStatus> {
        self.groups
            .get(node_group)
            .map(|slot| Self::describe(node_group, slot.value()))
    }

    /// Number of node groups with any state: a snapshot, a cleared
    /// version, or live watches.
    pub fn group_count(&self) -> usize {
        self.groups.len()
    }

    /// Status of every node group that currently holds a snapshot.
    pub fn node_groups(&self) -> Vec<SnapshotStatus> {
        let mut statuses: Vec<SnapshotStatus> = self
            .groups
            .iter()
            .filter(|entry| entry.value().current().is_some())
            .map(|entry| Self::describe(entry.key(), entry.value()))
            .collect();
        statuses.sort_by(|a, b| a.node_group.cmp(&b.node_group));
        statuses
    }

    fn describe(node_group: &NodeGroup, slot: &GroupSlot) -> SnapshotStatus {
        let current = slot.current();
        SnapshotStatus {
            node_group: node_group.clone(),
            version: current.as_ref().map(|s| s.version().to_string()),
            generation: current.as_ref().map(|s| s.generation()).unwrap_or(0),
            resources: current.as_ref().map(|s| s.counts()).unwrap_or_default(),
            watchers: slot.watchers(),
        }
    }
}
