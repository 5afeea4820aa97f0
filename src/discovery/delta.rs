//! Incremental (delta) responses.

use std::collections::BTreeMap;

use crate::discovery::protocol::DeltaDiscoveryResponse;
use crate::resources::{Resource, Snapshot};
use crate::subscription::Subscription;

/// Difference between a snapshot and what a delta client holds.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeltaDiff {
    pub updated: Vec<Resource>,
    pub removed: Vec<String>,
    /// Name → version the client will hold after applying this diff.
    pub next_known: BTreeMap<String, String>,
}

impl DeltaDiff {
    pub fn is_empty(&self) -> bool {
        self.updated.is_empty() && self.removed.is_empty()
    }

    pub fn into_response(self, snapshot: &Snapshot, type_url: &str, nonce: String) -> DeltaDiscoveryResponse {
        DeltaDiscoveryResponse {
            system_version_info: snapshot.version().to_string(),
            type_url: type_url.to_string(),
            resources: self.updated,
            removed_resources: self.removed,
            nonce,
        }
    }
}

/// Compare `snapshot` against the view the subscriber holds (including any
/// in-flight push).
pub fn diff(snapshot: &Snapshot, subscription: &Subscription) -> DeltaDiff {
    let held = subscription.delivered_view();
    let mut result = DeltaDiff::default();

    for resource in snapshot.resources(subscription.resource_type) {
        if !subscription.matches(&resource.name) {
            continue;
        }
        if held.get(&resource.name) != Some(&resource.version) {
            result.updated.push(resource.clone());
        }
        result
            .next_known
            .insert(resource.name.clone(), resource.version.clone());
    }

    for name in held.keys() {
        // Names the client no longer subscribes to are forgotten silently.
        if subscription.matches(name) && !result.next_known.contains_key(name) {
            result.removed.push(name.clone());
        }
    }

    result
}
