//! State-of-the-world responses.

use crate::discovery::protocol::DiscoveryResponse;
use crate::resources::{Resource, ResourceType, Snapshot};

/// Resources of `resource_type` accepted by `matches`, in snapshot order.
pub fn select<F>(snapshot: &Snapshot, resource_type: ResourceType, matches: F) -> Vec<Resource>
where
    F: Fn(&str) -> bool,
{
    snapshot
        .resources(resource_type)
        .iter()
        .filter(|resource| matches(&resource.name))
        .cloned()
        .collect()
}

/// Full response for one type; an empty name filter selects everything.
pub fn response<F>(snapshot: &Snapshot, resource_type: ResourceType, matches: F, nonce: String) -> DiscoveryResponse
where
    F: Fn(&str) -> bool,
{
    DiscoveryResponse {
        version_info: snapshot.version().to_string(),
        type_url: resource_type.type_url().to_string(),
        resources: select(snapshot, resource_type, matches),
        nonce,
    }
}
