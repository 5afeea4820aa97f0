//! Immutable, versioned resource bundles.

use std::collections::{BTreeMap, HashSet};
use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::XdsError;
use crate::resources::{Resource, ResourceType};

/// Key under which exactly one snapshot is authoritative.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeGroup(String);

impl NodeGroup {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for NodeGroup {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for NodeGroup {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// A versioned set of resources grouped by type.
///
/// Resource names are unique per type. Resources without an explicit
/// version get a content hash so unchanged payloads keep the same version
/// across snapshots.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Snapshot {
    version: String,
    resources: BTreeMap<ResourceType, Vec<Resource>>,
    /// Assigned by the store on publish; 0 until then.
    generation: u64,
}

impl Snapshot {
    pub fn new(
        version: impl Into<String>,
        resources: impl IntoIterator<Item = (ResourceType, Vec<Resource>)>,
    ) -> Result<Self, XdsError> {
        let version = version.into();
        if version.trim().is_empty() {
            return Err(XdsError::InvalidSnapshot("version must not be empty".into()));
        }

        let mut by_type: BTreeMap<ResourceType, Vec<Resource>> = BTreeMap::new();
        for (resource_type, batch) in resources {
            let slot = by_type.entry(resource_type).or_default();
            for mut resource in batch {
                if resource.version.is_empty() {
                    resource.version = content_version(&resource.payload);
                }
                slot.push(resource);
            }
        }

        for (resource_type, batch) in &by_type {
            let mut seen = HashSet::with_capacity(batch.len());
            for resource in batch {
                if !seen.insert(resource.name.as_str()) {
                    return Err(XdsError::DuplicateResource {
                        resource_type: *resource_type,
                        name: resource.name.clone(),
                    });
                }
            }
        }

        Ok(Self {
            version,
            resources: by_type,
            generation: 0,
        })
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub(crate) fn set_generation(&mut self, generation: u64) {
        self.generation = generation;
    }

    /// Resources of one type, in producer order.
    pub fn resources(&self, resource_type: ResourceType) -> &[Resource] {
        self.resources
            .get(&resource_type)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn resource(&self, resource_type: ResourceType, name: &str) -> Option<&Resource> {
        self.resources(resource_type).iter().find(|r| r.name == name)
    }

    /// Per-type resource counts, for status reporting.
    pub fn counts(&self) -> BTreeMap<&'static str, usize> {
        self.resources
            .iter()
            .map(|(t, batch)| (t.short_name(), batch.len()))
            .collect()
    }
}

/// First 8 bytes of the payload's SHA-256. Stable across builds, so clients
/// reconnecting with `initial_resource_versions` match after a restart.
fn content_version(payload: &[u8]) -> String {
    let digest = Sha256::digest(payload);
    hex::encode(&digest[..8])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_duplicate_names_within_a_type() {
        let err = Snapshot::new(
            "1",
            [(
                ResourceType::Listener,
                vec![Resource::new("main", b"a".to_vec()), Resource::new("main", b"b".to_vec())],
            )],
        )
        .unwrap_err();
        assert_eq!(
            err,
            XdsError::DuplicateResource {
                resource_type: ResourceType::Listener,
                name: "main".into()
            }
        );
    }

    #[test]
    fn same_name_across_types_is_fine() {
        let snapshot = Snapshot::new(
            "1",
            [
                (ResourceType::Listener, vec![Resource::new("main", b"l".to_vec())]),
                (ResourceType::Cluster, vec![Resource::new("main", b"c".to_vec())]),
            ],
        )
        .unwrap();
        assert_eq!(snapshot.resources(ResourceType::Listener).len(), 1);
        assert_eq!(snapshot.resources(ResourceType::Cluster).len(), 1);
        assert!(snapshot.resources(ResourceType::Secret).is_empty());
    }

    #[test]
    fn empty_version_is_invalid() {
        assert!(matches!(
            Snapshot::new(" ", Vec::new()),
            Err(XdsError::InvalidSnapshot(_))
        ));
    }

    #[test]
    fn unversioned_resources_get_stable_content_versions() {
        let a = Snapshot::new("1", [(ResourceType::Cluster, vec![Resource::new("web", b"x".to_vec())])])
            .unwrap();
        let b = Snapshot::new("2", [(ResourceType::Cluster, vec![Resource::new("web", b"x".to_vec())])])
            .unwrap();
        let c = Snapshot::new("3", [(ResourceType::Cluster, vec![Resource::new("web", b"y".to_vec())])])
            .unwrap();

        let va = &a.resource(ResourceType::Cluster, "web").unwrap().version;
        let vb = &b.resource(ResourceType::Cluster, "web").unwrap().version;
        let vc = &c.resource(ResourceType::Cluster, "web").unwrap().version;
        assert_eq!(va, vb);
        assert_ne!(va, vc);
        assert_eq!(va, "2d711642b726b044");
    }

    #[test]
    fn explicit_resource_versions_are_kept() {
        let snapshot = Snapshot::new(
            "1",
            [(ResourceType::Route, vec![Resource::new("r", b"x".to_vec()).with_version("v7")])],
        )
        .unwrap();
        assert_eq!(snapshot.resource(ResourceType::Route, "r").unwrap().version, "v7");
    }
}
