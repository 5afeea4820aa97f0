//! Resource model.
//!
//! # Data Flow
//! ```text
//! producer (admin API, bootstrap file)
//!     → document.rs (SnapshotDocument, JSON/TOML payloads)
//!     → snapshot.rs (Snapshot, validated, immutable)
//!     → cache::SnapshotStore
//! ```
//!
//! Payloads are opaque bytes. Only `(type, name)` identity and versions
//! are ever inspected.

pub mod document;
pub mod snapshot;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::XdsError;

pub use document::{ResourceDocument, SnapshotDocument};
pub use snapshot::{NodeGroup, Snapshot};

/// Configuration resource kinds served by the control plane.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ResourceType {
    Listener,
    Cluster,
    Route,
    Endpoint,
    Secret,
}

impl ResourceType {
    pub const ALL: [ResourceType; 5] = [
        ResourceType::Listener,
        ResourceType::Cluster,
        ResourceType::Route,
        ResourceType::Endpoint,
        ResourceType::Secret,
    ];

    /// Envoy v3 type URL.
    pub fn type_url(&self) -> &'static str {
        match self {
            ResourceType::Listener => "type.googleapis.com/envoy.config.listener.v3.Listener",
            ResourceType::Cluster => "type.googleapis.com/envoy.config.cluster.v3.Cluster",
            ResourceType::Route => "type.googleapis.com/envoy.config.route.v3.RouteConfiguration",
            ResourceType::Endpoint => {
                "type.googleapis.com/envoy.config.endpoint.v3.ClusterLoadAssignment"
            }
            ResourceType::Secret => {
                "type.googleapis.com/envoy.extensions.transport_sockets.tls.v3.Secret"
            }
        }
    }

    /// Short name used in documents, metrics labels and logs.
    pub fn short_name(&self) -> &'static str {
        match self {
            ResourceType::Listener => "listener",
            ResourceType::Cluster => "cluster",
            ResourceType::Route => "route",
            ResourceType::Endpoint => "endpoint",
            ResourceType::Secret => "secret",
        }
    }

    /// Parse a type URL or a (possibly plural) short name.
    pub fn parse(value: &str) -> Result<Self, XdsError> {
        let trimmed = value.trim();
        if let Some(found) = Self::ALL.iter().find(|t| t.type_url() == trimmed) {
            return Ok(*found);
        }
        let short = trimmed.to_ascii_lowercase();
        let short = short.strip_suffix('s').unwrap_or(&short);
        Self::ALL
            .iter()
            .find(|t| t.short_name() == short)
            .copied()
            .ok_or_else(|| XdsError::UnknownResourceType(value.to_string()))
    }
}

impl fmt::Display for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.short_name())
    }
}

impl FromStr for ResourceType {
    type Err = XdsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for ResourceType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.type_url())
    }
}

impl<'de> Deserialize<'de> for ResourceType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::parse(&raw).map_err(serde::de::Error::custom)
    }
}

/// A single named configuration object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resource {
    pub name: String,
    #[serde(default)]
    pub version: String,
    pub payload: Vec<u8>,
}

impl Resource {
    pub fn new(name: impl Into<String>, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            name: name.into(),
            version: String::new(),
            payload: payload.into(),
        }
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }
}
