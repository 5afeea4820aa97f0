//! Producer-facing snapshot documents.
//!
//! The admin API, the bootstrap file and `xds-cli publish` all exchange
//! snapshots in this shape:
//!
//! ```toml
//! version = "1"
//!
//! [[resources.listener]]
//! name = "main"
//! payload = { address = "0.0.0.0", port_value = 80 }
//! ```
//!
//! String payloads are taken as raw bytes; any other value is stored as its
//! JSON encoding.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::XdsError;
use crate::resources::{Resource, ResourceType, Snapshot};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotDocument {
    /// Target node group; callers may supply it out of band instead.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_group: Option<String>,

    pub version: String,

    /// Resources keyed by type URL or short type name.
    #[serde(default)]
    pub resources: BTreeMap<String, Vec<ResourceDocument>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceDocument {
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,

    #[serde(default)]
    pub payload: serde_json::Value,
}

impl SnapshotDocument {
    /// Validate and convert into a publishable snapshot.
    pub fn into_snapshot(self) -> Result<Snapshot, XdsError> {
        let mut grouped: Vec<(ResourceType, Vec<Resource>)> = Vec::with_capacity(self.resources.len());
        for (type_key, docs) in self.resources {
            let resource_type = ResourceType::parse(&type_key)?;
            let mut batch = Vec::with_capacity(docs.len());
            for doc in docs {
                let payload = encode_payload(&doc.payload)
                    .map_err(|e| XdsError::InvalidSnapshot(format!("{}: {}", doc.name, e)))?;
                let mut resource = Resource::new(doc.name, payload);
                if let Some(version) = doc.version {
                    resource.version = version;
                }
                batch.push(resource);
            }
            grouped.push((resource_type, batch));
        }
        Snapshot::new(self.version, grouped)
    }

    /// Render a published snapshot back into document form.
    pub fn from_snapshot(node_group: Option<String>, snapshot: &Snapshot) -> Self {
        let resources = ResourceType::ALL
            .iter()
            .filter(|t| !snapshot.resources(**t).is_empty())
            .map(|t| {
                let docs = snapshot
                    .resources(*t)
                    .iter()
                    .map(|r| ResourceDocument {
                        name: r.name.clone(),
                        version: Some(r.version.clone()),
                        payload: decode_payload(&r.payload),
                    })
                    .collect();
                (t.short_name().to_string(), docs)
            })
            .collect();

        Self {
            node_group,
            version: snapshot.version().to_string(),
            resources,
        }
    }
}

fn encode_payload(value: &serde_json::Value) -> Result<Vec<u8>, serde_json::Error> {
    match value {
        serde_json::Value::String(raw) => Ok(raw.clone().into_bytes()),
        other => serde_json::to_vec(other),
    }
}

fn decode_payload(bytes: &[u8]) -> serde_json::Value {
    serde_json::from_slice(bytes)
        .unwrap_or_else(|_| serde_json::Value::String(String::from_utf8_lossy(bytes).into_owned()))
}
