//! Wire messages of the aggregated discovery stream.
//!
//! Every frame is a JSON object tagged by `kind`:
//!
//! ```json
//! {"kind": "discovery", "node_group": "edge", "type_url": "type.googleapis.com/envoy.config.listener.v3.Listener",
//!  "resource_names": [], "version_info": "", "response_nonce": ""}
//! ```

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::error::{Result, XdsError};
use crate::resources::{NodeGroup, Resource, ResourceType};
use crate::subscription::{DeliveryMode, NameUpdate, SubscriptionRequest};

/// Frames sent by proxies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ClientMessage {
    Discovery(DiscoveryRequest),
    Delta(DeltaDiscoveryRequest),
}

/// Frames sent by the control plane.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ServerMessage {
    Discovery(DiscoveryResponse),
    Delta(DeltaDiscoveryResponse),
    Rejected(StreamRejection),
}

/// Reason a client gives when it refuses a response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorDetail {
    #[serde(default)]
    pub code: i32,
    pub message: String,
}

/// State-of-the-world request. Also the body of a REST fetch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveryRequest {
    #[serde(default)]
    pub node_group: String,
    #[serde(default)]
    pub type_url: String,
    #[serde(default)]
    pub resource_names: Vec<String>,
    #[serde(default)]
    pub version_info: String,
    #[serde(default)]
    pub response_nonce: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_detail: Option<ErrorDetail>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeltaDiscoveryRequest {
    #[serde(default)]
    pub node_group: String,
    #[serde(default)]
    pub type_url: String,
    #[serde(default)]
    pub resource_names_subscribe: Vec<String>,
    #[serde(default)]
    pub resource_names_unsubscribe: Vec<String>,
    #[serde(default)]
    pub initial_resource_versions: BTreeMap<String, String>,
    #[serde(default)]
    pub response_nonce: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_detail: Option<ErrorDetail>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveryResponse {
    pub version_info: String,
    pub type_url: String,
    pub resources: Vec<Resource>,
    pub nonce: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeltaDiscoveryResponse {
    pub system_version_info: String,
    pub type_url: String,
    pub resources: Vec<Resource>,
    pub removed_resources: Vec<String>,
    pub nonce: String,
}

/// Sent before a stream is closed (or a request ignored) as malformed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamRejection {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub type_url: Option<String>,
    pub reason: String,
}

impl ClientMessage {
    pub fn type_url(&self) -> &str {
        match self {
            ClientMessage::Discovery(request) => &request.type_url,
            ClientMessage::Delta(request) => &request.type_url,
        }
    }

    pub fn node_group(&self) -> &str {
        match self {
            ClientMessage::Discovery(request) => &request.node_group,
            ClientMessage::Delta(request) => &request.node_group,
        }
    }

    /// Decode into a tracker request. An empty node group falls back to `default_group`.
    pub fn into_request(self, default_group: &NodeGroup) -> Result<SubscriptionRequest> {
        match self {
            ClientMessage::Discovery(request) => request.into_request(default_group),
            ClientMessage::Delta(request) => request.into_request(default_group),
        }
    }
}

fn resolve_group(node_group: String, default_group: &NodeGroup) -> NodeGroup {
    if node_group.trim().is_empty() {
        default_group.clone()
    } else {
        NodeGroup::new(node_group)
    }
}

fn resolve_type(type_url: &str) -> Result<ResourceType> {
    if type_url.trim().is_empty() {
        return Err(XdsError::MalformedRequest("type_url is required".into()));
    }
    ResourceType::parse(type_url)
}

impl DiscoveryRequest {
    pub fn into_request(self, default_group: &NodeGroup) -> Result<SubscriptionRequest> {
        let resource_type = resolve_type(&self.type_url)?;
        let names: BTreeSet<String> = self
            .resource_names
            .into_iter()
            .filter(|name| !name.is_empty())
            .collect();
        Ok(SubscriptionRequest {
            node_group: resolve_group(self.node_group, default_group),
            resource_type,
            mode: DeliveryMode::StateOfTheWorld,
            names: NameUpdate::Replace(names),
            response_nonce: self.response_nonce,
            error_detail: self.error_detail.map(|detail| detail.message),
            version_info: self.version_info,
            initial_versions: BTreeMap::new(),
        })
    }
}

impl DeltaDiscoveryRequest {
    pub fn into_request(self, default_group: &NodeGroup) -> Result<SubscriptionRequest> {
        let resource_type = resolve_type(&self.type_url)?;
        Ok(SubscriptionRequest {
            node_group: resolve_group(self.node_group, default_group),
            resource_type,
            mode: DeliveryMode::Delta,
            names: NameUpdate::Delta {
                subscribe: self.resource_names_subscribe.into_iter().collect(),
                unsubscribe: self.resource_names_unsubscribe.into_iter().collect(),
            },
            response_nonce: self.response_nonce,
            error_detail: self.error_detail.map(|detail| detail.message),
            version_info: String::new(),
            initial_versions: self.initial_resource_versions,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_tagged_discovery_frame() {
        let frame = r#"{"kind":"discovery","node_group":"edge","type_url":"type.googleapis.com/envoy.config.cluster.v3.Cluster","resource_names":["web_service"],"response_nonce":"n1","error_detail":{"code":3,"message":"bad cluster"}}"#;
        let message: ClientMessage = serde_json::from_str(frame).unwrap();
        let request = message.into_request(&"default".into()).unwrap();
        assert_eq!(request.node_group.as_str(), "edge");
        assert_eq!(request.resource_type, ResourceType::Cluster);
        assert_eq!(request.response_nonce, "n1");
        assert_eq!(request.error_detail.as_deref(), Some("bad cluster"));
        assert_eq!(
            request.names,
            NameUpdate::Replace(["web_service".to_string()].into_iter().collect())
        );
    }

    #[test]
    fn missing_node_group_uses_default() {
        let message: ClientMessage =
            serde_json::from_str(r#"{"kind":"delta","type_url":"listener","resource_names_subscribe":["*"]}"#)
                .unwrap();
        let request = message.into_request(&"default".into()).unwrap();
        assert_eq!(request.node_group.as_str(), "default");
        assert_eq!(request.mode, DeliveryMode::Delta);
    }

    #[test]
    fn unknown_or_missing_type_is_rejected() {
        let unknown = ClientMessage::Discovery(DiscoveryRequest {
            type_url: "type.googleapis.com/envoy.Unknown".into(),
            ..DiscoveryRequest::default()
        });
        let err = unknown.into_request(&"default".into()).unwrap_err();
        assert!(err.is_rejection());

        let missing = ClientMessage::Discovery(DiscoveryRequest::default());
        assert!(matches!(
            missing.into_request(&"default".into()),
            Err(XdsError::MalformedRequest(_))
        ));
    }

    #[test]
    fn server_frames_carry_kind() {
        let message = ServerMessage::Rejected(StreamRejection {
            type_url: None,
            reason: "nope".into(),
        });
        let json = serde_json::to_value(&message).unwrap();
        assert_eq!(json["kind"], "rejected");
        assert!(json.get("type_url").is_none());
    }
}
