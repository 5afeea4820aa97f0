//! Error taxonomy for the control plane core.
//!
//! Only stream-level errors are ever reported to clients; nothing here is
//! fatal to the process.

use thiserror::Error;

use crate::resources::ResourceType;

/// Errors produced by the snapshot store, subscription tracker and discovery streams.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum XdsError {
    /// Producer tried to publish the version that is already current.
    #[error("snapshot version {version:?} is already current for node group {node_group}")]
    VersionConflict { node_group: String, version: String },

    /// No snapshot has been published for the node group yet.
    #[error("no snapshot for node group {0}")]
    NotFound(String),

    /// The client sent something the stream cannot act on.
    #[error("malformed request: {0}")]
    MalformedRequest(String),

    /// The client acknowledged a nonce that has since been superseded.
    #[error("stale ack for {resource_type}: nonce {nonce} is not the latest")]
    StaleAck {
        resource_type: ResourceType,
        nonce: String,
    },

    /// A type URL or name that does not map to a known resource type.
    #[error("unknown resource type {0:?}")]
    UnknownResourceType(String),

    /// Two resources of the same type share a name within one snapshot.
    #[error("duplicate {resource_type} resource {name:?}")]
    DuplicateResource {
        resource_type: ResourceType,
        name: String,
    },

    /// The snapshot itself is unusable (e.g. empty version).
    #[error("invalid snapshot: {0}")]
    InvalidSnapshot(String),

    /// The outbound half of a stream went away.
    #[error("stream closed")]
    StreamClosed,
}

impl XdsError {
    /// Errors that are reported back to the client as a stream rejection.
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            XdsError::MalformedRequest(_) | XdsError::UnknownResourceType(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, XdsError>;
