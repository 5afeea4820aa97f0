//! xDS-style configuration control plane.
//!
//! Producers publish versioned snapshots per node group; proxies hold
//! long-lived discovery streams and receive every new version, acknowledging
//! or rejecting each one.

pub mod admin;
pub mod cache;
pub mod config;
pub mod discovery;
pub mod error;
pub mod http;
pub mod lifecycle;
pub mod net;
pub mod observability;
pub mod resilience;
pub mod resources;
pub mod subscription;

pub use cache::SnapshotStore;
pub use config::schema::ControlPlaneConfig;
pub use error::XdsError;
pub use http::XdsServer;
pub use lifecycle::Shutdown;
