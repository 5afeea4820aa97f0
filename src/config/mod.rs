//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → ControlPlaneConfig (validated, immutable)
//!     → shared via Arc to all subsystems
//!
//! Bootstrap snapshot file (TOML/JSON):
//!     loader.rs loads SnapshotDocument at startup
//!     → watcher.rs detects change
//!     → loader.rs reloads document
//!     → SnapshotStore publish (a new version wakes every stream)
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; changes require a restart
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;
pub mod watcher;

pub use schema::ControlPlaneConfig;
pub use schema::{
    AdminConfig, BootstrapConfig, DiscoveryConfig, ListenerConfig, ObservabilityConfig,
    TimeoutConfig, TlsConfig,
};
