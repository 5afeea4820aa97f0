//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP/TLS connection
//!     → server.rs (Axum setup, request ids, tracing)
//!     → websocket.rs (GET /v3/discovery: upgrade, frame bridge to a DiscoveryStream)
//!     → fetch.rs (POST /v3/discovery/{type}: long-poll fetch)
//!     → response.rs (error → status code mapping)
//! ```

pub mod fetch;
pub mod response;
pub mod server;
pub mod websocket;

pub use response::ApiError;
pub use server::{AppState, XdsServer};
