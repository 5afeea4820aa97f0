//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming TCP connection
//!     → listener.rs (bind, stream admission)
//!     → tls.rs (optional TLS handshake via axum-server)
//!     → http layer (WebSocket upgrade / REST fetch)
//!     → connection.rs (stream id, lifetime tracking)
//! ```

pub mod connection;
pub mod listener;
pub mod tls;
