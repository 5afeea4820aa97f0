//! Admin and producer API.
//!
//! Producers publish snapshots here; operators inspect node groups and the
//! subscriptions of connected proxies. Every route requires the configured
//! bearer token.

pub mod auth;
pub mod handlers;

use std::time::Duration;

use axum::{
    middleware,
    routing::get,
    Router,
};
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

use crate::http::server::AppState;
use self::auth::admin_auth_middleware;
use self::handlers::*;

#[allow(deprecated)]
pub fn setup_admin_router(state: AppState) -> Router {
    let timeout = Duration::from_secs(state.config.timeouts.request_secs);
    Router::new()
        .route("/admin/status", get(get_status))
        .route("/admin/snapshots", get(list_snapshots))
        .route(
            "/admin/snapshots/{node_group}",
            get(get_snapshot).put(put_snapshot).delete(delete_snapshot),
        )
        .route("/admin/connections", get(list_connections))
        .layer(middleware::from_fn_with_state(state.clone(), admin_auth_middleware))
        .with_state(state)
        .layer(TimeoutLayer::new(timeout))
        .layer(TraceLayer::new_for_http())
}
