//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create Axum Router with all handlers
//! - Wire up middleware (tracing, request ID)
//! - Serve over plain TCP or TLS
//! - Stop accepting and close streams on shutdown

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::State,
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use tokio::net::TcpListener;
use tower_http::{
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};

use crate::cache::SnapshotStore;
use crate::config::ControlPlaneConfig;
use crate::discovery::DiscoveryService;
use crate::lifecycle::Shutdown;
use crate::net::connection::StreamTracker;
use crate::net::listener::StreamLimiter;
use crate::net::tls::load_tls_config;
use crate::resilience::backoff::Backoff;
use crate::resources::NodeGroup;
use crate::subscription::SubscriptionTracker;
use crate::http::{fetch, websocket};

/// How long in-flight connections get to finish after shutdown on TLS listeners.
const TLS_DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub discovery: Arc<DiscoveryService>,
    pub streams: StreamTracker,
    pub stream_limit: StreamLimiter,
    pub config: Arc<ControlPlaneConfig>,
    pub shutdown: Shutdown,
}

impl AppState {
    pub fn new(config: ControlPlaneConfig, store: Arc<SnapshotStore>, shutdown: Shutdown) -> Self {
        let tracker = Arc::new(SubscriptionTracker::new(Backoff::from_config(&config.discovery)));
        let discovery = Arc::new(DiscoveryService::new(
            store,
            tracker,
            config.discovery.clone(),
            NodeGroup::new(config.bootstrap.node_group.clone()),
        ));
        Self {
            discovery,
            streams: StreamTracker::new(),
            stream_limit: StreamLimiter::new(config.listener.max_streams),
            config: Arc::new(config),
            shutdown,
        }
    }

    pub fn store(&self) -> &Arc<SnapshotStore> {
        self.discovery.store()
    }

    pub fn tracker(&self) -> &Arc<SubscriptionTracker> {
        self.discovery.tracker()
    }
}

/// Discovery server: WebSocket streams, REST fetch and health.
pub struct XdsServer {
    router: Router,
    state: AppState,
}

impl XdsServer {
    pub fn new(state: AppState) -> Self {
        let router = Self::build_router(state.clone());
        Self { router, state }
    }

    /// Build the Axum router with all middleware layers.
    pub fn build_router(state: AppState) -> Router {
        Router::new()
            .route("/v3/discovery", get(websocket::discovery_stream))
            .route("/v3/discovery/{resource_type}", post(fetch::fetch_resources))
            .route("/healthz", get(healthz))
            .with_state(state)
            .layer(PropagateRequestIdLayer::x_request_id())
            .layer(TraceLayer::new_for_http())
            .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
    }

    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Run the server until the shutdown signal fires.
    pub async fn run(self, listener: TcpListener) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        let app = self.router.into_make_service_with_connect_info::<SocketAddr>();
        let mut shutdown = self.state.shutdown.subscribe();

        match &self.state.config.listener.tls {
            Some(tls) => {
                let rustls = load_tls_config(tls).await?;
                tracing::info!(address = %addr, "Discovery server starting (TLS)");

                let handle = axum_server::Handle::new();
                let stopper = handle.clone();
                tokio::spawn(async move {
                    let _ = shutdown.recv().await;
                    stopper.graceful_shutdown(Some(TLS_DRAIN_TIMEOUT));
                });

                axum_server::from_tcp_rustls(listener.into_std()?, rustls)
                    .handle(handle)
                    .serve(app)
                    .await?;
            }
            None => {
                tracing::info!(address = %addr, "Discovery server starting");
                axum::serve(listener, app)
                    .with_graceful_shutdown(async move {
                        let _ = shutdown.recv().await;
                    })
                    .await?;
            }
        }

        tracing::info!("Discovery server stopped");
        Ok(())
    }
}

#[derive(Debug, Serialize)]
struct Health {
    status: &'static str,
    active_streams: u64,
}

async fn healthz(State(state): State<AppState>) -> Json<Health> {
    Json(Health {
        status: "ok",
        active_streams: state.streams.active_count(),
    })
}
