use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Serialize;

use crate::cache::store::SnapshotStatus;
use crate::error::XdsError;
use crate::http::response::ApiError;
use crate::http::server::AppState;
use crate::resources::{NodeGroup, SnapshotDocument};
use crate::subscription::ConnectionSummary;

#[derive(Serialize)]
pub struct SystemStatus {
    pub version: &'static str,
    pub status: &'static str,
    pub node_groups: usize,
    pub active_streams: u64,
    pub connections: usize,
}

pub async fn get_status(State(state): State<AppState>) -> Json<SystemStatus> {
    Json(SystemStatus {
        version: env!("CARGO_PKG_VERSION"),
        status: "operational",
        node_groups: state.store().node_groups().len(),
        active_streams: state.streams.active_count(),
        connections: state.tracker().connection_count(),
    })
}

pub async fn list_snapshots(State(state): State<AppState>) -> Json<Vec<SnapshotStatus>> {
    Json(state.store().node_groups())
}

pub async fn get_snapshot(
    State(state): State<AppState>,
    Path(node_group): Path<String>,
) -> Result<Json<SnapshotDocument>, ApiError> {
    let snapshot = state.store().get_snapshot(&NodeGroup::new(node_group.clone()))?;
    Ok(Json(SnapshotDocument::from_snapshot(Some(node_group), &snapshot)))
}

/// Publish a snapshot document under the node group named in the path.
pub async fn put_snapshot(
    State(state): State<AppState>,
    Path(node_group): Path<String>,
    Json(document): Json<SnapshotDocument>,
) -> Result<(StatusCode, Json<SnapshotStatus>), ApiError> {
    if let Some(named) = document.node_group.as_deref() {
        if named != node_group {
            return Err(XdsError::MalformedRequest(format!(
                "document names node group {} but the path names {}",
                named, node_group
            ))
            .into());
        }
    }

    let group = NodeGroup::new(node_group);
    let published = state.store().publish_document(&group, document)?;
    tracing::info!(
        node_group = %group,
        version = %published.version(),
        "Snapshot published via admin API"
    );
    let status = state
        .store()
        .status(&group)
        .ok_or_else(|| XdsError::NotFound(group.to_string()))?;
    Ok((StatusCode::CREATED, Json(status)))
}

pub async fn delete_snapshot(
    State(state): State<AppState>,
    Path(node_group): Path<String>,
) -> Result<StatusCode, ApiError> {
    state.store().clear_snapshot(&NodeGroup::new(node_group))?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn list_connections(State(state): State<AppState>) -> Json<Vec<ConnectionSummary>> {
    Json(state.tracker().connections())
}
