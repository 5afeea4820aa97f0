//! REST long-poll endpoint.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};

use crate::discovery::DiscoveryRequest;
use crate::http::response::ApiError;
use crate::http::server::AppState;
use crate::resources::ResourceType;

/// `POST /v3/discovery/{resource_type}`: 200 with a response, or 304 when
/// nothing newer than `version_info` appeared in time.
pub async fn fetch_resources(
    State(state): State<AppState>,
    Path(resource_type): Path<String>,
    Json(request): Json<DiscoveryRequest>,
) -> Result<Response, ApiError> {
    let resource_type = ResourceType::parse(&resource_type)?;
    match state.discovery.fetch(resource_type, request).await? {
        Some(response) => Ok(Json(response).into_response()),
        None => Ok(StatusCode::NOT_MODIFIED.into_response()),
    }
}
