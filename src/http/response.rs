//! Error responses for the HTTP surfaces.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::error::XdsError;

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

/// An [`XdsError`] rendered as a JSON error with a matching status code.
#[derive(Debug)]
pub struct ApiError(pub XdsError);

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match &self.0 {
            XdsError::VersionConflict { .. } => StatusCode::CONFLICT,
            XdsError::NotFound(_) => StatusCode::NOT_FOUND,
            XdsError::MalformedRequest(_)
            | XdsError::UnknownResourceType(_)
            | XdsError::DuplicateResource { .. }
            | XdsError::InvalidSnapshot(_) => StatusCode::BAD_REQUEST,
            XdsError::StaleAck { .. } => StatusCode::CONFLICT,
            XdsError::StreamClosed => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

impl From<XdsError> for ApiError {
    fn from(error: XdsError) -> Self {
        Self(error)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        (status, Json(ErrorBody { error: self.0.to_string() })).into_response()
    }
}
