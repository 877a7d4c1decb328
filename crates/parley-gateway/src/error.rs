// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Mapping of [`ParleyError`] onto HTTP responses.

use axum::{
    Json,
    extract::rejection::{JsonRejection, PathRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use parley_core::ParleyError;
use serde::Serialize;

/// Error response body.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// Human-readable description.
    pub error: String,
    /// Stable machine-readable code.
    pub code: &'static str,
    /// Present for partial persist failures: what landed and what did not.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

/// A [`ParleyError`] on its way out of a handler.
#[derive(Debug)]
pub struct ApiError(pub ParleyError);

impl From<ParleyError> for ApiError {
    fn from(err: ParleyError) -> Self {
        Self(err)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self(ParleyError::InvalidInput(rejection.body_text()))
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        Self(ParleyError::InvalidInput(rejection.body_text()))
    }
}

impl From<PathRejection> for ApiError {
    fn from(rejection: PathRejection) -> Self {
        Self(ParleyError::InvalidInput(rejection.body_text()))
    }
}

/// Status code and error code for each error kind.
pub fn classify(err: &ParleyError) -> (StatusCode, &'static str) {
    match err {
        ParleyError::NotFound { .. } => (StatusCode::NOT_FOUND, "not_found"),
        ParleyError::AlreadyExists { .. } => (StatusCode::CONFLICT, "already_exists"),
        ParleyError::VersionConflict { .. } => (StatusCode::CONFLICT, "version_conflict"),
        ParleyError::InvalidInput(_) => (StatusCode::BAD_REQUEST, "invalid_input"),
        ParleyError::AccessDenied { .. } => (StatusCode::FORBIDDEN, "access_denied"),
        ParleyError::StorageUnavailable { .. } => {
            (StatusCode::SERVICE_UNAVAILABLE, "storage_unavailable")
        }
        ParleyError::Storage { .. } => (StatusCode::BAD_GATEWAY, "storage_error"),
        ParleyError::PartialPersistFailure(_) => {
            (StatusCode::INTERNAL_SERVER_ERROR, "partial_persist_failure")
        }
        ParleyError::Timeout { .. } => (StatusCode::GATEWAY_TIMEOUT, "timeout"),
        ParleyError::Config(_) | ParleyError::Internal(_) => {
            (StatusCode::INTERNAL_SERVER_ERROR, "internal")
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = classify(&self.0);
        if status.is_server_error() {
            tracing::warn!(status = status.as_u16(), code, error = %self.0, "request failed");
        } else {
            tracing::debug!(status = status.as_u16(), code, error = %self.0, "request rejected");
        }

        let details = match &self.0 {
            ParleyError::PartialPersistFailure(partial) => serde_json::to_value(partial).ok(),
            _ => None,
        };
        let body = ErrorResponse {
            error: self.0.to_string(),
            code,
            details,
        };
        (status, Json(body)).into_response()
    }
}
