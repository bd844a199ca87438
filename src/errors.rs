//! API error types.
//!
//! Every failure a handler can produce is an [`ApiError`]. The enum
//! implements [`axum::response::IntoResponse`] so handlers can simply
//! return `Err(ApiError::NotFound { .. })`; the response is a JSON body
//! `{"detail", "code", "requestId"}` with a matching `x-request-id` header.

use std::any::Any;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;
use tracing::{error, warn};
use utoipa::ToSchema;

use crate::metadata::MetadataError;
use crate::storage::GatewayError;

/// Message returned in place of internal error details.
const GENERIC_SERVER_ERROR: &str = "Internal server error";

/// Generate a 16-character hex request ID.
pub fn generate_request_id() -> String {
    let bytes: [u8; 8] = rand::random();
    hex::encode(bytes).to_uppercase()
}

/// Errors surfaced by the HTTP API.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Bad content type, bad filename, malformed body.
    #[error("{message}")]
    Validation { message: String },

    /// Unknown document id.
    #[error("Document not found: {document_id}")]
    NotFound { document_id: String },

    /// The object-storage provider rejected a call.
    #[error(transparent)]
    Upstream(#[from] GatewayError),

    /// The metadata file could not be read or written.
    #[error("{0}")]
    Persistence(MetadataError),

    /// Catch-all for unexpected internal errors.
    #[error("{0}")]
    Internal(#[from] anyhow::Error),
}

/// JSON error body.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ErrorBody {
    /// Human-readable message.
    pub detail: String,
    /// Stable error code.
    pub code: String,
    pub request_id: String,
}

impl ApiError {
    pub fn validation(message: impl Into<String>) -> Self {
        ApiError::Validation {
            message: message.into(),
        }
    }

    /// Stable error code string.
    pub fn code(&self) -> &'static str {
        match self {
            ApiError::Validation { .. } => "ValidationError",
            ApiError::NotFound { .. } => "NotFound",
            ApiError::Upstream(_) => "UpstreamError",
            ApiError::Persistence(_) => "PersistenceError",
            ApiError::Internal(_) => "InternalError",
        }
    }

    /// HTTP status for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Validation { .. } => StatusCode::BAD_REQUEST,
            ApiError::NotFound { .. } => StatusCode::NOT_FOUND,
            ApiError::Upstream(_) => StatusCode::BAD_GATEWAY,
            ApiError::Persistence(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message shown to the client. Server-side failures stay in the log.
    fn public_message(&self) -> String {
        match self {
            ApiError::Persistence(_) | ApiError::Internal(_) => GENERIC_SERVER_ERROR.to_string(),
            ApiError::Upstream(err) => match err.code() {
                Some(code) => format!("Object storage request failed ({code})"),
                None => "Object storage request failed".to_string(),
            },
            other => other.to_string(),
        }
    }
}

impl From<MetadataError> for ApiError {
    fn from(err: MetadataError) -> Self {
        match err {
            MetadataError::NotFound { document_id } => ApiError::NotFound { document_id },
            MetadataError::Invalid { message } => ApiError::Validation { message },
            other => ApiError::Persistence(other),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let request_id = generate_request_id();
        let status = self.status_code();

        match &self {
            ApiError::Upstream(err) => error!(
                "[{}] upstream failure (code={}): {}",
                request_id,
                err.code().unwrap_or("none"),
                err
            ),
            ApiError::Persistence(err) => error!("[{}] persistence failure: {}", request_id, err),
            ApiError::Internal(err) => error!("[{}] internal error: {:#}", request_id, err),
            other => warn!("[{}] {} {}", request_id, other.code(), other),
        }

        let body = ErrorBody {
            detail: self.public_message(),
            code: self.code().to_string(),
            request_id: request_id.clone(),
        };

        (status, [("x-request-id", request_id)], Json(body)).into_response()
    }
}

/// Response for a handler that panicked: a generic 500 `InternalError`,
/// with the panic message only in the log.
pub fn panic_response(payload: Box<dyn Any + Send + 'static>) -> Response {
    let message = if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else {
        "non-string panic payload".to_string()
    };
    ApiError::from(anyhow::anyhow!("handler panicked: {message}")).into_response()
}
