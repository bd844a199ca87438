//! HTTP handlers for the document API.

pub mod documents;
pub mod health;

use axum::extract::rejection::JsonRejection;
use axum::Json;

use crate::errors::ApiError;

/// Unwrap a JSON body, turning axum's rejection into a validation error so
/// malformed bodies get the same error shape as every other failure.
pub(crate) fn json_body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, ApiError> {
    match payload {
        Ok(Json(body)) => Ok(body),
        Err(rejection) => Err(ApiError::validation(rejection.body_text())),
    }
}
