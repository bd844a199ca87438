//! Document API handlers.
//!
//! Each handler runs one registry operation and, where needed, one gateway
//! call. Object bytes never pass through here: clients upload and download
//! directly against the presigned URLs.

use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::Json;
use garde::Validate;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use utoipa::ToSchema;

use super::json_body;
use crate::errors::{ApiError, ErrorBody};
use crate::metadata::{DocumentRecord, DocumentStatus};
use crate::metrics::{record_operation, record_orphaned_object};
use crate::AppState;

// -- Request / response bodies ------------------------------------------------

/// Body of `POST /presign-upload`.
#[derive(Debug, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PresignUploadRequest {
    /// Name of the file on the client's machine.
    #[garde(length(min = 1, max = 255))]
    pub filename: String,
    /// Defaults to the allowed content type when omitted.
    #[serde(default)]
    #[garde(skip)]
    pub content_type: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PresignUploadResponse {
    pub upload_url: String,
    pub document_id: String,
    /// Storage key the client uploads to.
    pub key: String,
    pub expires_in_seconds: u64,
}

/// Body of `POST /notify-upload`.
#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct NotifyUploadRequest {
    pub document_id: String,
    pub size_bytes: u64,
    /// `uploaded` (default) or `error`.
    #[serde(default = "default_notify_status")]
    pub status: DocumentStatus,
}

fn default_notify_status() -> DocumentStatus {
    DocumentStatus::Uploaded
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct NotifyUploadResponse {
    pub message: String,
    pub document_id: String,
    pub status: DocumentStatus,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct DocumentListResponse {
    pub documents: Vec<DocumentRecord>,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct DownloadUrlResponse {
    pub download_url: String,
    pub expires_in_seconds: u64,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct DeleteDocumentResponse {
    pub message: String,
    pub document_id: String,
    /// False when the metadata was removed but the stored object was not.
    pub object_deleted: bool,
}

/// Outcome label for the operations counter.
fn outcome<T>(result: &Result<T, ApiError>) -> &'static str {
    match result {
        Ok(_) => "success",
        Err(ApiError::Validation { .. }) => "invalid",
        Err(ApiError::NotFound { .. }) => "not_found",
        Err(_) => "error",
    }
}

// -- Handlers -----------------------------------------------------------------

/// `POST /presign-upload` -- register a pending document and mint an upload URL.
#[utoipa::path(
    post,
    path = "/presign-upload",
    tag = "Documents",
    operation_id = "PresignUpload",
    request_body = PresignUploadRequest,
    responses(
        (status = 200, description = "Upload URL issued", body = PresignUploadResponse),
        (status = 400, description = "Invalid filename or content type", body = ErrorBody),
        (status = 502, description = "Object storage failure", body = ErrorBody)
    )
)]
pub async fn presign_upload(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<PresignUploadRequest>, JsonRejection>,
) -> Result<Json<PresignUploadResponse>, ApiError> {
    let result = issue_upload_url(&state, payload).await;
    record_operation("presign_upload", outcome(&result));
    result.map(Json)
}

async fn issue_upload_url(
    state: &AppState,
    payload: Result<Json<PresignUploadRequest>, JsonRejection>,
) -> Result<PresignUploadResponse, ApiError> {
    let req = json_body(payload)?;
    req.validate()
        .map_err(|report| ApiError::validation(format!("invalid request: {report}")))?;

    let allowed = state.config.presign.allowed_content_type.as_str();
    let content_type = req.content_type.as_deref().unwrap_or(allowed);
    if content_type != allowed {
        return Err(ApiError::validation(format!(
            "Only {allowed} uploads are allowed, got {content_type}"
        )));
    }

    let registration = state
        .registry
        .register_pending(&req.filename, content_type)
        .await?;

    let expires_in_seconds = state.config.presign.upload_expiry_seconds;
    let upload_url = match state
        .gateway
        .presign_upload(&registration.storage_key, content_type, expires_in_seconds)
        .await
    {
        Ok(url) => url,
        Err(err) => {
            // Nobody can upload without the URL; drop the pending record.
            if let Err(cleanup) = state.registry.remove(&registration.document_id).await {
                warn!(
                    "Failed to discard pending document {}: {}",
                    registration.document_id, cleanup
                );
            }
            return Err(err.into());
        }
    };

    info!(
        "Issued upload URL for document {} ({})",
        registration.document_id, req.filename
    );
    Ok(PresignUploadResponse {
        upload_url,
        document_id: registration.document_id,
        key: registration.storage_key,
        expires_in_seconds,
    })
}

/// `POST /notify-upload` -- record the outcome of a client upload.
#[utoipa::path(
    post,
    path = "/notify-upload",
    tag = "Documents",
    operation_id = "NotifyUpload",
    request_body = NotifyUploadRequest,
    responses(
        (status = 200, description = "Status recorded", body = NotifyUploadResponse),
        (status = 400, description = "Malformed request", body = ErrorBody),
        (status = 404, description = "Unknown document", body = ErrorBody)
    )
)]
pub async fn notify_upload(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<NotifyUploadRequest>, JsonRejection>,
) -> Result<Json<NotifyUploadResponse>, ApiError> {
    let result = async {
        let req = json_body(payload)?;
        let record = state
            .registry
            .mark_uploaded(&req.document_id, req.size_bytes, req.status)
            .await?;
        Ok::<_, ApiError>(NotifyUploadResponse {
            message: format!("Document marked {}", record.status),
            document_id: record.document_id,
            status: record.status,
        })
    }
    .await;
    record_operation("notify_upload", outcome(&result));
    result.map(Json)
}

/// `GET /documents` -- uploaded documents, newest first.
#[utoipa::path(
    get,
    path = "/documents",
    tag = "Documents",
    operation_id = "ListDocuments",
    responses(
        (status = 200, description = "Uploaded documents", body = DocumentListResponse),
        (status = 500, description = "Metadata unavailable", body = ErrorBody)
    )
)]
pub async fn list_documents(
    State(state): State<Arc<AppState>>,
) -> Result<Json<DocumentListResponse>, ApiError> {
    let result = state
        .registry
        .list()
        .await
        .map(|documents| DocumentListResponse { documents })
        .map_err(ApiError::from);
    record_operation("list", outcome(&result));
    result.map(Json)
}

/// `GET /documents/{id}/download` -- mint a download URL.
#[utoipa::path(
    get,
    path = "/documents/{id}/download",
    tag = "Documents",
    operation_id = "DownloadUrl",
    params(("id" = String, Path, description = "Document id")),
    responses(
        (status = 200, description = "Download URL issued", body = DownloadUrlResponse),
        (status = 404, description = "Unknown document", body = ErrorBody),
        (status = 502, description = "Object storage failure", body = ErrorBody)
    )
)]
pub async fn download_url(
    State(state): State<Arc<AppState>>,
    Path(document_id): Path<String>,
) -> Result<Json<DownloadUrlResponse>, ApiError> {
    let result = async {
        let record = state.registry.get(&document_id).await?;
        let expires_in_seconds = state.config.presign.download_expiry_seconds;
        let download_url = state
            .gateway
            .presign_download(
                &record.storage_key,
                expires_in_seconds,
                &record.original_filename,
            )
            .await?;
        Ok::<_, ApiError>(DownloadUrlResponse {
            download_url,
            expires_in_seconds,
        })
    }
    .await;
    record_operation("download", outcome(&result));
    result.map(Json)
}

/// `DELETE /documents/{id}` -- remove the record, then the stored object.
///
/// The object delete is best effort: a failure is logged and reported as
/// `objectDeleted: false`, but the record stays removed.
#[utoipa::path(
    delete,
    path = "/documents/{id}",
    tag = "Documents",
    operation_id = "DeleteDocument",
    params(("id" = String, Path, description = "Document id")),
    responses(
        (status = 200, description = "Document removed", body = DeleteDocumentResponse),
        (status = 404, description = "Unknown document", body = ErrorBody)
    )
)]
pub async fn delete_document(
    State(state): State<Arc<AppState>>,
    Path(document_id): Path<String>,
) -> Result<Json<DeleteDocumentResponse>, ApiError> {
    let result = async {
        let record = state.registry.remove(&document_id).await?;

        let object_deleted = match state.gateway.delete_object(&record.storage_key).await {
            Ok(()) => true,
            Err(err) => {
                warn!(
                    "Document {} removed but object {} was left in bucket '{}': {}",
                    document_id,
                    record.storage_key,
                    state.gateway.bucket(),
                    err
                );
                record_orphaned_object();
                false
            }
        };

        Ok::<_, ApiError>(DeleteDocumentResponse {
            message: "Document deleted".to_string(),
            document_id: record.document_id,
            object_deleted,
        })
    }
    .await;
    record_operation("delete", outcome(&result));
    result.map(Json)
}
