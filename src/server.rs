//! Axum router construction.
//!
//! The [`app`] function wires every endpoint to its handler and returns a
//! ready-to-serve [`axum::Router`]. The document routes are mounted twice:
//! at the root and under `/api`, the prefix the browser frontend calls.

use std::sync::Arc;

use axum::{
    http::Method,
    middleware,
    routing::{delete, get, post},
    Json, Router,
};
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;

use crate::errors::panic_response;
use crate::handlers::documents::{
    delete_document, download_url, list_documents, notify_upload, presign_upload,
};
use crate::handlers::health::health_check;
use crate::metrics::{metrics_handler, metrics_middleware};
use crate::AppState;

// -- OpenAPI specification ----------------------------------------------------

/// OpenAPI documentation for the document API.
#[derive(OpenApi)]
#[openapi(
    info(
        title = "docbroker API",
        version = "0.1.0",
        description = "Issues presigned object-storage URLs and tracks document metadata"
    ),
    paths(
        crate::handlers::health::health_check,
        crate::handlers::documents::presign_upload,
        crate::handlers::documents::notify_upload,
        crate::handlers::documents::list_documents,
        crate::handlers::documents::download_url,
        crate::handlers::documents::delete_document,
    ),
    tags(
        (name = "Health", description = "Health check endpoints"),
        (name = "Documents", description = "Document upload, listing, download and removal"),
    )
)]
pub struct ApiDoc;

/// `GET /openapi.json`
async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}

/// Routes served both at `/` and under `/api`.
fn api_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/health", get(health_check))
        .route("/presign-upload", post(presign_upload))
        .route("/notify-upload", post(notify_upload))
        .route("/documents", get(list_documents))
        .route("/documents/:id", delete(delete_document))
        .route("/documents/:id/download", get(download_url))
}

/// Build the axum [`Router`] with all routes and middleware.
pub fn app(state: Arc<AppState>) -> Router {
    let mut router = Router::new()
        .merge(api_routes())
        .nest("/api", api_routes())
        .route("/openapi.json", get(openapi_json));

    if state.config.observability.metrics {
        router = router.route("/metrics", get(metrics_handler));
    }

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers(Any);

    router
        .with_state(state)
        // Panics become 500 InternalError responses before metrics see them.
        .layer(CatchPanicLayer::custom(panic_response))
        // metrics_middleware sits inside CORS so preflights are not timed.
        .layer(middleware::from_fn(metrics_middleware))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}
