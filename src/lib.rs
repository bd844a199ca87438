//! docbroker library -- document upload/download broker.
//!
//! Clients never send document bytes through this service. It registers
//! documents in a file-backed metadata store, hands out presigned
//! object-storage URLs for the actual transfers, and tracks which uploads
//! have completed.

use std::sync::Arc;

pub mod config;
pub mod errors;
pub mod handlers;
pub mod metadata;
pub mod metrics;
pub mod server;
pub mod storage;

use crate::config::Config;
use crate::metadata::DocumentRegistry;
use crate::storage::PresignGateway;

/// Shared application state passed to all handlers via `axum::extract::State`.
pub struct AppState {
    /// Server configuration.
    pub config: Config,
    /// Document registry over the metadata file.
    pub registry: DocumentRegistry,
    /// Presign gateway bound to the configured bucket.
    pub gateway: Arc<dyn PresignGateway>,
}
