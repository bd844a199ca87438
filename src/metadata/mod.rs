//! Document metadata layer.
//!
//! [`store::MetadataStore`] owns the single JSON file that holds every
//! [`record::DocumentRecord`]; [`registry::DocumentRegistry`] serializes the
//! read-modify-write operations the HTTP handlers perform on it.

use std::path::PathBuf;

use thiserror::Error;

pub mod record;
pub mod registry;
pub mod store;

pub use record::{DocumentMap, DocumentRecord, DocumentStatus};
pub use registry::DocumentRegistry;
pub use store::{LoadErrorPolicy, MetadataStore};

/// Errors raised by the metadata store and registry.
#[derive(Debug, Error)]
pub enum MetadataError {
    /// No record with this id exists.
    #[error("document not found: {document_id}")]
    NotFound { document_id: String },

    /// The caller supplied a value the registry refuses to store.
    #[error("{message}")]
    Invalid { message: String },

    /// The metadata file could not be read or written.
    #[error("metadata file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The metadata file exists but does not hold a valid document map.
    #[error("metadata file {path} is corrupt: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// The in-memory map could not be encoded.
    #[error("failed to encode metadata: {0}")]
    Serialize(#[from] serde_json::Error),
}

pub type MetadataResult<T> = Result<T, MetadataError>;
