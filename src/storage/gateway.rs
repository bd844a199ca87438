//! Abstract presign gateway trait.
//!
//! A [`PresignGateway`] is bound to one bucket of an external object-storage
//! provider. It never moves object bytes: it mints time-limited URLs that
//! the client uses directly, deletes objects, and probes the bucket.

use std::future::Future;
use std::pin::Pin;

use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use thiserror::Error;
use tracing::{debug, error};

/// Characters left unescaped in an RFC 5987 `filename*` value.
const FILENAME_ENCODE_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

/// Errors returned by a gateway.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// A presigned URL could not be produced.
    #[error("failed to presign {operation}: {message}")]
    Presign {
        operation: &'static str,
        message: String,
    },

    /// The provider rejected the call (or retries were exhausted).
    #[error("object storage {operation} failed ({code}): {message}")]
    Provider {
        operation: &'static str,
        code: String,
        message: String,
    },
}

impl GatewayError {
    /// Provider error code, if the provider returned one.
    pub fn code(&self) -> Option<&str> {
        match self {
            GatewayError::Provider { code, .. } => Some(code),
            GatewayError::Presign { .. } => None,
        }
    }
}

/// Outcome of a bucket reachability probe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BucketProbe {
    Reachable,
    NotFound,
    AccessDenied,
    /// Transport failure or any other provider error.
    Failed(String),
}

impl BucketProbe {
    pub fn is_reachable(&self) -> bool {
        matches!(self, BucketProbe::Reachable)
    }
}

/// Async presign contract.
pub trait PresignGateway: Send + Sync + 'static {
    /// Bucket every call is scoped to.
    fn bucket(&self) -> &str;

    /// URL authorizing one `PUT` of `key` with exactly `content_type` as
    /// its only required header.
    fn presign_upload(
        &self,
        key: &str,
        content_type: &str,
        expires_in_seconds: u64,
    ) -> Pin<Box<dyn Future<Output = Result<String, GatewayError>> + Send + '_>>;

    /// URL authorizing one `GET` of `key`, answered with an attachment
    /// disposition naming `suggested_filename`.
    fn presign_download(
        &self,
        key: &str,
        expires_in_seconds: u64,
        suggested_filename: &str,
    ) -> Pin<Box<dyn Future<Output = Result<String, GatewayError>> + Send + '_>>;

    /// Delete the object at `key`.
    fn delete_object(
        &self,
        key: &str,
    ) -> Pin<Box<dyn Future<Output = Result<(), GatewayError>> + Send + '_>>;

    /// Classify whether the bucket exists and is accessible.
    fn probe_bucket(&self) -> Pin<Box<dyn Future<Output = BucketProbe> + Send + '_>>;

    /// [`probe_bucket`](Self::probe_bucket) collapsed to a boolean; the
    /// specific failure is only logged.
    fn check_reachable(&self) -> Pin<Box<dyn Future<Output = bool> + Send + '_>> {
        Box::pin(async move {
            let probe = self.probe_bucket().await;
            match &probe {
                BucketProbe::Reachable => debug!("Bucket '{}' is reachable", self.bucket()),
                BucketProbe::NotFound => error!("Bucket '{}' not found", self.bucket()),
                BucketProbe::AccessDenied => {
                    error!("Access denied to bucket '{}'", self.bucket())
                }
                BucketProbe::Failed(reason) => {
                    error!("Failed to probe bucket '{}': {}", self.bucket(), reason)
                }
            }
            probe.is_reachable()
        })
    }
}

/// `Content-Disposition` value for a download of `filename`.
///
/// Uses the RFC 5987 extended form so non-ASCII names survive transport.
pub fn attachment_disposition(filename: &str) -> String {
    format!(
        "attachment; filename*=UTF-8''{}",
        utf8_percent_encode(filename, FILENAME_ENCODE_SET)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disposition_ascii() {
        assert_eq!(
            attachment_disposition("report-2026_v1.pdf"),
            "attachment; filename*=UTF-8''report-2026_v1.pdf"
        );
    }

    #[test]
    fn test_disposition_spaces_and_non_ascii() {
        assert_eq!(
            attachment_disposition("relatório final.pdf"),
            "attachment; filename*=UTF-8''relat%C3%B3rio%20final.pdf"
        );
    }

    #[test]
    fn test_disposition_escapes_quotes_and_separators() {
        let value = attachment_disposition("a\"b;c'd.pdf");
        assert_eq!(value, "attachment; filename*=UTF-8''a%22b%3Bc%27d.pdf");
    }

    #[test]
    fn test_probe_collapse() {
        assert!(BucketProbe::Reachable.is_reachable());
        assert!(!BucketProbe::NotFound.is_reachable());
        assert!(!BucketProbe::AccessDenied.is_reachable());
        assert!(!BucketProbe::Failed("timeout".into()).is_reachable());
    }
}
