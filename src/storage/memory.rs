//! In-process presign gateway.
//!
//! Produces deterministic `memory://` URLs and keeps the set of "stored"
//! keys in a map so that local development and the test suite can run
//! without an object-storage provider. Failures can be switched on to
//! exercise the degraded paths.

use std::collections::{BTreeSet, VecDeque};
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};

use super::gateway::{attachment_disposition, BucketProbe, GatewayError, PresignGateway};

/// Key characters escaped in the URL path (`/` is kept).
const KEY_ENCODE_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~')
    .remove(b'/');

/// Query-value characters escaped in generated URLs.
const QUERY_ENCODE_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

/// Upper bound on presign expiry, mirroring S3's seven days.
const MAX_EXPIRY_SECONDS: u64 = 7 * 24 * 3600;

/// Most recent delete attempts kept for inspection.
const DELETE_LOG_CAPACITY: usize = 1024;

pub struct MemoryGateway {
    bucket: String,
    /// Keys considered present in the bucket.
    objects: Mutex<BTreeSet<String>>,
    /// Keys of the latest delete attempts, oldest first.
    delete_log: Mutex<VecDeque<String>>,
    fail_deletes: AtomicBool,
    probe: Mutex<BucketProbe>,
}

impl MemoryGateway {
    pub fn new(bucket: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            objects: Mutex::new(BTreeSet::new()),
            delete_log: Mutex::new(VecDeque::new()),
            fail_deletes: AtomicBool::new(false),
            probe: Mutex::new(BucketProbe::Reachable),
        }
    }

    /// Pretend a client uploaded `key`.
    pub fn insert_object(&self, key: &str) {
        self.objects
            .lock()
            .expect("mutex poisoned")
            .insert(key.to_string());
    }

    pub fn contains_object(&self, key: &str) -> bool {
        self.objects.lock().expect("mutex poisoned").contains(key)
    }

    /// Keys passed to `delete_object`, including failed attempts. Only the
    /// latest 1024 are kept.
    pub fn delete_attempts(&self) -> Vec<String> {
        self.delete_log
            .lock()
            .expect("mutex poisoned")
            .iter()
            .cloned()
            .collect()
    }

    /// Make every subsequent delete fail with a provider error.
    pub fn set_fail_deletes(&self, fail: bool) {
        self.fail_deletes.store(fail, Ordering::SeqCst);
    }

    /// Set the result of subsequent bucket probes.
    pub fn set_probe(&self, probe: BucketProbe) {
        *self.probe.lock().expect("mutex poisoned") = probe;
    }

    fn url(&self, key: &str, params: &[(&str, String)]) -> String {
        let query: Vec<String> = params
            .iter()
            .map(|(k, v)| format!("{k}={}", utf8_percent_encode(v, QUERY_ENCODE_SET)))
            .collect();
        format!(
            "memory://{}/{}?{}",
            self.bucket,
            utf8_percent_encode(key, KEY_ENCODE_SET),
            query.join("&")
        )
    }

    fn check_expiry(operation: &'static str, expires_in_seconds: u64) -> Result<(), GatewayError> {
        if expires_in_seconds == 0 || expires_in_seconds > MAX_EXPIRY_SECONDS {
            return Err(GatewayError::Presign {
                operation,
                message: format!(
                    "expiry must be between 1 and {MAX_EXPIRY_SECONDS} seconds, got {expires_in_seconds}"
                ),
            });
        }
        Ok(())
    }
}

impl PresignGateway for MemoryGateway {
    fn bucket(&self) -> &str {
        &self.bucket
    }

    fn presign_upload(
        &self,
        key: &str,
        content_type: &str,
        expires_in_seconds: u64,
    ) -> Pin<Box<dyn Future<Output = Result<String, GatewayError>> + Send + '_>> {
        let key = key.to_string();
        let content_type = content_type.to_string();
        Box::pin(async move {
            Self::check_expiry("put_object", expires_in_seconds)?;
            Ok(self.url(
                &key,
                &[
                    ("method", "PUT".to_string()),
                    ("content-type", content_type),
                    ("expires", expires_in_seconds.to_string()),
                ],
            ))
        })
    }

    fn presign_download(
        &self,
        key: &str,
        expires_in_seconds: u64,
        suggested_filename: &str,
    ) -> Pin<Box<dyn Future<Output = Result<String, GatewayError>> + Send + '_>> {
        let key = key.to_string();
        let disposition = attachment_disposition(suggested_filename);
        Box::pin(async move {
            Self::check_expiry("get_object", expires_in_seconds)?;
            Ok(self.url(
                &key,
                &[
                    ("method", "GET".to_string()),
                    ("response-content-disposition", disposition),
                    ("expires", expires_in_seconds.to_string()),
                ],
            ))
        })
    }

    fn delete_object(
        &self,
        key: &str,
    ) -> Pin<Box<dyn Future<Output = Result<(), GatewayError>> + Send + '_>> {
        let key = key.to_string();
        Box::pin(async move {
            {
                let mut log = self.delete_log.lock().expect("mutex poisoned");
                if log.len() == DELETE_LOG_CAPACITY {
                    log.pop_front();
                }
                log.push_back(key.clone());
            }

            if self.fail_deletes.load(Ordering::SeqCst) {
                return Err(GatewayError::Provider {
                    operation: "delete_object",
                    code: "ServiceUnavailable".to_string(),
                    message: format!("simulated failure deleting {key}"),
                });
            }

            self.objects.lock().expect("mutex poisoned").remove(&key);
            Ok(())
        })
    }

    fn probe_bucket(&self) -> Pin<Box<dyn Future<Output = BucketProbe> + Send + '_>> {
        Box::pin(async move { self.probe.lock().expect("mutex poisoned").clone() })
    }
}
