//! AWS S3 presign gateway.
//!
//! Presigned URLs are computed locally from the configured credentials;
//! only `DeleteObject` and `HeadBucket` reach the network. Those calls run
//! under the SDK's standard retry strategy with a bounded attempt count and
//! a per-operation timeout; exhausted retries surface as errors.
//!
//! Credentials come from the config/environment when given, otherwise from
//! the standard AWS credential chain (`~/.aws/credentials`, IAM role, etc.).

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use aws_config::retry::RetryConfig;
use aws_config::timeout::TimeoutConfig;
use aws_sdk_s3::config::RequestChecksumCalculation;
use aws_sdk_s3::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use aws_sdk_s3::presigning::PresigningConfig;
use aws_sdk_s3::Client;
use tracing::{debug, info};

use super::gateway::{attachment_disposition, BucketProbe, GatewayError, PresignGateway};
use crate::config::StorageConfig;

/// Gateway backed by a real S3 bucket.
pub struct AwsPresignGateway {
    /// AWS S3 SDK client.
    client: Client,
    /// Bucket every URL and call is scoped to.
    bucket: String,
}

impl AwsPresignGateway {
    /// Build the SDK client from `config`.
    pub async fn new(config: &StorageConfig) -> anyhow::Result<Self> {
        let mut loader = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .region(aws_config::Region::new(config.region.clone()))
            .retry_config(RetryConfig::standard().with_max_attempts(config.max_attempts))
            .timeout_config(
                TimeoutConfig::builder()
                    .operation_timeout(Duration::from_secs(config.request_timeout_seconds))
                    .build(),
            );

        if let Some(endpoint) = config.endpoint_url.as_deref() {
            loader = loader.endpoint_url(endpoint);
        }

        // Explicit credentials win over the default chain.
        if let (Some(ak), Some(sk)) = (&config.access_key_id, &config.secret_access_key) {
            let creds = aws_sdk_s3::config::Credentials::new(
                ak,
                sk,
                config.session_token.clone(),
                None, // expiry
                "docbroker-config",
            );
            loader = loader.credentials_provider(creds);
        }

        let sdk_config = loader.load().await;

        // Checksums only when the operation demands one: a presigned PUT
        // must not require headers the browser will not send.
        let s3_config = aws_sdk_s3::config::Builder::from(&sdk_config)
            .force_path_style(config.use_path_style)
            .request_checksum_calculation(RequestChecksumCalculation::WhenRequired)
            .build();

        info!(
            "AWS presign gateway initialized: bucket={} region={} max_attempts={} timeout={}s",
            config.bucket, config.region, config.max_attempts, config.request_timeout_seconds
        );

        Ok(Self::from_client(
            Client::from_conf(s3_config),
            config.bucket.clone(),
        ))
    }

    /// Wrap an already configured client.
    pub fn from_client(client: Client, bucket: String) -> Self {
        Self { client, bucket }
    }

    fn presigning_config(
        operation: &'static str,
        expires_in_seconds: u64,
    ) -> Result<PresigningConfig, GatewayError> {
        PresigningConfig::expires_in(Duration::from_secs(expires_in_seconds)).map_err(|e| {
            GatewayError::Presign {
                operation,
                message: e.to_string(),
            }
        })
    }
}

/// Map an SDK error to a [`GatewayError`] carrying the provider code.
fn provider_error<E, R>(operation: &'static str, err: SdkError<E, R>) -> GatewayError
where
    E: ProvideErrorMetadata + std::error::Error + 'static,
    R: std::fmt::Debug + 'static,
{
    let code = err
        .as_service_error()
        .and_then(|e| e.code())
        .map(str::to_string)
        .unwrap_or_else(|| {
            match &err {
                SdkError::TimeoutError(_) => "Timeout",
                SdkError::DispatchFailure(_) => "DispatchFailure",
                SdkError::ResponseError(_) => "ResponseError",
                SdkError::ConstructionFailure(_) => "ConstructionFailure",
                _ => "Unknown",
            }
            .to_string()
        });
    GatewayError::Provider {
        operation,
        code,
        message: DisplayErrorContext(&err).to_string(),
    }
}

impl PresignGateway for AwsPresignGateway {
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
            let presigning = Self::presigning_config("put_object", expires_in_seconds)?;

            debug!("AWS presign put_object: bucket={} key={}", self.bucket, key);

            // No user metadata here: every x-amz-meta-* header would become
            // a required header of the PUT.
            let request = self
                .client
                .put_object()
                .bucket(&self.bucket)
                .key(&key)
                .content_type(&content_type)
                .presigned(presigning)
                .await
                .map_err(|e| provider_error("put_object", e))?;

            Ok(request.uri().to_string())
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
            let presigning = Self::presigning_config("get_object", expires_in_seconds)?;

            debug!("AWS presign get_object: bucket={} key={}", self.bucket, key);

            let request = self
                .client
                .get_object()
                .bucket(&self.bucket)
                .key(&key)
                .response_content_disposition(disposition)
                .presigned(presigning)
                .await
                .map_err(|e| provider_error("get_object", e))?;

            Ok(request.uri().to_string())
        })
    }

    fn delete_object(
        &self,
        key: &str,
    ) -> Pin<Box<dyn Future<Output = Result<(), GatewayError>> + Send + '_>> {
        let key = key.to_string();
        Box::pin(async move {
            debug!("AWS delete_object: bucket={} key={}", self.bucket, key);

            // S3 delete_object is idempotent -- no error for missing keys.
            self.client
                .delete_object()
                .bucket(&self.bucket)
                .key(&key)
                .send()
                .await
                .map_err(|e| provider_error("delete_object", e))?;

            Ok(())
        })
    }

    fn probe_bucket(&self) -> Pin<Box<dyn Future<Output = BucketProbe> + Send + '_>> {
        Box::pin(async move {
            debug!("AWS head_bucket: bucket={}", self.bucket);

            match self.client.head_bucket().bucket(&self.bucket).send().await {
                Ok(_) => BucketProbe::Reachable,
                Err(err) => match err.raw_response().map(|r| r.status().as_u16()) {
                    Some(404) => BucketProbe::NotFound,
                    Some(403) => BucketProbe::AccessDenied,
                    _ => BucketProbe::Failed(DisplayErrorContext(&err).to_string()),
                },
            }
        })
    }
}
