//! Object-storage provider access.
//!
//! The [`gateway::PresignGateway`] trait abstracts over the provider.
//! [`aws::AwsPresignGateway`] talks to S3 (or an S3-compatible endpoint);
//! [`memory::MemoryGateway`] is an in-process stand-in.

pub mod aws;
pub mod gateway;
pub mod memory;

pub use gateway::{attachment_disposition, BucketProbe, GatewayError, PresignGateway};
