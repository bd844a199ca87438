//! Document record types and the storage-key derivation.
//!
//! The field names are the on-disk (and on-the-wire) names, so existing
//! metadata files written by earlier deployments load unchanged.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use utoipa::ToSchema;

/// Prefix under which every document object is stored.
pub const KEY_PREFIX: &str = "documents/";

/// Longest accepted original filename, in bytes.
pub const MAX_FILENAME_BYTES: usize = 255;

/// The whole persisted state: document id -> record.
pub type DocumentMap = BTreeMap<String, DocumentRecord>;

/// Lifecycle state of a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum DocumentStatus {
    /// A presigned upload URL was issued; no completion notice yet.
    Pending,
    /// The client reported a completed transfer.
    Uploaded,
    /// The client reported a failed transfer.
    Error,
}

impl DocumentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentStatus::Pending => "pending",
            DocumentStatus::Uploaded => "uploaded",
            DocumentStatus::Error => "error",
        }
    }
}

impl fmt::Display for DocumentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Metadata entry tracking one pending or uploaded file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct DocumentRecord {
    /// Opaque unique identifier (UUID v4 string).
    pub document_id: String,
    /// `<documentId>_<originalFilename>`.
    pub filename: String,
    /// Caller-supplied display name.
    pub original_filename: String,
    /// MIME type accepted at registration.
    pub content_type: String,
    /// Object size, known only once the upload is confirmed.
    #[serde(default)]
    pub size_bytes: Option<u64>,
    /// Object-storage key.
    #[serde(rename = "s3Key", alias = "storageKey")]
    pub storage_key: String,
    /// Registration time (UTC).
    #[serde(
        serialize_with = "serialize_timestamp",
        deserialize_with = "deserialize_timestamp"
    )]
    #[schema(value_type = String, format = DateTime)]
    pub uploaded_at: DateTime<Utc>,
    pub status: DocumentStatus,
}

impl DocumentRecord {
    /// Build a fresh `pending` record for `original_filename`.
    pub fn pending(
        document_id: String,
        original_filename: &str,
        content_type: &str,
        uploaded_at: DateTime<Utc>,
    ) -> Self {
        let filename = stored_filename(&document_id, original_filename);
        let storage_key = storage_key(&document_id, original_filename);
        Self {
            document_id,
            filename,
            original_filename: original_filename.to_string(),
            content_type: content_type.to_string(),
            size_bytes: None,
            storage_key,
            uploaded_at,
            status: DocumentStatus::Pending,
        }
    }
}

/// `<documentId>_<originalFilename>`
pub fn stored_filename(document_id: &str, original_filename: &str) -> String {
    format!("{document_id}_{original_filename}")
}

/// Object-storage key for a document.
///
/// Must stay byte-for-byte `documents/<documentId>_<originalFilename>`:
/// objects already in the bucket are addressed this way.
pub fn storage_key(document_id: &str, original_filename: &str) -> String {
    format!(
        "{KEY_PREFIX}{}",
        stored_filename(document_id, original_filename)
    )
}

/// Reject filenames that would make the storage key path-hostile.
///
/// The name is embedded verbatim in the key, so separators, control
/// characters and dot segments are refused rather than escaped.
pub fn validate_original_filename(name: &str) -> Result<(), String> {
    if name.trim().is_empty() {
        return Err("filename must not be empty".to_string());
    }
    if name.len() > MAX_FILENAME_BYTES {
        return Err(format!(
            "filename must be at most {MAX_FILENAME_BYTES} bytes"
        ));
    }
    if name == "." || name == ".." {
        return Err("filename must not be a dot segment".to_string());
    }
    if name.contains('/') || name.contains('\\') {
        return Err("filename must not contain path separators".to_string());
    }
    if name.chars().any(char::is_control) {
        return Err("filename must not contain control characters".to_string());
    }
    Ok(())
}

// -- Timestamp encoding -------------------------------------------------------

fn serialize_timestamp<S: Serializer>(ts: &DateTime<Utc>, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_str(&ts.to_rfc3339_opts(SecondsFormat::Micros, true))
}

/// Accepts RFC 3339, and naive ISO-8601 timestamps interpreted as UTC.
fn deserialize_timestamp<'de, D: Deserializer<'de>>(d: D) -> Result<DateTime<Utc>, D::Error> {
    let raw = String::deserialize(d)?;
    parse_timestamp(&raw).map_err(serde::de::Error::custom)
}

pub(crate) fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, String> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Ok(ts.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .map(|naive| naive.and_utc())
        .map_err(|e| format!("invalid timestamp '{raw}': {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn ts() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 12, 30, 0).unwrap()
    }

    #[test]
    fn test_storage_key_formula() {
        assert_eq!(
            storage_key("abc-123", "report.pdf"),
            "documents/abc-123_report.pdf"
        );
        assert_eq!(stored_filename("abc-123", "report.pdf"), "abc-123_report.pdf");
    }

    #[test]
    fn test_pending_record() {
        let rec = DocumentRecord::pending("id-1".into(), "relatório.pdf", "application/pdf", ts());
        assert_eq!(rec.status, DocumentStatus::Pending);
        assert_eq!(rec.size_bytes, None);
        assert_eq!(rec.filename, "id-1_relatório.pdf");
        assert_eq!(rec.storage_key, "documents/id-1_relatório.pdf");
        assert_eq!(rec.original_filename, "relatório.pdf");
    }

    #[test]
    fn test_record_json_field_names() {
        let rec = DocumentRecord::pending("id-1".into(), "a.pdf", "application/pdf", ts());
        let json = serde_json::to_value(&rec).unwrap();
        assert_eq!(json["documentId"], "id-1");
        assert_eq!(json["originalFilename"], "a.pdf");
        assert_eq!(json["contentType"], "application/pdf");
        assert_eq!(json["s3Key"], "documents/id-1_a.pdf");
        assert_eq!(json["status"], "pending");
        assert!(json["sizeBytes"].is_null());
        assert_eq!(json["uploadedAt"], "2026-03-01T12:30:00.000000Z");
    }

    #[test]
    fn test_reads_legacy_record() {
        let raw = r#"{
            "documentId": "0b6f",
            "filename": "0b6f_x.pdf",
            "originalFilename": "x.pdf",
            "contentType": "application/pdf",
            "s3Key": "documents/0b6f_x.pdf",
            "uploadedAt": "2025-11-04T09:15:02.123456",
            "status": "uploaded",
            "sizeBytes": 2048
        }"#;
        let rec: DocumentRecord = serde_json::from_str(raw).unwrap();
        assert_eq!(rec.status, DocumentStatus::Uploaded);
        assert_eq!(rec.size_bytes, Some(2048));
        assert_eq!(
            rec.uploaded_at,
            Utc.with_ymd_and_hms(2025, 11, 4, 9, 15, 2).unwrap()
                + chrono::Duration::microseconds(123_456)
        );
    }

    #[test]
    fn test_storage_key_alias() {
        let raw = r#"{
            "documentId": "d", "filename": "d_x.pdf", "originalFilename": "x.pdf",
            "contentType": "application/pdf", "storageKey": "documents/d_x.pdf",
            "uploadedAt": "2026-01-01T00:00:00Z", "status": "error"
        }"#;
        let rec: DocumentRecord = serde_json::from_str(raw).unwrap();
        assert_eq!(rec.storage_key, "documents/d_x.pdf");
        assert_eq!(rec.size_bytes, None);
    }

    #[test]
    fn test_validate_filename_ok() {
        assert!(validate_original_filename("report.pdf").is_ok());
        assert!(validate_original_filename("Ação de cobrança (1).pdf").is_ok());
        assert!(validate_original_filename("..hidden.pdf").is_ok());
    }

    #[test]
    fn test_validate_filename_rejects_path_hostile() {
        assert!(validate_original_filename("").is_err());
        assert!(validate_original_filename("   ").is_err());
        assert!(validate_original_filename("..").is_err());
        assert!(validate_original_filename("../etc/passwd").is_err());
        assert!(validate_original_filename("a\\b.pdf").is_err());
        assert!(validate_original_filename("a\nb.pdf").is_err());
        assert!(validate_original_filename("a\0b.pdf").is_err());
        assert!(validate_original_filename(&"x".repeat(256)).is_err());
    }
}
