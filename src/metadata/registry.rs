//! Document registry: the read-modify-write operations over the store.
//!
//! Every operation takes the registry mutex before loading the map and
//! releases it only after the rewritten map is on disk, so concurrent
//! requests can no longer overwrite each other's updates.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use tracing::info;
use uuid::Uuid;

use super::record::{validate_original_filename, DocumentRecord, DocumentStatus};
use super::store::MetadataStore;
use super::{MetadataError, MetadataResult};

/// Source of registration timestamps.
pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

/// Id and key handed back to the caller of [`DocumentRegistry::register_pending`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Registration {
    pub document_id: String,
    pub storage_key: String,
}

pub struct DocumentRegistry {
    store: Mutex<MetadataStore>,
    clock: Clock,
}

impl DocumentRegistry {
    pub fn new(store: MetadataStore) -> Self {
        Self::with_clock(store, Arc::new(Utc::now))
    }

    pub fn with_clock(store: MetadataStore, clock: Clock) -> Self {
        Self {
            store: Mutex::new(store),
            clock,
        }
    }

    /// Record a new `pending` document and return its id and storage key.
    pub async fn register_pending(
        &self,
        original_filename: &str,
        content_type: &str,
    ) -> MetadataResult<Registration> {
        validate_original_filename(original_filename)
            .map_err(|message| MetadataError::Invalid { message })?;

        let store = self.store.lock().await;
        let mut map = store.load()?;

        let mut document_id = Uuid::new_v4().to_string();
        while map.contains_key(&document_id) {
            document_id = Uuid::new_v4().to_string();
        }

        let record = DocumentRecord::pending(
            document_id.clone(),
            original_filename,
            content_type,
            (self.clock)(),
        );
        let storage_key = record.storage_key.clone();
        map.insert(document_id.clone(), record);
        store.save(&map)?;

        info!("Registered pending document {} at {}", document_id, storage_key);
        Ok(Registration {
            document_id,
            storage_key,
        })
    }

    /// Apply a completion notice.
    ///
    /// Repeated notices overwrite the previous outcome. An `error` outcome
    /// leaves `sizeBytes` empty; `pending` is not a valid outcome.
    pub async fn mark_uploaded(
        &self,
        document_id: &str,
        size_bytes: u64,
        status: DocumentStatus,
    ) -> MetadataResult<DocumentRecord> {
        if status == DocumentStatus::Pending {
            return Err(MetadataError::Invalid {
                message: "status must be 'uploaded' or 'error'".to_string(),
            });
        }

        let store = self.store.lock().await;
        let mut map = store.load()?;
        let record = map
            .get_mut(document_id)
            .ok_or_else(|| MetadataError::NotFound {
                document_id: document_id.to_string(),
            })?;

        record.status = status;
        record.size_bytes = match status {
            DocumentStatus::Uploaded => Some(size_bytes),
            _ => None,
        };
        let updated = record.clone();
        store.save(&map)?;

        info!("Document {} marked {}", document_id, status);
        Ok(updated)
    }

    /// Uploaded documents, newest first.
    pub async fn list(&self) -> MetadataResult<Vec<DocumentRecord>> {
        let map = self.store.lock().await.load()?;
        let mut documents: Vec<DocumentRecord> = map
            .into_values()
            .filter(|doc| doc.status == DocumentStatus::Uploaded)
            .collect();
        documents.sort_by(|a, b| b.uploaded_at.cmp(&a.uploaded_at));
        Ok(documents)
    }

    pub async fn get(&self, document_id: &str) -> MetadataResult<DocumentRecord> {
        let map = self.store.lock().await.load()?;
        map.get(document_id)
            .cloned()
            .ok_or_else(|| MetadataError::NotFound {
                document_id: document_id.to_string(),
            })
    }

    /// Delete the record and return it.
    ///
    /// The stored object is not touched; the caller deletes it once the
    /// metadata is gone.
    pub async fn remove(&self, document_id: &str) -> MetadataResult<DocumentRecord> {
        let store = self.store.lock().await;
        let mut map = store.load()?;
        let removed = map
            .remove(document_id)
            .ok_or_else(|| MetadataError::NotFound {
                document_id: document_id.to_string(),
            })?;
        store.save(&map)?;

        info!("Removed document {}", document_id);
        Ok(removed)
    }

    /// Number of records in any state.
    pub async fn count(&self) -> MetadataResult<usize> {
        Ok(self.store.lock().await.load()?.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::store::LoadErrorPolicy;
    use chrono::TimeZone;
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicI64, Ordering};
    use tempfile::TempDir;

    const PDF: &str = "application/pdf";

    fn registry() -> (DocumentRegistry, TempDir) {
        let tmp = TempDir::new().expect("failed to create temp dir");
        let store = MetadataStore::open(tmp.path().join("meta.json"), LoadErrorPolicy::Fail)
            .expect("failed to open store");
        (DocumentRegistry::new(store), tmp)
    }

    /// Registry whose clock advances one minute per registration.
    fn stepping_registry() -> (DocumentRegistry, TempDir) {
        let tmp = TempDir::new().expect("failed to create temp dir");
        let store = MetadataStore::open(tmp.path().join("meta.json"), LoadErrorPolicy::Fail)
            .expect("failed to open store");
        let tick = Arc::new(AtomicI64::new(0));
        let clock: Clock = Arc::new(move || {
            let n = tick.fetch_add(1, Ordering::SeqCst);
            Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap() + chrono::Duration::minutes(n)
        });
        (DocumentRegistry::with_clock(store, clock), tmp)
    }

    #[tokio::test]
    async fn test_register_then_get_is_pending() {
        let (reg, _tmp) = registry();
        let r = reg.register_pending("contract.pdf", PDF).await.unwrap();

        let doc = reg.get(&r.document_id).await.unwrap();
        assert_eq!(doc.status, DocumentStatus::Pending);
        assert_eq!(doc.size_bytes, None);
        assert_eq!(doc.storage_key, r.storage_key);
        assert_eq!(
            r.storage_key,
            format!("documents/{}_contract.pdf", r.document_id)
        );
    }

    #[tokio::test]
    async fn test_register_many_ids_distinct() {
        let (reg, _tmp) = registry();
        let mut ids = HashSet::new();
        for i in 0..50 {
            let r = reg.register_pending(&format!("f{i}.pdf"), PDF).await.unwrap();
            ids.insert(r.document_id);
        }
        assert_eq!(ids.len(), 50);
        assert_eq!(reg.count().await.unwrap(), 50);
    }

    #[tokio::test]
    async fn test_register_rejects_bad_filename() {
        let (reg, _tmp) = registry();
        let err = reg.register_pending("../../x.pdf", PDF).await.unwrap_err();
        assert!(matches!(err, MetadataError::Invalid { .. }));
        assert_eq!(reg.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_mark_unknown_is_not_found_and_store_unchanged() {
        let (reg, tmp) = registry();
        reg.register_pending("a.pdf", PDF).await.unwrap();
        let before = std::fs::read(tmp.path().join("meta.json")).unwrap();

        let err = reg
            .mark_uploaded("missing", 10, DocumentStatus::Uploaded)
            .await
            .unwrap_err();
        assert!(matches!(err, MetadataError::NotFound { .. }));

        let after = std::fs::read(tmp.path().join("meta.json")).unwrap();
        assert_eq!(before, after);
    }

    #[tokio::test]
    async fn test_mark_uploaded_then_listed() {
        let (reg, _tmp) = registry();
        let r = reg.register_pending("a.pdf", PDF).await.unwrap();
        assert!(reg.list().await.unwrap().is_empty());

        reg.mark_uploaded(&r.document_id, 1024, DocumentStatus::Uploaded)
            .await
            .unwrap();

        let doc = reg.get(&r.document_id).await.unwrap();
        assert_eq!(doc.status, DocumentStatus::Uploaded);
        assert_eq!(doc.size_bytes, Some(1024));
        let listed = reg.list().await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].document_id, r.document_id);
    }

    #[tokio::test]
    async fn test_mark_uploaded_twice_overwrites() {
        let (reg, _tmp) = registry();
        let r = reg.register_pending("a.pdf", PDF).await.unwrap();
        reg.mark_uploaded(&r.document_id, 10, DocumentStatus::Uploaded)
            .await
            .unwrap();
        reg.mark_uploaded(&r.document_id, 20, DocumentStatus::Uploaded)
            .await
            .unwrap();
        assert_eq!(reg.get(&r.document_id).await.unwrap().size_bytes, Some(20));
    }

    #[tokio::test]
    async fn test_mark_error_keeps_size_empty() {
        let (reg, _tmp) = registry();
        let r = reg.register_pending("a.pdf", PDF).await.unwrap();
        let doc = reg
            .mark_uploaded(&r.document_id, 99, DocumentStatus::Error)
            .await
            .unwrap();
        assert_eq!(doc.status, DocumentStatus::Error);
        assert_eq!(doc.size_bytes, None);
    }

    #[tokio::test]
    async fn test_mark_pending_rejected() {
        let (reg, _tmp) = registry();
        let r = reg.register_pending("a.pdf", PDF).await.unwrap();
        let err = reg
            .mark_uploaded(&r.document_id, 1, DocumentStatus::Pending)
            .await
            .unwrap_err();
        assert!(matches!(err, MetadataError::Invalid { .. }));
    }

    #[tokio::test]
    async fn test_list_excludes_pending_and_error() {
        let (reg, _tmp) = registry();
        let pending = reg.register_pending("p.pdf", PDF).await.unwrap();
        let failed = reg.register_pending("e.pdf", PDF).await.unwrap();
        let done = reg.register_pending("u.pdf", PDF).await.unwrap();
        reg.mark_uploaded(&failed.document_id, 1, DocumentStatus::Error)
            .await
            .unwrap();
        reg.mark_uploaded(&done.document_id, 1, DocumentStatus::Uploaded)
            .await
            .unwrap();

        let listed = reg.list().await.unwrap();
        assert_eq!(listed.len(), 1);
        assert!(listed
            .iter()
            .all(|d| d.status == DocumentStatus::Uploaded));
        assert!(listed.iter().all(|d| d.document_id != pending.document_id));
    }

    #[tokio::test]
    async fn test_list_newest_first() {
        let (reg, _tmp) = stepping_registry();
        let t1 = reg.register_pending("one.pdf", PDF).await.unwrap();
        let t2 = reg.register_pending("two.pdf", PDF).await.unwrap();
        let t3 = reg.register_pending("three.pdf", PDF).await.unwrap();
        for r in [&t2, &t1, &t3] {
            reg.mark_uploaded(&r.document_id, 5, DocumentStatus::Uploaded)
                .await
                .unwrap();
        }

        let ids: Vec<String> = reg
            .list()
            .await
            .unwrap()
            .into_iter()
            .map(|d| d.document_id)
            .collect();
        assert_eq!(ids, vec![t3.document_id, t2.document_id, t1.document_id]);
    }

    #[tokio::test]
    async fn test_remove() {
        let (reg, _tmp) = registry();
        let r = reg.register_pending("a.pdf", PDF).await.unwrap();
        reg.mark_uploaded(&r.document_id, 3, DocumentStatus::Uploaded)
            .await
            .unwrap();

        let removed = reg.remove(&r.document_id).await.unwrap();
        assert_eq!(removed.storage_key, r.storage_key);
        assert!(matches!(
            reg.get(&r.document_id).await,
            Err(MetadataError::NotFound { .. })
        ));
        assert!(reg.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_remove_unknown() {
        let (reg, _tmp) = registry();
        assert!(matches!(
            reg.remove("nope").await,
            Err(MetadataError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_persists_across_reopen() {
        let (reg, tmp) = registry();
        let r = reg.register_pending("a.pdf", PDF).await.unwrap();
        drop(reg);

        let store = MetadataStore::open(tmp.path().join("meta.json"), LoadErrorPolicy::Fail).unwrap();
        let reopened = DocumentRegistry::new(store);
        assert_eq!(
            reopened.get(&r.document_id).await.unwrap().original_filename,
            "a.pdf"
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_registrations_are_not_lost() {
        let (reg, _tmp) = registry();
        let reg = Arc::new(reg);
        let n = 32;

        let handles: Vec<_> = (0..n)
            .map(|i| {
                let reg = Arc::clone(&reg);
                tokio::spawn(async move {
                    reg.register_pending(&format!("doc-{i}.pdf"), PDF)
                        .await
                        .unwrap()
                        .document_id
                })
            })
            .collect();

        let mut ids = HashSet::new();
        for h in handles {
            ids.insert(h.await.unwrap());
        }
        assert_eq!(ids.len(), n);
        assert_eq!(reg.count().await.unwrap(), n);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_notifications_are_not_lost() {
        let (reg, _tmp) = registry();
        let reg = Arc::new(reg);
        let mut ids = Vec::new();
        for i in 0..16 {
            ids.push(reg.register_pending(&format!("{i}.pdf"), PDF).await.unwrap().document_id);
        }

        let handles: Vec<_> = ids
            .iter()
            .cloned()
            .map(|id| {
                let reg = Arc::clone(&reg);
                tokio::spawn(async move {
                    reg.mark_uploaded(&id, 42, DocumentStatus::Uploaded)
                        .await
                        .unwrap();
                })
            })
            .collect();
        for h in handles {
            h.await.unwrap();
        }

        assert_eq!(reg.list().await.unwrap().len(), ids.len());
    }
}
