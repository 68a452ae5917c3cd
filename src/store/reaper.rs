//! Retention sweeps: delete artifacts then documents whose `expires_at` has
//! passed, in that order, mirroring `cleanup_expired_artifacts` then
//! `cleanup_expired_documents` in the upstream reaper tasks. Unlike the
//! teacher's `ledger::pruning`, which only stamped a `last_prune` marker,
//! this checks each row's own `expires_at` against the current time.

use crate::storage::StorageClient;
use crate::store::{DocStore, Result};
use tracing::{info, warn};

#[derive(Debug, Default, Clone, Copy)]
pub struct ReapStats {
    pub artifacts_deleted: usize,
    pub documents_deleted: usize,
}

pub async fn reap_once(store: &DocStore, storage: &StorageClient) -> Result<ReapStats> {
    let now = crate::domain::now();
    let mut stats = ReapStats::default();

    for artifact in store.all_artifacts()? {
        if expired(&artifact.expires_at, &now) {
            if let Err(e) = storage.delete_local(&artifact.storage_key).await {
                warn!(artifact_id = %artifact.id, error = %e, "failed to delete artifact bytes");
            }
            store.delete_artifact(&artifact)?;
            stats.artifacts_deleted += 1;
        }
    }
    store.mark_swept("artifacts", stats.artifacts_deleted)?;

    let jobs = store.all_jobs()?;
    for document in store.all_documents()? {
        if expired(&document.expires_at, &now) {
            for job in jobs.iter().filter(|j| j.document_id == document.id) {
                for artifact in store.list_artifacts_for_job(job.id)? {
                    let _ = storage.delete_local(&artifact.storage_key).await;
                    store.delete_artifact(&artifact)?;
                    stats.artifacts_deleted += 1;
                }
            }
            if let Err(e) = storage.delete_local(&document.storage_key).await {
                warn!(document_id = %document.id, error = %e, "failed to delete document bytes");
            }
            store.delete_document(&document)?;
            stats.documents_deleted += 1;
        }
    }
    store.mark_swept("documents", stats.documents_deleted)?;

    store.persist()?;
    info!(?stats, "reaper sweep complete");
    Ok(stats)
}

fn expired(expires_at: &Option<String>, now: &str) -> bool {
    matches!(expires_at, Some(ts) if ts.as_str() <= now)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Artifact, ArtifactKind, Document, DocumentStatus};
    use tempfile::TempDir;
    use uuid::Uuid;

    #[tokio::test]
    async fn reaps_only_expired_rows() {
        let dir = TempDir::new().unwrap();
        let store = DocStore::open(dir.path().join("store")).unwrap();
        let storage = StorageClient::local(dir.path().join("blobs"));
        let tenant = Uuid::new_v4();

        let expired_doc = Document {
            id: Uuid::new_v4(),
            tenant_id: tenant,
            original_filename: "old.pdf".into(),
            mime_type: "application/pdf".into(),
            size_bytes: 1,
            sha256: "old".into(),
            status: DocumentStatus::Clean,
            storage_key: "clean/old".into(),
            created_at: crate::domain::now(),
            expires_at: Some("2000-01-01T00:00:00Z".into()),
        };
        let fresh_doc = Document {
            id: Uuid::new_v4(),
            sha256: "fresh".into(),
            expires_at: Some("2999-01-01T00:00:00Z".into()),
            ..expired_doc.clone()
        };
        store.put_document(&expired_doc).unwrap();
        store.put_document(&fresh_doc).unwrap();

        let expired_artifact = Artifact {
            id: Uuid::new_v4(),
            tenant_id: tenant,
            job_id: Uuid::new_v4(),
            kind: ArtifactKind::Markdown,
            storage_key: "artifacts/old".into(),
            size_bytes: 1,
            sha256: "a".into(),
            created_at: crate::domain::now(),
            expires_at: Some("2000-01-01T00:00:00Z".into()),
        };
        store.put_artifact(&expired_artifact).unwrap();

        let stats = reap_once(&store, &storage).await.unwrap();
        assert_eq!(stats.documents_deleted, 1);
        assert_eq!(stats.artifacts_deleted, 1);
        assert!(store.get_document(expired_doc.id).unwrap().is_none());
        assert!(store.get_document(fresh_doc.id).unwrap().is_some());
    }
}
