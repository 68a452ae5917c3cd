//! Fjall-backed persistence for every entity in [`crate::domain`].
//!
//! Replaces the upstream job-only ledger with one partition per entity plus
//! a secondary-index partition enforcing the uniqueness constraints and
//! filtered listings the admission handler and job API need: tenant+sha256
//! for documents, tenant+job+kind for artifacts, and fingerprint for API
//! keys.

mod error;
mod partitions;
pub mod reaper;

pub use error::{Result, StoreError};

use crate::domain::{
    Artifact, Document, IngestionJob, Tenant, WebhookDelivery, WebhookEndpoint,
};
use fjall::{Config, Keyspace, PartitionCreateOptions, PartitionHandle};
use std::path::Path;
use tracing::{debug, info};
use uuid::Uuid;

/// One entity partition + its secondary-index partition.
struct Entity {
    rows: PartitionHandle,
}

pub struct DocStore {
    keyspace: Keyspace,
    tenants: Entity,
    api_keys: Entity,
    documents: Entity,
    jobs: Entity,
    artifacts: Entity,
    webhook_endpoints: Entity,
    webhook_deliveries: Entity,
    idx: PartitionHandle,
    meta: PartitionHandle,
}

fn open_entity(keyspace: &Keyspace, name: &str) -> Result<Entity> {
    let rows = keyspace.open_partition(name, PartitionCreateOptions::default())?;
    Ok(Entity { rows })
}

impl DocStore {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        info!(path = %path.display(), "opening document store");
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let keyspace = Config::new(path).open()?;

        let store = Self {
            tenants: open_entity(&keyspace, "tenants")?,
            api_keys: open_entity(&keyspace, "api_keys")?,
            documents: open_entity(&keyspace, "documents")?,
            jobs: open_entity(&keyspace, "jobs")?,
            artifacts: open_entity(&keyspace, "artifacts")?,
            webhook_endpoints: open_entity(&keyspace, "webhook_endpoints")?,
            webhook_deliveries: open_entity(&keyspace, "webhook_deliveries")?,
            idx: keyspace.open_partition("idx", PartitionCreateOptions::default())?,
            meta: keyspace.open_partition("meta", PartitionCreateOptions::default())?,
            keyspace,
        };
        info!("document store opened");
        Ok(store)
    }

    pub fn persist(&self) -> Result<()> {
        self.keyspace.persist(fjall::PersistMode::SyncAll)?;
        Ok(())
    }

    // -- tenants -----------------------------------------------------

    pub fn put_tenant(&self, tenant: &Tenant) -> Result<()> {
        let key = partitions::encode_id_key(tenant.id);
        self.tenants.rows.insert(key, serde_json::to_vec(tenant)?)?;
        Ok(())
    }

    pub fn get_tenant(&self, id: Uuid) -> Result<Option<Tenant>> {
        get(&self.tenants.rows, partitions::encode_id_key(id))
    }

    // -- api keys ------------------------------------------------------

    pub fn put_api_key(&self, key: &crate::domain::ApiKey) -> Result<()> {
        if let Some(existing) = self.get_api_key_by_fingerprint(&key.fingerprint)? {
            if existing.id != key.id {
                return Err(StoreError::Conflict(format!(
                    "fingerprint already bound to key {}",
                    existing.id
                )));
            }
        }
        let row_key = partitions::encode_id_key(key.id);
        self.api_keys.rows.insert(row_key, serde_json::to_vec(key)?)?;
        self.idx.insert(
            partitions::encode_fingerprint_idx(&key.fingerprint),
            key.id.to_string().as_bytes(),
        )?;
        Ok(())
    }

    pub fn get_api_key(&self, id: Uuid) -> Result<Option<crate::domain::ApiKey>> {
        get(&self.api_keys.rows, partitions::encode_id_key(id))
    }

    pub fn get_api_key_by_fingerprint(
        &self,
        fingerprint: &str,
    ) -> Result<Option<crate::domain::ApiKey>> {
        let Some(id_bytes) = self.idx.get(partitions::encode_fingerprint_idx(fingerprint))? else {
            return Ok(None);
        };
        let id: Uuid = String::from_utf8_lossy(&id_bytes)
            .parse()
            .map_err(|_| StoreError::Conflict("corrupt fingerprint index entry".into()))?;
        self.get_api_key(id)
    }

    // -- documents -------------------------------------------------------

    pub fn put_document(&self, doc: &Document) -> Result<()> {
        let row_key = partitions::encode_id_key(doc.id);
        self.documents.rows.insert(row_key, serde_json::to_vec(doc)?)?;
        self.idx.insert(
            partitions::encode_tenant_sha256_idx(doc.tenant_id, &doc.sha256),
            doc.id.to_string().as_bytes(),
        )?;
        self.idx.insert(
            partitions::encode_tenant_doc_idx(doc.tenant_id, &doc.created_at, doc.id),
            doc.id.to_string().as_bytes(),
        )?;
        Ok(())
    }

    pub fn get_document(&self, id: Uuid) -> Result<Option<Document>> {
        get(&self.documents.rows, partitions::encode_id_key(id))
    }

    /// Newest-first tenant listing: the index sorts ascending by
    /// `created_at`, so results are reversed before returning.
    pub fn list_documents_for_tenant(&self, tenant_id: Uuid) -> Result<Vec<Document>> {
        let prefix = partitions::encode_tenant_doc_idx_prefix(tenant_id);
        let mut docs = Vec::new();
        for item in self.idx.prefix(&prefix) {
            let (_, id_bytes) = item?;
            let id: Uuid = String::from_utf8_lossy(&id_bytes)
                .parse()
                .map_err(|_| StoreError::Conflict("corrupt tenant document index entry".into()))?;
            if let Some(doc) = self.get_document(id)? {
                docs.push(doc);
            }
        }
        docs.reverse();
        Ok(docs)
    }

    /// Used by the admission handler to reject/short-circuit re-uploads of
    /// content already on file for the same tenant.
    pub fn find_document_by_sha256(
        &self,
        tenant_id: Uuid,
        sha256: &str,
    ) -> Result<Option<Document>> {
        let Some(id_bytes) = self
            .idx
            .get(partitions::encode_tenant_sha256_idx(tenant_id, sha256))?
        else {
            return Ok(None);
        };
        let id: Uuid = String::from_utf8_lossy(&id_bytes)
            .parse()
            .map_err(|_| StoreError::Conflict("corrupt sha256 index entry".into()))?;
        self.get_document(id)
    }

    pub fn delete_document(&self, doc: &Document) -> Result<()> {
        self.documents.rows.remove(partitions::encode_id_key(doc.id))?;
        self.idx
            .remove(partitions::encode_tenant_sha256_idx(doc.tenant_id, &doc.sha256))?;
        self.idx
            .remove(partitions::encode_tenant_doc_idx(doc.tenant_id, &doc.created_at, doc.id))?;
        Ok(())
    }

    // -- jobs ------------------------------------------------------------

    pub fn put_job(&self, job: &IngestionJob) -> Result<()> {
        let row_key = partitions::encode_id_key(job.id);
        self.jobs.rows.insert(row_key, serde_json::to_vec(job)?)?;
        self.idx.insert(
            partitions::encode_tenant_idx(job.tenant_id, &job.created_at, job.id),
            job.id.to_string().as_bytes(),
        )?;
        Ok(())
    }

    pub fn get_job(&self, id: Uuid) -> Result<Option<IngestionJob>> {
        get(&self.jobs.rows, partitions::encode_id_key(id))
    }

    pub fn list_jobs_for_tenant(&self, tenant_id: Uuid) -> Result<Vec<IngestionJob>> {
        let prefix = partitions::encode_tenant_idx_prefix(tenant_id);
        let mut jobs = Vec::new();
        for item in self.idx.prefix(&prefix) {
            let (_, id_bytes) = item?;
            let id: Uuid = String::from_utf8_lossy(&id_bytes)
                .parse()
                .map_err(|_| StoreError::Conflict("corrupt tenant job index entry".into()))?;
            if let Some(job) = self.get_job(id)? {
                jobs.push(job);
            }
        }
        jobs.reverse();
        Ok(jobs)
    }

    /// Every job row regardless of tenant, used by the `worker` process to
    /// recover in-flight work on startup: the durable queue has no
    /// delivered/undelivered marker of its own, so recovery walks job
    /// status instead of replaying raw queue entries.
    pub fn all_jobs(&self) -> Result<Vec<IngestionJob>> {
        let mut out = Vec::new();
        for item in self.jobs.rows.iter() {
            let (_, value) = item?;
            out.push(serde_json::from_slice(&value)?);
        }
        Ok(out)
    }

    // -- artifacts ---------------------------------------------------------

    pub fn put_artifact(&self, artifact: &Artifact) -> Result<()> {
        let kind_key = format!("{:?}", artifact.kind);
        if let Some(existing) = self.find_artifact(artifact.tenant_id, artifact.job_id, &kind_key)?
        {
            if existing.id != artifact.id {
                return Err(StoreError::Conflict(format!(
                    "artifact of kind {kind_key} already recorded for job {}",
                    artifact.job_id
                )));
            }
        }
        let row_key = partitions::encode_id_key(artifact.id);
        self.artifacts
            .rows
            .insert(row_key, serde_json::to_vec(artifact)?)?;
        self.idx.insert(
            partitions::encode_tenant_job_kind_idx(artifact.tenant_id, artifact.job_id, &kind_key),
            artifact.id.to_string().as_bytes(),
        )?;
        Ok(())
    }

    pub fn get_artifact(&self, id: Uuid) -> Result<Option<Artifact>> {
        get(&self.artifacts.rows, partitions::encode_id_key(id))
    }

    fn find_artifact(
        &self,
        tenant_id: Uuid,
        job_id: Uuid,
        kind_key: &str,
    ) -> Result<Option<Artifact>> {
        let Some(id_bytes) = self
            .idx
            .get(partitions::encode_tenant_job_kind_idx(tenant_id, job_id, kind_key))?
        else {
            return Ok(None);
        };
        let id: Uuid = String::from_utf8_lossy(&id_bytes)
            .parse()
            .map_err(|_| StoreError::Conflict("corrupt artifact index entry".into()))?;
        self.get_artifact(id)
    }

    pub fn list_artifacts_for_job(&self, job_id: Uuid) -> Result<Vec<Artifact>> {
        let mut out = Vec::new();
        for item in self.artifacts.rows.iter() {
            let (_, value) = item?;
            let artifact: Artifact = serde_json::from_slice(&value)?;
            if artifact.job_id == job_id {
                out.push(artifact);
            }
        }
        Ok(out)
    }

    pub fn delete_artifact(&self, artifact: &Artifact) -> Result<()> {
        self.artifacts.rows.remove(partitions::encode_id_key(artifact.id))?;
        let kind_key = format!("{:?}", artifact.kind);
        self.idx.remove(partitions::encode_tenant_job_kind_idx(
            artifact.tenant_id,
            artifact.job_id,
            &kind_key,
        ))?;
        Ok(())
    }

    // -- webhooks ---------------------------------------------------------

    pub fn put_webhook_endpoint(&self, endpoint: &WebhookEndpoint) -> Result<()> {
        let row_key = partitions::encode_id_key(endpoint.id);
        self.webhook_endpoints
            .rows
            .insert(row_key, serde_json::to_vec(endpoint)?)?;
        Ok(())
    }

    pub fn get_webhook_endpoint(&self, id: Uuid) -> Result<Option<WebhookEndpoint>> {
        get(&self.webhook_endpoints.rows, partitions::encode_id_key(id))
    }

    pub fn list_webhook_endpoints_for_tenant(&self, tenant_id: Uuid) -> Result<Vec<WebhookEndpoint>> {
        let mut out = Vec::new();
        for item in self.webhook_endpoints.rows.iter() {
            let (_, value) = item?;
            let endpoint: WebhookEndpoint = serde_json::from_slice(&value)?;
            if endpoint.tenant_id == tenant_id {
                out.push(endpoint);
            }
        }
        Ok(out)
    }

    pub fn delete_webhook_endpoint(&self, id: Uuid) -> Result<()> {
        self.webhook_endpoints.rows.remove(partitions::encode_id_key(id))?;
        Ok(())
    }

    pub fn put_webhook_delivery(&self, delivery: &WebhookDelivery) -> Result<()> {
        let row_key = partitions::encode_id_key(delivery.id);
        self.webhook_deliveries
            .rows
            .insert(row_key, serde_json::to_vec(delivery)?)?;
        Ok(())
    }

    pub fn get_webhook_delivery(&self, id: Uuid) -> Result<Option<WebhookDelivery>> {
        get(&self.webhook_deliveries.rows, partitions::encode_id_key(id))
    }

    /// Deliveries due for a retry attempt, used by the webhook worker loop.
    pub fn due_webhook_deliveries(&self, now: &str) -> Result<Vec<WebhookDelivery>> {
        let mut out = Vec::new();
        for item in self.webhook_deliveries.rows.iter() {
            let (_, value) = item?;
            let delivery: WebhookDelivery = serde_json::from_slice(&value)?;
            let pending = matches!(
                delivery.status,
                crate::domain::DeliveryStatus::Pending | crate::domain::DeliveryStatus::Retrying
            );
            if pending && delivery.next_attempt_at.as_str() <= now {
                out.push(delivery);
            }
        }
        Ok(out)
    }

    // -- meta / reaping ----------------------------------------------------

    pub fn all_documents(&self) -> Result<Vec<Document>> {
        let mut out = Vec::new();
        for item in self.documents.rows.iter() {
            let (_, value) = item?;
            out.push(serde_json::from_slice(&value)?);
        }
        Ok(out)
    }

    pub fn all_artifacts(&self) -> Result<Vec<Artifact>> {
        let mut out = Vec::new();
        for item in self.artifacts.rows.iter() {
            let (_, value) = item?;
            out.push(serde_json::from_slice(&value)?);
        }
        Ok(out)
    }

    pub fn mark_swept(&self, label: &str, count: usize) -> Result<()> {
        let now = crate::domain::now();
        self.meta.insert(
            partitions::encode_meta_key(&format!("last_sweep_{label}")),
            format!("{now}:{count}").as_bytes(),
        )?;
        debug!(label, count, "reaper sweep recorded");
        Ok(())
    }
}

fn get<T: serde::de::DeserializeOwned>(
    partition: &PartitionHandle,
    key: Vec<u8>,
) -> Result<Option<T>> {
    match partition.get(key)? {
        Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{DocumentStatus, Tenant};
    use tempfile::TempDir;

    fn open() -> (DocStore, TempDir) {
        let dir = TempDir::new().unwrap();
        (DocStore::open(dir.path().join("store")).unwrap(), dir)
    }

    #[test]
    fn tenant_round_trips() {
        let (store, _dir) = open();
        let tenant = Tenant::new("acme", "Acme Corp");
        store.put_tenant(&tenant).unwrap();
        let fetched = store.get_tenant(tenant.id).unwrap().unwrap();
        assert_eq!(fetched.slug, "acme");
    }

    #[test]
    fn duplicate_sha256_is_discoverable_per_tenant() {
        let (store, _dir) = open();
        let tenant = Uuid::new_v4();
        let doc = Document {
            id: Uuid::new_v4(),
            tenant_id: tenant,
            original_filename: "a.pdf".into(),
            mime_type: "application/pdf".into(),
            size_bytes: 10,
            sha256: "deadbeef".into(),
            status: DocumentStatus::Uploaded,
            storage_key: "quarantine/a".into(),
            created_at: crate::domain::now(),
            expires_at: None,
        };
        store.put_document(&doc).unwrap();
        let found = store.find_document_by_sha256(tenant, "deadbeef").unwrap();
        assert_eq!(found.unwrap().id, doc.id);
    }

    #[test]
    fn duplicate_artifact_kind_for_same_job_conflicts() {
        let (store, _dir) = open();
        let tenant = Uuid::new_v4();
        let job = Uuid::new_v4();
        let a1 = Artifact {
            id: Uuid::new_v4(),
            tenant_id: tenant,
            job_id: job,
            kind: crate::domain::ArtifactKind::Markdown,
            storage_key: "artifacts/1".into(),
            size_bytes: 1,
            sha256: "a".into(),
            created_at: crate::domain::now(),
            expires_at: None,
        };
        store.put_artifact(&a1).unwrap();

        let mut a2 = a1.clone();
        a2.id = Uuid::new_v4();
        let err = store.put_artifact(&a2).unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
    }
}
