//! Key layout for the Fjall partitions backing each entity.
//!
//! Every entity partition is keyed `id:{uuid}`. Uniqueness and filtered
//! listing are handled by a parallel `idx:` partition whose key encodes the
//! constraint and whose value is the primary id it resolves to, following
//! the string-prefixed key style of the upstream job/log/idempotency
//! partitions this crate's store replaces.

use uuid::Uuid;

pub fn encode_id_key(id: Uuid) -> Vec<u8> {
    format!("id:{id}").into_bytes()
}

pub fn encode_fingerprint_idx(fingerprint: &str) -> Vec<u8> {
    format!("idx:fingerprint:{fingerprint}").into_bytes()
}

pub fn encode_tenant_sha256_idx(tenant_id: Uuid, sha256: &str) -> Vec<u8> {
    format!("idx:tenant_sha256:{tenant_id}:{sha256}").into_bytes()
}

pub fn encode_tenant_job_kind_idx(tenant_id: Uuid, job_id: Uuid, kind: &str) -> Vec<u8> {
    format!("idx:tenant_job_kind:{tenant_id}:{job_id}:{kind}").into_bytes()
}

pub fn encode_tenant_idx_prefix(tenant_id: Uuid) -> Vec<u8> {
    format!("idx:tenant:{tenant_id}:").into_bytes()
}

/// `idx:tenant:{tenant}:{created_at}:{id}` sorts newest-last lexically
/// because `created_at` is RFC3339, matching the ordering the admission
/// handler's job listing endpoint expects.
pub fn encode_tenant_idx(tenant_id: Uuid, created_at: &str, id: Uuid) -> Vec<u8> {
    format!("idx:tenant:{tenant_id}:{created_at}:{id}").into_bytes()
}

/// `idx:tenant_doc:{tenant}:{created_at}:{id}`, the document-listing
/// counterpart to [`encode_tenant_idx`] — kept as a separate prefix so the
/// two entities' indexes never collide inside the shared `idx` partition.
pub fn encode_tenant_doc_idx(tenant_id: Uuid, created_at: &str, id: Uuid) -> Vec<u8> {
    format!("idx:tenant_doc:{tenant_id}:{created_at}:{id}").into_bytes()
}

pub fn encode_tenant_doc_idx_prefix(tenant_id: Uuid) -> Vec<u8> {
    format!("idx:tenant_doc:{tenant_id}:").into_bytes()
}

pub fn encode_meta_key(key: &str) -> Vec<u8> {
    format!("meta:{key}").into_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn id_key_round_trips_through_a_stable_prefix() {
        let id = Uuid::new_v4();
        let key = encode_id_key(id);
        assert!(String::from_utf8(key).unwrap().starts_with("id:"));
    }

    #[test]
    fn tenant_index_sorts_by_created_at() {
        let tenant = Uuid::new_v4();
        let a = encode_tenant_idx(tenant, "2026-01-01T00:00:00Z", Uuid::new_v4());
        let b = encode_tenant_idx(tenant, "2026-06-01T00:00:00Z", Uuid::new_v4());
        assert!(a < b);
    }
}
