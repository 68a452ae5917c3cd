//! Object storage abstraction for documents and artifacts, built on
//! `object_store` the way the teacher's `storage::StorageClient` was, with
//! a `LocalFileSystem`-backed constructor added for the on-disk data root
//! spec.md's artifact tree needs (the teacher only ever wired `InMemory`).
//!
//! Uploads bypass `object_store` entirely: the admission handler needs a
//! running digest while it streams the body to disk, and `object_store::put`
//! has no hook for that, so [`StorageClient::write_local`] writes directly
//! via `tokio::fs` with the same tmp-file-then-rename pattern
//! `_write_bytes_atomic` uses in the original pipeline tasks.

use async_trait::async_trait;
use object_store::{local::LocalFileSystem, memory::InMemory, path::Path as StoragePath, ObjectStore};
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("upload failed: {0}")]
    UploadFailed(String),
    #[error("download failed: {0}")]
    DownloadFailed(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("object store error: {0}")]
    ObjectStoreError(#[from] object_store::Error),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, StorageError>;

#[derive(Debug, Clone)]
pub struct UploadMetadata {
    pub key: String,
    pub etag: Option<String>,
    pub size: usize,
}

#[derive(Clone)]
pub struct StorageClient {
    store: Arc<dyn ObjectStore>,
    root: PathBuf,
    pub bucket: String,
}

impl StorageClient {
    pub fn new(store: Arc<dyn ObjectStore>, root: PathBuf, bucket: String) -> Self {
        Self { store, root, bucket }
    }

    pub fn in_memory() -> Self {
        Self {
            store: Arc::new(InMemory::new()),
            root: PathBuf::from("."),
            bucket: "docrefinery-local".to_string(),
        }
    }

    /// Rooted at `root` on the local filesystem; this is what `serve`,
    /// `worker`, and `reap` all open against the same data directory.
    pub fn local(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        std::fs::create_dir_all(&root).ok();
        let fs = LocalFileSystem::new_with_prefix(&root)
            .expect("local filesystem root must be creatable");
        Self {
            store: Arc::new(fs),
            root,
            bucket: "docrefinery-local".to_string(),
        }
    }

    pub async fn upload(&self, key: &str, data: Vec<u8>) -> Result<UploadMetadata> {
        let path = StoragePath::from(key);
        let size = data.len();
        let put_result = self.store.put(&path, data.into()).await?;
        Ok(UploadMetadata { key: key.to_string(), etag: put_result.e_tag.clone(), size })
    }

    pub async fn download(&self, key: &str) -> Result<Vec<u8>> {
        let path = StoragePath::from(key);
        let result = self.store.get(&path).await?;
        Ok(result.bytes().await?.to_vec())
    }

    pub async fn exists(&self, key: &str) -> Result<bool> {
        let path = StoragePath::from(key);
        match self.store.head(&path).await {
            Ok(_) => Ok(true),
            Err(object_store::Error::NotFound { .. }) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// Absolute filesystem path for a storage key, for collaborators (the
    /// scanner, the conversion engine) that need a real path rather than a
    /// byte stream.
    pub fn local_path(&self, key: &str) -> PathBuf {
        self.root.join(key)
    }

    /// Atomic write: write to `<final>.tmp`, fsync, rename over the final
    /// path, exactly as `_write_bytes_atomic` does.
    pub async fn write_local(&self, key: &str, data: Vec<u8>) -> Result<()> {
        let final_path = self.local_path(key);
        if let Some(parent) = final_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let tmp_path = final_path.with_extension("tmp");
        let mut file = tokio::fs::File::create(&tmp_path).await?;
        use tokio::io::AsyncWriteExt;
        file.write_all(&data).await?;
        file.sync_all().await?;
        tokio::fs::rename(&tmp_path, &final_path).await?;
        Ok(())
    }

    pub async fn read_local(&self, key: &str) -> Result<Vec<u8>> {
        Ok(tokio::fs::read(self.local_path(key)).await?)
    }

    pub async fn delete_local(&self, key: &str) -> Result<()> {
        match tokio::fs::remove_file(self.local_path(key)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Renames a key in place, used to move a document from quarantine into
    /// the clean tree once it passes the scan stage. The source already
    /// exists in full, so this skips the tmp-file staging `write_local` does
    /// for in-progress writes.
    pub async fn move_local(&self, from_key: &str, to_key: &str) -> Result<()> {
        let to_path = self.local_path(to_key);
        if let Some(parent) = to_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::rename(self.local_path(from_key), to_path).await?;
        Ok(())
    }
}

/// Streaming writer used by the admission handler: hashes every chunk as
/// it arrives and aborts once `max_bytes` is exceeded, which
/// `object_store::put` cannot do mid-stream.
pub struct StreamingWriter {
    file: tokio::fs::File,
    tmp_path: PathBuf,
    final_path: PathBuf,
    hasher: sha2::Sha256,
    written: u64,
    max_bytes: u64,
}

#[derive(Debug, Error)]
pub enum StreamWriteError {
    #[error("upload exceeds the configured size limit of {0} bytes")]
    TooLarge(u64),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl StreamingWriter {
    pub async fn create(final_path: PathBuf, max_bytes: u64) -> std::result::Result<Self, StreamWriteError> {
        if let Some(parent) = final_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let tmp_path = final_path.with_extension("tmp");
        let file = tokio::fs::File::create(&tmp_path).await?;
        Ok(Self {
            file,
            tmp_path,
            final_path,
            hasher: sha2::Sha256::default(),
            written: 0,
            max_bytes,
        })
    }

    pub async fn write_chunk(&mut self, chunk: &[u8]) -> std::result::Result<(), StreamWriteError> {
        use sha2::Digest;
        use tokio::io::AsyncWriteExt;
        self.written += chunk.len() as u64;
        if self.written > self.max_bytes {
            return Err(StreamWriteError::TooLarge(self.max_bytes));
        }
        self.hasher.update(chunk);
        self.file.write_all(chunk).await?;
        Ok(())
    }

    /// Finalize: fsync, rename into place, return the digest and byte count.
    pub async fn finish(mut self) -> std::result::Result<(String, u64), StreamWriteError> {
        use sha2::Digest;
        self.file.sync_all().await?;
        tokio::fs::rename(&self.tmp_path, &self.final_path).await?;
        Ok((hex::encode(self.hasher.finalize()), self.written))
    }

    /// Clean up a partial upload (size limit exceeded, client disconnected).
    pub async fn abort(self) {
        let _ = tokio::fs::remove_file(&self.tmp_path).await;
    }
}

/// Kept for parity with the upstream trait boundary: collaborators that
/// only need byte-level get/put can depend on this instead of the concrete
/// `StorageClient`.
#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Vec<u8>>;
    async fn put(&self, key: &str, data: Vec<u8>) -> Result<()>;
}

#[async_trait]
impl BlobStore for StorageClient {
    async fn get(&self, key: &str) -> Result<Vec<u8>> {
        self.download(key).await
    }

    async fn put(&self, key: &str, data: Vec<u8>) -> Result<()> {
        self.upload(key, data).await.map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn write_local_is_atomic_and_readable() {
        let dir = TempDir::new().unwrap();
        let client = StorageClient::local(dir.path());
        client.write_local("a/b.txt", b"hello".to_vec()).await.unwrap();
        let bytes = client.read_local("a/b.txt").await.unwrap();
        assert_eq!(bytes, b"hello");
        assert!(!client.local_path("a/b.tmp").exists());
    }

    #[tokio::test]
    async fn streaming_writer_rejects_oversized_uploads() {
        let dir = TempDir::new().unwrap();
        let final_path = dir.path().join("big.bin");
        let mut writer = StreamingWriter::create(final_path.clone(), 4).await.unwrap();
        assert!(writer.write_chunk(b"hello world").await.is_err());
    }

    #[tokio::test]
    async fn streaming_writer_produces_a_matching_digest() {
        use sha2::{Digest, Sha256};
        let dir = TempDir::new().unwrap();
        let final_path = dir.path().join("file.bin");
        let mut writer = StreamingWriter::create(final_path.clone(), 1024).await.unwrap();
        writer.write_chunk(b"hello").await.unwrap();
        writer.write_chunk(b" world").await.unwrap();
        let (digest, size) = writer.finish().await.unwrap();
        assert_eq!(size, 11);
        assert_eq!(digest, hex::encode(Sha256::digest(b"hello world")));
        assert!(final_path.exists());
    }
}
