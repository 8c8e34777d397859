// Object store abstraction for mediascribe
//
// Durable chunk/file storage addressed by opaque storage ids. The trait is
// the seam the upload manager, the client driver and the orchestrator share;
// the local filesystem backend is the default implementation.

use async_trait::async_trait;
use bytes::Bytes;
use futures::{Stream, StreamExt};
use log::{debug, info};
use std::path::PathBuf;
use std::pin::Pin;
use tokio::fs;
use tokio::io::{AsyncRead, AsyncWriteExt};
use uuid::Uuid;

use crate::error::StorageError;

pub type StorageResult<T> = Result<T, StorageError>;

/// Byte stream returned by streaming reads
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, StorageError>> + Send>>;

/// Durable object storage addressed by opaque storage ids.
///
/// Objects are append-only from the caller's point of view: once written
/// under an id, the bytes never change. Assembly of multipart uploads goes
/// through [`ObjectStore::compose`].
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Store a payload under a fresh storage id
    async fn put(&self, data: Vec<u8>) -> StorageResult<Uuid>;

    /// Store a payload under a caller-chosen id (single-use upload slots)
    async fn put_with_id(&self, id: Uuid, data: Vec<u8>) -> StorageResult<()>;

    /// Store a payload from a reader without buffering it whole
    async fn put_stream(
        &self,
        reader: Pin<Box<dyn AsyncRead + Send + Unpin>>,
    ) -> StorageResult<Uuid>;

    /// Read a whole object into memory
    async fn read(&self, id: Uuid) -> StorageResult<Vec<u8>>;

    /// Read an object as a chunked byte stream (for large payloads)
    async fn read_stream(&self, id: Uuid) -> StorageResult<ByteStream>;

    /// Delete an object; deleting an unknown id is a no-op
    async fn delete(&self, id: Uuid) -> StorageResult<()>;

    /// Whether an object exists under this id
    async fn exists(&self, id: Uuid) -> StorageResult<bool>;

    /// Size in bytes of a stored object
    async fn content_length(&self, id: Uuid) -> StorageResult<u64>;

    /// Concatenate the given objects, in the given order, into a new object
    /// and return its storage id. Every part must exist.
    async fn compose(&self, parts: &[Uuid]) -> StorageResult<Uuid>;

    /// Fetchable URL for a stored object, or NotFound
    async fn get_url(&self, id: Uuid) -> StorageResult<String>;

    /// Single-use write target for the given upload token
    fn upload_destination(&self, token: Uuid) -> String;
}

/// Local filesystem object store. Objects live as flat files named by their
/// storage id under one root directory.
#[derive(Clone)]
pub struct LocalObjectStore {
    base_dir: PathBuf,
    base_url: String,
}

impl LocalObjectStore {
    /// Create the store, ensuring the root directory exists
    pub async fn new(base_dir: impl Into<PathBuf>, base_url: String) -> StorageResult<Self> {
        let base_dir = base_dir.into();
        fs::create_dir_all(&base_dir).await?;
        Ok(Self { base_dir, base_url })
    }

    fn object_path(&self, id: Uuid) -> PathBuf {
        // Uuid's Display is a fixed-shape hex string, so the key can never
        // escape the root directory.
        self.base_dir.join(id.to_string())
    }

    async fn write_object(&self, id: Uuid, data: &[u8]) -> StorageResult<()> {
        let path = self.object_path(id);
        let mut file = fs::File::create(&path).await?;
        file.write_all(data).await?;
        file.sync_all().await?;
        debug!(
            "Stored object {} ({} bytes) at {}",
            id,
            data.len(),
            path.display()
        );
        Ok(())
    }
}

#[async_trait]
impl ObjectStore for LocalObjectStore {
    async fn put(&self, data: Vec<u8>) -> StorageResult<Uuid> {
        let id = Uuid::new_v4();
        self.write_object(id, &data).await?;
        Ok(id)
    }

    async fn put_with_id(&self, id: Uuid, data: Vec<u8>) -> StorageResult<()> {
        self.write_object(id, &data).await
    }

    async fn put_stream(
        &self,
        mut reader: Pin<Box<dyn AsyncRead + Send + Unpin>>,
    ) -> StorageResult<Uuid> {
        let id = Uuid::new_v4();
        let path = self.object_path(id);
        let mut file = fs::File::create(&path).await?;
        let bytes_copied = tokio::io::copy(&mut reader, &mut file).await?;
        file.sync_all().await?;
        info!("Stored streamed object {} ({} bytes)", id, bytes_copied);
        Ok(id)
    }

    async fn read(&self, id: Uuid) -> StorageResult<Vec<u8>> {
        let path = self.object_path(id);
        if !fs::try_exists(&path).await.unwrap_or(false) {
            return Err(StorageError::NotFound(id));
        }
        Ok(fs::read(&path).await?)
    }

    async fn read_stream(&self, id: Uuid) -> StorageResult<ByteStream> {
        let path = self.object_path(id);
        if !fs::try_exists(&path).await.unwrap_or(false) {
            return Err(StorageError::NotFound(id));
        }
        let file = fs::File::open(&path).await?;
        let stream = tokio_util::io::ReaderStream::new(file)
            .map(|result| result.map_err(StorageError::Io));
        Ok(Box::pin(stream))
    }

    async fn delete(&self, id: Uuid) -> StorageResult<()> {
        let path = self.object_path(id);
        if !fs::try_exists(&path).await.unwrap_or(false) {
            return Ok(());
        }
        fs::remove_file(&path).await?;
        debug!("Deleted object {}", id);
        Ok(())
    }

    async fn exists(&self, id: Uuid) -> StorageResult<bool> {
        Ok(fs::try_exists(self.object_path(id)).await.unwrap_or(false))
    }

    async fn content_length(&self, id: Uuid) -> StorageResult<u64> {
        let path = self.object_path(id);
        if !fs::try_exists(&path).await.unwrap_or(false) {
            return Err(StorageError::NotFound(id));
        }
        Ok(fs::metadata(&path).await?.len())
    }

    async fn compose(&self, parts: &[Uuid]) -> StorageResult<Uuid> {
        let id = Uuid::new_v4();
        let path = self.object_path(id);
        let mut out = fs::File::create(&path).await?;

        let mut total = 0u64;
        for part in parts {
            let part_path = self.object_path(*part);
            if !fs::try_exists(&part_path).await.unwrap_or(false) {
                // Remove the partial composite before reporting the gap
                let _ = fs::remove_file(&path).await;
                return Err(StorageError::NotFound(*part));
            }
            let mut src = fs::File::open(&part_path).await?;
            total += tokio::io::copy(&mut src, &mut out).await?;
        }
        out.sync_all().await?;

        info!(
            "Composed object {} from {} parts ({} bytes)",
            id,
            parts.len(),
            total
        );
        Ok(id)
    }

    async fn get_url(&self, id: Uuid) -> StorageResult<String> {
        if !self.exists(id).await? {
            return Err(StorageError::NotFound(id));
        }
        Ok(format!(
            "{}/store/{}",
            self.base_url.trim_end_matches('/'),
            id
        ))
    }

    fn upload_destination(&self, token: Uuid) -> String {
        format!("{}/store/{}", self.base_url.trim_end_matches('/'), token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    async fn store(dir: &tempfile::TempDir) -> LocalObjectStore {
        LocalObjectStore::new(dir.path(), "http://localhost:8181".to_string())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn put_then_read_round_trips() {
        let dir = tempdir().unwrap();
        let store = store(&dir).await;

        let id = store.put(b"hello".to_vec()).await.unwrap();
        assert_eq!(store.read(id).await.unwrap(), b"hello");
        assert_eq!(store.content_length(id).await.unwrap(), 5);
    }

    #[tokio::test]
    async fn read_unknown_id_is_not_found() {
        let dir = tempdir().unwrap();
        let store = store(&dir).await;

        let result = store.read(Uuid::new_v4()).await;
        assert!(matches!(result, Err(StorageError::NotFound(_))));
    }

    #[tokio::test]
    async fn delete_unknown_id_is_noop() {
        let dir = tempdir().unwrap();
        let store = store(&dir).await;
        assert!(store.delete(Uuid::new_v4()).await.is_ok());
    }

    #[tokio::test]
    async fn compose_concatenates_in_given_order() {
        let dir = tempdir().unwrap();
        let store = store(&dir).await;

        let a = store.put(b"aaa".to_vec()).await.unwrap();
        let b = store.put(b"bb".to_vec()).await.unwrap();
        let c = store.put(b"c".to_vec()).await.unwrap();

        let whole = store.compose(&[a, b, c]).await.unwrap();
        assert_eq!(store.read(whole).await.unwrap(), b"aaabbc");

        // Order matters
        let reversed = store.compose(&[c, b, a]).await.unwrap();
        assert_eq!(store.read(reversed).await.unwrap(), b"cbbaaa");
    }

    #[tokio::test]
    async fn compose_with_missing_part_fails() {
        let dir = tempdir().unwrap();
        let store = store(&dir).await;

        let a = store.put(b"aaa".to_vec()).await.unwrap();
        let result = store.compose(&[a, Uuid::new_v4()]).await;
        assert!(matches!(result, Err(StorageError::NotFound(_))));
    }

    #[tokio::test]
    async fn read_stream_yields_full_object() {
        let dir = tempdir().unwrap();
        let store = store(&dir).await;

        let payload: Vec<u8> = (0..200_000u32).map(|i| (i % 251) as u8).collect();
        let id = store.put(payload.clone()).await.unwrap();

        let mut stream = store.read_stream(id).await.unwrap();
        let mut collected = Vec::new();
        while let Some(chunk) = stream.next().await {
            collected.extend_from_slice(&chunk.unwrap());
        }
        assert_eq!(collected, payload);
    }

    #[tokio::test]
    async fn get_url_requires_existing_object() {
        let dir = tempdir().unwrap();
        let store = store(&dir).await;

        let id = store.put(b"x".to_vec()).await.unwrap();
        let url = store.get_url(id).await.unwrap();
        assert!(url.ends_with(&id.to_string()));

        assert!(matches!(
            store.get_url(Uuid::new_v4()).await,
            Err(StorageError::NotFound(_))
        ));
    }
}
