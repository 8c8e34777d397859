// Upload client driver for mediascribe
//
// Producer-side driver that splits a large file into fixed-size chunks,
// requests per-chunk slots, uploads each to its slot's destination with
// bounded retries and signals completion. Files at or under one chunk size
// (or with chunking disabled) take a single-shot path and skip the
// multipart manager entirely.

use log::{debug, info, warn};
use std::path::Path;
use std::sync::Arc;
use tokio::fs;
use tokio::io::{AsyncReadExt, AsyncSeekExt, SeekFrom};
use tokio::time::sleep;
use uuid::Uuid;

use crate::config::UploadConfig;
use crate::error::UploadError;
use crate::multipart::MultipartUploadManager;
use crate::object_store::ObjectStore;

/// Number of chunks needed to cover `size` bytes at `chunk_size`
pub fn chunk_count(size: u64, chunk_size: u64) -> u32 {
    debug_assert!(chunk_size > 0);
    size.div_ceil(chunk_size) as u32
}

/// Byte range of chunk `index`: [index*chunk_size, min(size, (index+1)*chunk_size))
pub fn chunk_range(size: u64, chunk_size: u64, index: u32) -> (u64, u64) {
    let start = index as u64 * chunk_size;
    let end = (start + chunk_size).min(size);
    (start, end)
}

/// Storage token encoded in a slot's destination (its last path segment).
/// The chunk payload must land under exactly this id.
fn destination_token(destination: &str) -> Result<Uuid, UploadError> {
    destination
        .rsplit('/')
        .next()
        .and_then(|segment| segment.parse().ok())
        .ok_or_else(|| {
            UploadError::InvalidArgument(format!("malformed chunk destination: {}", destination))
        })
}

/// Driver for uploading local files into the object store
pub struct UploadClientDriver {
    manager: Arc<MultipartUploadManager>,
    objects: Arc<dyn ObjectStore>,
    config: UploadConfig,
}

impl UploadClientDriver {
    pub fn new(
        manager: Arc<MultipartUploadManager>,
        objects: Arc<dyn ObjectStore>,
        config: UploadConfig,
    ) -> Self {
        Self {
            manager,
            objects,
            config,
        }
    }

    /// Upload a file, returning the storage id of the (possibly assembled)
    /// object. The orchestrator handles both storage-id shapes
    /// transparently, so callers need not care which path was taken.
    pub async fn upload_file(&self, path: &Path, content_type: &str) -> Result<Uuid, UploadError> {
        let size = fs::metadata(path).await?.len();

        if !self.config.chunking_enabled || size <= self.config.chunk_size {
            debug!(
                "Single-shot upload for {} ({} bytes)",
                path.display(),
                size
            );
            let file = fs::File::open(path).await?;
            let storage_id = self.objects.put_stream(Box::pin(file)).await?;
            return Ok(storage_id);
        }

        let num_chunks = chunk_count(size, self.config.chunk_size);
        let upload_id = self.manager.init_upload(num_chunks).await?;
        info!(
            "Chunked upload {} for {} ({} bytes, {} chunks)",
            upload_id,
            path.display(),
            size,
            num_chunks
        );

        let mut file = fs::File::open(path).await?;
        let mut first_chunk_storage_id = None;

        // Chunk indices are assigned client-side in upload order.
        for index in 0..num_chunks {
            let slot = self.manager.get_chunk_upload_slot(upload_id, index).await?;
            let storage_id = destination_token(&slot.destination)?;

            let (start, end) = chunk_range(size, self.config.chunk_size, index);
            let mut payload = vec![0u8; (end - start) as usize];
            file.seek(SeekFrom::Start(start)).await?;
            file.read_exact(&mut payload).await?;

            self.put_chunk_with_retries(index, storage_id, payload).await?;
            self.manager
                .record_chunk_stored(slot.chunk_id, storage_id)
                .await?;

            if index == 0 {
                first_chunk_storage_id = Some(storage_id);
            }
        }

        let final_id = self
            .manager
            .complete_upload(
                upload_id,
                content_type,
                first_chunk_storage_id.expect("at least one chunk"),
            )
            .await?;
        info!("Chunked upload {} assembled as {}", upload_id, final_id);
        Ok(final_id)
    }

    /// Store one chunk payload under its slot's destination token,
    /// retrying transport failures with a fixed backoff before aborting
    /// the whole upload.
    async fn put_chunk_with_retries(
        &self,
        index: u32,
        storage_id: Uuid,
        payload: Vec<u8>,
    ) -> Result<(), UploadError> {
        let attempts = self.config.chunk_retries.max(1);
        let mut last_error = String::new();

        for attempt in 1..=attempts {
            match self.objects.put_with_id(storage_id, payload.clone()).await {
                Ok(()) => return Ok(()),
                Err(e) => {
                    warn!(
                        "Chunk {} upload attempt {}/{} failed: {}",
                        index, attempt, attempts, e
                    );
                    last_error = e.to_string();
                    if attempt < attempts {
                        sleep(self.config.retry_backoff).await;
                    }
                }
            }
        }

        Err(UploadError::RetriesExhausted {
            index,
            attempts,
            cause: last_error,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object_store::LocalObjectStore;
    use std::io::Write;
    use std::time::Duration;
    use tempfile::tempdir;

    #[test]
    fn chunk_count_rounds_up() {
        assert_eq!(chunk_count(10, 5), 2);
        assert_eq!(chunk_count(11, 5), 3);
        assert_eq!(chunk_count(5, 5), 1);
        assert_eq!(chunk_count(1, 5), 1);
        assert_eq!(chunk_count(0, 5), 0);
    }

    #[test]
    fn chunk_range_clamps_final_chunk() {
        assert_eq!(chunk_range(12, 5, 0), (0, 5));
        assert_eq!(chunk_range(12, 5, 1), (5, 10));
        assert_eq!(chunk_range(12, 5, 2), (10, 12));
    }

    #[test]
    fn destination_token_is_the_last_path_segment() {
        let token = Uuid::new_v4();
        let destination = format!("http://localhost:8181/store/{}", token);
        assert_eq!(destination_token(&destination).unwrap(), token);
    }

    #[test]
    fn malformed_destination_is_rejected() {
        assert!(matches!(
            destination_token("http://localhost:8181/store/not-a-token"),
            Err(UploadError::InvalidArgument(_))
        ));
    }

    fn test_config(chunk_size: u64, chunking_enabled: bool) -> UploadConfig {
        UploadConfig {
            chunk_size,
            chunking_enabled,
            chunk_retries: 3,
            retry_backoff: Duration::from_millis(1),
        }
    }

    async fn driver(
        dir: &tempfile::TempDir,
        config: UploadConfig,
    ) -> (UploadClientDriver, Arc<LocalObjectStore>) {
        let store = Arc::new(
            LocalObjectStore::new(dir.path().join("store"), "http://localhost:8181".to_string())
                .await
                .unwrap(),
        );
        let manager = Arc::new(MultipartUploadManager::new(store.clone()));
        (UploadClientDriver::new(manager, store.clone(), config), store)
    }

    fn write_input(dir: &tempfile::TempDir, name: &str, data: &[u8]) -> std::path::PathBuf {
        let path = dir.path().join(name);
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(data).unwrap();
        path
    }

    #[tokio::test]
    async fn small_file_takes_single_shot_path() {
        let dir = tempdir().unwrap();
        let (driver, store) = driver(&dir, test_config(1024, true)).await;
        let path = write_input(&dir, "small.wav", b"tiny payload");

        let storage_id = driver.upload_file(&path, "audio/wav").await.unwrap();
        assert_eq!(store.read(storage_id).await.unwrap(), b"tiny payload");
    }

    #[tokio::test]
    async fn chunking_disabled_forces_single_shot() {
        let dir = tempdir().unwrap();
        let (driver, store) = driver(&dir, test_config(4, false)).await;
        let payload: Vec<u8> = (0..64u8).collect();
        let path = write_input(&dir, "forced.wav", &payload);

        let storage_id = driver.upload_file(&path, "audio/wav").await.unwrap();
        assert_eq!(store.read(storage_id).await.unwrap(), payload);
    }

    #[tokio::test]
    async fn large_file_is_chunked_and_reassembled_byte_for_byte() {
        let dir = tempdir().unwrap();
        let (driver, store) = driver(&dir, test_config(1000, true)).await;
        // 3 chunks: two full, one partial
        let payload: Vec<u8> = (0..2500u32).map(|i| (i % 256) as u8).collect();
        let path = write_input(&dir, "big.wav", &payload);

        let storage_id = driver.upload_file(&path, "audio/wav").await.unwrap();
        assert_eq!(store.read(storage_id).await.unwrap(), payload);
    }

    #[tokio::test]
    async fn exact_multiple_of_chunk_size_has_no_empty_tail() {
        let dir = tempdir().unwrap();
        let (driver, store) = driver(&dir, test_config(500, true)).await;
        let payload = vec![7u8; 1500];
        let path = write_input(&dir, "exact.wav", &payload);

        let storage_id = driver.upload_file(&path, "audio/wav").await.unwrap();
        assert_eq!(store.read(storage_id).await.unwrap(), payload);
    }
}
