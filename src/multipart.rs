// Multipart upload manager for mediascribe
//
// Tracks in-progress chunked uploads: expected chunk count, per-chunk
// storage ids, completion state. The manager exclusively owns the
// MultipartUpload/MultipartChunk lifecycle; all mutation goes through one
// mutex so concurrent record_chunk_stored calls cannot race on the
// stored-count increment.

use chrono::Utc;
use log::{debug, info, warn};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::error::UploadError;
use crate::models::{ChunkSlot, MultipartChunk, MultipartUpload};
use crate::object_store::ObjectStore;

struct MultipartState {
    uploads: HashMap<Uuid, MultipartUpload>,
    chunks: HashMap<Uuid, MultipartChunk>,
    /// (upload_id, index) -> chunk id; enforces at most one row per slot
    slots: HashMap<(Uuid, u32), Uuid>,
    /// final storage id -> upload id, for multipart-aware retrieval checks
    by_storage: HashMap<Uuid, Uuid>,
}

/// Manager for chunked uploads
pub struct MultipartUploadManager {
    state: Arc<Mutex<MultipartState>>,
    objects: Arc<dyn ObjectStore>,
}

impl MultipartUploadManager {
    pub fn new(objects: Arc<dyn ObjectStore>) -> Self {
        Self {
            state: Arc::new(Mutex::new(MultipartState {
                uploads: HashMap::new(),
                chunks: HashMap::new(),
                slots: HashMap::new(),
                by_storage: HashMap::new(),
            })),
            objects,
        }
    }

    /// Create a new multipart upload expecting `num_chunks` chunks
    pub async fn init_upload(&self, num_chunks: u32) -> Result<Uuid, UploadError> {
        if num_chunks == 0 {
            return Err(UploadError::InvalidArgument(
                "chunk count must be positive".to_string(),
            ));
        }

        let upload = MultipartUpload {
            id: Uuid::new_v4(),
            num_chunks,
            stored_chunks: 0,
            complete: false,
            content_type: None,
            storage_id: None,
            created_at: Utc::now(),
            completed_at: None,
        };
        let id = upload.id;

        let mut state = self.state.lock().await;
        state.uploads.insert(id, upload);
        info!("Initialized multipart upload {} ({} chunks)", id, num_chunks);
        Ok(id)
    }

    /// Hand out a single-use destination for one chunk.
    ///
    /// Requesting the same index again before its bytes land reuses the
    /// existing chunk row with a fresh destination token; requesting an
    /// index that already stored its payload is a conflict.
    pub async fn get_chunk_upload_slot(
        &self,
        upload_id: Uuid,
        chunk_index: u32,
    ) -> Result<ChunkSlot, UploadError> {
        let mut state = self.state.lock().await;

        let upload = state
            .uploads
            .get(&upload_id)
            .ok_or_else(|| UploadError::NotFound(format!("upload {}", upload_id)))?;

        if upload.complete {
            return Err(UploadError::InvalidState(format!(
                "upload {} is already complete",
                upload_id
            )));
        }
        let num_chunks = upload.num_chunks;
        if chunk_index >= num_chunks {
            return Err(UploadError::OutOfRange {
                index: chunk_index,
                num_chunks,
            });
        }

        let chunk_id = match state.slots.get(&(upload_id, chunk_index)) {
            Some(existing) => {
                let chunk = &state.chunks[existing];
                if chunk.storage_id.is_some() {
                    return Err(UploadError::Conflict(format!(
                        "chunk {} of upload {} already stored",
                        chunk_index, upload_id
                    )));
                }
                debug!(
                    "Reissuing slot for chunk {} of upload {}",
                    chunk_index, upload_id
                );
                *existing
            }
            None => {
                let chunk = MultipartChunk {
                    id: Uuid::new_v4(),
                    upload_id,
                    index: chunk_index,
                    storage_id: None,
                    uploaded_at: None,
                };
                let id = chunk.id;
                state.slots.insert((upload_id, chunk_index), id);
                state.chunks.insert(id, chunk);
                id
            }
        };

        // The destination token doubles as the storage id the chunk payload
        // will land under when PUT to the returned URL.
        let destination = self.objects.upload_destination(Uuid::new_v4());

        Ok(ChunkSlot {
            chunk_id,
            destination,
        })
    }

    /// Record that a chunk's bytes landed in the object store.
    ///
    /// Idempotent for a repeated (chunk_id, storage_id) pair; a different
    /// storage id for an already-recorded chunk is a conflict. The
    /// stored-count increments exactly once per index.
    pub async fn record_chunk_stored(
        &self,
        chunk_id: Uuid,
        storage_id: Uuid,
    ) -> Result<(), UploadError> {
        let mut state = self.state.lock().await;

        let chunk = state
            .chunks
            .get(&chunk_id)
            .ok_or_else(|| UploadError::NotFound(format!("chunk {}", chunk_id)))?;
        let upload_id = chunk.upload_id;
        let index = chunk.index;

        match chunk.storage_id {
            Some(existing) if existing == storage_id => {
                debug!(
                    "Chunk {} of upload {} already recorded, no-op",
                    index, upload_id
                );
                return Ok(());
            }
            Some(existing) => {
                return Err(UploadError::Conflict(format!(
                    "chunk {} of upload {} already recorded as {}, refusing {}",
                    index, upload_id, existing, storage_id
                )));
            }
            None => {}
        }

        let upload = state
            .uploads
            .get(&upload_id)
            .ok_or_else(|| UploadError::NotFound(format!("upload {}", upload_id)))?;
        if upload.complete {
            return Err(UploadError::InvalidState(format!(
                "upload {} is already complete",
                upload_id
            )));
        }

        let chunk = state
            .chunks
            .get_mut(&chunk_id)
            .expect("chunk checked above");
        chunk.storage_id = Some(storage_id);
        chunk.uploaded_at = Some(Utc::now());

        let upload = state
            .uploads
            .get_mut(&upload_id)
            .expect("upload checked above");
        upload.stored_chunks += 1;
        debug!(
            "Recorded chunk {} of upload {} ({}/{} stored)",
            index, upload_id, upload.stored_chunks, upload.num_chunks
        );
        Ok(())
    }

    /// Assemble the upload into a single object and mark it complete.
    ///
    /// Chunk payloads are concatenated in index order regardless of arrival
    /// order; after success the returned storage id retrieves the full file
    /// byte-for-byte. The completion flag is set only after assembly
    /// produced the final object.
    pub async fn complete_upload(
        &self,
        upload_id: Uuid,
        content_type: &str,
        first_chunk_storage_id: Uuid,
    ) -> Result<Uuid, UploadError> {
        // Collect the ordered part list under the lock, then compose without
        // holding it: assembly may move a lot of bytes.
        let parts = {
            let state = self.state.lock().await;

            let upload = state
                .uploads
                .get(&upload_id)
                .ok_or_else(|| UploadError::NotFound(format!("upload {}", upload_id)))?;
            if upload.complete {
                return Err(UploadError::InvalidState(format!(
                    "upload {} is already complete",
                    upload_id
                )));
            }
            if upload.stored_chunks < upload.num_chunks {
                return Err(UploadError::Incomplete {
                    stored: upload.stored_chunks,
                    expected: upload.num_chunks,
                });
            }

            let mut parts = Vec::with_capacity(upload.num_chunks as usize);
            for index in 0..upload.num_chunks {
                let chunk_id = state.slots.get(&(upload_id, index)).ok_or_else(|| {
                    UploadError::Incomplete {
                        stored: upload.stored_chunks,
                        expected: upload.num_chunks,
                    }
                })?;
                let storage_id = state.chunks[chunk_id].storage_id.ok_or_else(|| {
                    UploadError::Incomplete {
                        stored: upload.stored_chunks,
                        expected: upload.num_chunks,
                    }
                })?;
                parts.push(storage_id);
            }

            if parts[0] != first_chunk_storage_id {
                return Err(UploadError::Conflict(format!(
                    "first chunk of upload {} is {}, caller supplied {}",
                    upload_id, parts[0], first_chunk_storage_id
                )));
            }
            parts
        };

        let final_id = self.objects.compose(&parts).await?;

        let mut state = self.state.lock().await;
        // Re-check under the lock: a concurrent completion may have won.
        let upload = state
            .uploads
            .get_mut(&upload_id)
            .ok_or_else(|| UploadError::NotFound(format!("upload {}", upload_id)))?;
        if upload.complete {
            warn!(
                "Upload {} completed concurrently, discarding duplicate composite",
                upload_id
            );
            let kept = upload.storage_id.expect("complete upload has storage id");
            drop(state);
            if let Err(e) = self.objects.delete(final_id).await {
                warn!("Failed to discard duplicate composite {}: {}", final_id, e);
            }
            return Ok(kept);
        }
        upload.complete = true;
        upload.content_type = Some(content_type.to_string());
        upload.storage_id = Some(final_id);
        upload.completed_at = Some(Utc::now());
        state.by_storage.insert(final_id, upload_id);

        info!(
            "Completed multipart upload {} -> storage {}",
            upload_id, final_id
        );
        Ok(final_id)
    }

    /// Snapshot of an upload's bookkeeping
    pub async fn get_upload(&self, upload_id: Uuid) -> Option<MultipartUpload> {
        let state = self.state.lock().await;
        state.uploads.get(&upload_id).cloned()
    }

    /// Whether a storage id is the assembled result of a completed multipart
    /// upload. The orchestrator uses this to pick streaming retrieval for
    /// large assembled payloads.
    pub async fn is_assembled_storage(&self, storage_id: Uuid) -> bool {
        let state = self.state.lock().await;
        state.by_storage.contains_key(&storage_id)
    }
}
