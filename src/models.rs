// mediascribe data models
//
// This module contains the durable entities owned by the core (media
// records, multipart uploads, multipart chunks) and the request/response
// types used across the API.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle status of a media record's transcription
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TranscriptionStatus {
    /// File stored, no run started yet
    Pending,
    /// A run currently owns this record
    Processing,
    /// Transcript persisted
    Completed,
    /// Run exhausted its retries; see error_message
    Error,
}

/// One user-submitted media file and its processing state.
///
/// Invariant: `transcript` and `error_message` are mutually exclusive, and
/// only the run that holds the record in `Processing` may write either.
#[derive(Debug, Clone, Serialize)]
pub struct MediaRecord {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub display_name: String,
    pub size_bytes: u64,
    pub content_type: String,
    /// Playback duration in seconds, when known at upload time
    pub duration_secs: Option<f64>,
    /// Handle of the (possibly assembled) file in the object store
    pub storage_id: Uuid,
    pub status: TranscriptionStatus,
    pub transcript: Option<String>,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub transcribed_at: Option<DateTime<Utc>>,
}

impl MediaRecord {
    pub fn new(
        owner_id: Uuid,
        display_name: String,
        size_bytes: u64,
        content_type: String,
        storage_id: Uuid,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            owner_id,
            display_name,
            size_bytes,
            content_type,
            duration_secs: None,
            storage_id,
            status: TranscriptionStatus::Pending,
            transcript: None,
            error_message: None,
            created_at: Utc::now(),
            transcribed_at: None,
        }
    }
}

/// Bookkeeping for one in-progress chunked upload.
///
/// `num_chunks` is fixed at creation. `complete` is set only after assembly
/// produced `storage_id` with all chunks stored.
#[derive(Debug, Clone)]
pub struct MultipartUpload {
    pub id: Uuid,
    pub num_chunks: u32,
    pub stored_chunks: u32,
    pub complete: bool,
    pub content_type: Option<String>,
    /// Final assembled object, present iff `complete`
    pub storage_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// One chunk slot within a multipart upload. At most one row exists per
/// (upload_id, index); `storage_id` stays empty until the bytes land.
#[derive(Debug, Clone)]
pub struct MultipartChunk {
    pub id: Uuid,
    pub upload_id: Uuid,
    pub index: u32,
    pub storage_id: Option<Uuid>,
    pub uploaded_at: Option<DateTime<Utc>>,
}

/// Single-use destination for one chunk upload
#[derive(Debug, Clone, Serialize)]
pub struct ChunkSlot {
    /// Identifier to pass to record_chunk_stored once the bytes land
    pub chunk_id: Uuid,
    /// Write target for the chunk payload
    pub destination: String,
}

/// Request body for init_upload
#[derive(Debug, Deserialize)]
pub struct InitUploadRequest {
    pub num_chunks: u32,
}

/// Response for init_upload
#[derive(Serialize)]
pub struct InitUploadResponse {
    pub upload_id: Uuid,
}

/// Request body for record_chunk_stored
#[derive(Debug, Deserialize)]
pub struct RecordChunkRequest {
    pub storage_id: Uuid,
}

/// Request body for complete_upload
#[derive(Debug, Deserialize)]
pub struct CompleteUploadRequest {
    pub content_type: String,
    pub first_chunk_storage_id: Uuid,
}

/// Response for complete_upload
#[derive(Serialize)]
pub struct CompleteUploadResponse {
    pub storage_id: Uuid,
}

/// Response after storing raw bytes through the store endpoint
#[derive(Serialize)]
pub struct StoreObjectResponse {
    pub storage_id: Uuid,
}

/// Request body for registering a media record over an already-stored
/// object (the chunked upload path)
#[derive(Debug, Deserialize)]
pub struct RegisterMediaRequest {
    pub owner_id: Uuid,
    pub display_name: String,
    pub size_bytes: u64,
    pub content_type: String,
    pub storage_id: Uuid,
}

/// Request body for triggering a transcription run
#[derive(Debug, Deserialize)]
pub struct TriggerTranscriptionRequest {
    pub storage_id: Uuid,
}

/// Response for media creation
#[derive(Serialize)]
pub struct MediaCreatedResponse {
    pub media_id: Uuid,
    pub storage_id: Uuid,
    /// URL to poll for the transcription read model
    pub status_url: String,
}

/// Read model returned for media status polling. Only the fields the
/// presentation layer needs; absent fields are omitted from the JSON.
#[derive(Serialize)]
pub struct MediaStatusResponse {
    pub status: TranscriptionStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transcribed_at: Option<DateTime<Utc>>,
}

impl From<&MediaRecord> for MediaStatusResponse {
    fn from(record: &MediaRecord) -> Self {
        Self {
            status: record.status,
            text: record.transcript.clone(),
            error: record.error_message.clone(),
            transcribed_at: record.transcribed_at,
        }
    }
}

/// Error response for API
#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
}
