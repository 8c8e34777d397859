// Error handling for mediascribe
//
// This module defines the error taxonomies for the upload protocol, the
// object store, the engine adapters and the transcription orchestrator,
// plus the conversion into HTTP responses for the API surface.

use std::io;
use thiserror::Error;
use uuid::Uuid;

use actix_web::{HttpResponse, ResponseError};

use crate::models::ErrorResponse;

/// Errors from the object store backend
#[derive(Error, Debug)]
pub enum StorageError {
    /// No object exists under the given storage id
    #[error("Object not found: {0}")]
    NotFound(Uuid),

    /// Storage key resolved outside the store root or is malformed
    #[error("Invalid storage key: {0}")]
    InvalidKey(String),

    /// Underlying filesystem error
    #[error("Storage I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Errors from the multipart upload protocol and the upload client driver
#[derive(Error, Debug)]
pub enum UploadError {
    /// Caller-supplied argument is invalid (e.g. zero chunk count)
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Unknown upload or chunk id
    #[error("Not found: {0}")]
    NotFound(String),

    /// Operation not valid for the upload's current lifecycle phase
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Chunk index outside [0, num_chunks)
    #[error("Chunk index {index} out of range for upload with {num_chunks} chunks")]
    OutOfRange { index: u32, num_chunks: u32 },

    /// Chunk identity mismatch: a stored chunk must not silently change payload
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Completion attempted before all chunks were stored
    #[error("Upload incomplete: {stored} of {expected} chunks stored")]
    Incomplete { stored: u32, expected: u32 },

    /// Object store failure during chunk upload or assembly
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// Local file error on the producer side
    #[error("File error: {0}")]
    Io(#[from] io::Error),

    /// All transport retries for a chunk were exhausted
    #[error("Chunk {index} upload failed after {attempts} attempts: {cause}")]
    RetriesExhausted {
        index: u32,
        attempts: u32,
        cause: String,
    },
}

/// Errors from a transcription engine adapter
#[derive(Error, Debug)]
pub enum EngineError {
    /// Engine binary or script is not present on this host
    #[error("Engine unavailable: {0}")]
    Unavailable(String),

    /// Engine process exited with a non-zero status
    #[error("Engine failed: {0}")]
    Failed(String),

    /// Engine exited successfully but no result file could be located
    #[error("Engine produced no output for {0}")]
    OutputMissing(String),

    /// Engine process exceeded its time budget and was killed
    #[error("Engine timed out after {0} seconds")]
    Timeout(u64),

    /// I/O error while running the engine or reading its result
    #[error("Engine I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Errors from the video to audio extraction step
#[derive(Error, Debug)]
pub enum TranscodeError {
    /// Transcoder binary is not present on this host
    #[error("Transcoder unavailable: {0}")]
    Unavailable(String),

    /// Transcoder exited with a non-zero status (corrupt container,
    /// missing audio track, unsupported codec)
    #[error("Audio extraction failed: {0}")]
    Failed(String),

    /// Transcoder process exceeded its time budget and was killed
    #[error("Transcoder timed out after {0} seconds")]
    Timeout(u64),

    /// I/O error around the transcoder invocation
    #[error("Transcoder I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Terminal failure of one transcription run. The Display form becomes the
/// error message stored on the media record.
#[derive(Error, Debug)]
pub enum RunError {
    /// Media record disappeared between trigger and run
    #[error("Media record not found: {0}")]
    MediaNotFound(Uuid),

    /// Materializing the source file failed after retries
    #[error("Download failed: {0}")]
    Download(String),

    /// Storage layer failure while resolving or reading the source
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// Video to audio extraction failed; no engine was invoked
    #[error(transparent)]
    Transcode(#[from] TranscodeError),

    /// Both engines failed; carries the fallback engine's error
    #[error("Transcription failed: {0}")]
    Engine(#[from] EngineError),

    /// Scratch file bookkeeping failed
    #[error("Working file error: {0}")]
    Io(#[from] io::Error),
}

/// Errors surfaced by the HTTP handlers
#[derive(Error, Debug)]
pub enum ApiError {
    /// Bad request payload or parameters
    #[error("Invalid request: {0}")]
    BadRequest(String),

    /// Referenced entity does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// Request conflicts with current state
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Error while reading multipart form data
    #[error("Form error: {0}")]
    FormError(String),

    /// Error when no media file was provided
    #[error("No media file provided in the request")]
    NoMediaFile,

    /// Uploaded payload exceeds the configured limit
    #[error("File too large: {0} bytes exceeds limit of {1} bytes")]
    FileTooLarge(usize, usize),

    /// Internal failure
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ApiError {
    /// Create a new FormError
    pub fn form_error<S: Into<String>>(msg: S) -> Self {
        Self::FormError(msg.into())
    }
}

impl ResponseError for ApiError {
    fn error_response(&self) -> HttpResponse {
        let body = ErrorResponse {
            error: self.to_string(),
        };

        match self {
            ApiError::BadRequest(_) | ApiError::FormError(_) | ApiError::NoMediaFile => {
                HttpResponse::BadRequest().json(body)
            }
            ApiError::NotFound(_) => HttpResponse::NotFound().json(body),
            ApiError::Conflict(_) => HttpResponse::Conflict().json(body),
            ApiError::FileTooLarge(_, _) => HttpResponse::PayloadTooLarge().json(body),
            ApiError::Internal(_) => HttpResponse::InternalServerError().json(body),
        }
    }
}

/// Convert upload protocol errors into HTTP-facing errors
impl From<UploadError> for ApiError {
    fn from(err: UploadError) -> Self {
        match err {
            UploadError::InvalidArgument(msg) => ApiError::BadRequest(msg),
            UploadError::OutOfRange { .. } => ApiError::BadRequest(err.to_string()),
            UploadError::NotFound(id) => ApiError::NotFound(id),
            UploadError::InvalidState(msg) => ApiError::Conflict(msg),
            UploadError::Conflict(msg) => ApiError::Conflict(msg),
            UploadError::Incomplete { .. } => ApiError::Conflict(err.to_string()),
            UploadError::Storage(e) => ApiError::from(e),
            UploadError::Io(e) => ApiError::Internal(e.to_string()),
            UploadError::RetriesExhausted { .. } => ApiError::Internal(err.to_string()),
        }
    }
}

/// Convert object store errors into HTTP-facing errors
impl From<StorageError> for ApiError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::NotFound(id) => ApiError::NotFound(id.to_string()),
            StorageError::InvalidKey(msg) => ApiError::BadRequest(msg),
            StorageError::Io(e) => ApiError::Internal(e.to_string()),
        }
    }
}
