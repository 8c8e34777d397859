// mediascribe library
//
// Chunked ingestion protocol and fault-tolerant transcription pipeline:
// multipart upload bookkeeping, an object-store seam, subprocess engine
// adapters with fallback, and the orchestrator state machine that ties
// them together.

pub mod config;
pub mod config_loader;
pub mod engine;
pub mod error;
pub mod file_utils;
pub mod handlers;
pub mod models;
pub mod multipart;
pub mod object_store;
pub mod orchestrator;
pub mod store;
pub mod subprocess;
pub mod transcoder;
pub mod upload_client;

// Re-export common types for easier access
pub use config::{
    EngineConfig, FallbackConfig, HandlerConfig, OrchestratorConfig, StoreConfig, TranscoderConfig,
    UploadConfig,
};
pub use engine::{CliEngine, ScriptEngine, TranscriptionEngine};
pub use error::{ApiError, EngineError, RunError, StorageError, TranscodeError, UploadError};
pub use models::{MediaRecord, MultipartChunk, MultipartUpload, TranscriptionStatus};
pub use multipart::MultipartUploadManager;
pub use object_store::{LocalObjectStore, ObjectStore};
pub use orchestrator::{
    spawn_dispatcher, OrchestratorHandle, TranscriptionOrchestrator, TranscriptionRequest,
};
pub use store::{ClaimOutcome, MediaStore};
pub use transcoder::AudioExtractor;
pub use upload_client::UploadClientDriver;
