// mediascribe configuration
//
// This module centralizes configuration for the upload path, the object
// store, the engines and the orchestrator. Every value has a default and
// can be overridden by environment variable; a flat TOML file can seed the
// environment (see config_loader).

use std::env;
use std::time::Duration;

/// Default values for configuration
pub mod defaults {
    // Root directory for stored objects
    pub const STORE_DIR: &str = "/var/lib/mediascribe/store";

    // Base URL clients use to reach the store endpoints
    pub const STORE_BASE_URL: &str = "http://127.0.0.1:8181";

    // Directory for per-run scratch files
    pub const WORK_DIR: &str = "/var/lib/mediascribe/work";

    // Chunk size for multipart uploads (5 MB)
    pub const CHUNK_SIZE: u64 = 5 * 1024 * 1024;

    // Transport retries per chunk before the whole upload is aborted
    pub const CHUNK_RETRIES: u32 = 3;

    // Fixed backoff between chunk retries, in milliseconds
    pub const CHUNK_RETRY_BACKOFF_MS: u64 = 500;

    // Attempts per orchestrator step
    pub const STEP_ATTEMPTS: u32 = 2;

    // Fixed backoff between step attempts, in milliseconds
    pub const STEP_RETRY_BACKOFF_MS: u64 = 1000;

    // Primary engine command
    pub const ENGINE_CMD: &str = "/usr/local/bin/whisper-cli";

    // Fallback engine interpreter and script
    pub const FALLBACK_INTERPRETER: &str = "sh";
    pub const FALLBACK_SCRIPT: &str = "/usr/local/bin/transcribe_fallback.sh";

    // Time budget for one engine invocation, in seconds
    pub const ENGINE_TIMEOUT_SECS: u64 = 1800;

    // Transcoder command and time budget
    pub const FFMPEG_CMD: &str = "ffmpeg";
    pub const TRANSCODE_TIMEOUT_SECS: u64 = 600;

    // Max accepted size for a single-shot upload (512 MB)
    pub const MAX_FILE_SIZE: usize = 536_870_912;
}

fn env_parsed<T: std::str::FromStr>(name: &str, default: T) -> T {
    env::var(name)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

fn env_string(name: &str, default: &str) -> String {
    env::var(name).unwrap_or_else(|_| String::from(default))
}

/// Configuration for the object store backend
#[derive(Clone, Debug)]
pub struct StoreConfig {
    /// Root directory for stored objects
    pub base_dir: String,
    /// Base URL for destination/retrieval URLs handed to clients
    pub base_url: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            base_dir: env_string("MEDIASCRIBE_STORE_DIR", defaults::STORE_DIR),
            base_url: env_string("MEDIASCRIBE_STORE_URL", defaults::STORE_BASE_URL),
        }
    }
}

/// Configuration for the upload client driver
#[derive(Clone, Debug)]
pub struct UploadConfig {
    /// Target chunk size in bytes
    pub chunk_size: u64,
    /// When false, every upload takes the single-shot path
    pub chunking_enabled: bool,
    /// Transport retries per chunk
    pub chunk_retries: u32,
    /// Fixed backoff between chunk retries
    pub retry_backoff: Duration,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            chunk_size: env_parsed("MEDIASCRIBE_CHUNK_SIZE", defaults::CHUNK_SIZE),
            chunking_enabled: env_parsed("MEDIASCRIBE_CHUNKING_ENABLED", true),
            chunk_retries: env_parsed("MEDIASCRIBE_CHUNK_RETRIES", defaults::CHUNK_RETRIES),
            retry_backoff: Duration::from_millis(env_parsed(
                "MEDIASCRIBE_CHUNK_RETRY_BACKOFF_MS",
                defaults::CHUNK_RETRY_BACKOFF_MS,
            )),
        }
    }
}

/// Configuration for the primary CLI engine
#[derive(Clone, Debug)]
pub struct EngineConfig {
    /// Path to the engine binary
    pub command_path: String,
    /// Time budget for one invocation
    pub timeout: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            command_path: env_string("MEDIASCRIBE_ENGINE_CMD", defaults::ENGINE_CMD),
            timeout: Duration::from_secs(env_parsed(
                "MEDIASCRIBE_ENGINE_TIMEOUT_SECS",
                defaults::ENGINE_TIMEOUT_SECS,
            )),
        }
    }
}

/// Configuration for the fallback script engine
#[derive(Clone, Debug)]
pub struct FallbackConfig {
    /// Interpreter used to run the script (e.g. "sh", "python3")
    pub interpreter: String,
    /// Path to the fallback script
    pub script_path: String,
    /// Time budget for one invocation
    pub timeout: Duration,
}

impl Default for FallbackConfig {
    fn default() -> Self {
        Self {
            interpreter: env_string(
                "MEDIASCRIBE_FALLBACK_INTERPRETER",
                defaults::FALLBACK_INTERPRETER,
            ),
            script_path: env_string("MEDIASCRIBE_FALLBACK_SCRIPT", defaults::FALLBACK_SCRIPT),
            timeout: Duration::from_secs(env_parsed(
                "MEDIASCRIBE_ENGINE_TIMEOUT_SECS",
                defaults::ENGINE_TIMEOUT_SECS,
            )),
        }
    }
}

/// Configuration for the video to audio transcoder
#[derive(Clone, Debug)]
pub struct TranscoderConfig {
    /// Path to the ffmpeg binary
    pub command_path: String,
    /// Time budget for one extraction
    pub timeout: Duration,
}

impl Default for TranscoderConfig {
    fn default() -> Self {
        Self {
            command_path: env_string("MEDIASCRIBE_FFMPEG_CMD", defaults::FFMPEG_CMD),
            timeout: Duration::from_secs(env_parsed(
                "MEDIASCRIBE_TRANSCODE_TIMEOUT_SECS",
                defaults::TRANSCODE_TIMEOUT_SECS,
            )),
        }
    }
}

/// Configuration for the transcription orchestrator
#[derive(Clone, Debug)]
pub struct OrchestratorConfig {
    /// Directory for per-run scratch files
    pub work_dir: String,
    /// Upper bound on simultaneous transcription runs
    pub max_concurrent_runs: usize,
    /// Attempts per retryable step
    pub step_attempts: u32,
    /// Fixed backoff between step attempts
    pub step_backoff: Duration,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            work_dir: env_string("MEDIASCRIBE_WORK_DIR", defaults::WORK_DIR),
            max_concurrent_runs: env_parsed("MEDIASCRIBE_MAX_CONCURRENT_RUNS", num_cpus::get()),
            step_attempts: env_parsed("MEDIASCRIBE_STEP_ATTEMPTS", defaults::STEP_ATTEMPTS),
            step_backoff: Duration::from_millis(env_parsed(
                "MEDIASCRIBE_STEP_RETRY_BACKOFF_MS",
                defaults::STEP_RETRY_BACKOFF_MS,
            )),
        }
    }
}

/// Configuration for the HTTP handlers
#[derive(Clone, Debug)]
pub struct HandlerConfig {
    /// Max accepted size for a single-shot upload, in bytes
    pub max_file_size: usize,
}

impl Default for HandlerConfig {
    fn default() -> Self {
        Self {
            max_file_size: env_parsed("MEDIASCRIBE_MAX_FILE_SIZE", defaults::MAX_FILE_SIZE),
        }
    }
}
