// Transcription engine adapters for mediascribe
//
// Two interchangeable "file -> text" implementations: a primary CLI engine
// and a fallback script engine. Both expect the subprocess to write a
// plain-text result file named after the input's stem into the input's
// directory; the trimmed file content is the transcript.

use async_trait::async_trait;
use log::{debug, warn};
use std::path::Path;
use tokio::fs;
use tokio::process::Command;

use crate::config::{EngineConfig, FallbackConfig};
use crate::error::EngineError;
use crate::subprocess::{run_with_timeout, CommandError};

/// One external speech-recognition engine.
///
/// Implementations are interchangeable: the orchestrator treats them
/// identically apart from primary/fallback sequencing.
#[async_trait]
pub trait TranscriptionEngine: Send + Sync {
    /// Short name for logging
    fn name(&self) -> &str;

    /// Transcribe the audio file, returning the trimmed transcript text.
    /// An empty transcript is valid output, not an error.
    async fn transcribe(&self, audio: &Path) -> Result<String, EngineError>;
}

fn map_command_error(err: CommandError) -> EngineError {
    match err {
        CommandError::Missing(cmd) => EngineError::Unavailable(cmd),
        CommandError::Timeout(_, secs) => EngineError::Timeout(secs),
        CommandError::Io(e) => EngineError::Io(e),
    }
}

/// Read the engine's result file for `audio`, scanning the directory for a
/// similarly-named output before giving up.
///
/// The expected file is `<stem>.txt` next to the input; some engine builds
/// append their own suffixes (e.g. `<stem>.en.txt`), so a prefix scan runs
/// before reporting the output missing.
async fn read_result_file(audio: &Path) -> Result<String, EngineError> {
    let stem = audio
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("audio")
        .to_string();
    let dir = audio.parent().unwrap_or_else(|| Path::new("."));

    let expected = dir.join(format!("{}.txt", stem));
    if let Ok(content) = fs::read_to_string(&expected).await {
        return Ok(content.trim().to_string());
    }

    debug!(
        "Expected output {} missing, scanning {} for candidates",
        expected.display(),
        dir.display()
    );
    let mut entries = fs::read_dir(dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        let name = entry.file_name();
        let name = name.to_string_lossy();
        let is_candidate = name.starts_with(&stem)
            && name.ends_with(".txt")
            && entry.path() != *audio;
        if is_candidate {
            debug!("Using fallback output file {}", entry.path().display());
            let content = fs::read_to_string(entry.path()).await?;
            return Ok(content.trim().to_string());
        }
    }

    Err(EngineError::OutputMissing(audio.display().to_string()))
}

/// Primary engine: a CLI binary invoked with the input path and an output
/// directory, writing `<stem>.txt` beside the input.
pub struct CliEngine {
    config: EngineConfig,
}

impl CliEngine {
    pub fn new(config: EngineConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl TranscriptionEngine for CliEngine {
    fn name(&self) -> &str {
        "primary-cli"
    }

    async fn transcribe(&self, audio: &Path) -> Result<String, EngineError> {
        let output_dir = audio.parent().unwrap_or_else(|| Path::new("."));

        let mut command = Command::new(&self.config.command_path);
        command
            .arg(audio)
            .arg("--output_dir")
            .arg(output_dir)
            .arg("--output_format")
            .arg("txt");

        let output = run_with_timeout(command, "primary engine", self.config.timeout)
            .await
            .map_err(map_command_error)?;

        if !output.status.success() {
            return Err(EngineError::Failed(output.stderr_text()));
        }

        read_result_file(audio).await
    }
}

/// Fallback engine: an interpreter plus script with the same input/output
/// contract as the primary, independent of its runtime.
pub struct ScriptEngine {
    config: FallbackConfig,
}

impl ScriptEngine {
    pub fn new(config: FallbackConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl TranscriptionEngine for ScriptEngine {
    fn name(&self) -> &str {
        "fallback-script"
    }

    async fn transcribe(&self, audio: &Path) -> Result<String, EngineError> {
        if !Path::new(&self.config.script_path).exists() {
            warn!("Fallback script {} not found", self.config.script_path);
            return Err(EngineError::Unavailable(self.config.script_path.clone()));
        }

        let output_dir = audio.parent().unwrap_or_else(|| Path::new("."));

        let mut command = Command::new(&self.config.interpreter);
        command
            .arg(&self.config.script_path)
            .arg(audio)
            .arg(output_dir);

        let output = run_with_timeout(command, "fallback engine", self.config.timeout)
            .await
            .map_err(map_command_error)?;

        if !output.status.success() {
            return Err(EngineError::Failed(output.stderr_text()));
        }

        read_result_file(audio).await
    }
}
