// Video to audio extraction for mediascribe
//
// Inspects the file extension against the known video container set and,
// for video inputs, extracts a standalone audio track with ffmpeg. A
// container without an audio track fails here, before any engine runs.

use lazy_static::lazy_static;
use log::{debug, info};
use std::collections::HashSet;
use std::path::Path;
use tokio::process::Command;

use crate::config::TranscoderConfig;
use crate::error::TranscodeError;
use crate::subprocess::{run_with_timeout, CommandError};

lazy_static! {
    /// File extensions treated as video containers
    static ref VIDEO_EXTENSIONS: HashSet<&'static str> = [
        "mp4", "mkv", "mov", "avi", "webm", "m4v", "mpg", "mpeg", "wmv", "flv", "3gp", "ts",
    ]
    .into_iter()
    .collect();
}

/// Whether a path looks like a video container by extension
pub fn is_video_path(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| VIDEO_EXTENSIONS.contains(ext.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

/// ffmpeg wrapper extracting a mono 16 kHz WAV track from a video file
pub struct AudioExtractor {
    config: TranscoderConfig,
}

impl AudioExtractor {
    pub fn new(config: TranscoderConfig) -> Self {
        Self { config }
    }

    /// Extract the audio track of `input` into `output`.
    ///
    /// `-vn` drops the video stream; a container with no audio track makes
    /// ffmpeg exit non-zero, which surfaces as `TranscodeError::Failed`.
    pub async fn extract_audio(&self, input: &Path, output: &Path) -> Result<(), TranscodeError> {
        debug!(
            "Extracting audio from {} to {}",
            input.display(),
            output.display()
        );

        let mut command = Command::new(&self.config.command_path);
        command
            .arg("-y")
            .arg("-i")
            .arg(input)
            .arg("-vn")
            .arg("-acodec")
            .arg("pcm_s16le")
            .arg("-ar")
            .arg("16000")
            .arg("-ac")
            .arg("1")
            .arg(output);

        let output_result = run_with_timeout(command, "ffmpeg", self.config.timeout)
            .await
            .map_err(|e| match e {
                CommandError::Missing(cmd) => TranscodeError::Unavailable(cmd),
                CommandError::Timeout(_, secs) => TranscodeError::Timeout(secs),
                CommandError::Io(e) => TranscodeError::Io(e),
            })?;

        if !output_result.status.success() {
            return Err(TranscodeError::Failed(output_result.stderr_text()));
        }

        // ffmpeg can exit 0 without writing anything for some malformed
        // inputs; treat that the same as a failed extraction.
        if !output.exists() {
            return Err(TranscodeError::Failed(format!(
                "no audio output produced for {}",
                input.display()
            )));
        }

        info!(
            "Extracted audio track from {} to {}",
            input.display(),
            output.display()
        );
        Ok(())
    }
}
