// File utilities for mediascribe
//
// Scratch-file handling for transcription runs: collision-resistant unique
// paths under the shared working directory, and best-effort cleanup that
// logs failures instead of returning them.

use log::{debug, error};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// Per-run scratch space under the shared working directory.
///
/// Every file created during a run is registered here; `cleanup` removes
/// them all, then the run folder itself, regardless of how the run ended.
pub struct RunScratch {
    /// Unique folder for this run
    pub dir: PathBuf,
    files: Vec<PathBuf>,
}

impl RunScratch {
    /// Create a unique run folder under `base_dir`.
    ///
    /// The folder name is a fresh UUID, never derived from the media name,
    /// so concurrent runs cannot interfere with each other.
    pub fn create(base_dir: &str, run_id: Uuid) -> io::Result<Self> {
        let dir = Path::new(base_dir).join(run_id.to_string());
        fs::create_dir_all(&dir)?;
        Ok(Self {
            dir,
            files: Vec::new(),
        })
    }

    /// Reserve a uniquely named file path inside the run folder and add it
    /// to the cleanup list. The file itself is not created.
    pub fn register_file(&mut self, prefix: &str, extension: &str) -> PathBuf {
        let filename = format!("{}_{}.{}", prefix, Uuid::new_v4(), extension);
        let path = self.dir.join(filename);
        self.files.push(path.clone());
        path
    }

    /// Delete every registered file, then the run folder. Failures are
    /// logged, never returned: a failed delete must not mask the run's
    /// outcome.
    pub fn cleanup(self) {
        for file in &self.files {
            if !file.exists() {
                continue;
            }
            if let Err(e) = fs::remove_file(file) {
                error!("Failed to remove scratch file {}: {}", file.display(), e);
            } else {
                debug!("Removed scratch file {}", file.display());
            }
        }
        // The engines may have written result files next to the audio;
        // removing the whole run folder catches those too.
        cleanup_folder(&self.dir);
    }
}

/// Remove a folder and its contents, logging errors instead of returning them
pub fn cleanup_folder(folder_path: &Path) {
    if let Err(e) = fs::remove_dir_all(folder_path) {
        error!(
            "Failed to clean up folder {}: {}",
            folder_path.display(),
            e
        );
    } else {
        debug!("Cleaned up folder: {}", folder_path.display());
    }
}

/// Pick a scratch file extension for a media file from its display name,
/// falling back to a neutral extension when there is none.
pub fn extension_for(display_name: &str) -> String {
    Path::new(display_name)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase())
        .unwrap_or_else(|| "bin".to_string())
}
