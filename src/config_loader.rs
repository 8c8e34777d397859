// Configuration file loading for mediascribe
//
// An optional flat TOML file seeds environment variables before the typed
// configs in `config.rs` read them; environment variables always win over
// file values. File keys are checked against the settings registry so a
// typo in the file is reported instead of silently exported.

use std::env;
use std::fs;
use std::path::Path;

use log::{debug, info, warn};
use toml::Value;

const CONFIG_FILE_PATH: &str = "mediascribe.conf";

/// Every environment variable the typed configs read. A config file key
/// must match one of these to be exported into the environment.
pub const KNOWN_SETTINGS: &[&str] = &[
    "MEDIASCRIBE_HOST",
    "MEDIASCRIBE_PORT",
    "MEDIASCRIBE_STORE_DIR",
    "MEDIASCRIBE_STORE_URL",
    "MEDIASCRIBE_WORK_DIR",
    "MEDIASCRIBE_CHUNK_SIZE",
    "MEDIASCRIBE_CHUNKING_ENABLED",
    "MEDIASCRIBE_CHUNK_RETRIES",
    "MEDIASCRIBE_CHUNK_RETRY_BACKOFF_MS",
    "MEDIASCRIBE_ENGINE_CMD",
    "MEDIASCRIBE_ENGINE_TIMEOUT_SECS",
    "MEDIASCRIBE_FALLBACK_INTERPRETER",
    "MEDIASCRIBE_FALLBACK_SCRIPT",
    "MEDIASCRIBE_FFMPEG_CMD",
    "MEDIASCRIBE_TRANSCODE_TIMEOUT_SECS",
    "MEDIASCRIBE_MAX_CONCURRENT_RUNS",
    "MEDIASCRIBE_STEP_ATTEMPTS",
    "MEDIASCRIBE_STEP_RETRY_BACKOFF_MS",
    "MEDIASCRIBE_MAX_FILE_SIZE",
];

/// Settings extracted from a config file, split into exportable pairs and
/// keys the registry does not know.
struct FileSettings {
    recognized: Vec<(String, String)>,
    unknown: Vec<String>,
}

/// Parse a flat TOML document into settings. Scalar values are rendered to
/// the string form the env-var parsers in `config.rs` expect; nested
/// values and unregistered keys land in `unknown`.
fn parse_settings(content: &str) -> Result<FileSettings, toml::de::Error> {
    let root: Value = content.parse()?;
    let mut settings = FileSettings {
        recognized: Vec::new(),
        unknown: Vec::new(),
    };

    if let Value::Table(table) = root {
        for (key, value) in table {
            let rendered = match value {
                Value::String(s) => s,
                Value::Integer(i) => i.to_string(),
                Value::Float(f) => f.to_string(),
                Value::Boolean(b) => b.to_string(),
                _ => {
                    settings.unknown.push(key);
                    continue;
                }
            };
            if KNOWN_SETTINGS.contains(&key.as_str()) {
                settings.recognized.push((key, rendered));
            } else {
                settings.unknown.push(key);
            }
        }
    }

    Ok(settings)
}

/// Load `mediascribe.conf` if present and export its recognized settings
/// as environment variables, skipping any that are already set.
///
/// Returns true if the config file was successfully loaded.
pub fn load_config() -> bool {
    let config_path = Path::new(CONFIG_FILE_PATH);

    if !config_path.exists() {
        debug!("Configuration file not found at: {}", CONFIG_FILE_PATH);
        return false;
    }

    let content = match fs::read_to_string(config_path) {
        Ok(content) => content,
        Err(e) => {
            warn!("Failed to read configuration file: {}", e);
            return false;
        }
    };

    let settings = match parse_settings(&content) {
        Ok(settings) => settings,
        Err(e) => {
            warn!("Failed to parse configuration file: {}", e);
            return false;
        }
    };

    for key in &settings.unknown {
        warn!(
            "Ignoring unknown setting '{}' in {}",
            key, CONFIG_FILE_PATH
        );
    }

    let mut exported = 0;
    for (key, value) in settings.recognized {
        if env::var(&key).is_err() {
            debug!("Setting env var from config file: {}", key);
            env::set_var(key, value);
            exported += 1;
        } else {
            debug!("Env var already set, keeping it over the file: {}", key);
        }
    }

    info!(
        "Loaded {} setting(s) from {}",
        exported, CONFIG_FILE_PATH
    );
    true
}
