use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use directories::ProjectDirs;
use log::{debug, info};
use serde::{Deserialize, Serialize};
use which::which;

use crate::{FileBackend, NotesError, RemotePolicy, Result};

/// Storage key used when none is configured.
pub const DEFAULT_STORAGE_KEY: &str = "collaborative_notes";

/// Application configuration settings.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Directory holding the notes snapshot
    pub data_dir: PathBuf,

    /// Name of the snapshot; the file is `<data_dir>/<storage_key>.json`
    pub storage_key: String,

    /// What to do with snapshots saved by other sessions
    pub remote_policy: RemotePolicy,

    /// Default editor command
    pub editor_command: Option<String>,

    /// Poll interval for watchers that cannot use native notifications
    pub watch_poll_interval_ms: u64,

    /// Characters of content shown in note listings
    pub preview_length: usize,
}

impl Default for Config {
    fn default() -> Self {
        let data_dir = project_dirs()
            .map(|dirs| dirs.data_dir().to_path_buf())
            .unwrap_or_else(|| PathBuf::from(".collabnotes"));

        Self {
            data_dir,
            storage_key: DEFAULT_STORAGE_KEY.to_string(),
            remote_policy: RemotePolicy::Observe,
            editor_command: None,
            watch_poll_interval_ms: 2000,
            preview_length: 100,
        }
    }
}

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("", "", "collabnotes")
}

impl Config {
    /// `config.json` in the platform configuration directory.
    pub fn default_path() -> PathBuf {
        project_dirs()
            .map(|dirs| dirs.config_dir().join("config.json"))
            .unwrap_or_else(|| PathBuf::from(".collabnotes/config.json"))
    }

    /// Reads the configuration at `path`, or defaults if it does not exist.
    pub fn load(path: &Path) -> Result<Config> {
        if !path.exists() {
            debug!("No config at {}, using defaults", path.display());
            return Ok(Config::default());
        }

        let raw = fs::read_to_string(path)?;
        serde_json::from_str(&raw).map_err(|e| NotesError::ConfigError {
            message: format!("invalid config {}: {}", path.display(), e),
        })
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent).map_err(|_| NotesError::DirectoryError {
                    path: parent.to_path_buf(),
                })?;
            }
        }
        fs::write(path, serde_json::to_string_pretty(self)?)?;
        info!("Configuration saved to {}", path.display());
        Ok(())
    }

    /// Applies a `key=value` assignment.
    pub fn set(&mut self, assignment: &str) -> Result<()> {
        let (key, value) = assignment
            .split_once('=')
            .map(|(k, v)| (k.trim(), v.trim()))
            .ok_or_else(|| NotesError::ConfigError {
                message: format!("expected key=value, got {:?}", assignment),
            })?;

        let invalid = |reason: &str| NotesError::ConfigError {
            message: format!("invalid value {:?} for {}: {}", value, key, reason),
        };

        match key {
            "data_dir" => self.data_dir = PathBuf::from(value),
            "storage_key" => {
                if value.is_empty() || value.contains(['/', '\\']) {
                    return Err(invalid("must be a non-empty file name"));
                }
                self.storage_key = value.to_string();
            }
            "remote_policy" => {
                self.remote_policy = match value {
                    "observe" => RemotePolicy::Observe,
                    "adopt" => RemotePolicy::Adopt,
                    _ => return Err(invalid("expected observe or adopt")),
                }
            }
            "editor_command" => {
                self.editor_command = (!value.is_empty()).then(|| value.to_string());
            }
            "watch_poll_interval_ms" => {
                self.watch_poll_interval_ms =
                    value.parse().map_err(|_| invalid("expected milliseconds"))?;
            }
            "preview_length" => {
                self.preview_length = value.parse().map_err(|_| invalid("expected a number"))?;
            }
            _ => {
                return Err(NotesError::ConfigError {
                    message: format!("unknown setting: {}", key),
                })
            }
        }
        Ok(())
    }

    /// The snapshot file backend described by this configuration.
    pub fn file_backend(&self) -> FileBackend {
        FileBackend::new(&self.data_dir, &self.storage_key)
            .with_poll_interval(Duration::from_millis(self.watch_poll_interval_ms))
    }

    // This method provides smart fallbacks when no editor is configured
    pub fn get_editor_command(&self) -> String {
        // First try the configured editor
        if let Some(editor) = &self.editor_command {
            return editor.clone();
        }

        // Then try environment variable
        if let Ok(editor) = std::env::var("EDITOR") {
            return editor;
        }

        // Fall back to platform defaults
        if cfg!(windows) {
            "notepad".to_string()
        } else if cfg!(target_os = "macos") {
            "open -W -t".to_string()
        } else {
            for editor in &["nano", "vim", "vi", "emacs"] {
                if which(editor).is_ok() {
                    return editor.to_string();
                }
            }
            "nano".to_string()
        }
    }
}
