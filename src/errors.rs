//! Error types for the collabnotes application.
//!
//! The note store itself never fails: missing entities are silent no-ops.
//! These variants cover the snapshot backends, configuration and the CLI.

use std::{io, path::PathBuf};

use thiserror::Error;

/// The main error type for the collabnotes application.
#[derive(Error, Debug)]
pub enum NotesError {
    /// Errors related to file I/O operations.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Errors related to serialization/deserialization operations.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The snapshot file watcher could not be created or attached.
    #[error("Watch error: {0}")]
    WatchError(#[from] notify::Error),

    /// Note was not found when performing an operation.
    #[error("Note not found: {id}")]
    NoteNotFound { id: String },

    /// Version was not found in the history of a note.
    #[error("Version {version} not found for note {note_id}")]
    VersionNotFound { note_id: String, version: String },

    /// Invalid snapshot or input format.
    #[error("Invalid format: {message}")]
    InvalidFormat { message: String },

    /// Errors related to configuration.
    #[error("Configuration error: {message}")]
    ConfigError { message: String },

    /// Directory creation or access failed.
    #[error("Failed to create or access directory: {path}")]
    DirectoryError { path: PathBuf },

    /// An edit was submitted that changes neither title nor content.
    #[error("No changes to save for note {id}")]
    NoChanges { id: String },

    /// file not found
    #[error("File not found: {file_path}")]
    FileNotFound { file_path: String },

    /// The external editor could not be launched or exited with a failure.
    #[error("{message}")]
    EditorError { message: String },

    /// Generic application error with a custom message.
    #[error("{message}")]
    ApplicationError { message: String },
}
