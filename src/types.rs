//! Shared result alias and the CLI command set.
use std::path::PathBuf;

use clap::Subcommand;

use crate::NotesError;

/// A specialized Result type for collabnotes operations.
pub type Result<T> = std::result::Result<T, NotesError>;

/// Available subcommands for the collabnotes application
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Create a new note
    Create {
        /// Title of the note
        #[clap(short = 'T', long)]
        title: Option<String>,

        /// Content of the note, as HTML
        #[clap(short, long)]
        content: Option<String>,

        /// Path to a file containing the note's content
        #[clap(short, long)]
        file: Option<PathBuf>,

        /// Open content in editor before saving
        #[clap(short, long)]
        edit: bool,
    },

    /// List notes, most recently updated first
    List {
        /// Only notes whose title or content contains this text
        #[clap(short, long)]
        search: Option<String>,

        /// Limit the number of notes returned (0 for all)
        #[clap(short = 'n', long, default_value_t = 20)]
        limit: usize,

        /// Format output as JSON
        #[clap(short, long)]
        json: bool,
    },

    /// Fuzzy search notes by title or content
    Search {
        /// Search query text
        query: String,

        /// Limit the number of search results (0 for all)
        #[clap(short = 'n', long, default_value_t = 10)]
        limit: usize,

        /// Format output as JSON
        #[clap(short, long)]
        json: bool,
    },

    /// View a note by ID
    View {
        /// ID of the note to view
        id: String,

        /// Format output as raw JSON
        #[clap(short, long)]
        json: bool,
    },

    /// Edit an existing note, recording a new version
    Edit {
        /// ID of the note to edit
        id: String,

        /// New title for the note
        #[clap(short = 'T', long)]
        title: Option<String>,

        /// New content for the note
        #[clap(short, long)]
        content: Option<String>,

        /// Path to a file containing the new note content
        #[clap(short, long)]
        file: Option<PathBuf>,

        /// Open content in editor before saving
        #[clap(short, long)]
        edit: bool,
    },

    /// Delete a note by ID
    Delete {
        /// ID of the note to delete
        id: String,

        /// Skip confirmation prompt
        #[clap(short, long)]
        force: bool,
    },

    /// Show the version history of a note
    History {
        /// ID of the note
        id: String,

        /// Format output as JSON
        #[clap(short, long)]
        json: bool,
    },

    /// Show one version of a note
    ShowVersion {
        /// ID of the note
        id: String,

        /// Version ID or version number
        version: String,
    },

    /// Restore a note to an earlier version
    Restore {
        /// ID of the note
        id: String,

        /// Version ID or version number
        version: String,

        /// Skip confirmation prompt
        #[clap(short, long)]
        force: bool,
    },

    /// Print changes saved by other sessions until interrupted
    Watch,

    /// Configuration management
    Config {
        /// Show current configuration
        #[clap(short = 'S', long)]
        show: bool,

        /// Update a configuration setting (key=value)
        #[clap(short, long)]
        set: Option<String>,

        /// Reset configuration to defaults
        #[clap(short, long)]
        reset: bool,
    },
}
