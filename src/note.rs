//! Core data structures for the collabnotes application.
//!
//! A [`Note`] owns its full history of [`Version`] snapshots inline. Versions
//! are appended, never edited.
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::strip_html;

/// Title given to notes created without one.
pub const UNTITLED_NOTE_TITLE: &str = "Untitled Note";

/// Represents a single note in our system
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Note {
    /// Unique identifier for the note
    pub id: String,
    /// Note title
    pub title: String,
    /// Note content as HTML rich text
    pub content: String,
    /// When the note was created
    #[serde(with = "crate::codec::iso_millis")]
    pub created_at: DateTime<Utc>,
    /// Last modification time
    #[serde(with = "crate::codec::iso_millis")]
    pub updated_at: DateTime<Utc>,
    /// Snapshot history, oldest first
    #[serde(default)]
    pub versions: Vec<Version>,
}

/// An immutable snapshot of a note's title and content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Version {
    pub id: String,
    /// Identity of the owning note
    pub note_id: String,
    pub title: String,
    pub content: String,
    #[serde(with = "crate::codec::iso_millis")]
    pub timestamp: DateTime<Utc>,
    /// Sequential per note, starting at 1
    pub version_number: u32,
}

/// Generates a new opaque identifier.
pub fn generate_id() -> String {
    Uuid::new_v4().to_string()
}

impl Note {
    /// Creates a new note with the given title and content and no history
    pub fn new(title: String, content: String) -> Self {
        let now = Utc::now();

        Note {
            id: generate_id(),
            title,
            content,
            created_at: now,
            updated_at: now,
            versions: Vec::new(),
        }
    }

    /// The blank note produced by the "new note" action.
    pub fn untitled() -> Self {
        Self::new(UNTITLED_NOTE_TITLE.to_string(), String::new())
    }

    /// Version 1 built from the note's current fields and creation time.
    pub fn seed_version(&self) -> Version {
        Version::snapshot(
            &self.id,
            self.title.clone(),
            self.content.clone(),
            self.created_at,
            1,
        )
    }

    /// Number the next appended version will carry.
    pub fn next_version_number(&self) -> u32 {
        self.versions.len() as u32 + 1
    }

    pub fn latest_version(&self) -> Option<&Version> {
        self.versions.last()
    }

    pub fn find_version(&self, version_id: &str) -> Option<&Version> {
        self.versions.iter().find(|v| v.id == version_id)
    }

    pub fn find_version_by_number(&self, number: u32) -> Option<&Version> {
        self.versions.iter().find(|v| v.version_number == number)
    }

    /// Versions newest first. The first entry is the current version.
    pub fn history(&self) -> Vec<&Version> {
        let mut history: Vec<&Version> = self.versions.iter().collect();
        history.sort_by(|a, b| {
            b.timestamp
                .cmp(&a.timestamp)
                .then_with(|| b.version_number.cmp(&a.version_number))
        });
        history
    }

    /// Case-insensitive substring match against title or content.
    pub fn matches(&self, query: &str) -> bool {
        let query = query.to_lowercase();
        self.title.to_lowercase().contains(&query) || self.content.to_lowercase().contains(&query)
    }

    /// Plain-text preview of the content, at most `max_chars` characters.
    pub fn preview(&self, max_chars: usize) -> String {
        strip_html(&self.content).chars().take(max_chars).collect()
    }
}

impl Version {
    /// Builds a snapshot with a fresh identifier.
    pub fn snapshot(
        note_id: &str,
        title: String,
        content: String,
        timestamp: DateTime<Utc>,
        version_number: u32,
    ) -> Self {
        Version {
            id: generate_id(),
            note_id: note_id.to_string(),
            title,
            content,
            timestamp,
            version_number,
        }
    }
}
