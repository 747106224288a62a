//! In-memory note state and the reducer that evolves it.
//!
//! [`NotesState`] is an immutable value: every operation takes the current
//! state and returns the next one. Operations that reference a missing note
//! or version return an unchanged copy. [`NoteStore`] is the container the
//! front end holds on to; it swaps states and runs the persistence effect.

use chrono::Utc;
use log::{debug, info, trace};

use crate::{Note, Version};

/// A state transition understood by [`NotesState::reduce`].
#[derive(Debug, Clone)]
pub enum Action {
    AddNote(Note),
    UpdateNote {
        id: String,
        title: String,
        content: String,
    },
    DeleteNote(String),
    SelectNote(Option<String>),
    AddVersion {
        note_id: String,
        version: Version,
    },
    RestoreVersion {
        note_id: String,
        version_id: String,
    },
    /// Add loaded notes that are not present yet, selecting the last one.
    Hydrate(Vec<Note>),
    /// Replace the whole collection with a snapshot written elsewhere.
    ReplaceNotes(Vec<Note>),
}

/// The full client state: every note plus the selected note identity.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NotesState {
    pub notes: Vec<Note>,
    pub selected_note_id: Option<String>,
}

impl NotesState {
    /// Applies an action and returns the resulting state.
    pub fn reduce(&self, action: Action) -> NotesState {
        match action {
            Action::AddNote(note) => self.add_note(note),
            Action::UpdateNote { id, title, content } => self.update_note(&id, title, content),
            Action::DeleteNote(id) => self.delete_note(&id),
            Action::SelectNote(id) => self.select_note(id.as_deref()),
            Action::AddVersion { note_id, version } => self.add_version(&note_id, version),
            Action::RestoreVersion {
                note_id,
                version_id,
            } => self.restore_version(&note_id, &version_id),
            Action::Hydrate(notes) => self.hydrate(notes),
            Action::ReplaceNotes(notes) => self.replace_notes(notes),
        }
    }

    /// Inserts a note and selects it. A note without history gets version 1.
    ///
    /// Duplicate identities are not rejected.
    pub fn add_note(&self, note: Note) -> NotesState {
        let note = with_seed_version(note);
        debug!("Adding note {} with {} versions", note.id, note.versions.len());

        let mut notes = self.notes.clone();
        let selected = note.id.clone();
        notes.push(note);

        NotesState {
            notes,
            selected_note_id: Some(selected),
        }
    }

    /// Replaces title and content and records the edit as a new version.
    pub fn update_note(
        &self,
        id: &str,
        title: impl Into<String>,
        content: impl Into<String>,
    ) -> NotesState {
        let Some(note) = self.get(id) else {
            debug!("Ignoring update for missing note {}", id);
            return self.clone();
        };

        let (title, content) = (title.into(), content.into());
        let now = Utc::now();
        let version = Version::snapshot(
            id,
            title.clone(),
            content.clone(),
            now,
            note.next_version_number(),
        );
        trace!("Note {} now at version {}", id, version.version_number);

        self.map_note(id, |n| Note {
            title: title.clone(),
            content: content.clone(),
            updated_at: now,
            versions: appended(&n.versions, version.clone()),
            ..n.clone()
        })
    }

    /// Removes a note, clearing the selection if it pointed at it.
    pub fn delete_note(&self, id: &str) -> NotesState {
        let notes: Vec<Note> = self.notes.iter().filter(|n| n.id != id).cloned().collect();
        if notes.len() == self.notes.len() {
            debug!("Ignoring delete for missing note {}", id);
        }

        let selected_note_id = match &self.selected_note_id {
            Some(selected) if selected == id => None,
            other => other.clone(),
        };

        NotesState {
            notes,
            selected_note_id,
        }
    }

    /// Sets the selection without checking that the note exists.
    pub fn select_note(&self, id: Option<&str>) -> NotesState {
        NotesState {
            notes: self.notes.clone(),
            selected_note_id: id.map(str::to_string),
        }
    }

    /// Appends a caller-built version verbatim. Title, content and
    /// `updated_at` are left alone.
    pub fn add_version(&self, note_id: &str, version: Version) -> NotesState {
        if self.get(note_id).is_none() {
            debug!("Ignoring version for missing note {}", note_id);
            return self.clone();
        }

        self.map_note(note_id, |n| Note {
            versions: appended(&n.versions, version.clone()),
            ..n.clone()
        })
    }

    /// Copies an old snapshot back onto the note and logs the restore as a
    /// new version.
    pub fn restore_version(&self, note_id: &str, version_id: &str) -> NotesState {
        let Some(note) = self.get(note_id) else {
            debug!("Ignoring restore for missing note {}", note_id);
            return self.clone();
        };
        let Some(source) = note.find_version(version_id) else {
            debug!(
                "Ignoring restore of missing version {} on note {}",
                version_id, note_id
            );
            return self.clone();
        };

        let now = Utc::now();
        let restored = Version::snapshot(
            note_id,
            source.title.clone(),
            source.content.clone(),
            now,
            note.next_version_number(),
        );
        info!(
            "Restoring note {} to version {} as version {}",
            note_id, source.version_number, restored.version_number
        );

        self.map_note(note_id, |n| Note {
            title: restored.title.clone(),
            content: restored.content.clone(),
            updated_at: now,
            versions: appended(&n.versions, restored.clone()),
            ..n.clone()
        })
    }

    /// Adds every loaded note whose identity is not present yet. Like
    /// [`add_note`](Self::add_note), each addition takes the selection, so
    /// the last note added ends up selected. Nothing added, nothing changes.
    pub fn hydrate(&self, loaded: Vec<Note>) -> NotesState {
        let mut notes = self.notes.clone();
        let mut selected_note_id = self.selected_note_id.clone();
        let mut added = 0;
        for note in loaded {
            if notes.iter().any(|n| n.id == note.id) {
                continue;
            }
            selected_note_id = Some(note.id.clone());
            notes.push(with_seed_version(note));
            added += 1;
        }
        debug!("Hydrated {} notes", added);

        NotesState {
            notes,
            selected_note_id,
        }
    }

    /// Swaps in a whole collection. The selection survives only if the
    /// selected note is part of it.
    pub fn replace_notes(&self, notes: Vec<Note>) -> NotesState {
        let selected_note_id = self
            .selected_note_id
            .as_ref()
            .filter(|id| notes.iter().any(|n| &n.id == *id))
            .cloned();

        NotesState {
            notes,
            selected_note_id,
        }
    }

    pub fn get(&self, id: &str) -> Option<&Note> {
        self.notes.iter().find(|n| n.id == id)
    }

    pub fn selected_note(&self) -> Option<&Note> {
        self.selected_note_id.as_deref().and_then(|id| self.get(id))
    }

    pub fn len(&self) -> usize {
        self.notes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.notes.is_empty()
    }

    /// Case-insensitive substring match over title and content.
    pub fn search(&self, query: &str) -> Vec<&Note> {
        self.notes.iter().filter(|n| n.matches(query)).collect()
    }

    /// Notes ordered by most recent update first.
    pub fn sorted_by_updated(&self) -> Vec<&Note> {
        let mut notes: Vec<&Note> = self.notes.iter().collect();
        notes.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        notes
    }

    fn map_note(&self, id: &str, f: impl Fn(&Note) -> Note) -> NotesState {
        NotesState {
            notes: self
                .notes
                .iter()
                .map(|n| if n.id == id { f(n) } else { n.clone() })
                .collect(),
            selected_note_id: self.selected_note_id.clone(),
        }
    }
}

fn with_seed_version(mut note: Note) -> Note {
    if note.versions.is_empty() {
        let seed = note.seed_version();
        note.versions.push(seed);
    }
    note
}

fn appended(versions: &[Version], version: Version) -> Vec<Version> {
    let mut versions = versions.to_vec();
    versions.push(version);
    versions
}

/// Called with the full collection after every change.
pub type PersistEffect = Box<dyn FnMut(&[Note]) + Send>;

/// Holds the current [`NotesState`] and persists changes.
#[derive(Default)]
pub struct NoteStore {
    state: NotesState,
    persist: Option<PersistEffect>,
}

impl NoteStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Installs the effect run after each dispatched change to the notes.
    pub fn set_persist_effect(&mut self, effect: PersistEffect) {
        self.persist = Some(effect);
    }

    pub fn state(&self) -> &NotesState {
        &self.state
    }

    /// Applies an action without persisting. Returns whether the notes
    /// collection changed.
    pub fn apply(&mut self, action: Action) -> bool {
        let next = self.state.reduce(action);
        let changed = next.notes != self.state.notes;
        self.state = next;
        changed
    }

    /// Applies an action and persists the collection if it changed.
    pub fn dispatch(&mut self, action: Action) -> bool {
        let changed = self.apply(action);
        if changed {
            if let Some(persist) = self.persist.as_mut() {
                persist(&self.state.notes);
            }
        }
        changed
    }
}
