//! Storage media for the notes snapshot.
//!
//! A backend holds one serialized snapshot under one key and reports writes
//! made by other sessions. Memory sessions are never told about their own
//! writes; a file watcher is, and the collaboration manager filters those.

use std::{
    fs,
    io::Write,
    path::{Path, PathBuf},
    sync::{Arc, Mutex},
    time::Duration,
};

use log::{debug, error, info, trace};
use notify::{EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tempfile::NamedTempFile;

use crate::{NotesError, Result};

/// Invoked after the snapshot has been written.
pub type ChangeListener = Arc<dyn Fn() + Send + Sync>;

/// Keeps a watch registration alive. Dropping it deregisters the listener.
pub struct WatchGuard {
    _inner: Box<dyn Send>,
}

impl WatchGuard {
    fn new(inner: impl Send + 'static) -> Self {
        Self {
            _inner: Box::new(inner),
        }
    }
}

/// Load/save/subscribe port for the notes snapshot.
pub trait SnapshotBackend: Send + Sync {
    /// The current raw snapshot, or `None` if it was never written.
    fn read(&self) -> Result<Option<String>>;

    /// Overwrites the snapshot.
    fn write(&self, raw: &str) -> Result<()>;

    /// Registers `listener` for writes to the snapshot.
    fn watch(&self, listener: ChangeListener) -> Result<WatchGuard>;

    /// Location shown in logs.
    fn describe(&self) -> String;
}

/// Stores the snapshot as a single JSON file.
pub struct FileBackend {
    path: PathBuf,
    poll_interval: Duration,
}

impl FileBackend {
    /// Uses `<dir>/<storage_key>.json` as the snapshot file.
    pub fn new(dir: &Path, storage_key: &str) -> Self {
        Self {
            path: dir.join(format!("{}.json", storage_key)),
            poll_interval: Duration::from_secs(2),
        }
    }

    /// Poll interval used by watchers that fall back to polling.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn dir(&self) -> &Path {
        self.path.parent().unwrap_or_else(|| Path::new("."))
    }

    fn ensure_dir(&self) -> Result<()> {
        let dir = self.dir();
        if !dir.exists() {
            debug!("Creating snapshot directory: {}", dir.display());
            fs::create_dir_all(dir).map_err(|e| {
                error!("Failed to create directory {}: {}", dir.display(), e);
                NotesError::DirectoryError {
                    path: dir.to_path_buf(),
                }
            })?;
        }
        Ok(())
    }
}

impl SnapshotBackend for FileBackend {
    fn read(&self) -> Result<Option<String>> {
        if !self.path.exists() {
            trace!("No snapshot at {}", self.path.display());
            return Ok(None);
        }
        let raw = fs::read_to_string(&self.path).map_err(|e| {
            error!("Failed to read snapshot {}: {}", self.path.display(), e);
            NotesError::Io(e)
        })?;
        Ok(Some(raw))
    }

    /// Writes through a temporary file in the same directory and renames it
    /// over the snapshot so readers never observe a partial file.
    fn write(&self, raw: &str) -> Result<()> {
        self.ensure_dir()?;

        let mut temp_file = NamedTempFile::new_in(self.dir()).map_err(|e| {
            error!("Failed to create temporary file: {}", e);
            NotesError::Io(e)
        })?;
        temp_file.write_all(raw.as_bytes())?;
        temp_file.flush()?;

        temp_file.persist(&self.path).map_err(|e| {
            error!(
                "Failed to persist file {}: {}",
                self.path.display(),
                e.error
            );
            NotesError::Io(e.error)
        })?;

        debug!("Wrote {} bytes to {}", raw.len(), self.path.display());
        Ok(())
    }

    fn watch(&self, listener: ChangeListener) -> Result<WatchGuard> {
        self.ensure_dir()?;

        let file_name = self.path.file_name().map(|n| n.to_os_string());
        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<notify::Event>| match res {
                Ok(event) => {
                    if !matches!(event.kind, EventKind::Create(_) | EventKind::Modify(_)) {
                        return;
                    }
                    let touches_snapshot = event
                        .paths
                        .iter()
                        .any(|p| p.file_name().map(|n| n.to_os_string()) == file_name);
                    if touches_snapshot {
                        trace!("Snapshot file event: {:?}", event.kind);
                        listener();
                    }
                }
                Err(e) => error!("File system watcher error: {}", e),
            },
            notify::Config::default().with_poll_interval(self.poll_interval),
        )?;

        watcher.watch(self.dir(), RecursiveMode::NonRecursive)?;
        info!("Watching snapshot file {}", self.path.display());

        Ok(WatchGuard::new(watcher))
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}

#[derive(Default)]
struct MemorySlot {
    value: Option<String>,
    listeners: Vec<(u64, u64, ChangeListener)>,
    next_id: u64,
}

/// An in-process snapshot shared between any number of sessions.
#[derive(Clone, Default)]
pub struct MemoryBackend {
    slot: Arc<Mutex<MemorySlot>>,
}

/// One session's handle onto a [`MemoryBackend`].
pub struct MemorySession {
    backend: MemoryBackend,
    session_id: u64,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Opens a new session handle. Its writes notify every other session.
    pub fn session(&self) -> MemorySession {
        MemorySession {
            backend: self.clone(),
            session_id: self.allocate_id(),
        }
    }

    /// The raw snapshot, bypassing any session.
    pub fn raw(&self) -> Option<String> {
        self.slot.lock().ok().and_then(|slot| slot.value.clone())
    }

    /// Writes from outside any session, notifying all of them.
    pub fn set_raw(&self, raw: &str) {
        self.store(None, raw);
    }

    fn allocate_id(&self) -> u64 {
        let mut slot = self.slot.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        slot.next_id += 1;
        slot.next_id
    }

    fn store(&self, writer: Option<u64>, raw: &str) {
        let to_notify: Vec<ChangeListener> = match self.slot.lock() {
            Ok(mut slot) => {
                slot.value = Some(raw.to_string());
                slot.listeners
                    .iter()
                    .filter(|(session, _, _)| Some(*session) != writer)
                    .map(|(_, _, listener)| Arc::clone(listener))
                    .collect()
            }
            Err(e) => {
                error!("Memory snapshot lock poisoned: {}", e);
                return;
            }
        };

        // The lock is released before listeners run since they read the slot.
        for listener in to_notify {
            listener();
        }
    }
}

struct MemoryRegistration {
    slot: Arc<Mutex<MemorySlot>>,
    listener_id: u64,
}

impl Drop for MemoryRegistration {
    fn drop(&mut self) {
        if let Ok(mut slot) = self.slot.lock() {
            slot.listeners.retain(|(_, id, _)| *id != self.listener_id);
        }
    }
}

impl SnapshotBackend for MemorySession {
    fn read(&self) -> Result<Option<String>> {
        self.backend
            .slot
            .lock()
            .map(|slot| slot.value.clone())
            .map_err(|e| NotesError::ApplicationError {
                message: format!("Memory snapshot lock poisoned: {}", e),
            })
    }

    fn write(&self, raw: &str) -> Result<()> {
        self.backend.store(Some(self.session_id), raw);
        Ok(())
    }

    fn watch(&self, listener: ChangeListener) -> Result<WatchGuard> {
        let listener_id = self.backend.allocate_id();
        let mut slot = self
            .backend
            .slot
            .lock()
            .map_err(|e| NotesError::ApplicationError {
                message: format!("Memory snapshot lock poisoned: {}", e),
            })?;
        slot.listeners.push((self.session_id, listener_id, listener));

        Ok(WatchGuard::new(MemoryRegistration {
            slot: Arc::clone(&self.backend.slot),
            listener_id,
        }))
    }

    fn describe(&self) -> String {
        format!("memory session {}", self.session_id)
    }
}
