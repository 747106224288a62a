//! Snapshot sharing between sessions.
//!
//! [`CollaborationManager`] persists the whole collection on every change
//! and relays snapshots written by other sessions. It absorbs every failure:
//! errors are logged and the operation is abandoned, never retried.
//!
//! File watchers report a session's own writes, sometimes late and more
//! than once, so the manager remembers the last few snapshots it wrote and
//! the last one it delivered, and drops watcher events carrying any of them.
//! [`Session`] wires a [`NoteStore`] to a manager.

use std::{
    collections::VecDeque,
    sync::{Arc, Mutex},
};

use chrono::{DateTime, Utc};
use log::{debug, error, info, trace, warn};
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, mpsc};

use crate::{
    decode_notes, encode_notes, Action, ChangeListener, Note, NoteStore, NotesState,
    SnapshotBackend, WatchGuard,
};

/// What a session does with snapshots written by other sessions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RemotePolicy {
    /// Report remote snapshots without touching local state.
    #[default]
    Observe,
    /// Replace local notes with the remote snapshot (last writer wins).
    Adopt,
}

/// Same-session notification fired after every successful save.
#[derive(Debug, Clone)]
pub struct SyncEvent {
    pub note_count: usize,
    pub written_at: DateTime<Utc>,
}

type ChangeCallback = Arc<dyn Fn(Vec<Note>) + Send + Sync>;

const RECENT_WRITES: usize = 8;

#[derive(Default)]
struct Seen {
    delivered: Option<String>,
    written: VecDeque<String>,
}

impl Seen {
    fn contains(&self, raw: &str) -> bool {
        self.delivered.as_deref() == Some(raw) || self.written.iter().any(|w| w == raw)
    }

    fn record_write(&mut self, raw: String) {
        if self.written.len() == RECENT_WRITES {
            self.written.pop_front();
        }
        self.written.push_back(raw);
    }
}

struct Shared<B> {
    backend: B,
    /// Snapshots this session recently wrote or last delivered.
    seen: Mutex<Seen>,
    on_change: Mutex<Option<ChangeCallback>>,
}

impl<B: SnapshotBackend> Shared<B> {
    /// Decodes `raw` (or the stored snapshot) and hands it to the callback.
    /// With `skip_seen`, a snapshot this session already wrote or delivered
    /// is dropped.
    fn deliver(&self, raw: Option<&str>, skip_seen: bool) {
        let raw = match raw {
            Some(raw) => raw.to_string(),
            None => match self.backend.read() {
                Ok(Some(raw)) => raw,
                Ok(None) => {
                    trace!("Nothing stored at {}", self.backend.describe());
                    return;
                }
                Err(e) => {
                    error!("Error syncing notes: {}", e);
                    return;
                }
            },
        };
        if raw.trim().is_empty() {
            return;
        }

        let Ok(mut seen) = self.seen.lock() else {
            error!("Error syncing notes: snapshot state lock poisoned");
            return;
        };
        if skip_seen && seen.contains(&raw) {
            trace!("Snapshot unchanged, not delivering");
            return;
        }

        let notes = match decode_notes(&raw) {
            Ok(notes) => notes,
            Err(e) => {
                error!("Error syncing notes: {}", e);
                return;
            }
        };
        seen.delivered = Some(raw);
        drop(seen);

        let callback = self.on_change.lock().ok().and_then(|cb| cb.clone());
        match callback {
            Some(callback) => {
                debug!("Delivering snapshot of {} notes", notes.len());
                callback(notes);
            }
            None => trace!("No change callback registered"),
        }
    }
}

/// Persists the notes collection and relays cross-session changes.
pub struct CollaborationManager<B> {
    shared: Arc<Shared<B>>,
    watch: Mutex<Option<WatchGuard>>,
    local_tx: broadcast::Sender<SyncEvent>,
}

impl<B: SnapshotBackend + 'static> CollaborationManager<B> {
    pub fn new(backend: B) -> Self {
        let (local_tx, _) = broadcast::channel(16);
        Self {
            shared: Arc::new(Shared {
                backend,
                seen: Mutex::new(Seen::default()),
                on_change: Mutex::new(None),
            }),
            watch: Mutex::new(None),
            local_tx,
        }
    }

    pub fn backend(&self) -> &B {
        &self.shared.backend
    }

    /// Registers `on_change` for snapshots written by other sessions and
    /// delivers the currently stored snapshot right away.
    pub fn start<F>(&self, on_change: F)
    where
        F: Fn(Vec<Note>) + Send + Sync + 'static,
    {
        self.stop();
        if let Ok(mut callback) = self.shared.on_change.lock() {
            *callback = Some(Arc::new(on_change));
        }

        let weak = Arc::downgrade(&self.shared);
        let listener: ChangeListener = Arc::new(move || {
            if let Some(shared) = weak.upgrade() {
                shared.deliver(None, true);
            }
        });

        match self.shared.backend.watch(listener) {
            Ok(guard) => {
                if let Ok(mut watch) = self.watch.lock() {
                    *watch = Some(guard);
                }
                info!(
                    "Collaboration started on {}",
                    self.shared.backend.describe()
                );
            }
            Err(e) => error!(
                "Failed to watch {}; remote changes will not be seen: {}",
                self.shared.backend.describe(),
                e
            ),
        }

        self.shared.deliver(None, false);
    }

    /// Delivers `raw`, or the stored snapshot when `None`.
    pub fn sync(&self, raw: Option<&str>) {
        self.shared.deliver(raw, false);
    }

    /// Serializes and writes the full collection, then notifies same-session
    /// subscribers.
    pub fn save_notes(&self, notes: &[Note]) {
        let raw = match encode_notes(notes) {
            Ok(raw) => raw,
            Err(e) => {
                error!("Error saving notes: {}", e);
                return;
            }
        };

        // Recorded before writing so the watcher ignores our own write.
        if let Ok(mut seen) = self.shared.seen.lock() {
            seen.record_write(raw.clone());
        }

        if let Err(e) = self.shared.backend.write(&raw) {
            error!("Error saving notes: {}", e);
            return;
        }
        debug!(
            "Saved {} notes to {}",
            notes.len(),
            self.shared.backend.describe()
        );

        let _ = self.local_tx.send(SyncEvent {
            note_count: notes.len(),
            written_at: Utc::now(),
        });
    }

    /// Receives a [`SyncEvent`] after each save made by this session.
    pub fn subscribe_local(&self) -> broadcast::Receiver<SyncEvent> {
        self.local_tx.subscribe()
    }

    /// Deregisters the watch and the change callback.
    pub fn stop(&self) {
        let guard = self.watch.lock().ok().and_then(|mut watch| watch.take());
        if guard.is_some() {
            info!(
                "Collaboration stopped on {}",
                self.shared.backend.describe()
            );
        }
        drop(guard);

        if let Ok(mut callback) = self.shared.on_change.lock() {
            *callback = None;
        }
    }
}

/// A running client: the note store, persisted through a
/// [`CollaborationManager`] after every change.
pub struct Session<B: SnapshotBackend + 'static> {
    store: NoteStore,
    manager: Arc<CollaborationManager<B>>,
    remote_rx: mpsc::UnboundedReceiver<Vec<Note>>,
    policy: RemotePolicy,
}

impl<B: SnapshotBackend + 'static> Session<B> {
    /// Starts collaboration on `backend` and hydrates the store from the
    /// snapshot delivered at start.
    pub fn open(backend: B, policy: RemotePolicy) -> Self {
        let manager = Arc::new(CollaborationManager::new(backend));
        let (remote_tx, mut remote_rx) = mpsc::unbounded_channel();
        manager.start(move |notes| {
            if remote_tx.send(notes).is_err() {
                trace!("Session closed, dropping snapshot");
            }
        });

        let mut store = NoteStore::new();
        while let Ok(notes) = remote_rx.try_recv() {
            store.apply(Action::Hydrate(notes));
        }
        info!("Session opened with {} notes", store.state().len());

        let effect_manager = Arc::clone(&manager);
        store.set_persist_effect(Box::new(move |notes| effect_manager.save_notes(notes)));

        Self {
            store,
            manager,
            remote_rx,
            policy,
        }
    }

    pub fn state(&self) -> &NotesState {
        self.store.state()
    }

    pub fn policy(&self) -> RemotePolicy {
        self.policy
    }

    pub fn manager(&self) -> &CollaborationManager<B> {
        &self.manager
    }

    /// Applies an action; a change to the notes is saved. Returns whether
    /// the notes changed.
    pub fn dispatch(&mut self, action: Action) -> bool {
        self.store.dispatch(action)
    }

    /// Applies every remote snapshot received so far. Returns how many were
    /// handled.
    pub fn drain_remote(&mut self) -> usize {
        let mut handled = 0;
        while let Ok(notes) = self.remote_rx.try_recv() {
            self.handle_remote(notes);
            handled += 1;
        }
        handled
    }

    /// Waits for the next remote snapshot, applies it and returns it.
    pub async fn next_remote(&mut self) -> Option<Vec<Note>> {
        let notes = self.remote_rx.recv().await?;
        self.handle_remote(notes.clone());
        Some(notes)
    }

    fn handle_remote(&mut self, notes: Vec<Note>) {
        match self.policy {
            RemotePolicy::Observe => {
                info!(
                    "Another session saved {} notes; local state left unchanged",
                    notes.len()
                );
            }
            RemotePolicy::Adopt => {
                info!("Adopting snapshot of {} notes from another session", notes.len());
                self.store.apply(Action::ReplaceNotes(notes));
            }
        }
    }

    /// Stops collaboration. Later dispatches are still saved.
    pub fn close(&mut self) {
        self.manager.stop();
        if self.drain_remote() > 0 {
            warn!("Discarded remote snapshots received while closing");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{MemoryBackend, NotesError, Result};

    fn collector() -> (Arc<Mutex<Vec<Vec<Note>>>>, impl Fn(Vec<Note>) + Send + Sync) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        (seen, move |notes| sink.lock().unwrap().push(notes))
    }

    struct BrokenBackend;

    impl SnapshotBackend for BrokenBackend {
        fn read(&self) -> Result<Option<String>> {
            Err(NotesError::ApplicationError {
                message: "read failed".into(),
            })
        }
        fn write(&self, _raw: &str) -> Result<()> {
            Err(NotesError::ApplicationError {
                message: "write failed".into(),
            })
        }
        fn watch(&self, _listener: ChangeListener) -> Result<WatchGuard> {
            Err(NotesError::ApplicationError {
                message: "watch failed".into(),
            })
        }
        fn describe(&self) -> String {
            "broken".into()
        }
    }

    #[test]
    fn start_delivers_stored_snapshot_once() {
        let shared = MemoryBackend::new();
        let writer = CollaborationManager::new(shared.session());
        writer.save_notes(&[Note::untitled()]);

        let reader = CollaborationManager::new(shared.session());
        let (seen, on_change) = collector();
        reader.start(on_change);
        assert_eq!(seen.lock().unwrap().len(), 1);
        assert_eq!(seen.lock().unwrap()[0].len(), 1);
    }

    #[test]
    fn start_with_nothing_stored_delivers_nothing() {
        let manager = CollaborationManager::new(MemoryBackend::new().session());
        let (seen, on_change) = collector();
        manager.start(on_change);
        assert!(seen.lock().unwrap().is_empty());
    }

    #[test]
    fn remote_writes_reach_other_sessions_not_the_writer() {
        let shared = MemoryBackend::new();
        let a = CollaborationManager::new(shared.session());
        let b = CollaborationManager::new(shared.session());
        let (a_seen, a_cb) = collector();
        let (b_seen, b_cb) = collector();
        a.start(a_cb);
        b.start(b_cb);

        a.save_notes(&[Note::untitled(), Note::untitled()]);
        assert!(a_seen.lock().unwrap().is_empty());
        assert_eq!(b_seen.lock().unwrap().len(), 1);
        assert_eq!(b_seen.lock().unwrap()[0].len(), 2);

        b.stop();
        a.save_notes(&[Note::untitled()]);
        assert_eq!(b_seen.lock().unwrap().len(), 1);
    }

    #[test]
    fn identical_snapshots_are_not_redelivered() {
        let shared = MemoryBackend::new();
        let reader = CollaborationManager::new(shared.session());
        let (seen, on_change) = collector();
        reader.start(on_change);

        let raw = encode_notes(&[Note::untitled()]).unwrap();
        shared.set_raw(&raw);
        shared.set_raw(&raw);
        assert_eq!(seen.lock().unwrap().len(), 1);

        // An explicit sync always delivers.
        reader.sync(Some(&raw));
        assert_eq!(seen.lock().unwrap().len(), 2);
    }

    #[test]
    fn late_events_for_own_writes_are_dropped() {
        let shared = MemoryBackend::new();
        let manager = CollaborationManager::new(shared.session());
        let (seen, on_change) = collector();
        manager.start(on_change);

        let ours = [Note::untitled()];
        manager.save_notes(&ours);
        let theirs = encode_notes(&[Note::untitled(), Note::untitled()]).unwrap();
        shared.set_raw(&theirs);
        assert_eq!(seen.lock().unwrap().len(), 1);

        // A watcher event for our earlier write arriving after theirs.
        let ours_raw = encode_notes(&ours).unwrap();
        manager.shared.deliver(Some(&ours_raw), true);
        assert_eq!(seen.lock().unwrap().len(), 1);
    }

    #[test]
    fn malformed_snapshots_are_swallowed() {
        let shared = MemoryBackend::new();
        shared.set_raw("{ not json");
        let manager = CollaborationManager::new(shared.session());
        let (seen, on_change) = collector();
        manager.start(on_change);
        shared.set_raw("[{\"id\": 3}]");
        manager.sync(Some("nope"));
        assert!(seen.lock().unwrap().is_empty());
    }

    #[test]
    fn backend_failures_never_escape() {
        let manager = CollaborationManager::new(BrokenBackend);
        let mut local = manager.subscribe_local();
        let (seen, on_change) = collector();
        manager.start(on_change);
        manager.save_notes(&[Note::untitled()]);
        manager.sync(None);
        manager.stop();
        assert!(seen.lock().unwrap().is_empty());
        assert!(local.try_recv().is_err());
    }

    #[test]
    fn saves_notify_same_session_subscribers() {
        let manager = CollaborationManager::new(MemoryBackend::new().session());
        let mut local = manager.subscribe_local();
        manager.save_notes(&[Note::untitled()]);
        let event = local.try_recv().unwrap();
        assert_eq!(event.note_count, 1);
    }

    #[test]
    fn session_hydrates_and_persists() {
        let shared = MemoryBackend::new();
        let mut first = Session::open(shared.session(), RemotePolicy::Observe);
        let note = Note::untitled();
        let id = note.id.clone();
        first.dispatch(Action::AddNote(note));
        first.dispatch(Action::UpdateNote {
            id: id.clone(),
            title: "X".into(),
            content: "<p>hi</p>".into(),
        });

        let later = Note::new("later".into(), "".into());
        let later_id = later.id.clone();
        first.dispatch(Action::AddNote(later));

        let second = Session::open(shared.session(), RemotePolicy::Observe);
        let loaded = second.state().get(&id).unwrap();
        assert_eq!(loaded.title, "X");
        assert_eq!(loaded.versions.len(), 2);
        assert_eq!(
            second.state().selected_note_id.as_deref(),
            Some(later_id.as_str())
        );
    }

    #[test]
    fn observe_policy_leaves_state_alone() {
        let shared = MemoryBackend::new();
        let mut writer = Session::open(shared.session(), RemotePolicy::Observe);
        let mut observer = Session::open(shared.session(), RemotePolicy::Observe);

        writer.dispatch(Action::AddNote(Note::untitled()));
        assert_eq!(observer.drain_remote(), 1);
        assert!(observer.state().is_empty());
    }

    #[test]
    fn adopt_policy_takes_last_writer() {
        let shared = MemoryBackend::new();
        let mut writer = Session::open(shared.session(), RemotePolicy::Observe);
        let mut adopter = Session::open(shared.session(), RemotePolicy::Adopt);
        adopter.dispatch(Action::AddNote(Note::new("mine".into(), "".into())));

        let theirs = Note::new("theirs".into(), "".into());
        let theirs_id = theirs.id.clone();
        writer.dispatch(Action::AddNote(theirs));

        assert_eq!(adopter.drain_remote(), 1);
        assert_eq!(adopter.state().len(), 1);
        assert!(adopter.state().get(&theirs_id).is_some());
    }

    #[tokio::test]
    async fn next_remote_waits_for_other_sessions() {
        let shared = MemoryBackend::new();
        let mut watcher = Session::open(shared.session(), RemotePolicy::Adopt);
        let mut writer = Session::open(shared.session(), RemotePolicy::Observe);

        writer.dispatch(Action::AddNote(Note::untitled()));
        let notes = watcher.next_remote().await.unwrap();
        assert_eq!(notes.len(), 1);
        assert_eq!(watcher.state().len(), 1);
    }
}
