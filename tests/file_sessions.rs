use std::{fs, time::Duration};

use collabnotes::{
    Action, Config, FileBackend, Note, RemotePolicy, Session, SnapshotBackend,
    UNTITLED_NOTE_TITLE,
};

fn backend(dir: &tempfile::TempDir) -> FileBackend {
    FileBackend::new(dir.path(), "collaborative_notes").with_poll_interval(Duration::from_millis(100))
}

#[test]
fn reopened_session_sees_saved_history() {
    let dir = tempfile::tempdir().unwrap();

    let note = Note::untitled();
    let id = note.id.clone();
    {
        let mut session = Session::open(backend(&dir), RemotePolicy::Observe);
        session.dispatch(Action::AddNote(note));
        session.dispatch(Action::UpdateNote {
            id: id.clone(),
            title: "X".into(),
            content: "<p>hi</p>".into(),
        });
        let first = session.state().get(&id).unwrap().versions[0].id.clone();
        session.dispatch(Action::RestoreVersion {
            note_id: id.clone(),
            version_id: first,
        });
        session.close();
    }

    let reopened = Session::open(backend(&dir), RemotePolicy::Observe);
    let note = reopened.state().get(&id).unwrap();
    assert_eq!(note.title, UNTITLED_NOTE_TITLE);
    let numbers: Vec<u32> = note.versions.iter().map(|v| v.version_number).collect();
    assert_eq!(numbers, vec![1, 2, 3]);
    assert_eq!(note.versions[1].title, "X");
}

#[test]
fn deleting_the_last_note_is_persisted() {
    let dir = tempfile::tempdir().unwrap();
    let note = Note::untitled();
    let id = note.id.clone();

    let mut session = Session::open(backend(&dir), RemotePolicy::Observe);
    session.dispatch(Action::AddNote(note));
    session.dispatch(Action::DeleteNote(id.clone()));
    session.dispatch(Action::DeleteNote(id));
    session.close();

    let reopened = Session::open(backend(&dir), RemotePolicy::Observe);
    assert!(reopened.state().is_empty());
}

#[test]
fn corrupt_snapshot_is_ignored_until_overwritten() {
    let dir = tempfile::tempdir().unwrap();
    let store = backend(&dir);
    fs::write(store.path(), "{ definitely not notes").unwrap();

    let mut session = Session::open(backend(&dir), RemotePolicy::Observe);
    assert!(session.state().is_empty());

    session.dispatch(Action::AddNote(Note::new("fresh".into(), "".into())));
    session.close();

    let raw = store.read().unwrap().unwrap();
    assert!(raw.contains("\"fresh\""));
}

#[test]
fn config_points_sessions_at_the_same_file() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = Config::default();
    config.data_dir = dir.path().to_path_buf();

    let mut writer = Session::open(config.file_backend(), config.remote_policy);
    writer.dispatch(Action::AddNote(Note::untitled()));
    writer.close();

    let reader = Session::open(config.file_backend(), config.remote_policy);
    assert_eq!(reader.state().len(), 1);
}

#[test]
fn own_writes_are_not_reported_as_remote() {
    let dir = tempfile::tempdir().unwrap();
    let mut session = Session::open(backend(&dir), RemotePolicy::Adopt);

    for title in ["one", "two", "three"] {
        session.dispatch(Action::AddNote(Note::new(title.into(), "".into())));
    }
    std::thread::sleep(Duration::from_millis(500));

    assert_eq!(session.drain_remote(), 0);
    assert_eq!(session.state().len(), 3);
    session.close();
}

#[tokio::test]
async fn watching_session_adopts_writes_from_another_process_view() {
    let dir = tempfile::tempdir().unwrap();
    let mut watcher = Session::open(backend(&dir), RemotePolicy::Adopt);
    let mut writer = Session::open(backend(&dir), RemotePolicy::Observe);

    let note = Note::new("shared".into(), "<p>from elsewhere</p>".into());
    let id = note.id.clone();
    writer.dispatch(Action::AddNote(note));

    let received = tokio::time::timeout(Duration::from_secs(10), watcher.next_remote())
        .await
        .expect("no change notification within 10s")
        .unwrap();
    assert_eq!(received.len(), 1);
    assert_eq!(watcher.state().get(&id).unwrap().title, "shared");

    watcher.close();
    writer.close();
}
