//! CLI module for the collabnotes application
//!
//! This module handles the command-line interface for interacting with a
//! notes [`Session`].
use std::{
    fs::{read_to_string, OpenOptions},
    io::{stdin, stdout, Write},
    path::{Path, PathBuf},
    process::Command,
};

use chrono::Utc;
use log::{debug, info};
use shell_words::split;
use tempfile::Builder;

use crate::{
    format_date, format_relative_time, Action, Commands, Config, NotesError, Note, RemotePolicy,
    Result, Session, SnapshotBackend, Version, UNTITLED_NOTE_TITLE,
};

/// CLI Application handler - processes CLI commands against a notes session
pub struct App<B: SnapshotBackend + 'static> {
    /// The running notes session
    session: Session<B>,

    /// Application configuration
    config: Config,

    /// Where the configuration is saved
    config_path: PathBuf,

    /// Whether to display verbose output
    verbose: bool,
}

impl<B: SnapshotBackend + 'static> App<B> {
    /// Create a new CLI application around an open session
    pub fn new(session: Session<B>, config: Config, config_path: PathBuf, verbose: bool) -> Self {
        Self {
            session,
            config,
            config_path,
            verbose,
        }
    }

    pub fn session(&self) -> &Session<B> {
        &self.session
    }

    /// Stops collaboration; called once the command has finished.
    pub fn shutdown(&mut self) {
        self.session.close();
    }

    /// Run the CLI application with the given command
    pub async fn run(&mut self, command: Commands) -> Result<()> {
        match command {
            Commands::Create {
                title,
                content,
                file,
                edit,
            } => self.create_note(title, content, file, edit)?,

            Commands::List {
                search,
                limit,
                json,
            } => self.list_notes(search, limit, json)?,

            Commands::Search { query, limit, json } => self.handle_search(&query, limit, json)?,

            Commands::View { id, json } => self.view_note(&id, json)?,

            Commands::Edit {
                id,
                title,
                content,
                file,
                edit,
            } => self.handle_edit(id, title, content, file, edit)?,

            Commands::Delete { id, force } => self.handle_delete(id, force)?,

            Commands::History { id, json } => self.show_history(&id, json)?,

            Commands::ShowVersion { id, version } => self.show_version(&id, &version)?,

            Commands::Restore { id, version, force } => {
                self.handle_restore(id, &version, force)?
            }

            Commands::Watch => self.watch().await?,

            Commands::Config { show, set, reset } => self.handle_config(show, set, reset)?,
        }

        Ok(())
    }

    fn create_note(
        &mut self,
        title: Option<String>,
        content: Option<String>,
        file: Option<PathBuf>,
        open_editor: bool,
    ) -> Result<()> {
        check_content_sources(&content, &file, open_editor)?;
        let title = title.unwrap_or_else(|| UNTITLED_NOTE_TITLE.to_string());

        let note_content = match (content, file) {
            (Some(c), _) => c,
            (_, Some(file_path)) => read_content_file(&file_path)?,
            (None, None) if open_editor => self.open_editor_for_content(&title, "")?,
            (None, None) => String::new(),
        };

        let note = Note::new(title, note_content);
        let id = note.id.clone();
        self.session.dispatch(Action::AddNote(note));

        println!("Note created with ID: {}", id);
        Ok(())
    }

    /// List notes in sidebar order, optionally filtered by a search term
    fn list_notes(&self, search: Option<String>, limit: usize, json: bool) -> Result<()> {
        let mut notes: Vec<&Note> = self
            .session
            .state()
            .sorted_by_updated()
            .into_iter()
            .filter(|note| search.as_deref().map_or(true, |q| note.matches(q)))
            .collect();

        if notes.is_empty() {
            match search {
                Some(_) => println!("No notes found"),
                None => println!("No notes yet. Create one!"),
            }
            return Ok(());
        }

        let total = notes.len();
        if limit > 0 && notes.len() > limit {
            notes.truncate(limit);
        }

        if json {
            self.display_notes_json(&notes)?;
        } else {
            self.display_notes_text(&notes);
            println!(
                "\nShowing {} of {} note{}",
                notes.len(),
                total,
                if total == 1 { "" } else { "s" }
            );
        }
        Ok(())
    }

    /// Display notes in JSON format
    fn display_notes_json(&self, notes: &[&Note]) -> Result<()> {
        let simplified_notes: Vec<serde_json::Value> = notes
            .iter()
            .map(|note| {
                serde_json::json!({
                    "id": note.id,
                    "title": note.title,
                    "preview": note.preview(self.config.preview_length),
                    "createdAt": note.created_at.to_rfc3339(),
                    "updatedAt": note.updated_at.to_rfc3339(),
                    "versions": note.versions.len(),
                })
            })
            .collect();

        println!("{}", serde_json::to_string_pretty(&simplified_notes)?);
        Ok(())
    }

    /// Display notes in text format
    fn display_notes_text(&self, notes: &[&Note]) {
        let term_width = terminal_width();
        let selected = self.session.state().selected_note_id.as_deref();
        let now = Utc::now();

        for (i, note) in notes.iter().enumerate() {
            if i > 0 {
                println!("{}", "-".repeat(term_width.min(50)));
            }

            let marker = if Some(note.id.as_str()) == selected { "* " } else { "" };
            println!("{}{}", marker, console::style(&note.title).bold());
            println!(
                "ID: {} | Updated {}",
                note.id,
                format_relative_time(&note.updated_at, &now)
            );

            let preview = note.preview(self.config.preview_length);
            if !preview.trim().is_empty() {
                println!("{}", console::style(preview).dim());
            }
        }
    }

    fn handle_search(&self, query: &str, limit: usize, json: bool) -> Result<()> {
        use fuzzy_matcher::skim::SkimMatcherV2;
        use fuzzy_matcher::FuzzyMatcher;

        info!("Searching notes with query: '{}'", query);
        let matcher = SkimMatcherV2::default();

        let mut scored: Vec<(i64, &Note)> = self
            .session
            .state()
            .notes
            .iter()
            .filter_map(|note| {
                let title_score = matcher.fuzzy_match(&note.title, query).unwrap_or(0);
                let content_score = matcher
                    .fuzzy_match(&crate::strip_html(&note.content), query)
                    .unwrap_or(0);
                // Title matches are weighted more heavily
                let score = title_score * 2 + content_score;
                (score > 0).then_some((score, note))
            })
            .collect();
        scored.sort_by(|a, b| b.0.cmp(&a.0));

        let mut results: Vec<&Note> = scored.into_iter().map(|(_, note)| note).collect();
        if limit > 0 && results.len() > limit {
            results.truncate(limit);
        }

        if results.is_empty() {
            println!("No notes found matching query: \"{}\"", query);
            return Ok(());
        }

        if json {
            self.display_notes_json(&results)?;
        } else {
            self.display_notes_text(&results);
            println!("\nFound {} matching notes.", results.len());
        }
        Ok(())
    }

    fn view_note(&self, id: &str, json: bool) -> Result<()> {
        let note = self.find_note(id)?;

        if json {
            println!("{}", serde_json::to_string_pretty(note)?);
            return Ok(());
        }

        let now = Utc::now();
        println!("{}", console::style(&note.title).bold());
        println!("ID:      {}", note.id);
        println!(
            "Created: {} ({})",
            format_date(&note.created_at),
            format_relative_time(&note.created_at, &now)
        );
        println!(
            "Updated: {} ({})",
            format_date(&note.updated_at),
            format_relative_time(&note.updated_at, &now)
        );
        println!("Versions: {}", note.versions.len());
        println!("\n{}", note.content);
        Ok(())
    }

    fn handle_edit(
        &mut self,
        id: String,
        title: Option<String>,
        content: Option<String>,
        file: Option<PathBuf>,
        open_editor: bool,
    ) -> Result<()> {
        check_content_sources(&content, &file, open_editor)?;
        let note = self.find_note(&id)?.clone();

        let new_title = title.unwrap_or_else(|| note.title.clone());
        let new_content = match (content, file) {
            (Some(c), _) => c,
            (_, Some(file_path)) => read_content_file(&file_path)?,
            (None, None) if open_editor => self.open_editor_for_content(&new_title, &note.content)?,
            (None, None) => note.content.clone(),
        };

        if new_title == note.title && new_content == note.content {
            return Err(NotesError::NoChanges { id });
        }

        self.session.dispatch(Action::UpdateNote {
            id: id.clone(),
            title: new_title,
            content: new_content,
        });

        let version = self
            .session
            .state()
            .get(&id)
            .and_then(|n| n.latest_version())
            .map_or(0, |v| v.version_number);
        println!("Saved note {} as version {}", id, version);
        Ok(())
    }

    fn handle_delete(&mut self, id: String, force: bool) -> Result<()> {
        let note = self.find_note(&id)?.clone();

        if !force {
            println!("You are about to delete the following note:");
            println!("ID:       {}", note.id);
            println!("Title:    {}", note.title);
            println!("Created:  {}", format_date(&note.created_at));
            println!("Versions: {}", note.versions.len());

            let preview = note.preview(self.config.preview_length);
            if !preview.is_empty() {
                println!("\nContent preview:\n{}", preview);
            }

            println!("\nThis action cannot be undone!");
            if !confirm("Are you sure you want to delete this note?")? {
                println!("Deletion cancelled.");
                return Ok(());
            }
        }

        self.session.dispatch(Action::DeleteNote(id));
        println!(
            "Note '{}' ({}) has been permanently deleted.",
            note.title, note.id
        );
        Ok(())
    }

    fn show_history(&self, id: &str, json: bool) -> Result<()> {
        let note = self.find_note(id)?;
        let history = note.history();

        if json {
            println!("{}", serde_json::to_string_pretty(&history)?);
            return Ok(());
        }

        println!(
            "{} - {} {}",
            console::style(&note.title).bold(),
            history.len(),
            if history.len() == 1 { "version" } else { "versions" }
        );

        if history.is_empty() {
            println!("No version history yet. Start editing to create versions.");
            return Ok(());
        }

        let now = Utc::now();
        for (index, version) in history.iter().enumerate() {
            let current = if index == 0 {
                format!(" {}", console::style("Current").cyan())
            } else {
                String::new()
            };
            println!(
                "\nVersion {}{}\n  {} ({})\n  {}\n  id: {}",
                version.version_number,
                current,
                format_date(&version.timestamp),
                format_relative_time(&version.timestamp, &now),
                version.title,
                version.id
            );
        }
        Ok(())
    }

    fn show_version(&self, id: &str, key: &str) -> Result<()> {
        let note = self.find_note(id)?;
        let version = resolve_version(note, key)?;

        println!(
            "Version {} of {}",
            version.version_number,
            console::style(&note.title).bold()
        );
        println!("Saved: {}", format_date(&version.timestamp));
        println!("Title: {}", version.title);
        println!("\n{}", version.content);
        Ok(())
    }

    fn handle_restore(&mut self, id: String, key: &str, force: bool) -> Result<()> {
        let note = self.find_note(&id)?;
        let version = resolve_version(note, key)?.clone();

        if note.history().first().map(|v| v.id.as_str()) == Some(version.id.as_str()) {
            return Err(NotesError::ApplicationError {
                message: format!("Version {} is already current", version.version_number),
            });
        }

        if !force {
            println!(
                "Restoring version {} (\"{}\", saved {}).",
                version.version_number,
                version.title,
                format_date(&version.timestamp)
            );
            if !confirm(
                "Are you sure you want to restore this version? This will replace the current content.",
            )? {
                println!("Restore cancelled.");
                return Ok(());
            }
        }

        self.session.dispatch(Action::RestoreVersion {
            note_id: id.clone(),
            version_id: version.id.clone(),
        });

        let recorded = self
            .session
            .state()
            .get(&id)
            .and_then(|n| n.latest_version())
            .map_or(0, |v| v.version_number);
        println!(
            "Restored version {} of note {} as version {}",
            version.version_number, id, recorded
        );
        Ok(())
    }

    async fn watch(&mut self) -> Result<()> {
        println!(
            "Watching {} for changes from other sessions. Press Ctrl-C to stop.",
            self.session.manager().backend().describe()
        );

        loop {
            tokio::select! {
                remote = self.session.next_remote() => match remote {
                    Some(notes) => {
                        let now = Utc::now();
                        println!(
                            "[{}] another session saved {} note{}",
                            format_date(&now),
                            notes.len(),
                            if notes.len() == 1 { "" } else { "s" }
                        );
                        if self.session.policy() == RemotePolicy::Adopt {
                            println!("  local copy replaced with their snapshot");
                        }
                        if self.verbose {
                            for note in &notes {
                                println!("  {} ({} versions)", note.title, note.versions.len());
                            }
                        }
                    }
                    None => break,
                },
                _ = tokio::signal::ctrl_c() => {
                    info!("Interrupted, stopping watch");
                    break;
                }
            }
        }
        Ok(())
    }

    fn handle_config(&mut self, show: bool, set: Option<String>, reset: bool) -> Result<()> {
        if reset {
            self.config = Config::default();
            self.config.save(&self.config_path)?;
            println!("Configuration reset to defaults.");
        }

        if let Some(assignment) = set {
            self.config.set(&assignment)?;
            self.config.save(&self.config_path)?;
            println!("Updated {}", assignment);
        }

        if show || (!reset && self.config_path.exists()) {
            println!("# {}", self.config_path.display());
            println!("{}", serde_json::to_string_pretty(&self.config)?);
        }
        Ok(())
    }

    fn find_note(&self, id: &str) -> Result<&Note> {
        self.session
            .state()
            .get(id)
            .ok_or_else(|| NotesError::NoteNotFound { id: id.to_string() })
    }

    fn open_editor_for_content(&self, title: &str, initial: &str) -> Result<String> {
        let temp_file = Builder::new().suffix(".html").tempfile()?;
        let temp_path = temp_file.path().to_path_buf();

        let editor_cmd = self.config.get_editor_command();
        write_editor_template(&temp_path, title, initial)?;

        info!("Opening editor to write note content. Save and exit when done...");
        launch_editor(&editor_cmd, &temp_path)?;

        let content = read_to_string(&temp_path)?;
        Ok(process_editor_content(&content))
    }
}

fn check_content_sources(
    content: &Option<String>,
    file: &Option<PathBuf>,
    open_editor: bool,
) -> Result<()> {
    let sources = [content.is_some(), file.is_some(), open_editor]
        .iter()
        .filter(|set| **set)
        .count();
    if sources > 1 {
        return Err(NotesError::ApplicationError {
            message: "Specify only one of --content, --file and --edit".to_string(),
        });
    }
    Ok(())
}

fn read_content_file(path: &Path) -> Result<String> {
    if !path.exists() {
        return Err(NotesError::FileNotFound {
            file_path: path.display().to_string(),
        });
    }
    Ok(read_to_string(path)?)
}

/// Looks a version up by identifier first, then by version number.
fn resolve_version<'a>(note: &'a Note, key: &str) -> Result<&'a Version> {
    note.find_version(key)
        .or_else(|| {
            key.trim_start_matches('v')
                .parse::<u32>()
                .ok()
                .and_then(|n| note.find_version_by_number(n))
        })
        .ok_or_else(|| NotesError::VersionNotFound {
            note_id: note.id.clone(),
            version: key.to_string(),
        })
}

fn confirm(question: &str) -> Result<bool> {
    print!("{} [y/N]: ", question);
    stdout().flush()?;

    let mut input = String::new();
    stdin().read_line(&mut input)?;
    let input = input.trim().to_lowercase();
    Ok(input == "y" || input == "yes")
}

fn terminal_width() -> usize {
    terminal_size::terminal_size()
        .map(|(w, _)| w.0 as usize)
        .unwrap_or(80)
}

fn write_editor_template(path: &Path, title: &str, initial: &str) -> Result<()> {
    let mut file = OpenOptions::new().write(true).truncate(true).open(path)?;

    writeln!(file, "<!-- {} -->", title)?;
    writeln!(file, "<!-- Write the note content below as HTML. -->")?;
    writeln!(
        file,
        "<!-- Lines that start with <!-- and end with --> are ignored. Save and exit when done. -->"
    )?;
    write!(file, "{}", initial)?;

    Ok(())
}

fn launch_editor(editor_cmd: &str, file_path: &Path) -> Result<()> {
    let args = split(editor_cmd).map_err(|e| NotesError::EditorError {
        message: format!("Failed to parse editor command: {}", e),
    })?;

    let Some((program, rest)) = args.split_first() else {
        return Err(NotesError::EditorError {
            message: "Empty editor command".to_string(),
        });
    };

    debug!("Launching editor: {} {:?}", program, rest);
    let status = Command::new(program).args(rest).arg(file_path).status()?;

    if !status.success() {
        return Err(NotesError::EditorError {
            message: "Editor exited with non-zero status".to_string(),
        });
    }

    Ok(())
}

fn process_editor_content(content: &str) -> String {
    content
        .lines()
        .filter(|line| !(line.trim_start().starts_with("<!--") && line.trim_end().ends_with("-->")))
        .collect::<Vec<&str>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MemoryBackend;

    fn app(shared: &MemoryBackend) -> (App<crate::MemorySession>, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let session = Session::open(shared.session(), RemotePolicy::Observe);
        let app = App::new(
            session,
            Config::default(),
            dir.path().join("config.json"),
            false,
        );
        (app, dir)
    }

    fn only_note(app: &App<crate::MemorySession>) -> Note {
        let notes = &app.session().state().notes;
        assert_eq!(notes.len(), 1);
        notes[0].clone()
    }

    #[tokio::test]
    async fn create_edit_restore_flow() {
        let shared = MemoryBackend::new();
        let (mut app, _dir) = app(&shared);

        app.run(Commands::Create {
            title: None,
            content: None,
            file: None,
            edit: false,
        })
        .await
        .unwrap();
        let note = only_note(&app);
        assert_eq!(note.title, UNTITLED_NOTE_TITLE);

        app.run(Commands::Edit {
            id: note.id.clone(),
            title: Some("X".into()),
            content: Some("<p>hi</p>".into()),
            file: None,
            edit: false,
        })
        .await
        .unwrap();

        app.run(Commands::Restore {
            id: note.id.clone(),
            version: "1".into(),
            force: true,
        })
        .await
        .unwrap();

        let note = only_note(&app);
        assert_eq!(note.title, UNTITLED_NOTE_TITLE);
        assert_eq!(note.versions.len(), 3);
        assert!(shared.raw().unwrap().contains("\"versionNumber\":3"));
    }

    #[tokio::test]
    async fn unchanged_edit_is_rejected() {
        let shared = MemoryBackend::new();
        let (mut app, _dir) = app(&shared);
        app.run(Commands::Create {
            title: Some("t".into()),
            content: Some("c".into()),
            file: None,
            edit: false,
        })
        .await
        .unwrap();
        let id = only_note(&app).id;

        let result = app
            .run(Commands::Edit {
                id,
                title: None,
                content: Some("c".into()),
                file: None,
                edit: false,
            })
            .await;
        assert!(matches!(result, Err(NotesError::NoChanges { .. })));
        assert_eq!(only_note(&app).versions.len(), 1);
    }

    #[tokio::test]
    async fn missing_notes_and_versions_are_reported() {
        let shared = MemoryBackend::new();
        let (mut app, _dir) = app(&shared);

        let missing = app
            .run(Commands::Delete {
                id: "ghost".into(),
                force: true,
            })
            .await;
        assert!(matches!(missing, Err(NotesError::NoteNotFound { .. })));

        app.run(Commands::Create {
            title: None,
            content: None,
            file: None,
            edit: false,
        })
        .await
        .unwrap();
        let id = only_note(&app).id;
        let bad_version = app
            .run(Commands::ShowVersion {
                id: id.clone(),
                version: "9".into(),
            })
            .await;
        assert!(matches!(bad_version, Err(NotesError::VersionNotFound { .. })));

        let current = app
            .run(Commands::Restore {
                id,
                version: "v1".into(),
                force: true,
            })
            .await;
        assert!(matches!(current, Err(NotesError::ApplicationError { .. })));
    }

    #[tokio::test]
    async fn forced_delete_removes_the_note() {
        let shared = MemoryBackend::new();
        let (mut app, _dir) = app(&shared);
        app.run(Commands::Create {
            title: None,
            content: Some("<p>bye</p>".into()),
            file: None,
            edit: false,
        })
        .await
        .unwrap();
        let id = only_note(&app).id;

        app.run(Commands::Delete { id, force: true }).await.unwrap();
        assert!(app.session().state().is_empty());
        assert_eq!(shared.raw().as_deref(), Some("[]"));
    }

    #[tokio::test]
    async fn conflicting_content_sources_are_rejected() {
        let shared = MemoryBackend::new();
        let (mut app, _dir) = app(&shared);
        let result = app
            .run(Commands::Create {
                title: None,
                content: Some("x".into()),
                file: Some(PathBuf::from("x.html")),
                edit: false,
            })
            .await;
        assert!(result.is_err());
        assert!(app.session().state().is_empty());
    }

    #[tokio::test]
    async fn config_set_is_saved() {
        let shared = MemoryBackend::new();
        let (mut app, dir) = app(&shared);
        app.run(Commands::Config {
            show: false,
            set: Some("preview_length=12".into()),
            reset: false,
        })
        .await
        .unwrap();

        let saved = Config::load(&dir.path().join("config.json")).unwrap();
        assert_eq!(saved.preview_length, 12);
    }

    #[test]
    fn editor_comments_are_dropped() {
        let raw = "<!-- Title -->\n<!-- help -->\n<p>body</p>\n<p>more</p>";
        assert_eq!(process_editor_content(raw), "<p>body</p>\n<p>more</p>");
    }
}
