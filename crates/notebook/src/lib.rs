//! The signed-in user's working set of notes.
//!
//! [`Notebook`] composes the credential store with a note repository: it
//! restores the session, keeps the user's notes in memory, applies edits, and
//! hands every save to the repository as a complete replace-all of that list.
//! Text edits are debounced through [`autosave`]; structural changes (delete,
//! pin, attachments) are written immediately.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use core_types::{
    Account, Attachment, Note, NoteRepository, NotesError, Result, SlotRepository, THEME_SLOT,
    Theme,
};
use credentials::CredentialStore;
use indexmap::IndexMap;
use parking_lot::Mutex;
use tokio::time::Duration;
use tracing::{debug, info, warn};

pub mod autosave;
pub mod views;

use autosave::{Autosave, Persist};

#[derive(Debug, Clone)]
pub struct NotebookSettings {
    pub debounce: Duration,
    pub folders: Vec<String>,
    pub default_folder: String,
}

impl Default for NotebookSettings {
    fn default() -> Self {
        Self {
            debounce: Duration::from_millis(1000),
            folders: vec!["Personal".to_string(), "Work".to_string(), "Ideas".to_string()],
            default_folder: "Personal".to_string(),
        }
    }
}

/// Field changes for [`Notebook::update_note`]; `None` leaves a field alone.
#[derive(Debug, Clone, Default)]
pub struct NoteEdit {
    pub title: Option<String>,
    pub content: Option<String>,
    pub folder: Option<String>,
    pub tags: Option<Vec<String>>,
}

impl NoteEdit {
    pub fn is_empty(&self) -> bool {
        self.title.is_none() && self.content.is_none() && self.folder.is_none() && self.tags.is_none()
    }

    fn apply(self, note: &mut Note) {
        if let Some(title) = self.title {
            note.title = title;
        }
        if let Some(content) = self.content {
            note.content = content;
        }
        if let Some(folder) = self.folder {
            note.folder = folder;
        }
        if let Some(tags) = self.tags {
            note.tags = tags;
        }
    }
}

#[derive(Default)]
struct State {
    user: Option<Account>,
    notes: Vec<Note>,
}

struct Workspace {
    repository: Arc<dyn NoteRepository>,
    state: Mutex<State>,
}

#[async_trait]
impl Persist for Workspace {
    async fn persist(&self) -> Result<()> {
        let (user_id, notes) = {
            let state = self.state.lock();
            match &state.user {
                Some(user) => (user.id.clone(), state.notes.clone()),
                None => return Ok(()),
            }
        };
        self.repository.save_notes_for_user(&notes, &user_id).await
    }
}

pub struct Notebook {
    credentials: CredentialStore,
    slots: Arc<dyn SlotRepository>,
    workspace: Arc<Workspace>,
    autosave: Autosave,
    settings: NotebookSettings,
}

impl Notebook {
    /// Must be called from within a tokio runtime; the autosave worker is spawned here.
    pub fn open(
        credentials: CredentialStore,
        notes: Arc<dyn NoteRepository>,
        slots: Arc<dyn SlotRepository>,
        settings: NotebookSettings,
    ) -> Self {
        let workspace = Arc::new(Workspace {
            repository: notes,
            state: Mutex::new(State::default()),
        });
        let autosave = Autosave::spawn(settings.debounce, workspace.clone());
        Self {
            credentials,
            slots,
            workspace,
            autosave,
            settings,
        }
    }

    pub fn settings(&self) -> &NotebookSettings {
        &self.settings
    }

    /// Picks up an existing session and loads that user's notes.
    pub async fn restore(&self) -> Result<Option<Account>> {
        let Some(account) = self.credentials.current_session().await? else {
            self.replace_state(None, Vec::new());
            return Ok(None);
        };
        self.enter(account.clone()).await?;
        Ok(Some(account))
    }

    pub async fn sign_up(&self, email: &str, password: &str) -> Result<Account> {
        self.flush_before_switch().await;
        let account = self.credentials.sign_up(email, password).await?;
        self.enter(account.clone()).await?;
        Ok(account)
    }

    pub async fn sign_in(&self, email: &str, password: &str) -> Result<Account> {
        self.flush_before_switch().await;
        let account = self.credentials.sign_in(email, password).await?;
        self.enter(account.clone()).await?;
        Ok(account)
    }

    pub async fn sign_out(&self) -> Result<()> {
        self.flush_before_switch().await;
        self.credentials.sign_out().await?;
        self.replace_state(None, Vec::new());
        Ok(())
    }

    pub fn current_user(&self) -> Option<Account> {
        self.workspace.state.lock().user.clone()
    }

    pub fn notes(&self) -> Vec<Note> {
        self.workspace.state.lock().notes.clone()
    }

    pub fn note(&self, id: &str) -> Option<Note> {
        self.workspace
            .state
            .lock()
            .notes
            .iter()
            .find(|note| note.id == id)
            .cloned()
    }

    /// Notes as the list view shows them: filtered, pinned first, newest first.
    pub fn visible_notes(&self, folder: Option<&str>, query: &str) -> Vec<Note> {
        let state = self.workspace.state.lock();
        let mut visible = views::filter(&state.notes, folder, query);
        views::sort_for_display(visible.as_mut_slice());
        visible.into_iter().cloned().collect()
    }

    pub fn folder_counts(&self) -> IndexMap<String, usize> {
        let state = self.workspace.state.lock();
        views::folder_counts(&state.notes, &self.settings.folders)
    }

    pub fn export_json(&self, folder: Option<&str>) -> serde_json::Result<String> {
        let state = self.workspace.state.lock();
        views::export_json(&state.notes, folder)
    }

    pub fn create_note(&self, folder: Option<&str>) -> Result<Note> {
        let note = {
            let mut state = self.workspace.state.lock();
            let user = require_user(&state)?;
            let folder = folder.unwrap_or(&self.settings.default_folder);
            let note = Note::untitled(user.id.clone(), folder, Utc::now());
            state.notes.insert(0, note.clone());
            note
        };
        debug!(note_id = %note.id, "note created");
        self.autosave.schedule();
        Ok(note)
    }

    pub fn update_note(&self, id: &str, edit: NoteEdit) -> Result<Note> {
        let updated = self.modify(id, |note| {
            edit.apply(note);
            note.updated_at = Utc::now();
        })?;
        self.autosave.schedule();
        Ok(updated)
    }

    pub async fn delete_note(&self, id: &str) -> Result<()> {
        {
            let mut state = self.workspace.state.lock();
            require_user(&state)?;
            let before = state.notes.len();
            state.notes.retain(|note| note.id != id);
            if state.notes.len() == before {
                return Err(note_not_found(id));
            }
        }
        debug!(note_id = id, "note deleted");
        self.autosave.save_now().await
    }

    /// Flips the pin flag and returns the new value. `updated_at` is left alone.
    pub async fn toggle_pin(&self, id: &str) -> Result<bool> {
        let note = self.modify(id, |note| note.is_pinned = !note.is_pinned)?;
        self.autosave.save_now().await?;
        Ok(note.is_pinned)
    }

    pub async fn add_attachment(&self, id: &str, attachment: Attachment) -> Result<Note> {
        attachment.payload()?;
        let note = self.modify(id, |note| {
            note.attachments.push(attachment);
            note.updated_at = Utc::now();
        })?;
        self.autosave.save_now().await?;
        Ok(note)
    }

    pub async fn remove_attachment(&self, id: &str, attachment_id: &str) -> Result<Note> {
        let mut found = false;
        let note = self.modify(id, |note| {
            let before = note.attachments.len();
            note.attachments.retain(|attachment| attachment.id != attachment_id);
            found = note.attachments.len() != before;
            if found {
                note.updated_at = Utc::now();
            }
        })?;
        if !found {
            return Err(NotesError::NotFound(format!(
                "Attachment {attachment_id} not found on note {id}"
            )));
        }
        self.autosave.save_now().await?;
        Ok(note)
    }

    /// Writes any edit still waiting on the debounce timer.
    pub async fn flush(&self) -> Result<()> {
        self.autosave.flush().await
    }

    pub async fn theme(&self) -> Result<Theme> {
        let Some(raw) = self.slots.read_slot(THEME_SLOT).await? else {
            return Ok(Theme::default());
        };
        Ok(raw.parse().unwrap_or_else(|_| {
            warn!(value = %raw, "ignoring unknown theme preference");
            Theme::default()
        }))
    }

    pub async fn set_theme(&self, theme: Theme) -> Result<()> {
        self.slots.write_slot(THEME_SLOT, theme.as_str()).await
    }

    pub async fn toggle_theme(&self) -> Result<Theme> {
        let next = self.theme().await?.toggled();
        self.set_theme(next).await?;
        Ok(next)
    }

    /// Flushes pending edits and stops the autosave worker.
    pub async fn close(self) -> Result<()> {
        self.autosave.shutdown().await
    }

    async fn enter(&self, account: Account) -> Result<()> {
        let notes = self.workspace.repository.load_notes_for_user(&account.id).await?;
        info!(user_id = %account.id, count = notes.len(), "notebook opened");
        self.replace_state(Some(account), notes);
        Ok(())
    }

    async fn flush_before_switch(&self) {
        if let Err(err) = self.autosave.flush().await {
            warn!("pending notes were not saved before switching user: {err}");
        }
    }

    fn replace_state(&self, user: Option<Account>, notes: Vec<Note>) {
        let mut state = self.workspace.state.lock();
        state.user = user;
        state.notes = notes;
    }

    fn modify(&self, id: &str, change: impl FnOnce(&mut Note)) -> Result<Note> {
        let mut state = self.workspace.state.lock();
        require_user(&state)?;
        let note = state
            .notes
            .iter_mut()
            .find(|note| note.id == id)
            .ok_or_else(|| note_not_found(id))?;
        change(note);
        Ok(note.clone())
    }
}

fn require_user(state: &State) -> Result<&Account> {
    state
        .user
        .as_ref()
        .ok_or_else(|| NotesError::Authentication("Sign in to manage notes".to_string()))
}

fn note_not_found(id: &str) -> NotesError {
    NotesError::NotFound(format!("Note {id} not found"))
}

#[cfg(test)]
mod tests {
    use core_types::{AttachmentKind, MemoryStorage};

    use super::*;

    fn notebook(storage: &MemoryStorage) -> Notebook {
        let shared = Arc::new(storage.clone());
        let credentials = CredentialStore::new(shared.clone(), shared.clone());
        Notebook::open(credentials, shared.clone(), shared, NotebookSettings::default())
    }

    async fn persisted(storage: &MemoryStorage, user: &Account) -> Vec<Note> {
        storage.load_notes_for_user(&user.id).await.expect("load")
    }

    #[tokio::test]
    async fn editing_requires_sign_in() {
        let storage = MemoryStorage::new();
        let notebook = notebook(&storage);
        let err = notebook.create_note(None).expect_err("signed out");
        assert!(matches!(err, NotesError::Authentication(_)), "unexpected error: {err}");
    }

    #[tokio::test]
    async fn new_note_defaults_and_is_saved_on_flush() {
        let storage = MemoryStorage::new();
        let notebook = notebook(&storage);
        let user = notebook.sign_up("a@x.com", "Passw0rd").await.expect("sign up");

        let note = notebook.create_note(None).expect("create");
        assert_eq!(note.title, Note::UNTITLED);
        assert_eq!(note.folder, "Personal");
        assert_eq!(note.user_id, user.id);
        assert_eq!(note.created_at, note.updated_at);
        assert!(!note.is_pinned && note.tags.is_empty() && note.attachments.is_empty());

        let ideas = notebook.create_note(Some("Ideas")).expect("create");
        assert_eq!(notebook.notes()[0].id, ideas.id);

        notebook.flush().await.expect("flush");
        assert_eq!(persisted(&storage, &user).await.len(), 2);
    }

    #[tokio::test]
    async fn update_applies_edit_and_bumps_timestamp() {
        let storage = MemoryStorage::new();
        let notebook = notebook(&storage);
        let user = notebook.sign_up("a@x.com", "Passw0rd").await.expect("sign up");
        let note = notebook.create_note(None).expect("create");

        let edit = NoteEdit {
            title: Some("Groceries".to_string()),
            tags: Some(vec!["home".to_string()]),
            ..NoteEdit::default()
        };
        let updated = notebook.update_note(&note.id, edit).expect("update");
        assert_eq!(updated.title, "Groceries");
        assert_eq!(updated.content, "");
        assert_eq!(updated.tags, vec!["home".to_string()]);
        assert!(updated.updated_at >= note.updated_at);

        notebook.flush().await.expect("flush");
        assert_eq!(persisted(&storage, &user).await, vec![updated]);

        let err = notebook
            .update_note("missing", NoteEdit::default())
            .expect_err("unknown id");
        assert!(matches!(err, NotesError::NotFound(_)));
    }

    #[tokio::test]
    async fn delete_pin_and_attachments_save_immediately() {
        let storage = MemoryStorage::new();
        let notebook = notebook(&storage);
        let user = notebook.sign_up("a@x.com", "Passw0rd").await.expect("sign up");
        let keep = notebook.create_note(None).expect("create");
        let drop_me = notebook.create_note(None).expect("create");

        assert!(notebook.toggle_pin(&keep.id).await.expect("pin"));
        let saved = persisted(&storage, &user).await;
        assert_eq!(saved.len(), 2);
        let pinned = saved.iter().find(|n| n.id == keep.id).expect("kept");
        assert!(pinned.is_pinned);
        assert_eq!(pinned.updated_at, keep.updated_at);

        notebook.delete_note(&drop_me.id).await.expect("delete");
        let saved = persisted(&storage, &user).await;
        assert_eq!(saved.len(), 1);
        assert_eq!(saved[0].id, keep.id);

        let attachment = Attachment::from_bytes(AttachmentKind::Pdf, "doc.pdf", b"%PDF-1.4");
        let attachment_id = attachment.id.clone();
        notebook
            .add_attachment(&keep.id, attachment)
            .await
            .expect("attach");
        assert_eq!(persisted(&storage, &user).await[0].attachments.len(), 1);

        notebook
            .remove_attachment(&keep.id, &attachment_id)
            .await
            .expect("detach");
        assert!(persisted(&storage, &user).await[0].attachments.is_empty());

        let err = notebook
            .remove_attachment(&keep.id, &attachment_id)
            .await
            .expect_err("already gone");
        assert!(matches!(err, NotesError::NotFound(_)));

        let err = notebook.delete_note(&drop_me.id).await.expect_err("gone");
        assert!(matches!(err, NotesError::NotFound(_)));
    }

    #[tokio::test]
    async fn invalid_attachment_payload_is_rejected() {
        let storage = MemoryStorage::new();
        let notebook = notebook(&storage);
        notebook.sign_up("a@x.com", "Passw0rd").await.expect("sign up");
        let note = notebook.create_note(None).expect("create");

        let mut attachment = Attachment::from_bytes(AttachmentKind::Image, "a.png", b"png");
        attachment.data = "%%%".to_string();
        let err = notebook
            .add_attachment(&note.id, attachment)
            .await
            .expect_err("bad payload");
        assert!(matches!(err, NotesError::Validation(_)));
        assert!(notebook.note(&note.id).expect("note").attachments.is_empty());
    }

    #[tokio::test]
    async fn restore_loads_session_user_notes() {
        let storage = MemoryStorage::new();
        let first = notebook(&storage);
        let user = first.sign_up("a@x.com", "Passw0rd").await.expect("sign up");
        first.create_note(Some("Work")).expect("create");
        first.close().await.expect("close");

        let second = notebook(&storage);
        assert_eq!(second.restore().await.expect("restore"), Some(user));
        assert_eq!(second.notes().len(), 1);
        assert_eq!(second.notes()[0].folder, "Work");
    }

    #[tokio::test]
    async fn sign_out_saves_pending_edits_and_clears_list() {
        let storage = MemoryStorage::new();
        let notebook = notebook(&storage);
        let user = notebook.sign_up("a@x.com", "Passw0rd").await.expect("sign up");
        notebook.create_note(None).expect("create");

        notebook.sign_out().await.expect("sign out");
        assert!(notebook.notes().is_empty());
        assert_eq!(notebook.current_user(), None);
        assert_eq!(persisted(&storage, &user).await.len(), 1);
        assert_eq!(notebook.restore().await.expect("restore"), None);
    }

    #[tokio::test]
    async fn users_only_see_their_own_notes() {
        let storage = MemoryStorage::new();
        let notebook = notebook(&storage);
        notebook.sign_up("a@x.com", "Passw0rd").await.expect("a");
        notebook.create_note(None).expect("create");
        notebook.sign_up("b@x.com", "Passw0rd").await.expect("b");
        assert!(notebook.notes().is_empty());

        notebook.sign_in("a@x.com", "Passw0rd").await.expect("a again");
        assert_eq!(notebook.notes().len(), 1);
    }

    #[tokio::test]
    async fn visible_notes_and_counts_follow_in_memory_list() {
        let storage = MemoryStorage::new();
        let notebook = notebook(&storage);
        notebook.sign_up("a@x.com", "Passw0rd").await.expect("sign up");
        let older = notebook.create_note(Some("Work")).expect("create");
        let newer = notebook.create_note(Some("Work")).expect("create");
        notebook
            .update_note(
                &newer.id,
                NoteEdit {
                    content: Some("meeting notes".to_string()),
                    ..NoteEdit::default()
                },
            )
            .expect("update");
        notebook.toggle_pin(&older.id).await.expect("pin");

        let visible: Vec<String> = notebook
            .visible_notes(Some("Work"), "")
            .into_iter()
            .map(|note| note.id)
            .collect();
        assert_eq!(visible, vec![older.id.clone(), newer.id.clone()]);
        assert_eq!(notebook.visible_notes(None, "MEETING").len(), 1);

        let counts = notebook.folder_counts();
        assert_eq!(counts.get("Work"), Some(&2));
        assert_eq!(counts.get("Personal"), Some(&0));

        let exported: Vec<Note> =
            serde_json::from_str(&notebook.export_json(Some("Work")).expect("export"))
                .expect("parse");
        assert_eq!(exported.len(), 2);
    }

    #[tokio::test]
    async fn theme_defaults_to_light_and_toggles() {
        let storage = MemoryStorage::new();
        let notebook = notebook(&storage);
        assert_eq!(notebook.theme().await.expect("theme"), Theme::Light);
        assert_eq!(notebook.toggle_theme().await.expect("toggle"), Theme::Dark);
        assert_eq!(
            storage.read_slot(THEME_SLOT).await.expect("slot").as_deref(),
            Some("dark")
        );

        storage.write_slot(THEME_SLOT, "sepia").await.expect("write");
        assert_eq!(notebook.theme().await.expect("theme"), Theme::Light);
    }

    #[tokio::test]
    async fn unavailable_storage_is_reported_not_fatal() {
        let storage = MemoryStorage::new();
        let notebook = notebook(&storage);
        notebook.sign_up("a@x.com", "Passw0rd").await.expect("sign up");
        let note = notebook.create_note(None).expect("create");

        storage.set_unavailable(true);
        let err = notebook.toggle_pin(&note.id).await.expect_err("down");
        assert!(matches!(err, NotesError::Storage(_)), "unexpected error: {err}");
        assert!(notebook.note(&note.id).expect("kept in memory").is_pinned);

        storage.set_unavailable(false);
        notebook.toggle_pin(&note.id).await.expect("recovered");
        assert_eq!(storage.save_count(), 1);
    }
}
