use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::{
    AccountRecord, AccountRepository, Note, NoteRepository, NotesError, Result, SlotRepository,
};

#[derive(Debug, Default)]
struct Tables {
    accounts: HashMap<String, AccountRecord>,
    notes: HashMap<String, Note>,
    slots: HashMap<String, String>,
    saves: usize,
    unavailable: bool,
}

impl Tables {
    fn check_available(&self, step: &str) -> Result<()> {
        if self.unavailable {
            return Err(NotesError::storage(step, "storage unavailable"));
        }
        Ok(())
    }
}

/// Process-local implementation of every repository trait, for tests and
/// throwaway sessions. Clones share the same tables.
#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
    tables: Arc<Mutex<Tables>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of replace-all saves that reached the notes table.
    pub fn save_count(&self) -> usize {
        self.tables.lock().saves
    }

    /// Makes every subsequent call fail with [`NotesError::Storage`].
    pub fn set_unavailable(&self, unavailable: bool) {
        self.tables.lock().unavailable = unavailable;
    }
}

#[async_trait]
impl AccountRepository for MemoryStorage {
    async fn find_account(&self, email: &str) -> Result<Option<AccountRecord>> {
        let tables = self.tables.lock();
        tables.check_available("looking up account")?;
        Ok(tables.accounts.get(email).cloned())
    }

    async fn create_account(&self, record: &AccountRecord) -> Result<()> {
        let mut tables = self.tables.lock();
        tables.check_available("creating account")?;
        if tables.accounts.contains_key(&record.email) {
            return Err(NotesError::Conflict("Email already exists".to_string()));
        }
        tables.accounts.insert(record.email.clone(), record.clone());
        Ok(())
    }
}

#[async_trait]
impl NoteRepository for MemoryStorage {
    async fn load_notes_for_user(&self, user_id: &str) -> Result<Vec<Note>> {
        if user_id.is_empty() {
            return Ok(Vec::new());
        }
        let tables = self.tables.lock();
        tables.check_available("loading notes")?;
        Ok(tables
            .notes
            .values()
            .filter(|note| note.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn save_notes_for_user(&self, notes: &[Note], user_id: &str) -> Result<()> {
        if user_id.is_empty() {
            return Err(NotesError::validation("a user id is required to save notes"));
        }
        let mut tables = self.tables.lock();
        tables.check_available("saving notes")?;

        let mut next = tables.notes.clone();
        next.retain(|_, note| note.user_id != user_id);
        for note in notes {
            if next.contains_key(&note.id) {
                return Err(NotesError::storage(
                    &format!("inserting note {}", note.id),
                    "duplicate note id",
                ));
            }
            let mut owned = note.clone();
            owned.user_id = user_id.to_string();
            next.insert(owned.id.clone(), owned);
        }
        tables.notes = next;
        tables.saves += 1;
        Ok(())
    }
}

#[async_trait]
impl SlotRepository for MemoryStorage {
    async fn read_slot(&self, key: &str) -> Result<Option<String>> {
        let tables = self.tables.lock();
        tables.check_available("reading slot")?;
        Ok(tables.slots.get(key).cloned())
    }

    async fn write_slot(&self, key: &str, value: &str) -> Result<()> {
        let mut tables = self.tables.lock();
        tables.check_available("writing slot")?;
        tables.slots.insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn clear_slot(&self, key: &str) -> Result<()> {
        let mut tables = self.tables.lock();
        tables.check_available("clearing slot")?;
        tables.slots.remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;

    #[tokio::test]
    async fn replace_all_matches_sqlite_semantics() {
        let store = MemoryStorage::new();
        let n1 = Note::untitled("u1", "Work", Utc::now());
        let n2 = Note::untitled("u1", "Work", Utc::now());
        store.save_notes_for_user(&[n1], "u1").await.expect("save n1");
        store
            .save_notes_for_user(std::slice::from_ref(&n2), "u1")
            .await
            .expect("save n2");

        assert_eq!(store.load_notes_for_user("u1").await.expect("load"), vec![n2]);
        assert_eq!(store.save_count(), 2);
    }

    #[tokio::test]
    async fn only_the_empty_user_id_is_absent() {
        let store = MemoryStorage::new();
        let err = store
            .save_notes_for_user(&[], "")
            .await
            .expect_err("empty id");
        assert!(matches!(err, NotesError::Validation(_)));

        let note = Note::untitled("u1", "Work", Utc::now());
        store.save_notes_for_user(&[note], "  ").await.expect("save");
        assert_eq!(store.load_notes_for_user("  ").await.expect("load").len(), 1);
    }

    #[tokio::test]
    async fn unavailable_backend_fails_every_call() {
        let store = MemoryStorage::new();
        store.set_unavailable(true);
        let err = store.load_notes_for_user("u1").await.expect_err("down");
        assert!(matches!(err, NotesError::Storage(_)));
        assert!(store.read_slot("theme").await.is_err());

        store.set_unavailable(false);
        assert!(store.read_slot("theme").await.expect("read").is_none());
    }
}
