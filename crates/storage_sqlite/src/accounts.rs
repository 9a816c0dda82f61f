use async_trait::async_trait;
use core_types::{AccountRecord, AccountRepository, NotesError, Result};
use sqlx::Row;
use sqlx::sqlite::SqliteRow;
use tracing::debug;

use crate::SqliteStorage;

const EMAIL_TAKEN: &str = "Email already exists";

#[async_trait]
impl AccountRepository for SqliteStorage {
    async fn find_account(&self, email: &str) -> Result<Option<AccountRecord>> {
        let row = sqlx::query("SELECT id, email, password_hash FROM accounts WHERE email = ?1")
            .bind(email)
            .fetch_optional(&self.pool)
            .await
            .map_err(|err| NotesError::storage("looking up account", err))?;

        row.map(map_account_row).transpose()
    }

    // The existence check and the insert share a transaction, but a second
    // writer can still slip in between them; the primary key on `email` is
    // what finally rejects it.
    async fn create_account(&self, record: &AccountRecord) -> Result<()> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|err| NotesError::storage("starting account creation", err))?;

        let existing = sqlx::query("SELECT 1 FROM accounts WHERE email = ?1")
            .bind(&record.email)
            .fetch_optional(&mut *tx)
            .await
            .map_err(|err| NotesError::storage("checking existing account", err))?;
        if existing.is_some() {
            return Err(NotesError::Conflict(EMAIL_TAKEN.to_string()));
        }

        sqlx::query("INSERT INTO accounts(email, id, password_hash) VALUES (?1, ?2, ?3)")
            .bind(&record.email)
            .bind(&record.id)
            .bind(&record.password_hash)
            .execute(&mut *tx)
            .await
            .map_err(|err| match err {
                sqlx::Error::Database(db) if db.is_unique_violation() => {
                    NotesError::Conflict(EMAIL_TAKEN.to_string())
                }
                other => NotesError::storage("creating account", other),
            })?;

        tx.commit()
            .await
            .map_err(|err| NotesError::storage("committing account", err))?;

        debug!(user_id = %record.id, "account row inserted");
        Ok(())
    }
}

fn map_account_row(row: SqliteRow) -> Result<AccountRecord> {
    let read = |name: &str| {
        row.try_get::<String, _>(name)
            .map_err(|err| NotesError::storage(&format!("reading column {name}"), err))
    };
    Ok(AccountRecord {
        id: read("id")?,
        email: read("email")?,
        password_hash: read("password_hash")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: &str, email: &str) -> AccountRecord {
        AccountRecord {
            id: id.to_string(),
            email: email.to_string(),
            password_hash: "0".repeat(64),
        }
    }

    #[tokio::test]
    async fn creates_and_finds_account() {
        let storage = SqliteStorage::in_memory().await.expect("storage");
        storage
            .create_account(&record("u1", "a@x.com"))
            .await
            .expect("create");

        let found = storage
            .find_account("a@x.com")
            .await
            .expect("find")
            .expect("present");
        assert_eq!(found, record("u1", "a@x.com"));
        assert!(storage.find_account("b@x.com").await.expect("find").is_none());
    }

    #[tokio::test]
    async fn duplicate_email_is_a_conflict() {
        let storage = SqliteStorage::in_memory().await.expect("storage");
        storage
            .create_account(&record("u1", "a@x.com"))
            .await
            .expect("create");

        let err = storage
            .create_account(&record("u2", "a@x.com"))
            .await
            .expect_err("duplicate");
        assert_eq!(err, NotesError::Conflict(EMAIL_TAKEN.to_string()));

        let found = storage.find_account("a@x.com").await.expect("find");
        assert_eq!(found.map(|r| r.id).as_deref(), Some("u1"));
    }
}
