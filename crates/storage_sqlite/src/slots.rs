use async_trait::async_trait;
use core_types::{NotesError, Result, SlotRepository};
use sqlx::Row;

use crate::SqliteStorage;

#[async_trait]
impl SlotRepository for SqliteStorage {
    async fn read_slot(&self, key: &str) -> Result<Option<String>> {
        let row = sqlx::query("SELECT value FROM slots WHERE key = ?1")
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .map_err(|err| NotesError::storage("reading slot", err))?;

        row.map(|row| row.try_get::<String, _>("value"))
            .transpose()
            .map_err(|err| NotesError::storage("decoding slot", err))
    }

    async fn write_slot(&self, key: &str, value: &str) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO slots(key, value)
            VALUES (?1, ?2)
            ON CONFLICT(key) DO UPDATE SET value = excluded.value
            "#,
        )
        .bind(key)
        .bind(value)
        .execute(&self.pool)
        .await
        .map_err(|err| NotesError::storage("writing slot", err))?;
        Ok(())
    }

    async fn clear_slot(&self, key: &str) -> Result<()> {
        sqlx::query("DELETE FROM slots WHERE key = ?1")
            .bind(key)
            .execute(&self.pool)
            .await
            .map_err(|err| NotesError::storage("clearing slot", err))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn slot_is_overwritten_and_cleared() {
        let storage = SqliteStorage::in_memory().await.expect("storage");
        assert!(storage.read_slot("theme").await.expect("read").is_none());

        storage.write_slot("theme", "dark").await.expect("write");
        storage.write_slot("theme", "light").await.expect("overwrite");
        assert_eq!(
            storage.read_slot("theme").await.expect("read").as_deref(),
            Some("light")
        );

        storage.clear_slot("theme").await.expect("clear");
        storage.clear_slot("theme").await.expect("clear twice");
        assert!(storage.read_slot("theme").await.expect("read").is_none());
    }
}
