use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use core_types::{Attachment, Note, NoteRepository, NotesError, Result};
use sqlx::Row;
use sqlx::sqlite::SqliteRow;
use tracing::debug;

use crate::SqliteStorage;

/// Column values of one note as they are written to the `notes` table.
struct NoteRow<'a> {
    note: &'a Note,
    tags_json: String,
    attachments_json: String,
    created_at: String,
    updated_at: String,
}

impl<'a> NoteRow<'a> {
    fn encode(note: &'a Note) -> Result<Self> {
        Ok(Self {
            note,
            tags_json: serde_json::to_string(&note.tags)
                .map_err(|err| NotesError::storage("encoding note tags", err))?,
            attachments_json: serde_json::to_string(&note.attachments)
                .map_err(|err| NotesError::storage("encoding note attachments", err))?,
            created_at: format_timestamp(note.created_at),
            updated_at: format_timestamp(note.updated_at),
        })
    }
}

#[async_trait]
impl NoteRepository for SqliteStorage {
    async fn load_notes_for_user(&self, user_id: &str) -> Result<Vec<Note>> {
        if user_id.is_empty() {
            return Ok(Vec::new());
        }

        let rows = sqlx::query(
            r#"
            SELECT id, user_id, title, content, folder, tags_json, is_pinned,
                   attachments_json, created_at, updated_at
            FROM notes
            WHERE user_id = ?1
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|err| NotesError::storage("loading notes", err))?;

        let notes = rows
            .into_iter()
            .map(map_note_row)
            .collect::<Result<Vec<_>>>()?;
        debug!(user_id, count = notes.len(), "loaded notes");
        Ok(notes)
    }

    async fn save_notes_for_user(&self, notes: &[Note], user_id: &str) -> Result<()> {
        if user_id.is_empty() {
            return Err(NotesError::validation("a user id is required to save notes"));
        }

        let rows = notes
            .iter()
            .map(NoteRow::encode)
            .collect::<Result<Vec<_>>>()?;

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|err| NotesError::storage("starting note save", err))?;

        let removed = sqlx::query("DELETE FROM notes WHERE user_id = ?1")
            .bind(user_id)
            .execute(&mut *tx)
            .await
            .map_err(|err| NotesError::storage("clearing previous notes", err))?
            .rows_affected();

        for row in &rows {
            sqlx::query(
                r#"
                INSERT INTO notes(
                    id, user_id, title, content, folder, tags_json, is_pinned,
                    attachments_json, created_at, updated_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
                "#,
            )
            .bind(&row.note.id)
            .bind(user_id)
            .bind(&row.note.title)
            .bind(&row.note.content)
            .bind(&row.note.folder)
            .bind(&row.tags_json)
            .bind(row.note.is_pinned)
            .bind(&row.attachments_json)
            .bind(&row.created_at)
            .bind(&row.updated_at)
            .execute(&mut *tx)
            .await
            .map_err(|err| {
                NotesError::storage(&format!("inserting note {}", row.note.id), err)
            })?;
        }

        tx.commit()
            .await
            .map_err(|err| NotesError::storage("committing note save", err))?;

        debug!(user_id, removed, inserted = rows.len(), "replaced notes");
        Ok(())
    }
}

fn map_note_row(row: SqliteRow) -> Result<Note> {
    let tags: Vec<String> = serde_json::from_str(&column::<String>(&row, "tags_json")?)
        .map_err(|err| NotesError::storage("decoding note tags", err))?;
    let attachments: Vec<Attachment> =
        serde_json::from_str(&column::<String>(&row, "attachments_json")?)
            .map_err(|err| NotesError::storage("decoding note attachments", err))?;

    Ok(Note {
        id: column(&row, "id")?,
        title: column(&row, "title")?,
        content: column(&row, "content")?,
        folder: column(&row, "folder")?,
        tags,
        created_at: parse_timestamp(&column::<String>(&row, "created_at")?)?,
        updated_at: parse_timestamp(&column::<String>(&row, "updated_at")?)?,
        user_id: column(&row, "user_id")?,
        is_pinned: column(&row, "is_pinned")?,
        attachments,
    })
}

fn column<T>(row: &SqliteRow, name: &str) -> Result<T>
where
    T: for<'r> sqlx::Decode<'r, sqlx::Sqlite> + sqlx::Type<sqlx::Sqlite>,
{
    row.try_get(name)
        .map_err(|err| NotesError::storage(&format!("reading column {name}"), err))
}

fn format_timestamp(value: DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

fn parse_timestamp(value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|parsed| parsed.with_timezone(&Utc))
        .map_err(|err| NotesError::storage(&format!("parsing timestamp `{value}`"), err))
}
