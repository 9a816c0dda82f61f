use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

mod memory;
pub use memory::MemoryStorage;

pub type UserId = String;
pub type NoteId = String;
pub type AttachmentId = String;

/// Slot holding the JSON-encoded [`Session`].
pub const SESSION_SLOT: &str = "minnotes_auth";
/// Slot holding the [`Theme`] preference.
pub const THEME_SLOT: &str = "theme";

pub fn new_id() -> String {
    Uuid::new_v4().to_string()
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum NotesError {
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    Conflict(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Authentication(String),
    #[error("storage failure: {0}")]
    Storage(String),
}

impl NotesError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Wraps an underlying persistence failure with the step that produced it.
    pub fn storage(step: &str, err: impl fmt::Display) -> Self {
        Self::Storage(format!("{step}: {err}"))
    }
}

pub type Result<T, E = NotesError> = std::result::Result<T, E>;

/// Public projection of an account. Never carries the password digest.
#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq, Hash)]
pub struct Account {
    pub id: UserId,
    pub email: String,
}

/// Persisted account row.
#[derive(Clone, Eq, PartialEq)]
pub struct AccountRecord {
    pub id: UserId,
    pub email: String,
    pub password_hash: String,
}

impl AccountRecord {
    pub fn account(&self) -> Account {
        Account {
            id: self.id.clone(),
            email: self.email.clone(),
        }
    }
}

impl fmt::Debug for AccountRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccountRecord")
            .field("id", &self.id)
            .field("email", &self.email)
            .field("password_hash", &"[REDACTED]")
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub user: Account,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub expires_at: DateTime<Utc>,
}

impl Session {
    /// Fails with [`NotesError::Validation`] when `ttl` is not positive or the
    /// expiry falls outside the representable date range.
    pub fn starting_at(user: Account, now: DateTime<Utc>, ttl: Duration) -> Result<Self> {
        if ttl <= Duration::zero() {
            return Err(NotesError::validation("session lifetime must be positive"));
        }
        let expires_at = now
            .checked_add_signed(ttl)
            .ok_or_else(|| NotesError::validation("session lifetime is too long"))?;
        Ok(Self { user, expires_at })
    }

    /// A session is still valid at the exact instant it expires.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum AttachmentKind {
    Image,
    Pdf,
}

impl AttachmentKind {
    /// `image/*` is an image; every other upload is filed as a pdf.
    pub fn from_mime(mime: &str) -> Self {
        if mime.trim().to_ascii_lowercase().starts_with("image/") {
            Self::Image
        } else {
            Self::Pdf
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Attachment {
    pub id: AttachmentId,
    #[serde(rename = "type")]
    pub kind: AttachmentKind,
    pub name: String,
    pub data: String,
    pub created_at: DateTime<Utc>,
}

impl Attachment {
    pub fn from_bytes(kind: AttachmentKind, name: impl Into<String>, bytes: &[u8]) -> Self {
        Self {
            id: new_id(),
            kind,
            name: name.into(),
            data: BASE64.encode(bytes),
            created_at: Utc::now(),
        }
    }

    /// Decodes the payload, accepting both bare base64 and `data:<mime>;base64,` URLs.
    pub fn payload(&self) -> Result<Vec<u8>> {
        let encoded = match self.data.split_once(";base64,") {
            Some((prefix, rest)) if prefix.starts_with("data:") => rest,
            _ => self.data.as_str(),
        };
        BASE64.decode(encoded.trim()).map_err(|err| {
            NotesError::validation(format!("attachment `{}` is not valid base64: {err}", self.name))
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Note {
    pub id: NoteId,
    pub title: String,
    pub content: String,
    pub folder: String,
    #[serde(default)]
    pub tags: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub user_id: UserId,
    #[serde(default)]
    pub is_pinned: bool,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
}

impl Note {
    pub const UNTITLED: &'static str = "Untitled Note";

    pub fn untitled(user_id: impl Into<UserId>, folder: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            id: new_id(),
            title: Self::UNTITLED.to_string(),
            content: String::new(),
            folder: folder.into(),
            tags: Vec::new(),
            created_at: now,
            updated_at: now,
            user_id: user_id.into(),
            is_pinned: false,
            attachments: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, Eq, PartialEq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Theme {
    #[default]
    Light,
    Dark,
}

impl Theme {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Light => "light",
            Self::Dark => "dark",
        }
    }

    pub fn toggled(self) -> Self {
        match self {
            Self::Light => Self::Dark,
            Self::Dark => Self::Light,
        }
    }
}

impl FromStr for Theme {
    type Err = NotesError;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim() {
            "light" => Ok(Self::Light),
            "dark" => Ok(Self::Dark),
            other => Err(NotesError::validation(format!("unknown theme `{other}`"))),
        }
    }
}

impl fmt::Display for Theme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[async_trait]
pub trait AccountRepository: Send + Sync {
    async fn find_account(&self, email: &str) -> Result<Option<AccountRecord>>;
    /// Inserts the account, failing with [`NotesError::Conflict`] when the email is taken.
    async fn create_account(&self, record: &AccountRecord) -> Result<()>;
}

#[async_trait]
pub trait NoteRepository: Send + Sync {
    async fn load_notes_for_user(&self, user_id: &str) -> Result<Vec<Note>>;
    /// Replaces the user's whole persisted note set with `notes`.
    async fn save_notes_for_user(&self, notes: &[Note], user_id: &str) -> Result<()>;
}

#[async_trait]
pub trait SlotRepository: Send + Sync {
    async fn read_slot(&self, key: &str) -> Result<Option<String>>;
    async fn write_slot(&self, key: &str, value: &str) -> Result<()>;
    async fn clear_slot(&self, key: &str) -> Result<()>;
}
