use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use core_types::{
    Account, AccountRecord, AccountRepository, NotesError, Result, SESSION_SLOT, Session,
    SlotRepository, new_id,
};
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

pub const DEFAULT_SESSION_TTL_HOURS: i64 = 24;
pub const MIN_PASSWORD_LEN: usize = 8;

const INVALID_EMAIL: &str = "Invalid email format";
const WEAK_PASSWORD: &str = "Password must be at least 8 characters long and contain at least one uppercase letter, one lowercase letter, and one number";

/// Local account table plus the single session slot.
#[derive(Clone)]
pub struct CredentialStore {
    accounts: Arc<dyn AccountRepository>,
    slots: Arc<dyn SlotRepository>,
    session_ttl: Duration,
}

impl CredentialStore {
    pub fn new(accounts: Arc<dyn AccountRepository>, slots: Arc<dyn SlotRepository>) -> Self {
        Self {
            accounts,
            slots,
            session_ttl: Duration::hours(DEFAULT_SESSION_TTL_HOURS),
        }
    }

    pub fn with_session_ttl(mut self, ttl: Duration) -> Self {
        self.session_ttl = ttl;
        self
    }

    pub fn session_ttl(&self) -> Duration {
        self.session_ttl
    }

    pub async fn sign_up(&self, email: &str, password: &str) -> Result<Account> {
        if !validate_email(email) {
            return Err(NotesError::validation(INVALID_EMAIL));
        }
        if !validate_password(password) {
            return Err(NotesError::validation(WEAK_PASSWORD));
        }

        let record = AccountRecord {
            id: new_id(),
            email: email.to_string(),
            password_hash: hash_password(password),
        };
        let account = record.account();
        let session = Session::starting_at(account.clone(), Utc::now(), self.session_ttl)?;
        self.accounts.create_account(&record).await?;
        self.write_session(&session).await?;
        info!(user_id = %account.id, "account created");
        Ok(account)
    }

    pub async fn sign_in(&self, email: &str, password: &str) -> Result<Account> {
        if !validate_email(email) {
            return Err(NotesError::validation(INVALID_EMAIL));
        }

        let digest = hash_password(password);
        let record = self
            .accounts
            .find_account(email)
            .await?
            .ok_or_else(|| NotesError::NotFound("User not found".to_string()))?;

        if record.password_hash != digest {
            warn!(user_id = %record.id, "sign-in rejected");
            return Err(NotesError::Authentication("Invalid password".to_string()));
        }

        let account = record.account();
        let session = Session::starting_at(account.clone(), Utc::now(), self.session_ttl)?;
        self.write_session(&session).await?;
        info!(user_id = %account.id, "signed in");
        Ok(account)
    }

    pub async fn current_session(&self) -> Result<Option<Account>> {
        self.current_session_at(Utc::now()).await
    }

    /// Reads the session slot as of `now`, clearing it if it has expired or
    /// cannot be decoded.
    pub async fn current_session_at(&self, now: DateTime<Utc>) -> Result<Option<Account>> {
        let Some(raw) = self.slots.read_slot(SESSION_SLOT).await? else {
            return Ok(None);
        };

        let session: Session = match serde_json::from_str(&raw) {
            Ok(session) => session,
            Err(err) => {
                warn!("discarding unreadable session: {err}");
                self.slots.clear_slot(SESSION_SLOT).await?;
                return Ok(None);
            }
        };

        if session.is_expired_at(now) {
            debug!(user_id = %session.user.id, "session expired");
            self.slots.clear_slot(SESSION_SLOT).await?;
            return Ok(None);
        }

        Ok(Some(session.user))
    }

    pub async fn sign_out(&self) -> Result<()> {
        self.slots.clear_slot(SESSION_SLOT).await?;
        info!("signed out");
        Ok(())
    }

    async fn write_session(&self, session: &Session) -> Result<()> {
        let encoded = serde_json::to_string(session)
            .map_err(|err| NotesError::storage("encoding session", err))?;
        self.slots.write_slot(SESSION_SLOT, &encoded).await
    }
}

/// Matches `local@domain.tld`: no whitespace, exactly one `@`, and a dot inside the domain.
pub fn validate_email(email: &str) -> bool {
    if email.chars().any(char::is_whitespace) {
        return false;
    }
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    if local.is_empty() || domain.contains('@') {
        return false;
    }
    domain
        .char_indices()
        .any(|(idx, ch)| ch == '.' && idx > 0 && idx + 1 < domain.len())
}

/// At least eight characters with an uppercase letter, a lowercase letter and a
/// digit. Line terminators are not allowed anywhere.
pub fn validate_password(password: &str) -> bool {
    !password
        .chars()
        .any(|ch| matches!(ch, '\n' | '\r' | '\u{2028}' | '\u{2029}'))
        && password.chars().count() >= MIN_PASSWORD_LEN
        && password.chars().any(|ch| ch.is_ascii_uppercase())
        && password.chars().any(|ch| ch.is_ascii_lowercase())
        && password.chars().any(|ch| ch.is_ascii_digit())
}

/// Lowercase hex SHA-256 of the password bytes.
pub fn hash_password(password: &str) -> String {
    hex::encode(Sha256::digest(password.as_bytes()))
}
