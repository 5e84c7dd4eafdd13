//! Account storage and credential verification.
//!
//! Provides:
//! - Credential store keyed by username (SQLite-backed, durable)
//! - bcrypt password hashing on the blocking thread pool
//! - Registration (create-if-absent) and login (uniform failure)
//!
//! ## Design Decisions
//! - Username uniqueness is enforced by the table's primary key, so the
//!   existence check and the insert cannot race.
//! - Login failures never say whether the user exists. Unknown users still
//!   pay for one bcrypt verification.

pub mod password;
pub mod service;
pub mod store;

pub use password::PasswordHasher;
pub use service::AuthService;
pub use store::CredentialStore;

use chrono::{DateTime, Utc};
use serde::Serialize;

/// A stored account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Account {
    pub username: String,
    pub display_name: String,
    /// bcrypt output. Never serialized.
    #[serde(skip)]
    pub password_hash: String,
    pub is_admin: bool,
    pub created_at: DateTime<Utc>,
}

impl Account {
    /// Human-readable role name.
    pub fn role(&self) -> &'static str {
        if self.is_admin {
            "admin"
        } else {
            "user"
        }
    }
}

/// Failures surfaced by the auth subsystem.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("Missing {0}")]
    InvalidRequest(&'static str),
    #[error("User {0} already exists!")]
    AlreadyExists(String),
    /// Same message for unknown users and wrong passwords.
    #[error("Invalid username or password")]
    AuthenticationFailed,
    #[error("Registration is disabled")]
    RegistrationDisabled,
    #[error("credential store failure: {0}")]
    Storage(#[from] rusqlite::Error),
    #[error("credential store failure: {0}")]
    Io(#[from] std::io::Error),
    #[error("password hashing failed: {0}")]
    Hashing(String),
}
