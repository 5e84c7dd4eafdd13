//! SQLite-backed credential store.
//!
//! Tables:
//! - `accounts`: username, display_name, password_hash, is_admin, created_at

use super::{Account, AuthError};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;

/// Durable username → account mapping.
///
/// Only `has`, `get` and `create` are exposed; accounts are never updated
/// or deleted.
pub struct CredentialStore {
    conn: Mutex<Connection>,
}

impl CredentialStore {
    /// Open (or create) the credential database at the given path.
    pub fn open(db_path: &Path) -> Result<Self, AuthError> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(db_path)?;

        // WAL mode for concurrent reads + crash safety
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;
             PRAGMA busy_timeout = 5000;",
        )?;

        Self::init_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// In-memory store, lost on drop.
    pub fn open_in_memory() -> Result<Self, AuthError> {
        let conn = Connection::open_in_memory()?;
        Self::init_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn init_schema(conn: &Connection) -> Result<(), AuthError> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS accounts (
                username TEXT PRIMARY KEY,
                display_name TEXT NOT NULL DEFAULT '',
                password_hash TEXT NOT NULL,
                is_admin INTEGER NOT NULL DEFAULT 0,
                created_at INTEGER NOT NULL
            );",
        )?;
        Ok(())
    }

    pub fn has(&self, username: &str) -> Result<bool, AuthError> {
        let conn = self.conn.lock();
        let found = conn
            .query_row(
                "SELECT 1 FROM accounts WHERE username = ?1",
                params![username],
                |_| Ok(()),
            )
            .optional()?;
        Ok(found.is_some())
    }

    pub fn get(&self, username: &str) -> Result<Option<Account>, AuthError> {
        let conn = self.conn.lock();
        let account = conn
            .query_row(
                "SELECT username, display_name, password_hash, is_admin, created_at
                 FROM accounts WHERE username = ?1",
                params![username],
                |row| {
                    let created_ms: i64 = row.get(4)?;
                    Ok(Account {
                        username: row.get(0)?,
                        display_name: row.get(1)?,
                        password_hash: row.get(2)?,
                        is_admin: row.get(3)?,
                        created_at: DateTime::<Utc>::from_timestamp_millis(created_ms)
                            .unwrap_or_default(),
                    })
                },
            )
            .optional()?;
        Ok(account)
    }

    /// Insert `account` if its username is free.
    ///
    /// Fails with [`AuthError::AlreadyExists`] otherwise; the stored record
    /// is left untouched.
    pub fn create(&self, account: &Account) -> Result<(), AuthError> {
        let conn = self.conn.lock();
        let result = conn.execute(
            "INSERT INTO accounts (username, display_name, password_hash, is_admin, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                account.username,
                account.display_name,
                account.password_hash,
                account.is_admin,
                account.created_at.timestamp_millis(),
            ],
        );

        match result {
            Ok(_) => Ok(()),
            Err(rusqlite::Error::SqliteFailure(err, _))
                if err.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                Err(AuthError::AlreadyExists(account.username.clone()))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Count stored accounts.
    pub fn count(&self) -> Result<u64, AuthError> {
        let conn = self.conn.lock();
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM accounts", [], |row| row.get(0))?;
        Ok(count as u64)
    }
}

// ── Tests ───────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn account(username: &str, is_admin: bool) -> Account {
        Account {
            username: username.into(),
            display_name: format!("{username} display"),
            password_hash: "$2b$04$placeholderplaceholderplaceholderplaceholderplace".into(),
            is_admin,
            created_at: DateTime::<Utc>::from_timestamp_millis(1_700_000_000_123).unwrap(),
        }
    }

    fn test_store() -> (TempDir, CredentialStore) {
        let tmp = TempDir::new().unwrap();
        let store = CredentialStore::open(&tmp.path().join("users.db")).unwrap();
        (tmp, store)
    }

    #[test]
    fn create_then_get() {
        let (_tmp, store) = test_store();
        let alice = account("alice", false);

        assert!(!store.has("alice").unwrap());
        store.create(&alice).unwrap();
        assert!(store.has("alice").unwrap());
        assert_eq!(store.get("alice").unwrap(), Some(alice));
    }

    #[test]
    fn get_missing_returns_none() {
        let (_tmp, store) = test_store();
        assert!(store.get("ghost").unwrap().is_none());
    }

    #[test]
    fn duplicate_create_keeps_first_record() {
        let (_tmp, store) = test_store();
        let first = account("alice", false);
        store.create(&first).unwrap();

        let mut second = account("alice", true);
        second.display_name = "Impostor".into();
        let err = store.create(&second).unwrap_err();
        assert!(matches!(err, AuthError::AlreadyExists(ref name) if name == "alice"));

        assert_eq!(store.get("alice").unwrap(), Some(first));
        assert_eq!(store.count().unwrap(), 1);
    }

    #[test]
    fn usernames_are_case_sensitive() {
        let (_tmp, store) = test_store();
        store.create(&account("Alice", false)).unwrap();
        store.create(&account("alice", false)).unwrap();
        assert_eq!(store.count().unwrap(), 2);
    }

    #[test]
    fn accounts_survive_reopen() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("nested").join("users.db");
        {
            let store = CredentialStore::open(&path).unwrap();
            store.create(&account("bob", true)).unwrap();
        }
        let store = CredentialStore::open(&path).unwrap();
        let bob = store.get("bob").unwrap().unwrap();
        assert!(bob.is_admin);
        assert_eq!(bob.created_at.timestamp_millis(), 1_700_000_000_123);
    }

    #[test]
    fn in_memory_store_works() {
        let store = CredentialStore::open_in_memory().unwrap();
        store.create(&account("carol", false)).unwrap();
        assert_eq!(store.count().unwrap(), 1);
    }
}
