//! realid-store: SQLite persistence for REAL ID.
//!
//! One database file holds two tables: `users` (one enrolled face
//! descriptor per email, guarded by a UNIQUE constraint) and `passwords`
//! (the per-identity vault).

mod identity;
mod schema;
mod vault;

pub use identity::IdentityStore;
pub use vault::{pack_service_label, unpack_service_label, Credential, CredentialVault};

use rusqlite::Connection;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use thiserror::Error;

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("identity already registered: {0}")]
    Duplicate(String),
    #[error("stored descriptor for {email} is corrupt: {reason}")]
    CorruptDescriptor { email: String, reason: String },
    #[error("store unavailable: {0}")]
    Unavailable(#[from] rusqlite::Error),
    #[error("failed to create database directory: {0}")]
    Io(#[from] std::io::Error),
}

/// SQLite-backed store. Implements [`IdentityStore`] and [`CredentialVault`].
///
/// The connection is behind a mutex; each process opens its own store and
/// SQLite serializes writers across processes.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open (creating if needed) the database at `path`.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path)?;
        tracing::info!(path = %path.display(), "database opened");
        Self::init(conn)
    }

    /// Private in-memory database, mainly for tests.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, StoreError> {
        conn.busy_timeout(BUSY_TIMEOUT)?;
        schema::migrate(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        // A panic while holding the lock cannot leave SQLite half-written.
        self.conn.lock().unwrap_or_else(|e| e.into_inner())
    }
}
