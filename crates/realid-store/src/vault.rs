//! Per-identity credential vault.
//!
//! A credential's service and optional username share one column as
//! `service|username`. Rows written before usernames existed hold a bare
//! service name and read back with no username.
//!
//! Secrets are stored as given, in clear text.

use crate::{SqliteStore, StoreError};
use serde::Serialize;

const LABEL_SEPARATOR: char = '|';

/// A stored credential, with its label split back into parts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Credential {
    pub id: i64,
    pub service: String,
    pub username: Option<String>,
    pub secret: String,
}

/// CRUD over credentials, always scoped to the owning email.
pub trait CredentialVault: Send + Sync {
    /// Store a credential and return its id.
    fn add(
        &self,
        owner: &str,
        service: &str,
        username: Option<&str>,
        secret: &str,
    ) -> Result<i64, StoreError>;

    /// All of the owner's credentials, oldest first.
    fn list(&self, owner: &str) -> Result<Vec<Credential>, StoreError>;

    /// Returns `false` if no credential with this id belongs to the owner.
    fn update(
        &self,
        owner: &str,
        id: i64,
        service: &str,
        username: Option<&str>,
        secret: &str,
    ) -> Result<bool, StoreError>;

    /// Returns `false` if no credential with this id belongs to the owner.
    fn delete(&self, owner: &str, id: i64) -> Result<bool, StoreError>;
}

/// `service|username`, or the bare service when the username is absent or empty.
pub fn pack_service_label(service: &str, username: Option<&str>) -> String {
    match username {
        Some(user) if !user.is_empty() => format!("{service}{LABEL_SEPARATOR}{user}"),
        _ => service.to_string(),
    }
}

/// Inverse of [`pack_service_label`]; splits at the first separator.
pub fn unpack_service_label(label: &str) -> (String, Option<String>) {
    match label.split_once(LABEL_SEPARATOR) {
        Some((service, user)) if !user.is_empty() => (service.to_string(), Some(user.to_string())),
        Some((service, _)) => (service.to_string(), None),
        None => (label.to_string(), None),
    }
}

impl CredentialVault for SqliteStore {
    fn add(
        &self,
        owner: &str,
        service: &str,
        username: Option<&str>,
        secret: &str,
    ) -> Result<i64, StoreError> {
        let conn = self.conn();
        conn.execute(
            "INSERT INTO passwords (email, service, secret) VALUES (?1, ?2, ?3)",
            rusqlite::params![owner, pack_service_label(service, username), secret],
        )?;
        let id = conn.last_insert_rowid();
        tracing::debug!(owner, id, "credential added");
        Ok(id)
    }

    fn list(&self, owner: &str) -> Result<Vec<Credential>, StoreError> {
        let conn = self.conn();
        let mut stmt =
            conn.prepare("SELECT id, service, secret FROM passwords WHERE email = ?1 ORDER BY id")?;
        let rows = stmt.query_map([owner], |row| {
            let label: String = row.get::<_, Option<String>>(1)?.unwrap_or_default();
            let (service, username) = unpack_service_label(&label);
            Ok(Credential {
                id: row.get(0)?,
                service,
                username,
                secret: row.get::<_, Option<String>>(2)?.unwrap_or_default(),
            })
        })?;
        let credentials = rows.collect::<Result<Vec<_>, _>>()?;
        Ok(credentials)
    }

    fn update(
        &self,
        owner: &str,
        id: i64,
        service: &str,
        username: Option<&str>,
        secret: &str,
    ) -> Result<bool, StoreError> {
        let changed = self.conn().execute(
            "UPDATE passwords SET service = ?1, secret = ?2 WHERE id = ?3 AND email = ?4",
            rusqlite::params![pack_service_label(service, username), secret, id, owner],
        )?;
        tracing::debug!(owner, id, changed, "credential update");
        Ok(changed > 0)
    }

    fn delete(&self, owner: &str, id: i64) -> Result<bool, StoreError> {
        let changed = self.conn().execute(
            "DELETE FROM passwords WHERE id = ?1 AND email = ?2",
            rusqlite::params![id, owner],
        )?;
        tracing::debug!(owner, id, changed, "credential delete");
        Ok(changed > 0)
    }
}
