use crate::{SqliteStore, StoreError};
use realid_core::{Descriptor, GalleryEntry, IdentityRecord};
use rusqlite::{ErrorCode, OptionalExtension};

/// Persistence of enrolled identities.
pub trait IdentityStore: Send + Sync {
    fn find_by_email(&self, email: &str) -> Result<Option<IdentityRecord>, StoreError>;

    /// Insert a new identity. Fails with [`StoreError::Duplicate`] if the
    /// email is already registered; the existing record is left untouched.
    fn insert(
        &self,
        email: &str,
        name: &str,
        descriptor: &Descriptor,
    ) -> Result<IdentityRecord, StoreError>;

    /// Every stored descriptor, in insertion order.
    fn all(&self) -> Result<Vec<GalleryEntry>, StoreError>;
}

impl IdentityStore for SqliteStore {
    fn find_by_email(&self, email: &str) -> Result<Option<IdentityRecord>, StoreError> {
        let conn = self.conn();
        let row = conn
            .query_row(
                "SELECT email, name, face_embedding, created_at FROM users WHERE email = ?1",
                [email],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, Option<String>>(1)?.unwrap_or_default(),
                        row.get::<_, Option<Vec<u8>>>(2)?.unwrap_or_default(),
                        row.get::<_, Option<String>>(3)?,
                    ))
                },
            )
            .optional()?;

        let Some((email, name, blob, created_at)) = row else {
            return Ok(None);
        };
        let descriptor = Descriptor::from_le_bytes(&blob).map_err(|e| StoreError::CorruptDescriptor {
            email: email.clone(),
            reason: e.to_string(),
        })?;

        Ok(Some(IdentityRecord {
            email,
            name,
            descriptor,
            created_at,
        }))
    }

    fn insert(
        &self,
        email: &str,
        name: &str,
        descriptor: &Descriptor,
    ) -> Result<IdentityRecord, StoreError> {
        let conn = self.conn();
        let created_at = chrono::Utc::now().to_rfc3339();
        // UNIQUE(email) decides races between handles and processes; there
        // is no separate existence check.
        let inserted = conn.execute(
            "INSERT INTO users (email, name, face_embedding, created_at) VALUES (?1, ?2, ?3, ?4)",
            rusqlite::params![email, name, descriptor.to_le_bytes(), created_at],
        );
        match inserted {
            Err(rusqlite::Error::SqliteFailure(e, _)) if is_unique_violation(&e) => {
                tracing::info!(email, "identity already stored");
                return Err(StoreError::Duplicate(email.to_string()));
            }
            other => {
                other?;
            }
        }

        tracing::info!(email, "identity stored");
        Ok(IdentityRecord {
            email: email.to_string(),
            name: name.to_string(),
            descriptor: descriptor.clone(),
            created_at: Some(created_at),
        })
    }

    fn all(&self) -> Result<Vec<GalleryEntry>, StoreError> {
        let conn = self.conn();
        let mut stmt = conn.prepare("SELECT email, face_embedding FROM users ORDER BY id")?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, Option<Vec<u8>>>(1)?))
        })?;

        let mut gallery = Vec::new();
        for row in rows {
            let (email, blob) = row?;
            let Some(blob) = blob else {
                tracing::warn!(email = %email, "skipping identity without descriptor");
                continue;
            };
            match Descriptor::from_le_bytes(&blob) {
                Ok(descriptor) => gallery.push(GalleryEntry { email, descriptor }),
                Err(e) => tracing::warn!(email = %email, error = %e, "skipping corrupt descriptor"),
            }
        }
        Ok(gallery)
    }
}

fn is_unique_violation(e: &rusqlite::ffi::Error) -> bool {
    e.code == ErrorCode::ConstraintViolation
        && e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
}
