use rusqlite::Connection;

// Table and column names are those of existing REAL ID databases, so an
// older `database.db` opens as-is.
const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS users (
    id              INTEGER PRIMARY KEY AUTOINCREMENT,
    email           TEXT NOT NULL UNIQUE,
    name            TEXT NOT NULL,
    face_embedding  BLOB NOT NULL,
    created_at      TEXT
);

CREATE TABLE IF NOT EXISTS passwords (
    id       INTEGER PRIMARY KEY AUTOINCREMENT,
    email    TEXT NOT NULL,
    service  TEXT NOT NULL,
    secret   TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_passwords_email ON passwords (email);
";

/// Create tables if they do not exist, then bring older layouts up to date.
/// Safe to run on every open.
pub(crate) fn migrate(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(SCHEMA)?;

    // Databases from before enrollment timestamps lack `created_at`.
    if !has_column(conn, "users", "created_at")? {
        conn.execute_batch("ALTER TABLE users ADD COLUMN created_at TEXT")?;
        tracing::info!("added users.created_at");
    }
    Ok(())
}

fn has_column(conn: &Connection, table: &str, column: &str) -> rusqlite::Result<bool> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({table})"))?;
    let names = stmt.query_map([], |row| row.get::<_, String>(1))?;
    for name in names {
        if name? == column {
            return Ok(true);
        }
    }
    Ok(false)
}
