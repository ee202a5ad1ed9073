//! Database connection and schema migration.
//!
//! A single SQLite connection is opened at startup and shared by the entry
//! and notification stores. Correctness under concurrent workers relies on
//! SQLite's atomic single-row insert/update semantics plus WAL mode.

use std::path::Path;
use std::sync::{Arc, Mutex};

use rusqlite::Connection;
use rusqlite::functions::FunctionFlags;

use formbox_core::error::{FormboxError, Result};

/// Shared connection handle.
pub type Db = Arc<Mutex<Connection>>;

/// Open (or create) the database and run migrations.
pub fn open(path: &Path) -> Result<Db> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let conn = Connection::open(path)
        .map_err(|e| FormboxError::Persistence(format!("DB open: {e}")))?;

    // WAL allows concurrent readers while a worker writes.
    conn.execute_batch(
        "PRAGMA journal_mode = WAL;
         PRAGMA synchronous = NORMAL;
         PRAGMA busy_timeout = 5000;",
    )
    .map_err(|e| FormboxError::Persistence(format!("DB pragma: {e}")))?;

    register_functions(&conn)?;
    migrate(&conn)?;
    tracing::debug!("Database ready at {}", path.display());
    Ok(Arc::new(Mutex::new(conn)))
}

/// In-memory database for tests.
pub fn open_in_memory() -> Result<Db> {
    let conn = Connection::open_in_memory()
        .map_err(|e| FormboxError::Persistence(format!("DB open: {e}")))?;
    register_functions(&conn)?;
    migrate(&conn)?;
    Ok(Arc::new(Mutex::new(conn)))
}

/// SQLite's built-in LOWER only folds ASCII; search needs full Unicode
/// folding ("ENVÍO" must match "envío").
fn register_functions(conn: &Connection) -> Result<()> {
    conn.create_scalar_function(
        "lower_utf8",
        1,
        FunctionFlags::SQLITE_UTF8 | FunctionFlags::SQLITE_DETERMINISTIC,
        |ctx| {
            let text = ctx.get::<String>(0)?;
            Ok(text.to_lowercase())
        },
    )
    .map_err(|e| FormboxError::Persistence(format!("DB function: {e}")))
}

fn migrate(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        -- Form submissions
        CREATE TABLE IF NOT EXISTS entries (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            form TEXT NOT NULL,
            submitted_on TEXT NOT NULL,
            form_data TEXT NOT NULL DEFAULT '{}',   -- JSON
            meta TEXT NOT NULL DEFAULT '{}'         -- JSON
        );
        CREATE INDEX IF NOT EXISTS idx_entries_form ON entries(form);

        -- Outbound notification records
        CREATE TABLE IF NOT EXISTS notifications (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            form TEXT NOT NULL DEFAULT '',
            entry_id INTEGER,
            email TEXT NOT NULL,
            created_on TEXT NOT NULL,
            status_log TEXT NOT NULL DEFAULT '[]',  -- JSON, newest first
            meta TEXT NOT NULL DEFAULT '{}'         -- JSON
        );
        CREATE INDEX IF NOT EXISTS idx_notifications_form ON notifications(form);
        CREATE INDEX IF NOT EXISTS idx_notifications_entry ON notifications(entry_id);
        CREATE INDEX IF NOT EXISTS idx_notifications_email ON notifications(email);
        ",
    )
    .map_err(|e| FormboxError::Persistence(format!("Migration: {e}")))
}

/// Escape LIKE wildcards so user search terms match literally.
pub(crate) fn escape_like(raw: &str) -> String {
    raw.replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_")
}
