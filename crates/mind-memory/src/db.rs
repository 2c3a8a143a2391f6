use chrono::{DateTime, Utc};
use mind_core::{MindError, Result};
use rusqlite::Connection;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

/// Lock wait applied to every connection before `SQLITE_BUSY` is returned.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Handle to the SQLite database file.
///
/// Each operation opens its own connection; WAL mode lets concurrent
/// delegations read while one writes, and the busy timeout bounds lock waits.
#[derive(Debug, Clone)]
pub struct Database {
    path: PathBuf,
}

impl Database {
    /// Open or create the database and apply migrations.
    pub fn open(path: &Path) -> Result<Self> {
        info!(?path, "opening database");
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let db = Self {
            path: path.to_path_buf(),
        };
        let conn = db.conn()?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")
            .map_err(db_err)?;
        migrate(&conn)?;
        Ok(db)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Open a fresh connection with the shared pragmas applied.
    pub fn conn(&self) -> Result<Connection> {
        let conn = Connection::open(&self.path).map_err(db_err)?;
        conn.busy_timeout(BUSY_TIMEOUT).map_err(db_err)?;
        conn.execute_batch("PRAGMA foreign_keys=ON; PRAGMA synchronous=NORMAL;")
            .map_err(db_err)?;
        Ok(conn)
    }
}

/// Map a SQLite error into the storage variant.
pub(crate) fn db_err(e: rusqlite::Error) -> MindError {
    MindError::Storage(e.to_string())
}

/// Parse a stored timestamp inside a row mapper.
pub(crate) fn parse_ts(raw: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e))
        })
}

/// Decode a JSON column inside a row mapper.
pub(crate) fn parse_json<T: serde::de::DeserializeOwned>(raw: &str) -> rusqlite::Result<T> {
    serde_json::from_str(raw).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e))
    })
}

/// Create tables, the FTS shadow index, and its triggers. Safe to run repeatedly.
pub fn migrate(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS minds (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            personality TEXT NOT NULL DEFAULT '',
            preferences TEXT NOT NULL DEFAULT '{}',
            system_prompt TEXT NOT NULL DEFAULT '',
            created_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS tasks (
            id TEXT PRIMARY KEY,
            mind_id TEXT NOT NULL REFERENCES minds(id),
            description TEXT NOT NULL,
            status TEXT NOT NULL,
            result TEXT,
            created_at TEXT NOT NULL,
            completed_at TEXT
        );
        CREATE INDEX IF NOT EXISTS idx_tasks_mind ON tasks(mind_id, created_at);

        CREATE TABLE IF NOT EXISTS task_traces (
            mind_id TEXT NOT NULL,
            task_id TEXT NOT NULL,
            events TEXT NOT NULL,
            created_at TEXT NOT NULL,
            PRIMARY KEY (mind_id, task_id)
        );

        CREATE TABLE IF NOT EXISTS drones (
            id TEXT PRIMARY KEY,
            mind_id TEXT NOT NULL REFERENCES minds(id),
            task_id TEXT NOT NULL,
            objective TEXT NOT NULL,
            status TEXT NOT NULL,
            result TEXT,
            created_at TEXT NOT NULL,
            completed_at TEXT
        );
        CREATE INDEX IF NOT EXISTS idx_drones_mind ON drones(mind_id, task_id);

        CREATE TABLE IF NOT EXISTS drone_traces (
            mind_id TEXT NOT NULL,
            drone_id TEXT NOT NULL,
            events TEXT NOT NULL,
            created_at TEXT NOT NULL,
            PRIMARY KEY (mind_id, drone_id)
        );

        CREATE TABLE IF NOT EXISTS memories (
            seq INTEGER PRIMARY KEY AUTOINCREMENT,
            id TEXT NOT NULL UNIQUE,
            mind_id TEXT NOT NULL,
            content TEXT NOT NULL,
            category TEXT,
            relevance_keywords TEXT NOT NULL DEFAULT '[]',
            created_at TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_memories_mind ON memories(mind_id, category, created_at);

        CREATE VIRTUAL TABLE IF NOT EXISTS memories_fts USING fts5(
            content,
            relevance_keywords,
            content='memories',
            content_rowid='seq',
            tokenize='unicode61'
        );

        CREATE TRIGGER IF NOT EXISTS memories_ai AFTER INSERT ON memories BEGIN
            INSERT INTO memories_fts(rowid, content, relevance_keywords)
            VALUES (new.seq, new.content, new.relevance_keywords);
        END;

        CREATE TRIGGER IF NOT EXISTS memories_ad AFTER DELETE ON memories BEGIN
            INSERT INTO memories_fts(memories_fts, rowid, content, relevance_keywords)
            VALUES ('delete', old.seq, old.content, old.relevance_keywords);
        END;

        CREATE TRIGGER IF NOT EXISTS memories_au AFTER UPDATE ON memories BEGIN
            INSERT INTO memories_fts(memories_fts, rowid, content, relevance_keywords)
            VALUES ('delete', old.seq, old.content, old.relevance_keywords);
            INSERT INTO memories_fts(rowid, content, relevance_keywords)
            VALUES (new.seq, new.content, new.relevance_keywords);
        END;

        CREATE TABLE IF NOT EXISTS runtime_tools (
            mind_id TEXT NOT NULL,
            name TEXT NOT NULL,
            description TEXT NOT NULL,
            response TEXT NOT NULL,
            created_at TEXT NOT NULL,
            PRIMARY KEY (mind_id, name)
        );
        ",
    )
    .map_err(db_err)?;

    // Additive columns for databases created before they existed.
    ensure_column(conn, "minds", "charter", "TEXT NOT NULL DEFAULT '{}'")?;
    Ok(())
}

fn ensure_column(conn: &Connection, table: &str, column: &str, decl: &str) -> Result<()> {
    let mut stmt = conn
        .prepare(&format!("PRAGMA table_info({table})"))
        .map_err(db_err)?;
    let exists = stmt
        .query_map([], |row| row.get::<_, String>(1))
        .map_err(db_err)?
        .filter_map(|r| r.ok())
        .any(|name| name == column);
    if !exists {
        debug!(table, column, "adding column");
        conn.execute_batch(&format!("ALTER TABLE {table} ADD COLUMN {column} {decl}"))
            .map_err(db_err)?;
    }
    Ok(())
}
