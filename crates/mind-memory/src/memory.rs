use mind_core::{MemoryEntry, Result, format_timestamp};
use rusqlite::{Connection, OptionalExtension, Row, params};
use tracing::{debug, warn};

use crate::db::{Database, db_err, parse_json, parse_ts};

const COLUMNS: &str = "m.id, m.mind_id, m.content, m.category, m.relevance_keywords, m.created_at";

/// Long-term memory entries, isolated per identity, with full-text search.
#[derive(Debug, Clone)]
pub struct MemoryStore {
    db: Database,
}

impl MemoryStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Persist an entry. The FTS index follows via triggers in the same statement.
    pub fn save(&self, entry: &MemoryEntry) -> Result<()> {
        let conn = self.db.conn()?;
        conn.execute(
            "INSERT INTO memories (id, mind_id, content, category, relevance_keywords, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                entry.id,
                entry.mind_id,
                entry.content,
                entry.category,
                serde_json::to_string(&entry.relevance_keywords)?,
                format_timestamp(&entry.created_at),
            ],
        )
        .map_err(db_err)?;
        debug!(mind = %entry.mind_id, memory = %entry.id, category = ?entry.category, "memory saved");
        Ok(())
    }

    pub fn get(&self, mind_id: &str, id: &str) -> Result<Option<MemoryEntry>> {
        let conn = self.db.conn()?;
        conn.query_row(
            &format!("SELECT {COLUMNS} FROM memories m WHERE m.mind_id = ?1 AND m.id = ?2"),
            params![mind_id, id],
            row_to_entry,
        )
        .optional()
        .map_err(db_err)
    }

    /// Delete an entry. Returns whether anything was removed.
    pub fn delete(&self, mind_id: &str, id: &str) -> Result<bool> {
        let conn = self.db.conn()?;
        let removed = conn
            .execute(
                "DELETE FROM memories WHERE mind_id = ?1 AND id = ?2",
                params![mind_id, id],
            )
            .map_err(db_err)?;
        Ok(removed > 0)
    }

    /// Entries for one identity, newest first, optionally filtered by category.
    pub fn list(
        &self,
        mind_id: &str,
        category: Option<&str>,
        limit: Option<usize>,
    ) -> Result<Vec<MemoryEntry>> {
        let conn = self.db.conn()?;
        let limit = limit.map(sql_limit).unwrap_or(-1);
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {COLUMNS} FROM memories m
                 WHERE m.mind_id = ?1 AND (?2 IS NULL OR m.category = ?2)
                 ORDER BY m.created_at DESC, m.seq DESC
                 LIMIT ?3"
            ))
            .map_err(db_err)?;
        let rows = stmt
            .query_map(params![mind_id, category, limit], row_to_entry)
            .map_err(db_err)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(db_err)
    }

    /// Most recent entry in a category.
    pub fn latest_in_category(&self, mind_id: &str, category: &str) -> Result<Option<MemoryEntry>> {
        Ok(self
            .list(mind_id, Some(category), Some(1))?
            .into_iter()
            .next())
    }

    /// Ranked full-text search, falling back to a recency-ordered substring scan.
    pub fn search(&self, mind_id: &str, query: &str, top_k: usize) -> Result<Vec<MemoryEntry>> {
        let query = query.trim();
        if query.is_empty() || top_k == 0 {
            return Ok(vec![]);
        }
        let conn = self.db.conn()?;

        let fts_query = build_fts_query(query);
        if !fts_query.is_empty() {
            match fts_search(&conn, mind_id, &fts_query, top_k) {
                Ok(hits) if !hits.is_empty() => return Ok(hits),
                Ok(_) => {}
                Err(e) => warn!(error = %e, "FTS query failed, using substring scan"),
            }
        }

        debug!(mind = %mind_id, "no FTS hits, falling back to substring scan");
        substring_search(&conn, mind_id, query, top_k)
    }
}

/// Quote each lowercase alphanumeric run and OR them together.
pub fn build_fts_query(query: &str) -> String {
    tokenize(query)
        .into_iter()
        .map(|t| format!("\"{t}\""))
        .collect::<Vec<_>>()
        .join(" OR ")
}

/// Lowercase runs of Unicode alphanumeric characters.
pub fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
        .collect()
}

fn fts_search(
    conn: &Connection,
    mind_id: &str,
    fts_query: &str,
    top_k: usize,
) -> rusqlite::Result<Vec<MemoryEntry>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {COLUMNS} FROM memories_fts f
         JOIN memories m ON m.seq = f.rowid
         WHERE memories_fts MATCH ?1 AND m.mind_id = ?2
         ORDER BY bm25(memories_fts), m.seq DESC
         LIMIT ?3"
    ))?;
    let rows = stmt.query_map(params![fts_query, mind_id, sql_limit(top_k)], row_to_entry)?;
    rows.collect()
}

fn substring_search(
    conn: &Connection,
    mind_id: &str,
    query: &str,
    top_k: usize,
) -> Result<Vec<MemoryEntry>> {
    let pattern = format!("%{}%", escape_like(query));
    let mut stmt = conn
        .prepare(&format!(
            "SELECT {COLUMNS} FROM memories m
             WHERE m.mind_id = ?1
               AND (m.content LIKE ?2 ESCAPE '\\' OR m.relevance_keywords LIKE ?2 ESCAPE '\\')
             ORDER BY m.created_at DESC, m.seq DESC
             LIMIT ?3"
        ))
        .map_err(db_err)?;
    let rows = stmt
        .query_map(params![mind_id, pattern, sql_limit(top_k)], row_to_entry)
        .map_err(db_err)?;
    rows.collect::<rusqlite::Result<Vec<_>>>().map_err(db_err)
}

/// SQLite reads a negative LIMIT as "no limit".
fn sql_limit(n: usize) -> i64 {
    i64::try_from(n).unwrap_or(i64::MAX)
}

fn escape_like(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        if matches!(c, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

fn row_to_entry(row: &Row<'_>) -> rusqlite::Result<MemoryEntry> {
    let keywords: String = row.get(4)?;
    let created_at: String = row.get(5)?;
    Ok(MemoryEntry {
        id: row.get(0)?,
        mind_id: row.get(1)?,
        content: row.get(2)?,
        category: row.get(3)?,
        relevance_keywords: parse_json(&keywords)?,
        created_at: parse_ts(&created_at)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tokenize_unicode() {
        assert_eq!(tokenize("Hello, World! v2"), vec!["hello", "world", "v2"]);
        assert_eq!(tokenize("Größe café"), vec!["größe", "café"]);
        assert_eq!(tokenize("東京 タワー"), vec!["東京", "タワー"]);
        assert!(tokenize("  !!  ").is_empty());
    }

    #[test]
    fn test_build_fts_query_quotes_tokens() {
        assert_eq!(build_fts_query("rust AND tokio"), "\"rust\" OR \"and\" OR \"tokio\"");
        assert_eq!(build_fts_query("\"quoted\" -x*"), "\"quoted\" OR \"x\"");
    }

    #[test]
    fn test_escape_like() {
        assert_eq!(escape_like("100%_a\\b"), "100\\%\\_a\\\\b");
    }
}
