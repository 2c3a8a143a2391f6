use chrono::Utc;
use mind_core::{
    Drone, MindError, Mind, Result, RuntimeToolSpec, Task, TaskStatus, Trace, TraceEvent,
    format_timestamp,
};
use rusqlite::{OptionalExtension, Row, params};
use tracing::debug;

use crate::db::{Database, db_err, parse_json, parse_ts};

const MIND_COLUMNS: &str = "id, name, personality, preferences, system_prompt, charter, created_at";
const TASK_COLUMNS: &str = "id, mind_id, description, status, result, created_at, completed_at";
const DRONE_COLUMNS: &str =
    "id, mind_id, task_id, objective, status, result, created_at, completed_at";

/// Which trace table a trace belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TraceKind {
    Task,
    Drone,
}

impl TraceKind {
    fn table(&self) -> (&'static str, &'static str) {
        match self {
            TraceKind::Task => ("task_traces", "task_id"),
            TraceKind::Drone => ("drone_traces", "drone_id"),
        }
    }
}

/// Identities, tasks, drones, their traces, and runtime tool specs.
#[derive(Debug, Clone)]
pub struct MindStore {
    db: Database,
}

impl MindStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    // ── Minds ──────────────────────────────────────────────────

    /// Insert or replace a Mind.
    pub fn save_mind(&self, mind: &Mind) -> Result<()> {
        let conn = self.db.conn()?;
        conn.execute(
            "INSERT INTO minds (id, name, personality, preferences, system_prompt, charter, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
             ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                personality = excluded.personality,
                preferences = excluded.preferences,
                system_prompt = excluded.system_prompt,
                charter = excluded.charter",
            params![
                mind.id,
                mind.name,
                mind.personality,
                serde_json::to_string(&mind.preferences)?,
                mind.system_prompt,
                serde_json::to_string(&mind.charter)?,
                format_timestamp(&mind.created_at),
            ],
        )
        .map_err(db_err)?;
        Ok(())
    }

    pub fn get_mind(&self, id: &str) -> Result<Option<Mind>> {
        let conn = self.db.conn()?;
        conn.query_row(
            &format!("SELECT {MIND_COLUMNS} FROM minds WHERE id = ?1"),
            params![id],
            row_to_mind,
        )
        .optional()
        .map_err(db_err)
    }

    pub fn list_minds(&self) -> Result<Vec<Mind>> {
        let conn = self.db.conn()?;
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {MIND_COLUMNS} FROM minds ORDER BY created_at, rowid"
            ))
            .map_err(db_err)?;
        let rows = stmt.query_map([], row_to_mind).map_err(db_err)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(db_err)
    }

    // ── Tasks ──────────────────────────────────────────────────

    /// Insert or update a task.
    pub fn save_task(&self, task: &Task) -> Result<()> {
        let conn = self.db.conn()?;
        conn.execute(
            "INSERT INTO tasks (id, mind_id, description, status, result, created_at, completed_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
             ON CONFLICT(id) DO UPDATE SET
                status = excluded.status,
                result = excluded.result,
                completed_at = excluded.completed_at",
            params![
                task.id,
                task.mind_id,
                task.description,
                task.status.as_str(),
                task.result,
                format_timestamp(&task.created_at),
                task.completed_at.as_ref().map(format_timestamp),
            ],
        )
        .map_err(db_err)?;
        debug!(task = %task.id, status = %task.status, "task saved");
        Ok(())
    }

    pub fn get_task(&self, mind_id: &str, task_id: &str) -> Result<Option<Task>> {
        let conn = self.db.conn()?;
        conn.query_row(
            &format!("SELECT {TASK_COLUMNS} FROM tasks WHERE mind_id = ?1 AND id = ?2"),
            params![mind_id, task_id],
            row_to_task,
        )
        .optional()
        .map_err(db_err)
    }

    /// Tasks of one Mind, newest first.
    pub fn list_tasks(&self, mind_id: &str) -> Result<Vec<Task>> {
        let conn = self.db.conn()?;
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {TASK_COLUMNS} FROM tasks WHERE mind_id = ?1
                 ORDER BY created_at DESC, rowid DESC"
            ))
            .map_err(db_err)?;
        let rows = stmt.query_map(params![mind_id], row_to_task).map_err(db_err)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(db_err)
    }

    /// Most recent task of a Mind other than `exclude`.
    pub fn latest_task(&self, mind_id: &str, exclude: Option<&str>) -> Result<Option<Task>> {
        let conn = self.db.conn()?;
        conn.query_row(
            &format!(
                "SELECT {TASK_COLUMNS} FROM tasks
                 WHERE mind_id = ?1 AND (?2 IS NULL OR id != ?2)
                 ORDER BY created_at DESC, rowid DESC LIMIT 1"
            ),
            params![mind_id, exclude],
            row_to_task,
        )
        .optional()
        .map_err(db_err)
    }

    // ── Drones ─────────────────────────────────────────────────

    pub fn save_drone(&self, drone: &Drone) -> Result<()> {
        let conn = self.db.conn()?;
        conn.execute(
            "INSERT INTO drones (id, mind_id, task_id, objective, status, result, created_at, completed_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
             ON CONFLICT(id) DO UPDATE SET
                status = excluded.status,
                result = excluded.result,
                completed_at = excluded.completed_at",
            params![
                drone.id,
                drone.mind_id,
                drone.task_id,
                drone.objective,
                drone.status.as_str(),
                drone.result,
                format_timestamp(&drone.created_at),
                drone.completed_at.as_ref().map(format_timestamp),
            ],
        )
        .map_err(db_err)?;
        Ok(())
    }

    pub fn get_drone(&self, mind_id: &str, drone_id: &str) -> Result<Option<Drone>> {
        let conn = self.db.conn()?;
        conn.query_row(
            &format!("SELECT {DRONE_COLUMNS} FROM drones WHERE mind_id = ?1 AND id = ?2"),
            params![mind_id, drone_id],
            row_to_drone,
        )
        .optional()
        .map_err(db_err)
    }

    /// Drones of one Mind in creation order, optionally for one parent task.
    pub fn list_drones(&self, mind_id: &str, task_id: Option<&str>) -> Result<Vec<Drone>> {
        let conn = self.db.conn()?;
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {DRONE_COLUMNS} FROM drones
                 WHERE mind_id = ?1 AND (?2 IS NULL OR task_id = ?2)
                 ORDER BY created_at, rowid"
            ))
            .map_err(db_err)?;
        let rows = stmt
            .query_map(params![mind_id, task_id], row_to_drone)
            .map_err(db_err)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(db_err)
    }

    // ── Traces ─────────────────────────────────────────────────

    /// Write (or overwrite) the trace of a task or drone run.
    pub fn save_trace(
        &self,
        kind: TraceKind,
        mind_id: &str,
        run_id: &str,
        events: &[TraceEvent],
    ) -> Result<()> {
        let (table, key) = kind.table();
        let conn = self.db.conn()?;
        conn.execute(
            &format!(
                "INSERT INTO {table} (mind_id, {key}, events, created_at) VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(mind_id, {key}) DO UPDATE SET events = excluded.events"
            ),
            params![
                mind_id,
                run_id,
                serde_json::to_string(events)?,
                format_timestamp(&Utc::now()),
            ],
        )
        .map_err(db_err)?;
        debug!(mind = %mind_id, run = %run_id, events = events.len(), table, "trace saved");
        Ok(())
    }

    pub fn get_trace(&self, kind: TraceKind, mind_id: &str, run_id: &str) -> Result<Option<Trace>> {
        let (table, key) = kind.table();
        let conn = self.db.conn()?;
        let raw: Option<String> = conn
            .query_row(
                &format!("SELECT events FROM {table} WHERE mind_id = ?1 AND {key} = ?2"),
                params![mind_id, run_id],
                |row| row.get(0),
            )
            .optional()
            .map_err(db_err)?;
        match raw {
            Some(raw) => Ok(Some(Trace {
                mind_id: mind_id.to_string(),
                run_id: run_id.to_string(),
                events: serde_json::from_str(&raw)?,
            })),
            None => Ok(None),
        }
    }

    // ── Runtime tools ──────────────────────────────────────────

    /// Register a runtime tool. Fails with `Validation` if the name is taken.
    pub fn save_runtime_tool(&self, mind_id: &str, spec: &RuntimeToolSpec) -> Result<()> {
        let conn = self.db.conn()?;
        let inserted = conn
            .execute(
                "INSERT INTO runtime_tools (mind_id, name, description, response, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT(mind_id, name) DO NOTHING",
                params![
                    mind_id,
                    spec.name,
                    spec.description,
                    spec.response,
                    format_timestamp(&Utc::now()),
                ],
            )
            .map_err(db_err)?;
        if inserted == 0 {
            return Err(MindError::Validation(format!(
                "runtime tool '{}' already exists",
                spec.name
            )));
        }
        Ok(())
    }

    /// Runtime tools of a Mind, sorted by name.
    pub fn list_runtime_tools(&self, mind_id: &str) -> Result<Vec<RuntimeToolSpec>> {
        let conn = self.db.conn()?;
        let mut stmt = conn
            .prepare(
                "SELECT name, description, response FROM runtime_tools
                 WHERE mind_id = ?1 ORDER BY name",
            )
            .map_err(db_err)?;
        let rows = stmt
            .query_map(params![mind_id], |row| {
                Ok(RuntimeToolSpec {
                    name: row.get(0)?,
                    description: row.get(1)?,
                    response: row.get(2)?,
                })
            })
            .map_err(db_err)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(db_err)
    }
}

// ── Row mappers ────────────────────────────────────────────────

fn parse_status(raw: &str) -> rusqlite::Result<TaskStatus> {
    raw.parse().map_err(|e: MindError| {
        rusqlite::Error::FromSqlConversionFailure(
            0,
            rusqlite::types::Type::Text,
            Box::new(std::io::Error::other(e.to_string())),
        )
    })
}

fn opt_ts(raw: Option<String>) -> rusqlite::Result<Option<chrono::DateTime<Utc>>> {
    raw.as_deref().map(parse_ts).transpose()
}

fn row_to_mind(row: &Row<'_>) -> rusqlite::Result<Mind> {
    let preferences: String = row.get(3)?;
    let charter: String = row.get(5)?;
    let created_at: String = row.get(6)?;
    Ok(Mind {
        id: row.get(0)?,
        name: row.get(1)?,
        personality: row.get(2)?,
        preferences: parse_json(&preferences)?,
        system_prompt: row.get(4)?,
        charter: parse_json(&charter)?,
        created_at: parse_ts(&created_at)?,
    })
}

fn row_to_task(row: &Row<'_>) -> rusqlite::Result<Task> {
    let status: String = row.get(3)?;
    let created_at: String = row.get(5)?;
    Ok(Task {
        id: row.get(0)?,
        mind_id: row.get(1)?,
        description: row.get(2)?,
        status: parse_status(&status)?,
        result: row.get(4)?,
        created_at: parse_ts(&created_at)?,
        completed_at: opt_ts(row.get(6)?)?,
    })
}

fn row_to_drone(row: &Row<'_>) -> rusqlite::Result<Drone> {
    let status: String = row.get(4)?;
    let created_at: String = row.get(6)?;
    Ok(Drone {
        id: row.get(0)?,
        mind_id: row.get(1)?,
        task_id: row.get(2)?,
        objective: row.get(3)?,
        status: parse_status(&status)?,
        result: row.get(5)?,
        created_at: parse_ts(&created_at)?,
        completed_at: opt_ts(row.get(7)?)?,
    })
}
