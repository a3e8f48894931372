//! SQLite-backed run history.
//! Executors write every run twice: once as `running`, once with its final status.

use std::path::Path;
use std::sync::Mutex;

use async_trait::async_trait;
use cadence_core::error::{CadenceError, Result};
use cadence_core::traits::RunRecorder;
use cadence_core::types::{AgentRun, AgentRunStatus, AgentRunTrigger};
use chrono::{DateTime, SecondsFormat, Utc};

const RUN_COLUMNS: &str = "id, agent_id, workspace_id, trigger, status, prompt, output, error, model, created_at, updated_at";

/// SQLite store for agent runs.
pub struct RunDb {
    conn: Mutex<rusqlite::Connection>,
}

impl RunDb {
    /// Open or create the run database.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = rusqlite::Connection::open(path).map_err(db_err("open"))?;
        Self::with_connection(conn)
    }

    /// In-memory database, used by tests and dry runs.
    pub fn open_in_memory() -> Result<Self> {
        let conn = rusqlite::Connection::open_in_memory().map_err(db_err("open"))?;
        Self::with_connection(conn)
    }

    fn with_connection(conn: rusqlite::Connection) -> Result<Self> {
        let db = Self {
            conn: Mutex::new(conn),
        };
        db.migrate()?;
        Ok(db)
    }

    fn conn(&self) -> std::sync::MutexGuard<'_, rusqlite::Connection> {
        self.conn.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn migrate(&self) -> Result<()> {
        self.conn()
            .execute_batch(
                "
            CREATE TABLE IF NOT EXISTS agent_runs (
                id TEXT PRIMARY KEY,
                agent_id TEXT NOT NULL,
                workspace_id TEXT NOT NULL,
                trigger TEXT NOT NULL,          -- 'manual', 'schedule', 'webhook', 'workflow'
                status TEXT NOT NULL,           -- 'running', 'success', 'error', 'canceled'
                prompt TEXT NOT NULL DEFAULT '',
                output TEXT,
                error TEXT,
                model TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_agent_runs_agent
                ON agent_runs (workspace_id, agent_id, created_at);
         ",
            )
            .map_err(db_err("migration"))
    }

    /// Insert or replace a run by id.
    pub fn save_run(&self, run: &AgentRun) -> Result<()> {
        self.conn()
            .execute(
                &format!(
                    "INSERT OR REPLACE INTO agent_runs ({RUN_COLUMNS})
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)"
                ),
                rusqlite::params![
                    run.id,
                    run.agent_id,
                    run.workspace_id,
                    run.trigger.as_str(),
                    run.status.as_str(),
                    run.prompt,
                    run.output,
                    run.error,
                    run.model,
                    timestamp(&run.created_at),
                    timestamp(&run.updated_at),
                ],
            )
            .map_err(db_err("save run"))?;
        Ok(())
    }

    /// Runs of a workspace, optionally for one agent, newest first.
    pub fn list_runs(
        &self,
        workspace_id: &str,
        agent_id: Option<&str>,
        limit: usize,
    ) -> Result<Vec<AgentRun>> {
        let conn = self.conn();
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {RUN_COLUMNS} FROM agent_runs
                 WHERE workspace_id = ?1 AND (?2 IS NULL OR agent_id = ?2)
                 ORDER BY created_at DESC LIMIT ?3"
            ))
            .map_err(db_err("list runs"))?;

        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let rows = stmt
            .query_map(rusqlite::params![workspace_id, agent_id, limit], row_to_run)
            .map_err(db_err("list runs"))?;

        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(db_err("list runs"))
    }

    /// A single run by id.
    pub fn get_run(&self, id: &str) -> Result<Option<AgentRun>> {
        let conn = self.conn();
        let mut stmt = conn
            .prepare(&format!("SELECT {RUN_COLUMNS} FROM agent_runs WHERE id = ?1"))
            .map_err(db_err("get run"))?;
        let mut rows = stmt
            .query_map([id], row_to_run)
            .map_err(db_err("get run"))?;
        rows.next().transpose().map_err(db_err("get run"))
    }
}

fn row_to_run(row: &rusqlite::Row<'_>) -> rusqlite::Result<AgentRun> {
    let trigger: String = row.get(3)?;
    let status: String = row.get(4)?;
    let created_at: String = row.get(9)?;
    let updated_at: String = row.get(10)?;

    Ok(AgentRun {
        id: row.get(0)?,
        agent_id: row.get(1)?,
        workspace_id: row.get(2)?,
        trigger: AgentRunTrigger::parse(&trigger).unwrap_or(AgentRunTrigger::Manual),
        status: AgentRunStatus::parse(&status).unwrap_or(AgentRunStatus::Error),
        prompt: row.get(5)?,
        output: row.get(6)?,
        error: row.get(7)?,
        model: row.get(8)?,
        created_at: parse_time(&created_at),
        updated_at: parse_time(&updated_at),
    })
}

/// Fixed-width so `ORDER BY created_at` sorts chronologically.
fn timestamp(t: &DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_time(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|t| t.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

fn db_err(context: &'static str) -> impl Fn(rusqlite::Error) -> CadenceError {
    move |e| CadenceError::Database(format!("{context}: {e}"))
}

#[async_trait]
impl RunRecorder for RunDb {
    async fn save_agent_run(&self, run: &AgentRun) -> Result<()> {
        self.save_run(run)
    }

    async fn list_agent_runs(
        &self,
        workspace_id: &str,
        agent_id: Option<&str>,
        limit: usize,
    ) -> Result<Vec<AgentRun>> {
        self.list_runs(workspace_id, agent_id, limit)
    }
}
