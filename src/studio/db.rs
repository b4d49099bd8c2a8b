use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use rusqlite::{Connection, OptionalExtension, Row, params};

use super::models::*;
use crate::errors::StudioError;

/// SQL expression for the current UTC time with millisecond precision.
/// Every timestamp column uses this format so text comparison orders by time.
const NOW: &str = "strftime('%Y-%m-%dT%H:%M:%fZ', 'now')";

/// Format a chrono timestamp the same way `NOW` does, for cutoff comparisons.
pub fn format_timestamp(ts: chrono::DateTime<chrono::Utc>) -> String {
    ts.format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string()
}

/// Async-safe handle to the studio database.
///
/// Wraps `StudioDb` behind `Arc<Mutex>` and runs all access on tokio's
/// blocking thread pool via `spawn_blocking`, so synchronous SQLite I/O never
/// ties up async worker threads.
#[derive(Clone)]
pub struct DbHandle {
    inner: Arc<std::sync::Mutex<StudioDb>>,
}

impl DbHandle {
    pub fn new(db: StudioDb) -> Self {
        Self {
            inner: Arc::new(std::sync::Mutex::new(db)),
        }
    }

    /// Run a closure with access to the database on a blocking thread.
    /// All data passed into `f` must be owned (`'static`).
    pub async fn call<F, R>(&self, f: F) -> Result<R>
    where
        F: FnOnce(&StudioDb) -> Result<R> + Send + 'static,
        R: Send + 'static,
    {
        let db = self.inner.clone();
        tokio::task::spawn_blocking(move || {
            let guard = db.lock().map_err(|_| StudioError::LockPoisoned)?;
            f(&guard)
        })
        .await
        .context("DB task panicked")?
    }

    /// Acquire the database mutex synchronously. Only for startup code and
    /// tests; never from a hot async path.
    pub fn lock_sync(&self) -> Result<std::sync::MutexGuard<'_, StudioDb>> {
        self.inner
            .lock()
            .map_err(|_| StudioError::LockPoisoned.into())
    }
}

pub struct StudioDb {
    conn: Connection,
}

fn user_from_row(row: &Row<'_>) -> rusqlite::Result<User> {
    Ok(User {
        id: row.get(0)?,
        email: row.get(1)?,
        password_hash: row.get(2)?,
        created_at: row.get(3)?,
    })
}

fn client_from_row(row: &Row<'_>) -> rusqlite::Result<Client> {
    Ok(Client {
        id: row.get(0)?,
        name: row.get(1)?,
        user_id: row.get(2)?,
        created_at: row.get(3)?,
    })
}

fn project_from_row(row: &Row<'_>) -> rusqlite::Result<Project> {
    Ok(Project {
        id: row.get(0)?,
        name: row.get(1)?,
        user_id: row.get(2)?,
        created_at: row.get(3)?,
    })
}

fn briefing_from_row(row: &Row<'_>) -> rusqlite::Result<Briefing> {
    Ok(Briefing {
        id: row.get(0)?,
        client_id: row.get(1)?,
        project_id: row.get(2)?,
        content: row.get(3)?,
        created_at: row.get(4)?,
    })
}

fn run_row_from_row(row: &Row<'_>) -> rusqlite::Result<RunRow> {
    Ok(RunRow {
        id: row.get(0)?,
        project_id: row.get(1)?,
        run_type: row.get(2)?,
        status: row.get(3)?,
        briefing_id: row.get(4)?,
        created_at: row.get(5)?,
        updated_at: row.get(6)?,
    })
}

fn roadmap_from_row(row: &Row<'_>) -> rusqlite::Result<Roadmap> {
    Ok(Roadmap {
        id: row.get(0)?,
        briefing_id: row.get(1)?,
        run_id: row.get(2)?,
        content: row.get(3)?,
        created_at: row.get(4)?,
    })
}

const RUN_COLUMNS: &str =
    "r.id, r.project_id, r.run_type, r.status, r.briefing_id, r.created_at, r.updated_at";

impl StudioDb {
    /// Open (or create) a SQLite database at the given path and run migrations.
    pub fn new(path: &Path) -> Result<Self> {
        let conn = Connection::open(path).context("Failed to open SQLite database")?;
        let db = Self { conn };
        db.init()?;
        Ok(db)
    }

    /// Create an in-memory SQLite database (for testing).
    pub fn new_in_memory() -> Result<Self> {
        let conn =
            Connection::open_in_memory().context("Failed to open in-memory SQLite database")?;
        let db = Self { conn };
        db.init()?;
        Ok(db)
    }

    fn init(&self) -> Result<()> {
        self.conn
            .execute_batch("PRAGMA foreign_keys = ON;")
            .context("Failed to enable foreign keys")?;
        self.run_migrations().context("Failed to run migrations")?;
        Ok(())
    }

    fn run_migrations(&self) -> Result<()> {
        let schema = format!(
            "
            CREATE TABLE IF NOT EXISTS users (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                email TEXT NOT NULL UNIQUE,
                password_hash TEXT NOT NULL,
                created_at TEXT NOT NULL DEFAULT ({now})
            );

            CREATE TABLE IF NOT EXISTS clients (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL,
                user_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                created_at TEXT NOT NULL DEFAULT ({now})
            );

            CREATE TABLE IF NOT EXISTS projects (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL,
                user_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                created_at TEXT NOT NULL DEFAULT ({now})
            );

            CREATE TABLE IF NOT EXISTS briefings (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                client_id INTEGER REFERENCES clients(id) ON DELETE SET NULL,
                project_id INTEGER REFERENCES projects(id) ON DELETE SET NULL,
                content TEXT NOT NULL,
                created_at TEXT NOT NULL DEFAULT ({now})
            );

            CREATE TABLE IF NOT EXISTS runs (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                project_id INTEGER NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
                run_type TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'pending',
                briefing_id INTEGER REFERENCES briefings(id) ON DELETE SET NULL,
                created_at TEXT NOT NULL DEFAULT ({now}),
                updated_at TEXT NOT NULL DEFAULT ({now})
            );

            CREATE TABLE IF NOT EXISTS agent_logs (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                run_id INTEGER NOT NULL REFERENCES runs(id) ON DELETE CASCADE,
                agent_name TEXT NOT NULL,
                level TEXT NOT NULL,
                message TEXT NOT NULL,
                payload TEXT,
                created_at TEXT NOT NULL DEFAULT ({now})
            );

            CREATE TABLE IF NOT EXISTS roadmaps (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                briefing_id INTEGER NOT NULL REFERENCES briefings(id) ON DELETE CASCADE,
                run_id INTEGER REFERENCES runs(id) ON DELETE SET NULL,
                content TEXT NOT NULL,
                created_at TEXT NOT NULL DEFAULT ({now})
            );

            CREATE INDEX IF NOT EXISTS idx_clients_user ON clients(user_id);
            CREATE INDEX IF NOT EXISTS idx_projects_user ON projects(user_id);
            CREATE INDEX IF NOT EXISTS idx_briefings_project ON briefings(project_id);
            CREATE INDEX IF NOT EXISTS idx_runs_project ON runs(project_id);
            CREATE INDEX IF NOT EXISTS idx_runs_status ON runs(status);
            CREATE INDEX IF NOT EXISTS idx_agent_logs_run ON agent_logs(run_id, created_at);
            CREATE INDEX IF NOT EXISTS idx_roadmaps_run ON roadmaps(run_id);
            ",
            now = NOW
        );
        self.conn
            .execute_batch(&schema)
            .context("Failed to create tables")?;
        Ok(())
    }

    // ── Users ─────────────────────────────────────────────────────────

    /// Insert a user. Returns `None` when the email is already registered.
    pub fn create_user(&self, email: &str, password_hash: &str) -> Result<Option<User>> {
        let inserted = self
            .conn
            .execute(
                "INSERT INTO users (email, password_hash) VALUES (?1, ?2)
                 ON CONFLICT(email) DO NOTHING",
                params![email, password_hash],
            )
            .context("Failed to insert user")?;
        if inserted == 0 {
            return Ok(None);
        }
        let id = self.conn.last_insert_rowid();
        self.get_user(id)
    }

    pub fn get_user(&self, id: i64) -> Result<Option<User>> {
        self.conn
            .query_row(
                "SELECT id, email, password_hash, created_at FROM users WHERE id = ?1",
                params![id],
                user_from_row,
            )
            .optional()
            .context("Failed to query user")
    }

    pub fn find_user_by_email(&self, email: &str) -> Result<Option<User>> {
        self.conn
            .query_row(
                "SELECT id, email, password_hash, created_at FROM users WHERE email = ?1",
                params![email],
                user_from_row,
            )
            .optional()
            .context("Failed to query user by email")
    }

    // ── Clients ───────────────────────────────────────────────────────

    pub fn create_client(&self, user_id: i64, name: &str) -> Result<Client> {
        self.conn
            .execute(
                "INSERT INTO clients (name, user_id) VALUES (?1, ?2)",
                params![name, user_id],
            )
            .context("Failed to insert client")?;
        let id = self.conn.last_insert_rowid();
        self.get_client_for_user(id, user_id)?
            .context("Client not found after insert")
    }

    pub fn list_clients(&self, user_id: i64) -> Result<Vec<Client>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT id, name, user_id, created_at FROM clients
                 WHERE user_id = ?1 ORDER BY id DESC",
            )
            .context("Failed to prepare list_clients")?;
        let rows = stmt
            .query_map(params![user_id], client_from_row)
            .context("Failed to query clients")?;
        let mut clients = Vec::new();
        for row in rows {
            clients.push(row.context("Failed to read client row")?);
        }
        Ok(clients)
    }

    pub fn get_client_for_user(&self, id: i64, user_id: i64) -> Result<Option<Client>> {
        self.conn
            .query_row(
                "SELECT id, name, user_id, created_at FROM clients WHERE id = ?1 AND user_id = ?2",
                params![id, user_id],
                client_from_row,
            )
            .optional()
            .context("Failed to query client")
    }

    // ── Projects ──────────────────────────────────────────────────────

    pub fn create_project(&self, user_id: i64, name: &str) -> Result<Project> {
        self.conn
            .execute(
                "INSERT INTO projects (name, user_id) VALUES (?1, ?2)",
                params![name, user_id],
            )
            .context("Failed to insert project")?;
        let id = self.conn.last_insert_rowid();
        self.get_project_for_user(id, user_id)?
            .context("Project not found after insert")
    }

    /// Projects owned by `user_id`, newest first.
    pub fn list_projects(&self, user_id: i64) -> Result<Vec<Project>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT id, name, user_id, created_at FROM projects
                 WHERE user_id = ?1 ORDER BY id DESC",
            )
            .context("Failed to prepare list_projects")?;
        let rows = stmt
            .query_map(params![user_id], project_from_row)
            .context("Failed to query projects")?;
        let mut projects = Vec::new();
        for row in rows {
            projects.push(row.context("Failed to read project row")?);
        }
        Ok(projects)
    }

    pub fn get_project_for_user(&self, id: i64, user_id: i64) -> Result<Option<Project>> {
        self.conn
            .query_row(
                "SELECT id, name, user_id, created_at FROM projects WHERE id = ?1 AND user_id = ?2",
                params![id, user_id],
                project_from_row,
            )
            .optional()
            .context("Failed to query project")
    }

    // ── Briefings ─────────────────────────────────────────────────────

    pub fn create_briefing(
        &self,
        client_id: Option<i64>,
        project_id: Option<i64>,
        content: &str,
    ) -> Result<Briefing> {
        self.conn
            .execute(
                "INSERT INTO briefings (client_id, project_id, content) VALUES (?1, ?2, ?3)",
                params![client_id, project_id, content],
            )
            .context("Failed to insert briefing")?;
        let id = self.conn.last_insert_rowid();
        self.get_briefing(id)?
            .context("Briefing not found after insert")
    }

    pub fn get_briefing(&self, id: i64) -> Result<Option<Briefing>> {
        self.conn
            .query_row(
                "SELECT id, client_id, project_id, content, created_at FROM briefings WHERE id = ?1",
                params![id],
                briefing_from_row,
            )
            .optional()
            .context("Failed to query briefing")
    }

    /// Briefings reachable through a project or client owned by `user_id`.
    pub fn list_briefings_for_user(&self, user_id: i64) -> Result<Vec<Briefing>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT b.id, b.client_id, b.project_id, b.content, b.created_at
                 FROM briefings b
                 LEFT JOIN projects p ON p.id = b.project_id
                 LEFT JOIN clients c ON c.id = b.client_id
                 WHERE p.user_id = ?1 OR c.user_id = ?1
                 ORDER BY b.id DESC",
            )
            .context("Failed to prepare list_briefings_for_user")?;
        let rows = stmt
            .query_map(params![user_id], briefing_from_row)
            .context("Failed to query briefings")?;
        let mut briefings = Vec::new();
        for row in rows {
            briefings.push(row.context("Failed to read briefing row")?);
        }
        Ok(briefings)
    }

    /// A briefing is owned when every project or client it references belongs
    /// to `user_id`. Briefings referencing neither are owned by nobody.
    pub fn user_owns_briefing(&self, briefing: &Briefing, user_id: i64) -> Result<bool> {
        if briefing.project_id.is_none() && briefing.client_id.is_none() {
            return Ok(false);
        }
        if let Some(project_id) = briefing.project_id
            && self.get_project_for_user(project_id, user_id)?.is_none()
        {
            return Ok(false);
        }
        if let Some(client_id) = briefing.client_id
            && self.get_client_for_user(client_id, user_id)?.is_none()
        {
            return Ok(false);
        }
        Ok(true)
    }

    // ── Runs ──────────────────────────────────────────────────────────

    pub fn create_run(&self, project_id: i64, run_type: &str, briefing_id: i64) -> Result<Run> {
        self.conn
            .execute(
                "INSERT INTO runs (project_id, run_type, status, briefing_id) VALUES (?1, ?2, 'pending', ?3)",
                params![project_id, run_type, briefing_id],
            )
            .context("Failed to insert run")?;
        let id = self.conn.last_insert_rowid();
        self.get_run(id)?.context("Run not found after insert")
    }

    pub fn get_run(&self, id: i64) -> Result<Option<Run>> {
        let sql = format!("SELECT {} FROM runs r WHERE r.id = ?1", RUN_COLUMNS);
        let row = self
            .conn
            .query_row(&sql, params![id], run_row_from_row)
            .optional()
            .context("Failed to query run")?;
        row.map(RunRow::into_run).transpose()
    }

    /// Look up a run only if its project belongs to `user_id`.
    pub fn get_run_for_user(&self, id: i64, user_id: i64) -> Result<Option<Run>> {
        let sql = format!(
            "SELECT {} FROM runs r JOIN projects p ON p.id = r.project_id
             WHERE r.id = ?1 AND p.user_id = ?2",
            RUN_COLUMNS
        );
        let row = self
            .conn
            .query_row(&sql, params![id, user_id], run_row_from_row)
            .optional()
            .context("Failed to query run for user")?;
        row.map(RunRow::into_run).transpose()
    }

    /// Runs of a project, newest first.
    pub fn list_runs_for_project(&self, project_id: i64) -> Result<Vec<Run>> {
        let sql = format!(
            "SELECT {} FROM runs r WHERE r.project_id = ?1 ORDER BY r.id DESC",
            RUN_COLUMNS
        );
        self.query_runs(&sql, params![project_id])
    }

    /// Atomically move a run from `pending` to `running`.
    pub fn claim_run(&self, id: i64) -> Result<ClaimOutcome> {
        let changed = self
            .conn
            .execute(
                &format!(
                    "UPDATE runs SET status = 'running', updated_at = {} WHERE id = ?1 AND status = 'pending'",
                    NOW
                ),
                params![id],
            )
            .context("Failed to claim run")?;
        let run = self.get_run(id)?;
        Ok(match (changed, run) {
            (_, None) => ClaimOutcome::Missing,
            (1, Some(run)) => ClaimOutcome::Claimed(run),
            (_, Some(run)) => ClaimOutcome::NotPending(run.status),
        })
    }

    /// Persist the roadmap produced by a run and mark the run `done`, in one
    /// transaction. Fails if the run is no longer `running`.
    pub fn complete_run(&self, run_id: i64, briefing_id: i64, content: &str) -> Result<Roadmap> {
        // Safety: DbHandle's Mutex already guarantees single-threaded access.
        let tx = self
            .conn
            .unchecked_transaction()
            .context("Failed to begin transaction")?;

        let changed = tx
            .execute(
                &format!(
                    "UPDATE runs SET status = 'done', updated_at = {} WHERE id = ?1 AND status = 'running'",
                    NOW
                ),
                params![run_id],
            )
            .context("Failed to mark run done")?;
        if changed == 0 {
            anyhow::bail!("Run {} is no longer running", run_id);
        }

        tx.execute(
            "INSERT INTO roadmaps (briefing_id, run_id, content) VALUES (?1, ?2, ?3)",
            params![briefing_id, run_id, content],
        )
        .context("Failed to insert roadmap")?;
        let roadmap_id = tx.last_insert_rowid();

        tx.commit().context("Failed to commit run completion")?;
        self.get_roadmap(roadmap_id)?
            .context("Roadmap not found after insert")
    }

    /// Mark a `running` run `failed`. Returns false if the run was missing
    /// or not running.
    pub fn fail_run(&self, id: i64) -> Result<bool> {
        let changed = self
            .conn
            .execute(
                &format!(
                    "UPDATE runs SET status = 'failed', updated_at = {} WHERE id = ?1 AND status = 'running'",
                    NOW
                ),
                params![id],
            )
            .context("Failed to mark run failed")?;
        Ok(changed > 0)
    }

    /// Fail a `running` run and record `message` as an ERROR log entry, in one
    /// transaction. Returns false (and writes nothing) if the run was not
    /// running.
    pub fn fail_run_with_log(&self, id: i64, agent_name: &str, message: &str) -> Result<bool> {
        let tx = self
            .conn
            .unchecked_transaction()
            .context("Failed to begin transaction")?;
        if !self.fail_run(id)? {
            return Ok(false);
        }
        self.append_log(id, agent_name, LogLevel::Error, message, None)?;
        tx.commit().context("Failed to commit run failure")?;
        Ok(true)
    }

    pub fn runs_with_status(&self, status: RunStatus) -> Result<Vec<Run>> {
        let sql = format!(
            "SELECT {} FROM runs r WHERE r.status = ?1 ORDER BY r.id",
            RUN_COLUMNS
        );
        self.query_runs(&sql, params![status.as_str()])
    }

    /// Runs still `running` whose last status change is older than `cutoff`.
    pub fn stale_running_runs(&self, cutoff: &str) -> Result<Vec<Run>> {
        let sql = format!(
            "SELECT {} FROM runs r WHERE r.status = 'running' AND r.updated_at < ?1 ORDER BY r.id",
            RUN_COLUMNS
        );
        self.query_runs(&sql, params![cutoff])
    }

    pub fn pending_runs_of_type(&self, run_type: &str) -> Result<Vec<Run>> {
        let sql = format!(
            "SELECT {} FROM runs r WHERE r.status = 'pending' AND r.run_type = ?1 ORDER BY r.id",
            RUN_COLUMNS
        );
        self.query_runs(&sql, params![run_type])
    }

    fn query_runs(&self, sql: &str, params: impl rusqlite::Params) -> Result<Vec<Run>> {
        let mut stmt = self.conn.prepare(sql).context("Failed to prepare runs query")?;
        let rows = stmt
            .query_map(params, run_row_from_row)
            .context("Failed to query runs")?;
        let mut runs = Vec::new();
        for row in rows {
            runs.push(row.context("Failed to read run row")?.into_run()?);
        }
        Ok(runs)
    }

    // ── Agent logs ────────────────────────────────────────────────────

    pub fn append_log(
        &self,
        run_id: i64,
        agent_name: &str,
        level: LogLevel,
        message: &str,
        payload: Option<&str>,
    ) -> Result<AgentLog> {
        self.conn
            .execute(
                "INSERT INTO agent_logs (run_id, agent_name, level, message, payload) VALUES (?1, ?2, ?3, ?4, ?5)",
                params![run_id, agent_name, level.as_str(), message, payload],
            )
            .context("Failed to insert agent log")?;
        let id = self.conn.last_insert_rowid();
        let (id, run_id, agent_name, level, message, payload, created_at) = self
            .conn
            .query_row(
                "SELECT id, run_id, agent_name, level, message, payload, created_at FROM agent_logs WHERE id = ?1",
                params![id],
                |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        row.get::<_, i64>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                        row.get::<_, String>(4)?,
                        row.get::<_, Option<String>>(5)?,
                        row.get::<_, String>(6)?,
                    ))
                },
            )
            .context("Agent log not found after insert")?;
        Ok(AgentLog {
            id,
            run_id,
            agent_name,
            level: level.parse().map_err(|e: String| anyhow::anyhow!(e))?,
            message,
            payload,
            created_at,
        })
    }

    /// Log entries of a run in creation order.
    pub fn list_logs(&self, run_id: i64) -> Result<Vec<AgentLog>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT id, run_id, agent_name, level, message, payload, created_at
                 FROM agent_logs WHERE run_id = ?1 ORDER BY created_at ASC, id ASC",
            )
            .context("Failed to prepare list_logs")?;
        let rows = stmt
            .query_map(params![run_id], |row| {
                Ok((
                    AgentLog {
                        id: row.get(0)?,
                        run_id: row.get(1)?,
                        agent_name: row.get(2)?,
                        level: LogLevel::Info,
                        message: row.get(4)?,
                        payload: row.get(5)?,
                        created_at: row.get(6)?,
                    },
                    row.get::<_, String>(3)?,
                ))
            })
            .context("Failed to query agent logs")?;
        let mut logs = Vec::new();
        for row in rows {
            let (mut log, level) = row.context("Failed to read agent log row")?;
            log.level = level
                .parse()
                .map_err(|e: String| anyhow::anyhow!(e))
                .with_context(|| format!("Corrupt level on agent log {}", log.id))?;
            logs.push(log);
        }
        Ok(logs)
    }

    // ── Roadmaps ──────────────────────────────────────────────────────

    pub fn create_roadmap(
        &self,
        briefing_id: i64,
        run_id: Option<i64>,
        content: &str,
    ) -> Result<Roadmap> {
        self.conn
            .execute(
                "INSERT INTO roadmaps (briefing_id, run_id, content) VALUES (?1, ?2, ?3)",
                params![briefing_id, run_id, content],
            )
            .context("Failed to insert roadmap")?;
        let id = self.conn.last_insert_rowid();
        self.get_roadmap(id)?
            .context("Roadmap not found after insert")
    }

    pub fn get_roadmap(&self, id: i64) -> Result<Option<Roadmap>> {
        self.conn
            .query_row(
                "SELECT id, briefing_id, run_id, content, created_at FROM roadmaps WHERE id = ?1",
                params![id],
                roadmap_from_row,
            )
            .optional()
            .context("Failed to query roadmap")
    }

    /// Most recently created roadmap for a run.
    pub fn latest_roadmap_for_run(&self, run_id: i64) -> Result<Option<Roadmap>> {
        self.conn
            .query_row(
                "SELECT id, briefing_id, run_id, content, created_at FROM roadmaps
                 WHERE run_id = ?1 ORDER BY id DESC LIMIT 1",
                params![run_id],
                roadmap_from_row,
            )
            .optional()
            .context("Failed to query latest roadmap")
    }
}
