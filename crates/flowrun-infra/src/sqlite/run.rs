//! SQLite run store implementation.
//!
//! Implements `RunStore` from `flowrun-core`. The workflow graph and the run
//! data are stored as JSON blobs; status, wake and stop times are columns so
//! the wait tracker and crash recovery can query them.

use chrono::{DateTime, SecondsFormat, Utc};
use flowrun_core::repository::run::RunStore;
use flowrun_types::error::RepositoryError;
use flowrun_types::run::{ExecutionMode, RunPatch, RunSnapshot, RunStatus, WaitingRun};
use sqlx::{QueryBuilder, Row, Sqlite};

use super::pool::DatabasePool;

/// SQLite-backed implementation of `RunStore`.
pub struct SqliteRunStore {
    pool: DatabasePool,
}

impl SqliteRunStore {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }

    /// Insert a new run, or replace a stored one with the same id.
    pub async fn save(&self, run: &RunSnapshot) -> Result<(), RepositoryError> {
        let workflow = to_json(&run.workflow, "workflow")?;
        let data = to_json(&run.data, "run data")?;

        sqlx::query(
            r#"INSERT INTO executions
               (id, workflow, data, mode, status, finished, started_at, stopped_at, wait_till)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
               ON CONFLICT(id) DO UPDATE SET
                 workflow = excluded.workflow,
                 data = excluded.data,
                 mode = excluded.mode,
                 status = excluded.status,
                 finished = excluded.finished,
                 started_at = excluded.started_at,
                 stopped_at = excluded.stopped_at,
                 wait_till = excluded.wait_till"#,
        )
        .bind(&run.id)
        .bind(&workflow)
        .bind(&data)
        .bind(run.mode.to_string())
        .bind(run.status.as_str())
        .bind(run.finished)
        .bind(format_datetime(&run.started_at))
        .bind(run.stopped_at.as_ref().map(format_datetime))
        .bind(run.wait_till.as_ref().map(format_datetime))
        .execute(&self.pool.writer)
        .await
        .map_err(|e| RepositoryError::Query(e.to_string()))?;

        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Internal row types
// ---------------------------------------------------------------------------

struct ExecutionRow {
    id: String,
    workflow: String,
    data: String,
    mode: String,
    status: String,
    finished: bool,
    started_at: String,
    stopped_at: Option<String>,
    wait_till: Option<String>,
}

impl ExecutionRow {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            workflow: row.try_get("workflow")?,
            data: row.try_get("data")?,
            mode: row.try_get("mode")?,
            status: row.try_get("status")?,
            finished: row.try_get("finished")?,
            started_at: row.try_get("started_at")?,
            stopped_at: row.try_get("stopped_at")?,
            wait_till: row.try_get("wait_till")?,
        })
    }

    fn into_snapshot(self) -> Result<RunSnapshot, RepositoryError> {
        let workflow = serde_json::from_str(&self.workflow)
            .map_err(|e| RepositoryError::Query(format!("invalid workflow JSON: {e}")))?;
        let data = serde_json::from_str(&self.data)
            .map_err(|e| RepositoryError::Query(format!("invalid run data JSON: {e}")))?;
        let mode: ExecutionMode = parse_tag(&self.mode, "execution mode")?;
        let status: RunStatus = parse_tag(&self.status, "run status")?;

        Ok(RunSnapshot {
            id: self.id,
            workflow,
            data,
            mode,
            status,
            finished: self.finished,
            started_at: parse_datetime(&self.started_at)?,
            stopped_at: self.stopped_at.as_deref().map(parse_datetime).transpose()?,
            wait_till: self.wait_till.as_deref().map(parse_datetime).transpose()?,
        })
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn parse_tag<T: serde::de::DeserializeOwned>(tag: &str, what: &str) -> Result<T, RepositoryError> {
    serde_json::from_value(serde_json::Value::String(tag.to_string()))
        .map_err(|_| RepositoryError::Query(format!("invalid {what}: {tag}")))
}

fn to_json<T: serde::Serialize>(value: &T, what: &str) -> Result<String, RepositoryError> {
    serde_json::to_string(value).map_err(|e| RepositoryError::Query(format!("serialize {what}: {e}")))
}

fn parse_datetime(s: &str) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| RepositoryError::Query(format!("invalid datetime: {e}")))
}

/// Fixed-width UTC form, so that text comparison in SQL is time comparison.
fn format_datetime(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Millis, true)
}

// ---------------------------------------------------------------------------
// RunStore impl
// ---------------------------------------------------------------------------

impl RunStore for SqliteRunStore {
    async fn find(&self, execution_id: &str) -> Result<Option<RunSnapshot>, RepositoryError> {
        let row = sqlx::query("SELECT * FROM executions WHERE id = ?")
            .bind(execution_id)
            .fetch_optional(&self.pool.reader)
            .await
            .map_err(|e| RepositoryError::Query(e.to_string()))?;

        match row {
            Some(row) => {
                let r = ExecutionRow::from_row(&row)
                    .map_err(|e| RepositoryError::Query(e.to_string()))?;
                Ok(Some(r.into_snapshot()?))
            }
            None => Ok(None),
        }
    }

    async fn update(&self, execution_id: &str, patch: RunPatch) -> Result<(), RepositoryError> {
        let mut builder: QueryBuilder<Sqlite> = QueryBuilder::new("UPDATE executions SET ");
        let mut columns = builder.separated(", ");

        if let Some(status) = patch.status {
            columns.push("status = ").push_bind_unseparated(status.as_str());
        }
        if let Some(finished) = patch.finished {
            columns.push("finished = ").push_bind_unseparated(finished);
        }
        if let Some(data) = &patch.data {
            columns
                .push("data = ")
                .push_bind_unseparated(to_json(data, "run data")?);
        }
        if let Some(stopped_at) = patch.stopped_at {
            columns
                .push("stopped_at = ")
                .push_bind_unseparated(stopped_at.as_ref().map(format_datetime));
        }
        if let Some(wait_till) = patch.wait_till {
            columns
                .push("wait_till = ")
                .push_bind_unseparated(wait_till.as_ref().map(format_datetime));
        }

        // An empty patch still reports unknown ids.
        columns.push("id = id");
        builder.push(" WHERE id = ").push_bind(execution_id);

        let result = builder
            .build()
            .execute(&self.pool.writer)
            .await
            .map_err(|e| RepositoryError::Query(e.to_string()))?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }

    async fn find_waiting(&self, before: DateTime<Utc>) -> Result<Vec<WaitingRun>, RepositoryError> {
        let rows = sqlx::query(
            r#"SELECT id, wait_till FROM executions
               WHERE finished = 0 AND wait_till IS NOT NULL AND wait_till <= ?
               ORDER BY wait_till ASC"#,
        )
        .bind(format_datetime(&before))
        .fetch_all(&self.pool.reader)
        .await
        .map_err(|e| RepositoryError::Query(e.to_string()))?;

        let mut waiting = Vec::with_capacity(rows.len());
        for row in &rows {
            let execution_id: String = row
                .try_get("id")
                .map_err(|e| RepositoryError::Query(e.to_string()))?;
            let wake_at: String = row
                .try_get("wait_till")
                .map_err(|e| RepositoryError::Query(e.to_string()))?;
            waiting.push(WaitingRun {
                execution_id,
                wake_at: parse_datetime(&wake_at)?,
            });
        }
        Ok(waiting)
    }

    async fn list_unfinished(&self) -> Result<Vec<String>, RepositoryError> {
        let rows: Vec<(String,)> = sqlx::query_as(
            r#"SELECT id FROM executions
               WHERE finished = 0
                 AND status NOT IN ('success', 'error', 'canceled', 'crashed')
                 AND wait_till IS NULL
               ORDER BY started_at ASC"#,
        )
        .fetch_all(&self.pool.reader)
        .await
        .map_err(|e| RepositoryError::Query(e.to_string()))?;

        Ok(rows.into_iter().map(|(id,)| id).collect())
    }
}
