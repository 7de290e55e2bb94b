// SQLite Task Store Implementation
//
// JSON1 stands in for Postgres arrays/jsonb: `depends_on`, `params`,
// `results`, `labels` and `max_concurrency` are JSON text; timestamps are
// epoch milliseconds. SQLite's single writer replaces row locks, which
// relaxes skip-locked selection but keeps claim atomicity and ordering.

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use serde_json::Value;
use sqlx::{Sqlite, SqlitePool, Transaction as SqlxTransaction};
use uuid::Uuid;

use conveyor_core::domain::{
    Job, JobStatus, JobTask, NewArtifact, NewEvent, NewJob, NewTask, Node, TaskArtifact,
    TaskEvent, Workflow,
};
use conveyor_core::error::{EngineError, Result};
use conveyor_core::port::{StoreTx, TaskStore};

// Helper to convert sqlx::Error to EngineError with structured information
fn map_sqlx_error(err: sqlx::Error) -> EngineError {
    match &err {
        sqlx::Error::Database(db_err) => {
            if let Some(code) = db_err.code() {
                let code_str = code.as_ref();

                // SQLite error codes: https://www.sqlite.org/rescode.html
                match code_str {
                    "2067" | "1555" => EngineError::Conflict(format!(
                        "unique constraint violation: {} ({})",
                        db_err.message(),
                        code_str
                    )),
                    "787" | "3850" => EngineError::Database(format!(
                        "foreign key constraint violation: {} ({})",
                        db_err.message(),
                        code_str
                    )),
                    "5" => EngineError::Database(format!(
                        "database locked (SQLITE_BUSY): {}",
                        db_err.message()
                    )),
                    _ => EngineError::Database(format!(
                        "database error [{}]: {}",
                        code_str,
                        db_err.message()
                    )),
                }
            } else {
                EngineError::Database(format!("database error: {}", db_err.message()))
            }
        }
        sqlx::Error::RowNotFound => EngineError::Database("row not found".to_string()),
        sqlx::Error::ColumnNotFound(col) => {
            EngineError::Database(format!("column not found: {col}"))
        }
        _ => EngineError::Database(err.to_string()),
    }
}

fn to_ms(ts: DateTime<Utc>) -> i64 {
    ts.timestamp_millis()
}

fn from_ms(ms: i64) -> Result<DateTime<Utc>> {
    Utc.timestamp_millis_opt(ms)
        .single()
        .ok_or_else(|| EngineError::Database(format!("timestamp out of range: {ms}")))
}

fn from_ms_opt(ms: Option<i64>) -> Result<Option<DateTime<Utc>>> {
    ms.map(from_ms).transpose()
}

fn parse_uuid(raw: &str) -> Result<Uuid> {
    Uuid::parse_str(raw).map_err(|e| EngineError::Database(format!("invalid uuid {raw:?}: {e}")))
}

fn parse_json(raw: &str) -> Result<Value> {
    serde_json::from_str(raw).map_err(EngineError::from)
}

fn error_info(code: &str, message: &str) -> String {
    serde_json::json!({"code": code, "message": message}).to_string()
}

pub struct SqliteTaskStore {
    pool: SqlitePool,
}

impl SqliteTaskStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TaskStore for SqliteTaskStore {
    async fn begin(&self) -> Result<Box<dyn StoreTx>> {
        let tx = self.pool.begin().await.map_err(map_sqlx_error)?;
        Ok(Box::new(SqliteStoreTx { tx }))
    }
}

pub struct SqliteStoreTx {
    tx: SqlxTransaction<'static, Sqlite>,
}

#[async_trait]
impl StoreTx for SqliteStoreTx {
    async fn commit(mut self: Box<Self>) -> Result<()> {
        self.tx.commit().await.map_err(map_sqlx_error)
    }

    async fn rollback(mut self: Box<Self>) -> Result<()> {
        self.tx.rollback().await.map_err(map_sqlx_error)
    }

    // -- workflows & jobs ---------------------------------------------------

    async fn insert_workflow(&mut self, workflow: &Workflow) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO workflows (id, name, version, steps, is_active, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(workflow.id.to_string())
        .bind(&workflow.name)
        .bind(workflow.version)
        .bind(serde_json::to_string(&workflow.steps)?)
        .bind(workflow.is_active)
        .bind(to_ms(workflow.created_at))
        .bind(to_ms(workflow.updated_at))
        .execute(&mut *self.tx)
        .await
        .map_err(map_sqlx_error)?;

        Ok(())
    }

    async fn fetch_workflow(&mut self, id: Uuid) -> Result<Option<Workflow>> {
        let row = sqlx::query_as::<_, WorkflowRow>("SELECT * FROM workflows WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(map_sqlx_error)?;

        row.map(WorkflowRow::into_workflow).transpose()
    }

    async fn enqueue_job(&mut self, job: &NewJob, now: DateTime<Utc>) -> Result<Job> {
        let order_seq: i64 = sqlx::query_scalar("SELECT COALESCE(MAX(order_seq), 0) + 1 FROM jobs")
            .fetch_one(&mut *self.tx)
            .await
            .map_err(map_sqlx_error)?;

        let id = Uuid::new_v4();
        sqlx::query(
            r#"
            INSERT INTO jobs (id, workflow_id, status, order_seq, priority, options,
                              progress, scheduled_at, created_at, updated_at)
            VALUES (?, ?, 'queued', ?, ?, ?, 0, ?, ?, ?)
            "#,
        )
        .bind(id.to_string())
        .bind(job.workflow_id.to_string())
        .bind(order_seq)
        .bind(job.priority)
        .bind(job.options.to_string())
        .bind(job.scheduled_at.map(to_ms))
        .bind(to_ms(now))
        .bind(to_ms(now))
        .execute(&mut *self.tx)
        .await
        .map_err(map_sqlx_error)?;

        Ok(Job {
            id,
            workflow_id: job.workflow_id,
            status: JobStatus::Queued,
            order_seq,
            priority: job.priority,
            options: job.options.clone(),
            progress: 0.0,
            current_task_key: None,
            scheduled_at: job.scheduled_at,
            error_code: None,
            error_message: None,
            created_at: now,
            updated_at: now,
            finished_at: None,
        })
    }

    async fn fetch_job(&mut self, id: Uuid) -> Result<Option<Job>> {
        let row = sqlx::query_as::<_, JobRow>("SELECT * FROM jobs WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(map_sqlx_error)?;

        row.map(JobRow::into_job).transpose()
    }

    async fn mark_job_running(&mut self, job_id: Uuid, now: DateTime<Utc>) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE jobs SET status = 'running', updated_at = ? WHERE id = ? AND status = 'queued'",
        )
        .bind(to_ms(now))
        .bind(job_id.to_string())
        .execute(&mut *self.tx)
        .await
        .map_err(map_sqlx_error)?;

        Ok(result.rows_affected() > 0)
    }

    async fn maybe_finish_job(
        &mut self,
        job_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Option<JobStatus>> {
        let non_terminal: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM job_tasks
            WHERE job_id = ? AND status IN ('queued', 'starting', 'running')
            "#,
        )
        .bind(job_id.to_string())
        .fetch_one(&mut *self.tx)
        .await
        .map_err(map_sqlx_error)?;

        if non_terminal > 0 {
            return Ok(None);
        }

        let first_error: Option<Option<String>> = sqlx::query_scalar(
            r#"
            SELECT results FROM job_tasks
            WHERE job_id = ? AND status = 'error'
            ORDER BY finished_at ASC, id ASC
            LIMIT 1
            "#,
        )
        .bind(job_id.to_string())
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(map_sqlx_error)?;

        match first_error {
            Some(results) => {
                let (code, message) = extract_error_info(results.as_deref());
                let result = sqlx::query(
                    r#"
                    UPDATE jobs
                    SET status = 'error', error_code = ?, error_message = ?,
                        finished_at = ?, updated_at = ?
                    WHERE id = ? AND status IN ('queued', 'running')
                    "#,
                )
                .bind(code)
                .bind(message)
                .bind(to_ms(now))
                .bind(to_ms(now))
                .bind(job_id.to_string())
                .execute(&mut *self.tx)
                .await
                .map_err(map_sqlx_error)?;

                Ok((result.rows_affected() > 0).then_some(JobStatus::Error))
            }
            None => {
                let result = sqlx::query(
                    r#"
                    UPDATE jobs
                    SET status = 'done', progress = 1.0, finished_at = ?, updated_at = ?
                    WHERE id = ? AND status IN ('queued', 'running')
                    "#,
                )
                .bind(to_ms(now))
                .bind(to_ms(now))
                .bind(job_id.to_string())
                .execute(&mut *self.tx)
                .await
                .map_err(map_sqlx_error)?;

                Ok((result.rows_affected() > 0).then_some(JobStatus::Done))
            }
        }
    }

    // -- tasks --------------------------------------------------------------

    async fn insert_task(&mut self, task: &NewTask, now: DateTime<Utc>) -> Result<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO job_tasks (id, job_id, task_key, service_name, status, depends_on,
                                   attempt, max_attempts, priority, progress, params,
                                   skippable, created_at, updated_at)
            VALUES (?, ?, ?, ?, 'queued', ?, 0, ?, ?, 0, ?, ?, ?, ?)
            ON CONFLICT (job_id, task_key) DO NOTHING
            "#,
        )
        .bind(Uuid::new_v4().to_string())
        .bind(task.job_id.to_string())
        .bind(&task.task_key)
        .bind(&task.service_name)
        .bind(serde_json::to_string(&task.depends_on)?)
        .bind(task.max_attempts)
        .bind(task.priority)
        .bind(task.params.to_string())
        .bind(task.skippable)
        .bind(to_ms(now))
        .bind(to_ms(now))
        .execute(&mut *self.tx)
        .await
        .map_err(map_sqlx_error)?;

        Ok(result.rows_affected() > 0)
    }

    async fn fetch_task(&mut self, id: Uuid) -> Result<Option<JobTask>> {
        let row = sqlx::query_as::<_, TaskRow>("SELECT * FROM job_tasks WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(map_sqlx_error)?;

        row.map(TaskRow::into_task).transpose()
    }

    async fn running_count(&mut self, service: &str) -> Result<i64> {
        sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM job_tasks
            WHERE service_name = ? AND status IN ('starting', 'running')
            "#,
        )
        .bind(service)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(map_sqlx_error)
    }

    async fn concurrency_limit(&mut self, service: &str) -> Result<Option<i64>> {
        sqlx::query_scalar(
            r#"
            SELECT SUM(CAST(je.value AS INTEGER))
            FROM nodes n, json_each(n.max_concurrency) je
            WHERE je.key = ?
            "#,
        )
        .bind(service)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(map_sqlx_error)
    }

    async fn select_runnable(
        &mut self,
        service: &str,
        limit: i64,
        now: DateTime<Utc>,
    ) -> Result<Vec<JobTask>> {
        // No FOR UPDATE SKIP LOCKED here: the surrounding transaction holds
        // SQLite's single write lock, so concurrent selectors serialize.
        let rows = sqlx::query_as::<_, TaskRow>(
            r#"
            SELECT jt.*
            FROM job_tasks jt
            JOIN jobs j ON j.id = jt.job_id
            WHERE jt.service_name = ?
              AND jt.status = 'queued'
              AND (jt.next_attempt_at IS NULL OR jt.next_attempt_at <= ?)
              AND NOT EXISTS (
                SELECT 1
                FROM job_tasks dep, json_each(jt.depends_on) je
                WHERE dep.job_id = jt.job_id
                  AND dep.task_key = je.value
                  AND dep.status <> 'done'
              )
            ORDER BY j.order_seq ASC, jt.created_at ASC, jt.id ASC
            LIMIT ?
            "#,
        )
        .bind(service)
        .bind(to_ms(now))
        .bind(limit)
        .fetch_all(&mut *self.tx)
        .await
        .map_err(map_sqlx_error)?;

        rows.into_iter().map(TaskRow::into_task).collect()
    }

    async fn claim_tasks(&mut self, ids: &[Uuid], node: &str, now: DateTime<Utc>) -> Result<u64> {
        let mut claimed = 0u64;
        for id in ids {
            let result = sqlx::query(
                r#"
                UPDATE job_tasks
                SET status = 'starting', claimed_by = ?, assigned_node = ?,
                    claimed_at = ?, updated_at = ?
                WHERE id = ? AND status = 'queued'
                "#,
            )
            .bind(node)
            .bind(node)
            .bind(to_ms(now))
            .bind(to_ms(now))
            .bind(id.to_string())
            .execute(&mut *self.tx)
            .await
            .map_err(map_sqlx_error)?;

            claimed += result.rows_affected();
        }
        Ok(claimed)
    }

    async fn mark_running(&mut self, task_id: Uuid, now: DateTime<Utc>) -> Result<u64> {
        let result = sqlx::query(
            r#"
            UPDATE job_tasks
            SET status = 'running', started_at = COALESCE(started_at, ?), updated_at = ?
            WHERE id = ? AND status IN ('starting', 'running')
            "#,
        )
        .bind(to_ms(now))
        .bind(to_ms(now))
        .bind(task_id.to_string())
        .execute(&mut *self.tx)
        .await
        .map_err(map_sqlx_error)?;

        Ok(result.rows_affected())
    }

    async fn set_current_task(
        &mut self,
        job_id: Uuid,
        task_key: &str,
        now: DateTime<Utc>,
    ) -> Result<()> {
        sqlx::query("UPDATE jobs SET current_task_key = ?, updated_at = ? WHERE id = ?")
            .bind(task_key)
            .bind(to_ms(now))
            .bind(job_id.to_string())
            .execute(&mut *self.tx)
            .await
            .map_err(map_sqlx_error)?;

        Ok(())
    }

    async fn update_progress(
        &mut self,
        task_id: Uuid,
        percent: f64,
        now: DateTime<Utc>,
    ) -> Result<u64> {
        let result = sqlx::query(
            "UPDATE job_tasks SET progress = MAX(progress, ?), updated_at = ? WHERE id = ?",
        )
        .bind(percent)
        .bind(to_ms(now))
        .bind(task_id.to_string())
        .execute(&mut *self.tx)
        .await
        .map_err(map_sqlx_error)?;

        Ok(result.rows_affected())
    }

    async fn mark_done(
        &mut self,
        task_id: Uuid,
        results: Option<&Value>,
        now: DateTime<Utc>,
    ) -> Result<u64> {
        let result = sqlx::query(
            r#"
            UPDATE job_tasks
            SET status = 'done', progress = 1.0, results = COALESCE(?, results),
                finished_at = ?, updated_at = ?
            WHERE id = ? AND status IN ('starting', 'running')
            "#,
        )
        .bind(results.map(|r| r.to_string()))
        .bind(to_ms(now))
        .bind(to_ms(now))
        .bind(task_id.to_string())
        .execute(&mut *self.tx)
        .await
        .map_err(map_sqlx_error)?;

        Ok(result.rows_affected())
    }

    async fn mark_error(
        &mut self,
        task_id: Uuid,
        code: &str,
        message: &str,
        now: DateTime<Utc>,
    ) -> Result<u64> {
        let result = sqlx::query(
            r#"
            UPDATE job_tasks
            SET status = 'error',
                results = json_set(COALESCE(results, '{}'), '$.error', json(?)),
                finished_at = ?, updated_at = ?
            WHERE id = ? AND status IN ('starting', 'running')
            "#,
        )
        .bind(error_info(code, message))
        .bind(to_ms(now))
        .bind(to_ms(now))
        .bind(task_id.to_string())
        .execute(&mut *self.tx)
        .await
        .map_err(map_sqlx_error)?;

        Ok(result.rows_affected())
    }

    async fn mark_skipped(
        &mut self,
        task_id: Uuid,
        code: &str,
        message: &str,
        now: DateTime<Utc>,
    ) -> Result<u64> {
        let result = sqlx::query(
            r#"
            UPDATE job_tasks
            SET status = 'skipped',
                results = json_set(COALESCE(results, '{}'), '$.error', json(?)),
                finished_at = ?, updated_at = ?
            WHERE id = ? AND status IN ('starting', 'running')
            "#,
        )
        .bind(error_info(code, message))
        .bind(to_ms(now))
        .bind(to_ms(now))
        .bind(task_id.to_string())
        .execute(&mut *self.tx)
        .await
        .map_err(map_sqlx_error)?;

        Ok(result.rows_affected())
    }

    async fn requeue_task(
        &mut self,
        task_id: Uuid,
        attempt: i32,
        next_attempt_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<u64> {
        let result = sqlx::query(
            r#"
            UPDATE job_tasks
            SET status = 'queued', attempt = ?, next_attempt_at = ?,
                claimed_by = NULL, claimed_at = NULL, started_at = NULL, updated_at = ?
            WHERE id = ? AND status IN ('starting', 'running')
            "#,
        )
        .bind(attempt)
        .bind(to_ms(next_attempt_at))
        .bind(to_ms(now))
        .bind(task_id.to_string())
        .execute(&mut *self.tx)
        .await
        .map_err(map_sqlx_error)?;

        Ok(result.rows_affected())
    }

    async fn skip_tasks_with_failed_deps(
        &mut self,
        job_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<u64> {
        let result = sqlx::query(
            r#"
            UPDATE job_tasks
            SET status = 'skipped', finished_at = ?, updated_at = ?
            WHERE job_id = ?
              AND status = 'queued'
              AND EXISTS (
                SELECT 1
                FROM job_tasks dep, json_each(job_tasks.depends_on) je
                WHERE dep.job_id = job_tasks.job_id
                  AND dep.task_key = je.value
                  AND dep.status IN ('error', 'skipped')
              )
            "#,
        )
        .bind(to_ms(now))
        .bind(to_ms(now))
        .bind(job_id.to_string())
        .execute(&mut *self.tx)
        .await
        .map_err(map_sqlx_error)?;

        Ok(result.rows_affected())
    }

    async fn release_stale_claims(
        &mut self,
        cutoff: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<u64> {
        let result = sqlx::query(
            r#"
            UPDATE job_tasks
            SET status = 'queued', attempt = attempt + 1, next_attempt_at = NULL,
                claimed_by = NULL, claimed_at = NULL, started_at = NULL, updated_at = ?
            WHERE status IN ('starting', 'running')
              AND claimed_at IS NOT NULL
              AND claimed_at < ?
            "#,
        )
        .bind(to_ms(now))
        .bind(to_ms(cutoff))
        .execute(&mut *self.tx)
        .await
        .map_err(map_sqlx_error)?;

        Ok(result.rows_affected())
    }

    // -- journal ------------------------------------------------------------

    async fn insert_event(&mut self, job_id: Uuid, event: &NewEvent) -> Result<i64> {
        sqlx::query_scalar(
            r#"
            INSERT INTO task_events (job_id, job_task_id, ts, source, level, type, message, data)
            VALUES (?, ?, COALESCE(?, CAST(strftime('%s', 'now') AS INTEGER) * 1000), ?, ?, ?, ?, ?)
            RETURNING id
            "#,
        )
        .bind(job_id.to_string())
        .bind(event.job_task_id.map(|id| id.to_string()))
        .bind(event.ts.map(to_ms))
        .bind(&event.source)
        .bind(event.level.as_str())
        .bind(event.kind.as_str())
        .bind(&event.message)
        .bind(event.data.to_string())
        .fetch_one(&mut *self.tx)
        .await
        .map_err(map_sqlx_error)
    }

    async fn insert_artifact(
        &mut self,
        job_id: Uuid,
        artifact: &NewArtifact,
        now: DateTime<Utc>,
    ) -> Result<Uuid> {
        let id = Uuid::new_v4();
        sqlx::query(
            r#"
            INSERT INTO task_artifacts (id, job_id, job_task_id, kind, bucket, key,
                                        size_bytes, content_type, checksum, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(id.to_string())
        .bind(job_id.to_string())
        .bind(artifact.job_task_id.map(|t| t.to_string()))
        .bind(artifact.kind.as_str())
        .bind(&artifact.bucket)
        .bind(&artifact.key)
        .bind(artifact.size_bytes)
        .bind(&artifact.content_type)
        .bind(&artifact.checksum)
        .bind(to_ms(now))
        .execute(&mut *self.tx)
        .await
        .map_err(map_sqlx_error)?;

        Ok(id)
    }

    async fn list_events(&mut self, job_id: Uuid, limit: i64) -> Result<Vec<TaskEvent>> {
        let rows = sqlx::query_as::<_, EventRow>(
            "SELECT * FROM task_events WHERE job_id = ? ORDER BY id ASC LIMIT ?",
        )
        .bind(job_id.to_string())
        .bind(limit)
        .fetch_all(&mut *self.tx)
        .await
        .map_err(map_sqlx_error)?;

        rows.into_iter().map(EventRow::into_event).collect()
    }

    async fn list_artifacts(&mut self, job_id: Uuid) -> Result<Vec<TaskArtifact>> {
        let rows = sqlx::query_as::<_, ArtifactRow>(
            "SELECT * FROM task_artifacts WHERE job_id = ? ORDER BY created_at ASC, id ASC",
        )
        .bind(job_id.to_string())
        .fetch_all(&mut *self.tx)
        .await
        .map_err(map_sqlx_error)?;

        rows.into_iter().map(ArtifactRow::into_artifact).collect()
    }

    // -- nodes --------------------------------------------------------------

    async fn upsert_node(&mut self, node: &Node) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO nodes (name, labels, last_seen, awake_state, wake_method,
                               mac, provider_ref, script, max_concurrency)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT (name) DO UPDATE SET
                labels = excluded.labels,
                last_seen = excluded.last_seen,
                awake_state = excluded.awake_state,
                wake_method = excluded.wake_method,
                mac = excluded.mac,
                provider_ref = excluded.provider_ref,
                script = excluded.script,
                max_concurrency = excluded.max_concurrency
            "#,
        )
        .bind(&node.name)
        .bind(serde_json::to_string(&node.labels)?)
        .bind(node.last_seen.map(to_ms))
        .bind(node.awake_state.as_str())
        .bind(&node.wake_method)
        .bind(&node.mac)
        .bind(&node.provider_ref)
        .bind(&node.script)
        .bind(serde_json::to_string(&node.max_concurrency)?)
        .execute(&mut *self.tx)
        .await
        .map_err(map_sqlx_error)?;

        Ok(())
    }
}

/// Pull `{code, message}` out of a stored `results.error` object, tolerating
/// rows written before the error merge existed.
fn extract_error_info(results: Option<&str>) -> (String, String) {
    let fallback = ("task_error".to_string(), String::new());
    let Some(raw) = results else { return fallback };
    let Ok(value) = serde_json::from_str::<Value>(raw) else {
        return fallback;
    };
    let error = &value["error"];
    (
        error["code"].as_str().unwrap_or("task_error").to_string(),
        error["message"].as_str().unwrap_or_default().to_string(),
    )
}

// ---------------------------------------------------------------------------
// Row decoding: strict, name-addressed, fails loudly on unknown enum values
// ---------------------------------------------------------------------------

#[derive(Debug, sqlx::FromRow)]
struct WorkflowRow {
    id: String,
    name: String,
    version: i32,
    steps: String,
    is_active: bool,
    created_at: i64,
    updated_at: i64,
}

impl WorkflowRow {
    fn into_workflow(self) -> Result<Workflow> {
        Ok(Workflow {
            id: parse_uuid(&self.id)?,
            name: self.name,
            version: self.version,
            steps: serde_json::from_str(&self.steps)?,
            is_active: self.is_active,
            created_at: from_ms(self.created_at)?,
            updated_at: from_ms(self.updated_at)?,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct JobRow {
    id: String,
    workflow_id: String,
    status: String,
    order_seq: i64,
    priority: i32,
    options: String,
    progress: f64,
    current_task_key: Option<String>,
    scheduled_at: Option<i64>,
    error_code: Option<String>,
    error_message: Option<String>,
    created_at: i64,
    updated_at: i64,
    finished_at: Option<i64>,
}

impl JobRow {
    fn into_job(self) -> Result<Job> {
        Ok(Job {
            id: parse_uuid(&self.id)?,
            workflow_id: parse_uuid(&self.workflow_id)?,
            status: self.status.parse().map_err(EngineError::Domain)?,
            order_seq: self.order_seq,
            priority: self.priority,
            options: parse_json(&self.options)?,
            progress: self.progress,
            current_task_key: self.current_task_key,
            scheduled_at: from_ms_opt(self.scheduled_at)?,
            error_code: self.error_code,
            error_message: self.error_message,
            created_at: from_ms(self.created_at)?,
            updated_at: from_ms(self.updated_at)?,
            finished_at: from_ms_opt(self.finished_at)?,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct TaskRow {
    id: String,
    job_id: String,
    task_key: String,
    service_name: String,
    status: String,
    depends_on: String,
    attempt: i32,
    max_attempts: i32,
    next_attempt_at: Option<i64>,
    priority: i32,
    progress: f64,
    params: String,
    results: Option<String>,
    skippable: bool,
    assigned_node: Option<String>,
    claimed_by: Option<String>,
    claimed_at: Option<i64>,
    started_at: Option<i64>,
    finished_at: Option<i64>,
    created_at: i64,
    updated_at: i64,
}

impl TaskRow {
    fn into_task(self) -> Result<JobTask> {
        Ok(JobTask {
            id: parse_uuid(&self.id)?,
            job_id: parse_uuid(&self.job_id)?,
            task_key: self.task_key,
            service_name: self.service_name,
            status: self.status.parse().map_err(EngineError::Domain)?,
            depends_on: serde_json::from_str(&self.depends_on)?,
            attempt: self.attempt,
            max_attempts: self.max_attempts,
            next_attempt_at: from_ms_opt(self.next_attempt_at)?,
            priority: self.priority,
            progress: self.progress,
            params: parse_json(&self.params)?,
            results: self.results.as_deref().map(parse_json).transpose()?,
            skippable: self.skippable,
            assigned_node: self.assigned_node,
            claimed_by: self.claimed_by,
            claimed_at: from_ms_opt(self.claimed_at)?,
            started_at: from_ms_opt(self.started_at)?,
            finished_at: from_ms_opt(self.finished_at)?,
            created_at: from_ms(self.created_at)?,
            updated_at: from_ms(self.updated_at)?,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct EventRow {
    id: i64,
    job_id: String,
    job_task_id: Option<String>,
    ts: i64,
    source: String,
    level: String,
    #[sqlx(rename = "type")]
    kind: String,
    message: String,
    data: String,
}

impl EventRow {
    fn into_event(self) -> Result<TaskEvent> {
        Ok(TaskEvent {
            id: self.id,
            job_id: parse_uuid(&self.job_id)?,
            job_task_id: self.job_task_id.as_deref().map(parse_uuid).transpose()?,
            ts: from_ms(self.ts)?,
            source: self.source,
            level: self.level.parse().map_err(EngineError::Domain)?,
            kind: self.kind.parse().map_err(EngineError::Domain)?,
            message: self.message,
            data: parse_json(&self.data)?,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct ArtifactRow {
    id: String,
    job_id: String,
    job_task_id: Option<String>,
    kind: String,
    bucket: String,
    key: String,
    size_bytes: Option<i64>,
    content_type: Option<String>,
    checksum: Option<String>,
    created_at: i64,
}

impl ArtifactRow {
    fn into_artifact(self) -> Result<TaskArtifact> {
        Ok(TaskArtifact {
            id: parse_uuid(&self.id)?,
            job_id: parse_uuid(&self.job_id)?,
            job_task_id: self.job_task_id.as_deref().map(parse_uuid).transpose()?,
            kind: self.kind.parse().map_err(EngineError::Domain)?,
            bucket: self.bucket,
            key: self.key,
            size_bytes: self.size_bytes,
            content_type: self.content_type,
            checksum: self.checksum,
            created_at: from_ms(self.created_at)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{memory_pool, run_migrations};
    use chrono::Utc;
    use conveyor_core::domain::WorkflowStep;

    async fn setup() -> SqliteTaskStore {
        let pool = memory_pool().await.unwrap();
        run_migrations(&pool).await.unwrap();
        SqliteTaskStore::new(pool)
    }

    #[tokio::test]
    async fn workflow_round_trips() {
        let store = setup().await;
        let workflow = Workflow::new(
            Uuid::new_v4(),
            "encode",
            2,
            vec![
                WorkflowStep::new("ingest", "svc-ingest"),
                WorkflowStep::new("transcode", "svc-transcode").depends_on(&["ingest"]),
            ],
            Utc::now(),
        );

        let mut tx = store.begin().await.unwrap();
        tx.insert_workflow(&workflow).await.unwrap();
        let found = tx.fetch_workflow(workflow.id).await.unwrap().unwrap();
        tx.commit().await.unwrap();

        assert_eq!(found.name, "encode");
        assert_eq!(found.version, 2);
        assert_eq!(found.steps.len(), 2);
        assert_eq!(found.steps[1].depends_on, vec!["ingest".to_string()]);
    }

    #[tokio::test]
    async fn enqueue_assigns_increasing_order_seq() {
        let store = setup().await;
        let workflow = Workflow::new(Uuid::new_v4(), "wf", 1, vec![], Utc::now());

        let mut tx = store.begin().await.unwrap();
        tx.insert_workflow(&workflow).await.unwrap();
        let a = tx
            .enqueue_job(&NewJob::new(workflow.id), Utc::now())
            .await
            .unwrap();
        let b = tx
            .enqueue_job(&NewJob::new(workflow.id), Utc::now())
            .await
            .unwrap();
        tx.commit().await.unwrap();

        assert!(b.order_seq > a.order_seq);
        assert_eq!(a.status, JobStatus::Queued);
    }

    #[tokio::test]
    async fn decoder_rejects_unknown_status() {
        let store = setup().await;
        let workflow = Workflow::new(Uuid::new_v4(), "wf", 1, vec![], Utc::now());

        let mut tx = store.begin().await.unwrap();
        tx.insert_workflow(&workflow).await.unwrap();
        let job = tx
            .enqueue_job(&NewJob::new(workflow.id), Utc::now())
            .await
            .unwrap();
        tx.commit().await.unwrap();

        let task_id = Uuid::new_v4();
        sqlx::query(
            r#"
            INSERT INTO job_tasks (id, job_id, task_key, service_name, status, depends_on,
                                   params, created_at, updated_at)
            VALUES (?, ?, 'x', 'svc', 'paused', '[]', '{}', 0, 0)
            "#,
        )
        .bind(task_id.to_string())
        .bind(job.id.to_string())
        .execute(&store.pool)
        .await
        .unwrap();

        let mut tx = store.begin().await.unwrap();
        let err = tx.fetch_task(task_id).await.unwrap_err();
        tx.rollback().await.unwrap();
        assert!(matches!(err, EngineError::Domain(_)));
    }

    #[tokio::test]
    async fn insert_task_is_idempotent_on_conflict() {
        let store = setup().await;
        let workflow = Workflow::new(Uuid::new_v4(), "wf", 1, vec![], Utc::now());

        let mut tx = store.begin().await.unwrap();
        tx.insert_workflow(&workflow).await.unwrap();
        let job = tx
            .enqueue_job(&NewJob::new(workflow.id), Utc::now())
            .await
            .unwrap();

        let step = WorkflowStep::new("ingest", "svc");
        let task = NewTask::from_step(job.id, &step, 0, 3);
        assert!(tx.insert_task(&task, Utc::now()).await.unwrap());
        assert!(!tx.insert_task(&task, Utc::now()).await.unwrap());
        tx.commit().await.unwrap();
    }
}
