// PostgreSQL Task Store Implementation
//
// The selection query locks candidate rows with FOR UPDATE SKIP LOCKED, so
// any number of agents can poll the same service concurrently: contended
// rows are skipped, never waited on, and the claim that follows inside the
// same transaction can only see rows this transaction locked.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::{PgPool, Postgres, Transaction as SqlxTransaction};
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

                // PostgreSQL SQLSTATE codes
                match code_str {
                    "23505" => EngineError::Conflict(format!(
                        "unique constraint violation: {}",
                        db_err.message()
                    )),
                    "23503" => EngineError::Database(format!(
                        "foreign key constraint violation: {}",
                        db_err.message()
                    )),
                    "40001" | "40P01" => EngineError::Database(format!(
                        "transaction conflict, retry: {}",
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

fn error_info(code: &str, message: &str) -> Value {
    serde_json::json!({"code": code, "message": message})
}

pub struct PgTaskStore {
    pool: PgPool,
}

impl PgTaskStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TaskStore for PgTaskStore {
    async fn begin(&self) -> Result<Box<dyn StoreTx>> {
        let tx = self.pool.begin().await.map_err(map_sqlx_error)?;
        Ok(Box::new(PgStoreTx { tx }))
    }
}

pub struct PgStoreTx {
    tx: SqlxTransaction<'static, Postgres>,
}

#[async_trait]
impl StoreTx for PgStoreTx {
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
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(workflow.id)
        .bind(&workflow.name)
        .bind(workflow.version)
        .bind(serde_json::to_value(&workflow.steps)?)
        .bind(workflow.is_active)
        .bind(workflow.created_at)
        .bind(workflow.updated_at)
        .execute(&mut *self.tx)
        .await
        .map_err(map_sqlx_error)?;

        Ok(())
    }

    async fn fetch_workflow(&mut self, id: Uuid) -> Result<Option<Workflow>> {
        let row = sqlx::query_as::<_, WorkflowRow>("SELECT * FROM workflows WHERE id = $1")
            .bind(id)
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(map_sqlx_error)?;

        row.map(WorkflowRow::into_workflow).transpose()
    }

    async fn enqueue_job(&mut self, job: &NewJob, now: DateTime<Utc>) -> Result<Job> {
        let row = sqlx::query_as::<_, JobRow>(
            r#"
            INSERT INTO jobs (workflow_id, status, priority, options, scheduled_at,
                              created_at, updated_at)
            VALUES ($1, 'queued', $2, $3, $4, $5, $5)
            RETURNING *
            "#,
        )
        .bind(job.workflow_id)
        .bind(job.priority)
        .bind(&job.options)
        .bind(job.scheduled_at)
        .bind(now)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(map_sqlx_error)?;

        row.into_job()
    }

    async fn fetch_job(&mut self, id: Uuid) -> Result<Option<Job>> {
        let row = sqlx::query_as::<_, JobRow>("SELECT * FROM jobs WHERE id = $1")
            .bind(id)
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(map_sqlx_error)?;

        row.map(JobRow::into_job).transpose()
    }

    async fn mark_job_running(&mut self, job_id: Uuid, now: DateTime<Utc>) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE jobs SET status = 'running', updated_at = $2 WHERE id = $1 AND status = 'queued'",
        )
        .bind(job_id)
        .bind(now)
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
            WHERE job_id = $1 AND status IN ('queued', 'starting', 'running')
            "#,
        )
        .bind(job_id)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(map_sqlx_error)?;

        if non_terminal > 0 {
            return Ok(None);
        }

        let first_error: Option<Option<Value>> = sqlx::query_scalar(
            r#"
            SELECT results FROM job_tasks
            WHERE job_id = $1 AND status = 'error'
            ORDER BY finished_at ASC, id ASC
            LIMIT 1
            "#,
        )
        .bind(job_id)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(map_sqlx_error)?;

        match first_error {
            Some(results) => {
                let (code, message) = extract_error_info(results.as_ref());
                let result = sqlx::query(
                    r#"
                    UPDATE jobs
                    SET status = 'error', error_code = $2, error_message = $3,
                        finished_at = $4, updated_at = $4
                    WHERE id = $1 AND status IN ('queued', 'running')
                    "#,
                )
                .bind(job_id)
                .bind(code)
                .bind(message)
                .bind(now)
                .execute(&mut *self.tx)
                .await
                .map_err(map_sqlx_error)?;

                Ok((result.rows_affected() > 0).then_some(JobStatus::Error))
            }
            None => {
                let result = sqlx::query(
                    r#"
                    UPDATE jobs
                    SET status = 'done', progress = 1.0, finished_at = $2, updated_at = $2
                    WHERE id = $1 AND status IN ('queued', 'running')
                    "#,
                )
                .bind(job_id)
                .bind(now)
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
            INSERT INTO job_tasks (job_id, task_key, service_name, status, depends_on,
                                   attempt, max_attempts, priority, progress, params,
                                   skippable, created_at, updated_at)
            VALUES ($1, $2, $3, 'queued', $4, 0, $5, $6, 0, $7, $8, $9, $9)
            ON CONFLICT (job_id, task_key) DO NOTHING
            "#,
        )
        .bind(task.job_id)
        .bind(&task.task_key)
        .bind(&task.service_name)
        .bind(&task.depends_on)
        .bind(task.max_attempts)
        .bind(task.priority)
        .bind(&task.params)
        .bind(task.skippable)
        .bind(now)
        .execute(&mut *self.tx)
        .await
        .map_err(map_sqlx_error)?;

        Ok(result.rows_affected() > 0)
    }

    async fn fetch_task(&mut self, id: Uuid) -> Result<Option<JobTask>> {
        let row = sqlx::query_as::<_, TaskRow>("SELECT * FROM job_tasks WHERE id = $1")
            .bind(id)
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(map_sqlx_error)?;

        row.map(TaskRow::into_task).transpose()
    }

    async fn running_count(&mut self, service: &str) -> Result<i64> {
        sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM job_tasks
            WHERE service_name = $1 AND status IN ('starting', 'running')
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
            SELECT SUM((max_concurrency ->> $1)::bigint)
            FROM nodes
            WHERE jsonb_exists(max_concurrency, $1)
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
        let rows = sqlx::query_as::<_, TaskRow>(
            r#"
            SELECT jt.*
            FROM job_tasks jt
            JOIN jobs j ON j.id = jt.job_id
            WHERE jt.service_name = $1
              AND jt.status = 'queued'
              AND (jt.next_attempt_at IS NULL OR jt.next_attempt_at <= $2)
              AND NOT EXISTS (
                SELECT 1 FROM job_tasks dep
                WHERE dep.job_id = jt.job_id
                  AND dep.task_key = ANY(jt.depends_on)
                  AND dep.status <> 'done'
              )
            ORDER BY j.order_seq ASC, jt.created_at ASC, jt.id ASC
            LIMIT $3
            FOR UPDATE OF jt SKIP LOCKED
            "#,
        )
        .bind(service)
        .bind(now)
        .bind(limit)
        .fetch_all(&mut *self.tx)
        .await
        .map_err(map_sqlx_error)?;

        rows.into_iter().map(TaskRow::into_task).collect()
    }

    async fn claim_tasks(&mut self, ids: &[Uuid], node: &str, now: DateTime<Utc>) -> Result<u64> {
        if ids.is_empty() {
            return Ok(0);
        }

        let result = sqlx::query(
            r#"
            UPDATE job_tasks
            SET status = 'starting', claimed_by = $2, assigned_node = $2,
                claimed_at = $3, updated_at = $3
            WHERE id = ANY($1) AND status = 'queued'
            "#,
        )
        .bind(ids)
        .bind(node)
        .bind(now)
        .execute(&mut *self.tx)
        .await
        .map_err(map_sqlx_error)?;

        Ok(result.rows_affected())
    }

    async fn mark_running(&mut self, task_id: Uuid, now: DateTime<Utc>) -> Result<u64> {
        let result = sqlx::query(
            r#"
            UPDATE job_tasks
            SET status = 'running', started_at = COALESCE(started_at, $2), updated_at = $2
            WHERE id = $1 AND status IN ('starting', 'running')
            "#,
        )
        .bind(task_id)
        .bind(now)
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
        sqlx::query("UPDATE jobs SET current_task_key = $2, updated_at = $3 WHERE id = $1")
            .bind(job_id)
            .bind(task_key)
            .bind(now)
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
            "UPDATE job_tasks SET progress = GREATEST(progress, $2), updated_at = $3 WHERE id = $1",
        )
        .bind(task_id)
        .bind(percent)
        .bind(now)
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
            SET status = 'done', progress = 1.0, results = COALESCE($2, results),
                finished_at = $3, updated_at = $3
            WHERE id = $1 AND status IN ('starting', 'running')
            "#,
        )
        .bind(task_id)
        .bind(results)
        .bind(now)
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
                results = jsonb_set(COALESCE(results, '{}'::jsonb), '{error}', $2),
                finished_at = $3, updated_at = $3
            WHERE id = $1 AND status IN ('starting', 'running')
            "#,
        )
        .bind(task_id)
        .bind(error_info(code, message))
        .bind(now)
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
                results = jsonb_set(COALESCE(results, '{}'::jsonb), '{error}', $2),
                finished_at = $3, updated_at = $3
            WHERE id = $1 AND status IN ('starting', 'running')
            "#,
        )
        .bind(task_id)
        .bind(error_info(code, message))
        .bind(now)
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
            SET status = 'queued', attempt = $2, next_attempt_at = $3,
                claimed_by = NULL, claimed_at = NULL, started_at = NULL, updated_at = $4
            WHERE id = $1 AND status IN ('starting', 'running')
            "#,
        )
        .bind(task_id)
        .bind(attempt)
        .bind(next_attempt_at)
        .bind(now)
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
            UPDATE job_tasks jt
            SET status = 'skipped', finished_at = $2, updated_at = $2
            WHERE jt.job_id = $1
              AND jt.status = 'queued'
              AND EXISTS (
                SELECT 1 FROM job_tasks dep
                WHERE dep.job_id = jt.job_id
                  AND dep.task_key = ANY(jt.depends_on)
                  AND dep.status IN ('error', 'skipped')
              )
            "#,
        )
        .bind(job_id)
        .bind(now)
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
                claimed_by = NULL, claimed_at = NULL, started_at = NULL, updated_at = $2
            WHERE status IN ('starting', 'running')
              AND claimed_at IS NOT NULL
              AND claimed_at < $1
            "#,
        )
        .bind(cutoff)
        .bind(now)
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
            VALUES ($1, $2, COALESCE($3, now()), $4, $5, $6, $7, $8)
            RETURNING id
            "#,
        )
        .bind(job_id)
        .bind(event.job_task_id)
        .bind(event.ts)
        .bind(&event.source)
        .bind(event.level.as_str())
        .bind(event.kind.as_str())
        .bind(&event.message)
        .bind(&event.data)
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
        sqlx::query_scalar(
            r#"
            INSERT INTO task_artifacts (job_id, job_task_id, kind, bucket, key,
                                        size_bytes, content_type, checksum, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING id
            "#,
        )
        .bind(job_id)
        .bind(artifact.job_task_id)
        .bind(artifact.kind.as_str())
        .bind(&artifact.bucket)
        .bind(&artifact.key)
        .bind(artifact.size_bytes)
        .bind(&artifact.content_type)
        .bind(&artifact.checksum)
        .bind(now)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(map_sqlx_error)
    }

    async fn list_events(&mut self, job_id: Uuid, limit: i64) -> Result<Vec<TaskEvent>> {
        let rows = sqlx::query_as::<_, EventRow>(
            "SELECT * FROM task_events WHERE job_id = $1 ORDER BY id ASC LIMIT $2",
        )
        .bind(job_id)
        .bind(limit)
        .fetch_all(&mut *self.tx)
        .await
        .map_err(map_sqlx_error)?;

        rows.into_iter().map(EventRow::into_event).collect()
    }

    async fn list_artifacts(&mut self, job_id: Uuid) -> Result<Vec<TaskArtifact>> {
        let rows = sqlx::query_as::<_, ArtifactRow>(
            "SELECT * FROM task_artifacts WHERE job_id = $1 ORDER BY created_at ASC, id ASC",
        )
        .bind(job_id)
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
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
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
        .bind(&node.labels)
        .bind(node.last_seen)
        .bind(node.awake_state.as_str())
        .bind(&node.wake_method)
        .bind(&node.mac)
        .bind(&node.provider_ref)
        .bind(&node.script)
        .bind(serde_json::to_value(&node.max_concurrency)?)
        .execute(&mut *self.tx)
        .await
        .map_err(map_sqlx_error)?;

        Ok(())
    }
}

/// Pull `{code, message}` out of a stored `results.error` object.
fn extract_error_info(results: Option<&Value>) -> (String, String) {
    let fallback = ("task_error".to_string(), String::new());
    let Some(value) = results else { return fallback };
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
    id: Uuid,
    name: String,
    version: i32,
    steps: Value,
    is_active: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl WorkflowRow {
    fn into_workflow(self) -> Result<Workflow> {
        Ok(Workflow {
            id: self.id,
            name: self.name,
            version: self.version,
            steps: serde_json::from_value(self.steps)?,
            is_active: self.is_active,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct JobRow {
    id: Uuid,
    workflow_id: Uuid,
    status: String,
    order_seq: i64,
    priority: i32,
    options: Value,
    progress: f64,
    current_task_key: Option<String>,
    scheduled_at: Option<DateTime<Utc>>,
    error_code: Option<String>,
    error_message: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    finished_at: Option<DateTime<Utc>>,
}

impl JobRow {
    fn into_job(self) -> Result<Job> {
        Ok(Job {
            id: self.id,
            workflow_id: self.workflow_id,
            status: self.status.parse().map_err(EngineError::Domain)?,
            order_seq: self.order_seq,
            priority: self.priority,
            options: self.options,
            progress: self.progress,
            current_task_key: self.current_task_key,
            scheduled_at: self.scheduled_at,
            error_code: self.error_code,
            error_message: self.error_message,
            created_at: self.created_at,
            updated_at: self.updated_at,
            finished_at: self.finished_at,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct TaskRow {
    id: Uuid,
    job_id: Uuid,
    task_key: String,
    service_name: String,
    status: String,
    depends_on: Vec<String>,
    attempt: i32,
    max_attempts: i32,
    next_attempt_at: Option<DateTime<Utc>>,
    priority: i32,
    progress: f64,
    params: Value,
    results: Option<Value>,
    skippable: bool,
    assigned_node: Option<String>,
    claimed_by: Option<String>,
    claimed_at: Option<DateTime<Utc>>,
    started_at: Option<DateTime<Utc>>,
    finished_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TaskRow {
    fn into_task(self) -> Result<JobTask> {
        Ok(JobTask {
            id: self.id,
            job_id: self.job_id,
            task_key: self.task_key,
            service_name: self.service_name,
            status: self.status.parse().map_err(EngineError::Domain)?,
            depends_on: self.depends_on,
            attempt: self.attempt,
            max_attempts: self.max_attempts,
            next_attempt_at: self.next_attempt_at,
            priority: self.priority,
            progress: self.progress,
            params: self.params,
            results: self.results,
            skippable: self.skippable,
            assigned_node: self.assigned_node,
            claimed_by: self.claimed_by,
            claimed_at: self.claimed_at,
            started_at: self.started_at,
            finished_at: self.finished_at,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct EventRow {
    id: i64,
    job_id: Uuid,
    job_task_id: Option<Uuid>,
    ts: DateTime<Utc>,
    source: String,
    level: String,
    #[sqlx(rename = "type")]
    kind: String,
    message: String,
    data: Value,
}

impl EventRow {
    fn into_event(self) -> Result<TaskEvent> {
        Ok(TaskEvent {
            id: self.id,
            job_id: self.job_id,
            job_task_id: self.job_task_id,
            ts: self.ts,
            source: self.source,
            level: self.level.parse().map_err(EngineError::Domain)?,
            kind: self.kind.parse().map_err(EngineError::Domain)?,
            message: self.message,
            data: self.data,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct ArtifactRow {
    id: Uuid,
    job_id: Uuid,
    job_task_id: Option<Uuid>,
    kind: String,
    bucket: String,
    key: String,
    size_bytes: Option<i64>,
    content_type: Option<String>,
    checksum: Option<String>,
    created_at: DateTime<Utc>,
}

impl ArtifactRow {
    fn into_artifact(self) -> Result<TaskArtifact> {
        Ok(TaskArtifact {
            id: self.id,
            job_id: self.job_id,
            job_task_id: self.job_task_id,
            kind: self.kind.parse().map_err(EngineError::Domain)?,
            bucket: self.bucket,
            key: self.key,
            size_bytes: self.size_bytes,
            content_type: self.content_type,
            checksum: self.checksum,
            created_at: self.created_at,
        })
    }
}
