// Engine - explicit context passed to every operation
//
// Replaces any module-global datastore handle: the store, clock and policy
// are constructed once at startup and threaded through all components.
// Each public operation runs inside exactly one store transaction.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde_json::Value;
use tracing::warn;
use uuid::Uuid;

use crate::application::{dispatch, instantiate, journal, lifecycle};
use crate::application::{FailDisposition, RetryConfig, RetryPolicy};
use crate::domain::{
    Job, JobStatus, JobTask, NewArtifact, NewEvent, NewJob, Node, TaskArtifact, TaskEvent,
    Workflow,
};
use crate::error::Result;
use crate::port::{Clock, StoreTx, SystemClock, TaskStore};

#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// `max_attempts` stamped onto newly instantiated tasks.
    pub default_max_attempts: i32,
    pub retry: RetryConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_max_attempts: 3,
            retry: RetryConfig::default(),
        }
    }
}

pub struct Engine {
    store: Arc<dyn TaskStore>,
    clock: Arc<dyn Clock>,
    config: EngineConfig,
    retry: RetryPolicy,
}

impl Engine {
    pub fn new(store: Arc<dyn TaskStore>, clock: Arc<dyn Clock>, config: EngineConfig) -> Self {
        let retry = RetryPolicy::new(config.retry.clone());
        Self {
            store,
            clock,
            config,
            retry,
        }
    }

    /// System clock and default policy.
    pub fn with_defaults(store: Arc<dyn TaskStore>) -> Self {
        Self::new(store, Arc::new(SystemClock), EngineConfig::default())
    }

    fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    // -- workflows & jobs ---------------------------------------------------

    /// Persist a workflow definition after validating its step graph.
    pub async fn create_workflow(&self, workflow: &Workflow) -> Result<()> {
        workflow.validate()?;
        let mut tx = self.store.begin().await?;
        let out = tx.insert_workflow(workflow).await;
        finish(tx, out).await
    }

    /// Insert a job in `queued` with the next global order sequence.
    pub async fn enqueue_job(&self, job: &NewJob) -> Result<Job> {
        let now = self.now();
        let mut tx = self.store.begin().await?;
        let out = tx.enqueue_job(job, now).await;
        finish(tx, out).await
    }

    pub async fn get_job(&self, job_id: Uuid) -> Result<Option<Job>> {
        let mut tx = self.store.begin().await?;
        let out = tx.fetch_job(job_id).await;
        finish(tx, out).await
    }

    pub async fn get_task(&self, task_id: Uuid) -> Result<Option<JobTask>> {
        let mut tx = self.store.begin().await?;
        let out = tx.fetch_task(task_id).await;
        finish(tx, out).await
    }

    /// Expand the job's workflow into task rows (spec: idempotent, silent
    /// no-op on a missing job or workflow). Returns how many rows were
    /// inserted by this call.
    pub async fn instantiate_job(&self, job_id: Uuid) -> Result<u64> {
        let now = self.now();
        let mut tx = self.store.begin().await?;
        let out =
            instantiate::instantiate_in(tx.as_mut(), job_id, self.config.default_max_attempts, now)
                .await;
        finish(tx, out).await
    }

    // -- dispatch -----------------------------------------------------------

    /// Claim up to `limit` runnable tasks of `service` for `node`.
    pub async fn dispatch(&self, service: &str, limit: i64, node: &str) -> Result<Vec<JobTask>> {
        let now = self.now();
        let mut tx = self.store.begin().await?;
        let out = dispatch::dispatch_in(tx.as_mut(), service, limit, node, now).await;
        finish(tx, out).await
    }

    // -- lifecycle ----------------------------------------------------------

    /// Worker ack: the claimed task has begun real work.
    pub async fn start_task(&self, task_id: Uuid) -> Result<()> {
        let now = self.now();
        let mut tx = self.store.begin().await?;
        let out = lifecycle::start_task_in(tx.as_mut(), task_id, now).await;
        finish(tx, out).await
    }

    pub async fn report_progress(&self, task_id: Uuid, percent: f64) -> Result<()> {
        let now = self.now();
        let mut tx = self.store.begin().await?;
        let out = lifecycle::report_progress_in(tx.as_mut(), task_id, percent, now).await;
        finish(tx, out).await
    }

    /// Terminal success; returns the job's new status when this completion
    /// finished the job.
    pub async fn complete_task(
        &self,
        task_id: Uuid,
        results: Option<Value>,
    ) -> Result<Option<JobStatus>> {
        let now = self.now();
        let mut tx = self.store.begin().await?;
        let out = lifecycle::complete_task_in(tx.as_mut(), task_id, results.as_ref(), now).await;
        finish(tx, out).await
    }

    /// Failure report from a worker; applies the retry policy.
    pub async fn fail_task(
        &self,
        task_id: Uuid,
        code: &str,
        message: &str,
    ) -> Result<FailDisposition> {
        let now = self.now();
        let mut tx = self.store.begin().await?;
        let out =
            lifecycle::fail_task_in(tx.as_mut(), &self.retry, task_id, code, message, now).await;
        finish(tx, out).await
    }

    // -- journal ------------------------------------------------------------

    /// Append one journal event; returns the datastore-assigned id.
    pub async fn append_event(&self, event: NewEvent) -> Result<i64> {
        let mut tx = self.store.begin().await?;
        let out = journal::append_event_in(tx.as_mut(), &event).await;
        finish(tx, out).await
    }

    pub async fn record_artifact(&self, artifact: NewArtifact) -> Result<Uuid> {
        let now = self.now();
        let mut tx = self.store.begin().await?;
        let out = journal::record_artifact_in(tx.as_mut(), &artifact, now).await;
        finish(tx, out).await
    }

    /// Read a job's journal, oldest first.
    pub async fn list_events(&self, job_id: Uuid, limit: i64) -> Result<Vec<TaskEvent>> {
        let mut tx = self.store.begin().await?;
        let out = tx.list_events(job_id, limit).await;
        finish(tx, out).await
    }

    pub async fn list_artifacts(&self, job_id: Uuid) -> Result<Vec<TaskArtifact>> {
        let mut tx = self.store.begin().await?;
        let out = tx.list_artifacts(job_id).await;
        finish(tx, out).await
    }

    // -- nodes & reaping ----------------------------------------------------

    pub async fn register_node(&self, node: &Node) -> Result<()> {
        let mut tx = self.store.begin().await?;
        let out = tx.upsert_node(node).await;
        finish(tx, out).await
    }

    /// Reaper hook: requeue claims older than `older_than` with the attempt
    /// counter incremented. The engine has no liveness detection of its
    /// own; the caller decides what "stale" means.
    pub async fn release_stale_claims(&self, older_than: Duration) -> Result<u64> {
        let now = self.now();
        let cutoff = now
            - chrono::Duration::from_std(older_than)
                .map_err(|e| crate::error::EngineError::Validation(e.to_string()))?;
        let mut tx = self.store.begin().await?;
        let out = tx.release_stale_claims(cutoff, now).await;
        finish(tx, out).await
    }
}

/// Commit on success, roll back on error; either way the transaction ends
/// before the result propagates.
async fn finish<T>(tx: Box<dyn StoreTx>, out: Result<T>) -> Result<T> {
    match out {
        Ok(value) => {
            tx.commit().await?;
            Ok(value)
        }
        Err(err) => {
            if let Err(rollback_err) = tx.rollback().await {
                warn!(error = %rollback_err, "transaction rollback failed");
            }
            Err(err)
        }
    }
}
