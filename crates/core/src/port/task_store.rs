// Task Store Port - transactional datastore access layer
//
// Every scheduling decision runs inside a StoreTx so concurrent agents
// coordinate purely through the datastore's transaction primitives.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use uuid::Uuid;

use crate::domain::{
    Job, JobStatus, JobTask, NewArtifact, NewEvent, NewJob, NewTask, Node, TaskArtifact,
    TaskEvent, Workflow,
};
use crate::error::Result;

/// Factory for datastore transactions.
#[async_trait]
pub trait TaskStore: Send + Sync {
    async fn begin(&self) -> Result<Box<dyn StoreTx>>;
}

/// One open transaction. Dropping an uncommitted transaction rolls it back,
/// so no partial state survives an error path.
///
/// Mutating task primitives return the number of rows affected; a zero lets
/// the caller distinguish a vanished row from an illegal transition.
#[async_trait]
pub trait StoreTx: Send {
    async fn commit(self: Box<Self>) -> Result<()>;
    async fn rollback(self: Box<Self>) -> Result<()>;

    // -- workflows & jobs ---------------------------------------------------

    async fn insert_workflow(&mut self, workflow: &Workflow) -> Result<()>;

    async fn fetch_workflow(&mut self, id: Uuid) -> Result<Option<Workflow>>;

    /// Insert a job in `queued`, assigning the next global `order_seq`.
    async fn enqueue_job(&mut self, job: &NewJob, now: DateTime<Utc>) -> Result<Job>;

    async fn fetch_job(&mut self, id: Uuid) -> Result<Option<Job>>;

    /// `queued -> running`; false when the job was not in `queued`.
    async fn mark_job_running(&mut self, job_id: Uuid, now: DateTime<Utc>) -> Result<bool>;

    /// Evaluate the completion predicate: with no task left in a
    /// non-terminal state, the job becomes `error` if any task errored,
    /// otherwise `done`. Returns the new status, or None when the job is
    /// still in flight (or already finalized).
    async fn maybe_finish_job(
        &mut self,
        job_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Option<JobStatus>>;

    // -- tasks --------------------------------------------------------------

    /// Insert a task row unless `(job_id, task_key)` already exists.
    /// Returns false on the duplicate; the instantiator treats that as
    /// idempotent success.
    async fn insert_task(&mut self, task: &NewTask, now: DateTime<Utc>) -> Result<bool>;

    async fn fetch_task(&mut self, id: Uuid) -> Result<Option<JobTask>>;

    /// Tasks of this service currently in `starting` or `running`.
    async fn running_count(&mut self, service: &str) -> Result<i64>;

    /// Sum of node `max_concurrency` declarations for this service;
    /// None when no node declares a limit.
    async fn concurrency_limit(&mut self, service: &str) -> Result<Option<i64>>;

    /// Runnable tasks for a service: `queued`, back-off elapsed, all
    /// dependencies `done`; ordered by job `order_seq`, then task
    /// `created_at`, then id. Selected rows stay locked against concurrent
    /// selectors until the transaction ends (skip-locked semantics where
    /// the engine supports them).
    async fn select_runnable(
        &mut self,
        service: &str,
        limit: i64,
        now: DateTime<Utc>,
    ) -> Result<Vec<JobTask>>;

    /// `queued -> starting`, stamping `claimed_by`, `assigned_node` and
    /// `claimed_at`. Returns how many rows were actually claimed.
    async fn claim_tasks(&mut self, ids: &[Uuid], node: &str, now: DateTime<Utc>) -> Result<u64>;

    /// `starting|running -> running`; `started_at` is set once and kept.
    async fn mark_running(&mut self, task_id: Uuid, now: DateTime<Utc>) -> Result<u64>;

    /// Record which step a job is currently working on.
    async fn set_current_task(
        &mut self,
        job_id: Uuid,
        task_key: &str,
        now: DateTime<Utc>,
    ) -> Result<()>;

    /// Monotone progress write; late out-of-order reports never regress.
    async fn update_progress(&mut self, task_id: Uuid, percent: f64, now: DateTime<Utc>)
        -> Result<u64>;

    /// Terminal success. `results` of None preserves whatever is stored.
    async fn mark_done(
        &mut self,
        task_id: Uuid,
        results: Option<&Value>,
        now: DateTime<Utc>,
    ) -> Result<u64>;

    /// Terminal failure; merges `{"error": {code, message}}` into results
    /// without clobbering other keys.
    async fn mark_error(
        &mut self,
        task_id: Uuid,
        code: &str,
        message: &str,
        now: DateTime<Utc>,
    ) -> Result<u64>;

    /// Terminal skip of a skippable task whose attempts ran out; the error
    /// info is merged into results the same way `mark_error` does.
    async fn mark_skipped(
        &mut self,
        task_id: Uuid,
        code: &str,
        message: &str,
        now: DateTime<Utc>,
    ) -> Result<u64>;

    /// Retryable failure: back to `queued` with the attempt counter bumped,
    /// the claim cleared and `next_attempt_at` set.
    async fn requeue_task(
        &mut self,
        task_id: Uuid,
        attempt: i32,
        next_attempt_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<u64>;

    /// One cascade step: mark `queued` tasks `skipped` when any dependency
    /// is in `error` or `skipped`. Callers loop until it returns 0.
    async fn skip_tasks_with_failed_deps(&mut self, job_id: Uuid, now: DateTime<Utc>)
        -> Result<u64>;

    /// Reaper hook: return `starting`/`running` tasks whose claim predates
    /// `cutoff` to `queued`, incrementing `attempt`.
    async fn release_stale_claims(&mut self, cutoff: DateTime<Utc>, now: DateTime<Utc>)
        -> Result<u64>;

    // -- journal ------------------------------------------------------------

    /// Append one event row; `job_id` has already been resolved and
    /// validated by the journal service. Returns the datastore-assigned id.
    async fn insert_event(&mut self, job_id: Uuid, event: &NewEvent) -> Result<i64>;

    async fn insert_artifact(
        &mut self,
        job_id: Uuid,
        artifact: &NewArtifact,
        now: DateTime<Utc>,
    ) -> Result<Uuid>;

    /// Journal rows for a job, oldest first, capped at `limit`.
    async fn list_events(&mut self, job_id: Uuid, limit: i64) -> Result<Vec<TaskEvent>>;

    async fn list_artifacts(&mut self, job_id: Uuid) -> Result<Vec<TaskArtifact>>;

    // -- nodes --------------------------------------------------------------

    async fn upsert_node(&mut self, node: &Node) -> Result<()>;
}
