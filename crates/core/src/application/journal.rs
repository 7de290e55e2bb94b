// Journal - referential validation for event and artifact appends

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::domain::{NewArtifact, NewEvent};
use crate::error::{EngineError, Result};
use crate::port::StoreTx;

/// Resolve the authoritative job id for a journal row. When a task id is
/// given, the task's own job wins: a caller-supplied job id must match it,
/// and an omitted one is filled in. Without a task id the job id is
/// mandatory.
async fn resolve_job_id(
    tx: &mut dyn StoreTx,
    job_id: Option<Uuid>,
    job_task_id: Option<Uuid>,
) -> Result<Uuid> {
    if let Some(task_id) = job_task_id {
        let task = tx
            .fetch_task(task_id)
            .await?
            .ok_or_else(|| EngineError::Validation(format!("job_task_id {task_id} not found")))?;

        return match job_id {
            Some(supplied) if supplied != task.job_id => Err(EngineError::Validation(
                "job_id does not match job_task_id".to_string(),
            )),
            _ => Ok(task.job_id),
        };
    }

    job_id.ok_or_else(|| EngineError::Validation("job_id is required".to_string()))
}

pub(crate) async fn append_event_in(tx: &mut dyn StoreTx, event: &NewEvent) -> Result<i64> {
    let job_id = resolve_job_id(tx, event.job_id, event.job_task_id).await?;
    tx.insert_event(job_id, event).await
}

pub(crate) async fn record_artifact_in(
    tx: &mut dyn StoreTx,
    artifact: &NewArtifact,
    now: DateTime<Utc>,
) -> Result<Uuid> {
    let job_id = resolve_job_id(tx, artifact.job_id, artifact.job_task_id).await?;
    tx.insert_artifact(job_id, artifact, now).await
}
