// Workflow instantiation - expand a workflow definition into task rows

use chrono::{DateTime, Utc};
use serde_json::json;
use tracing::{info, warn};
use uuid::Uuid;

use crate::domain::{EventLevel, EventType, NewEvent, NewTask};
use crate::error::Result;
use crate::port::StoreTx;

/// Materialize one task per workflow step for a job, skipping rows that
/// already exist, and move the job `queued -> running` once anything was
/// inserted. Idempotent: repeated calls converge on the same rows.
///
/// A missing job or workflow is a silent no-op; validating the reference is
/// the submitter's responsibility.
pub(crate) async fn instantiate_in(
    tx: &mut dyn StoreTx,
    job_id: Uuid,
    default_max_attempts: i32,
    now: DateTime<Utc>,
) -> Result<u64> {
    let Some(job) = tx.fetch_job(job_id).await? else {
        warn!(job_id = %job_id, "instantiate: job not found");
        return Ok(0);
    };

    let Some(workflow) = tx.fetch_workflow(job.workflow_id).await? else {
        warn!(job_id = %job_id, workflow_id = %job.workflow_id, "instantiate: workflow not found");
        return Ok(0);
    };

    workflow.validate()?;

    let mut inserted = 0u64;
    for step in &workflow.steps {
        let task = NewTask::from_step(job.id, step, job.priority, default_max_attempts);
        if tx.insert_task(&task, now).await? {
            inserted += 1;
        }
    }

    if inserted > 0 {
        tx.mark_job_running(job.id, now).await?;

        let event = NewEvent::new(EventLevel::Info, EventType::Status, "workflow instantiated")
            .from_source("engine")
            .with_data(json!({
                "workflow": workflow.name,
                "version": workflow.version,
                "tasks": inserted,
            }));
        tx.insert_event(job.id, &event).await?;

        info!(job_id = %job.id, workflow = %workflow.name, inserted, "instantiated workflow tasks");
    }

    Ok(inserted)
}
