// Dispatcher - capacity-capped selection and atomic claim of runnable tasks

use chrono::{DateTime, Utc};
use tracing::{debug, info};
use uuid::Uuid;

use crate::domain::{JobTask, TaskStatus};
use crate::error::{EngineError, Result};
use crate::port::StoreTx;

/// Select and claim up to `limit` runnable tasks for a service within one
/// transaction. The selection's row locks bracket the claim, so under any
/// interleaving each task is claimed by at most one node per attempt.
pub(crate) async fn dispatch_in(
    tx: &mut dyn StoreTx,
    service: &str,
    limit: i64,
    node: &str,
    now: DateTime<Utc>,
) -> Result<Vec<JobTask>> {
    let cap = remaining_capacity(tx, service, limit).await?;
    if cap <= 0 {
        debug!(service, limit, "no dispatch capacity");
        return Ok(Vec::new());
    }

    let mut tasks = tx.select_runnable(service, cap, now).await?;
    if tasks.is_empty() {
        return Ok(tasks);
    }

    let ids: Vec<Uuid> = tasks.iter().map(|t| t.id).collect();
    let claimed = tx.claim_tasks(&ids, node, now).await?;
    if claimed != ids.len() as u64 {
        // Selection locked these rows; a shortfall means the store broke
        // the claim contract.
        return Err(EngineError::Internal(format!(
            "claimed {claimed} of {} selected tasks for service {service}",
            ids.len()
        )));
    }

    for task in &mut tasks {
        task.status = TaskStatus::Starting;
        task.claimed_by = Some(node.to_string());
        task.assigned_node = Some(node.to_string());
        task.claimed_at = Some(now);
        task.updated_at = now;
    }

    info!(service, node, count = tasks.len(), "claimed runnable tasks");
    Ok(tasks)
}

/// Cap the poll limit by remaining cluster capacity for the service:
/// with M = sum of declared node limits and R = tasks starting/running,
/// the effective cap is `min(limit, M - R)`, or `limit` when no node
/// declares the service.
async fn remaining_capacity(tx: &mut dyn StoreTx, service: &str, limit: i64) -> Result<i64> {
    if limit <= 0 {
        return Ok(0);
    }

    let running = tx.running_count(service).await?;
    match tx.concurrency_limit(service).await? {
        None => Ok(limit),
        Some(max) => Ok(effective_capacity(limit, running, max)),
    }
}

pub(crate) fn effective_capacity(limit: i64, running: i64, max: i64) -> i64 {
    (max - running).clamp(0, limit)
}
