// Task lifecycle transitions and retry policy

use std::time::Duration;

use chrono::{DateTime, Utc};
use rand::Rng;
use serde_json::json;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::domain::{EventLevel, EventType, JobStatus, NewEvent, TaskStatus};
use crate::error::{EngineError, Result};
use crate::port::StoreTx;

/// Retry back-off parameters: exponential, bounded, with symmetric jitter.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub base_delay: Duration,
    pub max_delay: Duration,
    /// Jitter fraction; 0.2 spreads delays over ±20%.
    pub jitter: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_secs(60),
            max_delay: Duration::from_secs(3600),
            jitter: 0.2,
        }
    }
}

/// Computes when a failed attempt may run again.
pub struct RetryPolicy {
    config: RetryConfig,
}

impl RetryPolicy {
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    /// Delay before attempt `attempt` may be re-selected:
    /// `min(base * 2^attempt, max)` scaled by the jitter factor.
    pub fn backoff_delay(&self, attempt: i32) -> chrono::Duration {
        let base_ms = self.config.base_delay.as_millis() as f64;
        let max_ms = self.config.max_delay.as_millis() as f64;
        let exp_ms = (base_ms * 2f64.powi(attempt.max(0))).min(max_ms);

        let jitter = self.config.jitter.clamp(0.0, 1.0);
        let factor = 1.0 + rand::thread_rng().gen_range(-jitter..=jitter);

        chrono::Duration::milliseconds((exp_ms * factor) as i64)
    }
}

/// Outcome of reporting a task failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailDisposition {
    /// Re-queued for another attempt.
    Retried {
        attempt: i32,
        next_attempt_at: DateTime<Utc>,
    },
    /// Attempts exhausted on a non-skippable step.
    Errored,
    /// Attempts exhausted on a skippable step.
    Skipped,
}

/// `starting|running -> running`; idempotent worker ack.
pub(crate) async fn start_task_in(
    tx: &mut dyn StoreTx,
    task_id: Uuid,
    now: DateTime<Utc>,
) -> Result<()> {
    let task = tx
        .fetch_task(task_id)
        .await?
        .ok_or_else(|| EngineError::NotFound(format!("task {task_id}")))?;

    match task.status {
        TaskStatus::Starting | TaskStatus::Running => {}
        other => {
            return Err(EngineError::InvalidState(format!(
                "cannot start task {task_id} from status {other}"
            )))
        }
    }

    let affected = tx.mark_running(task_id, now).await?;
    if affected == 0 {
        return Err(EngineError::Conflict(format!(
            "task {task_id} changed state concurrently"
        )));
    }

    tx.set_current_task(task.job_id, &task.task_key, now).await?;
    debug!(task_id = %task_id, task_key = %task.task_key, "task running");
    Ok(())
}

/// Monotone progress write.
pub(crate) async fn report_progress_in(
    tx: &mut dyn StoreTx,
    task_id: Uuid,
    percent: f64,
    now: DateTime<Utc>,
) -> Result<()> {
    if !(0.0..=1.0).contains(&percent) || percent.is_nan() {
        return Err(crate::domain::DomainError::InvalidProgress(percent).into());
    }

    let affected = tx.update_progress(task_id, percent, now).await?;
    if affected == 0 {
        return Err(EngineError::NotFound(format!("task {task_id}")));
    }
    Ok(())
}

/// Terminal success. Returns the job status when the completion predicate
/// fired. Re-reporting an already-done task is accepted without effect so
/// workers can safely redeliver.
pub(crate) async fn complete_task_in(
    tx: &mut dyn StoreTx,
    task_id: Uuid,
    results: Option<&serde_json::Value>,
    now: DateTime<Utc>,
) -> Result<Option<JobStatus>> {
    let task = tx
        .fetch_task(task_id)
        .await?
        .ok_or_else(|| EngineError::NotFound(format!("task {task_id}")))?;

    match task.status {
        TaskStatus::Starting | TaskStatus::Running => {}
        TaskStatus::Done => return Ok(None),
        other => {
            return Err(EngineError::InvalidState(format!(
                "cannot complete task {task_id} from status {other}"
            )))
        }
    }

    let affected = tx.mark_done(task_id, results, now).await?;
    if affected == 0 {
        return Err(EngineError::Conflict(format!(
            "task {task_id} changed state concurrently"
        )));
    }

    info!(task_id = %task_id, task_key = %task.task_key, "task done");
    tx.maybe_finish_job(task.job_id, now).await
}

/// Failure report: retry with back-off while attempts remain, otherwise a
/// terminal `error` (or `skipped` for skippable steps) with downstream
/// cascade and job finalization.
pub(crate) async fn fail_task_in(
    tx: &mut dyn StoreTx,
    policy: &RetryPolicy,
    task_id: Uuid,
    code: &str,
    message: &str,
    now: DateTime<Utc>,
) -> Result<FailDisposition> {
    let task = tx
        .fetch_task(task_id)
        .await?
        .ok_or_else(|| EngineError::NotFound(format!("task {task_id}")))?;

    match task.status {
        TaskStatus::Starting | TaskStatus::Running => {}
        other => {
            return Err(EngineError::InvalidState(format!(
                "cannot fail task {task_id} from status {other}"
            )))
        }
    }

    let attempt = task.attempt + 1;
    if attempt < task.max_attempts {
        let next_attempt_at = now + policy.backoff_delay(attempt);
        tx.requeue_task(task_id, attempt, next_attempt_at, now).await?;

        let event = NewEvent::new(EventLevel::Warn, EventType::Retry, message)
            .for_task(task_id)
            .from_source("engine")
            .with_data(json!({
                "code": code,
                "attempt": attempt,
                "max_attempts": task.max_attempts,
                "next_attempt_at": next_attempt_at,
            }));
        tx.insert_event(task.job_id, &event).await?;

        warn!(
            task_id = %task_id,
            task_key = %task.task_key,
            attempt,
            next_attempt_at = %next_attempt_at,
            "task failed, scheduled retry"
        );
        return Ok(FailDisposition::Retried {
            attempt,
            next_attempt_at,
        });
    }

    let disposition = if task.skippable {
        tx.mark_skipped(task_id, code, message, now).await?;
        warn!(task_id = %task_id, task_key = %task.task_key, code, "attempts exhausted, task skipped");
        FailDisposition::Skipped
    } else {
        tx.mark_error(task_id, code, message, now).await?;
        warn!(task_id = %task_id, task_key = %task.task_key, code, "attempts exhausted, task errored");
        FailDisposition::Errored
    };

    finalize_job_in(tx, task.job_id, now).await?;
    Ok(disposition)
}

/// Cascade skips over tasks whose dependencies terminally failed, then
/// evaluate the job-completion predicate.
pub(crate) async fn finalize_job_in(
    tx: &mut dyn StoreTx,
    job_id: Uuid,
    now: DateTime<Utc>,
) -> Result<Option<JobStatus>> {
    loop {
        let skipped = tx.skip_tasks_with_failed_deps(job_id, now).await?;
        if skipped == 0 {
            break;
        }
        debug!(job_id = %job_id, skipped, "cascaded skip to dependent tasks");
    }

    let finished = tx.maybe_finish_job(job_id, now).await?;
    if let Some(status) = finished {
        info!(job_id = %job_id, status = %status, "job finished");
    }
    Ok(finished)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_grows_exponentially_within_jitter_bounds() {
        let policy = RetryPolicy::new(RetryConfig::default());
        for attempt in 0..4 {
            let expected_ms = 60_000.0 * 2f64.powi(attempt);
            let delay_ms = policy.backoff_delay(attempt).num_milliseconds() as f64;
            assert!(delay_ms >= expected_ms * 0.8 - 1.0, "attempt {attempt}: {delay_ms}");
            assert!(delay_ms <= expected_ms * 1.2 + 1.0, "attempt {attempt}: {delay_ms}");
        }
    }

    #[test]
    fn backoff_is_capped_at_max_delay() {
        let policy = RetryPolicy::new(RetryConfig::default());
        let delay_ms = policy.backoff_delay(30).num_milliseconds() as f64;
        assert!(delay_ms <= 3_600_000.0 * 1.2 + 1.0);
    }

    #[test]
    fn zero_jitter_is_deterministic() {
        let policy = RetryPolicy::new(RetryConfig {
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
            jitter: 0.0,
        });
        assert_eq!(policy.backoff_delay(0).num_milliseconds(), 1_000);
        assert_eq!(policy.backoff_delay(3).num_milliseconds(), 8_000);
        assert_eq!(policy.backoff_delay(10).num_milliseconds(), 60_000);
    }
}
