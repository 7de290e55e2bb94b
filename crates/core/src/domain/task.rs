// JobTask Domain Model - one materialized workflow step bound to a job

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::domain::error::DomainError;
use crate::domain::workflow::WorkflowStep;

/// Task status state machine:
/// queued -> starting -> running -> done | error | skipped,
/// with running|starting falling back to queued on a retryable failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Queued,
    Starting,
    Running,
    Done,
    Error,
    Skipped,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Queued => "queued",
            TaskStatus::Starting => "starting",
            TaskStatus::Running => "running",
            TaskStatus::Done => "done",
            TaskStatus::Error => "error",
            TaskStatus::Skipped => "skipped",
        }
    }

    /// done, error and skipped are terminal; nothing but explicit reaper
    /// intervention moves a task out of them.
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Done | TaskStatus::Error | TaskStatus::Skipped)
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for TaskStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "queued" => Ok(TaskStatus::Queued),
            "starting" => Ok(TaskStatus::Starting),
            "running" => Ok(TaskStatus::Running),
            "done" => Ok(TaskStatus::Done),
            "error" => Ok(TaskStatus::Error),
            "skipped" => Ok(TaskStatus::Skipped),
            other => Err(DomainError::UnknownValue {
                kind: "task status",
                value: other.to_string(),
            }),
        }
    }
}

/// JobTask entity. `(job_id, task_key)` is unique; `claimed_by` is non-null
/// exactly while the current attempt owns the row (starting/running) or has
/// finished it (done/error).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobTask {
    pub id: Uuid,
    pub job_id: Uuid,
    pub task_key: String,
    pub service_name: String,
    pub status: TaskStatus,
    pub depends_on: Vec<String>,
    /// Completed attempts so far; a fresh task starts at 0.
    pub attempt: i32,
    pub max_attempts: i32,
    pub next_attempt_at: Option<DateTime<Utc>>,
    pub priority: i32,
    pub progress: f64,
    pub params: Value,
    pub results: Option<Value>,
    pub skippable: bool,
    pub assigned_node: Option<String>,
    pub claimed_by: Option<String>,
    pub claimed_at: Option<DateTime<Utc>>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Insert payload produced by the workflow instantiator.
#[derive(Debug, Clone)]
pub struct NewTask {
    pub job_id: Uuid,
    pub task_key: String,
    pub service_name: String,
    pub depends_on: Vec<String>,
    pub params: Value,
    pub skippable: bool,
    pub priority: i32,
    pub max_attempts: i32,
}

impl NewTask {
    /// Materialize a workflow step for a job. Containers are cloned per
    /// task so no two rows alias the same params or dependency list.
    pub fn from_step(job_id: Uuid, step: &WorkflowStep, priority: i32, max_attempts: i32) -> Self {
        Self {
            job_id,
            task_key: step.key.clone(),
            service_name: step.service.clone(),
            depends_on: step.depends_on.clone(),
            params: step.default_params.clone(),
            skippable: step.skippable,
            priority,
            max_attempts,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn status_round_trips() {
        for s in [
            TaskStatus::Queued,
            TaskStatus::Starting,
            TaskStatus::Running,
            TaskStatus::Done,
            TaskStatus::Error,
            TaskStatus::Skipped,
        ] {
            assert_eq!(s.as_str().parse::<TaskStatus>().unwrap(), s);
        }
    }

    #[test]
    fn status_rejects_unknown_value() {
        assert!("cancelled".parse::<TaskStatus>().is_err());
    }

    #[test]
    fn terminal_statuses() {
        assert!(TaskStatus::Done.is_terminal());
        assert!(TaskStatus::Error.is_terminal());
        assert!(TaskStatus::Skipped.is_terminal());
        assert!(!TaskStatus::Queued.is_terminal());
        assert!(!TaskStatus::Starting.is_terminal());
        assert!(!TaskStatus::Running.is_terminal());
    }

    #[test]
    fn tasks_from_same_step_share_no_containers() {
        let step = WorkflowStep::new("transcode", "svc").with_params(json!({"preset": "fast"}));
        let job_a = Uuid::new_v4();
        let job_b = Uuid::new_v4();

        let mut a = NewTask::from_step(job_a, &step, 0, 3);
        let b = NewTask::from_step(job_b, &step, 0, 3);

        a.params["preset"] = json!("slow");
        a.depends_on.push("ingest".to_string());

        assert_eq!(b.params, json!({"preset": "fast"}));
        assert!(b.depends_on.is_empty());
        assert_eq!(step.default_params, json!({"preset": "fast"}));
    }
}
