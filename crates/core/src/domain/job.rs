// Job Domain Model - one execution of a workflow

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::domain::error::DomainError;

/// Job status. Closed set: strings outside it must fail decoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Queued,
    Running,
    Done,
    Error,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Running => "running",
            JobStatus::Done => "done",
            JobStatus::Error => "error",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Done | JobStatus::Error)
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for JobStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "queued" => Ok(JobStatus::Queued),
            "running" => Ok(JobStatus::Running),
            "done" => Ok(JobStatus::Done),
            "error" => Ok(JobStatus::Error),
            other => Err(DomainError::UnknownValue {
                kind: "job status",
                value: other.to_string(),
            }),
        }
    }
}

/// Job entity. Created `queued` by the submission API; the instantiator
/// moves it to `running`, the lifecycle manager to `done` or `error`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: Uuid,
    pub workflow_id: Uuid,
    pub status: JobStatus,
    /// Global FIFO precedence across jobs; lower first.
    pub order_seq: i64,
    pub priority: i32,
    pub options: Value,
    pub progress: f64,
    pub current_task_key: Option<String>,
    pub scheduled_at: Option<DateTime<Utc>>,
    pub error_code: Option<String>,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

/// Fields the submission side provides when enqueuing a job; the store
/// assigns id, `order_seq` and timestamps.
#[derive(Debug, Clone)]
pub struct NewJob {
    pub workflow_id: Uuid,
    pub priority: i32,
    pub options: Value,
    pub scheduled_at: Option<DateTime<Utc>>,
}

impl NewJob {
    pub fn new(workflow_id: Uuid) -> Self {
        Self {
            workflow_id,
            priority: 0,
            options: Value::Object(serde_json::Map::new()),
            scheduled_at: None,
        }
    }
}
