// Task Artifact - references to externally stored objects, never bytes

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::error::DomainError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactKind {
    Input,
    Output,
    Log,
}

impl ArtifactKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ArtifactKind::Input => "input",
            ArtifactKind::Output => "output",
            ArtifactKind::Log => "log",
        }
    }
}

impl std::fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ArtifactKind {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "input" => Ok(ArtifactKind::Input),
            "output" => Ok(ArtifactKind::Output),
            "log" => Ok(ArtifactKind::Log),
            other => Err(DomainError::UnknownValue {
                kind: "artifact kind",
                value: other.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskArtifact {
    pub id: Uuid,
    pub job_id: Uuid,
    pub job_task_id: Option<Uuid>,
    pub kind: ArtifactKind,
    pub bucket: String,
    pub key: String,
    pub size_bytes: Option<i64>,
    pub content_type: Option<String>,
    pub checksum: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Record request; provenance metadata is optional.
#[derive(Debug, Clone)]
pub struct NewArtifact {
    pub job_id: Option<Uuid>,
    pub job_task_id: Option<Uuid>,
    pub kind: ArtifactKind,
    pub bucket: String,
    pub key: String,
    pub size_bytes: Option<i64>,
    pub content_type: Option<String>,
    pub checksum: Option<String>,
}

impl NewArtifact {
    pub fn new(kind: ArtifactKind, bucket: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            job_id: None,
            job_task_id: None,
            kind,
            bucket: bucket.into(),
            key: key.into(),
            size_bytes: None,
            content_type: None,
            checksum: None,
        }
    }

    pub fn for_job(mut self, job_id: Uuid) -> Self {
        self.job_id = Some(job_id);
        self
    }

    pub fn for_task(mut self, job_task_id: Uuid) -> Self {
        self.job_task_id = Some(job_task_id);
        self
    }
}
