// Task Event - append-only journal rows

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::domain::error::DomainError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventLevel {
    Debug,
    Info,
    Warn,
    Error,
}

impl EventLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventLevel::Debug => "debug",
            EventLevel::Info => "info",
            EventLevel::Warn => "warn",
            EventLevel::Error => "error",
        }
    }
}

impl std::fmt::Display for EventLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for EventLevel {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "debug" => Ok(EventLevel::Debug),
            "info" => Ok(EventLevel::Info),
            "warn" => Ok(EventLevel::Warn),
            "error" => Ok(EventLevel::Error),
            other => Err(DomainError::UnknownValue {
                kind: "event level",
                value: other.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventType {
    Status,
    Progress,
    Log,
    Artifact,
    Heartbeat,
    Retry,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::Status => "status",
            EventType::Progress => "progress",
            EventType::Log => "log",
            EventType::Artifact => "artifact",
            EventType::Heartbeat => "heartbeat",
            EventType::Retry => "retry",
        }
    }
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for EventType {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "status" => Ok(EventType::Status),
            "progress" => Ok(EventType::Progress),
            "log" => Ok(EventType::Log),
            "artifact" => Ok(EventType::Artifact),
            "heartbeat" => Ok(EventType::Heartbeat),
            "retry" => Ok(EventType::Retry),
            other => Err(DomainError::UnknownValue {
                kind: "event type",
                value: other.to_string(),
            }),
        }
    }
}

/// Persisted journal row. Ids are datastore-generated and monotone.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskEvent {
    pub id: i64,
    pub job_id: Uuid,
    pub job_task_id: Option<Uuid>,
    pub ts: DateTime<Utc>,
    pub source: String,
    pub level: EventLevel,
    pub kind: EventType,
    pub message: String,
    pub data: Value,
}

/// Append request. `job_id` may be omitted when `job_task_id` resolves it;
/// `ts` defaults to the datastore's clock.
#[derive(Debug, Clone)]
pub struct NewEvent {
    pub level: EventLevel,
    pub kind: EventType,
    pub message: String,
    pub data: Value,
    pub job_id: Option<Uuid>,
    pub job_task_id: Option<Uuid>,
    pub source: String,
    pub ts: Option<DateTime<Utc>>,
}

impl NewEvent {
    pub fn new(level: EventLevel, kind: EventType, message: impl Into<String>) -> Self {
        Self {
            level,
            kind,
            message: message.into(),
            data: Value::Object(serde_json::Map::new()),
            job_id: None,
            job_task_id: None,
            source: "service:unknown".to_string(),
            ts: None,
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

    pub fn from_source(mut self, source: impl Into<String>) -> Self {
        self.source = source.into();
        self
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = data;
        self
    }

    /// Explicit timestamp; the datastore clock is used when omitted.
    pub fn at(mut self, ts: DateTime<Utc>) -> Self {
        self.ts = Some(ts);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn level_rejects_trace() {
        assert!(matches!(
            "trace".parse::<EventLevel>(),
            Err(DomainError::UnknownValue { kind: "event level", .. })
        ));
    }

    #[test]
    fn type_round_trips() {
        for t in ["status", "progress", "log", "artifact", "heartbeat", "retry"] {
            assert_eq!(t.parse::<EventType>().unwrap().as_str(), t);
        }
        assert!("metric".parse::<EventType>().is_err());
    }

    #[test]
    fn new_events_share_no_data_map() {
        let mut a = NewEvent::new(EventLevel::Info, EventType::Log, "a");
        let b = NewEvent::new(EventLevel::Info, EventType::Log, "b");
        a.data["k"] = serde_json::json!(1);
        assert_eq!(b.data, serde_json::json!({}));
    }
}
