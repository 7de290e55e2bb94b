// Node - worker machine registration and per-service concurrency caps

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::error::DomainError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AwakeState {
    Unknown,
    Awake,
    Sleep,
}

impl AwakeState {
    pub fn as_str(&self) -> &'static str {
        match self {
            AwakeState::Unknown => "unknown",
            AwakeState::Awake => "awake",
            AwakeState::Sleep => "sleep",
        }
    }
}

impl std::fmt::Display for AwakeState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for AwakeState {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "unknown" => Ok(AwakeState::Unknown),
            "awake" => Ok(AwakeState::Awake),
            "sleep" => Ok(AwakeState::Sleep),
            other => Err(DomainError::UnknownValue {
                kind: "awake state",
                value: other.to_string(),
            }),
        }
    }
}

/// Worker machine record. The dispatcher only reads `max_concurrency`;
/// wake management belongs to an external collaborator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    pub name: String,
    pub labels: Vec<String>,
    pub last_seen: Option<DateTime<Utc>>,
    pub awake_state: AwakeState,
    pub wake_method: Option<String>,
    pub mac: Option<String>,
    pub provider_ref: Option<String>,
    pub script: Option<String>,
    /// service name -> maximum concurrently running tasks on this node
    pub max_concurrency: HashMap<String, i64>,
}

impl Node {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            labels: Vec::new(),
            last_seen: None,
            awake_state: AwakeState::Unknown,
            wake_method: None,
            mac: None,
            provider_ref: None,
            script: None,
            max_concurrency: HashMap::new(),
        }
    }

    pub fn with_concurrency(mut self, service: impl Into<String>, limit: i64) -> Self {
        self.max_concurrency.insert(service.into(), limit);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nodes_share_no_containers() {
        let mut a = Node::new("n1");
        let b = Node::new("n2");
        a.labels.push("gpu".to_string());
        a.max_concurrency.insert("svc".to_string(), 4);
        assert!(b.labels.is_empty());
        assert!(b.max_concurrency.is_empty());
    }

    #[test]
    fn awake_state_rejects_unknown_value() {
        assert!("hibernate".parse::<AwakeState>().is_err());
    }
}
