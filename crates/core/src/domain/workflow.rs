// Workflow Definition - a named, versioned DAG of steps

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::domain::error::{DomainError, Result};

/// One step of a workflow definition, embedded in `Workflow::steps`.
///
/// `key` must be unique within the workflow; `depends_on` references sibling
/// keys that must reach `done` before this step becomes runnable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowStep {
    pub key: String,
    pub service: String,

    #[serde(default)]
    pub depends_on: Vec<String>,

    #[serde(default = "default_params")]
    pub default_params: Value,

    /// When true, exhausting all attempts records the task as `skipped`
    /// instead of `error`, and the job can still finish `done`.
    #[serde(default)]
    pub skippable: bool,
}

fn default_params() -> Value {
    Value::Object(serde_json::Map::new())
}

impl WorkflowStep {
    pub fn new(key: impl Into<String>, service: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            service: service.into(),
            depends_on: Vec::new(),
            default_params: default_params(),
            skippable: false,
        }
    }

    pub fn depends_on(mut self, keys: &[&str]) -> Self {
        self.depends_on = keys.iter().map(|k| k.to_string()).collect();
        self
    }

    pub fn with_params(mut self, params: Value) -> Self {
        self.default_params = params;
        self
    }

    pub fn skippable(mut self) -> Self {
        self.skippable = true;
        self
    }
}

/// Workflow definition. Immutable once referenced by a job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Workflow {
    pub id: Uuid,
    pub name: String,
    pub version: i32,
    pub steps: Vec<WorkflowStep>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Workflow {
    /// Create a new workflow definition with explicit id and timestamp.
    pub fn new(
        id: Uuid,
        name: impl Into<String>,
        version: i32,
        steps: Vec<WorkflowStep>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            name: name.into(),
            version,
            steps,
            is_active: true,
            created_at: now,
            updated_at: now,
        }
    }

    /// Validate the step graph: unique keys, known dependencies, no cycles.
    ///
    /// Instantiation refuses workflows that fail this check, so a job can
    /// never be populated with tasks that would deadlock the dispatcher.
    pub fn validate(&self) -> Result<()> {
        let mut keys = HashSet::with_capacity(self.steps.len());
        for step in &self.steps {
            if !keys.insert(step.key.as_str()) {
                return Err(DomainError::DuplicateStepKey(step.key.clone()));
            }
        }

        for step in &self.steps {
            for dep in &step.depends_on {
                if !keys.contains(dep.as_str()) {
                    return Err(DomainError::UnknownDependency {
                        step: step.key.clone(),
                        dependency: dep.clone(),
                    });
                }
            }
        }

        // Kahn's algorithm: repeatedly peel steps whose dependencies are
        // all resolved; anything left over sits on a cycle.
        let mut remaining: HashMap<&str, HashSet<&str>> = self
            .steps
            .iter()
            .map(|s| {
                (
                    s.key.as_str(),
                    s.depends_on.iter().map(String::as_str).collect(),
                )
            })
            .collect();

        while !remaining.is_empty() {
            let ready: Vec<&str> = remaining
                .iter()
                .filter(|(_, deps)| deps.is_empty())
                .map(|(k, _)| *k)
                .collect();

            if ready.is_empty() {
                let stuck = remaining.keys().min().copied().unwrap_or_default();
                return Err(DomainError::CyclicDependency(stuck.to_string()));
            }

            for key in &ready {
                remaining.remove(key);
            }
            for deps in remaining.values_mut() {
                for key in &ready {
                    deps.remove(key);
                }
            }
        }

        Ok(())
    }
}
