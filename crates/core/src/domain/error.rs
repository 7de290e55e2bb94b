// Domain Error Types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DomainError {
    #[error("Unknown {kind} value: {value:?}")]
    UnknownValue { kind: &'static str, value: String },

    #[error("Invalid task state transition: {from} -> {to}")]
    InvalidStateTransition { from: String, to: String },

    #[error("Duplicate step key: {0}")]
    DuplicateStepKey(String),

    #[error("Step {step} depends on unknown step {dependency}")]
    UnknownDependency { step: String, dependency: String },

    #[error("Workflow steps contain a dependency cycle involving {0}")]
    CyclicDependency(String),

    #[error("Progress must be within [0, 1], got {0}")]
    InvalidProgress(f64),
}

pub type Result<T> = std::result::Result<T, DomainError>;
