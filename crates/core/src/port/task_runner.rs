// Task Runner Port - worker-side execution of claimed tasks
//
// The engine never runs business logic itself; a service agent hands each
// claimed task to a TaskRunner and reports the outcome back.

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

use crate::domain::JobTask;

/// Business-logic failure reported by a worker. `code` and `message` end up
/// merged into the task's results by `mark_error`.
#[derive(Error, Debug, Clone)]
#[error("{code}: {message}")]
pub struct RunnerError {
    pub code: String,
    pub message: String,
}

impl RunnerError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }
}

/// Task Runner trait
///
/// Implementations live in the worker services (transcoder, indexer, ...).
/// Runners MUST be idempotent with respect to repeated delivery of the same
/// task id.
#[async_trait]
pub trait TaskRunner: Send + Sync {
    /// Execute one claimed task; Ok(Some(results)) merges results into the
    /// task row on completion.
    async fn run(&self, task: &JobTask) -> Result<Option<Value>, RunnerError>;
}

// ============================================================================
// Mock Implementations for Testing
// ============================================================================

pub mod mocks {
    use super::*;
    use std::sync::{Arc, Mutex};

    /// Mock runner behavior
    #[derive(Debug, Clone)]
    pub enum MockBehavior {
        /// Succeed, optionally returning results
        Success(Option<Value>),
        /// Fail with code and message
        Fail(String, String),
        /// Panic with message (for panic isolation testing)
        Panic(String),
    }

    /// Mock Task Runner for testing
    pub struct MockRunner {
        behavior: Mutex<MockBehavior>,
        calls: Arc<Mutex<Vec<uuid::Uuid>>>,
    }

    impl MockRunner {
        pub fn new(behavior: MockBehavior) -> Self {
            Self {
                behavior: Mutex::new(behavior),
                calls: Arc::new(Mutex::new(Vec::new())),
            }
        }

        pub fn succeeding() -> Self {
            Self::new(MockBehavior::Success(None))
        }

        pub fn succeeding_with(results: Value) -> Self {
            Self::new(MockBehavior::Success(Some(results)))
        }

        pub fn failing(code: impl Into<String>, message: impl Into<String>) -> Self {
            Self::new(MockBehavior::Fail(code.into(), message.into()))
        }

        pub fn panicking(message: impl Into<String>) -> Self {
            Self::new(MockBehavior::Panic(message.into()))
        }

        pub fn set_behavior(&self, behavior: MockBehavior) {
            *self.behavior.lock().unwrap() = behavior;
        }

        /// Task ids this runner has been handed, in order.
        pub fn calls(&self) -> Vec<uuid::Uuid> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl TaskRunner for MockRunner {
        async fn run(&self, task: &JobTask) -> Result<Option<Value>, RunnerError> {
            self.calls.lock().unwrap().push(task.id);

            let behavior = self.behavior.lock().unwrap().clone();
            match behavior {
                MockBehavior::Success(results) => Ok(results),
                MockBehavior::Fail(code, message) => Err(RunnerError::new(code, message)),
                MockBehavior::Panic(message) => panic!("{}", message),
            }
        }
    }
}
