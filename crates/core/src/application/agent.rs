// Service Agent - per-service dispatch loop
//
// An agent repeatedly claims runnable tasks for its service and hands them
// to a TaskRunner pool. All coordination lives in the datastore; the loop
// itself is stateless and any number of agents may run against one store.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinSet;
use tokio::time::sleep;
use tracing::{error, info, warn};

use crate::domain::JobTask;
use crate::engine::Engine;
use crate::error::Result;
use crate::port::TaskRunner;

/// Shutdown signal for graceful termination
#[derive(Clone)]
pub struct ShutdownToken {
    rx: watch::Receiver<bool>,
}

impl ShutdownToken {
    /// Check if shutdown was requested
    pub fn is_shutdown(&self) -> bool {
        *self.rx.borrow()
    }

    /// Wait for shutdown signal
    pub async fn wait(&mut self) {
        let _ = self.rx.changed().await;
    }
}

/// Shutdown sender
pub struct ShutdownSender {
    tx: watch::Sender<bool>,
}

impl ShutdownSender {
    /// Signal shutdown to all agents
    pub fn shutdown(&self) {
        let _ = self.tx.send(true);
    }
}

/// Create a shutdown channel
pub fn shutdown_channel() -> (ShutdownSender, ShutdownToken) {
    let (tx, rx) = watch::channel(false);
    (ShutdownSender { tx }, ShutdownToken { rx })
}

#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// Service whose tasks this agent executes.
    pub service: String,
    /// Stable node identity stamped into claims.
    pub node_name: String,
    /// Maximum tasks requested per poll.
    pub capacity: i64,
    pub idle_sleep: Duration,
    pub error_backoff_base: Duration,
    pub error_backoff_max: Duration,
}

impl AgentConfig {
    pub fn new(service: impl Into<String>, node_name: impl Into<String>, capacity: i64) -> Self {
        Self {
            service: service.into(),
            node_name: node_name.into(),
            capacity,
            idle_sleep: Duration::from_millis(500),
            error_backoff_base: Duration::from_millis(500),
            error_backoff_max: Duration::from_secs(30),
        }
    }
}

/// Dispatch loop for one service (spec: open transaction, select, claim,
/// commit, execute; retry with exponential back-off on datastore failure).
pub struct ServiceAgent {
    engine: Arc<Engine>,
    runner: Arc<dyn TaskRunner>,
    config: AgentConfig,
}

impl ServiceAgent {
    pub fn new(engine: Arc<Engine>, runner: Arc<dyn TaskRunner>, config: AgentConfig) -> Self {
        Self {
            engine,
            runner,
            config,
        }
    }

    /// Run the agent loop with graceful shutdown support.
    pub async fn run(&self, mut shutdown: ShutdownToken) -> Result<()> {
        info!(
            service = %self.config.service,
            node = %self.config.node_name,
            "service agent started"
        );

        let mut error_backoff = self.config.error_backoff_base;
        loop {
            if shutdown.is_shutdown() {
                break;
            }

            match self.poll_once().await {
                Ok(0) => {
                    error_backoff = self.config.error_backoff_base;
                    tokio::select! {
                        _ = sleep(self.config.idle_sleep) => {},
                        _ = shutdown.wait() => break,
                    }
                }
                Ok(_) => {
                    error_backoff = self.config.error_backoff_base;
                }
                Err(e) => {
                    error!(
                        service = %self.config.service,
                        error = %e,
                        "dispatch cycle failed"
                    );
                    tokio::select! {
                        _ = sleep(error_backoff) => {},
                        _ = shutdown.wait() => break,
                    }
                    error_backoff = (error_backoff * 2).min(self.config.error_backoff_max);
                }
            }
        }

        info!(service = %self.config.service, "service agent stopped");
        Ok(())
    }

    /// One dispatch cycle: claim a batch, run every task to a terminal
    /// report, return how many ran. Public so tests can drive the agent
    /// deterministically.
    pub async fn poll_once(&self) -> Result<usize> {
        let tasks = self
            .engine
            .dispatch(&self.config.service, self.config.capacity, &self.config.node_name)
            .await?;
        if tasks.is_empty() {
            return Ok(0);
        }

        let count = tasks.len();
        let mut pool = JoinSet::new();
        for task in tasks {
            let engine = Arc::clone(&self.engine);
            let runner = Arc::clone(&self.runner);
            pool.spawn(async move { run_one(engine, runner, task).await });
        }

        while let Some(joined) = pool.join_next().await {
            match joined {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!(error = %e, "task outcome reporting failed"),
                Err(join_err) => error!(error = %join_err, "task execution aborted"),
            }
        }

        Ok(count)
    }
}

/// Drive one claimed task: ack it running, execute the runner with panic
/// isolation, report the terminal outcome.
async fn run_one(
    engine: Arc<Engine>,
    runner: Arc<dyn TaskRunner>,
    task: JobTask,
) -> Result<()> {
    engine.start_task(task.id).await?;

    let execution = {
        let runner = Arc::clone(&runner);
        let task = task.clone();
        tokio::spawn(async move { runner.run(&task).await })
    };

    match execution.await {
        Ok(Ok(results)) => {
            engine.complete_task(task.id, results).await?;
        }
        Ok(Err(e)) => {
            engine.fail_task(task.id, &e.code, &e.message).await?;
        }
        Err(join_err) => {
            // Runner panicked; the claim must still reach a terminal report.
            engine
                .fail_task(task.id, "panic", &join_err.to_string())
                .await?;
        }
    }

    Ok(())
}
