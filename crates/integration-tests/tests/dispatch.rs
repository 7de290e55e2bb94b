//! Dispatcher: global FIFO ordering, dependency gating, capacity caps and
//! retry back-off filtering.

use std::sync::Arc;

use chrono::{Duration, TimeZone, Utc};
use conveyor_core::domain::{Job, NewJob, Node, Workflow, WorkflowStep};
use conveyor_core::port::clock::mocks::FixedClock;
use conveyor_core::port::Clock;
use conveyor_core::{Engine, EngineConfig};
use conveyor_infra_sqlite::{memory_pool, run_migrations, SqliteTaskStore};
use sqlx::SqlitePool;
use uuid::Uuid;

struct Harness {
    pool: SqlitePool,
    clock: Arc<FixedClock>,
    engine: Arc<Engine>,
}

async fn harness() -> Harness {
    let pool = memory_pool().await.unwrap();
    run_migrations(&pool).await.unwrap();
    let clock = Arc::new(FixedClock::at(
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap(),
    ));
    let store = Arc::new(SqliteTaskStore::new(pool.clone()));
    let engine = Arc::new(Engine::new(store, clock.clone(), EngineConfig::default()));
    Harness {
        pool,
        clock,
        engine,
    }
}

/// Three-step chain x1 <- x2 <- x3, all on `svc`.
fn chain_steps() -> Vec<WorkflowStep> {
    vec![
        WorkflowStep::new("x1", "svc"),
        WorkflowStep::new("x2", "svc").depends_on(&["x1"]),
        WorkflowStep::new("x3", "svc").depends_on(&["x2"]),
    ]
}

async fn seed_instantiated_job(h: &Harness, steps: Vec<WorkflowStep>) -> Job {
    let workflow = Workflow::new(Uuid::new_v4(), "wf", 1, steps, h.clock.now());
    h.engine.create_workflow(&workflow).await.unwrap();
    let job = h.engine.enqueue_job(&NewJob::new(workflow.id)).await.unwrap();
    h.engine.instantiate_job(job.id).await.unwrap();
    job
}

#[tokio::test]
async fn global_fifo_ordering_across_jobs() {
    let h = harness().await;
    let j1 = seed_instantiated_job(&h, chain_steps()).await;
    let j2 = seed_instantiated_job(&h, chain_steps()).await;
    assert!(j1.order_seq < j2.order_seq);

    // Only the two roots are runnable, older job first.
    let claimed = h.engine.dispatch("svc", 10, "node-a").await.unwrap();
    assert_eq!(
        claimed
            .iter()
            .map(|t| (t.job_id, t.task_key.as_str()))
            .collect::<Vec<_>>(),
        vec![(j1.id, "x1"), (j2.id, "x1")]
    );

    // Everything runnable is claimed; a second poll comes back empty.
    assert!(h.engine.dispatch("svc", 10, "node-b").await.unwrap().is_empty());

    // Completing the roots unlocks the next rank, same order.
    for task in &claimed {
        h.engine.complete_task(task.id, None).await.unwrap();
    }
    let next = h.engine.dispatch("svc", 10, "node-a").await.unwrap();
    assert_eq!(
        next.iter()
            .map(|t| (t.job_id, t.task_key.as_str()))
            .collect::<Vec<_>>(),
        vec![(j1.id, "x2"), (j2.id, "x2")]
    );
}

#[tokio::test]
async fn dispatch_respects_the_poll_limit() {
    let h = harness().await;
    let j1 = seed_instantiated_job(&h, chain_steps()).await;
    seed_instantiated_job(&h, chain_steps()).await;

    let claimed = h.engine.dispatch("svc", 1, "node-a").await.unwrap();
    assert_eq!(claimed.len(), 1);
    assert_eq!(claimed[0].job_id, j1.id);
}

#[tokio::test]
async fn claim_stamps_node_identity() {
    let h = harness().await;
    seed_instantiated_job(&h, vec![WorkflowStep::new("only", "svc")]).await;

    let claimed = h.engine.dispatch("svc", 10, "node-a").await.unwrap();
    let task = h.engine.get_task(claimed[0].id).await.unwrap().unwrap();
    assert_eq!(task.status.as_str(), "starting");
    assert_eq!(task.claimed_by.as_deref(), Some("node-a"));
    assert_eq!(task.assigned_node.as_deref(), Some("node-a"));
    assert!(task.claimed_at.is_some());
}

#[tokio::test]
async fn capacity_cap_limits_claims_to_node_headroom() {
    let h = harness().await;
    h.engine
        .register_node(&Node::new("n1").with_concurrency("svc", 2))
        .await
        .unwrap();

    let steps = (1..=5)
        .map(|i| WorkflowStep::new(format!("t{i}"), "svc"))
        .collect();
    seed_instantiated_job(&h, steps).await;

    // Zero running: two slots.
    let first = h.engine.dispatch("svc", 10, "n1").await.unwrap();
    assert_eq!(first.len(), 2);
    for task in &first {
        h.engine.start_task(task.id).await.unwrap();
    }

    // Both slots busy: nothing.
    assert!(h.engine.dispatch("svc", 10, "n1").await.unwrap().is_empty());

    // One slot frees up.
    h.engine.complete_task(first[0].id, None).await.unwrap();
    assert_eq!(h.engine.dispatch("svc", 10, "n1").await.unwrap().len(), 1);
}

#[tokio::test]
async fn undeclared_service_is_uncapped() {
    let h = harness().await;
    h.engine
        .register_node(&Node::new("n1").with_concurrency("other-svc", 1))
        .await
        .unwrap();

    let steps = (1..=3)
        .map(|i| WorkflowStep::new(format!("t{i}"), "svc"))
        .collect();
    seed_instantiated_job(&h, steps).await;

    assert_eq!(h.engine.dispatch("svc", 10, "n1").await.unwrap().len(), 3);
}

#[tokio::test]
async fn backoff_hides_tasks_until_next_attempt_at() {
    let h = harness().await;
    seed_instantiated_job(&h, vec![WorkflowStep::new("only", "svc")]).await;

    // Push the task 60s into the future, as a failed attempt would.
    let next_attempt = h.clock.now() + Duration::seconds(60);
    sqlx::query("UPDATE job_tasks SET next_attempt_at = ?")
        .bind(next_attempt.timestamp_millis())
        .execute(&h.pool)
        .await
        .unwrap();

    assert!(h.engine.dispatch("svc", 10, "n1").await.unwrap().is_empty());

    h.clock.advance(Duration::seconds(61));
    assert_eq!(h.engine.dispatch("svc", 10, "n1").await.unwrap().len(), 1);
}

#[tokio::test]
async fn different_service_sees_nothing() {
    let h = harness().await;
    seed_instantiated_job(&h, vec![WorkflowStep::new("only", "svc")]).await;
    assert!(h.engine.dispatch("transcode", 10, "n1").await.unwrap().is_empty());
}
