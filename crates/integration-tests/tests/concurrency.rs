//! Concurrent dispatch: each task is claimed by at most one node per
//! attempt, with no coordination outside the datastore.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{TimeZone, Utc};
use conveyor_core::domain::{NewJob, Workflow, WorkflowStep};
use conveyor_core::port::clock::mocks::FixedClock;
use conveyor_core::{Engine, EngineConfig};
use conveyor_infra_sqlite::{memory_pool, run_migrations, SqliteTaskStore};
use uuid::Uuid;

const TASKS: usize = 20;
const AGENTS: usize = 4;

async fn engine() -> Arc<Engine> {
    let pool = memory_pool().await.unwrap();
    run_migrations(&pool).await.unwrap();
    let clock = Arc::new(FixedClock::at(
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap(),
    ));
    let store = Arc::new(SqliteTaskStore::new(pool));
    Arc::new(Engine::new(store, clock, EngineConfig::default()))
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_dispatchers_claim_disjoint_sets() {
    let engine = engine().await;

    let steps = (0..TASKS)
        .map(|i| WorkflowStep::new(format!("t{i:02}"), "svc"))
        .collect();
    let workflow = Workflow::new(Uuid::new_v4(), "fanout", 1, steps, Utc::now());
    engine.create_workflow(&workflow).await.unwrap();
    let job = engine.enqueue_job(&NewJob::new(workflow.id)).await.unwrap();
    engine.instantiate_job(job.id).await.unwrap();

    let mut handles = Vec::new();
    for agent in 0..AGENTS {
        let engine = Arc::clone(&engine);
        handles.push(tokio::spawn(async move {
            let node = format!("node-{agent}");
            let mut mine = Vec::new();
            loop {
                let claimed = engine.dispatch("svc", 3, &node).await.unwrap();
                if claimed.is_empty() {
                    break;
                }
                mine.extend(claimed.into_iter().map(|t| t.id));
            }
            mine
        }));
    }

    let mut total = 0usize;
    let mut unique: HashSet<Uuid> = HashSet::new();
    for handle in handles {
        let mine = handle.await.unwrap();
        total += mine.len();
        unique.extend(mine);
    }

    // Every task claimed exactly once across all agents.
    assert_eq!(total, TASKS);
    assert_eq!(unique.len(), TASKS);

    // And nothing left to hand out.
    assert!(engine.dispatch("svc", 10, "node-x").await.unwrap().is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn claims_survive_interleaved_completions() {
    let engine = engine().await;

    let steps = (0..TASKS)
        .map(|i| WorkflowStep::new(format!("t{i:02}"), "svc"))
        .collect();
    let workflow = Workflow::new(Uuid::new_v4(), "churn", 1, steps, Utc::now());
    engine.create_workflow(&workflow).await.unwrap();
    let job = engine.enqueue_job(&NewJob::new(workflow.id)).await.unwrap();
    engine.instantiate_job(job.id).await.unwrap();

    let mut handles = Vec::new();
    for agent in 0..AGENTS {
        let engine = Arc::clone(&engine);
        handles.push(tokio::spawn(async move {
            let node = format!("node-{agent}");
            let mut completed = 0usize;
            loop {
                let claimed = engine.dispatch("svc", 2, &node).await.unwrap();
                if claimed.is_empty() {
                    break;
                }
                for task in claimed {
                    engine.start_task(task.id).await.unwrap();
                    engine.complete_task(task.id, None).await.unwrap();
                    completed += 1;
                }
            }
            completed
        }));
    }

    let mut completed = 0usize;
    for handle in handles {
        completed += handle.await.unwrap();
    }
    assert_eq!(completed, TASKS);

    let job = engine.get_job(job.id).await.unwrap().unwrap();
    assert_eq!(job.status.as_str(), "done");
}
