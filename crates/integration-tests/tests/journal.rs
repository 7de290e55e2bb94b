//! Event and artifact journal: closed enumerations, referential validation
//! and append-only ids.

use std::sync::Arc;

use chrono::{Duration, TimeZone, Utc};
use conveyor_core::domain::{
    ArtifactKind, EventLevel, EventType, Job, JobTask, NewArtifact, NewEvent, NewJob, Workflow,
    WorkflowStep,
};
use conveyor_core::port::clock::mocks::FixedClock;
use conveyor_core::port::Clock;
use conveyor_core::port::object_key;
use conveyor_core::{Engine, EngineConfig, EngineError};
use conveyor_infra_sqlite::{memory_pool, run_migrations, SqliteTaskStore};
use serde_json::json;
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

/// One instantiated single-step job plus its claimed task.
async fn seed_task(h: &Harness) -> (Job, JobTask) {
    let workflow = Workflow::new(
        Uuid::new_v4(),
        "wf",
        1,
        vec![WorkflowStep::new("only", "svc")],
        h.clock.now(),
    );
    h.engine.create_workflow(&workflow).await.unwrap();
    let job = h.engine.enqueue_job(&NewJob::new(workflow.id)).await.unwrap();
    h.engine.instantiate_job(job.id).await.unwrap();
    let mut claimed = h.engine.dispatch("svc", 1, "node-a").await.unwrap();
    (job, claimed.pop().unwrap())
}

async fn event_count(pool: &SqlitePool) -> i64 {
    sqlx::query_scalar("SELECT COUNT(*) FROM task_events")
        .fetch_one(pool)
        .await
        .unwrap()
}

#[tokio::test]
async fn unknown_level_and_type_never_reach_the_store() {
    // The closed enumerations refuse the string before any write exists.
    assert!("trace".parse::<EventLevel>().is_err());
    assert!("metric".parse::<EventType>().is_err());
}

#[tokio::test]
async fn event_requires_a_job_reference() {
    let h = harness().await;
    let before = event_count(&h.pool).await;

    let err = h
        .engine
        .append_event(NewEvent::new(EventLevel::Info, EventType::Log, "orphan"))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Validation(_)));
    assert_eq!(event_count(&h.pool).await, before);
}

#[tokio::test]
async fn mismatched_job_and_task_is_rejected_without_a_write() {
    let h = harness().await;
    let (_, task) = seed_task(&h).await;
    let other_job = Uuid::new_v4();
    let before = event_count(&h.pool).await;

    let err = h
        .engine
        .append_event(
            NewEvent::new(EventLevel::Info, EventType::Log, "bad")
                .for_job(other_job)
                .for_task(task.id),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Validation(_)));
    assert_eq!(event_count(&h.pool).await, before);
}

#[tokio::test]
async fn job_id_is_filled_from_the_task() {
    let h = harness().await;
    let (job, task) = seed_task(&h).await;

    let id = h
        .engine
        .append_event(
            NewEvent::new(EventLevel::Info, EventType::Log, "hello")
                .for_task(task.id)
                .from_source("service:svc"),
        )
        .await
        .unwrap();

    let (job_id, task_id, source): (String, String, String) =
        sqlx::query_as("SELECT job_id, job_task_id, source FROM task_events WHERE id = ?")
            .bind(id)
            .fetch_one(&h.pool)
            .await
            .unwrap();
    assert_eq!(job_id, job.id.to_string());
    assert_eq!(task_id, task.id.to_string());
    assert_eq!(source, "service:svc");
}

#[tokio::test]
async fn unknown_task_reference_is_a_validation_error() {
    let h = harness().await;
    let err = h
        .engine
        .append_event(
            NewEvent::new(EventLevel::Info, EventType::Heartbeat, "beat").for_task(Uuid::new_v4()),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Validation(_)));
}

#[tokio::test]
async fn event_ids_are_monotone_and_payload_round_trips() {
    let h = harness().await;
    let (job, _) = seed_task(&h).await;

    let explicit_ts = h.clock.now() + Duration::seconds(5);
    let first = h
        .engine
        .append_event(
            NewEvent::new(EventLevel::Debug, EventType::Progress, "halfway")
                .for_job(job.id)
                .with_data(json!({"percent": 0.5}))
                .at(explicit_ts),
        )
        .await
        .unwrap();
    let second = h
        .engine
        .append_event(NewEvent::new(EventLevel::Info, EventType::Log, "next").for_job(job.id))
        .await
        .unwrap();
    assert!(second > first);

    let (ts, level, data): (i64, String, String) =
        sqlx::query_as("SELECT ts, level, data FROM task_events WHERE id = ?")
            .bind(first)
            .fetch_one(&h.pool)
            .await
            .unwrap();
    assert_eq!(ts, explicit_ts.timestamp_millis());
    assert_eq!(level, "debug");
    assert_eq!(
        serde_json::from_str::<serde_json::Value>(&data).unwrap(),
        json!({"percent": 0.5})
    );
}

#[tokio::test]
async fn list_events_returns_decoded_rows_oldest_first() {
    let h = harness().await;
    let (job, task) = seed_task(&h).await;

    h.engine
        .append_event(
            NewEvent::new(EventLevel::Info, EventType::Heartbeat, "alive")
                .for_task(task.id)
                .from_source("service:svc"),
        )
        .await
        .unwrap();

    // Instantiation already journaled a status event; ours follows it.
    let events = h.engine.list_events(job.id, 100).await.unwrap();
    assert!(events.len() >= 2);
    assert!(events.windows(2).all(|w| w[0].id < w[1].id));

    let last = events.last().unwrap();
    assert_eq!(last.kind, EventType::Heartbeat);
    assert_eq!(last.level, EventLevel::Info);
    assert_eq!(last.job_task_id, Some(task.id));
    assert_eq!(last.message, "alive");
}

#[tokio::test]
async fn artifact_reference_is_recorded_with_metadata() {
    let h = harness().await;
    let (job, task) = seed_task(&h).await;

    let key = object_key(
        ArtifactKind::Output,
        job.id,
        &task.task_key,
        Some("out.mp4"),
        None,
    );
    let artifact = NewArtifact::new(ArtifactKind::Output, "media", &key).for_task(task.id);
    let id = h
        .engine
        .record_artifact(NewArtifact {
            size_bytes: Some(1024),
            content_type: Some("video/mp4".to_string()),
            checksum: Some("sha256:abc".to_string()),
            ..artifact
        })
        .await
        .unwrap();

    let (job_id, kind, bucket, stored_key, size): (String, String, String, String, i64) =
        sqlx::query_as(
            "SELECT job_id, kind, bucket, key, size_bytes FROM task_artifacts WHERE id = ?",
        )
        .bind(id.to_string())
        .fetch_one(&h.pool)
        .await
        .unwrap();
    assert_eq!(job_id, job.id.to_string());
    assert_eq!(kind, "output");
    assert_eq!(bucket, "media");
    assert_eq!(stored_key, key);
    assert_eq!(size, 1024);

    let artifacts = h.engine.list_artifacts(job.id).await.unwrap();
    assert_eq!(artifacts.len(), 1);
    assert_eq!(artifacts[0].id, id);
    assert_eq!(artifacts[0].kind, ArtifactKind::Output);
    assert_eq!(artifacts[0].checksum.as_deref(), Some("sha256:abc"));
}

#[tokio::test]
async fn artifact_with_mismatched_job_is_rejected() {
    let h = harness().await;
    let (_, task) = seed_task(&h).await;

    let err = h
        .engine
        .record_artifact(
            NewArtifact::new(ArtifactKind::Log, "logs", "log/x")
                .for_job(Uuid::new_v4())
                .for_task(task.id),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Validation(_)));
}
