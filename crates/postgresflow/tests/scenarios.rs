mod common;

use chrono::Utc;
use common::{fetch_row_state, insert_row, registered_job_handler, row_exists, setup_db,
    unregistered_job_handler};
use postgresflow::handler::parse_handler;
use postgresflow::jobs::{BoxFuture, Job, JobRecord, JobRegistry, JobsRepo};
use serde_json::Value;
use serial_test::serial;
use std::sync::{Arc, Mutex};

/// A job that records the order in which its hooks fire, so the test
/// can assert `before -> run -> after -> success` (scenario 1).
struct TracingJob {
    calls: Arc<Mutex<Vec<&'static str>>>,
}

impl Job for TracingJob {
    fn before(&mut self) -> BoxFuture<'_, anyhow::Result<()>> {
        self.calls.lock().unwrap().push("before");
        Box::pin(async { Ok(()) })
    }

    fn run(&mut self) -> BoxFuture<'_, anyhow::Result<()>> {
        self.calls.lock().unwrap().push("run");
        Box::pin(async { Ok(()) })
    }

    fn after(&mut self) -> BoxFuture<'_, anyhow::Result<()>> {
        self.calls.lock().unwrap().push("after");
        Box::pin(async { Ok(()) })
    }

    fn success(&mut self) -> BoxFuture<'_, ()> {
        self.calls.lock().unwrap().push("success");
        Box::pin(async {})
    }

    fn error(&mut self, _message: &str) -> BoxFuture<'_, ()> {
        self.calls.lock().unwrap().push("error");
        Box::pin(async {})
    }

    fn failure(&mut self, _message: &str) -> BoxFuture<'_, ()> {
        self.calls.lock().unwrap().push("failure");
        Box::pin(async {})
    }
}

/// Runs the `before -> run -> after` chain the same way the worker loop
/// does (minus the watchdog/shutdown race, which is exercised only by
/// the binary's own main loop), then settles the row exactly as
/// `handle_job` would on success.
async fn run_to_success(repo: &JobsRepo, record: &mut JobRecord, job: &mut dyn Job) -> anyhow::Result<()> {
    job.before().await?;
    job.run().await?;
    job.after().await?;
    job.success().await;
    record.remove(repo).await
}

/// Scenario 1: a registered job runs to completion; hooks fire in
/// order, and the row is deleted rather than updated.
#[tokio::test]
#[serial]
async fn basic_success_runs_hooks_in_order_and_deletes_the_row() {
    let pool = setup_db().await;
    let repo = JobsRepo::new(pool.clone(), vec![]);

    let handler = registered_job_handler(7, "hello");
    let id = insert_row(&pool, &handler, "default", Utc::now(), 0, 0).await;

    let leased = repo
        .lease_one(&["default".to_string()], 60, "host:a pid:1")
        .await
        .unwrap()
        .expect("row should be leasable");

    let parsed = parse_handler(&leased.handler).unwrap();
    assert_eq!(parsed.class_name, "RegisteredJob");

    let calls = Arc::new(Mutex::new(Vec::new()));
    let mut job = TracingJob { calls: calls.clone() };

    let mut record = JobRecord {
        id: leased.id,
        class_name: parsed.class_name,
        attempts: leased.attempts,
        max_attempts: 3,
        queue: leased.queue.clone(),
        max_backoff_seconds: None,
        attributes: parsed.attributes,
        abstract_job: false,
        extra_fields: leased.extra_fields.clone(),
    };

    run_to_success(&repo, &mut record, &mut job).await.unwrap();

    assert_eq!(*calls.lock().unwrap(), vec!["before", "run", "after", "success"]);
    assert!(!row_exists(&pool, id).await, "row must be deleted on success");
}

/// Scenario 6: a handler blob naming a class the registry doesn't know
/// is never run — it is settled as an error without invoking any job
/// hooks, and the row is updated (not deleted) so it can retry once the
/// class is registered.
#[tokio::test]
#[serial]
async fn unsupported_job_is_settled_without_running() {
    let pool = setup_db().await;
    let repo = JobsRepo::new(pool.clone(), vec![]);

    let handler = unregistered_job_handler();
    let id = insert_row(&pool, &handler, "default", Utc::now(), 0, 0).await;

    let leased = repo
        .lease_one(&["default".to_string()], 60, "host:a pid:1")
        .await
        .unwrap()
        .expect("row should be leasable");

    let parsed = parse_handler(&leased.handler).unwrap();
    let registry = JobRegistry::new();
    assert!(!registry.is_registered(&parsed.class_name));

    let mut record = JobRecord {
        id: leased.id,
        class_name: parsed.class_name.clone(),
        attempts: leased.attempts,
        max_attempts: 3,
        queue: leased.queue.clone(),
        max_backoff_seconds: None,
        attributes: Value::Null,
        abstract_job: true,
        extra_fields: leased.extra_fields.clone(),
    };

    let message = format!("Unsupported Job: {}, please import it before you can handle it", parsed.class_name);
    let permanently_failed = record.set_error_and_unlock(&repo, &message).await.unwrap();

    assert!(!permanently_failed, "first attempt out of 3 should not be permanent yet");
    assert!(row_exists(&pool, id).await, "row must survive to be retried, not be deleted");

    let state = fetch_row_state(&pool, id).await;
    assert_eq!(state.attempts, 1);
    assert!(state.last_error.as_deref().unwrap().contains("Unsupported Job"));
    assert!(state.locked_at.is_none());
    assert!(state.locked_by.is_none());
}
