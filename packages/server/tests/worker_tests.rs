//! Integration tests for the delivery worker.
//!
//! Drives `Worker::run_batch` against the in-memory store, which
//! mirrors the Postgres claim and failure guards, so the retry,
//! dead-letter, and race behavior tested here is the production
//! behavior.

use notion::{Properties, PropertyValue};
use server_core::kernel::jobs::{
    Job, JobPayload, JobStatus, JobStore, Worker, MAX_ATTEMPTS,
};
use server_core::kernel::testing::{test_tenant, TestDeps};
use uuid::Uuid;

fn worker_for(td: &TestDeps) -> Worker {
    Worker::new(
        td.job_store.clone(),
        td.dedup.clone(),
        td.writer.clone(),
        td.messaging.clone(),
        td.metrics.clone(),
    )
}

fn text_job(tenant_id: Uuid, event_id: &str) -> Job {
    let mut properties = Properties::new();
    properties.insert("Name".to_string(), PropertyValue::title(event_id));
    Job::enqueued(
        tenant_id,
        event_id,
        "dest-db",
        JobPayload::Generic { properties },
    )
}

#[tokio::test]
async fn successful_write_completes_the_job_and_writes_the_marker() {
    let tenant = test_tenant("chan-1");
    let td = TestDeps::new(vec![tenant.clone()], vec![]);
    let worker = worker_for(&td);

    td.job_store
        .enqueue(text_job(tenant.id, "m-1"))
        .await
        .unwrap();

    let summary = worker.run_batch().await.unwrap();
    assert_eq!(summary.processed, 1);
    assert_eq!(summary.succeeded, 1);

    let job = &td.job_store.all_jobs()[0];
    assert_eq!(job.status, JobStatus::Done);
    assert_eq!(job.attempts, 1);
    assert!(job.lease_expires_at.is_none());

    assert_eq!(td.writer.writes().len(), 1);
    assert_eq!(td.writer.writes()[0].destination_id, "dest-db");
    assert!(td
        .dedup
        .marked_keys()
        .contains(&format!("{}:m-1", tenant.id)));
    assert_eq!(td.metrics.counter("jobs.succeeded"), 1);
    assert_eq!(td.metrics.latency_samples("downstream.write"), 1);
}

#[tokio::test]
async fn rate_limited_write_is_requeued_then_succeeds() {
    let tenant = test_tenant("chan-1");
    let td = TestDeps::new(vec![tenant.clone()], vec![]);
    let worker = worker_for(&td);

    td.job_store
        .enqueue(text_job(tenant.id, "m-1"))
        .await
        .unwrap();
    td.writer.fail_next_with(429);

    worker.run_batch().await.unwrap();

    let job = td.job_store.all_jobs()[0].clone();
    assert_eq!(job.status, JobStatus::Queued);
    assert_eq!(job.attempts, 1);
    assert!(job.not_before.is_some());
    assert!(job.last_error.is_some());
    assert_eq!(td.metrics.counter("downstream.rate_limited"), 1);

    // Clear the backoff gate the way an operator retry would.
    td.job_store.requeue(job.id).await.unwrap();
    let summary = worker.run_batch().await.unwrap();
    assert_eq!(summary.succeeded, 1);

    let job = td.job_store.all_jobs()[0].clone();
    assert_eq!(job.status, JobStatus::Done);
    assert_eq!(job.attempts, 2);
    assert_eq!(td.metrics.counter("jobs.failed"), 1);
    assert_eq!(td.metrics.counter("jobs.succeeded"), 1);
    assert_eq!(td.metrics.latency_samples("downstream.write"), 1);
    assert!(td
        .dedup
        .marked_keys()
        .contains(&format!("{}:m-1", tenant.id)));
}

#[tokio::test]
async fn persistent_server_errors_exhaust_the_budget_and_dead_letter() {
    let tenant = test_tenant("chan-1");
    let td = TestDeps::new(vec![tenant.clone()], vec![]);
    let worker = worker_for(&td);

    td.job_store
        .enqueue(text_job(tenant.id, "m-1"))
        .await
        .unwrap();
    let job_id = td.job_store.all_jobs()[0].id;

    for _ in 0..MAX_ATTEMPTS {
        td.writer.fail_next_with(500);
        worker.run_batch().await.unwrap();
        let job = td.job_store.find(job_id).await.unwrap().unwrap();
        if job.status == JobStatus::Queued {
            td.job_store.requeue(job_id).await.unwrap();
        }
    }

    let job = td.job_store.find(job_id).await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Dead);
    assert_eq!(job.attempts, MAX_ATTEMPTS);
    assert!(job.not_before.is_none());

    assert_eq!(td.metrics.counter("jobs.failed"), MAX_ATTEMPTS as u64);
    assert_eq!(td.metrics.counter("jobs.dead_lettered"), 1);
    assert_eq!(
        td.metrics.counter("downstream.server_error"),
        MAX_ATTEMPTS as u64
    );
    assert!(td.writer.writes().is_empty());
    assert!(td.dedup.marked_keys().is_empty());

    let last = td.metrics.audit_entries().pop().unwrap();
    assert_eq!(last.action, "dead_lettered");

    // Exhausted means exhausted: nothing left to claim.
    let summary = worker.run_batch().await.unwrap();
    assert_eq!(summary.processed, 0);
}

#[tokio::test]
async fn backoff_gate_keeps_a_failed_job_out_of_the_next_batch() {
    let tenant = test_tenant("chan-1");
    let td = TestDeps::new(vec![tenant.clone()], vec![]);
    let worker = worker_for(&td);

    td.job_store
        .enqueue(text_job(tenant.id, "m-1"))
        .await
        .unwrap();
    td.writer.fail_next_with(503);

    worker.run_batch().await.unwrap();
    let summary = worker.run_batch().await.unwrap();

    assert_eq!(summary.processed, 0);
    assert_eq!(td.job_store.all_jobs()[0].status, JobStatus::Queued);
}

#[tokio::test]
async fn claim_is_exclusive_per_generation() {
    let tenant = test_tenant("chan-1");
    let td = TestDeps::new(vec![tenant.clone()], vec![]);

    td.job_store
        .enqueue(text_job(tenant.id, "m-1"))
        .await
        .unwrap();
    let job_id = td.job_store.all_jobs()[0].id;

    let first = td.job_store.claim(job_id).await.unwrap();
    let second = td.job_store.claim(job_id).await.unwrap();

    let claimed = first.expect("first claim wins");
    assert_eq!(claimed.status, JobStatus::Processing);
    assert_eq!(claimed.generation, 1);
    assert!(claimed.lease_expires_at.is_some());
    assert!(second.is_none());
}

#[tokio::test]
async fn expired_lease_is_reclaimed_while_attempts_remain() {
    let tenant = test_tenant("chan-1");
    let td = TestDeps::new(vec![tenant.clone()], vec![]);
    let worker = worker_for(&td);

    td.job_store
        .enqueue(text_job(tenant.id, "m-1"))
        .await
        .unwrap();
    let job_id = td.job_store.all_jobs()[0].id;

    // A worker claims the job and crashes without completing it.
    td.job_store.claim(job_id).await.unwrap().unwrap();
    td.job_store.expire_lease(job_id);

    let summary = worker.run_batch().await.unwrap();
    assert_eq!(summary.succeeded, 1);

    let job = td.job_store.find(job_id).await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Done);
    assert_eq!(job.attempts, 2);
}

#[tokio::test]
async fn crash_on_final_attempt_dead_letters_instead_of_retrying() {
    let tenant = test_tenant("chan-1");
    let td = TestDeps::new(vec![tenant.clone()], vec![]);
    let worker = worker_for(&td);

    td.job_store
        .enqueue(text_job(tenant.id, "m-1"))
        .await
        .unwrap();
    let job_id = td.job_store.all_jobs()[0].id;

    // Crash out of every attempt: claim, then let the lease lapse.
    for _ in 0..MAX_ATTEMPTS {
        td.job_store.claim(job_id).await.unwrap().unwrap();
        td.job_store.expire_lease(job_id);
    }

    // The budget is spent; the claim must be refused and the job reaped.
    assert!(td.job_store.claim(job_id).await.unwrap().is_none());
    assert!(td.job_store.fetch_queued(5).await.unwrap().is_empty());

    let summary = worker.run_batch().await.unwrap();
    assert_eq!(summary.processed, 0);

    let job = td.job_store.find(job_id).await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Dead);
    assert_eq!(job.attempts, MAX_ATTEMPTS);
    assert!(job.last_error.is_some());
    assert_eq!(td.metrics.counter("jobs.dead_lettered"), 1);
    assert!(td.writer.writes().is_empty());
}

#[tokio::test]
async fn concurrent_batches_write_each_job_exactly_once() {
    let tenant = test_tenant("chan-1");
    let td = TestDeps::new(vec![tenant.clone()], vec![]);
    let worker = worker_for(&td);

    for n in 0..3 {
        td.job_store
            .enqueue(text_job(tenant.id, &format!("m-{n}")))
            .await
            .unwrap();
    }

    let (a, b) = tokio::join!(worker.run_batch(), worker.run_batch());
    let total = a.unwrap().processed + b.unwrap().processed;

    assert_eq!(total, 3);
    assert_eq!(td.writer.writes().len(), 3);
    assert!(td
        .job_store
        .all_jobs()
        .iter()
        .all(|j| j.status == JobStatus::Done && j.attempts == 1));
}

#[tokio::test]
async fn batch_size_bounds_each_invocation() {
    let tenant = test_tenant("chan-1");
    let td = TestDeps::new(vec![tenant.clone()], vec![]);
    let worker = worker_for(&td);

    for n in 0..7 {
        td.job_store
            .enqueue(text_job(tenant.id, &format!("m-{n}")))
            .await
            .unwrap();
    }

    let first = worker.run_batch().await.unwrap();
    let second = worker.run_batch().await.unwrap();

    assert_eq!(first.processed, 5);
    assert_eq!(second.processed, 2);
}

#[tokio::test]
async fn image_job_fetches_the_content_url_before_writing() {
    let tenant = test_tenant("chan-1");
    let td = TestDeps::new(vec![tenant.clone()], vec![]);
    let worker = worker_for(&td);

    td.job_store
        .enqueue(Job::enqueued(
            tenant.id,
            "m-img",
            "default-db",
            JobPayload::ImageRef {
                provider_message_id: "m-img".to_string(),
            },
        ))
        .await
        .unwrap();

    worker.run_batch().await.unwrap();

    let writes = td.writer.writes();
    assert_eq!(writes.len(), 1);
    match writes[0].properties.get("Attachment").unwrap() {
        PropertyValue::Files { files } => {
            assert_eq!(files[0].external.url, "https://content.invalid/m-img");
        }
        other => panic!("expected files property, got {other:?}"),
    }
}

#[tokio::test]
async fn location_job_writes_name_address_and_map() {
    let tenant = test_tenant("chan-1");
    let td = TestDeps::new(vec![tenant.clone()], vec![]);
    let worker = worker_for(&td);

    td.job_store
        .enqueue(Job::enqueued(
            tenant.id,
            "m-loc",
            "default-db",
            JobPayload::Location {
                title: Some("Office".to_string()),
                address: Some("1 Main St".to_string()),
                latitude: 35.0,
                longitude: 139.0,
            },
        ))
        .await
        .unwrap();

    worker.run_batch().await.unwrap();

    let writes = td.writer.writes();
    assert_eq!(writes.len(), 1);
    let properties = &writes[0].properties;
    assert_eq!(properties.get("Name").unwrap().plain_text(), Some("Office"));
    assert!(properties.contains_key("Address"));
    assert!(properties.contains_key("Map"));
}

#[tokio::test]
async fn one_failing_job_does_not_stop_the_rest_of_the_batch() {
    let tenant = test_tenant("chan-1");
    let td = TestDeps::new(vec![tenant.clone()], vec![]);
    let worker = worker_for(&td);

    for n in 0..3 {
        td.job_store
            .enqueue(text_job(tenant.id, &format!("m-{n}")))
            .await
            .unwrap();
    }
    td.writer.fail_next_with(500);

    let summary = worker.run_batch().await.unwrap();

    assert_eq!(summary.processed, 3);
    assert_eq!(summary.succeeded, 2);
    assert_eq!(summary.failed, 1);
    assert_eq!(td.writer.writes().len(), 2);
}
