//! HTTP-level tests for the router: status codes and wiring, with the
//! pipeline behind in-memory collaborators.

mod common;

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use common::{sign, text_message_body};
use server_core::kernel::jobs::{JobStatus, Worker};
use server_core::kernel::testing::{test_tenant, TestDeps};
use server_core::server::{build_app, AppState};
use tower::ServiceExt;

const SECRET: &str = "test-channel-secret";

fn app_for(td: &TestDeps) -> axum::Router {
    let worker = Arc::new(Worker::new(
        td.job_store.clone(),
        td.dedup.clone(),
        td.writer.clone(),
        td.messaging.clone(),
        td.metrics.clone(),
    ));
    build_app(AppState::new(td.deps.clone(), worker, None))
}

fn webhook_request(body: Vec<u8>, signature: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri("/webhooks/line")
        .header("content-type", "application/json");
    if let Some(signature) = signature {
        builder = builder.header("x-line-signature", signature);
    }
    builder.body(Body::from(body)).unwrap()
}

#[tokio::test]
async fn signed_webhook_returns_200_and_enqueues() {
    let tenant = test_tenant("chan-1");
    let td = TestDeps::new(vec![tenant.clone()], vec![]);
    let app = app_for(&td);

    let body = text_message_body(&tenant, "m-1", "hello");
    let header = sign(&body, SECRET);
    let response = app
        .oneshot(webhook_request(body, Some(&header)))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(td.job_store.all_jobs().len(), 1);
}

#[tokio::test]
async fn missing_signature_returns_401() {
    let tenant = test_tenant("chan-1");
    let td = TestDeps::new(vec![tenant.clone()], vec![]);
    let app = app_for(&td);

    let body = text_message_body(&tenant, "m-1", "hello");
    let response = app.oneshot(webhook_request(body, None)).await.unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn bad_signature_returns_401() {
    let tenant = test_tenant("chan-1");
    let td = TestDeps::new(vec![tenant.clone()], vec![]);
    let app = app_for(&td);

    let body = text_message_body(&tenant, "m-1", "hello");
    let response = app
        .oneshot(webhook_request(body, Some("bm90IGEgcmVhbCBzaWduYXR1cmU=")))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn wrong_method_on_webhook_returns_405() {
    let td = TestDeps::new(vec![test_tenant("chan-1")], vec![]);
    let app = app_for(&td);

    let response = app
        .oneshot(
            Request::builder()
                .method("GET")
                .uri("/webhooks/line")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
}

#[tokio::test]
async fn worker_run_drains_the_queue() {
    let tenant = test_tenant("chan-1");
    let td = TestDeps::new(vec![tenant.clone()], vec![]);

    // Enqueue through the webhook route, then drain through the worker route.
    let body = text_message_body(&tenant, "m-1", "hello");
    let header = sign(&body, SECRET);
    app_for(&td)
        .oneshot(webhook_request(body, Some(&header)))
        .await
        .unwrap();

    let response = app_for(&td)
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/worker/run")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(td.job_store.all_jobs()[0].status, JobStatus::Done);
    assert_eq!(td.writer.writes().len(), 1);
}

#[tokio::test]
async fn health_reports_queue_depth_without_a_database() {
    let tenant = test_tenant("chan-1");
    let td = TestDeps::new(vec![tenant.clone()], vec![]);
    let app = app_for(&td);

    let response = app
        .oneshot(
            Request::builder()
                .method("GET")
                .uri("/health")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
}
