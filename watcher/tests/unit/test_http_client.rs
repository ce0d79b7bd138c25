//! HTTP client tests against a local stub backend

use std::time::Duration;

use axum::extract::Path;
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use secrecy::SecretString;
use serde_json::json;

use openapi_client::models::TriggerPipelineRequest;
use pipewatch::errors::ObserverError;
use pipewatch::http::{HttpClient, PipelineApi};
use pipewatch::models::pipeline::LogOwner;
use pipewatch::models::status::Status;

const TOKEN: &str = "pw-test-token";

fn authorized(headers: &HeaderMap) -> bool {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value == format!("Bearer {TOKEN}"))
}

fn unauthorized() -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(json!({"error": "unauthorized", "message": "missing bearer token"})),
    )
        .into_response()
}

fn pipeline_json(id: i64, branch: &str, status: &str) -> serde_json::Value {
    json!({
        "id": id,
        "project_id": 1,
        "status": status,
        "commit_hash": "9f86d081884c7d659a2feaa0c55ad015",
        "branch": branch,
        "created_at": "2026-03-01T12:00:00Z",
        "finished_at": null
    })
}

async fn get_pipeline(Path((_project, id)): Path<(i64, i64)>, headers: HeaderMap) -> Response {
    if !authorized(&headers) {
        return unauthorized();
    }
    match id {
        1 | 5 => Json(pipeline_json(id, "main", "running")).into_response(),
        2 => (StatusCode::OK, "{\"id\": \"not a number\"").into_response(),
        3 => Json(json!({
            "id": 3,
            "project_id": 1,
            "status": "success",
            "branch": "main",
            "created_at": "yesterday"
        }))
        .into_response(),
        500 => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({"error": "internal", "message": "database unavailable"})),
        )
            .into_response(),
        _ => StatusCode::NOT_FOUND.into_response(),
    }
}

async fn trigger_pipeline(
    Path(_project): Path<i64>,
    headers: HeaderMap,
    Json(request): Json<TriggerPipelineRequest>,
) -> Response {
    if !authorized(&headers) {
        return unauthorized();
    }
    (
        StatusCode::CREATED,
        Json(pipeline_json(77, &request.branch, "pending")),
    )
        .into_response()
}

async fn get_jobs(Path((_project, id)): Path<(i64, i64)>) -> Response {
    Json(json!([
        {
            "id": 10, "pipeline_id": id, "name": "compile", "stage": "build",
            "image": "rust:1.84", "status": "success", "exit_code": 0,
            "started_at": "2026-03-01T12:00:05Z", "finished_at": "2026-03-01T12:01:00Z"
        },
        {
            "id": 11, "pipeline_id": id, "name": "unit", "stage": "test",
            "image": "rust:1.84", "status": "running"
        },
        {
            "id": 12, "pipeline_id": id, "name": "approval", "stage": "gate",
            "image": "alpine:3", "status": "awaiting_approval"
        }
    ]))
    .into_response()
}

async fn get_job_logs(Path((_project, _id, job)): Path<(i64, i64, i64)>) -> Response {
    Json(json!([
        {"id": 3, "job_id": job, "content": "running 2 tests", "created_at": "2026-03-01T12:01:01Z"},
        {"id": 4, "job_id": job, "content": "test result: ok", "created_at": "2026-03-01T12:01:02Z"}
    ]))
    .into_response()
}

async fn get_deployment(Path((_project, id)): Path<(i64, i64)>) -> Response {
    match id {
        5 => Json(json!({
            "id": 9, "pipeline_id": 5, "status": "deploying",
            "started_at": "2026-03-01T12:05:00Z"
        }))
        .into_response(),
        500 => StatusCode::BAD_GATEWAY.into_response(),
        _ => (
            StatusCode::NOT_FOUND,
            Json(json!({"error": "not_found", "message": "no deployment"})),
        )
            .into_response(),
    }
}

async fn get_deployment_logs(Path((_project, id)): Path<(i64, i64)>) -> Response {
    Json(json!([
        {"id": 1, "pipeline_id": id, "content": "pulling image", "created_at": "2026-03-01T12:05:01Z"}
    ]))
    .into_response()
}

/// Start the stub backend and return its API base URL
async fn spawn_backend() -> String {
    let app = Router::new()
        .route("/api/v1/projects/{project}/pipelines", post(trigger_pipeline))
        .route("/api/v1/projects/{project}/pipelines/{id}", get(get_pipeline))
        .route("/api/v1/projects/{project}/pipelines/{id}/jobs", get(get_jobs))
        .route(
            "/api/v1/projects/{project}/pipelines/{id}/jobs/{job}/logs",
            get(get_job_logs),
        )
        .route(
            "/api/v1/projects/{project}/pipelines/{id}/deployment",
            get(get_deployment),
        )
        .route(
            "/api/v1/projects/{project}/pipelines/{id}/deployment/logs",
            get(get_deployment_logs),
        );

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}/api/v1", addr)
}

fn client(base_url: &str) -> HttpClient {
    HttpClient::new(
        base_url,
        Some(SecretString::from(TOKEN.to_string())),
        Duration::from_secs(5),
    )
    .unwrap()
}

#[tokio::test]
async fn test_get_pipeline_decodes_domain_model() {
    let base_url = spawn_backend().await;
    let pipeline = client(&base_url).get_pipeline(1, 1).await.unwrap();

    assert_eq!(pipeline.id, 1);
    assert_eq!(pipeline.status, Status::Running);
    assert_eq!(pipeline.short_commit(), Some("9f86d081"));
    assert!(pipeline.finished_at.is_none());
}

#[tokio::test]
async fn test_missing_token_is_transient() {
    let base_url = spawn_backend().await;
    let anonymous = HttpClient::new(&base_url, None, Duration::from_secs(5)).unwrap();

    let err = anonymous.get_pipeline(1, 1).await.unwrap_err();
    assert!(matches!(&err, ObserverError::Transient(msg) if msg.contains("missing bearer token")));
    assert!(err.is_retryable());
}

#[tokio::test]
async fn test_not_found_pipeline() {
    let base_url = spawn_backend().await;
    let err = client(&base_url).get_pipeline(1, 404).await.unwrap_err();
    assert!(err.is_not_found());
    assert!(!err.is_retryable());
}

#[tokio::test]
async fn test_server_error_is_transient() {
    let base_url = spawn_backend().await;
    let err = client(&base_url).get_pipeline(1, 500).await.unwrap_err();
    assert!(matches!(&err, ObserverError::Transient(msg) if msg.contains("database unavailable")));
}

#[tokio::test]
async fn test_malformed_payloads() {
    let base_url = spawn_backend().await;
    let client = client(&base_url);

    let err = client.get_pipeline(1, 2).await.unwrap_err();
    assert!(matches!(err, ObserverError::Malformed(_)));

    let err = client.get_pipeline(1, 3).await.unwrap_err();
    assert!(matches!(err, ObserverError::Malformed(msg) if msg.contains("created_at")));
}

#[tokio::test]
async fn test_jobs_keep_backend_order_and_unknown_status() {
    let base_url = spawn_backend().await;
    let jobs = client(&base_url).get_jobs(1, 1).await.unwrap();

    let ids: Vec<i64> = jobs.iter().map(|job| job.id).collect();
    assert_eq!(ids, vec![10, 11, 12]);
    assert_eq!(jobs[0].exit_code, Some(0));
    assert!(jobs[0].finished_at.is_some());
    assert_eq!(jobs[2].status, Status::Unknown("awaiting_approval".to_string()));
}

#[tokio::test]
async fn test_logs_through_trait() {
    let base_url = spawn_backend().await;
    let api: Box<dyn PipelineApi> = Box::new(client(&base_url));

    let lines = api.get_job_logs(1, 1, 11).await.unwrap();
    assert_eq!(lines.len(), 2);
    assert_eq!(lines[0].owner, LogOwner::Job(11));
    assert_eq!(lines[1].position, 1);
    assert_eq!(lines[1].content, "test result: ok");

    let lines = api.get_deployment_logs(1, 5).await.unwrap();
    assert_eq!(lines[0].owner, LogOwner::Deployment(5));
}

#[tokio::test]
async fn test_deployment_not_found_is_none() {
    let base_url = spawn_backend().await;
    let client = client(&base_url);

    assert!(client.get_deployment(1, 1).await.unwrap().is_none());

    let deployment = client.get_deployment(1, 5).await.unwrap().unwrap();
    assert_eq!(deployment.id, 9);
    assert_eq!(deployment.status, Status::Deploying);

    let err = client.get_deployment(1, 500).await.unwrap_err();
    assert!(matches!(err, ObserverError::Transient(_)));
}

#[tokio::test]
async fn test_trigger_pipeline_posts_branch() {
    let base_url = spawn_backend().await;
    let pipeline = client(&base_url)
        .trigger_pipeline(1, "feature/polling")
        .await
        .unwrap();

    assert_eq!(pipeline.id, 77);
    assert_eq!(pipeline.branch, "feature/polling");
    assert_eq!(pipeline.status, Status::Pending);
}

#[test]
fn test_invalid_base_url_rejected() {
    let result = HttpClient::new("not a url", None, Duration::from_secs(5));
    assert!(matches!(result, Err(ObserverError::ConfigError(_))));
}
