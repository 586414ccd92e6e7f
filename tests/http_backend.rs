//! End-to-end tests of the HTTP backend and stream session against a mock
//! healing server.

use autoheal::backend::{BackendError, HealingBackend, HttpBackend};
use autoheal::board::{Stage, StepStatus};
use autoheal::launcher::{LaunchError, LaunchRequest, RunLauncher};
use autoheal::model::{Outcome, RunRequest};
use autoheal::session::{SessionContext, SessionOutcome, StreamSession, Termination};
use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

const RUN_ID: &str = "3f1c9d2e-0000-4000-8000-000000000001";
const NO_RESULT_RUN_ID: &str = "3f1c9d2e-0000-4000-8000-000000000002";

#[derive(Default)]
struct MockServer {
    streams: HashMap<String, String>,
    results: HashMap<String, Value>,
    result_requests: AtomicUsize,
}

fn sse(message: &str) -> String {
    format!("data: {}\n\n", json!({ "message": message }))
}

fn agent_stream() -> String {
    let mut body = String::new();
    body.push_str(": connected\n\n");
    for line in [
        "[CLONE] Initializing repository clone",
        "[CLONE] Cloning repository",
        "[ANALYSIS] Starting static analysis",
        "[ERROR FOUND] main.py:3 - Missing ':' in for statement",
        "[FIX] Generating fix suggestion",
        "[FIX SUGGESTED] Add ':' at the end of the for statement",
    ] {
        body.push_str(&sse(line));
    }
    body.push_str("data: not-json\n\n");
    for line in [
        "[GIT] Creating branch ACME_JANE_DOE_AI_FIX",
        "[GIT] Applying predefined fix",
        "[GIT] Committing changes",
        "[GIT] Pushing branch to origin",
        "[RESULT] Pipeline completed successfully",
        "[RESULT] Status: Passed",
    ] {
        body.push_str(&sse(line));
    }
    body
}

fn agent_result() -> Value {
    json!({
        "result": "success",
        "repo_url": "https://github.com/acme/app",
        "branch": "ACME_JANE_DOE_AI_FIX",
        "total_time": 21.37,
        "attempts": 1,
        "commits": 1,
        "files_changed": ["main.py"],
        "last_error": "Missing ':' in for statement",
        "summary": "The agent detected an issue, applied a fix, and the pipeline completed successfully."
    })
}

async fn start(Json(body): Json<Value>) -> Response {
    let present = |key: &str| body.get(key).and_then(Value::as_str).is_some_and(|v| !v.is_empty());
    if !(present("repo_url") && present("team_name") && present("leader_name")) {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": "repo_url, team_name, leader_name are required" })),
        )
            .into_response();
    }
    Json(json!({ "run_id": RUN_ID })).into_response()
}

async fn stream(State(mock): State<Arc<MockServer>>, Path(run_id): Path<String>) -> Response {
    match mock.streams.get(&run_id) {
        Some(body) => ([(header::CONTENT_TYPE, "text/event-stream")], body.clone()).into_response(),
        None => (StatusCode::NOT_FOUND, Json(json!({ "error": "Invalid run_id" }))).into_response(),
    }
}

async fn result(State(mock): State<Arc<MockServer>>, Path(run_id): Path<String>) -> Response {
    mock.result_requests.fetch_add(1, Ordering::SeqCst);
    match mock.results.get(&run_id) {
        Some(result) => Json(result.clone()).into_response(),
        None => (StatusCode::NOT_FOUND, Json(json!({ "error": "Result not ready" }))).into_response(),
    }
}

async fn spawn_mock() -> (SocketAddr, Arc<MockServer>) {
    let mut mock = MockServer::default();
    mock.streams.insert(RUN_ID.to_string(), agent_stream());
    mock.results.insert(RUN_ID.to_string(), agent_result());
    mock.streams
        .insert(NO_RESULT_RUN_ID.to_string(), sse("[CLONE] Cloning repository"));
    let mock = Arc::new(mock);

    let app = Router::new()
        .route("/api/start", post(start))
        .route("/api/stream/:run_id", get(stream))
        .route("/api/result/:run_id", get(result))
        .with_state(Arc::clone(&mock));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind listener");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(async move { axum::serve(listener, app).await.expect("serve app") });
    (addr, mock)
}

fn backend(addr: SocketAddr) -> Arc<dyn HealingBackend> {
    Arc::new(HttpBackend::with_base_url(format!("http://{addr}/")).expect("http backend"))
}

#[tokio::test]
async fn start_run_returns_ticket() {
    let (addr, _mock) = spawn_mock().await;
    let backend = backend(addr);

    let ticket = backend
        .start_run(&RunRequest {
            repo_url: "https://github.com/acme/app".to_string(),
            team_name: "Acme".to_string(),
            leader_name: "Jane Doe".to_string(),
        })
        .await
        .expect("start run");
    assert_eq!(ticket.run_id, RUN_ID);
}

#[tokio::test]
async fn start_run_rejection_is_status_error() {
    let (addr, _mock) = spawn_mock().await;
    let backend = backend(addr);

    let err = backend
        .start_run(&RunRequest {
            repo_url: "https://github.com/acme/app".to_string(),
            team_name: String::new(),
            leader_name: "Jane".to_string(),
        })
        .await
        .unwrap_err();
    match err {
        BackendError::Status { status, body } => {
            assert_eq!(status, 400);
            assert!(body.contains("required"));
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn launch_and_follow_run_to_result() {
    let (addr, mock) = spawn_mock().await;
    let backend = backend(addr);

    let run = RunLauncher::new(Arc::clone(&backend))
        .launch(LaunchRequest::new("https://github.com/acme/app", "Acme", "Jane Doe"))
        .await
        .expect("launch");
    assert_eq!(run.fix_branch(), "ACME_JANE_DOE_AI_FIX");

    let outcome = StreamSession::new(backend, SessionContext::detached(run.run_id.clone()))
        .run()
        .await;

    let SessionOutcome::Completed { result, progress } = outcome else {
        panic!("expected completed session");
    };
    assert_eq!(result.result, Outcome::Success);
    assert_eq!(result.repo, "https://github.com/acme/app");
    assert_eq!(result.files_changed, vec!["main.py".to_string()]);

    // The malformed payload is skipped, everything else is kept in order.
    assert_eq!(progress.transcript.len(), 12);
    assert_eq!(progress.transcript.get(0), Some("[CLONE] Initializing repository clone"));
    assert_eq!(progress.transcript.get(11), Some("[RESULT] Status: Passed"));
    assert!(progress.board.is_complete());
    assert_eq!(
        progress.error_context.as_deref(),
        Some("[ERROR FOUND] main.py:3 - Missing ':' in for statement")
    );
    assert_eq!(
        progress.suggested_fix.as_deref(),
        Some("[FIX SUGGESTED] Add ':' at the end of the for statement")
    );
    assert_eq!(mock.result_requests.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn missing_result_ends_in_fetch_failure() {
    let (addr, mock) = spawn_mock().await;

    let outcome = StreamSession::new(backend(addr), SessionContext::detached(NO_RESULT_RUN_ID))
        .run()
        .await;

    assert_eq!(outcome.termination(), Termination::Error);
    let SessionOutcome::FetchFailed { error, progress } = outcome else {
        panic!("expected fetch failure");
    };
    assert_eq!(error.status(), Some(404));
    assert_eq!(progress.transcript.lines(), ["[CLONE] Cloning repository"]);
    assert_eq!(progress.board.status(Stage::Clone), StepStatus::Running);
    assert_eq!(mock.result_requests.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn unknown_run_drains_without_messages() {
    let (addr, mock) = spawn_mock().await;

    let outcome = StreamSession::new(backend(addr), SessionContext::detached("no-such-run"))
        .run()
        .await;

    assert_eq!(outcome.termination(), Termination::Error);
    assert!(outcome.progress().transcript.is_empty());
    assert_eq!(mock.result_requests.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn launcher_validates_before_submitting() {
    let (addr, _mock) = spawn_mock().await;

    let err = RunLauncher::new(backend(addr))
        .launch(LaunchRequest::new("https://github.com/acme/app", "Acme", ""))
        .await
        .unwrap_err();
    assert!(matches!(err, LaunchError::MissingField("leader_name")));
}

#[tokio::test]
async fn run_id_is_sent_as_one_path_segment() {
    let (addr, mock) = spawn_mock().await;

    let err = backend(addr).fetch_result("../start").await.unwrap_err();

    // Handled by the result route, not routed anywhere else.
    assert_eq!(err.status(), Some(404));
    assert_eq!(mock.result_requests.load(Ordering::SeqCst), 1);
}
