// tests/http_api.rs

use std::error::Error;
use std::time::Duration;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use serde_json::{Value, json};
use tower::ServiceExt;

use runctl_test_utils::builders::{ConfigFileBuilder, orchestrator};
use runctl_test_utils::fake_launcher::FakeLauncher;
use runctl_test_utils::{init_tracing, with_timeout};

use runctl::server::build_router;
use runctl::types::Phase;

type TestResult = Result<(), Box<dyn Error>>;

const RUNS: &str = "/api/projects/p1/environments/03-ACCEPT/runs";

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Vec<u8>) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let body = response.into_body().collect().await.unwrap().to_bytes();
    (status, body.to_vec())
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

async fn wait_for_status(app: &Router, run_id: &str, wanted: &str) {
    with_timeout(async {
        loop {
            let (_, body) = send(app, get(&format!("{RUNS}/{run_id}"))).await;
            let status: Value = serde_json::from_slice(&body).unwrap();
            if status["status"] == wanted {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await;
}

#[tokio::test]
async fn submit_then_poll_then_read_logs() -> TestResult {
    init_tracing();
    let root = tempfile::tempdir()?;
    let launcher = FakeLauncher::new();
    let app = build_router(orchestrator(
        ConfigFileBuilder::new(root.path()).build(),
        launcher.clone(),
    ));

    let (status, body) = send(
        &app,
        post_json(RUNS, json!({"job": "j1", "dry_run": false, "limit": 10, "secret": "pw"})),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let created: Value = serde_json::from_slice(&body)?;
    let run_id = created["run_id"].as_str().unwrap().to_string();

    wait_for_status(&app, &run_id, "completed").await;
    assert_eq!(launcher.launched_phases(), vec![Phase::Dry, Phase::Wet]);

    let (status, body) = send(&app, get(&format!("{RUNS}/{run_id}/files"))).await;
    assert_eq!(status, StatusCode::OK);
    let files: Vec<String> = serde_json::from_slice(&body)?;
    assert_eq!(files, vec!["dry-output.log", "options.json", "wet-output.log"]);

    let (status, body) = send(&app, get(&format!("{RUNS}/{run_id}/files/wet-output.log"))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(String::from_utf8(body)?, "fake wet output\n");
    Ok(())
}

#[tokio::test]
async fn dry_run_is_the_default() -> TestResult {
    init_tracing();
    let root = tempfile::tempdir()?;
    let launcher = FakeLauncher::new();
    let app = build_router(orchestrator(
        ConfigFileBuilder::new(root.path()).build(),
        launcher.clone(),
    ));

    let (status, body) = send(&app, post_json(RUNS, json!({"job": "j1"}))).await;
    assert_eq!(status, StatusCode::CREATED);
    let run_id = serde_json::from_slice::<Value>(&body)?["run_id"]
        .as_str()
        .unwrap()
        .to_string();

    wait_for_status(&app, &run_id, "completed").await;
    assert_eq!(launcher.launched_phases(), vec![Phase::Dry]);
    Ok(())
}

#[tokio::test]
async fn error_statuses_follow_the_error_kind() -> TestResult {
    init_tracing();
    let root = tempfile::tempdir()?;
    let app = build_router(orchestrator(
        ConfigFileBuilder::new(root.path()).build(),
        FakeLauncher::new(),
    ));

    // Resume of a run that never existed.
    let (status, body) = send(
        &app,
        post_json(RUNS, json!({"job": "j1", "dry_run": false, "run_id": "nope"})),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let error: Value = serde_json::from_slice(&body)?;
    assert!(error["error"].as_str().unwrap().contains("nope"));

    let (status, _) = send(&app, post_json(RUNS, json!({"job": "j1", "threads": 0}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(
        &app,
        post_json(
            "/api/projects/p1/environments/..%2F..%2Ftmp/runs",
            json!({"job": "j1"}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = send(&app, get(&format!("{RUNS}/R1/files/..%2F..%2Fetc%2Fpasswd"))).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    // Nothing above may have left a trace on disk.
    assert_eq!(std::fs::read_dir(root.path())?.count(), 0);
    Ok(())
}

#[tokio::test]
async fn delete_then_status_is_unknown() -> TestResult {
    init_tracing();
    let root = tempfile::tempdir()?;
    let app = build_router(orchestrator(
        ConfigFileBuilder::new(root.path()).build(),
        FakeLauncher::new(),
    ));

    let (_, body) = send(&app, post_json(RUNS, json!({"job": "j1"}))).await;
    let run_id = serde_json::from_slice::<Value>(&body)?["run_id"]
        .as_str()
        .unwrap()
        .to_string();
    wait_for_status(&app, &run_id, "completed").await;

    let (status, _) = send(
        &app,
        Request::builder()
            .method("DELETE")
            .uri(format!("{RUNS}/{run_id}"))
            .body(Body::empty())?,
    )
    .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    wait_for_status(&app, &run_id, "unknown").await;
    assert!(!root.path().join("p1").join("03-ACCEPT").exists());
    Ok(())
}
