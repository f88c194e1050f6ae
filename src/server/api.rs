// src/server/api.rs

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Path, State},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};

use crate::engine::Orchestrator;
use crate::errors::RunctlError;
use crate::types::{RunId, RunKey, RunOptions, RunRequest, Secret, StatusReport};

// ── Shared application state ──────────────────────────────────────────

pub struct AppState {
    pub orchestrator: Orchestrator,
}

pub type SharedState = Arc<AppState>;

// ── Request / response payloads ───────────────────────────────────────

fn default_dry_run() -> bool {
    true
}

#[derive(Debug, Deserialize)]
pub struct SubmitRunRequest {
    pub job: String,
    #[serde(default)]
    pub limit: Option<u64>,
    #[serde(default)]
    pub threads: Option<u32>,
    #[serde(default = "default_dry_run")]
    pub dry_run: bool,
    #[serde(default)]
    pub secret: Option<String>,
    /// Existing run to resume.
    #[serde(default)]
    pub run_id: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SubmitRunResponse {
    pub run_id: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RunStatusResponse {
    pub run_id: String,
    pub status: StatusReport,
}

// ── Error handling ────────────────────────────────────────────────────

pub enum ApiError {
    NotFound(String),
    BadRequest(String),
    Forbidden(String),
    Internal(String),
}

impl From<RunctlError> for ApiError {
    fn from(err: RunctlError) -> Self {
        match err {
            RunctlError::NotFound(_) => ApiError::NotFound(err.to_string()),
            RunctlError::AccessDenied(_) => ApiError::Forbidden(err.to_string()),
            RunctlError::InvalidRequest(_) => ApiError::BadRequest(err.to_string()),
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Forbidden(msg) => (StatusCode::FORBIDDEN, msg),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };
        (status, Json(serde_json::json!({"error": message}))).into_response()
    }
}

// ── Router ────────────────────────────────────────────────────────────

const RUN: &str = "/api/projects/{project}/environments/{environment}/runs/{run_id}";

pub fn api_router() -> Router<SharedState> {
    Router::new()
        .route(
            "/api/projects/{project}/environments/{environment}/runs",
            post(submit_run),
        )
        .route(RUN, get(get_run_status).delete(delete_run))
        .route(&format!("{RUN}/stop"), post(stop_run))
        .route(&format!("{RUN}/files"), get(list_files))
        .route(&format!("{RUN}/files/{{name}}"), get(read_file))
        .route("/health", get(health_check))
}

// ── Helpers ───────────────────────────────────────────────────────────

fn run_key(project: String, environment: String, run_id: String) -> Result<RunKey, ApiError> {
    let run_id = RunId::parse(run_id)?;
    Ok(RunKey::new(project, environment, run_id)?)
}

// ── Handlers ──────────────────────────────────────────────────────────

async fn health_check() -> &'static str {
    "ok"
}

async fn submit_run(
    State(state): State<SharedState>,
    Path((project, environment)): Path<(String, String)>,
    Json(req): Json<SubmitRunRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let resume = req.run_id.map(RunId::parse).transpose()?;
    let request = RunRequest {
        project,
        job: req.job,
        environment,
        options: RunOptions {
            limit: req.limit,
            threads: req.threads,
            dry_run: req.dry_run,
        },
        secret: req.secret.map(Secret::new),
        resume,
    };

    let run_id = state.orchestrator.submit(request).await?;
    Ok((
        StatusCode::CREATED,
        Json(SubmitRunResponse {
            run_id: run_id.to_string(),
        }),
    ))
}

async fn get_run_status(
    State(state): State<SharedState>,
    Path((project, environment, run_id)): Path<(String, String, String)>,
) -> Result<impl IntoResponse, ApiError> {
    let key = run_key(project, environment, run_id)?;
    let status = state.orchestrator.status(&key);
    Ok(Json(RunStatusResponse {
        run_id: key.run_id.to_string(),
        status,
    }))
}

async fn stop_run(
    State(state): State<SharedState>,
    Path((project, environment, run_id)): Path<(String, String, String)>,
) -> Result<impl IntoResponse, ApiError> {
    let key = run_key(project, environment, run_id)?;
    state.orchestrator.stop(&key)?;
    Ok(Json(RunStatusResponse {
        run_id: key.run_id.to_string(),
        status: state.orchestrator.status(&key),
    }))
}

async fn list_files(
    State(state): State<SharedState>,
    Path((project, environment, run_id)): Path<(String, String, String)>,
) -> Result<impl IntoResponse, ApiError> {
    let key = run_key(project, environment, run_id)?;
    Ok(Json(state.orchestrator.list_artifact_files(&key)?))
}

async fn read_file(
    State(state): State<SharedState>,
    Path((project, environment, run_id, name)): Path<(String, String, String, String)>,
) -> Result<impl IntoResponse, ApiError> {
    let key = run_key(project, environment, run_id)?;
    let text = state.orchestrator.read_artifact(&key, &name)?;
    Ok(([(header::CONTENT_TYPE, "text/plain; charset=utf-8")], text))
}

async fn delete_run(
    State(state): State<SharedState>,
    Path((project, environment, run_id)): Path<(String, String, String)>,
) -> Result<impl IntoResponse, ApiError> {
    let key = run_key(project, environment, run_id)?;
    state.orchestrator.delete_run(&key)?;
    Ok(StatusCode::NO_CONTENT)
}

// ── Tests ─────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ConfigFile, RawConfigFile};
    use crate::exec::RealProcessLauncher;
    use crate::fs::mock::MockFileSystem;
    use axum::body::Body;
    use axum::http::Request;
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    fn test_app(fs: MockFileSystem) -> Router {
        let config = ConfigFile::try_from(RawConfigFile::default()).unwrap();
        let orchestrator =
            Orchestrator::new(config, Arc::new(fs), Arc::new(RealProcessLauncher::new()));
        api_router().with_state(Arc::new(AppState { orchestrator }))
    }

    async fn body_json<T: serde::de::DeserializeOwned>(body: Body) -> T {
        let bytes = body.collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder()
            .method("GET")
            .uri(uri)
            .body(Body::empty())
            .unwrap()
    }

    #[tokio::test]
    async fn test_health_check() {
        let response = test_app(MockFileSystem::new())
            .oneshot(get("/health"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = response.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(&body[..], b"ok");
    }

    #[tokio::test]
    async fn test_unknown_run_status_is_unknown() {
        let response = test_app(MockFileSystem::new())
            .oneshot(get("/api/projects/p1/environments/DEV/runs/R1"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let status: RunStatusResponse = body_json(response.into_body()).await;
        assert_eq!(status.status, StatusReport::Unknown);
    }

    #[tokio::test]
    async fn test_run_dir_without_tracker_entry_is_completed() {
        let fs = MockFileSystem::new();
        fs.add_file("runs/p1/DEV/R1/dry-output.log", b"done\n".to_vec());

        let response = test_app(fs)
            .oneshot(get("/api/projects/p1/environments/DEV/runs/R1"))
            .await
            .unwrap();
        let status: RunStatusResponse = body_json(response.into_body()).await;
        assert_eq!(status.status, StatusReport::Completed);
    }

    #[tokio::test]
    async fn test_traversal_in_file_name_is_forbidden() {
        let fs = MockFileSystem::new();
        fs.add_file("runs/p1/DEV/R1/dry-output.log", b"done\n".to_vec());

        let response = test_app(fs)
            .oneshot(get(
                "/api/projects/p1/environments/DEV/runs/R1/files/..%2F..%2Fetc%2Fpasswd",
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_read_and_list_files() {
        let fs = MockFileSystem::new();
        fs.add_file("runs/p1/DEV/R1/dry-output.log", b"done\n".to_vec());
        let app = test_app(fs);

        let response = app
            .clone()
            .oneshot(get("/api/projects/p1/environments/DEV/runs/R1/files"))
            .await
            .unwrap();
        let names: Vec<String> = body_json(response.into_body()).await;
        assert_eq!(names, vec!["dry-output.log".to_string()]);

        let response = app
            .oneshot(get(
                "/api/projects/p1/environments/DEV/runs/R1/files/dry-output.log",
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = response.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(&body[..], b"done\n");
    }

    #[tokio::test]
    async fn test_stop_unknown_run_is_ok() {
        let response = test_app(MockFileSystem::new())
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/projects/p1/environments/DEV/runs/R1/stop")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_delete_unknown_run_is_not_found() {
        let response = test_app(MockFileSystem::new())
            .oneshot(
                Request::builder()
                    .method("DELETE")
                    .uri("/api/projects/p1/environments/DEV/runs/R1")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
