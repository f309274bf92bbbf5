//! HTTP API.
//!
//! A thin JSON layer over [`Orchestrator::handle_query`].
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/health` | Health check (returns version) |
//! | `POST` | `/ask` | Run a query and return its envelope |
//! | `POST` | `/tasks` | Run a query in the background, returns `{ "task_id": ... }` |
//! | `GET`  | `/tasks` | List task records, newest first |
//! | `GET`  | `/tasks/{id}` | One task record |
//!
//! `POST /ask` and `POST /tasks` take
//! `{ "query": "...", "history": [...], "options": {...}, "logInput": "..." }`;
//! only `query` is required.
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "query must not be empty" } }
//! ```
//!
//! Error codes: `bad_request` (400), `not_found` (404).
//!
//! A query that fails inside the pipeline is still a `200` carrying an
//! envelope with `success: false`.
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    routing::post,
    Json, Router,
};
use serde::Serialize;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

use crate::config::Config;
use crate::envelope::ResponseEnvelope;
use crate::orchestrator::{Orchestrator, QueryRequest};
use crate::tasks::{InMemoryTaskStore, TaskRecord, TaskStatus};
use crate::traits::TaskStore;

/// Shared application state passed to all route handlers via Axum's `State` extractor.
#[derive(Clone)]
pub struct AppState {
    orchestrator: Arc<Orchestrator>,
    tasks: Arc<dyn TaskStore>,
}

impl AppState {
    pub fn new(orchestrator: Arc<Orchestrator>, tasks: Arc<dyn TaskStore>) -> Self {
        Self { orchestrator, tasks }
    }
}

/// Starts the HTTP server on `[server].bind` with collaborators built from
/// `config` and an in-memory task store. Runs until the process exits.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let orchestrator = Orchestrator::from_config(config)?;
    let state = AppState::new(Arc::new(orchestrator), Arc::new(InMemoryTaskStore::new()));

    let bind_addr = config.server.bind.clone();
    info!(bind = %bind_addr, "server listening");
    println!("knowledge-router listening on http://{}", bind_addr);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    axum::serve(listener, router(state)).await?;

    Ok(())
}

/// The full route table. Exposed so tests can serve it on an ephemeral port.
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handle_health))
        .route("/ask", post(handle_ask))
        .route("/tasks", post(handle_create_task).get(handle_list_tasks))
        .route("/tasks/{id}", get(handle_get_task))
        .layer(cors)
        .with_state(state)
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    /// Machine-readable error code (`"bad_request"`, `"not_found"`).
    code: String,
    message: String,
}

struct AppError {
    status: StatusCode,
    code: String,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code,
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request".to_string(),
        message: message.into(),
    }
}

fn not_found(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::NOT_FOUND,
        code: "not_found".to_string(),
        message: message.into(),
    }
}

fn validate(request: &QueryRequest) -> Result<(), AppError> {
    if request.query.trim().is_empty() {
        return Err(bad_request("query must not be empty"));
    }
    Ok(())
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============ POST /ask ============

async fn handle_ask(
    State(state): State<AppState>,
    Json(request): Json<QueryRequest>,
) -> Result<Json<ResponseEnvelope>, AppError> {
    validate(&request)?;
    Ok(Json(state.orchestrator.handle_query(&request).await))
}

// ============ /tasks ============

#[derive(Serialize)]
struct TaskCreated {
    task_id: String,
    status: TaskStatus,
}

#[derive(Serialize)]
struct TaskListResponse {
    tasks: Vec<TaskRecord>,
}

/// Handler for `POST /tasks`.
///
/// Stores a `pending` record and returns `202` at once. The query runs on a
/// spawned task that moves the record to `running` and then to
/// `completed` or `failed`.
async fn handle_create_task(
    State(state): State<AppState>,
    Json(request): Json<QueryRequest>,
) -> Result<(StatusCode, Json<TaskCreated>), AppError> {
    validate(&request)?;

    let record = TaskRecord::pending(&request.query);
    let task_id = record.id.clone();
    state.tasks.put(record.clone()).await;
    info!(task_id = %task_id, "task accepted");

    let worker = state.clone();
    tokio::spawn(async move {
        let running = record.running();
        worker.tasks.put(running.clone()).await;
        let envelope = worker.orchestrator.handle_query(&request).await;
        let finished = running.finished(envelope);
        info!(task_id = %finished.id, status = ?finished.status, "task finished");
        worker.tasks.put(finished).await;
    });

    Ok((
        StatusCode::ACCEPTED,
        Json(TaskCreated {
            task_id,
            status: TaskStatus::Pending,
        }),
    ))
}

async fn handle_list_tasks(State(state): State<AppState>) -> Json<TaskListResponse> {
    Json(TaskListResponse {
        tasks: state.tasks.list().await,
    })
}

async fn handle_get_task(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<TaskRecord>, AppError> {
    state
        .tasks
        .get(&id)
        .await
        .map(Json)
        .ok_or_else(|| not_found(format!("no task with id: {}", id)))
}
