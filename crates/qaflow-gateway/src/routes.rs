use crate::error::ApiError;
use crate::server::AppState;
use axum::extract::{Multipart, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use qaflow_orchestrator::{LogEntry, RunSnapshot, VideoUpload};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

#[derive(Debug, Deserialize)]
pub struct StartRunRequest {
    pub goal: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StartRunResponse {
    pub run_id: Uuid,
}

#[derive(Debug, Serialize)]
pub struct CancelResponse {
    pub cancelled: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskPromptResponse {
    pub task_prompt: String,
}

#[derive(Debug, Deserialize)]
pub struct SuperviseRequest {
    pub goal: String,
    /// Recorded episode text. Defaults to the current run's log.
    #[serde(default)]
    pub log: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SuperviseResponse {
    pub suggested_improvements: String,
}

pub async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "service": "qaflow",
        "connections": state.connections.connection_count().await,
        "running": state.orchestrator.is_running(),
    }))
}

/// `POST /api/runs`: start a run in the background.
pub async fn start_run(
    State(state): State<Arc<AppState>>,
    Json(req): Json<StartRunRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let handle = state.orchestrator.try_start(&req.goal).await.map_err(|e| {
        // An accepted goal can only be rejected because a run is active.
        if !req.goal.trim().is_empty() && e.is_user_input() {
            ApiError::from(e).with_status(StatusCode::CONFLICT)
        } else {
            ApiError::from(e)
        }
    })?;
    info!(run_id = %handle.run_id, "Run accepted");
    Ok((
        StatusCode::ACCEPTED,
        Json(StartRunResponse {
            run_id: handle.run_id,
        }),
    ))
}

pub async fn current_run(State(state): State<Arc<AppState>>) -> Json<RunSnapshot> {
    Json(state.orchestrator.snapshot().await)
}

pub async fn cancel_run(State(state): State<Arc<AppState>>) -> Json<CancelResponse> {
    Json(CancelResponse {
        cancelled: state.orchestrator.cancel().await,
    })
}

/// `POST /api/task-prompts`: multipart form with `video` and `description`.
pub async fn task_prompt(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> Result<Json<TaskPromptResponse>, ApiError> {
    let mut video = None;
    let mut description = String::new();

    while let Some(field) = multipart.next_field().await? {
        match field.name() {
            Some("video") => {
                let file_name = field.file_name().map(str::to_string);
                let declared = field.content_type().map(str::to_string);
                let bytes = field.bytes().await?;
                let mime_type = declared
                    .filter(|m| m != "application/octet-stream")
                    .or_else(|| {
                        file_name
                            .as_deref()
                            .and_then(|name| mime_guess::from_path(name).first_raw())
                            .map(str::to_string)
                    })
                    .unwrap_or_else(|| "application/octet-stream".to_string());
                video = Some(VideoUpload {
                    file_name,
                    mime_type,
                    bytes: bytes.to_vec(),
                });
            }
            Some("description") => description = field.text().await?,
            _ => {}
        }
    }

    let task_prompt = state
        .prompt_generator
        .generate(video.as_ref(), &description)
        .await?;
    Ok(Json(TaskPromptResponse { task_prompt }))
}

/// `POST /api/supervise`: review a recorded episode.
pub async fn supervise(
    State(state): State<Arc<AppState>>,
    Json(req): Json<SuperviseRequest>,
) -> Result<Json<SuperviseResponse>, ApiError> {
    if req.goal.trim().is_empty() {
        return Err(ApiError::bad_request("A test goal is required."));
    }
    let log = match req.log {
        Some(log) => log,
        None => {
            let snapshot = state.orchestrator.snapshot().await;
            snapshot
                .log
                .iter()
                .map(LogEntry::to_line)
                .collect::<Vec<_>>()
                .join("\n")
        }
    };
    if log.trim().is_empty() {
        return Err(ApiError::bad_request("There is no recorded episode to review."));
    }

    let suggested_improvements = state
        .orchestrator
        .agents()
        .supervise(req.goal.trim(), &log)
        .await?;
    Ok(Json(SuperviseResponse {
        suggested_improvements,
    }))
}
