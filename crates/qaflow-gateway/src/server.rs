use crate::connection::{Connection, ConnectionManager};
use crate::error::ApiError;
use crate::routes;
use axum::{
    extract::{
        ws::{Message, WebSocket},
        DefaultBodyLimit, State, WebSocketUpgrade,
    },
    response::IntoResponse,
    routing::{get, post},
    Router,
};
use futures_util::{SinkExt, StreamExt};
use qaflow_orchestrator::{Orchestrator, RunEvent, TaskPromptGenerator};
use serde::Deserialize;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, warn};

/// Headroom above the video limit for the description and multipart framing.
const MULTIPART_OVERHEAD: usize = 64 * 1024;

/// Shared application state.
pub struct AppState {
    pub orchestrator: Arc<Orchestrator>,
    pub prompt_generator: Arc<TaskPromptGenerator>,
    pub connections: Arc<ConnectionManager>,
}

/// The dashboard gateway.
pub struct GatewayServer;

impl GatewayServer {
    pub fn build(
        orchestrator: Arc<Orchestrator>,
        prompt_generator: Arc<TaskPromptGenerator>,
    ) -> Router {
        let upload_limit = prompt_generator.max_bytes() + MULTIPART_OVERHEAD;
        let state = Arc::new(AppState {
            orchestrator,
            prompt_generator,
            connections: ConnectionManager::new(),
        });

        Router::new()
            .route("/ws", get(ws_handler))
            .route("/health", get(routes::health))
            .route("/api/runs", post(routes::start_run))
            .route("/api/runs/current", get(routes::current_run))
            .route("/api/runs/cancel", post(routes::cancel_run))
            .route(
                "/api/task-prompts",
                post(routes::task_prompt).layer(DefaultBodyLimit::max(upload_limit)),
            )
            .route("/api/supervise", post(routes::supervise))
            .with_state(state)
    }
}

/// Commands a dashboard may send over the socket.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ClientMessage {
    Start { goal: String },
    Cancel,
}

async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn snapshot_message(state: &AppState) -> String {
    let snapshot = state.orchestrator.snapshot().await;
    serde_json::json!({ "type": "snapshot", "snapshot": snapshot }).to_string()
}

fn error_message(message: &str) -> String {
    serde_json::json!({ "type": "error", "message": message }).to_string()
}

async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let conn = Connection::new();
    let connection_id = conn.id;
    state.connections.add(conn).await;
    info!(connection_id = %connection_id, "WebSocket connected");

    let (mut ws_sender, mut ws_receiver) = socket.split();
    // Subscribe before the snapshot so no event falls between the two.
    let mut events = state.orchestrator.subscribe();
    let (tx, mut rx) = mpsc::unbounded_channel::<String>();
    let _ = tx.send(snapshot_message(&state).await);

    // Task: forward direct replies and run events to the WebSocket
    let send_state = state.clone();
    let send_task = tokio::spawn(async move {
        loop {
            let text = tokio::select! {
                reply = rx.recv() => match reply {
                    Some(text) => text,
                    None => break,
                },
                event = events.recv() => match event {
                    Ok(event) => match serde_json::to_string(&event) {
                        Ok(text) => text,
                        Err(e) => {
                            warn!(error = %e, "Failed to serialize run event");
                            continue;
                        }
                    },
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(connection_id = %connection_id, skipped, "Dashboard lagged, resending snapshot");
                        snapshot_message(&send_state).await
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                },
            };
            if ws_sender.send(Message::Text(text.into())).await.is_err() {
                break;
            }
        }
    });

    // Task: receive dashboard commands
    let recv_state = state.clone();
    let recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = ws_receiver.next().await {
            match msg {
                Message::Text(text) => {
                    let reply = handle_command(&recv_state, &text).await;
                    if let Some(reply) = reply {
                        if tx.send(reply).is_err() {
                            break;
                        }
                    }
                }
                Message::Close(_) => break,
                _ => {}
            }
        }
    });

    tokio::select! {
        _ = send_task => {},
        _ = recv_task => {},
    }

    state.connections.remove(connection_id).await;
    info!(connection_id = %connection_id, "WebSocket disconnected");
}

/// Apply one dashboard command. Returns a message to send back, if any.
async fn handle_command(state: &AppState, text: &str) -> Option<String> {
    let command: ClientMessage = match serde_json::from_str(text) {
        Ok(command) => command,
        Err(e) => return Some(error_message(&format!("Unrecognized message: {e}"))),
    };
    debug!(?command, "Dashboard command");
    match command {
        ClientMessage::Start { goal } => match state.orchestrator.try_start(&goal).await {
            Ok(handle) => {
                info!(run_id = %handle.run_id, "Run started from dashboard");
                None
            }
            Err(e) => Some(error_message(&ApiError::from(e).message)),
        },
        ClientMessage::Cancel => {
            if state.orchestrator.cancel().await {
                None
            } else {
                Some(error_message("No test run is in progress."))
            }
        }
    }
}
