#![allow(clippy::unwrap_used, clippy::expect_used)]

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use qaflow_agent::{GenerationRequest, LlmBackend};
use qaflow_core::QaResult;
use qaflow_gateway::GatewayServer;
use qaflow_orchestrator::{Orchestrator, QaAgents, SimulatedExecutor, TaskPromptGenerator};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio_tungstenite::tungstenite::Message;

const MAX_VIDEO_BYTES: usize = 1024;

/// Answers every agent with a fixed, schema-conforming reply.
#[derive(Default)]
struct StubBackend {
    calls: AtomicU32,
}

#[async_trait]
impl LlmBackend for StubBackend {
    async fn generate(&self, request: &GenerationRequest) -> QaResult<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let reply = match request.agent.as_str() {
            "planner" => json!({ "subgoals": ["Open login page", "Submit"] }),
            "verifier" => json!({
                "stateMatchesExpectation": true,
                "functionalBugDetected": false,
                "reasoning": "State matches",
            }),
            "analysis" => json!({
                "verificationResults": [],
                "overallVerdict": "Passed",
                "suggestedImprovements": "Cover invalid passwords",
            }),
            "supervisor" => json!({ "suggestedImprovements": "Add a logout check" }),
            "taskPromptGenerator" => {
                assert!(request.media.is_some(), "video must be attached");
                json!({ "taskPrompt": "Open settings and toggle Wi-Fi" })
            }
            other => panic!("unexpected agent {other}"),
        };
        Ok(reply.to_string())
    }
}

/// Helper: build a test server on a random port, returning the address.
async fn start_test_server(step_delay: Duration) -> (String, Arc<StubBackend>) {
    let backend = Arc::new(StubBackend::default());
    let agents = Arc::new(QaAgents::new(backend.clone()));
    let orchestrator = Arc::new(Orchestrator::new(
        agents.clone(),
        Arc::new(SimulatedExecutor::new(step_delay)),
    ));
    let generator = Arc::new(TaskPromptGenerator::new(agents).with_max_bytes(MAX_VIDEO_BYTES));
    let app = GatewayServer::build(orchestrator, generator);

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let addr_str = format!("127.0.0.1:{}", addr.port());

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    // Small yield to let the server task start
    tokio::time::sleep(Duration::from_millis(50)).await;

    (addr_str, backend)
}

async fn post_json(addr: &str, path: &str, body: Value) -> reqwest::Response {
    reqwest::Client::new()
        .post(format!("http://{addr}{path}"))
        .json(&body)
        .send()
        .await
        .unwrap()
}

async fn current_run(addr: &str) -> Value {
    reqwest::get(format!("http://{addr}/api/runs/current"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap()
}

/// Poll the current run until its phase is `phase`.
async fn wait_for_phase(addr: &str, phase: &str) -> Value {
    for _ in 0..200 {
        let snapshot = current_run(addr).await;
        if snapshot["phase"]["phase"] == phase {
            return snapshot;
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
    panic!("run never reached phase {phase}");
}

fn video_form(len: usize, description: &str) -> reqwest::multipart::Form {
    let part = reqwest::multipart::Part::bytes(vec![7u8; len])
        .file_name("session.mp4")
        .mime_str("video/mp4")
        .unwrap();
    reqwest::multipart::Form::new()
        .part("video", part)
        .text("description", description.to_string())
}

async fn post_form(addr: &str, form: reqwest::multipart::Form) -> reqwest::Response {
    reqwest::Client::new()
        .post(format!("http://{addr}/api/task-prompts"))
        .multipart(form)
        .send()
        .await
        .unwrap()
}

#[tokio::test]
async fn test_health_endpoint() {
    let (addr, _) = start_test_server(Duration::from_millis(1)).await;
    let resp = reqwest::get(format!("http://{addr}/health")).await.unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["status"], "ok");
    assert_eq!(body["service"], "qaflow");
    assert_eq!(body["running"], false);
}

#[tokio::test]
async fn test_idle_snapshot() {
    let (addr, _) = start_test_server(Duration::from_millis(1)).await;
    let snapshot = current_run(&addr).await;
    assert_eq!(snapshot["phase"]["phase"], "idle");
    assert_eq!(snapshot["agents"].as_array().unwrap().len(), 4);
    assert!(snapshot["log"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_run_lifecycle() {
    let (addr, backend) = start_test_server(Duration::from_millis(5)).await;

    let resp = post_json(&addr, "/api/runs", json!({ "goal": "Log in" })).await;
    assert_eq!(resp.status(), 202);
    let body: Value = resp.json().await.unwrap();
    assert!(body["runId"].is_string());

    let snapshot = wait_for_phase(&addr, "done").await;
    assert_eq!(snapshot["runId"], body["runId"]);
    assert_eq!(snapshot["goal"], "Log in");
    assert_eq!(snapshot["subgoals"].as_array().unwrap().len(), 2);
    assert_eq!(snapshot["verifications"].as_array().unwrap().len(), 2);
    assert_eq!(snapshot["analysis"]["overallVerdict"], "Passed");
    let statuses: Vec<&str> = snapshot["agents"]
        .as_array()
        .unwrap()
        .iter()
        .map(|a| a["status"].as_str().unwrap())
        .collect();
    assert_eq!(statuses, vec!["completed"; 4]);
    // planner + 2 verifier + analysis
    assert_eq!(backend.calls.load(Ordering::SeqCst), 4);
}

#[tokio::test]
async fn test_empty_goal_rejected() {
    let (addr, backend) = start_test_server(Duration::from_millis(1)).await;
    let resp = post_json(&addr, "/api/runs", json!({ "goal": "   " })).await;
    assert_eq!(resp.status(), 400);
    let body: Value = resp.json().await.unwrap();
    assert!(body["error"].as_str().unwrap().contains("Goal is required"));
    assert_eq!(backend.calls.load(Ordering::SeqCst), 0);
    assert_eq!(current_run(&addr).await["phase"]["phase"], "idle");
}

#[tokio::test]
async fn test_busy_then_cancel() {
    let (addr, _) = start_test_server(Duration::from_secs(30)).await;

    let first = post_json(&addr, "/api/runs", json!({ "goal": "Log in" })).await;
    assert_eq!(first.status(), 202);
    wait_for_phase(&addr, "executor_running").await;

    let second = post_json(&addr, "/api/runs", json!({ "goal": "Log out" })).await;
    assert_eq!(second.status(), 409);

    let resp = post_json(&addr, "/api/runs/cancel", json!({})).await;
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["cancelled"], true);

    let snapshot = wait_for_phase(&addr, "error").await;
    assert_eq!(snapshot["goal"], "Log in");

    // Nothing left to cancel.
    let resp = post_json(&addr, "/api/runs/cancel", json!({})).await;
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["cancelled"], false);
}

#[tokio::test]
async fn test_task_prompt_generated() {
    let (addr, backend) = start_test_server(Duration::from_millis(1)).await;
    let resp = post_form(&addr, video_form(256, "User toggles Wi-Fi")).await;
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["taskPrompt"], "Open settings and toggle Wi-Fi");
    assert_eq!(backend.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_task_prompt_oversized_video() {
    let (addr, backend) = start_test_server(Duration::from_millis(1)).await;
    let resp = post_form(&addr, video_form(MAX_VIDEO_BYTES + 1, "desc")).await;
    assert_eq!(resp.status(), 400);
    let body: Value = resp.json().await.unwrap();
    assert!(body["error"].as_str().unwrap().contains("smaller than"));
    assert_eq!(backend.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_task_prompt_missing_description() {
    let (addr, backend) = start_test_server(Duration::from_millis(1)).await;
    let part = reqwest::multipart::Part::bytes(vec![1u8; 16])
        .file_name("session.mp4")
        .mime_str("video/mp4")
        .unwrap();
    let form = reqwest::multipart::Form::new().part("video", part);
    let resp = post_form(&addr, form).await;
    assert_eq!(resp.status(), 400);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(
        body["error"],
        "Please provide both a video file and a description."
    );
    assert_eq!(backend.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_supervise_recorded_episode() {
    let (addr, _) = start_test_server(Duration::from_millis(1)).await;
    let resp = post_json(
        &addr,
        "/api/supervise",
        json!({ "goal": "Log in", "log": "[10:00:00] Planner: Generated 2 subgoals." }),
    )
    .await;
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["suggestedImprovements"], "Add a logout check");
}

#[tokio::test]
async fn test_supervise_without_episode_rejected() {
    let (addr, backend) = start_test_server(Duration::from_millis(1)).await;
    let resp = post_json(&addr, "/api/supervise", json!({ "goal": "Log in" })).await;
    assert_eq!(resp.status(), 400);
    assert_eq!(backend.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_websocket_snapshot_and_events() {
    let (addr, _) = start_test_server(Duration::from_millis(5)).await;
    let (mut ws, _) = tokio_tungstenite::connect_async(format!("ws://{addr}/ws"))
        .await
        .unwrap();

    let first = ws.next().await.unwrap().unwrap();
    let first: Value = serde_json::from_str(&first.into_text().unwrap()).unwrap();
    assert_eq!(first["type"], "snapshot");
    assert_eq!(first["snapshot"]["phase"]["phase"], "idle");

    ws.send(Message::Text(json!({ "type": "start", "goal": "Log in" }).to_string()))
        .await
        .unwrap();

    let mut kinds = Vec::new();
    let finished = tokio::time::timeout(Duration::from_secs(10), async {
        while let Some(Ok(msg)) = ws.next().await {
            let value: Value = serde_json::from_str(&msg.into_text().unwrap()).unwrap();
            kinds.push(value["type"].as_str().unwrap().to_string());
            if value["type"] == "phase" && value["phase"]["phase"] == "done" {
                return true;
            }
        }
        false
    })
    .await
    .unwrap();

    assert!(finished);
    assert!(kinds.iter().any(|k| k == "agent"));
    assert!(kinds.iter().any(|k| k == "log"));
    assert!(!kinds.iter().any(|k| k == "error"));
}

#[tokio::test]
async fn test_websocket_rejects_empty_goal() {
    let (addr, _) = start_test_server(Duration::from_millis(1)).await;
    let (mut ws, _) = tokio_tungstenite::connect_async(format!("ws://{addr}/ws"))
        .await
        .unwrap();
    let _snapshot = ws.next().await.unwrap().unwrap();

    ws.send(Message::Text(json!({ "type": "start", "goal": "" }).to_string()))
        .await
        .unwrap();
    let reply = ws.next().await.unwrap().unwrap();
    let reply: Value = serde_json::from_str(&reply.into_text().unwrap()).unwrap();
    assert_eq!(reply["type"], "error");
    assert!(reply["message"].as_str().unwrap().contains("Goal is required"));
}
