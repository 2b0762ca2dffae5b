mod config;

use anyhow::Context;
use clap::{Parser, Subcommand};
use config::QaflowConfig;
use qaflow_agent::LlmClient;
use qaflow_gateway::GatewayServer;
use qaflow_orchestrator::{
    AgentViewState, LogEntry, LogStatus, Orchestrator, QaAgents, RunEvent, SimulatedExecutor,
    TaskPromptGenerator, VideoUpload,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "qaflow", about = "QAFlow: multi-agent mobile app QA runner")]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "qaflow.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a test goal through the agent pipeline
    Run {
        /// High-level QA goal, e.g. "Test the login flow"
        #[arg(short, long)]
        goal: String,
    },
    /// Turn a session recording into a test prompt
    GeneratePrompt {
        /// Screen recording of the session
        #[arg(long)]
        video: PathBuf,
        /// What the user does in the recording
        #[arg(short, long)]
        description: String,
    },
    /// Review a recorded test episode and suggest improvements
    Supervise {
        #[arg(short, long)]
        goal: String,
        /// File containing the episode log text
        #[arg(short, long)]
        log: PathBuf,
    },
    /// Start the dashboard gateway server
    Serve {
        /// Host to bind to (overrides config)
        #[arg(long)]
        host: Option<String>,
        /// Port to listen on (overrides config)
        #[arg(short, long)]
        port: Option<u16>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // A missing .env is fine.
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();

    let cli = Cli::parse();
    let mut config = QaflowConfig::load(&cli.config).await?;
    config.resolve_api_keys();

    let client = LlmClient::new(config.model.clone());
    let agents = Arc::new(QaAgents::new(Arc::new(client)).with_retry_policy(config.retry));

    match cli.command {
        Commands::Run { goal } => {
            let executor = Arc::new(SimulatedExecutor::new(config.executor.step_delay()));
            let orchestrator = Orchestrator::new(agents, executor);
            run_goal(&orchestrator, &goal).await?;
        }
        Commands::GeneratePrompt { video, description } => {
            let generator = TaskPromptGenerator::new(agents).with_max_bytes(config.media.max_bytes);
            let upload = read_video(&video, config.media.max_bytes).await?;
            let prompt = generator.generate(Some(&upload), &description).await?;
            println!("{prompt}");
        }
        Commands::Supervise { goal, log } => {
            let episode = tokio::fs::read_to_string(&log)
                .await
                .with_context(|| format!("Failed to read episode log '{}'", log.display()))?;
            let suggestions = agents.supervise(goal.trim(), &episode).await?;
            println!("{suggestions}");
        }
        Commands::Serve { host, port } => {
            let host = host.unwrap_or(config.server.host);
            let port = port.unwrap_or(config.server.port);

            let executor = Arc::new(SimulatedExecutor::new(config.executor.step_delay()));
            let orchestrator = Arc::new(Orchestrator::new(agents.clone(), executor));
            let generator = Arc::new(
                TaskPromptGenerator::new(agents).with_max_bytes(config.media.max_bytes),
            );
            let app = GatewayServer::build(orchestrator.clone(), generator);

            let addr = format!("{host}:{port}");
            let listener = tokio::net::TcpListener::bind(&addr).await?;
            info!("QAFlow gateway listening on {}", addr);
            axum::serve(listener, app)
                .with_graceful_shutdown(async move {
                    let _ = tokio::signal::ctrl_c().await;
                    info!("Shutting down");
                    orchestrator.cancel().await;
                })
                .await?;
        }
    }

    Ok(())
}

/// Run one goal, streaming the log to stdout. Ctrl-C cancels the run.
async fn run_goal(orchestrator: &Orchestrator, goal: &str) -> anyhow::Result<()> {
    let mut events = orchestrator.subscribe();
    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling run");
            on_interrupt.cancel();
        }
    });

    let run = orchestrator.run_with_cancel(goal, cancel);
    tokio::pin!(run);
    let result = loop {
        tokio::select! {
            result = &mut run => break result,
            Ok(event) = events.recv() => print_event(&event),
        }
    };
    while let Ok(event) = events.try_recv() {
        print_event(&event);
    }

    println!();
    for agent in orchestrator.monitor().snapshot().await {
        print_agent_card(&agent);
    }

    let report = result?;
    println!(
        "Verdict: {} ({} subgoal(s), {} ms)",
        report.analysis.overall_verdict,
        report.subgoals.len(),
        report.duration_ms
    );
    Ok(())
}

fn print_event(event: &RunEvent) {
    if let RunEvent::Log { entry, .. } = event {
        print_log_entry(entry);
    }
}

fn print_log_entry(entry: &LogEntry) {
    let marker = match entry.status {
        LogStatus::Info => " ",
        LogStatus::Success => "+",
        LogStatus::Failure => "!",
    };
    println!("{:>3} {marker} {}", entry.step, entry.to_line());
}

fn print_agent_card(agent: &AgentViewState) {
    println!("== {} [{:?}]", agent.name, agent.status);
    if let Some(output) = &agent.output {
        for line in output.to_lines() {
            println!("   {line}");
        }
    }
    if let Some(error) = &agent.error {
        println!("   error: {error}");
    }
}

/// Load a recording, refusing files over `max_bytes` without reading them.
async fn read_video(path: &Path, max_bytes: usize) -> anyhow::Result<VideoUpload> {
    let size = tokio::fs::metadata(path)
        .await
        .with_context(|| format!("Failed to read video '{}'", path.display()))?
        .len();
    if size > u64::try_from(max_bytes).unwrap_or(u64::MAX) {
        anyhow::bail!(
            "Video '{}' is {size} bytes; the limit is {max_bytes} bytes.",
            path.display()
        );
    }
    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("Failed to read video '{}'", path.display()))?;
    let mime_type = mime_guess::from_path(path)
        .first_raw()
        .unwrap_or("application/octet-stream")
        .to_string();
    Ok(VideoUpload {
        file_name: path.file_name().map(|n| n.to_string_lossy().into_owned()),
        mime_type,
        bytes,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[tokio::test]
    async fn test_read_video_guesses_mime() {
        let mut file = tempfile::Builder::new().suffix(".mp4").tempfile().unwrap();
        file.write_all(&[1u8; 32]).unwrap();
        let upload = read_video(file.path(), 1024).await.unwrap();
        assert_eq!(upload.mime_type, "video/mp4");
        assert_eq!(upload.bytes.len(), 32);
    }

    #[tokio::test]
    async fn test_read_video_rejects_oversized_file() {
        let mut file = tempfile::Builder::new().suffix(".mp4").tempfile().unwrap();
        file.write_all(&[1u8; 2048]).unwrap();
        let err = read_video(file.path(), 1024).await.unwrap_err();
        assert!(err.to_string().contains("the limit is 1024 bytes"), "{err}");
    }
}
