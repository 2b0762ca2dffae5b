use crate::agents::QaAgents;
use qaflow_core::{MediaAttachment, QaError, QaResult};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::info;

/// Default upload limit for session recordings (4 MiB).
pub const DEFAULT_MAX_VIDEO_BYTES: usize = 4 * 1024 * 1024;

/// A recorded user session supplied by the caller.
#[derive(Debug, Clone)]
pub struct VideoUpload {
    pub file_name: Option<String>,
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

/// Turns a screen recording plus a description into a test prompt.
///
/// One generation runs at a time; inputs are checked before the recording
/// is encoded or anything is sent.
pub struct TaskPromptGenerator {
    agents: Arc<QaAgents>,
    max_bytes: usize,
    in_flight: Mutex<()>,
}

impl TaskPromptGenerator {
    pub fn new(agents: Arc<QaAgents>) -> Self {
        Self {
            agents,
            max_bytes: DEFAULT_MAX_VIDEO_BYTES,
            in_flight: Mutex::new(()),
        }
    }

    pub fn with_max_bytes(mut self, max_bytes: usize) -> Self {
        self.max_bytes = max_bytes;
        self
    }

    pub fn max_bytes(&self) -> usize {
        self.max_bytes
    }

    pub async fn generate(&self, video: Option<&VideoUpload>, description: &str) -> QaResult<String> {
        let description = description.trim();
        let video = match video {
            Some(video) if !description.is_empty() => video,
            _ => {
                return Err(QaError::UserInput(
                    "Please provide both a video file and a description.".into(),
                ))
            }
        };
        if video.bytes.is_empty() {
            return Err(QaError::UserInput("The video file is empty.".into()));
        }
        if !video.mime_type.starts_with("video/") {
            return Err(QaError::UserInput(format!(
                "Expected a video file, got {}.",
                video.mime_type
            )));
        }
        if video.bytes.len() > self.max_bytes {
            return Err(QaError::UserInput(format!(
                "Please provide a video file smaller than {}.",
                human_size(self.max_bytes)
            )));
        }
        if !self.agents.backend().supports_video() {
            return Err(QaError::UserInput(
                "The configured model cannot read video. Configure a Gemini model.".into(),
            ));
        }

        let _guard = self.in_flight.try_lock().map_err(|_| {
            QaError::UserInput("A task prompt is already being generated.".into())
        })?;

        info!(
            file = video.file_name.as_deref().unwrap_or("<upload>"),
            mime = %video.mime_type,
            bytes = video.bytes.len(),
            "Generating task prompt"
        );
        let data_uri = MediaAttachment::from_bytes(&video.mime_type, &video.bytes).to_data_uri();
        self.agents.generate_task_prompt(&data_uri, description).await
    }
}

fn human_size(bytes: usize) -> String {
    const MIB: usize = 1024 * 1024;
    if bytes >= MIB && bytes % MIB == 0 {
        format!("{}MB", bytes / MIB)
    } else {
        format!("{bytes} bytes")
    }
}
