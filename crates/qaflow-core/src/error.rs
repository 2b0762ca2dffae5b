use thiserror::Error;

/// A convenience `Result` alias using [`QaError`].
pub type QaResult<T> = Result<T, QaError>;

/// Top-level error type for qaflow.
///
/// The variants follow how a failure is handled: local validation and user
/// input errors are never retried, transport and server-side API errors are
/// transient and retried by the prompt call, and schema mismatches are hard
/// failures.
#[derive(Error, Debug)]
pub enum QaError {
    /// Malformed input to a prompt call, rejected before any network call.
    #[error("Validation error: {0}")]
    Validation(String),

    /// Transport-level failure talking to the model provider.
    #[error("HTTP error: {0}")]
    Http(String),

    /// The model provider answered with a non-success status.
    #[error("API error {status}: {message}")]
    Api {
        /// HTTP status code returned by the provider.
        status: u16,
        /// Response body or provider error message.
        message: String,
    },

    /// The model reply could not be parsed into the declared output schema.
    #[error("Schema mismatch: {0}")]
    SchemaMismatch(String),

    /// Bad submission from the user (empty goal, missing or oversized file,
    /// run already in progress).
    #[error("Invalid input: {0}")]
    UserInput(String),

    /// An error in configuration parsing or validation.
    #[error("Config error: {0}")]
    Config(String),

    /// The run was cancelled by the user.
    #[error("Run cancelled")]
    Cancelled,

    /// An error from the run orchestrator itself.
    #[error("Orchestrator error: {0}")]
    Orchestrator(String),

    /// A JSON serialization or deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A standard I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl QaError {
    /// Whether the failure is transient and worth retrying.
    ///
    /// Transport errors, request timeouts (408), rate limits (429) and server
    /// errors (5xx) are transient. Everything else, including other 4xx
    /// statuses, is surfaced immediately.
    pub fn is_transient(&self) -> bool {
        match self {
            QaError::Http(_) => true,
            QaError::Api { status, .. } => {
                *status == 408 || *status == 429 || (500..=599).contains(status)
            }
            _ => false,
        }
    }

    /// Whether this error was caught before a run or call started, so it
    /// should be reported to the user without touching run state.
    pub fn is_user_input(&self) -> bool {
        matches!(self, QaError::UserInput(_))
    }
}
