use crate::{QaError, QaResult};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};

/// A binary attachment sent to the model next to the rendered prompt text.
///
/// The payload is kept base64-encoded because every provider expects it in
/// that form inside the JSON request body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaAttachment {
    /// MIME type, e.g. `video/mp4`.
    pub mime_type: String,
    /// Base64-encoded payload.
    pub data: String,
}

impl MediaAttachment {
    /// Encode raw bytes into an attachment.
    pub fn from_bytes(mime_type: impl Into<String>, bytes: &[u8]) -> Self {
        Self {
            mime_type: mime_type.into(),
            data: STANDARD.encode(bytes),
        }
    }

    /// Parse a `data:<mime>;base64,<payload>` URI.
    pub fn from_data_uri(uri: &str) -> QaResult<Self> {
        let rest = uri
            .strip_prefix("data:")
            .ok_or_else(|| QaError::Validation("media must be a data: URI".into()))?;
        let (header, payload) = rest
            .split_once(',')
            .ok_or_else(|| QaError::Validation("data URI has no payload".into()))?;
        let mime_type = header.strip_suffix(";base64").ok_or_else(|| {
            QaError::Validation("data URI must use base64 encoding".into())
        })?;
        if mime_type.is_empty() {
            return Err(QaError::Validation("data URI has no MIME type".into()));
        }
        if STANDARD.decode(payload).is_err() {
            return Err(QaError::Validation("data URI payload is not valid base64".into()));
        }
        Ok(Self {
            mime_type: mime_type.to_string(),
            data: payload.to_string(),
        })
    }

    /// Render back into a `data:` URI.
    pub fn to_data_uri(&self) -> String {
        format!("data:{};base64,{}", self.mime_type, self.data)
    }
}
