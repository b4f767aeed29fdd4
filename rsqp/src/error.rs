use std::time::Duration;
use thiserror::Error;

/// Errors raised while turning a source document into text.
///
/// Only [`ExtractError::Backend`] is recoverable: the PDF path treats it as a
/// signal to try the next backend. Everything else is surfaced to the caller.
#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("unsupported document format: {0}")]
    UnsupportedFormat(String),
    #[error("{backend} failed: {message}")]
    Backend {
        backend: &'static str,
        message: String,
    },
    #[error("no extraction backend could read the document ({0})")]
    AllBackendsFailed(String),
    #[error("malformed docx: {0}")]
    Docx(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl ExtractError {
    pub fn backend(backend: &'static str, message: impl ToString) -> Self {
        ExtractError::Backend {
            backend,
            message: message.to_string(),
        }
    }
}

/// Errors raised by the model-backed parser. Every variant triggers the
/// regex fallback; none of them reaches the caller of `parse`.
#[derive(Debug, Error)]
pub enum ModelError {
    #[error("OPENAI_API_KEY is not set")]
    MissingApiKey,
    #[error("completion request failed: {0}")]
    Transport(String),
    #[error("completion request timed out after {0:?}")]
    Timeout(Duration),
    #[error("completion response is not valid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),
    #[error("completion response does not match the question schema: {0}")]
    Schema(String),
    #[error("completion response contained no questions")]
    Empty,
}

impl From<reqwest::Error> for ModelError {
    fn from(e: reqwest::Error) -> Self {
        ModelError::Transport(e.to_string())
    }
}
