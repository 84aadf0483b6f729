use thiserror::Error;

pub const REMOTE_FAILURE_HINT: &str =
    "This might be due to API limits, network issues, or content policy violations.";

/// How the host should surface a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Warning,
    Error,
    Fatal,
}

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("File size too large ({size} bytes). Please upload an image smaller than 10MB.")]
    SizeExceeded { size: u64, limit: u64 },

    #[error("Error processing image: {0}")]
    DecodeError(String),
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum QueryError {
    #[error("Please enter a question about the image.")]
    EmptyQuestion,

    #[error("No image uploaded. Please upload an image to ask questions about it.")]
    NoImage,

    #[error("Error generating response: {0}")]
    RemoteCallFailed(String),

    #[error("No response generated. Please try again.")]
    EmptyResponse,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{key} not found in environment variables. Please check your .env file.")]
    Missing { key: String },

    #[error("failed to build HTTP client: {0}")]
    HttpClient(#[from] reqwest::Error),

    #[error("{0}")]
    ModelSelection(String),
}

impl IngestError {
    pub fn severity(&self) -> Severity {
        Severity::Error
    }
}

impl QueryError {
    pub fn severity(&self) -> Severity {
        match self {
            QueryError::EmptyQuestion | QueryError::NoImage => Severity::Warning,
            QueryError::RemoteCallFailed(_) | QueryError::EmptyResponse => Severity::Error,
        }
    }

    /// Extra line shown under failures that happened at or after the remote call.
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            QueryError::RemoteCallFailed(_) | QueryError::EmptyResponse => {
                Some(REMOTE_FAILURE_HINT)
            }
            _ => None,
        }
    }

    /// Stable name used in event logs.
    pub fn kind(&self) -> &'static str {
        match self {
            QueryError::EmptyQuestion => "empty_question",
            QueryError::NoImage => "no_image",
            QueryError::RemoteCallFailed(_) => "remote_call_failed",
            QueryError::EmptyResponse => "empty_response",
        }
    }
}

impl ConfigError {
    pub fn severity(&self) -> Severity {
        Severity::Fatal
    }
}

/// Flattens an error chain into one line, skipping repeated messages.
pub fn error_chain_text(err: &anyhow::Error, max_chars: usize) -> String {
    let mut parts = Vec::new();
    for cause in err.chain() {
        let text = cause.to_string();
        let trimmed = text.trim();
        if trimmed.is_empty() {
            continue;
        }
        if parts
            .last()
            .map(|existing: &String| existing == trimmed)
            .unwrap_or(false)
        {
            continue;
        }
        parts.push(trimmed.to_string());
    }
    if parts.is_empty() {
        return truncate_text(&err.to_string(), max_chars);
    }
    truncate_text(&parts.join(" | caused by: "), max_chars)
}

pub(crate) fn truncate_text(value: &str, max_chars: usize) -> String {
    if value.chars().count() <= max_chars {
        return value.to_string();
    }
    value.chars().take(max_chars).collect::<String>() + "…"
}
