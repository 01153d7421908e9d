use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

/// Coarse classification of a failure, for callers that branch on the
/// cause rather than the message text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub enum ErrorKind {
    /// Rejected locally before any request was sent
    Validation,
    /// The request body could not be encoded
    Request,
    Transport,
    /// Non-success HTTP status
    Status,
    MalformedResponse,
    Unauthenticated,
    JobFailed,
    Cancelled,
    Timeout,
    Storage,
}

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("{0}")]
    Validation(String),

    #[error("Network error: {0}")]
    NetworkError(#[from] reqwest::Error),

    #[error("{message}")]
    Status { status: u16, message: String },

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Failed to encode request: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("{0}")]
    Unauthenticated(String),

    #[error("{0}")]
    JobFailed(String),

    #[error("Cancelled")]
    Cancelled,

    #[error("Gave up waiting for results after {attempts} attempts")]
    PollLimitExceeded { attempts: u32 },

    #[error("Credential storage error: {0}")]
    Storage(String),
}

/// Maximum length for error response bodies in error messages
const MAX_ERROR_BODY_LENGTH: usize = 500;

impl ApiError {
    /// Truncate a response body to avoid logging excessive data
    fn truncate_body(body: &str) -> String {
        if body.len() <= MAX_ERROR_BODY_LENGTH {
            body.to_string()
        } else {
            let mut end = MAX_ERROR_BODY_LENGTH;
            while !body.is_char_boundary(end) {
                end -= 1;
            }
            format!("{}... (truncated, {} total bytes)", &body[..end], body.len())
        }
    }

    /// Build an error for a non-success status, keeping the raw body as the message.
    pub fn from_status(status: reqwest::StatusCode, body: &str) -> Self {
        let truncated = Self::truncate_body(body);
        let message = if truncated.trim().is_empty() {
            format!("API Error: {}", status)
        } else {
            format!("API Error: {}: {}", status, truncated)
        };
        ApiError::Status {
            status: status.as_u16(),
            message,
        }
    }

    /// Build an error for a non-success status from the first detail field the
    /// server supplied, or `fallback` when there is none.
    pub fn with_detail(
        status: reqwest::StatusCode,
        body: &str,
        fields: &[&str],
        fallback: &str,
    ) -> Self {
        ApiError::Status {
            status: status.as_u16(),
            message: detail_from_body(body, fields).unwrap_or_else(|| fallback.to_string()),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            ApiError::Validation(_) => ErrorKind::Validation,
            ApiError::Encode(_) => ErrorKind::Request,
            ApiError::NetworkError(_) => ErrorKind::Transport,
            ApiError::Status { .. } => ErrorKind::Status,
            ApiError::InvalidResponse(_) => ErrorKind::MalformedResponse,
            ApiError::Unauthenticated(_) => ErrorKind::Unauthenticated,
            ApiError::JobFailed(_) => ErrorKind::JobFailed,
            ApiError::Cancelled => ErrorKind::Cancelled,
            ApiError::PollLimitExceeded { .. } => ErrorKind::Timeout,
            ApiError::Storage(_) => ErrorKind::Storage,
        }
    }

    /// HTTP status for `Status` errors
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Extract the first non-empty string among `fields` from a JSON object body.
pub fn detail_from_body(body: &str, fields: &[&str]) -> Option<String> {
    let value: Value = serde_json::from_str(body).ok()?;
    let object = value.as_object()?;
    fields.iter().find_map(|field| {
        object
            .get(*field)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    })
}

/// A failure as kept in observable state: clonable, comparable, and
/// carrying only the kind and the human-readable message.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize)]
#[error("{message}")]
pub struct Failure {
    pub kind: ErrorKind,
    pub message: String,
}

impl Failure {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn cancelled() -> Self {
        Self::new(ErrorKind::Cancelled, ApiError::Cancelled.to_string())
    }
}

impl From<&ApiError> for Failure {
    fn from(err: &ApiError) -> Self {
        Self::new(err.kind(), err.to_string())
    }
}

impl From<ApiError> for Failure {
    fn from(err: ApiError) -> Self {
        Self::from(&err)
    }
}
