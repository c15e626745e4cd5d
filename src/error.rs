use std::time::Duration;

use axum::{http::StatusCode, response::IntoResponse, Json};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Stdout/stderr captured from a worker, attached to failures as detail.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CapturedOutput {
    pub stdout: String,
    pub stderr: String,
}

/// Upper bound on captured output echoed back in a response body.
const DETAIL_TAIL_BYTES: usize = 8 * 1024;

impl CapturedOutput {
    fn tail(&self) -> CapturedOutput {
        CapturedOutput {
            stdout: tail(&self.stdout, DETAIL_TAIL_BYTES).to_string(),
            stderr: tail(&self.stderr, DETAIL_TAIL_BYTES).to_string(),
        }
    }
}

fn tail(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut start = s.len() - max;
    while !s.is_char_boundary(start) {
        start += 1;
    }
    &s[start..]
}

/// Externally visible status category. Every `AppError` maps to exactly one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    PlayerNotFound,
    UpstreamUnavailable,
    ResolutionTimeout,
    InsufficientRosterData,
    TimeoutFailure,
    InvocationFailure,
    PayloadMissing,
    Rejected,
    BadRequest,
    Internal,
}

impl ErrorKind {
    pub fn status(self) -> StatusCode {
        match self {
            ErrorKind::PlayerNotFound => StatusCode::NOT_FOUND,
            ErrorKind::UpstreamUnavailable | ErrorKind::InvocationFailure => StatusCode::BAD_GATEWAY,
            ErrorKind::ResolutionTimeout | ErrorKind::TimeoutFailure => StatusCode::GATEWAY_TIMEOUT,
            ErrorKind::InsufficientRosterData => StatusCode::UNPROCESSABLE_ENTITY,
            ErrorKind::Rejected | ErrorKind::BadRequest => StatusCode::BAD_REQUEST,
            ErrorKind::PayloadMissing | ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ErrorKind::PlayerNotFound => "player_not_found",
            ErrorKind::UpstreamUnavailable => "upstream_unavailable",
            ErrorKind::ResolutionTimeout => "resolution_timeout",
            ErrorKind::InsufficientRosterData => "insufficient_roster_data",
            ErrorKind::TimeoutFailure => "timeout_failure",
            ErrorKind::InvocationFailure => "invocation_failure",
            ErrorKind::PayloadMissing => "payload_missing",
            ErrorKind::Rejected => "rejected",
            ErrorKind::BadRequest => "bad_request",
            ErrorKind::Internal => "internal",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error("player '{0}' not found on FACEIT")]
    PlayerNotFound(String),

    #[error("upstream unavailable: {0}")]
    UpstreamUnavailable(String),

    #[error("match resolution exceeded its {}ms budget", .0.as_millis())]
    ResolutionTimeout(Duration),

    #[error("insufficient roster data: {0}")]
    InsufficientRosterData(String),

    #[error("worker exceeded its {timeout_ms}ms budget")]
    Timeout { timeout_ms: u64, output: CapturedOutput },

    #[error("worker exited with status {} and no result", exit_label(.exit_code))]
    Invocation { exit_code: Option<i32>, output: CapturedOutput },

    #[error("worker exited cleanly but emitted no {marker} line")]
    PayloadMissing { marker: String, output: CapturedOutput },

    /// The worker ran and reported a logical failure of its own.
    #[error("{reason}")]
    Rejected {
        kind: ErrorKind,
        reason: String,
        detail: serde_json::Value,
    },

    #[error("invalid request: {0}")]
    BadRequest(String),

    #[error("supervised task failed: {0}")]
    TaskFailed(String),

    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

fn exit_label(code: &Option<i32>) -> String {
    code.map(|c| c.to_string()).unwrap_or_else(|| "unknown".to_string())
}

pub type Result<T> = std::result::Result<T, AppError>;

impl AppError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            AppError::PlayerNotFound(_) => ErrorKind::PlayerNotFound,
            AppError::UpstreamUnavailable(_) | AppError::Http(_) => ErrorKind::UpstreamUnavailable,
            AppError::ResolutionTimeout(_) => ErrorKind::ResolutionTimeout,
            AppError::InsufficientRosterData(_) => ErrorKind::InsufficientRosterData,
            AppError::Timeout { .. } => ErrorKind::TimeoutFailure,
            AppError::Invocation { .. } => ErrorKind::InvocationFailure,
            AppError::PayloadMissing { .. } => ErrorKind::PayloadMissing,
            AppError::Rejected { kind, .. } => *kind,
            AppError::BadRequest(_) => ErrorKind::BadRequest,
            AppError::TaskFailed(_)
            | AppError::Json(_)
            | AppError::Config(_)
            | AppError::Io(_) => ErrorKind::Internal,
        }
    }

    /// Structured diagnostic attached to the response body, if any.
    pub fn detail(&self) -> Option<serde_json::Value> {
        match self {
            AppError::Timeout { timeout_ms, output } => Some(serde_json::json!({
                "timeout_ms": timeout_ms,
                "output": output.tail(),
            })),
            AppError::Invocation { exit_code, output } => Some(serde_json::json!({
                "exit_code": exit_code,
                "output": output.tail(),
            })),
            AppError::PayloadMissing { marker, output } => Some(serde_json::json!({
                "marker": marker,
                "output": output.tail(),
            })),
            AppError::Rejected { detail, .. } if !detail.is_null() => Some(detail.clone()),
            _ => None,
        }
    }
}

/// Failure body shared by every endpoint.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub ok: bool,
    pub error_kind: ErrorKind,
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<serde_json::Value>,
}

impl From<&AppError> for ErrorBody {
    fn from(e: &AppError) -> Self {
        Self {
            ok: false,
            error_kind: e.kind(),
            error: e.to_string(),
            detail: e.detail(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let status = self.kind().status();
        (status, Json(ErrorBody::from(&self))).into_response()
    }
}
