use serde::{Deserialize, Serialize};

/// The error-code taxonomy shared by every crate that can terminate a
/// request. The HTTP boundary (`plexus-core`) maps each variant to a status
/// code; internal crates only need the code, not the transport detail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    InvalidRequest,
    Unauthenticated,
    Forbidden,
    TaskNotFound,
    InvalidTaskState,
    CapabilityNotSupported,
    IdempotencyConflict,
    RateLimited,
    InternalError,
}

impl ErrorCode {
    /// The status code this error is surfaced with, per the error-taxonomy
    /// table (spec §7).
    pub fn status_code(self) -> u16 {
        match self {
            ErrorCode::InvalidRequest => 400,
            ErrorCode::Unauthenticated => 401,
            ErrorCode::Forbidden => 403,
            ErrorCode::TaskNotFound => 404,
            ErrorCode::IdempotencyConflict => 409,
            ErrorCode::InvalidTaskState | ErrorCode::CapabilityNotSupported => 422,
            ErrorCode::RateLimited => 429,
            ErrorCode::InternalError => 500,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ErrorCode::InvalidRequest => "INVALID_REQUEST",
            ErrorCode::Unauthenticated => "UNAUTHENTICATED",
            ErrorCode::Forbidden => "FORBIDDEN",
            ErrorCode::TaskNotFound => "TASK_NOT_FOUND",
            ErrorCode::InvalidTaskState => "INVALID_TASK_STATE",
            ErrorCode::CapabilityNotSupported => "CAPABILITY_NOT_SUPPORTED",
            ErrorCode::IdempotencyConflict => "IDEMPOTENCY_CONFLICT",
            ErrorCode::RateLimited => "RATE_LIMITED",
            ErrorCode::InternalError => "INTERNAL_ERROR",
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
