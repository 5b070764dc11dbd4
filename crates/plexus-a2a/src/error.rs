use plexus_common::ErrorCode;

#[derive(Debug, thiserror::Error)]
pub enum A2aError {
    #[error("task not found")]
    TaskNotFound,
    #[error("invalid task state transition: {from} -> {to}")]
    InvalidTaskState { from: String, to: String },
    #[error("idempotency key conflict")]
    IdempotencyConflict,
    #[error("capability not supported: {0}")]
    CapabilityNotSupported(String),
    #[error("push authentication requires an encryption key (set PUSH_AUTH_ENCRYPTION_KEY or ADMIN_KEY)")]
    NoEncryptionKey,
    #[error("storage error: {0}")]
    Storage(#[from] plexus_storage::StorageError),
}

impl A2aError {
    pub fn code(&self) -> ErrorCode {
        match self {
            A2aError::TaskNotFound => ErrorCode::TaskNotFound,
            A2aError::InvalidTaskState { .. } => ErrorCode::InvalidTaskState,
            A2aError::IdempotencyConflict => ErrorCode::IdempotencyConflict,
            A2aError::CapabilityNotSupported(_) => ErrorCode::CapabilityNotSupported,
            A2aError::NoEncryptionKey => ErrorCode::InternalError,
            A2aError::Storage(_) => ErrorCode::InternalError,
        }
    }
}
