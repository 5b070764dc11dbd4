#[derive(Debug, thiserror::Error)]
pub enum TransformError {
    #[error("invalid request body: {0}")]
    InvalidRequest(String),
    #[error("malformed upstream response: {0}")]
    MalformedResponse(String),
}

pub type Result<T> = std::result::Result<T, TransformError>;
