//! HTTP-boundary error envelope (spec §7 "Error taxonomy"). Every internal
//! crate already carries an `ErrorCode`; this module is only the
//! `{error:{code,message,details}}` JSON rendering and the `From`
//! conversions that let route handlers propagate with `?`.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use plexus_common::ErrorCode;
use serde_json::{json, Value};

#[derive(Debug)]
pub struct GatewayError {
    pub code: ErrorCode,
    pub message: String,
    pub details: Option<Value>,
}

impl GatewayError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }
}

impl std::fmt::Display for GatewayError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for GatewayError {}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.code.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let body = json!({
            "error": {
                "code": self.code.as_str(),
                "message": self.message,
                "details": self.details,
            }
        });
        (status, Json(body)).into_response()
    }
}

impl From<plexus_router_core::RouterError> for GatewayError {
    fn from(err: plexus_router_core::RouterError) -> Self {
        Self::new(err.code(), err.to_string())
    }
}

impl From<plexus_providers::DispatchError> for GatewayError {
    fn from(err: plexus_providers::DispatchError) -> Self {
        let details = match &err {
            plexus_providers::DispatchError::AllAccountsCooling(
                plexus_providers::CredentialPoolError::AllAccountsCooling { provider, details },
            ) => Some(json!({ "provider": provider, "accounts": details })),
            plexus_providers::DispatchError::UpstreamError { status, body } => {
                Some(json!({ "upstream_status": status, "upstream_body": body }))
            }
            _ => None,
        };
        let mut gateway_error = Self::new(err.code(), err.to_string());
        gateway_error.details = details;
        gateway_error
    }
}

impl From<plexus_transform::TransformError> for GatewayError {
    fn from(err: plexus_transform::TransformError) -> Self {
        Self::new(ErrorCode::InvalidRequest, err.to_string())
    }
}

impl From<plexus_a2a::A2aError> for GatewayError {
    fn from(err: plexus_a2a::A2aError) -> Self {
        Self::new(err.code(), err.to_string())
    }
}

impl From<serde_json::Error> for GatewayError {
    fn from(err: serde_json::Error) -> Self {
        Self::new(ErrorCode::InvalidRequest, format!("malformed json body: {err}"))
    }
}
