//! Translates [`CoreError`] (and config/bootstrap [`anyhow::Error`]s) into
//! the uniform `{status, data?, message?}` HTTP envelope.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use reelforge_core::error::CoreError;
use serde_json::json;
use std::fmt;

pub type AppResult<T> = Result<T, AppError>;

#[derive(Debug)]
pub struct AppError {
    pub status: StatusCode,
    pub message: String,
}

impl AppError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self { status, message: message.into() }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for AppError {}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = Json(json!({
            "status": "error",
            "message": self.message,
        }));
        (self.status, body).into_response()
    }
}

/// Maps the core error taxonomy onto HTTP status codes. `worker-runtime`
/// and `filesystem` failures never reach here synchronously (they surface
/// through the job/event model instead) but can occur on orphan-repair and
/// coverage paths that touch the filesystem directly.
impl From<CoreError> for AppError {
    fn from(err: CoreError) -> Self {
        match &err {
            CoreError::InvalidInput(_) => Self::bad_request(err.to_string()),
            CoreError::NotFound(_) => Self::not_found(err.to_string()),
            CoreError::ToolMissing(_) => Self::new(StatusCode::UNPROCESSABLE_ENTITY, err.to_string()),
            CoreError::Conflict(_) => Self::new(StatusCode::CONFLICT, err.to_string()),
            CoreError::Cancelled(_) => Self::new(StatusCode::CONFLICT, err.to_string()),
            CoreError::Timeout(_) => Self::new(StatusCode::GATEWAY_TIMEOUT, err.to_string()),
            CoreError::Io(_) | CoreError::Serialization(_) | CoreError::WorkerRuntime(_) | CoreError::Internal(_) => {
                Self::internal(err.to_string())
            }
        }
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        Self::internal(err.to_string())
    }
}

/// Wraps a successful payload in the uniform envelope's `data` field.
pub fn envelope<T: serde::Serialize>(data: T) -> Json<serde_json::Value> {
    Json(json!({
        "status": "success",
        "data": data,
    }))
}
