use axum::{
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;

use crate::core::errors::{RequestError, TaskError};

/// Seconds a client should wait before resubmitting to a busy server
pub const RETRY_AFTER_SECONDS: u64 = 5;

/// Request-level failure surfaced to the HTTP caller
#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Request(#[from] RequestError),

    #[error(transparent)]
    Task(#[from] TaskError),

    #[error("Endpoint not found")]
    RouteNotFound,
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Request(RequestError::PayloadTooLarge { .. }) => StatusCode::PAYLOAD_TOO_LARGE,
            Self::Request(_) => StatusCode::BAD_REQUEST,
            Self::Task(TaskError::NotFound(_)) | Self::Task(TaskError::NoResults) => {
                StatusCode::NOT_FOUND
            }
            Self::Task(TaskError::NotCompleted { .. }) => StatusCode::BAD_REQUEST,
            Self::Task(TaskError::ServerBusy { .. }) => StatusCode::SERVICE_UNAVAILABLE,
            Self::RouteNotFound => StatusCode::NOT_FOUND,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = Json(serde_json::json!({ "error": self.to_string() }));

        if status == StatusCode::SERVICE_UNAVAILABLE {
            return (
                status,
                [(header::RETRY_AFTER, RETRY_AFTER_SECONDS.to_string())],
                body,
            )
                .into_response();
        }
        (status, body).into_response()
    }
}
