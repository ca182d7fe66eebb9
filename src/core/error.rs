use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;

use crate::features::images::admission::AdmissionError;
use crate::shared::types::FailureResponse;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error(transparent)]
    Admission(#[from] AdmissionError),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Storage error: {0}")]
    Storage(String),
}

impl AppError {
    fn status_and_message(&self) -> (StatusCode, String) {
        match self {
            AppError::Database(e) => {
                tracing::error!("Database error: {:?}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Database error occurred".to_string(),
                )
            }
            AppError::Admission(e) => match e {
                AdmissionError::NoFile => (StatusCode::BAD_REQUEST, e.to_string()),
                AdmissionError::TooLarge { .. } => (StatusCode::PAYLOAD_TOO_LARGE, e.to_string()),
                AdmissionError::QuotaExceeded { .. } => {
                    (StatusCode::TOO_MANY_REQUESTS, e.to_string())
                }
                AdmissionError::ProcessingFailed(msg) => {
                    tracing::warn!("Image processing failed: {}", msg);
                    (StatusCode::UNPROCESSABLE_ENTITY, e.to_string())
                }
                AdmissionError::Storage(msg) => {
                    tracing::error!("Storage error during upload: {}", msg);
                    (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        "Failed to store image".to_string(),
                    )
                }
            },
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, msg.clone()),
            AppError::Storage(msg) => {
                tracing::error!("Storage error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Storage error occurred".to_string(),
                )
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = self.status_and_message();

        (status, Json(FailureResponse::new(message))).into_response()
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
