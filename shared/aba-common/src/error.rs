use axum::{http::StatusCode, response::IntoResponse, Json};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;
use chrono::{DateTime, Utc};

use crate::types::{ApiResponse, ConstraintViolation};

/// Error taxonomy for the scheduling core: NotFound / Conflict / Invariant /
/// Unauthorized / Timeout / Transient / Internal, plus the two infrastructure
/// errors the teacher's `AppError` already carried (`Database`, `Redis`).
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    /// A candidate placement failed one or more ConstraintEngine rules.
    #[error("{} constraint violation(s)", .0.len())]
    Invariant(Vec<ConstraintViolation>),

    #[error("Operation timed out")]
    Timeout,

    #[error("Transient failure: {0}")]
    Transient(String),

    #[error("Internal server error: {0}")]
    Internal(String),
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ApiError {
    pub error_code: String,
    pub message: String,
    pub details: Option<serde_json::Value>,
    pub timestamp: DateTime<Utc>,
    pub request_id: String,
}

impl ApiError {
    pub fn new(error_code: String, message: String) -> Self {
        Self {
            error_code,
            message,
            details: None,
            timestamp: Utc::now(),
            request_id: Uuid::new_v4().to_string(),
        }
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }
}

impl AppError {
    pub fn status_code(&self) -> u16 {
        match self {
            AppError::Unauthorized(_) => 401,
            AppError::NotFound(_) => 404,
            AppError::Validation(_) => 400,
            AppError::Conflict(_) => 409,
            AppError::Invariant(_) => 422,
            AppError::Timeout => 504,
            AppError::Transient(_) => 503,
            _ => 500,
        }
    }

    pub fn error_code(&self) -> &str {
        match self {
            AppError::Database(_) => "DATABASE_ERROR",
            AppError::Redis(_) => "CACHE_ERROR",
            AppError::Unauthorized(_) => "UNAUTHORIZED",
            AppError::Validation(_) => "VALIDATION_ERROR",
            AppError::NotFound(_) => "NOT_FOUND",
            AppError::Conflict(_) => "CONFLICT",
            AppError::Invariant(_) => "INVARIANT_VIOLATION",
            AppError::Timeout => "TIMEOUT",
            AppError::Transient(_) => "TRANSIENT_ERROR",
            AppError::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let status = StatusCode::from_u16(self.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        if matches!(self, AppError::Internal(_) | AppError::Database(_) | AppError::Redis(_)) {
            tracing::error!(error = %self, "request failed");
        } else {
            tracing::warn!(error = %self, "request rejected");
        }

        let mut api_error = ApiError::new(self.error_code().to_string(), self.to_string());
        if let AppError::Invariant(violations) = &self {
            api_error = api_error.with_details(serde_json::json!({ "violations": violations }));
        }

        let body: ApiResponse<()> = ApiResponse::error_with_code(api_error.message.clone(), api_error.error_code.clone());
        (status, Json(body)).into_response()
    }
}
