// crates/backend-lib/src/error.rs

//! Central error type + Axum integration.
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

/// Application error types with error codes and context
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Rate limit exceeded")]
    RateLimitExceeded,

    #[error("Mail delivery failed: {0}")]
    Mail(String),
}

impl AppError {
    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            AppError::RateLimitExceeded => StatusCode::TOO_MANY_REQUESTS,
            AppError::Mail(_) => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Get the error code for this error
    pub fn error_code(&self) -> &'static str {
        match self {
            AppError::Internal(_) => "INT_001",
            AppError::NotFound(_) => "NF_001",
            AppError::Io(_) => "IO_001",
            AppError::Json(_) => "JSON_001",
            AppError::InvalidInput(_) => "VAL_001",
            AppError::Config(_) => "CFG_001",
            AppError::RateLimitExceeded => "RATE_001",
            AppError::Mail(_) => "MAIL_001",
        }
    }

    /// Get a sanitized message suitable for production use
    pub fn sanitized_message(&self) -> String {
        match self {
            AppError::Internal(_) | AppError::Io(_) | AppError::Config(_) => {
                "An internal server error occurred".to_string()
            },
            AppError::Json(_) => "Invalid request format".to_string(),
            AppError::NotFound(_) => "Resource not found".to_string(),
            AppError::InvalidInput(msg) => msg.clone(),
            AppError::RateLimitExceeded => {
                "Too many requests, please try again later".to_string()
            },
            AppError::Mail(_) => "Failed to send notification".to_string(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let error_code = self.error_code();

        if status.is_server_error() {
            tracing::error!(code = error_code, "{self}");
        }

        // Use detailed messages in development, sanitized in production
        let message = if cfg!(debug_assertions) {
            self.to_string()
        } else {
            self.sanitized_message()
        };

        let body = serde_json::json!({
            "error": {
                "code": error_code,
                "message": message,
            }
        });

        (status, axum::Json(body)).into_response()
    }
}

impl From<String> for AppError {
    fn from(msg: String) -> Self {
        AppError::Internal(msg)
    }
}

impl From<&str> for AppError {
    fn from(msg: &str) -> Self {
        AppError::Internal(msg.to_string())
    }
}

impl From<figment::Error> for AppError {
    fn from(err: figment::Error) -> Self {
        AppError::Config(err.to_string())
    }
}
