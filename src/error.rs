// src/error.rs
use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use serde_json::json;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Session not found")]
    NotFound,

    #[error("Session already exists")]
    Exists,

    #[error("Mandatory field missing: {0}")]
    MandatoryFieldMissing(String),

    #[error("Rater error: {0}")]
    Rater(String),

    #[error("Charger error: {0}")]
    Charger(String),

    #[error("Resource error: {0}")]
    Resource(String),

    #[error("CDR error: {0}")]
    Cdrs(String),

    #[error("Replication error: {0}")]
    Replication(String),

    #[error("Backup store error: {0}")]
    Storage(String),

    #[error("Insufficient balance")]
    InsufficientBalance,

    #[error("Lock timeout on identifier: {0}")]
    LockTimeout(String),

    #[error("Partially executed")]
    PartiallyExecuted,

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<redis::RedisError> for SessionError {
    fn from(e: redis::RedisError) -> Self {
        SessionError::Storage(e.to_string())
    }
}

impl ResponseError for SessionError {
    fn error_response(&self) -> HttpResponse {
        let status_code = self.status_code();

        HttpResponse::build(status_code).json(json!({
            "error": self.error_code(),
            "message": self.to_string(),
        }))
    }

    fn status_code(&self) -> StatusCode {
        match self {
            SessionError::NotFound => StatusCode::NOT_FOUND,
            SessionError::Exists => StatusCode::CONFLICT,
            SessionError::MandatoryFieldMissing(_) => StatusCode::BAD_REQUEST,
            SessionError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            SessionError::InsufficientBalance => StatusCode::FORBIDDEN,
            SessionError::LockTimeout(_) => StatusCode::REQUEST_TIMEOUT,
            SessionError::PartiallyExecuted => StatusCode::MULTI_STATUS,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl SessionError {
    fn error_code(&self) -> &str {
        match self {
            SessionError::NotFound => "session_not_found",
            SessionError::Exists => "session_exists",
            SessionError::MandatoryFieldMissing(_) => "mandatory_field_missing",
            SessionError::Rater(_) => "rater_error",
            SessionError::Charger(_) => "charger_error",
            SessionError::Resource(_) => "resource_error",
            SessionError::Cdrs(_) => "cdrs_error",
            SessionError::Replication(_) => "replication_error",
            SessionError::Storage(_) => "storage_error",
            SessionError::InsufficientBalance => "insufficient_balance",
            SessionError::LockTimeout(_) => "lock_timeout",
            SessionError::PartiallyExecuted => "partially_executed",
            SessionError::InvalidRequest(_) => "invalid_request",
            SessionError::Internal(_) => "internal_error",
        }
    }
}
