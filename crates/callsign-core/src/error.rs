//! Unified error handling for Callsign
//!
//! This module provides a single error type covering persistence, lookup,
//! validation and event-socket failures, with automatic HTTP response mapping
//! for the document endpoint.

use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use serde_json::json;
use thiserror::Error;

/// Main application error type
///
/// All errors in the application should be converted to this type.
/// It implements `ResponseError` for automatic HTTP response generation.
#[derive(Error, Debug)]
pub enum AppError {
    // ==================== Database Errors ====================
    #[error("Database error: {0}")]
    Database(String),

    #[error("Database pool error: {0}")]
    Pool(String),

    // ==================== Cache Errors ====================
    #[error("Cache error: {0}")]
    Cache(String),

    // ==================== Call Control Errors ====================
    #[error("Feature code not found: {0}")]
    FeatureCodeNotFound(String),

    #[error("Invalid session transition: {from} -> {to}")]
    InvalidTransition { from: String, to: String },

    #[error("Service registry error: {0}")]
    Registry(String),

    #[error("Webhook request failed: {0}")]
    Webhook(String),

    // ==================== Validation Errors ====================
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Missing required field: {0}")]
    MissingField(String),

    // ==================== Resource Errors ====================
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Already exists: {0}")]
    AlreadyExists(String),

    // ==================== Internal Errors ====================
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    // ==================== Event Socket Errors ====================
    #[error("ESL connection error: {0}")]
    EslConnection(String),

    #[error("ESL command failed: {0}")]
    EslCommand(String),

    #[error("ESL timeout: {0}")]
    EslTimeout(String),

    #[error("ESL reconnect gave up after {attempts} attempts")]
    ReconnectExhausted { attempts: u32 },

    #[error("Call hung up: {0}")]
    CallHungUp(String),
}

impl AppError {
    /// Returns the HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            // 400 Bad Request
            AppError::Validation(_) | AppError::InvalidInput(_) | AppError::MissingField(_) => {
                StatusCode::BAD_REQUEST
            }

            // 404 Not Found
            AppError::FeatureCodeNotFound(_) | AppError::NotFound(_) => StatusCode::NOT_FOUND,

            // 409 Conflict
            AppError::Conflict(_)
            | AppError::AlreadyExists(_)
            | AppError::InvalidTransition { .. } => StatusCode::CONFLICT,

            // 502 Bad Gateway
            AppError::EslConnection(_)
            | AppError::EslCommand(_)
            | AppError::ReconnectExhausted { .. }
            | AppError::Webhook(_) => StatusCode::BAD_GATEWAY,

            // 504 Gateway Timeout
            AppError::EslTimeout(_) => StatusCode::GATEWAY_TIMEOUT,

            // 500 Internal Server Error
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Returns the error code for API responses
    pub fn error_code(&self) -> &'static str {
        match self {
            AppError::Database(_) => "database_error",
            AppError::Pool(_) => "pool_error",
            AppError::Cache(_) => "cache_error",
            AppError::FeatureCodeNotFound(_) => "feature_code_not_found",
            AppError::InvalidTransition { .. } => "invalid_transition",
            AppError::Registry(_) => "registry_error",
            AppError::Webhook(_) => "webhook_error",
            AppError::Validation(_) => "validation_error",
            AppError::InvalidInput(_) => "invalid_input",
            AppError::MissingField(_) => "missing_field",
            AppError::NotFound(_) => "not_found",
            AppError::Conflict(_) => "conflict",
            AppError::AlreadyExists(_) => "already_exists",
            AppError::Internal(_) => "internal_error",
            AppError::Config(_) => "config_error",
            AppError::Serialization(_) => "serialization_error",
            AppError::EslConnection(_) => "esl_connection_error",
            AppError::EslCommand(_) => "esl_command_error",
            AppError::EslTimeout(_) => "esl_timeout",
            AppError::ReconnectExhausted { .. } => "reconnect_exhausted",
            AppError::CallHungUp(_) => "call_hung_up",
        }
    }

    /// Whether the error means the underlying socket is unusable
    pub fn is_connection_lost(&self) -> bool {
        matches!(
            self,
            AppError::EslConnection(_) | AppError::CallHungUp(_) | AppError::ReconnectExhausted { .. }
        )
    }
}

impl ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        AppError::status_code(self)
    }

    fn error_response(&self) -> HttpResponse {
        let status = self.status_code();
        let body = json!({
            "error": self.error_code(),
            "message": self.to_string(),
            "status": status.as_u16(),
        });

        HttpResponse::build(status).json(body)
    }
}

// ==================== From implementations ====================

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Serialization(err.to_string())
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::EslConnection(err.to_string())
    }
}

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        AppError::Config(err.to_string())
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(err: validator::ValidationErrors) -> Self {
        AppError::Validation(err.to_string())
    }
}

impl From<regex::Error> for AppError {
    fn from(err: regex::Error) -> Self {
        AppError::Validation(format!("invalid regular expression: {}", err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_status_codes() {
        assert_eq!(
            AppError::FeatureCodeNotFound("*99".to_string()).status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            AppError::ReconnectExhausted { attempts: 10 }.status_code(),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            AppError::InvalidTransition {
                from: "hangup".to_string(),
                to: "ringing".to_string()
            }
            .status_code(),
            StatusCode::CONFLICT
        );
    }

    #[test]
    fn test_error_codes() {
        assert_eq!(AppError::CallHungUp("x".into()).error_code(), "call_hung_up");
        assert_eq!(
            AppError::ReconnectExhausted { attempts: 10 }.error_code(),
            "reconnect_exhausted"
        );
    }

    #[test]
    fn test_io_error_is_connection_loss() {
        let err: AppError = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "gone").into();
        assert!(err.is_connection_lost());
        assert!(!AppError::EslCommand("-ERR".into()).is_connection_lost());
    }

    #[test]
    fn test_regex_error_maps_to_validation() {
        let err: AppError = regex::Regex::new("(").unwrap_err().into();
        assert_eq!(err.error_code(), "validation_error");
    }
}
