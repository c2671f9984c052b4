//! Error types for the key registry and the application shell around it.
//!
//! `KeyError` is what callers of the registry branch on. `AppError` covers
//! configuration and the introspection server, and knows how to render itself
//! as an HTTP response.

pub mod key;
pub mod types;

pub use key::KeyError;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{error, warn};

/// Structured error body returned by the admin routes.
#[derive(Serialize, Deserialize, Debug)]
pub struct ErrorResponse {
    pub error: ErrorDetails,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct ErrorDetails {
    #[serde(rename = "type")]
    pub error_type: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub service: Option<String>,
}

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Configuration validation failed: {message}")]
    ConfigValidation {
        message: String,
        field: Option<String>,
    },

    #[error("Configuration file not found: {path}")]
    ConfigNotFound { path: String },

    #[error("Configuration parse error: {message}")]
    ConfigParse { message: String, line: Option<usize> },

    #[error("IO operation failed: {operation} - {message}")]
    Io { operation: String, message: String },

    #[error(transparent)]
    Key(#[from] KeyError),

    #[error("Unauthorized")]
    Unauthorized,

    #[error("Internal server error: {message}")]
    Internal { message: String },
}

impl AppError {
    pub fn config_validation(message: impl Into<String>, field: Option<impl Into<String>>) -> Self {
        Self::ConfigValidation {
            message: message.into(),
            field: field.map(Into::into),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Key(KeyError::ServiceNotConfigured { .. } | KeyError::NoKeysConfigured { .. }) => {
                StatusCode::NOT_FOUND
            }
            Self::Key(KeyError::AllKeysBlocked { .. }) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Key(KeyError::InvalidKeyHandle { .. }) => StatusCode::BAD_REQUEST,
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::ConfigParse { .. } => StatusCode::BAD_REQUEST,
            Self::ConfigNotFound { .. } => StatusCode::NOT_FOUND,
            Self::ConfigValidation { .. } | Self::Io { .. } | Self::Internal { .. } => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    fn error_type(&self) -> &'static str {
        match self {
            Self::ConfigValidation { .. } | Self::ConfigNotFound { .. } | Self::ConfigParse { .. } => {
                "configuration_error"
            }
            Self::Key(KeyError::ServiceNotConfigured { .. }) => "service_not_configured",
            Self::Key(KeyError::NoKeysConfigured { .. }) => "no_keys_configured",
            Self::Key(KeyError::AllKeysBlocked { .. }) => "all_keys_blocked",
            Self::Key(KeyError::InvalidKeyHandle { .. }) => "invalid_key_handle",
            Self::Unauthorized => "unauthorized",
            Self::Io { .. } | Self::Internal { .. } => "internal_error",
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            error!(error = %self, status = status.as_u16(), "Request failed");
        } else {
            warn!(error = %self, status = status.as_u16(), "Request rejected");
        }

        let service = match &self {
            Self::Key(key_error) => Some(key_error.service().to_string()),
            _ => None,
        };
        let body = ErrorResponse {
            error: ErrorDetails {
                error_type: self.error_type().to_string(),
                message: self.to_string(),
                service,
            },
        };

        (status, Json(body)).into_response()
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
