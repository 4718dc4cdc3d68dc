//! Error types for Clinsight services
//!
//! Provides a comprehensive error handling system with:
//! - Distinct error types for input, rate limit, provider and internal failures
//! - HTTP status code mapping
//! - Structured error responses
//! - Error codes for client handling

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias using AppError
pub type Result<T> = std::result::Result<T, AppError>;

/// Error codes for machine-readable error identification
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // Input errors (1xxx)
    ValidationError,
    NoEntityFound,

    // Rate limiting (6xxx)
    RateLimited,

    // External provider errors (8xxx)
    ProvidersUnavailable,

    // Internal errors (9xxx)
    InternalError,
    ConfigurationError,
}

impl ErrorCode {
    /// Get the numeric code for this error
    pub fn as_code(&self) -> u16 {
        match self {
            ErrorCode::ValidationError => 1001,
            ErrorCode::NoEntityFound => 1002,

            ErrorCode::RateLimited => 6001,

            ErrorCode::ProvidersUnavailable => 8003,

            ErrorCode::InternalError => 9001,
            ErrorCode::ConfigurationError => 9002,
        }
    }
}

/// Failure of a single provider fetch.
///
/// Transient failures (timeouts, connection resets, 429, 5xx) may succeed on
/// a later attempt; permanent failures exclude the provider for the query.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProviderError {
    #[error("{provider} temporarily unavailable: {message}")]
    Transient { provider: String, message: String },

    #[error("{provider} failed permanently: {message}")]
    Permanent { provider: String, message: String },
}

impl ProviderError {
    pub fn transient(provider: impl Into<String>, message: impl Into<String>) -> Self {
        ProviderError::Transient {
            provider: provider.into(),
            message: message.into(),
        }
    }

    pub fn permanent(provider: impl Into<String>, message: impl Into<String>) -> Self {
        ProviderError::Permanent {
            provider: provider.into(),
            message: message.into(),
        }
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, ProviderError::Transient { .. })
    }

    pub fn provider(&self) -> &str {
        match self {
            ProviderError::Transient { provider, .. } | ProviderError::Permanent { provider, .. } => {
                provider
            }
        }
    }

    /// Classify a reqwest failure for the given provider
    pub fn from_http(provider: &str, err: &reqwest::Error) -> Self {
        if err.is_timeout() || err.is_connect() || err.is_request() {
            return ProviderError::transient(provider, err.to_string());
        }
        match err.status() {
            Some(status) if status.as_u16() == 429 || status.is_server_error() => {
                ProviderError::transient(provider, format!("HTTP {}", status))
            }
            Some(status) => ProviderError::permanent(provider, format!("HTTP {}", status)),
            None if err.is_decode() => {
                ProviderError::permanent(provider, format!("Malformed response: {}", err))
            }
            None => ProviderError::transient(provider, err.to_string()),
        }
    }
}

/// Application error types
#[derive(Error, Debug)]
pub enum AppError {
    // Input errors
    #[error("Validation failed: {message}")]
    Validation {
        message: String,
        field: Option<String>,
    },

    #[error("No clinical entity found in query: {query}")]
    NoEntityFound { query: String },

    // Rate limiting
    #[error("Rate limit exceeded: {limit} requests per second")]
    RateLimited { limit: u32 },

    // Provider errors; single-provider failures degrade and never reach callers
    #[error("All providers unavailable: {}", .providers.join(", "))]
    ProvidersUnavailable { providers: Vec<String> },

    // Internal errors
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    // Generic
    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl AppError {
    /// Shorthand for an input validation failure on a named field
    pub fn validation(field: &str, message: impl Into<String>) -> Self {
        AppError::Validation {
            message: message.into(),
            field: Some(field.to_string()),
        }
    }

    /// Get the error code for this error
    pub fn code(&self) -> ErrorCode {
        match self {
            AppError::Validation { .. } => ErrorCode::ValidationError,
            AppError::NoEntityFound { .. } => ErrorCode::NoEntityFound,
            AppError::RateLimited { .. } => ErrorCode::RateLimited,
            AppError::ProvidersUnavailable { .. } => ErrorCode::ProvidersUnavailable,
            AppError::Configuration { .. } => ErrorCode::ConfigurationError,
            AppError::Other(_) => ErrorCode::InternalError,
        }
    }

    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            // 400 Bad Request
            AppError::Validation { .. } | AppError::NoEntityFound { .. } => StatusCode::BAD_REQUEST,

            // 429 Too Many Requests
            AppError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,

            // 500 Internal Server Error
            AppError::Configuration { .. } | AppError::Other(_) => StatusCode::INTERNAL_SERVER_ERROR,

            // 503 Service Unavailable
            AppError::ProvidersUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    /// Check if this error should be logged at error level
    pub fn is_server_error(&self) -> bool {
        self.status_code().is_server_error()
    }

    /// Check if this error is a client error
    pub fn is_client_error(&self) -> bool {
        self.status_code().is_client_error()
    }
}

/// Structured error response for API
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: ErrorDetails,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorDetails {
    pub code: ErrorCode,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let code = self.code();
        let message = self.to_string();

        if self.is_server_error() {
            tracing::error!(
                error = %message,
                code = ?code,
                status = status.as_u16(),
                "Server error"
            );
        } else if self.is_client_error() {
            tracing::warn!(
                error = %message,
                code = ?code,
                status = status.as_u16(),
                "Client error"
            );
        }

        let field = match &self {
            AppError::Validation { field, .. } => field.clone(),
            _ => None,
        };

        let body = ErrorResponse {
            error: ErrorDetails {
                code,
                message,
                field,
            },
        };

        (status, Json(body)).into_response()
    }
}

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        AppError::Configuration {
            message: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_input_errors_are_client_errors() {
        let err = AppError::NoEntityFound {
            query: "what is the".into(),
        };
        assert_eq!(err.code(), ErrorCode::NoEntityFound);
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
        assert!(err.is_client_error());

        let err = AppError::validation("query", "must not be empty");
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
        assert!(!err.is_server_error());
    }

    #[test]
    fn test_starvation_maps_to_unavailable() {
        let err = AppError::ProvidersUnavailable {
            providers: vec!["openfda".into(), "pubmed".into()],
        };
        assert_eq!(err.status_code(), StatusCode::SERVICE_UNAVAILABLE);
        assert!(err.to_string().contains("openfda, pubmed"));
    }

    #[test]
    fn test_provider_error_classification() {
        let err = ProviderError::transient("clinicaltrials", "HTTP 403");
        assert!(err.is_transient());
        assert_eq!(err.provider(), "clinicaltrials");

        let err = ProviderError::permanent("openfda", "HTTP 400");
        assert!(!err.is_transient());
        assert_eq!(err.to_string(), "openfda failed permanently: HTTP 400");
    }

    #[test]
    fn test_configuration_errors_are_server_errors() {
        let err: AppError = config::ConfigError::Message("missing server.port".into()).into();
        assert_eq!(err.code(), ErrorCode::ConfigurationError);
        assert_eq!(err.code().as_code(), 9002);
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);

        let err: AppError = anyhow::anyhow!("unexpected").into();
        assert_eq!(err.code(), ErrorCode::InternalError);
        assert!(err.is_server_error());
    }
}
