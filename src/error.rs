//! Error types shared by the services.
//!
//! Pipelines return `anyhow::Result`. Two typed errors sit at the
//! boundaries:
//!
//! - [`ProviderError`] for failures talking to OpenAI, Pinecone, or a
//!   downstream RAG service.
//! - [`AppError`] for HTTP responses. Every error response has the same
//!   body:
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "query must not be empty" } }
//! ```
//!
//! Error codes: `bad_request` (400), `unprocessable` (422), `internal` (500).

use axum::{
    extract::multipart::{MultipartError, MultipartRejection},
    extract::rejection::{JsonRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};

/// Failure calling an external API or another RAG service.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("{0} API key not configured")]
    MissingApiKey(&'static str),

    #[error("{service} error {status}: {body}")]
    Api {
        service: &'static str,
        status: u16,
        body: String,
    },

    #[error("{service} request failed: {source}")]
    Network {
        service: &'static str,
        #[source]
        source: reqwest::Error,
    },

    #[error("invalid {service} response: {message}")]
    InvalidResponse {
        service: &'static str,
        message: String,
    },
}

impl ProviderError {
    /// Whether a retry may succeed: rate limits, server errors and
    /// transport failures.
    pub fn is_retryable(&self) -> bool {
        match self {
            ProviderError::Api { status, .. } => *status == 429 || *status >= 500,
            ProviderError::Network { .. } => true,
            _ => false,
        }
    }
}

/// JSON error response body.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: ErrorDetail,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorDetail {
    /// Machine-readable error code (e.g. `"bad_request"`).
    pub code: String,
    pub message: String,
}

/// Error type that converts into an Axum HTTP response.
#[derive(Debug)]
pub struct AppError {
    pub status: StatusCode,
    pub code: &'static str,
    pub message: String,
}

impl AppError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            code: "bad_request",
            message: message.into(),
        }
    }

    pub fn unprocessable(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::UNPROCESSABLE_ENTITY,
            code: "unprocessable",
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            code: "internal",
            message: message.into(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code.to_string(),
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        if rejection.status() == StatusCode::UNPROCESSABLE_ENTITY {
            Self::unprocessable(rejection.body_text())
        } else {
            Self {
                status: rejection.status(),
                code: "bad_request",
                message: rejection.body_text(),
            }
        }
    }
}

impl From<QueryRejection> for AppError {
    fn from(rejection: QueryRejection) -> Self {
        Self::bad_request(rejection.body_text())
    }
}

impl From<MultipartRejection> for AppError {
    fn from(rejection: MultipartRejection) -> Self {
        Self::bad_request(rejection.body_text())
    }
}

/// Keeps the multipart status so an oversized upload stays a 413.
impl From<MultipartError> for AppError {
    fn from(err: MultipartError) -> Self {
        Self {
            status: err.status(),
            code: "bad_request",
            message: err.body_text(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        let rate_limited = ProviderError::Api {
            service: "OpenAI",
            status: 429,
            body: String::new(),
        };
        let server = ProviderError::Api {
            service: "OpenAI",
            status: 503,
            body: String::new(),
        };
        let client = ProviderError::Api {
            service: "OpenAI",
            status: 401,
            body: "bad key".into(),
        };
        assert!(rate_limited.is_retryable());
        assert!(server.is_retryable());
        assert!(!client.is_retryable());
        assert!(!ProviderError::MissingApiKey("OpenAI").is_retryable());
    }

    #[test]
    fn test_error_display() {
        let err = ProviderError::Api {
            service: "Pinecone",
            status: 404,
            body: "index not found".into(),
        };
        assert_eq!(err.to_string(), "Pinecone error 404: index not found");
    }

    #[test]
    fn test_app_error_status() {
        let resp = AppError::internal("retrieval down").into_response();
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let resp = AppError::bad_request("no file").into_response();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }
}
