// Structured error responses for the ingest HTTP surface.
//
// Every error response carries the request's correlation_id so clients can
// reconcile server-side logs; internal errors return a generic message, no
// stack traces escape.

use axum::{http::StatusCode, response::IntoResponse, Json};
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
    pub code: &'static str,
    pub correlation_id: String,
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("validation error: {message}")]
    Validation { message: String, code: &'static str, correlation_id: String },
    #[error("unsupported time window")]
    UnsupportedTimeWindow { correlation_id: String },
    #[error("batch too large")]
    BatchTooLarge { correlation_id: String },
    #[error("internal error")]
    Internal { correlation_id: String },
}

impl ApiError {
    pub fn validation(message: impl Into<String>, correlation_id: impl Into<String>) -> Self {
        ApiError::Validation { message: message.into(), code: "VALIDATION_ERROR", correlation_id: correlation_id.into() }
    }

    pub fn unsupported_time_window(correlation_id: impl Into<String>) -> Self {
        ApiError::UnsupportedTimeWindow { correlation_id: correlation_id.into() }
    }

    pub fn internal(correlation_id: impl Into<String>) -> Self {
        ApiError::Internal { correlation_id: correlation_id.into() }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let (status, body) = match self {
            ApiError::Validation { message, code, correlation_id } => {
                (StatusCode::BAD_REQUEST, ErrorBody { error: message, code, correlation_id })
            }
            ApiError::UnsupportedTimeWindow { correlation_id } => (
                StatusCode::UNPROCESSABLE_ENTITY,
                ErrorBody {
                    error: "Valor de janela temporal não suportado na versão atual".to_string(),
                    code: "UNSUPPORTED_TIME_WINDOW",
                    correlation_id,
                },
            ),
            ApiError::BatchTooLarge { correlation_id } => (
                StatusCode::BAD_REQUEST,
                ErrorBody {
                    error: format!("batch exceeds the {}-item limit", crate::services::ingest_fastpath::MAX_BATCH_ITEMS),
                    code: "BATCH_LIMIT_EXCEEDED",
                    correlation_id,
                },
            ),
            ApiError::Internal { correlation_id } => (
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorBody { error: "internal error".to_string(), code: "INTERNAL_ERROR", correlation_id },
            ),
        };
        (status, Json(body)).into_response()
    }
}
