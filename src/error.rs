use axum::{Json, http::StatusCode, response::IntoResponse};
use serde::Serialize;
use sqlx::Error as SqlxError;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error as ThisError;

#[derive(Debug, ThisError)]
pub enum EdaPartsError {
    #[error("invalid path: {0}")]
    InvalidPath(String),

    #[error("invalid storable type: {0}")]
    InvalidStorableType(String),

    #[error("invalid footprint: {0}")]
    InvalidFootprintFormat(String),

    #[error("invalid symbol: {0}")]
    InvalidSymbolFormat(String),

    #[error("{message} [conflicting_id={conflicting_id}]")]
    AlreadyExists { message: String, conflicting_id: i64 },

    #[error("{message} [missing_id={missing_id}]")]
    NotFound { message: String, missing_id: i64 },

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("{0}")]
    PayloadTooLarge(String),

    #[error("timed out after {waited:?} waiting for lock {}", .path.display())]
    LockTimeout { path: PathBuf, waited: Duration },

    #[error("Ractor error: {0}")]
    RactorError(String),

    #[error("Database error: {0}")]
    DatabaseError(#[from] SqlxError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl EdaPartsError {
    pub fn already_exists(message: impl Into<String>, conflicting_id: i64) -> Self {
        Self::AlreadyExists {
            message: message.into(),
            conflicting_id,
        }
    }

    pub fn not_found(message: impl Into<String>, missing_id: i64) -> Self {
        Self::NotFound {
            message: message.into(),
            missing_id,
        }
    }

    fn code(&self) -> &'static str {
        match self {
            EdaPartsError::InvalidPath(_) => "INVALID_PATH",
            EdaPartsError::InvalidStorableType(_) => "INVALID_STORABLE_TYPE",
            EdaPartsError::InvalidFootprintFormat(_) => "INVALID_FOOTPRINT",
            EdaPartsError::InvalidSymbolFormat(_) => "INVALID_SYMBOL",
            EdaPartsError::AlreadyExists { .. } => "ALREADY_EXISTS",
            EdaPartsError::NotFound { .. } => "NOT_FOUND",
            EdaPartsError::InvalidRequest(_) => "INVALID_REQUEST",
            EdaPartsError::PayloadTooLarge(_) => "PAYLOAD_TOO_LARGE",
            EdaPartsError::LockTimeout { .. } => "LOCK_TIMEOUT",
            EdaPartsError::RactorError(_)
            | EdaPartsError::DatabaseError(_)
            | EdaPartsError::Io(_) => "INTERNAL_ERROR",
        }
    }
}

impl From<axum::extract::multipart::MultipartError> for EdaPartsError {
    fn from(e: axum::extract::multipart::MultipartError) -> Self {
        if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
            return EdaPartsError::PayloadTooLarge(e.body_text());
        }
        EdaPartsError::InvalidRequest(format!("malformed multipart body: {e}"))
    }
}

impl IntoResponse for EdaPartsError {
    fn into_response(self) -> axum::response::Response {
        let code = self.code().to_string();
        let (status, error_body) = match self {
            EdaPartsError::InvalidPath(_)
            | EdaPartsError::InvalidStorableType(_)
            | EdaPartsError::InvalidFootprintFormat(_)
            | EdaPartsError::InvalidSymbolFormat(_)
            | EdaPartsError::InvalidRequest(_) => {
                let body = ApiErrorBody::new(code, self.to_string());
                (StatusCode::BAD_REQUEST, body)
            }
            EdaPartsError::AlreadyExists {
                message,
                conflicting_id,
            } => {
                let mut body = ApiErrorBody::new(code, message);
                body.conflicting_id = Some(conflicting_id);
                (StatusCode::CONFLICT, body)
            }
            EdaPartsError::NotFound {
                message,
                missing_id,
            } => {
                let mut body = ApiErrorBody::new(code, message);
                body.missing_id = Some(missing_id);
                (StatusCode::NOT_FOUND, body)
            }
            EdaPartsError::PayloadTooLarge(_) => {
                let body = ApiErrorBody::new(code, self.to_string());
                (StatusCode::PAYLOAD_TOO_LARGE, body)
            }
            EdaPartsError::LockTimeout { .. } => {
                let body = ApiErrorBody::new(code, self.to_string());
                (StatusCode::SERVICE_UNAVAILABLE, body)
            }
            EdaPartsError::DatabaseError(_)
            | EdaPartsError::RactorError(_)
            | EdaPartsError::Io(_) => {
                let body = ApiErrorBody::new(code, "An internal server error occurred.");
                (StatusCode::INTERNAL_SERVER_ERROR, body)
            }
        };
        (status, Json(ApiErrorResponse { error: error_body })).into_response()
    }
}

/// Standardized API error response body
#[derive(Serialize)]
pub struct ApiErrorBody {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conflicting_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub missing_id: Option<i64>,
}

impl ApiErrorBody {
    fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            conflicting_id: None,
            missing_id: None,
        }
    }
}

#[derive(Serialize)]
pub struct ApiErrorResponse {
    pub error: ApiErrorBody,
}
