use axum::{
    extract::rejection::{JsonRejection, PathRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde_json::json;

use crate::services::storage::StorageError;

/// Numeric error codes carried in every failure envelope.
pub mod codes {
    pub const VALIDATION: i32 = 30001;
    pub const DATABASE: i32 = 30008;
    pub const INTERNAL: i32 = 30000;
    pub const UNAUTHENTICATED: i32 = 31501;
    pub const UPLOAD_DENIED: i32 = 36100;
    pub const FILE_NOT_FOUND: i32 = 37600;
    pub const FILE_DISABLED: i32 = 37601;
    pub const NOT_UPLOADER: i32 = 37602;
    pub const UPLOAD_CREDENTIAL: i32 = 32104;
    pub const URL_DERIVATION: i32 = 32105;
    pub const DELETE_FAILED: i32 = 21006;
}

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("database error: {0}")]
    Database(#[from] sea_orm::DbErr),
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    Unauthorized(String),
    #[error("{0}")]
    Authorization(String),
    #[error("{message}")]
    Forbidden { code: i32, message: String },
    #[error("{message}")]
    NotFound { code: i32, message: String },
    #[error("{message}: {source}")]
    StorageBackend {
        code: i32,
        message: String,
        #[source]
        source: StorageError,
    },
    #[error("{0}")]
    Internal(String),
}

impl AppError {
    pub fn file_not_found() -> Self {
        AppError::NotFound {
            code: codes::FILE_NOT_FOUND,
            message: "File not found".to_string(),
        }
    }

    pub fn file_disabled() -> Self {
        AppError::Forbidden {
            code: codes::FILE_DISABLED,
            message: "File is disabled".to_string(),
        }
    }

    pub fn not_uploader() -> Self {
        AppError::Forbidden {
            code: codes::NOT_UPLOADER,
            message: "File does not belong to the current user".to_string(),
        }
    }

    pub fn upload_credential(source: StorageError) -> Self {
        AppError::StorageBackend {
            code: codes::UPLOAD_CREDENTIAL,
            message: "Failed to issue upload credential".to_string(),
            source,
        }
    }

    pub fn url_derivation(source: StorageError) -> Self {
        AppError::StorageBackend {
            code: codes::URL_DERIVATION,
            message: "Failed to derive file URL".to_string(),
            source,
        }
    }

    pub fn delete_failed(source: StorageError) -> Self {
        AppError::StorageBackend {
            code: codes::DELETE_FAILED,
            message: "Failed to delete stored object".to_string(),
            source,
        }
    }

    pub fn code(&self) -> i32 {
        match self {
            AppError::Database(_) => codes::DATABASE,
            AppError::Validation(_) => codes::VALIDATION,
            AppError::Unauthorized(_) => codes::UNAUTHENTICATED,
            AppError::Authorization(_) => codes::UPLOAD_DENIED,
            AppError::NotFound { code, .. }
            | AppError::Forbidden { code, .. }
            | AppError::StorageBackend { code, .. } => *code,
            AppError::Internal(_) => codes::INTERNAL,
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Database(_) | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::Authorization(_) | AppError::Forbidden { .. } => StatusCode::FORBIDDEN,
            AppError::NotFound { .. } => StatusCode::NOT_FOUND,
            AppError::StorageBackend { .. } => StatusCode::BAD_GATEWAY,
        }
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::Validation(rejection.body_text())
    }
}

impl From<QueryRejection> for AppError {
    fn from(rejection: QueryRejection) -> Self {
        AppError::Validation(rejection.body_text())
    }
}

impl From<PathRejection> for AppError {
    fn from(rejection: PathRejection) -> Self {
        AppError::Validation(rejection.body_text())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let code = self.code();
        let message = match &self {
            AppError::Database(e) => {
                tracing::error!(error = %e, "database error");
                "Internal server error".to_string()
            }
            AppError::Internal(msg) => {
                tracing::error!(error = %msg, "internal server error");
                "Internal server error".to_string()
            }
            AppError::StorageBackend {
                message, source, ..
            } => {
                tracing::warn!(code, error = %source, "{message}");
                message.clone()
            }
            other => other.to_string(),
        };

        let body = Json(json!({
            "code": code,
            "message": message,
        }));

        (status, body).into_response()
    }
}
