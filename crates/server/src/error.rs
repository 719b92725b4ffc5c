use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use writeoff_sync::{ProviderError, SyncError};

/// Typed failure surfaced to API callers as
/// `{"error": {"code": ..., "message": ...}}`.
#[derive(Debug)]
pub enum ApiError {
    Unauthorized,
    Validation(String),
    NotFound(String),
    Conflict(String),
    ConnectionInactive,
    Provider { code: String, message: String },
    Database(sqlx::Error),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) | ApiError::ConnectionInactive => StatusCode::CONFLICT,
            ApiError::Provider { .. } => StatusCode::BAD_GATEWAY,
            ApiError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn code(&self) -> &str {
        match self {
            ApiError::Unauthorized => "UNAUTHORIZED",
            ApiError::Validation(_) => "VALIDATION_ERROR",
            ApiError::NotFound(_) => "NOT_FOUND",
            ApiError::Conflict(_) => "CONFLICT",
            ApiError::ConnectionInactive => "CONNECTION_INACTIVE",
            ApiError::Provider { .. } => "PROVIDER_ERROR",
            ApiError::Database(_) => "DATABASE_ERROR",
        }
    }

    fn message(&self) -> String {
        match self {
            ApiError::Unauthorized => "missing owner identity".to_string(),
            ApiError::Validation(m) | ApiError::NotFound(m) | ApiError::Conflict(m) => m.clone(),
            ApiError::ConnectionInactive => "connection is disconnected".to_string(),
            ApiError::Provider { code, message } => format!("{code}: {message}"),
            // Driver details stay in the logs, not in responses.
            ApiError::Database(_) => "persistence failure".to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if let ApiError::Database(ref e) = self {
            tracing::error!(error = %e, "database error surfaced to API");
        }
        let body = json!({
            "error": { "code": self.code(), "message": self.message() }
        });
        (self.status(), Json(body)).into_response()
    }
}

impl From<sqlx::Error> for ApiError {
    fn from(e: sqlx::Error) -> Self {
        ApiError::Database(e)
    }
}

impl From<SyncError> for ApiError {
    fn from(e: SyncError) -> Self {
        match e {
            SyncError::NotFound => ApiError::NotFound("connection not found".to_string()),
            SyncError::ConnectionInactive => ApiError::ConnectionInactive,
            SyncError::AlreadySyncing => {
                ApiError::Conflict("a sync for this connection is already running".to_string())
            }
            SyncError::Provider(ProviderError::Api { code, message }) => {
                ApiError::Provider { code, message }
            }
            SyncError::Provider(p) => ApiError::Provider {
                code: p.code().to_string(),
                message: p.to_string(),
            },
            SyncError::Database(e) => ApiError::Database(e),
        }
    }
}
