use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

use crate::dispatch::DispatchError;
use crate::service::ServiceError;
use crate::store::StoreError;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Authentication error: {0}")]
    Auth(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Template error: {0}")]
    Template(String),

    #[error("Email provider error: {0}")]
    Upstream(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<ServiceError> for AppError {
    fn from(e: ServiceError) -> Self {
        match &e {
            ServiceError::Store(StoreError::FolderExists { .. }) => {
                AppError::Conflict(e.to_string())
            }
            ServiceError::Store(StoreError::FolderNotFound(_))
            | ServiceError::Store(StoreError::EmailNotFound(_)) => {
                AppError::NotFound(e.to_string())
            }
            ServiceError::Store(StoreError::Storage(inner)) => {
                AppError::Storage(inner.to_string())
            }
            ServiceError::Template(inner) => AppError::Template(inner.to_string()),
            ServiceError::Dispatch(DispatchError::Storage(inner)) => {
                AppError::Storage(inner.to_string())
            }
            ServiceError::Dispatch(inner) => AppError::Upstream(inner.to_string()),
            ServiceError::Cancelled => AppError::Internal(e.to_string()),
        }
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::Validation(rejection.body_text())
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: ErrorBody,
}

#[derive(Serialize)]
struct ErrorBody {
    code: String,
    message: String,
}

/// Check if running in production mode (based on RUN_MODE env var)
fn is_production() -> bool {
    std::env::var("RUN_MODE")
        .map(|m| m == "production" || m == "prod")
        .unwrap_or(false)
}

fn masked(detail: &str, public: &str) -> String {
    if is_production() {
        public.to_string()
    } else {
        detail.to_string()
    }
}

impl AppError {
    fn parts(&self) -> (StatusCode, &'static str, String, String) {
        match self {
            AppError::Config(e) => {
                let log_msg = e.to_string();
                let client_msg = masked(&log_msg, "Configuration error");
                (StatusCode::INTERNAL_SERVER_ERROR, "CONFIG_ERROR", client_msg, log_msg)
            }
            AppError::Auth(msg) => (
                StatusCode::UNAUTHORIZED,
                "UNAUTHORIZED",
                msg.clone(),
                msg.clone(),
            ),
            AppError::Validation(msg) => (
                StatusCode::BAD_REQUEST,
                "VALIDATION_ERROR",
                msg.clone(),
                msg.clone(),
            ),
            AppError::NotFound(msg) => {
                (StatusCode::NOT_FOUND, "NOT_FOUND", msg.clone(), msg.clone())
            }
            AppError::Conflict(msg) => (StatusCode::CONFLICT, "CONFLICT", msg.clone(), msg.clone()),
            AppError::Template(msg) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                "TEMPLATE_ERROR",
                msg.clone(),
                msg.clone(),
            ),
            AppError::Upstream(e) => {
                let client_msg = masked(e, "Email provider unavailable");
                (StatusCode::BAD_GATEWAY, "PROVIDER_ERROR", client_msg, e.clone())
            }
            AppError::Storage(e) => {
                let client_msg = masked(e, "Service temporarily unavailable");
                (StatusCode::INTERNAL_SERVER_ERROR, "STORAGE_ERROR", client_msg, e.clone())
            }
            AppError::Internal(e) => {
                let client_msg = masked(e, "Internal server error");
                (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", client_msg, e.clone())
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, client_message, log_message) = self.parts();

        // Always log the detailed error server-side
        if status.is_server_error() {
            tracing::error!(
                code = %code,
                status = %status.as_u16(),
                message = %log_message,
                "API error"
            );
        } else {
            tracing::warn!(
                code = %code,
                status = %status.as_u16(),
                message = %log_message,
                "API request rejected"
            );
        }

        let body = ErrorResponse {
            error: ErrorBody {
                code: code.to_string(),
                message: client_message,
            },
        };

        (status, Json(body)).into_response()
    }
}

pub type Result<T> = std::result::Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::TransportError;
    use crate::render::TemplateError;

    #[test]
    fn test_service_errors_map_to_statuses() {
        let cases: Vec<(ServiceError, StatusCode)> = vec![
            (
                ServiceError::Store(StoreError::FolderExists {
                    parent_id: None,
                    name: "a".to_string(),
                }),
                StatusCode::CONFLICT,
            ),
            (
                ServiceError::Store(StoreError::FolderNotFound(1)),
                StatusCode::NOT_FOUND,
            ),
            (
                ServiceError::Store(StoreError::EmailNotFound(1)),
                StatusCode::NOT_FOUND,
            ),
            (
                ServiceError::Template(TemplateError::InvalidTemplate("x".to_string())),
                StatusCode::UNPROCESSABLE_ENTITY,
            ),
            (
                ServiceError::Dispatch(DispatchError::Transport(TransportError::Timeout)),
                StatusCode::BAD_GATEWAY,
            ),
            (ServiceError::Cancelled, StatusCode::INTERNAL_SERVER_ERROR),
        ];

        for (error, expected) in cases {
            let response = AppError::from(error).into_response();
            assert_eq!(response.status(), expected);
        }
    }

    #[tokio::test]
    async fn test_error_body_shape() {
        let response = AppError::Validation("invalid_name".to_string()).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["error"]["code"], "VALIDATION_ERROR");
        assert_eq!(json["error"]["message"], "invalid_name");
    }
}
