use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use thiserror::Error;
use tracing::error;

/// Errors a handler can surface to the client. Every variant renders as a
/// JSON body with a human-readable message; internals never leak.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Malformed or missing input.
    #[error("{0}")]
    Validation(String),

    /// A unique resource already exists (duplicate email).
    #[error("{0}")]
    Conflict(String),

    /// Login failed. One message for both unknown email and wrong
    /// password, so the response doesn't reveal which account exists.
    #[error("Credenciais inválidas.")]
    InvalidCredentials,

    /// Missing or invalid session token.
    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    NotFound(String),

    /// Database, hashing, mail, or storage failure. Logged with context;
    /// the client only ever sees the generic server message.
    #[error(transparent)]
    Dependency(#[from] anyhow::Error),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Validation(_) | ApiError::Conflict(_) | ApiError::InvalidCredentials => {
                StatusCode::BAD_REQUEST
            }
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Dependency(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match &self {
            ApiError::Dependency(e) => {
                error!("request failed: {:#}", e);
                "Erro no servidor. Por favor, tente novamente mais tarde.".to_string()
            }
            other => other.to_string(),
        };

        (status, Json(json!({ "message": message }))).into_response()
    }
}
