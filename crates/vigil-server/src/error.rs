//! HTTP error mapping.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

use vigil_registry::RegistryError;

/// Server-surface failures, mapped onto HTTP statuses.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// A registry operation failed.
    #[error(transparent)]
    Registry(#[from] RegistryError),
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            Self::Registry(RegistryError::UnknownSession(_)) => {
                (StatusCode::NOT_FOUND, self.to_string())
            }
            Self::Registry(RegistryError::IllegalTransition { .. }) => {
                (StatusCode::CONFLICT, self.to_string())
            }
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}
