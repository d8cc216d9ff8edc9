//! Error types for the HTTP layer

use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::error::IrisError;

#[derive(Error, Debug)]
pub enum ServerError {
    /// Body parsed but did not describe a valid input
    #[error("Unprocessable request: {0}")]
    Unprocessable(String),

    /// No route matches the request path
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Method not allowed")]
    MethodNotAllowed,

    #[error("Model error: {0}")]
    Model(#[from] IrisError),
}

impl From<JsonRejection> for ServerError {
    fn from(rejection: JsonRejection) -> Self {
        ServerError::Unprocessable(rejection.body_text())
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            ServerError::Unprocessable(msg) => (StatusCode::UNPROCESSABLE_ENTITY, msg.clone()),
            ServerError::NotFound(path) => (StatusCode::NOT_FOUND, format!("No route for {}", path)),
            ServerError::MethodNotAllowed => {
                (StatusCode::METHOD_NOT_ALLOWED, "Method not allowed.".to_string())
            }
            ServerError::Model(e @ (IrisError::ShapeError { .. } | IrisError::ValidationError(_))) => {
                (StatusCode::UNPROCESSABLE_ENTITY, e.to_string())
            }
            ServerError::Model(e @ IrisError::UnknownClass(_)) => {
                tracing::error!(detail = %e, "Model produced an unknown class");
                (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
            }
            ServerError::Model(e) => {
                tracing::error!(detail = %e, "Prediction failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Prediction failed. Check server logs for details.".to_string(),
                )
            }
        };

        let body = Json(json!({
            "error": true,
            "message": message,
        }));

        (status, body).into_response()
    }
}

pub type Result<T> = std::result::Result<T, ServerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        let status = |e: ServerError| e.into_response().status();

        assert_eq!(status(ServerError::NotFound("/x".into())), StatusCode::NOT_FOUND);
        assert_eq!(status(ServerError::MethodNotAllowed), StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(
            status(ServerError::Unprocessable("x".into())),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            status(ServerError::Model(IrisError::UnknownClass(7))),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            status(ServerError::Model(IrisError::ShapeError {
                expected: "4 features".into(),
                actual: "3".into(),
            })),
            StatusCode::UNPROCESSABLE_ENTITY
        );
    }
}
