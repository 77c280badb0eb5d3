//! Error types for the server

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::error::ChurnflowError;

#[derive(Error, Debug)]
pub enum ServerError {
    #[error("Invalid request: {0}")]
    BadRequest(String),

    #[error("Service unavailable: {0}")]
    Unavailable(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<ChurnflowError> for ServerError {
    fn from(err: ChurnflowError) -> Self {
        match err.root_cause() {
            ChurnflowError::ModelNotLoaded => ServerError::Unavailable(err.to_string()),
            ChurnflowError::InvalidInput(_)
            | ChurnflowError::FeatureNotFound(_)
            | ChurnflowError::DataError(_)
            | ChurnflowError::ShapeError { .. } => ServerError::BadRequest(err.to_string()),
            _ => ServerError::Internal(err.to_string()),
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            ServerError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            ServerError::Unavailable(msg) => (StatusCode::SERVICE_UNAVAILABLE, msg.clone()),
            ServerError::Internal(msg) => {
                tracing::error!(detail = %msg, "Internal server error");
                (StatusCode::INTERNAL_SERVER_ERROR, "An internal error occurred".to_string())
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
        let unavailable = ServerError::from(ChurnflowError::ModelNotLoaded);
        assert_eq!(unavailable.into_response().status(), StatusCode::SERVICE_UNAVAILABLE);

        let bad = ServerError::from(ChurnflowError::InvalidInput("no records".into()));
        assert_eq!(bad.into_response().status(), StatusCode::BAD_REQUEST);

        let internal = ServerError::from(ChurnflowError::StorageError("disk".into()));
        assert_eq!(internal.into_response().status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
