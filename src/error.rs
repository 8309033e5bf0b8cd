use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("Poll {0} no longer exists")]
    Missing(Uuid),
    #[error("Store call timed out after {0:?}")]
    Timeout(Duration),
}

#[derive(Error, Debug)]
pub enum PollError {
    #[error("Poll not found")]
    NotFound,
    #[error("Invalid option: {0}")]
    InvalidOption(String),
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl IntoResponse for PollError {
    fn into_response(self) -> Response {
        let (status, error_message) = match &self {
            PollError::NotFound => (StatusCode::NOT_FOUND, "Poll not found"),
            PollError::InvalidOption(_) => (StatusCode::BAD_REQUEST, "Option not found"),
            PollError::InvalidRequest(_) => (StatusCode::BAD_REQUEST, "Invalid request"),
            PollError::Store(_) => (StatusCode::INTERNAL_SERVER_ERROR, "Store error"),
        };

        if let PollError::Store(e) = &self {
            error!("poll store failure: {}", e);
        }

        let body = Json(json!({
            "error": error_message,
            "details": self.to_string()
        }));

        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn errors_map_to_distinct_statuses() {
        assert_eq!(
            PollError::NotFound.into_response().status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            PollError::InvalidOption("green".into())
                .into_response()
                .status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            PollError::Store(StoreError::Timeout(Duration::from_secs(5)))
                .into_response()
                .status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
