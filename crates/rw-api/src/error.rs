use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

#[derive(Debug)]
pub enum ApiError {
    InvalidDuration(String),
    NotFound(String),
    Storage(rw_storage::StorageError),
}

impl From<rw_storage::StorageError> for ApiError {
    fn from(err: rw_storage::StorageError) -> Self {
        ApiError::Storage(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::InvalidDuration(d) => {
                (StatusCode::BAD_REQUEST, format!("invalid duration literal: {d}")).into_response()
            }
            ApiError::NotFound(what) => (StatusCode::NOT_FOUND, what).into_response(),
            ApiError::Storage(err) => {
                tracing::warn!(error = %err, "storage query failed");
                (StatusCode::INTERNAL_SERVER_ERROR, "storage query failed").into_response()
            }
        }
    }
}
