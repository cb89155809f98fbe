//! Handler error type and its HTTP mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use stagewatch_normalize::NormalizeError;
use stagewatch_storage::StorageError;

use super::json_error;

#[derive(Debug, thiserror::Error)]
pub(crate) enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Normalize(#[from] NormalizeError),

    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) | ApiError::Normalize(_) => StatusCode::BAD_REQUEST,
            ApiError::Storage(StorageError::JobNotFound { .. }) => StatusCode::NOT_FOUND,
            ApiError::Storage(StorageError::AlreadyExists { .. }) => StatusCode::CONFLICT,
            ApiError::Storage(_) | ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<std::io::Error> for ApiError {
    fn from(err: std::io::Error) -> Self {
        ApiError::Internal(format!("I/O error: {}", err))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        } else {
            tracing::debug!(error = %self, %status, "request rejected");
        }
        json_error(status, &self.to_string()).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_job_maps_to_404() {
        let err = ApiError::from(StorageError::not_found("proj_x"));
        assert_eq!(err.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn rejected_upload_maps_to_400() {
        let err = ApiError::from(NormalizeError::MissingExtension("x".into()));
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn bundle_failure_maps_to_500() {
        let err = ApiError::from(StorageError::Bundle {
            project_id: "proj_x".into(),
            message: "zip".into(),
        });
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
