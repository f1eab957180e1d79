use crate::engine::EngineError;
use axum::extract::multipart::MultipartError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use facesearch_core::{ExtractError, MatchError};
use facesearch_store::{ObjectStoreError, StoreError};
use serde_json::json;

pub type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Invalid image: {0}")]
    InvalidImage(String),

    #[error("No face detected in the uploaded image")]
    NoFaceDetected,

    #[error("{0}")]
    Match(#[from] MatchError),

    #[error("Too many files: max {0} per request")]
    TooManyFiles(usize),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Database error: {0}")]
    Store(#[from] StoreError),

    #[error("Object storage error: {0}")]
    Objects(ObjectStoreError),

    #[error("Internal server error: {0}")]
    Internal(String),
}

impl ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) | ApiError::InvalidImage(_) => StatusCode::BAD_REQUEST,
            ApiError::Match(MatchError::DimensionMismatch { .. }) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::Match(_) => StatusCode::BAD_REQUEST,
            ApiError::NoFaceDetected => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::TooManyFiles(_) => StatusCode::PAYLOAD_TOO_LARGE,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Store(_) | ApiError::Objects(_) | ApiError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    fn error_code(&self) -> &'static str {
        match self {
            ApiError::BadRequest(_) => "BAD_REQUEST",
            ApiError::InvalidImage(_) => "INVALID_IMAGE",
            ApiError::NoFaceDetected => "NO_FACE_DETECTED",
            ApiError::Match(MatchError::DimensionMismatch { .. }) => "DIMENSION_MISMATCH",
            ApiError::Match(MatchError::InvalidThreshold(_)) => "INVALID_THRESHOLD",
            ApiError::Match(MatchError::InvalidLimit(_)) => "INVALID_LIMIT",
            ApiError::TooManyFiles(_) => "TOO_MANY_FILES",
            ApiError::NotFound(_) => "NOT_FOUND",
            ApiError::Store(_) => "DATABASE_ERROR",
            ApiError::Objects(_) => "STORAGE_ERROR",
            ApiError::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        } else {
            tracing::debug!(error = %self, status = status.as_u16(), "request rejected");
        }

        let body = Json(json!({
            "error": {
                "code": self.error_code(),
                "message": self.to_string(),
            }
        }));

        (status, body).into_response()
    }
}

impl From<EngineError> for ApiError {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::Decode(e) => ApiError::InvalidImage(e.to_string()),
            EngineError::Extract(ExtractError::NoFaceDetected) => ApiError::NoFaceDetected,
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl From<ObjectStoreError> for ApiError {
    fn from(err: ObjectStoreError) -> Self {
        match err {
            ObjectStoreError::InvalidKey(key) => ApiError::BadRequest(format!("invalid object key {key:?}")),
            ObjectStoreError::NotFound(key) => ApiError::NotFound(key),
            other => ApiError::Objects(other),
        }
    }
}

impl From<MultipartError> for ApiError {
    fn from(err: MultipartError) -> Self {
        ApiError::BadRequest(format!("malformed multipart body: {}", err.body_text()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        let cases = [
            (ApiError::Match(MatchError::InvalidThreshold(1.5)), StatusCode::BAD_REQUEST),
            (ApiError::Match(MatchError::InvalidLimit(0)), StatusCode::BAD_REQUEST),
            (
                ApiError::Match(MatchError::DimensionMismatch {
                    id: "a".into(),
                    expected: 512,
                    actual: 128,
                }),
                StatusCode::UNPROCESSABLE_ENTITY,
            ),
            (ApiError::NoFaceDetected, StatusCode::UNPROCESSABLE_ENTITY),
            (ApiError::Internal("boom".into()), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (err, status) in cases {
            assert_eq!(err.into_response().status(), status);
        }
    }

    #[test]
    fn test_engine_error_mapping() {
        let err: ApiError = EngineError::Extract(ExtractError::NoFaceDetected).into();
        assert!(matches!(err, ApiError::NoFaceDetected));
        let err: ApiError = EngineError::ChannelClosed.into();
        assert!(matches!(err, ApiError::Internal(_)));
    }

    #[test]
    fn test_object_error_mapping() {
        let err: ApiError = ObjectStoreError::NotFound("a/b.jpg".into()).into();
        assert_eq!(err.error_code(), "NOT_FOUND");
        let err: ApiError = ObjectStoreError::InvalidKey("../x".into()).into();
        assert_eq!(err.error_code(), "BAD_REQUEST");
    }
}
