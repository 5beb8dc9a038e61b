//! 统一的 API 错误类型，以及存储层错误到状态码的映射。

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use tracing::error;

use crate::db::StoreError;
use crate::envelope::Envelope;
use crate::models::ValidationError;
use crate::storage::StorageError;

pub const INVALID_FORMAT: &str = "invalid format";
pub const NOT_LOGGED_IN: &str = "not logged in";
pub const PERMISSION_DENIED: &str = "permission denied";
pub const SERVER_ERROR: &str = "server error";
pub const INVALID_ID: &str = "invalid id";

#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    Unauthorized,
    Forbidden,
    NotFound(String),
    /// 详情只写日志，响应中使用通用文案。
    Internal(String),
}

impl ApiError {
    pub fn invalid_format() -> Self {
        ApiError::BadRequest(INVALID_FORMAT.into())
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden => StatusCode::FORBIDDEN,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match self {
            ApiError::BadRequest(msg) | ApiError::NotFound(msg) => msg,
            ApiError::Unauthorized => NOT_LOGGED_IN.into(),
            ApiError::Forbidden => PERMISSION_DENIED.into(),
            ApiError::Internal(detail) => {
                error!(detail, "request failed");
                SERVER_ERROR.into()
            }
        };
        (status, Envelope::failure(message)).into_response()
    }
}

impl From<ValidationError> for ApiError {
    fn from(error: ValidationError) -> Self {
        ApiError::BadRequest(error.message)
    }
}

impl From<StoreError> for ApiError {
    fn from(error: StoreError) -> Self {
        match error {
            StoreError::Validation(err) => err.into(),
            StoreError::InvalidId(_) => ApiError::BadRequest(INVALID_ID.into()),
            StoreError::Database(err) => ApiError::Internal(err.to_string()),
        }
    }
}

impl From<StorageError> for ApiError {
    fn from(error: StorageError) -> Self {
        match error {
            StorageError::InvalidName => ApiError::BadRequest("invalid file name".into()),
            StorageError::NotFound => ApiError::NotFound("image not found".into()),
            StorageError::Io(err) => ApiError::Internal(err.to_string()),
            StorageError::Ftp(detail) => ApiError::Internal(detail),
        }
    }
}
