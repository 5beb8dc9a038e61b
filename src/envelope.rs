//! 统一的 JSON 响应外壳 `{ success, message, ...extra }`。

use axum::Json;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

/// 没有附加字段时使用的占位结构。
#[derive(Debug, Default, Serialize)]
pub struct NoExtra {}

#[derive(Debug, Serialize)]
pub struct Envelope<T: Serialize = NoExtra> {
    success: bool,
    message: String,
    #[serde(flatten)]
    extra: T,
}

impl Envelope {
    pub fn ok() -> Self {
        Self::ok_with(NoExtra {})
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            extra: NoExtra {},
        }
    }
}

impl<T: Serialize> Envelope<T> {
    pub fn ok_with(extra: T) -> Self {
        Self {
            success: true,
            message: String::new(),
            extra,
        }
    }
}

impl<T: Serialize> IntoResponse for Envelope<T> {
    fn into_response(self) -> Response {
        Json(self).into_response()
    }
}

/// 携带 `result` 字段的成功响应。
#[derive(Debug, Serialize)]
pub struct WithResult<T: Serialize> {
    pub result: T,
}
