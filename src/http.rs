//! HTTP 辅助工具：CORS、JSON 请求体提取与客户端 IP 解析。

use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::extract::{FromRequest, Request};
use axum::http::{HeaderMap, HeaderValue};
use serde::de::DeserializeOwned;
use std::net::IpAddr;
use tower_http::cors::{AllowHeaders, AllowMethods, AllowOrigin, CorsLayer};
use tracing::warn;

use crate::error::ApiError;

/// 构建 CORS Layer：允许全部来源，或使用逗号分隔的来源列表。
///
/// 前端以 `withCredentials` 访问，因此来源、方法与请求头都回显请求值而不使用 `*`。
pub fn build_cors_layer(allow_all: bool, cors_origins: Option<&str>) -> Option<CorsLayer> {
    let allow_origin = if allow_all {
        AllowOrigin::mirror_request()
    } else {
        let origins = cors_origins?
            .split(',')
            .map(|origin| origin.trim())
            .filter(|origin| !origin.is_empty())
            .filter_map(|origin| match HeaderValue::from_str(origin) {
                Ok(value) => Some(value),
                Err(_) => {
                    warn!(origin, "invalid cors origin");
                    None
                }
            })
            .collect::<Vec<_>>();
        if origins.is_empty() {
            return None;
        }
        AllowOrigin::list(origins)
    };

    Some(
        CorsLayer::new()
            .allow_origin(allow_origin)
            .allow_methods(AllowMethods::mirror_request())
            .allow_headers(AllowHeaders::mirror_request())
            .allow_credentials(true),
    )
}

/// JSON 请求体；内容类型或格式不符时返回信封格式的 400。
pub struct JsonBody<T>(pub T);

impl<S, T> FromRequest<S> for JsonBody<T>
where
    S: Send + Sync,
    T: DeserializeOwned,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(JsonBody(value)),
            Err(JsonRejection::MissingJsonContentType(_)) => Err(ApiError::invalid_format()),
            Err(JsonRejection::JsonDataError(err)) => Err(ApiError::BadRequest(err.body_text())),
            Err(rejection) => {
                warn!(rejection = %rejection, "rejected json body");
                Err(ApiError::invalid_format())
            }
        }
    }
}

/// 从 `x-forwarded-for` 解析客户端 IP。
pub fn extract_forwarded_ip(headers: &HeaderMap) -> Option<IpAddr> {
    headers
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .and_then(|value| value.parse::<IpAddr>().ok())
}

/// 综合转发头与连接信息计算客户端 IP。
pub fn resolve_client_ip(headers: &HeaderMap, connect_ip: Option<IpAddr>) -> Option<IpAddr> {
    extract_forwarded_ip(headers).or(connect_ip)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cors_disabled_without_origins() {
        assert!(build_cors_layer(false, None).is_none());
        assert!(build_cors_layer(false, Some(" , ")).is_none());
        assert!(build_cors_layer(false, Some("https://example.github.io")).is_some());
        assert!(build_cors_layer(true, None).is_some());
    }

    #[test]
    fn forwarded_ip_takes_first_hop() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", HeaderValue::from_static("10.0.0.1, 10.0.0.2"));
        let fallback: IpAddr = "127.0.0.1".parse().unwrap();
        assert_eq!(
            resolve_client_ip(&headers, Some(fallback)),
            Some("10.0.0.1".parse().unwrap())
        );
        assert_eq!(resolve_client_ip(&HeaderMap::new(), Some(fallback)), Some(fallback));
    }
}
