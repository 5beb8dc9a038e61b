//! 路由表与依赖注入。

use axum::extract::{DefaultBodyLimit, Extension};
use axum::http::StatusCode;
use axum::routing::{delete, get, post};
use axum::{Router, middleware};
use std::sync::Arc;

use crate::db::{SharedAlbumStore, SharedSessionStore};
use crate::envelope::Envelope;
use crate::session::{SessionConfig, session_middleware};
use crate::storage::SharedUploadBackend;
use crate::upload::UploadConfig;
use crate::{auth, files, upload, version};

/// 处理器共享的依赖。
#[derive(Clone)]
pub struct AppContext {
    pub store: SharedAlbumStore,
    pub sessions: SharedSessionStore,
    pub backend: SharedUploadBackend,
    pub session_config: Arc<SessionConfig>,
    pub upload_config: Arc<UploadConfig>,
}

/// 构建 API 路由（不含 CORS、日志与前端静态资源）。
pub fn build_router(ctx: AppContext) -> Router {
    let body_limit = ctx.upload_config.body_limit();
    Router::new()
        .route("/users", post(auth::register))
        .route("/login", post(auth::login))
        .route("/logout", delete(auth::logout))
        .route("/heartbeat", get(auth::heartbeat))
        .route(
            "/file",
            post(upload::upload_file).layer(DefaultBodyLimit::max(body_limit)),
        )
        .route(
            "/file/{key}",
            get(files::serve_file)
                .delete(files::delete_file)
                .patch(files::update_file),
        )
        .route("/album/{user}", get(files::list_album))
        .route("/version", get(version::get_version_info))
        .fallback(not_found)
        .method_not_allowed_fallback(method_not_allowed)
        .layer(middleware::from_fn(session_middleware))
        .layer(Extension(ctx.store))
        .layer(Extension(ctx.sessions))
        .layer(Extension(ctx.backend))
        .layer(Extension(ctx.session_config))
        .layer(Extension(ctx.upload_config))
}

async fn not_found() -> (StatusCode, Envelope) {
    (StatusCode::NOT_FOUND, Envelope::failure("not found"))
}

async fn method_not_allowed() -> (StatusCode, Envelope) {
    (
        StatusCode::METHOD_NOT_ALLOWED,
        Envelope::failure("method not allowed"),
    )
}
