//! 相册服务器入口。
//!
//! 将账号、会话与相册 API 接到文档存储（MongoDB 或内存）和图片存储后端
//! （本地目录或 FTP）上，并持续服务直到收到终止信号。

mod app;
mod atomic;
mod auth;
mod background;
mod config;
mod db;
mod envelope;
mod error;
mod files;
mod http;
mod logging;
mod models;
mod session;
mod storage;
mod upload;
mod version;

use axum::extract::connect_info::ConnectInfo;
use axum::http::Request;
use axum_server::Handle;
use clap::Parser;
use shadow_rs::shadow;
use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tower_http::services::{ServeDir, ServeFile};
use tower_http::trace::{DefaultOnRequest, DefaultOnResponse, TraceLayer};
use tracing::{Level, info, info_span};

use crate::app::{AppContext, build_router};
use crate::background::spawn_background_tasks;
use crate::config::{Args, StorageKind};
use crate::db::{CollectionNames, open_store};
use crate::http::{build_cors_layer, resolve_client_ip};
use crate::session::SessionConfig;
use crate::storage::{FtpSettings, FtpStorage, LocalStorage, SharedUploadBackend};
use crate::upload::UploadConfig;

shadow!(build);

/// 启动相册服务器并阻塞直到关闭。
#[tokio::main]
async fn main() -> Result<(), std::io::Error> {
    logging::init_logging();

    let args = Args::parse();
    args.validate()?;

    let (store, sessions) = open_store(
        args.mongo_uri.as_deref(),
        CollectionNames {
            database: args.mongo_database.clone(),
            users: args.users_collection.clone(),
            files: args.files_collection.clone(),
            sessions: args.session_collection.clone(),
        },
    )
    .await
    .map_err(|err| std::io::Error::other(err.to_string()))?;
    if args.mongo_uri.is_none() {
        info!("no database configured, using in-memory store");
    }

    let backend = build_upload_backend(&args).await?;
    let ctx = AppContext {
        store,
        sessions: sessions.clone(),
        backend,
        session_config: Arc::new(SessionConfig {
            cookie_name: args.session_cookie.clone(),
            ttl: Duration::from_secs(args.session_ttl_secs),
            secure: args.secure_cookie,
        }),
        upload_config: Arc::new(UploadConfig {
            max_size: args.upload_max_size,
        }),
    };

    let mut app = build_router(ctx);
    if let Some(dir) = args.frontend_dir.as_deref() {
        let index = Path::new(dir).join("index.html");
        info!(dir, "serving frontend assets");
        app = app.fallback_service(ServeDir::new(dir).fallback(ServeFile::new(index)));
    }

    let mut app = app.layer(
        TraceLayer::new_for_http()
            .make_span_with(|request: &Request<_>| {
                let connect_ip = request
                    .extensions()
                    .get::<ConnectInfo<SocketAddr>>()
                    .map(|ConnectInfo(addr)| addr.ip());
                let client_ip = resolve_client_ip(request.headers(), connect_ip)
                    .map(|ip| ip.to_string())
                    .unwrap_or_else(|| "unknown".to_string());

                info_span!(
                    env!("CARGO_CRATE_NAME"),
                    client_ip,
                    method = ?request.method(),
                    path = ?request.uri().path(),
                )
            })
            .on_request(DefaultOnRequest::new().level(Level::DEBUG))
            .on_response(DefaultOnResponse::new().level(Level::INFO)),
    );
    if let Some(cors_layer) = build_cors_layer(args.allow_cors, args.cors_origins.as_deref()) {
        app = app.layer(cors_layer);
    }

    let host = args
        .host
        .parse::<IpAddr>()
        .map_err(|err| std::io::Error::new(std::io::ErrorKind::InvalidInput, err.to_string()))?;
    let addr = SocketAddr::new(host, args.port);
    let handle = Handle::new();

    info!("Listening on http://{}", addr);

    let server = axum_server::bind(addr)
        .handle(handle.clone())
        .serve(app.into_make_service_with_connect_info::<SocketAddr>());

    spawn_background_tasks(sessions);
    tokio::select! {
        result = server => result?,
        _ = shutdown_signal(handle) => {}
    }

    Ok(())
}

async fn build_upload_backend(args: &Args) -> Result<SharedUploadBackend, std::io::Error> {
    match args.storage {
        StorageKind::Local => {
            let storage = LocalStorage::new(PathBuf::from(&args.images_dir));
            storage.ensure_root().await?;
            info!(dir = args.images_dir, "storing images locally");
            Ok(Arc::new(storage))
        }
        StorageKind::Ftp => {
            let host = args.ftp_host.clone().unwrap_or_default();
            let user = args.ftp_user.clone().unwrap_or_default();
            let public_url = args
                .ftp_public_url
                .clone()
                .unwrap_or_else(|| FtpSettings::default_public_url(&host, &user));
            info!(host, public_url, "storing images via ftp");
            Ok(Arc::new(FtpStorage::new(FtpSettings {
                host,
                port: args.ftp_port,
                user,
                password: args.ftp_password.clone(),
                base_path: args.ftp_base_path.clone(),
                public_url,
            })))
        }
    }
}

async fn shutdown_signal(handle: Handle) {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Received termination signal shutting down");
    handle.graceful_shutdown(Some(Duration::from_secs(10)));
}
