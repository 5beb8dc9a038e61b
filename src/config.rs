//! CLI 参数、环境变量与服务默认配置。

use clap::{Parser, ValueEnum};
use shadow_rs::formatcp;
use std::io;

use crate::build;

const VERSION_INFO: &str = formatcp!(
    r#"{}\ncommit_hash: {}\nbuild_time: {}\nbuild_env: {},{}"#,
    build::PKG_VERSION,
    build::SHORT_COMMIT,
    build::BUILD_TIME,
    build::RUST_VERSION,
    build::RUST_CHANNEL
);

pub const DEFAULT_SESSION_COOKIE: &str = "album.sid";
pub const DEFAULT_SESSION_TTL_SECS: u64 = 30 * 60;
pub const DEFAULT_UPLOAD_MAX_SIZE: u64 = 1024 * 1024;
pub const DEFAULT_IMAGES_DIR: &str = "images";
pub const DEFAULT_DATABASE: &str = "album";
pub const DEFAULT_USERS_COLLECTION: &str = "users";
pub const DEFAULT_FILES_COLLECTION: &str = "files";
pub const DEFAULT_SESSION_COLLECTION: &str = "sessions";
pub const SESSION_PRUNE_INTERVAL_SECS: u64 = 300;
pub const DESCRIPTION_MAX_CHARS: usize = 200;

/// 上传文件的存放位置。
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum StorageKind {
    /// 写入本地目录。
    Local,
    /// 通过 FTP 写入远端主机。
    Ftp,
}

/// 服务器的命令行参数与环境变量配置。
#[derive(Parser, Debug)]
#[command(name = "album-server", version = VERSION_INFO, about = "Photo album server")]
pub struct Args {
    #[arg(
        short = 'b',
        long,
        env = "ALBUM_BIND",
        default_value = "0.0.0.0",
        help = "Bind address"
    )]
    pub host: String,
    #[arg(
        short = 'p',
        long,
        env = "ALBUM_PORT",
        default_value_t = 3000,
        help = "HTTP port"
    )]
    pub port: u16,
    #[arg(
        long,
        env = "ALBUM_ALLOW_CORS",
        default_value_t = false,
        help = "Allow cross-origin requests from any origin"
    )]
    pub allow_cors: bool,
    #[arg(long, env = "ALBUM_CORS_ORIGINS", help = "Comma separated CORS origins")]
    pub cors_origins: Option<String>,
    #[arg(
        long,
        env = "ALBUM_STORAGE",
        value_enum,
        default_value_t = StorageKind::Local,
        help = "Where uploaded images are written"
    )]
    pub storage: StorageKind,
    #[arg(
        long,
        env = "ALBUM_IMAGES_DIR",
        default_value = DEFAULT_IMAGES_DIR,
        help = "Directory for locally stored images"
    )]
    pub images_dir: String,
    #[arg(long, env = "ALBUM_FTP_HOST", help = "FTP host for remote storage")]
    pub ftp_host: Option<String>,
    #[arg(long, env = "ALBUM_FTP_PORT", default_value_t = 21, help = "FTP port")]
    pub ftp_port: u16,
    #[arg(long, env = "ALBUM_FTP_USER", help = "FTP user")]
    pub ftp_user: Option<String>,
    #[arg(long, env = "ALBUM_FTP_PASSWORD", default_value = "", help = "FTP password")]
    pub ftp_password: String,
    #[arg(
        long,
        env = "ALBUM_FTP_BASE_PATH",
        default_value = "/",
        help = "Remote directory for uploads"
    )]
    pub ftp_base_path: String,
    #[arg(
        long,
        env = "ALBUM_FTP_PUBLIC_URL",
        help = "Public URL prefix of uploaded files (defaults to http://<ftp host>/<ftp user>)"
    )]
    pub ftp_public_url: Option<String>,
    #[arg(
        long,
        env = "ALBUM_MONGO_URI",
        help = "MongoDB connection string (in-memory store when absent)"
    )]
    pub mongo_uri: Option<String>,
    #[arg(
        long,
        env = "ALBUM_MONGO_DATABASE",
        default_value = DEFAULT_DATABASE,
        help = "MongoDB database name"
    )]
    pub mongo_database: String,
    #[arg(
        long,
        env = "ALBUM_USERS_COLLECTION",
        default_value = DEFAULT_USERS_COLLECTION,
        help = "Collection for accounts"
    )]
    pub users_collection: String,
    #[arg(
        long,
        env = "ALBUM_FILES_COLLECTION",
        default_value = DEFAULT_FILES_COLLECTION,
        help = "Collection for file records"
    )]
    pub files_collection: String,
    #[arg(
        long,
        env = "ALBUM_SESSION_COLLECTION",
        default_value = DEFAULT_SESSION_COLLECTION,
        help = "Collection for sessions"
    )]
    pub session_collection: String,
    #[arg(
        long,
        env = "ALBUM_SESSION_TTL_SECS",
        default_value_t = DEFAULT_SESSION_TTL_SECS,
        help = "Session inactivity window in seconds"
    )]
    pub session_ttl_secs: u64,
    #[arg(
        long,
        env = "ALBUM_SESSION_COOKIE",
        default_value = DEFAULT_SESSION_COOKIE,
        help = "Session cookie name"
    )]
    pub session_cookie: String,
    #[arg(
        long,
        env = "ALBUM_SECURE_COOKIE",
        default_value_t = false,
        help = "Mark the session cookie as Secure"
    )]
    pub secure_cookie: bool,
    #[arg(
        long,
        env = "ALBUM_UPLOAD_MAX_SIZE",
        default_value_t = DEFAULT_UPLOAD_MAX_SIZE,
        help = "Max image size in bytes"
    )]
    pub upload_max_size: u64,
    #[arg(
        long,
        env = "ALBUM_FRONTEND_DIR",
        help = "Serve built frontend assets from this directory"
    )]
    pub frontend_dir: Option<String>,
}

impl Args {
    /// 启动前校验参数组合。
    pub fn validate(&self) -> io::Result<()> {
        if self.storage == StorageKind::Ftp {
            if self.ftp_host.as_deref().is_none_or(str::is_empty) {
                return Err(invalid_input("ftp storage requires --ftp-host"));
            }
            if self.ftp_user.as_deref().is_none_or(str::is_empty) {
                return Err(invalid_input("ftp storage requires --ftp-user"));
            }
        }
        if self.session_ttl_secs == 0 {
            return Err(invalid_input("session ttl must be positive"));
        }
        if self.session_cookie.trim().is_empty() {
            return Err(invalid_input("session cookie name must not be empty"));
        }
        Ok(())
    }
}

fn invalid_input(message: &str) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidInput, message.to_string())
}
