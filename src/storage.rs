//! 图片存储后端：本地目录或远端 FTP，启动时二选一。

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::io::{self, Cursor};
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use suppaftp::FtpStream;
use suppaftp::types::FileType;
use thiserror::Error;
use tokio::fs;
use tracing::{debug, info};

use crate::atomic::write_new;

const MAX_EXTENSION_LEN: usize = 10;
/// 本地存储寻找空闲文件名的最大尝试次数。
const MAX_NAME_ATTEMPTS: i64 = 1000;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("invalid file name")]
    InvalidName,
    #[error("file not found")]
    NotFound,
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error("ftp error: {0}")]
    Ftp(String),
}

/// 已通过类型与大小检查、等待写入的图片。
#[derive(Debug)]
pub struct IncomingImage {
    pub original_name: Option<String>,
    pub mime: String,
    pub data: Bytes,
}

/// 已存储文件的访问方式。
#[derive(Debug, PartialEq, Eq)]
pub enum StoredObject {
    LocalFile(PathBuf),
    Remote(String),
}

#[async_trait]
pub trait UploadBackend: Send + Sync {
    /// 写入图片并返回存储文件名。
    async fn store(&self, image: IncomingImage) -> Result<String, StorageError>;

    /// 将存储文件名解析为本地路径或远端地址。
    async fn locate(&self, name: &str) -> Result<StoredObject, StorageError>;

    /// 删除已存储的文件；文件不存在视为成功。
    async fn remove(&self, name: &str) -> Result<(), StorageError>;
}

pub type SharedUploadBackend = Arc<dyn UploadBackend>;

/// 只接受 `image/*` 类型。
pub fn is_image_mime(mime: &str) -> bool {
    mime.trim().to_ascii_lowercase().starts_with("image/")
}

/// 由时间戳与原始扩展名生成存储文件名，例如 `1700000000000.png`。
pub fn stored_name_for(original_name: Option<&str>, now: DateTime<Utc>) -> String {
    let extension = original_name
        .and_then(|name| Path::new(name).extension())
        .and_then(|ext| ext.to_str())
        .filter(|ext| {
            !ext.is_empty()
                && ext.len() <= MAX_EXTENSION_LEN
                && ext.chars().all(|c| c.is_ascii_alphanumeric())
        });
    match extension {
        Some(ext) => format!("{}.{ext}", now.timestamp_millis()),
        None => now.timestamp_millis().to_string(),
    }
}

/// 存储文件名只能是单个普通路径段。
fn checked_name(name: &str) -> Result<&str, StorageError> {
    if name.is_empty() || name.starts_with('.') || name.contains(['/', '\\']) {
        return Err(StorageError::InvalidName);
    }
    let mut components = Path::new(name).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(_)), None) => Ok(name),
        _ => Err(StorageError::InvalidName),
    }
}

/// 写入本地目录的存储后端。
#[derive(Clone, Debug)]
pub struct LocalStorage {
    root: PathBuf,
}

impl LocalStorage {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    pub async fn ensure_root(&self) -> io::Result<()> {
        fs::create_dir_all(&self.root).await
    }

    fn path_for(&self, name: &str) -> Result<PathBuf, StorageError> {
        Ok(self.root.join(checked_name(name)?))
    }
}

#[async_trait]
impl UploadBackend for LocalStorage {
    async fn store(&self, image: IncomingImage) -> Result<String, StorageError> {
        let now = Utc::now();
        let original_name = image.original_name.as_deref();
        // 同一毫秒内的上传顺延到下一个空闲的文件名。
        let candidates = (0..MAX_NAME_ATTEMPTS)
            .map(|offset| stored_name_for(original_name, now + ChronoDuration::milliseconds(offset)));
        let name = write_new(&self.root, &image.data, candidates).await?;
        info!(name, bytes = image.data.len(), mime = image.mime, "image stored locally");
        Ok(name)
    }

    async fn locate(&self, name: &str) -> Result<StoredObject, StorageError> {
        let path = self.path_for(name)?;
        match fs::symlink_metadata(&path).await {
            Ok(metadata) if metadata.is_file() => Ok(StoredObject::LocalFile(path)),
            Ok(_) => Err(StorageError::NotFound),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Err(StorageError::NotFound),
            Err(err) => Err(err.into()),
        }
    }

    async fn remove(&self, name: &str) -> Result<(), StorageError> {
        let path = self.path_for(name)?;
        match fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }
}

/// FTP 连接参数。
#[derive(Clone, Debug)]
pub struct FtpSettings {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub base_path: String,
    /// 浏览器访问已上传文件时使用的地址前缀。
    pub public_url: String,
}

impl FtpSettings {
    pub fn default_public_url(host: &str, user: &str) -> String {
        format!("http://{host}/{user}")
    }
}

/// 通过 FTP 写入远端主机的存储后端。每次操作单独建立连接。
#[derive(Clone, Debug)]
pub struct FtpStorage {
    settings: FtpSettings,
}

impl FtpStorage {
    pub fn new(settings: FtpSettings) -> Self {
        Self { settings }
    }

    fn connect(settings: &FtpSettings) -> Result<FtpStream, suppaftp::FtpError> {
        let mut ftp = FtpStream::connect((settings.host.as_str(), settings.port))?;
        ftp.login(settings.user.as_str(), settings.password.as_str())?;
        ftp.cwd(settings.base_path.as_str())?;
        Ok(ftp)
    }

    async fn run_blocking<T, F>(&self, op: F) -> Result<T, StorageError>
    where
        T: Send + 'static,
        F: FnOnce(&mut FtpStream) -> Result<T, suppaftp::FtpError> + Send + 'static,
    {
        let settings = self.settings.clone();
        tokio::task::spawn_blocking(move || -> Result<T, suppaftp::FtpError> {
            let mut ftp = Self::connect(&settings)?;
            let result = op(&mut ftp)?;
            ftp.quit()?;
            Ok(result)
        })
        .await
        .map_err(|err| StorageError::Ftp(err.to_string()))?
        .map_err(|err| StorageError::Ftp(err.to_string()))
    }
}

#[async_trait]
impl UploadBackend for FtpStorage {
    async fn store(&self, image: IncomingImage) -> Result<String, StorageError> {
        let name = stored_name_for(image.original_name.as_deref(), Utc::now());
        let remote_name = name.clone();
        let size = image.data.len();
        let data = image.data;
        self.run_blocking(move |ftp| {
            ftp.transfer_type(FileType::Binary)?;
            ftp.put_file(remote_name.as_str(), &mut Cursor::new(data))
        })
        .await?;
        info!(name, bytes = size, host = self.settings.host, "image stored via ftp");
        Ok(name)
    }

    async fn locate(&self, name: &str) -> Result<StoredObject, StorageError> {
        let name = checked_name(name)?;
        let base = self.settings.public_url.trim_end_matches('/');
        Ok(StoredObject::Remote(format!("{base}/{name}")))
    }

    async fn remove(&self, name: &str) -> Result<(), StorageError> {
        let name = checked_name(name)?.to_string();
        debug!(name, "removing ftp file");
        self.run_blocking(move |ftp| ftp.rm(name.as_str())).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn image(name: &str, data: &'static [u8]) -> IncomingImage {
        IncomingImage {
            original_name: Some(name.to_string()),
            mime: "image/png".to_string(),
            data: Bytes::from_static(data),
        }
    }

    #[test]
    fn stored_name_keeps_safe_extension() {
        let now = DateTime::from_timestamp_millis(1_700_000_000_123).unwrap();
        assert_eq!(stored_name_for(Some("cat.PNG"), now), "1700000000123.PNG");
        assert_eq!(stored_name_for(Some("noext"), now), "1700000000123");
        assert_eq!(stored_name_for(Some("x.p/ng"), now), "1700000000123");
        assert_eq!(stored_name_for(None, now), "1700000000123");
    }

    #[test]
    fn mime_must_be_image() {
        assert!(is_image_mime("image/jpeg"));
        assert!(is_image_mime("Image/PNG"));
        assert!(!is_image_mime("text/plain"));
        assert!(!is_image_mime("application/octet-stream"));
    }

    #[test]
    fn names_must_be_single_segment() {
        assert!(checked_name("1700000000123.png").is_ok());
        assert!(matches!(checked_name("../etc/passwd"), Err(StorageError::InvalidName)));
        assert!(matches!(checked_name("a/b.png"), Err(StorageError::InvalidName)));
        assert!(matches!(checked_name(".hidden"), Err(StorageError::InvalidName)));
        assert!(matches!(checked_name(""), Err(StorageError::InvalidName)));
    }

    #[tokio::test]
    async fn local_store_locate_and_remove() {
        let temp = tempdir().expect("tempdir");
        let storage = LocalStorage::new(temp.path().join("images"));
        storage.ensure_root().await.expect("root");

        let first = storage.store(image("a.png", b"one")).await.expect("store");
        let second = storage.store(image("b.png", b"two")).await.expect("store");
        assert_ne!(first, second);
        assert!(first.ends_with(".png"));

        let located = storage.locate(&first).await.expect("locate");
        let StoredObject::LocalFile(path) = located else {
            panic!("expected local file");
        };
        assert_eq!(std::fs::read(path).expect("read"), b"one");

        storage.remove(&first).await.expect("remove");
        assert!(matches!(storage.locate(&first).await, Err(StorageError::NotFound)));
        storage.remove(&first).await.expect("remove is idempotent");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 8)]
    async fn concurrent_stores_get_distinct_files() {
        let temp = tempdir().expect("tempdir");
        let storage = Arc::new(LocalStorage::new(temp.path().to_path_buf()));

        for round in 0..20 {
            let tasks: Vec<_> = (0..16)
                .map(|index| {
                    let storage = storage.clone();
                    let data = Bytes::from(format!("round-{round}-image-{index}"));
                    tokio::spawn(async move {
                        let name = storage
                            .store(IncomingImage {
                                original_name: Some("a.png".into()),
                                mime: "image/png".into(),
                                data: data.clone(),
                            })
                            .await
                            .expect("store");
                        (name, data)
                    })
                })
                .collect();

            let mut names = std::collections::HashSet::new();
            for task in tasks {
                let (name, data) = task.await.expect("join");
                let StoredObject::LocalFile(path) = storage.locate(&name).await.expect("locate")
                else {
                    panic!("expected local file");
                };
                assert_eq!(std::fs::read(path).expect("read"), data.as_ref());
                assert!(names.insert(name), "stored name reused in round {round}");
            }
        }
        let entries = std::fs::read_dir(temp.path()).expect("read dir").count();
        assert_eq!(entries, 20 * 16);
    }

    #[tokio::test]
    async fn ftp_locate_builds_public_url() {
        let storage = FtpStorage::new(FtpSettings {
            host: "ftp.example.com".into(),
            port: 21,
            user: "album".into(),
            password: String::new(),
            base_path: "/".into(),
            public_url: FtpSettings::default_public_url("ftp.example.com", "album"),
        });
        assert_eq!(
            storage.locate("1.png").await.expect("locate"),
            StoredObject::Remote("http://ftp.example.com/album/1.png".into())
        );
        assert!(storage.locate("../1.png").await.is_err());
    }
}
