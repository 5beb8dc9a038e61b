//! 先写临时文件再发布，避免读到写了一半的图片，也不会覆盖已有文件。

use std::io;
use std::path::{Path, PathBuf};
use tokio::fs::{self, File};
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

/// 将 `data` 写入 `dir`，发布为 `names` 中第一个尚未被占用的文件名。
///
/// 发布使用硬链接，目标已存在时返回 `AlreadyExists` 而不是覆盖，
/// 因此并发写入不会拿到同一个文件名。候选名耗尽时返回 `AlreadyExists`。
pub async fn write_new<I>(dir: &Path, data: &[u8], names: I) -> io::Result<String>
where
    I: IntoIterator<Item = String>,
{
    let temp_path = dir.join(format!(".upload.tmp.{}", Uuid::new_v4()));
    let result = async {
        let mut file = File::create(&temp_path).await?;
        file.write_all(data).await?;
        file.sync_all().await?;
        drop(file);
        publish(&temp_path, dir, names).await
    }
    .await;

    let _ = fs::remove_file(&temp_path).await;
    let name = result?;
    let _ = sync_dir(dir).await;
    Ok(name)
}

async fn publish<I>(temp_path: &Path, dir: &Path, names: I) -> io::Result<String>
where
    I: IntoIterator<Item = String>,
{
    for name in names {
        match fs::hard_link(temp_path, dir.join(&name)).await {
            Ok(()) => return Ok(name),
            Err(err) if err.kind() == io::ErrorKind::AlreadyExists => continue,
            Err(err) => return Err(err),
        }
    }
    Err(io::Error::new(
        io::ErrorKind::AlreadyExists,
        "no free file name available",
    ))
}

async fn sync_dir(path: &Path) -> io::Result<()> {
    let path: PathBuf = path.to_path_buf();
    tokio::task::spawn_blocking(move || {
        let dir = std::fs::File::open(path)?;
        dir.sync_all()
    })
    .await
    .map_err(|err| io::Error::other(err.to_string()))?
}
