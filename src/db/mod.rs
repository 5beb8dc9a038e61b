//! 文档存储抽象：账号、相片记录与会话三个集合。

mod memory;
mod mongo;

pub use memory::MemoryStore;
pub use mongo::{CollectionNames, MongoStore};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use thiserror::Error;

use crate::models::{
    Account, FilePatch, FileRecord, InvalidRecordId, NewFileRecord, RecordId, SessionRecord,
    ValidationError,
};

pub type StoreResult<T> = Result<T, StoreError>;

/// 持久化层错误。
#[derive(Debug, Error)]
pub enum StoreError {
    /// 字段校验失败，只报告第一个失败的字段。
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// 标识符不是合法的存储 id。
    #[error(transparent)]
    InvalidId(#[from] InvalidRecordId),

    /// MongoDB 驱动错误。
    #[error("database error: {0}")]
    Database(#[from] mongodb::error::Error),
}

/// 账号与相片记录的持久化操作。
#[async_trait]
pub trait AlbumStore: Send + Sync {
    /// 创建账号；账号重复时返回校验错误。
    async fn create_account(&self, account: Account) -> StoreResult<Account>;

    async fn find_account(&self, account: &str) -> StoreResult<Option<Account>>;

    async fn create_file(&self, file: NewFileRecord) -> StoreResult<FileRecord>;

    async fn find_file(&self, id: RecordId) -> StoreResult<Option<FileRecord>>;

    /// 按创建顺序列出某个用户的全部相片。
    async fn list_files(&self, owner: &str) -> StoreResult<Vec<FileRecord>>;

    /// 更新后返回新记录；记录不存在时返回 `None`。
    async fn update_file(&self, id: RecordId, patch: FilePatch)
    -> StoreResult<Option<FileRecord>>;

    /// 删除并返回被删除的记录。
    async fn delete_file(&self, id: RecordId) -> StoreResult<Option<FileRecord>>;
}

/// 会话集合的持久化操作。
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// 读取未过期的会话。
    async fn load_session(&self, id: &str, now: DateTime<Utc>)
    -> StoreResult<Option<SessionRecord>>;

    /// 插入或覆盖会话。
    async fn save_session(&self, record: &SessionRecord) -> StoreResult<()>;

    async fn destroy_session(&self, id: &str) -> StoreResult<()>;

    /// 删除所有已过期会话，返回删除数量。
    async fn prune_sessions(&self, now: DateTime<Utc>) -> StoreResult<u64>;
}

pub type SharedAlbumStore = Arc<dyn AlbumStore>;
pub type SharedSessionStore = Arc<dyn SessionStore>;

/// 根据配置选择 MongoDB 或内存存储。
pub async fn open_store(
    mongo_uri: Option<&str>,
    names: CollectionNames,
) -> StoreResult<(SharedAlbumStore, SharedSessionStore)> {
    match mongo_uri {
        Some(uri) => {
            let store = Arc::new(MongoStore::connect(uri, names).await?);
            let album: SharedAlbumStore = store.clone();
            let sessions: SharedSessionStore = store;
            Ok((album, sessions))
        }
        None => {
            let store = Arc::new(MemoryStore::new());
            let album: SharedAlbumStore = store.clone();
            let sessions: SharedSessionStore = store;
            Ok((album, sessions))
        }
    }
}
