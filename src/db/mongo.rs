//! MongoDB 存储实现。

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures_util::TryStreamExt;
use mongodb::bson::{DateTime as BsonDateTime, doc, oid::ObjectId};
use mongodb::error::{ErrorKind, WriteFailure};
use mongodb::options::{IndexOptions, ReturnDocument};
use mongodb::{Client, Collection, IndexModel};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::info;

use super::{AlbumStore, SessionStore, StoreResult};
use crate::models::{
    Account, FilePatch, FileRecord, NewFileRecord, RecordId, SessionRecord, ValidationError,
};

const DUPLICATE_KEY_CODE: i32 = 11000;

/// 数据库与各集合名称。
#[derive(Clone, Debug)]
pub struct CollectionNames {
    pub database: String,
    pub users: String,
    pub files: String,
    pub sessions: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct AccountDocument {
    account: String,
    password: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct FileDocument {
    #[serde(rename = "_id")]
    id: ObjectId,
    user: String,
    description: String,
    name: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct SessionDocument {
    #[serde(rename = "_id")]
    id: String,
    account: Option<String>,
    expires: BsonDateTime,
}

impl From<AccountDocument> for Account {
    fn from(doc: AccountDocument) -> Self {
        Self {
            account: doc.account,
            password: doc.password,
        }
    }
}

impl From<FileDocument> for FileRecord {
    fn from(doc: FileDocument) -> Self {
        Self {
            id: RecordId::from(doc.id),
            owner: doc.user,
            description: doc.description,
            stored_name: doc.name,
        }
    }
}

impl From<&FileRecord> for FileDocument {
    fn from(record: &FileRecord) -> Self {
        Self {
            id: record.id.object_id(),
            user: record.owner.clone(),
            description: record.description.clone(),
            name: record.stored_name.clone(),
        }
    }
}

impl From<SessionDocument> for SessionRecord {
    fn from(doc: SessionDocument) -> Self {
        Self {
            id: doc.id,
            account: doc.account,
            expires: to_chrono(doc.expires),
        }
    }
}

fn to_bson(value: DateTime<Utc>) -> BsonDateTime {
    BsonDateTime::from_millis(value.timestamp_millis())
}

fn to_chrono(value: BsonDateTime) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(value.timestamp_millis()).unwrap_or(DateTime::UNIX_EPOCH)
}

fn is_duplicate_key(err: &mongodb::error::Error) -> bool {
    matches!(
        err.kind.as_ref(),
        ErrorKind::Write(WriteFailure::WriteError(write_error))
            if write_error.code == DUPLICATE_KEY_CODE
    )
}

#[derive(Clone, Debug)]
pub struct MongoStore {
    users: Collection<AccountDocument>,
    files: Collection<FileDocument>,
    sessions: Collection<SessionDocument>,
}

impl MongoStore {
    /// 连接数据库并确保索引存在。
    pub async fn connect(uri: &str, names: CollectionNames) -> StoreResult<Self> {
        let client = Client::with_uri_str(uri).await?;
        let database = client.database(&names.database);
        let store = Self {
            users: database.collection(&names.users),
            files: database.collection(&names.files),
            sessions: database.collection(&names.sessions),
        };
        store.ensure_indexes().await?;
        info!(database = names.database, "connected to mongodb");
        Ok(store)
    }

    async fn ensure_indexes(&self) -> StoreResult<()> {
        self.users
            .create_index(
                IndexModel::builder()
                    .keys(doc! { "account": 1 })
                    .options(IndexOptions::builder().unique(true).build())
                    .build(),
            )
            .await?;
        self.files
            .create_index(IndexModel::builder().keys(doc! { "user": 1 }).build())
            .await?;
        // 由服务端按 expires 字段自动清理过期会话。
        self.sessions
            .create_index(
                IndexModel::builder()
                    .keys(doc! { "expires": 1 })
                    .options(
                        IndexOptions::builder()
                            .expire_after(Duration::from_secs(0))
                            .build(),
                    )
                    .build(),
            )
            .await?;
        Ok(())
    }
}

#[async_trait]
impl AlbumStore for MongoStore {
    async fn create_account(&self, account: Account) -> StoreResult<Account> {
        account.validate()?;
        let document = AccountDocument {
            account: account.account.clone(),
            password: account.password.clone(),
        };
        match self.users.insert_one(document).await {
            Ok(_) => Ok(account),
            Err(err) if is_duplicate_key(&err) => {
                Err(ValidationError::new("account", "account already exists").into())
            }
            Err(err) => Err(err.into()),
        }
    }

    async fn find_account(&self, account: &str) -> StoreResult<Option<Account>> {
        let found = self.users.find_one(doc! { "account": account }).await?;
        Ok(found.map(Account::from))
    }

    async fn create_file(&self, file: NewFileRecord) -> StoreResult<FileRecord> {
        file.validate()?;
        let record = file.into_record(RecordId::generate());
        self.files.insert_one(FileDocument::from(&record)).await?;
        Ok(record)
    }

    async fn find_file(&self, id: RecordId) -> StoreResult<Option<FileRecord>> {
        let found = self
            .files
            .find_one(doc! { "_id": id.object_id() })
            .await?;
        Ok(found.map(FileRecord::from))
    }

    async fn list_files(&self, owner: &str) -> StoreResult<Vec<FileRecord>> {
        let cursor = self
            .files
            .find(doc! { "user": owner })
            .sort(doc! { "_id": 1 })
            .await?;
        let documents: Vec<FileDocument> = cursor.try_collect().await?;
        Ok(documents.into_iter().map(FileRecord::from).collect())
    }

    async fn update_file(
        &self,
        id: RecordId,
        patch: FilePatch,
    ) -> StoreResult<Option<FileRecord>> {
        patch.validate()?;
        let filter = doc! { "_id": id.object_id() };
        let Some(description) = patch.description else {
            return self.find_file(id).await;
        };
        let updated = self
            .files
            .find_one_and_update(filter, doc! { "$set": { "description": description } })
            .return_document(ReturnDocument::After)
            .await?;
        Ok(updated.map(FileRecord::from))
    }

    async fn delete_file(&self, id: RecordId) -> StoreResult<Option<FileRecord>> {
        let deleted = self
            .files
            .find_one_and_delete(doc! { "_id": id.object_id() })
            .await?;
        Ok(deleted.map(FileRecord::from))
    }
}

#[async_trait]
impl SessionStore for MongoStore {
    async fn load_session(
        &self,
        id: &str,
        now: DateTime<Utc>,
    ) -> StoreResult<Option<SessionRecord>> {
        let found = self
            .sessions
            .find_one(doc! { "_id": id, "expires": { "$gt": to_bson(now) } })
            .await?;
        Ok(found.map(SessionRecord::from))
    }

    async fn save_session(&self, record: &SessionRecord) -> StoreResult<()> {
        let document = SessionDocument {
            id: record.id.clone(),
            account: record.account.clone(),
            expires: to_bson(record.expires),
        };
        self.sessions
            .replace_one(doc! { "_id": record.id.as_str() }, document)
            .upsert(true)
            .await?;
        Ok(())
    }

    async fn destroy_session(&self, id: &str) -> StoreResult<()> {
        self.sessions.delete_one(doc! { "_id": id }).await?;
        Ok(())
    }

    async fn prune_sessions(&self, now: DateTime<Utc>) -> StoreResult<u64> {
        let result = self
            .sessions
            .delete_many(doc! { "expires": { "$lte": to_bson(now) } })
            .await?;
        Ok(result.deleted_count)
    }
}
