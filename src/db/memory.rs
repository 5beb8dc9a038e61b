//! 进程内存储：未配置数据库时使用，也供测试使用。

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap};
use tokio::sync::Mutex;

use super::{AlbumStore, SessionStore, StoreResult};
use crate::models::{
    Account, FilePatch, FileRecord, NewFileRecord, RecordId, SessionRecord, ValidationError,
};

#[derive(Debug, Default)]
pub struct MemoryStore {
    accounts: Mutex<HashMap<String, Account>>,
    // ObjectId 按时间递增，BTreeMap 的顺序即创建顺序。
    files: Mutex<BTreeMap<RecordId, FileRecord>>,
    sessions: Mutex<HashMap<String, SessionRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AlbumStore for MemoryStore {
    async fn create_account(&self, account: Account) -> StoreResult<Account> {
        account.validate()?;
        let mut accounts = self.accounts.lock().await;
        if accounts.contains_key(&account.account) {
            return Err(ValidationError::new("account", "account already exists").into());
        }
        accounts.insert(account.account.clone(), account.clone());
        Ok(account)
    }

    async fn find_account(&self, account: &str) -> StoreResult<Option<Account>> {
        let accounts = self.accounts.lock().await;
        Ok(accounts.get(account).cloned())
    }

    async fn create_file(&self, file: NewFileRecord) -> StoreResult<FileRecord> {
        file.validate()?;
        let record = file.into_record(RecordId::generate());
        let mut files = self.files.lock().await;
        files.insert(record.id, record.clone());
        Ok(record)
    }

    async fn find_file(&self, id: RecordId) -> StoreResult<Option<FileRecord>> {
        let files = self.files.lock().await;
        Ok(files.get(&id).cloned())
    }

    async fn list_files(&self, owner: &str) -> StoreResult<Vec<FileRecord>> {
        let files = self.files.lock().await;
        Ok(files
            .values()
            .filter(|record| record.owner == owner)
            .cloned()
            .collect())
    }

    async fn update_file(
        &self,
        id: RecordId,
        patch: FilePatch,
    ) -> StoreResult<Option<FileRecord>> {
        patch.validate()?;
        let mut files = self.files.lock().await;
        Ok(files.get_mut(&id).map(|record| {
            patch.apply(record);
            record.clone()
        }))
    }

    async fn delete_file(&self, id: RecordId) -> StoreResult<Option<FileRecord>> {
        let mut files = self.files.lock().await;
        Ok(files.remove(&id))
    }
}

#[async_trait]
impl SessionStore for MemoryStore {
    async fn load_session(
        &self,
        id: &str,
        now: DateTime<Utc>,
    ) -> StoreResult<Option<SessionRecord>> {
        let mut sessions = self.sessions.lock().await;
        match sessions.get(id) {
            Some(record) if !record.is_expired(now) => Ok(Some(record.clone())),
            Some(_) => {
                sessions.remove(id);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn save_session(&self, record: &SessionRecord) -> StoreResult<()> {
        let mut sessions = self.sessions.lock().await;
        sessions.insert(record.id.clone(), record.clone());
        Ok(())
    }

    async fn destroy_session(&self, id: &str) -> StoreResult<()> {
        let mut sessions = self.sessions.lock().await;
        sessions.remove(id);
        Ok(())
    }

    async fn prune_sessions(&self, now: DateTime<Utc>) -> StoreResult<u64> {
        let mut sessions = self.sessions.lock().await;
        let before = sessions.len();
        sessions.retain(|_, record| !record.is_expired(now));
        Ok((before - sessions.len()) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::StoreError;
    use chrono::Duration;

    fn account(name: &str) -> Account {
        Account {
            account: name.to_string(),
            password: "$argon2id$stub".to_string(),
        }
    }

    fn new_file(owner: &str, name: &str) -> NewFileRecord {
        NewFileRecord {
            owner: owner.to_string(),
            description: String::new(),
            stored_name: name.to_string(),
        }
    }

    #[tokio::test]
    async fn duplicate_account_is_a_validation_error() {
        let store = MemoryStore::new();
        store.create_account(account("alice")).await.expect("first");
        let err = store.create_account(account("alice")).await.unwrap_err();
        match err {
            StoreError::Validation(err) => {
                assert_eq!(err.field, "account");
                assert_eq!(err.message, "account already exists");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn files_are_listed_per_owner_in_creation_order() {
        let store = MemoryStore::new();
        let first = store.create_file(new_file("alice", "1.png")).await.unwrap();
        store.create_file(new_file("bob", "2.png")).await.unwrap();
        let third = store.create_file(new_file("alice", "3.png")).await.unwrap();

        let listed = store.list_files("alice").await.unwrap();
        assert_eq!(listed, vec![first, third]);
    }

    #[tokio::test]
    async fn update_and_delete_return_records() {
        let store = MemoryStore::new();
        let record = store.create_file(new_file("alice", "1.png")).await.unwrap();

        let patch = FilePatch {
            description: Some("beach".into()),
        };
        let updated = store.update_file(record.id, patch).await.unwrap().unwrap();
        assert_eq!(updated.description, "beach");

        let deleted = store.delete_file(record.id).await.unwrap().unwrap();
        assert_eq!(deleted, updated);
        assert!(store.find_file(record.id).await.unwrap().is_none());
        assert!(store.delete_file(record.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn expired_sessions_are_not_loaded() {
        let store = MemoryStore::new();
        let now = Utc::now();
        let live = SessionRecord {
            id: "live".into(),
            account: Some("alice".into()),
            expires: now + Duration::minutes(30),
        };
        let stale = SessionRecord {
            id: "stale".into(),
            account: Some("bob".into()),
            expires: now - Duration::seconds(1),
        };
        store.save_session(&live).await.unwrap();
        store.save_session(&stale).await.unwrap();

        assert_eq!(store.load_session("live", now).await.unwrap(), Some(live));
        assert_eq!(store.prune_sessions(now).await.unwrap(), 1);
        assert!(store.load_session("stale", now).await.unwrap().is_none());
    }
}
