//! 账号、相片记录与会话的数据模型及字段校验。

use chrono::{DateTime, Utc};
use mongodb::bson::oid::ObjectId;
use serde::{Deserialize, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::config::DESCRIPTION_MAX_CHARS;

const ACCOUNT_MIN_CHARS: usize = 4;
const ACCOUNT_MAX_CHARS: usize = 20;
const PASSWORD_MIN_CHARS: usize = 4;
const PASSWORD_MAX_CHARS: usize = 20;

/// 字段校验失败，携带第一个不合法字段。
#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("{message}")]
pub struct ValidationError {
    pub field: &'static str,
    pub message: String,
}

impl ValidationError {
    pub fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

/// 存储分配的相片记录 id，对外表示为 24 位十六进制字符串。
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RecordId(ObjectId);

/// 标识符格式不符合存储要求。
#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("invalid record id: {0}")]
pub struct InvalidRecordId(pub String);

impl RecordId {
    pub fn generate() -> Self {
        Self(ObjectId::new())
    }

    pub fn object_id(self) -> ObjectId {
        self.0
    }
}

impl From<ObjectId> for RecordId {
    fn from(value: ObjectId) -> Self {
        Self(value)
    }
}

impl FromStr for RecordId {
    type Err = InvalidRecordId;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        ObjectId::parse_str(value)
            .map(Self)
            .map_err(|_| InvalidRecordId(value.to_string()))
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.to_hex())
    }
}

impl Serialize for RecordId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0.to_hex())
    }
}

/// 登录与注册请求中的账号密码。
#[derive(Clone, Debug, Default, Deserialize)]
pub struct Credentials {
    #[serde(default)]
    pub account: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
}

impl Credentials {
    /// 登录只要求字段存在。
    pub fn require(&self) -> Result<(&str, &str), ValidationError> {
        let account = required("account", self.account.as_deref())?;
        let password = required("password", self.password.as_deref())?;
        Ok((account, password))
    }

    /// 注册时的完整校验，返回 `(account, password)`。
    pub fn validate(&self) -> Result<(&str, &str), ValidationError> {
        let account = validate_account(self.account.as_deref())?;
        let password = required("password", self.password.as_deref())?;
        let length = password.chars().count();
        if !(PASSWORD_MIN_CHARS..=PASSWORD_MAX_CHARS).contains(&length) {
            return Err(ValidationError::new(
                "password",
                format!("password must be {PASSWORD_MIN_CHARS}-{PASSWORD_MAX_CHARS} characters"),
            ));
        }
        Ok((account, password))
    }
}

/// 已注册账号；`password` 为 PHC 格式的哈希串。
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Account {
    pub account: String,
    pub password: String,
}

impl Account {
    pub fn validate(&self) -> Result<(), ValidationError> {
        validate_account(Some(&self.account))?;
        required("password", Some(&self.password))?;
        Ok(())
    }
}

fn validate_account(value: Option<&str>) -> Result<&str, ValidationError> {
    let account = required("account", value)?;
    let length = account.chars().count();
    if !(ACCOUNT_MIN_CHARS..=ACCOUNT_MAX_CHARS).contains(&length) {
        return Err(ValidationError::new(
            "account",
            format!("account must be {ACCOUNT_MIN_CHARS}-{ACCOUNT_MAX_CHARS} characters"),
        ));
    }
    if !account.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(ValidationError::new(
            "account",
            "account may only contain letters and digits",
        ));
    }
    Ok(account)
}

fn required<'a>(field: &'static str, value: Option<&'a str>) -> Result<&'a str, ValidationError> {
    match value {
        Some(value) if !value.is_empty() => Ok(value),
        _ => Err(ValidationError::new(field, format!("{field} is required"))),
    }
}

pub fn validate_description(value: &str) -> Result<(), ValidationError> {
    if value.chars().count() > DESCRIPTION_MAX_CHARS {
        return Err(ValidationError::new(
            "description",
            format!("description must be at most {DESCRIPTION_MAX_CHARS} characters"),
        ));
    }
    Ok(())
}

/// 相片元数据，对外字段名沿用前端约定（`_id`/`user`/`name`）。
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct FileRecord {
    #[serde(rename = "_id")]
    pub id: RecordId,
    #[serde(rename = "user")]
    pub owner: String,
    pub description: String,
    #[serde(rename = "name")]
    pub stored_name: String,
}

/// 待创建的相片记录。
#[derive(Clone, Debug)]
pub struct NewFileRecord {
    pub owner: String,
    pub description: String,
    pub stored_name: String,
}

impl NewFileRecord {
    pub fn validate(&self) -> Result<(), ValidationError> {
        required("user", Some(&self.owner))?;
        required("name", Some(&self.stored_name))?;
        validate_description(&self.description)
    }

    pub fn into_record(self, id: RecordId) -> FileRecord {
        FileRecord {
            id,
            owner: self.owner,
            description: self.description,
            stored_name: self.stored_name,
        }
    }
}

/// PATCH 请求体；只有描述可以修改。
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FilePatch {
    #[serde(default)]
    pub description: Option<String>,
}

impl FilePatch {
    pub fn validate(&self) -> Result<(), ValidationError> {
        match &self.description {
            Some(description) => validate_description(description),
            None => Ok(()),
        }
    }

    pub fn apply(&self, record: &mut FileRecord) {
        if let Some(description) = &self.description {
            record.description = description.clone();
        }
    }
}

/// 服务端保存的会话状态。
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionRecord {
    pub id: String,
    pub account: Option<String>,
    pub expires: DateTime<Utc>,
}

impl SessionRecord {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires <= now
    }
}
