//! 注册、登录、登出与登录状态查询。

use argon2::password_hash::{PasswordHash, SaltString, rand_core::OsRng};
use argon2::{Argon2, PasswordHasher, PasswordVerifier};
use axum::Json;
use axum::extract::Extension;
use tracing::{info, warn};

use crate::db::SharedAlbumStore;
use crate::envelope::Envelope;
use crate::error::ApiError;
use crate::http::JsonBody;
use crate::models::{Account, Credentials};
use crate::session::Session;

const INVALID_CREDENTIALS: &str = "invalid account or password";

/// 生成 PHC 格式的 Argon2 哈希。
pub async fn hash_password(plain: String) -> Result<String, ApiError> {
    tokio::task::spawn_blocking(move || {
        let salt = SaltString::generate(&mut OsRng);
        Argon2::default()
            .hash_password(plain.as_bytes(), &salt)
            .map(|hash| hash.to_string())
            .map_err(|err| ApiError::Internal(err.to_string()))
    })
    .await
    .map_err(|err| ApiError::Internal(err.to_string()))?
}

/// 校验密码；哈希格式损坏时视为不匹配。
pub async fn verify_password(hash: String, plain: String) -> Result<bool, ApiError> {
    tokio::task::spawn_blocking(move || {
        let Ok(parsed) = PasswordHash::new(&hash) else {
            return false;
        };
        Argon2::default()
            .verify_password(plain.as_bytes(), &parsed)
            .is_ok()
    })
    .await
    .map_err(|err| ApiError::Internal(err.to_string()))
}

/// `POST /users`：注册新账号。
pub async fn register(
    Extension(store): Extension<SharedAlbumStore>,
    JsonBody(credentials): JsonBody<Credentials>,
) -> Result<Envelope, ApiError> {
    let (account, password) = credentials.validate()?;
    let password = hash_password(password.to_string()).await?;
    store
        .create_account(Account {
            account: account.to_string(),
            password,
        })
        .await?;
    info!(account, "account registered");
    Ok(Envelope::ok())
}

/// `POST /login`：校验账号密码并写入会话。
pub async fn login(
    Extension(store): Extension<SharedAlbumStore>,
    session: Session,
    JsonBody(credentials): JsonBody<Credentials>,
) -> Result<Envelope, ApiError> {
    let (account, password) = credentials.require()?;
    let Some(found) = store.find_account(account).await? else {
        warn!(account, "login for unknown account");
        return Err(ApiError::NotFound(INVALID_CREDENTIALS.into()));
    };
    if !verify_password(found.password, password.to_string()).await? {
        warn!(account, "login with wrong password");
        return Err(ApiError::NotFound(INVALID_CREDENTIALS.into()));
    }
    session.log_in(found.account).await?;
    info!(account, "login");
    Ok(Envelope::ok())
}

/// `DELETE /logout`：销毁会话，未登录时同样成功。
pub async fn logout(session: Session) -> Result<Envelope, ApiError> {
    session.destroy().await?;
    Ok(Envelope::ok())
}

/// `GET /heartbeat`：返回当前会话是否已登录。
pub async fn heartbeat(session: Session) -> Json<bool> {
    Json(session.account().await.is_some())
}
