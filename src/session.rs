//! Cookie 关联的服务端会话：中间件负责加载与保存，处理器通过 `Session` 读写。

use axum::extract::{Extension, FromRequestParts, Request};
use axum::http::request::Parts;
use axum::middleware::Next;
use axum::response::Response;
use axum_extra::extract::CookieJar;
use axum_extra::extract::cookie::{Cookie, SameSite};
use chrono::Utc;
use cookie::time::Duration as CookieDuration;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::debug;
use uuid::Uuid;

use crate::db::{SharedSessionStore, StoreResult};
use crate::error::ApiError;
use crate::models::SessionRecord;

#[derive(Clone, Debug)]
pub struct SessionConfig {
    pub cookie_name: String,
    /// 无操作超时时间，每次请求后重新计算。
    pub ttl: Duration,
    pub secure: bool,
}

impl SessionConfig {
    fn session_cookie(&self, id: String) -> Cookie<'static> {
        Cookie::build((self.cookie_name.clone(), id))
            .path("/")
            .http_only(true)
            .secure(self.secure)
            // 前端与 API 跨站部署时必须为 None，且只能配合 Secure 使用。
            .same_site(if self.secure {
                SameSite::None
            } else {
                SameSite::Lax
            })
            .max_age(CookieDuration::seconds(self.ttl.as_secs() as i64))
            .build()
    }

    fn removal_cookie(&self) -> Cookie<'static> {
        Cookie::build((self.cookie_name.clone(), "")).path("/").build()
    }
}

#[derive(Debug)]
struct SessionState {
    id: String,
    account: Option<String>,
    persisted: bool,
    destroyed: bool,
}

/// 请求级会话句柄。
#[derive(Clone)]
pub struct Session {
    state: Arc<Mutex<SessionState>>,
    store: SharedSessionStore,
}

impl Session {
    fn new(record: Option<SessionRecord>, store: SharedSessionStore) -> Self {
        let state = match record {
            Some(record) => SessionState {
                id: record.id,
                account: record.account,
                persisted: true,
                destroyed: false,
            },
            None => SessionState {
                id: Uuid::new_v4().to_string(),
                account: None,
                persisted: false,
                destroyed: false,
            },
        };
        Self {
            state: Arc::new(Mutex::new(state)),
            store,
        }
    }

    pub async fn account(&self) -> Option<String> {
        self.state.lock().await.account.clone()
    }

    /// 将会话绑定到账号，响应阶段写入存储。
    ///
    /// 登录总是换发新的会话 id，旧记录随即删除。
    pub async fn log_in(&self, account: String) -> StoreResult<()> {
        let mut state = self.state.lock().await;
        if state.persisted {
            self.store.destroy_session(&state.id).await?;
            state.persisted = false;
        }
        state.id = Uuid::new_v4().to_string();
        state.account = Some(account);
        state.destroyed = false;
        Ok(())
    }

    /// 删除服务端记录；响应阶段清除 Cookie。
    pub async fn destroy(&self) -> StoreResult<()> {
        let mut state = self.state.lock().await;
        if state.persisted {
            self.store.destroy_session(&state.id).await?;
            state.persisted = false;
        }
        state.account = None;
        state.destroyed = true;
        Ok(())
    }
}

impl<S: Send + Sync> FromRequestParts<S> for Session {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<Session>()
            .cloned()
            .ok_or_else(|| ApiError::Internal("session layer is not installed".into()))
    }
}

/// 已登录的账号；未登录时以 401 拒绝。
#[derive(Clone, Debug)]
pub struct CurrentAccount(pub String);

impl<S: Send + Sync> FromRequestParts<S> for CurrentAccount {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let session = Session::from_request_parts(parts, state).await?;
        session
            .account()
            .await
            .map(CurrentAccount)
            .ok_or(ApiError::Unauthorized)
    }
}

/// 会话中间件：加载 Cookie 对应的会话，响应后保存并刷新过期时间。
pub async fn session_middleware(
    Extension(store): Extension<SharedSessionStore>,
    Extension(config): Extension<Arc<SessionConfig>>,
    jar: CookieJar,
    mut req: Request,
    next: Next,
) -> Result<(CookieJar, Response), ApiError> {
    let presented = jar.get(&config.cookie_name).map(|cookie| cookie.value().to_string());
    let record = match presented.as_deref() {
        Some(id) => store.load_session(id, Utc::now()).await?,
        None => None,
    };
    let session = Session::new(record, store.clone());
    req.extensions_mut().insert(session.clone());

    let response = next.run(req).await;

    let state = session.state.lock().await;
    if state.destroyed {
        debug!("session destroyed");
        return Ok((jar.remove(config.removal_cookie()), response));
    }
    if !state.persisted && state.account.is_none() {
        // 未初始化的会话不落库；过期的旧 Cookie 一并清除。
        let jar = match presented {
            Some(_) => jar.remove(config.removal_cookie()),
            None => jar,
        };
        return Ok((jar, response));
    }

    let ttl = chrono::Duration::from_std(config.ttl)
        .map_err(|err| ApiError::Internal(err.to_string()))?;
    let record = SessionRecord {
        id: state.id.clone(),
        account: state.account.clone(),
        expires: Utc::now() + ttl,
    };
    store.save_session(&record).await?;
    Ok((jar.add(config.session_cookie(record.id)), response))
}
