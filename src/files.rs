//! 相片读取、相册列表、删除与描述修改处理器。

use axum::body::Body as AxumBody;
use axum::extract::{Extension, Path};
use axum::http::{HeaderMap, HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use httpdate::fmt_http_date;
use std::io::ErrorKind;
use tokio::fs::{self, File};
use tokio_util::io::ReaderStream;
use tracing::{info, warn};

use crate::db::{SharedAlbumStore, StoreError};
use crate::envelope::{Envelope, WithResult};
use crate::error::ApiError;
use crate::http::JsonBody;
use crate::models::{FilePatch, FileRecord, RecordId};
use crate::session::CurrentAccount;
use crate::storage::{SharedUploadBackend, StoredObject};

const RECORD_NOT_FOUND: &str = "record not found";

/// `GET /file/:name`：本地存储直接返回文件，远端存储重定向。
pub async fn serve_file(
    CurrentAccount(_account): CurrentAccount,
    Extension(backend): Extension<SharedUploadBackend>,
    Path(name): Path<String>,
) -> Result<Response, ApiError> {
    match backend.locate(&name).await? {
        StoredObject::Remote(url) => {
            let location =
                HeaderValue::from_str(&url).map_err(|err| ApiError::Internal(err.to_string()))?;
            Ok((StatusCode::FOUND, [(header::LOCATION, location)]).into_response())
        }
        StoredObject::LocalFile(path) => {
            let file = match File::open(&path).await {
                Ok(file) => file,
                Err(err) if err.kind() == ErrorKind::NotFound => {
                    return Err(ApiError::NotFound("image not found".into()));
                }
                Err(err) => return Err(ApiError::Internal(err.to_string())),
            };
            let metadata = fs::metadata(&path)
                .await
                .map_err(|err| ApiError::Internal(err.to_string()))?;
            let mime = mime_guess::from_path(&path).first_or_octet_stream();

            let mut headers = HeaderMap::new();
            headers.insert(
                header::CONTENT_TYPE,
                HeaderValue::from_str(mime.essence_str())
                    .map_err(|_| ApiError::Internal("invalid mime type".into()))?,
            );
            headers.insert(header::CONTENT_LENGTH, HeaderValue::from(metadata.len()));
            if let Ok(modified) = metadata.modified()
                && let Ok(value) = HeaderValue::from_str(&fmt_http_date(modified))
            {
                headers.insert(header::LAST_MODIFIED, value);
            }
            Ok((
                StatusCode::OK,
                headers,
                AxumBody::from_stream(ReaderStream::new(file)),
            )
                .into_response())
        }
    }
}

/// `GET /album/:user`：只能查看自己的相册。
pub async fn list_album(
    CurrentAccount(account): CurrentAccount,
    Extension(store): Extension<SharedAlbumStore>,
    Path(user): Path<String>,
) -> Result<Envelope<WithResult<Vec<FileRecord>>>, ApiError> {
    if account != user {
        warn!(account, user, "album access denied");
        return Err(ApiError::Forbidden);
    }
    let result = store.list_files(&user).await?;
    Ok(Envelope::ok_with(WithResult { result }))
}

/// `DELETE /file/:id`：删除自己的相片记录，并尽量清理已存储的文件。
pub async fn delete_file(
    CurrentAccount(account): CurrentAccount,
    Extension(store): Extension<SharedAlbumStore>,
    Extension(backend): Extension<SharedUploadBackend>,
    Path(id): Path<String>,
) -> Result<Envelope<WithResult<FileRecord>>, ApiError> {
    let id = parse_id(&id)?;
    owned_record(&store, id, &account).await?;
    let deleted = store
        .delete_file(id)
        .await?
        .ok_or_else(|| ApiError::NotFound(RECORD_NOT_FOUND.into()))?;
    if let Err(err) = backend.remove(&deleted.stored_name).await {
        warn!(name = deleted.stored_name, error = %err, "stored image not removed");
    }
    info!(account, id = %id, "file deleted");
    Ok(Envelope::ok_with(WithResult { result: deleted }))
}

/// `PATCH /file/:id`：修改自己相片的描述，返回更新后的记录。
pub async fn update_file(
    CurrentAccount(account): CurrentAccount,
    Extension(store): Extension<SharedAlbumStore>,
    Path(id): Path<String>,
    JsonBody(patch): JsonBody<FilePatch>,
) -> Result<Envelope<WithResult<FileRecord>>, ApiError> {
    let id = parse_id(&id)?;
    owned_record(&store, id, &account).await?;
    let updated = store
        .update_file(id, patch)
        .await?
        .ok_or_else(|| ApiError::NotFound(RECORD_NOT_FOUND.into()))?;
    info!(account, id = %id, "file updated");
    Ok(Envelope::ok_with(WithResult { result: updated }))
}

fn parse_id(raw: &str) -> Result<RecordId, ApiError> {
    raw.parse::<RecordId>()
        .map_err(|err| ApiError::from(StoreError::from(err)))
}

/// 读取记录并确认归属。
async fn owned_record(
    store: &SharedAlbumStore,
    id: RecordId,
    account: &str,
) -> Result<FileRecord, ApiError> {
    let record = store
        .find_file(id)
        .await?
        .ok_or_else(|| ApiError::NotFound(RECORD_NOT_FOUND.into()))?;
    if record.owner != account {
        warn!(account, owner = record.owner, id = %id, "file access denied");
        return Err(ApiError::Forbidden);
    }
    Ok(record)
}
