//! 图片上传：解析 multipart 表单，校验后写入存储后端并创建相片记录。

use axum::extract::multipart::{MultipartError, MultipartRejection};
use axum::extract::{Extension, Multipart};
use axum::http::StatusCode;
use bytes::BytesMut;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::db::SharedAlbumStore;
use crate::envelope::Envelope;
use crate::error::ApiError;
use crate::models::{NewFileRecord, RecordId, validate_description};
use crate::session::CurrentAccount;
use crate::storage::{IncomingImage, SharedUploadBackend, is_image_mime};

pub const IMAGE_FIELD: &str = "image";
pub const DESCRIPTION_FIELD: &str = "description";
/// multipart 边界与文本字段的额外字节。
pub const FORM_OVERHEAD: usize = 64 * 1024;

const FILE_TOO_LARGE: &str = "file too large";

#[derive(Debug)]
pub struct UploadConfig {
    /// 单张图片的最大字节数。
    pub max_size: u64,
}

impl UploadConfig {
    /// 整个请求体的上限。
    pub fn body_limit(&self) -> usize {
        usize::try_from(self.max_size)
            .unwrap_or(usize::MAX)
            .saturating_add(FORM_OVERHEAD)
    }
}

#[derive(Debug, Serialize)]
pub struct UploadResponse {
    name: String,
    #[serde(rename = "_id")]
    id: RecordId,
}

#[derive(Debug, Default)]
struct UploadForm {
    image: Option<IncomingImage>,
    description: Option<String>,
}

/// `POST /file`：上传单张图片。
pub async fn upload_file(
    CurrentAccount(account): CurrentAccount,
    Extension(store): Extension<SharedAlbumStore>,
    Extension(backend): Extension<SharedUploadBackend>,
    Extension(config): Extension<Arc<UploadConfig>>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Envelope<UploadResponse>, ApiError> {
    let mut multipart = multipart.map_err(|_| ApiError::invalid_format())?;
    let form = read_form(&mut multipart, config.max_size).await?;
    let Some(image) = form.image else {
        return Err(ApiError::BadRequest("image is required".into()));
    };

    let description = form.description.unwrap_or_default();
    validate_description(&description)?;

    let name = backend.store(image).await?;
    let created = store
        .create_file(NewFileRecord {
            owner: account.clone(),
            description,
            stored_name: name.clone(),
        })
        .await;
    let record = match created {
        Ok(record) => record,
        Err(err) => {
            warn!(name, error = %err, "file record not created, removing stored image");
            if let Err(remove_err) = backend.remove(&name).await {
                warn!(name, error = %remove_err, "stored image not removed");
            }
            return Err(err.into());
        }
    };
    info!(account, name, id = %record.id, "image uploaded");
    Ok(Envelope::ok_with(UploadResponse {
        name,
        id: record.id,
    }))
}

async fn read_form(multipart: &mut Multipart, max_size: u64) -> Result<UploadForm, ApiError> {
    let mut form = UploadForm::default();
    while let Some(mut field) = multipart.next_field().await.map_err(multipart_error)? {
        let field_name = field.name().map(str::to_string);
        match field_name.as_deref() {
            Some(IMAGE_FIELD) => {
                if form.image.is_some() {
                    return Err(ApiError::BadRequest("only one image is allowed".into()));
                }
                let mime = field.content_type().unwrap_or_default().to_string();
                if !is_image_mime(&mime) {
                    debug!(mime, "rejected non-image upload");
                    return Err(ApiError::invalid_format());
                }
                let original_name = field.file_name().map(str::to_string);
                let mut data = BytesMut::new();
                while let Some(chunk) = field.chunk().await.map_err(multipart_error)? {
                    if (data.len() + chunk.len()) as u64 > max_size {
                        return Err(ApiError::BadRequest(FILE_TOO_LARGE.into()));
                    }
                    data.extend_from_slice(&chunk);
                }
                form.image = Some(IncomingImage {
                    original_name,
                    mime,
                    data: data.freeze(),
                });
            }
            Some(DESCRIPTION_FIELD) => {
                form.description = Some(field.text().await.map_err(multipart_error)?);
            }
            _ if field.file_name().is_some() => {
                return Err(ApiError::BadRequest("unexpected file field".into()));
            }
            other => debug!(field = other, "ignoring form field"),
        }
    }
    Ok(form)
}

fn multipart_error(err: MultipartError) -> ApiError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        ApiError::BadRequest(FILE_TOO_LARGE.into())
    } else {
        debug!(error = %err, "malformed multipart body");
        ApiError::invalid_format()
    }
}
