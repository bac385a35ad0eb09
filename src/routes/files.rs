use axum::extract::{Json, Multipart, Path, State};
use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::auth::CurrentUser;
use crate::error::{AppError, AppResult};
use crate::models::{FileAttachment, NewAttachment};
use crate::state::AppState;

pub const MAX_FILE_BYTES: usize = 1024 * 1024 * 50;

const ALLOWED_CONTENT_TYPES: &[&str] = &[
    "application/pdf",
    "application/msword",
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
    "application/vnd.ms-excel",
    "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
    "image/jpeg",
    "image/png",
    "image/gif",
    "text/plain",
    "application/zip",
];

/// The quoted filename must stay visible ASCII to be a legal header value;
/// the real name survives percent-encoded in the `filename*` variant.
fn attachment_content_disposition(filename: &str) -> String {
    let sanitized: String = filename
        .chars()
        .map(|ch| match ch {
            '"' | '\\' => '_',
            _ => ch,
        })
        .collect();

    let fallback: String = sanitized
        .chars()
        .map(|ch| {
            if ch.is_ascii_graphic() || ch == ' ' {
                ch
            } else {
                '_'
            }
        })
        .collect();

    let encoded =
        percent_encoding::utf8_percent_encode(&sanitized, percent_encoding::NON_ALPHANUMERIC);
    format!(
        "attachment; filename=\"{}\"; filename*=UTF-8''{}",
        fallback, encoded
    )
}

/// The blob goes out first under the attachment's id; if the ledger side
/// then refuses, the orphaned blob is deleted best-effort.
pub async fn upload_file(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    user: CurrentUser,
    mut multipart: Multipart,
) -> AppResult<(StatusCode, Json<FileAttachment>)> {
    let mut file_bytes: Option<Vec<u8>> = None;
    let mut filename: Option<String> = None;
    let mut content_type: Option<String> = None;

    while let Some(field) = multipart.next_field().await.map_err(|err| {
        let msg = format!("invalid multipart data: {err}");
        error!(error = %err, "invalid multipart data");
        AppError::bad_request(msg)
    })? {
        let name = field.name().map(|n| n.to_string());
        if name.as_deref() != Some("file") {
            continue;
        }

        filename = field.file_name().map(|n| n.to_string());
        content_type = field.content_type().map(|mime| mime.to_string());
        let data = field.bytes().await.map_err(|err| {
            let msg = format!("failed to read file bytes: {err}");
            error!(error = %err, "failed to read file bytes");
            AppError::bad_request(msg)
        })?;
        file_bytes = Some(data.to_vec());
    }

    let bytes = file_bytes.ok_or_else(|| {
        error!("upload rejected: missing file field");
        AppError::bad_request("file field is required")
    })?;
    if bytes.is_empty() {
        error!("upload rejected: empty file payload");
        return Err(AppError::bad_request("file field must not be empty"));
    }
    if bytes.len() > MAX_FILE_BYTES {
        error!(size = bytes.len(), "upload rejected: file too large");
        return Err(AppError::bad_request("file exceeds the 50 MB limit"));
    }
    let filename = filename.ok_or_else(|| AppError::bad_request("filename is required"))?;
    let content_type =
        content_type.ok_or_else(|| AppError::bad_request("content type is required"))?;
    if !ALLOWED_CONTENT_TYPES.contains(&content_type.as_str()) {
        return Err(AppError::bad_request(format!(
            "content type '{content_type}' is not allowed"
        )));
    }

    let attachment = NewAttachment {
        id: Uuid::new_v4(),
        filename,
        content_type,
        size_bytes: bytes.len() as i64,
        uploaded_by: user.user.id,
    };
    let key = attachment.id.to_string();

    state
        .storage
        .put_file(&key, bytes, &attachment.content_type)
        .await?;

    match state
        .lifecycle()
        .attach_file(&user.actor(), id, attachment)
        .await
    {
        Ok((document, file)) => {
            info!(
                document = %document.number,
                file_id = %file.id,
                filename = %file.filename,
                "file attached"
            );
            Ok((StatusCode::CREATED, Json(file)))
        }
        Err(err) => {
            if let Err(cleanup) = state.storage.delete_file(&key).await {
                warn!(error = %cleanup, key = %key, "failed to remove orphaned upload");
            }
            Err(err.into())
        }
    }
}

pub async fn list_files(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    user: CurrentUser,
) -> AppResult<Json<Vec<FileAttachment>>> {
    let document = state.lifecycle().read_document(&user.actor(), id).await?;
    let mut files = state.store.attachments_for(&[document.id]).await?;
    Ok(Json(files.remove(&document.id).unwrap_or_default()))
}

pub async fn download_file(
    State(state): State<AppState>,
    Path((id, file_id)): Path<(Uuid, Uuid)>,
    user: CurrentUser,
) -> AppResult<Response> {
    let document = state.lifecycle().read_document(&user.actor(), id).await?;
    let mut files = state.store.attachments_for(&[document.id]).await?;
    let file = files
        .remove(&document.id)
        .unwrap_or_default()
        .into_iter()
        .find(|file| file.id == file_id)
        .ok_or_else(AppError::not_found)?;

    let bytes = state.storage.get_file(&file.id.to_string()).await?;

    let mut headers = HeaderMap::new();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_str(&file.content_type).map_err(AppError::internal)?,
    );
    headers.insert(
        header::CONTENT_DISPOSITION,
        HeaderValue::from_str(&attachment_content_disposition(&file.filename))
            .map_err(AppError::internal)?,
    );

    Ok((headers, bytes).into_response())
}

pub async fn delete_file(
    State(state): State<AppState>,
    Path((id, file_id)): Path<(Uuid, Uuid)>,
    user: CurrentUser,
) -> AppResult<StatusCode> {
    let (document, file) = state
        .lifecycle()
        .remove_file(&user.actor(), id, file_id)
        .await?;

    if let Err(err) = state.storage.delete_file(&file.id.to_string()).await {
        warn!(
            error = %err,
            file_id = %file.id,
            "attachment removed but blob deletion failed"
        );
    }

    info!(document = %document.number, file_id = %file.id, "file removed");
    Ok(StatusCode::NO_CONTENT)
}
