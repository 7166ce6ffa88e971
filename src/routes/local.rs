//! Downloads and uploads for files kept by the local driver.

use axum::{
    body::Body,
    extract::State,
    http::{header, HeaderValue, StatusCode},
    response::Response,
    Json,
};
use chrono::Utc;
use futures::StreamExt;
use sea_orm::{ColumnTrait, EntityTrait, QueryFilter};
use serde::{Deserialize, Serialize};
use std::io;
use tokio_util::io::ReaderStream;

use crate::entities::file;
use crate::error::AppError;
use crate::extract::ValidQuery;
use crate::models::rendition::Rendition;
use crate::models::response::ApiResponse;
use crate::routes::AppState;
use crate::services::signer::UPLOAD_KIND;
use crate::services::storage::{plan_rendition, StorageError};
use crate::services::thumbnails::generate_local_thumbnails;

#[derive(Debug, Deserialize, utoipa::IntoParams)]
pub struct DownloadQuery {
    pub fid: String,
    /// Rendition code: config, ratio, square, big, video, poster, audio, original.
    #[serde(rename = "type")]
    pub kind: String,
    pub token: Option<String>,
    pub time: Option<i64>,
}

#[derive(Debug, Deserialize, utoipa::IntoParams)]
pub struct UploadQuery {
    pub path: String,
    pub time: i64,
    pub token: String,
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct StoredObjectResponse {
    pub fid: String,
    pub path: String,
    pub size: i64,
    pub md5: String,
    pub thumbnails: usize,
}

fn content_disposition(name: &str) -> HeaderValue {
    let encoded: String = url::form_urlencoded::byte_serialize(name.as_bytes())
        .collect::<String>()
        .replace('+', "%20");
    HeaderValue::from_str(&format!("inline; filename*=UTF-8''{encoded}"))
        .unwrap_or_else(|_| HeaderValue::from_static("inline"))
}

#[utoipa::path(
    get,
    path = "/api/file-storage/file",
    params(DownloadQuery),
    responses(
        (status = 200, description = "Object bytes"),
        (status = 401, description = "Missing, invalid or expired anti-link token"),
        (status = 404, description = "File or object not found")
    ),
    tag = "Local Storage"
)]
pub async fn download(
    State(state): State<AppState>,
    ValidQuery(query): ValidQuery<DownloadQuery>,
) -> Result<Response, AppError> {
    let rendition = Rendition::from_code(&query.kind)
        .ok_or_else(|| AppError::Validation(format!("Unknown rendition type {}", query.kind)))?;

    let file = file::Entity::find()
        .filter(file::Column::Fid.eq(&query.fid))
        .one(&state.db)
        .await?
        .filter(|f| f.is_enabled && f.is_uploaded)
        .ok_or_else(AppError::file_not_found)?;

    let settings = state.files.settings();
    if settings.disk(file.file_type).anti_link_status {
        let (Some(token), Some(time)) = (query.token.as_deref(), query.time) else {
            return Err(AppError::Unauthorized("Missing anti-link token".to_string()));
        };
        if !state
            .signer
            .verify(&file.fid, time, rendition.code(), token, Utc::now().timestamp())
        {
            return Err(AppError::Unauthorized("Invalid or expired link".to_string()));
        }
    }

    let store = state
        .drivers
        .local_store(file.file_type)
        .ok_or_else(AppError::file_not_found)?;
    let plan = plan_rendition(&file, rendition, &settings.renditions)
        .ok_or_else(AppError::file_not_found)?;

    // A thumbnail that was never rendered falls back to its source.
    let (handle, len) = match store.open(&plan.object_path).await {
        Err(StorageError::NotFound) if plan.object_path != plan.source_path => {
            store.open(&plan.source_path).await
        }
        other => other,
    }
    .map_err(|e| match e {
        StorageError::NotFound => AppError::file_not_found(),
        other => AppError::Internal(other.to_string()),
    })?;

    let mime = match rendition {
        Rendition::VideoPoster => Some("image/jpeg".to_string()),
        _ => file.mime.clone(),
    }
    .unwrap_or_else(|| "application/octet-stream".to_string());

    let mut response = Response::new(Body::from_stream(ReaderStream::new(handle)));
    *response.status_mut() = StatusCode::OK;
    let headers = response.headers_mut();
    if let Ok(value) = HeaderValue::from_str(&mime) {
        headers.insert(header::CONTENT_TYPE, value);
    }
    headers.insert(header::CONTENT_LENGTH, HeaderValue::from(len));
    headers.insert(header::CONTENT_DISPOSITION, content_disposition(&plan.download_name));
    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("private, max-age=300"));

    Ok(response)
}

#[utoipa::path(
    put,
    path = "/api/file-storage/upload",
    params(UploadQuery),
    request_body(content = Vec<u8>, content_type = "application/octet-stream"),
    responses(
        (status = 200, description = "Object stored", body = ApiResponse<StoredObjectResponse>),
        (status = 400, description = "Body exceeds the size limit or the file is already uploaded"),
        (status = 401, description = "Invalid or expired upload token"),
        (status = 404, description = "No pending file for this path")
    ),
    tag = "Local Storage"
)]
pub async fn upload(
    State(state): State<AppState>,
    ValidQuery(query): ValidQuery<UploadQuery>,
    body: Body,
) -> Result<Json<ApiResponse<StoredObjectResponse>>, AppError> {
    if !state.signer.verify(
        &query.path,
        query.time,
        UPLOAD_KIND,
        &query.token,
        Utc::now().timestamp(),
    ) {
        return Err(AppError::Unauthorized("Invalid or expired upload token".to_string()));
    }

    let file = file::Entity::find()
        .filter(file::Column::Path.eq(&query.path))
        .one(&state.db)
        .await?
        .ok_or_else(AppError::file_not_found)?;
    if !file.is_enabled {
        return Err(AppError::file_disabled());
    }
    if file.is_uploaded {
        return Err(AppError::Validation("File has already been uploaded".to_string()));
    }

    let settings = state.files.settings();
    let store = state
        .drivers
        .local_store(file.file_type)
        .ok_or_else(|| AppError::Validation("File type is not stored locally".to_string()))?;

    let max_bytes = settings.upload.for_type(file.file_type).max_size_mb * 1024 * 1024;
    let mut received: u64 = 0;
    let stream = body.into_data_stream().map(move |chunk| {
        let chunk = chunk.map_err(io::Error::other)?;
        received += chunk.len() as u64;
        if max_bytes > 0 && received > max_bytes {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "upload exceeds the size limit",
            ));
        }
        Ok(chunk)
    });

    let stored = store
        .write_stream(&file.path, stream)
        .await
        .map_err(|e| match e {
            StorageError::Io(err) if err.kind() == io::ErrorKind::InvalidData => {
                AppError::Validation(err.to_string())
            }
            other => AppError::upload_credential(other),
        })?;

    let thumbnails = match generate_local_thumbnails(store, &file, settings).await {
        Ok(count) => count,
        Err(e) => {
            tracing::warn!(fid = %file.fid, error = %e, "thumbnail generation failed");
            0
        }
    };

    tracing::info!(fid = %file.fid, size = stored.size, "local object stored");

    Ok(ApiResponse::ok(StoredObjectResponse {
        fid: file.fid,
        path: file.path,
        size: stored.size,
        md5: stored.md5,
        thumbnails,
    }))
}
