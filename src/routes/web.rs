//! Browser upload flow: an embeddable page that uploads straight to the
//! storage backend and posts the resulting file info back to its opener.

use axum::{
    extract::State,
    http::StatusCode,
    response::{Html, IntoResponse, Response},
    Json,
};
use axum_extra::extract::cookie::CookieJar;
use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::entities::file::FileType;
use crate::error::AppError;
use crate::extract::{ValidJson, ValidQuery};
use crate::middleware::auth::decode_user_token;
use crate::middleware::session::UploadSession;
use crate::models::file_info::FileInfo;
use crate::models::response::ApiResponse;
use crate::routes::upload::UploadedRequest;
use crate::routes::AppState;
use crate::services::upload::{UploadTokenRequest, UploadTokenResponse, Uploader, UsageContext};
use crate::utils::html_escape;

/// Platform recorded for browser uploads whose access token names none.
const DEFAULT_PLATFORM_ID: i32 = 1;

#[derive(Debug, Deserialize)]
pub struct UploadPageQuery {
    pub access_token: String,
    /// `usageType,usageFsid,fileType`
    pub upload_info: String,
    pub post_message_key: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BrowserUploadQuery {
    pub name: String,
    pub mime: Option<String>,
    pub extension: String,
    pub size: i64,
    pub width: Option<i32>,
    pub height: Option<i32>,
    pub duration: Option<i32>,
    pub sha: Option<String>,
    pub sha_type: Option<String>,
    pub warning: Option<String>,
}

/// Splits `usageType,usageFsid,fileType`.
pub fn parse_upload_info(raw: &str) -> Result<(String, Option<String>, FileType), AppError> {
    let parts: Vec<&str> = raw.split(',').map(str::trim).collect();
    let [usage_type, usage_fsid, file_type] = parts.as_slice() else {
        return Err(AppError::Validation(
            "upload_info must be usageType,usageFsid,fileType".to_string(),
        ));
    };
    if usage_type.is_empty() {
        return Err(AppError::Validation("usageType is required".to_string()));
    }
    let file_type = FileType::parse(file_type)
        .ok_or_else(|| AppError::Validation(format!("Unknown file type {file_type}")))?;
    let usage_fsid = Some(usage_fsid.to_string()).filter(|s| !s.is_empty());

    Ok((usage_type.to_string(), usage_fsid, file_type))
}

fn error_page(err: AppError) -> Response {
    let status = err.status();
    let body = format!(
        r#"<!DOCTYPE html><html lang="en"><head><meta charset="UTF-8"><title>Upload</title></head>
<body style="font-family: Arial, sans-serif; padding: 2rem;"><p>{}</p><p><small>{}</small></p></body></html>"#,
        html_escape(&err.to_string()),
        err.code()
    );
    (status, Html(body)).into_response()
}

pub async fn upload_page(
    State(state): State<AppState>,
    jar: CookieJar,
    ValidQuery(query): ValidQuery<UploadPageQuery>,
) -> Response {
    match render_upload_page(&state, jar, query).await {
        Ok(response) => response,
        Err(err) => error_page(err),
    }
}

async fn render_upload_page(
    state: &AppState,
    jar: CookieJar,
    query: UploadPageQuery,
) -> Result<Response, AppError> {
    let user = decode_user_token(&query.access_token, &state.config.jwt_secret)?;
    let (usage_name, usage_fsid, file_type) = parse_upload_info(&query.upload_info)?;
    let usage = UsageContext::resolve(&usage_name, usage_fsid.as_deref(), None);

    let permission = state
        .uploads
        .policy()
        .authorize(user.user_id, usage.usage_type, file_type)
        .await?;
    let limits = state.files.settings().upload.for_type(file_type);

    let session = UploadSession {
        platform_id: user.platform_id.unwrap_or(DEFAULT_PLATFORM_ID),
        user_id: user.user_id,
        usage_type: usage_name,
        usage_fsid,
        file_type,
        issued_at: Utc::now().timestamp(),
        max_upload_number: permission.max_upload_number,
    };
    let jar = jar.add(session.to_cookie(&state.config.jwt_secret)?);

    let accept = limits
        .extensions
        .iter()
        .map(|ext| format!(".{ext}"))
        .collect::<Vec<_>>()
        .join(",");
    let page = UPLOAD_PAGE
        .replace("{{file_type}}", file_type.as_str())
        .replace("{{accept}}", &html_escape(&accept))
        .replace("{{max_size_mb}}", &limits.max_size_mb.to_string())
        .replace("{{max_duration}}", &limits.max_duration.to_string())
        .replace("{{max_upload_number}}", &permission.max_upload_number.to_string())
        .replace(
            "{{post_message_key}}",
            &html_escape(query.post_message_key.as_deref().unwrap_or("")),
        );

    tracing::debug!(user_id = user.user_id, file_type = file_type.as_str(), "upload page rendered");
    Ok((StatusCode::OK, jar, Html(page)).into_response())
}

pub async fn upload_token(
    State(state): State<AppState>,
    jar: CookieJar,
    ValidQuery(query): ValidQuery<BrowserUploadQuery>,
) -> Result<Json<ApiResponse<UploadTokenResponse>>, AppError> {
    let session = UploadSession::from_jar(&jar, &state.config.jwt_secret)?;
    let uploader = Uploader {
        platform_id: session.platform_id,
        user_id: session.user_id,
    };

    let opened_at = DateTime::from_timestamp(session.issued_at, 0)
        .ok_or_else(|| AppError::Unauthorized("Upload session expired".to_string()))?
        .naive_utc();
    let issued = state.uploads.issued_since(uploader, opened_at).await?;
    if issued >= u64::from(session.max_upload_number) {
        return Err(AppError::Validation(format!(
            "At most {} files per upload session",
            session.max_upload_number
        )));
    }

    let request = UploadTokenRequest {
        file_type: session.file_type.as_str().to_string(),
        usage_type: session.usage_type.clone(),
        usage_fsid: session.usage_fsid.clone(),
        table_id: None,
        name: query.name,
        mime: query.mime,
        extension: query.extension,
        size: query.size,
        width: query.width,
        height: query.height,
        duration: query.duration,
        sha: query.sha,
        sha_type: query.sha_type,
        warning: query.warning,
        sort_order: None,
        more_info: None,
    };

    let response = state
        .uploads
        .request_upload_credential(uploader, request)
        .await?;
    Ok(ApiResponse::ok(response))
}

pub async fn uploaded(
    State(state): State<AppState>,
    jar: CookieJar,
    ValidJson(payload): ValidJson<UploadedRequest>,
) -> Result<Json<ApiResponse<FileInfo>>, AppError> {
    let session = UploadSession::from_jar(&jar, &state.config.jwt_secret)?;
    let info = state
        .uploads
        .confirm_upload(&payload.fid, session.user_id)
        .await?;
    Ok(ApiResponse::ok(info))
}

const UPLOAD_PAGE: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>Upload</title>
    <style>
        body { font-family: Arial, sans-serif; margin: 0; padding: 1.5rem; background: #f7f7f7; }
        .hint { color: #666; font-size: 0.85rem; }
        .error { color: #b00020; }
        button { margin-top: 1rem; padding: 8px 18px; background: #007bff; color: #fff; border: 0; border-radius: 4px; }
        button:disabled { background: #999; }
    </style>
</head>
<body>
    <form id="upload-form"
        data-file-type="{{file_type}}"
        data-max-size-mb="{{max_size_mb}}"
        data-max-duration="{{max_duration}}"
        data-max-upload-number="{{max_upload_number}}"
        data-post-message-key="{{post_message_key}}">
        <input type="file" id="files" accept="{{accept}}" multiple>
        <p class="hint">Accepted: {{accept}} &middot; up to {{max_size_mb}} MB &middot; at most {{max_upload_number}} files</p>
        <button type="submit" id="submit">Upload</button>
        <p id="status" class="hint"></p>
    </form>
    <script>
    (function () {
        const form = document.getElementById('upload-form');
        const status = document.getElementById('status');
        const submit = document.getElementById('submit');
        const maxNumber = parseInt(form.dataset.maxUploadNumber, 10) || 1;
        const maxBytes = (parseInt(form.dataset.maxSizeMb, 10) || 0) * 1024 * 1024;
        const postMessageKey = form.dataset.postMessageKey;

        function notify(message, isError) {
            status.textContent = message;
            status.className = isError ? 'error' : 'hint';
        }

        function reply(payload) {
            const message = Object.assign({ postMessageKey: postMessageKey }, payload);
            if (window.parent && window.parent !== window) {
                window.parent.postMessage(JSON.stringify(message), '*');
            }
        }

        async function envelope(response) {
            const body = await response.json();
            if (body.code !== 0) {
                throw new Error(body.message || 'Request failed');
            }
            return body.data;
        }

        async function uploadOne(file) {
            const dot = file.name.lastIndexOf('.');
            const params = new URLSearchParams({
                name: file.name,
                extension: dot >= 0 ? file.name.slice(dot + 1) : '',
                size: String(file.size),
            });
            if (file.type) params.set('mime', file.type);

            const token = await envelope(await fetch('/upload/api/upload-token?' + params.toString(), {
                credentials: 'same-origin',
            }));

            let transfer;
            if (token.method === 'POST') {
                const data = new FormData();
                data.append('file', file);
                data.append('api_key', token.fields.apiKey);
                data.append('folder', token.fields.folder);
                data.append('public_id', token.fields.publicId);
                data.append('timestamp', token.fields.timestamp);
                data.append('type', token.fields.type);
                data.append('signature', token.fields.signature);
                transfer = await fetch(token.url, { method: 'POST', body: data });
            } else {
                transfer = await fetch(token.url, { method: 'PUT', headers: token.headers || {}, body: file });
            }
            if (!transfer.ok) {
                throw new Error('Upload failed (' + transfer.status + ')');
            }

            return envelope(await fetch('/upload/api/uploaded', {
                method: 'PATCH',
                credentials: 'same-origin',
                headers: { 'Content-Type': 'application/json' },
                body: JSON.stringify({ fid: token.fid }),
            }));
        }

        form.addEventListener('submit', async function (event) {
            event.preventDefault();
            const files = Array.from(document.getElementById('files').files);
            if (files.length === 0) return notify('Choose a file first', true);
            if (files.length > maxNumber) return notify('At most ' + maxNumber + ' files', true);
            if (maxBytes > 0 && files.some(function (f) { return f.size > maxBytes; })) {
                return notify('A file exceeds the size limit', true);
            }

            submit.disabled = true;
            try {
                for (const [index, file] of files.entries()) {
                    notify('Uploading ' + (index + 1) + ' / ' + files.length);
                    const info = await uploadOne(file);
                    reply({ code: 0, message: 'ok', action: { windowClose: index === files.length - 1 }, data: info });
                }
                notify('Done');
            } catch (error) {
                notify(error.message, true);
                reply({ code: 32104, message: error.message, action: { windowClose: false }, data: null });
            } finally {
                submit.disabled = false;
            }
        });
    })();
    </script>
</body>
</html>
"#;
