use axum::{extract::State, Extension, Json};
use serde::Deserialize;

use crate::error::AppError;
use crate::extract::ValidJson;
use crate::middleware::api_key::PlatformContext;
use crate::middleware::auth::AuthUser;
use crate::models::file_info::FileInfo;
use crate::models::response::ApiResponse;
use crate::routes::AppState;
use crate::services::upload::{UploadTokenRequest, UploadTokenResponse, Uploader};

#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct UploadedRequest {
    pub fid: String,
}

#[utoipa::path(
    post,
    path = "/api/files/upload-token",
    request_body = UploadTokenRequest,
    responses(
        (status = 200, description = "Upload credential issued, file recorded as pending", body = ApiResponse<UploadTokenResponse>),
        (status = 400, description = "Declared metadata violates upload limits"),
        (status = 401, description = "Missing API key or user token"),
        (status = 403, description = "Uploads not permitted for this usage"),
        (status = 502, description = "Storage backend failed to issue a credential")
    ),
    security(
        ("api_key" = [], "bearer_auth" = [])
    ),
    tag = "Upload"
)]
pub async fn upload_token(
    State(state): State<AppState>,
    Extension(platform): Extension<PlatformContext>,
    Extension(user): Extension<AuthUser>,
    ValidJson(payload): ValidJson<UploadTokenRequest>,
) -> Result<Json<ApiResponse<UploadTokenResponse>>, AppError> {
    let uploader = Uploader {
        platform_id: platform.platform_id,
        user_id: user.user_id,
    };
    let response = state
        .uploads
        .request_upload_credential(uploader, payload)
        .await?;
    Ok(ApiResponse::ok(response))
}

#[utoipa::path(
    patch,
    path = "/api/files/uploaded",
    request_body = UploadedRequest,
    responses(
        (status = 200, description = "Upload confirmed", body = ApiResponse<FileInfo>),
        (status = 403, description = "File disabled or caller is not the uploader"),
        (status = 404, description = "Unknown fid")
    ),
    security(
        ("api_key" = [], "bearer_auth" = [])
    ),
    tag = "Upload"
)]
pub async fn uploaded(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    ValidJson(payload): ValidJson<UploadedRequest>,
) -> Result<Json<ApiResponse<FileInfo>>, AppError> {
    let info = state
        .uploads
        .confirm_upload(&payload.fid, user.user_id)
        .await?;
    Ok(ApiResponse::ok(info))
}
