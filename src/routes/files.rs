use axum::{
    extract::State,
    Extension, Json,
};
use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::extract::{ValidJson, ValidPath};
use crate::middleware::auth::AuthUser;
use crate::models::file_info::FileInfo;
use crate::models::response::ApiResponse;
use crate::routes::AppState;

const MAX_BATCH: usize = 100;

#[derive(Debug, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct FileIdsRequest {
    /// File ids or fids.
    pub fids_or_ids: Vec<String>,
}

impl FileIdsRequest {
    fn validated(self) -> Result<Vec<String>, AppError> {
        let ids: Vec<String> = self
            .fids_or_ids
            .into_iter()
            .map(|id| id.trim().to_string())
            .filter(|id| !id.is_empty())
            .collect();
        if ids.is_empty() {
            return Err(AppError::Validation("fidsOrIds must not be empty".to_string()));
        }
        if ids.len() > MAX_BATCH {
            return Err(AppError::Validation(format!(
                "At most {MAX_BATCH} files per request"
            )));
        }
        Ok(ids)
    }
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct OriginalUrlResponse {
    pub original_url: String,
}

#[utoipa::path(
    get,
    path = "/api/files/{id}",
    params(
        ("id" = String, Path, description = "File id or fid")
    ),
    responses(
        (status = 200, description = "File info with rendition URLs", body = ApiResponse<FileInfo>),
        (status = 404, description = "File not found, disabled or not visible to the caller")
    ),
    security(
        ("api_key" = []),
        ("api_key" = [], "bearer_auth" = [])
    ),
    tag = "Files"
)]
pub async fn file_info(
    ValidPath(id): ValidPath<String>,
    State(state): State<AppState>,
    user: Option<Extension<AuthUser>>,
) -> Result<Json<ApiResponse<FileInfo>>, AppError> {
    let requester = user.map(|Extension(user)| user.user_id);
    let info = state
        .files
        .file_info(&id, requester)
        .await?
        .ok_or_else(AppError::file_not_found)?;
    Ok(ApiResponse::ok(info))
}

#[utoipa::path(
    post,
    path = "/api/files/info-list",
    request_body = FileIdsRequest,
    responses(
        (status = 200, description = "Visible files, unknown ids are skipped", body = ApiResponse<Vec<FileInfo>>),
        (status = 400, description = "Empty or oversized batch")
    ),
    security(
        ("api_key" = []),
        ("api_key" = [], "bearer_auth" = [])
    ),
    tag = "Files"
)]
pub async fn info_list(
    State(state): State<AppState>,
    user: Option<Extension<AuthUser>>,
    ValidJson(payload): ValidJson<FileIdsRequest>,
) -> Result<Json<ApiResponse<Vec<FileInfo>>>, AppError> {
    let ids = payload.validated()?;
    let requester = user.map(|Extension(user)| user.user_id);
    let infos = state.files.file_info_list(&ids, requester).await?;
    Ok(ApiResponse::ok(infos))
}

#[utoipa::path(
    get,
    path = "/api/files/{id}/original-url",
    params(
        ("id" = String, Path, description = "File id or fid")
    ),
    responses(
        (status = 200, description = "Original rendition URL", body = ApiResponse<OriginalUrlResponse>),
        (status = 404, description = "File not found or disabled")
    ),
    security(
        ("api_key" = [])
    ),
    tag = "Files"
)]
pub async fn original_url(
    ValidPath(id): ValidPath<String>,
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<OriginalUrlResponse>>, AppError> {
    let original_url = state
        .files
        .original_url(&id)
        .await?
        .ok_or_else(AppError::file_not_found)?;
    Ok(ApiResponse::ok(OriginalUrlResponse { original_url }))
}

#[utoipa::path(
    post,
    path = "/api/files/logical-deletion",
    request_body = FileIdsRequest,
    responses(
        (status = 200, description = "Files disabled"),
        (status = 400, description = "Empty or oversized batch")
    ),
    security(
        ("api_key" = [])
    ),
    tag = "Files"
)]
pub async fn logical_deletion(
    State(state): State<AppState>,
    ValidJson(payload): ValidJson<FileIdsRequest>,
) -> Result<Json<ApiResponse<()>>, AppError> {
    let ids = payload.validated()?;
    state.files.logical_delete(&ids).await?;
    Ok(ApiResponse::empty())
}

#[utoipa::path(
    post,
    path = "/api/files/physical-deletion",
    request_body = FileIdsRequest,
    responses(
        (status = 200, description = "Files and stored objects removed"),
        (status = 400, description = "Empty or oversized batch"),
        (status = 502, description = "A primary object could not be deleted; later files were not processed")
    ),
    security(
        ("api_key" = [])
    ),
    tag = "Files"
)]
pub async fn physical_deletion(
    State(state): State<AppState>,
    ValidJson(payload): ValidJson<FileIdsRequest>,
) -> Result<Json<ApiResponse<()>>, AppError> {
    let ids = payload.validated()?;
    state.files.physical_delete(&ids).await?;
    Ok(ApiResponse::empty())
}
