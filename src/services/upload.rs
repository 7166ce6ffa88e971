//! Upload lifecycle: credential issue (PENDING) and confirmation (CONFIRMED).

use chrono::{NaiveDateTime, Utc};
use sea_orm::{
    sea_query::Expr, ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait,
    PaginatorTrait, QueryFilter, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use uuid::Uuid;

use crate::entities::file::{self, FileType, TranscodingState, WarningType};
use crate::entities::file_usage::{self, UsageType};
use crate::error::AppError;
use crate::models::file_info::FileInfo;
use crate::models::settings::StorageSettings;
use crate::services::files::FileService;
use crate::services::policy::{UploadMetadata, UploadPolicy};
use crate::services::storage::{StorageDrivers, UploadCredential, UploadTarget};
use crate::utils::{generate_fid, is_pure_int, storage_directory};

const DEFAULT_SORT_ORDER: i32 = 9;

#[derive(Debug, Clone, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UploadTokenRequest {
    /// `image`, `video`, `audio` or `document`.
    pub file_type: String,
    /// Usage name, e.g. `userAvatar`, `post`, `commentDraft`.
    pub usage_type: String,
    pub usage_fsid: Option<String>,
    pub table_id: Option<i64>,
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
    pub sort_order: Option<i32>,
    #[schema(value_type = Object)]
    pub more_info: Option<Value>,
}

#[derive(Debug, Clone, Serialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UploadTokenResponse {
    pub fid: String,
    #[serde(flatten)]
    pub credential: UploadCredential,
    pub active_minutes: u32,
    pub expiration: String,
}

/// Who is uploading, and for which platform.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Uploader {
    pub platform_id: i32,
    pub user_id: i64,
}

/// Owning entity of an upload, derived from the request's usage name.
#[derive(Debug, Clone, PartialEq)]
pub struct UsageContext {
    pub usage_type: UsageType,
    pub table_name: String,
    pub table_column: String,
    pub table_id: Option<i64>,
    pub table_key: Option<String>,
}

impl UsageContext {
    pub fn resolve(usage_name: &str, usage_fsid: Option<&str>, table_id: Option<i64>) -> Self {
        let (usage_type, table_name, table_column) = match usage_name {
            "userAvatar" => (UsageType::User, "users", "avatar_file_id"),
            "userBanner" => (UsageType::User, "users", "banner_file_id"),
            "conversation" => (UsageType::Conversation, "conversation_messages", "message_file_id"),
            "post" => (UsageType::Post, "posts", "id"),
            "postDraft" => (UsageType::Post, "post_logs", "id"),
            "comment" => (UsageType::Comment, "comments", "id"),
            "commentDraft" => (UsageType::Comment, "comment_logs", "id"),
            _ => (UsageType::Other, "files", "id"),
        };

        let fsid = usage_fsid.map(str::trim).filter(|s| !s.is_empty());
        let (table_id, table_key) = match fsid {
            Some(fsid) if is_pure_int(fsid) => (fsid.parse().ok().or(table_id), None),
            Some(fsid) => (table_id, Some(fsid.to_string())),
            None => (table_id, None),
        };

        Self {
            usage_type,
            table_name: table_name.to_string(),
            table_column: table_column.to_string(),
            table_id,
            table_key,
        }
    }
}

#[derive(Clone)]
pub struct UploadService {
    db: DatabaseConnection,
    drivers: Arc<StorageDrivers>,
    files: FileService,
    policy: Arc<dyn UploadPolicy>,
    settings: Arc<StorageSettings>,
}

impl UploadService {
    pub fn new(
        db: DatabaseConnection,
        drivers: Arc<StorageDrivers>,
        files: FileService,
        policy: Arc<dyn UploadPolicy>,
        settings: Arc<StorageSettings>,
    ) -> Self {
        Self {
            db,
            drivers,
            files,
            policy,
            settings,
        }
    }

    pub fn policy(&self) -> &dyn UploadPolicy {
        self.policy.as_ref()
    }

    /// Validates the declared file, obtains a backend credential and records
    /// the file as PENDING together with its usage.
    pub async fn request_upload_credential(
        &self,
        uploader: Uploader,
        request: UploadTokenRequest,
    ) -> Result<UploadTokenResponse, AppError> {
        let file_type = FileType::parse(&request.file_type)
            .ok_or_else(|| AppError::Validation(format!("Unknown file type {}", request.file_type)))?;
        let usage = UsageContext::resolve(
            &request.usage_type,
            request.usage_fsid.as_deref(),
            request.table_id,
        );

        self.policy
            .authorize(uploader.user_id, usage.usage_type, file_type)
            .await?;

        let extension = request
            .extension
            .trim()
            .trim_start_matches('.')
            .to_ascii_lowercase();
        self.policy.validate(&UploadMetadata {
            file_type,
            extension: &extension,
            size: request.size,
            duration: request.duration,
        })?;
        if request.name.trim().is_empty() {
            return Err(AppError::Validation("File name is required".to_string()));
        }

        let now = Utc::now();
        let path = format!(
            "{}/{}.{}",
            storage_directory(file_type, usage.usage_type, now),
            Uuid::new_v4().simple(),
            extension
        );
        let minutes = self.settings.upload.token_minutes.max(1);
        let expires_at = now + chrono::Duration::minutes(i64::from(minutes));

        let driver = self
            .drivers
            .get(file_type)
            .map_err(AppError::upload_credential)?;
        let credential = driver
            .upload_credential(&UploadTarget {
                file_type,
                path: path.clone(),
                mime: request.mime.clone(),
                expires_at,
            })
            .await
            .map_err(AppError::upload_credential)?;
        let video_poster_path = driver.video_poster_path(file_type, &path);

        let fid = generate_fid();
        let timestamp = now.naive_utc();
        let txn = self.db.begin().await?;

        let file = file::ActiveModel {
            fid: Set(fid.clone()),
            file_type: Set(file_type),
            name: Set(request.name.trim().to_string()),
            mime: Set(request.mime),
            extension: Set(extension),
            size: Set(request.size),
            width: Set(request.width),
            height: Set(request.height),
            duration: Set(request.duration),
            sha: Set(request.sha),
            sha_type: Set(request.sha_type),
            path: Set(path),
            original_path: Set(None),
            video_poster_path: Set(video_poster_path),
            warning_type: Set(WarningType::parse(request.warning.as_deref())),
            transcoding_state: Set(TranscodingState::Wait),
            is_enabled: Set(true),
            is_uploaded: Set(false),
            physical_deletion: Set(false),
            created_at: Set(timestamp),
            updated_at: Set(timestamp),
            deleted_at: Set(None),
            ..Default::default()
        }
        .insert(&txn)
        .await?;

        file_usage::ActiveModel {
            file_id: Set(file.id),
            usage_type: Set(usage.usage_type),
            platform_id: Set(uploader.platform_id),
            table_name: Set(usage.table_name),
            table_column: Set(usage.table_column),
            table_id: Set(usage.table_id),
            table_key: Set(usage.table_key),
            sort_order: Set(request.sort_order.unwrap_or(DEFAULT_SORT_ORDER)),
            more_info: Set(request.more_info),
            account_id: Set(None),
            user_id: Set(Some(uploader.user_id)),
            remark: Set(None),
            created_at: Set(timestamp),
            ..Default::default()
        }
        .insert(&txn)
        .await?;

        txn.commit().await?;

        tracing::info!(
            fid = %fid,
            file_type = file_type.as_str(),
            driver = ?driver.kind(),
            user_id = uploader.user_id,
            "upload credential issued"
        );

        Ok(UploadTokenResponse {
            fid,
            credential,
            active_minutes: minutes,
            expiration: expires_at.to_rfc3339(),
        })
    }

    /// Number of credentials issued to `uploader` since `since`.
    pub async fn issued_since(
        &self,
        uploader: Uploader,
        since: NaiveDateTime,
    ) -> Result<u64, AppError> {
        Ok(file_usage::Entity::find()
            .filter(file_usage::Column::UserId.eq(uploader.user_id))
            .filter(file_usage::Column::PlatformId.eq(uploader.platform_id))
            .filter(file_usage::Column::CreatedAt.gte(since))
            .count(&self.db)
            .await?)
    }

    /// Marks a PENDING file as uploaded. Confirming twice is harmless.
    pub async fn confirm_upload(&self, fid: &str, user_id: i64) -> Result<FileInfo, AppError> {
        let file = file::Entity::find()
            .filter(file::Column::Fid.eq(fid))
            .one(&self.db)
            .await?
            .ok_or_else(AppError::file_not_found)?;

        if !file.is_enabled {
            return Err(AppError::file_disabled());
        }
        if !self.files.is_uploader(file.id, user_id).await? {
            return Err(AppError::not_uploader());
        }

        let result = file::Entity::update_many()
            .col_expr(file::Column::IsUploaded, Expr::value(true))
            .col_expr(file::Column::UpdatedAt, Expr::value(Utc::now().naive_utc()))
            .filter(file::Column::Id.eq(file.id))
            .filter(file::Column::IsEnabled.eq(true))
            .exec(&self.db)
            .await?;
        if result.rows_affected == 0 {
            return Err(AppError::file_disabled());
        }

        self.files.cache().invalidate(&file.fid).await;
        tracing::info!(fid = %file.fid, user_id, "upload confirmed");

        self.files
            .file_info(&file.fid, Some(user_id))
            .await?
            .ok_or_else(AppError::file_disabled)
    }
}
