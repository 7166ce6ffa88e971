//! File reads and the deletion lifecycle.

use chrono::Utc;
use sea_orm::{
    sea_query::Expr, ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter,
};
use std::sync::Arc;
use std::time::Duration;

use crate::entities::file::{self, FileType};
use crate::entities::file_usage;
use crate::error::AppError;
use crate::models::file_info::FileInfo;
use crate::models::rendition::Rendition;
use crate::models::settings::StorageSettings;
use crate::services::cache::FileInfoCache;
use crate::services::storage::{plan_rendition, StorageDriver, StorageDrivers};
use crate::utils::is_pure_int;

const DEFAULT_LONG_CACHE_MINUTES: u32 = 1440;
const DEFAULT_SHORT_CACHE_MINUTES: u32 = 120;
/// Cached URLs are evicted this long before their signatures expire.
const SIGNATURE_MARGIN_MINUTES: u32 = 2;

#[derive(Clone)]
pub struct FileService {
    db: DatabaseConnection,
    drivers: Arc<StorageDrivers>,
    cache: FileInfoCache,
    settings: Arc<StorageSettings>,
}

impl FileService {
    pub fn new(
        db: DatabaseConnection,
        drivers: Arc<StorageDrivers>,
        cache: FileInfoCache,
        settings: Arc<StorageSettings>,
    ) -> Self {
        Self {
            db,
            drivers,
            cache,
            settings,
        }
    }

    pub fn cache(&self) -> &FileInfoCache {
        &self.cache
    }

    pub fn settings(&self) -> &StorageSettings {
        &self.settings
    }

    /// Looks a file up by numeric id or by fid.
    pub async fn find(&self, id_or_fid: &str) -> Result<Option<file::Model>, AppError> {
        if is_pure_int(id_or_fid) {
            let Ok(id) = id_or_fid.parse::<i32>() else {
                return Ok(None);
            };
            return Ok(file::Entity::find_by_id(id).one(&self.db).await?);
        }

        Ok(file::Entity::find()
            .filter(file::Column::Fid.eq(id_or_fid))
            .one(&self.db)
            .await?)
    }

    /// Whether `user_id` holds the upload usage of the file.
    pub async fn is_uploader(&self, file_id: i32, user_id: i64) -> Result<bool, AppError> {
        let count = file_usage::Entity::find()
            .filter(file_usage::Column::FileId.eq(file_id))
            .filter(file_usage::Column::UserId.eq(user_id))
            .count(&self.db)
            .await?;
        Ok(count > 0)
    }

    /// Cache lifetime of a projection. Signed URLs must never outlive their window.
    pub fn cache_ttl(&self, file_type: FileType) -> Duration {
        let disk = self.settings.disk(file_type);
        let minutes = if disk.anti_link_status {
            disk.anti_link_minutes()
                .saturating_sub(SIGNATURE_MARGIN_MINUTES)
                .max(1)
        } else {
            disk.cache_minutes.unwrap_or(match file_type {
                FileType::Image | FileType::Document => DEFAULT_LONG_CACHE_MINUTES,
                FileType::Video | FileType::Audio => DEFAULT_SHORT_CACHE_MINUTES,
            })
        };
        Duration::from_secs(u64::from(minutes) * 60)
    }

    /// Projection of an enabled file. Pending files are visible to their
    /// uploader only and are never cached.
    pub async fn file_info(
        &self,
        id_or_fid: &str,
        requester: Option<i64>,
    ) -> Result<Option<FileInfo>, AppError> {
        let Some(file) = self.find(id_or_fid).await? else {
            return Ok(None);
        };
        self.visible_info(&file, requester).await
    }

    pub async fn file_info_list(
        &self,
        ids: &[String],
        requester: Option<i64>,
    ) -> Result<Vec<FileInfo>, AppError> {
        let mut infos = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(info) = self.file_info(id, requester).await? {
                infos.push(info);
            }
        }
        Ok(infos)
    }

    async fn visible_info(
        &self,
        file: &file::Model,
        requester: Option<i64>,
    ) -> Result<Option<FileInfo>, AppError> {
        if !file.is_enabled {
            return Ok(None);
        }

        if !file.is_uploaded {
            let owned = match requester {
                Some(user_id) => self.is_uploader(file.id, user_id).await?,
                None => false,
            };
            if !owned {
                return Ok(None);
            }
            return Ok(Some(self.project(file).await?));
        }

        if let Some(info) = self.cache.get(&file.fid).await {
            tracing::debug!(fid = %file.fid, "file info cache hit");
            return Ok(Some(info));
        }

        let info = self.project(file).await?;
        self.cache
            .put(&file.fid, info.clone(), self.cache_ttl(file.file_type))
            .await;
        Ok(Some(info))
    }

    /// Builds the projection with every rendition URL applicable to the type.
    pub async fn project(&self, file: &file::Model) -> Result<FileInfo, AppError> {
        let mut info = FileInfo::from_model(file);
        for rendition in Rendition::projected_for(file.file_type) {
            let url = self.rendition_url(file, *rendition).await?;
            info.set_url(*rendition, url);
        }
        Ok(info)
    }

    pub async fn original_url(&self, id_or_fid: &str) -> Result<Option<String>, AppError> {
        match self.find(id_or_fid).await? {
            Some(file) if file.is_enabled && file.is_uploaded => {
                self.rendition_url(&file, Rendition::Original).await
            }
            _ => Ok(None),
        }
    }

    /// Signed URL when anti-link protection is on for the type, a stable URL otherwise.
    pub async fn rendition_url(
        &self,
        file: &file::Model,
        rendition: Rendition,
    ) -> Result<Option<String>, AppError> {
        if !file.is_enabled {
            return Ok(None);
        }
        if rendition == Rendition::DocumentPreview {
            return Ok(self.document_preview_url(file));
        }
        let Some(plan) = plan_rendition(file, rendition, &self.settings.renditions) else {
            return Ok(None);
        };

        let disk = self.settings.disk(file.file_type);
        let driver = self.driver(file.file_type)?;
        let url = if disk.anti_link_status {
            let expires_at =
                Utc::now() + chrono::Duration::minutes(i64::from(disk.anti_link_minutes()));
            driver.signed_url(file, &plan, expires_at).await
        } else {
            driver.public_url(file, &plan)
        };

        url.map(Some).map_err(AppError::url_derivation)
    }

    fn document_preview_url(&self, file: &file::Model) -> Option<String> {
        if file.file_type != FileType::Document {
            return None;
        }
        let preview = &self.settings.document_preview;
        let template = preview.url.as_deref().filter(|t| !t.is_empty())?;
        preview
            .extensions
            .iter()
            .any(|ext| ext.eq_ignore_ascii_case(&file.extension))
            .then(|| template.replace("{fid}", &file.fid))
    }

    fn driver(&self, file_type: FileType) -> Result<Arc<dyn StorageDriver>, AppError> {
        self.drivers
            .get(file_type)
            .map_err(|e| AppError::Internal(e.to_string()))
    }

    /// Disables files. Already-disabled and unknown files are skipped.
    pub async fn logical_delete(&self, ids: &[String]) -> Result<(), AppError> {
        for id in ids {
            let Some(file) = self.find(id).await? else {
                continue;
            };

            let now = Utc::now().naive_utc();
            file::Entity::update_many()
                .col_expr(file::Column::IsEnabled, Expr::value(false))
                .col_expr(file::Column::DeletedAt, Expr::value(now))
                .col_expr(file::Column::UpdatedAt, Expr::value(now))
                .filter(file::Column::Id.eq(file.id))
                .filter(file::Column::IsEnabled.eq(true))
                .exec(&self.db)
                .await?;

            self.cache.invalidate(&file.fid).await;
            tracing::info!(fid = %file.fid, "file disabled");
        }
        Ok(())
    }

    /// Removes files from storage and the database, in order. Stops at the
    /// first file whose primary object cannot be deleted; files already
    /// processed stay deleted.
    pub async fn physical_delete(&self, ids: &[String]) -> Result<(), AppError> {
        for id in ids {
            let Some(file) = self.find(id).await? else {
                continue;
            };
            let driver = self.driver(file.file_type)?;

            file_usage::Entity::delete_many()
                .filter(file_usage::Column::FileId.eq(file.id))
                .exec(&self.db)
                .await?;

            if let Err(e) = driver.delete_object(file.file_type, &file.path).await {
                tracing::warn!(fid = %file.fid, path = %file.path, error = %e, "primary object delete failed");
                return Err(AppError::delete_failed(e));
            }

            for path in self.secondary_objects(&file, driver.as_ref()) {
                if let Err(e) = driver.delete_object(file.file_type, &path).await {
                    tracing::warn!(fid = %file.fid, %path, error = %e, "secondary object delete failed");
                }
            }

            file::Entity::update_many()
                .col_expr(file::Column::PhysicalDeletion, Expr::value(true))
                .filter(file::Column::Id.eq(file.id))
                .exec(&self.db)
                .await?;
            file::Entity::delete_by_id(file.id).exec(&self.db).await?;

            self.cache.invalidate(&file.fid).await;
            tracing::info!(fid = %file.fid, "file physically deleted");
        }
        Ok(())
    }

    /// Poster, original and stored thumbnails that belong to a file.
    fn secondary_objects(&self, file: &file::Model, driver: &dyn StorageDriver) -> Vec<String> {
        let mut paths = Vec::new();

        if driver.stores_renditions() && file.file_type == FileType::Image {
            for rendition in Rendition::projected_for(FileType::Image) {
                if let Some(plan) = plan_rendition(file, *rendition, &self.settings.renditions) {
                    paths.push(plan.object_path);
                }
            }
        }
        if file.file_type == FileType::Video {
            paths.extend(file.video_poster_path.clone());
        }
        paths.extend(file.original_path.clone());

        paths.retain(|path| path != &file.path);
        paths.sort();
        paths.dedup();
        paths
    }
}
