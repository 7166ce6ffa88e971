//! Storage backends and the rendition planning they share.
//!
//! Each file type is bound to one driver at startup. Drivers never see the
//! database; they receive the file row and a [`RenditionPlan`] and answer with
//! URLs, upload credentials or delete outcomes.

pub mod cloudinary;
pub mod local;
pub mod s3;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use crate::entities::file::{self, FileType};
use crate::models::rendition::Rendition;
use crate::models::settings::{DriverKind, HandleRule, RenditionSettings, StorageSettings};
use crate::services::signer::TokenSigner;
use crate::utils::{apply_handle_position, path_extension};

pub use cloudinary::CloudinaryDriver;
pub use local::{LocalDriver, LocalStore};
pub use s3::S3Driver;

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("storage request failed: {0}")]
    Request(String),
    #[error("storage driver is misconfigured: {0}")]
    Config(String),
    #[error("invalid object key: {0}")]
    InvalidKey(String),
    #[error("object not found")]
    NotFound,
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// How one rendition of a file maps onto a stored object.
#[derive(Debug, Clone, PartialEq)]
pub struct RenditionPlan {
    pub rendition: Rendition,
    /// The stored object the rendition derives from.
    pub source_path: String,
    /// `source_path` with the handle parameter spliced in.
    pub object_path: String,
    pub parameter: Option<String>,
    pub format: String,
    pub download_name: String,
}

/// Resolves the object behind a rendition. Returns `None` when the rendition
/// does not apply to the file type or has no stored source (a video without a
/// poster, a file without an original). Document previews are not objects.
pub fn plan_rendition(
    file: &file::Model,
    rendition: Rendition,
    rules: &RenditionSettings,
) -> Option<RenditionPlan> {
    if !rendition.applies_to(file.file_type) {
        return None;
    }

    let (source_path, rule) = match rendition {
        Rendition::DocumentPreview => return None,
        Rendition::Original => (file.original_path.clone().unwrap_or_else(|| file.path.clone()), None),
        Rendition::VideoPoster => (file.video_poster_path.clone()?, Some(rules.video_poster.clone())),
        Rendition::Video => (file.path.clone(), Some(rules.video.clone())),
        Rendition::Audio => (file.path.clone(), Some(rules.audio.clone())),
        Rendition::ImageConfig => (file.path.clone(), Some(image_rule(rules, &rules.image.config))),
        Rendition::ImageRatio => (file.path.clone(), Some(image_rule(rules, &rules.image.ratio))),
        Rendition::ImageSquare => (file.path.clone(), Some(image_rule(rules, &rules.image.square))),
        Rendition::ImageBig => (file.path.clone(), Some(image_rule(rules, &rules.image.big))),
    };

    let parameter = rule
        .as_ref()
        .and_then(|rule| rule.parameter.clone())
        .filter(|p| !p.is_empty());
    let object_path = match (&rule, &parameter) {
        (Some(rule), Some(parameter)) => {
            apply_handle_position(rule.position, parameter, &source_path)
        }
        _ => source_path.clone(),
    };
    let format = path_extension(&source_path).unwrap_or_else(|| file.extension.to_ascii_lowercase());
    let download_name = match rendition {
        Rendition::VideoPoster => source_path
            .rsplit('/')
            .next()
            .unwrap_or(&source_path)
            .to_string(),
        _ => file.name.clone(),
    };

    Some(RenditionPlan {
        rendition,
        source_path,
        object_path,
        parameter,
        format,
        download_name,
    })
}

fn image_rule(rules: &RenditionSettings, parameter: &Option<String>) -> HandleRule {
    HandleRule {
        position: rules.image.position,
        parameter: parameter.clone(),
    }
}

/// What a client needs to put bytes at `path`.
#[derive(Debug, Clone)]
pub struct UploadTarget {
    pub file_type: FileType,
    pub path: String,
    pub mime: Option<String>,
    pub expires_at: DateTime<Utc>,
}

/// Backend-specific upload instructions handed to the client.
#[derive(Debug, Clone, Serialize, PartialEq, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UploadCredential {
    pub method: String,
    pub url: String,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub headers: BTreeMap<String, String>,
    /// Form fields for POST uploads.
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub fields: BTreeMap<String, String>,
}

#[async_trait]
pub trait StorageDriver: Send + Sync {
    fn kind(&self) -> DriverKind;

    /// URL for a rendition that stops working after `expires_at`.
    async fn signed_url(
        &self,
        file: &file::Model,
        plan: &RenditionPlan,
        expires_at: DateTime<Utc>,
    ) -> Result<String, StorageError>;

    /// Stable URL used when anti-link protection is off.
    fn public_url(&self, file: &file::Model, plan: &RenditionPlan) -> Result<String, StorageError>;

    async fn upload_credential(&self, target: &UploadTarget)
        -> Result<UploadCredential, StorageError>;

    /// Poster object the backend derives for an uploaded video, if any.
    fn video_poster_path(&self, _file_type: FileType, _path: &str) -> Option<String> {
        None
    }

    /// Whether renditions are separate stored objects that must be deleted
    /// along with the primary.
    fn stores_renditions(&self) -> bool {
        false
    }

    /// Deletes one object. An already-missing object is a success.
    async fn delete_object(&self, file_type: FileType, path: &str) -> Result<(), StorageError>;
}

/// Driver bound to each file type.
#[derive(Clone)]
pub struct StorageDrivers {
    drivers: HashMap<FileType, Arc<dyn StorageDriver>>,
    local_stores: HashMap<FileType, LocalStore>,
}

impl StorageDrivers {
    pub async fn from_settings(
        settings: &StorageSettings,
        signer: &TokenSigner,
    ) -> Result<Self, StorageError> {
        let mut drivers = Self {
            drivers: HashMap::new(),
            local_stores: HashMap::new(),
        };

        for file_type in [FileType::Image, FileType::Video, FileType::Audio, FileType::Document] {
            let disk = settings.disk(file_type).clone();
            let driver: Arc<dyn StorageDriver> = match disk.driver {
                DriverKind::S3 => Arc::new(S3Driver::new(disk).await?),
                DriverKind::Cloudinary => Arc::new(CloudinaryDriver::new(disk)?),
                DriverKind::Local => {
                    let store = LocalStore::new(&disk.local_root);
                    drivers.local_stores.insert(file_type, store.clone());
                    Arc::new(LocalDriver::new(disk, store, signer.clone()))
                }
            };
            tracing::info!(file_type = file_type.as_str(), driver = ?driver.kind(), "storage driver ready");
            drivers.drivers.insert(file_type, driver);
        }

        Ok(drivers)
    }

    /// Binds one driver to every file type.
    pub fn uniform(driver: Arc<dyn StorageDriver>) -> Self {
        let drivers = [FileType::Image, FileType::Video, FileType::Audio, FileType::Document]
            .into_iter()
            .map(|file_type| (file_type, driver.clone()))
            .collect();
        Self {
            drivers,
            local_stores: HashMap::new(),
        }
    }

    pub fn get(&self, file_type: FileType) -> Result<Arc<dyn StorageDriver>, StorageError> {
        self.drivers
            .get(&file_type)
            .cloned()
            .ok_or_else(|| StorageError::Config(format!("no driver for {}", file_type.as_str())))
    }

    /// Filesystem store for types served by the local driver.
    pub fn local_store(&self, file_type: FileType) -> Option<&LocalStore> {
        self.local_stores.get(&file_type)
    }
}
