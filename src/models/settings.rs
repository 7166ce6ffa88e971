//! Storage settings loaded from the storage TOML document.
//!
//! Every file type carries its own disk settings (driver, credentials, bucket,
//! anti-link window). Rendition rules, document preview, upload limits and
//! local thumbnail sizes are shared across drivers.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::entities::file::FileType;
use crate::entities::file_usage::UsageType;

pub const DEFAULT_ANTI_LINK_MINUTES: u32 = 30;
pub const DEFAULT_UPLOAD_TOKEN_MINUTES: u32 = 10;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum DriverKind {
    S3,
    Cloudinary,
    #[default]
    Local,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DiskSettings {
    pub driver: DriverKind,
    pub secret_id: Option<String>,
    pub secret_key: Option<String>,
    pub bucket_name: Option<String>,
    /// S3 region, or the Cloudinary delivery type (`upload`, `private`, `authenticated`).
    pub bucket_region: Option<String>,
    pub bucket_domain: String,
    pub endpoint: Option<String>,
    pub use_path_style_endpoint: bool,
    pub anti_link_status: bool,
    pub anti_link_expire: Option<u32>,
    pub cache_minutes: Option<u32>,
    pub local_root: String,
}

impl Default for DiskSettings {
    fn default() -> Self {
        Self {
            driver: DriverKind::Local,
            secret_id: None,
            secret_key: None,
            bucket_name: None,
            bucket_region: None,
            bucket_domain: "http://127.0.0.1:3000".to_string(),
            endpoint: None,
            use_path_style_endpoint: false,
            anti_link_status: true,
            anti_link_expire: None,
            cache_minutes: None,
            local_root: "./data/storage".to_string(),
        }
    }
}

impl DiskSettings {
    /// Validity window of anti-link URLs, in minutes.
    pub fn anti_link_minutes(&self) -> u32 {
        self.anti_link_expire
            .filter(|minutes| *minutes > 0)
            .unwrap_or(DEFAULT_ANTI_LINK_MINUTES)
    }
}

/// Where a rendition parameter is spliced into an object path.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum HandlePosition {
    PathStart,
    PathEnd,
    NameStart,
    #[default]
    NameEnd,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(default)]
pub struct HandleRule {
    pub position: HandlePosition,
    pub parameter: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ImageRules {
    pub position: HandlePosition,
    pub config: Option<String>,
    pub ratio: Option<String>,
    pub square: Option<String>,
    pub big: Option<String>,
}

impl Default for ImageRules {
    fn default() -> Self {
        Self {
            position: HandlePosition::NameEnd,
            config: Some("-config".to_string()),
            ratio: Some("-ratio".to_string()),
            square: Some("-square".to_string()),
            big: Some("-big".to_string()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(default)]
pub struct RenditionSettings {
    pub image: ImageRules,
    pub video: HandleRule,
    pub video_poster: HandleRule,
    pub audio: HandleRule,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct DocumentPreviewSettings {
    /// URL template; `{fid}` is replaced with the file's public id.
    pub url: Option<String>,
    pub extensions: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct TypeLimits {
    pub extensions: Vec<String>,
    /// Zero means unlimited.
    pub max_size_mb: u64,
    /// Seconds, zero means unlimited.
    pub max_duration: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UploadLimits {
    pub token_minutes: u32,
    pub max_upload_number: u32,
    pub allowed_usage_types: Vec<UsageType>,
    pub image: TypeLimits,
    pub video: TypeLimits,
    pub audio: TypeLimits,
    pub document: TypeLimits,
}

impl Default for UploadLimits {
    fn default() -> Self {
        let limits = |extensions: &[&str], max_size_mb, max_duration| TypeLimits {
            extensions: extensions.iter().map(|ext| ext.to_string()).collect(),
            max_size_mb,
            max_duration,
        };

        Self {
            token_minutes: DEFAULT_UPLOAD_TOKEN_MINUTES,
            max_upload_number: 9,
            allowed_usage_types: vec![
                UsageType::User,
                UsageType::Conversation,
                UsageType::Post,
                UsageType::Comment,
            ],
            image: limits(&["jpg", "jpeg", "png", "gif", "webp"], 5, 0),
            video: limits(&["mp4", "mov"], 50, 15 * 60),
            audio: limits(&["mp3", "m4a", "aac"], 20, 15 * 60),
            document: limits(&["pdf", "doc", "docx", "xls", "xlsx", "ppt", "pptx", "txt"], 10, 0),
        }
    }
}

impl UploadLimits {
    pub fn for_type(&self, file_type: FileType) -> &TypeLimits {
        match file_type {
            FileType::Image => &self.image,
            FileType::Video => &self.video,
            FileType::Audio => &self.audio,
            FileType::Document => &self.document,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VariantConfig {
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub max_width: Option<u32>,
    pub max_height: Option<u32>,
    pub fit: Option<String>, // cover, contain, fill
}

/// Thumbnail sizes produced by the local driver for uploaded images.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ThumbnailSettings {
    pub enabled: bool,
    pub config: VariantConfig,
    pub ratio: VariantConfig,
    pub square: VariantConfig,
    pub big: VariantConfig,
}

impl Default for ThumbnailSettings {
    fn default() -> Self {
        let variant = |width, height, fit: Option<&str>| VariantConfig {
            width,
            height,
            max_width: None,
            max_height: None,
            fit: fit.map(str::to_string),
        };

        Self {
            enabled: true,
            config: VariantConfig {
                max_width: Some(400),
                max_height: Some(400),
                ..variant(None, None, None)
            },
            ratio: variant(Some(400), None, None),
            square: variant(Some(200), Some(200), Some("cover")),
            big: variant(Some(1500), None, None),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct StorageSettings {
    pub image: DiskSettings,
    pub video: DiskSettings,
    pub audio: DiskSettings,
    pub document: DiskSettings,
    pub renditions: RenditionSettings,
    pub document_preview: DocumentPreviewSettings,
    pub upload: UploadLimits,
    pub thumbnails: ThumbnailSettings,
}

impl StorageSettings {
    /// Reads the TOML document at `path`. A missing file yields the defaults
    /// (local driver for every type).
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            tracing::warn!(path = %path.display(), "storage config not found, using local defaults");
            return Ok(Self::default());
        }

        let raw = std::fs::read_to_string(path)?;
        Self::from_toml(&raw)
    }

    pub fn from_toml(raw: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(raw)?)
    }

    pub fn disk(&self, file_type: FileType) -> &DiskSettings {
        match file_type {
            FileType::Image => &self.image,
            FileType::Video => &self.video,
            FileType::Audio => &self.audio,
            FileType::Document => &self.document,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_partial_document_with_defaults() {
        let raw = r#"
            [image]
            driver = "s3"
            bucket_name = "media"
            bucket_region = "eu-west-1"
            bucket_domain = "https://cdn.example.com"
            anti_link_expire = 10

            [video]
            driver = "cloudinary"
            anti_link_status = false

            [renditions.image]
            position = "path-end"
            config = "?x-image-process=style/config"

            [upload]
            allowed_usage_types = ["post", "comment"]
        "#;

        let settings = StorageSettings::from_toml(raw).unwrap();
        assert_eq!(settings.image.driver, DriverKind::S3);
        assert_eq!(settings.image.anti_link_minutes(), 10);
        assert!(settings.image.anti_link_status);
        assert_eq!(settings.video.driver, DriverKind::Cloudinary);
        assert!(!settings.video.anti_link_status);
        assert_eq!(settings.audio.driver, DriverKind::Local);
        assert_eq!(settings.renditions.image.position, HandlePosition::PathEnd);
        assert_eq!(settings.renditions.image.ratio, None);
        assert_eq!(
            settings.upload.allowed_usage_types,
            vec![UsageType::Post, UsageType::Comment]
        );
        assert_eq!(settings.upload.token_minutes, DEFAULT_UPLOAD_TOKEN_MINUTES);
    }

    #[test]
    fn anti_link_window_falls_back_when_unset_or_zero() {
        let mut disk = DiskSettings::default();
        assert_eq!(disk.anti_link_minutes(), DEFAULT_ANTI_LINK_MINUTES);
        disk.anti_link_expire = Some(0);
        assert_eq!(disk.anti_link_minutes(), DEFAULT_ANTI_LINK_MINUTES);
        disk.anti_link_expire = Some(5);
        assert_eq!(disk.anti_link_minutes(), 5);
    }
}
