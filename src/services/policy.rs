use async_trait::async_trait;

use crate::entities::file::FileType;
use crate::entities::file_usage::UsageType;
use crate::error::AppError;
use crate::models::settings::UploadLimits;

/// Declared metadata checked before an upload credential is issued.
#[derive(Debug, Clone)]
pub struct UploadMetadata<'a> {
    pub file_type: FileType,
    pub extension: &'a str,
    pub size: i64,
    pub duration: Option<i32>,
}

/// What the caller may upload for a usage.
#[derive(Debug, Clone, PartialEq)]
pub struct UploadPermission {
    pub max_upload_number: u32,
}

/// Upload limits and permissions. Hosts plug their own rules in here.
#[async_trait]
pub trait UploadPolicy: Send + Sync {
    async fn authorize(
        &self,
        user_id: i64,
        usage_type: UsageType,
        file_type: FileType,
    ) -> Result<UploadPermission, AppError>;

    fn validate(&self, metadata: &UploadMetadata<'_>) -> Result<(), AppError>;
}

/// Policy driven by the `[upload]` storage settings.
pub struct ConfigUploadPolicy {
    limits: UploadLimits,
}

impl ConfigUploadPolicy {
    pub fn new(limits: UploadLimits) -> Self {
        Self { limits }
    }
}

#[async_trait]
impl UploadPolicy for ConfigUploadPolicy {
    async fn authorize(
        &self,
        user_id: i64,
        usage_type: UsageType,
        file_type: FileType,
    ) -> Result<UploadPermission, AppError> {
        if user_id <= 0 {
            return Err(AppError::Authorization("Unknown uploader".to_string()));
        }
        if !self.limits.allowed_usage_types.contains(&usage_type) {
            tracing::debug!(user_id, ?usage_type, "upload usage not allowed");
            return Err(AppError::Authorization(format!(
                "Uploads are not allowed for this usage ({})",
                file_type.as_str()
            )));
        }

        Ok(UploadPermission {
            max_upload_number: self.limits.max_upload_number,
        })
    }

    fn validate(&self, metadata: &UploadMetadata<'_>) -> Result<(), AppError> {
        let limits = self.limits.for_type(metadata.file_type);
        let extension = metadata.extension.trim_start_matches('.').to_ascii_lowercase();

        if extension.is_empty() {
            return Err(AppError::Validation("File extension is required".to_string()));
        }
        if !limits.extensions.is_empty()
            && !limits.extensions.iter().any(|e| e.eq_ignore_ascii_case(&extension))
        {
            return Err(AppError::Validation(format!(
                "Extension {extension} is not allowed for {} files",
                metadata.file_type.as_str()
            )));
        }
        if metadata.size <= 0 {
            return Err(AppError::Validation("File size must be positive".to_string()));
        }
        if limits.max_size_mb > 0 && metadata.size as u64 > limits.max_size_mb * 1024 * 1024 {
            return Err(AppError::Validation(format!(
                "File exceeds the {} MB limit",
                limits.max_size_mb
            )));
        }
        if matches!(metadata.file_type, FileType::Video | FileType::Audio) && limits.max_duration > 0 {
            if let Some(duration) = metadata.duration {
                if duration < 0 || duration as u32 > limits.max_duration {
                    return Err(AppError::Validation(format!(
                        "Duration exceeds the {} second limit",
                        limits.max_duration
                    )));
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> ConfigUploadPolicy {
        ConfigUploadPolicy::new(UploadLimits::default())
    }

    fn image(extension: &str, size: i64) -> UploadMetadata<'_> {
        UploadMetadata {
            file_type: FileType::Image,
            extension,
            size,
            duration: None,
        }
    }

    #[test]
    fn accepts_listed_extensions_within_size() {
        assert!(policy().validate(&image("JPG", 100_000)).is_ok());
        assert!(policy().validate(&image(".png", 100_000)).is_ok());
    }

    #[test]
    fn rejects_bad_metadata() {
        let policy = policy();
        assert!(matches!(policy.validate(&image("exe", 10)), Err(AppError::Validation(_))));
        assert!(matches!(policy.validate(&image("jpg", 0)), Err(AppError::Validation(_))));
        assert!(matches!(
            policy.validate(&image("jpg", 6 * 1024 * 1024)),
            Err(AppError::Validation(_))
        ));

        let long_video = UploadMetadata {
            file_type: FileType::Video,
            extension: "mp4",
            size: 1_000,
            duration: Some(3_600),
        };
        assert!(matches!(policy.validate(&long_video), Err(AppError::Validation(_))));
    }

    #[tokio::test]
    async fn authorizes_only_configured_usages() {
        let policy = policy();
        let permission = policy
            .authorize(7, UsageType::Post, FileType::Image)
            .await
            .unwrap();
        assert_eq!(permission.max_upload_number, 9);

        assert!(matches!(
            policy.authorize(7, UsageType::System, FileType::Image).await,
            Err(AppError::Authorization(_))
        ));
        assert!(matches!(
            policy.authorize(0, UsageType::Post, FileType::Image).await,
            Err(AppError::Authorization(_))
        ));
    }
}
