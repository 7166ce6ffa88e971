use async_trait::async_trait;
use aws_sdk_s3::presigning::PresigningConfig;
use aws_sdk_s3::Client;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::time::Duration;

use super::{RenditionPlan, StorageDriver, StorageError, UploadCredential, UploadTarget};
use crate::entities::file::{self, FileType};
use crate::models::settings::{DiskSettings, DriverKind};
use crate::utils::qualify_url;

/// S3-compatible bucket. Renditions are served by presigned GETs, uploads by
/// presigned PUTs.
pub struct S3Driver {
    client: Client,
    bucket_name: String,
    settings: DiskSettings,
}

impl S3Driver {
    pub async fn new(settings: DiskSettings) -> Result<Self, StorageError> {
        let bucket_name = settings
            .bucket_name
            .clone()
            .ok_or_else(|| StorageError::Config("s3 bucket_name is required".to_string()))?;
        let region = settings
            .bucket_region
            .clone()
            .unwrap_or_else(|| "us-east-1".to_string());

        let mut s3_config_builder = aws_sdk_s3::config::Builder::new()
            .behavior_version(aws_sdk_s3::config::BehaviorVersion::latest())
            .region(aws_sdk_s3::config::Region::new(region));

        match (&settings.secret_id, &settings.secret_key) {
            (Some(id), Some(key)) => {
                let credentials = aws_sdk_s3::config::Credentials::new(
                    id.clone(),
                    key.clone(),
                    None,
                    None,
                    "storage_config",
                );
                s3_config_builder = s3_config_builder.credentials_provider(credentials);
            }
            _ => {
                let shared = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;
                if let Some(provider) = shared.credentials_provider() {
                    s3_config_builder = s3_config_builder.credentials_provider(provider);
                }
            }
        }

        if let Some(endpoint) = &settings.endpoint {
            s3_config_builder = s3_config_builder
                .endpoint_url(endpoint)
                .force_path_style(settings.use_path_style_endpoint);
        }

        Ok(Self {
            client: Client::from_conf(s3_config_builder.build()),
            bucket_name,
            settings,
        })
    }
}

fn presigning_config(expires_at: DateTime<Utc>) -> Result<PresigningConfig, StorageError> {
    let expires_in = (expires_at - Utc::now())
        .to_std()
        .unwrap_or(Duration::from_secs(1));
    PresigningConfig::expires_in(expires_in).map_err(|e| {
        tracing::error!(error = %e, "presigning config error");
        StorageError::Config(e.to_string())
    })
}

#[async_trait]
impl StorageDriver for S3Driver {
    fn kind(&self) -> DriverKind {
        DriverKind::S3
    }

    async fn signed_url(
        &self,
        _file: &file::Model,
        plan: &RenditionPlan,
        expires_at: DateTime<Utc>,
    ) -> Result<String, StorageError> {
        let presigned_req = self
            .client
            .get_object()
            .bucket(&self.bucket_name)
            .key(&plan.object_path)
            .response_content_disposition(format!(
                "attachment; filename=\"{}\"",
                plan.download_name.replace('"', "")
            ))
            .presigned(presigning_config(expires_at)?)
            .await
            .map_err(|e| {
                tracing::error!(error = %e, key = %plan.object_path, "presigning error");
                StorageError::Request(e.to_string())
            })?;

        Ok(presigned_req.uri().to_string())
    }

    fn public_url(&self, _file: &file::Model, plan: &RenditionPlan) -> Result<String, StorageError> {
        Ok(qualify_url(&plan.object_path, &self.settings.bucket_domain))
    }

    async fn upload_credential(
        &self,
        target: &UploadTarget,
    ) -> Result<UploadCredential, StorageError> {
        let mut request = self
            .client
            .put_object()
            .bucket(&self.bucket_name)
            .key(&target.path);
        if let Some(mime) = &target.mime {
            request = request.content_type(mime);
        }

        let presigned_req = request
            .presigned(presigning_config(target.expires_at)?)
            .await
            .map_err(|e| {
                tracing::error!(error = %e, key = %target.path, "presigning error");
                StorageError::Request(e.to_string())
            })?;

        let headers: BTreeMap<String, String> = presigned_req
            .headers()
            .map(|(name, value)| (name.to_string(), value.to_string()))
            .collect();

        Ok(UploadCredential {
            method: "PUT".to_string(),
            url: presigned_req.uri().to_string(),
            headers,
            fields: BTreeMap::new(),
        })
    }

    async fn delete_object(&self, _file_type: FileType, path: &str) -> Result<(), StorageError> {
        self.client
            .delete_object()
            .bucket(&self.bucket_name)
            .key(path)
            .send()
            .await
            .map_err(|e| {
                tracing::error!(error = %e, key = %path, "s3 delete error");
                StorageError::Request(e.to_string())
            })?;

        Ok(())
    }
}
