use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use url::Url;

use super::{RenditionPlan, StorageDriver, StorageError, UploadCredential, UploadTarget};
use crate::entities::file::{self, FileType};
use crate::models::rendition::Rendition;
use crate::models::settings::{DiskSettings, DriverKind};
use crate::utils::replace_extension;

const API_BASE: &str = "https://api.cloudinary.com/v1_1";
const DELIVERY_BASE: &str = "https://res.cloudinary.com";

/// Cloudinary account. `bucket_name` is the cloud name, `secret_id`/`secret_key`
/// the API key pair and `bucket_region` the delivery type.
pub struct CloudinaryDriver {
    cloud_name: String,
    api_key: String,
    api_secret: String,
    delivery_type: String,
    api_base: String,
    http: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct DestroyResponse {
    result: Option<String>,
    error: Option<DestroyError>,
}

#[derive(Debug, Deserialize)]
struct DestroyError {
    message: String,
}

pub fn resource_type(file_type: FileType) -> &'static str {
    match file_type {
        FileType::Image => "image",
        FileType::Video | FileType::Audio => "video",
        FileType::Document => "raw",
    }
}

/// Object path without its extension.
pub fn public_id(path: &str) -> &str {
    let name_start = path.rfind('/').map(|i| i + 1).unwrap_or(0);
    match path[name_start..].rfind('.') {
        Some(dot) => &path[..name_start + dot],
        None => path,
    }
}

impl CloudinaryDriver {
    pub fn new(settings: DiskSettings) -> Result<Self, StorageError> {
        let require = |value: &Option<String>, name: &str| {
            value
                .clone()
                .filter(|v| !v.is_empty())
                .ok_or_else(|| StorageError::Config(format!("cloudinary {name} is required")))
        };

        Ok(Self {
            cloud_name: require(&settings.bucket_name, "bucket_name")?,
            api_key: require(&settings.secret_id, "secret_id")?,
            api_secret: require(&settings.secret_key, "secret_key")?,
            delivery_type: settings
                .bucket_region
                .clone()
                .unwrap_or_else(|| "upload".to_string()),
            api_base: settings
                .endpoint
                .clone()
                .unwrap_or_else(|| API_BASE.to_string()),
            http: reqwest::Client::new(),
        })
    }

    /// SHA-256 over the sorted `key=value` pairs joined by `&`, followed by the secret.
    pub fn sign(&self, params: &BTreeMap<&str, String>) -> String {
        let to_sign = params
            .iter()
            .filter(|(_, value)| !value.is_empty())
            .map(|(key, value)| format!("{key}={value}"))
            .collect::<Vec<_>>()
            .join("&");

        let mut hasher = Sha256::new();
        hasher.update(to_sign.as_bytes());
        hasher.update(self.api_secret.as_bytes());
        format!("{:x}", hasher.finalize())
    }

    fn endpoint(&self, resource_type: &str, action: &str) -> String {
        format!(
            "{}/{}/{}/{}",
            self.api_base.trim_end_matches('/'),
            self.cloud_name,
            resource_type,
            action
        )
    }

    /// Posters are frames of the video resource rendered as jpg.
    fn delivery_target(file: &file::Model, plan: &RenditionPlan) -> (&'static str, String, String) {
        match plan.rendition {
            Rendition::VideoPoster => (
                "video",
                public_id(&file.path).to_string(),
                "jpg".to_string(),
            ),
            _ => (
                resource_type(file.file_type),
                public_id(&plan.source_path).to_string(),
                plan.format.clone(),
            ),
        }
    }
}

#[async_trait]
impl StorageDriver for CloudinaryDriver {
    fn kind(&self) -> DriverKind {
        DriverKind::Cloudinary
    }

    async fn signed_url(
        &self,
        file: &file::Model,
        plan: &RenditionPlan,
        expires_at: DateTime<Utc>,
    ) -> Result<String, StorageError> {
        let (resource_type, public_id, format) = Self::delivery_target(file, plan);

        let mut params = BTreeMap::new();
        params.insert("public_id", public_id);
        params.insert("format", format);
        params.insert("type", self.delivery_type.clone());
        params.insert("expires_at", expires_at.timestamp().to_string());
        params.insert("timestamp", Utc::now().timestamp().to_string());
        if let Some(transformation) = &plan.parameter {
            params.insert("transformation", transformation.clone());
        }
        let signature = self.sign(&params);

        let mut url = Url::parse(&self.endpoint(resource_type, "download"))
            .map_err(|e| StorageError::Config(e.to_string()))?;
        {
            let mut query = url.query_pairs_mut();
            for (key, value) in &params {
                query.append_pair(key, value);
            }
            query
                .append_pair("api_key", &self.api_key)
                .append_pair("signature", &signature);
        }
        Ok(url.to_string())
    }

    fn public_url(&self, file: &file::Model, plan: &RenditionPlan) -> Result<String, StorageError> {
        let (resource_type, public_id, format) = Self::delivery_target(file, plan);
        let transformation = plan
            .parameter
            .as_deref()
            .map(|t| format!("{}/", t.trim_matches('/')))
            .unwrap_or_default();

        Ok(format!(
            "{DELIVERY_BASE}/{}/{resource_type}/{}/{transformation}{public_id}.{format}",
            self.cloud_name, self.delivery_type
        ))
    }

    async fn upload_credential(
        &self,
        target: &UploadTarget,
    ) -> Result<UploadCredential, StorageError> {
        let public_id = public_id(&target.path);
        let (folder, name) = match public_id.rsplit_once('/') {
            Some((folder, name)) => (folder.to_string(), name.to_string()),
            None => (String::new(), public_id.to_string()),
        };

        let mut params = BTreeMap::new();
        params.insert("folder", folder.clone());
        params.insert("public_id", name.clone());
        params.insert("timestamp", Utc::now().timestamp().to_string());
        params.insert("type", self.delivery_type.clone());
        let signature = self.sign(&params);

        let mut fields = BTreeMap::new();
        fields.insert("apiKey".to_string(), self.api_key.clone());
        fields.insert("folder".to_string(), folder);
        fields.insert("publicId".to_string(), name);
        fields.insert("timestamp".to_string(), params["timestamp"].clone());
        fields.insert("type".to_string(), self.delivery_type.clone());
        fields.insert("signature".to_string(), signature);

        Ok(UploadCredential {
            method: "POST".to_string(),
            url: self.endpoint(resource_type(target.file_type), "upload"),
            headers: BTreeMap::new(),
            fields,
        })
    }

    fn video_poster_path(&self, file_type: FileType, path: &str) -> Option<String> {
        (file_type == FileType::Video).then(|| replace_extension(path, "jpg"))
    }

    async fn delete_object(&self, file_type: FileType, path: &str) -> Result<(), StorageError> {
        let mut params = BTreeMap::new();
        params.insert("public_id", public_id(path).to_string());
        params.insert("timestamp", Utc::now().timestamp().to_string());
        params.insert("type", self.delivery_type.clone());
        params.insert("invalidate", "true".to_string());
        let signature = self.sign(&params);

        let mut form: Vec<(&str, String)> = params.into_iter().collect();
        form.push(("api_key", self.api_key.clone()));
        form.push(("signature", signature));

        let response = self
            .http
            .post(self.endpoint(resource_type(file_type), "destroy"))
            .form(&form)
            .send()
            .await
            .map_err(|e| StorageError::Request(e.to_string()))?;

        let body: DestroyResponse = response
            .json()
            .await
            .map_err(|e| StorageError::Request(e.to_string()))?;

        match (body.result.as_deref(), body.error) {
            (Some("ok") | Some("not found"), _) => Ok(()),
            (_, Some(error)) => Err(StorageError::Request(error.message)),
            (result, None) => Err(StorageError::Request(format!(
                "unexpected destroy result: {}",
                result.unwrap_or("none")
            ))),
        }
    }
}
