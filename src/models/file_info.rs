use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::entities::file::{self, FileType, TranscodingState, WarningType};
use crate::models::rendition::Rendition;

/// Public projection of a file: declared metadata plus its rendition URLs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct FileInfo {
    pub fid: String,
    #[serde(rename = "type")]
    pub file_type: FileType,
    pub status: bool,
    pub uploaded: bool,
    pub name: String,
    pub mime: Option<String>,
    pub extension: String,
    pub size: i64,
    pub width: Option<i32>,
    pub height: Option<i32>,
    pub duration: Option<i32>,
    pub sha: Option<String>,
    pub sha_type: Option<String>,
    pub warning: WarningType,
    pub transcoding_state: TranscodingState,
    #[serde(flatten)]
    #[schema(value_type = Object)]
    pub urls: BTreeMap<String, Option<String>>,
}

impl FileInfo {
    pub fn from_model(file: &file::Model) -> Self {
        Self {
            fid: file.fid.clone(),
            file_type: file.file_type,
            status: file.is_enabled,
            uploaded: file.is_uploaded,
            name: file.name.clone(),
            mime: file.mime.clone(),
            extension: file.extension.clone(),
            size: file.size,
            width: file.width,
            height: file.height,
            duration: file.duration,
            sha: file.sha.clone(),
            sha_type: file.sha_type.clone(),
            warning: file.warning_type,
            transcoding_state: file.transcoding_state,
            urls: BTreeMap::new(),
        }
    }

    pub fn set_url(&mut self, rendition: Rendition, url: Option<String>) {
        self.urls.insert(rendition.key().to_string(), url);
    }

    pub fn url(&self, rendition: Rendition) -> Option<&str> {
        self.urls.get(rendition.key()).and_then(|url| url.as_deref())
    }
}
