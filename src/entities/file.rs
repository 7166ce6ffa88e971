use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Deserialize, Serialize)]
#[sea_orm(table_name = "files")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    #[sea_orm(unique)]
    pub fid: String,
    pub file_type: FileType,
    pub name: String,
    pub mime: Option<String>,
    pub extension: String,
    pub size: i64,
    pub width: Option<i32>,
    pub height: Option<i32>,
    pub duration: Option<i32>,
    pub sha: Option<String>,
    pub sha_type: Option<String>,
    pub path: String,
    pub original_path: Option<String>,
    pub video_poster_path: Option<String>,
    pub warning_type: WarningType,
    pub transcoding_state: TranscodingState,
    pub is_enabled: bool,
    pub is_uploaded: bool,
    pub physical_deletion: bool,
    pub created_at: DateTime,
    pub updated_at: DateTime,
    pub deleted_at: Option<DateTime>,
}

#[derive(EnumIter, DeriveActiveEnum, Copy, Clone, Debug, PartialEq, Eq, Hash, Deserialize, Serialize, utoipa::ToSchema)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::None)")]
#[serde(rename_all = "lowercase")]
pub enum FileType {
    #[sea_orm(string_value = "image")]
    Image,
    #[sea_orm(string_value = "video")]
    Video,
    #[sea_orm(string_value = "audio")]
    Audio,
    #[sea_orm(string_value = "document")]
    Document,
}

impl FileType {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "image" | "1" => Some(Self::Image),
            "video" | "2" => Some(Self::Video),
            "audio" | "3" => Some(Self::Audio),
            "document" | "4" => Some(Self::Document),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Image => "image",
            Self::Video => "video",
            Self::Audio => "audio",
            Self::Document => "document",
        }
    }

    /// Top-level storage directory for objects of this type.
    pub fn storage_dir(&self) -> &'static str {
        match self {
            Self::Image => "images",
            Self::Video => "videos",
            Self::Audio => "audios",
            Self::Document => "documents",
        }
    }
}

#[derive(EnumIter, DeriveActiveEnum, Copy, Clone, Debug, PartialEq, Eq, Deserialize, Serialize, utoipa::ToSchema)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::None)")]
#[serde(rename_all = "lowercase")]
pub enum WarningType {
    #[sea_orm(string_value = "none")]
    None,
    #[sea_orm(string_value = "nudity")]
    Nudity,
    #[sea_orm(string_value = "violence")]
    Violence,
    #[sea_orm(string_value = "sensitive")]
    Sensitive,
}

impl WarningType {
    /// Unknown or missing classifications fall back to `None`.
    pub fn parse(value: Option<&str>) -> Self {
        match value {
            Some("nudity") => Self::Nudity,
            Some("violence") => Self::Violence,
            Some("sensitive") => Self::Sensitive,
            _ => Self::None,
        }
    }
}

#[derive(EnumIter, DeriveActiveEnum, Copy, Clone, Debug, PartialEq, Eq, Deserialize, Serialize, utoipa::ToSchema)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::None)")]
#[serde(rename_all = "lowercase")]
pub enum TranscodingState {
    #[sea_orm(string_value = "wait")]
    Wait,
    #[sea_orm(string_value = "processing")]
    Processing,
    #[sea_orm(string_value = "done")]
    Done,
    #[sea_orm(string_value = "failed")]
    Failed,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::file_usage::Entity")]
    FileUsage,
}

impl Related<super::file_usage::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::FileUsage.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
