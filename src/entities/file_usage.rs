use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Deserialize, Serialize)]
#[sea_orm(table_name = "file_usages")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub file_id: i32,
    pub usage_type: UsageType,
    pub platform_id: i32,
    pub table_name: String,
    pub table_column: String,
    pub table_id: Option<i64>,
    pub table_key: Option<String>,
    pub sort_order: i32,
    pub more_info: Option<Json>,
    pub account_id: Option<i64>,
    pub user_id: Option<i64>,
    pub remark: Option<String>,
    pub created_at: DateTime,
}

#[derive(EnumIter, DeriveActiveEnum, Copy, Clone, Debug, PartialEq, Eq, Deserialize, Serialize, utoipa::ToSchema)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::None)")]
#[serde(rename_all = "lowercase")]
pub enum UsageType {
    #[sea_orm(string_value = "other")]
    Other,
    #[sea_orm(string_value = "system")]
    System,
    #[sea_orm(string_value = "sticker")]
    Sticker,
    #[sea_orm(string_value = "user")]
    User,
    #[sea_orm(string_value = "conversation")]
    Conversation,
    #[sea_orm(string_value = "post")]
    Post,
    #[sea_orm(string_value = "comment")]
    Comment,
    #[sea_orm(string_value = "extend")]
    Extend,
    #[sea_orm(string_value = "app")]
    App,
}

impl UsageType {
    pub fn storage_dir(&self) -> &'static str {
        match self {
            Self::Other => "others",
            Self::System => "systems",
            Self::Sticker => "stickers",
            Self::User => "users",
            Self::Conversation => "conversations",
            Self::Post => "posts",
            Self::Comment => "comments",
            Self::Extend => "extends",
            Self::App => "apps",
        }
    }

    /// High-volume usages are sharded by upload date.
    pub fn dated_storage(&self) -> bool {
        matches!(
            self,
            Self::Conversation | Self::Post | Self::Comment | Self::Extend | Self::App
        )
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::file::Entity",
        from = "Column::FileId",
        to = "super::file::Column::Id",
        on_delete = "Cascade"
    )]
    File,
}

impl Related<super::file::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::File.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
