use sea_orm_migration::prelude::*;

use crate::m20250101_000001_create_files_table::Files;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(FileUsages::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(FileUsages::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(FileUsages::FileId).integer().not_null())
                    .col(ColumnDef::new(FileUsages::UsageType).string().not_null())
                    .col(ColumnDef::new(FileUsages::PlatformId).integer().not_null())
                    .col(ColumnDef::new(FileUsages::TableName).string_len(64).not_null())
                    .col(ColumnDef::new(FileUsages::TableColumn).string_len(64).not_null())
                    .col(ColumnDef::new(FileUsages::TableId).big_integer())
                    .col(ColumnDef::new(FileUsages::TableKey).string_len(64))
                    .col(
                        ColumnDef::new(FileUsages::SortOrder)
                            .integer()
                            .not_null()
                            .default(9),
                    )
                    .col(ColumnDef::new(FileUsages::MoreInfo).json())
                    .col(ColumnDef::new(FileUsages::AccountId).big_integer())
                    .col(ColumnDef::new(FileUsages::UserId).big_integer())
                    .col(ColumnDef::new(FileUsages::Remark).string())
                    .col(ColumnDef::new(FileUsages::CreatedAt).timestamp().not_null())
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_file_usages_file_id")
                            .from(FileUsages::Table, FileUsages::FileId)
                            .to(Files::Table, Files::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_file_usages_file_user")
                    .table(FileUsages::Table)
                    .col(FileUsages::FileId)
                    .col(FileUsages::UserId)
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(FileUsages::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum FileUsages {
    Table,
    Id,
    FileId,
    UsageType,
    PlatformId,
    TableName,
    TableColumn,
    TableId,
    TableKey,
    SortOrder,
    MoreInfo,
    AccountId,
    UserId,
    Remark,
    CreatedAt,
}
