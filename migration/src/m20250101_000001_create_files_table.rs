use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Files::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Files::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Files::Fid).string_len(32).not_null().unique_key())
                    .col(ColumnDef::new(Files::FileType).string().not_null())
                    .col(ColumnDef::new(Files::Name).string().not_null())
                    .col(ColumnDef::new(Files::Mime).string())
                    .col(ColumnDef::new(Files::Extension).string_len(32).not_null())
                    .col(ColumnDef::new(Files::Size).big_integer().not_null())
                    .col(ColumnDef::new(Files::Width).integer())
                    .col(ColumnDef::new(Files::Height).integer())
                    .col(ColumnDef::new(Files::Duration).integer())
                    .col(ColumnDef::new(Files::Sha).string())
                    .col(ColumnDef::new(Files::ShaType).string_len(16))
                    .col(ColumnDef::new(Files::Path).string().not_null())
                    .col(ColumnDef::new(Files::OriginalPath).string())
                    .col(ColumnDef::new(Files::VideoPosterPath).string())
                    .col(
                        ColumnDef::new(Files::WarningType)
                            .string()
                            .not_null()
                            .default("none"),
                    )
                    .col(
                        ColumnDef::new(Files::TranscodingState)
                            .string()
                            .not_null()
                            .default("wait"),
                    )
                    .col(
                        ColumnDef::new(Files::IsEnabled)
                            .boolean()
                            .not_null()
                            .default(true),
                    )
                    .col(
                        ColumnDef::new(Files::IsUploaded)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(
                        ColumnDef::new(Files::PhysicalDeletion)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(ColumnDef::new(Files::CreatedAt).timestamp().not_null())
                    .col(ColumnDef::new(Files::UpdatedAt).timestamp().not_null())
                    .col(ColumnDef::new(Files::DeletedAt).timestamp())
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_files_path")
                    .table(Files::Table)
                    .col(Files::Path)
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Files::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
pub(crate) enum Files {
    Table,
    Id,
    Fid,
    FileType,
    Name,
    Mime,
    Extension,
    Size,
    Width,
    Height,
    Duration,
    Sha,
    ShaType,
    Path,
    OriginalPath,
    VideoPosterPath,
    WarningType,
    TranscodingState,
    IsEnabled,
    IsUploaded,
    PhysicalDeletion,
    CreatedAt,
    UpdatedAt,
    DeletedAt,
}
