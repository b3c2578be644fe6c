use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // 创建 links 表
        manager
            .create_table(
                Table::create()
                    .table(Links::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Links::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Links::OwnerId).string_len(128).null())
                    .col(ColumnDef::new(Links::CorrelationId).string_len(128).null())
                    .col(ColumnDef::new(Links::ShortKey).string_len(128).not_null())
                    .col(
                        ColumnDef::new(Links::OriginalUrl)
                            .string_len(512)
                            .not_null()
                            .unique_key(),
                    )
                    .col(
                        ColumnDef::new(Links::Deleted)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(
                        ColumnDef::new(Links::AddedDate)
                            .timestamp()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;

        // GetUserURLs 按 owner 查询
        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_links_owner_id")
                    .table(Links::Table)
                    .col(Links::OwnerId)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_index(Index::drop().name("idx_links_owner_id").to_owned())
            .await?;

        manager
            .drop_table(Table::drop().table(Links::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
pub(crate) enum Links {
    Table,
    Id,
    OwnerId,
    CorrelationId,
    ShortKey,
    OriginalUrl,
    Deleted,
    AddedDate,
}
