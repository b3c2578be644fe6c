use sea_orm_migration::prelude::*;

use crate::m20250301_000001_create_links::Links;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // 两个不同 URL 的校验和碰撞时，第二次写入必须失败而不是产生同 key 的两行
        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_links_short_key")
                    .table(Links::Table)
                    .col(Links::ShortKey)
                    .unique()
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_index(
                Index::drop()
                    .name("idx_links_short_key")
                    .table(Links::Table)
                    .to_owned(),
            )
            .await
    }
}
