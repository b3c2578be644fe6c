//! Mutation operations for RelationalStore
//!
//! This module contains all write database operations. Writes are not retried.

use std::collections::BTreeMap;

use sea_orm::{
    ColumnTrait, Condition, ConnectionTrait, DbErr, EntityTrait, QueryFilter, TransactionTrait,
    sea_query::{Expr, OnConflict},
};
use tracing::{debug, info};

use super::RelationalStore;
use super::converters::new_link_model;
use crate::errors::{Result, ShorterError};
use crate::storage::models::{BatchItem, BatchResult, DeleteRequest};
use crate::storage::normalize_key;
use crate::utils::{derive_key, normalize_url};

use migration::entities::link;

/// 插入单条记录，`conn` 可以是事务
///
/// 先按 URL 和 key 查重，已存在时返回已有记录的 key。
async fn insert_link<C: ConnectionTrait>(
    conn: &C,
    url: &str,
    owner_id: &str,
    correlation_id: Option<&str>,
) -> Result<String> {
    let normalized = normalize_url(url);
    let key = derive_key(&normalized);
    if key.is_empty() {
        return Err(ShorterError::invalid_input(format!(
            "cannot derive a key from URL: {:?}",
            url
        )));
    }

    let existing = link::Entity::find()
        .filter(
            Condition::any()
                .add(link::Column::OriginalUrl.eq(normalized.as_str()))
                .add(link::Column::ShortKey.eq(key.as_str())),
        )
        .one(conn)
        .await?;
    if let Some(existing) = existing {
        return Err(ShorterError::already_exists(
            existing.short_key,
            format!("URL already stored: {}", existing.original_url),
        ));
    }

    // 使用 ON CONFLICT DO NOTHING 兜底并发写入同一 URL
    let result = link::Entity::insert(new_link_model(&key, &normalized, owner_id, correlation_id))
        .on_conflict(
            OnConflict::column(link::Column::OriginalUrl)
                .do_nothing()
                .to_owned(),
        )
        .exec(conn)
        .await;

    match result {
        Ok(_) => {}
        Err(DbErr::RecordNotInserted) => {
            return Err(ShorterError::already_exists(
                key,
                format!("URL already stored: {}", normalized),
            ));
        }
        Err(e) => {
            return Err(match ShorterError::from(e) {
                // short_key 唯一索引冲突
                ShorterError::AlreadyExists { message, .. } => {
                    ShorterError::already_exists(key, message)
                }
                other => other,
            });
        }
    }

    debug!("Relational storage: inserted key {}", key);
    Ok(key)
}

impl RelationalStore {
    pub(super) async fn insert_one(&self, url: &str, owner_id: &str) -> Result<String> {
        let txn = self.db.begin().await?;
        let key = insert_link(&txn, url, owner_id, None).await?;
        txn.commit().await?;
        Ok(key)
    }

    /// 整批在一个事务内，任何非 AlreadyExists 错误都会回滚整批
    pub(super) async fn insert_batch(
        &self,
        items: &[BatchItem],
        owner_id: &str,
    ) -> Result<Vec<BatchResult>> {
        if items.is_empty() {
            return Ok(Vec::new());
        }

        let txn = self.db.begin().await?;
        let mut results = Vec::with_capacity(items.len());
        for item in items {
            let correlation_id = Some(item.correlation_id.as_str()).filter(|c| !c.is_empty());
            let (short_key, already_existed) =
                match insert_link(&txn, &item.original_url, owner_id, correlation_id).await {
                    Ok(key) => (key, false),
                    Err(ShorterError::AlreadyExists { key, .. }) => (key, true),
                    // txn 在此被丢弃并回滚
                    Err(e) => return Err(e),
                };
            results.push(BatchResult {
                correlation_id: item.correlation_id.clone(),
                short_key,
                original_url: item.original_url.clone(),
                already_existed,
            });
        }
        txn.commit().await?;

        info!("Batch inserted {} links", results.len());
        Ok(results)
    }

    /// 按 owner 分组软删除，每组一个事务
    ///
    /// 某组失败时，之前已提交的组不会回滚。
    pub(super) async fn soft_delete(&self, items: &[DeleteRequest]) -> Result<bool> {
        if items.is_empty() {
            return Err(ShorterError::invalid_input("no keys provided for deletion"));
        }

        let mut groups: BTreeMap<&str, Vec<String>> = BTreeMap::new();
        for item in items.iter().filter(|item| !item.owner_id.is_empty()) {
            groups
                .entry(item.owner_id.as_str())
                .or_default()
                .extend(item.keys.iter().map(|k| normalize_key(k)));
        }

        let mut changed = 0u64;
        for (owner_id, keys) in groups {
            if keys.is_empty() {
                continue;
            }

            let txn = self.db.begin().await?;
            let result = link::Entity::update_many()
                .col_expr(link::Column::Deleted, Expr::value(true))
                .filter(link::Column::ShortKey.is_in(keys))
                .filter(link::Column::OwnerId.eq(owner_id))
                .filter(link::Column::Deleted.eq(false))
                .exec(&txn)
                .await?;
            txn.commit().await?;

            debug!(
                "Relational storage: soft-deleted {} records for owner {}",
                result.rows_affected, owner_id
            );
            changed += result.rows_affected;
        }

        Ok(changed > 0)
    }
}
