//! Query operations for RelationalStore
//!
//! This module contains all read-only database operations.

use sea_orm::{ColumnTrait, EntityTrait, QueryFilter, QueryOrder, QuerySelect};
use tracing::debug;

use super::converters::model_to_user_link;
use super::{RelationalStore, retry};
use crate::errors::{Result, ShorterError};
use crate::storage::models::UserLink;
use crate::storage::normalize_key;

use migration::entities::link;

impl RelationalStore {
    pub(super) async fn find_url(&self, key: &str) -> Result<String> {
        let key = normalize_key(key);
        if key.is_empty() {
            return Err(ShorterError::not_found("empty key"));
        }

        let db = &self.db;
        let row = retry::with_retry(&format!("get({})", key), self.retry_policy, || async {
            link::Entity::find()
                .select_only()
                .column(link::Column::OriginalUrl)
                .column(link::Column::Deleted)
                .filter(link::Column::ShortKey.eq(key.as_str()))
                .into_tuple::<(String, bool)>()
                .one(db)
                .await
        })
        .await?;

        match row {
            None => Err(ShorterError::not_found(format!("no record for key: {}", key))),
            Some((_, true)) => Err(ShorterError::deleted(format!(
                "record for key {} is deleted",
                key
            ))),
            Some((url, false)) => Ok(url),
        }
    }

    pub(super) async fn find_user_links(&self, owner_id: &str) -> Result<Vec<UserLink>> {
        if owner_id.is_empty() {
            return Ok(Vec::new());
        }

        let db = &self.db;
        let models = retry::with_retry(
            &format!("get_user_urls({})", owner_id),
            self.retry_policy,
            || async {
                link::Entity::find()
                    .filter(link::Column::OwnerId.eq(owner_id))
                    .filter(link::Column::Deleted.eq(false))
                    .order_by_asc(link::Column::Id)
                    .all(db)
                    .await
            },
        )
        .await?;

        debug!(
            "Relational storage: {} links for owner {}",
            models.len(),
            owner_id
        );
        Ok(models.into_iter().map(model_to_user_link).collect())
    }
}
