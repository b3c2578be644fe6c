//! SeaORM storage backend
//!
//! This module provides relational storage using SeaORM,
//! supporting SQLite, MySQL/MariaDB, and PostgreSQL.

mod connection;
mod converters;
mod mutations;
mod query;
mod retry;

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use sea_orm::DatabaseConnection;
use tracing::{info, warn};

use super::models::{BatchItem, BatchResult, DeleteRequest, UserLink};
use super::{OpContext, StorageEngine};
use crate::config::DatabaseConfig;
use crate::errors::{Result, ShorterError};

use connection::{connect_generic, connect_sqlite, run_migrations};

/// 从数据库 URL 推断数据库类型
pub fn infer_backend_from_url(database_url: &str) -> Result<&'static str> {
    if database_url.starts_with("sqlite:")
        || database_url.ends_with(".db")
        || database_url.ends_with(".sqlite")
    {
        Ok("sqlite")
    } else if database_url.starts_with("mysql://") || database_url.starts_with("mariadb://") {
        Ok("mysql")
    } else if database_url.starts_with("postgres://") || database_url.starts_with("postgresql://") {
        Ok("postgres")
    } else {
        Err(ShorterError::config(format!(
            "cannot infer database type from DSN: {}. Supported: sqlite://, mysql://, mariadb://, postgres://",
            database_url
        )))
    }
}

/// 关系数据库存储
///
/// `set_batch` 整批在一个事务内；`delete_batch` 按 owner 分组，每组一个事务。
pub struct RelationalStore {
    db: DatabaseConnection,
    backend_name: &'static str,
    retry_policy: retry::RetryPolicy,
    closed: AtomicBool,
}

impl RelationalStore {
    pub async fn new(config: &DatabaseConfig) -> Result<Self> {
        let dsn = config.dsn.trim();
        if dsn.is_empty() {
            return Err(ShorterError::config("database DSN is not set"));
        }

        let backend_name = infer_backend_from_url(dsn)?;
        let db = if backend_name == "sqlite" {
            connect_sqlite(dsn, config).await?
        } else {
            connect_generic(dsn, backend_name, config).await?
        };

        run_migrations(&db).await?;

        let store = RelationalStore {
            db,
            backend_name,
            retry_policy: retry::RetryPolicy::from(config),
            closed: AtomicBool::new(false),
        };

        warn!("{} Storage initialized.", store.backend_name.to_uppercase());
        Ok(store)
    }

    /// 获取数据库连接
    pub fn get_db(&self) -> &DatabaseConnection {
        &self.db
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(ShorterError::backend_unavailable(format!(
                "{} storage is closed",
                self.backend_name
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl StorageEngine for RelationalStore {
    async fn set(&self, ctx: &OpContext, url: &str, owner_id: &str) -> Result<String> {
        self.ensure_open()?;
        ctx.run(self.insert_one(url, owner_id)).await
    }

    async fn set_batch(
        &self,
        ctx: &OpContext,
        items: &[BatchItem],
        owner_id: &str,
    ) -> Result<Vec<BatchResult>> {
        self.ensure_open()?;
        ctx.run(self.insert_batch(items, owner_id)).await
    }

    async fn get(&self, ctx: &OpContext, key: &str) -> Result<String> {
        self.ensure_open()?;
        ctx.run(self.find_url(key)).await
    }

    async fn get_user_urls(&self, ctx: &OpContext, owner_id: &str) -> Result<Vec<UserLink>> {
        self.ensure_open()?;
        ctx.run(self.find_user_links(owner_id)).await
    }

    async fn delete_batch(&self, ctx: &OpContext, items: &[DeleteRequest]) -> Result<bool> {
        self.ensure_open()?;
        ctx.run(self.soft_delete(items)).await
    }

    async fn is_available(&self) -> bool {
        if self.closed.load(Ordering::Acquire) {
            return false;
        }
        self.db.ping().await.is_ok()
    }

    async fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        self.db.close_by_ref().await?;
        info!("{} storage closed", self.backend_name.to_uppercase());
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        self.backend_name
    }
}
