use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;

use crate::config::{BackendKind, DatabaseConfig, StorageConfig};
use crate::errors::Result;

pub mod backend;
pub mod context;
pub mod file;
pub mod memory;
pub mod models;

pub use backend::{RelationalStore, infer_backend_from_url};
pub use context::OpContext;
pub use file::LogStore;
pub use memory::VolatileStore;
pub use models::{BatchItem, BatchResult, DeleteRequest, Record, UserLink};

/// 存储引擎接口
///
/// 三种实现（内存、追加日志文件、关系数据库）在构造时选定，彼此之间不共享状态。
/// 错误按 [`crate::errors::ShorterError`] 分类原样返回。
#[async_trait]
pub trait StorageEngine: Send + Sync {
    /// 写入一个 URL，返回短 key
    ///
    /// URL 已存在时返回 `AlreadyExists`，其中携带已有的 key。
    async fn set(&self, ctx: &OpContext, url: &str, owner_id: &str) -> Result<String>;

    /// 批量写入
    ///
    /// 已存在的 URL 不会中断批次，结果中 `already_existed` 为 true。
    /// 非法条目会中断批次，各后端的原子性不同。
    async fn set_batch(
        &self,
        ctx: &OpContext,
        items: &[BatchItem],
        owner_id: &str,
    ) -> Result<Vec<BatchResult>>;

    /// 按 key 读取原始 URL
    async fn get(&self, ctx: &OpContext, key: &str) -> Result<String>;

    /// 某个 owner 名下所有未删除的链接
    async fn get_user_urls(&self, ctx: &OpContext, owner_id: &str) -> Result<Vec<UserLink>>;

    /// 按 owner 软删除，返回是否至少有一条记录状态发生变化
    async fn delete_batch(&self, ctx: &OpContext, items: &[DeleteRequest]) -> Result<bool>;

    async fn is_available(&self) -> bool;

    /// 释放底层资源，可重复调用
    async fn close(&self) -> Result<()>;

    fn backend_name(&self) -> &'static str;
}

pub struct StorageFactory;

impl StorageFactory {
    /// 未显式指定后端时：配置了 DSN 用数据库，配置了文件路径用日志文件，否则用内存
    pub fn resolve_backend(storage: &StorageConfig, database: &DatabaseConfig) -> BackendKind {
        if let Some(kind) = storage.backend {
            return kind;
        }
        if !database.dsn.trim().is_empty() {
            BackendKind::Database
        } else if !storage.file_storage_path.trim().is_empty() {
            BackendKind::File
        } else {
            BackendKind::Memory
        }
    }

    pub async fn create(
        storage: &StorageConfig,
        database: &DatabaseConfig,
    ) -> Result<Arc<dyn StorageEngine>> {
        let kind = Self::resolve_backend(storage, database);
        let name: &str = kind.as_ref();
        info!("Selected storage backend: {}", name);

        let engine: Arc<dyn StorageEngine> = match kind {
            BackendKind::Memory => Arc::new(VolatileStore::new()),
            BackendKind::File => Arc::new(LogStore::open(&storage.file_storage_path)?),
            BackendKind::Database => Arc::new(RelationalStore::new(database).await?),
        };
        Ok(engine)
    }
}

/// 规范化查询用的 key
pub(crate) fn normalize_key(key: &str) -> String {
    key.trim().to_lowercase()
}

/// 逐条写入批次，供没有事务的后端使用
///
/// `insert` 返回 `AlreadyExists` 时记为已存在并继续；其他错误立即返回，
/// 之前已写入的条目保留。
pub(crate) fn apply_batch<F>(items: &[BatchItem], mut insert: F) -> Result<Vec<BatchResult>>
where
    F: FnMut(&str) -> Result<String>,
{
    let mut results = Vec::with_capacity(items.len());
    for item in items {
        let (short_key, already_existed) = match insert(&item.original_url) {
            Ok(key) => (key, false),
            Err(crate::errors::ShorterError::AlreadyExists { key, .. }) => (key, true),
            Err(e) => return Err(e),
        };
        results.push(BatchResult {
            correlation_id: item.correlation_id.clone(),
            short_key,
            original_url: item.original_url.clone(),
            already_existed,
        });
    }
    Ok(results)
}

/// 删除请求是否作用于该记录：owner 必须一致且非空
pub(crate) fn owns(request: &DeleteRequest, record: &Record) -> bool {
    !request.owner_id.is_empty() && record.owner_id == request.owner_id
}
