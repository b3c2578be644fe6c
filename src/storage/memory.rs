//! 内存存储后端
//!
//! 数据只保存在进程内，不做持久化。所有操作在同一把读写锁下完成，
//! 单次调用是原子的：返回的调用 happens-before 之后获得锁的任何调用。

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::RwLock;
use tracing::{debug, info};

use super::models::{BatchItem, BatchResult, DeleteRequest, Record, UserLink};
use super::{OpContext, StorageEngine, apply_batch, normalize_key, owns};
use crate::errors::{Result, ShorterError};
use crate::utils::{derive_key, normalize_url};

#[derive(Default)]
struct VolatileState {
    records: HashMap<String, Record>,
    next_sequence: u64,
    closed: bool,
}

impl VolatileState {
    fn ensure_open(&self) -> Result<()> {
        if self.closed {
            return Err(ShorterError::backend_unavailable("memory storage is closed"));
        }
        Ok(())
    }

    fn insert(&mut self, url: &str, owner_id: &str) -> Result<String> {
        let normalized = normalize_url(url);
        let key = derive_key(&normalized);
        if key.is_empty() {
            return Err(ShorterError::invalid_input(format!(
                "cannot derive a key from URL: {:?}",
                url
            )));
        }

        if let Some(existing) = self.records.get(&key) {
            return Err(ShorterError::already_exists(
                key.clone(),
                format!("URL already stored: {}", existing.original_url),
            ));
        }

        self.next_sequence += 1;
        self.records.insert(
            key.clone(),
            Record {
                sequence_id: self.next_sequence,
                short_key: key.clone(),
                original_url: normalized,
                owner_id: owner_id.to_string(),
                deleted: false,
            },
        );
        debug!("Memory storage: stored key {}", key);
        Ok(key)
    }
}

/// 进程内存储
#[derive(Default)]
pub struct VolatileStore {
    state: RwLock<VolatileState>,
}

impl VolatileStore {
    pub fn new() -> Self {
        info!("Memory storage initialized.");
        Self::default()
    }

    /// 当前记录数（包含已软删除的记录）
    pub fn len(&self) -> usize {
        self.state.read().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl StorageEngine for VolatileStore {
    async fn set(&self, ctx: &OpContext, url: &str, owner_id: &str) -> Result<String> {
        ctx.check()?;
        let mut state = self.state.write();
        state.ensure_open()?;
        state.insert(url, owner_id)
    }

    async fn set_batch(
        &self,
        ctx: &OpContext,
        items: &[BatchItem],
        owner_id: &str,
    ) -> Result<Vec<BatchResult>> {
        ctx.check()?;
        let mut state = self.state.write();
        state.ensure_open()?;
        apply_batch(items, |url| state.insert(url, owner_id))
    }

    async fn get(&self, ctx: &OpContext, key: &str) -> Result<String> {
        ctx.check()?;
        let state = self.state.read();
        state.ensure_open()?;

        let key = normalize_key(key);
        match state.records.get(&key) {
            None => Err(ShorterError::not_found(format!("no record for key: {}", key))),
            Some(record) if record.deleted => Err(ShorterError::deleted(format!(
                "record for key {} is deleted",
                key
            ))),
            Some(record) => Ok(record.original_url.clone()),
        }
    }

    async fn get_user_urls(&self, ctx: &OpContext, owner_id: &str) -> Result<Vec<UserLink>> {
        ctx.check()?;
        let state = self.state.read();
        state.ensure_open()?;

        if owner_id.is_empty() {
            return Ok(Vec::new());
        }

        let mut owned: Vec<&Record> = state
            .records
            .values()
            .filter(|r| !r.deleted && r.owner_id == owner_id)
            .collect();
        owned.sort_by_key(|r| r.sequence_id);
        Ok(owned.into_iter().map(UserLink::from).collect())
    }

    async fn delete_batch(&self, ctx: &OpContext, items: &[DeleteRequest]) -> Result<bool> {
        ctx.check()?;
        if items.is_empty() {
            return Err(ShorterError::invalid_input("no keys provided for deletion"));
        }

        let mut state = self.state.write();
        state.ensure_open()?;

        let mut changed = 0usize;
        for item in items {
            for key in &item.keys {
                if let Some(record) = state.records.get_mut(&normalize_key(key))
                    && owns(item, record)
                    && !record.deleted
                {
                    record.deleted = true;
                    changed += 1;
                }
            }
        }

        debug!("Memory storage: soft-deleted {} records", changed);
        Ok(changed > 0)
    }

    async fn is_available(&self) -> bool {
        !self.state.read().closed
    }

    async fn close(&self) -> Result<()> {
        let mut state = self.state.write();
        if !state.closed {
            state.closed = true;
            state.records.clear();
            info!("Memory storage closed");
        }
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}
