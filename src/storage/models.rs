use serde::{Deserialize, Serialize};

/// 一条短链接记录
///
/// 记录只会被创建和软删除，不会被物理删除。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    /// 创建时分配，单个引擎实例内单调递增，仅用于审计和排序
    pub sequence_id: u64,
    pub short_key: String,
    /// 规范化后的原始 URL
    pub original_url: String,
    /// 空字符串表示匿名写入
    pub owner_id: String,
    pub deleted: bool,
}

/// 批量写入的单个条目
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchItem {
    pub correlation_id: String,
    pub original_url: String,
}

impl BatchItem {
    pub fn new<C: Into<String>, U: Into<String>>(correlation_id: C, original_url: U) -> Self {
        Self {
            correlation_id: correlation_id.into(),
            original_url: original_url.into(),
        }
    }
}

/// 批量写入的单个结果
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchResult {
    pub correlation_id: String,
    pub short_key: String,
    pub original_url: String,
    /// URL 已存在，`short_key` 为已有记录的 key
    pub already_existed: bool,
}

/// 某个用户名下的一条链接
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserLink {
    pub short_key: String,
    pub original_url: String,
}

impl From<&Record> for UserLink {
    fn from(record: &Record) -> Self {
        Self {
            short_key: record.short_key.clone(),
            original_url: record.original_url.clone(),
        }
    }
}

/// 一次删除请求：某个 owner 名下的一组 key
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteRequest {
    pub owner_id: String,
    pub keys: Vec<String>,
}

impl DeleteRequest {
    pub fn new<O: Into<String>>(owner_id: O, keys: Vec<String>) -> Self {
        Self {
            owner_id: owner_id.into(),
            keys,
        }
    }
}
