//! 异步批量软删除
//!
//! 删除请求先进入有界队列，由唯一的后台消费任务按策略调用
//! [`StorageEngine::delete_batch`](crate::storage::StorageEngine::delete_batch)。
//! 调用方在入队成功后即返回，之后的失败只会体现在日志和统计里。

mod coordinator;

pub use coordinator::{DeletionCoordinator, DeletionPolicy, DeletionQueue, DeletionStats};
