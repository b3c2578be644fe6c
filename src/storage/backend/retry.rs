//! 数据库读操作重试
//!
//! 只用于读路径，写操作失败直接返回。是否重试由转换后的 [`ShorterError`]
//! 决定：只有 `BackendUnavailable`（连接池获取失败、连接断开、锁冲突）会重试。

use std::future::Future;
use std::time::Duration;

use tokio::time::sleep;
use tracing::{debug, warn};

use crate::config::DatabaseConfig;
use crate::errors::{Result, ShorterError};

/// 退避参数，来自 `[database]` 配置
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl From<&DatabaseConfig> for RetryPolicy {
    fn from(config: &DatabaseConfig) -> Self {
        Self {
            max_retries: config.retry_count,
            base_delay: Duration::from_millis(config.retry_base_delay_ms),
            max_delay: Duration::from_millis(config.retry_max_delay_ms),
        }
    }
}

impl RetryPolicy {
    /// 第 `attempt` 次重试前的等待时间（从 1 开始），上限之后再加 0-25% 抖动
    fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        let capped = self.base_delay.saturating_mul(factor).min(self.max_delay);
        let capped_ms = capped.as_millis() as u64;
        capped + Duration::from_millis(rand::random_range(0..=capped_ms / 4))
    }
}

fn is_transient(err: &ShorterError) -> bool {
    matches!(err, ShorterError::BackendUnavailable(_))
}

/// 执行 `operation`，遇到瞬时错误时按指数退避重试
pub async fn with_retry<T, E, F, Fut>(
    label: &str,
    policy: RetryPolicy,
    mut operation: F,
) -> Result<T>
where
    E: Into<ShorterError>,
    F: FnMut() -> Fut,
    Fut: Future<Output = std::result::Result<T, E>>,
{
    let mut attempt = 0;
    loop {
        let err = match operation().await {
            Ok(value) => {
                if attempt > 0 {
                    debug!("{} succeeded after {} retries", label, attempt);
                }
                return Ok(value);
            }
            Err(e) => e.into(),
        };

        if !is_transient(&err) || attempt >= policy.max_retries {
            return Err(err);
        }

        attempt += 1;
        let delay = policy.delay_for(attempt);
        warn!(
            "{} failed ({}/{}): {}; retrying in {:?}",
            label, attempt, policy.max_retries, err, delay
        );
        sleep(delay).await;
    }
}
