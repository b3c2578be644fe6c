use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use serde::Serialize;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{Interval, MissedTickBehavior, interval};
use tracing::{debug, error, info, trace};

use crate::config::{DeletionConfig, DeletionPolicyKind};
use crate::errors::{Result, ShorterError};
use crate::storage::{DeleteRequest, OpContext, StorageEngine};

/// 消费策略
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeletionPolicy {
    /// 每个请求单独调用一次 `delete_batch`
    Immediate,
    /// 累积一个窗口内的请求，合并为一次 `delete_batch`
    Windowed(Duration),
}

/// 窗口下限，`interval` 不接受零周期
const MIN_WINDOW: Duration = Duration::from_millis(1);

impl DeletionPolicy {
    fn clamped(self) -> Self {
        match self {
            DeletionPolicy::Windowed(window) => DeletionPolicy::Windowed(window.max(MIN_WINDOW)),
            immediate => immediate,
        }
    }
}

impl From<&DeletionConfig> for DeletionPolicy {
    fn from(config: &DeletionConfig) -> Self {
        match config.policy {
            DeletionPolicyKind::Immediate => DeletionPolicy::Immediate,
            DeletionPolicyKind::Windowed => {
                DeletionPolicy::Windowed(Duration::from_secs(config.window_secs))
            }
        }
    }
}

/// 统计快照
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DeletionStats {
    /// 成功入队的请求数
    pub enqueued: u64,
    /// 调用 `delete_batch` 的次数
    pub flushes: u64,
    /// 报告有记录状态变化的 flush 次数
    pub applied_changes: u64,
    pub failed_flushes: u64,
    /// 因 flush 失败被丢弃的请求数
    pub dropped_requests: u64,
}

#[derive(Default)]
struct Counters {
    enqueued: AtomicU64,
    flushes: AtomicU64,
    applied_changes: AtomicU64,
    failed_flushes: AtomicU64,
    dropped_requests: AtomicU64,
    draining: AtomicBool,
    stopped: AtomicBool,
}

impl Counters {
    fn snapshot(&self) -> DeletionStats {
        DeletionStats {
            enqueued: self.enqueued.load(Ordering::Relaxed),
            flushes: self.flushes.load(Ordering::Relaxed),
            applied_changes: self.applied_changes.load(Ordering::Relaxed),
            failed_flushes: self.failed_flushes.load(Ordering::Relaxed),
            dropped_requests: self.dropped_requests.load(Ordering::Relaxed),
        }
    }
}

/// 删除队列的发送端，可以随意 clone 给请求处理方
#[derive(Clone)]
pub struct DeletionQueue {
    tx: mpsc::Sender<DeleteRequest>,
    counters: Arc<Counters>,
}

impl DeletionQueue {
    /// 入队一个删除请求
    ///
    /// 队列满时等待，不会丢弃请求。协调器停止后返回 `BackendUnavailable`。
    pub async fn enqueue(&self, request: DeleteRequest) -> Result<()> {
        if request.keys.is_empty() {
            return Err(ShorterError::invalid_input("no keys provided for deletion"));
        }
        if self.counters.stopped.load(Ordering::Acquire) {
            return Err(ShorterError::backend_unavailable(
                "deletion coordinator has stopped",
            ));
        }

        self.tx.send(request).await.map_err(|_| {
            ShorterError::backend_unavailable("deletion coordinator has stopped")
        })?;
        self.counters.enqueued.fetch_add(1, Ordering::Relaxed);
        trace!("DeletionQueue: request enqueued");
        Ok(())
    }

    /// 队列剩余容量
    pub fn capacity(&self) -> usize {
        self.tx.capacity()
    }
}

/// 删除协调器
///
/// 持有后台消费任务的句柄。状态为 Idle → Draining → Idle，
/// `delete_batch` 执行期间 `is_draining()` 为 true。
pub struct DeletionCoordinator {
    queue: DeletionQueue,
    counters: Arc<Counters>,
    policy: DeletionPolicy,
    stop_tx: Option<oneshot::Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl DeletionCoordinator {
    /// 按配置启动后台消费任务，必须在 tokio runtime 内调用
    pub fn start(engine: Arc<dyn StorageEngine>, config: &DeletionConfig) -> Self {
        Self::with_policy(engine, config.queue_capacity, DeletionPolicy::from(config))
    }

    pub fn with_policy(
        engine: Arc<dyn StorageEngine>,
        capacity: usize,
        policy: DeletionPolicy,
    ) -> Self {
        let policy = policy.clamped();
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let (stop_tx, stop_rx) = oneshot::channel();
        let counters = Arc::new(Counters::default());

        let consumer = Consumer {
            engine,
            counters: Arc::clone(&counters),
            policy,
            pending: Vec::new(),
        };
        let handle = tokio::spawn(consumer.run(rx, stop_rx));

        info!(
            "Deletion coordinator started (policy: {:?}, capacity: {})",
            policy,
            capacity.max(1)
        );
        Self {
            queue: DeletionQueue {
                tx,
                counters: Arc::clone(&counters),
            },
            counters,
            policy,
            stop_tx: Some(stop_tx),
            handle: Some(handle),
        }
    }

    /// 获取一个入队句柄
    pub fn queue(&self) -> DeletionQueue {
        self.queue.clone()
    }

    pub fn policy(&self) -> DeletionPolicy {
        self.policy
    }

    pub fn stats(&self) -> DeletionStats {
        self.counters.snapshot()
    }

    pub fn is_draining(&self) -> bool {
        self.counters.draining.load(Ordering::Acquire)
    }

    /// 停止接收新请求，处理完已入队的请求并等待后台任务退出
    ///
    /// 可重复调用。不调用本方法直接退出进程时，队列中的请求会丢失。
    pub async fn shutdown(&mut self) -> Result<()> {
        self.counters.stopped.store(true, Ordering::Release);
        if let Some(stop_tx) = self.stop_tx.take() {
            let _ = stop_tx.send(());
        }

        if let Some(handle) = self.handle.take() {
            handle.await.map_err(|e| {
                ShorterError::internal(format!("deletion consumer task failed: {}", e))
            })?;
            info!("Deletion coordinator stopped: {:?}", self.stats());
        }
        Ok(())
    }
}

/// 后台消费任务的状态
struct Consumer {
    engine: Arc<dyn StorageEngine>,
    counters: Arc<Counters>,
    policy: DeletionPolicy,
    pending: Vec<DeleteRequest>,
}

/// 立即策略下没有定时器，永远不会触发
async fn next_tick(ticker: &mut Option<Interval>) {
    match ticker {
        Some(ticker) => {
            ticker.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}

impl Consumer {
    async fn run(mut self, mut rx: mpsc::Receiver<DeleteRequest>, mut stop_rx: oneshot::Receiver<()>) {
        let mut ticker = match self.policy {
            DeletionPolicy::Immediate => None,
            DeletionPolicy::Windowed(window) => {
                let mut ticker = interval(window);
                ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
                // 第一次 tick 立即完成
                ticker.tick().await;
                Some(ticker)
            }
        };

        loop {
            tokio::select! {
                biased;
                _ = &mut stop_rx => {
                    // 协调器被 drop 时 sender 也会被丢弃，同样走这里
                    rx.close();
                    while let Some(request) = rx.recv().await {
                        self.accept(request).await;
                    }
                    self.flush().await;
                    break;
                }
                // 窗口到期优先于接收，持续入队时也能按时 flush
                _ = next_tick(&mut ticker) => {
                    trace!("DeletionCoordinator: window elapsed");
                    self.flush().await;
                }
                received = rx.recv() => match received {
                    Some(request) => self.accept(request).await,
                    None => {
                        self.flush().await;
                        break;
                    }
                },
            }
        }

        debug!("DeletionCoordinator: consumer exited");
    }

    async fn accept(&mut self, request: DeleteRequest) {
        match self.policy {
            DeletionPolicy::Immediate => self.apply(vec![request]).await,
            DeletionPolicy::Windowed(_) => self.pending.push(request),
        }
    }

    async fn flush(&mut self) {
        if self.pending.is_empty() {
            return;
        }
        let batch = std::mem::take(&mut self.pending);
        self.apply(batch).await;
    }

    /// 调用一次 `delete_batch`，失败时记录日志并丢弃整批
    async fn apply(&self, batch: Vec<DeleteRequest>) {
        self.counters.draining.store(true, Ordering::Release);
        self.counters.flushes.fetch_add(1, Ordering::Relaxed);

        let count = batch.len();
        match self
            .engine
            .delete_batch(&OpContext::background(), &batch)
            .await
        {
            Ok(changed) => {
                if changed {
                    self.counters.applied_changes.fetch_add(1, Ordering::Relaxed);
                }
                debug!(
                    "DeletionCoordinator: flushed {} requests (changed: {})",
                    count, changed
                );
            }
            Err(e) => {
                self.counters.failed_flushes.fetch_add(1, Ordering::Relaxed);
                self.counters
                    .dropped_requests
                    .fetch_add(count as u64, Ordering::Relaxed);
                error!(
                    "DeletionCoordinator: delete_batch on {} failed, dropping {} requests: {}",
                    self.engine.backend_name(),
                    count,
                    e
                );
            }
        }

        self.counters.draining.store(false, Ordering::Release);
    }
}
