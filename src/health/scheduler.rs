//! 任务调度器模块
//!
//! 按到期时间驱动健康检查探测：
//! - 每个健康检查键最多同时有一个探测在执行
//! - 探测完成后以完成时间加探测间隔作为下一次到期时间
//! - 调度记录在后继记录写入前一直保留，进程崩溃后重启会补做到期的检查

use crate::error::{Result, StorageError, StorageResult};
use crate::health::checker::ProbeExecutor;
use crate::health::definition::CheckDefinition;
use crate::health::registry::{CheckRegistry, Registration};
use crate::health::result::{HealthState, ProbeResult, ProbeStatus};
use crate::health::schedule::{ScheduleEntry, ScheduleIndex};
use chrono::{DateTime, Utc};
use futures::FutureExt;
use std::collections::HashSet;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{broadcast, Mutex, Notify, RwLock, Semaphore};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

/// 没有任何调度条目时的空闲等待时间
const IDLE_WAIT: Duration = Duration::from_secs(60);

/// 读取定义失败时的重试间隔
const STORAGE_RETRY_DELAY: Duration = Duration::from_secs(5);

/// 调度器状态
#[derive(Debug, Clone)]
pub struct SchedulerStatus {
    /// 调度器是否运行中
    pub is_running: bool,
    /// 等待中的调度条目数量
    pub scheduled: usize,
    /// 执行中的探测数量
    pub in_flight: usize,
    /// 已完成的探测总数
    pub completed_probes: u64,
    /// 最后更新时间
    pub last_update: DateTime<Utc>,
}

impl Default for SchedulerStatus {
    fn default() -> Self {
        Self {
            is_running: false,
            scheduled: 0,
            in_flight: 0,
            completed_probes: 0,
            last_update: Utc::now(),
        }
    }
}

#[derive(Debug, Default)]
struct SchedulerState {
    index: ScheduleIndex,
    in_flight: HashSet<String>,
    deferred: HashSet<String>,
    removed: HashSet<String>,
}

/// 健康检查调度器
pub struct WatchdogScheduler {
    /// 健康检查注册表
    registry: Arc<CheckRegistry>,
    /// 探测执行器
    executor: Arc<dyn ProbeExecutor>,
    /// 调度索引与执行中集合
    state: Mutex<SchedulerState>,
    /// 并发控制信号量
    semaphore: Arc<Semaphore>,
    /// 唤醒调度循环
    wakeup: Notify,
    /// 调度器状态
    status: RwLock<SchedulerStatus>,
}

impl WatchdogScheduler {
    /// 创建新的调度器
    ///
    /// # 参数
    /// * `registry` - 健康检查注册表
    /// * `executor` - 探测执行器
    /// * `max_concurrent` - 最大并发探测数
    pub fn new(
        registry: Arc<CheckRegistry>,
        executor: Arc<dyn ProbeExecutor>,
        max_concurrent: usize,
    ) -> Self {
        Self {
            registry,
            executor,
            state: Mutex::new(SchedulerState::default()),
            semaphore: Arc::new(Semaphore::new(max_concurrent.max(1))),
            wakeup: Notify::new(),
            status: RwLock::new(SchedulerStatus::default()),
        }
    }

    /// 注册表
    pub fn registry(&self) -> &Arc<CheckRegistry> {
        &self.registry
    }

    /// 从持久化的调度记录恢复调度索引
    ///
    /// 没有定义的调度记录被删除；没有调度记录的定义立即到期
    pub async fn restore(&self) -> Result<usize> {
        let entries = self
            .with_registry(|registry| -> StorageResult<Vec<ScheduleEntry>> {
                let definitions = registry.list_all()?;
                let known: HashSet<String> =
                    definitions.iter().map(CheckDefinition::key).collect();

                let mut entries = Vec::with_capacity(known.len());
                for entry in registry.load_schedule()? {
                    if known.contains(&entry.key) {
                        entries.push(entry);
                    } else {
                        warn!("清理无对应定义的调度记录: {}", entry.key);
                        registry.delete_schedule(&entry.key)?;
                    }
                }

                let now = Utc::now();
                for key in known {
                    if !entries.iter().any(|entry| entry.key == key) {
                        let entry = ScheduleEntry::new(now, key);
                        registry.put_schedule(&entry)?;
                        entries.push(entry);
                    }
                }
                Ok(entries)
            })
            .await?;

        let mut state = self.state.lock().await;
        state.index.clear();
        for entry in entries {
            state.index.insert(entry);
        }
        let restored = state.index.len();
        drop(state);

        info!("恢复调度索引完成，条目数量: {}", restored);
        self.wakeup.notify_one();
        Ok(restored)
    }

    /// 注册健康检查并加入调度
    pub async fn register(&self, definition: CheckDefinition) -> Result<Registration> {
        let registration = self
            .with_registry(move |registry| registry.register(definition))
            .await?;
        self.schedule(&registration).await;
        Ok(registration)
    }

    /// 注册健康检查并清除历史结果
    pub async fn register_with_reset(&self, definition: CheckDefinition) -> Result<Registration> {
        let registration = self
            .with_registry(move |registry| registry.register_with_reset(definition))
            .await?;
        self.schedule(&registration).await;
        Ok(registration)
    }

    async fn schedule(&self, registration: &Registration) {
        let key = registration.definition.key();
        let mut state = self.state.lock().await;
        state.removed.remove(&key);
        if state.in_flight.contains(&key) {
            // 执行中的键在完成后立即再次到期
            state.deferred.insert(key);
        } else if !state.index.contains(&key) {
            state.index.insert(ScheduleEntry::new(registration.due_at, key));
        }
        drop(state);
        self.wakeup.notify_one();
    }

    /// 删除健康检查，执行中的探测结果将被丢弃
    pub async fn remove(&self, key: &str) -> StorageResult<bool> {
        let owned = key.to_string();
        let existed = self
            .with_registry(move |registry| registry.remove(&owned))
            .await?;
        let mut state = self.state.lock().await;
        state.index.remove(key);
        state.deferred.remove(key);
        if state.in_flight.contains(key) {
            state.removed.insert(key.to_string());
        }
        Ok(existed)
    }

    /// 在阻塞线程池上执行注册表操作，文件存储的落盘不占用运行时线程
    async fn with_registry<T, E, F>(&self, f: F) -> std::result::Result<T, E>
    where
        F: FnOnce(&CheckRegistry) -> std::result::Result<T, E> + Send + 'static,
        T: Send + 'static,
        E: From<StorageError> + Send + 'static,
    {
        let registry = Arc::clone(&self.registry);
        match tokio::task::spawn_blocking(move || f(&registry)).await {
            Ok(outcome) => outcome,
            Err(e) => Err(StorageError::Unavailable(format!("存储任务执行失败: {e}")).into()),
        }
    }

    /// 调度器是否运行中
    pub async fn is_running(&self) -> bool {
        self.status.read().await.is_running
    }

    /// 获取调度器状态
    pub async fn get_status(&self) -> SchedulerStatus {
        let state = self.state.lock().await;
        let mut status = self.status.read().await.clone();
        status.scheduled = state.index.len();
        status.in_flight = state.in_flight.len();
        status
    }

    /// 运行调度循环直到收到关闭信号
    ///
    /// 关闭时等待执行中的探测完成并写回结果
    pub async fn run(self: Arc<Self>, mut shutdown: broadcast::Receiver<()>) {
        info!("启动健康检查调度器");
        self.set_running(true).await;

        let mut tasks: JoinSet<ProbeResult> = JoinSet::new();

        loop {
            self.dispatch_due(&mut tasks).await;

            let wait = self.time_until_next_due().await;

            tokio::select! {
                _ = shutdown.recv() => {
                    info!("收到关闭信号，停止调度");
                    break;
                }
                _ = self.wakeup.notified() => {
                    debug!("调度器被唤醒");
                }
                _ = tokio::time::sleep(wait) => {}
                Some(joined) = tasks.join_next(), if !tasks.is_empty() => {
                    self.handle_joined(joined).await;
                }
            }
        }

        if !tasks.is_empty() {
            info!("等待 {} 个执行中的探测完成", tasks.len());
        }
        while let Some(joined) = tasks.join_next().await {
            self.handle_joined(joined).await;
        }

        self.set_running(false).await;
        info!("健康检查调度器已停止");
    }

    async fn set_running(&self, running: bool) {
        let mut status = self.status.write().await;
        status.is_running = running;
        status.last_update = Utc::now();
    }

    async fn time_until_next_due(&self) -> Duration {
        let state = self.state.lock().await;
        match state.index.next_due() {
            Some(due_at) => (due_at - Utc::now()).to_std().unwrap_or(Duration::ZERO),
            None => IDLE_WAIT,
        }
    }

    /// 启动所有已到期的探测
    async fn dispatch_due(&self, tasks: &mut JoinSet<ProbeResult>) {
        let mut stale = Vec::new();
        let mut state = self.state.lock().await;
        let now = Utc::now();
        let due = state.index.pop_due(now);

        for entry in due {
            if state.in_flight.contains(&entry.key) {
                state.deferred.insert(entry.key);
                continue;
            }

            let definition = match self.registry.get(&entry.key) {
                Ok(Some(definition)) => definition,
                Ok(None) => {
                    warn!("调度条目对应的健康检查已不存在: {}", entry.key);
                    stale.push(entry.key);
                    continue;
                }
                Err(e) => {
                    error!("读取健康检查定义失败: {} - {}", entry.key, e);
                    state
                        .index
                        .insert(ScheduleEntry::new(now + to_chrono(STORAGE_RETRY_DELAY), entry.key));
                    continue;
                }
            };

            debug!("开始探测: {} ({})", definition.name, entry.key);
            state.in_flight.insert(entry.key);

            let executor = Arc::clone(&self.executor);
            let semaphore = Arc::clone(&self.semaphore);
            tasks.spawn(async move {
                let _permit = semaphore.acquire_owned().await.ok();
                let started = Instant::now();
                match AssertUnwindSafe(executor.execute(&definition)).catch_unwind().await {
                    Ok(result) => result,
                    Err(_) => ProbeResult::new(
                        definition.key(),
                        ProbeStatus::Transport,
                        started.elapsed(),
                        HealthState::Error,
                    )
                    .with_error("探测任务异常终止".to_string()),
                }
            });
        }
        drop(state);

        for key in stale {
            let outcome = self
                .with_registry({
                    let key = key.clone();
                    move |registry| registry.delete_schedule(&key)
                })
                .await;
            if let Err(e) = outcome {
                error!("删除调度记录失败: {} - {}", key, e);
            }
        }
    }

    async fn handle_joined(&self, joined: std::result::Result<ProbeResult, tokio::task::JoinError>) {
        match joined {
            Ok(result) => self.complete(result).await,
            Err(e) => error!("探测任务执行失败: {}", e),
        }
    }

    /// 写回探测结果并安排后继调度
    async fn complete(&self, result: ProbeResult) {
        if result.classification == HealthState::Ok {
            debug!("探测正常: {} {}", result.key, result.status);
        } else {
            warn!(
                "探测异常: {} {} {},{}",
                result.key,
                result.status,
                result.classification,
                result.error_message.as_deref().unwrap_or("N/A")
            );
        }

        let recorded = self
            .with_registry({
                let result = result.clone();
                move |registry| registry.record_result(&result)
            })
            .await;
        let frequency = match recorded {
            Ok(Some(updated)) => Some(updated.frequency),
            Ok(None) => None,
            Err(e) => {
                error!("记录探测结果失败: {} - {}", result.key, e);
                Some(self.registry.default_frequency())
            }
        };

        let deferred = self.state.lock().await.deferred.contains(&result.key);
        let successor = frequency.map(|frequency| {
            let due_at = if deferred {
                Utc::now()
            } else {
                result.completed_at + to_chrono(frequency)
            };
            ScheduleEntry::new(due_at, result.key.clone())
        });

        // 后继记录只在定义仍然存在时写入，与删除操作在注册表内串行
        let persisted = match successor {
            Some(entry) => {
                let written = self
                    .with_registry({
                        let entry = entry.clone();
                        move |registry| registry.reschedule(&entry)
                    })
                    .await;
                match written {
                    Ok(true) => Some(entry),
                    Ok(false) => None,
                    Err(e) => {
                        error!("写入调度记录失败: {} - {}", result.key, e);
                        Some(entry)
                    }
                }
            }
            None => {
                let key = result.key.clone();
                if let Err(e) = self
                    .with_registry(move |registry| registry.delete_schedule(&key))
                    .await
                {
                    error!("删除调度记录失败: {} - {}", result.key, e);
                }
                None
            }
        };

        let mut state = self.state.lock().await;
        state.in_flight.remove(&result.key);
        let removed = state.removed.remove(&result.key);
        let deferred = state.deferred.remove(&result.key);
        match persisted {
            Some(mut entry) if !removed => {
                if deferred {
                    entry.due_at = entry.due_at.min(Utc::now());
                }
                state.index.insert(entry);
            }
            _ => {
                state.index.remove(&result.key);
            }
        }
        drop(state);

        metrics::counter!("health_check_probes_total", "state" => result.classification.to_string())
            .increment(1);

        let mut status = self.status.write().await;
        status.completed_probes += 1;
        status.last_update = Utc::now();
    }
}

fn to_chrono(duration: Duration) -> chrono::Duration {
    chrono::Duration::from_std(duration).unwrap_or_else(|_| chrono::Duration::seconds(60))
}
