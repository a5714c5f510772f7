//! 健康检查注册表
//!
//! 持久化两张表：
//! - `definitions/{key}` 保存健康检查定义
//! - `schedule/{key}` 保存该键的下一次到期时间

use crate::error::{Result, StorageError, StorageResult};
use crate::health::definition::{CheckDefinition, DEFAULT_FREQUENCY};
use crate::health::result::ProbeResult;
use crate::health::schedule::ScheduleEntry;
use crate::store::KeyValueStore;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;

const DEFINITIONS_PREFIX: &str = "definitions/";
const SCHEDULE_PREFIX: &str = "schedule/";

/// 注册结果
#[derive(Debug, Clone, PartialEq)]
pub struct Registration {
    /// 写入后的定义
    pub definition: CheckDefinition,
    /// 是否为新键
    pub is_new: bool,
    /// 该键当前持久化的到期时间
    pub due_at: DateTime<Utc>,
}

/// 健康检查注册表
///
/// 注册、写回结果、删除和重新调度都在 `write_lock` 内完成，
/// 同一键上的读-改-写不会相互覆盖
pub struct CheckRegistry {
    store: Arc<dyn KeyValueStore>,
    default_frequency: Duration,
    write_lock: Mutex<()>,
}

fn encode<T: Serialize>(value: &T) -> StorageResult<Vec<u8>> {
    serde_json::to_vec(value).map_err(|e| StorageError::Serialize(e.to_string()))
}

fn decode<T: DeserializeOwned>(bytes: &[u8]) -> StorageResult<T> {
    serde_json::from_slice(bytes).map_err(|e| StorageError::Deserialize(e.to_string()))
}

fn definition_key(key: &str) -> String {
    format!("{DEFINITIONS_PREFIX}{key}")
}

fn schedule_key(key: &str) -> String {
    format!("{SCHEDULE_PREFIX}{key}")
}

impl CheckRegistry {
    /// 创建注册表
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self::with_default_frequency(store, DEFAULT_FREQUENCY)
    }

    /// 使用指定的默认探测间隔创建注册表
    pub fn with_default_frequency(store: Arc<dyn KeyValueStore>, default_frequency: Duration) -> Self {
        Self {
            store,
            default_frequency,
            write_lock: Mutex::new(()),
        }
    }

    fn lock_writes(&self) -> MutexGuard<'_, ()> {
        // 锁只保护写入顺序，中毒后仍可继续使用
        self.write_lock
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// 默认探测间隔
    pub fn default_frequency(&self) -> Duration {
        self.default_frequency
    }

    /// 注册或替换健康检查，重新注册时保留结果历史
    pub fn register(&self, definition: CheckDefinition) -> Result<Registration> {
        self.upsert(definition, false)
    }

    /// 注册或替换健康检查，并清除结果历史
    pub fn register_with_reset(&self, definition: CheckDefinition) -> Result<Registration> {
        self.upsert(definition, true)
    }

    fn upsert(&self, definition: CheckDefinition, reset: bool) -> Result<Registration> {
        // 校验在任何存储访问之前完成
        definition.validate()?;
        let _guard = self.lock_writes();

        let definition = definition.with_defaults(self.default_frequency);
        let key = definition.key();
        let previous = self.get(&key)?;

        let definition = match (&previous, reset) {
            (Some(old), false) => definition.with_history_from(old),
            _ => definition.without_history(),
        };

        self.store
            .put(&definition_key(&key), encode(&definition)?)?;

        let existing_due = match self.store.get(&schedule_key(&key)) {
            Ok(bytes) => bytes
                .and_then(|b| decode::<ScheduleEntry>(&b).ok())
                .map(|entry| entry.due_at),
            Err(e) => {
                self.rollback(&key, previous.as_ref());
                return Err(e.into());
            }
        };

        let due_at = match existing_due {
            Some(due_at) => due_at,
            None => {
                let now = Utc::now();
                if let Err(e) = self.put_schedule(&ScheduleEntry::new(now, key.clone())) {
                    self.rollback(&key, previous.as_ref());
                    return Err(e.into());
                }
                now
            }
        };

        if previous.is_none() {
            info!("注册健康检查: {} ({})", definition.name, key);
        } else {
            info!("更新健康检查: {} ({})", definition.name, key);
        }

        Ok(Registration {
            definition,
            is_new: previous.is_none(),
            due_at,
        })
    }

    // 调度表写入失败时恢复定义表，两张表保持一致
    fn rollback(&self, key: &str, previous: Option<&CheckDefinition>) {
        let outcome = match previous.map(encode) {
            Some(Ok(bytes)) => self.store.put(&definition_key(key), bytes),
            Some(Err(e)) => Err(e),
            None => self.store.delete(&definition_key(key)).map(|_| ()),
        };
        if let Err(e) = outcome {
            warn!("回滚健康检查定义失败: {} - {}", key, e);
        }
    }

    /// 读取单个健康检查定义
    pub fn get(&self, key: &str) -> StorageResult<Option<CheckDefinition>> {
        match self.store.get(&definition_key(key))? {
            Some(bytes) => Ok(Some(decode(&bytes)?)),
            None => Ok(None),
        }
    }

    /// 列出所有健康检查定义
    pub fn list_all(&self) -> StorageResult<Vec<CheckDefinition>> {
        let entries = self.store.scan_prefix(DEFINITIONS_PREFIX)?;
        let mut definitions = Vec::with_capacity(entries.len());
        for (key, bytes) in entries {
            match decode::<CheckDefinition>(&bytes) {
                Ok(definition) => definitions.push(definition),
                Err(e) => warn!("跳过无法解析的健康检查定义: {} - {}", key, e),
            }
        }
        Ok(definitions)
    }

    /// 按应用、服务和分区过滤健康检查定义，空过滤条件视为未提供
    pub fn list(
        &self,
        application: Option<&str>,
        service: Option<&str>,
        partition: Option<&Uuid>,
    ) -> StorageResult<Vec<CheckDefinition>> {
        Ok(self
            .list_all()?
            .into_iter()
            .filter(|d| d.matches_filter(application, service, partition))
            .collect())
    }

    /// 已注册的健康检查数量
    pub fn count(&self) -> StorageResult<usize> {
        Ok(self.store.scan_prefix(DEFINITIONS_PREFIX)?.len())
    }

    /// 把探测结果写回定义
    ///
    /// 键已被删除时记录警告并返回 `None`
    pub fn record_result(&self, result: &ProbeResult) -> StorageResult<Option<CheckDefinition>> {
        let _guard = self.lock_writes();
        let Some(current) = self.get(&result.key)? else {
            warn!("健康检查已不存在，丢弃探测结果: {}", result.key);
            return Ok(None);
        };

        let updated = current.apply_result(result);
        self.store
            .put(&definition_key(&result.key), encode(&updated)?)?;
        debug!(
            "记录探测结果: {} {} 失败次数 {}",
            result.key, result.status, updated.failure_count
        );
        Ok(Some(updated))
    }

    /// 删除健康检查定义及其调度记录
    pub fn remove(&self, key: &str) -> StorageResult<bool> {
        let _guard = self.lock_writes();
        let existed = self.store.delete(&definition_key(key))?;
        self.store.delete(&schedule_key(key))?;
        if existed {
            info!("删除健康检查: {}", key);
        }
        Ok(existed)
    }

    /// 为仍然存在的健康检查写入后继调度记录
    ///
    /// 定义已被删除时改为删除调度记录并返回 `false`
    pub fn reschedule(&self, entry: &ScheduleEntry) -> StorageResult<bool> {
        let _guard = self.lock_writes();
        if self.store.get(&definition_key(&entry.key))?.is_none() {
            self.store.delete(&schedule_key(&entry.key))?;
            return Ok(false);
        }
        self.store.put(&schedule_key(&entry.key), encode(entry)?)?;
        Ok(true)
    }

    /// 写入调度记录，同一键的旧记录被覆盖
    pub fn put_schedule(&self, entry: &ScheduleEntry) -> StorageResult<()> {
        self.store.put(&schedule_key(&entry.key), encode(entry)?)
    }

    /// 删除调度记录
    pub fn delete_schedule(&self, key: &str) -> StorageResult<bool> {
        self.store.delete(&schedule_key(key))
    }

    /// 读取全部调度记录
    pub fn load_schedule(&self) -> StorageResult<Vec<ScheduleEntry>> {
        let entries = self.store.scan_prefix(SCHEDULE_PREFIX)?;
        let mut schedule = Vec::with_capacity(entries.len());
        for (key, bytes) in entries {
            match decode::<ScheduleEntry>(&bytes) {
                Ok(entry) => schedule.push(entry),
                Err(e) => warn!("跳过无法解析的调度记录: {} - {}", key, e),
            }
        }
        Ok(schedule)
    }
}
