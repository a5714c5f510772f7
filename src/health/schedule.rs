//! 调度索引
//!
//! 按到期时间排序的待执行检查队列，每个健康检查键最多保留一个条目

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};

/// 调度条目
///
/// 排序规则为 `(due_at, key)`，到期时间相同的条目按键的字典序排列
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleEntry {
    /// 到期时间
    pub due_at: DateTime<Utc>,
    /// 健康检查键
    pub key: String,
}

impl ScheduleEntry {
    /// 创建调度条目
    pub fn new(due_at: DateTime<Utc>, key: impl Into<String>) -> Self {
        Self {
            due_at,
            key: key.into(),
        }
    }

    /// 是否已到期
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.due_at <= now
    }
}

/// 调度索引
#[derive(Debug, Default)]
pub struct ScheduleIndex {
    ordered: BTreeSet<ScheduleEntry>,
    by_key: HashMap<String, DateTime<Utc>>,
}

impl ScheduleIndex {
    /// 创建空索引
    pub fn new() -> Self {
        Self::default()
    }

    /// 插入条目，同一键的旧条目会被替换
    ///
    /// # 返回
    /// * `Option<DateTime<Utc>>` - 被替换条目的到期时间
    pub fn insert(&mut self, entry: ScheduleEntry) -> Option<DateTime<Utc>> {
        let previous = self.by_key.insert(entry.key.clone(), entry.due_at);
        if let Some(due_at) = previous {
            self.ordered.remove(&ScheduleEntry::new(due_at, entry.key.clone()));
        }
        self.ordered.insert(entry);
        previous
    }

    /// 按键移除条目
    pub fn remove(&mut self, key: &str) -> Option<ScheduleEntry> {
        let due_at = self.by_key.remove(key)?;
        let entry = ScheduleEntry::new(due_at, key);
        self.ordered.remove(&entry);
        Some(entry)
    }

    /// 最早的条目
    pub fn peek(&self) -> Option<&ScheduleEntry> {
        self.ordered.first()
    }

    /// 最早的到期时间
    pub fn next_due(&self) -> Option<DateTime<Utc>> {
        self.peek().map(|e| e.due_at)
    }

    /// 取出所有已到期的条目，按排序顺序返回
    pub fn pop_due(&mut self, now: DateTime<Utc>) -> Vec<ScheduleEntry> {
        let mut due = Vec::new();
        while let Some(first) = self.ordered.first() {
            if !first.is_due(now) {
                break;
            }
            if let Some(entry) = self.ordered.pop_first() {
                self.by_key.remove(&entry.key);
                due.push(entry);
            }
        }
        due
    }

    /// 是否包含指定键
    pub fn contains(&self, key: &str) -> bool {
        self.by_key.contains_key(key)
    }

    /// 指定键的到期时间
    pub fn due_at(&self, key: &str) -> Option<DateTime<Utc>> {
        self.by_key.get(key).copied()
    }

    /// 条目数量
    pub fn len(&self) -> usize {
        self.ordered.len()
    }

    /// 是否为空
    pub fn is_empty(&self) -> bool {
        self.ordered.is_empty()
    }

    /// 清空索引
    pub fn clear(&mut self) {
        self.ordered.clear();
        self.by_key.clear();
    }
}
