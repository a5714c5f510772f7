//! 探测结果数据结构
//!
//! 定义健康状态、探测状态码哨兵以及单次探测的分类结果

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// 健康状态枚举
///
/// 变体的声明顺序即严重程度顺序：`Ok < Warning < Error < Unknown`
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthState {
    /// 正常
    Ok,
    /// 警告（功能正常但已降级）
    Warning,
    /// 错误
    Error,
    /// 未知
    Unknown,
}

impl std::fmt::Display for HealthState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HealthState::Ok => write!(f, "Ok"),
            HealthState::Warning => write!(f, "Warning"),
            HealthState::Error => write!(f, "Error"),
            HealthState::Unknown => write!(f, "Unknown"),
        }
    }
}

impl HealthState {
    /// 判断状态是否为健康
    pub fn is_healthy(&self) -> bool {
        matches!(self, HealthState::Ok)
    }

    /// 取两者中更差的状态
    pub fn worst(self, other: HealthState) -> HealthState {
        self.max(other)
    }
}

/// 最近一次探测观察到的状态
///
/// 超时与传输失败没有HTTP状态码，用哨兵变体表示
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(tag = "kind", content = "code", rename_all = "lowercase")]
pub enum ProbeStatus {
    /// 从未执行过探测
    #[default]
    None,
    /// 收到HTTP响应
    Http(u16),
    /// 超过最大持续时间
    Timeout,
    /// 连接、DNS或端点解析失败
    Transport,
}

impl ProbeStatus {
    /// HTTP状态码（如果有）
    pub fn status_code(&self) -> Option<u16> {
        match self {
            ProbeStatus::Http(code) => Some(*code),
            _ => None,
        }
    }

    /// 是否为超时或传输失败哨兵
    pub fn is_sentinel_failure(&self) -> bool {
        matches!(self, ProbeStatus::Timeout | ProbeStatus::Transport)
    }
}

impl std::fmt::Display for ProbeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProbeStatus::None => write!(f, "N/A"),
            ProbeStatus::Http(code) => write!(f, "HTTP {code}"),
            ProbeStatus::Timeout => write!(f, "TIMEOUT"),
            ProbeStatus::Transport => write!(f, "TRANSPORT"),
        }
    }
}

/// 单次探测结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProbeResult {
    /// 健康检查键
    pub key: String,
    /// 观察到的状态或哨兵
    pub status: ProbeStatus,
    /// 实际耗时
    #[serde(with = "duration_millis")]
    pub duration: Duration,
    /// 分类结果
    pub classification: HealthState,
    /// 完成时间
    pub completed_at: DateTime<Utc>,
    /// 错误信息（如果有）
    pub error_message: Option<String>,
}

impl ProbeResult {
    /// 创建新的探测结果
    pub fn new(
        key: String,
        status: ProbeStatus,
        duration: Duration,
        classification: HealthState,
    ) -> Self {
        Self {
            key,
            status,
            duration,
            classification,
            completed_at: Utc::now(),
            error_message: None,
        }
    }

    /// 设置错误信息
    pub fn with_error(mut self, error_message: String) -> Self {
        self.error_message = Some(error_message);
        self
    }

    /// 设置完成时间
    pub fn with_completed_at(mut self, completed_at: DateTime<Utc>) -> Self {
        self.completed_at = completed_at;
        self
    }

    /// 获取耗时（毫秒）
    pub fn duration_ms(&self) -> u64 {
        self.duration.as_millis() as u64
    }
}

/// Duration 以毫秒整数序列化
pub(crate) mod duration_millis {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        (duration.as_millis() as u64).serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}
