//! 配置数据结构定义
//!
//! 定义应用程序的配置结构体和验证逻辑

use crate::health::definition::CheckDefinition;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;
use uuid::Uuid;

/// 主配置结构
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Config {
    /// 全局配置项
    #[serde(default)]
    pub global: GlobalConfig,
    /// 存储配置
    #[serde(default)]
    pub store: StoreConfig,
    /// Web 服务器配置
    #[serde(default)]
    pub web: WebConfig,
    /// 静态端点表
    #[serde(default)]
    pub endpoints: Vec<EndpointConfig>,
    /// 启动时预注册的健康检查
    #[serde(default)]
    pub checks: Vec<CheckConfig>,
}

/// 全局配置结构
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GlobalConfig {
    /// 日志级别
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// 最大并发探测数
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent_probes: usize,
    /// 健康报告间隔（秒）
    #[serde(default = "default_report_interval")]
    pub health_report_interval_seconds: u64,
    /// 未指定间隔的健康检查使用的默认探测间隔（秒）
    #[serde(default = "default_frequency")]
    pub default_frequency_seconds: u64,
    /// 探测请求的User-Agent
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            max_concurrent_probes: default_max_concurrent(),
            health_report_interval_seconds: default_report_interval(),
            default_frequency_seconds: default_frequency(),
            user_agent: default_user_agent(),
        }
    }
}

impl GlobalConfig {
    /// 健康报告间隔
    pub fn health_report_interval(&self) -> Duration {
        Duration::from_secs(self.health_report_interval_seconds)
    }

    /// 默认探测间隔
    pub fn default_frequency(&self) -> Duration {
        Duration::from_secs(self.default_frequency_seconds)
    }
}

/// 存储后端类型
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    /// 内存存储，进程退出后丢失
    #[default]
    Memory,
    /// JSON文件存储
    File,
}

/// 存储配置
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct StoreConfig {
    /// 存储后端
    #[serde(default)]
    pub backend: StoreBackend,
    /// 文件存储路径
    #[serde(default)]
    pub path: Option<PathBuf>,
}

/// Web 服务器配置结构
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WebConfig {
    /// 是否启用 Web 功能
    #[serde(default = "default_web_enabled")]
    pub enabled: bool,
    /// 绑定地址
    #[serde(default = "default_web_bind_address")]
    pub bind_address: String,
    /// 监听端口
    #[serde(default = "default_web_port")]
    pub port: u16,
    /// 是否为自身注册健康检查
    #[serde(default = "default_register_self_check")]
    pub register_self_check: bool,
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            enabled: default_web_enabled(),
            bind_address: default_web_bind_address(),
            port: default_web_port(),
            register_self_check: default_register_self_check(),
        }
    }
}

/// 静态端点配置
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EndpointConfig {
    /// 服务URI
    pub service_uri: String,
    /// 分区ID，不指定时适用于该服务的所有分区
    #[serde(default)]
    pub partition: Option<Uuid>,
    /// 端点名称到基础地址的映射
    #[serde(default)]
    pub endpoints: BTreeMap<String, String>,
}

/// 预注册健康检查配置
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct CheckConfig {
    /// 检查名称
    pub name: String,
    /// 服务URI
    pub service_uri: String,
    /// 分区ID，默认为空UUID
    #[serde(default)]
    pub partition: Option<Uuid>,
    /// 端点名称
    #[serde(default)]
    pub endpoint: Option<String>,
    /// 后缀路径
    pub suffix_path: String,
    /// HTTP方法
    #[serde(default)]
    pub method: Option<String>,
    /// 请求体
    #[serde(default)]
    pub content: Option<String>,
    /// 请求体媒体类型
    #[serde(default)]
    pub media_type: Option<String>,
    /// 探测间隔（秒）
    #[serde(default)]
    pub frequency_seconds: Option<u64>,
    /// 期望耗时（毫秒）
    #[serde(default)]
    pub expected_duration_ms: Option<u64>,
    /// 最大耗时（毫秒）
    #[serde(default)]
    pub maximum_duration_ms: Option<u64>,
    /// 请求头
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    /// 视为警告的状态码
    #[serde(default)]
    pub warning_status_codes: Vec<u16>,
    /// 视为错误的状态码
    #[serde(default)]
    pub error_status_codes: Vec<u16>,
}

impl CheckConfig {
    /// 转换为健康检查定义，未指定的字段留空，由注册时填充默认值
    pub fn to_definition(&self) -> CheckDefinition {
        CheckDefinition {
            name: self.name.clone(),
            service_uri: self.service_uri.clone(),
            partition: self.partition.unwrap_or_default(),
            endpoint: self.endpoint.clone(),
            suffix_path: self.suffix_path.clone(),
            method: self.method.clone().unwrap_or_default(),
            content: self.content.clone(),
            media_type: self.media_type.clone(),
            frequency: Duration::from_secs(self.frequency_seconds.unwrap_or(0)),
            expected_duration: Duration::from_millis(self.expected_duration_ms.unwrap_or(0)),
            maximum_duration: Duration::from_millis(self.maximum_duration_ms.unwrap_or(0)),
            headers: self.headers.clone(),
            warning_status_codes: self.warning_status_codes.iter().copied().collect(),
            error_status_codes: self.error_status_codes.iter().copied().collect(),
            ..Default::default()
        }
    }
}

// 默认值函数
fn default_log_level() -> String {
    "info".to_string()
}
fn default_max_concurrent() -> usize {
    50
}
fn default_report_interval() -> u64 {
    30
}
fn default_frequency() -> u64 {
    60
}
fn default_user_agent() -> String {
    format!("{}/{}", crate::APP_NAME, crate::VERSION)
}

/// 默认 Web 功能启用状态
fn default_web_enabled() -> bool {
    false
}

/// 默认 Web 服务器绑定地址
fn default_web_bind_address() -> String {
    "0.0.0.0".to_string()
}

/// 默认 Web 服务器端口
fn default_web_port() -> u16 {
    8080
}

fn default_register_self_check() -> bool {
    true
}

/// 配置验证函数
///
/// # 参数
/// * `config` - 要验证的配置
///
/// # 返回
/// * `Result<(), String>` - 验证结果，错误时返回错误信息
pub fn validate_config(config: &Config) -> Result<(), String> {
    // 验证全局配置
    if config.global.max_concurrent_probes == 0 {
        return Err("最大并发探测数不能为0".to_string());
    }

    if config.global.health_report_interval_seconds == 0 {
        return Err("健康报告间隔不能为0".to_string());
    }

    if config.global.default_frequency_seconds == 0 {
        return Err("默认探测间隔不能为0".to_string());
    }

    // 验证日志级别
    let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
    if !valid_log_levels.contains(&config.global.log_level.to_lowercase().as_str()) {
        return Err(format!(
            "无效的日志级别: {}，支持的级别: {:?}",
            config.global.log_level, valid_log_levels
        ));
    }

    // 验证存储配置
    if config.store.backend == StoreBackend::File && config.store.path.is_none() {
        return Err("文件存储必须配置path".to_string());
    }

    // 验证Web配置（如果启用）
    if config.web.enabled {
        if config.web.port == 0 {
            return Err(format!(
                "无效的Web服务器端口: {}，端口不能为0",
                config.web.port
            ));
        }

        if config.web.bind_address.trim().is_empty() {
            return Err("Web服务器绑定地址不能为空".to_string());
        }
    }

    // 验证端点表
    for endpoint in &config.endpoints {
        if endpoint.service_uri.trim().is_empty() {
            return Err("端点配置的服务URI不能为空".to_string());
        }
        for (name, base) in &endpoint.endpoints {
            if url::Url::parse(base).is_err() {
                return Err(format!(
                    "服务 {} 的端点 {} 地址无效: {}",
                    endpoint.service_uri, name, base
                ));
            }
        }
    }

    // 验证预注册的健康检查
    for check in &config.checks {
        if let Err(e) = check.to_definition().validate() {
            return Err(format!("健康检查 {} 配置无效: {}", check.name, e));
        }
    }

    Ok(())
}
