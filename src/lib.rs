//! Service Watchdog - 服务健康看门狗
//!
//! 周期性探测已注册的HTTP端点并聚合其健康状态：
//! - 健康检查注册表（持久化到键值存储）
//! - 按到期时间调度探测，同一检查同时最多一个探测
//! - 按状态码和耗时分类探测结果
//! - 聚合最差状态并周期上报
//! - 可选的HTTP注册与查询API

pub mod cli;
pub mod config;
pub mod error;
pub mod health;
pub mod logging;
pub mod reporting;
pub mod service;
pub mod store;
pub mod web;

// 重新导出主要类型
pub use config::{Config, GlobalConfig};
pub use error::{Result, WatchdogError};
pub use health::{CheckDefinition, HealthState, ProbeResult, ProbeStatus};
pub use service::{HealthCheckOperations, WatchdogService};

/// 应用程序版本信息
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// 应用程序名称
pub const APP_NAME: &str = env!("CARGO_PKG_NAME");

/// 应用程序描述
pub const APP_DESCRIPTION: &str = env!("CARGO_PKG_DESCRIPTION");
