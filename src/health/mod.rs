//! 健康检测模块
//!
//! 健康检查注册表、调度索引、HTTP探测执行、调度循环与状态聚合

pub mod aggregator;
pub mod checker;
pub mod definition;
pub mod endpoint;
pub mod registry;
pub mod result;
pub mod schedule;
pub mod scheduler;

// 重新导出主要类型
pub use aggregator::{HealthAggregator, HealthSummary};
pub use checker::{classify, HttpProbeExecutor, ProbeExecutor};
pub use definition::CheckDefinition;
pub use endpoint::{EndpointResolver, StaticEndpointResolver};
pub use registry::{CheckRegistry, Registration};
pub use result::{HealthState, ProbeResult, ProbeStatus};
pub use schedule::{ScheduleEntry, ScheduleIndex};
pub use scheduler::{SchedulerStatus, WatchdogScheduler};
