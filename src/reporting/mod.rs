//! 健康报告模块
//!
//! 周期性地把看门狗自身状态和聚合健康状态报告给外部健康汇

pub mod reporter;
pub mod sink;

// 重新导出主要类型
pub use reporter::HealthReporter;
pub use sink::{HealthReport, HealthSink, LogHealthSink, NoOpHealthSink};
