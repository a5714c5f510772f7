//! 健康报告汇
//!
//! 定义健康报告的trait和基础实现

use crate::health::result::HealthState;
use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{error, info, warn};

/// 健康报告
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthReport {
    /// 报告目标名称
    pub target_name: String,
    /// 指标名称
    pub metric_name: String,
    /// 健康状态
    pub state: HealthState,
    /// 报告有效期
    #[serde(with = "crate::health::result::duration_millis")]
    pub ttl: Duration,
    /// 描述
    pub description: String,
}

/// 健康报告汇trait
#[async_trait]
pub trait HealthSink: Send + Sync {
    /// 发送健康报告
    ///
    /// # 参数
    /// * `report` - 健康报告
    ///
    /// # 返回
    /// * `Result<()>` - 发送结果
    async fn report(&self, report: &HealthReport) -> Result<()>;
}

/// 通过日志输出健康报告
pub struct LogHealthSink;

#[async_trait]
impl HealthSink for LogHealthSink {
    async fn report(&self, report: &HealthReport) -> Result<()> {
        match report.state {
            HealthState::Ok => info!(
                "健康报告 {}/{}: {} (ttl {}s) {}",
                report.target_name,
                report.metric_name,
                report.state,
                report.ttl.as_secs(),
                report.description
            ),
            HealthState::Warning | HealthState::Unknown => warn!(
                "健康报告 {}/{}: {} (ttl {}s) {}",
                report.target_name,
                report.metric_name,
                report.state,
                report.ttl.as_secs(),
                report.description
            ),
            HealthState::Error => error!(
                "健康报告 {}/{}: {} (ttl {}s) {}",
                report.target_name,
                report.metric_name,
                report.state,
                report.ttl.as_secs(),
                report.description
            ),
        }
        Ok(())
    }
}

/// 空的健康报告汇（用于测试或禁用报告）
pub struct NoOpHealthSink;

#[async_trait]
impl HealthSink for NoOpHealthSink {
    async fn report(&self, _report: &HealthReport) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_report(state: HealthState) -> HealthReport {
        HealthReport {
            target_name: "service-watchdog".to_string(),
            metric_name: "HealthCheckOperations".to_string(),
            state,
            ttl: Duration::from_secs(60),
            description: "test".to_string(),
        }
    }

    #[tokio::test]
    async fn test_sinks_accept_reports() {
        for state in [
            HealthState::Ok,
            HealthState::Warning,
            HealthState::Error,
            HealthState::Unknown,
        ] {
            let report = create_test_report(state);
            assert!(LogHealthSink.report(&report).await.is_ok());
            assert!(NoOpHealthSink.report(&report).await.is_ok());
        }
    }

    #[test]
    fn test_report_serialization() {
        let json = serde_json::to_value(create_test_report(HealthState::Error)).unwrap();
        assert_eq!(json["metricName"], "HealthCheckOperations");
        assert_eq!(json["state"], "error");
        assert_eq!(json["ttl"], 60000);
    }
}
