//! 周期健康报告任务

use crate::health::aggregator::HealthAggregator;
use crate::health::result::HealthState;
use crate::health::scheduler::WatchdogScheduler;
use crate::reporting::sink::{HealthReport, HealthSink};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info};

/// 看门狗自身状态的指标名称
pub const SELF_HEALTH_METRIC: &str = "WatchdogServiceHealth";
/// 聚合健康状态的指标名称
pub const OPERATIONS_HEALTH_METRIC: &str = "HealthCheckOperations";

/// 报告有效期在间隔之外的余量
const TTL_SLACK: Duration = Duration::from_secs(30);

/// 周期健康报告器
pub struct HealthReporter {
    target_name: String,
    interval: Duration,
    aggregator: Arc<HealthAggregator>,
    scheduler: Arc<WatchdogScheduler>,
    sink: Arc<dyn HealthSink>,
}

impl HealthReporter {
    /// 创建报告器
    ///
    /// # 参数
    /// * `target_name` - 报告目标名称
    /// * `interval` - 报告间隔
    /// * `aggregator` - 健康状态聚合器
    /// * `scheduler` - 调度器，用于判断自身状态
    /// * `sink` - 健康报告汇
    pub fn new(
        target_name: impl Into<String>,
        interval: Duration,
        aggregator: Arc<HealthAggregator>,
        scheduler: Arc<WatchdogScheduler>,
        sink: Arc<dyn HealthSink>,
    ) -> Self {
        Self {
            target_name: target_name.into(),
            interval,
            aggregator,
            scheduler,
            sink,
        }
    }

    /// 报告有效期
    pub fn ttl(&self) -> Duration {
        self.interval + TTL_SLACK
    }

    /// 生成本轮的两份报告
    pub async fn build_reports(&self) -> Vec<HealthReport> {
        let (self_state, self_description) = if self.scheduler.is_running().await {
            (HealthState::Ok, "调度器运行中".to_string())
        } else {
            (HealthState::Error, "调度器未运行".to_string())
        };

        let (operations_state, operations_description) = match self.aggregator.summarize() {
            Ok(summary) => (summary.state, summary.description),
            Err(e) => (HealthState::Error, format!("读取健康检查失败: {e}")),
        };

        vec![
            HealthReport {
                target_name: self.target_name.clone(),
                metric_name: SELF_HEALTH_METRIC.to_string(),
                state: self_state,
                ttl: self.ttl(),
                description: self_description,
            },
            HealthReport {
                target_name: self.target_name.clone(),
                metric_name: OPERATIONS_HEALTH_METRIC.to_string(),
                state: operations_state,
                ttl: self.ttl(),
                description: operations_description,
            },
        ]
    }

    /// 执行一轮报告
    pub async fn report_once(&self) {
        for report in self.build_reports().await {
            if let Err(e) = self.sink.report(&report).await {
                error!("发送健康报告失败: {} - {}", report.metric_name, e);
            }
        }
    }

    /// 运行报告循环直到收到关闭信号
    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        info!("启动健康报告任务，间隔: {:?}", self.interval);
        let mut ticker = interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = shutdown.recv() => {
                    info!("健康报告任务已停止");
                    break;
                }
                _ = ticker.tick() => {
                    debug!("发送健康报告");
                    self.report_once().await;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::health::checker::ProbeExecutor;
    use crate::health::definition::CheckDefinition;
    use crate::health::registry::CheckRegistry;
    use crate::health::result::{ProbeResult, ProbeStatus};
    use crate::store::MemoryStore;
    use async_trait::async_trait;
    use tokio::sync::Mutex;

    struct RecordingSink {
        reports: Mutex<Vec<HealthReport>>,
    }

    #[async_trait]
    impl HealthSink for RecordingSink {
        async fn report(&self, report: &HealthReport) -> anyhow::Result<()> {
            self.reports.lock().await.push(report.clone());
            Ok(())
        }
    }

    struct OkExecutor;

    #[async_trait]
    impl ProbeExecutor for OkExecutor {
        async fn execute(&self, definition: &CheckDefinition) -> ProbeResult {
            ProbeResult::new(
                definition.key(),
                ProbeStatus::Http(200),
                Duration::from_millis(1),
                HealthState::Ok,
            )
        }
    }

    fn create_reporter(sink: Arc<RecordingSink>) -> (Arc<WatchdogScheduler>, HealthReporter) {
        let registry = Arc::new(CheckRegistry::new(Arc::new(MemoryStore::new())));
        let scheduler = Arc::new(WatchdogScheduler::new(
            registry.clone(),
            Arc::new(OkExecutor),
            4,
        ));
        let aggregator = Arc::new(HealthAggregator::new(registry));
        let reporter = HealthReporter::new(
            "service-watchdog",
            Duration::from_secs(30),
            aggregator,
            scheduler.clone(),
            sink,
        );
        (scheduler, reporter)
    }

    #[tokio::test]
    async fn test_reports_error_when_scheduler_stopped() {
        let sink = Arc::new(RecordingSink {
            reports: Mutex::new(Vec::new()),
        });
        let (_scheduler, reporter) = create_reporter(sink.clone());

        assert_eq!(reporter.ttl(), Duration::from_secs(60));
        reporter.report_once().await;

        let reports = sink.reports.lock().await;
        assert_eq!(reports.len(), 2);
        assert_eq!(reports[0].metric_name, SELF_HEALTH_METRIC);
        assert_eq!(reports[0].state, HealthState::Error);
        assert_eq!(reports[1].metric_name, OPERATIONS_HEALTH_METRIC);
        assert_eq!(reports[1].state, HealthState::Ok);
        assert_eq!(reports[1].description, "no health checks registered");
    }

    #[tokio::test]
    async fn test_reports_ok_while_scheduler_running() {
        let sink = Arc::new(RecordingSink {
            reports: Mutex::new(Vec::new()),
        });
        let (scheduler, reporter) = create_reporter(sink.clone());

        let (tx, rx) = broadcast::channel(1);
        let handle = tokio::spawn(Arc::clone(&scheduler).run(rx));
        tokio::time::sleep(Duration::from_millis(50)).await;

        let reports = reporter.build_reports().await;
        assert_eq!(reports[0].state, HealthState::Ok);

        tx.send(()).unwrap();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_run_stops_on_shutdown() {
        let sink = Arc::new(RecordingSink {
            reports: Mutex::new(Vec::new()),
        });
        let (_scheduler, reporter) = create_reporter(sink.clone());

        let (tx, rx) = broadcast::channel(1);
        let handle = tokio::spawn(reporter.run(rx));
        tokio::time::sleep(Duration::from_millis(50)).await;
        tx.send(()).unwrap();
        handle.await.unwrap();

        // interval 的第一次tick立即触发
        assert_eq!(sink.reports.lock().await.len(), 2);
    }
}
