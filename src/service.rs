//! 服务管理模块
//!
//! 负责组件初始化、对外操作接口和运行生命周期管理

use crate::config::Config;
use crate::error::Result;
use crate::health::{
    CheckDefinition, CheckRegistry, EndpointResolver, HealthAggregator, HealthSummary,
    HttpProbeExecutor, ProbeExecutor, ProbeResult, Registration, StaticEndpointResolver,
    WatchdogScheduler,
};
use crate::reporting::{HealthReporter, HealthSink, LogHealthSink};
use crate::store::{open_store, KeyValueStore};
use crate::web::WebServer;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};
use uuid::Uuid;

/// 自身健康检查的名称
pub const SELF_CHECK_NAME: &str = "Watchdog Health Check";

/// 健康检查操作接口
///
/// 外部调用方（HTTP API、启动流程）只通过这里注册和查询健康检查
pub struct HealthCheckOperations {
    scheduler: Arc<WatchdogScheduler>,
    aggregator: Arc<HealthAggregator>,
}

impl HealthCheckOperations {
    /// 创建操作接口
    pub fn new(scheduler: Arc<WatchdogScheduler>, aggregator: Arc<HealthAggregator>) -> Self {
        Self {
            scheduler,
            aggregator,
        }
    }

    /// 注册健康检查
    pub async fn register(&self, definition: CheckDefinition) -> Result<Registration> {
        self.scheduler.register(definition).await
    }

    /// 注册健康检查并清除历史结果
    pub async fn register_with_reset(&self, definition: CheckDefinition) -> Result<Registration> {
        self.scheduler.register_with_reset(definition).await
    }

    /// 按条件列出健康检查
    pub fn list(
        &self,
        application: Option<&str>,
        service: Option<&str>,
        partition: Option<&Uuid>,
    ) -> Result<Vec<CheckDefinition>> {
        Ok(self
            .scheduler
            .registry()
            .list(application, service, partition)?)
    }

    /// 当前聚合健康状态
    pub fn current_aggregate_health(&self) -> Result<HealthSummary> {
        Ok(self.aggregator.summarize()?)
    }

    /// 删除健康检查
    pub async fn remove(&self, key: &str) -> Result<bool> {
        Ok(self.scheduler.remove(key).await?)
    }

    /// 已注册的健康检查数量
    pub fn check_count(&self) -> Result<usize> {
        Ok(self.scheduler.registry().count()?)
    }

    /// 调度器是否运行中
    pub async fn is_running(&self) -> bool {
        self.scheduler.is_running().await
    }
}

/// 看门狗服务
pub struct WatchdogService {
    config: Config,
    scheduler: Arc<WatchdogScheduler>,
    aggregator: Arc<HealthAggregator>,
    operations: Arc<HealthCheckOperations>,
    sink: Arc<dyn HealthSink>,
}

impl WatchdogService {
    /// 根据配置创建服务，存储后端按配置打开
    pub fn new(config: Config) -> Result<Self> {
        let store = open_store(&config.store)?;
        Self::with_store(config, store)
    }

    /// 使用指定存储创建服务
    pub fn with_store(config: Config, store: Arc<dyn KeyValueStore>) -> Result<Self> {
        let resolver: Arc<dyn EndpointResolver> =
            Arc::new(StaticEndpointResolver::from_config(&config.endpoints));
        let executor: Arc<dyn ProbeExecutor> =
            Arc::new(HttpProbeExecutor::new(&config.global.user_agent, resolver)?);
        Ok(Self::with_components(config, store, executor))
    }

    /// 使用指定存储和探测执行器创建服务
    pub fn with_components(
        config: Config,
        store: Arc<dyn KeyValueStore>,
        executor: Arc<dyn ProbeExecutor>,
    ) -> Self {
        let registry = Arc::new(CheckRegistry::with_default_frequency(
            store,
            config.global.default_frequency(),
        ));
        let scheduler = Arc::new(WatchdogScheduler::new(
            registry.clone(),
            executor,
            config.global.max_concurrent_probes,
        ));
        let aggregator = Arc::new(HealthAggregator::new(registry));
        let operations = Arc::new(HealthCheckOperations::new(
            scheduler.clone(),
            aggregator.clone(),
        ));

        Self {
            config,
            scheduler,
            aggregator,
            operations,
            sink: Arc::new(LogHealthSink),
        }
    }

    /// 替换健康报告汇
    pub fn with_sink(mut self, sink: Arc<dyn HealthSink>) -> Self {
        self.sink = sink;
        self
    }

    /// 操作接口
    pub fn operations(&self) -> Arc<HealthCheckOperations> {
        self.operations.clone()
    }

    /// 注册配置文件中的健康检查
    pub async fn register_configured_checks(&self) -> Result<usize> {
        for check in &self.config.checks {
            self.operations.register(check.to_definition()).await?;
        }
        Ok(self.config.checks.len())
    }

    /// 为自身HTTP接口注册健康检查
    pub async fn register_self_check(&self, addr: SocketAddr) -> Result<Registration> {
        let host = if addr.ip().is_unspecified() {
            "127.0.0.1".to_string()
        } else {
            addr.ip().to_string()
        };
        let service_uri = match addr {
            SocketAddr::V6(_) if !addr.ip().is_unspecified() => {
                format!("http://[{}]:{}", host, addr.port())
            }
            _ => format!("http://{}:{}", host, addr.port()),
        };

        let definition =
            CheckDefinition::new(SELF_CHECK_NAME, service_uri, Uuid::nil(), "healthcheck/health");
        self.operations.register(definition).await
    }

    /// 运行服务直到收到关闭信号
    ///
    /// 启动顺序：恢复调度 → 注册配置中的检查 → 调度循环 → 健康报告 → Web API
    pub async fn run(&self, shutdown: broadcast::Sender<()>) -> Result<()> {
        let mut shutdown_rx = shutdown.subscribe();
        let scheduler_rx = shutdown.subscribe();
        let reporter_rx = shutdown.subscribe();
        let web_rx = shutdown.subscribe();

        let restored = self.scheduler.restore().await?;
        info!("已恢复 {} 个调度条目", restored);

        let registered = self.register_configured_checks().await?;
        info!("已注册配置中的 {} 个健康检查", registered);

        let mut handles: Vec<JoinHandle<()>> = Vec::new();
        handles.push(tokio::spawn(Arc::clone(&self.scheduler).run(scheduler_rx)));

        let reporter = HealthReporter::new(
            crate::APP_NAME,
            self.config.global.health_report_interval(),
            self.aggregator.clone(),
            self.scheduler.clone(),
            self.sink.clone(),
        );
        handles.push(tokio::spawn(reporter.run(reporter_rx)));

        if self.config.web.enabled {
            let server = WebServer::new(self.config.web.clone(), self.operations.clone());
            let listener = server.bind().await?;
            let addr = listener.local_addr()?;

            if self.config.web.register_self_check {
                self.register_self_check(addr).await?;
            }

            handles.push(tokio::spawn(async move {
                if let Err(e) = server.serve(listener, web_rx).await {
                    error!("Web服务器运行失败: {}", e);
                }
            }));
        } else {
            info!("Web服务器已禁用");
        }

        info!("看门狗服务已启动，按 Ctrl+C 停止");

        if let Err(e) = shutdown_rx.recv().await {
            warn!("关闭信号通道异常: {}", e);
        }
        info!("正在停止看门狗服务...");

        for handle in handles {
            if let Err(e) = handle.await {
                error!("后台任务退出异常: {}", e);
            }
        }

        info!("看门狗服务已停止");
        Ok(())
    }
}

/// 对配置中的健康检查各执行一次探测，不写入存储
///
/// # 参数
/// * `config` - 配置
/// * `name` - 只探测指定名称的检查
pub async fn probe_configured_checks(
    config: &Config,
    name: Option<&str>,
) -> Result<Vec<(CheckDefinition, ProbeResult)>> {
    let resolver: Arc<dyn EndpointResolver> =
        Arc::new(StaticEndpointResolver::from_config(&config.endpoints));
    let executor = HttpProbeExecutor::new(&config.global.user_agent, resolver)?;

    let definitions: Vec<CheckDefinition> = config
        .checks
        .iter()
        .filter(|c| name.map_or(true, |n| c.name == n))
        .map(|c| {
            c.to_definition()
                .with_defaults(config.global.default_frequency())
        })
        .collect();

    let results = executor.execute_batch(&definitions).await;
    Ok(definitions.into_iter().zip(results).collect())
}
