//! Web服务器实现
//!
//! 绑定监听地址并运行API路由，收到关闭信号后优雅退出

use super::{create_router, AppState};
use crate::config::WebConfig;
use crate::error::Result;
use crate::service::HealthCheckOperations;
use axum::http::Method;
use axum::Router;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

/// Web服务器
pub struct WebServer {
    /// 配置
    config: WebConfig,
    /// 健康检查操作接口
    operations: Arc<HealthCheckOperations>,
}

impl WebServer {
    /// 创建新的Web服务器
    pub fn new(config: WebConfig, operations: Arc<HealthCheckOperations>) -> Self {
        Self { config, operations }
    }

    /// 监听地址
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.config.bind_address, self.config.port)
    }

    /// 绑定监听地址
    pub async fn bind(&self) -> Result<TcpListener> {
        let listener = TcpListener::bind(self.bind_addr()).await?;
        info!("Web服务器监听地址: {}", listener.local_addr()?);
        Ok(listener)
    }

    /// 创建完整路由
    pub fn router(&self) -> Router {
        let cors = CorsLayer::new()
            .allow_origin(Any)
            .allow_methods([Method::GET, Method::POST])
            .allow_headers(Any);

        create_router(AppState::new(self.operations.clone())).layer(cors)
    }

    /// 在已绑定的监听器上运行服务器，直到收到关闭信号
    pub async fn serve(
        &self,
        listener: TcpListener,
        mut shutdown_rx: broadcast::Receiver<()>,
    ) -> Result<()> {
        let addr = listener.local_addr()?;
        info!("Web服务器已启动: http://{}", addr);
        info!("API地址: http://{}/healthcheck", addr);

        axum::serve(listener, self.router())
            .with_graceful_shutdown(async move {
                let _ = shutdown_rx.recv().await;
                info!("接收到关闭信号，正在关闭Web服务器...");
            })
            .await?;

        info!("Web服务器已关闭");
        Ok(())
    }
}
