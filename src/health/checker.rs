//! HTTP探测执行器
//!
//! 对单个健康检查定义执行一次HTTP请求并给出分类结果。
//! 任何失败都折叠进 [`ProbeResult`]，执行器本身不返回错误。

use crate::error::{ProbeTransportError, WatchdogError};
use crate::health::definition::CheckDefinition;
use crate::health::endpoint::EndpointResolver;
use crate::health::result::{HealthState, ProbeResult, ProbeStatus};
use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use reqwest::{redirect, Client, Method, StatusCode};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::timeout;
use tracing::debug;
use url::Url;

/// 探测执行器trait
#[async_trait]
pub trait ProbeExecutor: Send + Sync {
    /// 执行一次探测
    ///
    /// # 参数
    /// * `definition` - 健康检查定义
    ///
    /// # 返回
    /// * `ProbeResult` - 探测结果，超时与传输失败以哨兵状态表示
    async fn execute(&self, definition: &CheckDefinition) -> ProbeResult;

    /// 批量探测
    async fn execute_batch(&self, definitions: &[CheckDefinition]) -> Vec<ProbeResult> {
        let futures = definitions.iter().map(|definition| self.execute(definition));
        futures::future::join_all(futures).await
    }
}

/// 根据状态和耗时对探测结果分类
///
/// 判定顺序：
/// 1. 超时、传输失败或耗时超过最大值为 `Error`
/// 2. 状态码在错误列表中为 `Error`
/// 3. 状态码在警告列表中为 `Warning`
/// 4. 2xx 且耗时不超过期望值为 `Ok`，超过期望值为 `Warning`
/// 5. 其他状态码为 `Error`
pub fn classify(definition: &CheckDefinition, status: ProbeStatus, duration: Duration) -> HealthState {
    if status.is_sentinel_failure() || duration > definition.maximum_duration {
        return HealthState::Error;
    }

    let Some(code) = status.status_code() else {
        return HealthState::Unknown;
    };

    if definition.error_status_codes.contains(&code) {
        return HealthState::Error;
    }
    if definition.warning_status_codes.contains(&code) {
        return HealthState::Warning;
    }
    if (200..300).contains(&code) {
        if duration <= definition.expected_duration {
            HealthState::Ok
        } else {
            HealthState::Warning
        }
    } else {
        HealthState::Error
    }
}

/// HTTP探测执行器
pub struct HttpProbeExecutor {
    /// HTTP客户端
    client: Client,
    /// 端点解析器
    resolver: Arc<dyn EndpointResolver>,
}

impl HttpProbeExecutor {
    /// 创建新的HTTP探测执行器
    ///
    /// 超时由每个定义的 `maximum_duration` 控制，客户端本身不设置超时。
    /// 客户端不跟随重定向，3xx 状态码按原样参与分类
    ///
    /// # 参数
    /// * `user_agent` - 请求使用的User-Agent
    /// * `resolver` - 端点解析器
    pub fn new(user_agent: &str, resolver: Arc<dyn EndpointResolver>) -> crate::error::Result<Self> {
        let client = Client::builder()
            .user_agent(user_agent)
            .redirect(redirect::Policy::none())
            .build()
            .map_err(|e| WatchdogError::Other(e.into()))?;

        Ok(Self { client, resolver })
    }

    /// 使用已有客户端创建执行器
    pub fn with_client(client: Client, resolver: Arc<dyn EndpointResolver>) -> Self {
        Self { client, resolver }
    }

    /// 构建HTTP请求
    fn build_request(
        &self,
        definition: &CheckDefinition,
        url: Url,
    ) -> Result<reqwest::RequestBuilder, ProbeTransportError> {
        let method = Method::from_bytes(definition.method.to_uppercase().as_bytes())
            .map_err(|_| ProbeTransportError::Request(format!("无效的HTTP方法: {}", definition.method)))?;

        let mut request = self.client.request(method, url);

        for (name, value) in &definition.headers {
            request = request.header(name, value);
        }

        if let Some(content) = definition.content.as_ref().filter(|c| !c.is_empty()) {
            if let Some(media_type) = &definition.media_type {
                request = request.header(CONTENT_TYPE, media_type);
            }
            request = request.body(content.clone());
        }

        Ok(request)
    }

    /// 解析目标并发送请求，返回HTTP状态码
    async fn send(&self, definition: &CheckDefinition) -> Result<u16, ProbeTransportError> {
        let url = self.resolver.resolve(definition).await?;
        debug!("探测 {} {}", definition.method, url);

        let request = self.build_request(definition, url)?;
        let response = request.send().await.map_err(|e| map_request_error(&e))?;
        Ok(response.status().as_u16())
    }
}

/// 把reqwest错误归类为传输错误
fn map_request_error(error: &reqwest::Error) -> ProbeTransportError {
    if error.is_timeout() {
        return ProbeTransportError::Timeout;
    }

    let message = error_chain(error);
    if error.is_connect() {
        ProbeTransportError::Connect(message)
    } else {
        ProbeTransportError::Request(message)
    }
}

/// 拼接错误及其 `source()` 链上的所有描述
fn error_chain(error: &dyn std::error::Error) -> String {
    let mut message = error.to_string();
    let mut source = error.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}

/// 非正常HTTP状态的描述
fn describe_status(code: u16) -> String {
    format!(
        "HTTP {} {}",
        code,
        StatusCode::from_u16(code)
            .ok()
            .and_then(|s| s.canonical_reason())
            .unwrap_or("Unknown")
    )
}

#[async_trait]
impl ProbeExecutor for HttpProbeExecutor {
    async fn execute(&self, definition: &CheckDefinition) -> ProbeResult {
        let key = definition.key();
        let start = Instant::now();
        let outcome = timeout(definition.maximum_duration, self.send(definition)).await;
        let duration = start.elapsed();

        match outcome {
            Ok(Ok(code)) => {
                let status = ProbeStatus::Http(code);
                let classification = classify(definition, status, duration);
                let result = ProbeResult::new(key, status, duration, classification);
                if classification.is_healthy() {
                    result
                } else {
                    result.with_error(describe_status(code))
                }
            }
            Ok(Err(ProbeTransportError::Timeout)) | Err(_) => ProbeResult::new(
                key,
                ProbeStatus::Timeout,
                duration,
                HealthState::Error,
            )
            .with_error(ProbeTransportError::Timeout.to_string()),
            Ok(Err(e)) => ProbeResult::new(key, ProbeStatus::Transport, duration, HealthState::Error)
                .with_error(e.to_string()),
        }
    }
}
