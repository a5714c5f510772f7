//! Web API模块
//!
//! 健康检查注册与查询的HTTP接口

use crate::error::WatchdogError;
use crate::service::HealthCheckOperations;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use std::sync::Arc;

pub mod api;
pub mod server;

pub use api::create_router;
pub use server::WebServer;

/// Web服务器共享状态
#[derive(Clone)]
pub struct AppState {
    /// 健康检查操作接口
    pub operations: Arc<HealthCheckOperations>,
}

impl AppState {
    /// 创建共享状态
    pub fn new(operations: Arc<HealthCheckOperations>) -> Self {
        Self { operations }
    }
}

/// 错误响应体
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    /// 错误信息
    pub error: String,
    /// 时间戳
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

/// API错误
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    /// 400 错误
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }

    /// 响应状态码
    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl From<WatchdogError> for ApiError {
    fn from(err: WatchdogError) -> Self {
        let status = match err {
            WatchdogError::Validation(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self {
            status,
            message: err.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            tracing::error!("请求处理失败: {}", self.message);
        }
        let body = ErrorBody {
            error: self.message,
            timestamp: chrono::Utc::now(),
        };
        (self.status, Json(body)).into_response()
    }
}
