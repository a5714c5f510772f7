//! 错误处理模块
//!
//! 定义应用程序的统一错误类型

use thiserror::Error;

/// Service Watchdog 应用程序的主要错误类型
#[derive(Error, Debug)]
pub enum WatchdogError {
    /// 配置相关错误
    #[error("配置错误: {0}")]
    Config(#[from] ConfigError),

    /// 健康检查定义校验错误
    #[error("校验错误: {0}")]
    Validation(#[from] ValidationError),

    /// 持久化存储错误
    #[error("存储错误: {0}")]
    Storage(#[from] StorageError),

    /// IO错误
    #[error("IO错误: {0}")]
    Io(#[from] std::io::Error),

    /// JSON序列化/反序列化错误
    #[error("JSON错误: {0}")]
    Json(#[from] serde_json::Error),

    /// 其他错误
    #[error("其他错误: {0}")]
    Other(#[from] anyhow::Error),
}

/// 配置错误类型
#[derive(Error, Debug)]
pub enum ConfigError {
    /// 配置文件解析错误
    #[error("配置文件解析失败: {0}")]
    ParseError(String),

    /// 配置验证错误
    #[error("配置验证失败: {0}")]
    ValidationError(String),

    /// 配置文件不存在
    #[error("配置文件不存在: {path}")]
    FileNotFound { path: String },

    /// 环境变量替换错误
    #[error("环境变量替换失败: {var}")]
    EnvVarError { var: String },
}

/// 注册输入校验错误，在任何IO之前同步返回给调用方，永不重试
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// 空的（默认值）健康检查定义
    #[error("健康检查定义为空")]
    DefaultDefinition,

    /// 名称为空
    #[error("健康检查名称不能为空")]
    EmptyName,

    /// 服务URI缺失
    #[error("服务URI不能为空")]
    MissingServiceUri,

    /// 服务URI不是绝对URI
    #[error("服务URI必须是绝对URI: {0}")]
    RelativeServiceUri(String),

    /// 后缀路径为空
    #[error("后缀路径不能为空")]
    EmptySuffixPath,

    /// 指定了content但缺少mediaType
    #[error("指定content时必须同时指定mediaType")]
    MissingMediaType,

    /// 无效的HTTP方法
    #[error("无效的HTTP方法: {0}")]
    InvalidMethod(String),

    /// 无效的HTTP状态码
    #[error("无效的HTTP状态码: {0}")]
    InvalidStatusCode(u16),
}

/// 持久化存储错误类型
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StorageError {
    /// 存储不可用
    #[error("存储不可用: {0}")]
    Unavailable(String),

    /// 序列化失败
    #[error("序列化失败: {0}")]
    Serialize(String),

    /// 反序列化失败
    #[error("反序列化失败: {0}")]
    Deserialize(String),

    /// 文件读写失败
    #[error("存储文件读写失败: {0}")]
    Io(String),
}

/// 探测传输层错误
///
/// 只用于描述探测失败的原因，永远被折叠进 `ProbeResult`，不会作为 `Err` 传播
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProbeTransportError {
    /// 超过最大持续时间
    #[error("请求超时")]
    Timeout,

    /// 连接失败，包括主机名解析失败
    #[error("连接失败: {0}")]
    Connect(String),

    /// 请求构建或发送失败
    #[error("请求失败: {0}")]
    Request(String),

    /// 端点解析失败
    #[error("端点解析失败: {0}")]
    EndpointResolution(String),
}

/// 结果类型别名
pub type Result<T> = std::result::Result<T, WatchdogError>;

/// 存储操作结果类型别名
pub type StorageResult<T> = std::result::Result<T, StorageError>;
