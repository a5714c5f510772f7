//! 健康检查定义
//!
//! 注册表的记录单元：目标、时间参数、分类输入以及最近一次探测的结果状态。
//! 结果状态只通过 [`CheckDefinition::apply_result`] 生成新值来更新，不做原地修改。

use crate::error::ValidationError;
use crate::health::checker::classify;
use crate::health::result::{duration_millis, HealthState, ProbeResult, ProbeStatus};
use chrono::{DateTime, Utc};
use reqwest::Method;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;
use url::Url;
use uuid::Uuid;

/// 默认探测间隔
pub const DEFAULT_FREQUENCY: Duration = Duration::from_secs(60);
/// 默认期望耗时
pub const DEFAULT_EXPECTED_DURATION: Duration = Duration::from_millis(200);
/// 默认最大耗时（硬超时）
pub const DEFAULT_MAXIMUM_DURATION: Duration = Duration::from_secs(5);
/// 默认HTTP方法
pub const DEFAULT_METHOD: &str = "GET";

/// 健康检查定义
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckDefinition {
    /// 检查名称
    #[serde(default)]
    pub name: String,
    /// 服务的绝对URI
    #[serde(default, rename = "serviceName", alias = "serviceUri")]
    pub service_uri: String,
    /// 分区ID
    #[serde(default)]
    pub partition: Uuid,
    /// 端点名称，服务暴露多个命名端点时必填
    #[serde(default)]
    pub endpoint: Option<String>,
    /// 后缀路径及查询参数
    #[serde(default)]
    pub suffix_path: String,
    /// HTTP方法
    #[serde(default)]
    pub method: String,
    /// 请求体
    #[serde(default)]
    pub content: Option<String>,
    /// 请求体媒体类型
    #[serde(default)]
    pub media_type: Option<String>,
    /// 探测间隔
    #[serde(default, with = "duration_millis")]
    pub frequency: Duration,
    /// 期望耗时（软预算）
    #[serde(default, with = "duration_millis")]
    pub expected_duration: Duration,
    /// 最大耗时（硬超时）
    #[serde(default, with = "duration_millis")]
    pub maximum_duration: Duration,
    /// 请求头
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    /// 视为警告的状态码
    #[serde(default)]
    pub warning_status_codes: BTreeSet<u16>,
    /// 视为错误的状态码
    #[serde(default)]
    pub error_status_codes: BTreeSet<u16>,
    /// 最近一次探测时间
    #[serde(default)]
    pub last_attempt: Option<DateTime<Utc>>,
    /// 连续失败次数
    #[serde(default)]
    pub failure_count: u64,
    /// 最近一次观察到的状态
    #[serde(default)]
    pub result_code: ProbeStatus,
    /// 最近一次探测耗时
    #[serde(default, with = "duration_millis")]
    pub duration: Duration,
}

impl CheckDefinition {
    /// 创建新的健康检查定义，其余字段使用默认值
    ///
    /// # 参数
    /// * `name` - 检查名称
    /// * `service_uri` - 服务绝对URI
    /// * `partition` - 分区ID
    /// * `suffix_path` - 后缀路径
    pub fn new(
        name: impl Into<String>,
        service_uri: impl Into<String>,
        partition: Uuid,
        suffix_path: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            service_uri: service_uri.into(),
            partition,
            suffix_path: suffix_path.into(),
            ..Default::default()
        }
        .with_defaults(DEFAULT_FREQUENCY)
    }

    /// 设置端点名称
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    /// 设置HTTP方法
    pub fn with_method(mut self, method: impl Into<String>) -> Self {
        self.method = method.into();
        self
    }

    /// 设置请求体及媒体类型
    pub fn with_content(mut self, content: impl Into<String>, media_type: impl Into<String>) -> Self {
        self.content = Some(content.into());
        self.media_type = Some(media_type.into());
        self
    }

    /// 设置探测间隔
    pub fn with_frequency(mut self, frequency: Duration) -> Self {
        self.frequency = frequency;
        self
    }

    /// 设置期望耗时
    pub fn with_expected_duration(mut self, expected: Duration) -> Self {
        self.expected_duration = expected;
        self
    }

    /// 设置最大耗时
    pub fn with_maximum_duration(mut self, maximum: Duration) -> Self {
        self.maximum_duration = maximum;
        self
    }

    /// 添加请求头
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    /// 设置警告状态码
    pub fn with_warning_status_codes(mut self, codes: impl IntoIterator<Item = u16>) -> Self {
        self.warning_status_codes = codes.into_iter().collect();
        self
    }

    /// 设置错误状态码
    pub fn with_error_status_codes(mut self, codes: impl IntoIterator<Item = u16>) -> Self {
        self.error_status_codes = codes.into_iter().collect();
        self
    }

    /// 填充默认值
    ///
    /// 为零的时间参数替换为默认值，`frequency` 使用调用方给定的默认间隔；
    /// 空方法替换为 `GET`，方法名统一为大写。
    pub fn with_defaults(mut self, default_frequency: Duration) -> Self {
        if self.frequency.is_zero() {
            self.frequency = if default_frequency.is_zero() {
                DEFAULT_FREQUENCY
            } else {
                default_frequency
            };
        }
        if self.expected_duration.is_zero() {
            self.expected_duration = DEFAULT_EXPECTED_DURATION;
        }
        if self.maximum_duration.is_zero() {
            self.maximum_duration = DEFAULT_MAXIMUM_DURATION;
        }

        let method = self.method.trim().to_uppercase();
        self.method = if method.is_empty() {
            DEFAULT_METHOD.to_string()
        } else {
            method
        };
        self
    }

    /// 校验必填字段
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self == &CheckDefinition::default() {
            return Err(ValidationError::DefaultDefinition);
        }
        if self.name.trim().is_empty() {
            return Err(ValidationError::EmptyName);
        }
        if self.service_uri.trim().is_empty() {
            return Err(ValidationError::MissingServiceUri);
        }
        // url::Url 只能解析绝对URI
        if Url::parse(self.service_uri.trim()).is_err() {
            return Err(ValidationError::RelativeServiceUri(self.service_uri.clone()));
        }
        if self.suffix_path.trim().is_empty() {
            return Err(ValidationError::EmptySuffixPath);
        }

        let has_content = self
            .content
            .as_deref()
            .is_some_and(|c| !c.trim().is_empty());
        let has_media_type = self
            .media_type
            .as_deref()
            .is_some_and(|m| !m.trim().is_empty());
        if has_content && !has_media_type {
            return Err(ValidationError::MissingMediaType);
        }

        if !self.method.trim().is_empty()
            && Method::from_bytes(self.method.trim().to_uppercase().as_bytes()).is_err()
        {
            return Err(ValidationError::InvalidMethod(self.method.clone()));
        }

        for &code in self
            .warning_status_codes
            .iter()
            .chain(self.error_status_codes.iter())
        {
            if !(100..=599).contains(&code) {
                return Err(ValidationError::InvalidStatusCode(code));
            }
        }

        Ok(())
    }

    /// 健康检查键，由服务URI和分区唯一确定
    pub fn key(&self) -> String {
        check_key(&self.service_uri, &self.partition)
    }

    /// 服务URI所属的应用名称（第一个非空路径段）
    pub fn application_name(&self) -> String {
        self.path_segment(0)
    }

    /// 服务名称（第二个非空路径段）
    pub fn service_segment(&self) -> String {
        self.path_segment(1)
    }

    fn path_segment(&self, index: usize) -> String {
        Url::parse(self.service_uri.trim())
            .ok()
            .and_then(|url| {
                url.path()
                    .split('/')
                    .filter(|s| !s.is_empty())
                    .nth(index)
                    .map(str::to_string)
            })
            .unwrap_or_default()
    }

    /// 判断是否匹配列表过滤条件，空过滤条件视为未提供
    pub fn matches_filter(
        &self,
        application: Option<&str>,
        service: Option<&str>,
        partition: Option<&Uuid>,
    ) -> bool {
        if let Some(app) = application.filter(|a| !a.is_empty()) {
            if self.application_name() != app {
                return false;
            }
        }
        if let Some(svc) = service.filter(|s| !s.is_empty()) {
            if self.service_segment() != svc {
                return false;
            }
        }
        if let Some(partition) = partition {
            if &self.partition != partition {
                return false;
            }
        }
        true
    }

    /// 应用一次探测结果，返回新的定义值
    ///
    /// 错误分类使连续失败次数加一，正常分类归零，警告保持不变。
    pub fn apply_result(&self, result: &ProbeResult) -> Self {
        let failure_count = match result.classification {
            HealthState::Error => self.failure_count.saturating_add(1),
            HealthState::Ok => 0,
            HealthState::Warning | HealthState::Unknown => self.failure_count,
        };

        Self {
            last_attempt: Some(result.completed_at),
            failure_count,
            result_code: result.status,
            duration: result.duration,
            ..self.clone()
        }
    }

    /// 从旧定义继承结果状态（重新注册时保留历史）
    pub fn with_history_from(mut self, previous: &CheckDefinition) -> Self {
        self.last_attempt = previous.last_attempt;
        self.failure_count = previous.failure_count;
        self.result_code = previous.result_code;
        self.duration = previous.duration;
        self
    }

    /// 清除结果状态
    pub fn without_history(mut self) -> Self {
        self.last_attempt = None;
        self.failure_count = 0;
        self.result_code = ProbeStatus::None;
        self.duration = Duration::ZERO;
        self
    }

    /// 根据最近一次结果得到当前健康状态，从未探测过时为 `Unknown`
    pub fn current_state(&self) -> HealthState {
        if self.last_attempt.is_none() {
            return HealthState::Unknown;
        }
        classify(self, self.result_code, self.duration)
    }
}

/// 由服务URI和分区计算健康检查键
pub fn check_key(service_uri: &str, partition: &Uuid) -> String {
    let trimmed = service_uri.trim();
    let canonical = Url::parse(trimmed)
        .map(|url| url.as_str().trim_end_matches('/').to_string())
        .unwrap_or_else(|_| trimmed.trim_end_matches('/').to_string());
    format!("{canonical}/{partition}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::health::result::ProbeResult;

    fn partition() -> Uuid {
        Uuid::parse_str("3f2504e0-4f89-11d3-9a0c-0305e82c3301").unwrap()
    }

    fn create_test_definition() -> CheckDefinition {
        CheckDefinition::new("svc-check", "http://svc.local/", partition(), "/ping")
    }

    fn result_with(classification: HealthState, status: ProbeStatus) -> ProbeResult {
        ProbeResult::new(
            create_test_definition().key(),
            status,
            Duration::from_millis(20),
            classification,
        )
    }

    #[test]
    fn test_defaults_applied() {
        let def = create_test_definition();
        assert_eq!(def.frequency, Duration::from_secs(60));
        assert_eq!(def.expected_duration, Duration::from_millis(200));
        assert_eq!(def.maximum_duration, Duration::from_secs(5));
        assert_eq!(def.method, "GET");
        assert_eq!(def.failure_count, 0);
        assert_eq!(def.result_code, ProbeStatus::None);
        assert!(def.last_attempt.is_none());
    }

    #[test]
    fn test_defaults_keep_explicit_values() {
        let def = CheckDefinition {
            name: "a".to_string(),
            service_uri: "http://svc.local".to_string(),
            suffix_path: "health".to_string(),
            method: "post".to_string(),
            frequency: Duration::from_secs(5),
            ..Default::default()
        }
        .with_defaults(Duration::from_secs(30));

        assert_eq!(def.frequency, Duration::from_secs(5));
        assert_eq!(def.method, "POST");

        let def = CheckDefinition {
            name: "a".to_string(),
            ..Default::default()
        }
        .with_defaults(Duration::from_secs(30));
        assert_eq!(def.frequency, Duration::from_secs(30));
        assert!(!def.expected_duration.is_zero());
        assert!(!def.maximum_duration.is_zero());
    }

    #[test]
    fn test_key_is_function_of_service_and_partition() {
        let a = create_test_definition();
        let b = create_test_definition()
            .with_frequency(Duration::from_secs(10))
            .with_header("X-Test", "1");
        assert_eq!(a.key(), b.key());
        assert_eq!(
            a.key(),
            "http://svc.local/3f2504e0-4f89-11d3-9a0c-0305e82c3301"
        );

        let other_partition =
            CheckDefinition::new("svc-check", "http://svc.local/", Uuid::nil(), "/ping");
        assert_ne!(a.key(), other_partition.key());

        assert_eq!(
            check_key("fabric:/App/Svc", &Uuid::nil()),
            "fabric:/App/Svc/00000000-0000-0000-0000-000000000000"
        );
    }

    #[test]
    fn test_validation_rules() {
        assert_eq!(
            CheckDefinition::default().validate(),
            Err(ValidationError::DefaultDefinition)
        );

        let mut def = create_test_definition();
        assert!(def.validate().is_ok());

        def.name = "  ".to_string();
        assert_eq!(def.validate(), Err(ValidationError::EmptyName));

        let mut def = create_test_definition();
        def.service_uri = "svc/relative".to_string();
        assert!(matches!(
            def.validate(),
            Err(ValidationError::RelativeServiceUri(_))
        ));

        let mut def = create_test_definition();
        def.service_uri = String::new();
        assert_eq!(def.validate(), Err(ValidationError::MissingServiceUri));

        let mut def = create_test_definition();
        def.suffix_path = String::new();
        assert_eq!(def.validate(), Err(ValidationError::EmptySuffixPath));

        let mut def = create_test_definition();
        def.content = Some("{\"a\":1}".to_string());
        assert_eq!(def.validate(), Err(ValidationError::MissingMediaType));

        let def = create_test_definition().with_content("{\"a\":1}", "application/json");
        assert!(def.validate().is_ok());

        let def = create_test_definition().with_method("BAD METHOD");
        assert!(matches!(def.validate(), Err(ValidationError::InvalidMethod(_))));

        let def = create_test_definition().with_error_status_codes([999]);
        assert_eq!(def.validate(), Err(ValidationError::InvalidStatusCode(999)));
    }

    #[test]
    fn test_failure_count_accounting() {
        let def = create_test_definition();

        let def = def.apply_result(&result_with(HealthState::Error, ProbeStatus::Http(503)));
        assert_eq!(def.failure_count, 1);
        let def = def.apply_result(&result_with(HealthState::Error, ProbeStatus::Http(503)));
        assert_eq!(def.failure_count, 2);
        let def = def.apply_result(&result_with(HealthState::Warning, ProbeStatus::Http(429)));
        assert_eq!(def.failure_count, 2);
        let def = def.apply_result(&result_with(HealthState::Ok, ProbeStatus::Http(200)));
        assert_eq!(def.failure_count, 0);
        assert_eq!(def.result_code, ProbeStatus::Http(200));
        assert!(def.last_attempt.is_some());
    }

    #[test]
    fn test_apply_result_keeps_configuration() {
        let def = create_test_definition().with_header("X-Test", "1");
        let updated = def.apply_result(&result_with(HealthState::Error, ProbeStatus::Timeout));

        assert_eq!(updated.name, def.name);
        assert_eq!(updated.headers, def.headers);
        assert_eq!(updated.frequency, def.frequency);
        assert_eq!(updated.result_code, ProbeStatus::Timeout);
        assert_ne!(updated, def);
    }

    #[test]
    fn test_history_preserve_and_reset() {
        let old = create_test_definition()
            .apply_result(&result_with(HealthState::Error, ProbeStatus::Http(500)));
        let replacement = create_test_definition()
            .with_frequency(Duration::from_secs(10))
            .with_history_from(&old);

        assert_eq!(replacement.failure_count, 1);
        assert_eq!(replacement.last_attempt, old.last_attempt);
        assert_eq!(replacement.frequency, Duration::from_secs(10));

        let reset = replacement.without_history();
        assert_eq!(reset.failure_count, 0);
        assert!(reset.last_attempt.is_none());
        assert_eq!(reset.current_state(), HealthState::Unknown);
    }

    #[test]
    fn test_filter_matching() {
        let fabric = CheckDefinition::new("a", "fabric:/App/Svc", partition(), "ping");
        assert_eq!(fabric.application_name(), "App");
        assert_eq!(fabric.service_segment(), "Svc");

        assert!(fabric.matches_filter(None, None, None));
        assert!(fabric.matches_filter(Some("App"), Some(""), None));
        assert!(fabric.matches_filter(Some("App"), Some("Svc"), Some(&partition())));
        assert!(!fabric.matches_filter(Some("Other"), None, None));
        assert!(!fabric.matches_filter(Some("App"), Some("Other"), None));
        assert!(!fabric.matches_filter(None, None, Some(&Uuid::nil())));
    }

    #[test]
    fn test_json_shape() {
        let def = create_test_definition().with_warning_status_codes([429, 429]);
        let json = serde_json::to_value(&def).unwrap();

        assert_eq!(json["serviceName"], "http://svc.local/");
        assert_eq!(json["suffixPath"], "/ping");
        assert_eq!(json["frequency"], 60000);
        assert_eq!(json["warningStatusCodes"], serde_json::json!([429]));

        let parsed: CheckDefinition = serde_json::from_value(json).unwrap();
        assert_eq!(parsed, def);
    }
}
