//! 端点解析
//!
//! 把健康检查定义中的逻辑服务名解析为可请求的目标URL

use crate::config::types::EndpointConfig;
use crate::error::ProbeTransportError;
use crate::health::definition::CheckDefinition;
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use url::Url;
use uuid::Uuid;

/// 端点解析器trait
#[async_trait]
pub trait EndpointResolver: Send + Sync {
    /// 解析健康检查的目标URL（基础地址加后缀路径）
    async fn resolve(&self, definition: &CheckDefinition) -> Result<Url, ProbeTransportError>;
}

/// 拼接基础地址与后缀路径
pub fn join_target(base: &str, suffix_path: &str) -> Result<Url, ProbeTransportError> {
    let target = format!(
        "{}/{}",
        base.trim_end_matches('/'),
        suffix_path.trim().trim_start_matches('/')
    );
    Url::parse(&target).map_err(|e| {
        ProbeTransportError::EndpointResolution(format!("无效的目标地址 {target}: {e}"))
    })
}

#[derive(Debug, Clone)]
struct ServiceEndpoints {
    partition: Option<Uuid>,
    endpoints: BTreeMap<String, String>,
}

/// 基于配置表的静态端点解析器
///
/// 配置表中没有登记的服务，若服务URI本身是 http/https 地址则直接作为基础地址使用
#[derive(Debug, Clone, Default)]
pub struct StaticEndpointResolver {
    services: HashMap<String, Vec<ServiceEndpoints>>,
}

fn normalize_service(uri: &str) -> String {
    uri.trim().trim_end_matches('/').to_string()
}

impl StaticEndpointResolver {
    /// 创建空解析器
    pub fn new() -> Self {
        Self::default()
    }

    /// 从配置构建解析器
    pub fn from_config(endpoints: &[EndpointConfig]) -> Self {
        let mut resolver = Self::new();
        for entry in endpoints {
            resolver.add_service(&entry.service_uri, entry.partition, entry.endpoints.clone());
        }
        resolver
    }

    /// 登记服务的命名端点
    ///
    /// # 参数
    /// * `service_uri` - 服务URI
    /// * `partition` - 分区ID，`None` 表示适用于所有分区
    /// * `endpoints` - 端点名称到基础地址的映射
    pub fn add_service(
        &mut self,
        service_uri: &str,
        partition: Option<Uuid>,
        endpoints: BTreeMap<String, String>,
    ) {
        self.services
            .entry(normalize_service(service_uri))
            .or_default()
            .push(ServiceEndpoints {
                partition,
                endpoints,
            });
    }

    /// 登记的服务数量
    pub fn len(&self) -> usize {
        self.services.len()
    }

    /// 是否没有登记任何服务
    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }

    fn lookup(&self, definition: &CheckDefinition) -> Option<&ServiceEndpoints> {
        let candidates = self.services.get(&normalize_service(&definition.service_uri))?;
        candidates
            .iter()
            .find(|c| c.partition == Some(definition.partition))
            .or_else(|| candidates.iter().find(|c| c.partition.is_none()))
    }

    fn select_base(
        &self,
        definition: &CheckDefinition,
    ) -> Result<String, ProbeTransportError> {
        let Some(service) = self.lookup(definition) else {
            let url = Url::parse(definition.service_uri.trim()).map_err(|e| {
                ProbeTransportError::EndpointResolution(format!(
                    "无效的服务地址 {}: {}",
                    definition.service_uri, e
                ))
            })?;
            return match url.scheme() {
                "http" | "https" => Ok(url.to_string()),
                scheme => Err(ProbeTransportError::EndpointResolution(format!(
                    "服务 {} 未登记端点且协议 {} 不可直接请求",
                    definition.service_uri, scheme
                ))),
            };
        };

        match definition.endpoint.as_deref().filter(|e| !e.is_empty()) {
            Some(name) => service.endpoints.get(name).cloned().ok_or_else(|| {
                ProbeTransportError::EndpointResolution(format!(
                    "服务 {} 没有名为 {} 的端点",
                    definition.service_uri, name
                ))
            }),
            None => {
                let mut values = service.endpoints.values();
                match (values.next(), values.next()) {
                    (Some(only), None) => Ok(only.clone()),
                    (None, _) => Err(ProbeTransportError::EndpointResolution(format!(
                        "服务 {} 没有可用端点",
                        definition.service_uri
                    ))),
                    (Some(_), Some(_)) => Err(ProbeTransportError::EndpointResolution(format!(
                        "服务 {} 暴露多个端点，必须指定端点名称",
                        definition.service_uri
                    ))),
                }
            }
        }
    }
}

#[async_trait]
impl EndpointResolver for StaticEndpointResolver {
    async fn resolve(&self, definition: &CheckDefinition) -> Result<Url, ProbeTransportError> {
        let base = self.select_base(definition)?;
        join_target(&base, &definition.suffix_path)
    }
}
