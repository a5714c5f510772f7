//! 健康状态聚合
//!
//! 从注册表当前内容计算最差状态及诊断描述，只读不写

use crate::error::StorageResult;
use crate::health::definition::CheckDefinition;
use crate::health::registry::CheckRegistry;
use crate::health::result::HealthState;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// 已注册健康检查数量的指标名称
pub const CHECK_COUNT_GAUGE: &str = "health_check_count";

/// 聚合结果
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthSummary {
    /// 最差状态
    pub state: HealthState,
    /// 诊断描述
    pub description: String,
    /// 健康检查数量
    pub check_count: usize,
}

/// 健康状态聚合器
pub struct HealthAggregator {
    registry: Arc<CheckRegistry>,
}

impl HealthAggregator {
    /// 创建聚合器
    pub fn new(registry: Arc<CheckRegistry>) -> Self {
        Self { registry }
    }

    /// 计算当前聚合健康状态，同时更新数量指标
    pub fn summarize(&self) -> StorageResult<HealthSummary> {
        let definitions = self.registry.list_all()?;
        metrics::gauge!(CHECK_COUNT_GAUGE).set(definitions.len() as f64);
        Ok(summarize(&definitions))
    }
}

/// 对一组定义计算聚合状态
pub fn summarize(definitions: &[CheckDefinition]) -> HealthSummary {
    if definitions.is_empty() {
        return HealthSummary {
            state: HealthState::Ok,
            description: "no health checks registered".to_string(),
            check_count: 0,
        };
    }

    let mut worst = HealthState::Ok;
    let mut problems = Vec::new();

    for definition in definitions {
        let state = definition.current_state();
        worst = worst.worst(state);
        if state != HealthState::Ok {
            problems.push(format!(
                "{} ({}): {}, failureCount={}, lastResult={}",
                definition.name,
                definition.key(),
                state,
                definition.failure_count,
                definition.result_code
            ));
        }
    }

    let description = if problems.is_empty() {
        format!("all {} health checks Ok", definitions.len())
    } else {
        problems.join("\n")
    };

    HealthSummary {
        state: worst,
        description,
        check_count: definitions.len(),
    }
}
