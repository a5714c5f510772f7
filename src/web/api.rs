//! REST API处理器

use super::{ApiError, AppState};
use crate::health::{CheckDefinition, HealthSummary};
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use tower_http::trace::TraceLayer;
use tracing::{debug, info};
use uuid::Uuid;

/// 创建API路由
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route(
            "/healthcheck",
            get(list_all_checks).post(register_check),
        )
        .route("/healthcheck/health", get(operations_health))
        .route("/healthcheck/{application}", get(list_application_checks))
        .route(
            "/healthcheck/{application}/{service}",
            get(list_service_checks),
        )
        .route(
            "/healthcheck/{application}/{service}/{partition}",
            get(list_partition_checks),
        )
        .route("/watchdog/health", get(watchdog_health))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// POST /healthcheck
async fn register_check(
    State(state): State<AppState>,
    Json(definition): Json<CheckDefinition>,
) -> Result<StatusCode, ApiError> {
    let registration = state.operations.register(definition).await?;
    info!(
        "通过API注册健康检查: {} (新建: {})",
        registration.definition.key(),
        registration.is_new
    );
    Ok(StatusCode::OK)
}

/// GET /healthcheck
async fn list_all_checks(
    State(state): State<AppState>,
) -> Result<Json<Vec<CheckDefinition>>, ApiError> {
    Ok(Json(state.operations.list(None, None, None)?))
}

/// GET /healthcheck/{application}
async fn list_application_checks(
    State(state): State<AppState>,
    Path(application): Path<String>,
) -> Result<Json<Vec<CheckDefinition>>, ApiError> {
    Ok(Json(state.operations.list(Some(&application), None, None)?))
}

/// GET /healthcheck/{application}/{service}
async fn list_service_checks(
    State(state): State<AppState>,
    Path((application, service)): Path<(String, String)>,
) -> Result<Json<Vec<CheckDefinition>>, ApiError> {
    Ok(Json(state.operations.list(
        Some(&application),
        Some(&service),
        None,
    )?))
}

/// GET /healthcheck/{application}/{service}/{partition}
async fn list_partition_checks(
    State(state): State<AppState>,
    Path((application, service, partition)): Path<(String, String, String)>,
) -> Result<Json<Vec<CheckDefinition>>, ApiError> {
    let partition = Uuid::parse_str(&partition)
        .map_err(|e| ApiError::bad_request(format!("无效的分区ID {partition}: {e}")))?;
    Ok(Json(state.operations.list(
        Some(&application),
        Some(&service),
        Some(&partition),
    )?))
}

/// GET /healthcheck/health
///
/// 没有注册任何健康检查时返回 204
async fn operations_health(State(state): State<AppState>) -> Result<Response, ApiError> {
    let count = state.operations.check_count()?;
    debug!("健康检查数量: {}", count);
    if count == 0 {
        Ok(StatusCode::NO_CONTENT.into_response())
    } else {
        Ok(StatusCode::OK.into_response())
    }
}

/// GET /watchdog/health
async fn watchdog_health(
    State(state): State<AppState>,
) -> Result<Json<HealthSummary>, ApiError> {
    Ok(Json(state.operations.current_aggregate_health()?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::health::{
        CheckRegistry, HealthAggregator, HealthState, ProbeExecutor, ProbeResult, ProbeStatus,
        WatchdogScheduler,
    };
    use crate::service::HealthCheckOperations;
    use crate::store::MemoryStore;
    use async_trait::async_trait;
    use axum::body::{to_bytes, Body};
    use axum::http::{header, Request};
    use std::sync::Arc;
    use std::time::Duration;
    use tower::ServiceExt;

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

    fn create_test_router() -> Router {
        let registry = Arc::new(CheckRegistry::new(Arc::new(MemoryStore::new())));
        let scheduler = Arc::new(WatchdogScheduler::new(
            registry.clone(),
            Arc::new(OkExecutor),
            4,
        ));
        let aggregator = Arc::new(HealthAggregator::new(registry));
        let operations = Arc::new(HealthCheckOperations::new(scheduler, aggregator));
        create_router(AppState::new(operations))
    }

    fn post_json(body: serde_json::Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/healthcheck")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn get_request(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    async fn json_body(response: Response) -> serde_json::Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn sample_check(name: &str, service: &str) -> serde_json::Value {
        serde_json::json!({
            "name": name,
            "serviceName": service,
            "partition": "00000000-0000-0000-0000-000000000000",
            "suffixPath": "api/ping",
        })
    }

    #[tokio::test]
    async fn test_health_returns_no_content_when_empty() {
        let router = create_test_router();

        let response = router.clone().oneshot(get_request("/healthcheck/health")).await.unwrap();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);

        let response = router
            .clone()
            .oneshot(post_json(sample_check("a", "fabric:/App/Svc")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = router.oneshot(get_request("/healthcheck/health")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_register_rejects_invalid_definitions() {
        let router = create_test_router();

        let response = router
            .clone()
            .oneshot(post_json(serde_json::json!({})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let mut with_content = sample_check("a", "fabric:/App/Svc");
        with_content["content"] = serde_json::json!("{}");
        let response = router
            .clone()
            .oneshot(post_json(with_content))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = json_body(response).await;
        assert!(body["error"].as_str().unwrap().contains("mediaType"));

        let response = router.oneshot(get_request("/healthcheck")).await.unwrap();
        assert_eq!(json_body(response).await, serde_json::json!([]));
    }

    #[tokio::test]
    async fn test_list_filters() {
        let router = create_test_router();
        for (name, service) in [
            ("a", "fabric:/App/Svc"),
            ("b", "fabric:/App/Other"),
            ("c", "fabric:/Else/Svc"),
        ] {
            let response = router
                .clone()
                .oneshot(post_json(sample_check(name, service)))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::OK);
        }

        let all = json_body(router.clone().oneshot(get_request("/healthcheck")).await.unwrap()).await;
        assert_eq!(all.as_array().unwrap().len(), 3);

        let app = json_body(
            router
                .clone()
                .oneshot(get_request("/healthcheck/App"))
                .await
                .unwrap(),
        )
        .await;
        assert_eq!(app.as_array().unwrap().len(), 2);

        let svc = json_body(
            router
                .clone()
                .oneshot(get_request("/healthcheck/App/Svc"))
                .await
                .unwrap(),
        )
        .await;
        assert_eq!(svc.as_array().unwrap().len(), 1);
        assert_eq!(svc[0]["name"], "a");

        let partition = json_body(
            router
                .clone()
                .oneshot(get_request(
                    "/healthcheck/App/Svc/00000000-0000-0000-0000-000000000000",
                ))
                .await
                .unwrap(),
        )
        .await;
        assert_eq!(partition.as_array().unwrap().len(), 1);

        let other_partition = json_body(
            router
                .clone()
                .oneshot(get_request(&format!("/healthcheck/App/Svc/{}", Uuid::new_v4())))
                .await
                .unwrap(),
        )
        .await;
        assert_eq!(other_partition, serde_json::json!([]));

        let response = router
            .oneshot(get_request("/healthcheck/App/Svc/not-a-uuid"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_watchdog_health_summary() {
        let router = create_test_router();

        let body = json_body(
            router
                .clone()
                .oneshot(get_request("/watchdog/health"))
                .await
                .unwrap(),
        )
        .await;
        assert_eq!(body["state"], "ok");
        assert_eq!(body["checkCount"], 0);

        router
            .clone()
            .oneshot(post_json(sample_check("a", "fabric:/App/Svc")))
            .await
            .unwrap();

        let body = json_body(router.oneshot(get_request("/watchdog/health")).await.unwrap()).await;
        assert_eq!(body["state"], "unknown");
        assert_eq!(body["checkCount"], 1);
    }
}
