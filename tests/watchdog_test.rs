//! 看门狗集成测试
//!
//! 覆盖注册默认值、失败计数、校验拒绝、调度循环端到端探测以及重启恢复

use service_watchdog::error::{ValidationError, WatchdogError};
use service_watchdog::health::{
    CheckDefinition, CheckRegistry, EndpointResolver, HealthAggregator, HealthState,
    HttpProbeExecutor, ProbeExecutor, ProbeStatus, StaticEndpointResolver, WatchdogScheduler,
};
use service_watchdog::service::HealthCheckOperations;
use service_watchdog::store::file::JsonFileStore;
use service_watchdog::store::{KeyValueStore, MemoryStore};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::broadcast;
use uuid::Uuid;

fn partition_one() -> Uuid {
    Uuid::parse_str("6f1d7a52-2c3b-4c1e-9a55-0d4b3c2a1f10").unwrap()
}

fn create_executor() -> Arc<dyn ProbeExecutor> {
    let resolver: Arc<dyn EndpointResolver> = Arc::new(StaticEndpointResolver::new());
    Arc::new(HttpProbeExecutor::new("service-watchdog-test", resolver).unwrap())
}

fn create_operations(store: Arc<dyn KeyValueStore>) -> (Arc<WatchdogScheduler>, HealthCheckOperations) {
    let registry = Arc::new(CheckRegistry::new(store));
    let scheduler = Arc::new(WatchdogScheduler::new(registry.clone(), create_executor(), 8));
    let aggregator = Arc::new(HealthAggregator::new(registry));
    let operations = HealthCheckOperations::new(scheduler.clone(), aggregator);
    (scheduler, operations)
}

#[tokio::test]
async fn test_registration_applies_defaults() {
    let (_scheduler, operations) = create_operations(Arc::new(MemoryStore::new()));

    operations
        .register(CheckDefinition {
            name: "svc-check".to_string(),
            service_uri: "http://svc.local/".to_string(),
            partition: partition_one(),
            suffix_path: "/ping".to_string(),
            ..Default::default()
        })
        .await
        .unwrap();

    let listed = operations.list(None, None, None).unwrap();
    assert_eq!(listed.len(), 1);

    let definition = &listed[0];
    assert_eq!(definition.frequency, Duration::from_secs(60));
    assert_eq!(definition.expected_duration, Duration::from_millis(200));
    assert_eq!(definition.maximum_duration, Duration::from_secs(5));
    assert_eq!(definition.method, "GET");
    assert_eq!(definition.failure_count, 0);
    assert_eq!(definition.result_code, ProbeStatus::None);
    assert_eq!(definition.key(), format!("http://svc.local/{}", partition_one()));
}

#[tokio::test]
async fn test_failure_count_accumulates_and_resets() {
    let mut server = mockito::Server::new_async().await;
    let store: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
    let registry = CheckRegistry::new(store);
    let executor = create_executor();

    let registration = registry
        .register(
            CheckDefinition::new("svc-check", server.url(), partition_one(), "/ping")
                .with_expected_duration(Duration::from_secs(2)),
        )
        .unwrap();
    let key = registration.definition.key();

    let unavailable = server
        .mock("GET", "/ping")
        .with_status(503)
        .expect(2)
        .create_async()
        .await;

    for expected_failures in 1..=2 {
        let definition = registry.get(&key).unwrap().unwrap();
        let result = executor.execute(&definition).await;
        assert_eq!(result.status, ProbeStatus::Http(503));
        assert_eq!(result.classification, HealthState::Error);

        let updated = registry.record_result(&result).unwrap().unwrap();
        assert_eq!(updated.failure_count, expected_failures);
    }
    unavailable.assert_async().await;
    unavailable.remove_async().await;

    let _ok = server
        .mock("GET", "/ping")
        .with_status(200)
        .create_async()
        .await;

    let definition = registry.get(&key).unwrap().unwrap();
    let result = executor.execute(&definition).await;
    assert_eq!(result.classification, HealthState::Ok);

    let updated = registry.record_result(&result).unwrap().unwrap();
    assert_eq!(updated.failure_count, 0);
    assert_eq!(updated.result_code, ProbeStatus::Http(200));
    assert!(updated.last_attempt.is_some());
}

#[tokio::test]
async fn test_content_without_media_type_leaves_no_entries() {
    let store = Arc::new(MemoryStore::new());
    let (_scheduler, operations) = create_operations(store.clone());

    let definition = CheckDefinition {
        name: "svc-check".to_string(),
        service_uri: "http://svc.local/".to_string(),
        partition: partition_one(),
        suffix_path: "/ping".to_string(),
        method: "POST".to_string(),
        content: Some("{\"probe\":true}".to_string()),
        ..Default::default()
    };

    let err = operations.register(definition).await.unwrap_err();
    assert!(matches!(
        err,
        WatchdogError::Validation(ValidationError::MissingMediaType)
    ));
    assert!(store.is_empty());
    assert_eq!(operations.check_count().unwrap(), 0);
}

#[tokio::test]
async fn test_scheduler_probes_registered_check() {
    let mut server = mockito::Server::new_async().await;
    let _mock = server
        .mock("GET", "/ping")
        .with_status(503)
        .expect_at_least(2)
        .create_async()
        .await;

    let (scheduler, operations) = create_operations(Arc::new(MemoryStore::new()));
    let registration = operations
        .register(
            CheckDefinition::new("svc-check", server.url(), partition_one(), "/ping")
                .with_frequency(Duration::from_millis(100)),
        )
        .await
        .unwrap();
    let key = registration.definition.key();

    let (tx, rx) = broadcast::channel(1);
    let handle = tokio::spawn(Arc::clone(&scheduler).run(rx));

    let registry = scheduler.registry().clone();
    let reached = tokio::time::timeout(Duration::from_secs(10), async {
        loop {
            if let Some(definition) = registry.get(&key).unwrap() {
                if definition.failure_count >= 2 {
                    return definition;
                }
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .unwrap();
    assert_eq!(reached.result_code, ProbeStatus::Http(503));

    let summary = operations.current_aggregate_health().unwrap();
    assert_eq!(summary.state, HealthState::Error);
    assert!(summary.description.contains("svc-check"));

    tx.send(()).unwrap();
    handle.await.unwrap();

    // 每个键只保留一条调度记录
    let schedule = registry.load_schedule().unwrap();
    assert_eq!(schedule.len(), 1);
    assert_eq!(schedule[0].key, key);
}

#[tokio::test]
async fn test_schedule_survives_restart() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("state.json");

    {
        let store: Arc<dyn KeyValueStore> = Arc::new(JsonFileStore::open(&path).unwrap());
        let (_scheduler, operations) = create_operations(store);
        for name in ["a", "b"] {
            operations
                .register(CheckDefinition::new(
                    name,
                    format!("fabric:/App/{name}"),
                    Uuid::nil(),
                    "/ping",
                ))
                .await
                .unwrap();
        }
    }

    let store: Arc<dyn KeyValueStore> = Arc::new(JsonFileStore::open(&path).unwrap());
    let (scheduler, operations) = create_operations(store);
    assert_eq!(scheduler.restore().await.unwrap(), 2);
    assert_eq!(operations.list(Some("App"), None, None).unwrap().len(), 2);
    assert_eq!(operations.list(Some("App"), Some("a"), None).unwrap().len(), 1);
}
