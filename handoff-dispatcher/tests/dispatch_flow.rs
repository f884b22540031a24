use std::sync::Arc;

use handoff_core::config::{DispatcherConfig, PoolConfig};
use handoff_core::{AgentCapabilities, CreateHandoffRequest, Status};
use handoff_dispatcher::{Dispatcher, FakeInvoker};
use handoff_redis::{ConnPool, MockClient};
use handoff_router::Router;
use handoff_store::HandoffStore;

fn agent(name: &str) -> AgentCapabilities {
    AgentCapabilities {
        name: name.to_string(),
        queue_name: format!("project:p:queue:{name}"),
        max_concurrent: 2,
        triggers: vec![],
        input_types: vec![],
        output_types: vec![],
    }
}

#[tokio::test]
async fn successful_invocation_completes_and_archives() {
    let pool = Arc::new(ConnPool::new(
        Arc::new(MockClient::new()),
        PoolConfig::default(),
    ));
    let store = Arc::new(HandoffStore::new(pool.clone(), Default::default()));
    let router = Arc::new(Router::new(16));
    let invoker = Arc::new(FakeInvoker::succeeding("done"));

    let archive_root = std::env::temp_dir()
        .join(format!("handoff-dispatch-test-{}", uuid::Uuid::now_v7()))
        .to_string_lossy()
        .to_string();

    let dispatcher = Dispatcher::new(
        pool.clone(),
        store.clone(),
        router,
        invoker,
        vec![agent("golang-expert")],
        DispatcherConfig::default(),
        archive_root.clone(),
    );

    let created = store
        .create(CreateHandoffRequest {
            project_name: "p".into(),
            from_agent: "api-expert".into(),
            to_agent: "golang-expert".into(),
            content: handoff_core::Content {
                summary: "implement auth".into(),
                ..Default::default()
            },
            ..Default::default()
        })
        .await
        .unwrap();

    let (_tx, rx) = tokio::sync::oneshot::channel();
    let health_registry = handoff_core::HealthRegistry::new("test");
    let health = health_registry
        .register("dispatcher", std::time::Duration::from_secs(30))
        .await;

    let run = tokio::spawn(async move {
        dispatcher.run(rx, health).await;
    });

    tokio::time::sleep(std::time::Duration::from_millis(200)).await;
    run.abort();

    let reloaded = store.get_by_id(created.handoff_id).await.unwrap();
    assert_eq!(reloaded.status, Status::Completed);

    let _ = tokio::fs::remove_dir_all(&archive_root).await;
}

#[tokio::test]
async fn failing_invocation_marks_handoff_failed() {
    let pool = Arc::new(ConnPool::new(
        Arc::new(MockClient::new()),
        PoolConfig::default(),
    ));
    let store = Arc::new(HandoffStore::new(pool.clone(), Default::default()));
    let router = Arc::new(Router::new(16));
    let invoker = Arc::new(FakeInvoker::failing("boom"));

    let archive_root = std::env::temp_dir()
        .join(format!("handoff-dispatch-test-{}", uuid::Uuid::now_v7()))
        .to_string_lossy()
        .to_string();

    let dispatcher = Dispatcher::new(
        pool.clone(),
        store.clone(),
        router,
        invoker,
        vec![agent("golang-expert")],
        DispatcherConfig::default(),
        archive_root.clone(),
    );

    let created = store
        .create(CreateHandoffRequest {
            project_name: "p".into(),
            from_agent: "api-expert".into(),
            to_agent: "golang-expert".into(),
            content: handoff_core::Content {
                summary: "do it".into(),
                ..Default::default()
            },
            ..Default::default()
        })
        .await
        .unwrap();

    let (_tx, rx) = tokio::sync::oneshot::channel();
    let health_registry = handoff_core::HealthRegistry::new("test");
    let health = health_registry
        .register("dispatcher", std::time::Duration::from_secs(30))
        .await;

    let run = tokio::spawn(async move {
        dispatcher.run(rx, health).await;
    });

    tokio::time::sleep(std::time::Duration::from_millis(200)).await;
    run.abort();

    let reloaded = store.get_by_id(created.handoff_id).await.unwrap();
    assert_eq!(reloaded.status, Status::Failed);
}
