//! Composition root for the handoff broker daemon: wires Components
//! A-E together from `Config`/the rules document, spawns the
//! dispatcher and monitor tick loops, and serves the health/metrics
//! HTTP surface (spec.md §1, §6). Modeled on the reference codebase's
//! janitor binary `main.rs`.
use std::sync::Arc;
use std::time::Duration;

use envconfig::Envconfig;
use handoff_core::config::{DispatcherConfig, MonitorConfig, PoolConfig, RulesDocument, StoreConfig};
use handoff_core::health::HealthRegistry;
use handoff_dispatcher::{Dispatcher, ScriptInvoker};
use handoff_monitor::Monitor;
use handoff_redis::{ConnPool, RedisClient};
use handoff_router::Router;
use handoff_store::HandoffStore;
use metrics_exporter_prometheus::PrometheusBuilder;
use tokio::sync::oneshot;
use tracing::info;

mod config;
mod http;

use config::Config;

#[tokio::main]
async fn main() -> eyre::Result<()> {
    tracing_subscriber::fmt::init();

    let config = Config::init_from_env()?;
    info!(host = %config.host, port = config.port, "starting handoff-daemon");

    let rules_raw = tokio::fs::read_to_string(&config.rules_document_path)
        .await
        .map_err(|e| eyre::eyre!("reading rules document {}: {e}", config.rules_document_path))?;
    let rules = RulesDocument::parse_toml(&rules_raw)?;

    let redis_client = RedisClient::new(
        &config.redis_url,
        Duration::from_millis(config.redis_op_timeout_ms),
    )
    .await?;
    let pool = Arc::new(ConnPool::new(Arc::new(redis_client), PoolConfig::default()));

    let liveness = HealthRegistry::new("liveness");
    let readiness = HealthRegistry::new("readiness");

    let pool_handle = readiness.register("redis_pool", Duration::from_secs(60)).await;
    pool.spawn_health_ticker(pool_handle);

    let store = Arc::new(HandoffStore::new(pool.clone(), StoreConfig::default()));
    let router = Arc::new(Router::from_routes(
        rules.routes,
        DispatcherConfig::default().max_hop_count,
    )?);
    let invoker = Arc::new(ScriptInvoker::new(
        config.invoker_command.clone(),
        Vec::new(),
        Duration::from_secs(config.invoker_timeout_secs),
    ));

    let dispatcher = Arc::new(Dispatcher::new(
        pool.clone(),
        store.clone(),
        router.clone(),
        invoker,
        rules.agents,
        DispatcherConfig::default(),
        config.archive_root.clone(),
    ));
    let monitor = Arc::new(Monitor::new(pool.clone(), MonitorConfig::default(), rules.alert_rules));

    let dispatcher_health = liveness.register("dispatcher", Duration::from_secs(30)).await;
    let monitor_health = liveness.register("monitor", Duration::from_secs(120)).await;

    let (dispatcher_shutdown_tx, dispatcher_shutdown_rx) = oneshot::channel();
    let (monitor_shutdown_tx, monitor_shutdown_rx) = oneshot::channel();

    let dispatcher_task = {
        let dispatcher = dispatcher.clone();
        tokio::spawn(async move { dispatcher.run(dispatcher_shutdown_rx, dispatcher_health).await })
    };
    let monitor_task = {
        let monitor = monitor.clone();
        tokio::spawn(async move { monitor.run(monitor_shutdown_rx, monitor_health).await })
    };

    let metrics_handle = PrometheusBuilder::new().install_recorder()?;
    let app = http::app(liveness, readiness, metrics_handle);
    let listener = tokio::net::TcpListener::bind((config.host.as_str(), config.port)).await?;

    tokio::select! {
        result = axum::serve(listener, app) => {
            if let Err(err) = result {
                tracing::error!(error = %err, "http server exited with error");
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("received shutdown signal");
        }
    }

    let _ = dispatcher_shutdown_tx.send(());
    let _ = monitor_shutdown_tx.send(());
    let _ = dispatcher_task.await;
    let _ = monitor_task.await;

    info!("handoff-daemon shut down cleanly");
    Ok(())
}
