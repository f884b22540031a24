//! Component D: periodic observation of queue depths and counters,
//! composite health scoring, and threshold alert evaluation with
//! best-effort fan-out (spec.md §4.D). Modeled on the reference
//! codebase's janitor tick loop: a single composition object holds the
//! cross-cutting status/control state behind locks, while `run_once`
//! stays a pure function of that state.
use std::sync::Arc;

use chrono::Utc;
use handoff_core::config::MonitorConfig;
use handoff_core::health::HealthHandle;
use handoff_core::{
    AlertEvent, AlertRule, ACTIVE_AGENTS_KEY, METRICS_COMPLETED_KEY, METRICS_FAILED_KEY,
    METRICS_SNAPSHOT_KEY, METRICS_SNAPSHOT_TTL_SECS, METRICS_TOTAL_KEY, PROCESSING_TIMES_KEY,
};
use handoff_redis::{Client, ConnPool};
use parking_lot::RwLock;
use tracing::{error, info, warn};

mod health_score;
mod subscribers;

pub use health_score::{composite_health_score, HealthInputs};
pub use subscribers::SubscriberRegistry;

/// A point-in-time reading of system state, persisted to
/// `metrics:snapshot` with a 1 h TTL on every tick (spec.md §4.D).
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct MetricsSnapshot {
    pub queue_depth_total: u64,
    pub total: i64,
    pub completed: i64,
    pub failed: i64,
    pub active_agents: usize,
    pub avg_processing_time_ms: f64,
    pub health_score: f64,
    pub taken_at: chrono::DateTime<Utc>,
}

/// Observes system state each tick and evaluates alert rules
/// (spec.md §4.D). Alert rules live behind an exclusive lock, readers
/// (the tick loop) take a shared lock, per the "global mutable state →
/// scoped holders" design note.
pub struct Monitor<C: Client> {
    pool: Arc<ConnPool<C>>,
    config: MonitorConfig,
    rules: RwLock<Vec<AlertRule>>,
    subscribers: SubscriberRegistry,
}

impl<C: Client + 'static> Monitor<C> {
    pub fn new(pool: Arc<ConnPool<C>>, config: MonitorConfig, rules: Vec<AlertRule>) -> Self {
        let subscribers = SubscriberRegistry::new(config.subscriber_buffer_size);
        Self {
            pool,
            config,
            rules: RwLock::new(rules),
            subscribers,
        }
    }

    pub fn subscribers(&self) -> &SubscriberRegistry {
        &self.subscribers
    }

    pub fn replace_rules(&self, rules: Vec<AlertRule>) {
        *self.rules.write() = rules;
    }

    /// Runs the periodic tick loop until `shutdown` resolves. Never
    /// aborts the process on a collection error (spec.md §7); the error
    /// is logged and the loop continues on the next tick.
    pub async fn run(&self, mut shutdown: tokio::sync::oneshot::Receiver<()>, health: HealthHandle) {
        if !self.config.enabled {
            info!("monitor disabled, not starting tick loop");
            return;
        }

        let mut ticker = tokio::time::interval(std::time::Duration::from_secs(self.config.interval_secs));
        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("monitor received shutdown signal");
                    break;
                }
                _ = ticker.tick() => {
                    if let Err(err) = self.tick().await {
                        error!(error = %err, "monitor tick failed, continuing on next interval");
                    }
                    health.report_healthy().await;
                }
            }
        }
    }

    /// One collection + alert-evaluation pass.
    async fn tick(&self) -> Result<MetricsSnapshot, handoff_core::HandoffError> {
        let queue_keys = self.pool.scan_pattern("project:*:queue:*").await?;
        let depths = self
            .pool
            .execute_with_retry(|client| {
                let queue_keys = queue_keys.clone();
                async move { client.batch_zcard(&queue_keys).await }
            })
            .await?;
        let queue_depth_total: u64 = depths.values().sum();

        let total = self.read_counter(METRICS_TOTAL_KEY).await?;
        let completed = self.read_counter(METRICS_COMPLETED_KEY).await?;
        let failed = self.read_counter(METRICS_FAILED_KEY).await?;

        let active_agents = self
            .pool
            .execute_with_retry(|client| async move { client.scard(ACTIVE_AGENTS_KEY).await })
            .await?;

        let processing_times = self
            .pool
            .execute_with_retry(|client| async move { client.lrange(PROCESSING_TIMES_KEY, 0, -1).await })
            .await?;
        let avg_processing_time_ms = average_duration_ms(&processing_times);

        let failure_rate_pct = if total > 0 {
            (failed as f64 / total as f64) * 100.0
        } else {
            0.0
        };

        let health_inputs = HealthInputs {
            queue_depth_total,
            failure_rate_pct,
            avg_processing_ms: avg_processing_time_ms,
            any_agent_active: active_agents > 0,
            pool_healthy: self.pool.is_healthy(),
            pool_usage_pct: 0.0,
            redis_failure_rate_pct: 0.0,
            avg_redis_latency_ms: 0.0,
        };
        let health_score = composite_health_score(health_inputs);

        let snapshot = MetricsSnapshot {
            queue_depth_total,
            total,
            completed,
            failed,
            active_agents: active_agents as usize,
            avg_processing_time_ms,
            health_score,
            taken_at: Utc::now(),
        };

        if let Ok(serialized) = serde_json::to_string(&snapshot) {
            let _ = self
                .pool
                .execute_with_retry(|client| {
                    let serialized = serialized.clone();
                    async move { client.setex(METRICS_SNAPSHOT_KEY, &serialized, METRICS_SNAPSHOT_TTL_SECS).await }
                })
                .await;
        }

        metrics::gauge!("handoff_monitor_queue_depth_total").set(queue_depth_total as f64);
        metrics::gauge!("handoff_monitor_health_score").set(health_score);

        self.evaluate_alerts(&snapshot, failure_rate_pct).await;

        Ok(snapshot)
    }

    async fn read_counter(&self, key: &str) -> Result<i64, handoff_core::HandoffError> {
        let raw = self
            .pool
            .execute_with_retry(|client| async move { client.get(key).await })
            .await?;
        Ok(raw.and_then(|v| v.parse::<i64>().ok()).unwrap_or(0))
    }

    async fn evaluate_alerts(&self, snapshot: &MetricsSnapshot, failure_rate_pct: f64) {
        let now = Utc::now();
        let mut fired = Vec::new();

        {
            let mut rules = self.rules.write();
            for rule in rules.iter_mut() {
                if !rule.enabled {
                    continue;
                }

                let value = match rule.alert_type {
                    handoff_core::AlertType::QueueDepth => snapshot.queue_depth_total as f64,
                    handoff_core::AlertType::ProcessingTime => snapshot.avg_processing_time_ms,
                    handoff_core::AlertType::FailureRate => failure_rate_pct,
                    handoff_core::AlertType::SystemHealth => snapshot.health_score,
                    handoff_core::AlertType::AgentHealth => snapshot.active_agents as f64,
                };

                let breaching = rule.condition.evaluate(value, rule.threshold);
                if rule.observe(breaching, now) {
                    let severity = AlertRule::severity_for(rule.alert_type, value, rule.threshold);
                    fired.push(AlertEvent {
                        rule_name: rule.name.clone(),
                        alert_type: rule.alert_type,
                        severity,
                        value,
                        threshold: rule.threshold,
                        fired_at: now,
                    });
                }
            }
        }

        for event in fired {
            warn!(rule = %event.rule_name, severity = ?event.severity, value = event.value, "alert fired");
            self.subscribers.publish(event);
        }
    }
}

fn average_duration_ms(durations: &[String]) -> f64 {
    let parsed: Vec<f64> = durations.iter().filter_map(|d| d.parse::<f64>().ok()).collect();
    if parsed.is_empty() {
        return 0.0;
    }
    parsed.iter().sum::<f64>() / parsed.len() as f64
}
