use std::future::Future;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use handoff_core::config::PoolConfig;
use handoff_core::health::HealthHandle;
use tracing::{info, warn};

use crate::client::Client;
use crate::error::RedisOpError;
use crate::retry::RetryPolicy;

/// Wraps a `Client` with the retry-with-backoff and health-tracking
/// behavior spec.md §4.E describes for the connection pool. Modeled on
/// the reference codebase's pairing of a janitor-style background ticker
/// (`cyclotron-janitor`) with a `HealthHandle` reported by each long-lived
/// loop in the process.
pub struct ConnPool<C: Client> {
    client: Arc<C>,
    config: PoolConfig,
    retry_policy: RetryPolicy,
    consecutive_failures: AtomicU32,
}

impl<C: Client + 'static> ConnPool<C> {
    pub fn new(client: Arc<C>, config: PoolConfig) -> Self {
        let retry_policy = RetryPolicy::new(
            config.max_retries,
            Duration::from_millis(config.min_retry_backoff_ms),
            Duration::from_millis(config.max_retry_backoff_ms),
        );
        Self {
            client,
            config,
            retry_policy,
            consecutive_failures: AtomicU32::new(0),
        }
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    pub fn is_healthy(&self) -> bool {
        self.consecutive_failures.load(Ordering::Relaxed) < self.config.unhealthy_after_failures
    }

    /// Runs `op` against the pool's client, retrying retriable failures
    /// with linear backoff up to `max_retries` attempts.
    pub async fn execute_with_retry<F, Fut, T>(&self, op: F) -> Result<T, RedisOpError>
    where
        F: Fn(Arc<C>) -> Fut,
        Fut: Future<Output = Result<T, RedisOpError>>,
    {
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            match op(self.client.clone()).await {
                Ok(value) => {
                    self.consecutive_failures.store(0, Ordering::Relaxed);
                    return Ok(value);
                }
                Err(err) if err.is_retriable() && attempt <= self.retry_policy.max_retries => {
                    warn!(attempt, error = %err, "retriable redis error, backing off");
                    tokio::time::sleep(self.retry_policy.backoff_for(attempt)).await;
                }
                Err(err) => {
                    if err.is_retriable() {
                        self.consecutive_failures.fetch_add(1, Ordering::Relaxed);
                    }
                    return Err(err);
                }
            }
        }
    }

    /// Enumerate queue keys matching a glob pattern (`ScanPattern`).
    pub async fn scan_pattern(&self, pattern: &str) -> Result<Vec<String>, RedisOpError> {
        let pattern = pattern.to_string();
        self.execute_with_retry(move |client| {
            let pattern = pattern.clone();
            async move { client.scan_match(&pattern).await }
        })
        .await
    }

    /// Pop the lowest-scored member from each queue in one round-trip
    /// (`BatchPop`).
    pub async fn batch_pop(
        &self,
        queues: Vec<String>,
    ) -> Result<std::collections::HashMap<String, Option<(String, f64)>>, RedisOpError> {
        self.execute_with_retry(move |client| {
            let queues = queues.clone();
            async move { client.batch_zpopmin(&queues).await }
        })
        .await
    }

    /// Spawns the background health-check ticker described in spec.md
    /// §4.E: pings the store every `health_check_interval_secs` and
    /// reports into the process `HealthHandle`, flipping unhealthy after
    /// `unhealthy_after_failures` consecutive probe failures.
    pub fn spawn_health_ticker(self: &Arc<Self>, handle: HealthHandle) {
        let pool = Arc::clone(self);
        let interval = Duration::from_secs(pool.config.health_check_interval_secs);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                match pool.client.ping().await {
                    Ok(()) => {
                        pool.consecutive_failures.store(0, Ordering::Relaxed);
                        handle.report_healthy().await;
                    }
                    Err(err) => {
                        let failures = pool.consecutive_failures.fetch_add(1, Ordering::Relaxed) + 1;
                        warn!(failures, error = %err, "redis health probe failed");
                        if failures >= pool.config.unhealthy_after_failures {
                            handle
                                .report_status(handoff_core::health::ComponentStatus::Unhealthy)
                                .await;
                        } else {
                            handle.report_healthy().await;
                        }
                    }
                }
            }
        });
        info!(interval_secs = pool.config.health_check_interval_secs, "connpool health ticker started");
    }
}
