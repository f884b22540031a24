use serde::{Deserialize, Serialize};

use crate::agent::AgentCapabilities;
use crate::alert::AlertRule;
use crate::route::RouteRule;

/// Pool/retry knobs for Component E (spec.md §4.E). Defaults match the
/// spec's stated production tuning: 25/5/5m/4s/10m/1m/5s/3s/3s/30s/3/8ms/512ms.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    pub pool_size: u32,
    pub min_idle_conns: u32,
    pub max_conn_age_secs: u64,
    pub pool_timeout_secs: u64,
    pub idle_timeout_secs: u64,
    pub idle_check_freq_secs: u64,
    pub dial_timeout_secs: u64,
    pub read_timeout_secs: u64,
    pub write_timeout_secs: u64,
    pub health_check_interval_secs: u64,
    pub max_retries: u32,
    pub min_retry_backoff_ms: u64,
    pub max_retry_backoff_ms: u64,
    /// Consecutive health-check failures before the pool is considered unhealthy.
    pub unhealthy_after_failures: u32,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            pool_size: 25,
            min_idle_conns: 5,
            max_conn_age_secs: 5 * 60,
            pool_timeout_secs: 4,
            idle_timeout_secs: 10 * 60,
            idle_check_freq_secs: 60,
            dial_timeout_secs: 5,
            read_timeout_secs: 3,
            write_timeout_secs: 3,
            health_check_interval_secs: 30,
            max_retries: 3,
            min_retry_backoff_ms: 8,
            max_retry_backoff_ms: 512,
            unhealthy_after_failures: 3,
        }
    }
}

/// Pagination defaults/caps (spec.md §4.A `List`, §8 boundary behaviors).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct PaginationConfig {
    pub default_page_size: u32,
    pub max_page_size: u32,
}

impl Default for PaginationConfig {
    fn default() -> Self {
        Self {
            default_page_size: 20,
            max_page_size: 200,
        }
    }
}

impl PaginationConfig {
    /// `page_size = 0` clamps to default; `page_size > max` clamps to max (spec.md §8).
    pub fn clamp(&self, requested: u32) -> u32 {
        if requested == 0 {
            self.default_page_size
        } else {
            requested.min(self.max_page_size)
        }
    }
}

/// Store-level knobs: retention TTL and the hard payload size cap.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub retention_secs: u64,
    pub max_payload_bytes: usize,
    pub pagination: PaginationConfig,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            retention_secs: 24 * 60 * 60,
            max_payload_bytes: crate::handoff::MAX_PAYLOAD_BYTES,
            pagination: PaginationConfig::default(),
        }
    }
}

/// Dispatcher-level knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatcherConfig {
    pub scan_batch_limit: usize,
    pub idle_sleep_min_ms: u64,
    pub idle_sleep_max_ms: u64,
    pub worker_requeue_max_attempts: u32,
    pub drain_deadline_secs: u64,
    pub max_hop_count: u32,
    /// Length `processing_times` is trimmed to on every push (spec.md §6);
    /// kept in step with `MonitorConfig::processing_times_window`, which
    /// reads the same bounded list.
    pub processing_times_window: usize,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            scan_batch_limit: 256,
            idle_sleep_min_ms: 100,
            idle_sleep_max_ms: 2_000,
            worker_requeue_max_attempts: 5,
            drain_deadline_secs: 30,
            max_hop_count: crate::handoff::DEFAULT_MAX_HOP_COUNT,
            processing_times_window: 100,
        }
    }
}

/// Monitor-level knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    pub enabled: bool,
    pub interval_secs: u64,
    pub processing_times_window: usize,
    pub subscriber_buffer_size: usize,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: 30,
            processing_times_window: 100,
            subscriber_buffer_size: 100,
        }
    }
}

/// The single declarative document recognized keys from spec.md §6:
/// `agents[]`, `routes{}`, `alert_rules[]`, plus the component configs above.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RulesDocument {
    pub agents: Vec<AgentCapabilities>,
    pub routes: std::collections::HashMap<String, RouteRoutes>,
    pub alert_rules: Vec<AlertRule>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RouteRoutes {
    #[serde(default)]
    pub rules: Vec<RouteRule>,
    pub default_agent: Option<String>,
}

impl RulesDocument {
    pub fn parse_toml(s: &str) -> Result<Self, crate::error::HandoffError> {
        toml::from_str(s)
            .map_err(|e| crate::error::HandoffError::validation(format!("invalid rules document: {e}")))
    }
}
