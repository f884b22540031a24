//! Process-wide liveness aggregation shared by every long-running loop in
//! the broker (the ConnPool health ticker, the dispatcher scan loop, and
//! the monitor tick loop each hold a `HealthHandle` and must report
//! healthy more often than their configured deadline, or the registry
//! marks the whole process unhealthy).
use std::collections::HashMap;
use std::ops::Add;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use tokio::sync::mpsc;
use tracing::warn;

#[derive(Default, Debug)]
pub struct HealthStatus {
    pub healthy: bool,
    pub components: HashMap<String, ComponentStatus>,
}

impl IntoResponse for HealthStatus {
    fn into_response(self) -> Response {
        let body = format!("{self:?}");
        match self.healthy {
            true => (StatusCode::OK, body),
            false => (StatusCode::SERVICE_UNAVAILABLE, body),
        }
        .into_response()
    }
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub enum ComponentStatus {
    Starting,
    HealthyUntil(time::OffsetDateTime),
    Unhealthy,
    Stalled,
}

impl ComponentStatus {
    pub fn is_healthy(&self) -> bool {
        match self {
            ComponentStatus::HealthyUntil(until) => until.gt(&time::OffsetDateTime::now_utc()),
            _ => false,
        }
    }
}

struct HealthMessage {
    component: String,
    status: ComponentStatus,
}

#[derive(Clone)]
pub struct HealthHandle {
    component: String,
    deadline: Duration,
    sender: mpsc::Sender<HealthMessage>,
}

impl HealthHandle {
    pub async fn report_healthy(&self) {
        self.report_status(ComponentStatus::HealthyUntil(
            time::OffsetDateTime::now_utc().add(self.deadline),
        ))
        .await
    }

    pub async fn report_status(&self, status: ComponentStatus) {
        let message = HealthMessage {
            component: self.component.clone(),
            status,
        };
        if let Err(err) = self.sender.send(message).await {
            warn!("failed to report health status: {err}");
        }
    }
}

#[derive(Clone)]
pub struct HealthRegistry {
    name: String,
    components: Arc<RwLock<HashMap<String, ComponentStatus>>>,
    sender: mpsc::Sender<HealthMessage>,
}

impl HealthRegistry {
    pub fn new(name: &str) -> Self {
        let (tx, mut rx) = mpsc::channel::<HealthMessage>(16);
        let registry = Self {
            name: name.to_owned(),
            components: Default::default(),
            sender: tx,
        };

        let components = registry.components.clone();
        tokio::spawn(async move {
            while let Some(message) = rx.recv().await {
                if let Ok(mut map) = components.write() {
                    map.insert(message.component, message.status);
                } else {
                    warn!("poisoned HealthRegistry mutex");
                }
            }
        });

        registry
    }

    /// Registers a component and returns the handle it should hold to
    /// report its own health at least as often as `deadline`.
    pub async fn register(&self, component: impl Into<String>, deadline: Duration) -> HealthHandle {
        let handle = HealthHandle {
            component: component.into(),
            deadline,
            sender: self.sender.clone(),
        };
        handle.report_status(ComponentStatus::Starting).await;
        handle
    }

    /// Overall status: healthy only when every registered component has
    /// reported healthy within its deadline.
    pub fn get_status(&self) -> HealthStatus {
        let components = self
            .components
            .read()
            .expect("poisoned HealthRegistry mutex");

        let now = time::OffsetDateTime::now_utc();
        let mut result = HealthStatus {
            healthy: !components.is_empty(),
            components: HashMap::new(),
        };

        for (name, status) in components.iter() {
            match status {
                ComponentStatus::HealthyUntil(until) if until.gt(&now) => {
                    result.components.insert(name.clone(), status.clone());
                }
                ComponentStatus::HealthyUntil(_) => {
                    result.healthy = false;
                    result
                        .components
                        .insert(name.clone(), ComponentStatus::Stalled);
                }
                other => {
                    result.healthy = false;
                    result.components.insert(name.clone(), other.clone());
                }
            }
        }

        if !result.healthy {
            warn!("{} health check failed: {:?}", self.name, result.components);
        }
        result
    }
}
