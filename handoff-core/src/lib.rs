//! Shared data model, error taxonomy, and configuration types for the
//! handoff broker. No I/O lives here — every other crate in the workspace
//! depends on this one.

pub mod agent;
pub mod alert;
pub mod config;
pub mod error;
pub mod handoff;
pub mod health;
pub mod route;

pub use agent::AgentCapabilities;
pub use alert::{AlertCondition, AlertEvent, AlertRule, AlertType, Severity};
pub use error::HandoffError;
pub use handoff::{
    project_index_key, queue_name, record_key, score_for, CreateHandoffRequest, Content, Handoff,
    Priority, Status, ACTIVE_AGENTS_KEY, ACTIVE_AGENTS_TTL_SECS, METRICS_COMPLETED_KEY,
    METRICS_COUNTER_TTL_SECS, METRICS_FAILED_KEY, METRICS_SNAPSHOT_KEY, METRICS_SNAPSHOT_TTL_SECS,
    METRICS_TOTAL_KEY, PROCESSING_TIMES_KEY, REQUEUE_COUNT_METADATA_KEY,
};
pub use health::{ComponentStatus, HealthHandle, HealthRegistry, HealthStatus};
pub use route::{Condition, ConditionType, Operator, RouteRule};

#[cfg(feature = "test-support")]
pub mod test_support {
    use std::collections::HashMap;

    use chrono::Utc;
    use uuid::Uuid;

    use crate::handoff::{Content, Handoff, Priority, Status};

    /// A builder for handoffs in tests, mirroring the reference codebase's
    /// `test-support` feature pattern for other internal crates.
    pub fn handoff(project: &str, from: &str, to: &str, summary: &str) -> Handoff {
        let now = Utc::now();
        Handoff {
            handoff_id: Uuid::now_v7(),
            project_name: project.to_string(),
            from_agent: from.to_string(),
            to_agent: to.to_string(),
            created_at: now,
            updated_at: now,
            task_context: String::new(),
            priority: Priority::Normal,
            status: Status::Pending,
            content: Content {
                summary: summary.to_string(),
                ..Default::default()
            },
            metadata: HashMap::new(),
        }
    }
}
