use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::HandoffError;

/// Ordered priority; lower numeric value sorts first in a queue.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Urgent = 1,
    High = 2,
    Normal = 3,
    Low = 4,
}

impl Default for Priority {
    fn default() -> Self {
        Priority::Normal
    }
}

impl Priority {
    /// The integer used in the queue score (spec.md §3 invariant 6 / §4.A score formula).
    pub fn score_component(self) -> f64 {
        self as u8 as f64
    }
}

impl std::str::FromStr for Priority {
    type Err = HandoffError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "urgent" => Ok(Priority::Urgent),
            "high" => Ok(Priority::High),
            "normal" => Ok(Priority::Normal),
            "low" => Ok(Priority::Low),
            other => Err(HandoffError::validation(format!(
                "invalid priority: {other}"
            ))),
        }
    }
}

/// Handoff lifecycle state. Transitions are validated by `Status::can_transition_to`
/// per the automaton in spec.md §4.A.1.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Pending,
    Processing,
    Completed,
    Failed,
    Cancelled,
}

impl Status {
    pub fn is_terminal(self) -> bool {
        matches!(self, Status::Completed | Status::Cancelled)
    }

    /// Whether a handoff currently in `self` is allowed to transition to `next`.
    /// `self == next` is always allowed (idempotent no-op update).
    pub fn can_transition_to(self, next: Status) -> bool {
        if self == next {
            return true;
        }
        matches!(
            (self, next),
            (Status::Pending, Status::Processing)
                | (Status::Pending, Status::Cancelled)
                | (Status::Processing, Status::Completed)
                | (Status::Processing, Status::Failed)
                | (Status::Processing, Status::Cancelled)
                | (Status::Failed, Status::Pending)
        )
    }

    /// True while the handoff occupies a queue slot (spec.md §3 invariant 2).
    pub fn occupies_queue(self) -> bool {
        matches!(self, Status::Pending)
    }
}

/// Recognized artifact kinds (spec.md §3).
pub const ARTIFACT_KINDS: [&str; 3] = ["created", "modified", "reviewed"];

/// The structured handoff payload.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Content {
    pub summary: String,
    #[serde(default)]
    pub requirements: Vec<String>,
    #[serde(default)]
    pub artifacts: HashMap<String, Vec<String>>,
    #[serde(default)]
    pub technical_details: HashMap<String, serde_json::Value>,
    #[serde(default)]
    pub next_steps: Vec<String>,
}

/// The durable unit of work exchanged between agents.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Handoff {
    pub handoff_id: Uuid,
    pub project_name: String,
    pub from_agent: String,
    pub to_agent: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub task_context: String,
    #[serde(default)]
    pub priority: Priority,
    pub status: Status,
    pub content: Content,
    /// Free-form bag used for router `metadata` conditions and bookkeeping
    /// such as `hop_count` (spec.md §9) and failure reasons.
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

/// Maximum serialized payload size accepted by `HandoffStore::Create` (spec.md §8).
pub const MAX_PAYLOAD_BYTES: usize = 256 * 1024;

/// Maximum number of router hops a handoff may accumulate before the router
/// refuses to produce any further follow-up (spec.md §9).
pub const DEFAULT_MAX_HOP_COUNT: u32 = 16;

/// Metadata key tracking how many times a handoff has been pushed back
/// onto its queue after finding its target agent's pool saturated
/// (spec.md §4.B step 4 "bounded retry count").
pub const REQUEUE_COUNT_METADATA_KEY: &str = "requeue_count";

impl Handoff {
    pub fn hop_count(&self) -> u32 {
        self.metadata
            .get("hop_count")
            .and_then(|v| v.as_u64())
            .unwrap_or(0) as u32
    }

    pub fn requeue_count(&self) -> u32 {
        self.metadata
            .get(REQUEUE_COUNT_METADATA_KEY)
            .and_then(|v| v.as_u64())
            .unwrap_or(0) as u32
    }

    pub fn queue_name(&self) -> String {
        queue_name(&self.project_name, &self.to_agent)
    }

    /// The queue ordering score: strictly monotone in `(priority, created_at)`,
    /// per the normative formula in spec.md §4.A.
    pub fn score(&self) -> f64 {
        score_for(self.priority, self.created_at)
    }

    pub fn serialized_len(&self) -> Result<usize, HandoffError> {
        let bytes = serde_json::to_vec(self)
            .map_err(|e| HandoffError::internal(format!("serialize handoff: {e}")))?;
        Ok(bytes.len())
    }
}

/// `score = P + created_at_ns * 1e-18` (spec.md §4.A, normative).
pub fn score_for(priority: Priority, created_at: DateTime<Utc>) -> f64 {
    let nanos = created_at.timestamp_nanos_opt().unwrap_or(0) as f64;
    priority.score_component() + nanos * 1e-18
}

/// Deterministic queue name: `project:{project_name}:queue:{agent_name}` (spec.md §3 invariant 3).
pub fn queue_name(project: &str, agent: &str) -> String {
    format!("project:{project}:queue:{agent}")
}

pub fn record_key(id: Uuid) -> String {
    format!("handoff:{id}")
}

pub fn project_index_key(project: &str) -> String {
    format!("project:{project}:set")
}

/// Global processing counters, the active-agent heartbeat set, the
/// bounded processing-duration history, and the monitor's persisted
/// snapshot (spec.md §6 "Persisted key schema"). Written by the
/// Dispatcher (spec.md §4.B step 6) and read by the Monitor
/// (spec.md §4.D).
pub const METRICS_TOTAL_KEY: &str = "metrics:total";
pub const METRICS_COMPLETED_KEY: &str = "metrics:completed";
pub const METRICS_FAILED_KEY: &str = "metrics:failed";
pub const ACTIVE_AGENTS_KEY: &str = "active_agents";
pub const PROCESSING_TIMES_KEY: &str = "processing_times";
pub const METRICS_SNAPSHOT_KEY: &str = "metrics:snapshot";

/// TTL for `metrics:total`/`metrics:completed`/`metrics:failed` (spec.md §6).
pub const METRICS_COUNTER_TTL_SECS: u64 = 24 * 60 * 60;
/// TTL for `active_agents`, refreshed on every heartbeat (spec.md §6).
pub const ACTIVE_AGENTS_TTL_SECS: u64 = 5 * 60;
/// TTL for `metrics:snapshot` (spec.md §6).
pub const METRICS_SNAPSHOT_TTL_SECS: u64 = 60 * 60;

/// Input to `HandoffStore::Create`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CreateHandoffRequest {
    pub project_name: String,
    pub from_agent: String,
    pub to_agent: String,
    #[serde(default)]
    pub task_context: String,
    pub priority: Option<Priority>,
    pub content: Content,
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

impl CreateHandoffRequest {
    pub fn validate(&self) -> Result<(), HandoffError> {
        if self.project_name.trim().is_empty() {
            return Err(HandoffError::validation("project_name must not be empty"));
        }
        if self.from_agent.trim().is_empty() {
            return Err(HandoffError::validation("from_agent must not be empty"));
        }
        if self.to_agent.trim().is_empty() {
            return Err(HandoffError::validation("to_agent must not be empty"));
        }
        if self.content.summary.trim().is_empty() {
            return Err(HandoffError::validation("content.summary must not be empty"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn priority_ordering_matches_spec() {
        assert!(Priority::Urgent < Priority::High);
        assert!(Priority::High < Priority::Normal);
        assert!(Priority::Normal < Priority::Low);
    }

    #[test]
    fn priority_defaults_to_normal() {
        assert_eq!(Priority::default(), Priority::Normal);
    }

    #[test]
    fn priority_from_str_round_trips() {
        for p in [Priority::Urgent, Priority::High, Priority::Normal, Priority::Low] {
            let s = match p {
                Priority::Urgent => "urgent",
                Priority::High => "high",
                Priority::Normal => "normal",
                Priority::Low => "low",
            };
            assert_eq!(Priority::from_str(s).unwrap(), p);
        }
        assert!(Priority::from_str("bogus").is_err());
    }

    #[test]
    fn status_automaton_allows_documented_transitions() {
        assert!(Status::Pending.can_transition_to(Status::Processing));
        assert!(Status::Pending.can_transition_to(Status::Cancelled));
        assert!(Status::Processing.can_transition_to(Status::Completed));
        assert!(Status::Processing.can_transition_to(Status::Failed));
        assert!(Status::Processing.can_transition_to(Status::Cancelled));
        assert!(Status::Failed.can_transition_to(Status::Pending));
    }

    #[test]
    fn status_automaton_rejects_everything_else() {
        assert!(!Status::Completed.can_transition_to(Status::Pending));
        assert!(!Status::Completed.can_transition_to(Status::Processing));
        assert!(!Status::Cancelled.can_transition_to(Status::Pending));
        assert!(!Status::Pending.can_transition_to(Status::Completed));
        assert!(!Status::Failed.can_transition_to(Status::Completed));
    }

    #[test]
    fn status_is_idempotent_to_itself() {
        for s in [
            Status::Pending,
            Status::Processing,
            Status::Completed,
            Status::Failed,
            Status::Cancelled,
        ] {
            assert!(s.can_transition_to(s));
        }
    }

    #[test]
    fn score_is_monotone_in_priority_then_time() {
        let t = Utc::now();
        let urgent = score_for(Priority::Urgent, t);
        let high = score_for(Priority::High, t);
        let normal = score_for(Priority::Normal, t);
        let low = score_for(Priority::Low, t);
        assert!(urgent < high);
        assert!(high < normal);
        assert!(normal < low);
    }

    #[test]
    fn score_breaks_ties_by_earlier_created_at() {
        let earlier = Utc::now();
        let later = earlier + chrono::Duration::nanoseconds(1_000_000);
        assert!(score_for(Priority::Normal, earlier) < score_for(Priority::Normal, later));
    }

    #[test]
    fn queue_name_matches_normative_format() {
        assert_eq!(queue_name("acme", "golang-expert"), "project:acme:queue:golang-expert");
    }

    #[test]
    fn validate_rejects_empty_fields() {
        let mut req = CreateHandoffRequest {
            project_name: "p".into(),
            from_agent: "a".into(),
            to_agent: "b".into(),
            content: Content {
                summary: "do the thing".into(),
                ..Default::default()
            },
            ..Default::default()
        };
        assert!(req.validate().is_ok());

        req.content.summary.clear();
        assert!(req.validate().is_err());
    }
}
