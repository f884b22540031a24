//! Component C: deterministic, side-effect-free selection of the
//! follow-up agent for a completed handoff (spec.md §4.C). Holds the
//! registered route rules as an in-memory table guarded by a shared
//! lock, per the "global mutable state → scoped holders" design note —
//! `Router` itself performs no I/O and talks to no other component.
use std::collections::HashMap;
use std::sync::RwLock;

use handoff_core::config::RouteRoutes;
use handoff_core::route::{derive_complex_query_fields, rule_matches};
use handoff_core::{Handoff, HandoffError, RouteRule};
use serde_json::Value;
use tracing::{debug, warn};

/// Rule table for a single source agent: ordered rules plus an optional
/// fallback target (spec.md §4.C).
#[derive(Debug, Clone, Default)]
struct AgentRoutes {
    rules: Vec<RouteRule>,
    default_agent: Option<String>,
}

/// Registered route rules for every source agent, evaluated purely
/// (spec.md §4.C: "given the same inputs and rule set, it produces the
/// same answer").
pub struct Router {
    routes: RwLock<HashMap<String, AgentRoutes>>,
    max_hop_count: u32,
}

impl Router {
    pub fn new(max_hop_count: u32) -> Self {
        Self {
            routes: RwLock::new(HashMap::new()),
            max_hop_count,
        }
    }

    /// Builds a router from a parsed rules document, validating every
    /// rule's conditions up front so unknown `complex_query` fields are
    /// rejected at registration time rather than at routing time.
    pub fn from_routes(
        routes: HashMap<String, RouteRoutes>,
        max_hop_count: u32,
    ) -> Result<Self, HandoffError> {
        let router = Self::new(max_hop_count);
        for (source_agent, agent_routes) in routes {
            router.register(&source_agent, agent_routes.rules, agent_routes.default_agent)?;
        }
        Ok(router)
    }

    /// Registers (or replaces) the rule set for `source_agent`. Each rule
    /// is validated before being stored.
    pub fn register(
        &self,
        source_agent: &str,
        mut rules: Vec<RouteRule>,
        default_agent: Option<String>,
    ) -> Result<(), HandoffError> {
        for rule in &rules {
            rule.validate()?;
        }
        // Descending priority, stable for ties (insertion order preserved
        // by a stable sort).
        rules.sort_by(|a, b| b.priority.cmp(&a.priority));

        let mut table = self.routes.write().expect("poisoned router lock");
        table.insert(
            source_agent.to_string(),
            AgentRoutes {
                rules,
                default_agent,
            },
        );
        Ok(())
    }

    /// `Route(source_agent, record) → target_agent`, per spec.md §4.C.
    /// Returns `NoRoute` when nothing matches and no default is configured,
    /// and refuses to route once `handoff.hop_count()` has reached the
    /// configured cap (spec.md §9 cycle-prevention note).
    pub fn route(&self, source_agent: &str, handoff: &Handoff) -> Result<String, HandoffError> {
        if handoff.hop_count() >= self.max_hop_count {
            warn!(
                handoff_id = %handoff.handoff_id,
                hop_count = handoff.hop_count(),
                "refusing to route: hop count cap reached"
            );
            return Err(HandoffError::NoRoute);
        }

        let table = self.routes.read().expect("poisoned router lock");
        let Some(agent_routes) = table.get(source_agent) else {
            return Err(HandoffError::NoRoute);
        };

        let content_fields = content_fields(handoff);
        let metadata_fields = handoff.metadata.clone();
        let complex_query_fields = derive_complex_query_fields(handoff);

        for rule in &agent_routes.rules {
            if rule_matches(rule, &content_fields, &metadata_fields, &complex_query_fields) {
                debug!(rule = %rule.name, target = %rule.target_agent, "route rule matched");
                return Ok(rule.target_agent.clone());
            }
        }

        agent_routes
            .default_agent
            .clone()
            .ok_or(HandoffError::NoRoute)
    }
}

/// Exposes `content.summary` (and any future flat string fields) as the
/// field map `content`-typed conditions read from, per spec.md §4.C.
fn content_fields(handoff: &Handoff) -> HashMap<String, Value> {
    let mut fields = HashMap::new();
    fields.insert(
        "summary".to_string(),
        Value::String(handoff.content.summary.clone()),
    );
    fields
}

#[cfg(test)]
mod tests {
    use super::*;
    use handoff_core::route::{Condition, ConditionType, Operator};

    fn handoff_with_summary(summary: &str) -> Handoff {
        let mut h = handoff_core::test_support::handoff("p", "api-expert", "golang-expert", summary);
        h.task_context = summary.to_string();
        h
    }

    fn contains_rule(name: &str, target: &str, field: &str, value: &str, priority: i64) -> RouteRule {
        RouteRule {
            name: name.to_string(),
            target_agent: target.to_string(),
            priority,
            conditions: vec![Condition {
                condition_type: ConditionType::Content,
                field: field.to_string(),
                operator: Operator::Contains,
                value: Value::String(value.to_string()),
                case_sensitive: false,
            }],
        }
    }

    #[test]
    fn routes_to_matching_rule_target() {
        let router = Router::new(16);
        router
            .register(
                "api-expert",
                vec![contains_rule("impl", "golang-expert", "summary", "implement", 0)],
                None,
            )
            .unwrap();

        let handoff = handoff_with_summary("implement auth");
        assert_eq!(router.route("api-expert", &handoff).unwrap(), "golang-expert");
    }

    #[test]
    fn falls_back_to_default_agent_when_nothing_matches() {
        let router = Router::new(16);
        router
            .register(
                "api-expert",
                vec![contains_rule("impl", "golang-expert", "summary", "implement", 0)],
                Some("reviewer".to_string()),
            )
            .unwrap();

        let handoff = handoff_with_summary("write docs");
        assert_eq!(router.route("api-expert", &handoff).unwrap(), "reviewer");
    }

    #[test]
    fn no_route_without_match_or_default() {
        let router = Router::new(16);
        router
            .register(
                "api-expert",
                vec![contains_rule("impl", "golang-expert", "summary", "implement", 0)],
                None,
            )
            .unwrap();

        let handoff = handoff_with_summary("write docs");
        assert!(matches!(
            router.route("api-expert", &handoff),
            Err(HandoffError::NoRoute)
        ));
    }

    #[test]
    fn unregistered_source_agent_has_no_route() {
        let router = Router::new(16);
        let handoff = handoff_with_summary("implement auth");
        assert!(matches!(
            router.route("unknown-agent", &handoff),
            Err(HandoffError::NoRoute)
        ));
    }

    #[test]
    fn higher_priority_rule_wins_over_lower() {
        let router = Router::new(16);
        router
            .register(
                "api-expert",
                vec![
                    contains_rule("low", "low-prio-target", "summary", "implement", 0),
                    contains_rule("high", "high-prio-target", "summary", "implement", 10),
                ],
                None,
            )
            .unwrap();

        let handoff = handoff_with_summary("implement auth");
        assert_eq!(router.route("api-expert", &handoff).unwrap(), "high-prio-target");
    }

    #[test]
    fn rejects_hop_count_at_cap() {
        let router = Router::new(2);
        router
            .register(
                "api-expert",
                vec![contains_rule("impl", "golang-expert", "summary", "implement", 0)],
                None,
            )
            .unwrap();

        let mut handoff = handoff_with_summary("implement auth");
        handoff
            .metadata
            .insert("hop_count".to_string(), Value::from(2));
        assert!(matches!(
            router.route("api-expert", &handoff),
            Err(HandoffError::NoRoute)
        ));
    }

    #[test]
    fn registration_rejects_unknown_complex_query_field() {
        let router = Router::new(16);
        let bad_rule = RouteRule {
            name: "bad".to_string(),
            target_agent: "x".to_string(),
            priority: 0,
            conditions: vec![Condition {
                condition_type: ConditionType::ComplexQuery,
                field: "not_a_real_field".to_string(),
                operator: Operator::Equals,
                value: Value::Bool(true),
                case_sensitive: false,
            }],
        };
        let result = router.register("api-expert", vec![bad_rule], None);
        assert!(result.is_err());
    }
}
