use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::HandoffError;
use crate::handoff::Handoff;

/// The fixed, documented set of `complex_query` fields this implementation
/// derives for a handoff (spec.md §9 Open Question, resolved in
/// SPEC_FULL.md §4.C). A rule referencing any other `complex_query` field
/// is rejected at registration time.
pub const COMPLEX_QUERY_FIELDS: [&str; 3] =
    ["has_go_files", "is_implementation_handoff", "hop_count"];

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ConditionType {
    Content,
    Metadata,
    ComplexQuery,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Operator {
    Equals,
    Contains,
    Matches,
    GreaterThan,
    LessThan,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Condition {
    #[serde(rename = "type")]
    pub condition_type: ConditionType,
    pub field: String,
    pub operator: Operator,
    pub value: Value,
    #[serde(default)]
    pub case_sensitive: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouteRule {
    pub name: String,
    pub target_agent: String,
    #[serde(default)]
    pub priority: i64,
    pub conditions: Vec<Condition>,
}

impl RouteRule {
    /// Rejects rules that reference an undefined `complex_query` field,
    /// per the resolved Open Question in SPEC_FULL.md §4.C.
    pub fn validate(&self) -> Result<(), HandoffError> {
        if self.name.trim().is_empty() {
            return Err(HandoffError::validation("route rule name must not be empty"));
        }
        for condition in &self.conditions {
            if condition.condition_type == ConditionType::ComplexQuery
                && !COMPLEX_QUERY_FIELDS.contains(&condition.field.as_str())
            {
                return Err(HandoffError::validation(format!(
                    "rule {} references unknown complex_query field {}",
                    self.name, condition.field
                )));
            }
        }
        Ok(())
    }
}

/// Derived fields a Dispatcher computes before calling `Router::route`,
/// backing `complex_query` conditions (SPEC_FULL.md §4.C).
pub fn derive_complex_query_fields(handoff: &Handoff) -> HashMap<String, Value> {
    let has_go_files = handoff
        .content
        .artifacts
        .values()
        .flatten()
        .any(|path| path.ends_with(".go"));

    let task_context_lower = handoff.task_context.to_lowercase();
    let is_implementation_handoff =
        task_context_lower.contains("implementation") || task_context_lower.contains("impl");

    let mut fields = HashMap::new();
    fields.insert("has_go_files".to_string(), Value::Bool(has_go_files));
    fields.insert(
        "is_implementation_handoff".to_string(),
        Value::Bool(is_implementation_handoff),
    );
    fields.insert(
        "hop_count".to_string(),
        Value::from(handoff.hop_count()),
    );
    fields
}

fn string_of(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn as_f64(value: &Value) -> Option<f64> {
    if let Some(n) = value.as_f64() {
        return Some(n);
    }
    string_of(value).parse::<f64>().ok()
}

fn compare_strings(lhs: &str, rhs: &str, case_sensitive: bool, op: Operator) -> bool {
    let (lhs, rhs) = if case_sensitive {
        (lhs.to_string(), rhs.to_string())
    } else {
        (lhs.to_lowercase(), rhs.to_lowercase())
    };
    match op {
        Operator::Equals => lhs == rhs,
        Operator::Contains => lhs.contains(&rhs),
        Operator::Matches => regex::Regex::new(&rhs)
            .map(|re| re.is_match(&lhs))
            .unwrap_or(false),
        Operator::GreaterThan | Operator::LessThan => false,
    }
}

/// Evaluate a single condition against the field map supplied for its
/// `condition_type` (content fields, metadata fields, or the derived
/// complex-query map). `case_sensitive` defaults to false for string
/// operators (spec.md §4.C).
pub fn evaluate_condition(condition: &Condition, fields: &HashMap<String, Value>) -> bool {
    let Some(actual) = fields.get(&condition.field) else {
        return false;
    };

    match condition.operator {
        Operator::GreaterThan | Operator::LessThan => {
            let (Some(lhs), Some(rhs)) = (as_f64(actual), as_f64(&condition.value)) else {
                return false;
            };
            if condition.operator == Operator::GreaterThan {
                lhs > rhs
            } else {
                lhs < rhs
            }
        }
        _ => compare_strings(
            &string_of(actual),
            &string_of(&condition.value),
            condition.case_sensitive,
            condition.operator,
        ),
    }
}

/// A rule matches when every one of its conditions evaluates true
/// (spec.md §4.C). `content_fields` and `metadata_fields` are read from the
/// handoff's `content`/`metadata` maps by the caller; `complex_query_fields`
/// is the output of `derive_complex_query_fields`.
pub fn rule_matches(
    rule: &RouteRule,
    content_fields: &HashMap<String, Value>,
    metadata_fields: &HashMap<String, Value>,
    complex_query_fields: &HashMap<String, Value>,
) -> bool {
    rule.conditions.iter().all(|condition| {
        let fields = match condition.condition_type {
            ConditionType::Content => content_fields,
            ConditionType::Metadata => metadata_fields,
            ConditionType::ComplexQuery => complex_query_fields,
        };
        evaluate_condition(condition, fields)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn condition(field: &str, operator: Operator, value: Value) -> Condition {
        Condition {
            condition_type: ConditionType::Content,
            field: field.to_string(),
            operator,
            value,
            case_sensitive: false,
        }
    }

    #[test]
    fn contains_is_case_insensitive_by_default() {
        let cond = condition("summary", Operator::Contains, Value::String("IMPLEMENT".into()));
        let mut fields = HashMap::new();
        fields.insert("summary".to_string(), Value::String("implement auth".into()));
        assert!(evaluate_condition(&cond, &fields));
    }

    #[test]
    fn contains_respects_case_sensitive_flag() {
        let mut cond = condition("summary", Operator::Contains, Value::String("IMPLEMENT".into()));
        cond.case_sensitive = true;
        let mut fields = HashMap::new();
        fields.insert("summary".to_string(), Value::String("implement auth".into()));
        assert!(!evaluate_condition(&cond, &fields));
    }

    #[test]
    fn missing_field_never_matches() {
        let cond = condition("summary", Operator::Equals, Value::String("x".into()));
        let fields = HashMap::new();
        assert!(!evaluate_condition(&cond, &fields));
    }

    #[test]
    fn greater_than_compares_numerically() {
        let cond = condition("score", Operator::GreaterThan, Value::from(5));
        let mut fields = HashMap::new();
        fields.insert("score".to_string(), Value::from(10));
        assert!(evaluate_condition(&cond, &fields));

        fields.insert("score".to_string(), Value::from(1));
        assert!(!evaluate_condition(&cond, &fields));
    }

    #[test]
    fn rule_requires_all_conditions() {
        let rule = RouteRule {
            name: "to-golang".into(),
            target_agent: "golang-expert".into(),
            priority: 10,
            conditions: vec![
                condition("summary", Operator::Contains, Value::String("implement".into())),
                condition("summary", Operator::Contains, Value::String("auth".into())),
            ],
        };
        let mut content = HashMap::new();
        content.insert("summary".to_string(), Value::String("implement auth".into()));
        assert!(rule_matches(&rule, &content, &HashMap::new(), &HashMap::new()));

        content.insert("summary".to_string(), Value::String("implement billing".into()));
        assert!(!rule_matches(&rule, &content, &HashMap::new(), &HashMap::new()));
    }

    #[test]
    fn validate_rejects_unknown_complex_query_field() {
        let rule = RouteRule {
            name: "bogus".into(),
            target_agent: "x".into(),
            priority: 0,
            conditions: vec![Condition {
                condition_type: ConditionType::ComplexQuery,
                field: "has_rust_files".into(),
                operator: Operator::Equals,
                value: Value::Bool(true),
                case_sensitive: false,
            }],
        };
        assert!(rule.validate().is_err());
    }

    #[test]
    fn derive_complex_query_fields_detects_go_files() {
        let mut handoff = sample_handoff();
        handoff
            .content
            .artifacts
            .insert("created".into(), vec!["main.go".into()]);
        let fields = derive_complex_query_fields(&handoff);
        assert_eq!(fields.get("has_go_files"), Some(&Value::Bool(true)));
    }

    #[test]
    fn derive_complex_query_fields_detects_implementation_context() {
        let mut handoff = sample_handoff();
        handoff.task_context = "Implementation of auth".into();
        let fields = derive_complex_query_fields(&handoff);
        assert_eq!(
            fields.get("is_implementation_handoff"),
            Some(&Value::Bool(true))
        );
    }

    fn sample_handoff() -> Handoff {
        use crate::handoff::{Content, Priority, Status};
        Handoff {
            handoff_id: uuid::Uuid::now_v7(),
            project_name: "p".into(),
            from_agent: "api-expert".into(),
            to_agent: "golang-expert".into(),
            created_at: chrono::Utc::now(),
            updated_at: chrono::Utc::now(),
            task_context: String::new(),
            priority: Priority::Normal,
            status: Status::Completed,
            content: Content::default(),
            metadata: HashMap::new(),
        }
    }
}
