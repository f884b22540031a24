use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum AlertType {
    QueueDepth,
    ProcessingTime,
    FailureRate,
    AgentHealth,
    SystemHealth,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AlertCondition {
    #[serde(rename = ">")]
    GreaterThan,
    #[serde(rename = "<")]
    LessThan,
    #[serde(rename = "=")]
    Equal,
    #[serde(rename = ">=")]
    GreaterOrEqual,
    #[serde(rename = "<=")]
    LessOrEqual,
}

impl AlertCondition {
    pub fn evaluate(self, value: f64, threshold: f64) -> bool {
        match self {
            AlertCondition::GreaterThan => value > threshold,
            AlertCondition::LessThan => value < threshold,
            AlertCondition::Equal => (value - threshold).abs() < f64::EPSILON,
            AlertCondition::GreaterOrEqual => value >= threshold,
            AlertCondition::LessOrEqual => value <= threshold,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Error,
    Critical,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertRule {
    pub name: String,
    #[serde(rename = "type")]
    pub alert_type: AlertType,
    pub condition: AlertCondition,
    pub threshold: f64,
    /// Minimum sustained breach duration, in seconds.
    #[serde(default)]
    pub duration_secs: u64,
    /// Minimum time between repeated firings, in seconds.
    pub cooldown_secs: u64,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default, skip_serializing)]
    pub last_fired: Option<DateTime<Utc>>,
    /// When the rule's condition started breaching continuously, reset to
    /// `None` the moment a tick observes it no longer breaching. Runtime-only
    /// bookkeeping for `duration_secs`, never loaded from the rules document.
    #[serde(default, skip_serializing)]
    pub breach_since: Option<DateTime<Utc>>,
}

fn default_enabled() -> bool {
    true
}

impl AlertRule {
    pub fn is_in_cooldown(&self, now: DateTime<Utc>) -> bool {
        match self.last_fired {
            Some(last) => (now - last).num_seconds() < self.cooldown_secs as i64,
            None => false,
        }
    }

    /// Folds one tick's breach observation into the rule's state and
    /// reports whether it should fire this tick. The condition must be
    /// breaching, sustained for at least `duration_secs`, and outside its
    /// cooldown window (spec.md §3 / §4.D / §8 scenario 6).
    pub fn observe(&mut self, breaching: bool, now: DateTime<Utc>) -> bool {
        if !breaching {
            self.breach_since = None;
            return false;
        }

        let since = *self.breach_since.get_or_insert(now);
        let sustained_secs = (now - since).num_seconds().max(0) as u64;
        if sustained_secs < self.duration_secs || self.is_in_cooldown(now) {
            return false;
        }

        self.last_fired = Some(now);
        true
    }

    /// Severity calibration from spec.md §8: `queue_depth` uses ratio
    /// thresholds (1.5x/2x/3x); `failure_rate` and `system_health` use
    /// absolute value thresholds; everything else falls back to the
    /// queue_depth-style ratio scheme.
    pub fn severity_for(self_type: AlertType, value: f64, threshold: f64) -> Severity {
        match self_type {
            AlertType::FailureRate => {
                if value >= 50.0 {
                    Severity::Critical
                } else if value >= 25.0 {
                    Severity::Error
                } else if value >= 10.0 {
                    Severity::Warning
                } else {
                    Severity::Info
                }
            }
            AlertType::SystemHealth => {
                if value <= 25.0 {
                    Severity::Critical
                } else if value <= 50.0 {
                    Severity::Error
                } else if value <= 75.0 {
                    Severity::Warning
                } else {
                    Severity::Info
                }
            }
            _ => {
                if threshold <= 0.0 {
                    return Severity::Info;
                }
                let ratio = value / threshold;
                if ratio >= 3.0 {
                    Severity::Critical
                } else if ratio >= 2.0 {
                    Severity::Error
                } else if ratio >= 1.5 {
                    Severity::Warning
                } else {
                    Severity::Info
                }
            }
        }
    }
}

/// An alert event produced when a rule fires, delivered to subscribers of
/// its `AlertType` and to wildcard `all` subscribers (spec.md §4.D).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertEvent {
    pub rule_name: String,
    pub alert_type: AlertType,
    pub severity: Severity,
    pub value: f64,
    pub threshold: f64,
    pub fired_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn queue_depth_severity_thresholds() {
        assert_eq!(
            AlertRule::severity_for(AlertType::QueueDepth, 74.0, 50.0),
            Severity::Warning
        );
        assert_eq!(
            AlertRule::severity_for(AlertType::QueueDepth, 100.0, 50.0),
            Severity::Error
        );
        assert_eq!(
            AlertRule::severity_for(AlertType::QueueDepth, 150.0, 50.0),
            Severity::Critical
        );
        assert_eq!(
            AlertRule::severity_for(AlertType::QueueDepth, 60.0, 50.0),
            Severity::Info
        );
    }

    #[test]
    fn failure_rate_severity_thresholds() {
        assert_eq!(
            AlertRule::severity_for(AlertType::FailureRate, 9.0, 5.0),
            Severity::Info
        );
        assert_eq!(
            AlertRule::severity_for(AlertType::FailureRate, 10.0, 5.0),
            Severity::Warning
        );
        assert_eq!(
            AlertRule::severity_for(AlertType::FailureRate, 25.0, 5.0),
            Severity::Error
        );
        assert_eq!(
            AlertRule::severity_for(AlertType::FailureRate, 50.0, 5.0),
            Severity::Critical
        );
    }

    #[test]
    fn system_health_severity_thresholds() {
        assert_eq!(
            AlertRule::severity_for(AlertType::SystemHealth, 80.0, 0.0),
            Severity::Info
        );
        assert_eq!(
            AlertRule::severity_for(AlertType::SystemHealth, 75.0, 0.0),
            Severity::Warning
        );
        assert_eq!(
            AlertRule::severity_for(AlertType::SystemHealth, 50.0, 0.0),
            Severity::Error
        );
        assert_eq!(
            AlertRule::severity_for(AlertType::SystemHealth, 25.0, 0.0),
            Severity::Critical
        );
    }

    #[test]
    fn cooldown_blocks_repeated_firing() {
        let mut rule = AlertRule {
            name: "depth".into(),
            alert_type: AlertType::QueueDepth,
            condition: AlertCondition::GreaterThan,
            threshold: 50.0,
            duration_secs: 0,
            cooldown_secs: 60,
            enabled: true,
            last_fired: None,
            breach_since: None,
        };
        let now = Utc::now();
        assert!(!rule.is_in_cooldown(now));
        rule.last_fired = Some(now);
        assert!(rule.is_in_cooldown(now + chrono::Duration::seconds(30)));
        assert!(!rule.is_in_cooldown(now + chrono::Duration::seconds(61)));
    }

    #[test]
    fn observe_requires_breach_sustained_for_duration() {
        let mut rule = AlertRule {
            name: "depth".into(),
            alert_type: AlertType::QueueDepth,
            condition: AlertCondition::GreaterThan,
            threshold: 50.0,
            duration_secs: 60,
            cooldown_secs: 60,
            enabled: true,
            last_fired: None,
            breach_since: None,
        };
        let t0 = Utc::now();
        assert!(!rule.observe(true, t0));
        assert!(!rule.observe(true, t0 + chrono::Duration::seconds(30)));
        assert!(rule.observe(true, t0 + chrono::Duration::seconds(61)));
    }

    #[test]
    fn observe_resets_sustained_window_once_breach_clears() {
        let mut rule = AlertRule {
            name: "depth".into(),
            alert_type: AlertType::QueueDepth,
            condition: AlertCondition::GreaterThan,
            threshold: 50.0,
            duration_secs: 60,
            cooldown_secs: 60,
            enabled: true,
            last_fired: None,
            breach_since: None,
        };
        let t0 = Utc::now();
        assert!(!rule.observe(true, t0));
        assert!(!rule.observe(false, t0 + chrono::Duration::seconds(30)));
        // Breach restarts, so 61s after the first sample is not yet 60s
        // sustained from the (reset) second sample.
        assert!(!rule.observe(true, t0 + chrono::Duration::seconds(61)));
        assert!(rule.observe(true, t0 + chrono::Duration::seconds(92)));
    }
}
