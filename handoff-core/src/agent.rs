use serde::{Deserialize, Serialize};

/// Registration record for a target agent. Process-wide, registered at
/// startup, immutable thereafter (spec.md §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentCapabilities {
    pub name: String,
    pub queue_name: String,
    pub max_concurrent: usize,
    #[serde(default)]
    pub triggers: Vec<String>,
    #[serde(default)]
    pub input_types: Vec<String>,
    #[serde(default)]
    pub output_types: Vec<String>,
}

impl AgentCapabilities {
    pub fn validate(&self) -> Result<(), crate::error::HandoffError> {
        if self.name.trim().is_empty() {
            return Err(crate::error::HandoffError::validation(
                "agent name must not be empty",
            ));
        }
        if self.max_concurrent == 0 {
            return Err(crate::error::HandoffError::validation(format!(
                "agent {} max_concurrent must be >= 1",
                self.name
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_zero_concurrency() {
        let caps = AgentCapabilities {
            name: "golang-expert".into(),
            queue_name: "project:p:queue:golang-expert".into(),
            max_concurrent: 0,
            triggers: vec![],
            input_types: vec![],
            output_types: vec![],
        };
        assert!(caps.validate().is_err());
    }
}
