/// Inputs to the composite system-health score (spec.md §4.D).
#[derive(Debug, Clone, Copy, Default)]
pub struct HealthInputs {
    pub queue_depth_total: u64,
    pub failure_rate_pct: f64,
    pub avg_processing_ms: f64,
    pub any_agent_active: bool,
    pub pool_healthy: bool,
    pub pool_usage_pct: f64,
    pub redis_failure_rate_pct: f64,
    pub avg_redis_latency_ms: f64,
}

/// Composite system-health score in `[0, 100]` (spec.md §4.D, normative
/// deduction list). Starts at 100 and subtracts each term in turn.
pub fn composite_health_score(inputs: HealthInputs) -> f64 {
    let mut score = 100.0;
    score -= 0.5 * (inputs.queue_depth_total as f64 - 50.0).max(0.0);
    score -= 2.0 * (inputs.failure_rate_pct - 5.0).max(0.0);
    score -= 0.01 * (inputs.avg_processing_ms - 5000.0).max(0.0);
    if !inputs.any_agent_active {
        score -= 50.0;
    }
    if !inputs.pool_healthy {
        score -= 30.0;
    }
    score -= 0.5 * (inputs.pool_usage_pct - 80.0).max(0.0);
    score -= 5.0 * (inputs.redis_failure_rate_pct - 1.0).max(0.0);
    score -= 0.1 * (inputs.avg_redis_latency_ms - 50.0).max(0.0);
    score.clamp(0.0, 100.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn perfect_system_scores_100() {
        let inputs = HealthInputs {
            queue_depth_total: 0,
            failure_rate_pct: 0.0,
            avg_processing_ms: 0.0,
            any_agent_active: true,
            pool_healthy: true,
            pool_usage_pct: 0.0,
            redis_failure_rate_pct: 0.0,
            avg_redis_latency_ms: 0.0,
            ..Default::default()
        };
        assert_eq!(composite_health_score(inputs), 100.0);
    }

    #[test]
    fn no_agents_active_deducts_fifty() {
        let inputs = HealthInputs {
            any_agent_active: false,
            pool_healthy: true,
            ..Default::default()
        };
        assert_eq!(composite_health_score(inputs), 50.0);
    }

    #[test]
    fn unhealthy_pool_deducts_thirty() {
        let inputs = HealthInputs {
            any_agent_active: true,
            pool_healthy: false,
            ..Default::default()
        };
        assert_eq!(composite_health_score(inputs), 70.0);
    }

    #[test]
    fn score_never_goes_below_zero() {
        let inputs = HealthInputs {
            queue_depth_total: 100_000,
            failure_rate_pct: 100.0,
            avg_processing_ms: 1_000_000.0,
            any_agent_active: false,
            pool_healthy: false,
            pool_usage_pct: 100.0,
            redis_failure_rate_pct: 100.0,
            avg_redis_latency_ms: 100_000.0,
        };
        assert_eq!(composite_health_score(inputs), 0.0);
    }

    #[test]
    fn queue_depth_deduction_only_applies_above_fifty() {
        let below = HealthInputs {
            queue_depth_total: 50,
            any_agent_active: true,
            pool_healthy: true,
            ..Default::default()
        };
        let above = HealthInputs {
            queue_depth_total: 150,
            any_agent_active: true,
            pool_healthy: true,
            ..Default::default()
        };
        assert_eq!(composite_health_score(below), 100.0);
        assert_eq!(composite_health_score(above), 50.0);
    }
}
