use procura_domain::StoreCapacity;

/// Integration subsystem settings passed to services at construction time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IntegrationConfig {
    /// Failed attempts after which a record is dead-lettered.
    pub max_attempts: u32,
    /// Collection capacity limits.
    pub capacity: StoreCapacity,
    /// Age after which the oldest queued record degrades health.
    pub stale_queue_threshold_seconds: i64,
    /// Simulation flag used when autopilot settings do not set one.
    pub simulation_mode_default: bool,
}

impl Default for IntegrationConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            capacity: StoreCapacity::default(),
            stale_queue_threshold_seconds: 3_600,
            simulation_mode_default: true,
        }
    }
}

impl IntegrationConfig {
    /// Sets the retry budget, at least one attempt.
    #[must_use]
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    /// Sets collection capacity limits.
    #[must_use]
    pub fn with_capacity(mut self, capacity: StoreCapacity) -> Self {
        self.capacity = capacity;
        self
    }
}

#[cfg(test)]
mod tests {
    use procura_domain::StoreCapacity;

    use super::IntegrationConfig;

    #[test]
    fn retry_budget_keeps_at_least_one_attempt() {
        let config = IntegrationConfig::default().with_max_attempts(0);
        assert_eq!(config.max_attempts, 1);
        assert!(config.simulation_mode_default);
        assert_eq!(config.stale_queue_threshold_seconds, 3_600);
    }

    #[test]
    fn capacity_override_replaces_defaults() {
        let capacity = StoreCapacity {
            queue: 10,
            ..StoreCapacity::default()
        };
        let config = IntegrationConfig::default().with_capacity(capacity);
        assert_eq!(config.capacity.queue, 10);
        assert_eq!(config.capacity.history, StoreCapacity::default().history);
    }
}
