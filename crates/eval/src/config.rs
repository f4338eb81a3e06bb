use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Engine-wide settings for a local run.
///
/// Every field has a default, so a partial TOML table (or none at all) is
/// a valid configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Step guard for every machine walk (top-level and nested).
    pub max_steps: usize,
    /// Upper bound on a single Wait state's sleep.
    pub max_wait_ms: u64,
    /// Upper bound on a single retry back-off sleep.
    pub max_retry_delay_ms: u64,
    /// Concurrency cap for Map states that set no `MaxConcurrency`.
    pub map_concurrency: usize,
    pub execution_name: String,
    pub state_machine_name: String,
    /// RFC 3339 start time reported in the context object.
    pub start_time: String,
    /// Seed for `States.MathRandom` / `$random` when none is given.
    pub random_seed: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            max_steps: 1000,
            max_wait_ms: 10,
            max_retry_delay_ms: 0,
            map_concurrency: 40,
            execution_name: "local-execution".to_string(),
            state_machine_name: "local-state-machine".to_string(),
            start_time: "2024-01-01T00:00:00Z".to_string(),
            random_seed: 0,
        }
    }
}

impl EngineConfig {
    pub fn max_wait(&self) -> Duration {
        Duration::from_millis(self.max_wait_ms)
    }

    pub fn max_retry_delay(&self) -> Duration {
        Duration::from_millis(self.max_retry_delay_ms)
    }
}

/// Per-call options for [`crate::StateMachineExecutor::execute`].
#[derive(Debug, Clone, Default)]
pub struct ExecuteOptions {
    /// Overrides [`EngineConfig::max_steps`].
    pub max_steps: Option<usize>,
    /// Include per-state traces in the result.
    pub verbose: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_config_fills_defaults() {
        let cfg: EngineConfig = serde_json::from_value(serde_json::json!({"max_steps": 5})).unwrap();
        assert_eq!(cfg.max_steps, 5);
        assert_eq!(cfg.max_wait(), Duration::from_millis(10));
        assert_eq!(cfg.map_concurrency, 40);
    }
}
