use crate::history::MAX_STACK;
use crate::service::Difficulty;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Quiet period after the last edit before an autosave
pub const DEFAULT_DEBOUNCE_MS: u64 = 2000;

/// Fallback autosave interval while the session stays dirty
pub const DEFAULT_AUTOSAVE_INTERVAL_MS: u64 = 10_000;

/// Tunables for a [`Session`](crate::Session)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub debounce_ms: u64,
    pub autosave_interval_ms: u64,
    pub history_capacity: usize,
    pub default_difficulty: Difficulty,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            debounce_ms: DEFAULT_DEBOUNCE_MS,
            autosave_interval_ms: DEFAULT_AUTOSAVE_INTERVAL_MS,
            history_capacity: MAX_STACK,
            default_difficulty: Difficulty::default(),
        }
    }
}

impl SessionConfig {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn autosave_interval(&self) -> Duration {
        Duration::from_millis(self.autosave_interval_ms)
    }

    /// History depth, never below one
    pub fn history_capacity(&self) -> usize {
        self.history_capacity.max(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_defaults() {
        let config = SessionConfig::default();
        assert_eq!(config.debounce(), Duration::from_millis(2000));
        assert_eq!(config.autosave_interval(), Duration::from_secs(10));
        assert_eq!(config.history_capacity(), 100);
        assert_eq!(config.default_difficulty, Difficulty::Medium);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: SessionConfig =
            serde_json::from_str(r#"{"debounce_ms": 500, "default_difficulty": "hard"}"#).unwrap();
        assert_eq!(config.debounce_ms, 500);
        assert_eq!(config.autosave_interval_ms, DEFAULT_AUTOSAVE_INTERVAL_MS);
        assert_eq!(config.default_difficulty, Difficulty::Hard);
    }

    #[test]
    fn test_zero_capacity_is_normalised() {
        let config = SessionConfig {
            history_capacity: 0,
            ..Default::default()
        };
        assert_eq!(config.history_capacity(), 1);
    }
}
