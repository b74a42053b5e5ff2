use serde::{Deserialize, Serialize};

/// Default size of the read/write counter sampling window.
pub const DEFAULT_COUNTER_WINDOW: u64 = 100_000;

/// Configuration for a [`Storage`](crate::Storage) dispatcher.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Stamp unset entity timestamps from the logical clock on write.
    pub timestamp_enabled: bool,
    /// Once the write counter exceeds this, it resets to 1 and the read
    /// counter to 0.
    pub counter_window: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            timestamp_enabled: false,
            counter_window: DEFAULT_COUNTER_WINDOW,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let c = StorageConfig::default();
        assert!(!c.timestamp_enabled);
        assert_eq!(c.counter_window, 100_000);
    }

    #[test]
    fn partial_toml_uses_defaults() {
        let c: StorageConfig = toml::from_str("timestamp_enabled = true").unwrap();
        assert!(c.timestamp_enabled);
        assert_eq!(c.counter_window, DEFAULT_COUNTER_WINDOW);
    }
}
