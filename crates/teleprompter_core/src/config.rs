//! Sync configuration.
//!
//! Every value here has a default matching what the browser views use,
//! so contexts built with `SyncConfig::default()` interoperate. The CLI
//! can override them from its config file.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Names of the four persisted settings entries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageKeys {
    /// Operating mode (`timer` / `autocue` / `combined`), stored as raw text.
    pub mode: String,
    /// Presenter list, JSON array of `{id, name, script}`.
    pub presenters: String,
    /// Display settings, JSON `{speed, fontSize}`.
    pub settings: String,
    /// Timer configuration, JSON `{timerMode, durationMs}`.
    pub timer_config: String,
}

impl Default for StorageKeys {
    fn default() -> Self {
        Self {
            mode: "teleprompterMode".to_string(),
            presenters: "teleprompterPresenters".to_string(),
            settings: "teleprompterSettings".to_string(),
            timer_config: "teleprompterTimerConfig".to_string(),
        }
    }
}

/// Configuration shared by every context taking part in a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Topic name of the broadcast channel.
    pub channel_name: String,

    /// Store key used by the fallback relay.
    pub relay_key: String,

    /// How long a relayed message stays in the store before it is removed.
    pub relay_ttl_ms: u64,

    /// Delay before the control view's first full-state broadcast.
    pub startup_grace_ms: u64,

    /// Persisted settings keys.
    pub keys: StorageKeys,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            channel_name: "teleprompter-sync".to_string(),
            relay_key: "teleprompter-message".to_string(),
            relay_ttl_ms: 100,
            startup_grace_ms: 500,
            keys: StorageKeys::default(),
        }
    }
}

impl SyncConfig {
    /// Relay TTL as a `Duration`.
    pub fn relay_ttl(&self) -> Duration {
        Duration::from_millis(self.relay_ttl_ms)
    }

    /// Startup grace delay as a `Duration`.
    pub fn startup_grace(&self) -> Duration {
        Duration::from_millis(self.startup_grace_ms)
    }

    /// Use a different channel name (and relay key derived from it).
    ///
    /// Lets several independent sessions share one origin.
    pub fn with_channel(mut self, channel_name: &str) -> Self {
        self.channel_name = channel_name.to_string();
        self.relay_key = format!("{}-message", channel_name);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_browser_views() {
        let config = SyncConfig::default();
        assert_eq!(config.channel_name, "teleprompter-sync");
        assert_eq!(config.relay_key, "teleprompter-message");
        assert_eq!(config.relay_ttl(), Duration::from_millis(100));
        assert_eq!(config.startup_grace(), Duration::from_millis(500));
        assert_eq!(config.keys.mode, "teleprompterMode");
        assert_eq!(config.keys.timer_config, "teleprompterTimerConfig");
    }

    #[test]
    fn test_partial_config_fills_defaults() {
        let config: SyncConfig = serde_json::from_str(r#"{"startup_grace_ms": 50}"#).unwrap();
        assert_eq!(config.startup_grace_ms, 50);
        assert_eq!(config.relay_ttl_ms, 100);
        assert_eq!(config.keys, StorageKeys::default());
    }

    #[test]
    fn test_with_channel() {
        let config = SyncConfig::default().with_channel("studio-b");
        assert_eq!(config.channel_name, "studio-b");
        assert_eq!(config.relay_key, "studio-b-message");
    }
}
