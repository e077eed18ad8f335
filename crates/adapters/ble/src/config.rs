//! Radio-facing configuration for the polling and scanning machinery.

use serde::Deserialize;

/// Per-device polling configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PollingConfig {
    /// Interval between poll cycles, in seconds.
    pub poll_interval_secs: u16,
    /// Budget for one full GATT cycle, in seconds.
    pub session_timeout_secs: u16,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: 60,
            session_timeout_secs: 30,
        }
    }
}

/// Advertisement scanner configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ScannerConfig {
    /// Whether the passive scanner runs at all.
    pub enabled: bool,
    /// Whether secret-key announcements are decoded and published.
    pub read_secret: bool,
    /// Length of one scan window, in seconds.
    pub scan_duration_secs: u16,
    /// Pause between scan windows, in seconds.
    pub interval_secs: u16,
    /// Optional address allowlist (e.g. `["00:04:2F:AA:BB:CC"]`).
    ///
    /// When empty, all detected eTRV thermostats are accepted.
    pub allowlist: Vec<String>,
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            read_secret: false,
            scan_duration_secs: 15,
            interval_secs: 60,
            allowlist: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_default_to_one_minute_polling() {
        let config = PollingConfig::default();
        assert_eq!(config.poll_interval_secs, 60);
        assert_eq!(config.session_timeout_secs, 30);
    }

    #[test]
    fn should_deserialize_partial_toml_with_defaults() {
        let config: ScannerConfig = toml::from_str("read_secret = true").unwrap();
        assert!(config.enabled);
        assert!(config.read_secret);
        assert!(config.allowlist.is_empty());
    }
}
