//! Configuration loading — TOML file with environment variable overrides.
//!
//! Looks for `ecotrvd.toml` in the working directory. The file is optional,
//! but a daemon without configured devices and with the scanner disabled
//! has nothing to do, so validation rejects that. Validation is pure: it
//! inspects the whole config and reports every broken field at once
//! instead of stopping at the first one.

use serde::Deserialize;

use ecotrv_adapter_ble::{PollingConfig, ScannerConfig};
use ecotrv_domain::identity::{BleAddress, DeviceIdentity, PinCode, SecretKey};

/// Top-level configuration.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Thermostats to poll.
    pub devices: Vec<DeviceConfig>,
    /// Polling defaults, overridable per device.
    pub polling: PollingConfig,
    /// Advertisement scanner settings.
    pub scanner: ScannerConfig,
    /// Logging settings.
    pub logging: LoggingConfig,
}

/// One configured thermostat.
#[derive(Debug, Clone, Deserialize)]
pub struct DeviceConfig {
    /// BLE address (e.g. `"00:04:2F:AA:BB:CC"`).
    pub address: String,
    /// 32-character hex secret key as shown by the vendor app.
    pub secret_key: Option<String>,
    /// Four-digit PIN, when one is set on the device.
    pub pin: Option<String>,
    /// Per-device poll interval override, in seconds.
    pub poll_interval_secs: Option<u16>,
    /// Per-device session timeout override, in seconds.
    pub session_timeout_secs: Option<u16>,
    /// Temperature unit label passed through to the presentation layer.
    pub unit: Option<String>,
}

/// Logging configuration.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter directive (`RUST_LOG` syntax).
    pub filter: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "ecotrvd=info,ecotrv=info".to_string(),
        }
    }
}

/// A device config whose fields all parsed into their domain types.
#[derive(Debug, Clone)]
pub struct ResolvedDevice {
    /// Address, key and PIN as validated domain values.
    pub identity: DeviceIdentity,
    /// Effective polling timings (device override or section default).
    pub polling: PollingConfig,
    /// Temperature unit label for the presentation layer.
    pub unit: String,
}

/// One broken configuration field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldError {
    /// Dotted path of the field (e.g. `devices[0].secret_key`).
    pub field: String,
    /// What is wrong with it.
    pub message: String,
}

impl std::fmt::Display for FieldError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// TOML parse failure.
    #[error("failed to parse config file")]
    Parse(#[from] toml::de::Error),
    /// File I/O failure.
    #[error("failed to read config file")]
    Io(#[from] std::io::Error),
    /// Semantic validation failure; carries every broken field.
    #[error("invalid configuration: {}", format_fields(.0))]
    Validation(Vec<FieldError>),
}

fn format_fields(errors: &[FieldError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

impl Config {
    /// Load configuration from `ecotrvd.toml` (if present), apply
    /// environment-variable overrides and validate.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but is malformed, or if
    /// validation finds broken fields.
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = Self::from_file("ecotrvd.toml")?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    fn from_file(path: &str) -> Result<Self, ConfigError> {
        match std::fs::read_to_string(path) {
            Ok(content) => toml::from_str(&content).map_err(ConfigError::Parse),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(err) => Err(ConfigError::Io(err)),
        }
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("ETRVD_LOG") {
            self.logging.filter = val;
        }
        if let Ok(val) = std::env::var("RUST_LOG") {
            self.logging.filter = val;
        }
        if let Ok(val) = std::env::var("ETRVD_READ_SECRET") {
            self.scanner.read_secret = val == "1" || val.eq_ignore_ascii_case("true");
        }
    }

    /// Check the whole config, collecting every field error.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Validation`] with all broken fields.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut errors = Vec::new();

        if self.devices.is_empty() && !self.scanner.enabled {
            errors.push(FieldError {
                field: "devices".to_string(),
                message: "no devices configured and the scanner is disabled".to_string(),
            });
        }

        for (index, device) in self.devices.iter().enumerate() {
            device.collect_errors(index, &mut errors);

            // a cycle must fit inside its interval with room to spare
            let (interval, timeout) = device.effective_timings(&self.polling);
            if interval > 0 && timeout >= interval {
                errors.push(FieldError {
                    field: format!("devices[{index}].session_timeout_secs"),
                    message: format!(
                        "session timeout ({timeout}s) must be shorter than the poll interval ({interval}s)"
                    ),
                });
            }
        }

        for (index, entry) in self.scanner.allowlist.iter().enumerate() {
            if entry.parse::<BleAddress>().is_err() {
                errors.push(FieldError {
                    field: format!("scanner.allowlist[{index}]"),
                    message: format!("not a BLE address: {entry:?}"),
                });
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Validation(errors))
        }
    }

    /// Parsed identities for all configured devices.
    ///
    /// Call after [`validate`](Self::validate); a config that passed
    /// validation parses cleanly.
    #[must_use]
    pub fn resolved_devices(&self) -> Vec<ResolvedDevice> {
        self.devices
            .iter()
            .filter_map(|device| {
                let identity = device.identity()?;
                let (poll_interval_secs, session_timeout_secs) =
                    device.effective_timings(&self.polling);
                Some(ResolvedDevice {
                    identity,
                    polling: PollingConfig {
                        poll_interval_secs,
                        session_timeout_secs,
                    },
                    unit: device.unit.clone().unwrap_or_else(|| "°C".to_string()),
                })
            })
            .collect()
    }

    /// Scanner allowlist as parsed addresses; entries that fail to parse
    /// are dropped (validation reported them already).
    #[must_use]
    pub fn scanner_allowlist(&self) -> Vec<BleAddress> {
        self.scanner
            .allowlist
            .iter()
            .filter_map(|entry| entry.parse().ok())
            .collect()
    }
}

impl DeviceConfig {
    fn collect_errors(&self, index: usize, errors: &mut Vec<FieldError>) {
        if let Err(err) = self.address.parse::<BleAddress>() {
            errors.push(FieldError {
                field: format!("devices[{index}].address"),
                message: err.to_string(),
            });
        }
        match &self.secret_key {
            Some(key) => {
                if let Err(err) = SecretKey::from_hex(key) {
                    errors.push(FieldError {
                        field: format!("devices[{index}].secret_key"),
                        message: err.to_string(),
                    });
                }
            }
            None => errors.push(FieldError {
                field: format!("devices[{index}].secret_key"),
                message: "polled devices need a secret key".to_string(),
            }),
        }
        if let Some(pin) = &self.pin {
            if let Err(err) = pin.parse::<PinCode>() {
                errors.push(FieldError {
                    field: format!("devices[{index}].pin"),
                    message: err.to_string(),
                });
            }
        }
        if self.poll_interval_secs == Some(0) {
            errors.push(FieldError {
                field: format!("devices[{index}].poll_interval_secs"),
                message: "must be non-zero".to_string(),
            });
        }
        if self.session_timeout_secs == Some(0) {
            errors.push(FieldError {
                field: format!("devices[{index}].session_timeout_secs"),
                message: "must be non-zero".to_string(),
            });
        }
    }

    fn effective_timings(&self, defaults: &PollingConfig) -> (u16, u16) {
        (
            self.poll_interval_secs.unwrap_or(defaults.poll_interval_secs),
            self.session_timeout_secs
                .unwrap_or(defaults.session_timeout_secs),
        )
    }

    fn identity(&self) -> Option<DeviceIdentity> {
        let address = self.address.parse().ok()?;
        let secret_key = self.secret_key.as_deref().map(SecretKey::from_hex)?.ok()?;
        let pin = match &self.pin {
            Some(pin) => Some(pin.parse().ok()?),
            None => None,
        };
        Some(DeviceIdentity::new(address, Some(secret_key), pin))
    }
}
