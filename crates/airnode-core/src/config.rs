//! Persisted device configuration
//!
//! The configuration is split in two groups, mirroring how the provisioning
//! portal presents it: [`SystemConfig`] (identity and Wi-Fi credentials) and
//! [`DeviceConfig`] (broker and sampling settings). Both are stored together as
//! one [`PersistedConfig`] blob: a format version byte followed by the postcard
//! encoding.
//!
//! Bounds are enforced here, before the rest of the core ever sees a value.

use alloc::vec::Vec;
use core::ops::RangeInclusive;

use log::warn;
use serde::{Deserialize, Serialize};
use thiserror_no_std::Error;

/// Bumping this discards every stored configuration on the next boot.
pub const CONFIG_VERSION: u8 = 1;

/// Maximum length of free-text settings (broker address, topic prefix).
pub const STRING_LEN: usize = 128;
pub const THING_NAME_LEN: usize = 32;
pub const SSID_LEN: usize = 32;
pub const PASSWORD_LEN: usize = 64;

pub const DEFAULT_BROKER_ADDRESS: &str = "192.168.0.1";
pub const DEFAULT_BROKER_PORT: u16 = 1883;
pub const DEFAULT_POLL_INTERVAL_SECS: u16 = 1;
pub const DEFAULT_TOPIC_PREFIX: &str = "sensor1";
pub const DEFAULT_THING_NAME: &str = "TempSensor";

pub const BROKER_PORT_RANGE: RangeInclusive<u16> = 1..=32767;
pub const POLL_INTERVAL_RANGE: RangeInclusive<u16> = 1..=9999;

pub type ConfigString = heapless::String<STRING_LEN>;

/// HTML form field names, shared by the form renderer and the form parser.
pub mod fields {
    pub const BROKER_ADDRESS: &str = "brokerAddress";
    pub const BROKER_PORT: &str = "brokerPort";
    pub const POLL_INTERVAL: &str = "pollIntervalSeconds";
    pub const TOPIC_PREFIX: &str = "topicPrefix";
    pub const THING_NAME: &str = "thingName";
    pub const AP_PASSWORD: &str = "apPassword";
    pub const WIFI_SSID: &str = "wifiSsid";
    pub const WIFI_PASSWORD: &str = "wifiPassword";
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{field} exceeds {max} characters")]
    TooLong { field: &'static str, max: usize },
    #[error("{field} must not be empty")]
    Empty { field: &'static str },
    #[error("{field} is not a number")]
    NotANumber { field: &'static str },
    #[error("{field} must be within {min}..={max}")]
    OutOfRange {
        field: &'static str,
        min: u16,
        max: u16,
    },
    #[error("stored config version {found} does not match {expected}")]
    VersionMismatch { found: u8, expected: u8 },
    #[error("config blob is empty")]
    EmptyBlob,
    #[error("config blob could not be decoded")]
    Decode,
    #[error("config could not be encoded")]
    Encode,
}

/// Broker and sampling settings.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct DeviceConfig {
    pub broker_address: ConfigString,
    pub broker_port: u16,
    pub poll_interval_secs: u16,
    pub topic_prefix: ConfigString,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            broker_address: bounded_const(DEFAULT_BROKER_ADDRESS),
            broker_port: DEFAULT_BROKER_PORT,
            poll_interval_secs: DEFAULT_POLL_INTERVAL_SECS,
            topic_prefix: bounded_const(DEFAULT_TOPIC_PREFIX),
        }
    }
}

impl DeviceConfig {
    /// Check every field against its declared bounds.
    pub fn validate(&self) -> Result<(), ConfigError> {
        non_empty(fields::BROKER_ADDRESS, &self.broker_address)?;
        non_empty(fields::TOPIC_PREFIX, &self.topic_prefix)?;
        in_range(fields::BROKER_PORT, self.broker_port, &BROKER_PORT_RANGE)?;
        in_range(
            fields::POLL_INTERVAL,
            self.poll_interval_secs,
            &POLL_INTERVAL_RANGE,
        )?;
        Ok(())
    }

    /// Sampling interval in milliseconds, as latched into the scheduler at boot.
    pub const fn poll_interval_ms(&self) -> u64 {
        self.poll_interval_secs as u64 * 1000
    }
}

/// Provisioning identity and network credentials.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct SystemConfig {
    /// Device name; also the broker client identifier.
    pub thing_name: heapless::String<THING_NAME_LEN>,
    /// Password of the configuration access point. Empty means an open AP.
    pub ap_password: heapless::String<PASSWORD_LEN>,
    pub wifi_ssid: heapless::String<SSID_LEN>,
    pub wifi_password: heapless::String<PASSWORD_LEN>,
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            thing_name: bounded_const(DEFAULT_THING_NAME),
            ap_password: heapless::String::new(),
            wifi_ssid: heapless::String::new(),
            wifi_password: heapless::String::new(),
        }
    }
}

impl SystemConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        non_empty(fields::THING_NAME, &self.thing_name)
    }

    /// Station credentials are only usable once an SSID has been entered.
    pub fn has_wifi_credentials(&self) -> bool {
        !self.wifi_ssid.is_empty()
    }
}

/// Everything that survives a restart.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Default)]
pub struct PersistedConfig {
    pub system: SystemConfig,
    pub device: DeviceConfig,
}

impl PersistedConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.system.validate()?;
        self.device.validate()
    }

    /// Encode as `[CONFIG_VERSION, postcard bytes...]`.
    pub fn to_blob(&self) -> Result<Vec<u8>, ConfigError> {
        let body = postcard::to_allocvec(self).map_err(|_| ConfigError::Encode)?;
        let mut blob = Vec::with_capacity(body.len() + 1);
        blob.push(CONFIG_VERSION);
        blob.extend_from_slice(&body);
        Ok(blob)
    }

    /// Decode a blob written by [`PersistedConfig::to_blob`].
    ///
    /// Blobs from another format version, undecodable blobs and blobs holding
    /// out-of-range values are all rejected.
    pub fn from_blob(blob: &[u8]) -> Result<Self, ConfigError> {
        let (&version, body) = blob.split_first().ok_or(ConfigError::EmptyBlob)?;
        if version != CONFIG_VERSION {
            return Err(ConfigError::VersionMismatch {
                found: version,
                expected: CONFIG_VERSION,
            });
        }

        let config: Self = postcard::from_bytes(body).map_err(|_| ConfigError::Decode)?;
        config.validate()?;
        Ok(config)
    }

    /// Apply one submitted form field.
    ///
    /// Unknown fields are ignored. An empty password keeps the stored one, so
    /// the form never has to echo secrets back to the browser.
    pub fn apply_field(&mut self, name: &str, value: &str) -> Result<(), ConfigError> {
        match name {
            fields::BROKER_ADDRESS => {
                self.device.broker_address = non_empty_bounded(fields::BROKER_ADDRESS, value)?;
            }
            fields::BROKER_PORT => {
                self.device.broker_port =
                    parse_in_range(fields::BROKER_PORT, value, &BROKER_PORT_RANGE)?;
            }
            fields::POLL_INTERVAL => {
                self.device.poll_interval_secs =
                    parse_in_range(fields::POLL_INTERVAL, value, &POLL_INTERVAL_RANGE)?;
            }
            fields::TOPIC_PREFIX => {
                self.device.topic_prefix = non_empty_bounded(fields::TOPIC_PREFIX, value)?;
            }
            fields::THING_NAME => {
                self.system.thing_name = non_empty_bounded(fields::THING_NAME, value)?;
            }
            fields::WIFI_SSID => {
                self.system.wifi_ssid = bounded(fields::WIFI_SSID, value)?;
            }
            fields::AP_PASSWORD if !value.is_empty() => {
                self.system.ap_password = bounded(fields::AP_PASSWORD, value)?;
            }
            fields::WIFI_PASSWORD if !value.is_empty() => {
                self.system.wifi_password = bounded(fields::WIFI_PASSWORD, value)?;
            }
            _ => {}
        }
        Ok(())
    }
}

/// Persistent storage for the configuration blob.
///
/// The node is the only writer; web handlers submit new configurations to it
/// instead of saving directly.
pub trait ConfigStore {
    type Error: core::fmt::Debug;

    fn load(&mut self) -> Result<PersistedConfig, Self::Error>;

    fn save(&mut self, config: &PersistedConfig) -> Result<(), Self::Error>;
}

/// Load the stored configuration, falling back to defaults when nothing
/// usable is stored. Storage is left untouched until the operator saves.
pub fn load_or_default<C: ConfigStore>(store: &mut C) -> PersistedConfig {
    match store.load() {
        Ok(config) => config,
        Err(e) => {
            warn!("config: stored configuration unusable ({:?}), using defaults", e);
            PersistedConfig::default()
        }
    }
}

/// RAM-backed store holding the encoded blob, for the simulator and tests.
#[derive(Debug, Default, Clone)]
pub struct MemoryConfigStore {
    blob: Option<Vec<u8>>,
    saves: usize,
}

impl MemoryConfigStore {
    pub const fn new() -> Self {
        Self {
            blob: None,
            saves: 0,
        }
    }

    /// Start with raw bytes already "on disk".
    pub fn with_blob(blob: Vec<u8>) -> Self {
        Self {
            blob: Some(blob),
            saves: 0,
        }
    }

    pub fn blob(&self) -> Option<&[u8]> {
        self.blob.as_deref()
    }

    /// Number of successful saves since creation.
    pub fn saves(&self) -> usize {
        self.saves
    }
}

impl ConfigStore for MemoryConfigStore {
    type Error = ConfigError;

    fn load(&mut self) -> Result<PersistedConfig, ConfigError> {
        let blob = self.blob.as_deref().ok_or(ConfigError::EmptyBlob)?;
        PersistedConfig::from_blob(blob)
    }

    fn save(&mut self, config: &PersistedConfig) -> Result<(), ConfigError> {
        self.blob = Some(config.to_blob()?);
        self.saves += 1;
        Ok(())
    }
}

fn bounded<const N: usize>(
    field: &'static str,
    value: &str,
) -> Result<heapless::String<N>, ConfigError> {
    let mut s = heapless::String::new();
    s.push_str(value)
        .map_err(|_| ConfigError::TooLong { field, max: N })?;
    Ok(s)
}

fn non_empty_bounded<const N: usize>(
    field: &'static str,
    value: &str,
) -> Result<heapless::String<N>, ConfigError> {
    non_empty(field, value)?;
    bounded(field, value)
}

/// Defaults are compile-time constants that always fit.
fn bounded_const<const N: usize>(value: &str) -> heapless::String<N> {
    let mut s = heapless::String::new();
    let _ = s.push_str(value);
    s
}

fn non_empty(field: &'static str, value: &str) -> Result<(), ConfigError> {
    if value.trim().is_empty() {
        Err(ConfigError::Empty { field })
    } else {
        Ok(())
    }
}

fn in_range(
    field: &'static str,
    value: u16,
    range: &RangeInclusive<u16>,
) -> Result<(), ConfigError> {
    if range.contains(&value) {
        Ok(())
    } else {
        Err(ConfigError::OutOfRange {
            field,
            min: *range.start(),
            max: *range.end(),
        })
    }
}

fn parse_in_range(
    field: &'static str,
    value: &str,
    range: &RangeInclusive<u16>,
) -> Result<u16, ConfigError> {
    let parsed: u32 = value
        .trim()
        .parse()
        .map_err(|_| ConfigError::NotANumber { field })?;
    let parsed = u16::try_from(parsed).map_err(|_| ConfigError::OutOfRange {
        field,
        min: *range.start(),
        max: *range.end(),
    })?;
    in_range(field, parsed, range)?;
    Ok(parsed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = PersistedConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.device.broker_address.as_str(), "192.168.0.1");
        assert_eq!(config.device.broker_port, 1883);
        assert_eq!(config.device.poll_interval_secs, 1);
        assert_eq!(config.device.topic_prefix.as_str(), "sensor1");
        assert_eq!(config.system.thing_name.as_str(), "TempSensor");
        assert!(!config.system.has_wifi_credentials());
    }

    #[test]
    fn test_poll_interval_ms() {
        let mut config = DeviceConfig::default();
        config.poll_interval_secs = 60;
        assert_eq!(config.poll_interval_ms(), 60_000);
    }

    #[test]
    fn test_blob_restores_saved_values() {
        let mut config = PersistedConfig::default();
        config.apply_field(fields::TOPIC_PREFIX, "attic").unwrap();
        config.apply_field(fields::BROKER_PORT, "8883").unwrap();

        let blob = config.to_blob().unwrap();
        assert_eq!(blob[0], CONFIG_VERSION);
        assert_eq!(PersistedConfig::from_blob(&blob).unwrap(), config);
    }

    #[test]
    fn test_blob_version_mismatch_rejected() {
        let mut blob = PersistedConfig::default().to_blob().unwrap();
        blob[0] = CONFIG_VERSION.wrapping_add(1);
        assert_eq!(
            PersistedConfig::from_blob(&blob),
            Err(ConfigError::VersionMismatch {
                found: CONFIG_VERSION.wrapping_add(1),
                expected: CONFIG_VERSION,
            })
        );
    }

    #[test]
    fn test_blob_garbage_rejected() {
        assert_eq!(PersistedConfig::from_blob(&[]), Err(ConfigError::EmptyBlob));
        assert_eq!(
            PersistedConfig::from_blob(&[CONFIG_VERSION, 0xff, 0xff]),
            Err(ConfigError::Decode)
        );
    }

    #[test]
    fn test_blob_with_out_of_range_port_rejected() {
        let mut config = PersistedConfig::default();
        config.device.broker_port = 40000;
        let blob = config.to_blob().unwrap();
        assert!(matches!(
            PersistedConfig::from_blob(&blob),
            Err(ConfigError::OutOfRange { field: fields::BROKER_PORT, .. })
        ));
    }

    #[test]
    fn test_apply_field_bounds() {
        let mut config = PersistedConfig::default();

        assert!(config.apply_field(fields::BROKER_PORT, "0").is_err());
        assert!(config.apply_field(fields::BROKER_PORT, "32768").is_err());
        assert!(config.apply_field(fields::BROKER_PORT, "70000").is_err());
        assert_eq!(
            config.apply_field(fields::BROKER_PORT, "port"),
            Err(ConfigError::NotANumber {
                field: fields::BROKER_PORT
            })
        );
        assert!(config.apply_field(fields::POLL_INTERVAL, "10000").is_err());
        assert!(config.apply_field(fields::POLL_INTERVAL, "9999").is_ok());
        assert!(config.apply_field(fields::TOPIC_PREFIX, "  ").is_err());

        let too_long = "x".repeat(STRING_LEN + 1);
        assert_eq!(
            config.apply_field(fields::BROKER_ADDRESS, &too_long),
            Err(ConfigError::TooLong {
                field: fields::BROKER_ADDRESS,
                max: STRING_LEN
            })
        );
        let exact = "x".repeat(STRING_LEN);
        assert!(config.apply_field(fields::BROKER_ADDRESS, &exact).is_ok());

        // Rejected values never overwrite the previous ones.
        assert_eq!(config.device.broker_port, DEFAULT_BROKER_PORT);
        assert_eq!(config.device.poll_interval_secs, 9999);
    }

    #[test]
    fn test_empty_password_keeps_stored_one() {
        let mut config = PersistedConfig::default();
        config.apply_field(fields::WIFI_PASSWORD, "hunter22").unwrap();
        config.apply_field(fields::WIFI_PASSWORD, "").unwrap();
        assert_eq!(config.system.wifi_password.as_str(), "hunter22");
    }

    #[test]
    fn test_unknown_field_ignored() {
        let mut config = PersistedConfig::default();
        assert!(config.apply_field("iotSave", "1").is_ok());
        assert_eq!(config, PersistedConfig::default());
    }

    #[test]
    fn test_load_or_default_falls_back() {
        let mut empty = MemoryConfigStore::new();
        assert_eq!(load_or_default(&mut empty), PersistedConfig::default());

        let mut corrupt = MemoryConfigStore::with_blob(alloc::vec![9, 9, 9]);
        assert_eq!(load_or_default(&mut corrupt), PersistedConfig::default());
        assert_eq!(corrupt.blob(), Some(&[9u8, 9, 9][..]));
    }

    #[test]
    fn test_memory_store_counts_saves() {
        let mut store = MemoryConfigStore::new();
        let mut config = PersistedConfig::default();
        config.apply_field(fields::THING_NAME, "porch").unwrap();

        store.save(&config).unwrap();
        assert_eq!(store.saves(), 1);
        assert_eq!(load_or_default(&mut store), config);
    }
}
