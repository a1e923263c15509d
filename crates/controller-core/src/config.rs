//! The controller's closed configuration surface (§6 of the component spec).
//!
//! `Config` is loaded once at process start from a TOML file, optionally
//! overlaid with environment variables for secret material that should never
//! sit in a checked-in file. No other knobs are exposed by the core; a field
//! not listed here is deliberately not configurable.

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use base64::Engine as _;
use serde::Deserialize;
use zeroize::Zeroizing;

use crate::defaults;
use crate::types::KeyVersion;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io { path: String, source: std::io::Error },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid master key for version {version}: {reason}")]
    InvalidKey { version: u32, reason: String },

    #[error("no master key is marked current; exactly one is required")]
    NoCurrentKey,

    #[error("more than one master key is marked current (versions {0:?})")]
    MultipleCurrentKeys(Vec<u32>),
}

/// The Dispatcher's backoff policy for `ErrUnavailable`, per §4.4.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    pub base: Duration,
    pub factor: f64,
    pub jitter: f64,
    pub max_delay: Duration,
    pub attempts: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            base: defaults::DEFAULT_RETRY_BASE,
            factor: defaults::DEFAULT_RETRY_FACTOR,
            jitter: defaults::DEFAULT_RETRY_JITTER,
            max_delay: defaults::DEFAULT_RETRY_MAX_DELAY,
            attempts: defaults::DEFAULT_RETRY_ATTEMPTS,
        }
    }
}

/// A single versioned AES-256-GCM master key. Decryption under a `version`
/// not present in this table fails closed with `ErrKeyUnknown` (folded into
/// `ControllerError::Crypto` at the envelope boundary).
#[derive(Clone)]
pub struct MasterKeyEntry {
    pub version: KeyVersion,
    pub key: Zeroizing<[u8; 32]>,
    pub current: bool,
}

impl std::fmt::Debug for MasterKeyEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MasterKeyEntry")
            .field("version", &self.version)
            .field("key", &"<redacted>")
            .field("current", &self.current)
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub master_key_versions: Vec<MasterKeyEntry>,
    pub dispatch_default_deadline: Duration,
    pub operation_default_deadline: Duration,
    pub per_credential_inflight_cap: usize,
    pub bulkhead_queue_timeout: Duration,
    pub bus_ring_capacity: usize,
    pub subscriber_queue_capacity: usize,
    pub operation_retention: Duration,
    pub heartbeat_interval: Duration,
    pub retry: RetryPolicy,
}

impl Config {
    /// The key version new writes should use.
    pub fn current_key_version(&self) -> Option<KeyVersion> {
        self.master_key_versions.iter().find(|k| k.current).map(|k| k.version)
    }

    pub fn key_for_version(&self, version: KeyVersion) -> Option<&Zeroizing<[u8; 32]>> {
        self.master_key_versions.iter().find(|k| k.version == version).map(|k| &k.key)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let current: Vec<u32> = self.master_key_versions.iter().filter(|k| k.current).map(|k| k.version.0).collect();
        match current.len() {
            0 => Err(ConfigError::NoCurrentKey),
            1 => Ok(()),
            _ => Err(ConfigError::MultipleCurrentKeys(current)),
        }
    }

    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        let parsed: RawConfig = toml::from_str(raw)?;
        parsed.into_config()
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path_ref = path.as_ref();
        let raw = std::fs::read_to_string(path_ref)
            .map_err(|source| ConfigError::Io { path: path_ref.display().to_string(), source })?;
        Self::from_toml_str(&raw)
    }
}

/// The wire shape of the TOML config file. Durations are seconds, keys are
/// base64-encoded 32 bytes; `Config` converts these into the typed surface
/// the rest of the workspace consumes.
#[derive(Debug, Deserialize)]
struct RawConfig {
    master_key_versions: BTreeMap<u32, RawMasterKey>,
    #[serde(default = "default_dispatch_deadline_secs")]
    dispatch_default_deadline_secs: u64,
    #[serde(default = "default_operation_deadline_secs")]
    operation_default_deadline_secs: u64,
    #[serde(default = "default_inflight_cap")]
    per_credential_inflight_cap: usize,
    #[serde(default = "default_queue_timeout_secs")]
    bulkhead_queue_timeout_secs: u64,
    #[serde(default = "default_ring_capacity")]
    bus_ring_capacity: usize,
    #[serde(default = "default_subscriber_queue_capacity")]
    subscriber_queue_capacity: usize,
    #[serde(default = "default_operation_retention_secs")]
    operation_retention_secs: u64,
    #[serde(default = "default_heartbeat_secs")]
    heartbeat_interval_secs: u64,
    #[serde(default)]
    retry: Option<RawRetry>,
}

#[derive(Debug, Deserialize)]
struct RawMasterKey {
    /// Base64 (standard, padded) encoding of the 32-byte AES-256 key.
    key_base64: String,
    #[serde(default)]
    current: bool,
}

#[derive(Debug, Deserialize)]
struct RawRetry {
    #[serde(default = "default_retry_base_ms")]
    base_ms: u64,
    #[serde(default = "default_retry_factor")]
    factor: f64,
    #[serde(default = "default_retry_jitter")]
    jitter: f64,
    #[serde(default = "default_retry_max_ms")]
    max_delay_ms: u64,
    #[serde(default = "default_retry_attempts")]
    attempts: u32,
}

fn default_dispatch_deadline_secs() -> u64 {
    defaults::DEFAULT_DISPATCH_DEADLINE.as_secs()
}
fn default_operation_deadline_secs() -> u64 {
    defaults::DEFAULT_OPERATION_DEADLINE.as_secs()
}
fn default_inflight_cap() -> usize {
    defaults::DEFAULT_PER_CREDENTIAL_INFLIGHT_CAP
}
fn default_queue_timeout_secs() -> u64 {
    defaults::DEFAULT_BULKHEAD_QUEUE_TIMEOUT.as_secs()
}
fn default_ring_capacity() -> usize {
    defaults::DEFAULT_BUS_RING_CAPACITY
}
fn default_subscriber_queue_capacity() -> usize {
    defaults::DEFAULT_SUBSCRIBER_QUEUE_CAPACITY
}
fn default_operation_retention_secs() -> u64 {
    defaults::DEFAULT_OPERATION_RETENTION.as_secs()
}
fn default_heartbeat_secs() -> u64 {
    defaults::DEFAULT_HEARTBEAT_INTERVAL.as_secs()
}
fn default_retry_base_ms() -> u64 {
    defaults::DEFAULT_RETRY_BASE.as_millis() as u64
}
fn default_retry_factor() -> f64 {
    defaults::DEFAULT_RETRY_FACTOR
}
fn default_retry_jitter() -> f64 {
    defaults::DEFAULT_RETRY_JITTER
}
fn default_retry_max_ms() -> u64 {
    defaults::DEFAULT_RETRY_MAX_DELAY.as_millis() as u64
}
fn default_retry_attempts() -> u32 {
    defaults::DEFAULT_RETRY_ATTEMPTS
}

impl RawConfig {
    fn into_config(self) -> Result<Config, ConfigError> {
        let mut master_key_versions = Vec::with_capacity(self.master_key_versions.len());
        for (version, raw_key) in self.master_key_versions {
            let decoded = base64::engine::general_purpose::STANDARD
                .decode(&raw_key.key_base64)
                .map_err(|e| ConfigError::InvalidKey { version, reason: e.to_string() })?;
            let key: [u8; 32] = decoded
                .try_into()
                .map_err(|v: Vec<u8>| ConfigError::InvalidKey { version, reason: format!("expected 32 bytes, got {}", v.len()) })?;
            master_key_versions.push(MasterKeyEntry {
                version: KeyVersion(version),
                key: Zeroizing::new(key),
                current: raw_key.current,
            });
        }

        let retry = self.retry.map(|r| RetryPolicy {
            base: Duration::from_millis(r.base_ms),
            factor: r.factor,
            jitter: r.jitter,
            max_delay: Duration::from_millis(r.max_delay_ms),
            attempts: r.attempts,
        }).unwrap_or_default();

        let config = Config {
            master_key_versions,
            dispatch_default_deadline: Duration::from_secs(self.dispatch_default_deadline_secs),
            operation_default_deadline: Duration::from_secs(self.operation_default_deadline_secs),
            per_credential_inflight_cap: self.per_credential_inflight_cap,
            bulkhead_queue_timeout: Duration::from_secs(self.bulkhead_queue_timeout_secs),
            bus_ring_capacity: self.bus_ring_capacity,
            subscriber_queue_capacity: self.subscriber_queue_capacity,
            operation_retention: Duration::from_secs(self.operation_retention_secs),
            heartbeat_interval: Duration::from_secs(self.heartbeat_interval_secs),
            retry,
        };
        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
        [master_key_versions.1]
        key_base64 = "AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA="
        current = true
    "#;

    #[test]
    fn parses_minimal_config_with_defaults() {
        let config = Config::from_toml_str(SAMPLE).unwrap();
        assert_eq!(config.per_credential_inflight_cap, defaults::DEFAULT_PER_CREDENTIAL_INFLIGHT_CAP);
        assert_eq!(config.current_key_version(), Some(KeyVersion(1)));
    }

    #[test]
    fn rejects_config_with_no_current_key() {
        let raw = r#"
            [master_key_versions.1]
            key_base64 = "AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA="
        "#;
        let err = Config::from_toml_str(raw).unwrap_err();
        assert!(matches!(err, ConfigError::NoCurrentKey));
    }

    #[test]
    fn rejects_key_of_wrong_length() {
        let raw = r#"
            [master_key_versions.1]
            key_base64 = "AAAA"
            current = true
        "#;
        let err = Config::from_toml_str(raw).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidKey { .. }));
    }
}
