//! Dispatcher configuration.
//!
//! [`DispatcherConfig`] can be built in code, read from `TESSERA_*`
//! environment variables, or parsed from TOML/JSON documents.
//!
//! # Examples
//!
//! ```
//! use std::time::Duration;
//! use tessera_core::config::DispatcherConfig;
//!
//! let config = DispatcherConfig::new()
//!     .locator_cache_capacity(64)
//!     .locator_cache_ttl(Duration::from_secs(30))
//!     .max_locator_depth(8);
//!
//! assert_eq!(config.locator_cache_capacity, 64);
//!
//! let parsed = DispatcherConfig::from_toml_str("normalize_uri = true").unwrap();
//! assert!(parsed.normalize_uri);
//! assert_eq!(parsed.max_locator_depth, 32);
//! ```

use crate::Error;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

/// Prefix of environment variables read by [`DispatcherConfig::from_env`].
pub const ENV_PREFIX: &str = "TESSERA";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatcherConfig {
    /// Maximum number of resource descriptors kept for locator-returned types
    pub locator_cache_capacity: usize,

    /// Idle time after which a cached locator descriptor is recompiled
    #[serde(with = "duration_secs")]
    pub locator_cache_ttl: Duration,

    /// Deepest allowed chain of sub-resource locators per request
    pub max_locator_depth: usize,

    /// Collapse `.`/`..` segments and duplicate slashes before dispatch
    pub normalize_uri: bool,

    /// Honor `X-HTTP-Method-Override` on POST requests
    pub method_override: bool,

    #[serde(with = "duration_secs")]
    pub resource_cleaner_interval: Duration,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            locator_cache_capacity: 256,
            locator_cache_ttl: Duration::from_secs(600),
            max_locator_depth: 32,
            normalize_uri: false,
            method_override: true,
            resource_cleaner_interval: Duration::from_secs(60),
        }
    }
}

impl DispatcherConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn locator_cache_capacity(mut self, capacity: usize) -> Self {
        self.locator_cache_capacity = capacity;
        self
    }

    pub fn locator_cache_ttl(mut self, ttl: Duration) -> Self {
        self.locator_cache_ttl = ttl;
        self
    }

    pub fn max_locator_depth(mut self, depth: usize) -> Self {
        self.max_locator_depth = depth;
        self
    }

    pub fn normalize_uri(mut self, enable: bool) -> Self {
        self.normalize_uri = enable;
        self
    }

    pub fn method_override(mut self, enable: bool) -> Self {
        self.method_override = enable;
        self
    }

    pub fn resource_cleaner_interval(mut self, interval: Duration) -> Self {
        self.resource_cleaner_interval = interval;
        self
    }

    /// Read overrides from `TESSERA_*` environment variables.
    ///
    /// `TESSERA_MAX_LOCATOR_DEPTH=8` sets `max_locator_depth`, durations are
    /// given in seconds. Unset variables keep their defaults.
    pub fn from_env() -> Result<Self, Error> {
        Self::from_vars(std::env::vars())
    }

    /// Same as [`from_env`](Self::from_env) over an explicit variable set.
    pub fn from_vars<I, K, V>(vars: I) -> Result<Self, Error>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        let prefix = format!("{}_", ENV_PREFIX);
        let values: HashMap<String, String> = vars
            .into_iter()
            .filter_map(|(key, value)| {
                key.as_ref()
                    .strip_prefix(&prefix)
                    .map(|name| (name.to_lowercase(), value.into()))
            })
            .collect();

        let mut config = Self::default();
        if let Some(v) = values.get("locator_cache_capacity") {
            config.locator_cache_capacity = parse_var("LOCATOR_CACHE_CAPACITY", v)?;
        }
        if let Some(v) = values.get("locator_cache_ttl") {
            config.locator_cache_ttl = Duration::from_secs(parse_var("LOCATOR_CACHE_TTL", v)?);
        }
        if let Some(v) = values.get("max_locator_depth") {
            config.max_locator_depth = parse_var("MAX_LOCATOR_DEPTH", v)?;
        }
        if let Some(v) = values.get("normalize_uri") {
            config.normalize_uri = parse_var("NORMALIZE_URI", v)?;
        }
        if let Some(v) = values.get("method_override") {
            config.method_override = parse_var("METHOD_OVERRIDE", v)?;
        }
        if let Some(v) = values.get("resource_cleaner_interval") {
            config.resource_cleaner_interval =
                Duration::from_secs(parse_var("RESOURCE_CLEANER_INTERVAL", v)?);
        }

        config.validate()?;
        Ok(config)
    }

    pub fn from_toml_str(s: &str) -> Result<Self, Error> {
        let config: Self =
            toml::from_str(s).map_err(|e| Error::Config(format!("invalid TOML: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_str(s: &str) -> Result<Self, Error> {
        let config: Self =
            serde_json::from_str(s).map_err(|e| Error::Config(format!("invalid JSON: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), Error> {
        if self.locator_cache_capacity == 0 {
            return Err(Error::Config(
                "locator_cache_capacity must be greater than zero".to_string(),
            ));
        }
        if self.max_locator_depth == 0 {
            return Err(Error::Config(
                "max_locator_depth must be greater than zero".to_string(),
            ));
        }
        if self.resource_cleaner_interval.is_zero() {
            return Err(Error::Config(
                "resource_cleaner_interval must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

fn parse_var<T: std::str::FromStr>(name: &str, value: &str) -> Result<T, Error> {
    value.trim().parse().map_err(|_| {
        Error::Config(format!(
            "invalid value '{}' for {}_{}",
            value, ENV_PREFIX, name
        ))
    })
}

mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = DispatcherConfig::default();
        assert_eq!(config.locator_cache_capacity, 256);
        assert_eq!(config.locator_cache_ttl, Duration::from_secs(600));
        assert_eq!(config.max_locator_depth, 32);
        assert!(!config.normalize_uri);
        assert!(config.method_override);
        assert_eq!(config.resource_cleaner_interval, Duration::from_secs(60));
    }

    #[test]
    fn test_from_vars_applies_prefix() {
        let config = DispatcherConfig::from_vars([
            ("TESSERA_MAX_LOCATOR_DEPTH", "4"),
            ("TESSERA_NORMALIZE_URI", "true"),
            ("TESSERA_LOCATOR_CACHE_TTL", "15"),
            ("OTHER_MAX_LOCATOR_DEPTH", "99"),
        ])
        .unwrap();

        assert_eq!(config.max_locator_depth, 4);
        assert!(config.normalize_uri);
        assert_eq!(config.locator_cache_ttl, Duration::from_secs(15));
        assert_eq!(config.locator_cache_capacity, 256);
    }

    #[test]
    fn test_from_vars_rejects_garbage() {
        let err = DispatcherConfig::from_vars([("TESSERA_MAX_LOCATOR_DEPTH", "deep")]).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_toml_and_json() {
        let config = DispatcherConfig::from_toml_str(
            "locator_cache_capacity = 10\nmethod_override = false\n",
        )
        .unwrap();
        assert_eq!(config.locator_cache_capacity, 10);
        assert!(!config.method_override);

        let config =
            DispatcherConfig::from_json_str(r#"{"resource_cleaner_interval": 5}"#).unwrap();
        assert_eq!(config.resource_cleaner_interval, Duration::from_secs(5));
    }

    #[test]
    fn test_zero_capacity_is_rejected() {
        let err = DispatcherConfig::from_toml_str("locator_cache_capacity = 0").unwrap_err();
        assert!(err.is_registration_error());
    }

    #[test]
    fn test_serialize_round_trip_through_json() {
        let config = DispatcherConfig::new().max_locator_depth(3);
        let json = serde_json::to_string(&config).unwrap();
        assert!(json.contains("\"locator_cache_ttl\":600"));
        assert_eq!(DispatcherConfig::from_json_str(&json).unwrap(), config);
    }
}
