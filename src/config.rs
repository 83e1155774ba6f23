//! Exporter configuration.
//!
//! Values come from defaults, from environment variables
//! ([`ExporterConfig::from_env`]) or from an embedding application's config
//! file through `serde`.

use std::time::Duration;

use serde::{Deserialize, Deserializer};

use crate::util::{DurationParseError, parse_duration};

/// Default metric namespace.
pub const DEFAULT_NAMESPACE: &str = "mongodb";
/// Default bound on a whole scrape.
pub const DEFAULT_SCRAPE_TIMEOUT: Duration = Duration::from_secs(10);
/// Default bound on a single database call.
pub const DEFAULT_QUERY_TIMEOUT: Duration = Duration::from_secs(5);

const ENV_NAMESPACE: &str = "MONGOLAT_NAMESPACE";
const ENV_SCRAPE_TIMEOUT: &str = "MONGOLAT_SCRAPE_TIMEOUT";
const ENV_QUERY_TIMEOUT: &str = "MONGOLAT_QUERY_TIMEOUT";

/// Error type for configuration loading.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    #[error("{var}: {source}")]
    InvalidDuration {
        var: &'static str,
        #[source]
        source: DurationParseError,
    },
}

/// Collector and exporter settings.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ExporterConfig {
    /// Prefix of the exported metric name.
    pub namespace: String,

    /// Upper bound for one scrape. `Duration::ZERO` disables the bound.
    #[serde(deserialize_with = "de_duration")]
    pub scrape_timeout: Duration,

    /// Upper bound for one database call. `Duration::ZERO` disables the bound.
    #[serde(deserialize_with = "de_duration")]
    pub query_timeout: Duration,
}

impl Default for ExporterConfig {
    fn default() -> Self {
        Self {
            namespace: DEFAULT_NAMESPACE.to_string(),
            scrape_timeout: DEFAULT_SCRAPE_TIMEOUT,
            query_timeout: DEFAULT_QUERY_TIMEOUT,
        }
    }
}

impl ExporterConfig {
    /// Creates a configuration from environment variables.
    ///
    /// - MONGOLAT_NAMESPACE (default: mongodb)
    /// - MONGOLAT_SCRAPE_TIMEOUT (default: 10s)
    /// - MONGOLAT_QUERY_TIMEOUT (default: 5s)
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Creates a configuration using `lookup` to resolve variable names.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(namespace) = lookup(ENV_NAMESPACE) {
            config.namespace = namespace.trim().to_string();
        }
        if let Some(value) = lookup(ENV_SCRAPE_TIMEOUT) {
            config.scrape_timeout = parse_env_duration(ENV_SCRAPE_TIMEOUT, &value)?;
        }
        if let Some(value) = lookup(ENV_QUERY_TIMEOUT) {
            config.query_timeout = parse_env_duration(ENV_QUERY_TIMEOUT, &value)?;
        }

        Ok(config)
    }

    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    /// Sets the scrape timeout. `Duration::ZERO` disables it.
    pub fn with_scrape_timeout(mut self, timeout: Duration) -> Self {
        self.scrape_timeout = timeout;
        self
    }

    /// Sets the per-call timeout. `Duration::ZERO` disables it.
    pub fn with_query_timeout(mut self, timeout: Duration) -> Self {
        self.query_timeout = timeout;
        self
    }
}

fn parse_env_duration(var: &'static str, value: &str) -> Result<Duration, ConfigError> {
    parse_duration(value).map_err(|source| ConfigError::InvalidDuration { var, source })
}

/// Either bare seconds or a duration string such as `"750ms"`.
#[derive(Deserialize)]
#[serde(untagged)]
enum RawDuration {
    Seconds(u64),
    Text(String),
}

fn de_duration<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
    match RawDuration::deserialize(deserializer)? {
        RawDuration::Seconds(secs) => Ok(Duration::from_secs(secs)),
        RawDuration::Text(text) => parse_duration(&text).map_err(serde::de::Error::custom),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn defaults_without_environment() {
        let config = ExporterConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, ExporterConfig::default());
        assert_eq!(config.namespace, "mongodb");
        assert_eq!(config.scrape_timeout, Duration::from_secs(10));
        assert_eq!(config.query_timeout, Duration::from_secs(5));
    }

    #[test]
    fn reads_environment_overrides() {
        let config = ExporterConfig::from_lookup(lookup(&[
            ("MONGOLAT_NAMESPACE", "mongod"),
            ("MONGOLAT_SCRAPE_TIMEOUT", "30s"),
            ("MONGOLAT_QUERY_TIMEOUT", "750ms"),
        ]))
        .unwrap();

        assert_eq!(config.namespace, "mongod");
        assert_eq!(config.scrape_timeout, Duration::from_secs(30));
        assert_eq!(config.query_timeout, Duration::from_millis(750));
    }

    #[test]
    fn invalid_duration_names_the_variable() {
        let err = ExporterConfig::from_lookup(lookup(&[("MONGOLAT_QUERY_TIMEOUT", "soon")]))
            .unwrap_err();
        assert!(err.to_string().starts_with("MONGOLAT_QUERY_TIMEOUT"));
    }

    #[test]
    fn deserializes_partial_config() {
        let config: ExporterConfig =
            serde_json::from_str(r#"{ "scrape_timeout": "2m" }"#).unwrap();
        assert_eq!(config.scrape_timeout, Duration::from_secs(120));
        assert_eq!(config.namespace, DEFAULT_NAMESPACE);
        assert_eq!(config.query_timeout, DEFAULT_QUERY_TIMEOUT);
    }

    #[test]
    fn deserializes_numeric_seconds() {
        let config: ExporterConfig =
            serde_json::from_str(r#"{ "query_timeout": 5, "scrape_timeout": "1m" }"#).unwrap();
        assert_eq!(config.query_timeout, Duration::from_secs(5));
        assert_eq!(config.scrape_timeout, Duration::from_secs(60));

        assert!(serde_json::from_str::<ExporterConfig>(r#"{ "query_timeout": -1 }"#).is_err());
    }

    #[test]
    fn builder_setters() {
        let config = ExporterConfig::default()
            .with_namespace("custom")
            .with_scrape_timeout(Duration::ZERO)
            .with_query_timeout(Duration::from_secs(1));
        assert_eq!(config.namespace, "custom");
        assert!(config.scrape_timeout.is_zero());
        assert_eq!(config.query_timeout, Duration::from_secs(1));
    }
}
