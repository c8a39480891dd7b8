use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("pool size must be at least 1")]
    ZeroPoolSize,
    #[error("failed to build http client {index}: {source}")]
    Client {
        index: usize,
        #[source]
        source: reqwest::Error,
    },
    #[error("invalid value for {key}: {value:?}")]
    InvalidValue { key: &'static str, value: String },
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Settings for an [`HttpClientPool`](crate::services::HttpClientPool).
///
/// Connection caps are totals for the whole pool; each pooled client gets
/// an even share (see [`ClientConfig::per_client_max_conns_per_host`]).
/// Every cap and duration treats 0 as "no limit".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// 0 keeps every idle connection.
    pub max_idle_conns_per_host: usize,
    /// 0 disables the per-host connection limit.
    pub max_conns_per_host: usize,
    /// 0 keeps idle connections open indefinitely.
    pub idle_conn_timeout_secs: u64,
    /// 0 leaves calls bounded only by the caller's context.
    pub request_timeout_ms: u64,
    /// 0 disables the connect timeout.
    pub connect_timeout_ms: u64,
    /// 0 disables TCP keep-alive probes.
    pub keep_alive_secs: u64,
    pub pool_size: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            max_idle_conns_per_host: 20,
            max_conns_per_host: 0,
            idle_conn_timeout_secs: 30,
            request_timeout_ms: 1500,
            connect_timeout_ms: 1000,
            keep_alive_secs: 60,
            pool_size: num_cpus::get(),
        }
    }
}

impl ClientConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds a config from an arbitrary key lookup, falling back to the
    /// defaults for missing keys.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let config = Self {
            max_idle_conns_per_host: parse_or(
                &lookup,
                "HTTP_MAX_IDLE_CONNS_PER_HOST",
                defaults.max_idle_conns_per_host,
            )?,
            max_conns_per_host: parse_or(
                &lookup,
                "HTTP_MAX_CONNS_PER_HOST",
                defaults.max_conns_per_host,
            )?,
            idle_conn_timeout_secs: parse_or(
                &lookup,
                "HTTP_IDLE_CONN_TIMEOUT_SECS",
                defaults.idle_conn_timeout_secs,
            )?,
            request_timeout_ms: parse_or(
                &lookup,
                "HTTP_REQUEST_TIMEOUT_MS",
                defaults.request_timeout_ms,
            )?,
            connect_timeout_ms: parse_or(
                &lookup,
                "HTTP_CONNECT_TIMEOUT_MS",
                defaults.connect_timeout_ms,
            )?,
            keep_alive_secs: parse_or(&lookup, "HTTP_KEEP_ALIVE_SECS", defaults.keep_alive_secs)?,
            pool_size: parse_or(&lookup, "HTTP_POOL_SIZE", defaults.pool_size)?,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&raw)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.pool_size == 0 {
            return Err(ConfigError::ZeroPoolSize);
        }
        Ok(())
    }

    pub fn per_client_max_idle_conns_per_host(&self) -> usize {
        split_evenly(self.max_idle_conns_per_host, self.pool_size)
    }

    pub fn per_client_max_conns_per_host(&self) -> usize {
        split_evenly(self.max_conns_per_host, self.pool_size)
    }

    pub fn idle_conn_timeout(&self) -> Option<Duration> {
        non_zero(Duration::from_secs(self.idle_conn_timeout_secs))
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        non_zero(Duration::from_millis(self.request_timeout_ms))
    }

    pub fn connect_timeout(&self) -> Option<Duration> {
        non_zero(Duration::from_millis(self.connect_timeout_ms))
    }

    pub fn keep_alive(&self) -> Option<Duration> {
        non_zero(Duration::from_secs(self.keep_alive_secs))
    }
}

fn non_zero(duration: Duration) -> Option<Duration> {
    (!duration.is_zero()).then_some(duration)
}

// A zero total means "unlimited" and stays zero; any other total keeps at
// least one slot per client.
fn split_evenly(total: usize, pool_size: usize) -> usize {
    if total == 0 || pool_size == 0 {
        return total;
    }
    (total / pool_size).max(1)
}

fn parse_or<F, T>(lookup: &F, key: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(key) {
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidValue { key, value }),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn test_divides_caps_across_clients() {
        let config = ClientConfig {
            max_idle_conns_per_host: 100,
            max_conns_per_host: 10,
            pool_size: 4,
            ..ClientConfig::default()
        };
        assert_eq!(config.per_client_max_idle_conns_per_host(), 25);
        assert_eq!(config.per_client_max_conns_per_host(), 2);
    }

    #[test]
    fn test_small_totals_keep_one_slot() {
        let config = ClientConfig {
            max_conns_per_host: 3,
            pool_size: 8,
            ..ClientConfig::default()
        };
        assert_eq!(config.per_client_max_conns_per_host(), 1);
    }

    #[test]
    fn test_zero_cap_stays_unlimited() {
        let config = ClientConfig {
            max_conns_per_host: 0,
            pool_size: 3,
            ..ClientConfig::default()
        };
        assert_eq!(config.per_client_max_conns_per_host(), 0);
    }

    #[test]
    fn test_from_lookup_reads_overrides() {
        let config = ClientConfig::from_lookup(lookup_from(&[
            ("HTTP_POOL_SIZE", "3"),
            ("HTTP_REQUEST_TIMEOUT_MS", " 250 "),
        ]))
        .unwrap();
        assert_eq!(config.pool_size, 3);
        assert_eq!(config.request_timeout(), Some(Duration::from_millis(250)));
        assert_eq!(config.keep_alive_secs, 60);
    }

    #[test]
    fn test_from_lookup_rejects_garbage() {
        let err = ClientConfig::from_lookup(lookup_from(&[("HTTP_KEEP_ALIVE_SECS", "soon")]))
            .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidValue { key: "HTTP_KEEP_ALIVE_SECS", .. }
        ));
    }

    #[test]
    fn test_zero_pool_size_is_rejected() {
        let err = ClientConfig::from_lookup(lookup_from(&[("HTTP_POOL_SIZE", "0")])).unwrap_err();
        assert!(matches!(err, ConfigError::ZeroPoolSize));

        let err = ClientConfig::from_toml_str("pool_size = 0").unwrap_err();
        assert!(matches!(err, ConfigError::ZeroPoolSize));
    }

    #[test]
    fn test_toml_fills_missing_keys_with_defaults() {
        let config = ClientConfig::from_toml_str(
            r#"
            pool_size = 2
            max_conns_per_host = 64
            connect_timeout_ms = 300
            "#,
        )
        .unwrap();
        assert_eq!(config.pool_size, 2);
        assert_eq!(config.per_client_max_conns_per_host(), 32);
        assert_eq!(config.connect_timeout(), Some(Duration::from_millis(300)));
        assert_eq!(config.idle_conn_timeout_secs, 30);
    }

    #[test]
    fn test_zero_durations_mean_no_limit() {
        let config = ClientConfig::from_lookup(lookup_from(&[
            ("HTTP_REQUEST_TIMEOUT_MS", "0"),
            ("HTTP_CONNECT_TIMEOUT_MS", "0"),
            ("HTTP_IDLE_CONN_TIMEOUT_SECS", "0"),
            ("HTTP_KEEP_ALIVE_SECS", "0"),
        ]))
        .unwrap();
        assert_eq!(config.request_timeout(), None);
        assert_eq!(config.connect_timeout(), None);
        assert_eq!(config.idle_conn_timeout(), None);
        assert_eq!(config.keep_alive(), None);
        assert_eq!(
            ClientConfig::default().keep_alive(),
            Some(Duration::from_secs(60))
        );
    }

    #[test]
    fn test_from_file_reports_missing_path() {
        let err = ClientConfig::from_file("/definitely/not/here.toml").unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }
}
