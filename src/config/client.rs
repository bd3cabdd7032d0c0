use std::path::PathBuf;
use std::time::Duration;

use tracing::info;

use crate::client::ReconnectPolicy;
use crate::config::{parse_var, process_env, ConfigError, Lookup};

const URL_ENV_VAR: &str = "PRESENCE_URL";
const PING_ENV_VAR: &str = "PRESENCE_PING_MS";
const RECONNECT_ENV_VAR: &str = "PRESENCE_RECONNECT_MS";
const IDENTITY_FILE_ENV_VAR: &str = "PRESENCE_IDENTITY_FILE";
const DEFAULT_URL: &str = "ws://127.0.0.1:8080/ws";
const DEFAULT_PING_MS: u64 = 2000;
const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(1);

/// Tuning for a [presence client][crate::client::PresenceClient]
#[derive(Debug, Clone, PartialEq)]
pub struct ClientConfig {
    /// Relay endpoint, only read by the websocket connector
    pub url: String,
    /// Period of the latency probe while connected
    pub ping_interval: Duration,
    pub reconnect: ReconnectPolicy,
    /// How long a graceful shutdown may take before the background task is aborted
    pub shutdown_timeout: Duration,
    /// Where the session identity is kept between runs, ephemeral when `None`
    pub identity_file: Option<PathBuf>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_URL.to_owned(),
            ping_interval: Duration::from_millis(DEFAULT_PING_MS),
            reconnect: ReconnectPolicy::default(),
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
            identity_file: None,
        }
    }
}

impl ClientConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(&process_env)
    }

    pub(crate) fn from_lookup(lookup: Lookup<'_>) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(url) = lookup(URL_ENV_VAR) {
            info!("Using {} as the relay url since {} is set", url, URL_ENV_VAR);
            config.url = url;
        }
        if let Some(ms) = parse_var::<u64>(lookup, PING_ENV_VAR)? {
            config.ping_interval = Duration::from_millis(ms.max(1));
        }
        if let Some(ms) = parse_var::<u64>(lookup, RECONNECT_ENV_VAR)? {
            if ms == 0 {
                return Err(ConfigError::InvalidValue {
                    name: RECONNECT_ENV_VAR,
                    value: ms.to_string(),
                });
            }
            info!("Reconnecting after a fixed {}ms since {} is set", ms, RECONNECT_ENV_VAR);
            config.reconnect = ReconnectPolicy::Fixed(Duration::from_millis(ms));
        }
        config.identity_file = lookup(IDENTITY_FILE_ENV_VAR).map(PathBuf::from);

        Ok(config)
    }

    #[must_use]
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }

    #[must_use]
    pub fn with_ping_interval(mut self, interval: Duration) -> Self {
        self.ping_interval = interval;
        self
    }

    #[must_use]
    pub fn with_reconnect(mut self, policy: ReconnectPolicy) -> Self {
        self.reconnect = policy;
        self
    }

    #[must_use]
    pub fn with_identity_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.identity_file = Some(path.into());
        self
    }
}

#[cfg(test)]
mod from_lookup {
    use std::collections::HashMap;

    use super::*;

    fn lookup_in(vars: HashMap<&'static str, &'static str>) -> impl Fn(&str) -> Option<String> {
        move |name| vars.get(name).map(|v| v.to_string())
    }

    #[test]
    fn defaults_to_backoff_and_an_ephemeral_identity() {
        let config = ClientConfig::from_lookup(&lookup_in(HashMap::new())).unwrap();
        assert_eq!(config, ClientConfig::default());
        assert!(matches!(config.reconnect, ReconnectPolicy::Backoff(_)));
        assert_eq!(config.identity_file, None);
    }

    #[test]
    fn fixed_reconnect_delay_overrides_backoff() {
        let lookup = lookup_in(HashMap::from([
            (RECONNECT_ENV_VAR, "1500"),
            (PING_ENV_VAR, "250"),
            (IDENTITY_FILE_ENV_VAR, "/tmp/me.json"),
        ]));
        let config = ClientConfig::from_lookup(&lookup).unwrap();
        assert_eq!(
            config.reconnect,
            ReconnectPolicy::Fixed(Duration::from_millis(1500))
        );
        assert_eq!(config.ping_interval, Duration::from_millis(250));
        assert_eq!(config.identity_file, Some(PathBuf::from("/tmp/me.json")));
    }

    #[test]
    fn rejects_a_zero_reconnect_delay() {
        let lookup = lookup_in(HashMap::from([(RECONNECT_ENV_VAR, "0")]));
        assert_eq!(
            ClientConfig::from_lookup(&lookup),
            Err(ConfigError::InvalidValue {
                name: RECONNECT_ENV_VAR,
                value: "0".to_owned(),
            })
        );
    }

    #[test]
    fn rejects_a_non_numeric_ping_interval() {
        let lookup = lookup_in(HashMap::from([(PING_ENV_VAR, "often")]));
        assert!(ClientConfig::from_lookup(&lookup).is_err());
    }
}
