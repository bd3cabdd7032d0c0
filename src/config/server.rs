use std::time::Duration;

use tracing::info;

use crate::config::{parse_var, process_env, ConfigError, Lookup};

const HOST_ENV_VAR: &str = "PRESENCE_HOST";
const PORT_ENV_VAR: &str = "PRESENCE_PORT";
const HEARTBEAT_ENV_VAR: &str = "PRESENCE_HEARTBEAT_SECS";
const CLIENT_TIMEOUT_ENV_VAR: &str = "PRESENCE_CLIENT_TIMEOUT_SECS";
const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_PORT: u16 = 8080;
const DEFAULT_HEARTBEAT_SECS: u64 = 5;
const DEFAULT_CLIENT_TIMEOUT_SECS: u64 = 15;

/// Everything the relay needs to bind and supervise its sessions
#[derive(Debug, Clone, PartialEq)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
    /// How often a session pings its peer and checks for silence
    pub heartbeat_interval: Duration,
    /// A peer silent for longer than this is evicted
    pub client_timeout: Duration,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_owned(),
            port: DEFAULT_PORT,
            heartbeat_interval: Duration::from_secs(DEFAULT_HEARTBEAT_SECS),
            client_timeout: Duration::from_secs(DEFAULT_CLIENT_TIMEOUT_SECS),
        }
    }
}

impl ServerSettings {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(&process_env)
    }

    pub(crate) fn from_lookup(lookup: Lookup<'_>) -> Result<Self, ConfigError> {
        Ok(Self {
            host: get_host(lookup),
            port: get_port(lookup)?,
            heartbeat_interval: Duration::from_secs(
                parse_var(lookup, HEARTBEAT_ENV_VAR)?.unwrap_or(DEFAULT_HEARTBEAT_SECS),
            ),
            client_timeout: Duration::from_secs(
                parse_var(lookup, CLIENT_TIMEOUT_ENV_VAR)?.unwrap_or(DEFAULT_CLIENT_TIMEOUT_SECS),
            ),
        })
    }
}

fn get_host(lookup: Lookup<'_>) -> String {
    if let Some(host) = lookup(HOST_ENV_VAR) {
        info!("Using {} as the host since {} is set", host, HOST_ENV_VAR);
        host
    } else {
        info!("Using {} as the host", DEFAULT_HOST);
        DEFAULT_HOST.to_owned()
    }
}

fn get_port(lookup: Lookup<'_>) -> Result<u16, ConfigError> {
    if let Some(port) = parse_var(lookup, PORT_ENV_VAR)? {
        info!("Using {} as the port since {} is set", port, PORT_ENV_VAR);
        Ok(port)
    } else {
        info!("Using {} as the port", DEFAULT_PORT);
        Ok(DEFAULT_PORT)
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
    fn falls_back_to_defaults() {
        let settings = ServerSettings::from_lookup(&lookup_in(HashMap::new())).unwrap();
        assert_eq!(settings, ServerSettings::default());
    }

    #[test]
    fn reads_every_variable() {
        let lookup = lookup_in(HashMap::from([
            (HOST_ENV_VAR, "0.0.0.0"),
            (PORT_ENV_VAR, "9000"),
            (HEARTBEAT_ENV_VAR, "2"),
            (CLIENT_TIMEOUT_ENV_VAR, "7"),
        ]));
        let settings = ServerSettings::from_lookup(&lookup).unwrap();
        assert_eq!(settings.host, "0.0.0.0");
        assert_eq!(settings.port, 9000);
        assert_eq!(settings.heartbeat_interval, Duration::from_secs(2));
        assert_eq!(settings.client_timeout, Duration::from_secs(7));
    }

    #[test]
    fn rejects_an_invalid_port() {
        let lookup = lookup_in(HashMap::from([(PORT_ENV_VAR, "eighty")]));
        assert_eq!(
            ServerSettings::from_lookup(&lookup),
            Err(ConfigError::InvalidValue {
                name: PORT_ENV_VAR,
                value: "eighty".to_owned()
            })
        );
    }
}
