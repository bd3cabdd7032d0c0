//! Environment driven settings for the relay and its clients
pub mod client;
pub mod logging;
pub mod server;

use std::str::FromStr;

use thiserror::Error;

/// Enumerates the errors that can occur while reading settings
#[derive(Error, Debug, PartialEq)]
pub enum ConfigError {
    #[error("The environment variable {name} contains an invalid value {value:?}, please fix or delete it")]
    InvalidValue { name: &'static str, value: String },
}

/// Looks up a single setting by environment variable name
pub(crate) type Lookup<'a> = &'a dyn Fn(&str) -> Option<String>;

pub(crate) fn process_env(name: &str) -> Option<String> {
    std::env::var(name).ok()
}

/// Reads and parses an optional setting, `None` when the variable is unset
pub(crate) fn parse_var<T: FromStr>(
    lookup: Lookup<'_>,
    name: &'static str,
) -> Result<Option<T>, ConfigError> {
    match lookup(name) {
        None => Ok(None),
        Some(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidValue { name, value }),
    }
}
