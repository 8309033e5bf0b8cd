//! Process configuration read from the environment (and an optional `.env`).

use ::config::{Config as Settings, Environment};
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("{key} has an invalid value {value:?}: {reason}")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
    #[error("failed to read settings: {0}")]
    Source(#[from] ::config::ConfigError),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub bind_host: IpAddr,
    pub api_port: u16,
    pub websocket_port: u16,
    pub database_url: Option<String>,
    pub database_max_connections: u32,
    pub store_timeout: Duration,
    pub broadcast_write_timeout: Duration,
    pub serialize_votes: bool,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_source(Environment::default())
    }

    /// Same as [`Config::from_env`] but reads `vars` instead of the process
    /// environment.
    #[cfg(test)]
    pub fn from_vars(vars: std::collections::HashMap<String, String>) -> Result<Self, ConfigError> {
        Self::from_source(Environment::default().source(Some(vars)))
    }

    fn from_source(env: Environment) -> Result<Self, ConfigError> {
        let settings = Settings::builder()
            .add_source(env.ignore_empty(true))
            .build()?;
        // environment keys are stored lowercased
        let get = |key: &str| {
            settings
                .get_string(&key.to_lowercase())
                .ok()
                .filter(|v| !v.trim().is_empty())
        };

        Ok(Config {
            bind_host: parse_or(get("BIND_HOST"), "BIND_HOST", IpAddr::from([0, 0, 0, 0]))?,
            api_port: parse_or(get("API_PORT"), "API_PORT", 8080)?,
            websocket_port: parse_or(get("WEBSOCKET_PORT"), "WEBSOCKET_PORT", 8081)?,
            database_url: get("DATABASE_URL"),
            database_max_connections: parse_or(
                get("DATABASE_MAX_CONNECTIONS"),
                "DATABASE_MAX_CONNECTIONS",
                20,
            )?,
            store_timeout: duration_or(get("STORE_TIMEOUT"), "STORE_TIMEOUT", Duration::from_secs(5))?,
            broadcast_write_timeout: duration_or(
                get("BROADCAST_WRITE_TIMEOUT"),
                "BROADCAST_WRITE_TIMEOUT",
                Duration::from_secs(2),
            )?,
            serialize_votes: parse_or(get("SERIALIZE_VOTES"), "SERIALIZE_VOTES", false)?,
        })
    }

    pub fn api_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind_host, self.api_port)
    }

    pub fn websocket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind_host, self.websocket_port)
    }
}

fn parse_or<T>(raw: Option<String>, key: &'static str, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match raw {
        None => Ok(default),
        Some(value) => value.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
            key,
            reason: e.to_string(),
            value,
        }),
    }
}

fn duration_or(
    raw: Option<String>,
    key: &'static str,
    default: Duration,
) -> Result<Duration, ConfigError> {
    match raw {
        None => Ok(default),
        Some(value) => parse_duration(&value).map_err(|reason| ConfigError::Invalid {
            key,
            value,
            reason,
        }),
    }
}

/// Parses `250ms`, `5s`, `2m`. A bare number is taken as seconds.
pub fn parse_duration(raw: &str) -> Result<Duration, String> {
    let raw = raw.trim();
    let split = raw
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(raw.len());
    let (digits, unit) = raw.split_at(split);

    let amount: u64 = digits
        .parse()
        .map_err(|_| "expected a number followed by ms, s or m".to_string())?;

    match unit {
        "ms" => Ok(Duration::from_millis(amount)),
        "" | "s" => Ok(Duration::from_secs(amount)),
        "m" => amount
            .checked_mul(60)
            .map(Duration::from_secs)
            .ok_or_else(|| "duration is too large".to_string()),
        other => Err(format!("unknown duration unit {other:?}")),
    }
}
