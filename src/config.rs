//! # Runtime configuration
//!
//! Read from the environment once at startup. `main` loads an optional
//! `.env` file first, so every key below can live there too.
//!
//! | Key | Default |
//! |---|---|
//! | `SMTP_BIND_ADDRESS` | `0.0.0.0` |
//! | `SMTP_PORT` | `25` |
//! | `SMTP_WORKERS` | `50` |
//! | `SMTP_HOSTNAME` | `smtp.example.com` |
//! | `SMTP_MAX_LINE_LENGTH` | `512` |
//! | `SMTP_MAX_MESSAGE_SIZE` | `10485760` |
//! | `SMTP_IDLE_TIMEOUT_SECS` | `300` |
//! | `SPAM_ORACLE_ADDR` | `127.0.0.1:65432` |
//! | `SPAM_ORACLE_TIMEOUT_SECS` | `30` |
//! | `DATABASE_URL` | `sqlite://maildrop.db` |
//! | `DATABASE_MAX_CONNECTIONS` | `5` |

use std::env;
use std::net::{Ipv4Addr, SocketAddr};
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

use crate::smtp::state_machine::Limits;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid value {value:?} for {key}")]
    Invalid { key: &'static str, value: String },

    #[error("{0} must be at least 1")]
    Zero(&'static str),

    #[error("{key} must be at least {min}")]
    TooSmall { key: &'static str, min: usize },
}

/// Shortest line limit allowed, RFC 5321's command line length.
pub const MIN_LINE_LENGTH: usize = 512;

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub bind_address: String,
    pub port: u16,
    /// Number of workers serving connections concurrently.
    pub workers: usize,
    /// Name announced in the greeting.
    pub hostname: String,
    pub limits: Limits,
    /// How long a session may wait on a silent client.
    pub idle_timeout: Duration,
    pub spam_oracle_addr: SocketAddr,
    pub spam_oracle_timeout: Duration,
    pub database_url: String,
    pub database_max_connections: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0".to_owned(),
            port: 25,
            workers: 50,
            hostname: "smtp.example.com".to_owned(),
            limits: Limits::default(),
            idle_timeout: Duration::from_secs(300),
            spam_oracle_addr: SocketAddr::from((Ipv4Addr::LOCALHOST, 65432)),
            spam_oracle_timeout: Duration::from_secs(30),
            database_url: "sqlite://maildrop.db".to_owned(),
            database_max_connections: 5,
        }
    }
}

impl Config {
    /// Builds the configuration from process environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the configuration from any key lookup, unset keys falling
    /// back to [`Config::default`].
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Config::default();
        let get = |key: &'static str, default: String| -> String {
            lookup(key).unwrap_or(default)
        };

        let config = Config {
            bind_address: get("SMTP_BIND_ADDRESS", defaults.bind_address),
            port: parse(&lookup, "SMTP_PORT", defaults.port)?,
            workers: parse(&lookup, "SMTP_WORKERS", defaults.workers)?,
            hostname: get("SMTP_HOSTNAME", defaults.hostname),
            limits: Limits {
                max_line_length: parse(
                    &lookup,
                    "SMTP_MAX_LINE_LENGTH",
                    defaults.limits.max_line_length,
                )?,
                max_message_size: parse(
                    &lookup,
                    "SMTP_MAX_MESSAGE_SIZE",
                    defaults.limits.max_message_size,
                )?,
            },
            idle_timeout: Duration::from_secs(parse(
                &lookup,
                "SMTP_IDLE_TIMEOUT_SECS",
                defaults.idle_timeout.as_secs(),
            )?),
            spam_oracle_addr: parse(
                &lookup,
                "SPAM_ORACLE_ADDR",
                defaults.spam_oracle_addr,
            )?,
            spam_oracle_timeout: Duration::from_secs(parse(
                &lookup,
                "SPAM_ORACLE_TIMEOUT_SECS",
                defaults.spam_oracle_timeout.as_secs(),
            )?),
            database_url: get("DATABASE_URL", defaults.database_url),
            database_max_connections: parse(
                &lookup,
                "DATABASE_MAX_CONNECTIONS",
                defaults.database_max_connections,
            )?,
        };

        config.validate()?;
        Ok(config)
    }

    /// Rejects limits under which no session could get anything done.
    fn validate(&self) -> Result<(), ConfigError> {
        if self.limits.max_line_length < MIN_LINE_LENGTH {
            return Err(ConfigError::TooSmall {
                key: "SMTP_MAX_LINE_LENGTH",
                min: MIN_LINE_LENGTH,
            });
        }

        let zeroes = [
            ("SMTP_WORKERS", self.workers == 0),
            ("SMTP_MAX_MESSAGE_SIZE", self.limits.max_message_size == 0),
            ("SMTP_IDLE_TIMEOUT_SECS", self.idle_timeout.is_zero()),
            ("SPAM_ORACLE_TIMEOUT_SECS", self.spam_oracle_timeout.is_zero()),
            (
                "DATABASE_MAX_CONNECTIONS",
                self.database_max_connections == 0,
            ),
        ];
        match zeroes.into_iter().find(|(_, zero)| *zero) {
            Some((key, _)) => Err(ConfigError::Zero(key)),
            None => Ok(()),
        }
    }

    /// `bind_address:port`, ready for `TcpListener::bind`.
    pub fn listen_address(&self) -> String {
        format!("{}:{}", self.bind_address, self.port)
    }
}

fn parse<F, T>(
    lookup: &F,
    key: &'static str,
    default: T,
) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(key) {
        None => Ok(default),
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { key, value }),
    }
}
