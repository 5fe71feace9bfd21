//! Configuration module - environment variable parsing

use std::env;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

/// Application configuration loaded from environment variables
#[derive(Clone, Debug)]
pub struct Config {
    /// Server binding address
    pub server_addr: SocketAddr,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
    /// Emit JSON log lines instead of the human readable format
    pub log_json: bool,

    /// Secret shared with the identity provider for session token signatures
    pub auth_secret: String,
    /// Allowed client origins for CORS ("*" for any)
    pub client_origin: String,

    /// Period of a match simulation tick
    pub tick_interval: Duration,
    /// Outbound queue depth per connection
    pub client_send_buffer: usize,
    /// Inbox depth of the hub coordinator
    pub hub_command_buffer: usize,
    /// Max inbound frames per second per connection
    pub input_rate_limit: u32,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        // PORT (set by most hosts) takes precedence over SERVER_ADDR
        let server_addr = if let Ok(port) = env::var("PORT") {
            format!("0.0.0.0:{}", port)
        } else {
            env::var("SERVER_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".to_string())
        };

        Ok(Self {
            server_addr: server_addr
                .parse()
                .map_err(|_| ConfigError::InvalidAddress)?,

            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            log_json: env::var("LOG_FORMAT")
                .map(|f| f.eq_ignore_ascii_case("json"))
                .unwrap_or(false),

            auth_secret: env::var("AUTH_SECRET").map_err(|_| ConfigError::Missing("AUTH_SECRET"))?,
            client_origin: env::var("CLIENT_ORIGIN").unwrap_or_else(|_| "*".to_string()),

            tick_interval: Duration::from_millis(parse_or("TICK_INTERVAL_MS", 50)?),
            client_send_buffer: parse_or("CLIENT_SEND_BUFFER", 256)?,
            hub_command_buffer: parse_or("HUB_COMMAND_BUFFER", 1024)?,
            input_rate_limit: parse_or("INPUT_RATE_LIMIT", 60)?,
        })
    }
}

/// Read a numeric variable, falling back to `default` when unset
fn parse_or<T: FromStr + PartialOrd + Default>(
    name: &'static str,
    default: T,
) -> Result<T, ConfigError> {
    match env::var(name) {
        Ok(raw) => parse_positive(name, &raw),
        Err(_) => Ok(default),
    }
}

fn parse_positive<T: FromStr + PartialOrd + Default>(
    name: &'static str,
    raw: &str,
) -> Result<T, ConfigError> {
    let value: T = raw.trim().parse().map_err(|_| ConfigError::Invalid(name))?;
    if value <= T::default() {
        return Err(ConfigError::Invalid(name));
    }
    Ok(value)
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),

    #[error("Invalid server address format")]
    InvalidAddress,

    #[error("Invalid value for environment variable: {0}")]
    Invalid(&'static str),
}
