//! Configuration module for environment variable parsing.
//!
//! All settings come from environment variables with defaults suitable for a
//! local RabbitMQ.

use std::env;
use std::str::FromStr;
use std::time::Duration;

use tracing::warn;

/// Which broker backs the bridge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BrokerKind {
    /// RabbitMQ over AMQP 0-9-1.
    Amqp,
    /// Process-local queues; contents are lost on exit.
    Memory,
}

impl FromStr for BrokerKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "amqp" | "rabbitmq" => Ok(BrokerKind::Amqp),
            "memory" => Ok(BrokerKind::Memory),
            other => Err(format!("unknown broker kind '{}'", other)),
        }
    }
}

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// RabbitMQ connection URL
    pub amqp_url: String,

    pub broker: BrokerKind,

    /// Port for the web server to listen on
    pub port: u16,

    /// Pause between fetch attempts while polling, in milliseconds
    pub poll_interval_ms: u64,

    /// Poll timeout used when a request gives none, in milliseconds
    pub default_poll_timeout_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            amqp_url: "amqp://127.0.0.1:5672/%2f".to_string(),
            broker: BrokerKind::Amqp,
            port: 3000,
            poll_interval_ms: 100,
            default_poll_timeout_ms: 10_000,
        }
    }
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        let defaults = Config::default();

        Config {
            amqp_url: env::var("AMQP_URL").unwrap_or(defaults.amqp_url),

            broker: parse_var("BROKER", defaults.broker),

            port: parse_var("PORT", defaults.port),

            poll_interval_ms: parse_nonzero("POLL_INTERVAL_MS", defaults.poll_interval_ms),

            default_poll_timeout_ms: parse_var(
                "DEFAULT_POLL_TIMEOUT_MS",
                defaults.default_poll_timeout_ms,
            ),
        }
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn default_poll_timeout(&self) -> Duration {
        Duration::from_millis(self.default_poll_timeout_ms)
    }
}

/// Parse an environment variable, falling back to `default` when unset or invalid.
fn parse_var<T: FromStr>(name: &str, default: T) -> T {
    let raw = match env::var(name) {
        Ok(v) => v,
        Err(_) => return default,
    };

    match raw.trim().parse() {
        Ok(value) => value,
        Err(_) => {
            warn!(env_var = name, value = %raw, "Invalid value, using default");
            default
        }
    }
}

/// Like [`parse_var`], but a zero value also falls back to `default`.
fn parse_nonzero(name: &str, default: u64) -> u64 {
    match parse_var(name, default) {
        0 => {
            warn!(env_var = name, value = 0, "Zero not allowed, using default");
            default
        }
        value => value,
    }
}
