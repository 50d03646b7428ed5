//! Configuration module - environment variable parsing

use std::env;
use std::net::SocketAddr;
use std::str::FromStr;

use crate::game::{AttackRouting, SessionConfig};
use crate::util::time::{DEFAULT_GRAVITY_INTERVAL_MS, DEFAULT_TICK_RATE};

/// Application configuration loaded from environment variables
#[derive(Clone, Debug)]
pub struct Config {
    /// Server binding address
    pub server_addr: SocketAddr,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,

    /// Scheduler ticks per second
    pub tick_rate: u32,
    /// Milliseconds between gravity steps
    pub gravity_interval_ms: u64,
    /// Broadcast a snapshot every N ticks
    pub snapshot_every_ticks: u32,
    pub max_players_per_session: usize,
    pub attack_routing: AttackRouting,

    /// Allowed client origins for CORS, comma-separated, or `*`
    pub client_origin: String,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from any key lookup; missing keys take their defaults
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        // Hosting platforms provide PORT, fall back to SERVER_ADDR or default
        let server_addr = match lookup("PORT") {
            Some(port) => format!("0.0.0.0:{}", port),
            None => lookup("SERVER_ADDR").unwrap_or_else(|| "0.0.0.0:8080".to_string()),
        };

        let tick_rate: u32 = parse_var(&lookup, "TICK_RATE", DEFAULT_TICK_RATE)?;
        if tick_rate == 0 {
            return Err(ConfigError::Invalid {
                var: "TICK_RATE",
                value: "0".to_string(),
            });
        }

        Ok(Self {
            server_addr: server_addr
                .parse()
                .map_err(|_| ConfigError::InvalidAddress)?,

            log_level: lookup("LOG_LEVEL").unwrap_or_else(|| "info".to_string()),

            tick_rate,
            gravity_interval_ms: parse_var(
                &lookup,
                "GRAVITY_INTERVAL_MS",
                DEFAULT_GRAVITY_INTERVAL_MS,
            )?,
            snapshot_every_ticks: parse_var(&lookup, "SNAPSHOT_EVERY_TICKS", 1)?,
            max_players_per_session: parse_var(&lookup, "MAX_PLAYERS_PER_SESSION", 8)?,
            attack_routing: parse_var(&lookup, "ATTACK_ROUTING", AttackRouting::Split)?,

            client_origin: lookup("CLIENT_ORIGIN").unwrap_or_else(|| "*".to_string()),
        })
    }

    /// Settings handed to every new session
    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            tick_rate: self.tick_rate,
            gravity_interval_ms: self.gravity_interval_ms,
            snapshot_every_ticks: self.snapshot_every_ticks,
            max_players: self.max_players_per_session,
            attack_routing: self.attack_routing,
        }
    }
}

fn parse_var<F, T>(lookup: &F, var: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(var) {
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { var, value }),
        None => Ok(default),
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for {var}: {value:?}")]
    Invalid { var: &'static str, value: String },

    #[error("Invalid server address format")]
    InvalidAddress,
}
