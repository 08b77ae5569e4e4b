//! Server configuration.

use std::str::FromStr;
use std::time::Duration;

use log::warn;

use itemization_shared::{DEFAULT_PORT, SERVER_TICK_RATE};

/// Seconds without a packet before a client is dropped
pub const DEFAULT_CONNECTION_TIMEOUT_SECS: f32 = 30.0;

const PORT_VAR: &str = "ITEMIZATION_PORT";
const TICK_RATE_VAR: &str = "ITEMIZATION_TICK_RATE";
const TIMEOUT_VAR: &str = "ITEMIZATION_TIMEOUT_SECS";
const ENEMIES_VAR: &str = "ITEMIZATION_ENEMIES";

#[derive(Debug, Clone, PartialEq)]
pub struct ServerConfig {
    pub port: u16,
    /// Ticks per second
    pub tick_rate: u32,
    pub connection_timeout: Duration,
    /// Populate the world with enemies at startup
    pub spawn_enemies: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            tick_rate: SERVER_TICK_RATE,
            connection_timeout: Duration::from_secs_f32(DEFAULT_CONNECTION_TIMEOUT_SECS),
            spawn_enemies: true,
        }
    }
}

impl ServerConfig {
    /// Defaults overridden by `ITEMIZATION_*` environment variables
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();

        let tick_rate = match parse_var(&lookup, TICK_RATE_VAR) {
            Some(0) => {
                warn!("{} must be positive, using {}", TICK_RATE_VAR, defaults.tick_rate);
                defaults.tick_rate
            }
            Some(rate) => rate,
            None => defaults.tick_rate,
        };

        let connection_timeout = match parse_var::<f32>(&lookup, TIMEOUT_VAR) {
            Some(secs) if secs.is_finite() && secs > 0.0 => Duration::from_secs_f32(secs),
            Some(secs) => {
                warn!("Ignoring {}={}", TIMEOUT_VAR, secs);
                defaults.connection_timeout
            }
            None => defaults.connection_timeout,
        };

        Self {
            port: parse_var(&lookup, PORT_VAR).unwrap_or(defaults.port),
            tick_rate,
            connection_timeout,
            spawn_enemies: parse_var(&lookup, ENEMIES_VAR).unwrap_or(defaults.spawn_enemies),
        }
    }

    pub fn tick_duration(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.tick_rate.max(1) as f64)
    }
}

fn parse_var<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    let raw = lookup(key)?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!("Invalid value for {}: {:?}, using default", key, raw);
            None
        }
    }
}
