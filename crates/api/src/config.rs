//! Application configuration loaded from environment variables.

use std::time::Duration;

/// Server and worker configuration with sensible defaults.
///
/// Reads from environment variables:
/// - `HOST` — bind address (default: `"0.0.0.0"`)
/// - `PORT` — listen port (default: `3000`)
/// - `RUST_LOG` — tracing filter directive (default: `"info"`)
/// - `RELAY_POLL_INTERVAL_MS` — outbox relay poll cadence (default: `5000`)
/// - `CONSUMER_POLL_INTERVAL_MS` — broker poll cadence (default: `500`)
/// - `REAPER_SCAN_INTERVAL_SECS` — reservation expiry scan cadence
///   (default: `60`)
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub relay_poll_interval: Duration,
    pub consumer_poll_interval: Duration,
    pub reaper_scan_interval: Duration,
}

impl Config {
    /// Loads configuration from environment variables, falling back to
    /// defaults.
    pub fn from_env() -> Self {
        Self {
            host: std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: std::env::var("PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(3000),
            log_level: std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
            relay_poll_interval: env_millis("RELAY_POLL_INTERVAL_MS", 5000),
            consumer_poll_interval: env_millis("CONSUMER_POLL_INTERVAL_MS", 500),
            reaper_scan_interval: Duration::from_secs(
                std::env::var("REAPER_SCAN_INTERVAL_SECS")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(60),
            ),
        }
    }

    /// Returns the `"host:port"` bind address string.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn env_millis(var: &str, default: u64) -> Duration {
    Duration::from_millis(
        std::env::var(var)
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(default),
    )
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            log_level: "info".to_string(),
            relay_poll_interval: Duration::from_millis(5000),
            consumer_poll_interval: Duration::from_millis(500),
            reaper_scan_interval: Duration::from_secs(60),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_values() {
        let config = Config::default();
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 3000);
        assert_eq!(config.log_level, "info");
        assert_eq!(config.relay_poll_interval, Duration::from_millis(5000));
        assert_eq!(config.reaper_scan_interval, Duration::from_secs(60));
    }

    #[test]
    fn test_addr_formatting() {
        let config = Config {
            host: "127.0.0.1".to_string(),
            port: 8080,
            ..Config::default()
        };
        assert_eq!(config.addr(), "127.0.0.1:8080");
    }

    #[test]
    fn test_addr_default() {
        let config = Config::default();
        assert_eq!(config.addr(), "0.0.0.0:3000");
    }
}
