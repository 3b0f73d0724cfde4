//! Application configuration loaded from environment variables.

use std::str::FromStr;
use std::time::Duration;

use negotiation::NegotiationConfig;

/// Server configuration with sensible defaults.
///
/// Reads from environment variables:
/// - `HOST`: bind address (default `"0.0.0.0"`)
/// - `PORT`: listen port (default `3000`)
/// - `RUST_LOG`: tracing filter directive (default `"info"`)
/// - `DATABASE_URL`: PostgreSQL connection string; in-memory store if unset
/// - `OFFER_COUNTER_WINDOW_HOURS`: response deadline set by a counter (default `48`)
/// - `NOTIFICATION_DEDUP_SECS`: repeat-suppression window (default `30`)
/// - `NOTIFICATION_TIMEOUT_MS`: bound on one side-effect call (default `2000`)
/// - `OFFER_EXPIRY_SWEEP_SECS`: background expiry period; off if unset or `0`
/// - `RATE_LIMIT_PER_MINUTE`: offer requests allowed per caller (default `120`)
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub database_url: Option<String>,
    pub counter_window_hours: i64,
    pub dedup_secs: u64,
    pub notification_timeout_ms: u64,
    pub sweep_secs: Option<u64>,
    pub rate_limit_per_minute: u32,
}

impl Config {
    /// Loads configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Loads configuration from an arbitrary variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();

        Self {
            host: lookup("HOST").unwrap_or(defaults.host),
            port: var(&lookup, "PORT").unwrap_or(defaults.port),
            log_level: lookup("RUST_LOG").unwrap_or(defaults.log_level),
            database_url: lookup("DATABASE_URL").filter(|url| !url.is_empty()),
            counter_window_hours: parse_positive(var(&lookup, "OFFER_COUNTER_WINDOW_HOURS"))
                .unwrap_or(defaults.counter_window_hours),
            dedup_secs: var(&lookup, "NOTIFICATION_DEDUP_SECS").unwrap_or(defaults.dedup_secs),
            notification_timeout_ms: parse_positive(var(&lookup, "NOTIFICATION_TIMEOUT_MS"))
                .unwrap_or(defaults.notification_timeout_ms),
            sweep_secs: parse_positive(var(&lookup, "OFFER_EXPIRY_SWEEP_SECS")),
            rate_limit_per_minute: parse_positive(var(&lookup, "RATE_LIMIT_PER_MINUTE"))
                .unwrap_or(defaults.rate_limit_per_minute),
        }
    }

    /// Returns the `"host:port"` bind address string.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Settings for the negotiation service.
    pub fn negotiation(&self) -> NegotiationConfig {
        let defaults = NegotiationConfig::default();
        let counter_window = chrono::TimeDelta::try_hours(self.counter_window_hours)
            .unwrap_or(defaults.counter_window);
        let mut config = defaults
            .with_counter_window(counter_window)
            .with_dedup_window(Duration::from_secs(self.dedup_secs))
            .with_notification_timeout(Duration::from_millis(self.notification_timeout_ms));
        if let Some(secs) = self.sweep_secs {
            config = config.with_sweep_interval(Duration::from_secs(secs));
        }
        config
    }
}

fn var<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, name: &str) -> Option<T> {
    lookup(name).and_then(|value| value.trim().parse().ok())
}

fn parse_positive<T: PartialOrd + Default>(value: Option<T>) -> Option<T> {
    value.filter(|v| *v > T::default())
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            log_level: "info".to_string(),
            database_url: None,
            counter_window_hours: domain::DEFAULT_COUNTER_WINDOW_HOURS,
            dedup_secs: negotiation::DEFAULT_DEDUP_WINDOW.as_secs(),
            notification_timeout_ms: 2000,
            sweep_secs: None,
            rate_limit_per_minute: 120,
        }
    }
}
