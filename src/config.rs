use std::env;
use std::time::Duration;

use crate::error::AppError;

#[derive(Debug, Clone)]
pub struct Config {
    pub http_port: u16,
    pub log_level: String,
    pub event_buffer_size: usize,
    /// Platform-wide search radius around the order origin.
    pub search_radius_km: f64,
    pub tick_interval: Duration,
    pub inbox_ttl: Duration,
    /// How long an order stays biddable. Bounds the dedup sets and the
    /// accept marks.
    pub accept_window: Duration,
    /// Wall-clock age after which an unaccepted order is cancelled and
    /// its dispatch task torn down.
    pub max_dispatch_age: Duration,
    pub lock_wait: Duration,
    pub lock_lease: Duration,
}

impl Config {
    pub fn from_env() -> Result<Self, AppError> {
        let _ = dotenvy::dotenv();

        Ok(Self {
            http_port: parse_or_default("HTTP_PORT", 3000)?,
            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            event_buffer_size: parse_or_default("EVENT_BUFFER_SIZE", 1024)?,
            search_radius_km: parse_or_default("SEARCH_RADIUS_KM", 5.0)?,
            tick_interval: Duration::from_secs(parse_or_default("DISPATCH_TICK_SECS", 60)?),
            inbox_ttl: Duration::from_secs(parse_or_default("INBOX_TTL_SECS", 60)?),
            accept_window: Duration::from_secs(parse_or_default("ACCEPT_WINDOW_SECS", 900)?),
            max_dispatch_age: Duration::from_secs(parse_or_default("MAX_DISPATCH_AGE_SECS", 900)?),
            lock_wait: Duration::from_millis(parse_or_default("ACCEPT_LOCK_WAIT_MS", 5_000)?),
            lock_lease: Duration::from_millis(parse_or_default("ACCEPT_LOCK_LEASE_MS", 30_000)?),
        })
    }
}

fn parse_or_default<T>(key: &str, default: T) -> Result<T, AppError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(raw) => raw
            .parse::<T>()
            .map_err(|err| AppError::Internal(format!("invalid {key}: {err}"))),
        Err(_) => Ok(default),
    }
}
