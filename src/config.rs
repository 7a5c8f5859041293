use std::env;
use std::time::Duration;

use crate::error::DispatchError;

#[derive(Debug, Clone)]
pub struct Config {
    pub log_level: String,
    pub poll_period_secs: u64,
    pub refresh_timeout_secs: u64,
    pub max_consecutive_errors: u32,
    pub position_sample_secs: u64,
    pub desired_accuracy_m: f64,
    pub default_radius_km: f64,
    pub new_request_window_hours: i64,
    pub test_mode: bool,
}

impl Config {
    pub fn from_env() -> Result<Self, DispatchError> {
        let _ = dotenvy::dotenv();

        Ok(Self {
            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            poll_period_secs: parse_or_default("POLL_PERIOD_SECS", 120)?,
            refresh_timeout_secs: parse_or_default("REFRESH_TIMEOUT_SECS", 30)?,
            max_consecutive_errors: parse_or_default("MAX_CONSECUTIVE_ERRORS", 3)?,
            position_sample_secs: parse_or_default("POSITION_SAMPLE_SECS", 300)?,
            desired_accuracy_m: parse_or_default("DESIRED_ACCURACY_M", 50.0)?,
            default_radius_km: parse_or_default("DEFAULT_RADIUS_KM", 5.0)?,
            new_request_window_hours: parse_or_default("NEW_REQUEST_WINDOW_HOURS", 48)?,
            test_mode: parse_or_default("TEST_MODE", false)?,
        })
    }

    pub fn poll_period(&self) -> Duration {
        Duration::from_secs(self.poll_period_secs)
    }

    pub fn refresh_timeout(&self) -> Duration {
        Duration::from_secs(self.refresh_timeout_secs)
    }

    pub fn position_sample_interval(&self) -> Duration {
        Duration::from_secs(self.position_sample_secs)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            poll_period_secs: 120,
            refresh_timeout_secs: 30,
            max_consecutive_errors: 3,
            position_sample_secs: 300,
            desired_accuracy_m: 50.0,
            default_radius_km: 5.0,
            new_request_window_hours: 48,
            test_mode: false,
        }
    }
}

fn parse_or_default<T>(key: &str, default: T) -> Result<T, DispatchError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(raw) => raw
            .parse::<T>()
            .map_err(|err| DispatchError::Internal(format!("invalid {key}: {err}"))),
        Err(_) => Ok(default),
    }
}
