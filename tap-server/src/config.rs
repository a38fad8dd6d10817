use std::env;
use std::str::FromStr;
use std::time::Duration;

use tap_core::{DEFAULT_ROUND_SECONDS, RoundConfig};
use tap_persistence::connection::DEFAULT_DATABASE_URL;
use tap_persistence::local::DEFAULT_LOCAL_STORE_PATH;
use tap_types::DeviceProfile;

use crate::profile_sync::RetryPolicy;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    Database,
    Local,
}

impl FromStr for StoreBackend {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_ascii_lowercase().as_str() {
            "database" | "db" => Ok(StoreBackend::Database),
            "local" => Ok(StoreBackend::Local),
            other => Err(format!("unknown store backend '{}'", other)),
        }
    }
}

pub fn parse_device_profile(value: &str) -> Result<DeviceProfile, String> {
    match value.to_ascii_lowercase().as_str() {
        "desktop" => Ok(DeviceProfile::Desktop),
        "touch" | "mobile" => Ok(DeviceProfile::Touch),
        other => Err(format!("unknown device profile '{}'", other)),
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub database_url: String,
    pub store_backend: StoreBackend,
    pub local_store_path: String,
    pub jwt_secret: String,
    pub session_ttl_minutes: i64,
    pub round_seconds: u32,
    pub device_profile: DeviceProfile,
    pub sync_max_attempts: u32,
    pub sync_retry_base_ms: u64,
}

impl Config {
    pub fn new() -> Self {
        Self {
            host: env::var("HOST").unwrap_or_else(|_| "127.0.0.1".to_string()),
            port: env::var("PORT")
                .unwrap_or_else(|_| "8080".to_string())
                .parse()
                .expect("Invalid PORT"),
            database_url: env::var("DATABASE_URL")
                .unwrap_or_else(|_| DEFAULT_DATABASE_URL.to_string()),
            store_backend: env::var("STORE_BACKEND")
                .unwrap_or_else(|_| "database".to_string())
                .parse()
                .expect("Invalid STORE_BACKEND"),
            local_store_path: env::var("LOCAL_STORE_PATH")
                .unwrap_or_else(|_| DEFAULT_LOCAL_STORE_PATH.to_string()),
            jwt_secret: env::var("JWT_SECRET").unwrap_or_else(|_| {
                tracing::warn!("JWT_SECRET not set, using an insecure development secret");
                "tap-rush-dev-secret".to_string()
            }),
            session_ttl_minutes: env::var("SESSION_TTL_MINUTES")
                .unwrap_or_else(|_| "720".to_string())
                .parse()
                .expect("Invalid SESSION_TTL_MINUTES"),
            round_seconds: env::var("ROUND_SECONDS")
                .unwrap_or_else(|_| DEFAULT_ROUND_SECONDS.to_string())
                .parse()
                .expect("Invalid ROUND_SECONDS"),
            device_profile: parse_device_profile(
                &env::var("DEVICE_PROFILE").unwrap_or_else(|_| "desktop".to_string()),
            )
            .expect("Invalid DEVICE_PROFILE"),
            sync_max_attempts: env::var("SYNC_MAX_ATTEMPTS")
                .unwrap_or_else(|_| "3".to_string())
                .parse()
                .expect("Invalid SYNC_MAX_ATTEMPTS"),
            sync_retry_base_ms: env::var("SYNC_RETRY_BASE_MS")
                .unwrap_or_else(|_| "250".to_string())
                .parse()
                .expect("Invalid SYNC_RETRY_BASE_MS"),
        }
    }

    /// Default round settings for new connections. Clients may still pick a
    /// device profile when starting a round.
    pub fn round_config(&self) -> RoundConfig {
        RoundConfig::for_device(self.device_profile).with_duration(self.round_seconds)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.sync_max_attempts.max(1),
            base_delay: Duration::from_millis(self.sync_retry_base_ms),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}
