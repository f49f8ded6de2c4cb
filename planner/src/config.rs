use std::{env, str::FromStr, time::Duration};

use thiserror::Error;

/// Station feed token used when none is configured. The provider accepts it
/// for low-volume lookups.
pub const DEMO_WAQI_TOKEN: &str = "demo";
pub const WAQI_FEED_ROOT: &str = "https://api.waqi.info/feed";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{name} must be a valid {expected}, got {value:?}")]
    Invalid {
        name: &'static str,
        expected: &'static str,
        value: String,
    },
}

#[derive(Debug, Clone)]
pub struct PlannerConfig {
    pub api_root: String,
    pub waqi_root: String,
    pub waqi_token: String,
    pub request_timeout: Duration,
    pub location: LocationTimeouts,
    pub sensor_debounce: Duration,
    pub search_debounce: Duration,
    pub notice_ttl: Duration,
    pub grid_size: u32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LocationTimeouts {
    /// Timeout handed to the platform geolocation call.
    pub device_timeout: Duration,
    /// Independent guard that forces the device tier to fail.
    pub device_guard: Duration,
    pub maximum_age: Duration,
    pub high_accuracy: bool,
    pub server_timeout: Duration,
}

impl Default for LocationTimeouts {
    fn default() -> Self {
        Self {
            device_timeout: Duration::from_secs(5),
            device_guard: Duration::from_secs(6),
            maximum_age: Duration::from_secs(60),
            high_accuracy: false,
            server_timeout: Duration::from_secs(3),
        }
    }
}

fn default_api_root() -> String {
    if let Some(url) = option_env!("CLEANROUTE_API_ROOT") {
        return url.trim_end_matches('/').to_string();
    }
    "http://localhost:3000/api".to_string()
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            api_root: default_api_root(),
            waqi_root: WAQI_FEED_ROOT.to_string(),
            waqi_token: DEMO_WAQI_TOKEN.to_string(),
            request_timeout: Duration::from_secs(15),
            location: LocationTimeouts::default(),
            sensor_debounce: Duration::from_millis(800),
            search_debounce: Duration::from_millis(500),
            notice_ttl: Duration::from_secs(5),
            grid_size: 20,
        }
    }
}

impl PlannerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Builds a config from an arbitrary variable source, falling back to
    /// defaults for unset names.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(root) = lookup("CLEANROUTE_API_URL") {
            config.api_root = root.trim_end_matches('/').to_string();
        }
        if let Some(token) = lookup("CLEANROUTE_WAQI_TOKEN").filter(|t| !t.trim().is_empty()) {
            config.waqi_token = token;
        }
        if let Some(secs) = parse_var::<u64>(&lookup, "CLEANROUTE_REQUEST_TIMEOUT_SECS", "integer")? {
            config.request_timeout = Duration::from_secs(secs);
        }
        if let Some(ms) = parse_var::<u64>(&lookup, "CLEANROUTE_SENSOR_DEBOUNCE_MS", "integer")? {
            config.sensor_debounce = Duration::from_millis(ms);
        }
        if let Some(secs) = parse_var::<u64>(&lookup, "CLEANROUTE_NOTICE_TTL_SECS", "integer")? {
            config.notice_ttl = Duration::from_secs(secs);
        }
        if let Some(size) = parse_var::<u32>(&lookup, "CLEANROUTE_GRID_SIZE", "integer")? {
            config.grid_size = size.max(1);
        }

        Ok(config)
    }

    pub fn with_api_root(mut self, root: impl Into<String>) -> Self {
        self.api_root = root.into().trim_end_matches('/').to_string();
        self
    }
}

fn parse_var<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &'static str,
    expected: &'static str,
) -> Result<Option<T>, ConfigError> {
    match lookup(name) {
        None => Ok(None),
        Some(value) => value
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| ConfigError::Invalid {
                name,
                expected,
                value,
            }),
    }
}
