use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{endpoint} rate limited the request (HTTP 429)")]
    RateLimited { endpoint: &'static str },
    #[error("{endpoint} is unavailable (HTTP {status})")]
    Unavailable { endpoint: &'static str, status: u16 },
    #[error("{endpoint} returned HTTP {status}{}", .upstream.as_deref().map(|m| format!(": {m}")).unwrap_or_default())]
    Status {
        endpoint: &'static str,
        status: u16,
        upstream: Option<String>,
    },
    #[error("request to {endpoint} timed out")]
    Timeout { endpoint: &'static str },
    #[error("request to {endpoint} failed: {source}")]
    Transport {
        endpoint: &'static str,
        #[source]
        source: reqwest::Error,
    },
    #[error("invalid response from {endpoint}: {source}")]
    Decode {
        endpoint: &'static str,
        #[source]
        source: serde_json::Error,
    },
    #[error("{endpoint} rejected the request: {reason}")]
    Rejected {
        endpoint: &'static str,
        reason: String,
    },
}

impl ApiError {
    pub fn endpoint(&self) -> &'static str {
        match self {
            Self::RateLimited { endpoint }
            | Self::Unavailable { endpoint, .. }
            | Self::Status { endpoint, .. }
            | Self::Timeout { endpoint }
            | Self::Transport { endpoint, .. }
            | Self::Decode { endpoint, .. }
            | Self::Rejected { endpoint, .. } => *endpoint,
        }
    }

    pub fn is_rate_limited(&self) -> bool {
        matches!(self, Self::RateLimited { .. })
    }

    pub fn upstream_message(&self) -> Option<&str> {
        match self {
            Self::Status { upstream, .. } => upstream.as_deref(),
            _ => None,
        }
    }
}

/// Device geolocation failures, mirroring the platform's error codes.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GeolocationError {
    #[error("geolocation is not supported on this device")]
    Unsupported,
    #[error("permission to read the location was denied")]
    PermissionDenied,
    #[error("position unavailable: {0}")]
    PositionUnavailable(String),
    #[error("geolocation timed out")]
    Timeout,
}
