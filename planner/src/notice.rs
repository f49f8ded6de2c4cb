//! Transient user-facing banners. Every failure in the planner ends here.

use crate::error::ApiError;

pub const NO_ROUTE: &str = "No route found between these points.";
pub const NO_HEALTHY_ROUTE: &str =
    "No healthier route found between these points. Showing the standard route.";
pub const ROUTE_RATE_LIMITED: &str =
    "Too many route requests: the routing service is rate limiting us. Please wait a moment and try again.";
pub const ROUTE_UNAVAILABLE: &str =
    "The routing service is temporarily unavailable. Please try again later.";
pub const ROUTE_FAILED: &str =
    "Failed to fetch route. Please try different points or try again later.";
pub const HEALTHY_ROUTE_FAILED: &str =
    "Could not calculate a healthier route. Showing the standard route.";
pub const AIR_RATE_LIMITED: &str =
    "Too many air quality requests: the service is rate limiting us. Please wait a moment.";
pub const AIR_FAILED: &str = "Could not load air quality data.";
pub const POINTS_MISSING: &str = "Set both a start point and a destination first.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeLevel {
    Info,
    Warning,
    Error,
}

/// What a notice is about; a newer notice replaces an older one of the same
/// topic and clearing is done per topic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeTopic {
    Location,
    Route,
    AirQuality,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Notice {
    pub id: u64,
    pub topic: NoticeTopic,
    pub level: NoticeLevel,
    pub text: String,
}

pub fn route_failure(err: &ApiError) -> String {
    match err {
        ApiError::RateLimited { .. } => ROUTE_RATE_LIMITED.to_string(),
        ApiError::Unavailable { .. } | ApiError::Timeout { .. } => ROUTE_UNAVAILABLE.to_string(),
        _ => match err.upstream_message() {
            Some(message) => format!("Route error: {message}"),
            None => ROUTE_FAILED.to_string(),
        },
    }
}

pub fn healthy_route_failure(err: &ApiError) -> String {
    match err {
        ApiError::RateLimited { .. } => ROUTE_RATE_LIMITED.to_string(),
        _ => HEALTHY_ROUTE_FAILED.to_string(),
    }
}

pub fn air_quality_failure(err: &ApiError) -> String {
    match err {
        ApiError::RateLimited { .. } => AIR_RATE_LIMITED.to_string(),
        _ => AIR_FAILED.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rate_limit_is_distinct_from_generic_failure() {
        let text = route_failure(&ApiError::RateLimited {
            endpoint: "directions",
        });
        assert!(text.contains("rate limiting"));
        assert_ne!(text, ROUTE_FAILED);
    }

    #[test]
    fn unavailable_and_timeout_share_wording() {
        let unavailable = route_failure(&ApiError::Unavailable {
            endpoint: "directions",
            status: 503,
        });
        let timeout = route_failure(&ApiError::Timeout {
            endpoint: "directions",
        });
        assert_eq!(unavailable, ROUTE_UNAVAILABLE);
        assert_eq!(timeout, ROUTE_UNAVAILABLE);
    }

    #[test]
    fn upstream_message_is_forwarded() {
        let text = route_failure(&ApiError::Status {
            endpoint: "directions",
            status: 404,
            upstream: Some("Route could not be found".into()),
        });
        assert_eq!(text, "Route error: Route could not be found");
    }

    #[test]
    fn anything_else_is_generic() {
        let text = route_failure(&ApiError::Status {
            endpoint: "directions",
            status: 500,
            upstream: None,
        });
        assert_eq!(text, ROUTE_FAILED);
        assert_eq!(
            air_quality_failure(&ApiError::RateLimited {
                endpoint: "air-sensors"
            }),
            AIR_RATE_LIMITED
        );
    }
}
