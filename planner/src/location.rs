//! Best-effort start location: device geolocation, then the server's
//! suggested default, then a compiled-in city center.
//!
//! Resolution never fails outward. A fault inside any tier is logged and
//! treated as that tier failing; the hardcoded tier cannot fail.

use std::{future::Future, time::Duration};

use shared::{DefaultLocation, LocationFix, LocationSource};
use thiserror::Error;

use crate::api::ApiClient;
use crate::config::LocationTimeouts;
use crate::error::{ApiError, GeolocationError};

pub const DEFAULT_LAT: f64 = 46.770439;
pub const DEFAULT_LON: f64 = 23.591423;
pub const DEFAULT_PLACE_NAME: &str = "Cluj-Napoca, Romania";

pub fn hardcoded_fix() -> LocationFix {
    LocationFix {
        lat: DEFAULT_LAT,
        lon: DEFAULT_LON,
        accuracy: None,
        place_name: Some(DEFAULT_PLACE_NAME.to_string()),
        source: LocationSource::Hardcoded,
    }
}

/// Options handed to the platform geolocation call.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PositionOptions {
    pub timeout: Duration,
    pub maximum_age: Duration,
    pub enable_high_accuracy: bool,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DevicePosition {
    pub lat: f64,
    pub lon: f64,
    /// Accuracy radius in meters.
    pub accuracy: f64,
}

pub trait DeviceLocator: Send + Sync {
    fn current_position(
        &self,
        options: PositionOptions,
    ) -> impl Future<Output = Result<DevicePosition, GeolocationError>> + Send;
}

pub trait FallbackLocator: Send + Sync {
    fn default_location(
        &self,
        timeout: Duration,
    ) -> impl Future<Output = Result<DefaultLocation, ApiError>> + Send;
}

impl FallbackLocator for ApiClient {
    fn default_location(
        &self,
        timeout: Duration,
    ) -> impl Future<Output = Result<DefaultLocation, ApiError>> + Send {
        ApiClient::default_location(self, timeout)
    }
}

/// Device without any location capability.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoDevice;

impl DeviceLocator for NoDevice {
    fn current_position(
        &self,
        _options: PositionOptions,
    ) -> impl Future<Output = Result<DevicePosition, GeolocationError>> + Send {
        async { Err(GeolocationError::Unsupported) }
    }
}

/// Device reporting a known position, e.g. one supplied on the command line.
#[derive(Debug, Clone, Copy)]
pub struct FixedDevice(pub DevicePosition);

impl DeviceLocator for FixedDevice {
    fn current_position(
        &self,
        _options: PositionOptions,
    ) -> impl Future<Output = Result<DevicePosition, GeolocationError>> + Send {
        let position = self.0;
        async move { Ok(position) }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tier {
    Precise,
    Fallback,
    Hardcoded,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedLocation {
    pub tier: Tier,
    pub fix: LocationFix,
}

impl ResolvedLocation {
    pub fn suggested_zoom(&self) -> u8 {
        match self.tier {
            Tier::Precise => 15,
            Tier::Fallback => 13,
            Tier::Hardcoded => 12,
        }
    }

    /// Banner text for the less precise tiers.
    pub fn advisory(&self) -> Option<String> {
        let place = self.fix.place_name.as_deref().unwrap_or(DEFAULT_PLACE_NAME);
        match self.tier {
            Tier::Precise => None,
            Tier::Fallback => Some(format!(
                "Couldn't access your precise location. Using approximate location: {place}."
            )),
            Tier::Hardcoded => Some(format!(
                "Couldn't determine your location. Showing {place}; set your start point manually."
            )),
        }
    }
}

/// Receives exactly one call per resolution, naming the tier that answered.
pub trait LocationObserver {
    fn on_precise(&mut self, fix: &LocationFix);
    fn on_fallback(&mut self, fix: &LocationFix);
    fn on_hardcoded(&mut self, fix: &LocationFix);
}

/// Closure-backed observer.
pub struct LocationCallbacks<P, F, H> {
    pub on_precise: P,
    pub on_fallback: F,
    pub on_hardcoded: H,
}

impl<P, F, H> LocationObserver for LocationCallbacks<P, F, H>
where
    P: FnMut(&LocationFix),
    F: FnMut(&LocationFix),
    H: FnMut(&LocationFix),
{
    fn on_precise(&mut self, fix: &LocationFix) {
        (self.on_precise)(fix)
    }

    fn on_fallback(&mut self, fix: &LocationFix) {
        (self.on_fallback)(fix)
    }

    fn on_hardcoded(&mut self, fix: &LocationFix) {
        (self.on_hardcoded)(fix)
    }
}

#[derive(Debug, Error)]
enum AttemptError {
    #[error("device geolocation failed: {0}")]
    Device(#[from] GeolocationError),
    #[error("server fallback failed: {0}")]
    Server(#[from] ApiError),
    #[error("no answer within {0:?}")]
    TimedOut(Duration),
    #[error("server fallback returned no usable coordinates")]
    Incomplete,
}

/// Fallible tiers, tried in order before the hardcoded default.
#[derive(Debug, Clone, Copy)]
enum Attempt {
    Device,
    Server,
}

impl Attempt {
    const ORDER: [Attempt; 2] = [Attempt::Device, Attempt::Server];

    fn tier(self) -> Tier {
        match self {
            Attempt::Device => Tier::Precise,
            Attempt::Server => Tier::Fallback,
        }
    }
}

pub struct LocationResolver<D, F> {
    device: D,
    fallback: F,
    timeouts: LocationTimeouts,
}

impl<D: DeviceLocator, F: FallbackLocator> LocationResolver<D, F> {
    pub fn new(device: D, fallback: F, timeouts: LocationTimeouts) -> Self {
        Self {
            device,
            fallback,
            timeouts,
        }
    }

    /// Resolves and reports the winning tier to `observer`.
    pub async fn resolve(&self, observer: &mut impl LocationObserver) -> ResolvedLocation {
        let resolved = self.locate().await;
        match resolved.tier {
            Tier::Precise => observer.on_precise(&resolved.fix),
            Tier::Fallback => observer.on_fallback(&resolved.fix),
            Tier::Hardcoded => observer.on_hardcoded(&resolved.fix),
        }
        resolved
    }

    pub async fn locate(&self) -> ResolvedLocation {
        for attempt in Attempt::ORDER {
            let tier = attempt.tier();
            let outcome = match attempt {
                Attempt::Device => self.from_device().await,
                Attempt::Server => self.from_server().await,
            };
            match outcome {
                Ok(fix) => {
                    tracing::info!(
                        "location resolved via {:?} tier: {:.5},{:.5}",
                        tier,
                        fix.lat,
                        fix.lon
                    );
                    return ResolvedLocation { tier, fix };
                }
                Err(err) => tracing::warn!("{:?} location tier failed: {err}", tier),
            }
        }
        tracing::info!("using hardcoded location {DEFAULT_PLACE_NAME}");
        ResolvedLocation {
            tier: Tier::Hardcoded,
            fix: hardcoded_fix(),
        }
    }

    async fn from_device(&self) -> Result<LocationFix, AttemptError> {
        let options = PositionOptions {
            timeout: self.timeouts.device_timeout,
            maximum_age: self.timeouts.maximum_age,
            enable_high_accuracy: self.timeouts.high_accuracy,
        };
        // The platform timeout is not trusted; the guard bounds the wait regardless.
        let guard = self.timeouts.device_guard;
        let position = tokio::time::timeout(guard, self.device.current_position(options))
            .await
            .map_err(|_| AttemptError::TimedOut(guard))??;
        Ok(LocationFix {
            lat: position.lat,
            lon: position.lon,
            accuracy: Some(position.accuracy),
            place_name: None,
            source: LocationSource::Device,
        })
    }

    async fn from_server(&self) -> Result<LocationFix, AttemptError> {
        let limit = self.timeouts.server_timeout;
        let suggested = tokio::time::timeout(limit, self.fallback.default_location(limit))
            .await
            .map_err(|_| AttemptError::TimedOut(limit))??;
        match (suggested.lat, suggested.lng) {
            (Some(lat), Some(lon)) if lat != 0.0 && lon != 0.0 => Ok(LocationFix {
                lat,
                lon,
                accuracy: None,
                place_name: suggested.place_name,
                source: LocationSource::Server,
            }),
            _ => Err(AttemptError::Incomplete),
        }
    }
}
