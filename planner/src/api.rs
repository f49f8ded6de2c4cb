//! Typed client for the CleanRoute backend and the third-party station feed.

use std::time::Duration;

use reqwest::{Client, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use shared::{
    ApiErrorBody, BoundingBox, Coordinate, DefaultLocation, GeocodeCandidate,
    HealthyRouteResponse, PlaceName, PollutionGrid, RouteGeometry, RouteRequest, SensorReading,
};

use crate::config::PlannerConfig;
use crate::error::ApiError;
use crate::station::{StationDetail, parse_feed};

pub const UNKNOWN_LOCATION: &str = "Unknown location";

#[derive(Clone)]
pub struct ApiClient {
    http: Client,
    api_root: String,
    waqi_root: String,
    waqi_token: String,
}

impl ApiClient {
    pub fn new(config: &PlannerConfig) -> Result<Self, ApiError> {
        let http = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|source| ApiError::Transport {
                endpoint: "client",
                source,
            })?;
        Ok(Self {
            http,
            api_root: config.api_root.clone(),
            waqi_root: config.waqi_root.trim_end_matches('/').to_string(),
            waqi_token: config.waqi_token.clone(),
        })
    }

    pub fn api_root(&self) -> &str {
        &self.api_root
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.api_root, path)
    }

    pub async fn directions(&self, request: &RouteRequest) -> Result<RouteGeometry, ApiError> {
        tracing::debug!(
            "requesting {:?} route ({:.5},{:.5}) -> ({:.5},{:.5})",
            request.profile,
            request.start.lat,
            request.start.lon,
            request.end.lat,
            request.end.lon
        );
        let builder = self.http.post(self.url("directions")).json(request);
        self.send("directions", builder).await
    }

    pub async fn healthy_route(
        &self,
        request: &RouteRequest,
    ) -> Result<HealthyRouteResponse, ApiError> {
        tracing::debug!("requesting healthy {:?} route", request.profile);
        let builder = self.http.post(self.url("healthy-route")).json(request);
        self.send("healthy-route", builder).await
    }

    pub async fn geocode(&self, query: &str) -> Result<Vec<GeocodeCandidate>, ApiError> {
        let builder = self
            .http
            .get(self.url("geocode"))
            .query(&[("query", query)]);
        self.send("geocode", builder).await
    }

    pub async fn reverse_geocode(&self, at: Coordinate) -> Result<String, ApiError> {
        let builder = self
            .http
            .get(self.url("reverse-geocode"))
            .query(&[("lng", at.lon), ("lat", at.lat)]);
        let place: PlaceName = self.send("reverse-geocode", builder).await?;
        Ok(place.place_name)
    }

    /// Reverse geocoding for labels: failures collapse to [`UNKNOWN_LOCATION`].
    pub async fn place_name_or_unknown(&self, at: Coordinate) -> String {
        match self.reverse_geocode(at).await {
            Ok(name) => name,
            Err(err) => {
                tracing::warn!("reverse geocoding failed: {err}");
                UNKNOWN_LOCATION.to_string()
            }
        }
    }

    pub async fn air_sensors(&self, bounds: BoundingBox) -> Result<Vec<SensorReading>, ApiError> {
        let builder = self
            .http
            .get(self.url("air-sensors"))
            .query(&bbox_params(bounds));
        let rows: Vec<serde_json::Value> = self.send("air-sensors", builder).await?;
        let readings = usable_readings(rows);
        tracing::debug!("received {} sensor readings", readings.len());
        Ok(readings)
    }

    pub async fn kriging_matrix(
        &self,
        bounds: BoundingBox,
        grid_size: u32,
    ) -> Result<PollutionGrid, ApiError> {
        let builder = self
            .http
            .get(self.url("kriging-matrix"))
            .query(&bbox_params(bounds))
            .query(&[("grid_size", grid_size)]);
        self.send("kriging-matrix", builder).await
    }

    pub async fn default_location(&self, timeout: Duration) -> Result<DefaultLocation, ApiError> {
        let builder = self
            .http
            .get(self.url("default-location"))
            .timeout(timeout);
        self.send("default-location", builder).await
    }

    pub async fn station_feed(&self, uid: i64) -> Result<StationDetail, ApiError> {
        let url = format!("{}/@{uid}/", self.waqi_root);
        let builder = self
            .http
            .get(url)
            .query(&[("token", self.waqi_token.as_str())]);
        let body: serde_json::Value = self.send("station-feed", builder).await?;
        parse_feed(body).map_err(|reason| ApiError::Rejected {
            endpoint: "station-feed",
            reason,
        })
    }

    async fn send<T: DeserializeOwned>(
        &self,
        endpoint: &'static str,
        builder: RequestBuilder,
    ) -> Result<T, ApiError> {
        let response = builder.send().await.map_err(|source| {
            if source.is_timeout() {
                ApiError::Timeout { endpoint }
            } else {
                ApiError::Transport { endpoint, source }
            }
        })?;

        let status = response.status();
        let bytes = response.bytes().await.map_err(|source| {
            if source.is_timeout() {
                ApiError::Timeout { endpoint }
            } else {
                ApiError::Transport { endpoint, source }
            }
        })?;

        if !status.is_success() {
            tracing::warn!("{endpoint} answered HTTP {}", status.as_u16());
            return Err(classify_status(endpoint, status, &bytes));
        }

        serde_json::from_slice(&bytes).map_err(|source| {
            tracing::error!(
                "failed to parse {endpoint} response: {source}. Body: {}",
                String::from_utf8_lossy(&bytes[..bytes.len().min(512)])
            );
            ApiError::Decode { endpoint, source }
        })
    }
}

fn bbox_params(bounds: BoundingBox) -> [(&'static str, f64); 4] {
    [
        ("south", bounds.min_lat),
        ("west", bounds.min_lon),
        ("north", bounds.max_lat),
        ("east", bounds.max_lon),
    ]
}

/// Decodes each row on its own so one malformed sensor does not drop the rest.
fn usable_readings(rows: Vec<serde_json::Value>) -> Vec<SensorReading> {
    let total = rows.len();
    let readings: Vec<SensorReading> = rows
        .into_iter()
        .filter_map(|row| serde_json::from_value(row).ok())
        .collect();
    if readings.len() < total {
        tracing::warn!(
            "skipped {} of {total} sensor rows without usable coordinates",
            total - readings.len()
        );
    }
    readings
}

fn classify_status(endpoint: &'static str, status: StatusCode, body: &[u8]) -> ApiError {
    match status {
        StatusCode::TOO_MANY_REQUESTS => ApiError::RateLimited { endpoint },
        StatusCode::BAD_GATEWAY | StatusCode::SERVICE_UNAVAILABLE | StatusCode::GATEWAY_TIMEOUT => {
            ApiError::Unavailable {
                endpoint,
                status: status.as_u16(),
            }
        }
        _ => {
            let upstream = serde_json::from_slice::<ApiErrorBody>(body)
                .ok()
                .and_then(|b| b.upstream_message().map(str::to_owned));
            ApiError::Status {
                endpoint,
                status: status.as_u16(),
                upstream,
            }
        }
    }
}
