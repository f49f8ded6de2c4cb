pub mod aqi;

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub lat: f64,
    pub lon: f64,
}

impl Coordinate {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }
}

/// `[lat, lon]` pair encoding used by the directions endpoints.
pub mod lat_lon_pair {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    use super::Coordinate;

    pub fn serialize<S: Serializer>(coord: &Coordinate, serializer: S) -> Result<S::Ok, S::Error> {
        [coord.lat, coord.lon].serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Coordinate, D::Error> {
        let [lat, lon] = <[f64; 2]>::deserialize(deserializer)?;
        Ok(Coordinate { lat, lon })
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransportProfile {
    #[default]
    #[serde(rename = "foot-walking")]
    Walking,
    #[serde(rename = "cycling-regular")]
    Cycling,
    #[serde(rename = "driving-car")]
    Driving,
}

impl TransportProfile {
    pub const ALL: [TransportProfile; 3] = [Self::Walking, Self::Cycling, Self::Driving];

    pub fn label(self) -> &'static str {
        match self {
            Self::Walking => "Walking",
            Self::Cycling => "Cycling",
            Self::Driving => "Driving",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RouteRequest {
    #[serde(with = "lat_lon_pair")]
    pub start: Coordinate,
    #[serde(with = "lat_lon_pair")]
    pub end: Coordinate,
    #[serde(default)]
    pub profile: TransportProfile,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub min_lat: f64,
    pub max_lat: f64,
    pub min_lon: f64,
    pub max_lon: f64,
}

impl BoundingBox {
    pub fn contains(&self, coord: Coordinate) -> bool {
        coord.lat >= self.min_lat
            && coord.lat <= self.max_lat
            && coord.lon >= self.min_lon
            && coord.lon <= self.max_lon
    }

    /// Smallest box enclosing every point, `None` for an empty input.
    pub fn from_points(points: impl IntoIterator<Item = Coordinate>) -> Option<Self> {
        points.into_iter().fold(None, |acc, p| {
            Some(match acc {
                None => Self {
                    min_lat: p.lat,
                    max_lat: p.lat,
                    min_lon: p.lon,
                    max_lon: p.lon,
                },
                Some(b) => Self {
                    min_lat: b.min_lat.min(p.lat),
                    max_lat: b.max_lat.max(p.lat),
                    min_lon: b.min_lon.min(p.lon),
                    max_lon: b.max_lon.max(p.lon),
                },
            })
        })
    }

    /// Box around a viewport center spanning `span_deg` degrees in each direction.
    pub fn around(center: Coordinate, span_deg: f64) -> Self {
        Self {
            min_lat: center.lat - span_deg,
            max_lat: center.lat + span_deg,
            min_lon: center.lon - span_deg,
            max_lon: center.lon + span_deg,
        }
    }

    pub fn center(&self) -> Coordinate {
        Coordinate {
            lat: (self.min_lat + self.max_lat) / 2.0,
            lon: (self.min_lon + self.max_lon) / 2.0,
        }
    }
}

/// GeoJSON FeatureCollection owned by the directions service, kept opaque.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RouteGeometry(pub Value);

impl RouteGeometry {
    pub fn features(&self) -> &[Value] {
        self.0
            .get("features")
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn is_empty(&self) -> bool {
        self.features().is_empty()
    }

    /// Positions of each feature geometry, one list per feature, converted
    /// from GeoJSON `[lon, lat]` order.
    pub fn feature_paths(&self) -> impl Iterator<Item = Vec<Coordinate>> + '_ {
        self.features().iter().map(|feature| {
            let mut out = Vec::new();
            if let Some(geometry) = feature.get("geometry") {
                collect_geometry(geometry, &mut out);
            }
            out
        })
    }

    /// Every position of every feature geometry.
    pub fn positions(&self) -> Vec<Coordinate> {
        self.feature_paths().flatten().collect()
    }
}

fn collect_geometry(geometry: &Value, out: &mut Vec<Coordinate>) {
    if let Some(coords) = geometry.get("coordinates") {
        collect_positions(coords, out);
    }
    if let Some(children) = geometry.get("geometries").and_then(Value::as_array) {
        for child in children {
            collect_geometry(child, out);
        }
    }
}

fn collect_positions(value: &Value, out: &mut Vec<Coordinate>) {
    let Some(items) = value.as_array() else {
        return;
    };
    if items.len() >= 2 && items.iter().all(Value::is_number) {
        if let (Some(lon), Some(lat)) = (items[0].as_f64(), items[1].as_f64()) {
            out.push(Coordinate { lat, lon });
        }
    } else {
        for item in items {
            collect_positions(item, out);
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StationMeta {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub time: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorReading {
    #[serde(default)]
    pub uid: Option<i64>,
    pub lat: f64,
    pub lon: f64,
    #[serde(default, deserialize_with = "aqi::deserialize_lenient")]
    pub aqi: Option<f64>,
    #[serde(default)]
    pub station: Option<StationMeta>,
}

impl SensorReading {
    pub fn station_name(&self) -> Option<&str> {
        self.station.as_ref().and_then(|s| s.name.as_deref())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeocodeCandidate {
    pub place_name: String,
    /// GeoJSON order: `[lon, lat]`.
    pub center: [f64; 2],
}

impl GeocodeCandidate {
    pub fn coordinate(&self) -> Coordinate {
        Coordinate {
            lat: self.center[1],
            lon: self.center[0],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaceName {
    pub place_name: String,
}

/// Server-suggested start location. Fields are optional on the wire and
/// only a payload with both coordinates is usable.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DefaultLocation {
    #[serde(default)]
    pub lat: Option<f64>,
    #[serde(default)]
    pub lng: Option<f64>,
    #[serde(default)]
    pub place_name: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LocationSource {
    Device,
    Server,
    Hardcoded,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocationFix {
    pub lat: f64,
    pub lon: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accuracy: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub place_name: Option<String>,
    pub source: LocationSource,
}

impl LocationFix {
    pub fn coordinate(&self) -> Coordinate {
        Coordinate {
            lat: self.lat,
            lon: self.lon,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RouteComparison {
    pub standard_distance_m: f64,
    pub healthy_distance_m: f64,
    pub standard_exposure: f64,
    pub healthy_exposure: f64,
}

impl RouteComparison {
    /// Percentage of pollution exposure avoided by the healthy route.
    pub fn exposure_reduction_pct(&self) -> Option<f64> {
        (self.standard_exposure > 0.0)
            .then(|| (self.standard_exposure - self.healthy_exposure) / self.standard_exposure * 100.0)
    }

    /// Extra distance walked, as a percentage of the standard route.
    pub fn extra_distance_pct(&self) -> Option<f64> {
        (self.standard_distance_m > 0.0).then(|| {
            (self.healthy_distance_m - self.standard_distance_m) / self.standard_distance_m * 100.0
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthyRouteResponse {
    pub route: RouteGeometry,
    #[serde(default, alias = "metrics")]
    pub comparison: Option<RouteComparison>,
}

/// Interpolated pollution field returned by `/kriging-matrix`, row-major
/// from the south-west corner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PollutionGrid {
    pub bounds: BoundingBox,
    #[serde(default)]
    pub values: Vec<Vec<Option<f64>>>,
}

impl PollutionGrid {
    pub fn rows(&self) -> usize {
        self.values.len()
    }

    pub fn cols(&self) -> usize {
        self.values.first().map(Vec::len).unwrap_or(0)
    }

    pub fn cell_bounds(&self, row: usize, col: usize) -> BoundingBox {
        let lat_step = (self.bounds.max_lat - self.bounds.min_lat) / self.rows().max(1) as f64;
        let lon_step = (self.bounds.max_lon - self.bounds.min_lon) / self.cols().max(1) as f64;
        BoundingBox {
            min_lat: self.bounds.min_lat + row as f64 * lat_step,
            max_lat: self.bounds.min_lat + (row + 1) as f64 * lat_step,
            min_lon: self.bounds.min_lon + col as f64 * lon_step,
            max_lon: self.bounds.min_lon + (col + 1) as f64 * lon_step,
        }
    }

    /// Cells that carry a value, with their geographic extent.
    pub fn cells(&self) -> impl Iterator<Item = (BoundingBox, f64)> + '_ {
        self.values.iter().enumerate().flat_map(move |(row, line)| {
            line.iter()
                .enumerate()
                .filter_map(move |(col, value)| value.map(|v| (self.cell_bounds(row, col), v)))
        })
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ApiErrorBody {
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub details: Option<ErrorDetails>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ErrorDetails {
    #[serde(default)]
    pub error: Option<ErrorDetail>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ErrorDetail {
    #[serde(default)]
    pub code: Option<u32>,
    #[serde(default)]
    pub message: Option<String>,
}

impl ApiErrorBody {
    /// Message forwarded from the upstream routing provider, if any.
    pub fn upstream_message(&self) -> Option<&str> {
        self.details
            .as_ref()
            .and_then(|d| d.error.as_ref())
            .and_then(|e| e.message.as_deref())
    }
}
