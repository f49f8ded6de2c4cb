//! Station detail from the third-party air-quality feed, and the popup shown
//! when a sensor marker is selected.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;
use shared::{SensorReading, aqi};

/// Species reported as pollutants; every other `iaqi` entry is weather.
pub const POLLUTANTS: [&str; 6] = ["pm25", "pm10", "o3", "no2", "so2", "co"];

#[derive(Debug, Clone, PartialEq)]
pub struct Measurement {
    pub species: String,
    pub value: f64,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Attribution {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub url: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StationDetail {
    pub name: String,
    pub aqi: Option<f64>,
    pub updated: Option<DateTime<Utc>>,
    pub location: Option<String>,
    pub pollutants: Vec<Measurement>,
    pub weather: Vec<Measurement>,
    pub attributions: Vec<Attribution>,
}

#[derive(Deserialize)]
struct Envelope {
    status: String,
    #[serde(default)]
    data: Value,
}

#[derive(Deserialize)]
struct FeedData {
    #[serde(default, deserialize_with = "aqi::deserialize_lenient")]
    aqi: Option<f64>,
    #[serde(default)]
    city: FeedCity,
    #[serde(default)]
    iaqi: BTreeMap<String, FeedValue>,
    #[serde(default)]
    time: Option<FeedTime>,
    #[serde(default)]
    attributions: Vec<Attribution>,
}

#[derive(Deserialize, Default)]
struct FeedCity {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    location: Option<String>,
}

#[derive(Deserialize)]
struct FeedValue {
    #[serde(default, deserialize_with = "aqi::deserialize_lenient")]
    v: Option<f64>,
}

#[derive(Deserialize)]
struct FeedTime {
    #[serde(default)]
    v: Option<i64>,
}

/// Parses a feed body. A non-`ok` status carries the provider's reason in `data`.
pub fn parse_feed(body: Value) -> Result<StationDetail, String> {
    let envelope: Envelope = serde_json::from_value(body).map_err(|e| e.to_string())?;
    if envelope.status != "ok" {
        return Err(envelope
            .data
            .as_str()
            .map(str::to_owned)
            .unwrap_or_else(|| format!("feed status {}", envelope.status)));
    }
    let data: FeedData = serde_json::from_value(envelope.data).map_err(|e| e.to_string())?;

    let mut pollutants = Vec::new();
    let mut weather = Vec::new();
    for (species, reading) in data.iaqi {
        let Some(value) = reading.v else { continue };
        let measurement = Measurement {
            species: species.clone(),
            value,
        };
        if POLLUTANTS.contains(&species.as_str()) {
            pollutants.push(measurement);
        } else {
            weather.push(measurement);
        }
    }
    pollutants.sort_by_key(|m| POLLUTANTS.iter().position(|p| *p == m.species));

    Ok(StationDetail {
        name: data
            .city
            .name
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| "Unknown Station".to_string()),
        aqi: data.aqi,
        updated: data
            .time
            .and_then(|t| t.v)
            .and_then(|secs| DateTime::from_timestamp(secs, 0)),
        location: data.city.location.filter(|l| !l.is_empty()),
        pollutants,
        weather,
        attributions: data.attributions,
    })
}

/// Popup content for a selected sensor: the reading's own data until the
/// feed answers, then the full detail.
#[derive(Debug, Clone, PartialEq)]
pub enum StationPopup {
    Basic {
        uid: i64,
        name: String,
        aqi: Option<f64>,
    },
    Detailed {
        uid: i64,
        detail: StationDetail,
    },
}

impl StationPopup {
    pub fn basic(uid: i64, reading: &SensorReading) -> Self {
        Self::Basic {
            uid,
            name: reading
                .station_name()
                .unwrap_or("Unknown Station")
                .to_string(),
            aqi: reading.aqi,
        }
    }

    pub fn uid(&self) -> i64 {
        match self {
            Self::Basic { uid, .. } | Self::Detailed { uid, .. } => *uid,
        }
    }

    pub fn lines(&self) -> Vec<String> {
        match self {
            Self::Basic { name, aqi, .. } => vec![
                name.clone(),
                format!("AQI: {} ({})", format_aqi(*aqi), aqi::color(*aqi)),
                "Loading more details...".to_string(),
            ],
            Self::Detailed { detail, .. } => detail_lines(detail),
        }
    }
}

fn format_aqi(aqi: Option<f64>) -> String {
    aqi.map(|v| format!("{v:.0}")).unwrap_or_else(|| "-".to_string())
}

fn join_measurements(items: &[Measurement]) -> String {
    items
        .iter()
        .map(|m| format!("{}: {}", m.species, m.value))
        .collect::<Vec<_>>()
        .join("  ")
}

fn detail_lines(detail: &StationDetail) -> Vec<String> {
    let mut lines = vec![
        detail.name.clone(),
        format!("{} AQI ({})", format_aqi(detail.aqi), aqi::color(detail.aqi)),
        format!(
            "Updated: {}",
            detail
                .updated
                .map(|t| t.format("%Y-%m-%d %H:%M UTC").to_string())
                .unwrap_or_else(|| "Unknown".to_string())
        ),
    ];
    if let Some(location) = &detail.location {
        lines.push(format!("Location: {location}"));
    }
    if !detail.pollutants.is_empty() {
        lines.push(format!("Pollutants: {}", join_measurements(&detail.pollutants)));
    }
    if !detail.weather.is_empty() {
        lines.push(format!("Weather: {}", join_measurements(&detail.weather)));
    }
    if !detail.attributions.is_empty() {
        let names: Vec<&str> = detail.attributions.iter().map(|a| a.name.as_str()).collect();
        lines.push(format!("Attributions: {}", names.join(" - ")));
    }
    lines
}
