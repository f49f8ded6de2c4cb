#![allow(dead_code)]

use std::{
    collections::HashMap,
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
};
use planner::PlannerConfig;
use serde_json::{Value, json};

pub const DEFAULT_PLACE: &str = "Cluj-Napoca, Cluj County, Romania";
pub const STREET: &str = "Strada Memorandumului 28, Cluj-Napoca";

#[derive(Clone, Default)]
pub struct Counters {
    pub directions: Arc<AtomicUsize>,
    pub geocode: Arc<AtomicUsize>,
    pub sensors: Arc<AtomicUsize>,
}

impl Counters {
    pub fn directions(&self) -> usize {
        self.directions.load(Ordering::SeqCst)
    }

    pub fn geocode(&self) -> usize {
        self.geocode.load(Ordering::SeqCst)
    }

    pub fn sensors(&self) -> usize {
        self.sensors.load(Ordering::SeqCst)
    }
}

/// Serves `router` on an ephemeral port and returns its base URL.
pub async fn serve(router: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind stub backend");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(async move {
        axum::serve(listener, router).await.expect("stub backend");
    });
    format!("http://{addr}")
}

pub fn config_for(base: &str) -> PlannerConfig {
    let mut config = PlannerConfig::default().with_api_root(format!("{base}/api"));
    config.waqi_root = format!("{base}/waqi");
    config.sensor_debounce = Duration::from_millis(10);
    config.search_debounce = Duration::from_millis(10);
    config
}

/// A backend that answers every endpoint the planner calls.
pub fn backend(counters: Counters) -> Router {
    Router::new()
        .route("/api/directions", post(directions))
        .route("/api/healthy-route", post(healthy_route))
        .route("/api/geocode", get(geocode))
        .route("/api/reverse-geocode", get(reverse_geocode))
        .route("/api/default-location", get(default_location))
        .route("/api/air-sensors", get(air_sensors))
        .route("/api/kriging-matrix", get(kriging_matrix))
        .route("/waqi/:uid/", get(station_feed))
        .with_state(counters)
}

pub fn line(start: (f64, f64), end: (f64, f64)) -> Value {
    let mid = ((start.0 + end.0) / 2.0, (start.1 + end.1) / 2.0);
    json!({
        "type": "FeatureCollection",
        "features": [{
            "type": "Feature",
            "properties": {},
            "geometry": {
                "type": "LineString",
                "coordinates": [[start.1, start.0], [mid.1, mid.0], [end.1, end.0]]
            }
        }]
    })
}

fn pair(value: &Value) -> Option<(f64, f64)> {
    Some((value.get(0)?.as_f64()?, value.get(1)?.as_f64()?))
}

async fn directions(
    State(counters): State<Counters>,
    Json(body): Json<Value>,
) -> Result<Json<Value>, StatusCode> {
    counters.directions.fetch_add(1, Ordering::SeqCst);
    let start = pair(&body["start"]).ok_or(StatusCode::BAD_REQUEST)?;
    let end = pair(&body["end"]).ok_or(StatusCode::BAD_REQUEST)?;
    Ok(Json(line(start, end)))
}

async fn healthy_route(Json(body): Json<Value>) -> Result<Json<Value>, StatusCode> {
    let start = pair(&body["start"]).ok_or(StatusCode::BAD_REQUEST)?;
    let end = pair(&body["end"]).ok_or(StatusCode::BAD_REQUEST)?;
    Ok(Json(json!({
        "route": line(start, end),
        "comparison": {
            "standard_distance_m": 2400.0,
            "healthy_distance_m": 2600.0,
            "standard_exposure": 80.0,
            "healthy_exposure": 60.0
        }
    })))
}

async fn geocode(
    State(counters): State<Counters>,
    Query(params): Query<HashMap<String, String>>,
) -> Json<Value> {
    counters.geocode.fetch_add(1, Ordering::SeqCst);
    let query = params.get("query").cloned().unwrap_or_default();
    Json(json!([
        {"place_name": format!("{query}, Cluj-Napoca"), "center": [23.5899, 46.7694]},
        {"place_name": format!("{query}, Florești"), "center": [23.4906, 46.7475]}
    ]))
}

async fn reverse_geocode(
    Query(params): Query<HashMap<String, String>>,
) -> Result<Json<Value>, StatusCode> {
    if params.contains_key("lat") && params.contains_key("lng") {
        Ok(Json(json!({"place_name": STREET})))
    } else {
        Err(StatusCode::BAD_REQUEST)
    }
}

async fn default_location() -> Json<Value> {
    Json(json!({"lat": 46.7712, "lng": 23.6236, "place_name": DEFAULT_PLACE}))
}

fn bbox(params: &HashMap<String, String>) -> Option<[f64; 4]> {
    let get = |key: &str| params.get(key)?.parse::<f64>().ok();
    Some([get("south")?, get("west")?, get("north")?, get("east")?])
}

async fn air_sensors(
    State(counters): State<Counters>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Json<Value>, StatusCode> {
    counters.sensors.fetch_add(1, Ordering::SeqCst);
    let [south, west, north, east] = bbox(&params).ok_or(StatusCode::BAD_REQUEST)?;
    let lat = (south + north) / 2.0;
    let lon = (west + east) / 2.0;
    Ok(Json(json!([
        {"uid": 42, "lat": lat, "lon": lon, "aqi": 42, "station": {"name": "Mănăștur"}},
        {"uid": 2, "lat": lat + 0.001, "lon": lon, "aqi": "165", "station": {"name": "Centru"}},
        {"uid": 3, "lat": lat, "lon": lon + 0.001, "aqi": "-", "station": {"name": "Offline"}},
        {"uid": 4, "lat": null, "lon": lon, "aqi": 30, "station": {"name": "Unplaced"}}
    ])))
}

async fn kriging_matrix(
    Query(params): Query<HashMap<String, String>>,
) -> Result<Json<Value>, StatusCode> {
    let [south, west, north, east] = bbox(&params).ok_or(StatusCode::BAD_REQUEST)?;
    if !params.contains_key("grid_size") {
        return Err(StatusCode::BAD_REQUEST);
    }
    Ok(Json(json!({
        "bounds": {"min_lat": south, "max_lat": north, "min_lon": west, "max_lon": east},
        "values": [[20.0, 45.0], [null, 80.0]]
    })))
}

async fn station_feed(
    Path(uid): Path<String>,
    Query(params): Query<HashMap<String, String>>,
) -> Json<Value> {
    if params.get("token").map(String::as_str) != Some("demo") {
        return Json(json!({"status": "error", "data": "Invalid key"}));
    }
    if uid != "@42" {
        return Json(json!({"status": "error", "data": "Unknown station"}));
    }
    Json(json!({
        "status": "ok",
        "data": {
            "aqi": 57,
            "city": {"name": "Cluj-Napoca Centru", "location": "Piața Unirii"},
            "iaqi": {"pm25": {"v": 57}, "no2": {"v": 12.4}, "t": {"v": 14}},
            "time": {"v": 1760000000},
            "attributions": [{"name": "Agenția pentru Protecția Mediului", "url": "https://www.calitateaer.ro"}]
        }
    }))
}

/// Every request answers with `status` and an optional JSON body.
pub fn failing(status: StatusCode, body: Value) -> Router {
    let handler = move || {
        let body = body.clone();
        async move { (status, Json(body)) }
    };
    Router::new().fallback(handler)
}
