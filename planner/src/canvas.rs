//! The map the session draws on. Rendering belongs to the front end; the
//! session only hands over overlays and keeps the returned layer handles.

use std::collections::BTreeMap;

use shared::{BoundingBox, Coordinate, PollutionGrid, RouteGeometry, SensorReading, aqi};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LayerId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Slot {
    Start,
    End,
}

impl Slot {
    pub fn label(self) -> &'static str {
        match self {
            Slot::Start => "Start",
            Slot::End => "End",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteStyle {
    Standard,
    Healthy,
}

const NO_DATA_ICON: &str = "https://waqi.info/mapicon/-.30.png";

#[derive(Debug, Clone, PartialEq)]
pub struct SensorMarker {
    pub uid: Option<i64>,
    pub position: Coordinate,
    pub aqi: Option<f64>,
    pub color: &'static str,
    pub title: String,
    pub icon_url: String,
    /// Worse readings are stacked above better ones.
    pub z_offset: i32,
}

impl SensorMarker {
    /// Readings without a usable AQI are drawn gray at the bottom of the stack.
    pub fn from_reading(reading: &SensorReading) -> Self {
        let value = reading.aqi.filter(|v| v.is_finite());
        Self {
            uid: reading.uid,
            position: Coordinate::new(reading.lat, reading.lon),
            aqi: value,
            color: aqi::color(value),
            title: reading
                .station_name()
                .unwrap_or("Air Quality Sensor")
                .to_string(),
            icon_url: value.map_or_else(
                || NO_DATA_ICON.to_string(),
                |v| format!("https://waqi.info/mapicon/{}.30.png", v.round() as i64),
            ),
            z_offset: value.map_or(0, |v| v.round() as i32),
        }
    }
}

pub trait MapCanvas {
    fn set_view(&mut self, center: Coordinate, zoom: u8);
    fn fit_bounds(&mut self, bounds: BoundingBox, padding_px: u32);
    fn place_marker(&mut self, slot: Slot, at: Coordinate) -> LayerId;
    fn move_marker(&mut self, layer: LayerId, at: Coordinate);
    fn draw_route(&mut self, route: &RouteGeometry, style: RouteStyle) -> LayerId;
    fn add_sensor_marker(&mut self, marker: &SensorMarker) -> LayerId;
    fn draw_pollution_grid(&mut self, grid: &PollutionGrid) -> LayerId;
    fn bring_to_front(&mut self, layer: LayerId);
    fn remove_layer(&mut self, layer: LayerId);
}

#[derive(Debug, Clone, PartialEq)]
pub enum Layer {
    Marker { slot: Slot, at: Coordinate },
    Route { style: RouteStyle, features: usize },
    Sensor(SensorMarker),
    Grid { cells: usize },
}

/// In-memory canvas that keeps every live layer and the stacking order.
/// Used by the command-line front end and by tests.
#[derive(Debug, Default)]
pub struct RecordingCanvas {
    next_id: u64,
    layers: BTreeMap<LayerId, Layer>,
    stack: Vec<LayerId>,
    pub view: Option<(Coordinate, u8)>,
    pub fitted: Vec<BoundingBox>,
}

impl RecordingCanvas {
    pub fn new() -> Self {
        Self::default()
    }

    fn insert(&mut self, layer: Layer) -> LayerId {
        self.next_id += 1;
        let id = LayerId(self.next_id);
        self.layers.insert(id, layer);
        self.stack.push(id);
        id
    }

    pub fn layer(&self, id: LayerId) -> Option<&Layer> {
        self.layers.get(&id)
    }

    pub fn layer_count(&self) -> usize {
        self.layers.len()
    }

    pub fn routes(&self) -> Vec<(LayerId, RouteStyle)> {
        self.stack
            .iter()
            .filter_map(|id| match self.layers.get(id) {
                Some(Layer::Route { style, .. }) => Some((*id, *style)),
                _ => None,
            })
            .collect()
    }

    pub fn sensors(&self) -> Vec<&SensorMarker> {
        self.stack
            .iter()
            .filter_map(|id| match self.layers.get(id) {
                Some(Layer::Sensor(marker)) => Some(marker),
                _ => None,
            })
            .collect()
    }

    pub fn markers(&self) -> Vec<(Slot, Coordinate)> {
        self.stack
            .iter()
            .filter_map(|id| match self.layers.get(id) {
                Some(Layer::Marker { slot, at }) => Some((*slot, *at)),
                _ => None,
            })
            .collect()
    }

    pub fn has_grid(&self) -> bool {
        self.layers.values().any(|l| matches!(l, Layer::Grid { .. }))
    }

    /// Topmost layer in drawing order.
    pub fn top(&self) -> Option<LayerId> {
        self.stack.last().copied()
    }
}

impl MapCanvas for RecordingCanvas {
    fn set_view(&mut self, center: Coordinate, zoom: u8) {
        self.view = Some((center, zoom));
    }

    fn fit_bounds(&mut self, bounds: BoundingBox, _padding_px: u32) {
        self.fitted.push(bounds);
    }

    fn place_marker(&mut self, slot: Slot, at: Coordinate) -> LayerId {
        self.insert(Layer::Marker { slot, at })
    }

    fn move_marker(&mut self, layer: LayerId, to: Coordinate) {
        if let Some(Layer::Marker { at, .. }) = self.layers.get_mut(&layer) {
            *at = to;
        }
    }

    fn draw_route(&mut self, route: &RouteGeometry, style: RouteStyle) -> LayerId {
        self.insert(Layer::Route {
            style,
            features: route.features().len(),
        })
    }

    fn add_sensor_marker(&mut self, marker: &SensorMarker) -> LayerId {
        self.insert(Layer::Sensor(marker.clone()))
    }

    fn draw_pollution_grid(&mut self, grid: &PollutionGrid) -> LayerId {
        self.insert(Layer::Grid {
            cells: grid.cells().count(),
        })
    }

    fn bring_to_front(&mut self, layer: LayerId) {
        if let Some(pos) = self.stack.iter().position(|id| *id == layer) {
            let id = self.stack.remove(pos);
            self.stack.push(id);
        }
    }

    fn remove_layer(&mut self, layer: LayerId) {
        self.layers.remove(&layer);
        self.stack.retain(|id| *id != layer);
    }
}
