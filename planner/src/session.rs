//! The map session: one owner for every overlay on the canvas, driven by
//! messages. `update` mutates state and the canvas synchronously and returns
//! the commands (HTTP calls, timers) the driver has to run.
//!
//! Every outgoing request carries a generation stamp. A response whose stamp
//! is no longer current is dropped, so the last *issued* request wins rather
//! than the last one to arrive.

use std::time::Duration;

use shared::{
    BoundingBox, Coordinate, GeocodeCandidate, HealthyRouteResponse, PollutionGrid,
    RouteComparison, RouteGeometry, RouteRequest, SensorReading, TransportProfile,
};

use crate::canvas::{LayerId, MapCanvas, RouteStyle, SensorMarker, Slot};
use crate::config::PlannerConfig;
use crate::error::ApiError;
use crate::geometry::{route_bounds, viewport_around};
use crate::location::{ResolvedLocation, Tier, hardcoded_fix};
use crate::notice::{self, Notice, NoticeLevel, NoticeTopic};
use crate::station::{StationDetail, StationPopup};

const FIT_PADDING_PX: u32 = 30;
const INITIAL_ZOOM: u8 = 13;
const MIN_QUERY_CHARS: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SessionSettings {
    pub notice_ttl: Duration,
    pub sensor_debounce: Duration,
    pub search_debounce: Duration,
    pub grid_size: u32,
}

impl From<&PlannerConfig> for SessionSettings {
    fn from(config: &PlannerConfig) -> Self {
        Self {
            notice_ttl: config.notice_ttl,
            sensor_debounce: config.sensor_debounce,
            search_debounce: config.search_debounce,
            grid_size: config.grid_size,
        }
    }
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self::from(&PlannerConfig::default())
    }
}

/// Where the next map click lands, derived from which slots are filled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PickingMode {
    StartPending,
    EndPending,
    Done,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Waypoint {
    pub at: Coordinate,
    pub label: Option<String>,
    marker: LayerId,
}

#[derive(Debug)]
pub enum Msg {
    LocationResolved(ResolvedLocation),
    RetryLocation,
    MapClicked(Coordinate),
    MarkerDragged {
        slot: Slot,
        to: Coordinate,
    },
    SlotLabelled {
        slot: Slot,
        at: Coordinate,
        place_name: String,
    },
    SearchInput {
        slot: Slot,
        text: String,
    },
    SearchSettled {
        generation: u64,
    },
    SearchResults {
        generation: u64,
        result: Result<Vec<GeocodeCandidate>, ApiError>,
    },
    SelectCandidate(usize),
    ProfileChanged(TransportProfile),
    RequestRoute,
    RouteFetched {
        generation: u64,
        result: Result<RouteGeometry, ApiError>,
    },
    ToggleHealthyRoute,
    HealthyRouteFetched {
        generation: u64,
        result: Result<HealthyRouteResponse, ApiError>,
    },
    ToggleAirQuality,
    ViewportMoved(BoundingBox),
    ViewportSettled {
        generation: u64,
    },
    SensorsFetched {
        generation: u64,
        result: Result<Vec<SensorReading>, ApiError>,
    },
    GridFetched {
        generation: u64,
        result: Result<PollutionGrid, ApiError>,
    },
    SensorSelected(i64),
    StationFetched {
        uid: i64,
        result: Result<StationDetail, ApiError>,
    },
    DismissNotice {
        id: u64,
    },
    Reset,
}

#[derive(Debug)]
pub enum Command {
    ResolveLocation,
    FetchRoute {
        generation: u64,
        request: RouteRequest,
    },
    FetchHealthyRoute {
        generation: u64,
        request: RouteRequest,
    },
    FetchSensors {
        generation: u64,
        bounds: BoundingBox,
    },
    FetchGrid {
        generation: u64,
        bounds: BoundingBox,
        grid_size: u32,
    },
    Geocode {
        generation: u64,
        query: String,
    },
    ReverseGeocode {
        slot: Slot,
        at: Coordinate,
    },
    FetchStation {
        uid: i64,
    },
    /// Deliver `msg` after `delay` unless superseded; part of pending work.
    Debounce {
        delay: Duration,
        msg: Box<Msg>,
    },
    /// Deliver a dismissal after `delay`; never blocks idleness.
    DismissNoticeAfter {
        delay: Duration,
        id: u64,
    },
}

#[derive(Debug, Default)]
struct RouteOverlay {
    layer: Option<LayerId>,
    style: Option<RouteStyle>,
    geometry: Option<RouteGeometry>,
    generation: u64,
    pending: bool,
}

#[derive(Debug, Default)]
struct HealthyState {
    enabled: bool,
    comparison: Option<RouteComparison>,
}

#[derive(Debug, Default)]
struct AirOverlay {
    enabled: bool,
    generation: u64,
    viewport_generation: u64,
    pending: bool,
    readings: Vec<SensorReading>,
    markers: Vec<LayerId>,
    grid: Option<LayerId>,
}

#[derive(Debug, Default)]
struct SearchState {
    slot: Option<Slot>,
    query: String,
    generation: u64,
    pending: bool,
    results: Vec<GeocodeCandidate>,
}

pub struct MapSession<C: MapCanvas> {
    canvas: C,
    settings: SessionSettings,
    start: Option<Waypoint>,
    end: Option<Waypoint>,
    profile: TransportProfile,
    viewport: BoundingBox,
    route: RouteOverlay,
    healthy: HealthyState,
    air: AirOverlay,
    search: SearchState,
    notice: Option<Notice>,
    next_notice_id: u64,
    location: Option<ResolvedLocation>,
    relocating: bool,
    station: Option<StationPopup>,
}

impl<C: MapCanvas> MapSession<C> {
    /// Opens the map on the default city and asks for the user's location.
    pub fn init(mut canvas: C, settings: SessionSettings) -> (Self, Vec<Command>) {
        let center = hardcoded_fix().coordinate();
        canvas.set_view(center, INITIAL_ZOOM);
        let session = Self {
            canvas,
            settings,
            start: None,
            end: None,
            profile: TransportProfile::default(),
            viewport: viewport_around(center, INITIAL_ZOOM),
            route: RouteOverlay::default(),
            healthy: HealthyState::default(),
            air: AirOverlay::default(),
            search: SearchState::default(),
            notice: None,
            next_notice_id: 0,
            location: None,
            relocating: false,
            station: None,
        };
        (session, vec![Command::ResolveLocation])
    }

    pub fn update(&mut self, msg: Msg) -> Vec<Command> {
        let mut orders = Vec::new();
        match msg {
            Msg::LocationResolved(resolved) => self.on_location(resolved, &mut orders),
            Msg::RetryLocation => {
                self.relocating = true;
                orders.push(Command::ResolveLocation);
            }
            Msg::MapClicked(at) => match self.picking_mode() {
                PickingMode::StartPending => self.assign(Slot::Start, at, None, &mut orders),
                PickingMode::EndPending => self.assign(Slot::End, at, None, &mut orders),
                PickingMode::Done => {
                    tracing::debug!("map click ignored, both points are set");
                }
            },
            Msg::MarkerDragged { slot, to } => self.assign(slot, to, None, &mut orders),
            Msg::SlotLabelled {
                slot,
                at,
                place_name,
            } => {
                if let Some(waypoint) = self.slot_mut(slot)
                    && waypoint.at == at
                {
                    waypoint.label = Some(place_name);
                }
            }
            Msg::SearchInput { slot, text } => self.on_search_input(slot, text, &mut orders),
            Msg::SearchSettled { generation } => {
                if generation == self.search.generation {
                    self.search.pending = true;
                    orders.push(Command::Geocode {
                        generation,
                        query: self.search.query.clone(),
                    });
                }
            }
            Msg::SearchResults { generation, result } => {
                if generation != self.search.generation {
                    tracing::debug!("dropping stale geocode results ({generation})");
                } else {
                    self.search.pending = false;
                    self.search.results = result.unwrap_or_else(|err| {
                        tracing::warn!("address search failed: {err}");
                        Vec::new()
                    });
                }
            }
            Msg::SelectCandidate(index) => self.on_select_candidate(index, &mut orders),
            Msg::ProfileChanged(profile) => {
                if profile != self.profile {
                    self.profile = profile;
                    if self.has_both_points() {
                        self.fetch_route(&mut orders);
                    }
                }
            }
            Msg::RequestRoute => {
                if self.has_both_points() {
                    self.fetch_route(&mut orders);
                } else {
                    self.notify(
                        NoticeTopic::Route,
                        NoticeLevel::Info,
                        notice::POINTS_MISSING.to_string(),
                        &mut orders,
                    );
                }
            }
            Msg::RouteFetched { generation, result } => {
                self.on_route(generation, result, &mut orders)
            }
            Msg::ToggleHealthyRoute => {
                if self.has_both_points() {
                    self.healthy.enabled = !self.healthy.enabled;
                    if !self.healthy.enabled {
                        self.healthy.comparison = None;
                    }
                    self.fetch_route(&mut orders);
                }
            }
            Msg::HealthyRouteFetched { generation, result } => {
                self.on_healthy_route(generation, result, &mut orders)
            }
            Msg::ToggleAirQuality => self.toggle_air_quality(&mut orders),
            Msg::ViewportMoved(bounds) => {
                self.viewport = bounds;
                if self.air.enabled {
                    self.air.viewport_generation += 1;
                    orders.push(Command::Debounce {
                        delay: self.settings.sensor_debounce,
                        msg: Box::new(Msg::ViewportSettled {
                            generation: self.air.viewport_generation,
                        }),
                    });
                }
            }
            Msg::ViewportSettled { generation } => {
                if self.air.enabled && generation == self.air.viewport_generation {
                    self.fetch_air_quality(&mut orders);
                }
            }
            Msg::SensorsFetched { generation, result } => {
                self.on_sensors(generation, result, &mut orders)
            }
            Msg::GridFetched { generation, result } => self.on_grid(generation, result),
            Msg::SensorSelected(uid) => {
                match self.air.readings.iter().find(|r| r.uid == Some(uid)) {
                    Some(reading) => {
                        self.station = Some(StationPopup::basic(uid, reading));
                        orders.push(Command::FetchStation { uid });
                    }
                    None => tracing::warn!("selected unknown sensor {uid}"),
                }
            }
            Msg::StationFetched { uid, result } => match result {
                Ok(detail) if self.station.as_ref().map(StationPopup::uid) == Some(uid) => {
                    self.station = Some(StationPopup::Detailed { uid, detail });
                }
                Ok(_) => tracing::debug!("station {uid} no longer selected"),
                Err(err) => tracing::warn!("station detail for {uid} unavailable: {err}"),
            },
            Msg::DismissNotice { id } => {
                if self.notice.as_ref().map(|n| n.id) == Some(id) {
                    self.notice = None;
                }
            }
            Msg::Reset => self.reset(),
        }
        orders
    }

    pub fn canvas(&self) -> &C {
        &self.canvas
    }

    pub fn start(&self) -> Option<&Waypoint> {
        self.start.as_ref()
    }

    pub fn end(&self) -> Option<&Waypoint> {
        self.end.as_ref()
    }

    pub fn profile(&self) -> TransportProfile {
        self.profile
    }

    pub fn viewport(&self) -> BoundingBox {
        self.viewport
    }

    pub fn picking_mode(&self) -> PickingMode {
        match (&self.start, &self.end) {
            (None, _) => PickingMode::StartPending,
            (Some(_), None) => PickingMode::EndPending,
            (Some(_), Some(_)) => PickingMode::Done,
        }
    }

    pub fn has_both_points(&self) -> bool {
        self.start.is_some() && self.end.is_some()
    }

    pub fn notice(&self) -> Option<&Notice> {
        self.notice.as_ref()
    }

    pub fn route_layer(&self) -> Option<LayerId> {
        self.route.layer
    }

    pub fn route_style(&self) -> Option<RouteStyle> {
        self.route.style
    }

    pub fn route_geometry(&self) -> Option<&RouteGeometry> {
        self.route.geometry.as_ref()
    }

    pub fn route_pending(&self) -> bool {
        self.route.pending
    }

    pub fn healthy_enabled(&self) -> bool {
        self.healthy.enabled
    }

    pub fn comparison(&self) -> Option<&RouteComparison> {
        self.healthy.comparison.as_ref()
    }

    pub fn air_enabled(&self) -> bool {
        self.air.enabled
    }

    pub fn air_pending(&self) -> bool {
        self.air.pending
    }

    pub fn sensor_readings(&self) -> &[SensorReading] {
        &self.air.readings
    }

    pub fn sensor_marker_count(&self) -> usize {
        self.air.markers.len()
    }

    pub fn search_results(&self) -> &[GeocodeCandidate] {
        &self.search.results
    }

    pub fn search_pending(&self) -> bool {
        self.search.pending
    }

    pub fn location(&self) -> Option<&ResolvedLocation> {
        self.location.as_ref()
    }

    pub fn station_popup(&self) -> Option<&StationPopup> {
        self.station.as_ref()
    }

    /// Removes every overlay this session drew and hands the canvas back.
    pub fn teardown(mut self) -> C {
        self.reset();
        self.clear_air_layers();
        self.canvas
    }

    fn slot_mut(&mut self, slot: Slot) -> Option<&mut Waypoint> {
        match slot {
            Slot::Start => self.start.as_mut(),
            Slot::End => self.end.as_mut(),
        }
    }

    fn current_request(&self) -> Option<RouteRequest> {
        match (&self.start, &self.end) {
            (Some(start), Some(end)) => Some(RouteRequest {
                start: start.at,
                end: end.at,
                profile: self.profile,
            }),
            _ => None,
        }
    }

    fn on_location(&mut self, resolved: ResolvedLocation, orders: &mut Vec<Command>) {
        let at = resolved.fix.coordinate();
        let zoom = resolved.suggested_zoom();
        self.canvas.set_view(at, zoom);
        self.viewport = viewport_around(at, zoom);

        match resolved.advisory() {
            Some(text) => self.notify(NoticeTopic::Location, NoticeLevel::Warning, text, orders),
            None => self.clear_notice(NoticeTopic::Location),
        }

        let overwrite = std::mem::take(&mut self.relocating);
        if overwrite || self.start.is_none() {
            // Precise fixes carry no name; the lower tiers name their place.
            let label = match resolved.tier {
                Tier::Precise => None,
                Tier::Fallback | Tier::Hardcoded => resolved.fix.place_name.clone(),
            };
            self.assign(Slot::Start, at, label, orders);
        }
        self.location = Some(resolved);
    }

    fn assign(
        &mut self,
        slot: Slot,
        at: Coordinate,
        label: Option<String>,
        orders: &mut Vec<Command>,
    ) {
        let needs_label = label.is_none();
        let existing = match slot {
            Slot::Start => self.start.take(),
            Slot::End => self.end.take(),
        };
        let marker = match existing {
            Some(waypoint) => {
                self.canvas.move_marker(waypoint.marker, at);
                waypoint.marker
            }
            None => self.canvas.place_marker(slot, at),
        };
        let waypoint = Waypoint { at, label, marker };
        match slot {
            Slot::Start => self.start = Some(waypoint),
            Slot::End => self.end = Some(waypoint),
        }
        tracing::debug!("{} set to {:.5},{:.5}", slot.label(), at.lat, at.lon);

        if needs_label {
            orders.push(Command::ReverseGeocode { slot, at });
        }
        if self.has_both_points() {
            self.fetch_route(orders);
        }
    }

    fn on_search_input(&mut self, slot: Slot, text: String, orders: &mut Vec<Command>) {
        self.search.slot = Some(slot);
        self.search.generation += 1;
        if text.trim().chars().count() < MIN_QUERY_CHARS {
            self.search.query.clear();
            self.search.results.clear();
            self.search.pending = false;
            return;
        }
        self.search.query = text.trim().to_string();
        orders.push(Command::Debounce {
            delay: self.settings.search_debounce,
            msg: Box::new(Msg::SearchSettled {
                generation: self.search.generation,
            }),
        });
    }

    fn on_select_candidate(&mut self, index: usize, orders: &mut Vec<Command>) {
        let (Some(slot), Some(candidate)) = (self.search.slot, self.search.results.get(index))
        else {
            tracing::warn!("invalid search selection {index}");
            return;
        };
        let at = candidate.coordinate();
        let label = Some(candidate.place_name.clone());
        self.search = SearchState {
            generation: self.search.generation + 1,
            ..SearchState::default()
        };
        self.assign(slot, at, label, orders);
    }

    fn fetch_route(&mut self, orders: &mut Vec<Command>) {
        let Some(request) = self.current_request() else {
            return;
        };
        self.route.generation += 1;
        self.route.pending = true;
        self.clear_notice(NoticeTopic::Route);
        let generation = self.route.generation;
        if self.healthy.enabled {
            orders.push(Command::FetchHealthyRoute {
                generation,
                request,
            });
        } else {
            orders.push(Command::FetchRoute {
                generation,
                request,
            });
        }
    }

    fn remove_route_layer(&mut self) {
        if let Some(layer) = self.route.layer.take() {
            self.canvas.remove_layer(layer);
        }
        self.route.style = None;
        self.route.geometry = None;
    }

    fn draw_route(&mut self, geometry: &RouteGeometry, style: RouteStyle) {
        self.remove_route_layer();
        let layer = self.canvas.draw_route(geometry, style);
        self.route.layer = Some(layer);
        self.route.style = Some(style);
        if let Some(bounds) = route_bounds(geometry) {
            self.canvas.fit_bounds(bounds, FIT_PADDING_PX);
        }
        self.route.geometry = Some(geometry.clone());
    }

    fn is_current_route(&mut self, generation: u64) -> bool {
        if generation != self.route.generation {
            tracing::debug!(
                "dropping stale route response {generation} (current {})",
                self.route.generation
            );
            return false;
        }
        self.route.pending = false;
        true
    }

    fn on_route(
        &mut self,
        generation: u64,
        result: Result<RouteGeometry, ApiError>,
        orders: &mut Vec<Command>,
    ) {
        if !self.is_current_route(generation) {
            return;
        }
        match result {
            Ok(geometry) if geometry.is_empty() => {
                self.remove_route_layer();
                self.notify(
                    NoticeTopic::Route,
                    NoticeLevel::Warning,
                    notice::NO_ROUTE.to_string(),
                    orders,
                );
            }
            Ok(geometry) => {
                tracing::info!("route received with {} feature(s)", geometry.features().len());
                self.draw_route(&geometry, RouteStyle::Standard);
            }
            Err(err) => {
                tracing::error!("route request failed: {err}");
                self.remove_route_layer();
                self.notify(
                    NoticeTopic::Route,
                    NoticeLevel::Error,
                    notice::route_failure(&err),
                    orders,
                );
            }
        }
    }

    fn on_healthy_route(
        &mut self,
        generation: u64,
        result: Result<HealthyRouteResponse, ApiError>,
        orders: &mut Vec<Command>,
    ) {
        if !self.is_current_route(generation) {
            return;
        }
        let text = match result {
            Ok(response) if !response.route.is_empty() => {
                self.draw_route(&response.route, RouteStyle::Healthy);
                self.healthy.comparison = response.comparison;
                if let Some(summary) = response.comparison.as_ref().and_then(comparison_summary) {
                    self.notify(NoticeTopic::Route, NoticeLevel::Info, summary, orders);
                }
                return;
            }
            Ok(_) => notice::NO_HEALTHY_ROUTE.to_string(),
            Err(err) => {
                tracing::error!("healthy route request failed: {err}");
                notice::healthy_route_failure(&err)
            }
        };
        // Fall back to the standard route rather than leaving the map empty.
        self.healthy = HealthyState::default();
        self.fetch_route(orders);
        self.notify(NoticeTopic::Route, NoticeLevel::Warning, text, orders);
    }

    fn toggle_air_quality(&mut self, orders: &mut Vec<Command>) {
        if self.air.enabled {
            self.air.enabled = false;
            self.air.pending = false;
            // Anything still in flight belongs to the overlay being removed.
            self.air.generation += 1;
            self.clear_air_layers();
            self.air.readings.clear();
            self.station = None;
            self.clear_notice(NoticeTopic::AirQuality);
            if self.has_both_points() {
                self.fetch_route(orders);
            }
        } else {
            self.air.enabled = true;
            self.fetch_air_quality(orders);
        }
    }

    fn fetch_air_quality(&mut self, orders: &mut Vec<Command>) {
        self.air.generation += 1;
        self.air.pending = true;
        let generation = self.air.generation;
        let bounds = self.viewport;
        orders.push(Command::FetchSensors { generation, bounds });
        orders.push(Command::FetchGrid {
            generation,
            bounds,
            grid_size: self.settings.grid_size,
        });
    }

    fn is_current_air(&self, generation: u64) -> bool {
        let current = self.air.enabled && generation == self.air.generation;
        if !current {
            tracing::debug!("dropping stale air quality response {generation}");
        }
        current
    }

    fn clear_sensor_markers(&mut self) {
        for layer in self.air.markers.drain(..) {
            self.canvas.remove_layer(layer);
        }
    }

    fn clear_air_layers(&mut self) {
        self.clear_sensor_markers();
        if let Some(grid) = self.air.grid.take() {
            self.canvas.remove_layer(grid);
        }
    }

    /// Sensors above the grid, the route above everything.
    fn restack(&mut self) {
        for layer in &self.air.markers {
            self.canvas.bring_to_front(*layer);
        }
        if let Some(route) = self.route.layer {
            self.canvas.bring_to_front(route);
        }
    }

    fn on_sensors(
        &mut self,
        generation: u64,
        result: Result<Vec<SensorReading>, ApiError>,
        orders: &mut Vec<Command>,
    ) {
        if !self.is_current_air(generation) {
            return;
        }
        self.air.pending = false;
        match result {
            Ok(readings) => {
                self.clear_sensor_markers();
                for marker in readings.iter().map(SensorMarker::from_reading) {
                    let layer = self.canvas.add_sensor_marker(&marker);
                    self.air.markers.push(layer);
                }
                tracing::info!("drew {} sensor markers", self.air.markers.len());
                self.air.readings = readings;
                self.clear_notice(NoticeTopic::AirQuality);
                self.restack();
            }
            Err(err) => {
                tracing::error!("air quality request failed: {err}");
                self.notify(
                    NoticeTopic::AirQuality,
                    NoticeLevel::Error,
                    notice::air_quality_failure(&err),
                    orders,
                );
            }
        }
    }

    fn on_grid(&mut self, generation: u64, result: Result<PollutionGrid, ApiError>) {
        if !self.is_current_air(generation) {
            return;
        }
        match result {
            Ok(grid) => {
                if let Some(old) = self.air.grid.take() {
                    self.canvas.remove_layer(old);
                }
                self.air.grid = Some(self.canvas.draw_pollution_grid(&grid));
                self.restack();
            }
            Err(err) => tracing::warn!("pollution grid unavailable: {err}"),
        }
    }

    fn reset(&mut self) {
        for waypoint in [self.start.take(), self.end.take()].into_iter().flatten() {
            self.canvas.remove_layer(waypoint.marker);
        }
        self.remove_route_layer();
        self.route.generation += 1;
        self.route.pending = false;
        self.healthy = HealthyState::default();
        self.search = SearchState {
            generation: self.search.generation + 1,
            ..SearchState::default()
        };
        self.notice = None;
    }

    fn notify(
        &mut self,
        topic: NoticeTopic,
        level: NoticeLevel,
        text: String,
        orders: &mut Vec<Command>,
    ) {
        self.next_notice_id += 1;
        let id = self.next_notice_id;
        tracing::info!("notice: {text}");
        self.notice = Some(Notice {
            id,
            topic,
            level,
            text,
        });
        orders.push(Command::DismissNoticeAfter {
            delay: self.settings.notice_ttl,
            id,
        });
    }

    fn clear_notice(&mut self, topic: NoticeTopic) {
        if self.notice.as_ref().map(|n| n.topic) == Some(topic) {
            self.notice = None;
        }
    }
}

fn comparison_summary(cmp: &RouteComparison) -> Option<String> {
    let reduction = cmp.exposure_reduction_pct()?;
    Some(match cmp.extra_distance_pct() {
        Some(extra) if extra > 0.0 => format!(
            "Healthier route: {reduction:.0}% less pollution exposure for {extra:.0}% extra distance."
        ),
        _ => format!("Healthier route: {reduction:.0}% less pollution exposure."),
    })
}
