use shared::{BoundingBox, Coordinate, RouteGeometry};

const EARTH_RADIUS_KM: f64 = 6_371.0;

pub fn haversine_km(a: Coordinate, b: Coordinate) -> f64 {
    let lat1 = a.lat.to_radians();
    let lat2 = b.lat.to_radians();
    let dlat = (b.lat - a.lat).to_radians();
    let dlon = (b.lon - a.lon).to_radians();

    let sin_dlat = (dlat / 2.0).sin();
    let sin_dlon = (dlon / 2.0).sin();

    let h = sin_dlat * sin_dlat + lat1.cos() * lat2.cos() * sin_dlon * sin_dlon;
    2.0 * EARTH_RADIUS_KM * h.sqrt().asin()
}

pub fn path_length_km(path: &[Coordinate]) -> f64 {
    path.windows(2).map(|w| haversine_km(w[0], w[1])).sum()
}

/// Length of every feature line, summed per feature so disjoint features do
/// not count the gap between them.
pub fn route_length_km(route: &RouteGeometry) -> f64 {
    route
        .feature_paths()
        .map(|path| path_length_km(&path))
        .sum()
}

pub fn route_bounds(route: &RouteGeometry) -> Option<BoundingBox> {
    BoundingBox::from_points(route.positions())
}

/// Box enclosing two points plus a margin in kilometers.
pub fn padded_bounds(start: Coordinate, end: Coordinate, margin_km: f64) -> BoundingBox {
    // 1 degree latitude ≈ 111 km
    let lat_margin = margin_km / 111.0;
    let avg_lat = (start.lat + end.lat) / 2.0;
    let lon_margin = margin_km / (111.0 * avg_lat.to_radians().cos().max(0.01));

    BoundingBox {
        min_lat: start.lat.min(end.lat) - lat_margin,
        max_lat: start.lat.max(end.lat) + lat_margin,
        min_lon: start.lon.min(end.lon) - lon_margin,
        max_lon: start.lon.max(end.lon) + lon_margin,
    }
}

/// Approximate visible area of a web-mercator map at `zoom` around `center`.
pub fn viewport_around(center: Coordinate, zoom: u8) -> BoundingBox {
    let half_span = 180.0 / 2f64.powi(i32::from(zoom));
    BoundingBox::around(center, half_span)
}
