use clap::{Parser, Subcommand};
use planner::{
    ApiClient, Driver, Msg, PlannerConfig,
    canvas::{RecordingCanvas, Slot},
    geometry::{padded_bounds, route_length_km},
    location::{
        DeviceLocator, DevicePosition, FixedDevice, LocationCallbacks, LocationResolver, NoDevice,
    },
    station::StationPopup,
};
use shared::{BoundingBox, Coordinate, LocationFix, TransportProfile, aqi};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Parser)]
#[command(
    name = "cleanroute",
    author,
    version,
    about = "Plan commutes around air pollution"
)]
struct Args {
    /// Overrides CLEANROUTE_API_URL
    #[arg(long, global = true)]
    api_url: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Resolve a start location through the device, server and default tiers
    Locate {
        /// Pretend the device reported this position (LAT,LON)
        #[arg(long, value_parser = parse_coordinate)]
        here: Option<Coordinate>,
        #[arg(long, default_value_t = 25.0)]
        accuracy: f64,
    },
    /// Fetch a route between two places, each LAT,LON or an address
    Route {
        #[arg(long)]
        from: String,
        #[arg(long)]
        to: String,
        /// walking, cycling or driving
        #[arg(long, value_parser = parse_profile, default_value = "walking")]
        profile: TransportProfile,
        /// Ask for the lower-exposure route
        #[arg(long)]
        healthy: bool,
        /// Load air quality sensors around the route
        #[arg(long)]
        air: bool,
    },
    /// List air quality sensors inside SOUTH,WEST,NORTH,EAST
    Sensors {
        #[arg(long, value_parser = parse_bbox)]
        bbox: BoundingBox,
    },
    /// Show the live feed of one monitoring station
    Station { uid: i64 },
    /// Forward geocode an address
    Search { query: String },
    /// Name the place at LAT,LON
    Reverse {
        #[arg(value_parser = parse_coordinate)]
        at: Coordinate,
    },
}

fn parse_numbers<const N: usize>(raw: &str) -> Result<[f64; N], String> {
    let values = raw
        .split(',')
        .map(|part| part.trim().parse::<f64>().map_err(|e| format!("{part:?}: {e}")))
        .collect::<Result<Vec<_>, _>>()?;
    values
        .try_into()
        .map_err(|v: Vec<f64>| format!("expected {N} comma-separated numbers, got {}", v.len()))
}

fn parse_coordinate(raw: &str) -> Result<Coordinate, String> {
    let [lat, lon] = parse_numbers::<2>(raw)?;
    if !(-90.0..=90.0).contains(&lat) || !(-180.0..=180.0).contains(&lon) {
        return Err(format!("{raw} is not a valid LAT,LON"));
    }
    Ok(Coordinate::new(lat, lon))
}

fn parse_bbox(raw: &str) -> Result<BoundingBox, String> {
    let [south, west, north, east] = parse_numbers::<4>(raw)?;
    if south > north || west > east {
        return Err(format!("{raw} is not SOUTH,WEST,NORTH,EAST"));
    }
    Ok(BoundingBox {
        min_lat: south,
        max_lat: north,
        min_lon: west,
        max_lon: east,
    })
}

fn parse_profile(raw: &str) -> Result<TransportProfile, String> {
    TransportProfile::ALL
        .into_iter()
        .find(|p| p.label().eq_ignore_ascii_case(raw))
        .or_else(|| serde_json::from_value(serde_json::Value::String(raw.to_string())).ok())
        .ok_or_else(|| format!("unknown profile {raw:?}"))
}

/// A LAT,LON pair as given, otherwise the first geocoding match.
async fn resolve_place(
    api: &ApiClient,
    raw: &str,
) -> Result<Coordinate, Box<dyn std::error::Error>> {
    if let Ok(at) = parse_coordinate(raw) {
        return Ok(at);
    }
    let candidate = api
        .geocode(raw)
        .await?
        .into_iter()
        .next()
        .ok_or_else(|| format!("no place found for {raw:?}"))?;
    tracing::info!("{raw:?} resolved to {}", candidate.place_name);
    Ok(candidate.coordinate())
}

fn print_fix(tier: &str, fix: &LocationFix) {
    println!(
        "{tier}: {:.6},{:.6} {}",
        fix.lat,
        fix.lon,
        fix.place_name.as_deref().unwrap_or("")
    );
}

async fn locate<D: DeviceLocator>(
    device: D,
    config: &PlannerConfig,
) -> Result<(), Box<dyn std::error::Error>> {
    let resolver = LocationResolver::new(device, ApiClient::new(config)?, config.location);
    let mut callbacks = LocationCallbacks {
        on_precise: |fix: &LocationFix| print_fix("precise", fix),
        on_fallback: |fix: &LocationFix| print_fix("approximate", fix),
        on_hardcoded: |fix: &LocationFix| print_fix("default", fix),
    };
    let resolved = resolver.resolve(&mut callbacks).await;
    if let Some(advisory) = resolved.advisory() {
        println!("{advisory}");
    }
    Ok(())
}

async fn route(
    config: &PlannerConfig,
    from: &str,
    to: &str,
    profile: TransportProfile,
    healthy: bool,
    air: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut driver = Driver::start(RecordingCanvas::new(), NoDevice, config)?;
    let from = resolve_place(driver.api(), from).await?;
    let to = resolve_place(driver.api(), to).await?;
    driver.run_until_idle().await;

    driver.dispatch(Msg::ProfileChanged(profile));
    driver.dispatch(Msg::MarkerDragged {
        slot: Slot::Start,
        to: from,
    });
    driver.dispatch(Msg::MarkerDragged {
        slot: Slot::End,
        to,
    });
    if healthy {
        driver.dispatch(Msg::ToggleHealthyRoute);
    }
    if air {
        driver.dispatch(Msg::ViewportMoved(padded_bounds(from, to, 1.0)));
        driver.dispatch(Msg::ToggleAirQuality);
    }
    driver.run_until_idle().await;

    let session = driver.session();
    for waypoint in [session.start(), session.end()].into_iter().flatten() {
        println!(
            "{:.5},{:.5} {}",
            waypoint.at.lat,
            waypoint.at.lon,
            waypoint.label.as_deref().unwrap_or("")
        );
    }
    if let Some(geometry) = session.route_geometry() {
        println!(
            "{} route ({:?}): {:.2} km",
            profile.label(),
            session.route_style(),
            route_length_km(geometry)
        );
    }
    if let Some(cmp) = session.comparison() {
        println!(
            "exposure {:.1} -> {:.1}, distance {:.0} m -> {:.0} m",
            cmp.standard_exposure,
            cmp.healthy_exposure,
            cmp.standard_distance_m,
            cmp.healthy_distance_m
        );
    }
    for reading in session.sensor_readings() {
        let label = aqi::band(reading.aqi).map_or("No data", |band| band.label());
        println!(
            "sensor {:>6} AQI {:>5} {label}",
            reading.uid.map(|u| u.to_string()).unwrap_or_default(),
            reading
                .aqi
                .map(|v| format!("{v:.0}"))
                .unwrap_or_else(|| "-".into())
        );
    }
    if let Some(notice) = session.notice() {
        println!("{:?}: {}", notice.level, notice.text);
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "planner=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let args = Args::parse();
    let mut config = PlannerConfig::from_env()?;
    if let Some(url) = args.api_url {
        config = config.with_api_root(url);
    }
    tracing::debug!("using API at {}", config.api_root);

    match args.command {
        Command::Locate { here, accuracy } => match here {
            Some(at) => {
                let device = FixedDevice(DevicePosition {
                    lat: at.lat,
                    lon: at.lon,
                    accuracy,
                });
                locate(device, &config).await?
            }
            None => locate(NoDevice, &config).await?,
        },
        Command::Route {
            from,
            to,
            profile,
            healthy,
            air,
        } => route(&config, &from, &to, profile, healthy, air).await?,
        Command::Sensors { bbox } => {
            let api = ApiClient::new(&config)?;
            for reading in api.air_sensors(bbox).await? {
                let band = aqi::band(reading.aqi);
                println!(
                    "{:.5},{:.5} {:>5} {:<32} {}",
                    reading.lat,
                    reading.lon,
                    reading
                        .aqi
                        .map(|v| format!("{v:.0}"))
                        .unwrap_or_else(|| "-".into()),
                    band.map_or("No data", |b| b.label()),
                    reading.station_name().unwrap_or("")
                );
            }
        }
        Command::Station { uid } => {
            let detail = ApiClient::new(&config)?.station_feed(uid).await?;
            for line in (StationPopup::Detailed { uid, detail }).lines() {
                println!("{line}");
            }
        }
        Command::Search { query } => {
            for candidate in ApiClient::new(&config)?.geocode(&query).await? {
                let at = candidate.coordinate();
                println!("{:.5},{:.5} {}", at.lat, at.lon, candidate.place_name);
            }
        }
        Command::Reverse { at } => {
            println!("{}", ApiClient::new(&config)?.place_name_or_unknown(at).await);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn coordinates_parse_and_validate() {
        assert_eq!(
            parse_coordinate("46.77, 23.59").unwrap(),
            Coordinate::new(46.77, 23.59)
        );
        assert!(parse_coordinate("46.77").is_err());
        assert!(parse_coordinate("123,0").is_err());
    }

    #[test]
    fn bbox_is_south_west_north_east() {
        let bbox = parse_bbox("46.7,23.5,46.8,23.7").unwrap();
        assert_eq!(bbox.min_lat, 46.7);
        assert_eq!(bbox.max_lon, 23.7);
        assert!(parse_bbox("46.8,23.5,46.7,23.7").is_err());
    }

    #[test]
    fn profiles_accept_labels_and_wire_names() {
        assert_eq!(parse_profile("cycling").unwrap(), TransportProfile::Cycling);
        assert_eq!(parse_profile("driving-car").unwrap(), TransportProfile::Driving);
        assert!(parse_profile("skating").is_err());
    }

    #[test]
    fn cli_definition_is_consistent() {
        use clap::CommandFactory;
        Args::command().debug_assert();
    }
}
