mod common;

use std::time::Duration;

use axum::http::StatusCode;
use common::{Counters, backend, config_for, failing, serve};
use planner::{
    Driver, Msg,
    canvas::{RecordingCanvas, RouteStyle, Slot},
    location::{NoDevice, Tier},
    notice::{self, NoticeTopic},
    session::PickingMode,
    station::StationPopup,
};
use serde_json::json;
use shared::{BoundingBox, Coordinate};

const DESTINATION: Coordinate = Coordinate {
    lat: 46.7537,
    lon: 23.5466,
};

async fn started(counters: &Counters) -> Driver<RecordingCanvas, NoDevice> {
    let base = serve(backend(counters.clone())).await;
    let mut driver = Driver::start(RecordingCanvas::new(), NoDevice, &config_for(&base)).unwrap();
    driver.run_until_idle().await;
    driver
}

#[tokio::test]
async fn start_comes_from_server_location() {
    let driver = started(&Counters::default()).await;
    let session = driver.session();

    assert_eq!(session.location().unwrap().tier, Tier::Fallback);
    let start = session.start().unwrap();
    assert_eq!(start.at, Coordinate::new(46.7712, 23.6236));
    assert_eq!(start.label.as_deref(), Some(common::DEFAULT_PLACE));
    assert_eq!(session.picking_mode(), PickingMode::EndPending);
    assert_eq!(session.notice().unwrap().topic, NoticeTopic::Location);
    assert_eq!(session.canvas().view.unwrap().1, 13);
}

#[tokio::test]
async fn clicking_destination_draws_route() {
    let counters = Counters::default();
    let mut driver = started(&counters).await;

    driver.dispatch(Msg::MapClicked(DESTINATION));
    driver.run_until_idle().await;

    let session = driver.session();
    assert_eq!(session.picking_mode(), PickingMode::Done);
    assert_eq!(session.end().unwrap().label.as_deref(), Some(common::STREET));
    assert_eq!(session.canvas().routes().len(), 1);
    assert_eq!(session.canvas().fitted.len(), 1);
    assert!(!session.route_pending());
    assert_eq!(counters.directions(), 1);
}

#[tokio::test]
async fn air_quality_overlay_round_trip() {
    let counters = Counters::default();
    let mut driver = started(&counters).await;
    driver.dispatch(Msg::MapClicked(DESTINATION));
    driver.run_until_idle().await;

    driver.dispatch(Msg::ToggleAirQuality);
    driver.run_until_idle().await;
    {
        let session = driver.session();
        // The reading without an AQI is drawn gray below the others.
        assert_eq!(session.sensor_readings().len(), 3);
        let sensors = session.canvas().sensors();
        assert_eq!(sensors.len(), 3);
        let offline = sensors.iter().find(|m| m.uid == Some(3)).unwrap();
        assert_eq!(offline.color, "#888888");
        assert_eq!(offline.z_offset, 0);
        assert!(session.canvas().has_grid());
        assert_eq!(session.canvas().top(), session.route_layer());
    }

    driver.dispatch(Msg::ToggleAirQuality);
    driver.run_until_idle().await;
    let session = driver.session();
    assert!(session.canvas().sensors().is_empty());
    assert!(!session.canvas().has_grid());
    assert_eq!(session.canvas().routes().len(), 1);
    assert_eq!(counters.directions(), 2);
}

#[tokio::test]
async fn panning_refreshes_sensors_once() {
    let counters = Counters::default();
    let mut driver = started(&counters).await;
    driver.dispatch(Msg::ToggleAirQuality);
    driver.run_until_idle().await;
    assert_eq!(counters.sensors(), 1);

    for step in 0..4 {
        let center = Coordinate::new(46.77 + f64::from(step) * 0.005, 23.59);
        driver.dispatch(Msg::ViewportMoved(BoundingBox::around(center, 0.02)));
    }
    driver.run_until_idle().await;
    assert_eq!(counters.sensors(), 2);
    assert_eq!(driver.session().canvas().sensors().len(), 3);
}

#[tokio::test]
async fn healthy_route_is_drawn_with_comparison() {
    let mut driver = started(&Counters::default()).await;
    driver.dispatch(Msg::MapClicked(DESTINATION));
    driver.dispatch(Msg::ToggleHealthyRoute);
    driver.run_until_idle().await;

    let session = driver.session();
    assert_eq!(session.route_style(), Some(RouteStyle::Healthy));
    assert_eq!(session.canvas().routes().len(), 1);
    assert_eq!(session.comparison().unwrap().healthy_exposure, 60.0);
}

#[tokio::test]
async fn search_selection_fills_destination() {
    let counters = Counters::default();
    let mut driver = started(&counters).await;

    for text in ["Pia", "Piaț", "Piața Unirii"] {
        driver.dispatch(Msg::SearchInput {
            slot: Slot::End,
            text: text.to_string(),
        });
    }
    driver.run_until_idle().await;
    assert_eq!(counters.geocode(), 1);
    assert_eq!(driver.session().search_results().len(), 2);

    driver.dispatch(Msg::SelectCandidate(0));
    driver.run_until_idle().await;
    let session = driver.session();
    let end = session.end().unwrap();
    assert_eq!(end.label.as_deref(), Some("Piața Unirii, Cluj-Napoca"));
    assert_eq!(session.canvas().routes().len(), 1);
}

#[tokio::test]
async fn station_popup_loads_detail() {
    let mut driver = started(&Counters::default()).await;
    driver.dispatch(Msg::ToggleAirQuality);
    driver.run_until_idle().await;

    driver.dispatch(Msg::SensorSelected(42));
    driver.run_until_idle().await;
    match driver.session().station_popup() {
        Some(StationPopup::Detailed { uid: 42, detail }) => {
            assert_eq!(detail.name, "Cluj-Napoca Centru");
        }
        other => panic!("unexpected popup {other:?}"),
    }

    // The feed stub only knows station 42.
    driver.dispatch(Msg::SensorSelected(2));
    driver.run_until_idle().await;
    assert!(matches!(
        driver.session().station_popup(),
        Some(StationPopup::Basic { uid: 2, .. })
    ));
}

#[tokio::test]
async fn rate_limited_route_shows_specific_notice() {
    let base = serve(failing(
        StatusCode::TOO_MANY_REQUESTS,
        json!({"error": "Too many requests"}),
    ))
    .await;
    let mut driver = Driver::start(RecordingCanvas::new(), NoDevice, &config_for(&base)).unwrap();
    driver.run_until_idle().await;
    assert_eq!(driver.session().location().unwrap().tier, Tier::Hardcoded);

    driver.dispatch(Msg::MapClicked(DESTINATION));
    driver.run_until_idle().await;
    let session = driver.session();
    assert_eq!(session.notice().unwrap().text, notice::ROUTE_RATE_LIMITED);
    assert!(session.canvas().routes().is_empty());
}

#[tokio::test]
async fn notices_expire() {
    let base = serve(backend(Counters::default())).await;
    let mut config = config_for(&base);
    config.notice_ttl = Duration::from_millis(50);
    let mut driver = Driver::start(RecordingCanvas::new(), NoDevice, &config).unwrap();
    driver.run_until_idle().await;
    assert!(driver.session().notice().is_some());
    driver.run_to_completion().await;
    assert!(driver.session().notice().is_none());
}

#[tokio::test]
async fn reset_and_teardown_leave_nothing_behind() {
    let mut driver = started(&Counters::default()).await;
    driver.dispatch(Msg::MapClicked(DESTINATION));
    driver.dispatch(Msg::ToggleAirQuality);
    driver.run_until_idle().await;

    driver.dispatch(Msg::Reset);
    assert_eq!(driver.session().picking_mode(), PickingMode::StartPending);
    assert!(driver.session().canvas().routes().is_empty());
    assert!(driver.session().canvas().markers().is_empty());

    let canvas = driver.into_session().teardown();
    assert_eq!(canvas.layer_count(), 0);
}
