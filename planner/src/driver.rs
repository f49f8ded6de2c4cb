//! Runs the commands a [`MapSession`] asks for and feeds the results back.

use std::sync::Arc;

use tokio::task::{JoinError, JoinSet};

use crate::api::ApiClient;
use crate::canvas::MapCanvas;
use crate::config::PlannerConfig;
use crate::error::ApiError;
use crate::location::{DeviceLocator, LocationResolver};
use crate::session::{Command, MapSession, Msg, SessionSettings};

pub struct Driver<C: MapCanvas, D> {
    session: MapSession<C>,
    api: ApiClient,
    resolver: Arc<LocationResolver<D, ApiClient>>,
    /// Requests and debounce timers; the session is busy while any remain.
    work: JoinSet<Msg>,
    /// Notice dismissals only.
    timers: JoinSet<Msg>,
}

impl<C, D> Driver<C, D>
where
    C: MapCanvas,
    D: DeviceLocator + 'static,
{
    /// Opens a session on `canvas` and kicks off location resolution.
    pub fn start(canvas: C, device: D, config: &PlannerConfig) -> Result<Self, ApiError> {
        let api = ApiClient::new(config)?;
        let resolver = Arc::new(LocationResolver::new(device, api.clone(), config.location));
        let (session, orders) = MapSession::init(canvas, SessionSettings::from(config));
        let mut driver = Self {
            session,
            api,
            resolver,
            work: JoinSet::new(),
            timers: JoinSet::new(),
        };
        driver.perform(orders);
        Ok(driver)
    }

    pub fn session(&self) -> &MapSession<C> {
        &self.session
    }

    pub fn api(&self) -> &ApiClient {
        &self.api
    }

    pub fn into_session(self) -> MapSession<C> {
        self.session
    }

    pub fn is_idle(&self) -> bool {
        self.work.is_empty()
    }

    pub fn dispatch(&mut self, msg: Msg) {
        let orders = self.session.update(msg);
        self.perform(orders);
    }

    /// Processes results until no request or debounce is outstanding.
    /// Pending notice dismissals are delivered only while waiting on work.
    pub async fn run_until_idle(&mut self) {
        loop {
            tokio::select! {
                Some(joined) = self.work.join_next() => self.absorb(joined),
                Some(joined) = self.timers.join_next(), if !self.work.is_empty() => self.absorb(joined),
                else => break,
            }
        }
    }

    /// Like [`Driver::run_until_idle`] but also waits out every notice timer.
    pub async fn run_to_completion(&mut self) {
        loop {
            tokio::select! {
                Some(joined) = self.work.join_next() => self.absorb(joined),
                Some(joined) = self.timers.join_next() => self.absorb(joined),
                else => break,
            }
        }
    }

    fn absorb(&mut self, joined: Result<Msg, JoinError>) {
        match joined {
            Ok(msg) => self.dispatch(msg),
            Err(err) => tracing::error!("session task failed: {err}"),
        }
    }

    fn perform(&mut self, orders: Vec<Command>) {
        for order in orders {
            self.perform_one(order);
        }
    }

    fn perform_one(&mut self, order: Command) {
        let api = self.api.clone();
        match order {
            Command::ResolveLocation => {
                let resolver = Arc::clone(&self.resolver);
                self.work
                    .spawn(async move { Msg::LocationResolved(resolver.locate().await) });
            }
            Command::FetchRoute {
                generation,
                request,
            } => {
                self.work.spawn(async move {
                    Msg::RouteFetched {
                        generation,
                        result: api.directions(&request).await,
                    }
                });
            }
            Command::FetchHealthyRoute {
                generation,
                request,
            } => {
                self.work.spawn(async move {
                    Msg::HealthyRouteFetched {
                        generation,
                        result: api.healthy_route(&request).await,
                    }
                });
            }
            Command::FetchSensors { generation, bounds } => {
                self.work.spawn(async move {
                    Msg::SensorsFetched {
                        generation,
                        result: api.air_sensors(bounds).await,
                    }
                });
            }
            Command::FetchGrid {
                generation,
                bounds,
                grid_size,
            } => {
                self.work.spawn(async move {
                    Msg::GridFetched {
                        generation,
                        result: api.kriging_matrix(bounds, grid_size).await,
                    }
                });
            }
            Command::Geocode { generation, query } => {
                self.work.spawn(async move {
                    Msg::SearchResults {
                        generation,
                        result: api.geocode(&query).await,
                    }
                });
            }
            Command::ReverseGeocode { slot, at } => {
                self.work.spawn(async move {
                    Msg::SlotLabelled {
                        slot,
                        at,
                        place_name: api.place_name_or_unknown(at).await,
                    }
                });
            }
            Command::FetchStation { uid } => {
                self.work.spawn(async move {
                    Msg::StationFetched {
                        uid,
                        result: api.station_feed(uid).await,
                    }
                });
            }
            Command::Debounce { delay, msg } => {
                self.work.spawn(async move {
                    tokio::time::sleep(delay).await;
                    *msg
                });
            }
            Command::DismissNoticeAfter { delay, id } => {
                self.timers.spawn(async move {
                    tokio::time::sleep(delay).await;
                    Msg::DismissNotice { id }
                });
            }
        }
    }
}
