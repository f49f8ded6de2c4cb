pub mod api;
pub mod canvas;
pub mod config;
pub mod driver;
pub mod error;
pub mod geometry;
pub mod location;
pub mod notice;
pub mod session;
pub mod station;

pub use api::ApiClient;
pub use config::PlannerConfig;
pub use driver::Driver;
pub use error::{ApiError, GeolocationError};
pub use session::{Command, MapSession, Msg};
