//! Core library for the `skycast` weather client.
//!
//! This crate defines:
//! - Configuration & credentials handling
//! - The OpenWeather API client behind the [`provider::WeatherApi`] seam
//! - Location resolution and preference persistence
//! - The weather state coordinator that sequences lookups
//!
//! It is used by `skycast-cli`, but can also be reused by other frontends.

pub mod config;
pub mod coordinator;
pub mod error;
pub mod location;
pub mod model;
pub mod provider;
pub mod store;

pub use config::Config;
pub use coordinator::{Snapshot, WeatherCoordinator};
pub use error::{FetchError, LocationError};
pub use location::{GeoIpResolver, LocationResolver, Position};
pub use model::{
    CurrentConditions, FetchStatus, ForecastEntry, QueryTarget, UnitSystem, daily_forecast,
};
pub use provider::{WeatherApi, openweather::OpenWeatherClient};
pub use store::{FilePreferenceStore, PreferenceStore};
