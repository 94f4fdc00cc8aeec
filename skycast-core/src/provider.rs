use crate::error::FetchError;
use crate::model::{CurrentConditions, ForecastEntry, UnitSystem};
use async_trait::async_trait;
use std::fmt::Debug;

pub mod openweather;

/// Stateless weather-provider seam: one outbound request per call, no
/// retries, no caching. The coordinator depends on this trait so tests
/// can substitute a double for the real HTTP client.
#[async_trait]
pub trait WeatherApi: Send + Sync + Debug {
    async fn current_by_city(
        &self,
        city: &str,
        units: UnitSystem,
    ) -> Result<CurrentConditions, FetchError>;

    async fn current_by_coords(
        &self,
        lat: f64,
        lon: f64,
        units: UnitSystem,
    ) -> Result<CurrentConditions, FetchError>;

    async fn forecast_by_city(
        &self,
        city: &str,
        units: UnitSystem,
    ) -> Result<Vec<ForecastEntry>, FetchError>;
}
