use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::time::Duration;

use crate::error::FetchError;
use crate::model::{CurrentConditions, ForecastEntry, UnitSystem};

use super::WeatherApi;

const DEFAULT_BASE_URL: &str = "https://api.openweathermap.org/data/2.5";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

/// Client for the OpenWeather "current weather" and "5 day / 3 hour
/// forecast" endpoints.
#[derive(Debug, Clone)]
pub struct OpenWeatherClient {
    api_key: String,
    base_url: String,
    http: Client,
}

impl OpenWeatherClient {
    pub fn new(api_key: String) -> Self {
        Self {
            api_key,
            base_url: DEFAULT_BASE_URL.to_string(),
            http: Client::new(),
        }
    }

    /// Point the client at a different base URL (used by tests to talk
    /// to a stub server).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        query: &[(&str, &str)],
        subject: &str,
    ) -> Result<T, FetchError> {
        // A missing key is a configuration problem; never hit the network.
        if self.api_key.trim().is_empty() {
            return Err(FetchError::Configuration);
        }

        let url = format!("{}/{}", self.base_url, endpoint);

        let res = self
            .http
            .get(&url)
            .query(query)
            .query(&[("appid", self.api_key.as_str())])
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await
            .map_err(|e| FetchError::Network(e.to_string()))?;

        let status = res.status();
        let body = res
            .text()
            .await
            .map_err(|e| FetchError::Network(e.to_string()))?;

        if !status.is_success() {
            tracing::debug!("OpenWeather {endpoint} request failed with status {status}");
            return Err(classify_failure(status, &body, subject));
        }

        serde_json::from_str(&body).map_err(|e| FetchError::Provider {
            status: status.as_u16(),
            message: format!("Unexpected provider response: {e}"),
        })
    }
}

#[async_trait]
impl WeatherApi for OpenWeatherClient {
    async fn current_by_city(
        &self,
        city: &str,
        units: UnitSystem,
    ) -> Result<CurrentConditions, FetchError> {
        let parsed: OwCurrentResponse = self
            .get_json("weather", &[("q", city), ("units", units.as_str())], city)
            .await?;

        Ok(parsed.into())
    }

    async fn current_by_coords(
        &self,
        lat: f64,
        lon: f64,
        units: UnitSystem,
    ) -> Result<CurrentConditions, FetchError> {
        let (lat, lon) = (lat.to_string(), lon.to_string());
        let subject = format!("{lat},{lon}");

        let parsed: OwCurrentResponse = self
            .get_json(
                "weather",
                &[("lat", lat.as_str()), ("lon", lon.as_str()), ("units", units.as_str())],
                &subject,
            )
            .await?;

        Ok(parsed.into())
    }

    async fn forecast_by_city(
        &self,
        city: &str,
        units: UnitSystem,
    ) -> Result<Vec<ForecastEntry>, FetchError> {
        let parsed: OwForecastResponse = self
            .get_json("forecast", &[("q", city), ("units", units.as_str())], city)
            .await?;

        Ok(parsed.list.into_iter().map(ForecastEntry::from).collect())
    }
}

/// Map a non-success response to the error taxonomy. The message falls
/// back through: provider JSON `message`, HTTP canonical reason, then a
/// generic string. That order is part of the contract.
fn classify_failure(status: StatusCode, body: &str, subject: &str) -> FetchError {
    match status {
        StatusCode::NOT_FOUND => FetchError::NotFound(subject.to_string()),
        StatusCode::UNAUTHORIZED => FetchError::ApiKey,
        _ => FetchError::Provider {
            status: status.as_u16(),
            message: failure_message(status, body),
        },
    }
}

fn failure_message(status: StatusCode, body: &str) -> String {
    let provider_message = serde_json::from_str::<OwErrorBody>(body)
        .ok()
        .and_then(|e| e.message)
        .filter(|m| !m.is_empty());

    provider_message
        .or_else(|| status.canonical_reason().map(str::to_string))
        .unwrap_or_else(|| "unknown error".to_string())
}

fn unix_to_utc(ts: i64) -> DateTime<Utc> {
    DateTime::<Utc>::from_timestamp(ts, 0).unwrap_or_else(Utc::now)
}

#[derive(Debug, Deserialize)]
struct OwErrorBody {
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OwMain {
    temp: f64,
    #[serde(default)]
    feels_like: f64,
    #[serde(default)]
    humidity: u8,
    #[serde(default)]
    pressure: u32,
}

#[derive(Debug, Deserialize, Default)]
struct OwWeather {
    #[serde(default)]
    description: String,
    #[serde(default)]
    icon: String,
}

#[derive(Debug, Deserialize, Default)]
struct OwWind {
    #[serde(default)]
    speed: f64,
}

#[derive(Debug, Deserialize, Default)]
struct OwClouds {
    #[serde(default)]
    all: u8,
}

#[derive(Debug, Deserialize, Default)]
struct OwSys {
    #[serde(default)]
    country: String,
}

#[derive(Debug, Deserialize)]
struct OwCurrentResponse {
    name: String,
    #[serde(default)]
    sys: OwSys,
    main: OwMain,
    #[serde(default)]
    weather: Vec<OwWeather>,
    #[serde(default)]
    wind: OwWind,
    #[serde(default)]
    clouds: OwClouds,
}

impl From<OwCurrentResponse> for CurrentConditions {
    fn from(raw: OwCurrentResponse) -> Self {
        let condition = raw.weather.into_iter().next().unwrap_or_default();

        CurrentConditions {
            location_name: raw.name,
            country_code: raw.sys.country,
            temperature: raw.main.temp,
            feels_like: raw.main.feels_like,
            humidity: raw.main.humidity,
            pressure_hpa: raw.main.pressure,
            wind_speed: raw.wind.speed,
            cloudiness_pct: raw.clouds.all,
            condition_icon: condition.icon,
            condition_description: condition.description,
        }
    }
}

#[derive(Debug, Deserialize)]
struct OwForecastSample {
    dt: i64,
    main: OwMain,
    #[serde(default)]
    weather: Vec<OwWeather>,
}

#[derive(Debug, Deserialize)]
struct OwForecastResponse {
    list: Vec<OwForecastSample>,
}

impl From<OwForecastSample> for ForecastEntry {
    fn from(raw: OwForecastSample) -> Self {
        let condition = raw.weather.into_iter().next().unwrap_or_default();

        ForecastEntry {
            timestamp: unix_to_utc(raw.dt),
            temperature: raw.main.temp,
            condition_icon: condition.icon,
            condition_description: condition.description,
        }
    }
}
