use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// The current subject of a weather lookup: a city name or a coordinate
/// pair, never both. Setting one replaces the other.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum QueryTarget {
    #[default]
    None,
    City(String),
    Coordinates {
        lat: f64,
        lon: f64,
    },
}

impl QueryTarget {
    pub fn city(&self) -> Option<&str> {
        match self {
            QueryTarget::City(name) => Some(name),
            _ => None,
        }
    }

    pub fn is_none(&self) -> bool {
        matches!(self, QueryTarget::None)
    }
}

/// Measurement convention forwarded verbatim to the provider and applied
/// to temperature and wind speed display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum UnitSystem {
    #[default]
    Metric,
    Imperial,
}

impl UnitSystem {
    pub fn as_str(&self) -> &'static str {
        match self {
            UnitSystem::Metric => "metric",
            UnitSystem::Imperial => "imperial",
        }
    }

    pub fn temperature_suffix(&self) -> &'static str {
        match self {
            UnitSystem::Metric => "°C",
            UnitSystem::Imperial => "°F",
        }
    }

    pub fn wind_speed_suffix(&self) -> &'static str {
        match self {
            UnitSystem::Metric => "m/s",
            UnitSystem::Imperial => "mph",
        }
    }
}

impl std::fmt::Display for UnitSystem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<&str> for UnitSystem {
    type Error = anyhow::Error;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value.to_lowercase().as_str() {
            "metric" => Ok(UnitSystem::Metric),
            "imperial" => Ok(UnitSystem::Imperial),
            _ => Err(anyhow::anyhow!(
                "Unknown unit system '{value}'. Supported: metric, imperial."
            )),
        }
    }
}

/// Lifecycle of a fetch sequence, driven solely by the coordinator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FetchStatus {
    #[default]
    Idle,
    Loading,
    Success,
    Error,
}

/// Normalized current-weather snapshot, replaced wholesale on each
/// successful fetch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CurrentConditions {
    pub location_name: String,
    pub country_code: String,
    pub temperature: f64,
    pub feels_like: f64,
    pub humidity: u8,
    pub pressure_hpa: u32,
    pub wind_speed: f64,
    pub cloudiness_pct: u8,
    pub condition_icon: String,
    pub condition_description: String,
}

/// One 3-hour forecast sample.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastEntry {
    pub timestamp: DateTime<Utc>,
    pub temperature: f64,
    pub condition_icon: String,
    pub condition_description: String,
}

impl ForecastEntry {
    fn date(&self) -> NaiveDate {
        // The timestamp's own date, deliberately not timezone-converted.
        self.timestamp.date_naive()
    }
}

/// Reduce a 3-hourly forecast to at most one representative entry per
/// calendar day: first entry per date wins, encounter order preserved,
/// capped at five days.
pub fn daily_forecast(entries: &[ForecastEntry]) -> Vec<ForecastEntry> {
    const MAX_DAYS: usize = 5;

    let mut seen: Vec<NaiveDate> = Vec::with_capacity(MAX_DAYS);
    let mut days = Vec::with_capacity(MAX_DAYS);

    for entry in entries {
        let date = entry.date();
        if seen.contains(&date) {
            continue;
        }
        seen.push(date);
        days.push(entry.clone());
        if days.len() == MAX_DAYS {
            break;
        }
    }

    days
}
