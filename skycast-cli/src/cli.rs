use anyhow::{Context, bail};
use clap::{Parser, Subcommand};
use std::sync::Arc;

use skycast_core::{
    Config, FetchStatus, FilePreferenceStore, GeoIpResolver, OpenWeatherClient, Snapshot,
    UnitSystem, WeatherCoordinator,
};

/// Top-level CLI struct.
#[derive(Debug, Parser)]
#[command(name = "skycast", version, about = "Weather lookup client")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Store the OpenWeather API key.
    Configure,

    /// Show current conditions and a 5-day forecast for a city.
    /// Without a city, repeats the last search.
    Show {
        /// City name, e.g. "London" or "Kyiv,UA".
        city: Option<String>,

        /// Unit system: "metric" or "imperial". Persisted once used.
        #[arg(long)]
        units: Option<String>,
    },

    /// Show current conditions for the current (geo-IP) location.
    Here {
        /// Unit system: "metric" or "imperial". Persisted once used.
        #[arg(long)]
        units: Option<String>,
    },
}

impl Cli {
    pub async fn run(self) -> anyhow::Result<()> {
        match self.command {
            Command::Configure => configure(),
            Command::Show { city, units } => {
                let coordinator = build_coordinator(units.as_deref())?;
                match city {
                    Some(city) => coordinator.search_city(&city).await,
                    None => {
                        coordinator.start().await;
                        if coordinator.snapshot().target.is_none() {
                            bail!(
                                "No city given and no previous search stored.\n\
                                 Hint: run `skycast show <city>` first."
                            );
                        }
                    }
                }
                report(&coordinator.snapshot())
            }
            Command::Here { units } => {
                let coordinator = build_coordinator(units.as_deref())?;
                coordinator.use_current_location().await;
                report(&coordinator.snapshot())
            }
        }
    }
}

fn configure() -> anyhow::Result<()> {
    let key = inquire::Text::new("OpenWeather API key:")
        .prompt()
        .context("Failed to read API key")?;

    let mut config = Config::load()?;
    config.set_api_key(key.trim().to_string());
    config.require_api_key()?;
    config.save()?;

    println!("Saved API key to {}", Config::config_file_path()?.display());
    Ok(())
}

/// Wire the coordinator up to the real client, resolver, and store.
/// Fails fast on a missing API key before any request could go out.
fn build_coordinator(units: Option<&str>) -> anyhow::Result<WeatherCoordinator> {
    let config = Config::load()?;
    let api_key = config.require_api_key()?.to_string();

    let store = FilePreferenceStore::open_default()?;
    if let Some(units) = units {
        use skycast_core::PreferenceStore;
        store.save_units(UnitSystem::try_from(units)?);
    }

    Ok(WeatherCoordinator::new(
        Arc::new(OpenWeatherClient::new(api_key)),
        Arc::new(GeoIpResolver::new()),
        Arc::new(store),
    ))
}

fn report(snapshot: &Snapshot) -> anyhow::Result<()> {
    match snapshot.status {
        FetchStatus::Success => {
            render(snapshot);
            Ok(())
        }
        FetchStatus::Error => {
            bail!(
                "{}",
                snapshot.error.as_deref().unwrap_or("Failed to fetch weather data")
            )
        }
        FetchStatus::Idle | FetchStatus::Loading => {
            println!("Nothing to show yet. Try `skycast show <city>`.");
            Ok(())
        }
    }
}

fn render(snapshot: &Snapshot) {
    let units = snapshot.units;

    if let Some(c) = &snapshot.conditions {
        if c.country_code.is_empty() {
            println!("{}", c.location_name);
        } else {
            println!("{}, {}", c.location_name, c.country_code);
        }
        println!("  {}", c.condition_description);
        println!(
            "  Temperature: {:.1}{} (feels like {:.1}{})",
            c.temperature,
            units.temperature_suffix(),
            c.feels_like,
            units.temperature_suffix()
        );
        println!(
            "  Humidity: {}%   Pressure: {} hPa",
            c.humidity, c.pressure_hpa
        );
        println!(
            "  Wind: {:.1} {}   Cloud cover: {}%",
            c.wind_speed,
            units.wind_speed_suffix(),
            c.cloudiness_pct
        );
    }

    let days = snapshot.daily_forecast();
    if !days.is_empty() {
        println!();
        println!("Forecast:");
        for day in days {
            println!(
                "  {}  {:>6.1}{}  {}",
                day.timestamp.format("%a %d %b"),
                day.temperature,
                units.temperature_suffix(),
                day.condition_description
            );
        }
    }
}
