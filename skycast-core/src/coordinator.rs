use parking_lot::Mutex;
use std::sync::Arc;

use crate::location::LocationResolver;
use crate::model::{
    CurrentConditions, FetchStatus, ForecastEntry, QueryTarget, UnitSystem, daily_forecast,
};
use crate::provider::WeatherApi;
use crate::store::PreferenceStore;

/// Read-only view of the coordinator's state, cloned out for rendering.
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    pub status: FetchStatus,
    pub conditions: Option<CurrentConditions>,
    pub forecast: Vec<ForecastEntry>,
    pub error: Option<String>,
    pub target: QueryTarget,
    pub units: UnitSystem,
}

impl Snapshot {
    /// The forecast reduced to one representative entry per calendar
    /// day, at most five days.
    pub fn daily_forecast(&self) -> Vec<ForecastEntry> {
        daily_forecast(&self.forecast)
    }
}

#[derive(Debug, Default)]
struct State {
    target: QueryTarget,
    units: UnitSystem,
    status: FetchStatus,
    conditions: Option<CurrentConditions>,
    forecast: Vec<ForecastEntry>,
    error: Option<String>,
    // Bumped on every target/unit mutation; sequences apply their
    // outcome only while they hold the latest value.
    generation: u64,
}

/// Owns the query target, the unit system, and the fetch lifecycle.
///
/// Every mutation of the target or units starts exactly one fetch
/// sequence; a sequence whose generation token has been superseded
/// discards its outcome instead of applying it. On fetch failure the
/// previously displayed conditions and forecast are retained
/// (stale-but-visible) alongside the error message.
#[derive(Debug)]
pub struct WeatherCoordinator {
    state: Mutex<State>,
    api: Arc<dyn WeatherApi>,
    resolver: Arc<dyn LocationResolver>,
    store: Arc<dyn PreferenceStore>,
}

impl WeatherCoordinator {
    /// Build a coordinator seeded from the preference store. No fetch
    /// is issued until [`Self::start`] or an action runs.
    pub fn new(
        api: Arc<dyn WeatherApi>,
        resolver: Arc<dyn LocationResolver>,
        store: Arc<dyn PreferenceStore>,
    ) -> Self {
        let target = match store.load_city() {
            Some(city) if !city.trim().is_empty() => QueryTarget::City(city),
            _ => QueryTarget::None,
        };
        let units = store.load_units();

        Self {
            state: Mutex::new(State {
                target,
                units,
                ..State::default()
            }),
            api,
            resolver,
            store,
        }
    }

    /// Run the initial fetch sequence against the loaded preferences.
    /// Idle when no city was stored.
    pub async fn start(&self) {
        let token = self.bump(|_| {});
        self.run_sequence(token).await;
    }

    /// Set the query target to a city name, clearing any coordinates.
    /// A blank name clears the target entirely.
    pub async fn search_city(&self, name: &str) {
        let name = name.trim();
        let token = self.bump(|state| {
            state.target = if name.is_empty() {
                QueryTarget::None
            } else {
                QueryTarget::City(name.to_string())
            };
        });
        self.run_sequence(token).await;
    }

    /// Resolve the current position and fetch for it. On resolver
    /// failure the query target is left untouched and only the status
    /// and message change.
    pub async fn use_current_location(&self) {
        let observed = {
            let mut state = self.state.lock();
            state.status = FetchStatus::Loading;
            state.error = None;
            state.generation
        };

        match self.resolver.resolve().await {
            Ok(pos) => {
                let token = self.bump(|state| {
                    state.target = QueryTarget::Coordinates {
                        lat: pos.lat,
                        lon: pos.lon,
                    };
                });
                self.run_sequence(token).await;
            }
            Err(e) => {
                // Ignore the failure if something newer started while
                // we were waiting on the resolver.
                let mut state = self.state.lock();
                if state.generation == observed {
                    state.status = FetchStatus::Error;
                    state.error = Some(e.to_string());
                }
            }
        }
    }

    /// Change the unit system and re-fetch against the current target.
    pub async fn set_units(&self, units: UnitSystem) {
        let token = self.bump(|state| state.units = units);
        self.run_sequence(token).await;
    }

    pub fn snapshot(&self) -> Snapshot {
        let state = self.state.lock();
        Snapshot {
            status: state.status,
            conditions: state.conditions.clone(),
            forecast: state.forecast.clone(),
            error: state.error.clone(),
            target: state.target.clone(),
            units: state.units,
        }
    }

    /// Mutate state and advance the generation, returning the new token.
    fn bump(&self, f: impl FnOnce(&mut State)) -> u64 {
        let mut state = self.state.lock();
        f(&mut state);
        state.generation += 1;
        state.generation
    }

    /// Apply a state mutation only if `token` is still the latest
    /// generation. Returns whether it was applied.
    fn apply(&self, token: u64, f: impl FnOnce(&mut State)) -> bool {
        let mut state = self.state.lock();
        if state.generation != token {
            tracing::debug!("discarding outcome of superseded fetch sequence");
            return false;
        }
        f(&mut state);
        true
    }

    fn fail(&self, token: u64, message: String) {
        self.apply(token, |state| {
            state.status = FetchStatus::Error;
            state.error = Some(message);
            // Stale conditions and forecast stay visible.
        });
    }

    /// One fetch sequence: current conditions for the target, then the
    /// forecast for city targets. Coordinate targets fetch no forecast
    /// and leave the previous one untouched.
    async fn run_sequence(&self, token: u64) {
        let (target, units) = {
            let state = self.state.lock();
            if state.generation != token {
                return;
            }
            (state.target.clone(), state.units)
        };

        if target.is_none() {
            self.apply(token, |state| {
                state.status = FetchStatus::Idle;
                state.error = None;
            });
            return;
        }

        self.apply(token, |state| {
            state.status = FetchStatus::Loading;
            state.error = None;
        });

        let current = match &target {
            QueryTarget::City(name) => self.api.current_by_city(name, units).await,
            QueryTarget::Coordinates { lat, lon } => {
                self.api.current_by_coords(*lat, *lon, units).await
            }
            QueryTarget::None => return,
        };

        let conditions = match current {
            Ok(conditions) => conditions,
            Err(e) => {
                self.fail(token, e.to_string());
                return;
            }
        };

        if !self.apply(token, |state| state.conditions = Some(conditions)) {
            return;
        }

        if let QueryTarget::City(name) = &target {
            match self.api.forecast_by_city(name, units).await {
                Ok(forecast) => {
                    if !self.apply(token, |state| state.forecast = forecast) {
                        return;
                    }
                }
                Err(e) => {
                    self.fail(token, e.to_string());
                    return;
                }
            }
        }

        let applied = self.apply(token, |state| state.status = FetchStatus::Success);
        if applied {
            if let Some(city) = target.city() {
                self.store.save_city(city);
            }
            self.store.save_units(units);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{FetchError, LocationError};
    use crate::location::Position;
    use async_trait::async_trait;
    use chrono::{Duration as ChronoDuration, TimeZone, Utc};
    use std::collections::HashMap;
    use std::time::Duration;

    fn conditions(name: &str) -> CurrentConditions {
        CurrentConditions {
            location_name: name.to_string(),
            country_code: "GB".to_string(),
            temperature: 12.0,
            feels_like: 11.0,
            humidity: 70,
            pressure_hpa: 1012,
            wind_speed: 3.5,
            cloudiness_pct: 40,
            condition_icon: "03d".to_string(),
            condition_description: "scattered clouds".to_string(),
        }
    }

    fn forecast_entries() -> Vec<ForecastEntry> {
        let start = Utc.with_ymd_and_hms(2024, 3, 4, 9, 0, 0).unwrap();
        (0..16i64)
            .map(|i| ForecastEntry {
                timestamp: start + ChronoDuration::hours(3 * i),
                temperature: i as f64,
                condition_icon: "01d".to_string(),
                condition_description: "clear sky".to_string(),
            })
            .collect()
    }

    #[derive(Debug, Default)]
    struct MockApi {
        current_errors: HashMap<String, FetchError>,
        forecast_error: Option<FetchError>,
        delays: HashMap<String, Duration>,
        calls: Mutex<Vec<String>>,
    }

    impl MockApi {
        fn calls(&self) -> Vec<String> {
            self.calls.lock().clone()
        }
    }

    #[async_trait]
    impl WeatherApi for MockApi {
        async fn current_by_city(
            &self,
            city: &str,
            units: UnitSystem,
        ) -> Result<CurrentConditions, FetchError> {
            self.calls.lock().push(format!("current:{city}:{units}"));
            if let Some(delay) = self.delays.get(city) {
                tokio::time::sleep(*delay).await;
            }
            match self.current_errors.get(city) {
                Some(err) => Err(err.clone()),
                None => Ok(conditions(city)),
            }
        }

        async fn current_by_coords(
            &self,
            lat: f64,
            lon: f64,
            _units: UnitSystem,
        ) -> Result<CurrentConditions, FetchError> {
            self.calls.lock().push(format!("coords:{lat},{lon}"));
            Ok(conditions("Current location"))
        }

        async fn forecast_by_city(
            &self,
            city: &str,
            units: UnitSystem,
        ) -> Result<Vec<ForecastEntry>, FetchError> {
            self.calls.lock().push(format!("forecast:{city}:{units}"));
            match &self.forecast_error {
                Some(err) => Err(err.clone()),
                None => Ok(forecast_entries()),
            }
        }
    }

    #[derive(Debug)]
    struct MockResolver(Result<Position, LocationError>);

    #[async_trait]
    impl LocationResolver for MockResolver {
        async fn resolve(&self) -> Result<Position, LocationError> {
            self.0.clone()
        }
    }

    #[derive(Debug, Default)]
    struct MemStore {
        city: Mutex<Option<String>>,
        units: Mutex<Option<UnitSystem>>,
    }

    impl PreferenceStore for MemStore {
        fn load_city(&self) -> Option<String> {
            self.city.lock().clone()
        }

        fn load_units(&self) -> UnitSystem {
            (*self.units.lock()).unwrap_or_default()
        }

        fn save_city(&self, name: &str) {
            *self.city.lock() = Some(name.to_string());
        }

        fn save_units(&self, units: UnitSystem) {
            *self.units.lock() = Some(units);
        }
    }

    struct Harness {
        coordinator: WeatherCoordinator,
        api: Arc<MockApi>,
        store: Arc<MemStore>,
    }

    fn harness(api: MockApi, resolver: MockResolver, store: MemStore) -> Harness {
        let api = Arc::new(api);
        let store = Arc::new(store);
        let coordinator = WeatherCoordinator::new(
            api.clone(),
            Arc::new(resolver),
            store.clone(),
        );
        Harness {
            coordinator,
            api,
            store,
        }
    }

    fn denied_resolver() -> MockResolver {
        MockResolver(Err(LocationError::PermissionDenied))
    }

    #[tokio::test]
    async fn successful_city_search_ends_in_success() {
        let h = harness(MockApi::default(), denied_resolver(), MemStore::default());

        h.coordinator.search_city("London").await;

        let snap = h.coordinator.snapshot();
        assert_eq!(snap.status, FetchStatus::Success);
        assert_eq!(
            snap.conditions.as_ref().map(|c| c.location_name.as_str()),
            Some("London")
        );
        assert!(!snap.forecast.is_empty());
        assert_eq!(snap.error, None);
        assert_eq!(snap.target, QueryTarget::City("London".into()));

        // Persisted on success.
        assert_eq!(h.store.load_city().as_deref(), Some("London"));
        assert_eq!(h.store.load_units(), UnitSystem::Metric);
    }

    #[tokio::test]
    async fn failed_fetch_keeps_stale_conditions() {
        let api = MockApi {
            current_errors: HashMap::from([(
                "Atlantis".to_string(),
                FetchError::NotFound("Atlantis".into()),
            )]),
            ..MockApi::default()
        };
        let h = harness(api, denied_resolver(), MemStore::default());

        h.coordinator.search_city("London").await;
        h.coordinator.search_city("Atlantis").await;

        let snap = h.coordinator.snapshot();
        assert_eq!(snap.status, FetchStatus::Error);
        assert!(snap.error.as_deref().is_some_and(|e| e.contains("Atlantis")));
        // Stale-but-visible: the London data survives the failure.
        assert_eq!(
            snap.conditions.as_ref().map(|c| c.location_name.as_str()),
            Some("London")
        );
        assert!(!snap.forecast.is_empty());
        // The failed city is not persisted.
        assert_eq!(h.store.load_city().as_deref(), Some("London"));
    }

    #[tokio::test]
    async fn forecast_failure_fails_the_whole_sequence() {
        let api = MockApi {
            forecast_error: Some(FetchError::Provider {
                status: 503,
                message: "forecast down".into(),
            }),
            ..MockApi::default()
        };
        let h = harness(api, denied_resolver(), MemStore::default());

        h.coordinator.search_city("London").await;

        let snap = h.coordinator.snapshot();
        assert_eq!(snap.status, FetchStatus::Error);
        assert_eq!(snap.error.as_deref(), Some("forecast down"));
        // Current conditions had already been stored by the sequence.
        assert_eq!(
            snap.conditions.as_ref().map(|c| c.location_name.as_str()),
            Some("London")
        );
        // Nothing is persisted for a failed sequence.
        assert_eq!(h.store.load_city(), None);
    }

    #[tokio::test]
    async fn superseded_sequence_outcome_is_discarded() {
        let api = MockApi {
            delays: HashMap::from([
                ("Slow".to_string(), Duration::from_millis(100)),
                ("Fast".to_string(), Duration::from_millis(10)),
            ]),
            ..MockApi::default()
        };
        let h = harness(api, denied_resolver(), MemStore::default());

        // "Slow" starts first but resolves after "Fast"; only the newer
        // sequence's outcome may be applied.
        tokio::join!(
            h.coordinator.search_city("Slow"),
            h.coordinator.search_city("Fast"),
        );

        let snap = h.coordinator.snapshot();
        assert_eq!(snap.status, FetchStatus::Success);
        assert_eq!(
            snap.conditions.as_ref().map(|c| c.location_name.as_str()),
            Some("Fast")
        );
        assert_eq!(snap.target, QueryTarget::City("Fast".into()));
        assert_eq!(h.store.load_city().as_deref(), Some("Fast"));

        // Both sequences issued their current-conditions request.
        let calls = h.api.calls();
        assert!(calls.contains(&"current:Slow:metric".to_string()));
        assert!(calls.contains(&"current:Fast:metric".to_string()));
    }

    #[tokio::test]
    async fn superseded_failure_is_also_discarded() {
        let api = MockApi {
            delays: HashMap::from([("Atlantis".to_string(), Duration::from_millis(100))]),
            current_errors: HashMap::from([(
                "Atlantis".to_string(),
                FetchError::NotFound("Atlantis".into()),
            )]),
            ..MockApi::default()
        };
        let h = harness(api, denied_resolver(), MemStore::default());

        tokio::join!(
            h.coordinator.search_city("Atlantis"),
            h.coordinator.search_city("London"),
        );

        let snap = h.coordinator.snapshot();
        assert_eq!(snap.status, FetchStatus::Success);
        assert_eq!(snap.error, None);
        assert_eq!(
            snap.conditions.as_ref().map(|c| c.location_name.as_str()),
            Some("London")
        );
    }

    #[tokio::test]
    async fn unit_round_trip_issues_two_more_sequences() {
        let h = harness(MockApi::default(), denied_resolver(), MemStore::default());

        h.coordinator.search_city("London").await;
        h.coordinator.set_units(UnitSystem::Imperial).await;
        h.coordinator.set_units(UnitSystem::Metric).await;

        let snap = h.coordinator.snapshot();
        assert_eq!(snap.status, FetchStatus::Success);
        assert_eq!(snap.target, QueryTarget::City("London".into()));
        assert_eq!(snap.units, UnitSystem::Metric);

        let current_calls: Vec<_> = h
            .api
            .calls()
            .into_iter()
            .filter(|c| c.starts_with("current:"))
            .collect();
        assert_eq!(
            current_calls,
            vec![
                "current:London:metric",
                "current:London:imperial",
                "current:London:metric",
            ]
        );
        assert_eq!(h.store.load_units(), UnitSystem::Metric);
    }

    #[tokio::test]
    async fn geolocation_denial_preserves_query_target() {
        let h = harness(MockApi::default(), denied_resolver(), MemStore::default());

        h.coordinator.search_city("London").await;
        h.coordinator.use_current_location().await;

        let snap = h.coordinator.snapshot();
        assert_eq!(snap.status, FetchStatus::Error);
        assert!(
            snap.error
                .as_deref()
                .is_some_and(|e| e.contains("permission denied"))
        );
        // The valid city target is not nulled out.
        assert_eq!(snap.target, QueryTarget::City("London".into()));
        assert_eq!(
            snap.conditions.as_ref().map(|c| c.location_name.as_str()),
            Some("London")
        );
    }

    #[tokio::test]
    async fn location_success_switches_target_and_skips_forecast() {
        let resolver = MockResolver(Ok(Position { lat: 51.5, lon: -0.12 }));
        let h = harness(MockApi::default(), resolver, MemStore::default());

        h.coordinator.search_city("London").await;
        let forecast_before = h.coordinator.snapshot().forecast;

        h.coordinator.use_current_location().await;

        let snap = h.coordinator.snapshot();
        assert_eq!(snap.status, FetchStatus::Success);
        assert_eq!(snap.target, QueryTarget::Coordinates { lat: 51.5, lon: -0.12 });
        assert_eq!(
            snap.conditions.as_ref().map(|c| c.location_name.as_str()),
            Some("Current location")
        );
        // Coordinate sequences fetch no forecast; the old one stays.
        assert_eq!(snap.forecast, forecast_before);
        let forecast_calls = h
            .api
            .calls()
            .iter()
            .filter(|c| c.starts_with("forecast:"))
            .count();
        assert_eq!(forecast_calls, 1);
        // Coordinates are never persisted as a city.
        assert_eq!(h.store.load_city().as_deref(), Some("London"));
    }

    #[tokio::test]
    async fn start_without_stored_city_is_idle() {
        let h = harness(MockApi::default(), denied_resolver(), MemStore::default());

        h.coordinator.start().await;

        let snap = h.coordinator.snapshot();
        assert_eq!(snap.status, FetchStatus::Idle);
        assert_eq!(snap.target, QueryTarget::None);
        assert!(h.api.calls().is_empty());
    }

    #[tokio::test]
    async fn start_with_stored_preferences_fetches_them() {
        let store = MemStore::default();
        store.save_city("Kyiv");
        store.save_units(UnitSystem::Imperial);
        let h = harness(MockApi::default(), denied_resolver(), store);

        h.coordinator.start().await;

        let snap = h.coordinator.snapshot();
        assert_eq!(snap.status, FetchStatus::Success);
        assert_eq!(snap.units, UnitSystem::Imperial);
        assert!(
            h.api
                .calls()
                .contains(&"current:Kyiv:imperial".to_string())
        );
    }

    #[tokio::test]
    async fn blank_search_clears_the_target() {
        let h = harness(MockApi::default(), denied_resolver(), MemStore::default());

        h.coordinator.search_city("London").await;
        h.coordinator.search_city("   ").await;

        let snap = h.coordinator.snapshot();
        assert_eq!(snap.status, FetchStatus::Idle);
        assert_eq!(snap.target, QueryTarget::None);
    }

    #[tokio::test]
    async fn snapshot_reduces_forecast_to_days() {
        let h = harness(MockApi::default(), denied_resolver(), MemStore::default());

        h.coordinator.search_city("London").await;

        let snap = h.coordinator.snapshot();
        let days = snap.daily_forecast();
        // 16 three-hourly samples starting 09:00 span 3 calendar days.
        assert_eq!(days.len(), 3);
        assert!(days.windows(2).all(|w| w[0].timestamp < w[1].timestamp));
    }
}
