use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::fmt::Debug;
use std::time::Duration;

use crate::error::LocationError;

const GEOIP_URL: &str = "https://ipapi.co/json/";
const RESOLVE_TIMEOUT: Duration = Duration::from_secs(10);

/// A resolved position. Accuracy is whatever the underlying source
/// offers; for the geo-IP resolver that is city-level at best.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Position {
    pub lat: f64,
    pub lon: f64,
}

/// Single-shot position lookup. No automatic retries; the coordinator
/// never issues overlapping calls.
#[async_trait]
pub trait LocationResolver: Send + Sync + Debug {
    async fn resolve(&self) -> Result<Position, LocationError>;
}

/// Approximates the current position from the machine's public IP.
/// Coarse, but needs no permissions and no API key.
#[derive(Debug, Clone, Default)]
pub struct GeoIpResolver {
    http: Client,
}

impl GeoIpResolver {
    pub fn new() -> Self {
        Self::default()
    }
}

#[derive(Debug, Deserialize)]
struct GeoIpResponse {
    latitude: Option<f64>,
    longitude: Option<f64>,
}

#[async_trait]
impl LocationResolver for GeoIpResolver {
    async fn resolve(&self) -> Result<Position, LocationError> {
        let res = self
            .http
            .get(GEOIP_URL)
            .timeout(RESOLVE_TIMEOUT)
            .send()
            .await
            .map_err(|e| LocationError::PositionUnavailable(e.to_string()))?;

        let status = res.status();
        if status == reqwest::StatusCode::FORBIDDEN {
            // ipapi returns 403 when the client is rate-limited or blocked.
            return Err(LocationError::PermissionDenied);
        }
        if !status.is_success() {
            return Err(LocationError::PositionUnavailable(format!(
                "geo-IP lookup failed with status {status}"
            )));
        }

        let body: GeoIpResponse = res
            .json()
            .await
            .map_err(|e| LocationError::PositionUnavailable(e.to_string()))?;

        match (body.latitude, body.longitude) {
            (Some(lat), Some(lon)) => {
                tracing::debug!("resolved position {lat},{lon} via geo-IP");
                Ok(Position { lat, lon })
            }
            _ => Err(LocationError::PositionUnavailable(
                "geo-IP response carried no coordinates".to_string(),
            )),
        }
    }
}

/// Resolver for builds or commands where no position source exists.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnsupportedResolver;

#[async_trait]
impl LocationResolver for UnsupportedResolver {
    async fn resolve(&self) -> Result<Position, LocationError> {
        Err(LocationError::Unsupported)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn unsupported_resolver_always_fails() {
        let err = UnsupportedResolver.resolve().await.unwrap_err();
        assert_eq!(err, LocationError::Unsupported);
    }
}
