use thiserror::Error;

/// Failures of a single provider request. Carries a human-readable
/// message and, where applicable, the HTTP status; never the raw
/// provider payload.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FetchError {
    #[error("Missing OpenWeather API key. Set SKYCAST_API_KEY or run `skycast configure`.")]
    Configuration,

    #[error("City '{0}' was not found")]
    NotFound(String),

    #[error("The provider rejected the API key")]
    ApiKey,

    #[error("Network error: {0}")]
    Network(String),

    #[error("{message}")]
    Provider { status: u16, message: String },
}

impl FetchError {
    pub fn http_status(&self) -> Option<u16> {
        match self {
            FetchError::NotFound(_) => Some(404),
            FetchError::ApiKey => Some(401),
            FetchError::Provider { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Failures of a single-shot position request.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LocationError {
    #[error("Geolocation is not supported on this system")]
    Unsupported,

    #[error("Location permission denied. Allow location access or search for a city.")]
    PermissionDenied,

    #[error("Could not determine current position: {0}")]
    PositionUnavailable(String),
}
