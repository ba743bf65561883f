use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum RouteError {
    #[error("Location access was denied")]
    PermissionDenied,

    #[error("No location found for {0:?}")]
    GeocodeNotFound(String),

    #[error("Geocoding request failed: {0}")]
    GeocodeService(String),

    #[error("Directions request failed: {0}")]
    DirectionsService(String),

    #[error("No route found between the two points")]
    DirectionsEmptyResult,

    #[error("Current location unavailable: {0}")]
    LocationUnavailable(String),

    // A newer search replaced the one this result belonged to.
    #[error("Search superseded by a newer one")]
    Superseded,

    #[error("Invalid coordinate ({lat}, {lng})")]
    InvalidCoordinate { lat: f64, lng: f64 },

    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl RouteError {
    /// Whether the user should be told about this failure.
    pub fn is_reportable(&self) -> bool {
        !matches!(self, RouteError::Superseded)
    }
}
