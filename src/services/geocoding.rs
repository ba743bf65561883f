use super::{Coordinate, Place};

use crate::config::Config;
use crate::RouteError;

use async_trait::async_trait;
use google_maps::geocoding::{GeocodingError, GeocodingStatus};
use google_maps::{GoogleMapsClient, GoogleMapsError};
use log::*;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;

#[async_trait]
pub trait GeocodingService: Send + Sync {
    async fn geocode(&self, address: &str) -> Result<Place, RouteError>;
}

pub struct GoogleMapsService {
    pub(super) client: GoogleMapsClient,
}

impl GoogleMapsService {
    pub fn new(config: &Config) -> Result<Self, RouteError> {
        let token = config
            .google_maps_token
            .as_deref()
            .ok_or_else(|| RouteError::Config("GOOGLE_MAPS_TOKEN not set".to_string()))?;
        Ok(GoogleMapsService {
            client: GoogleMapsClient::new(token),
        })
    }
}

pub(super) fn to_coordinate(lat: Decimal, lng: Decimal) -> Result<Coordinate, RouteError> {
    let lat = lat.to_f64().unwrap_or(f64::NAN);
    let lng = lng.to_f64().unwrap_or(f64::NAN);
    Coordinate::new(lat, lng)
}

/// Google reports an address it cannot place as a `ZERO_RESULTS` error rather
/// than an empty result list.
fn geocode_error(address: &str, error: GoogleMapsError) -> RouteError {
    match error {
        GoogleMapsError::Geocoding(GeocodingError::GoogleMapsService(
            GeocodingStatus::ZeroResults,
            _,
        )) => RouteError::GeocodeNotFound(address.to_string()),
        other => RouteError::GeocodeService(other.to_string()),
    }
}

#[async_trait]
impl GeocodingService for GoogleMapsService {
    async fn geocode(&self, address: &str) -> Result<Place, RouteError> {
        trace!("Geocoding {:?} with Google Maps.", address);
        let response = self
            .client
            .geocoding()
            .with_address(address)
            .execute()
            .await
            .map_err(|e| geocode_error(address, e))?;
        let result = response
            .results
            .first()
            .ok_or_else(|| RouteError::GeocodeNotFound(address.to_string()))?;
        let location = &result.geometry.location;
        trace!("Received coordinates from Google Maps geocoding API.");
        Ok(Place {
            coordinate: to_coordinate(location.lat, location.lng)?,
            label: result.formatted_address.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_results_means_not_found() {
        let error = GeocodingError::GoogleMapsService(GeocodingStatus::ZeroResults, None);
        assert_eq!(
            geocode_error("Atlantis", error.into()),
            RouteError::GeocodeNotFound("Atlantis".to_string())
        );
    }

    #[test]
    fn other_statuses_are_service_errors() {
        let error = GeocodingError::GoogleMapsService(
            GeocodingStatus::OverQueryLimit,
            Some("quota".to_string()),
        );
        assert!(matches!(
            geocode_error("London", error.into()),
            RouteError::GeocodeService(_)
        ));
        assert!(matches!(
            geocode_error("London", GeocodingError::QueryNotBuilt.into()),
            RouteError::GeocodeService(_)
        ));
    }
}
