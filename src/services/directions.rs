use super::{geocoding::GoogleMapsService, Coordinate, RouteCandidate, TransportMode};

use crate::RouteError;

use async_trait::async_trait;
use google_maps::directions::error::Error as DirectionsError;
use google_maps::directions::{DirectionsStatus, Location as Waypoint, TravelMode};
use google_maps::{GoogleMapsError, LatLng};
use log::*;
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;

/// Precision used by Google's encoded polyline format.
const POLYLINE_PRECISION: u32 = 5;

#[async_trait]
pub trait DirectionsService: Send + Sync {
    /// Candidate routes in the order the provider ranks them.
    async fn route(
        &self,
        origin: Coordinate,
        destination: Coordinate,
        mode: TransportMode,
        alternates_requested: bool,
    ) -> Result<Vec<RouteCandidate>, RouteError>;
}

fn to_waypoint(coordinate: Coordinate) -> Result<Waypoint, RouteError> {
    let invalid = || RouteError::InvalidCoordinate {
        lat: coordinate.lat,
        lng: coordinate.lng,
    };
    let lat = Decimal::from_f64(coordinate.lat).ok_or_else(invalid)?;
    let lng = Decimal::from_f64(coordinate.lng).ok_or_else(invalid)?;
    let latlng = LatLng::try_from_dec(lat, lng).map_err(|_| invalid())?;
    Ok(Waypoint::LatLng(latlng))
}

/// Google answers `ZERO_RESULTS` or `NOT_FOUND` with an error. Both mean there
/// is no route between the two points.
fn directions_error(error: GoogleMapsError) -> Result<Vec<RouteCandidate>, RouteError> {
    match error {
        GoogleMapsError::Directions(DirectionsError::GoogleMapsService(
            DirectionsStatus::ZeroResults | DirectionsStatus::NotFound,
            _,
        )) => {
            debug!("Google Maps found no route.");
            Ok(Vec::new())
        }
        other => Err(RouteError::DirectionsService(other.to_string())),
    }
}

/// Decodes a Google encoded polyline into coordinates.
pub fn decode_path(encoded: &str) -> Result<Vec<Coordinate>, RouteError> {
    let line = polyline::decode_polyline(encoded, POLYLINE_PRECISION)
        .map_err(|e| RouteError::DirectionsService(format!("bad polyline: {e}")))?;
    line.into_points()
        .into_iter()
        .map(|point| Coordinate::new(point.y(), point.x()))
        .collect()
}

#[async_trait]
impl DirectionsService for GoogleMapsService {
    async fn route(
        &self,
        origin: Coordinate,
        destination: Coordinate,
        mode: TransportMode,
        alternates_requested: bool,
    ) -> Result<Vec<RouteCandidate>, RouteError> {
        trace!("Requesting {} directions {} -> {}.", mode, origin, destination);
        let travel_mode = match mode {
            // Google picks driving when no mode is given.
            TransportMode::Any => None,
            TransportMode::Driving => Some(TravelMode::Driving),
            TransportMode::Walking => Some(TravelMode::Walking),
            TransportMode::Transit => Some(TravelMode::Transit),
        };

        let mut request = self
            .client
            .directions(to_waypoint(origin)?, to_waypoint(destination)?);
        let result = match travel_mode {
            Some(travel_mode) => {
                request
                    .with_alternatives(alternates_requested)
                    .with_travel_mode(travel_mode)
                    .execute()
                    .await
            }
            None => request.with_alternatives(alternates_requested).execute().await,
        };
        let response = match result {
            Ok(response) => response,
            Err(e) => return directions_error(e),
        };
        trace!(
            "Received {} routes from Google Maps directions API.",
            response.routes.len()
        );

        let mut candidates = Vec::with_capacity(response.routes.len());
        for route in &response.routes {
            let points = decode_path(&route.overview_polyline.points)?;
            let summary = Some(route.summary.clone()).filter(|s| !s.is_empty());
            match RouteCandidate::new(points, summary) {
                Some(candidate) => candidates.push(candidate),
                None => debug!("Dropping route with fewer than two points."),
            }
        }
        Ok(candidates)
    }
}
