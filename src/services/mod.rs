use std::str::FromStr;

use derive_more::Display;
use serde::Serialize;

use crate::RouteError;

pub mod directions;
pub mod geocoding;
pub mod location;
pub mod render;
pub mod static_map;

const EARTH_RADIUS_METERS: f64 = 6_371_008.8;

#[derive(Debug, Display, Clone, Copy, PartialEq, Serialize)]
#[display(fmt = "({}, {})", lat, lng)]
pub struct Coordinate {
    pub lat: f64,
    pub lng: f64,
}

impl Coordinate {
    /// Builds a coordinate, rejecting non-finite or out-of-range values.
    pub fn new(lat: f64, lng: f64) -> Result<Self, RouteError> {
        let valid = lat.is_finite()
            && lng.is_finite()
            && (-90.0..=90.0).contains(&lat)
            && (-180.0..=180.0).contains(&lng);
        if !valid {
            return Err(RouteError::InvalidCoordinate { lat, lng });
        }
        Ok(Coordinate { lat, lng })
    }

    /// Great-circle distance in meters.
    pub fn distance_to(&self, other: &Coordinate) -> f64 {
        let (lat1, lat2) = (self.lat.to_radians(), other.lat.to_radians());
        let d_lat = lat2 - lat1;
        let d_lng = (other.lng - self.lng).to_radians();
        let h = (d_lat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (d_lng / 2.0).sin().powi(2);
        2.0 * EARTH_RADIUS_METERS * h.sqrt().asin()
    }
}

/// A geocoded destination.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Place {
    pub coordinate: Coordinate,
    pub label: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RouteCandidate {
    points: Vec<Coordinate>,
    pub summary: Option<String>,
}

impl RouteCandidate {
    pub fn new(points: Vec<Coordinate>, summary: Option<String>) -> Option<Self> {
        if points.len() < 2 {
            return None;
        }
        Some(RouteCandidate { points, summary })
    }

    pub fn points(&self) -> &[Coordinate] {
        &self.points
    }
}

#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportMode {
    #[default]
    #[display(fmt = "any")]
    Any,
    #[display(fmt = "driving")]
    Driving,
    #[display(fmt = "walking")]
    Walking,
    #[display(fmt = "transit")]
    Transit,
}

impl FromStr for TransportMode {
    type Err = RouteError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "any" => Ok(TransportMode::Any),
            "driving" => Ok(TransportMode::Driving),
            "walking" => Ok(TransportMode::Walking),
            "transit" => Ok(TransportMode::Transit),
            other => Err(RouteError::Config(format!("unknown transport mode {other:?}"))),
        }
    }
}

/// Stroke used for the route overlay.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PolylineStyle {
    /// RGBA, e.g. `0x0000FFFF` for opaque blue.
    pub stroke_color: u32,
    pub stroke_width: u32,
}

impl Default for PolylineStyle {
    fn default() -> Self {
        PolylineStyle {
            stroke_color: 0x0000_FFFF,
            stroke_width: 5,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_out_of_range_coordinates() {
        assert!(Coordinate::new(91.0, 0.0).is_err());
        assert!(Coordinate::new(0.0, -180.5).is_err());
        assert!(Coordinate::new(f64::NAN, 0.0).is_err());
        assert!(Coordinate::new(-90.0, 180.0).is_ok());
    }

    #[test]
    fn route_candidate_needs_two_points() {
        let p = Coordinate::new(1.0, 1.0).unwrap();
        assert!(RouteCandidate::new(vec![p], None).is_none());
        assert!(RouteCandidate::new(vec![p, p], None).is_some());
    }

    #[test]
    fn distance_of_one_degree_latitude() {
        let a = Coordinate::new(0.0, 0.0).unwrap();
        let b = Coordinate::new(1.0, 0.0).unwrap();
        let d = a.distance_to(&b);
        assert!((d - 111_195.0).abs() < 100.0, "{d}");
    }

    #[test]
    fn parses_transport_modes() {
        assert_eq!("Driving".parse::<TransportMode>().unwrap(), TransportMode::Driving);
        assert_eq!(" transit ".parse::<TransportMode>().unwrap(), TransportMode::Transit);
        assert!("bicycle".parse::<TransportMode>().is_err());
        assert_eq!(TransportMode::Walking.to_string(), "walking");
    }
}
