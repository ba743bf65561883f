use serde::Serialize;

use crate::services::Coordinate;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Span {
    pub lat_delta: f64,
    pub lon_delta: f64,
}

/// A map display region.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Viewport {
    pub center: Coordinate,
    pub span: Span,
}

impl Viewport {
    /// True when `point` lies within `center ± span / 2` in both dimensions.
    pub fn contains(&self, point: &Coordinate) -> bool {
        let half_lat = self.span.lat_delta / 2.0;
        let half_lon = self.span.lon_delta / 2.0;
        (point.lat - self.center.lat).abs() <= half_lat
            && (point.lng - self.center.lng).abs() <= half_lon
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FitOptions {
    /// Multiplier applied to the tight bounding box, so endpoints get padding.
    pub margin: f64,
    /// Smallest allowed span in degrees.
    pub min_span: f64,
}

impl Default for FitOptions {
    fn default() -> Self {
        FitOptions {
            margin: 1.5,
            min_span: 0.005,
        }
    }
}

impl FitOptions {
    pub fn fit(&self, a: Coordinate, b: Coordinate) -> Viewport {
        fit(a, b, self.margin, self.min_span)
    }
}

/// Computes the region that shows both `a` and `b`.
///
/// The center is the midpoint of the bounding box. Each span is the box side
/// scaled by `margin`, floored at `min_span` so coincident points still give
/// a usable region.
pub fn fit(a: Coordinate, b: Coordinate, margin: f64, min_span: f64) -> Viewport {
    let max_lat = a.lat.max(b.lat);
    let min_lat = a.lat.min(b.lat);
    let max_lon = a.lng.max(b.lng);
    let min_lon = a.lng.min(b.lng);

    let lat_delta = min_span.max((max_lat - min_lat).abs() * margin);
    let lon_delta = min_span.max((max_lon - min_lon).abs() * margin);

    Viewport {
        center: Coordinate {
            lat: (max_lat + min_lat) / 2.0,
            lng: (max_lon + min_lon) / 2.0,
        },
        span: Span {
            lat_delta,
            lon_delta,
        },
    }
}
