use std::f64::consts::PI;
use std::fmt::Write as _;

use geo_types::Coord;
use log::*;
use serde::Serialize;
use serde_json::{json, Value};

use super::{render::RenderSurface, Coordinate, PolylineStyle};
use crate::viewport::{Span, Viewport};

const BASE_URL: &str = "https://maps.googleapis.com/maps/api/staticmap";
const TILE_SIZE: f64 = 256.0;
const MAX_ZOOM: f64 = 21.0;
const MERCATOR_MAX_LAT: f64 = 85.051_128_78;
const DEFAULT_MAX_PATH_POINTS: usize = 200;
const POLYLINE_PRECISION: u32 = 5;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Marker {
    pub coordinate: Coordinate,
    pub label: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Overlay {
    pub points: Vec<Coordinate>,
    pub style: PolylineStyle,
}

/// A render surface backed by the Google Static Maps API.
///
/// Nothing is drawn until [`StaticMap::url`] is requested; the surface only
/// keeps the scene.
#[derive(Debug, Clone)]
pub struct StaticMap {
    width: u32,
    height: u32,
    max_path_points: usize,
    api_key: Option<String>,
    markers: Vec<Marker>,
    overlays: Vec<Overlay>,
    viewport: Option<Viewport>,
}

impl StaticMap {
    pub fn new(width: u32, height: u32) -> Self {
        StaticMap {
            width: width.max(1),
            height: height.max(1),
            max_path_points: DEFAULT_MAX_PATH_POINTS,
            api_key: None,
            markers: Vec::new(),
            overlays: Vec::new(),
            viewport: None,
        }
    }

    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    pub fn with_max_path_points(mut self, max: usize) -> Self {
        self.max_path_points = max.max(2);
        self
    }

    pub fn max_path_points(&self) -> usize {
        self.max_path_points
    }

    pub fn markers(&self) -> &[Marker] {
        &self.markers
    }

    pub fn overlays(&self) -> &[Overlay] {
        &self.overlays
    }

    pub fn viewport(&self) -> Option<Viewport> {
        self.viewport
    }

    /// Web-Mercator zoom level that shows the current viewport.
    pub fn zoom(&self) -> Option<u8> {
        self.viewport
            .map(|viewport| zoom_for(viewport, self.width, self.height))
    }

    pub fn url(&self) -> String {
        self.url_with_max_path_points(self.max_path_points)
    }

    /// Like [`StaticMap::url`], with each path thinned to at most `max`
    /// points. A budget of zero leaves the paths out.
    pub fn url_with_max_path_points(&self, max: usize) -> String {
        let mut url = format!("{}?size={}x{}", BASE_URL, self.width, self.height);
        if let (Some(viewport), Some(zoom)) = (self.viewport, self.zoom()) {
            let _ = write!(url, "&center={}&zoom={}", point(&viewport.center), zoom);
        }
        for (i, marker) in self.markers.iter().enumerate() {
            let _ = write!(
                url,
                "&markers=label:{}%7C{}",
                marker_letter(i),
                point(&marker.coordinate)
            );
        }
        if max > 0 {
            for overlay in &self.overlays {
                let encoded = match encode_path(&thin(&overlay.points, max.max(2))) {
                    Ok(encoded) => encoded,
                    Err(e) => {
                        warn!("Leaving out path that failed to encode: {}", e);
                        continue;
                    }
                };
                let _ = write!(
                    url,
                    "&path=color:0x{:08x}%7Cweight:{}%7Cenc:{}",
                    overlay.style.stroke_color,
                    overlay.style.stroke_width,
                    percent_encode(&encoded)
                );
            }
        }
        if let Some(key) = &self.api_key {
            let _ = write!(url, "&key={}", key);
        }
        url
    }

    pub fn to_geojson(&self) -> Value {
        let mut features: Vec<Value> = self
            .markers
            .iter()
            .map(|marker| {
                json!({
                    "type": "Feature",
                    "geometry": {
                        "type": "Point",
                        "coordinates": [marker.coordinate.lng, marker.coordinate.lat],
                    },
                    "properties": { "title": marker.label },
                })
            })
            .collect();
        features.extend(self.overlays.iter().map(|overlay| {
            let coordinates: Vec<[f64; 2]> =
                overlay.points.iter().map(|p| [p.lng, p.lat]).collect();
            json!({
                "type": "Feature",
                "geometry": { "type": "LineString", "coordinates": coordinates },
                "properties": {
                    "stroke": format!("#{:06x}", overlay.style.stroke_color >> 8),
                    "stroke-opacity": f64::from(overlay.style.stroke_color & 0xff) / 255.0,
                    "stroke-width": overlay.style.stroke_width,
                },
            })
        }));

        let mut collection = json!({ "type": "FeatureCollection", "features": features });
        if let Some(viewport) = self.viewport {
            let half = viewport.span;
            collection["bbox"] = json!([
                viewport.center.lng - half.lon_delta / 2.0,
                viewport.center.lat - half.lat_delta / 2.0,
                viewport.center.lng + half.lon_delta / 2.0,
                viewport.center.lat + half.lat_delta / 2.0,
            ]);
        }
        collection
    }
}

impl RenderSurface for StaticMap {
    fn add_marker(&mut self, coordinate: Coordinate, label: &str) {
        self.markers.push(Marker {
            coordinate,
            label: label.to_string(),
        });
    }

    fn remove_all_markers(&mut self) {
        self.markers.clear();
    }

    fn draw_polyline(&mut self, points: &[Coordinate], style: PolylineStyle) {
        self.overlays.push(Overlay {
            points: points.to_vec(),
            style,
        });
    }

    fn remove_all_overlays(&mut self) {
        self.overlays.clear();
    }

    fn set_viewport(&mut self, viewport: Viewport, animated: bool) {
        trace!("Viewport set to {:?} (animated: {}).", viewport, animated);
        self.viewport = Some(viewport);
    }

    /// Widens one span so the region has the image's aspect ratio.
    fn region_that_fits(&self, viewport: Viewport) -> Viewport {
        let aspect = f64::from(self.width) / f64::from(self.height);
        // Longitude degrees shrink towards the poles.
        let cos_lat = viewport.center.lat.to_radians().cos().max(0.01);
        let Span {
            mut lat_delta,
            mut lon_delta,
        } = viewport.span;

        let ground_width = lon_delta * cos_lat;
        if ground_width / lat_delta < aspect {
            lon_delta = lat_delta * aspect / cos_lat;
        } else {
            lat_delta = ground_width / aspect;
        }

        Viewport {
            center: viewport.center,
            span: Span {
                lat_delta: lat_delta.min(180.0),
                lon_delta: lon_delta.min(360.0),
            },
        }
    }
}

fn point(c: &Coordinate) -> String {
    format!("{:.6},{:.6}", c.lat, c.lng)
}

fn marker_letter(index: usize) -> char {
    (b'A' + (index % 26) as u8) as char
}

fn mercator_y(lat: f64) -> f64 {
    let sin = lat
        .clamp(-MERCATOR_MAX_LAT, MERCATOR_MAX_LAT)
        .to_radians()
        .sin();
    ((1.0 + sin) / (1.0 - sin)).ln() / 2.0
}

fn zoom_for(viewport: Viewport, width: u32, height: u32) -> u8 {
    let lon_zoom = (f64::from(width) * 360.0 / (TILE_SIZE * viewport.span.lon_delta)).log2();

    let north = viewport.center.lat + viewport.span.lat_delta / 2.0;
    let south = viewport.center.lat - viewport.span.lat_delta / 2.0;
    let fraction = (mercator_y(north) - mercator_y(south)) / (2.0 * PI);
    let lat_zoom = (f64::from(height) / TILE_SIZE / fraction).log2();

    let zoom = lon_zoom.min(lat_zoom).floor();
    if zoom.is_nan() {
        return 0;
    }
    zoom.clamp(0.0, MAX_ZOOM) as u8
}

fn encode_path(points: &[Coordinate]) -> Result<String, String> {
    polyline::encode_coordinates(
        points.iter().map(|p| Coord { x: p.lng, y: p.lat }),
        POLYLINE_PRECISION,
    )
}

/// Escapes everything outside the unreserved URL characters.
fn percent_encode(s: &str) -> String {
    let mut out = String::with_capacity(s.len() * 2);
    for byte in s.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(byte as char);
            }
            _ => {
                let _ = write!(out, "%{byte:02X}");
            }
        }
    }
    out
}

/// Evenly samples at most `max` points, always keeping both ends.
fn thin(points: &[Coordinate], max: usize) -> Vec<Coordinate> {
    if points.len() <= max || max < 2 {
        return points.to_vec();
    }
    let step = (points.len() - 1) as f64 / (max - 1) as f64;
    (0..max)
        .map(|i| points[((i as f64 * step).round() as usize).min(points.len() - 1)])
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::viewport::fit;

    fn coord(lat: f64, lng: f64) -> Coordinate {
        Coordinate::new(lat, lng).unwrap()
    }

    fn viewport(lat: f64, lng: f64, lat_delta: f64, lon_delta: f64) -> Viewport {
        Viewport {
            center: coord(lat, lng),
            span: Span {
                lat_delta,
                lon_delta,
            },
        }
    }

    #[test]
    fn region_matches_square_aspect_at_equator() {
        let map = StaticMap::new(640, 640);
        let fitted = map.region_that_fits(viewport(0.0, 0.0, 0.01, 0.03));
        assert!((fitted.span.lat_delta - 0.03).abs() < 1e-12);
        assert!((fitted.span.lon_delta - 0.03).abs() < 1e-12);
    }

    #[test]
    fn region_widens_longitude_for_wide_images() {
        let map = StaticMap::new(800, 400);
        let fitted = map.region_that_fits(viewport(0.0, 0.0, 0.02, 0.01));
        assert!((fitted.span.lat_delta - 0.02).abs() < 1e-12);
        assert!((fitted.span.lon_delta - 0.04).abs() < 1e-12);
    }

    #[test]
    fn region_never_shrinks_a_span() {
        let map = StaticMap::new(640, 480);
        let original = viewport(60.0, 10.0, 0.3, 0.1);
        let fitted = map.region_that_fits(original);
        assert!(fitted.span.lat_delta >= original.span.lat_delta);
        assert!(fitted.span.lon_delta >= original.span.lon_delta);
        assert_eq!(fitted.center, original.center);
    }

    #[test]
    fn zoom_follows_span() {
        let mut world = StaticMap::new(256, 256);
        world.set_viewport(viewport(0.0, 0.0, 180.0, 360.0), false);
        assert_eq!(world.zoom(), Some(0));

        // A 0.005 degree region fits at street level.
        let mut map = StaticMap::new(640, 640);
        map.set_viewport(viewport(35.0, 139.0, 0.005, 0.005), false);
        let zoom = map.zoom().unwrap();
        assert!((16..=18).contains(&zoom), "{zoom}");
    }

    #[test]
    fn url_contains_scene() {
        let mut map = StaticMap::new(640, 640).with_api_key("secret");
        let a = coord(35.0, 139.0);
        let b = coord(35.01, 139.02);
        map.add_marker(a, "Current location");
        map.add_marker(b, "Tokyo");
        map.draw_polyline(&[a, b], PolylineStyle::default());
        map.set_viewport(fit(a, b, 1.5, 0.005), true);

        let url = map.url();
        assert!(url.starts_with("https://maps.googleapis.com/maps/api/staticmap?size=640x640"));
        assert!(url.contains("&center=35.005000,139.010000&zoom="));
        assert!(url.contains("&markers=label:A%7C35.000000,139.000000"));
        assert!(url.contains("&markers=label:B%7C35.010000,139.020000"));
        assert!(url.contains("&path=color:0x0000ffff%7Cweight:5%7Cenc:_%7DrtE_mkoYo%7D%40_%7CB"));
        assert!(url.ends_with("&key=secret"));
    }

    #[test]
    fn encoded_path_decodes_to_thinned_points() {
        let points: Vec<Coordinate> = (0..500)
            .map(|i| coord(35.0 + i as f64 * 0.001, 139.0 - i as f64 * 0.002))
            .collect();
        let encoded = encode_path(&thin(&points, 50)).unwrap();
        let decoded = crate::services::directions::decode_path(&encoded).unwrap();
        assert_eq!(decoded.len(), 50);
        assert!((decoded[49].lat - points[499].lat).abs() < 1e-5);
        assert!((decoded[49].lng - points[499].lng).abs() < 1e-5);
    }

    #[test]
    fn path_budget_bounds_url_length() {
        let points: Vec<Coordinate> = (0..1000)
            .map(|i| coord(35.0 + (i as f64 * 0.37).sin() * 0.2, 139.0 + i as f64 * 0.003))
            .collect();
        let mut map = StaticMap::new(640, 640).with_max_path_points(400);
        map.draw_polyline(&points, PolylineStyle::default());
        assert_eq!(map.max_path_points(), 400);

        let full = map.url();
        let short = map.url_with_max_path_points(20);
        let bare = map.url_with_max_path_points(0);
        assert!(short.len() < full.len());
        assert!(short.contains("enc:"));
        assert!(!bare.contains("&path="));
    }

    #[test]
    fn percent_encoding_keeps_unreserved_characters() {
        assert_eq!(percent_encode("az_~.-09"), "az_~.-09");
        assert_eq!(percent_encode("|}@`?"), "%7C%7D%40%60%3F");
    }

    #[test]
    fn clearing_removes_markers_and_paths() {
        let mut map = StaticMap::new(100, 100);
        map.add_marker(coord(1.0, 1.0), "x");
        map.draw_polyline(&[coord(1.0, 1.0), coord(2.0, 2.0)], PolylineStyle::default());
        map.remove_all_markers();
        map.remove_all_overlays();
        assert!(map.markers().is_empty());
        assert!(map.overlays().is_empty());
        assert!(!map.url().contains("markers="));
    }

    #[test]
    fn thinning_keeps_endpoints() {
        let points: Vec<Coordinate> = (0..1000).map(|i| coord(i as f64 * 0.01, 0.0)).collect();
        let thinned = thin(&points, 200);
        assert_eq!(thinned.len(), 200);
        assert_eq!(thinned[0], points[0]);
        assert_eq!(thinned[199], points[999]);
        assert_eq!(thin(&points[..10], 200).len(), 10);
    }

    #[test]
    fn geojson_uses_lng_lat_order() {
        let mut map = StaticMap::new(100, 100);
        map.add_marker(coord(10.0, 20.0), "dest");
        map.draw_polyline(&[coord(10.0, 20.0), coord(11.0, 21.0)], PolylineStyle::default());
        map.set_viewport(viewport(10.5, 20.5, 1.0, 2.0), false);

        let geojson = map.to_geojson();
        assert_eq!(geojson["type"], "FeatureCollection");
        assert_eq!(geojson["features"][0]["geometry"]["coordinates"], json!([20.0, 10.0]));
        assert_eq!(geojson["features"][0]["properties"]["title"], "dest");
        assert_eq!(geojson["features"][1]["properties"]["stroke"], "#0000ff");
        assert_eq!(geojson["features"][1]["properties"]["stroke-width"], 5);
        assert_eq!(geojson["bbox"], json!([19.5, 10.0, 21.5, 11.0]));
    }
}
