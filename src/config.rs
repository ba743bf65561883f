use std::{str::FromStr, time::Duration};

use crate::{
    services::{
        location::{Accuracy, LocationRequest},
        PolylineStyle, TransportMode,
    },
    viewport::FitOptions,
    RouteError,
};

#[derive(Debug, Clone)]
pub struct Config {
    pub discord_token: Option<String>,
    pub google_maps_token: Option<String>,
    /// Key appended to posted map URLs. Kept apart from the API token since
    /// the URLs are public.
    pub static_maps_key: Option<String>,
    pub prefix: String,
    pub fit: FitOptions,
    pub location: LocationRequest,
    pub location_fix_timeout: Duration,
    pub transport_mode: TransportMode,
    pub route_style: PolylineStyle,
    pub map_width: u32,
    pub map_height: u32,
    /// Most route points written into a posted map URL.
    pub map_path_points: usize,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            discord_token: None,
            google_maps_token: None,
            static_maps_key: None,
            prefix: "!route".to_string(),
            fit: FitOptions::default(),
            location: LocationRequest {
                accuracy: Accuracy::Best,
                min_distance_meters: 300.0,
            },
            location_fix_timeout: Duration::from_secs(60),
            transport_mode: TransportMode::Any,
            route_style: PolylineStyle::default(),
            map_width: 640,
            map_height: 640,
            map_path_points: 200,
        }
    }
}

impl Config {
    /// Reads the environment (and `.env`), falling back to defaults for
    /// anything not set.
    pub fn from_env() -> Result<Self, RouteError> {
        Self::from_lookup(|key| dotenv::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, RouteError> {
        let defaults = Config::default();
        let margin = parse_or(&lookup, "VIEWPORT_MARGIN", defaults.fit.margin)?;
        let min_span = parse_or(&lookup, "VIEWPORT_MIN_SPAN", defaults.fit.min_span)?;
        if !(margin.is_finite() && margin >= 1.0) {
            return Err(RouteError::Config(format!("VIEWPORT_MARGIN must be >= 1, got {margin}")));
        }
        if !(min_span.is_finite() && min_span > 0.0) {
            return Err(RouteError::Config(format!("VIEWPORT_MIN_SPAN must be > 0, got {min_span}")));
        }

        let min_distance = parse_or(
            &lookup,
            "LOCATION_MIN_DISTANCE_METERS",
            defaults.location.min_distance_meters,
        )?;
        if !(min_distance.is_finite() && min_distance >= 0.0) {
            return Err(RouteError::Config(format!(
                "LOCATION_MIN_DISTANCE_METERS must be >= 0, got {min_distance}"
            )));
        }
        let timeout_secs = parse_or(&lookup, "LOCATION_FIX_TIMEOUT_SECS", 60u64)?;
        if timeout_secs == 0 {
            return Err(RouteError::Config("LOCATION_FIX_TIMEOUT_SECS must be > 0".to_string()));
        }

        let map_width = parse_or(&lookup, "MAP_WIDTH", defaults.map_width)?;
        let map_height = parse_or(&lookup, "MAP_HEIGHT", defaults.map_height)?;
        if map_width == 0 || map_height == 0 {
            return Err(RouteError::Config(format!(
                "map size must be > 0, got {map_width}x{map_height}"
            )));
        }
        let map_path_points = parse_or(&lookup, "MAP_PATH_POINTS", defaults.map_path_points)?;
        if map_path_points < 2 {
            return Err(RouteError::Config(format!(
                "MAP_PATH_POINTS must be >= 2, got {map_path_points}"
            )));
        }

        Ok(Config {
            discord_token: lookup("DISCORD_TOKEN"),
            google_maps_token: lookup("GOOGLE_MAPS_TOKEN"),
            static_maps_key: lookup("STATIC_MAPS_KEY"),
            prefix: lookup("ROUTE_PREFIX").unwrap_or(defaults.prefix),
            fit: FitOptions { margin, min_span },
            location: LocationRequest {
                accuracy: parse_or(&lookup, "LOCATION_ACCURACY", defaults.location.accuracy)?,
                min_distance_meters: min_distance,
            },
            location_fix_timeout: Duration::from_secs(timeout_secs),
            transport_mode: parse_or(&lookup, "TRANSPORT_MODE", defaults.transport_mode)?,
            route_style: defaults.route_style,
            map_width,
            map_height,
            map_path_points,
        })
    }
}

fn parse_or<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> Result<T, RouteError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e| RouteError::Config(format!("{key}={raw:?}: {e}"))),
    }
}
