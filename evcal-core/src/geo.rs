//! Venue proximity search.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::constants::{EARTH_RADIUS_KM, EARTH_RADIUS_MILES, MAX_RADIUS, MIN_RADIUS};
use crate::error::{CalendarError, CalendarResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum DistanceUnit {
    #[default]
    #[serde(rename = "mi", alias = "miles")]
    Miles,
    #[serde(rename = "km", alias = "kilometers")]
    Kilometers,
}

impl DistanceUnit {
    pub fn earth_radius(self) -> f64 {
        match self {
            DistanceUnit::Miles => EARTH_RADIUS_MILES,
            DistanceUnit::Kilometers => EARTH_RADIUS_KM,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            DistanceUnit::Miles => "mi",
            DistanceUnit::Kilometers => "km",
        }
    }

    /// Convert a distance expressed in `self` into `target`.
    pub fn convert(self, value: f64, target: DistanceUnit) -> f64 {
        value / self.earth_radius() * target.earth_radius()
    }
}

impl FromStr for DistanceUnit {
    type Err = CalendarError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "mi" | "mile" | "miles" => Ok(DistanceUnit::Miles),
            "km" | "kilometer" | "kilometers" | "kilometre" | "kilometres" => {
                Ok(DistanceUnit::Kilometers)
            }
            other => Err(CalendarError::Config(format!("Unknown distance unit '{}'", other))),
        }
    }
}

impl fmt::Display for DistanceUnit {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// One entry of the venue coordinate index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VenueLocation {
    pub venue_id: String,
    pub latitude: f64,
    pub longitude: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VenueDistance {
    pub venue_id: String,
    pub distance: f64,
}

/// Great-circle distance between two points, in `unit`.
pub fn haversine_distance(lat1: f64, lng1: f64, lat2: f64, lng2: f64, unit: DistanceUnit) -> f64 {
    let phi1 = lat1.to_radians();
    let phi2 = lat2.to_radians();
    let d_phi = (lat2 - lat1).to_radians();
    let d_lambda = (lng2 - lng1).to_radians();

    let a = (d_phi / 2.0).sin().powi(2) + phi1.cos() * phi2.cos() * (d_lambda / 2.0).sin().powi(2);
    // Rounding can push `a` a hair past 1 for antipodal points
    let c = 2.0 * a.sqrt().min(1.0).asin();

    unit.earth_radius() * c
}

/// Haversine search over the venue coordinate index.
#[derive(Debug, Clone, Copy)]
pub struct GeoQuery {
    max_radius: f64,
}

impl Default for GeoQuery {
    fn default() -> Self {
        GeoQuery::new(MAX_RADIUS)
    }
}

impl GeoQuery {
    pub fn new(max_radius: f64) -> Self {
        GeoQuery {
            max_radius: max_radius.max(MIN_RADIUS),
        }
    }

    /// Reject out-of-range coordinates. Never clamps them.
    pub fn validate_point(lat: f64, lng: f64) -> CalendarResult<()> {
        if !lat.is_finite() || !(-90.0..=90.0).contains(&lat) {
            return Err(CalendarError::InvalidLatitude(lat));
        }
        if !lng.is_finite() || !(-180.0..=180.0).contains(&lng) {
            return Err(CalendarError::InvalidLongitude(lng));
        }
        Ok(())
    }

    /// Clamp a radius into [1, max_radius]. Non-finite radii are rejected.
    pub fn clamp_radius(&self, radius: f64) -> CalendarResult<f64> {
        if !radius.is_finite() {
            return Err(CalendarError::InvalidRadius(radius.to_string()));
        }
        Ok(radius.clamp(MIN_RADIUS, self.max_radius))
    }

    /// Venues within `radius` of (lat, lng), nearest first.
    pub fn find_within_radius(
        &self,
        index: &[VenueLocation],
        lat: f64,
        lng: f64,
        radius: f64,
        unit: DistanceUnit,
    ) -> CalendarResult<Vec<VenueDistance>> {
        Self::validate_point(lat, lng)?;
        let radius = self.clamp_radius(radius)?;

        let mut matches: Vec<VenueDistance> = index
            .iter()
            .filter(|loc| Self::validate_point(loc.latitude, loc.longitude).is_ok())
            .map(|loc| VenueDistance {
                venue_id: loc.venue_id.clone(),
                distance: haversine_distance(lat, lng, loc.latitude, loc.longitude, unit),
            })
            .filter(|m| m.distance <= radius)
            .collect();

        matches.sort_by(|a, b| {
            a.distance
                .total_cmp(&b.distance)
                .then_with(|| a.venue_id.cmp(&b.venue_id))
        });

        Ok(matches)
    }
}

/// venue id -> distance, for display.
pub fn distance_map(matches: &[VenueDistance]) -> BTreeMap<String, f64> {
    matches
        .iter()
        .map(|m| (m.venue_id.clone(), m.distance))
        .collect()
}
