//! Deterministic mine identity
//!
//! A mine is identified by its coordinates rounded to three decimal places
//! (roughly 111 m). The rounded pair is hashed with MD5 and rendered in the
//! 8-4-4-4-12 form, so the same site always maps to the same [`MineId`]
//! regardless of which source file it came from.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Column names recognised as latitude, compared case-insensitively
pub const LATITUDE_ALIASES: &[&str] = &["latitude", "lat"];

/// Column names recognised as longitude, compared case-insensitively
pub const LONGITUDE_ALIASES: &[&str] = &["longitude", "longtitude", "lng", "lon"];

/// Opaque identity derived from quantized coordinates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MineId(Uuid);

impl MineId {
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl fmt::Display for MineId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.hyphenated())
    }
}

impl From<MineId> for Uuid {
    fn from(id: MineId) -> Self {
        id.0
    }
}

/// Resolve an identity from a coordinate pair
///
/// Returns `None` when either coordinate is missing or not finite. Range is
/// not checked here; out-of-range values still hash deterministically.
pub fn resolve(latitude: Option<f64>, longitude: Option<f64>) -> Option<MineId> {
    let (lat, lng) = (latitude?, longitude?);
    if !lat.is_finite() || !lng.is_finite() {
        return None;
    }

    let key = quantize(lat, lng);
    let digest = md5::compute(key.as_bytes());
    Some(MineId(Uuid::from_bytes(digest.0)))
}

/// Canonical `"lat,lng"` string the identity is hashed from
pub fn quantize(latitude: f64, longitude: f64) -> String {
    format!("{:.3},{:.3}", latitude, longitude)
}

/// Parse a raw coordinate value; blank, unparsable and non-finite values are absent
pub fn parse_coordinate(raw: Option<&str>) -> Option<f64> {
    let value: f64 = raw?.trim().parse().ok()?;
    value.is_finite().then_some(value)
}

/// Find the latitude/longitude pair in a raw row by column alias
///
/// When several columns match the same alias set the last one wins.
pub fn locate_coordinates(row: &[(String, Option<String>)]) -> (Option<f64>, Option<f64>) {
    let mut latitude = None;
    let mut longitude = None;

    for (column, value) in row {
        let column = column.to_lowercase();
        if LATITUDE_ALIASES.contains(&column.as_str()) {
            latitude = value.as_deref();
        } else if LONGITUDE_ALIASES.contains(&column.as_str()) {
            longitude = value.as_deref();
        }
    }

    (parse_coordinate(latitude), parse_coordinate(longitude))
}
