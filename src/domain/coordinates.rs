//! Coordinate normalisation.
//!
//! Rows have stored positions as `[lng, lat]` arrays, as JSON strings holding
//! such an array, and as `"lat, lng"` text. Everything normalises to
//! [`LngLat`]; anything else becomes `None`.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A validated position, serialised as `[lng, lat]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(into = "[f64; 2]", try_from = "[f64; 2]")]
pub struct LngLat {
    pub lng: f64,
    pub lat: f64,
}

impl LngLat {
    /// Returns `None` for non-finite or out-of-range values.
    pub fn new(lng: f64, lat: f64) -> Option<Self> {
        let valid = lng.is_finite()
            && lat.is_finite()
            && (-180.0..=180.0).contains(&lng)
            && (-90.0..=90.0).contains(&lat);
        valid.then_some(Self { lng, lat })
    }

    pub fn to_array(self) -> [f64; 2] {
        [self.lng, self.lat]
    }
}

impl From<LngLat> for [f64; 2] {
    fn from(value: LngLat) -> Self {
        value.to_array()
    }
}

impl TryFrom<[f64; 2]> for LngLat {
    type Error = String;

    fn try_from([lng, lat]: [f64; 2]) -> Result<Self, Self::Error> {
        LngLat::new(lng, lat).ok_or_else(|| format!("coordinates out of range: [{lng}, {lat}]"))
    }
}

/// The shapes a stored coordinate field arrives in.
#[derive(Debug, Clone, PartialEq)]
pub enum RawCoordinates {
    /// `[lng, lat]`, numbers or numeric strings.
    Pair(Vec<Value>),
    /// A JSON-encoded pair or `"lat, lng"` text.
    Text(String),
    Unsupported,
}

impl From<&Value> for RawCoordinates {
    fn from(value: &Value) -> Self {
        match value {
            Value::Array(items) => RawCoordinates::Pair(items.clone()),
            Value::String(text) => RawCoordinates::Text(text.clone()),
            _ => RawCoordinates::Unsupported,
        }
    }
}

impl RawCoordinates {
    /// Total conversion: never panics, never returns a partial pair.
    pub fn normalize(&self) -> Option<LngLat> {
        match self {
            RawCoordinates::Pair(items) => from_pair(items),
            RawCoordinates::Text(text) => from_json_text(text).or_else(|| from_lat_lng_text(text)),
            RawCoordinates::Unsupported => None,
        }
    }
}

/// Parse any stored coordinate representation into `[lng, lat]`.
///
/// Pairs that are not finite or fall outside the longitude/latitude ranges
/// yield `None`, the same as unparseable input.
pub fn parse_coordinates(value: &Value) -> Option<LngLat> {
    RawCoordinates::from(value).normalize()
}

/// Parse an optional field, treating `null` and absence alike.
pub fn parse_optional_coordinates(value: Option<&Value>) -> Option<LngLat> {
    value.and_then(parse_coordinates)
}

fn from_pair(items: &[Value]) -> Option<LngLat> {
    let [lng, lat] = items else {
        return None;
    };
    LngLat::new(number(lng)?, number(lat)?)
}

fn from_json_text(text: &str) -> Option<LngLat> {
    let items: Vec<Value> = serde_json::from_str(text.trim()).ok()?;
    from_pair(&items)
}

fn from_lat_lng_text(text: &str) -> Option<LngLat> {
    let mut parts = text.split(',');
    let lat = parts.next()?.trim().parse::<f64>().ok()?;
    let lng = parts.next()?.trim().parse::<f64>().ok()?;
    if parts.next().is_some() {
        return None;
    }
    LngLat::new(lng, lat)
}

fn number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(number) => number.as_f64(),
        Value::String(text) => text.trim().parse().ok(),
        _ => None,
    }
}
