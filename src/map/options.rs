use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::domain::coordinates::LngLat;
use crate::domain::error::DomainError;

pub const ZOOM_TOLERANCE: f64 = 0.1;
/// Degrees, applied to both axes.
pub const CENTER_TOLERANCE: f64 = 1e-4;
/// Degrees, applied to pitch and bearing.
pub const ANGLE_TOLERANCE: f64 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceClass {
    Desktop,
    Tablet,
    Mobile,
}

impl DeviceClass {
    pub fn as_str(self) -> &'static str {
        match self {
            DeviceClass::Desktop => "desktop",
            DeviceClass::Tablet => "tablet",
            DeviceClass::Mobile => "mobile",
        }
    }
}

impl fmt::Display for DeviceClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DeviceClass {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "desktop" => Ok(DeviceClass::Desktop),
            "tablet" => Ok(DeviceClass::Tablet),
            "mobile" => Ok(DeviceClass::Mobile),
            other => Err(DomainError::validation(format!(
                "unknown device class `{other}`"
            ))),
        }
    }
}

/// Identifies the element a map is mounted in.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContainerId(pub String);

impl ContainerId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl fmt::Display for ContainerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Camera parameters. Applied to a reused instance instead of recreating it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MapView {
    pub center: LngLat,
    pub zoom: f64,
    pub pitch: f64,
    pub bearing: f64,
}

impl MapView {
    pub fn new(center: LngLat, zoom: f64) -> Self {
        Self {
            center,
            zoom,
            pitch: 0.0,
            bearing: 0.0,
        }
    }

    /// Whether moving from `self` to `other` is worth a camera update.
    pub fn differs_from(&self, other: &MapView) -> bool {
        (self.zoom - other.zoom).abs() > ZOOM_TOLERANCE
            || (self.center.lng - other.center.lng).abs() > CENTER_TOLERANCE
            || (self.center.lat - other.center.lat).abs() > CENTER_TOLERANCE
            || angle_delta(self.pitch, other.pitch) > ANGLE_TOLERANCE
            || angle_delta(self.bearing, other.bearing) > ANGLE_TOLERANCE
    }
}

// Bearings wrap at 360, so 359.9 and 0.1 are close.
fn angle_delta(a: f64, b: f64) -> f64 {
    let delta = (a - b).rem_euclid(360.0);
    delta.min(360.0 - delta)
}

/// Which cached instance a set of options maps to. View parameters are not
/// part of it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MapConfigKey {
    pub style: String,
    pub terrain: bool,
    pub device: DeviceClass,
}

impl fmt::Display for MapConfigKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}|{}|{}",
            self.style,
            if self.terrain { "terrain" } else { "flat" },
            self.device
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MapOptions {
    pub container: ContainerId,
    pub style: String,
    pub view: MapView,
    pub terrain: bool,
    pub device: DeviceClass,
}

impl MapOptions {
    pub fn key(&self) -> MapConfigKey {
        MapConfigKey {
            style: self.style.clone(),
            terrain: self.terrain,
            device: self.device,
        }
    }
}
