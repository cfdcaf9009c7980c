//! Shared domain enumerations aligned with the backend's stored values.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::error::DomainError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TripType {
    Road,
    Flight,
    Cruise,
}

impl TripType {
    pub fn as_str(self) -> &'static str {
        match self {
            TripType::Road => "road",
            TripType::Flight => "flight",
            TripType::Cruise => "cruise",
        }
    }
}

impl fmt::Display for TripType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TripType {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "road" => Ok(TripType::Road),
            "flight" => Ok(TripType::Flight),
            "cruise" => Ok(TripType::Cruise),
            other => Err(DomainError::validation(format!("unknown trip type `{other}`"))),
        }
    }
}

/// Routing profile used for road trips.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TravelMode {
    Driving,
    Cycling,
    Walking,
}

impl TravelMode {
    pub const ALL: [TravelMode; 3] = [TravelMode::Driving, TravelMode::Cycling, TravelMode::Walking];

    pub fn as_str(self) -> &'static str {
        match self {
            TravelMode::Driving => "driving",
            TravelMode::Cycling => "cycling",
            TravelMode::Walking => "walking",
        }
    }
}

impl fmt::Display for TravelMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TravelMode {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "driving" => Ok(TravelMode::Driving),
            "cycling" => Ok(TravelMode::Cycling),
            "walking" => Ok(TravelMode::Walking),
            other => Err(DomainError::validation(format!(
                "unknown travel mode `{other}`"
            ))),
        }
    }
}
