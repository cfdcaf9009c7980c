//! Normalised records produced by the fetchers.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use super::coordinates::LngLat;
use super::merge::Identified;
use super::types::{TravelMode, TripType};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MapTripData {
    pub id: String,
    pub title: String,
    pub trip_type: TripType,
    pub destination: Option<String>,
    /// `None` when the stored position could not be parsed.
    pub coordinates: Option<LngLat>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub updated_at: Option<OffsetDateTime>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FavoritePlace {
    pub id: String,
    pub name: String,
    pub category: Option<String>,
    pub coordinates: Option<LngLat>,
}

/// Everything the map view shows for one user.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MapData {
    pub trips: Vec<MapTripData>,
    pub favorites: Vec<FavoritePlace>,
}

impl MapData {
    /// Trips and favourites that can actually be placed on the map.
    pub fn positioned_count(&self) -> usize {
        self.trips.iter().filter(|t| t.coordinates.is_some()).count()
            + self
                .favorites
                .iter()
                .filter(|f| f.coordinates.is_some())
                .count()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckpointData {
    pub id: String,
    pub trip_id: String,
    pub name: String,
    /// Order of the stop within the trip.
    pub position: u32,
    pub coordinates: Option<LngLat>,
    pub arrival_date: Option<String>,
    pub notes: Option<String>,
}

/// Route between consecutive checkpoints as reported by the directions provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteSummary {
    pub distance_meters: f64,
    pub duration_seconds: f64,
    pub geometry: Vec<LngLat>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckpointSet {
    pub trip_id: String,
    pub trip_type: TripType,
    pub travel_mode: Option<TravelMode>,
    /// Sorted by `position`.
    pub checkpoints: Vec<CheckpointData>,
    pub route: Option<RouteSummary>,
}

impl CheckpointSet {
    /// Positions of the checkpoints that have one, in trip order.
    pub fn waypoints(&self) -> Vec<LngLat> {
        self.checkpoints
            .iter()
            .filter_map(|checkpoint| checkpoint.coordinates)
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlogPostSummary {
    pub id: String,
    pub slug: String,
    pub title: String,
    pub excerpt: Option<String>,
    pub cover_image: Option<String>,
    pub language: String,
    pub published_at: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlogPost {
    pub id: String,
    pub slug: String,
    pub title: String,
    pub content: String,
    pub language: String,
    pub author: Option<String>,
    pub published_at: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlogPage {
    pub language: String,
    pub page: u32,
    pub limit: u32,
    pub total: u64,
    pub posts: Vec<BlogPostSummary>,
}

impl BlogPage {
    pub fn has_next(&self) -> bool {
        u64::from(self.page) * u64::from(self.limit) < self.total
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BlogStats {
    pub language: String,
    pub total_posts: u64,
    pub total_views: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdminUser {
    pub id: String,
    pub email: String,
    pub display_name: Option<String>,
    pub role: String,
}

impl Identified for MapTripData {
    fn id(&self) -> &str {
        &self.id
    }
}

impl Identified for FavoritePlace {
    fn id(&self) -> &str {
        &self.id
    }
}

impl Identified for CheckpointData {
    fn id(&self) -> &str {
        &self.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn checkpoint(id: &str, position: u32, coordinates: Option<LngLat>) -> CheckpointData {
        CheckpointData {
            id: id.to_string(),
            trip_id: "trip".to_string(),
            name: id.to_string(),
            position,
            coordinates,
            arrival_date: None,
            notes: None,
        }
    }

    #[test]
    fn waypoints_skip_unpositioned_checkpoints() {
        let set = CheckpointSet {
            trip_id: "trip".to_string(),
            trip_type: TripType::Road,
            travel_mode: Some(TravelMode::Driving),
            checkpoints: vec![
                checkpoint("a", 0, LngLat::new(2.35, 48.85)),
                checkpoint("b", 1, None),
                checkpoint("c", 2, LngLat::new(4.83, 45.76)),
            ],
            route: None,
        };
        assert_eq!(set.waypoints().len(), 2);
    }

    #[test]
    fn blog_page_reports_next_page() {
        let page = BlogPage {
            language: "en".to_string(),
            page: 1,
            limit: 10,
            total: 11,
            posts: Vec::new(),
        };
        assert!(page.has_next());
        assert!(!BlogPage { page: 2, ..page }.has_next());
    }
}
