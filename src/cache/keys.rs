//! Cache key conventions.
//!
//! Other parts of the application read the same cache instances, so these
//! formats are part of the contract and must not drift.

use crate::domain::types::{TravelMode, TripType};

/// Prefix shared by every blog listing page.
pub const BLOG_LIST_PREFIX: &str = "blogs-";

pub fn admin_users() -> String {
    "admin-users".to_string()
}

/// `blogs-{lang}-{page}-{limit}`
pub fn blog_list(lang: &str, page: u32, limit: u32) -> String {
    format!("{BLOG_LIST_PREFIX}{lang}-{page}-{limit}")
}

/// `blog-{slug}`
pub fn blog_post(slug: &str) -> String {
    format!("blog-{slug}")
}

/// `blog-stats-{lang}`
pub fn blog_stats(lang: &str) -> String {
    format!("blog-stats-{lang}")
}

/// `map-data-{userId}`
pub fn map_data(user_id: &str) -> String {
    format!("map-data-{user_id}")
}

/// `{tripType}-checkpoints-{tripId}`, with `-{mode}` appended for road trips
/// that carry a travel mode. Other trip types ignore the mode.
pub fn checkpoints(trip_type: TripType, trip_id: &str, travel_mode: Option<TravelMode>) -> String {
    match (trip_type, travel_mode) {
        (TripType::Road, Some(mode)) => format!("{trip_type}-checkpoints-{trip_id}-{mode}"),
        _ => format!("{trip_type}-checkpoints-{trip_id}"),
    }
}
