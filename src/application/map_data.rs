//! Map overview data: the user's trips and favourite places.

use std::sync::Arc;

use async_trait::async_trait;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use tracing::{debug, warn};

use crate::cache::{CacheContext, CacheEvent, CacheOptions, EventKind, keys};
use crate::domain::coordinates::parse_optional_coordinates;
use crate::domain::entities::{FavoritePlace, MapData, MapTripData};
use crate::domain::merge::merge_by_id;
use crate::domain::types::TripType;

use super::error::FetchError;
use super::repos::{FavoriteRow, TripRow, TripsRepo};
use super::watcher::{Refresh, RefreshMode};

#[derive(Clone)]
pub struct MapDataService {
    context: CacheContext,
    repo: Arc<dyn TripsRepo>,
}

impl MapDataService {
    pub fn new(context: CacheContext, repo: Arc<dyn TripsRepo>) -> Self {
        Self { context, repo }
    }

    /// Trips and favourites for `user_id`, cached under `map-data-{userId}`.
    pub async fn fetch(&self, user_id: &str, force: bool) -> Result<Arc<MapData>, FetchError> {
        require_user(user_id)?;
        let key = keys::map_data(user_id);
        let mut options = CacheOptions::ttl(self.context.config.map_data_ttl());
        if force {
            options = options.forced();
        }

        let repo = Arc::clone(&self.repo);
        let user_id = user_id.to_string();
        self.context
            .map_data
            .get_or_set(
                &key,
                || async move {
                    load_map_data(repo.as_ref(), &user_id, None)
                        .await
                        .map(Arc::new)
                },
                options,
            )
            .await
    }

    /// Re-query and merge into the cached value.
    ///
    /// Trips are requested from the newest `updated_at` already cached; new
    /// records are prepended and changed ones replaced in place. Falls back to
    /// a forced full fetch when nothing is cached.
    pub async fn fetch_incremental(&self, user_id: &str) -> Result<Arc<MapData>, FetchError> {
        require_user(user_id)?;
        let key = keys::map_data(user_id);
        let Some(previous) = self.context.map_data.get(&key) else {
            debug!(cache_key = %key, "Nothing cached; incremental fetch runs in full");
            return self.fetch(user_id, true).await;
        };

        let since = previous.trips.iter().filter_map(|trip| trip.updated_at).max();
        let fresh = load_map_data(self.repo.as_ref(), user_id, since).await?;

        let merged = Arc::new(MapData {
            trips: merge_by_id(&previous.trips, fresh.trips),
            favorites: merge_by_id(&previous.favorites, fresh.favorites),
        });
        self.context.map_data.set(
            key,
            Arc::clone(&merged),
            self.context.config.map_data_ttl(),
        );
        Ok(merged)
    }

    /// Drop the cached entry and tell subscribers.
    pub fn invalidate(&self, user_id: &str) {
        self.context.map_data.delete(&keys::map_data(user_id));
        self.context.events.publish_with(
            EventKind::MapDataInvalidated,
            Some(serde_json::json!({ "userId": user_id })),
        );
    }

    pub fn context(&self) -> &CacheContext {
        &self.context
    }
}

fn require_user(user_id: &str) -> Result<(), FetchError> {
    if user_id.trim().is_empty() {
        return Err(FetchError::invalid_request("user id must not be empty"));
    }
    Ok(())
}

async fn load_map_data(
    repo: &dyn TripsRepo,
    user_id: &str,
    updated_since: Option<OffsetDateTime>,
) -> Result<MapData, FetchError> {
    let (trips, favorites) = tokio::try_join!(
        repo.list_trips(user_id, updated_since),
        repo.list_favorites(user_id)
    )?;

    Ok(MapData {
        trips: trips.into_iter().filter_map(map_trip).collect(),
        favorites: favorites.into_iter().map(map_favorite).collect(),
    })
}

fn map_trip(row: TripRow) -> Option<MapTripData> {
    let trip_type = match row.trip_type.parse::<TripType>() {
        Ok(trip_type) => trip_type,
        Err(err) => {
            warn!(trip_id = %row.id, error = %err, "Skipping trip with unknown type");
            return None;
        }
    };
    let coordinates = parse_optional_coordinates(row.coordinates.as_ref());
    if coordinates.is_none() && row.coordinates.is_some() {
        debug!(trip_id = %row.id, "Trip coordinates could not be parsed");
    }
    let updated_at = row
        .updated_at
        .as_deref()
        .and_then(|raw| OffsetDateTime::parse(raw, &Rfc3339).ok());

    Some(MapTripData {
        id: row.id,
        title: row.title,
        trip_type,
        destination: row.destination,
        coordinates,
        start_date: row.start_date,
        end_date: row.end_date,
        updated_at,
    })
}

fn map_favorite(row: FavoriteRow) -> FavoritePlace {
    FavoritePlace {
        coordinates: parse_optional_coordinates(row.coordinates.as_ref()),
        id: row.id,
        name: row.name,
        category: row.category,
    }
}

/// Reacts to trip and favourite events for one user.
///
/// New trips and favourites merge incrementally; removals and explicit
/// invalidations reload in full. Events carrying a different `userId` in
/// their payload are ignored.
pub struct MapDataRefresher {
    service: MapDataService,
    user_id: String,
}

impl MapDataRefresher {
    pub fn new(service: MapDataService, user_id: impl Into<String>) -> Self {
        Self {
            service,
            user_id: user_id.into(),
        }
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }
}

const MAP_DATA_EVENTS: &[EventKind] = &[
    EventKind::TripCreated,
    EventKind::FavoriteAdded,
    EventKind::FavoriteRemoved,
    EventKind::FavoritesInvalidated,
    EventKind::MapDataInvalidated,
];

#[async_trait]
impl Refresh for MapDataRefresher {
    type Output = MapData;

    fn name(&self) -> &'static str {
        "map_data"
    }

    fn kinds(&self) -> &'static [EventKind] {
        MAP_DATA_EVENTS
    }

    fn mode_for(&self, event: &CacheEvent) -> Option<RefreshMode> {
        if !payload_matches(event, "userId", &self.user_id) {
            return None;
        }
        match event.kind {
            EventKind::TripCreated | EventKind::FavoriteAdded => Some(RefreshMode::Incremental),
            EventKind::FavoriteRemoved
            | EventKind::FavoritesInvalidated
            | EventKind::MapDataInvalidated => Some(RefreshMode::Full),
            EventKind::CheckpointsInvalidated => None,
        }
    }

    async fn load(&self) -> Result<Arc<MapData>, FetchError> {
        self.service.fetch(&self.user_id, false).await
    }

    async fn refresh(&self, mode: RefreshMode) -> Result<Arc<MapData>, FetchError> {
        match mode {
            RefreshMode::Incremental => self.service.fetch_incremental(&self.user_id).await,
            RefreshMode::Full => self.service.fetch(&self.user_id, true).await,
        }
    }
}

/// True when the payload has no `field` or its string value equals `expected`.
pub(crate) fn payload_matches(event: &CacheEvent, field: &str, expected: &str) -> bool {
    match event
        .payload
        .as_ref()
        .and_then(|payload| payload.get(field))
    {
        Some(value) => value.as_str() == Some(expected),
        None => true,
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::cache::Epoch;

    fn trip_row(id: &str, coordinates: serde_json::Value) -> TripRow {
        TripRow {
            id: id.to_string(),
            title: format!("Trip {id}"),
            trip_type: "road".to_string(),
            destination: None,
            coordinates: Some(coordinates),
            start_date: None,
            end_date: None,
            updated_at: Some("2026-03-01T10:00:00Z".to_string()),
        }
    }

    #[test]
    fn trip_rows_keep_records_with_bad_coordinates() {
        let good = map_trip(trip_row("a", json!("[2.35, 48.85]"))).unwrap();
        assert_eq!(good.coordinates.map(|c| c.to_array()), Some([2.35, 48.85]));
        assert!(good.updated_at.is_some());

        let bad = map_trip(trip_row("b", json!("somewhere"))).unwrap();
        assert!(bad.coordinates.is_none());
    }

    #[test]
    fn unknown_trip_type_is_skipped() {
        let mut row = trip_row("a", json!([1.0, 2.0]));
        row.trip_type = "submarine".to_string();
        assert!(map_trip(row).is_none());
    }

    #[test]
    fn payload_filter() {
        let event = |payload| CacheEvent::new(EventKind::TripCreated, Epoch::default(), payload);
        assert!(payload_matches(&event(None), "userId", "u1"));
        assert!(payload_matches(&event(Some(json!({ "userId": "u1" }))), "userId", "u1"));
        assert!(!payload_matches(&event(Some(json!({ "userId": "u2" }))), "userId", "u1"));
        assert!(payload_matches(&event(Some(json!({ "other": 1 }))), "userId", "u1"));
    }
}
