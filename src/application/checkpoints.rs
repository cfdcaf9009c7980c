//! Checkpoints of a single trip, with an optional road route.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::cache::{CacheContext, CacheEvent, CacheOptions, EventKind, keys};
use crate::domain::coordinates::parse_optional_coordinates;
use crate::domain::entities::{CheckpointData, CheckpointSet};
use crate::domain::merge::merge_by_id;
use crate::domain::types::{TravelMode, TripType};

use super::error::FetchError;
use super::map_data::payload_matches;
use super::repos::{CheckpointRow, CheckpointsRepo, DirectionsProvider};
use super::watcher::{Refresh, RefreshMode};

/// Identifies one cached checkpoint set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckpointQuery {
    pub trip_id: String,
    pub trip_type: TripType,
    /// Only meaningful for road trips.
    pub travel_mode: Option<TravelMode>,
}

impl CheckpointQuery {
    pub fn new(trip_id: impl Into<String>, trip_type: TripType) -> Self {
        Self {
            trip_id: trip_id.into(),
            trip_type,
            travel_mode: None,
        }
    }

    pub fn with_travel_mode(mut self, mode: TravelMode) -> Self {
        self.travel_mode = Some(mode);
        self
    }

    pub fn cache_key(&self) -> String {
        keys::checkpoints(self.trip_type, &self.trip_id, self.travel_mode)
    }

    fn routed_mode(&self) -> Option<TravelMode> {
        match self.trip_type {
            TripType::Road => self.travel_mode,
            TripType::Flight | TripType::Cruise => None,
        }
    }
}

#[derive(Clone)]
pub struct CheckpointService {
    context: CacheContext,
    repo: Arc<dyn CheckpointsRepo>,
    directions: Option<Arc<dyn DirectionsProvider>>,
}

impl CheckpointService {
    pub fn new(context: CacheContext, repo: Arc<dyn CheckpointsRepo>) -> Self {
        Self {
            context,
            repo,
            directions: None,
        }
    }

    /// Road trips with a travel mode also get a route from `directions`.
    pub fn with_directions(mut self, directions: Arc<dyn DirectionsProvider>) -> Self {
        self.directions = Some(directions);
        self
    }

    pub async fn fetch(
        &self,
        query: &CheckpointQuery,
        force: bool,
    ) -> Result<Arc<CheckpointSet>, FetchError> {
        require_trip(query)?;
        let mut options = CacheOptions::ttl(self.context.config.checkpoints_ttl());
        if force {
            options = options.forced();
        }

        let service = self.clone();
        let owned = query.clone();
        self.context
            .checkpoints
            .get_or_set(
                &query.cache_key(),
                || async move {
                    let checkpoints = service.load_checkpoints(&owned).await?;
                    service.assemble(&owned, checkpoints).await.map(Arc::new)
                },
                options,
            )
            .await
    }

    /// Re-query and merge by id into the cached set, then re-sort by position
    /// and recompute the route. Runs a forced full fetch when nothing is cached.
    pub async fn fetch_incremental(
        &self,
        query: &CheckpointQuery,
    ) -> Result<Arc<CheckpointSet>, FetchError> {
        require_trip(query)?;
        let key = query.cache_key();
        let Some(previous) = self.context.checkpoints.get(&key) else {
            debug!(cache_key = %key, "Nothing cached; incremental fetch runs in full");
            return self.fetch(query, true).await;
        };

        let fresh = self.load_checkpoints(query).await?;
        let mut merged = merge_by_id(&previous.checkpoints, fresh);
        merged.sort_by_key(|checkpoint| checkpoint.position);

        let set = Arc::new(self.assemble(query, merged).await?);
        self.context
            .checkpoints
            .set(key, Arc::clone(&set), self.context.config.checkpoints_ttl());
        Ok(set)
    }

    /// Drop every cached variant of the trip and tell subscribers.
    pub fn invalidate(&self, trip_type: TripType, trip_id: &str) {
        let removed = std::iter::once(None)
            .chain(TravelMode::ALL.into_iter().map(Some))
            .filter(|&mode| {
                self.context
                    .checkpoints
                    .delete(&keys::checkpoints(trip_type, trip_id, mode))
            })
            .count();
        debug!(trip_id, removed, "Checkpoint entries invalidated");
        self.context.events.publish_with(
            EventKind::CheckpointsInvalidated,
            Some(serde_json::json!({ "tripId": trip_id })),
        );
    }

    async fn load_checkpoints(
        &self,
        query: &CheckpointQuery,
    ) -> Result<Vec<CheckpointData>, FetchError> {
        let rows = self
            .repo
            .list_checkpoints(query.trip_type, &query.trip_id)
            .await?;
        let mut checkpoints: Vec<CheckpointData> = rows
            .into_iter()
            .enumerate()
            .map(|(index, row)| map_checkpoint(index, row))
            .collect();
        checkpoints.sort_by_key(|checkpoint| checkpoint.position);
        Ok(checkpoints)
    }

    async fn assemble(
        &self,
        query: &CheckpointQuery,
        checkpoints: Vec<CheckpointData>,
    ) -> Result<CheckpointSet, FetchError> {
        let mut set = CheckpointSet {
            trip_id: query.trip_id.clone(),
            trip_type: query.trip_type,
            travel_mode: query.routed_mode(),
            checkpoints,
            route: None,
        };

        if let Some(mode) = query.routed_mode()
            && let Some(directions) = &self.directions
        {
            let waypoints = set.waypoints();
            if waypoints.len() >= 2 {
                set.route = directions.route(mode, &waypoints).await?;
            }
        }

        Ok(set)
    }
}

fn require_trip(query: &CheckpointQuery) -> Result<(), FetchError> {
    if query.trip_id.trim().is_empty() {
        return Err(FetchError::invalid_request("trip id must not be empty"));
    }
    Ok(())
}

fn map_checkpoint(index: usize, row: CheckpointRow) -> CheckpointData {
    // Missing or negative positions fall back to arrival order.
    let fallback = u32::try_from(index).unwrap_or(u32::MAX);
    let position = row
        .position
        .and_then(|position| u32::try_from(position).ok())
        .unwrap_or_else(|| {
            warn!(checkpoint_id = %row.id, "Checkpoint without a valid position");
            fallback
        });

    CheckpointData {
        coordinates: parse_optional_coordinates(row.coordinates.as_ref()),
        id: row.id,
        trip_id: row.trip_id,
        name: row.name,
        position,
        arrival_date: row.arrival_date,
        notes: row.notes,
    }
}

/// Reloads one trip's checkpoints on `checkpointsInvalidated`.
///
/// Events whose payload names another `tripId` are ignored.
pub struct CheckpointRefresher {
    service: CheckpointService,
    query: CheckpointQuery,
}

impl CheckpointRefresher {
    pub fn new(service: CheckpointService, query: CheckpointQuery) -> Self {
        Self { service, query }
    }

    pub fn query(&self) -> &CheckpointQuery {
        &self.query
    }
}

#[async_trait]
impl Refresh for CheckpointRefresher {
    type Output = CheckpointSet;

    fn name(&self) -> &'static str {
        "checkpoints"
    }

    fn kinds(&self) -> &'static [EventKind] {
        &[EventKind::CheckpointsInvalidated]
    }

    fn mode_for(&self, event: &CacheEvent) -> Option<RefreshMode> {
        (event.kind == EventKind::CheckpointsInvalidated
            && payload_matches(event, "tripId", &self.query.trip_id))
        .then_some(RefreshMode::Full)
    }

    async fn load(&self) -> Result<Arc<CheckpointSet>, FetchError> {
        self.service.fetch(&self.query, false).await
    }

    async fn refresh(&self, mode: RefreshMode) -> Result<Arc<CheckpointSet>, FetchError> {
        match mode {
            RefreshMode::Incremental => self.service.fetch_incremental(&self.query).await,
            RefreshMode::Full => self.service.fetch(&self.query, true).await,
        }
    }
}
