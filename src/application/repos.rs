//! Repository traits describing backend adapters.
//!
//! Rows come back close to their stored shape; coordinate fields stay as raw
//! JSON so the fetchers can normalise them.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use time::OffsetDateTime;

use crate::domain::coordinates::LngLat;
use crate::domain::entities::{AdminUser, BlogPage, BlogPost, BlogStats, RouteSummary};
use crate::domain::types::{TravelMode, TripType};

#[derive(Debug, Error)]
pub enum RepoError {
    #[error("backend request failed: {0}")]
    Transport(String),
    #[error("backend returned status {status}: {message}")]
    Status { status: u16, message: String },
    #[error("failed to decode backend response: {0}")]
    Decode(String),
    #[error("resource not found")]
    NotFound,
    #[error("backend timeout")]
    Timeout,
    #[error("invalid input: {message}")]
    InvalidInput { message: String },
}

impl RepoError {
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TripRow {
    pub id: String,
    pub title: String,
    pub trip_type: String,
    #[serde(default)]
    pub destination: Option<String>,
    #[serde(default)]
    pub coordinates: Option<Value>,
    #[serde(default)]
    pub start_date: Option<String>,
    #[serde(default)]
    pub end_date: Option<String>,
    #[serde(default)]
    pub updated_at: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FavoriteRow {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub coordinates: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckpointRow {
    pub id: String,
    pub trip_id: String,
    pub name: String,
    #[serde(default)]
    pub position: Option<i64>,
    #[serde(default)]
    pub coordinates: Option<Value>,
    #[serde(default)]
    pub arrival_date: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
}

#[async_trait]
pub trait TripsRepo: Send + Sync {
    /// Trips owned by `user_id`; only those updated after `updated_since` when given.
    async fn list_trips(
        &self,
        user_id: &str,
        updated_since: Option<OffsetDateTime>,
    ) -> Result<Vec<TripRow>, RepoError>;

    async fn list_favorites(&self, user_id: &str) -> Result<Vec<FavoriteRow>, RepoError>;
}

#[async_trait]
pub trait CheckpointsRepo: Send + Sync {
    async fn list_checkpoints(
        &self,
        trip_type: TripType,
        trip_id: &str,
    ) -> Result<Vec<CheckpointRow>, RepoError>;
}

#[async_trait]
pub trait BlogRepo: Send + Sync {
    async fn list_posts(&self, lang: &str, page: u32, limit: u32) -> Result<BlogPage, RepoError>;

    async fn find_by_slug(&self, slug: &str) -> Result<Option<BlogPost>, RepoError>;

    async fn stats(&self, lang: &str) -> Result<BlogStats, RepoError>;
}

#[async_trait]
pub trait AdminRepo: Send + Sync {
    async fn list_users(&self) -> Result<Vec<AdminUser>, RepoError>;
}

/// Routing between waypoints.
#[async_trait]
pub trait DirectionsProvider: Send + Sync {
    /// `Ok(None)` when the provider found no route.
    async fn route(
        &self,
        mode: TravelMode,
        waypoints: &[LngLat],
    ) -> Result<Option<RouteSummary>, RepoError>;
}
