//! REST backend adapter.
//!
//! Talks to a PostgREST-style service: every table is exposed under
//! `/rest/v1/<table>` and filtered with `column=op.value` query pairs.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{ACCEPT, AUTHORIZATION, HeaderMap, HeaderValue};
use reqwest::{Client, Response, StatusCode, Url};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use tracing::{debug, instrument};

use crate::application::repos::{
    AdminRepo, BlogRepo, CheckpointRow, CheckpointsRepo, FavoriteRow, RepoError, TripRow,
    TripsRepo,
};
use crate::config::BackendSettings;
use crate::domain::entities::{AdminUser, BlogPage, BlogPost, BlogPostSummary, BlogStats};
use crate::domain::types::TripType;

use super::error::InfraError;

const REST_PREFIX: &str = "rest/v1/";
const TRIP_COLUMNS: &str = "id,title,trip_type,destination,coordinates,start_date,end_date,updated_at";
const FAVORITE_COLUMNS: &str = "id,name,category,coordinates";
const CHECKPOINT_COLUMNS: &str = "id,trip_id,name,position,coordinates,arrival_date,notes";
const POST_SUMMARY_COLUMNS: &str = "id,slug,title,excerpt,cover_image,language,published_at";
const POST_COLUMNS: &str = "id,slug,title,content,language,author,published_at";

type Query = Vec<(&'static str, String)>;

#[derive(Clone, Debug)]
pub struct RestBackend {
    client: Client,
    base: Url,
}

impl RestBackend {
    pub fn new(settings: &BackendSettings) -> Result<Self, InfraError> {
        let base = settings
            .url
            .clone()
            .ok_or_else(|| InfraError::configuration("backend.url is required"))?;
        Self::from_parts(base, settings.api_key.as_deref(), settings.timeout)
    }

    pub fn from_parts(
        base: Url,
        api_key: Option<&str>,
        timeout: Duration,
    ) -> Result<Self, InfraError> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        if let Some(key) = api_key {
            let invalid = |_| InfraError::configuration("backend.api_key is not a valid header");
            headers.insert("apikey", HeaderValue::from_str(key).map_err(invalid)?);
            headers.insert(
                AUTHORIZATION,
                HeaderValue::from_str(&format!("Bearer {key}")).map_err(invalid)?,
            );
        }

        let client = Client::builder()
            .user_agent(user_agent())
            .default_headers(headers)
            .timeout(timeout)
            .build()?;
        let base = base
            .join(REST_PREFIX)
            .map_err(|err| InfraError::configuration(format!("invalid backend url: {err}")))?;

        Ok(Self { client, base })
    }

    fn url(&self, table: &str, query: &[(&str, String)]) -> Result<Url, RepoError> {
        let mut url = self
            .base
            .join(table)
            .map_err(|err| RepoError::invalid_input(format!("bad table `{table}`: {err}")))?;
        {
            let mut pairs = url.query_pairs_mut();
            for (key, value) in query {
                pairs.append_pair(key, value);
            }
        }
        Ok(url)
    }

    async fn select<T: DeserializeOwned>(
        &self,
        table: &str,
        query: &[(&str, String)],
    ) -> Result<Vec<T>, RepoError> {
        let url = self.url(table, query)?;
        debug!(table, "Backend select");
        let response = self.client.get(url).send().await.map_err(transport)?;
        decode(response).await
    }

    /// Select with an exact row count taken from `Content-Range`.
    async fn select_counted<T: DeserializeOwned>(
        &self,
        table: &str,
        query: &[(&str, String)],
    ) -> Result<(Vec<T>, Option<u64>), RepoError> {
        let url = self.url(table, query)?;
        let response = self
            .client
            .get(url)
            .header("Prefer", "count=exact")
            .send()
            .await
            .map_err(transport)?;
        let total = response
            .headers()
            .get("content-range")
            .and_then(|value| value.to_str().ok())
            .and_then(parse_content_range_total);
        Ok((decode(response).await?, total))
    }
}

fn user_agent() -> &'static str {
    concat!("tripkit/", env!("CARGO_PKG_VERSION"))
}

fn transport(err: reqwest::Error) -> RepoError {
    if err.is_timeout() {
        RepoError::Timeout
    } else {
        RepoError::Transport(err.to_string())
    }
}

async fn decode<T: DeserializeOwned>(response: Response) -> Result<T, RepoError> {
    let status = response.status();
    let bytes = response.bytes().await.map_err(transport)?;
    if status == StatusCode::NOT_FOUND {
        return Err(RepoError::NotFound);
    }
    if !status.is_success() {
        return Err(RepoError::Status {
            status: status.as_u16(),
            message: String::from_utf8_lossy(&bytes).into_owned(),
        });
    }
    serde_json::from_slice(&bytes).map_err(|err| RepoError::Decode(err.to_string()))
}

/// `0-9/42` → 42; `*/0` → 0; `0-9/*` → None.
fn parse_content_range_total(value: &str) -> Option<u64> {
    value.rsplit_once('/')?.1.trim().parse().ok()
}

fn eq(value: impl AsRef<str>) -> String {
    format!("eq.{}", value.as_ref())
}

#[async_trait]
impl TripsRepo for RestBackend {
    #[instrument(skip(self), err)]
    async fn list_trips(
        &self,
        user_id: &str,
        updated_since: Option<OffsetDateTime>,
    ) -> Result<Vec<TripRow>, RepoError> {
        let mut query: Query = vec![
            ("select", TRIP_COLUMNS.to_string()),
            ("user_id", eq(user_id)),
            ("order", "updated_at.desc".to_string()),
        ];
        if let Some(since) = updated_since {
            let since = since
                .format(&Rfc3339)
                .map_err(|err| RepoError::invalid_input(err.to_string()))?;
            query.push(("updated_at", format!("gt.{since}")));
        }
        self.select("trips", &query).await
    }

    #[instrument(skip(self), err)]
    async fn list_favorites(&self, user_id: &str) -> Result<Vec<FavoriteRow>, RepoError> {
        let query: Query = vec![
            ("select", FAVORITE_COLUMNS.to_string()),
            ("user_id", eq(user_id)),
            ("order", "created_at.desc".to_string()),
        ];
        self.select("favorite_places", &query).await
    }
}

#[async_trait]
impl CheckpointsRepo for RestBackend {
    #[instrument(skip(self), err)]
    async fn list_checkpoints(
        &self,
        trip_type: TripType,
        trip_id: &str,
    ) -> Result<Vec<CheckpointRow>, RepoError> {
        let query: Query = vec![
            ("select", CHECKPOINT_COLUMNS.to_string()),
            ("trip_id", eq(trip_id)),
            ("trip_type", eq(trip_type.as_str())),
            ("order", "position.asc".to_string()),
        ];
        self.select("checkpoints", &query).await
    }
}

#[derive(Debug, Deserialize)]
struct StatsRow {
    total_posts: u64,
    total_views: u64,
}

#[async_trait]
impl BlogRepo for RestBackend {
    #[instrument(skip(self), err)]
    async fn list_posts(&self, lang: &str, page: u32, limit: u32) -> Result<BlogPage, RepoError> {
        let offset = u64::from(page.saturating_sub(1)) * u64::from(limit);
        let query: Query = vec![
            ("select", POST_SUMMARY_COLUMNS.to_string()),
            ("language", eq(lang)),
            ("status", eq("published")),
            ("order", "published_at.desc".to_string()),
            ("limit", limit.to_string()),
            ("offset", offset.to_string()),
        ];
        let (posts, total): (Vec<BlogPostSummary>, _) =
            self.select_counted("blog_posts", &query).await?;
        let total = total.unwrap_or(offset + posts.len() as u64);

        Ok(BlogPage {
            language: lang.to_string(),
            page,
            limit,
            total,
            posts,
        })
    }

    #[instrument(skip(self), err)]
    async fn find_by_slug(&self, slug: &str) -> Result<Option<BlogPost>, RepoError> {
        let query: Query = vec![
            ("select", POST_COLUMNS.to_string()),
            ("slug", eq(slug)),
            ("limit", "1".to_string()),
        ];
        let posts: Vec<BlogPost> = self.select("blog_posts", &query).await?;
        Ok(posts.into_iter().next())
    }

    #[instrument(skip(self), err)]
    async fn stats(&self, lang: &str) -> Result<BlogStats, RepoError> {
        let query: Query = vec![
            ("select", "total_posts,total_views".to_string()),
            ("language", eq(lang)),
        ];
        let rows: Vec<StatsRow> = self.select("blog_stats", &query).await?;
        let (total_posts, total_views) = rows
            .into_iter()
            .next()
            .map_or((0, 0), |row| (row.total_posts, row.total_views));

        Ok(BlogStats {
            language: lang.to_string(),
            total_posts,
            total_views,
        })
    }
}

#[async_trait]
impl AdminRepo for RestBackend {
    #[instrument(skip(self), err)]
    async fn list_users(&self) -> Result<Vec<AdminUser>, RepoError> {
        let query: Query = vec![
            ("select", "id,email,display_name,role".to_string()),
            ("order", "email.asc".to_string()),
        ];
        self.select("admin_users", &query).await
    }
}
