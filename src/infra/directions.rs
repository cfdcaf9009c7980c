//! Mapbox-style directions adapter.

use async_trait::async_trait;
use reqwest::{Client, StatusCode, Url};
use serde::Deserialize;
use tracing::{debug, instrument, warn};

use crate::application::repos::{DirectionsProvider, RepoError};
use crate::config::DirectionsSettings;
use crate::domain::coordinates::LngLat;
use crate::domain::entities::RouteSummary;
use crate::domain::types::TravelMode;

use super::error::InfraError;

/// The directions API rejects requests with more waypoints than this.
pub const MAX_WAYPOINTS: usize = 25;

#[derive(Clone, Debug)]
pub struct DirectionsClient {
    client: Client,
    base: Url,
    access_token: String,
}

impl DirectionsClient {
    /// `None` when no access token is configured.
    pub fn from_settings(
        settings: &DirectionsSettings,
        client: Client,
    ) -> Option<Self> {
        let access_token = settings.access_token.clone()?;
        Some(Self::new(settings.base_url.clone(), access_token, client))
    }

    pub fn new(base: Url, access_token: String, client: Client) -> Self {
        Self {
            client,
            base,
            access_token,
        }
    }

    /// Default HTTP client for the directions API.
    pub fn http_client() -> Result<Client, InfraError> {
        Ok(Client::builder()
            .user_agent(concat!("tripkit/", env!("CARGO_PKG_VERSION")))
            .build()?)
    }

    fn route_url(&self, mode: TravelMode, waypoints: &[LngLat]) -> Result<Url, RepoError> {
        let path = format!(
            "directions/v5/mapbox/{}/{}",
            profile(mode),
            waypoint_path(waypoints)
        );
        let mut url = self
            .base
            .join(&path)
            .map_err(|err| RepoError::invalid_input(err.to_string()))?;
        url.query_pairs_mut()
            .append_pair("geometries", "geojson")
            .append_pair("overview", "simplified")
            .append_pair("access_token", &self.access_token);
        Ok(url)
    }
}

fn profile(mode: TravelMode) -> &'static str {
    match mode {
        TravelMode::Driving => "driving",
        TravelMode::Cycling => "cycling",
        TravelMode::Walking => "walking",
    }
}

fn waypoint_path(waypoints: &[LngLat]) -> String {
    waypoints
        .iter()
        .map(|point| format!("{},{}", point.lng, point.lat))
        .collect::<Vec<_>>()
        .join(";")
}

#[derive(Debug, Deserialize)]
struct DirectionsResponse {
    code: String,
    #[serde(default)]
    routes: Vec<RouteDto>,
}

#[derive(Debug, Deserialize)]
struct RouteDto {
    distance: f64,
    duration: f64,
    geometry: GeometryDto,
}

#[derive(Debug, Deserialize)]
struct GeometryDto {
    coordinates: Vec<[f64; 2]>,
}

impl From<RouteDto> for RouteSummary {
    fn from(route: RouteDto) -> Self {
        RouteSummary {
            distance_meters: route.distance,
            duration_seconds: route.duration,
            geometry: route
                .geometry
                .coordinates
                .into_iter()
                .filter_map(|[lng, lat]| LngLat::new(lng, lat))
                .collect(),
        }
    }
}

#[async_trait]
impl DirectionsProvider for DirectionsClient {
    #[instrument(skip(self, waypoints), fields(waypoints = waypoints.len()), err)]
    async fn route(
        &self,
        mode: TravelMode,
        waypoints: &[LngLat],
    ) -> Result<Option<RouteSummary>, RepoError> {
        if waypoints.len() < 2 {
            return Ok(None);
        }
        if waypoints.len() > MAX_WAYPOINTS {
            warn!(
                waypoints = waypoints.len(),
                max = MAX_WAYPOINTS,
                "Too many waypoints to route; skipping directions"
            );
            return Ok(None);
        }

        let url = self.route_url(mode, waypoints)?;
        let response = self.client.get(url).send().await.map_err(|err| {
            if err.is_timeout() {
                RepoError::Timeout
            } else {
                RepoError::Transport(err.to_string())
            }
        })?;
        let status = response.status();
        let bytes = response
            .bytes()
            .await
            .map_err(|err| RepoError::Transport(err.to_string()))?;

        // The API answers 404 with a `NoRoute`/`NoSegment` body when nothing connects.
        if !status.is_success() && status != StatusCode::NOT_FOUND {
            return Err(RepoError::Status {
                status: status.as_u16(),
                message: String::from_utf8_lossy(&bytes).into_owned(),
            });
        }
        let body: DirectionsResponse =
            serde_json::from_slice(&bytes).map_err(|err| RepoError::Decode(err.to_string()))?;

        if body.code != "Ok" {
            debug!(code = %body.code, "No route between waypoints");
            return Ok(None);
        }
        Ok(body.routes.into_iter().next().map(RouteSummary::from))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn point(lng: f64, lat: f64) -> LngLat {
        LngLat::new(lng, lat).unwrap()
    }

    #[test]
    fn route_url_lists_waypoints_as_lng_lat() {
        let client = DirectionsClient::new(
            Url::parse("https://api.mapbox.com").unwrap(),
            "pk.test".into(),
            Client::new(),
        );
        let url = client
            .route_url(
                TravelMode::Cycling,
                &[point(-8.61, 41.15), point(-9.14, 38.72)],
            )
            .unwrap();
        assert_eq!(url.path(), "/directions/v5/mapbox/cycling/-8.61,41.15;-9.14,38.72");
        assert!(url.query().unwrap().contains("access_token=pk.test"));
    }

    #[tokio::test]
    async fn too_many_waypoints_is_no_route() {
        // Unroutable host: any request would fail with a transport error.
        let client = DirectionsClient::new(
            Url::parse("http://127.0.0.1:9").unwrap(),
            "pk.test".into(),
            Client::new(),
        );
        let waypoints: Vec<LngLat> = (0..=MAX_WAYPOINTS)
            .map(|i| point(-8.0 + i as f64 * 0.01, 41.0))
            .collect();

        let route = client.route(TravelMode::Driving, &waypoints).await.unwrap();
        assert!(route.is_none());
    }

    #[test]
    fn geometry_drops_invalid_points() {
        let route = RouteDto {
            distance: 1200.0,
            duration: 300.0,
            geometry: GeometryDto {
                coordinates: vec![[2.0, 48.0], [200.0, 10.0], [2.1, 48.1]],
            },
        };
        let summary = RouteSummary::from(route);
        assert_eq!(summary.geometry.len(), 2);
        assert_eq!(summary.distance_meters, 1200.0);
    }
}
