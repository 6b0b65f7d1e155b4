//! Region geocoding
//!
//! Newly created regions are handed to a [`GeocodeQueue`]; a background
//! worker looks each one up through a [`Geocoder`] and stores the result.
//! Tasks may be delivered more than once and in any order, so the worker
//! re-reads the region and does nothing if it is gone or already has
//! coordinates. Failures are logged and dropped.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use lv_common::config::GeocodingConfig;
use serde::Deserialize;
use sqlx::SqlitePool;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::db::regions;

const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Geocoding errors
#[derive(Debug, Error)]
pub enum GeocodeError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Geocoder returned HTTP {0}: {1}")]
    Api(u16, String),

    #[error("Parse error: {0}")]
    Parse(String),
}

/// Latitude/longitude pair in degrees
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

/// Free-text place lookup
#[async_trait]
pub trait Geocoder: Send + Sync {
    /// Best match for `query`, or `None` if nothing matched
    async fn geocode(&self, query: &str) -> Result<Option<Coordinates>, GeocodeError>;
}

/// Limiter admitting one request per `min_interval_ms`; `None` when the interval is zero
fn request_limiter(min_interval_ms: u64) -> Option<DefaultDirectRateLimiter> {
    Quota::with_period(Duration::from_millis(min_interval_ms)).map(RateLimiter::direct)
}

#[derive(Debug, Deserialize)]
struct NominatimPlace {
    lat: String,
    lon: String,
}

/// OpenStreetMap Nominatim search client
pub struct NominatimClient {
    http_client: reqwest::Client,
    base_url: String,
    rate_limiter: Option<DefaultDirectRateLimiter>,
}

impl NominatimClient {
    pub fn new(config: &GeocodingConfig) -> Result<Self, GeocodeError> {
        let http_client = reqwest::Client::builder()
            .user_agent(config.user_agent.as_str())
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .map_err(|e| GeocodeError::Network(e.to_string()))?;

        Ok(Self {
            http_client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            rate_limiter: request_limiter(config.min_interval_ms),
        })
    }
}

#[async_trait]
impl Geocoder for NominatimClient {
    async fn geocode(&self, query: &str) -> Result<Option<Coordinates>, GeocodeError> {
        if let Some(limiter) = &self.rate_limiter {
            limiter.until_ready().await;
        }

        let url = format!("{}/search", self.base_url);
        tracing::debug!(query = %query, url = %url, "Querying Nominatim");

        let response = self
            .http_client
            .get(&url)
            .query(&[("q", query), ("format", "jsonv2"), ("limit", "1")])
            .send()
            .await
            .map_err(|e| GeocodeError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(GeocodeError::Api(status.as_u16(), error_text));
        }

        let places: Vec<NominatimPlace> = response
            .json()
            .await
            .map_err(|e| GeocodeError::Parse(e.to_string()))?;

        let Some(place) = places.into_iter().next() else {
            return Ok(None);
        };

        let latitude = place
            .lat
            .parse::<f64>()
            .map_err(|e| GeocodeError::Parse(format!("lat '{}': {}", place.lat, e)))?;
        let longitude = place
            .lon
            .parse::<f64>()
            .map_err(|e| GeocodeError::Parse(format!("lon '{}': {}", place.lon, e)))?;

        Ok(Some(Coordinates {
            latitude,
            longitude,
        }))
    }
}

/// One region to geocode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GeocodeTask {
    pub region_id: Uuid,
}

/// Sending side of the geocoding queue
#[derive(Debug, Clone)]
pub struct GeocodeQueue {
    sender: mpsc::UnboundedSender<GeocodeTask>,
}

impl GeocodeQueue {
    /// New queue and the receiver its worker drains
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<GeocodeTask>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }

    /// Queue a region; returns `false` if the worker has shut down
    pub fn enqueue(&self, region_id: Uuid) -> bool {
        match self.sender.send(GeocodeTask { region_id }) {
            Ok(()) => true,
            Err(_) => {
                tracing::warn!(region_id = %region_id, "Geocoding worker is gone; task dropped");
                false
            }
        }
    }
}

/// What the worker did with one task
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskOutcome {
    Updated,
    AlreadyGeocoded,
    RegionMissing,
    NoMatch,
    Failed,
}

/// Free-text query for a region: its name followed by its ancestors' names
async fn build_query(db: &SqlitePool, region: &lv_common::Region) -> lv_common::Result<String> {
    let mut parts = vec![region.name.clone()];
    let mut parent_id = region.parent_id;
    let mut hops = 0;

    while let Some(id) = parent_id {
        hops += 1;
        if hops > lv_common::RegionType::ALL.len() {
            break;
        }
        match regions::find_by_id(db, id).await? {
            Some(parent) => {
                parts.push(parent.name);
                parent_id = parent.parent_id;
            }
            None => break,
        }
    }

    parts.push("USA".to_string());
    Ok(parts.join(", "))
}

/// Geocode one region if it still needs it
pub async fn process_task(db: &SqlitePool, geocoder: &dyn Geocoder, task: GeocodeTask) -> TaskOutcome {
    let region = match regions::find_by_id(db, task.region_id).await {
        Ok(Some(region)) => region,
        Ok(None) => {
            tracing::debug!(region_id = %task.region_id, "Region no longer exists; skipping");
            return TaskOutcome::RegionMissing;
        }
        Err(e) => {
            tracing::warn!(region_id = %task.region_id, error = %e, "Failed to load region");
            return TaskOutcome::Failed;
        }
    };

    if region.has_coordinates() {
        tracing::debug!(region_id = %region.id, "Region already geocoded");
        return TaskOutcome::AlreadyGeocoded;
    }

    let query = match build_query(db, &region).await {
        Ok(query) => query,
        Err(e) => {
            tracing::warn!(region_id = %region.id, error = %e, "Failed to build geocoding query");
            return TaskOutcome::Failed;
        }
    };

    let coordinates = match geocoder.geocode(&query).await {
        Ok(Some(coordinates)) => coordinates,
        Ok(None) => {
            tracing::warn!(region_id = %region.id, query = %query, "No geocoding match");
            return TaskOutcome::NoMatch;
        }
        Err(e) => {
            tracing::warn!(region_id = %region.id, query = %query, error = %e, "Geocoding failed");
            return TaskOutcome::Failed;
        }
    };

    match regions::update_coordinates(db, region.id, coordinates.latitude, coordinates.longitude).await {
        Ok(true) => {
            tracing::info!(
                region_id = %region.id,
                slug = %region.slug,
                latitude = coordinates.latitude,
                longitude = coordinates.longitude,
                "Region geocoded"
            );
            TaskOutcome::Updated
        }
        Ok(false) => TaskOutcome::AlreadyGeocoded,
        Err(e) => {
            tracing::warn!(region_id = %region.id, error = %e, "Failed to store coordinates");
            TaskOutcome::Failed
        }
    }
}

/// Drain the queue sequentially until every sender is dropped
pub fn spawn_geocode_worker(
    db: SqlitePool,
    geocoder: Arc<dyn Geocoder>,
    mut receiver: mpsc::UnboundedReceiver<GeocodeTask>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        tracing::info!("Geocoding worker started");
        while let Some(task) = receiver.recv().await {
            process_task(&db, geocoder.as_ref(), task).await;
        }
        tracing::info!("Geocoding worker stopped");
    })
}
