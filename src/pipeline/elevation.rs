use std::collections::HashMap;

use serde::Deserialize;

use crate::config::Config;
use crate::error::ElevationError;
use crate::types::activity::Activity;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ElevationStatus {
    Ok,
    Failed(String),
}

/// Elevations keyed by the `"lat,lng"` strings that were asked for.
#[derive(Debug, Clone)]
pub struct ElevationResponse {
    pub status: ElevationStatus,
    pub elevations: HashMap<String, f64>,
}

impl ElevationResponse {
    fn failed(reason: impl Into<String>) -> Self {
        Self {
            status: ElevationStatus::Failed(reason.into()),
            elevations: HashMap::new(),
        }
    }
}

/// Where missing altitudes come from.
#[derive(Debug, Clone)]
pub enum ElevationSource {
    Disabled,
    Http(HttpElevationClient),
    /// Canned elevations, for offline runs and tests.
    Fixed(HashMap<String, f64>),
}

impl ElevationSource {
    pub fn from_config(config: &Config) -> Self {
        match &config.elevation_api_key {
            Some(key) => ElevationSource::Http(HttpElevationClient::new(
                config.elevation_api_url.clone(),
                key.clone(),
            )),
            None => ElevationSource::Disabled,
        }
    }

    pub async fn lookup(&self, locations: &[String]) -> ElevationResponse {
        match self {
            ElevationSource::Disabled => ElevationResponse::failed("elevation lookups disabled"),
            ElevationSource::Http(client) => match client.lookup(locations).await {
                Ok(response) => response,
                Err(err) => ElevationResponse::failed(err.to_string()),
            },
            ElevationSource::Fixed(table) => ElevationResponse {
                status: ElevationStatus::Ok,
                elevations: locations
                    .iter()
                    .filter_map(|key| table.get(key).map(|ele| (key.clone(), *ele)))
                    .collect(),
            },
        }
    }
}

/// Client for a Google Elevation API compatible endpoint.
#[derive(Debug, Clone)]
pub struct HttpElevationClient {
    client: reqwest::Client,
    url: String,
    api_key: String,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    #[serde(default)]
    results: Vec<ApiResult>,
    status: String,
}

#[derive(Debug, Deserialize)]
struct ApiResult {
    elevation: f64,
}

impl HttpElevationClient {
    pub fn new(url: String, api_key: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            url,
            api_key,
        }
    }

    pub async fn lookup(&self, locations: &[String]) -> Result<ElevationResponse, ElevationError> {
        let joined = locations.join("|");
        let body: ApiResponse = self
            .client
            .get(&self.url)
            .query(&[("locations", joined.as_str()), ("key", self.api_key.as_str())])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        if body.status != "OK" {
            return Ok(ElevationResponse::failed(body.status));
        }
        if body.results.len() != locations.len() {
            return Err(ElevationError::ResultCount {
                expected: locations.len(),
                got: body.results.len(),
            });
        }

        Ok(ElevationResponse {
            status: ElevationStatus::Ok,
            elevations: locations
                .iter()
                .cloned()
                .zip(body.results.into_iter().map(|r| r.elevation))
                .collect(),
        })
    }
}

/// Fills altitude on points that have none. Returns how many were filled;
/// failed batches leave their points untouched.
pub async fn backfill_altitude(
    activity: &mut Activity,
    source: &ElevationSource,
    batch_size: usize,
) -> usize {
    if matches!(source, ElevationSource::Disabled) {
        return 0;
    }

    let mut missing: Vec<String> = activity
        .laps
        .iter()
        .flat_map(|lap| lap.tracks.iter())
        .filter(|point| point.altitude.is_none())
        .map(|point| point.position.key())
        .collect();
    missing.sort();
    missing.dedup();
    if missing.is_empty() {
        return 0;
    }

    let mut found: HashMap<String, f64> = HashMap::new();
    for batch in missing.chunks(batch_size.max(1)) {
        let response = source.lookup(batch).await;
        match response.status {
            ElevationStatus::Ok => found.extend(response.elevations),
            ElevationStatus::Failed(reason) => {
                tracing::warn!(
                    activity_id = %activity.id,
                    locations = batch.len(),
                    "Elevation lookup failed: {}",
                    reason
                );
            }
        }
    }

    let mut filled = 0;
    for point in activity.laps.iter_mut().flat_map(|lap| lap.tracks.iter_mut()) {
        if point.altitude.is_none() {
            if let Some(elevation) = found.get(&point.position.key()) {
                point.altitude = Some(*elevation);
                filled += 1;
            }
        }
    }
    filled
}
