//! Tracked locations: backend-first with a local offline fallback.
//!
//! The locations backend is optional at runtime. Reads and writes go to
//! it when it answers; when it is unreachable the service falls back to a
//! list persisted in the cache store, so the dashboard keeps working
//! offline. A credential rejection is not "unreachable" and propagates.

use chrono::Utc;
use serde_json::{json, Value};

use stratus_api::{ApiClient, ApiError};
use stratus_store::{CacheStore, Collection};

use crate::types::{Location, DEFAULT_TIMEZONE};

const LOCATIONS_PATH: &str = "/api/locations";
const LOCATIONS_KEY: &str = "locations";

/// Input for creating a location.
#[derive(Debug, Clone)]
pub struct NewLocation {
    pub name: String,
    pub lat: f64,
    pub lon: f64,
    pub timezone: Option<String>,
}

pub struct LocationService {
    api: ApiClient,
    store: CacheStore,
}

impl LocationService {
    pub fn new(api: ApiClient, store: CacheStore) -> Self {
        Self { api, store }
    }

    /// List tracked locations, deduplicated by identity.
    ///
    /// Serves the backend list when available, otherwise the locally
    /// persisted one. Only a credential rejection is an error.
    pub async fn list(&self) -> Result<Vec<Location>, ApiError> {
        match self.api.get_json(LOCATIONS_PATH, &[]).await {
            Ok(Value::Array(items)) => Ok(dedup(parse_locations(items))),
            Ok(other) => {
                tracing::warn!(
                    "Locations backend returned a non-list ({}), using local cache",
                    kind_of(&other)
                );
                Ok(self.local_list())
            }
            Err(ApiError::Unauthorized) => Err(ApiError::Unauthorized),
            Err(e) => {
                tracing::warn!("Locations backend unavailable, using local cache: {}", e);
                Ok(self.local_list())
            }
        }
    }

    /// Create a location on the backend, or locally when it is down.
    ///
    /// Locally created entries get a millisecond-timestamp id so they
    /// stay unique and comparable against backend ids.
    pub async fn add(&self, new: NewLocation) -> Result<Location, ApiError> {
        let name = new.name.trim();
        if name.is_empty() {
            return Err(ApiError::Validation("name is required".to_string()));
        }
        if !new.lat.is_finite() || !(-90.0..=90.0).contains(&new.lat) {
            return Err(ApiError::Validation(format!("invalid latitude: {}", new.lat)));
        }
        if !new.lon.is_finite() || !(-180.0..=180.0).contains(&new.lon) {
            return Err(ApiError::Validation(format!(
                "invalid longitude: {}",
                new.lon
            )));
        }

        let timezone = new
            .timezone
            .filter(|tz| !tz.is_empty())
            .unwrap_or_else(|| DEFAULT_TIMEZONE.to_string());

        let body = json!({
            "name": name,
            "lat": new.lat,
            "lon": new.lon,
            "timezone": timezone,
        });

        match self.api.post_json(LOCATIONS_PATH, &body).await {
            Ok(created) => serde_json::from_value(created)
                .map_err(|e| ApiError::MalformedResponse(e.to_string())),
            Err(ApiError::Unauthorized) => Err(ApiError::Unauthorized),
            Err(e) => {
                tracing::warn!("Locations backend unavailable, saving locally: {}", e);
                Ok(self.add_local(name, new.lat, new.lon, timezone))
            }
        }
    }

    fn add_local(&self, name: &str, lat: f64, lon: f64, timezone: String) -> Location {
        let location = Location {
            id: Some(Utc::now().timestamp_millis()),
            name: name.to_string(),
            lat,
            lon,
            timezone,
        };

        let mut list = self.local_list();
        list.push(location.clone());

        match serde_json::to_value(&list) {
            Ok(value) => {
                if !self.store.put(Collection::Locations, LOCATIONS_KEY, &value) {
                    tracing::warn!("Failed to persist local locations list");
                }
            }
            Err(e) => tracing::warn!("Failed to serialize locations list: {}", e),
        }

        location
    }

    fn local_list(&self) -> Vec<Location> {
        let Some(value) = self.store.get(Collection::Locations, LOCATIONS_KEY) else {
            return Vec::new();
        };

        match serde_json::from_value::<Vec<Location>>(value) {
            Ok(list) => dedup(list),
            Err(e) => {
                tracing::warn!("Ignoring unusable local locations list: {}", e);
                Vec::new()
            }
        }
    }
}

fn parse_locations(items: Vec<Value>) -> Vec<Location> {
    items
        .into_iter()
        .filter_map(|item| match serde_json::from_value::<Location>(item) {
            Ok(location) => Some(location),
            Err(e) => {
                tracing::warn!("Skipping unparseable location record: {}", e);
                None
            }
        })
        .collect()
}

/// Keep the first occurrence of each identity.
fn dedup(locations: Vec<Location>) -> Vec<Location> {
    let mut seen = std::collections::HashSet::new();
    locations
        .into_iter()
        .filter(|location| seen.insert(location.identity()))
        .collect()
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
