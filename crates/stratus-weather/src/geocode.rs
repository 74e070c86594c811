//! Reverse geocoding: coordinates to a human-readable place, cached.
//!
//! Lookups are cache-first against the geocode collection and never fail:
//! any upstream or parse problem falls back to a coordinate-derived name
//! the caller can display as-is.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use stratus_api::ApiClient;
use stratus_store::{CacheStore, Collection};

use crate::types::DEFAULT_TIMEZONE;

/// A named place resolved from coordinates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeocodedPlace {
    pub name: String,
    pub lat: f64,
    pub lon: f64,
    pub timezone: String,
}

#[derive(Debug, Deserialize)]
struct GeocodeAddress {
    city: Option<String>,
    town: Option<String>,
    village: Option<String>,
    municipality: Option<String>,
    state: Option<String>,
    country: Option<String>,
}

/// Cache key: coordinates rounded to three decimals (~110 m), so nearby
/// clicks share one entry.
pub fn geocode_key(lat: f64, lon: f64) -> String {
    format!("{:.3},{:.3}", lat, lon)
}

fn fallback_name(lat: f64, lon: f64) -> String {
    format!("Custom ({:.2}, {:.2})", lat, lon)
}

fn fallback_place(lat: f64, lon: f64) -> GeocodedPlace {
    GeocodedPlace {
        name: fallback_name(lat, lon),
        lat,
        lon,
        timezone: DEFAULT_TIMEZONE.to_string(),
    }
}

/// Resolve coordinates to a place name, consulting the cache first.
pub async fn reverse_geocode(
    store: &CacheStore,
    api: &ApiClient,
    lat: f64,
    lon: f64,
) -> GeocodedPlace {
    let key = geocode_key(lat, lon);

    if let Some(cached) = store.get(Collection::Geocode, &key) {
        match serde_json::from_value::<GeocodedPlace>(cached) {
            Ok(place) => return place,
            Err(e) => tracing::debug!("Ignoring unusable geocode cache entry {}: {}", key, e),
        }
    }

    let query = [
        ("lat", lat.to_string()),
        ("lon", lon.to_string()),
        ("format", "json".to_string()),
        ("addressdetails", "1".to_string()),
        ("zoom", "10".to_string()),
    ];

    let body = match api.get_json("/reverse", &query).await {
        Ok(body) => body,
        Err(e) => {
            tracing::debug!("Reverse geocode request failed: {}", e);
            return fallback_place(lat, lon);
        }
    };

    let name = place_name(&body).unwrap_or_else(|| fallback_name(lat, lon));
    let place = GeocodedPlace {
        name,
        lat,
        lon,
        timezone: DEFAULT_TIMEZONE.to_string(),
    };

    match serde_json::to_value(&place) {
        Ok(value) => {
            if !store.put(Collection::Geocode, &key, &value) {
                tracing::warn!("Failed to cache geocode result for {}", key);
            }
        }
        Err(e) => tracing::warn!("Failed to serialize geocode result: {}", e),
    }

    place
}

/// Pick the most specific place name out of the response address, with
/// the state or country appended for disambiguation when it differs.
fn place_name(body: &Value) -> Option<String> {
    let address: GeocodeAddress = serde_json::from_value(body.get("address")?.clone()).ok()?;

    let state = address.state.clone();
    let country = address.country.clone();

    let place = address
        .city
        .or(address.town)
        .or(address.village)
        .or(address.municipality)
        .or(address.state)
        .or(address.country)?;

    let suffix = state
        .filter(|s| !s.is_empty() && *s != place)
        .or_else(|| country.filter(|c| !c.is_empty() && *c != place));

    Some(match suffix {
        Some(suffix) => format!("{}, {}", place, suffix),
        None => place,
    })
}
