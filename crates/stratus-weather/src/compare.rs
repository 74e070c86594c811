//! Daily series for location comparison.
//!
//! Unlike the live feed, this is a one-shot read with nowhere to publish
//! a later refresh, so it gates on freshness instead of
//! serve-then-revalidate: a cached daily series younger than the
//! freshness window is served as-is, anything older forces a fetch. On
//! total failure the caller gets an empty series, never an error.

use std::time::Duration;

use chrono::{NaiveDate, Utc};

use stratus_store::{CacheStore, Collection};

use crate::forecast::ForecastClient;
use crate::types::{DailySeries, Location};

/// Default freshness window for cached daily series.
pub const DAILY_FRESH_FOR: Duration = Duration::from_secs(3 * 60 * 60);

/// Date window selector for the comparison view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareRange {
    Past7Days,
    Next7Days,
}

impl CompareRange {
    /// Inclusive date window relative to `today`.
    pub fn window(self, today: NaiveDate) -> (NaiveDate, NaiveDate) {
        match self {
            CompareRange::Past7Days => (today - chrono::Duration::days(7), today),
            CompareRange::Next7Days => (today, today + chrono::Duration::days(7)),
        }
    }
}

impl DailySeries {
    /// Restrict the series to days within the inclusive window. Days
    /// whose timestamp doesn't parse are dropped.
    pub fn slice(&self, start: NaiveDate, end: NaiveDate) -> DailySeries {
        let mut out = DailySeries::default();
        for (i, day) in self.time.iter().enumerate() {
            let Ok(date) = day.parse::<NaiveDate>() else {
                continue;
            };
            if date < start || date > end {
                continue;
            }
            out.time.push(day.clone());
            out.temperature_2m_max
                .push(self.temperature_2m_max.get(i).copied().flatten());
            out.temperature_2m_min
                .push(self.temperature_2m_min.get(i).copied().flatten());
            out.precipitation_sum
                .push(self.precipitation_sum.get(i).copied().flatten());
        }
        out
    }
}

/// Get the daily series for a location, freshness-gated.
///
/// A fetched series is merged into the location's forecast cache entry
/// (preserving any current/hourly sections the feed wrote) so both paths
/// share one entry per subject.
pub async fn daily_series(
    store: &CacheStore,
    client: &ForecastClient,
    lat: f64,
    lon: f64,
    timezone: &str,
    fresh_for: Duration,
) -> DailySeries {
    let key = format!("weather:{}:{}", lat, lon);

    let cached_entry = store.get_entry(Collection::Forecast, &key);
    if let Some(entry) = &cached_entry {
        let age = Utc::now().timestamp_millis() - entry.updated_at;
        if age >= 0 && (age as u128) < fresh_for.as_millis() {
            if let Some(daily) = entry.value.get("daily") {
                match serde_json::from_value::<DailySeries>(daily.clone()) {
                    Ok(series) if !series.is_empty() => {
                        tracing::debug!("Serving cached daily series for {}", key);
                        return series;
                    }
                    Ok(_) => {}
                    Err(e) => tracing::debug!("Unusable cached daily series for {}: {}", key, e),
                }
            }
        }
    }

    match client.fetch_daily(lat, lon, timezone).await {
        Ok(series) => {
            let mut value = cached_entry
                .map(|entry| entry.value)
                .filter(serde_json::Value::is_object)
                .unwrap_or_else(|| serde_json::json!({}));
            match serde_json::to_value(&series) {
                Ok(daily_value) => {
                    value["daily"] = daily_value;
                    if !store.put(Collection::Forecast, &key, &value) {
                        tracing::warn!("Failed to cache daily series for {}", key);
                    }
                }
                Err(e) => tracing::warn!("Failed to serialize daily series: {}", e),
            }
            series
        }
        Err(e) => {
            tracing::error!("Daily series fetch for {} failed: {}", key, e);
            DailySeries::default()
        }
    }
}

/// Fetch and window the daily series for two locations.
pub async fn compare_daily(
    store: &CacheStore,
    client: &ForecastClient,
    a: &Location,
    b: &Location,
    range: CompareRange,
    fresh_for: Duration,
) -> (DailySeries, DailySeries) {
    let (start, end) = range.window(Utc::now().date_naive());

    let series_a = daily_series(store, client, a.lat, a.lon, &a.timezone, fresh_for).await;
    let series_b = daily_series(store, client, b.lat, b.lon, &b.timezone, fresh_for).await;

    (series_a.slice(start, end), series_b.slice(start, end))
}
