//! Forecast service client (Open-Meteo compatible).

use chrono::Utc;

use stratus_api::{ApiClient, ApiError};

use crate::normalize::normalize;
use crate::types::{DailySeries, ForecastSubject, NormalizedWeather};

const CURRENT_FIELDS: &str = "temperature_2m,relative_humidity_2m,wind_speed_10m,precipitation";
const HOURLY_FIELDS: &str = "temperature_2m,precipitation,relative_humidity_2m,wind_speed_10m";
const DAILY_FIELDS: &str = "temperature_2m_max,temperature_2m_min,precipitation_sum";

/// Client for the forecast upstream. Retry, backoff and credential
/// handling live in the underlying [`ApiClient`]; every response passes
/// through the normalizer before it reaches a caller.
#[derive(Debug, Clone)]
pub struct ForecastClient {
    api: ApiClient,
}

impl ForecastClient {
    pub fn new(api: ApiClient) -> Self {
        Self { api }
    }

    /// Fetch the forecast for a subject.
    ///
    /// Plain subjects request current conditions plus hourly and daily
    /// series; ranged subjects request the hourly and daily series for
    /// the date window instead (the upstream rejects `current` combined
    /// with an explicit range).
    pub async fn fetch(&self, subject: &ForecastSubject) -> Result<NormalizedWeather, ApiError> {
        let mut query = vec![
            ("latitude", subject.latitude.to_string()),
            ("longitude", subject.longitude.to_string()),
            ("timezone", subject.timezone.clone()),
        ];

        match subject.range {
            Some((start, end)) => {
                query.push(("start_date", start.to_string()));
                query.push(("end_date", end.to_string()));
                query.push(("hourly", HOURLY_FIELDS.to_string()));
                query.push(("daily", DAILY_FIELDS.to_string()));
            }
            None => {
                query.push(("current", CURRENT_FIELDS.to_string()));
                query.push(("hourly", HOURLY_FIELDS.to_string()));
                query.push(("daily", DAILY_FIELDS.to_string()));
            }
        }

        tracing::debug!(
            "Fetching forecast for {}:{}",
            subject.latitude,
            subject.longitude
        );
        let raw = self.api.get_json("/forecast", &query).await?;
        Ok(normalize(&raw))
    }

    /// Fetch only the daily series for a location (comparison path).
    pub async fn fetch_daily(
        &self,
        latitude: f64,
        longitude: f64,
        timezone: &str,
    ) -> Result<DailySeries, ApiError> {
        let query = vec![
            ("latitude", latitude.to_string()),
            ("longitude", longitude.to_string()),
            ("timezone", timezone.to_string()),
            ("daily", DAILY_FIELDS.to_string()),
        ];

        let raw = self.api.get_json("/forecast", &query).await?;
        Ok(normalize(&raw).daily)
    }

    /// Fetch the past `days` days of hourly and daily data.
    pub async fn fetch_backfill(
        &self,
        subject: &ForecastSubject,
        days: u32,
    ) -> Result<NormalizedWeather, ApiError> {
        let end = Utc::now().date_naive();
        let start = end - chrono::Duration::days(i64::from(days));
        let ranged = subject.clone().with_range(start, end);
        self.fetch(&ranged).await
    }
}
