use serde::{Deserialize, Serialize};

use stratus_api::ApiError;

/// Timezone used when a location or subject doesn't carry one.
pub const DEFAULT_TIMEZONE: &str = "Asia/Bangkok";

/// Instantaneous conditions. Every metric is optional: the upstream may
/// omit any of them and consumers render what is present.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct CurrentConditions {
    #[serde(default)]
    pub time: Option<String>,
    #[serde(default)]
    pub temperature_2m: Option<f64>,
    #[serde(default)]
    pub relative_humidity_2m: Option<f64>,
    #[serde(default)]
    pub wind_speed_10m: Option<f64>,
    #[serde(default)]
    pub precipitation: Option<f64>,
}

/// Hourly forecast as parallel arrays, index-aligned with `time`.
///
/// Individual samples may be `None` (the upstream reports gaps as null),
/// but after normalization every metric array has the same length as
/// `time`, so consumers index without bounds checks.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct HourlySeries {
    #[serde(default)]
    pub time: Vec<String>,
    #[serde(default)]
    pub temperature_2m: Vec<Option<f64>>,
    #[serde(default)]
    pub precipitation: Vec<Option<f64>>,
    #[serde(default)]
    pub relative_humidity_2m: Vec<Option<f64>>,
    #[serde(default)]
    pub wind_speed_10m: Vec<Option<f64>>,
}

/// Daily aggregates as parallel arrays, index-aligned with `time`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct DailySeries {
    #[serde(default)]
    pub time: Vec<String>,
    #[serde(default)]
    pub temperature_2m_max: Vec<Option<f64>>,
    #[serde(default)]
    pub temperature_2m_min: Vec<Option<f64>>,
    #[serde(default)]
    pub precipitation_sum: Vec<Option<f64>>,
}

impl DailySeries {
    pub fn len(&self) -> usize {
        self.time.len()
    }

    pub fn is_empty(&self) -> bool {
        self.time.is_empty()
    }
}

/// One stable shape for every upstream forecast response. Missing
/// sections are empty structures, never absent, so downstream consumers
/// don't null-check.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct NormalizedWeather {
    #[serde(default)]
    pub current: CurrentConditions,
    #[serde(default)]
    pub hourly: HourlySeries,
    #[serde(default)]
    pub daily: DailySeries,
}

/// A tracked geographic location.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Location {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    pub name: String,
    pub lat: f64,
    pub lon: f64,
    #[serde(default = "default_timezone")]
    pub timezone: String,
}

fn default_timezone() -> String {
    DEFAULT_TIMEZONE.to_string()
}

impl Location {
    /// Identity for comparison and dedup: the backend id when present,
    /// otherwise the trimmed, lowercased name.
    pub fn identity(&self) -> String {
        match self.id {
            Some(id) => id.to_string(),
            None => self.name.trim().to_lowercase(),
        }
    }
}

/// Identifying parameters of one forecast request. Two subjects with the
/// same parameters share one cache entry.
#[derive(Debug, Clone, PartialEq)]
pub struct ForecastSubject {
    pub latitude: f64,
    pub longitude: f64,
    pub timezone: String,
    /// Inclusive date range for historical/ranged queries (`YYYY-MM-DD`).
    pub range: Option<(chrono::NaiveDate, chrono::NaiveDate)>,
}

impl ForecastSubject {
    /// Validate coordinates and build a subject. Invalid input surfaces
    /// immediately; no network call is ever attempted for it.
    pub fn new(latitude: f64, longitude: f64, timezone: &str) -> Result<Self, ApiError> {
        if !latitude.is_finite() || !(-90.0..=90.0).contains(&latitude) {
            return Err(ApiError::Validation(format!(
                "latitude out of range: {}",
                latitude
            )));
        }
        if !longitude.is_finite() || !(-180.0..=180.0).contains(&longitude) {
            return Err(ApiError::Validation(format!(
                "longitude out of range: {}",
                longitude
            )));
        }

        let timezone = if timezone.is_empty() {
            DEFAULT_TIMEZONE.to_string()
        } else {
            timezone.to_string()
        };

        Ok(Self {
            latitude,
            longitude,
            timezone,
            range: None,
        })
    }

    /// Restrict the subject to an inclusive date range.
    pub fn with_range(mut self, start: chrono::NaiveDate, end: chrono::NaiveDate) -> Self {
        self.range = Some((start, end));
        self
    }

    /// Deterministic cache key for this subject.
    pub fn cache_key(&self) -> String {
        match self.range {
            Some((start, end)) => format!(
                "weather:{}:{}:{}:{}",
                self.latitude, self.longitude, start, end
            ),
            None => format!("weather:{}:{}", self.latitude, self.longitude),
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
    use super::*;

    #[test]
    fn test_subject_cache_key() {
        let subject = ForecastSubject::new(13.7563, 100.5018, "Asia/Bangkok").unwrap();
        assert_eq!(subject.cache_key(), "weather:13.7563:100.5018");
    }

    #[test]
    fn test_identical_parameters_share_key() {
        let a = ForecastSubject::new(13.7563, 100.5018, "Asia/Bangkok").unwrap();
        let b = ForecastSubject::new(13.7563, 100.5018, "Asia/Bangkok").unwrap();
        assert_eq!(a.cache_key(), b.cache_key());
    }

    #[test]
    fn test_ranged_key_differs() {
        let start = chrono::NaiveDate::from_ymd_opt(2026, 8, 1).unwrap();
        let end = chrono::NaiveDate::from_ymd_opt(2026, 8, 7).unwrap();
        let plain = ForecastSubject::new(13.7563, 100.5018, "Asia/Bangkok").unwrap();
        let ranged = plain.clone().with_range(start, end);

        assert_ne!(plain.cache_key(), ranged.cache_key());
        assert_eq!(
            ranged.cache_key(),
            "weather:13.7563:100.5018:2026-08-01:2026-08-07"
        );
    }

    #[test]
    fn test_subject_rejects_bad_coordinates() {
        assert!(ForecastSubject::new(91.0, 0.0, "UTC").is_err());
        assert!(ForecastSubject::new(0.0, 181.0, "UTC").is_err());
        assert!(ForecastSubject::new(f64::NAN, 0.0, "UTC").is_err());

        let err = ForecastSubject::new(-100.0, 0.0, "UTC").unwrap_err();
        assert!(matches!(err, ApiError::Validation(_)));
    }

    #[test]
    fn test_subject_defaults_empty_timezone() {
        let subject = ForecastSubject::new(0.0, 0.0, "").unwrap();
        assert_eq!(subject.timezone, DEFAULT_TIMEZONE);
    }

    #[test]
    fn test_location_identity_prefers_id() {
        let with_id = Location {
            id: Some(42),
            name: "Bangkok".into(),
            lat: 13.7563,
            lon: 100.5018,
            timezone: DEFAULT_TIMEZONE.into(),
        };
        assert_eq!(with_id.identity(), "42");

        let by_name = Location {
            id: None,
            name: "  Bangkok ".into(),
            lat: 13.7563,
            lon: 100.5018,
            timezone: DEFAULT_TIMEZONE.into(),
        };
        assert_eq!(by_name.identity(), "bangkok");
    }

    #[test]
    fn test_location_timezone_defaults_on_deserialize() {
        let location: Location =
            serde_json::from_str(r#"{"name": "Bangkok", "lat": 13.7563, "lon": 100.5018}"#)
                .unwrap();
        assert_eq!(location.timezone, DEFAULT_TIMEZONE);
    }
}
