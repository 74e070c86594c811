//! Response normalization.
//!
//! Upstream forecast responses vary: sections go missing, the current
//! block is sometimes named `current_weather`, and metric arrays can be
//! shorter or longer than the time axis. `normalize` maps any of those
//! shapes onto [`NormalizedWeather`] with every section present and every
//! metric array resized to its time axis. Pure and idempotent; no network
//! or storage side effects.

use serde_json::Value;

use crate::types::{CurrentConditions, DailySeries, HourlySeries, NormalizedWeather};

/// Normalize a raw upstream response.
pub fn normalize(raw: &Value) -> NormalizedWeather {
    let current = raw
        .get("current")
        .or_else(|| raw.get("current_weather"))
        .map(parse_current)
        .unwrap_or_default();

    let mut hourly: HourlySeries = parse_section(raw, "hourly");
    let mut daily: DailySeries = parse_section(raw, "daily");

    align_hourly(&mut hourly);
    align_daily(&mut daily);

    NormalizedWeather {
        current,
        hourly,
        daily,
    }
}

fn parse_current(value: &Value) -> CurrentConditions {
    match serde_json::from_value(value.clone()) {
        Ok(current) => current,
        Err(e) => {
            tracing::debug!("Unusable current section, defaulting to empty: {}", e);
            CurrentConditions::default()
        }
    }
}

fn parse_section<T: serde::de::DeserializeOwned + Default>(raw: &Value, name: &str) -> T {
    match raw.get(name) {
        Some(section) => match serde_json::from_value(section.clone()) {
            Ok(parsed) => parsed,
            Err(e) => {
                tracing::debug!("Unusable {} section, defaulting to empty: {}", name, e);
                T::default()
            }
        },
        None => T::default(),
    }
}

/// Resize every metric array to the length of the time axis: longer
/// arrays are truncated, shorter ones padded with `None`.
fn align_hourly(hourly: &mut HourlySeries) {
    let len = hourly.time.len();
    hourly.temperature_2m.resize(len, None);
    hourly.precipitation.resize(len, None);
    hourly.relative_humidity_2m.resize(len, None);
    hourly.wind_speed_10m.resize(len, None);
}

fn align_daily(daily: &mut DailySeries) {
    let len = daily.time.len();
    daily.temperature_2m_max.resize(len, None);
    daily.temperature_2m_min.resize(len, None);
    daily.precipitation_sum.resize(len, None);
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
    use super::*;
    use serde_json::json;

    fn full_response() -> Value {
        json!({
            "current": {
                "time": "2026-08-07T12:00",
                "temperature_2m": 31.4,
                "relative_humidity_2m": 66.0,
                "wind_speed_10m": 8.2,
                "precipitation": 0.0
            },
            "hourly": {
                "time": ["2026-08-07T00:00", "2026-08-07T01:00"],
                "temperature_2m": [27.1, 26.8],
                "precipitation": [0.0, 0.2],
                "relative_humidity_2m": [70.0, 72.0],
                "wind_speed_10m": [5.0, 4.4]
            },
            "daily": {
                "time": ["2026-08-07"],
                "temperature_2m_max": [33.0],
                "temperature_2m_min": [26.0],
                "precipitation_sum": [1.2]
            }
        })
    }

    #[test]
    fn test_full_response_maps_all_sections() {
        let weather = normalize(&full_response());

        assert_eq!(weather.current.temperature_2m, Some(31.4));
        assert_eq!(weather.current.relative_humidity_2m, Some(66.0));
        assert_eq!(weather.current.wind_speed_10m, Some(8.2));
        assert_eq!(weather.current.precipitation, Some(0.0));
        assert_eq!(weather.hourly.time.len(), 2);
        assert_eq!(weather.hourly.temperature_2m, vec![Some(27.1), Some(26.8)]);
        assert_eq!(weather.daily.time, vec!["2026-08-07"]);
    }

    #[test]
    fn test_missing_sections_default_to_empty_structures() {
        let weather = normalize(&json!({}));

        assert_eq!(weather.current, CurrentConditions::default());
        assert!(weather.hourly.time.is_empty());
        assert!(weather.hourly.temperature_2m.is_empty());
        assert!(weather.daily.is_empty());
    }

    #[test]
    fn test_legacy_current_weather_field_name() {
        let weather = normalize(&json!({
            "current_weather": {"temperature_2m": 19.5}
        }));
        assert_eq!(weather.current.temperature_2m, Some(19.5));
    }

    #[test]
    fn test_current_preferred_over_legacy_name() {
        let weather = normalize(&json!({
            "current": {"temperature_2m": 20.0},
            "current_weather": {"temperature_2m": 99.0}
        }));
        assert_eq!(weather.current.temperature_2m, Some(20.0));
    }

    #[test]
    fn test_short_metric_arrays_padded_to_time_axis() {
        let weather = normalize(&json!({
            "hourly": {
                "time": ["t0", "t1", "t2"],
                "temperature_2m": [25.0]
            }
        }));

        assert_eq!(weather.hourly.temperature_2m, vec![Some(25.0), None, None]);
        assert_eq!(weather.hourly.precipitation, vec![None, None, None]);
    }

    #[test]
    fn test_long_metric_arrays_truncated_to_time_axis() {
        let weather = normalize(&json!({
            "daily": {
                "time": ["2026-08-07"],
                "temperature_2m_max": [33.0, 34.0, 35.0]
            }
        }));

        assert_eq!(weather.daily.temperature_2m_max, vec![Some(33.0)]);
        assert_eq!(weather.daily.temperature_2m_min, vec![None]);
    }

    #[test]
    fn test_null_samples_survive() {
        let weather = normalize(&json!({
            "hourly": {
                "time": ["t0", "t1"],
                "precipitation": [null, 0.4]
            }
        }));
        assert_eq!(weather.hourly.precipitation, vec![None, Some(0.4)]);
    }

    #[test]
    fn test_unusable_section_degrades_to_empty() {
        let weather = normalize(&json!({
            "daily": "not an object"
        }));
        assert!(weather.daily.is_empty());
    }

    #[test]
    fn test_normalization_is_idempotent() {
        for raw in [
            full_response(),
            json!({}),
            json!({"current_weather": {"temperature_2m": 12.0}}),
            json!({"hourly": {"time": ["t0"], "temperature_2m": [1.0, 2.0]}}),
        ] {
            let once = normalize(&raw);
            let round_tripped = serde_json::to_value(&once).unwrap();
            let twice = normalize(&round_tripped);
            assert_eq!(once, twice);
        }
    }
}
