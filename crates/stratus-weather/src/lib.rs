//! Weather data core for Stratus
//!
//! Offline-first access to forecast data: cached reads served immediately,
//! silent background revalidation, bounded-retry upstream fetches, and
//! local fallbacks for the locations and geocoding services.

pub mod compare;
pub mod feed;
pub mod forecast;
pub mod geocode;
pub mod locations;
pub mod normalize;
pub mod types;

pub use compare::{compare_daily, daily_series, CompareRange, DAILY_FRESH_FOR};
pub use feed::{FeedError, FeedOptions, FetchState, WeatherFeed};
pub use forecast::ForecastClient;
pub use geocode::{reverse_geocode, GeocodedPlace};
pub use locations::{LocationService, NewLocation};
pub use normalize::normalize;
pub use types::*;
