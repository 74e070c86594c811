use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use url::Url;

/// Configuration validation errors
#[derive(Debug, Clone)]
pub struct ConfigValidationError {
    pub field: String,
    pub message: String,
}

impl std::fmt::Display for ConfigValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Result of config validation
#[derive(Debug, Clone, Default)]
pub struct ValidationResult {
    pub errors: Vec<ConfigValidationError>,
    pub warnings: Vec<ConfigValidationError>,
}

impl ValidationResult {
    /// Returns true if there are no errors (warnings are OK)
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    /// Add an error
    pub fn add_error(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.errors.push(ConfigValidationError {
            field: field.into(),
            message: message.into(),
        });
    }

    /// Add a warning
    pub fn add_warning(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.warnings.push(ConfigValidationError {
            field: field.into(),
            message: message.into(),
        });
    }

    /// Get a user-friendly message summarizing all errors
    pub fn error_summary(&self) -> String {
        if self.errors.is_empty() {
            return String::new();
        }
        self.errors
            .iter()
            .map(|e| e.to_string())
            .collect::<Vec<_>>()
            .join("; ")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Application configuration directory
    pub config_dir: PathBuf,

    /// Timezone used when a location doesn't carry one
    #[serde(default = "default_timezone")]
    pub default_timezone: String,

    /// Upstream service endpoints
    pub api: ApiConfig,

    /// Local cache settings
    #[serde(default)]
    pub cache: CacheConfig,

    /// Weather feed settings
    #[serde(default)]
    pub feed: FeedConfig,
}

fn default_timezone() -> String {
    "Asia/Bangkok".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Base URL of the forecast service (Open-Meteo compatible)
    pub forecast_url: String,

    /// Base URL of the locations backend
    pub locations_url: String,

    /// Base URL of the reverse-geocoding service
    pub geocode_url: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            forecast_url: "https://api.open-meteo.com/v1".to_string(),
            locations_url: "http://localhost:8008".to_string(),
            geocode_url: "https://nominatim.openstreetmap.org".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Entries older than this many days are purged by the sweeper
    #[serde(default = "default_sweep_max_age_days")]
    pub sweep_max_age_days: u32,

    /// Cached daily series younger than this many hours are served without
    /// a refetch on the comparison path
    #[serde(default = "default_daily_fresh_hours")]
    pub daily_fresh_hours: u32,
}

fn default_sweep_max_age_days() -> u32 {
    30
}

fn default_daily_fresh_hours() -> u32 {
    3
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            sweep_max_age_days: default_sweep_max_age_days(),
            daily_fresh_hours: default_daily_fresh_hours(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedConfig {
    /// Background revalidation interval in minutes
    #[serde(default = "default_refresh_minutes")]
    pub refresh_minutes: u32,

    /// Retries after the initial attempt on a failed upstream call
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Initial backoff delay in milliseconds (doubles each attempt)
    #[serde(default = "default_retry_base_ms")]
    pub retry_base_ms: u64,
}

fn default_refresh_minutes() -> u32 {
    30
}

fn default_max_retries() -> u32 {
    2
}

fn default_retry_base_ms() -> u64 {
    300
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            refresh_minutes: default_refresh_minutes(),
            max_retries: default_max_retries(),
            retry_base_ms: default_retry_base_ms(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        let config_dir = dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("stratus");

        Self {
            config_dir,
            default_timezone: default_timezone(),
            api: ApiConfig::default(),
            cache: CacheConfig::default(),
            feed: FeedConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from file, creating default if it doesn't exist
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path()?;

        if !config_path.exists() {
            let config = Self::default();
            config.save()?;
            return Ok(config);
        }

        let contents =
            std::fs::read_to_string(&config_path).context("Failed to read config file")?;

        let config: Config = toml::from_str(&contents).context("Failed to parse config file")?;

        Ok(config)
    }

    /// Load configuration and validate it
    ///
    /// Returns the config along with any validation warnings.
    /// Returns an error if validation fails with critical errors.
    pub fn load_validated() -> Result<(Self, ValidationResult)> {
        let config = Self::load()?;
        let validation = config.validate();

        if !validation.is_valid() {
            anyhow::bail!(
                "Configuration validation failed: {}",
                validation.error_summary()
            );
        }

        if !validation.warnings.is_empty() {
            for warning in &validation.warnings {
                tracing::warn!("Config warning: {}", warning);
            }
        }

        Ok((config, validation))
    }

    /// Validate the configuration
    ///
    /// Returns a ValidationResult containing any errors or warnings.
    pub fn validate(&self) -> ValidationResult {
        let mut result = ValidationResult::default();

        self.validate_url(&self.api.forecast_url, "api.forecast_url", &mut result);
        self.validate_url(&self.api.locations_url, "api.locations_url", &mut result);
        self.validate_url(&self.api.geocode_url, "api.geocode_url", &mut result);

        if self.cache.sweep_max_age_days == 0 {
            result.add_error(
                "cache.sweep_max_age_days",
                "Sweep max age must be greater than 0",
            );
        }

        if self.cache.daily_fresh_hours == 0 {
            result.add_warning(
                "cache.daily_fresh_hours",
                "Daily freshness window disabled (0 hours) - every comparison refetches",
            );
        }

        if self.feed.refresh_minutes == 0 {
            result.add_warning(
                "feed.refresh_minutes",
                "Background refresh disabled (0 minutes)",
            );
        } else if self.feed.refresh_minutes > 1440 {
            result.add_warning(
                "feed.refresh_minutes",
                "Refresh interval is more than 24 hours",
            );
        }

        if self.feed.max_retries > 10 {
            result.add_warning("feed.max_retries", "Unusually large retry budget (>10)");
        }

        if self.default_timezone.is_empty() {
            result.add_error("default_timezone", "Default timezone must not be empty");
        }

        result
    }

    /// Validate a URL field
    fn validate_url(&self, url_str: &str, field_name: &str, result: &mut ValidationResult) {
        match Url::parse(url_str) {
            Ok(url) => {
                // Check scheme
                if url.scheme() != "http" && url.scheme() != "https" {
                    result.add_error(
                        field_name,
                        format!("URL must use http or https scheme, got: {}", url.scheme()),
                    );
                }

                // Check host
                if url.host().is_none() {
                    result.add_error(field_name, "URL must have a host");
                }

                if let Some(port) = url.port() {
                    if port == 0 {
                        result.add_error(field_name, "Port cannot be 0");
                    }
                }
            }
            Err(e) => {
                result.add_error(field_name, format!("Invalid URL: {}", e));
            }
        }
    }

    /// Save configuration to file
    pub fn save(&self) -> Result<()> {
        let config_path = Self::config_path()?;

        // Ensure config directory exists
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent).context("Failed to create config directory")?;
        }

        let contents = toml::to_string_pretty(self).context("Failed to serialize config")?;

        std::fs::write(&config_path, contents).context("Failed to write config file")?;

        Ok(())
    }

    /// Get the path to the configuration file
    fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .context("Failed to get config directory")?
            .join("stratus");

        Ok(config_dir.join("config.toml"))
    }
}
