use std::time::Duration;

use anyhow::Result;

fn main() -> Result<()> {
    // Initialize core
    stratus_core::init()?;

    let (config, _validation) = stratus_core::Config::load_validated()?;

    let cache_path = config.config_dir.join("cache.db");
    let store = stratus_store::CacheStore::open(&cache_path)?;

    // Bound cache growth on startup
    let max_age = Duration::from_secs(u64::from(config.cache.sweep_max_age_days) * 24 * 60 * 60);
    let removed = store.sweep(max_age);

    tracing::info!("Stratus data core started");

    println!("Stratus - Offline-first Weather Data Core");
    println!("\nConfiguration:");
    println!("  Config directory: {}", config.config_dir.display());
    println!("  Cache database:   {}", cache_path.display());
    println!("  Forecast API:     {}", config.api.forecast_url);
    println!("  Locations API:    {}", config.api.locations_url);
    println!("  Swept {} expired cache entries", removed);

    Ok(())
}
