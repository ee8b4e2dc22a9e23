use anyhow::{bail, Context, Result};
use std::env;

/// Typed crawl configuration, validated once at startup.
///
/// Filter values are kept as strings: they are URL path segments and query
/// values on the target site, not numbers we compute with.
#[derive(Debug, Clone)]
pub struct Config {
    pub base_url: String,
    pub general_type: String,
    pub brand: String,
    pub model: String,
    pub vehicle_type: String,
    pub fuel_type: String,
    pub min_price: String,
    pub max_price: String,
    pub min_engine_power: String,
    pub max_engine_power: String,
    pub output_path: String,
    pub delay_secs: f64,
    pub max_pages: usize,
}

impl Config {
    /// Read configuration from the process environment (after `dotenvy` has
    /// loaded the `.env` file).
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup. A missing or blank
    /// required key is a fatal configuration error.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let require = |key: &str| -> Result<String> {
            match lookup(key) {
                Some(val) if !val.trim().is_empty() => Ok(val.trim().to_string()),
                _ => bail!("missing required .env variable: {key}"),
            }
        };

        let base_url = require("BASE_URL")?;
        let general_type = require("GENERAL_TYPE")?;
        let brand = require("BRAND")?;
        let model = require("MODEL")?;
        let vehicle_type = require("VEHICLE_TYPE")?;
        let min_price = require("MIN_PRICE")?;
        let max_price = require("MAX_PRICE")?;
        let min_engine_power = require("MIN_ENGINE_POWER")?;
        let max_engine_power = require("MAX_ENGINE_POWER")?;
        let fuel_type = require("FUEL_TYPE")?;

        let output_path = lookup("OUTPUT_PATH")
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| "docs/car-data.csv".to_string());

        let delay_secs = match lookup("DELAY_SECS") {
            Some(val) => val
                .trim()
                .parse::<f64>()
                .with_context(|| format!("DELAY_SECS is not a number: {val}"))?,
            None => 0.5,
        };
        if delay_secs < 0.0 {
            bail!("DELAY_SECS must be >= 0, got {delay_secs}");
        }

        let max_pages = match lookup("MAX_PAGES") {
            Some(val) => val
                .trim()
                .parse::<usize>()
                .with_context(|| format!("MAX_PAGES is not a number: {val}"))?,
            None => 100,
        };
        if max_pages == 0 {
            bail!("MAX_PAGES must be >= 1");
        }

        Ok(Self {
            base_url,
            general_type,
            brand,
            model,
            vehicle_type,
            fuel_type,
            min_price,
            max_price,
            min_engine_power,
            max_engine_power,
            output_path,
            delay_secs,
            max_pages,
        })
    }
}
