use crate::config::Config;
use anyhow::{bail, Context, Result};
use reqwest::Client;
use reqwest::StatusCode;
use tracing::{error, info, warn};

/// Path segments the site accepts for the vehicle-type position.
const KNOWN_VEHICLE_TYPES: &str = "van, kabrio, kombi, dzhip, sedan, hechbek, minivan";
/// Path segments the site accepts for the fuel-type position.
const KNOWN_FUEL_TYPES: &str = "dizelov, benzinov, hibriden, elektricheski";

/// Phrases the site renders when a search matches nothing.
const NO_RESULTS_MARKERS: [&str; 2] = ["Няма намерени обяви", "No ads found"];

/// Search filters for one crawl run.
#[derive(Debug, Clone)]
pub struct SearchParams {
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
}

impl SearchParams {
    pub fn from_config(cfg: &Config) -> Self {
        Self {
            base_url: cfg.base_url.clone(),
            general_type: cfg.general_type.clone(),
            brand: cfg.brand.clone(),
            model: cfg.model.clone(),
            vehicle_type: cfg.vehicle_type.clone(),
            fuel_type: cfg.fuel_type.clone(),
            min_price: cfg.min_price.clone(),
            max_price: cfg.max_price.clone(),
            min_engine_power: cfg.min_engine_power.clone(),
            max_engine_power: cfg.max_engine_power.clone(),
        }
    }

    /// Build the site search URL. Segment order and query-parameter names are
    /// the external contract with the site and must not be reordered.
    pub fn build_search_url(&self) -> String {
        format!(
            "{}/{}/{}/{}/{}/{}?price={}&price1={}&engine_power={}&engine_power1={}",
            self.base_url,
            self.general_type,
            self.brand,
            self.model,
            self.vehicle_type,
            self.fuel_type,
            self.min_price,
            self.max_price,
            self.min_engine_power,
            self.max_engine_power,
        )
    }
}

/// Pre-flight check that the search URL resolves to a results page.
///
/// Runs once before the crawl; any failure here terminates the run, so the
/// error messages spell out what to fix in the configuration.
pub async fn validate_search_url(client: &Client, url: &str) -> Result<()> {
    info!("Validating search URL: {url}");

    let response = client
        .get(url)
        .send()
        .await
        .with_context(|| format!("network error while validating search URL {url}"))?;

    let status = response.status();
    if status == StatusCode::NOT_FOUND {
        error!("Search URL returns 404 - invalid brand/model/vehicle type combination");
        error!("Check that the brand and model exist on the site");
        error!("Valid vehicle types: {KNOWN_VEHICLE_TYPES}");
        error!("Valid fuel types: {KNOWN_FUEL_TYPES}");
        bail!(
            "search URL returned 404; check brand/model and that vehicle type is one of \
             [{KNOWN_VEHICLE_TYPES}] and fuel type one of [{KNOWN_FUEL_TYPES}]"
        );
    }
    if !status.is_success() {
        bail!("search URL validation failed with status {status}: {url}");
    }

    let body = response
        .text()
        .await
        .context("failed to read validation response body")?;
    if NO_RESULTS_MARKERS.iter().any(|m| body.contains(m)) {
        warn!("No results found for this search configuration");
        bail!("search matched no listings; try widening the price or engine power range");
    }

    info!("Search URL validation successful");
    Ok(())
}
