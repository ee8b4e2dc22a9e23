mod config;
mod export;
mod models;
mod scrapers;

use anyhow::Context;
use config::Config;
use models::CarListing;
use reqwest::Client;
use scrapers::types::{validate_search_url, SearchParams};
use scrapers::{collect_listing_links, extract_listing, ListingScraper, MobileBgScraper};
use std::time::{Duration, Instant};
use tokio::time::sleep;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging, RUST_LOG overrides the info default
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    dotenvy::dotenv().ok();
    let cfg = Config::from_env()?;

    info!("Car Scout - mobile.bg crawler");
    info!("Session started at {}", chrono::Local::now().format("%Y-%m-%d %H:%M:%S"));
    info!(
        "Arguments: delay={}s, max_pages={}, output={}",
        cfg.delay_secs, cfg.max_pages, cfg.output_path
    );

    let client = Client::builder()
        .timeout(Duration::from_secs(30))
        .user_agent(USER_AGENT)
        .build()
        .context("Failed to create HTTP client")?;

    let params = SearchParams::from_config(&cfg);
    let search_url = params.build_search_url();
    info!(
        "Search criteria: {} {} ({}), fuel {}, price {}-{} BGN, power {}-{} hp",
        cfg.brand,
        cfg.model,
        cfg.vehicle_type,
        cfg.fuel_type,
        cfg.min_price,
        cfg.max_price,
        cfg.min_engine_power,
        cfg.max_engine_power,
    );

    validate_search_url(&client, &search_url).await?;

    let delay = Duration::from_secs_f64(cfg.delay_secs);
    let links = collect_listing_links(&client, &search_url, delay, cfg.max_pages).await;
    if links.is_empty() {
        error!("No car links found. Exiting.");
        return Ok(());
    }

    let scrapers: Vec<Box<dyn ListingScraper>> =
        vec![Box::new(MobileBgScraper::with_client(client.clone()))];
    for scraper in &scrapers {
        debug!("Registered extractor for {}", scraper.site_name());
    }

    let total = links.len();
    info!("Starting data extraction for {total} listings");

    let started = Instant::now();
    let mut cars: Vec<CarListing> = Vec::new();
    let mut interrupted = false;

    for (i, link) in links.iter().enumerate() {
        let n = i + 1;
        if n % 10 == 1 || n == total {
            info!("[{n}/{total}] ({:.1}%) processing", n as f64 / total as f64 * 100.0);
        }
        debug!("[{n}/{total}] extracting {link}");

        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                warn!("Crawling interrupted, keeping {} extracted records", cars.len());
                interrupted = true;
            }
            record = extract_listing(&scrapers, link) => {
                match record {
                    Some(rec) => cars.push(rec),
                    None => warn!("Failed to extract data from {link}"),
                }
            }
        }
        if interrupted {
            break;
        }

        if !delay.is_zero() {
            sleep(delay).await;
        }
    }

    let elapsed = started.elapsed().as_secs_f64();
    let success = cars.len();
    let failed = total - success;
    info!(
        "Extraction complete: {success} ok, {failed} failed ({:.1}% success) in {elapsed:.1}s",
        success as f64 / total as f64 * 100.0
    );

    if cars.is_empty() {
        error!("No car data extracted successfully.");
        return Ok(());
    }

    let prices: Vec<i64> = cars.iter().filter_map(|car| car.price_bgn).collect();
    if let (Some(min), Some(max)) = (prices.iter().min(), prices.iter().max()) {
        let avg = prices.iter().sum::<i64>() as f64 / prices.len() as f64;
        info!(
            "Price analysis: {}/{} cars with BGN price, avg {avg:.0}, min {min}, max {max}",
            prices.len(),
            cars.len()
        );
    }

    export::export_to_csv(&cars, &cfg.output_path)?;
    info!("Done: {} records saved to {}", cars.len(), cfg.output_path);

    Ok(())
}
