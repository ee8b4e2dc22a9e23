pub mod collector;
pub mod mobile_bg;
pub mod traits;
pub mod types;

pub use collector::collect_listing_links;
pub use mobile_bg::MobileBgScraper;
pub use traits::ListingScraper;

use crate::models::CarListing;
use tracing::warn;
use url::Url;

/// Route one listing URL to the scraper responsible for its host. An
/// unrecognized host yields no record and no fetch.
pub async fn extract_listing(
    scrapers: &[Box<dyn ListingScraper>],
    url: &str,
) -> Option<CarListing> {
    let host = match Url::parse(url) {
        Ok(parsed) => match parsed.host_str() {
            Some(host) => host.to_lowercase(),
            None => {
                warn!("Listing URL has no host: {url}");
                return None;
            }
        },
        Err(err) => {
            warn!("Skipping malformed listing URL {url}: {err}");
            return None;
        }
    };

    match scrapers.iter().find(|scraper| scraper.handles(&host)) {
        Some(scraper) => scraper.extract(url).await,
        None => {
            warn!("Unsupported site for URL: {url}");
            None
        }
    }
}
