use crate::models::CarListing;
use async_trait::async_trait;

/// Common trait for site-specific listing extractors
/// This allows easy addition of new classifieds sites next to mobile.bg
#[async_trait]
pub trait ListingScraper: Send + Sync {
    /// Whether this scraper understands listings hosted on `host`
    fn handles(&self, host: &str) -> bool;

    /// Fetch one listing page and run the extraction pipeline. Network and
    /// parse failures yield `None` and never abort the surrounding crawl
    async fn extract(&self, url: &str) -> Option<CarListing>;

    /// Get the name of the scraper source
    fn site_name(&self) -> &'static str;
}
