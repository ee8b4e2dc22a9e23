use regex::Regex;
use reqwest::Client;
use scraper::{Html, Selector};
use std::collections::HashSet;
use std::sync::OnceLock;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

/// Origin used to absolutize relative listing links.
const SITE_ORIGIN: &str = "https://www.mobile.bg";

/// Substring that marks an anchor href as a listing link.
const LISTING_PATH_MARKER: &str = "/obiava-";

/// Listings per result page. Only used to estimate the page count from the
/// first page's result counter, never to bound the crawl loop.
const PAGE_SIZE: usize = 20;

/// Case-insensitive markers identifying the next-page anchor inside the
/// pagination container ("напред" and "следваща" are the local words).
const NEXT_PAGE_MARKERS: [&str; 5] = ["next", "напред", ">", "»", "следваща"];

fn total_results_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"от общо (\d+)").unwrap())
}

/// What one result page yields: listing URLs in document order, the next-page
/// URL if the pagination container advertises one, and (first page only) the
/// total result count from the "1 - 20 от общо N" marker.
#[derive(Debug, Default)]
struct PageScan {
    listing_urls: Vec<String>,
    next_url: Option<String>,
    total_results: Option<usize>,
}

/// Turn an anchor href into an absolute listing URL. Already-absolute hrefs
/// pass through; protocol-relative get a scheme; root-relative get the site
/// origin; anything else is treated as relative to the site root.
pub fn normalize_listing_url(href: &str) -> String {
    if href.starts_with("http") {
        href.to_string()
    } else if href.starts_with("//") {
        format!("https:{href}")
    } else if href.starts_with('/') {
        format!("{SITE_ORIGIN}{href}")
    } else {
        format!("{SITE_ORIGIN}/{href}")
    }
}

fn scan_result_page(body: &str, first_page: bool) -> PageScan {
    let doc = Html::parse_document(body);
    let mut scan = PageScan::default();

    if first_page {
        let page_text: String = doc.root_element().text().collect::<Vec<_>>().join(" ");
        scan.total_results = total_results_re()
            .captures(&page_text)
            .and_then(|caps| caps.get(1))
            .and_then(|m| m.as_str().parse::<usize>().ok());
    }

    let anchor_sel = Selector::parse("a[href]").unwrap();
    for anchor in doc.select(&anchor_sel) {
        if let Some(href) = anchor.value().attr("href") {
            if href.contains(LISTING_PATH_MARKER) {
                scan.listing_urls.push(normalize_listing_url(href));
            }
        }
    }

    scan.next_url = find_next_page_url(&doc);
    scan
}

/// First anchor in the pagination container whose visible text or class
/// matches the next-page vocabulary wins.
fn find_next_page_url(doc: &Html) -> Option<String> {
    let pagination_sel = Selector::parse("div.pagination").unwrap();
    let anchor_sel = Selector::parse("a[href]").unwrap();

    let pagination = doc.select(&pagination_sel).next()?;
    for anchor in pagination.select(&anchor_sel) {
        let text = anchor.text().collect::<String>().trim().to_lowercase();
        let class = anchor.value().attr("class").unwrap_or("").to_lowercase();
        let is_next = NEXT_PAGE_MARKERS.iter().any(|marker| text.contains(marker))
            || class.contains("next");
        if is_next {
            if let Some(href) = anchor.value().attr("href") {
                return Some(normalize_listing_url(href));
            }
        }
    }
    None
}

/// Crawl result pages starting at `search_url` and return the deduplicated
/// set of listing URLs.
///
/// One attempt per page: any network error or non-200 status ends the crawl
/// and the links gathered from prior pages are returned as-is. After each
/// page the stop conditions run in order: page ceiling reached, no next-page
/// link, no new links on this page.
pub async fn collect_listing_links(
    client: &Client,
    search_url: &str,
    delay: Duration,
    max_pages: usize,
) -> HashSet<String> {
    let mut links: HashSet<String> = HashSet::new();
    let mut total_results: Option<usize> = None;
    let mut url = search_url.to_string();
    let mut page_num = 1usize;

    info!("Search URL: {search_url}");

    loop {
        info!("Fetching page {page_num}: {url}");

        let response = match client.get(url.as_str()).send().await {
            Ok(resp) => resp,
            Err(err) => {
                error!("Network error on page {page_num}: {err}");
                break;
            }
        };
        let status = response.status();
        if !status.is_success() {
            error!("Failed to fetch page {page_num}: HTTP {status}");
            break;
        }
        let body = match response.text().await {
            Ok(body) => body,
            Err(err) => {
                error!("Failed to read page {page_num}: {err}");
                break;
            }
        };

        let scan = scan_result_page(&body, page_num == 1);

        if page_num == 1 {
            total_results = scan.total_results;
            match total_results {
                Some(total) => {
                    let estimated_pages = total.div_ceil(PAGE_SIZE);
                    info!("Total results found: {total} cars");
                    info!("Estimated pages: {estimated_pages} (~{PAGE_SIZE} cars per page)");
                    info!(
                        "Estimated crawl time: ~{:.1}s",
                        estimated_pages as f64 * delay.as_secs_f64()
                    );
                }
                None => warn!("Could not extract total result count from first page"),
            }
        }

        let mut new_on_page = 0usize;
        for link in scan.listing_urls {
            if links.insert(link) {
                new_on_page += 1;
            }
        }

        if new_on_page > 0 {
            let progress = total_results
                .map(|total| links.len() as f64 / total as f64 * 100.0)
                .unwrap_or(0.0);
            info!("Page {page_num}: {new_on_page} new links ({progress:.1}% complete)");
        } else {
            warn!("Page {page_num}: no car links found");
        }

        if page_num >= max_pages {
            info!("Reached max pages limit ({max_pages}), stopping");
            break;
        }
        let Some(next_url) = scan.next_url else {
            info!("No more pages found, crawling complete");
            break;
        };
        if new_on_page == 0 {
            info!("No new links on page {page_num}, stopping");
            break;
        }

        debug!("Next page URL: {next_url}");
        url = next_url;
        page_num += 1;

        if !delay.is_zero() {
            sleep(delay).await;
        }
    }

    if links.is_empty() {
        error!("No car links collected");
    } else {
        info!("Link collection complete: {} unique links over {page_num} pages", links.len());
    }

    links
}
