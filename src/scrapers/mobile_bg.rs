use crate::models::CarListing;
use crate::scrapers::traits::ListingScraper;
use async_trait::async_trait;
use regex::Regex;
use reqwest::Client;
use scraper::{ElementRef, Html, Selector};
use std::sync::OnceLock;
use std::time::Duration;
use tracing::warn;

/// Known description containers, tried before the free-text fallback scan.
const DESCRIPTION_SELECTORS: [&str; 5] = [
    ".description",
    ".desc",
    ".car-description",
    ".ad-description",
    ".announcement-description",
];

/// Known extras/features containers, tried before the keyword fallback scan.
const EXTRAS_SELECTORS: [&str; 7] = [
    ".extras",
    ".features",
    ".car-extras",
    ".car-features",
    ".equipment",
    ".additional",
    ".options",
];

/// Currency/unit substrings that disqualify a text block as a description.
const UNIT_MARKERS: [&str; 5] = ["лв", "EUR", "к.с", "к.м", "см3"];

/// Navigation, menu and phone-prefix fragments (lower case) that mark a text
/// block as site chrome rather than listing prose.
const NAV_DENYLIST: [&str; 16] = [
    "tel:",
    "gsm:",
    "+359",
    "08",
    "mobile.bg",
    "категории в mobile",
    "автомобили и джипове",
    "бусове",
    "камиони",
    "област",
    "софия-град",
    "пловдив",
    "варна",
    "регистрация",
    "вход",
    "излез",
];

/// Car-feature vocabulary (lower case) for the extras fallback scan.
const FEATURE_KEYWORDS: [&str; 23] = [
    "климатик",
    "кондиционер",
    "abs",
    "esp",
    "airbag",
    "серво",
    "централно",
    "електрически",
    "кожа",
    "навигация",
    "cd",
    "mp3",
    "bluetooth",
    "webasto",
    "ксенон",
    "led",
    "халоген",
    "алуминиеви",
    "джанти",
    "металик",
    "перлен",
    "автоматик",
    "ръчна",
];

const DESCRIPTION_MAX_CHARS: usize = 800;
const EXTRAS_MAX_COUNT: usize = 15;

fn ad_suffix_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)Обява:.*").unwrap())
}

fn year_suffix_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\s*\d{4}\s*$").unwrap())
}

fn eur_price_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(\d+(?:\.\d+)?)€").unwrap())
}

fn bgn_price_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(\d+)лв").unwrap())
}

fn phone_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\d{10}").unwrap())
}

fn city_class_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"гр\.\s*([^,\n\s]+)").unwrap())
}

fn city_text_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"гр\.\s*([А-Яа-я]+)").unwrap())
}

/// Record field a label/value rule writes into.
#[derive(Debug, Clone, Copy)]
enum LabelField {
    FuelType,
    Engine,
    Transmission,
    Mileage,
    ProductionDate,
    Color,
}

/// One label-matching rule: bilingual keyword set plus target field.
struct LabelRule {
    keywords: &'static [&'static str],
    field: LabelField,
}

/// Rules for the flat label/value sequence (`mpLabel` + next sibling),
/// evaluated in order per label. Every field keeps its first captured value;
/// later matches never overwrite it.
const FLAT_LABEL_RULES: &[LabelRule] = &[
    LabelRule { keywords: &["двигател", "engine"], field: LabelField::FuelType },
    LabelRule { keywords: &["мощност", "power"], field: LabelField::Engine },
    LabelRule { keywords: &["скоростна", "transmission"], field: LabelField::Transmission },
    LabelRule { keywords: &["пробег", "mileage"], field: LabelField::Mileage },
    LabelRule { keywords: &["дата на производство"], field: LabelField::ProductionDate },
];

/// Rules for the two-column grid item blocks.
const GRID_LABEL_RULES: &[LabelRule] = &[
    LabelRule { keywords: &["цвят", "color"], field: LabelField::Color },
    LabelRule { keywords: &["дата на производство"], field: LabelField::ProductionDate },
];

fn set_field_once(record: &mut CarListing, field: LabelField, value: &str) {
    let slot = match field {
        LabelField::FuelType => &mut record.fuel_type,
        LabelField::Engine => &mut record.engine,
        LabelField::Transmission => &mut record.transmission,
        LabelField::Mileage => &mut record.mileage,
        LabelField::ProductionDate => &mut record.production_date,
        LabelField::Color => &mut record.color,
    };
    if slot.is_none() && !value.is_empty() {
        *slot = Some(value.to_string());
    }
}

fn element_text(el: ElementRef<'_>) -> String {
    el.text().collect::<String>().trim().to_string()
}

/// Brand = first token of the cleaned title, model = the remainder with a
/// trailing 4-digit year stripped.
fn parse_title(doc: &Html) -> (Option<String>, Option<String>) {
    let sel = Selector::parse("h1").unwrap();
    let Some(h1) = doc.select(&sel).next() else {
        return (None, None);
    };
    let raw = h1.text().collect::<String>();
    let cleaned = ad_suffix_re().replace(&raw, "");
    let cleaned = cleaned.split_whitespace().collect::<Vec<_>>().join(" ");

    let mut parts = cleaned.split_whitespace();
    let Some(brand) = parts.next() else {
        return (None, None);
    };
    let model_text = parts.collect::<Vec<_>>().join(" ");
    let model_text = year_suffix_re().replace(&model_text, "").trim().to_string();
    let model = (!model_text.is_empty()).then_some(model_text);
    (Some(brand.to_string()), model)
}

/// Euro and BGN amounts are matched independently on the whitespace-stripped
/// price text; a malformed amount in one currency never affects the other.
fn parse_price_text(text: &str) -> (Option<f64>, Option<i64>) {
    let compact: String = text.chars().filter(|c| !c.is_whitespace()).collect();
    let eur = eur_price_re()
        .captures(&compact)
        .and_then(|caps| caps[1].parse::<f64>().ok());
    let bgn = bgn_price_re()
        .captures(&compact)
        .and_then(|caps| caps[1].parse::<i64>().ok());
    (eur, bgn)
}

fn parse_prices(doc: &Html) -> (Option<f64>, Option<i64>) {
    let sel = Selector::parse("div.Price").unwrap();
    match doc.select(&sel).next() {
        Some(el) => parse_price_text(&el.text().collect::<String>()),
        None => (None, None),
    }
}

/// Flat pattern: each `mpLabel` element labels the next sibling element.
fn apply_flat_label_rules(doc: &Html, record: &mut CarListing) {
    let sel = Selector::parse("div.mpLabel").unwrap();
    for label in doc.select(&sel) {
        let label_text = element_text(label).to_lowercase();
        let Some(value_el) = label.next_siblings().find_map(ElementRef::wrap) else {
            continue;
        };
        let value = element_text(value_el);
        for rule in FLAT_LABEL_RULES {
            if rule.keywords.iter().any(|kw| label_text.contains(kw)) {
                set_field_once(record, rule.field, &value);
                break;
            }
        }
    }
}

/// Grid pattern: `item` blocks holding exactly two direct `div` children,
/// label on the left, value on the right.
fn apply_grid_label_rules(doc: &Html, record: &mut CarListing) {
    let sel = Selector::parse("div.item").unwrap();
    for item in doc.select(&sel) {
        let divs: Vec<ElementRef> = item
            .children()
            .filter_map(ElementRef::wrap)
            .filter(|el| el.value().name() == "div")
            .collect();
        if divs.len() != 2 {
            continue;
        }
        let label_text = element_text(divs[0]).to_lowercase();
        let value = element_text(divs[1]);
        for rule in GRID_LABEL_RULES {
            if rule.keywords.iter().any(|kw| label_text.contains(kw)) {
                set_field_once(record, rule.field, &value);
                break;
            }
        }
    }
}

/// First 10-digit run in the first element whose class mentions "phone".
fn parse_phone(doc: &Html) -> Option<String> {
    let sel = Selector::parse("*").unwrap();
    for el in doc.select(&sel) {
        let class = el.value().attr("class").unwrap_or("");
        if class.to_lowercase().contains("phone") {
            let digits: String = el
                .text()
                .collect::<String>()
                .chars()
                .filter(|c| !c.is_whitespace())
                .collect();
            return phone_re().find(&digits).map(|m| m.as_str().to_string());
        }
    }
    None
}

/// Structured markup first (elements with a location class), then a free-text
/// scan of every text node for the "гр. <City>" pattern.
fn parse_location(doc: &Html) -> Option<String> {
    let sel = Selector::parse("*").unwrap();
    for el in doc.select(&sel) {
        let class = el.value().attr("class").unwrap_or("").to_lowercase();
        if class.contains("location") {
            let text = el.text().collect::<String>();
            if let Some(caps) = city_class_re().captures(&text) {
                return Some(caps[1].trim().to_string());
            }
            break;
        }
    }

    for text in doc.root_element().text() {
        if text.contains("гр.") {
            if let Some(caps) = city_text_re().captures(text.trim()) {
                return Some(caps[1].trim().to_string());
            }
        }
    }
    None
}

/// Fallback filter for description candidates: long enough to be prose, not a
/// number, free of price/unit markers and site chrome, and not list-shaped
/// (too many commas for its length).
fn is_description_candidate(text: &str) -> bool {
    let chars = text.chars().count();
    if chars <= 50 {
        return false;
    }
    if text.chars().all(|c| c.is_ascii_digit()) {
        return false;
    }
    if UNIT_MARKERS.iter().any(|m| text.contains(m)) {
        return false;
    }
    let lower = text.to_lowercase();
    if NAV_DENYLIST.iter().any(|m| lower.contains(m)) {
        return false;
    }
    let commas = text.matches(',').count();
    (commas as f64) < chars as f64 / 20.0
}

fn parse_description(doc: &Html) -> Option<String> {
    let mut candidates: Vec<String> = Vec::new();

    for selector in DESCRIPTION_SELECTORS {
        let sel = Selector::parse(selector).unwrap();
        if let Some(el) = doc.select(&sel).next() {
            let text = element_text(el);
            if text.chars().count() > 30 {
                candidates.push(text);
            }
        }
    }

    if candidates.is_empty() {
        let sel = Selector::parse("div, p, span").unwrap();
        for el in doc.select(&sel) {
            let text = element_text(el);
            if is_description_candidate(&text) {
                candidates.push(text);
            }
        }
    }

    candidates
        .into_iter()
        .max_by_key(|text| text.chars().count())
        .map(|text| text.chars().take(DESCRIPTION_MAX_CHARS).collect())
}

/// Deduplicated, capped feature list. Known containers first; otherwise any
/// short element text containing a car-feature keyword.
fn parse_extras(doc: &Html) -> Vec<String> {
    let mut extras: Vec<String> = Vec::new();

    let item_sel = Selector::parse("li, span, div").unwrap();
    for selector in EXTRAS_SELECTORS {
        let sel = Selector::parse(selector).unwrap();
        if let Some(container) = doc.select(&sel).next() {
            for item in container.select(&item_sel) {
                let text = element_text(item);
                let chars = text.chars().count();
                if (5..=80).contains(&chars) {
                    extras.push(text);
                }
            }
        }
    }

    if extras.is_empty() {
        let sel = Selector::parse("li, span, div, p").unwrap();
        for el in doc.select(&sel) {
            let text = element_text(el);
            let lower = text.to_lowercase();
            let chars = text.chars().count();
            if (5..=80).contains(&chars)
                && FEATURE_KEYWORDS.iter().any(|kw| lower.contains(kw))
                && !lower.contains("лв")
                && !lower.contains("км")
            {
                extras.push(text);
            }
        }
    }

    let mut unique: Vec<String> = Vec::new();
    for extra in extras {
        if !unique.contains(&extra) && unique.len() < EXTRAS_MAX_COUNT {
            unique.push(extra);
        }
    }
    unique
}

/// Run the full extraction pipeline against one listing page. Stages are
/// independent: a stage that finds nothing leaves its field `None` and never
/// blocks later stages.
pub(crate) fn extract_from_html(html: &str, url: &str) -> CarListing {
    let doc = Html::parse_document(html);
    let mut record = CarListing::new(url);

    let (brand, model) = parse_title(&doc);
    record.brand = brand;
    record.model = model;

    let (price_eur, price_bgn) = parse_prices(&doc);
    record.price_eur = price_eur;
    record.price_bgn = price_bgn;

    apply_flat_label_rules(&doc, &mut record);
    apply_grid_label_rules(&doc, &mut record);

    record.phone = parse_phone(&doc);
    record.location = parse_location(&doc);
    record.description = parse_description(&doc);

    let extras = parse_extras(&doc);
    if !extras.is_empty() {
        record.extras = Some(extras.join(", "));
    }

    record
}

/// mobile.bg listing extractor.
pub struct MobileBgScraper {
    client: Client,
    timeout: Duration,
}

impl MobileBgScraper {
    /// The orchestrator shares one configured client across the collector
    /// and all extractors.
    pub fn with_client(client: Client) -> Self {
        Self {
            client,
            timeout: Duration::from_secs(10),
        }
    }
}

#[async_trait]
impl ListingScraper for MobileBgScraper {
    fn handles(&self, host: &str) -> bool {
        host.contains("mobile.bg")
    }

    fn site_name(&self) -> &'static str {
        "mobile.bg"
    }

    async fn extract(&self, url: &str) -> Option<CarListing> {
        let response = match self.client.get(url).timeout(self.timeout).send().await {
            Ok(resp) => resp,
            Err(err) => {
                warn!("Error fetching listing {url}: {err}");
                return None;
            }
        };
        let response = match response.error_for_status() {
            Ok(resp) => resp,
            Err(err) => {
                warn!("Listing {url} returned error status: {err}");
                return None;
            }
        };
        let html = match response.text().await {
            Ok(html) => html,
            Err(err) => {
                warn!("Error reading listing body {url}: {err}");
                return None;
            }
        };

        let record = extract_from_html(&html, url);
        if record.is_empty() {
            warn!("No fields extracted from {url}, treating as failed");
            return None;
        }
        Some(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LISTING_PAGE: &str = r#"
        <html><body>
          <h1>Opel Astra 1.7 CDTI Обява: 11566623</h1>
          <div class="Price">5 799 лв. 2 964.98 € История на цената</div>
          <div class="techData">
            <div class="mpLabel">Двигател</div>
            <div class="mpInfo">Дизелов</div>
            <div class="mpLabel">Мощност</div>
            <div class="mpInfo">101 к.с.</div>
            <div class="mpLabel">Скоростна кутия</div>
            <div class="mpInfo">Ръчна</div>
            <div class="mpLabel">Пробег</div>
            <div class="mpInfo">250 000 км</div>
            <div class="mpLabel">Дата на производство</div>
            <div class="mpInfo">май 2005</div>
          </div>
          <div class="item">
            <div>Цвят</div>
            <div>Сив</div>
          </div>
          <div class="item">
            <div>Дата на производство</div>
            <div>юли 2008</div>
          </div>
          <div class="sellerPhone">Тел: 0888 123 456</div>
          <div class="carLocation">гр. София, кв. Люлин</div>
          <div class="description">Колата е в отлично състояние и се поддържа редовно в сервиз.</div>
          <ul class="extras">
            <li>Климатик</li>
            <li>Навигация</li>
            <li>Кожен салон</li>
            <li>Климатик</li>
          </ul>
        </body></html>"#;

    #[test]
    fn extracts_full_record_from_listing_page() {
        let rec = extract_from_html(LISTING_PAGE, "https://www.mobile.bg/obiava-11566623");
        assert_eq!(rec.brand.as_deref(), Some("Opel"));
        assert_eq!(rec.model.as_deref(), Some("Astra 1.7 CDTI"));
        assert_eq!(rec.price_bgn, Some(5799));
        assert_eq!(rec.price_eur, Some(2964.98));
        assert_eq!(rec.fuel_type.as_deref(), Some("Дизелов"));
        assert_eq!(rec.engine.as_deref(), Some("101 к.с."));
        assert_eq!(rec.transmission.as_deref(), Some("Ръчна"));
        assert_eq!(rec.mileage.as_deref(), Some("250 000 км"));
        assert_eq!(rec.color.as_deref(), Some("Сив"));
        assert_eq!(rec.phone.as_deref(), Some("0888123456"));
        assert_eq!(rec.location.as_deref(), Some("София"));
        assert_eq!(rec.link, "https://www.mobile.bg/obiava-11566623");
        assert!(rec.description.as_deref().unwrap().starts_with("Колата е в отлично"));
    }

    #[test]
    fn production_date_first_match_wins_across_patterns() {
        // Flat pattern says май 2005, the grid block says юли 2008; the first
        // value captured must survive.
        let rec = extract_from_html(LISTING_PAGE, "https://www.mobile.bg/obiava-1");
        assert_eq!(rec.production_date.as_deref(), Some("май 2005"));
    }

    #[test]
    fn grid_production_date_used_when_flat_pattern_absent() {
        let html = r#"
            <div class="item"><div>Дата на производство</div><div>юли 2008</div></div>"#;
        let rec = extract_from_html(html, "https://www.mobile.bg/obiava-1");
        assert_eq!(rec.production_date.as_deref(), Some("юли 2008"));
    }

    #[test]
    fn extraction_is_idempotent() {
        let first = extract_from_html(LISTING_PAGE, "https://www.mobile.bg/obiava-1");
        let mut second = extract_from_html(LISTING_PAGE, "https://www.mobile.bg/obiava-1");
        // Only the capture timestamp may differ between two runs.
        second.scraped_at = first.scraped_at;
        assert_eq!(first, second);
    }

    #[test]
    fn title_year_suffix_is_stripped_from_model() {
        let html = "<h1>VW Golf 2008</h1>";
        let rec = extract_from_html(html, "https://www.mobile.bg/obiava-1");
        assert_eq!(rec.brand.as_deref(), Some("VW"));
        assert_eq!(rec.model.as_deref(), Some("Golf"));
    }

    #[test]
    fn prices_parse_independently() {
        let (eur, bgn) = parse_price_text("5 799 лв. 2 964.98 €");
        assert_eq!(bgn, Some(5799));
        assert_eq!(eur, Some(2964.98));

        // Malformed euro segment leaves only the BGN amount.
        let (eur, bgn) = parse_price_text("цена € 5 799 лв.");
        assert_eq!(eur, None);
        assert_eq!(bgn, Some(5799));

        // And the other way around.
        let (eur, bgn) = parse_price_text("2 964.98 € лв.");
        assert_eq!(eur, Some(2964.98));
        assert_eq!(bgn, None);
    }

    #[test]
    fn missing_price_block_leaves_both_prices_empty() {
        let rec = extract_from_html("<h1>Opel Astra</h1>", "https://www.mobile.bg/obiava-1");
        assert_eq!(rec.price_eur, None);
        assert_eq!(rec.price_bgn, None);
    }

    #[test]
    fn location_falls_back_to_free_text_scan() {
        let html = r#"<div><p>Автомобилът се намира в гр. Пловдив до центъра</p></div>"#;
        let rec = extract_from_html(html, "https://www.mobile.bg/obiava-1");
        assert_eq!(rec.location.as_deref(), Some("Пловдив"));
    }

    #[test]
    fn description_candidate_filter_accepts_prose_and_rejects_noise() {
        assert!(is_description_candidate(
            "Добре поддържана кола с климатик и редовни смени на масло и филтри всяка година"
        ));
        // Too short and purely numeric.
        assert!(!is_description_candidate("123456789012"));
        // Currency marker.
        assert!(!is_description_candidate(
            "Страхотна оферта само сега за 5 799 лв при посещение на място в автокъщата"
        ));
        // Comma-heavy list-like text.
        assert!(!is_description_candidate(
            "а, б, в, г, д, е, ж, з, и, к, л, м, н, о, п, р, с, т, у, ф"
        ));
    }

    #[test]
    fn description_fallback_keeps_longest_candidate() {
        let html = r#"
            <html><body>
              <p>Кратък текст без особено съдържание тук но достатъчно дълъг да мине</p>
              <p>Това е значително по-дългото описание на автомобила което трябва да бъде избрано защото е най-дългият смислен текст на страницата</p>
            </body></html>"#;
        let rec = extract_from_html(html, "https://www.mobile.bg/obiava-1");
        let desc = rec.description.unwrap();
        assert!(desc.starts_with("Това е значително"));
    }

    #[test]
    fn description_is_capped_at_max_length() {
        let long_text = "дълго описание на автомобила ".repeat(60);
        let html = format!(r#"<div class="description">{long_text}</div>"#);
        let rec = extract_from_html(&html, "https://www.mobile.bg/obiava-1");
        assert_eq!(rec.description.unwrap().chars().count(), DESCRIPTION_MAX_CHARS);
    }

    #[test]
    fn extras_container_is_deduplicated_in_order() {
        let rec = extract_from_html(LISTING_PAGE, "https://www.mobile.bg/obiava-1");
        assert_eq!(rec.extras.as_deref(), Some("Климатик, Навигация, Кожен салон"));
    }

    #[test]
    fn extras_fallback_matches_feature_keywords() {
        let html = r#"
            <html><body>
              <span>Климатик, ABS, Навигация</span>
              <span>Климатик, ABS, Навигация</span>
              <span>без значение</span>
            </body></html>"#;
        let rec = extract_from_html(html, "https://www.mobile.bg/obiava-1");
        assert_eq!(rec.extras.as_deref(), Some("Климатик, ABS, Навигация"));
    }

    #[test]
    fn extras_capped_at_maximum_count() {
        let items: String = (0..30)
            .map(|i| format!("<li>Климатик вариант {i}</li>"))
            .collect();
        let html = format!(r#"<ul class="extras">{items}</ul>"#);
        let rec = extract_from_html(&html, "https://www.mobile.bg/obiava-1");
        let extras = rec.extras.unwrap();
        assert_eq!(extras.split(", ").count(), EXTRAS_MAX_COUNT);
    }

    #[test]
    fn unknown_markup_yields_empty_record() {
        let rec = extract_from_html("<html><body><nav>меню</nav></body></html>", "https://www.mobile.bg/obiava-1");
        assert!(rec.is_empty());
        assert_eq!(rec.link, "https://www.mobile.bg/obiava-1");
    }

    #[test]
    fn scraper_handles_only_its_host() {
        let scraper = MobileBgScraper::with_client(Client::new());
        assert!(scraper.handles("www.mobile.bg"));
        assert!(scraper.handles("mobile.bg"));
        assert!(!scraper.handles("www.cars.bg"));
    }

    /// Serve one listing page on an ephemeral local port and return its URL.
    async fn serve_listing(body: &'static str) -> String {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            if let Ok((mut stream, _)) = listener.accept().await {
                let mut buf = [0u8; 1024];
                let _ = stream.read(&mut buf).await;
                let response = format!(
                    "HTTP/1.1 200 OK\r\nContent-Type: text/html; charset=utf-8\r\n\
                     Content-Length: {}\r\nConnection: close\r\n\r\n{body}",
                    body.len()
                );
                let _ = stream.write_all(response.as_bytes()).await;
            }
        });
        format!("http://{addr}/obiava-1")
    }

    #[tokio::test]
    async fn extraction_matching_no_fields_is_a_failure() {
        let url = serve_listing("<html><body><nav>меню</nav></body></html>").await;
        let scraper = MobileBgScraper::with_client(Client::new());
        assert!(scraper.extract(&url).await.is_none());
    }

    #[tokio::test]
    async fn extraction_with_matching_fields_succeeds_over_http() {
        let url = serve_listing(LISTING_PAGE).await;
        let scraper = MobileBgScraper::with_client(Client::new());
        let rec = scraper.extract(&url).await.expect("record should be kept");
        assert_eq!(rec.price_bgn, Some(5799));
        assert!(!rec.is_empty());
    }
}
