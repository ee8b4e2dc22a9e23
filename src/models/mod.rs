use chrono::{DateTime, Utc};
use serde::Serialize;

/// Column order of the tabular export. The serde renames on [`CarListing`]
/// must stay in lockstep with this list.
pub const HEADERS: [&str; 15] = [
    "Brand",
    "Model",
    "Production Date",
    "Price_EUR",
    "Price_BGN",
    "Engine",
    "Fuel Type",
    "Transmission",
    "Mileage",
    "Color",
    "Location",
    "Phone",
    "Link",
    "Description",
    "Car Extras",
];

/// One extracted car listing.
///
/// Every field except `link` is optional: each extraction stage populates its
/// own field independently and leaves it `None` when the markup it expects is
/// absent. Field declaration order is the export column order; the capture
/// timestamp stays out of the export.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CarListing {
    #[serde(rename = "Brand")]
    pub brand: Option<String>,
    #[serde(rename = "Model")]
    pub model: Option<String>,
    #[serde(rename = "Production Date")]
    pub production_date: Option<String>,
    #[serde(rename = "Price_EUR")]
    pub price_eur: Option<f64>,
    #[serde(rename = "Price_BGN")]
    pub price_bgn: Option<i64>,
    #[serde(rename = "Engine")]
    pub engine: Option<String>,
    #[serde(rename = "Fuel Type")]
    pub fuel_type: Option<String>,
    #[serde(rename = "Transmission")]
    pub transmission: Option<String>,
    #[serde(rename = "Mileage")]
    pub mileage: Option<String>,
    #[serde(rename = "Color")]
    pub color: Option<String>,
    #[serde(rename = "Location")]
    pub location: Option<String>,
    #[serde(rename = "Phone")]
    pub phone: Option<String>,
    #[serde(rename = "Link")]
    pub link: String,
    #[serde(rename = "Description")]
    pub description: Option<String>,
    #[serde(rename = "Car Extras")]
    pub extras: Option<String>,
    #[serde(skip_serializing)]
    pub scraped_at: DateTime<Utc>,
}

impl CarListing {
    /// Fresh record for one listing URL, all fields unpopulated.
    pub fn new(link: impl Into<String>) -> Self {
        Self {
            brand: None,
            model: None,
            production_date: None,
            price_eur: None,
            price_bgn: None,
            engine: None,
            fuel_type: None,
            transmission: None,
            mileage: None,
            color: None,
            location: None,
            phone: None,
            link: link.into(),
            description: None,
            extras: None,
            scraped_at: Utc::now(),
        }
    }

    /// A record where no extraction stage matched anything is treated as a
    /// failed extraction by callers, even though the link itself is set.
    pub fn is_empty(&self) -> bool {
        self.brand.is_none()
            && self.model.is_none()
            && self.production_date.is_none()
            && self.price_eur.is_none()
            && self.price_bgn.is_none()
            && self.engine.is_none()
            && self.fuel_type.is_none()
            && self.transmission.is_none()
            && self.mileage.is_none()
            && self.color.is_none()
            && self.location.is_none()
            && self.phone.is_none()
            && self.description.is_none()
            && self.extras.is_none()
    }
}
