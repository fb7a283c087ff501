//! Shared row types exchanged with the hosted database and upstream APIs.
//!
//! These mirror the remote tables (`pages`, `reviews`, `availability_slots`,
//! `booking_intents`). The crate does not own their schema: unknown columns
//! are ignored on read and optional columns default to `None`.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A row of the `pages` table.
///
/// Identity is `(language, slug)`. `component_key` points back at the route
/// the page was generated from and survives manual slug edits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageRow {
    pub id: String,
    pub slug: String,
    #[serde(default)]
    pub component_key: Option<String>,
    pub language: String,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub meta_title: Option<String>,
    #[serde(default)]
    pub meta_description: Option<String>,
    #[serde(default)]
    pub og_image: Option<String>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

/// Body of a page insert. Editors fill in SEO fields later.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewPage {
    pub slug: String,
    pub component_key: String,
    pub language: String,
    pub category: String,
    pub status: String,
    pub title: String,
}

/// Body of a legacy-row adoption: only the key is written, never the slug.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PagePatch {
    pub id: String,
    pub component_key: String,
}

/// Content type of a review, taken verbatim from the `review_type` column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewType {
    Video,
    BeforeAfter,
    Static,
}

impl fmt::Display for ReviewType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ReviewType::Video => "video",
            ReviewType::BeforeAfter => "before_after",
            ReviewType::Static => "static",
        };
        f.write_str(label)
    }
}

/// A row of the `reviews` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Review {
    pub id: String,
    pub review_type: ReviewType,
    #[serde(default)]
    pub is_featured: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quote: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rating: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub video_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thumbnail_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub before_image_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub after_image_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
}

/// `(service type, location)` pair namespacing bookable offerings.
///
/// Rendered and parsed as `type:location`, e.g. `consult:amsterdam`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ServiceKey {
    pub service_type: String,
    pub location: String,
}

impl ServiceKey {
    pub fn new(service_type: impl Into<String>, location: impl Into<String>) -> Self {
        Self {
            service_type: service_type.into(),
            location: location.into(),
        }
    }
}

impl fmt::Display for ServiceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.service_type, self.location)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidServiceKey(pub String);

impl fmt::Display for InvalidServiceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid service key '{}', expected type:location", self.0)
    }
}

impl std::error::Error for InvalidServiceKey {}

impl FromStr for ServiceKey {
    type Err = InvalidServiceKey;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once(':') {
            Some((kind, location)) if !kind.is_empty() && !location.is_empty() => {
                Ok(Self::new(kind, location))
            }
            _ => Err(InvalidServiceKey(s.to_string())),
        }
    }
}

/// Cached copy of one day of upstream availability, keyed by
/// `(service_key, date, staff_id)` in the `availability_slots` table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AvailabilityRow {
    pub service_key: String,
    pub date: NaiveDate,
    pub staff_id: String,
    pub time_slots: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntentStatus {
    Pending,
    /// The appointment call has been made; the booking id may not be stored.
    Booking,
    Confirmed,
    Failed,
}

/// A checkout in progress, stored before redirecting to the payment page and
/// looked up again by `session_id` when the customer returns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BookingIntent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub session_id: String,
    pub service_key: String,
    pub staff_id: String,
    pub date: NaiveDate,
    pub time: String,
    pub customer_name: String,
    pub customer_email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub customer_phone: Option<String>,
    pub language: String,
    pub status: IntentStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub booking_id: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn service_key_roundtrips_through_display() {
        let key: ServiceKey = "consult:amsterdam".parse().unwrap();
        assert_eq!(key, ServiceKey::new("consult", "amsterdam"));
        assert_eq!(key.to_string(), "consult:amsterdam");
    }

    #[test]
    fn service_key_rejects_missing_location() {
        assert!("consult".parse::<ServiceKey>().is_err());
        assert!("consult:".parse::<ServiceKey>().is_err());
        assert!(":amsterdam".parse::<ServiceKey>().is_err());
    }

    #[test]
    fn page_row_tolerates_missing_optional_columns() {
        let json = r#"{"id":"7","slug":"nl/over-ons","language":"nl","extra":1}"#;
        let row: PageRow = serde_json::from_str(json).unwrap();
        assert_eq!(row.component_key, None);
        assert_eq!(row.status, None);
    }

    #[test]
    fn review_type_uses_snake_case() {
        let review: Review =
            serde_json::from_str(r#"{"id":"r1","review_type":"before_after"}"#).unwrap();
        assert_eq!(review.review_type, ReviewType::BeforeAfter);
        assert!(!review.is_featured);
        assert_eq!(review.review_type.to_string(), "before_after");
    }
}
