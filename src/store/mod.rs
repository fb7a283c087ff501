//! Access to the hosted database tables.
//!
//! Each table the crate touches gets a small trait so the pure logic can be
//! exercised against [`MemoryDatabase`] while production code talks to
//! [`SupabaseClient`]. Both implement every trait.
//!
//! | Trait | Table | Used by |
//! |-------|-------|---------|
//! | [`PageStore`] | `pages` | [`crate::sync`] |
//! | [`ReviewStore`] | `reviews` | [`crate::grid`] callers |
//! | [`SlotStore`] | `availability_slots` | [`crate::availability`], [`crate::booking`] |
//! | [`IntentStore`] | `booking_intents` | [`crate::booking`] |

mod memory;
mod supabase;

pub use memory::MemoryDatabase;
pub use supabase::SupabaseClient;

use crate::http::UpstreamError;
use crate::types::{
    AvailabilityRow, BookingIntent, IntentStatus, NewPage, PagePatch, PageRow, Review,
};
use async_trait::async_trait;
use chrono::NaiveDate;

#[async_trait]
pub trait PageStore: Send + Sync {
    /// Every row of the pages table.
    async fn fetch_pages(&self) -> Result<Vec<PageRow>, UpstreamError>;

    /// Upsert keyed by row id that writes only `component_key`.
    async fn patch_component_keys(
        &self,
        patches: &[PagePatch],
    ) -> Result<Vec<PageRow>, UpstreamError>;

    /// Upsert keyed by `(language, slug)` that ignores rows already present.
    /// Returns only the rows actually inserted.
    async fn insert_pages(&self, pages: &[NewPage]) -> Result<Vec<PageRow>, UpstreamError>;
}

#[async_trait]
pub trait ReviewStore: Send + Sync {
    async fn fetch_reviews(&self) -> Result<Vec<Review>, UpstreamError>;
}

#[async_trait]
pub trait SlotStore: Send + Sync {
    /// Upsert keyed by `(service_key, date, staff_id)`.
    async fn upsert_slots(&self, rows: &[AvailabilityRow]) -> Result<(), UpstreamError>;

    async fn delete_slot(
        &self,
        service_key: &str,
        date: NaiveDate,
        staff_id: &str,
    ) -> Result<(), UpstreamError>;
}

#[async_trait]
pub trait IntentStore: Send + Sync {
    async fn insert_intent(&self, intent: &BookingIntent) -> Result<BookingIntent, UpstreamError>;

    async fn find_intent(&self, session_id: &str) -> Result<Option<BookingIntent>, UpstreamError>;

    async fn update_intent(
        &self,
        session_id: &str,
        status: IntentStatus,
        booking_id: Option<&str>,
    ) -> Result<(), UpstreamError>;
}
