//! In-process database backing the test suites.
//!
//! Mirrors the conflict rules of the hosted tables: pages are unique on
//! `(language, slug)`, availability on `(service_key, date, staff_id)`,
//! intents on `session_id`.

use super::{IntentStore, PageStore, ReviewStore, SlotStore};
use crate::http::UpstreamError;
use crate::types::{
    AvailabilityRow, BookingIntent, IntentStatus, NewPage, PagePatch, PageRow, Review,
};
use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

type SlotKey = (String, NaiveDate, String);

#[derive(Default)]
struct State {
    pages: Vec<PageRow>,
    reviews: Vec<Review>,
    slots: BTreeMap<SlotKey, Vec<String>>,
    intents: Vec<BookingIntent>,
    next_id: u64,
    fail_writes: bool,
}

impl State {
    fn next_id(&mut self) -> String {
        self.next_id += 1;
        self.next_id.to_string()
    }

    fn check_writable(&self) -> Result<(), UpstreamError> {
        if self.fail_writes {
            return Err(UpstreamError::Api {
                status: 503,
                message: "database unavailable".into(),
            });
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryDatabase {
    state: Mutex<State>,
}

impl MemoryDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_pages(pages: Vec<PageRow>) -> Self {
        let db = Self::default();
        {
            let mut state = db.lock();
            state.next_id = pages
                .iter()
                .filter_map(|p| p.id.parse::<u64>().ok())
                .max()
                .unwrap_or(0);
            state.pages = pages;
        }
        db
    }

    pub fn with_reviews(self, reviews: Vec<Review>) -> Self {
        self.lock().reviews = reviews;
        self
    }

    /// Make every subsequent write fail with a 503.
    pub fn fail_writes(&self, fail: bool) {
        self.lock().fail_writes = fail;
    }

    pub fn pages(&self) -> Vec<PageRow> {
        self.lock().pages.clone()
    }

    pub fn slots(&self) -> Vec<AvailabilityRow> {
        self.lock()
            .slots
            .iter()
            .map(|((service_key, date, staff_id), time_slots)| AvailabilityRow {
                service_key: service_key.clone(),
                date: *date,
                staff_id: staff_id.clone(),
                time_slots: time_slots.clone(),
            })
            .collect()
    }

    pub fn intents(&self) -> Vec<BookingIntent> {
        self.lock().intents.clone()
    }

    // A poisoned lock only means another test thread panicked mid-write;
    // the data is still usable for inspection.
    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl PageStore for MemoryDatabase {
    async fn fetch_pages(&self) -> Result<Vec<PageRow>, UpstreamError> {
        Ok(self.pages())
    }

    async fn patch_component_keys(
        &self,
        patches: &[PagePatch],
    ) -> Result<Vec<PageRow>, UpstreamError> {
        if patches.is_empty() {
            return Ok(Vec::new());
        }
        let mut state = self.lock();
        state.check_writable()?;
        let mut updated = Vec::new();
        for patch in patches {
            if let Some(row) = state.pages.iter_mut().find(|p| p.id == patch.id) {
                row.component_key = Some(patch.component_key.clone());
                row.updated_at = Some(Utc::now());
                updated.push(row.clone());
            }
        }
        Ok(updated)
    }

    async fn insert_pages(&self, pages: &[NewPage]) -> Result<Vec<PageRow>, UpstreamError> {
        if pages.is_empty() {
            return Ok(Vec::new());
        }
        let mut state = self.lock();
        state.check_writable()?;
        let mut inserted = Vec::new();
        for page in pages {
            let exists = state
                .pages
                .iter()
                .any(|p| p.language == page.language && p.slug == page.slug);
            if exists {
                continue;
            }
            let row = PageRow {
                id: state.next_id(),
                slug: page.slug.clone(),
                component_key: Some(page.component_key.clone()),
                language: page.language.clone(),
                category: Some(page.category.clone()),
                status: Some(page.status.clone()),
                title: Some(page.title.clone()),
                meta_title: None,
                meta_description: None,
                og_image: None,
                updated_at: Some(Utc::now()),
            };
            state.pages.push(row.clone());
            inserted.push(row);
        }
        Ok(inserted)
    }
}

#[async_trait]
impl ReviewStore for MemoryDatabase {
    async fn fetch_reviews(&self) -> Result<Vec<Review>, UpstreamError> {
        Ok(self.lock().reviews.clone())
    }
}

#[async_trait]
impl SlotStore for MemoryDatabase {
    async fn upsert_slots(&self, rows: &[AvailabilityRow]) -> Result<(), UpstreamError> {
        let mut state = self.lock();
        state.check_writable()?;
        for row in rows {
            state.slots.insert(
                (row.service_key.clone(), row.date, row.staff_id.clone()),
                row.time_slots.clone(),
            );
        }
        Ok(())
    }

    async fn delete_slot(
        &self,
        service_key: &str,
        date: NaiveDate,
        staff_id: &str,
    ) -> Result<(), UpstreamError> {
        let mut state = self.lock();
        state.check_writable()?;
        state
            .slots
            .remove(&(service_key.to_string(), date, staff_id.to_string()));
        Ok(())
    }
}

#[async_trait]
impl IntentStore for MemoryDatabase {
    async fn insert_intent(&self, intent: &BookingIntent) -> Result<BookingIntent, UpstreamError> {
        let mut state = self.lock();
        state.check_writable()?;
        if state
            .intents
            .iter()
            .any(|i| i.session_id == intent.session_id)
        {
            return Err(UpstreamError::Api {
                status: 409,
                message: format!("duplicate session_id {}", intent.session_id),
            });
        }
        let mut stored = intent.clone();
        stored.id = Some(state.next_id());
        state.intents.push(stored.clone());
        Ok(stored)
    }

    async fn find_intent(&self, session_id: &str) -> Result<Option<BookingIntent>, UpstreamError> {
        Ok(self
            .lock()
            .intents
            .iter()
            .find(|i| i.session_id == session_id)
            .cloned())
    }

    async fn update_intent(
        &self,
        session_id: &str,
        status: IntentStatus,
        booking_id: Option<&str>,
    ) -> Result<(), UpstreamError> {
        let mut state = self.lock();
        state.check_writable()?;
        if let Some(intent) = state
            .intents
            .iter_mut()
            .find(|i| i.session_id == session_id)
        {
            intent.status = status;
            intent.booking_id = booking_id.map(str::to_string);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::page_row;

    fn new_page(lang: &str, slug: &str) -> NewPage {
        NewPage {
            slug: slug.into(),
            component_key: "contact".into(),
            language: lang.into(),
            category: "contact".into(),
            status: "draft".into(),
            title: "Contact".into(),
        }
    }

    #[tokio::test]
    async fn insert_ignores_existing_language_slug() {
        let db = MemoryDatabase::with_pages(vec![page_row("4", "nl", "nl/contact", None)]);
        let inserted = db
            .insert_pages(&[new_page("nl", "nl/contact"), new_page("en", "en/contact")])
            .await
            .unwrap();

        assert_eq!(inserted.len(), 1);
        assert_eq!(inserted[0].id, "5");
        assert_eq!(db.pages().len(), 2);
    }

    #[tokio::test]
    async fn same_slug_in_two_languages_is_allowed() {
        let db = MemoryDatabase::new();
        let inserted = db
            .insert_pages(&[new_page("nl", "contact"), new_page("en", "contact")])
            .await
            .unwrap();
        assert_eq!(inserted.len(), 2);
    }

    #[tokio::test]
    async fn patch_touches_only_component_key() {
        let db = MemoryDatabase::with_pages(vec![page_row("1", "nl", "faq", None)]);
        db.patch_component_keys(&[PagePatch {
            id: "1".into(),
            component_key: "faq".into(),
        }])
        .await
        .unwrap();

        let row = &db.pages()[0];
        assert_eq!(row.slug, "faq");
        assert_eq!(row.component_key.as_deref(), Some("faq"));
    }

    #[tokio::test]
    async fn failing_writes_leave_rows_untouched() {
        let db = MemoryDatabase::new();
        db.fail_writes(true);
        let err = db.insert_pages(&[new_page("nl", "contact")]).await;
        assert!(matches!(err, Err(UpstreamError::Api { status: 503, .. })));
        assert!(db.pages().is_empty());
    }

    #[tokio::test]
    async fn slot_upsert_replaces_and_delete_removes() {
        let db = MemoryDatabase::new();
        let date = NaiveDate::from_ymd_opt(2025, 3, 4).unwrap();
        let row = |slots: &[&str]| AvailabilityRow {
            service_key: "consult:amsterdam".into(),
            date,
            staff_id: "s1".into(),
            time_slots: slots.iter().map(|s| s.to_string()).collect(),
        };

        db.upsert_slots(&[row(&["09:00", "10:00"])]).await.unwrap();
        db.upsert_slots(&[row(&["10:00"])]).await.unwrap();
        assert_eq!(db.slots(), vec![row(&["10:00"])]);

        db.delete_slot("consult:amsterdam", date, "s1").await.unwrap();
        assert!(db.slots().is_empty());
    }
}
