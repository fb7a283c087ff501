//! PostgREST client for the hosted database.
//!
//! Upserts use PostgREST's `on_conflict` query parameter together with a
//! `Prefer: resolution=...` header:
//!
//! - `merge-duplicates` updates the columns present in the body
//! - `ignore-duplicates` leaves existing rows alone and returns only new ones

use super::{IntentStore, PageStore, ReviewStore, SlotStore};
use crate::config::SupabaseConfig;
use crate::http::{UpstreamError, check_response};
use crate::types::{
    AvailabilityRow, BookingIntent, IntentStatus, NewPage, PagePatch, PageRow, Review,
};
use async_trait::async_trait;
use chrono::NaiveDate;
use serde::de::DeserializeOwned;
use serde_json::json;

const MERGE: &str = "resolution=merge-duplicates,return=representation";
const IGNORE: &str = "resolution=ignore-duplicates,return=representation";

/// Thin PostgREST client authenticated with the service role key.
#[derive(Clone)]
pub struct SupabaseClient {
    http: reqwest::Client,
    rest_base: String,
    key: String,
    tables: SupabaseConfig,
}

impl SupabaseClient {
    pub fn new(url: &str, service_key: &str, tables: SupabaseConfig) -> Result<Self, UpstreamError> {
        Ok(Self {
            http: crate::http::client()?,
            rest_base: format!("{}/rest/v1", url.trim_end_matches('/')),
            key: service_key.to_string(),
            tables,
        })
    }

    fn table_url(&self, table: &str) -> String {
        format!("{}/{}", self.rest_base, table)
    }

    fn request(&self, method: reqwest::Method, table: &str) -> reqwest::RequestBuilder {
        self.http
            .request(method, self.table_url(table))
            .header("apikey", &self.key)
            .bearer_auth(&self.key)
    }

    async fn select<T: DeserializeOwned>(
        &self,
        table: &str,
        query: &[(&str, String)],
    ) -> Result<Vec<T>, UpstreamError> {
        let resp = self
            .request(reqwest::Method::GET, table)
            .query(query)
            .send()
            .await?;
        Ok(check_response(resp).await?.json().await?)
    }

    async fn upsert<B: serde::Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        table: &str,
        on_conflict: &str,
        prefer: &str,
        body: &B,
    ) -> Result<Vec<T>, UpstreamError> {
        let resp = self
            .request(reqwest::Method::POST, table)
            .query(&[("on_conflict", on_conflict)])
            .header("Prefer", prefer)
            .json(body)
            .send()
            .await?;
        Ok(check_response(resp).await?.json().await?)
    }
}

#[async_trait]
impl PageStore for SupabaseClient {
    async fn fetch_pages(&self) -> Result<Vec<PageRow>, UpstreamError> {
        self.select(
            &self.tables.pages_table,
            &[("select", "*".to_string()), ("order", "id".to_string())],
        )
        .await
    }

    async fn patch_component_keys(
        &self,
        patches: &[PagePatch],
    ) -> Result<Vec<PageRow>, UpstreamError> {
        if patches.is_empty() {
            return Ok(Vec::new());
        }
        self.upsert(&self.tables.pages_table, "id", MERGE, patches)
            .await
    }

    async fn insert_pages(&self, pages: &[NewPage]) -> Result<Vec<PageRow>, UpstreamError> {
        if pages.is_empty() {
            return Ok(Vec::new());
        }
        self.upsert(&self.tables.pages_table, "language,slug", IGNORE, pages)
            .await
    }
}

#[async_trait]
impl ReviewStore for SupabaseClient {
    async fn fetch_reviews(&self) -> Result<Vec<Review>, UpstreamError> {
        self.select(
            &self.tables.reviews_table,
            &[("select", "*".to_string()), ("order", "id".to_string())],
        )
        .await
    }
}

#[async_trait]
impl SlotStore for SupabaseClient {
    async fn upsert_slots(&self, rows: &[AvailabilityRow]) -> Result<(), UpstreamError> {
        if rows.is_empty() {
            return Ok(());
        }
        let _: Vec<serde_json::Value> = self
            .upsert(
                &self.tables.availability_table,
                "service_key,date,staff_id",
                MERGE,
                rows,
            )
            .await?;
        Ok(())
    }

    async fn delete_slot(
        &self,
        service_key: &str,
        date: NaiveDate,
        staff_id: &str,
    ) -> Result<(), UpstreamError> {
        let resp = self
            .request(reqwest::Method::DELETE, &self.tables.availability_table)
            .query(&[
                ("service_key", format!("eq.{service_key}")),
                ("date", format!("eq.{date}")),
                ("staff_id", format!("eq.{staff_id}")),
            ])
            .send()
            .await?;
        check_response(resp).await?;
        Ok(())
    }
}

#[async_trait]
impl IntentStore for SupabaseClient {
    async fn insert_intent(&self, intent: &BookingIntent) -> Result<BookingIntent, UpstreamError> {
        let resp = self
            .request(reqwest::Method::POST, &self.tables.booking_intents_table)
            .header("Prefer", "return=representation")
            .json(intent)
            .send()
            .await?;
        let mut rows: Vec<BookingIntent> = check_response(resp).await?.json().await?;
        rows.pop()
            .ok_or_else(|| UpstreamError::Parse("insert returned no booking intent".into()))
    }

    async fn find_intent(&self, session_id: &str) -> Result<Option<BookingIntent>, UpstreamError> {
        let mut rows: Vec<BookingIntent> = self
            .select(
                &self.tables.booking_intents_table,
                &[
                    ("select", "*".to_string()),
                    ("session_id", format!("eq.{session_id}")),
                    ("limit", "1".to_string()),
                ],
            )
            .await?;
        Ok(rows.pop())
    }

    async fn update_intent(
        &self,
        session_id: &str,
        status: IntentStatus,
        booking_id: Option<&str>,
    ) -> Result<(), UpstreamError> {
        let resp = self
            .request(reqwest::Method::PATCH, &self.tables.booking_intents_table)
            .query(&[("session_id", format!("eq.{session_id}"))])
            .json(&json!({ "status": status, "booking_id": booking_id }))
            .send()
            .await?;
        check_response(resp).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rest_base_strips_trailing_slash() {
        let client =
            SupabaseClient::new("https://abc.supabase.co/", "key", SupabaseConfig::default())
                .unwrap();
        assert_eq!(
            client.table_url("pages"),
            "https://abc.supabase.co/rest/v1/pages"
        );
    }

    #[test]
    fn upserts_only_send_patch_columns() {
        let patch = PagePatch {
            id: "42".into(),
            component_key: "(marketing)/over-ons".into(),
        };
        let body = serde_json::to_value([patch]).unwrap();
        let keys: Vec<&String> = body[0].as_object().unwrap().keys().collect();
        assert_eq!(keys, vec!["component_key", "id"]);
    }
}
