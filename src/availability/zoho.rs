//! Scheduling API client (Zoho Bookings JSON API).
//!
//! Two calls are used:
//!
//! - `GET  {api_base}/availableslots?service_id&staff_id&selected_date=dd-Mon-yyyy`
//! - `POST {api_base}/appointment` (form-encoded)
//!
//! Both answer with an envelope `{"response": {"status", "returnvalue"}}`.
//! For availability, `returnvalue.data` is either a list of `HH:MM` labels or
//! a message string when the day has no slots.

use super::calendar::{api_date, api_date_time};
use super::{AvailabilitySource, BookableService};
use crate::config::BookingConfig;
use crate::http::{UpstreamError, check_response};
use async_trait::async_trait;
use chrono::{NaiveDate, NaiveTime};
use serde::Serialize;
use serde_json::Value;

/// Customer fields sent with an appointment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CustomerDetails {
    pub name: String,
    pub email: String,
    #[serde(rename = "phone_number", skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
}

#[derive(Debug, Clone)]
pub struct AppointmentRequest<'a> {
    pub service: &'a BookableService,
    pub date: NaiveDate,
    pub time: NaiveTime,
    pub customer: CustomerDetails,
}

#[derive(Clone)]
pub struct ZohoClient {
    http: reqwest::Client,
    api_base: String,
    token: String,
    timezone: String,
}

impl ZohoClient {
    pub fn new(config: &BookingConfig, access_token: &str) -> Result<Self, UpstreamError> {
        Ok(Self {
            http: crate::http::client()?,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            token: access_token.to_string(),
            timezone: config.timezone.clone(),
        })
    }

    fn auth_header(&self) -> String {
        format!("Zoho-oauthtoken {}", self.token)
    }

    /// Create an appointment and return the upstream booking id.
    pub async fn create_appointment(
        &self,
        request: &AppointmentRequest<'_>,
    ) -> Result<String, UpstreamError> {
        let customer = serde_json::to_string(&request.customer)
            .map_err(|e| UpstreamError::Parse(e.to_string()))?;
        let form = [
            ("service_id", request.service.service_id.clone()),
            ("staff_id", request.service.staff_id.clone()),
            ("from_time", api_date_time(request.date, request.time)),
            ("timezone", self.timezone.clone()),
            ("customer_details", customer),
        ];
        tracing::debug!(service = %request.service.key, date = %request.date, "creating appointment");

        let resp = self
            .http
            .post(format!("{}/appointment", self.api_base))
            .header(reqwest::header::AUTHORIZATION, self.auth_header())
            .form(&form)
            .send()
            .await?;
        let body: Value = check_response(resp).await?.json().await?;
        parse_booking_id(&body)
    }
}

#[async_trait]
impl AvailabilitySource for ZohoClient {
    async fn available_slots(
        &self,
        service: &BookableService,
        date: NaiveDate,
    ) -> Result<Vec<String>, UpstreamError> {
        let resp = self
            .http
            .get(format!("{}/availableslots", self.api_base))
            .header(reqwest::header::AUTHORIZATION, self.auth_header())
            .query(&[
                ("service_id", service.service_id.as_str()),
                ("staff_id", service.staff_id.as_str()),
                ("selected_date", api_date(date).as_str()),
            ])
            .send()
            .await?;
        let body: Value = check_response(resp).await?.json().await?;
        parse_slots(&body)
    }
}

fn return_value(body: &Value) -> Result<&Value, UpstreamError> {
    body.pointer("/response/returnvalue")
        .ok_or_else(|| UpstreamError::Parse("missing response.returnvalue".into()))
}

/// Slot labels from an availability response; a message string means none.
pub fn parse_slots(body: &Value) -> Result<Vec<String>, UpstreamError> {
    match return_value(body)?.get("data") {
        Some(Value::Array(items)) => Ok(items
            .iter()
            .filter_map(|v| v.as_str().map(str::to_string))
            .collect()),
        Some(Value::String(_)) | Some(Value::Null) | None => Ok(Vec::new()),
        Some(other) => Err(UpstreamError::Parse(format!(
            "unexpected availability data: {other}"
        ))),
    }
}

/// Booking id from an appointment response, or the upstream refusal.
pub fn parse_booking_id(body: &Value) -> Result<String, UpstreamError> {
    let value = return_value(body)?;
    if value.get("status").and_then(Value::as_str) == Some("failure") {
        let message = value
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or("appointment refused");
        return Err(UpstreamError::Rejected(message.to_string()));
    }
    value
        .get("booking_id")
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| UpstreamError::Parse("missing booking_id".into()))
}
