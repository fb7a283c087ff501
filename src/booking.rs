//! Paid booking flow: checkout, then confirmation when the customer returns.
//!
//! ```text
//! create_checkout ─► payment session ─► pending intent ─► redirect URL
//! confirm(session) ─► intent ─► paid? ─► slot still open? ─► intent booking
//!                  ─► appointment ─► intent confirmed
//!                  ─► cached day invalidated, remote row deleted
//! ```
//!
//! There is no webhook: confirmation is driven by the return page calling
//! [`BookingService::confirm`] with the session id. Confirming an intent that
//! is already confirmed returns the stored booking id without side effects.
//! An intent left in `booking` is never sent upstream again.

use crate::availability::calendar::parse_slot;
use crate::availability::zoho::{AppointmentRequest, CustomerDetails};
use crate::availability::{AvailabilityRegistry, BookableService, ZohoClient};
use crate::config::{ConfigError, SiteConfig};
use crate::http::UpstreamError;
use crate::payment::{PaymentProvider, SessionParams};
use crate::store::{IntentStore, SlotStore};
use crate::types::{BookingIntent, IntentStatus, ServiceKey};
use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BookingError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("invalid booking request: {0}")]
    InvalidRequest(String),
    #[error("no booking found for session {0}")]
    UnknownSession(String),
    #[error("session {session_id} is not paid (status: {status})")]
    NotPaid { session_id: String, status: String },
    #[error("the slot {date} {time} is no longer available")]
    SlotTaken { date: NaiveDate, time: String },
    #[error("booking for session {0} is already being processed")]
    InProgress(String),
    #[error(transparent)]
    Upstream(#[from] UpstreamError),
}

/// Creates appointments in the scheduling system.
#[async_trait]
pub trait AppointmentBooker: Send + Sync {
    /// Returns the upstream booking id.
    async fn book(&self, request: &AppointmentRequest<'_>) -> Result<String, UpstreamError>;
}

#[async_trait]
impl AppointmentBooker for ZohoClient {
    async fn book(&self, request: &AppointmentRequest<'_>) -> Result<String, UpstreamError> {
        self.create_appointment(request).await
    }
}

/// Checkout form as posted by the booking page.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutRequest {
    /// `type:location`
    pub service: String,
    pub date: NaiveDate,
    /// `HH:MM`
    pub time: String,
    pub name: String,
    pub email: String,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub language: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutStarted {
    pub session_id: String,
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Confirmation {
    pub booking_id: String,
    pub already_confirmed: bool,
}

pub struct BookingService {
    config: Arc<SiteConfig>,
    payments: Arc<dyn PaymentProvider>,
    appointments: Arc<dyn AppointmentBooker>,
    intents: Arc<dyn IntentStore>,
    slots: Arc<dyn SlotStore>,
    availability: Arc<AvailabilityRegistry>,
}

impl BookingService {
    pub fn new(
        config: Arc<SiteConfig>,
        payments: Arc<dyn PaymentProvider>,
        appointments: Arc<dyn AppointmentBooker>,
        intents: Arc<dyn IntentStore>,
        slots: Arc<dyn SlotStore>,
        availability: Arc<AvailabilityRegistry>,
    ) -> Self {
        Self {
            config,
            payments,
            appointments,
            intents,
            slots,
            availability,
        }
    }

    fn resolve_service(&self, key: &str) -> Result<BookableService, BookingError> {
        let key: ServiceKey = key
            .parse()
            .map_err(|e: crate::types::InvalidServiceKey| BookingError::InvalidRequest(e.to_string()))?;
        Ok(BookableService::from_config(&self.config, &key)?)
    }

    /// Validate the request, open a payment session and store a pending intent.
    pub async fn create_checkout(
        &self,
        request: &CheckoutRequest,
    ) -> Result<CheckoutStarted, BookingError> {
        let service = self.resolve_service(&request.service)?;
        if parse_slot(&request.time).is_none() {
            return Err(BookingError::InvalidRequest(format!(
                "time '{}' must be HH:MM",
                request.time
            )));
        }
        if request.name.trim().is_empty() {
            return Err(BookingError::InvalidRequest("name is required".into()));
        }
        if !request.email.contains('@') {
            return Err(BookingError::InvalidRequest(format!(
                "'{}' is not an email address",
                request.email
            )));
        }
        let language = match &request.language {
            Some(lang) if self.config.site.languages.contains(lang) => lang.clone(),
            Some(lang) => {
                return Err(BookingError::InvalidRequest(format!(
                    "unsupported language '{lang}'"
                )));
            }
            None => self.config.site.default_language.clone(),
        };

        let cache = self.availability.cache(&service);
        if let Some(open) = cache.slots(request.date).await
            && !open.contains(&request.time)
        {
            return Err(BookingError::SlotTaken {
                date: request.date,
                time: request.time.clone(),
            });
        }

        let params = SessionParams {
            language: language.clone(),
            customer_email: request.email.clone(),
            description: format!("{} {}", request.date, request.time),
            metadata: BTreeMap::from([
                ("service_key".to_string(), service.key.to_string()),
                ("date".to_string(), request.date.to_string()),
                ("time".to_string(), request.time.clone()),
            ]),
        };
        let session = self.payments.create_session(&params).await?;
        let url = session
            .url
            .clone()
            .ok_or_else(|| UpstreamError::Parse("checkout session has no url".into()))?;

        self.intents
            .insert_intent(&BookingIntent {
                id: None,
                session_id: session.id.clone(),
                service_key: service.key.to_string(),
                staff_id: service.staff_id.clone(),
                date: request.date,
                time: request.time.clone(),
                customer_name: request.name.trim().to_string(),
                customer_email: request.email.trim().to_string(),
                customer_phone: request.phone.clone().filter(|p| !p.trim().is_empty()),
                language,
                status: IntentStatus::Pending,
                booking_id: None,
            })
            .await?;
        tracing::info!(session_id = %session.id, service = %service.key, date = %request.date, "checkout started");

        Ok(CheckoutStarted {
            session_id: session.id,
            url,
        })
    }

    /// Turn a paid session into an appointment.
    pub async fn confirm(&self, session_id: &str) -> Result<Confirmation, BookingError> {
        let intent = self
            .intents
            .find_intent(session_id)
            .await?
            .ok_or_else(|| BookingError::UnknownSession(session_id.to_string()))?;
        match intent.status {
            IntentStatus::Confirmed => {
                return Ok(Confirmation {
                    booking_id: intent.booking_id.unwrap_or_default(),
                    already_confirmed: true,
                });
            }
            IntentStatus::Booking => {
                return Err(BookingError::InProgress(session_id.to_string()));
            }
            IntentStatus::Pending | IntentStatus::Failed => {}
        }

        let session = self.payments.retrieve_session(session_id).await?;
        if !session.is_paid() {
            return Err(BookingError::NotPaid {
                session_id: session_id.to_string(),
                status: session.payment_status,
            });
        }

        let service = self.resolve_service(&intent.service_key)?;
        let time = parse_slot(&intent.time).ok_or_else(|| {
            BookingError::InvalidRequest(format!("stored time '{}' must be HH:MM", intent.time))
        })?;
        let cache = self.availability.cache(&service);

        if !cache.is_slot_still_available(intent.date, &intent.time).await {
            self.mark_failed(session_id).await;
            return Err(BookingError::SlotTaken {
                date: intent.date,
                time: intent.time,
            });
        }

        self.intents
            .update_intent(session_id, IntentStatus::Booking, None)
            .await?;

        let request = AppointmentRequest {
            service: &service,
            date: intent.date,
            time,
            customer: CustomerDetails {
                name: intent.customer_name.clone(),
                email: intent.customer_email.clone(),
                phone: intent.customer_phone.clone(),
            },
        };
        let booking_id = match self.appointments.book(&request).await {
            Ok(id) => id,
            Err(e) => {
                self.mark_failed(session_id).await;
                return Err(e.into());
            }
        };

        // The appointment exists now; a failed write must not fail the call.
        if let Err(e) = self
            .intents
            .update_intent(session_id, IntentStatus::Confirmed, Some(&booking_id))
            .await
        {
            tracing::error!(session_id, booking_id = %booking_id, error = %e, "could not store booking id");
        }
        tracing::info!(session_id, booking_id = %booking_id, "booking confirmed");

        if let Err(e) = cache.invalidate(intent.date).await {
            tracing::warn!(error = %e, "could not clear availability marker");
        }
        if let Err(e) = self
            .slots
            .delete_slot(&intent.service_key, intent.date, &intent.staff_id)
            .await
        {
            tracing::warn!(error = %e, date = %intent.date, "could not delete cached availability row");
        }

        Ok(Confirmation {
            booking_id,
            already_confirmed: false,
        })
    }

    async fn mark_failed(&self, session_id: &str) {
        if let Err(e) = self
            .intents
            .update_intent(session_id, IntentStatus::Failed, None)
            .await
        {
            tracing::warn!(session_id, error = %e, "could not mark booking intent failed");
        }
    }
}
