//! Checkout sessions with the payment provider (Stripe).
//!
//! Sessions are created with a single fixed-amount line item (the booking
//! deposit) and retrieved again when the customer returns, instead of relying
//! on webhooks. Stripe takes form-encoded bodies with bracketed keys for
//! nested fields, e.g. `line_items[0][price_data][currency]=eur`.

use crate::config::PaymentConfig;
use crate::http::{UpstreamError, check_response};
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::BTreeMap;

/// Per-checkout values; everything else comes from [`PaymentConfig`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionParams {
    pub language: String,
    pub customer_email: String,
    /// Shown under the product name on the payment page.
    pub description: String,
    pub metadata: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CheckoutSession {
    pub id: String,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub payment_status: String,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

impl CheckoutSession {
    pub fn is_paid(&self) -> bool {
        self.payment_status == "paid"
    }
}

#[async_trait]
pub trait PaymentProvider: Send + Sync {
    async fn create_session(&self, params: &SessionParams) -> Result<CheckoutSession, UpstreamError>;
    async fn retrieve_session(&self, session_id: &str) -> Result<CheckoutSession, UpstreamError>;
}

pub struct StripeClient {
    http: reqwest::Client,
    secret_key: String,
    config: PaymentConfig,
}

impl StripeClient {
    pub fn new(config: PaymentConfig, secret_key: &str) -> Result<Self, UpstreamError> {
        Ok(Self {
            http: crate::http::client()?,
            secret_key: secret_key.to_string(),
            config,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.config.api_base.trim_end_matches('/'), path)
    }
}

#[async_trait]
impl PaymentProvider for StripeClient {
    async fn create_session(&self, params: &SessionParams) -> Result<CheckoutSession, UpstreamError> {
        let form = session_form(&self.config, params);
        let resp = self
            .http
            .post(self.url("checkout/sessions"))
            .bearer_auth(&self.secret_key)
            .form(&form)
            .send()
            .await?;
        let session: CheckoutSession = check_response(resp).await?.json().await?;
        tracing::info!(session_id = %session.id, "created checkout session");
        Ok(session)
    }

    async fn retrieve_session(&self, session_id: &str) -> Result<CheckoutSession, UpstreamError> {
        let resp = self
            .http
            .get(self.url(&format!("checkout/sessions/{session_id}")))
            .bearer_auth(&self.secret_key)
            .send()
            .await?;
        Ok(check_response(resp).await?.json().await?)
    }
}

/// Substitute `{lang}`; `{CHECKOUT_SESSION_ID}` is filled in by Stripe.
pub fn return_url(template: &str, language: &str) -> String {
    template.replace("{lang}", language)
}

/// Form fields for a one-item payment-mode session.
pub fn session_form(config: &PaymentConfig, params: &SessionParams) -> Vec<(String, String)> {
    let mut form: Vec<(String, String)> = vec![
        ("mode".into(), "payment".into()),
        ("success_url".into(), return_url(&config.success_url, &params.language)),
        ("cancel_url".into(), return_url(&config.cancel_url, &params.language)),
        ("customer_email".into(), params.customer_email.clone()),
        ("locale".into(), params.language.clone()),
        ("line_items[0][quantity]".into(), "1".into()),
        (
            "line_items[0][price_data][currency]".into(),
            config.currency.clone(),
        ),
        (
            "line_items[0][price_data][unit_amount]".into(),
            config.deposit_cents.to_string(),
        ),
        (
            "line_items[0][price_data][product_data][name]".into(),
            config.product_name.clone(),
        ),
    ];
    if !params.description.is_empty() {
        form.push((
            "line_items[0][price_data][product_data][description]".into(),
            params.description.clone(),
        ));
    }
    for (key, value) in &params.metadata {
        form.push((format!("metadata[{key}]"), value.clone()));
    }
    form
}
