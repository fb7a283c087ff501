//! Shared HTTP client construction and response checks for upstream APIs.
//!
//! Every upstream (database, scheduling, payment) goes through
//! [`check_response`] so a non-success status always surfaces as
//! [`UpstreamError::Api`] carrying the status and body.

use std::time::Duration;
use thiserror::Error;

/// Timeout applied to every upstream request.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

/// Errors from talking to a hosted service.
#[derive(Debug, Error)]
pub enum UpstreamError {
    /// Transport error or undecodable body.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The service answered with a non-success status.
    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    /// The service answered 2xx but the payload did not have the expected shape.
    #[error("parse error: {0}")]
    Parse(String),

    /// The service understood the request and refused it.
    #[error("rejected: {0}")]
    Rejected(String),
}

/// Build the client shared by all upstream calls.
pub fn client() -> Result<reqwest::Client, UpstreamError> {
    let client = reqwest::Client::builder()
        .user_agent(concat!("clinic-site/", env!("CARGO_PKG_VERSION")))
        .timeout(REQUEST_TIMEOUT)
        .build()?;
    Ok(client)
}

/// Return the response unchanged on success, otherwise turn it into
/// [`UpstreamError::Api`] with the body as message.
pub async fn check_response(resp: reqwest::Response) -> Result<reqwest::Response, UpstreamError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let message = resp.text().await.unwrap_or_default();
    Err(UpstreamError::Api {
        status: status.as_u16(),
        message: truncate(message.trim(), 500),
    })
}

fn truncate(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}
