//! Mapping HTTP client failures onto [`TaxRatesError`].
//!
//! Every outbound client in the workspace goes through these two helpers so
//! that the retry layer sees one consistent transient/terminal split.

use reqwest::Response;

use crate::error::{Result, TaxRatesError};

/// Longest response body excerpt carried in an error message.
const BODY_EXCERPT_CHARS: usize = 200;

/// Classify a send/read failure: timeouts stay timeouts, the rest is network.
pub fn transport_error(url: &str, err: reqwest::Error) -> TaxRatesError {
    if err.is_timeout() {
        TaxRatesError::Timeout(format!("{url}: {err}"))
    } else {
        TaxRatesError::Network(format!("{url}: {err}"))
    }
}

/// Pass a successful response through, or turn its status into an error.
pub async fn ensure_success(url: &str, response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    let excerpt: String = body.chars().take(BODY_EXCERPT_CHARS).collect();
    Err(TaxRatesError::upstream(
        status.as_u16(),
        format!("{url}: {}", excerpt.trim()),
    ))
}
