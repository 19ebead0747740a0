/*!
 * HTTP Client
 *
 * Timeout-bounded POST with custom headers. Built once at startup and
 * shared across every delivery attempt rather than constructed per call.
 */

use anyhow::{Context, Result};
use reqwest::Client;
use std::time::Duration;
use thiserror::Error;

/// A completed HTTP exchange.
#[derive(Debug, Clone)]
pub struct RawResponse {
    pub status_code: u16,
    pub body: String,
}

#[derive(Debug, Error)]
pub enum HttpError {
    #[error("request timed out: {0}")]
    Timeout(String),

    #[error("network error: {0}")]
    Network(String),
}

pub struct DeliveryHttpClient {
    client: Client,
}

impl DeliveryHttpClient {
    /// `timeout` is the fixed deadline for the whole request (default 5s).
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            // A redirect would resend the request without the signed body
            // and x-signature header attached the way the caller intends;
            // never follow one silently.
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .context("failed to build HTTP client")?;

        Ok(Self { client })
    }

    pub async fn post(
        &self,
        url: &str,
        content_type: &str,
        body: Vec<u8>,
        signature: &str,
    ) -> Result<RawResponse, HttpError> {
        let result = self
            .client
            .post(url)
            .header("Content-Type", content_type)
            .header("x-signature", signature)
            .body(body)
            .send()
            .await;

        match result {
            Ok(response) => {
                let status_code = response.status().as_u16();
                let body = response
                    .text()
                    .await
                    .map_err(|e| HttpError::Network(e.to_string()))?;
                Ok(RawResponse { status_code, body })
            }
            Err(e) if e.is_timeout() => Err(HttpError::Timeout(e.to_string())),
            Err(e) => Err(HttpError::Network(e.to_string())),
        }
    }
}
