//! HTTP client for the banknote recognition service
//!
//! The service watches the given camera feed for a known marker and blocks
//! for up to its own internal timeout before answering. The call is the
//! longest suspension point in the loop; the orchestrator runs the idle
//! animation concurrently with it.

use crate::io::{ServiceError, ServiceResult};
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

/// Sentinel denomination meaning nothing was recognised.
pub const NO_BANKNOTE: i64 = -1;

/// Banknote-value recognition capability consumed by the orchestrator.
#[async_trait]
pub trait BanknoteRecognizer: Send + Sync {
    /// Recognised denomination, or [`NO_BANKNOTE`] when the service saw
    /// nothing it knows within its timeout.
    async fn recognise(&self, camera_feed: &str) -> ServiceResult<i64>;
}

#[derive(Debug, Deserialize)]
struct RecognitionResponse {
    value: i64,
}

/// Thin reqwest client for the recognition service.
pub struct RecognizerClient {
    base_url: String,
    client: reqwest::Client,
}

impl RecognizerClient {
    pub fn new(base_url: &str, timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .http1_only()
            .build()
            .unwrap_or_default();
        Self { base_url: base_url.trim_end_matches('/').to_string(), client }
    }
}

#[async_trait]
impl BanknoteRecognizer for RecognizerClient {
    async fn recognise(&self, camera_feed: &str) -> ServiceResult<i64> {
        let url = format!("{}/recognise", self.base_url);

        let response = self
            .client
            .get(&url)
            .query(&[("feed", camera_feed)])
            .send()
            .await
            .map_err(|e| ServiceError::unavailable("recognizer", e))?;

        if !response.status().is_success() {
            return Err(ServiceError::unavailable("recognizer", response.status()));
        }

        let parsed: RecognitionResponse = response
            .json()
            .await
            .map_err(|e| ServiceError::unavailable("recognizer", e))?;

        debug!(value = %parsed.value, "banknote_recognised");
        Ok(parsed.value)
    }
}
