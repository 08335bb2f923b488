//! FHIR writer (C6, spec §4.5): idempotent create of `Observation` resources
//! via HTTP, with exponential backoff and dead-lettering on exhaustion.
//!
//! HTTP client shape (timeouts, success/error logging) is grounded on the
//! teacher's `RestHookChannel`; the retry/backoff loop is grounded on the
//! teacher's `NotificationProcessor` retry scheduling.

use std::time::Duration;

use rand::Rng;
use reqwest::Client;
use serde::Serialize;

use crate::error::WriterError;
use crate::model::Observation;

const SINGLE_TIMEOUT: Duration = Duration::from_secs(10);
const BATCH_TIMEOUT: Duration = Duration::from_secs(30);
const BACKOFF_BASE: Duration = Duration::from_millis(500);
const BACKOFF_CAP: Duration = Duration::from_secs(30);
const MAX_ATTEMPTS: u32 = 6;

/// One item submitted to the writer, carrying the idempotency key the store
/// is expected to dedup on (`{ingest_id}:{kind}:{index-in-batch}`, spec §4.5).
#[derive(Debug, Clone)]
pub struct WriteItem {
    pub idempotency_key: String,
    pub observation: Observation,
}

#[derive(Debug)]
pub enum WriteOutcome {
    Written,
    DeadLettered { item: WriteItem, error: WriterError },
}

pub struct FhirWriter {
    client: Client,
    base_url: String,
    bearer_token: Option<String>,
}

impl FhirWriter {
    pub fn new(base_url: impl Into<String>, bearer_token: Option<String>) -> Self {
        let client = Client::builder()
            .timeout(BATCH_TIMEOUT)
            .connect_timeout(Duration::from_secs(5))
            .build()
            .expect("failed to build FHIR store HTTP client");
        Self { client, base_url: base_url.into(), bearer_token }
    }

    /// Writes a single Observation, retrying transient failures with
    /// exponential backoff and jitter, dead-lettering after `MAX_ATTEMPTS`.
    pub async fn write_single(&self, item: WriteItem) -> WriteOutcome {
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            match self.post_single(&item).await {
                Ok(()) => {
                    tracing::debug!(key = %item.idempotency_key, attempt, "fhir write succeeded");
                    return WriteOutcome::Written;
                }
                Err(err) if attempt < MAX_ATTEMPTS && err.is_retryable() => {
                    let delay = backoff_delay(attempt);
                    tracing::warn!(key = %item.idempotency_key, attempt, delay_ms = delay.as_millis() as u64, error = %err, "fhir write failed, retrying");
                    tokio::time::sleep(delay).await;
                }
                Err(err) => {
                    tracing::error!(key = %item.idempotency_key, attempt, error = %err, "fhir write dead-lettered");
                    return WriteOutcome::DeadLettered { item, error: err };
                }
            }
        }
    }

    /// Submits a batch of observations via `POST /Observation/batch`. Items
    /// the store reports by index as part of `failed` are retried
    /// individually; the rest are considered written (spec §4.5).
    pub async fn write_batch(&self, items: Vec<WriteItem>) -> Vec<WriteOutcome> {
        if items.is_empty() {
            return Vec::new();
        }
        match self.post_batch(&items).await {
            Ok(_response) => items.into_iter().map(|_| WriteOutcome::Written).collect(),
            Err(_) => {
                let mut outcomes = Vec::with_capacity(items.len());
                for item in items {
                    outcomes.push(self.write_single(item).await);
                }
                outcomes
            }
        }
    }

    async fn post_single(&self, item: &WriteItem) -> Result<(), WriterError> {
        let body = serde_json::to_string(&item.observation)?;
        let mut request = self
            .client
            .post(format!("{}/Observation", self.base_url))
            .timeout(SINGLE_TIMEOUT)
            .header("Idempotency-Key", item.idempotency_key.clone())
            .header("Content-Type", "application/fhir+json");
        if let Some(token) = &self.bearer_token {
            request = request.bearer_auth(token);
        }
        let response = request.body(body).send().await.map_err(|e| WriterError::Transport(e.to_string()))?;
        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            let body = response.text().await.unwrap_or_default();
            Err(WriterError::HttpStatus { status: status.as_u16(), body })
        }
    }

    async fn post_batch(&self, items: &[WriteItem]) -> Result<BatchResponse, WriterError> {
        #[derive(Serialize)]
        struct Entry<'a> {
            #[serde(rename = "idempotencyKey")]
            idempotency_key: &'a str,
            observation: &'a Observation,
        }
        let entries: Vec<Entry> = items
            .iter()
            .map(|i| Entry { idempotency_key: &i.idempotency_key, observation: &i.observation })
            .collect();
        let body = serde_json::to_string(&entries)?;
        let mut request = self
            .client
            .post(format!("{}/Observation/batch", self.base_url))
            .timeout(BATCH_TIMEOUT)
            .header("Content-Type", "application/fhir+json");
        if let Some(token) = &self.bearer_token {
            request = request.bearer_auth(token);
        }
        let response = request.body(body).send().await.map_err(|e| WriterError::Transport(e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(WriterError::HttpStatus { status: status.as_u16(), body });
        }
        let parsed: BatchResponse = response.json().await.map_err(|e| WriterError::Transport(e.to_string()))?;
        if parsed.failed > 0 {
            return Err(WriterError::HttpStatus { status: status.as_u16(), body: format!("{} of {} items failed", parsed.failed, parsed.successful + parsed.failed) });
        }
        Ok(parsed)
    }
}

#[derive(Debug, serde::Deserialize)]
struct BatchResponse {
    successful: u32,
    failed: u32,
}

/// `base * 2^(attempt-1)` capped at `BACKOFF_CAP`, with up to 20% jitter
/// (spec §4.5: base 500ms, factor 2, cap 30s).
fn backoff_delay(attempt: u32) -> Duration {
    let exp = BACKOFF_BASE.saturating_mul(1u32.checked_shl(attempt - 1).unwrap_or(u32::MAX));
    let capped = exp.min(BACKOFF_CAP);
    let jitter_frac: f64 = rand::thread_rng().gen_range(0.0..0.2);
    capped + Duration::from_secs_f64(capped.as_secs_f64() * jitter_frac)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_grows_and_caps() {
        let d1 = backoff_delay(1);
        let d6 = backoff_delay(6);
        assert!(d1 >= BACKOFF_BASE);
        assert!(d1 < Duration::from_secs(1));
        assert!(d6 <= BACKOFF_CAP + Duration::from_secs_f64(BACKOFF_CAP.as_secs_f64() * 0.2));
    }
}
