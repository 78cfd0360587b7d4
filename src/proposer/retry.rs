// src/proposer/retry.rs — Retry with exponential backoff for the proposer
//
// Wraps any StepProposer with automatic retry on transient failures.
// Retries: timeouts, connect errors, server errors (5xx).
// Does NOT retry: malformed bodies, client errors (4xx).

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use super::{StepProposal, StepProposer};
use crate::infra::errors::CloudhandError;

const MAX_RETRIES: u32 = 3;
const INITIAL_DELAY_MS: u64 = 500;
const BACKOFF_FACTOR: f64 = 2.0;
const MAX_DELAY_MS: u64 = 8_000;
const JITTER_FRACTION: f64 = 0.2;

pub struct RetryProposer {
    inner: Arc<dyn StepProposer>,
    max_retries: u32,
}

impl RetryProposer {
    pub fn new(inner: Arc<dyn StepProposer>) -> Self {
        Self {
            inner,
            max_retries: MAX_RETRIES,
        }
    }

    fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let base_ms = INITIAL_DELAY_MS as f64 * BACKOFF_FACTOR.powi(attempt as i32);
        let capped_ms = base_ms.min(MAX_DELAY_MS as f64);
        let final_ms = (capped_ms * deterministic_jitter(attempt, JITTER_FRACTION)).max(50.0);
        Duration::from_millis(final_ms as u64)
    }
}

/// Deterministic jitter so retry timing is reproducible in tests.
/// Returns a multiplier in [1 - fraction, 1 + fraction].
fn deterministic_jitter(attempt: u32, fraction: f64) -> f64 {
    let hash = (attempt.wrapping_mul(2654435761)) as f64 / u32::MAX as f64;
    1.0 + fraction * (2.0 * hash - 1.0)
}

#[async_trait]
impl StepProposer for RetryProposer {
    async fn propose_step(
        &self,
        intent: &str,
        history_summary: &str,
    ) -> Result<StepProposal, CloudhandError> {
        let mut last_error = None;

        for attempt in 0..=self.max_retries {
            match self.inner.propose_step(intent, history_summary).await {
                Ok(proposal) => return Ok(proposal),
                Err(e) => {
                    if !e.is_retriable() || attempt == self.max_retries {
                        return Err(e);
                    }

                    let delay = self.delay_for_attempt(attempt);
                    tracing::warn!(
                        attempt = attempt + 1,
                        max_retries = self.max_retries,
                        delay_ms = delay.as_millis() as u64,
                        "Retrying proposer after error: {}",
                        e
                    );
                    tokio::time::sleep(delay).await;
                    last_error = Some(e);
                }
            }
        }

        Err(last_error.unwrap_or(CloudhandError::Proposer {
            message: "all retries exhausted".into(),
            retriable: false,
        }))
    }
}
