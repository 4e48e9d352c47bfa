//! Waiting for a video to finish processing.
//!
//! Status is polled with geometric backoff until the backend reports a
//! terminal state, the attempt budget runs out, or the caller cancels.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::api::client::{AnnotationBackend, ApiError};
use crate::api::types::{ProcessingStatus, StatusResponse};
use crate::constants::polling;

/// Backoff settings for status polling.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PollConfig {
    /// Delay after the first status check.
    pub initial_interval_ms: u64,
    /// Upper bound for the delay between checks.
    pub max_interval_ms: u64,
    /// Factor applied to the delay after every check.
    pub backoff_factor: f64,
    /// Status checks before giving up with [`ApiError::Timeout`].
    pub max_attempts: u32,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            initial_interval_ms: polling::INITIAL_INTERVAL_MS,
            max_interval_ms: polling::MAX_INTERVAL_MS,
            backoff_factor: polling::BACKOFF_FACTOR,
            max_attempts: polling::MAX_ATTEMPTS,
        }
    }
}

impl PollConfig {
    /// Delay after the given (1-based) attempt.
    pub fn delay(&self, attempt: u32) -> Duration {
        let factor = if self.backoff_factor.is_finite() && self.backoff_factor >= 1.0 {
            self.backoff_factor
        } else {
            1.0
        };
        let exponent = attempt.saturating_sub(1).min(64) as i32;
        let ms = self.initial_interval_ms as f64 * factor.powi(exponent);
        let capped = ms.min(self.max_interval_ms.max(self.initial_interval_ms) as f64);
        Duration::from_millis(capped as u64)
    }
}

/// Poll until `video_id` is processed.
///
/// `on_status` sees every status received. Transient request failures are
/// logged and retried within the attempt budget; other failures end the wait.
pub async fn wait_for_processing<F>(
    backend: &dyn AnnotationBackend,
    video_id: &str,
    config: &PollConfig,
    cancel: &CancellationToken,
    mut on_status: F,
) -> Result<StatusResponse, ApiError>
where
    F: FnMut(&ProcessingStatus) + Send,
{
    let attempts = config.max_attempts.max(1);

    for attempt in 1..=attempts {
        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                log::info!("Stopped waiting for {}", video_id);
                return Err(ApiError::Cancelled);
            }
            result = backend.status(video_id) => result,
        };

        match result {
            Ok(response) => {
                log::debug!("{}: {} (check {}/{})", video_id, response.status, attempt, attempts);
                on_status(&response.status);
                match &response.status {
                    ProcessingStatus::Completed => return Ok(response),
                    ProcessingStatus::Failed(message) => {
                        return Err(ApiError::ProcessingFailed(message.clone()));
                    }
                    _ => {}
                }
            }
            Err(e) if e.is_transient() => {
                log::warn!("Status check {}/{} for {} failed: {}", attempt, attempts, video_id, e);
            }
            Err(e) => return Err(e),
        }

        if attempt == attempts {
            break;
        }

        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                log::info!("Stopped waiting for {}", video_id);
                return Err(ApiError::Cancelled);
            }
            _ = tokio::time::sleep(config.delay(attempt)) => {}
        }
    }

    log::warn!("Gave up waiting for {} after {} checks", video_id, attempts);
    Err(ApiError::Timeout { attempts })
}
