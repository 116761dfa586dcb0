//! Error taxonomy for the resilient fetch layer.

use std::time::Duration;

use thiserror::Error;

/// Errors produced by a fetch attempt or by retry exhaustion.
///
/// Client errors (4xx other than 429) are deliberately absent: they are
/// returned as normal [`FetchOutcome`](super::FetchOutcome) values for the
/// caller to interpret.
#[derive(Debug, Error)]
pub enum FetchError {
    /// The attempt did not complete within the configured duration.
    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    /// The upstream answered with a retryable status (5xx or 429).
    #[error("HTTP {status}: {message}")]
    TransientStatus { status: u16, message: String },

    /// Connection-level failure before a response was received.
    #[error("network error: {0}")]
    Network(String),

    /// Every permitted attempt failed; wraps the last observed error.
    #[error("request failed after {attempts} attempts: {source}")]
    Exhausted {
        attempts: u32,
        #[source]
        source: Box<FetchError>,
    },
}

impl FetchError {
    /// Whether the retry loop should try again after this error.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            FetchError::Timeout(_) | FetchError::TransientStatus { .. } | FetchError::Network(_)
        )
    }

    /// Classify an HTTP status code for retry purposes.
    ///
    /// Returns a synthetic error for 5xx and 429 so the retry loop treats
    /// them like transport failures; `None` for everything else.
    pub fn from_status(status: u16, message: impl Into<String>) -> Option<FetchError> {
        if status >= 500 || status == 429 {
            Some(FetchError::TransientStatus {
                status,
                message: message.into(),
            })
        } else {
            None
        }
    }
}
