// src/error.rs
//! Failure classes for a single upstream attempt.
//!
//! Only attempt-level code (caption downloads, transcript lookups, feed and
//! page fetches) produces these. Callers decide what each class means:
//! transient failures are retried, blocked responses move on to the next
//! option, malformed payloads are skipped, and unavailable capabilities
//! degrade to placeholder output.

use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    /// Network error, timeout or non-success status. Safe to retry.
    #[error("transient failure: {0}")]
    Transient(String),

    /// The upstream answered with an HTML page instead of the expected payload.
    #[error("anti-automation response from {locator}")]
    Blocked { locator: String },

    /// Payload arrived but could not be interpreted.
    #[error("malformed payload: {0}")]
    Malformed(String),

    /// A required capability is missing (binary not installed, no API key, disabled).
    #[error("capability unavailable: {0}")]
    Unavailable(String),
}

impl FetchError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, FetchError::Transient(_))
    }

    pub fn timeout(after: Duration) -> Self {
        FetchError::Transient(format!("timed out after {}ms", after.as_millis()))
    }
}

impl From<reqwest::Error> for FetchError {
    fn from(e: reqwest::Error) -> Self {
        FetchError::Transient(e.to_string())
    }
}

pub type FetchResult<T> = Result<T, FetchError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_transient_is_retryable() {
        assert!(FetchError::Transient("reset".into()).is_retryable());
        assert!(FetchError::timeout(Duration::from_secs(3)).is_retryable());
        assert!(!FetchError::Blocked {
            locator: "https://x".into()
        }
        .is_retryable());
        assert!(!FetchError::Malformed("bad".into()).is_retryable());
        assert!(!FetchError::Unavailable("yt-dlp".into()).is_retryable());
    }
}
