//! Publish retry policy

use std::future::Future;

use tracing::{debug, warn};

/// How many times a publish is attempted when it loses a version slot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PublishPolicy {
    /// Total attempts, first one included
    pub max_attempts: u32,
}

impl Default for PublishPolicy {
    fn default() -> Self {
        Self { max_attempts: 5 }
    }
}

impl PublishPolicy {
    #[must_use]
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
        }
    }

    /// Run `attempt` until it succeeds, fails with a non-retryable error or the
    /// attempts are used up
    ///
    /// Each retry re-reads the store counter, so a lost slot is never retried
    /// as-is.
    ///
    /// # Errors
    ///
    /// Returns the last error seen.
    pub async fn run<T, F, Fut>(&self, mut attempt: F) -> sdm_store::Result<T>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = sdm_store::Result<T>>,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut tried = 1;
        loop {
            match attempt(tried).await {
                Ok(value) => {
                    if tried > 1 {
                        debug!(attempts = tried, "Publish succeeded after retry");
                    }
                    return Ok(value);
                }
                Err(err) if err.is_retryable() && tried < max_attempts => {
                    warn!(attempt = tried, max_attempts, error = %err, "Retrying publish");
                    tried += 1;
                    tokio::task::yield_now().await;
                }
                Err(err) => return Err(err),
            }
        }
    }
}
