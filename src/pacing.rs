// src/pacing.rs
//! Minimum spacing between consecutive outbound requests.

use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;

/// Enforces `spacing` between the starts of consecutive paced operations.
/// The first call never waits.
#[derive(Debug)]
pub struct Pacer {
    spacing: Duration,
    last: Mutex<Option<Instant>>,
}

impl Pacer {
    pub fn new(spacing: Duration) -> Self {
        Self {
            spacing,
            last: Mutex::new(None),
        }
    }

    pub fn spacing(&self) -> Duration {
        self.spacing
    }

    /// Sleep until at least `spacing` has passed since the previous call.
    pub async fn wait(&self) {
        let mut last = self.last.lock().await;
        if let Some(prev) = *last {
            let ready = prev + self.spacing;
            if ready > Instant::now() {
                tokio::time::sleep_until(ready).await;
            }
        }
        *last = Some(Instant::now());
    }

    /// Forget the previous call, so the next `wait` returns immediately.
    pub async fn reset(&self) {
        *self.last.lock().await = None;
    }
}
