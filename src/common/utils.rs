//! Pacing and timing helpers

use crate::logging::Logger;
use std::time::{Duration, Instant};

/// Mandatory delays between transfers and between repositories
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pacing {
    /// Sleep after every successful copy
    pub copy_delay: Duration,
    /// Sleep between two mirror list entries
    pub repository_delay: Duration,
}

impl Default for Pacing {
    fn default() -> Self {
        Self {
            copy_delay: Duration::from_secs(1),
            repository_delay: Duration::from_secs(2),
        }
    }
}

impl Pacing {
    pub fn none() -> Self {
        Self {
            copy_delay: Duration::ZERO,
            repository_delay: Duration::ZERO,
        }
    }

    pub async fn after_copy(&self) {
        sleep_unless_zero(self.copy_delay).await;
    }

    pub async fn between_repositories(&self) {
        sleep_unless_zero(self.repository_delay).await;
    }
}

async fn sleep_unless_zero(delay: Duration) {
    if !delay.is_zero() {
        tokio::time::sleep(delay).await;
    }
}

/// Timing utilities
pub struct Timer {
    start: Instant,
    description: String,
}

impl Timer {
    /// Start a new timer
    pub fn start(description: impl Into<String>) -> Self {
        Self {
            start: Instant::now(),
            description: description.into(),
        }
    }

    /// Get elapsed time
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    /// Log elapsed time using provided logger
    pub fn log_elapsed(&self, logger: &Logger) {
        logger.detail(&format!(
            "{} completed in {}",
            self.description,
            logger.format_duration(self.elapsed())
        ));
    }
}
