//! Wait time before resubmitting a rate-limited request.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use reqwest::header::{HeaderMap, RETRY_AFTER};

/// Absolute reset time in epoch seconds.
pub const RATE_LIMIT_RESET: &str = "ratelimit-reset";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    pub min: Duration,
    pub max: Duration,
    /// Used when the response says nothing about when to come back.
    pub default: Duration,
    /// Resubmissions allowed per request after a 429.
    pub max_retries: u32,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            min: Duration::from_millis(500),
            max: Duration::from_millis(5000),
            default: Duration::from_millis(1000),
            max_retries: 1,
        }
    }
}

fn header_secs(headers: &HeaderMap, name: impl reqwest::header::AsHeaderName) -> Option<f64> {
    headers
        .get(name)?
        .to_str()
        .ok()?
        .trim()
        .parse::<f64>()
        .ok()
        .filter(|secs| secs.is_finite())
}

impl BackoffPolicy {
    /// `Retry-After` (seconds, fractions allowed) if present, else
    /// `RateLimit-Reset` minus `now`, else the default. Always clamped to
    /// `[min, max]`.
    pub fn delay_for(&self, headers: &HeaderMap, now: SystemTime) -> Duration {
        let secs = header_secs(headers, RETRY_AFTER).or_else(|| {
            let reset = header_secs(headers, RATE_LIMIT_RESET)?;
            let now = now.duration_since(UNIX_EPOCH).ok()?.as_secs_f64();
            Some(reset - now)
        });

        let delay = match secs {
            Some(secs) if secs > 0.0 => {
                Duration::try_from_secs_f64(secs).unwrap_or(self.max)
            }
            Some(_) => Duration::ZERO,
            None => self.default,
        };

        delay.max(self.min).min(self.max)
    }
}
