//! Retry timing for billing-provider calls.

use std::time::Duration;

/// Delays and budgets for one billing-provider call and its pacing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackoffPolicy {
    /// Attempts per call, including the first.
    pub max_attempts: u32,
    /// Exponential base: attempt `n` (0-based) waits `base_delay * 2^n`.
    pub base_delay: Duration,
    /// Cap for computed delays; a provider hint above it aborts the call.
    pub max_delay: Duration,
    /// Extra pause after a call that succeeded following a 429.
    pub rate_limit_cooldown: Duration,
    /// Pause before giving up on a call whose attempts ended rate-limited.
    pub rate_limit_exhausted_pause: Duration,
    /// Spacing between detail requests (jittered).
    pub request_delay: Duration,
    /// Spacing between list pages and list statuses (jittered).
    pub page_delay: Duration,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_secs(5),
            max_delay: Duration::from_secs(120),
            rate_limit_cooldown: Duration::from_secs(5),
            rate_limit_exhausted_pause: Duration::from_secs(10),
            request_delay: Duration::from_millis(500),
            page_delay: Duration::from_secs(2),
        }
    }
}

/// What to do about a 429 response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateLimitWait {
    /// Provider hint within the ceiling: sleep exactly this long.
    Hinted(Duration),
    /// No usable hint: computed backoff, jitter still to be applied.
    Backoff(Duration),
    /// Hint above the ceiling: give up now.
    Abort(Duration),
}

impl BackoffPolicy {
    /// Capped exponential delay for a 0-based attempt, before jitter.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let factor = 2u32.checked_pow(attempt).unwrap_or(u32::MAX);
        self.base_delay
            .checked_mul(factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }

    pub fn rate_limit_wait(&self, retry_after: Option<&str>, attempt: u32) -> RateLimitWait {
        match retry_after.and_then(parse_retry_after) {
            Some(hint) if hint > self.max_delay => RateLimitWait::Abort(hint),
            Some(hint) => RateLimitWait::Hinted(hint),
            None => RateLimitWait::Backoff(self.delay_for_attempt(attempt)),
        }
    }

    pub fn should_retry(&self, attempt: u32) -> bool {
        attempt + 1 < self.max_attempts
    }
}

/// `Retry-After` in whole seconds.
pub fn parse_retry_after(value: &str) -> Option<Duration> {
    value.trim().parse::<u64>().ok().map(Duration::from_secs)
}

/// Scale a delay uniformly into 50–100% of its value.
pub fn jitter(delay: Duration) -> Duration {
    jitter_with(delay, rand::random::<f64>())
}

pub(crate) fn jitter_with(delay: Duration, unit: f64) -> Duration {
    delay.mul_f64(0.5 + unit.clamp(0.0, 1.0) * 0.5)
}
