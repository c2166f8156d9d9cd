//! Fixed-window rate limiting keyed by an arbitrary identifier.
//!
//! [`RateLimiter`] counts requests per identifier (a client address, an
//! account id, a contact e-mail) inside discrete windows. The first request
//! opens a window of `interval` length; once `max_requests` have been
//! admitted, further requests are rejected until the window ends, at which
//! point the next request opens a fresh window.
//!
//! This is a fixed-window counter, not a sliding window or token bucket: up
//! to `2 * max_requests` requests can be admitted in a short span straddling
//! a window boundary.
//!
//! Windows whose end has passed are only removed opportunistically. When the
//! number of tracked identifiers grows past the limiter's `max_entries`, the
//! next [`check`](RateLimiter::check) first sweeps every expired window.

use std::time::Duration;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use serde::Deserialize;
use tokio::time::Instant;
use tracing::debug;

use crate::config::ConfigError;

pub mod policy;

pub use policy::{RateLimitPolicies, actions};

/// Number of tracked identifiers above which expired windows are swept.
pub const DEFAULT_MAX_ENTRIES: usize = 10_000;

/// How many requests an identifier may make per window.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use vitrine::rate_limit::RateLimitConfig;
///
/// let config = RateLimitConfig::new(5, Duration::from_secs(900)).unwrap();
/// assert_eq!(config.max_requests(), 5);
///
/// assert!(RateLimitConfig::new(0, Duration::from_secs(60)).is_err());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(try_from = "RawRateLimitConfig")]
pub struct RateLimitConfig {
    max_requests: u32,
    interval: Duration,
}

// Wire form used by policy overrides: `{"max_requests": 5, "interval_secs": 900}`.
#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct RawRateLimitConfig {
    max_requests: u32,
    interval_secs: u64,
}

impl TryFrom<RawRateLimitConfig> for RateLimitConfig {
    type Error = ConfigError;

    fn try_from(raw: RawRateLimitConfig) -> Result<Self, Self::Error> {
        Self::new(raw.max_requests, Duration::from_secs(raw.interval_secs))
    }
}

impl RateLimitConfig {
    /// Creates a limit of `max_requests` per `interval`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidRateLimit`] if either value is zero.
    pub fn new(max_requests: u32, interval: Duration) -> Result<Self, ConfigError> {
        if max_requests == 0 {
            return Err(ConfigError::InvalidRateLimit {
                reason: "max_requests must be at least 1",
            });
        }
        if interval.is_zero() {
            return Err(ConfigError::InvalidRateLimit {
                reason: "interval must be non-zero",
            });
        }
        Ok(Self::fixed(max_requests, interval))
    }

    // Callers guarantee both values are non-zero.
    pub(crate) const fn fixed(max_requests: u32, interval: Duration) -> Self {
        Self {
            max_requests,
            interval,
        }
    }

    pub fn max_requests(&self) -> u32 {
        self.max_requests
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }
}

/// Outcome of a [`RateLimiter::check`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitDecision {
    /// Whether the request may proceed.
    pub allowed: bool,
    /// The window's `max_requests`.
    pub limit: u32,
    /// Requests still admissible in the current window.
    pub remaining: u32,
    /// When the current window ends. Rejected callers should not retry before this.
    pub reset_at: Instant,
}

impl RateLimitDecision {
    /// Time left until the window ends (zero if it already has).
    pub fn reset_after(&self) -> Duration {
        self.reset_at.saturating_duration_since(Instant::now())
    }

    /// Whole seconds to advertise in a `Retry-After` header, rounded up, at least 1.
    pub fn retry_after_secs(&self) -> u64 {
        let wait = self.reset_after();
        let secs = wait.as_secs() + u64::from(wait.subsec_nanos() > 0);
        secs.max(1)
    }
}

#[derive(Debug, Clone, Copy)]
struct Window {
    count: u32,
    reset_at: Instant,
}

// Roughly a century. Stands in for intervals the clock cannot represent.
const FAR_FUTURE: Duration = Duration::from_secs(100 * 365 * 24 * 60 * 60);

impl Window {
    fn open(now: Instant, config: &RateLimitConfig) -> Self {
        let reset_at = now
            .checked_add(config.interval)
            .or_else(|| now.checked_add(FAR_FUTURE))
            .unwrap_or(now);
        Self { count: 1, reset_at }
    }
}

/// Per-identifier fixed-window request counter.
///
/// Share one limiter behind an [`Arc`](std::sync::Arc) for the whole process.
/// Each identifier's read-modify-write runs under its map shard's lock, so
/// concurrent checks for one identifier never lose an increment.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use vitrine::rate_limit::{RateLimitConfig, RateLimiter};
///
/// let limiter = RateLimiter::new();
/// let config = RateLimitConfig::new(2, Duration::from_secs(60)).unwrap();
///
/// assert!(limiter.check("10.0.0.1", &config).allowed);
/// assert!(limiter.check("10.0.0.1", &config).allowed);
/// assert!(!limiter.check("10.0.0.1", &config).allowed);
///
/// limiter.reset("10.0.0.1");
/// assert!(limiter.check("10.0.0.1", &config).allowed);
/// ```
#[derive(Debug)]
pub struct RateLimiter {
    windows: DashMap<String, Window>,
    max_entries: usize,
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new()
    }
}

impl RateLimiter {
    /// Creates a limiter that sweeps once more than [`DEFAULT_MAX_ENTRIES`]
    /// identifiers are tracked.
    pub fn new() -> Self {
        Self::with_max_entries(DEFAULT_MAX_ENTRIES)
    }

    /// Creates a limiter with a custom sweep threshold.
    pub fn with_max_entries(max_entries: usize) -> Self {
        Self {
            windows: DashMap::new(),
            max_entries,
        }
    }

    /// Counts one request from `identifier` against `config`.
    ///
    /// Never fails: a rejection is reported through
    /// [`RateLimitDecision::allowed`] and left to the caller to surface.
    pub fn check(&self, identifier: &str, config: &RateLimitConfig) -> RateLimitDecision {
        let now = Instant::now();
        if self.windows.len() > self.max_entries {
            self.sweep(now);
        }

        let limit = config.max_requests;
        match self.windows.entry(identifier.to_owned()) {
            Entry::Vacant(slot) => {
                let window = *slot.insert(Window::open(now, config));
                fresh(limit, window)
            }
            Entry::Occupied(mut slot) => {
                let window = slot.get_mut();
                if now >= window.reset_at {
                    *window = Window::open(now, config);
                    fresh(limit, *window)
                } else if window.count >= limit {
                    debug!(identifier, count = window.count, limit, "rate limit exceeded");
                    RateLimitDecision {
                        allowed: false,
                        limit,
                        remaining: 0,
                        reset_at: window.reset_at,
                    }
                } else {
                    window.count += 1;
                    RateLimitDecision {
                        allowed: true,
                        limit,
                        remaining: limit - window.count,
                        reset_at: window.reset_at,
                    }
                }
            }
        }
    }

    /// Forgets `identifier`'s window; its next request starts fresh.
    pub fn reset(&self, identifier: &str) {
        self.windows.remove(identifier);
    }

    /// Number of identifiers currently tracked, expired windows included.
    pub fn len(&self) -> usize {
        self.windows.len()
    }

    /// Returns `true` if no identifier is tracked.
    pub fn is_empty(&self) -> bool {
        self.windows.is_empty()
    }

    fn sweep(&self, now: Instant) {
        let before = self.windows.len();
        self.windows.retain(|_, window| window.reset_at > now);
        debug!(
            removed = before.saturating_sub(self.windows.len()),
            "swept expired rate-limit windows"
        );
    }
}

fn fresh(limit: u32, window: Window) -> RateLimitDecision {
    RateLimitDecision {
        allowed: true,
        limit,
        remaining: limit - window.count,
        reset_at: window.reset_at,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn three_per_minute() -> RateLimitConfig {
        RateLimitConfig::new(3, Duration::from_millis(60_000)).unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn admits_up_to_max_then_rejects() {
        let limiter = RateLimiter::new();
        let config = three_per_minute();

        let decisions: Vec<_> = (0..4).map(|_| limiter.check("ip", &config)).collect();
        let allowed: Vec<_> = decisions.iter().map(|d| d.allowed).collect();
        let remaining: Vec<_> = decisions.iter().map(|d| d.remaining).collect();

        assert_eq!(allowed, [true, true, true, false]);
        assert_eq!(remaining, [2, 1, 0, 0]);
        // the rejection reports the original window end
        assert_eq!(decisions[3].reset_at, decisions[0].reset_at);
    }

    #[tokio::test(start_paused = true)]
    async fn expired_window_is_replaced() {
        let limiter = RateLimiter::new();
        let config = three_per_minute();
        for _ in 0..3 {
            limiter.check("ip", &config);
        }

        tokio::time::advance(Duration::from_millis(60_001)).await;
        let decision = limiter.check("ip", &config);
        assert!(decision.allowed);
        assert_eq!(decision.remaining, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn window_is_fixed_not_sliding() {
        let limiter = RateLimiter::new();
        let config = three_per_minute();

        limiter.check("ip", &config);
        tokio::time::advance(Duration::from_millis(59_000)).await;
        assert!(limiter.check("ip", &config).allowed);
        assert!(limiter.check("ip", &config).allowed);
        assert!(!limiter.check("ip", &config).allowed);

        // two seconds later a whole new batch is admitted
        tokio::time::advance(Duration::from_millis(2_000)).await;
        for expected in [2, 1, 0] {
            let decision = limiter.check("ip", &config);
            assert!(decision.allowed);
            assert_eq!(decision.remaining, expected);
        }
    }

    #[test]
    fn identifiers_are_independent() {
        let limiter = RateLimiter::new();
        let config = three_per_minute();
        for _ in 0..3 {
            limiter.check("a", &config);
        }

        assert!(!limiter.check("a", &config).allowed);
        let other = limiter.check("b", &config);
        assert!(other.allowed);
        assert_eq!(other.remaining, 2);
    }

    #[test]
    fn reset_starts_a_fresh_window() {
        let limiter = RateLimiter::new();
        let config = three_per_minute();
        for _ in 0..4 {
            limiter.check("user@example.com", &config);
        }

        limiter.reset("user@example.com");
        let decision = limiter.check("user@example.com", &config);
        assert!(decision.allowed);
        assert_eq!(decision.remaining, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn sweep_runs_only_past_max_entries() {
        let limiter = RateLimiter::with_max_entries(2);
        let config = three_per_minute();
        limiter.check("a", &config);
        limiter.check("b", &config);
        limiter.check("c", &config);
        assert_eq!(limiter.len(), 3);

        tokio::time::advance(Duration::from_millis(60_000)).await;
        limiter.check("d", &config);
        // a, b and c expired and were swept before "d" was counted
        assert_eq!(limiter.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn sweep_keeps_live_windows() {
        let limiter = RateLimiter::with_max_entries(1);
        let config = three_per_minute();
        limiter.check("a", &config);
        limiter.check("b", &config);

        limiter.check("c", &config);
        assert_eq!(limiter.len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn retry_after_rounds_up() {
        let limiter = RateLimiter::new();
        let config = RateLimitConfig::new(1, Duration::from_millis(1_500)).unwrap();
        limiter.check("ip", &config);

        let rejected = limiter.check("ip", &config);
        assert!(!rejected.allowed);
        assert_eq!(rejected.retry_after_secs(), 2);
    }

    #[test]
    fn zero_limits_are_rejected() {
        assert!(RateLimitConfig::new(0, Duration::from_secs(1)).is_err());
        assert!(RateLimitConfig::new(1, Duration::ZERO).is_err());
    }

    #[tokio::test]
    async fn huge_interval_saturates_instead_of_overflowing() {
        let mut policies = RateLimitPolicies::default();
        policies
            .merge_json(r#"{"login": {"max_requests": 1, "interval_secs": 18446744073709551615}}"#)
            .unwrap();
        let config = *policies.get(actions::LOGIN).unwrap();

        let limiter = RateLimiter::new();
        assert!(limiter.check("ip", &config).allowed);
        let rejected = limiter.check("ip", &config);
        assert!(!rejected.allowed);
        assert!(rejected.retry_after_secs() > 365 * 24 * 60 * 60);

        let direct = RateLimitConfig::new(1, Duration::MAX).unwrap();
        assert!(limiter.check("other", &direct).allowed);
    }

    #[test]
    fn config_deserializes_from_seconds() {
        let config: RateLimitConfig =
            serde_json::from_str(r#"{"max_requests": 5, "interval_secs": 900}"#).unwrap();
        assert_eq!(config.max_requests(), 5);
        assert_eq!(config.interval(), Duration::from_secs(900));

        let invalid = serde_json::from_str::<RateLimitConfig>(
            r#"{"max_requests": 0, "interval_secs": 900}"#,
        );
        assert!(invalid.is_err());
    }
}
