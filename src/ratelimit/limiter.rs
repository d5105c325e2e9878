//! Core dual-window rate limiter implementation.

use std::sync::Arc;
use tracing::{debug, trace};

use crate::clock::{Clock, SystemClock};
use crate::config::RateLimitingConfig;
use crate::error::Result;

use super::client_key::ClientKey;
use super::decision::{reset_secs, Decision, RateLimitHeaders, RejectKind};
use super::message;
use super::store::{ClientState, WindowCounterStore};
use super::window::{WindowKind, WindowLimits, WindowSpec};

/// The admission limiter: a short burst window and a long sustained-rate
/// window per client.
///
/// This struct is thread-safe and can be shared across multiple tasks.
pub struct RateLimiter {
    store: WindowCounterStore,
    short_message: String,
    long_message: String,
    clock: Arc<dyn Clock>,
}

impl RateLimiter {
    /// Create a rate limiter reading the system clock.
    pub fn new(config: &RateLimitingConfig) -> Result<Self> {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    /// Create a rate limiter with an explicit time source.
    pub fn with_clock(config: &RateLimitingConfig, clock: Arc<dyn Clock>) -> Result<Self> {
        config.validate()?;
        Ok(Self::build(config, clock))
    }

    fn build(config: &RateLimitingConfig, clock: Arc<dyn Clock>) -> Self {
        let limits = WindowLimits {
            short: WindowSpec::new(config.short_window_ms, config.short_window_max),
            long: WindowSpec::new(config.long_window_ms, config.long_window_max),
        };

        Self {
            short_message: message::render(&config.short_window_message, &limits.short),
            long_message: message::render(&config.long_window_message, &limits.long),
            store: WindowCounterStore::new(limits),
            clock,
        }
    }

    pub fn limits(&self) -> &WindowLimits {
        self.store.limits()
    }

    /// Decide whether a request from `client` arriving at `now_ms` may
    /// proceed.
    ///
    /// Reset-if-stale, check and increment run under the client's entry lock,
    /// so concurrent requests for one key cannot overshoot a cap. A rejected
    /// request is never counted.
    pub fn check(&self, client: &ClientKey, now_ms: u64) -> Decision {
        let limits = *self.store.limits();

        self.store.get_or_insert(client, |state| {
            if state.ensure_reset(now_ms, &limits) {
                debug!(client = %client, "Long window elapsed, counters reset");
            }

            let (short_count, long_count) = state.current_counts(now_ms, &limits);

            trace!(
                client = %client,
                short = short_count,
                long = long_count,
                "Checking rate limit"
            );

            if short_count >= limits.short.max {
                return self.reject(client, state, RejectKind::ShortWindowExceeded, now_ms, &limits);
            }

            if long_count >= limits.long.max {
                return self.reject(client, state, RejectKind::LongWindowExceeded, now_ms, &limits);
            }

            let long_after = state.increment(now_ms, &limits);
            let long_end = window_end_ms(state, WindowKind::Long, now_ms, &limits.long);

            trace!(
                client = %client,
                counts = ?state.current_counts(now_ms, &limits),
                "Request admitted"
            );

            Decision::Admitted {
                headers: RateLimitHeaders {
                    limit: limits.long.max,
                    remaining: limits.long.max.saturating_sub(long_after),
                    reset: reset_secs(long_end),
                },
            }
        })
    }

    /// [`check`](Self::check) at the limiter clock's current time.
    pub fn check_now(&self, client: &ClientKey) -> Decision {
        self.check(client, self.clock.now_ms())
    }

    fn reject(
        &self,
        client: &ClientKey,
        state: &ClientState,
        kind: RejectKind,
        now_ms: u64,
        limits: &WindowLimits,
    ) -> Decision {
        let window = kind.window();
        let spec = limits.spec(window);
        let ends_at = window_end_ms(state, window, now_ms, spec);

        debug!(
            client = %client,
            kind = %kind,
            limit = spec.max,
            "Rate limit exceeded"
        );

        let message = match window {
            WindowKind::Short => self.short_message.clone(),
            WindowKind::Long => self.long_message.clone(),
        };

        Decision::rejected(kind, spec, ends_at, message)
    }

    /// Current `(short, long)` counts for a client without counting a
    /// request.
    pub fn client_counts(&self, client: &ClientKey, now_ms: u64) -> (u64, u64) {
        self.store.current_counts(client, now_ms)
    }

    /// Clear all counters.
    ///
    /// This is primarily useful for testing.
    pub fn clear(&self) {
        self.store.clear();
    }

    /// Get the number of tracked clients.
    pub fn client_count(&self) -> usize {
        self.store.client_count()
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::build(&RateLimitingConfig::default(), Arc::new(SystemClock))
    }
}

/// End of the window's live bucket, or of a window opened now if it has none.
fn window_end_ms(state: &ClientState, kind: WindowKind, now_ms: u64, spec: &WindowSpec) -> u64 {
    state
        .live_window(kind, now_ms, spec)
        .map_or_else(|| now_ms.saturating_add(spec.duration_ms), |w| w.ends_at_ms(spec))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use std::collections::HashMap;
    use std::thread;

    const T0: u64 = 1_700_000_000_000;

    fn client(raw: &str) -> ClientKey {
        ClientKey::parse(raw).unwrap()
    }

    fn limiter_with(short_max: u64, long_max: u64) -> RateLimiter {
        let config = RateLimitingConfig {
            short_window_max: short_max,
            long_window_max: long_max,
            ..RateLimitingConfig::default()
        };
        RateLimiter::new(&config).unwrap()
    }

    #[test]
    fn test_rate_limiter_creation() {
        let limiter = RateLimiter::default();
        assert_eq!(limiter.client_count(), 0);
        assert_eq!(limiter.limits().short, WindowSpec::new(10_000, 10));
        assert_eq!(limiter.limits().long, WindowSpec::new(60_000, 60));
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = RateLimitingConfig {
            short_window_max: 0,
            ..RateLimitingConfig::default()
        };
        assert!(RateLimiter::new(&config).is_err());
    }

    #[test]
    fn test_first_request_admitted_with_headers() {
        let limiter = RateLimiter::default();
        let decision = limiter.check(&client("1.2.3.4"), T0);

        assert!(decision.is_admitted());
        assert_eq!(
            *decision.headers(),
            RateLimitHeaders {
                limit: 60,
                remaining: 59,
                reset: (T0 + 60_000) / 1000,
            }
        );
        assert_eq!(limiter.client_counts(&client("1.2.3.4"), T0), (1, 1));
    }

    #[test]
    fn test_short_window_burst_rejected() {
        let limiter = RateLimiter::default();
        let key = client("1.2.3.4");

        for i in 0..10 {
            let decision = limiter.check(&key, T0 + i * 100);
            assert!(decision.is_admitted(), "Request {} should be admitted", i + 1);
        }

        let decision = limiter.check(&key, T0 + 1_000);
        assert_eq!(decision.reject_kind(), Some(RejectKind::ShortWindowExceeded));
        assert_eq!(decision.headers().limit, 10);
        assert_eq!(decision.headers().remaining, 0);
        assert_eq!(decision.headers().reset, (T0 + 10_000) / 1000);
        match decision {
            Decision::Rejected { message, .. } => {
                assert_eq!(message, "You reached the 10 request limit in 10 seconds");
            }
            Decision::Admitted { .. } => panic!("expected rejection"),
        }
    }

    #[test]
    fn test_rejection_does_not_count() {
        let limiter = RateLimiter::default();
        let key = client("1.2.3.4");

        for _ in 0..10 {
            limiter.check(&key, T0);
        }
        let before = limiter.client_counts(&key, T0 + 500);

        for _ in 0..5 {
            assert!(!limiter.check(&key, T0 + 500).is_admitted());
        }
        assert_eq!(limiter.client_counts(&key, T0 + 500), before);
        assert_eq!(before, (10, 10));
    }

    #[test]
    fn test_short_window_rollover() {
        let limiter = RateLimiter::default();
        let key = client("1.2.3.4");

        for _ in 0..10 {
            limiter.check(&key, T0);
        }
        assert!(!limiter.check(&key, T0 + 9_999).is_admitted());

        // 11 seconds later, still inside the long window
        let decision = limiter.check(&key, T0 + 11_000);
        assert!(decision.is_admitted());
        assert_eq!(decision.headers().remaining, 60 - 11);
        assert_eq!(limiter.client_counts(&key, T0 + 11_000), (1, 11));
    }

    #[test]
    fn test_short_window_reopens_exactly_at_boundary() {
        let limiter = RateLimiter::default();
        let key = client("1.2.3.4");

        for _ in 0..10 {
            limiter.check(&key, T0);
        }
        assert!(limiter.check(&key, T0 + 10_000).is_admitted());
    }

    #[test]
    fn test_long_window_exceeded() {
        let limiter = limiter_with(10, 45);
        let key = client("1.2.3.4");

        // Nine requests per burst window never trip the burst cap.
        let mut sent = 0;
        for window in 0..5 {
            for j in 0..9 {
                let decision = limiter.check(&key, T0 + window * 10_000 + j * 100);
                sent += 1;
                assert!(decision.is_admitted(), "Request {} should be admitted", sent);
                assert_eq!(decision.headers().remaining, 45 - sent);
            }
        }

        let decision = limiter.check(&key, T0 + 50_000);
        assert_eq!(decision.reject_kind(), Some(RejectKind::LongWindowExceeded));
        assert_eq!(decision.headers().limit, 45);
        assert_eq!(decision.headers().remaining, 0);
        assert_eq!(decision.headers().reset, (T0 + 60_000) / 1000);
        assert_eq!(limiter.client_counts(&key, T0 + 50_000), (0, 45));
    }

    #[test]
    fn test_both_windows_saturated_reports_short() {
        let limiter = RateLimiter::default();
        let key = client("1.2.3.4");

        for i in 0..60 {
            assert!(limiter.check(&key, T0 + i * 1_000).is_admitted());
        }

        let decision = limiter.check(&key, T0 + 59_500);
        assert_eq!(decision.reject_kind(), Some(RejectKind::ShortWindowExceeded));
        assert_eq!(limiter.client_counts(&key, T0 + 59_500), (10, 60));
    }

    #[test]
    fn test_short_checked_before_long() {
        let limiter = limiter_with(2, 2);
        let key = client("1.2.3.4");

        limiter.check(&key, T0);
        limiter.check(&key, T0);

        let decision = limiter.check(&key, T0);
        assert_eq!(decision.reject_kind(), Some(RejectKind::ShortWindowExceeded));
    }

    #[test]
    fn test_reset_after_idle_long_window() {
        let limiter = RateLimiter::default();
        let key = client("1.2.3.4");

        for _ in 0..10 {
            limiter.check(&key, T0);
        }
        assert_eq!(limiter.client_counts(&key, T0), (10, 10));

        let later = T0 + 60_000 + 1;
        assert_eq!(limiter.client_counts(&key, later), (0, 0));

        let decision = limiter.check(&key, later);
        assert!(decision.is_admitted());
        assert_eq!(decision.headers().remaining, 59);
        assert_eq!(limiter.client_counts(&key, later), (1, 1));
    }

    #[test]
    fn test_clients_have_separate_counters() {
        let limiter = limiter_with(1, 60);
        let a = client("10.0.0.1");
        let b = client("10.0.0.2");

        assert!(limiter.check(&a, T0).is_admitted());
        assert!(!limiter.check(&a, T0).is_admitted());
        assert!(limiter.check(&b, T0).is_admitted());
        assert_eq!(limiter.client_count(), 2);
    }

    #[test]
    fn test_check_now_uses_clock() {
        let clock = Arc::new(ManualClock::new(T0));
        let config = RateLimitingConfig {
            short_window_max: 1,
            ..RateLimitingConfig::default()
        };
        let limiter = RateLimiter::with_clock(&config, clock.clone()).unwrap();
        let key = client("1.2.3.4");

        assert!(limiter.check_now(&key).is_admitted());
        assert!(!limiter.check_now(&key).is_admitted());

        clock.advance(10_000);
        assert!(limiter.check_now(&key).is_admitted());
    }

    #[test]
    fn test_custom_messages_rendered() {
        let config = RateLimitingConfig {
            long_window_max: 1,
            long_window_message: "{max} per {interval_secs}s".to_string(),
            ..RateLimitingConfig::default()
        };
        let limiter = RateLimiter::new(&config).unwrap();
        let key = client("1.2.3.4");

        limiter.check(&key, T0);
        match limiter.check(&key, T0) {
            Decision::Rejected { kind, message, .. } => {
                assert_eq!(kind, RejectKind::LongWindowExceeded);
                assert_eq!(message, "1 per 60s");
            }
            Decision::Admitted { .. } => panic!("expected rejection"),
        }
    }

    #[test]
    fn test_concurrent_requests_never_overshoot() {
        let limiter = Arc::new(limiter_with(10, 60));
        let key = client("1.2.3.4");

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let limiter = limiter.clone();
                let key = key.clone();
                thread::spawn(move || {
                    (0..20)
                        .filter(|_| limiter.check(&key, T0).is_admitted())
                        .count()
                })
            })
            .collect();

        let admitted: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
        assert_eq!(admitted, 10);
        assert_eq!(limiter.client_counts(&key, T0), (10, 10));
    }

    #[test]
    fn test_concurrent_long_window_cap() {
        let limiter = Arc::new(limiter_with(1_000, 25));
        let key = client("1.2.3.4");

        let handles: Vec<_> = (0..8)
            .map(|t| {
                let limiter = limiter.clone();
                let key = key.clone();
                thread::spawn(move || {
                    (0..10)
                        .filter(|i| limiter.check(&key, T0 + t * 10 + i).is_admitted())
                        .count()
                })
            })
            .collect();

        let admitted: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
        assert_eq!(admitted, 25);
    }

    #[test]
    fn test_adjacent_windows_each_get_full_quota() {
        // Windows are anchored at their first request, so the tail of one
        // window and the head of the next each admit up to the cap.
        let limiter = RateLimiter::default();
        let key = client("1.2.3.4");

        assert!(limiter.check(&key, T0).is_admitted());
        for _ in 0..9 {
            assert!(limiter.check(&key, T0 + 9_900).is_admitted());
        }
        assert!(!limiter.check(&key, T0 + 9_900).is_admitted());

        for _ in 0..10 {
            assert!(limiter.check(&key, T0 + 10_000).is_admitted());
        }
        assert!(!limiter.check(&key, T0 + 10_000).is_admitted());
        assert_eq!(limiter.client_counts(&key, T0 + 10_000), (10, 20));
    }

    #[test]
    fn test_admissions_never_exceed_cap_per_bucket() {
        let limiter = limiter_with(10, 45);
        let limits = *limiter.limits();
        let key = client("1.2.3.4");

        let mut short_buckets: HashMap<u64, u64> = HashMap::new();
        let mut long_buckets: HashMap<u64, u64> = HashMap::new();
        let mut seed: u64 = 0x2545_f491_4f6c_dd1d;
        let mut now = T0;
        let mut admitted = 0;

        for _ in 0..20_000 {
            // xorshift64
            seed ^= seed << 13;
            seed ^= seed >> 7;
            seed ^= seed << 17;

            now += match seed % 100 {
                // idle past the long window
                0 => 61_000 + seed % 30_000,
                1..=9 => seed % 5_000,
                _ => seed % 400,
            };

            if !limiter.check(&key, now).is_admitted() {
                continue;
            }
            admitted += 1;

            let (short, long) = limiter.store.get_or_insert(&key, |state| {
                (
                    state.live_window(WindowKind::Short, now, &limits.short).unwrap(),
                    state.live_window(WindowKind::Long, now, &limits.long).unwrap(),
                )
            });

            let short_total = short_buckets.entry(short.start_ms()).or_default();
            *short_total += 1;
            assert!(
                *short_total <= limits.short.max,
                "short bucket at {} admitted {}",
                short.start_ms(),
                short_total
            );
            assert_eq!(*short_total, short.count());

            let long_total = long_buckets.entry(long.start_ms()).or_default();
            *long_total += 1;
            assert!(
                *long_total <= limits.long.max,
                "long bucket at {} admitted {}",
                long.start_ms(),
                long_total
            );
            assert_eq!(*long_total, long.count());
        }

        assert!(admitted > 1_000);
        assert!(short_buckets.len() > 100);
        assert!(long_buckets.len() > 10);
        assert!(short_buckets.values().any(|&n| n == limits.short.max));
        assert!(long_buckets.values().any(|&n| n == limits.long.max));
    }
}
