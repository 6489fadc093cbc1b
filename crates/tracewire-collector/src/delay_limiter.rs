//! At-most-once-per-TTL gating.
//!
//! Wraps actions that are wasteful to repeat for the same input in quick
//! succession, like re-warning about the same malformed producer on
//! every message it sends. Cardinality is bounded so a flood of distinct
//! keys cannot grow the gate without limit.

use std::hash::Hash;
use std::time::Duration;

use moka::sync::Cache;

pub struct DelayLimiter<K> {
    seen: Cache<K, ()>,
}

impl<K> DelayLimiter<K>
where
    K: Hash + Eq + Send + Sync + 'static,
{
    pub fn new(ttl: Duration, max_keys: u64) -> DelayLimiter<K> {
        DelayLimiter {
            seen: Cache::builder()
                .time_to_live(ttl)
                .max_capacity(max_keys)
                .build(),
        }
    }

    /// True only the first time `key` is seen within the TTL window.
    pub fn should_invoke(&self, key: K) -> bool {
        self.seen.entry(key).or_insert(()).is_fresh()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mutes_repeats_during_the_delay_period() {
        let limiter: DelayLimiter<u64> =
            DelayLimiter::new(Duration::from_secs(60), 1_000);

        assert!(limiter.should_invoke(0));
        assert!(!limiter.should_invoke(0));
        assert!(!limiter.should_invoke(0));
    }

    #[test]
    fn keys_are_independent() {
        let limiter: DelayLimiter<u64> =
            DelayLimiter::new(Duration::from_secs(60), 1_000);

        assert!(limiter.should_invoke(0));
        assert!(!limiter.should_invoke(0));
        assert!(limiter.should_invoke(1));
        assert!(!limiter.should_invoke(1));
    }

    #[test]
    fn unmutes_after_the_ttl_expires() {
        let limiter: DelayLimiter<u64> =
            DelayLimiter::new(Duration::from_millis(20), 1_000);

        assert!(limiter.should_invoke(0));
        assert!(!limiter.should_invoke(0));
        std::thread::sleep(Duration::from_millis(50));
        assert!(limiter.should_invoke(0));
    }
}
