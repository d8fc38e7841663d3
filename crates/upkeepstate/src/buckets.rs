use parking_lot::Mutex;
use std::collections::HashMap;

/// A set of token buckets keyed by string, without any refill over time.
///
/// A key seen for the first time starts with a full bucket. All the buckets are refilled at once
/// by [`TokenBuckets::reset`].
#[derive(Debug)]
pub struct TokenBuckets {
    max_tokens: u32,
    buckets: Mutex<HashMap<String, u32>>,
}

impl TokenBuckets {
    /// Returns new empty [`TokenBuckets`] with the provided capacity per key.
    pub fn new(max_tokens: u32) -> Self {
        Self { max_tokens, buckets: Mutex::new(HashMap::new()) }
    }

    /// Takes `cost` tokens from the bucket of the key. Returns false, without taking any token,
    /// if the bucket holds less than `cost`.
    pub fn accept(&self, key: &str, cost: u32) -> bool {
        let mut buckets = self.buckets.lock();
        let bucket = buckets.entry(key.to_string()).or_insert(self.max_tokens);
        if *bucket < cost {
            return false;
        }
        *bucket -= cost;
        true
    }

    /// Drops every bucket.
    pub fn reset(&self) {
        self.buckets.lock().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_should_store_first_seen_bucket() {
        let buckets = TokenBuckets::new(3);

        assert!(buckets.accept("a", 2));
        // the remaining token is kept for the key.
        assert!(!buckets.accept("a", 2));
        assert!(buckets.accept("a", 1));
        assert!(!buckets.accept("a", 1));

        // other keys are independent.
        assert!(buckets.accept("b", 3));
    }

    #[test]
    fn test_should_refill_on_reset() {
        let buckets = TokenBuckets::new(1);
        assert!(buckets.accept("a", 1));
        assert!(!buckets.accept("a", 1));

        buckets.reset();

        assert!(buckets.accept("a", 1));
        assert!(!buckets.accept("b", 2));
    }
}
