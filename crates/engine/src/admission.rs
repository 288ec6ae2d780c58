//! Admission gate: a lazily refilled token bucket.
//!
//! Every engine operation takes one token. Tokens refill at `rate` per
//! second up to `capacity`, computed from the time elapsed since the last
//! call; there is no background timer. Tokens are fractional, so a burst of
//! calls a few milliseconds apart still accumulates refill.
use std::sync::{Mutex, PoisonError};
use std::time::Instant;

#[derive(Debug)]
struct Bucket {
    tokens: f64,
    last_refill: Instant,
}

#[derive(Debug)]
pub struct TokenBucket {
    capacity: f64,
    rate: f64,
    bucket: Mutex<Bucket>,
}

impl TokenBucket {
    /// Creates a full bucket. A `rate` of 0 never refills.
    pub fn new(capacity: u64, rate: u64) -> Self {
        Self {
            capacity: capacity as f64,
            rate: rate as f64,
            bucket: Mutex::new(Bucket {
                tokens: capacity as f64,
                last_refill: Instant::now(),
            }),
        }
    }

    /// Consumes one token if available.
    pub fn take(&self) -> bool {
        self.take_at(Instant::now())
    }

    /// [`take`](TokenBucket::take) with an explicit clock reading.
    pub fn take_at(&self, now: Instant) -> bool {
        let mut bucket = self.bucket.lock().unwrap_or_else(PoisonError::into_inner);
        let elapsed = now.saturating_duration_since(bucket.last_refill).as_secs_f64();
        bucket.tokens = (bucket.tokens + elapsed * self.rate).min(self.capacity);
        bucket.last_refill = now.max(bucket.last_refill);

        if bucket.tokens >= 1.0 {
            bucket.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    /// Tokens currently in the bucket, without refilling.
    #[must_use]
    pub fn available(&self) -> f64 {
        self.bucket.lock().unwrap_or_else(PoisonError::into_inner).tokens
    }

    #[must_use]
    pub fn capacity(&self) -> u64 {
        self.capacity as u64
    }
}
