//! Token bucket rate limiter, shared by every outbound adapter that must
//! respect an upstream requests-per-minute budget (LLM provider, cloud tool
//! calls).

use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tokio::time::sleep;

pub struct TokenBucketRateLimiter {
    tokens: Arc<Mutex<f64>>,
    capacity: f64,
    refill_rate: f64,
    last_refill: Arc<Mutex<Instant>>,
}

impl TokenBucketRateLimiter {
    /// `requests_per_minute` sets both burst capacity and sustained refill rate.
    pub fn new(requests_per_minute: f64) -> Self {
        assert!(requests_per_minute > 0.0, "requests_per_minute must be positive");
        let refill_rate = requests_per_minute / 60.0;
        Self {
            tokens: Arc::new(Mutex::new(requests_per_minute)),
            capacity: requests_per_minute,
            refill_rate,
            last_refill: Arc::new(Mutex::new(Instant::now())),
        }
    }

    pub async fn acquire(&self) {
        loop {
            let mut tokens = self.tokens.lock().await;
            let mut last_refill = self.last_refill.lock().await;

            let now = Instant::now();
            let elapsed = now.duration_since(*last_refill).as_secs_f64();
            let new_tokens = (*tokens + elapsed * self.refill_rate).min(self.capacity);

            if new_tokens >= 1.0 {
                *tokens = new_tokens - 1.0;
                *last_refill = now;
                return;
            }

            let wait_secs = (1.0 - new_tokens) / self.refill_rate;
            drop(tokens);
            drop(last_refill);
            sleep(Duration::from_secs_f64(wait_secs)).await;
        }
    }

    pub async fn available_tokens(&self) -> f64 {
        let tokens = self.tokens.lock().await;
        let last_refill = self.last_refill.lock().await;
        let now = Instant::now();
        let elapsed = now.duration_since(*last_refill).as_secs_f64();
        (*tokens + elapsed * self.refill_rate).min(self.capacity)
    }
}
