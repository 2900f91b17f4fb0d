//! Sliding-window request and token limiter for provider clients

use std::collections::VecDeque;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

const WINDOW: Duration = Duration::from_secs(60);

/// Per-provider limiter over a one-minute sliding window
pub struct RateLimiter {
    requests_per_minute: u32,
    tokens_per_minute: u32,
    last_requests: Mutex<VecDeque<Instant>>,
    token_usage: Mutex<VecDeque<(Instant, u32)>>,
}

impl RateLimiter {
    pub fn new(requests_per_minute: u32, tokens_per_minute: u32) -> Self {
        Self {
            requests_per_minute: requests_per_minute.max(1),
            tokens_per_minute,
            last_requests: Mutex::new(VecDeque::new()),
            token_usage: Mutex::new(VecDeque::new()),
        }
    }

    /// Wait until the token budget and a request slot are free, then claim the slot
    pub async fn acquire(&self) -> RateLimitGuard {
        loop {
            if let Some(wait) = self.token_wait().await {
                tracing::debug!("Token budget spent, waiting {:?}", wait);
                tokio::time::sleep(wait).await;
                continue;
            }

            let wait = {
                let mut last = self.last_requests.lock().await;
                let now = Instant::now();
                prune(&mut last, now, |t| *t);

                if last.len() < self.requests_per_minute as usize {
                    last.push_back(now);
                    None
                } else {
                    last.front()
                        .map(|&oldest| WINDOW.saturating_sub(now.duration_since(oldest)) + Duration::from_millis(10))
                }
            };

            match wait {
                None => return RateLimitGuard { _private: () },
                Some(wait) => {
                    tracing::debug!("Request window full, waiting {:?}", wait);
                    tokio::time::sleep(wait).await;
                }
            }
        }
    }

    // Time until the oldest recorded usage leaves the window, if the budget is spent
    async fn token_wait(&self) -> Option<Duration> {
        let mut usage = self.token_usage.lock().await;
        let now = Instant::now();
        prune(&mut usage, now, |(t, _)| *t);

        let used: u64 = usage.iter().map(|(_, t)| u64::from(*t)).sum();
        if used < u64::from(self.tokens_per_minute) {
            return None;
        }
        usage
            .front()
            .map(|&(oldest, _)| WINDOW.saturating_sub(now.duration_since(oldest)) + Duration::from_millis(10))
    }

    /// Record token usage for the current window
    pub async fn record_tokens(&self, tokens: u32) {
        let mut usage = self.token_usage.lock().await;
        let now = Instant::now();
        prune(&mut usage, now, |(t, _)| *t);
        usage.push_back((now, tokens));
    }

    /// Tokens used in the last minute
    pub async fn current_token_usage(&self) -> u32 {
        let mut usage = self.token_usage.lock().await;
        prune(&mut usage, Instant::now(), |(t, _)| *t);
        usage.iter().map(|(_, t)| t).sum()
    }

    pub async fn has_token_capacity(&self, needed: u32) -> bool {
        self.current_token_usage().await + needed <= self.tokens_per_minute
    }
}

fn prune<T>(queue: &mut VecDeque<T>, now: Instant, at: impl Fn(&T) -> Instant) {
    while let Some(front) = queue.front() {
        if now.duration_since(at(front)) > WINDOW {
            queue.pop_front();
        } else {
            break;
        }
    }
}

/// Held for the duration of a request
pub struct RateLimitGuard {
    _private: (),
}
