//! Rate limiting utilities
//!
//! Provides a rolling-window limiter that bounds how many requests may be issued in any
//! window of fixed length. Callers are delayed, never rejected.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

/// Default rolling window length
pub const DEFAULT_WINDOW: Duration = Duration::from_secs(60);

/// Rolling-window rate limiter
///
/// Keeps the issue time of every request granted inside the current window. A grant is
/// recorded under the same lock that performed the occupancy check, so concurrent
/// callers can never both slip past the threshold. Callers that must wait keep holding
/// the lock while they sleep, which makes the limiter first-come first-served.
///
/// Cloning is cheap and every clone shares the same window.
///
/// # Example
///
/// ```rust
/// use tooling::rate_limit::RateLimiter;
///
/// # async fn demo() {
/// // 20 requests per rolling minute
/// let limiter = RateLimiter::per_minute(20);
/// limiter.acquire().await;
/// # }
/// ```
#[derive(Clone)]
pub struct RateLimiter {
    state: Arc<Mutex<WindowState>>,
}

struct WindowState {
    /// Maximum grants inside one window
    max_requests: usize,

    /// Window duration
    window: Duration,

    /// Grant times, oldest first
    issued: VecDeque<Instant>,
}

impl WindowState {
    /// Drop grants that have left the window ending at `now`
    fn evict(&mut self, now: Instant) {
        while let Some(&oldest) = self.issued.front() {
            if now.duration_since(oldest) >= self.window {
                self.issued.pop_front();
            } else {
                break;
            }
        }
    }
}

impl std::fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimiter").finish_non_exhaustive()
    }
}

impl RateLimiter {
    /// Create a limiter allowing `max_requests` grants per `window`
    ///
    /// A cap of zero is raised to one; a limiter that can never grant would deadlock
    /// every caller.
    pub fn new(max_requests: usize, window: Duration) -> Self {
        Self {
            state: Arc::new(Mutex::new(WindowState {
                max_requests: max_requests.max(1),
                window,
                issued: VecDeque::with_capacity(max_requests.max(1)),
            })),
        }
    }

    /// Create a limiter over the default 60 second window
    pub fn per_minute(max_requests: usize) -> Self {
        Self::new(max_requests, DEFAULT_WINDOW)
    }

    /// Wait until a request may be issued, then record it
    ///
    /// Returns how long the caller was delayed.
    pub async fn acquire(&self) -> Duration {
        let started = Instant::now();
        let mut state = self.state.lock().await;

        loop {
            let now = Instant::now();
            state.evict(now);

            if state.issued.len() < state.max_requests {
                state.issued.push_back(now);
                return now.duration_since(started);
            }

            // The window is full, so the front entry exists.
            let Some(&oldest) = state.issued.front() else {
                continue;
            };
            let free_at = oldest + state.window;
            tracing::debug!(
                occupied = state.issued.len(),
                wait_ms = free_at.saturating_duration_since(now).as_millis() as u64,
                "Rate limit window full, waiting"
            );
            tokio::time::sleep_until(free_at).await;
        }
    }

    /// Record a request if the window has room, without waiting
    ///
    /// # Returns
    ///
    /// `true` if a slot was taken, `false` if the window is full
    pub async fn try_acquire(&self) -> bool {
        let mut state = self.state.lock().await;
        let now = Instant::now();
        state.evict(now);

        if state.issued.len() < state.max_requests {
            state.issued.push_back(now);
            true
        } else {
            false
        }
    }

    /// Number of grants currently inside the window
    pub async fn count(&self) -> usize {
        let mut state = self.state.lock().await;
        state.evict(Instant::now());
        state.issued.len()
    }

    /// Configured grants per window
    pub async fn capacity(&self) -> usize {
        self.state.lock().await.max_requests
    }

    /// Forget every recorded grant
    pub async fn reset(&self) {
        self.state.lock().await.issued.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[tokio::test(start_paused = true)]
    async fn test_grants_up_to_capacity_without_waiting() {
        let limiter = RateLimiter::new(3, Duration::from_secs(60));

        for _ in 0..3 {
            assert_eq!(limiter.acquire().await, Duration::ZERO);
        }
        assert_eq!(limiter.count().await, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_waits_for_oldest_to_leave_window() {
        let limiter = RateLimiter::new(2, Duration::from_secs(60));

        limiter.acquire().await;
        tokio::time::advance(Duration::from_secs(10)).await;
        limiter.acquire().await;

        let waited = limiter.acquire().await;
        // The first grant leaves the window 60s after it was taken, 50s from here.
        assert_eq!(waited, Duration::from_secs(50));
    }

    #[tokio::test(start_paused = true)]
    async fn test_try_acquire_does_not_wait() {
        let limiter = RateLimiter::new(1, Duration::from_secs(60));

        assert!(limiter.try_acquire().await);
        assert!(!limiter.try_acquire().await);

        tokio::time::advance(Duration::from_secs(60)).await;
        assert!(limiter.try_acquire().await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reset_clears_window() {
        let limiter = RateLimiter::new(2, Duration::from_secs(60));
        limiter.acquire().await;
        limiter.acquire().await;
        assert_eq!(limiter.count().await, 2);

        limiter.reset().await;
        assert_eq!(limiter.count().await, 0);
    }

    #[tokio::test]
    async fn test_zero_capacity_is_raised_to_one() {
        let limiter = RateLimiter::per_minute(0);
        assert_eq!(limiter.capacity().await, 1);
        assert!(limiter.try_acquire().await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_callers_never_exceed_cap() {
        let limiter = RateLimiter::new(3, Duration::from_secs(60));
        let grants = Arc::new(std::sync::Mutex::new(Vec::new()));

        let mut handles = Vec::new();
        for _ in 0..10 {
            let limiter = limiter.clone();
            let grants = grants.clone();
            handles.push(tokio::spawn(async move {
                limiter.acquire().await;
                grants.lock().unwrap().push(Instant::now());
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let mut grants = grants.lock().unwrap().clone();
        grants.sort();
        assert_eq!(grants.len(), 10);
        assert_window_bound(&grants, 3, Duration::from_secs(60));
    }

    fn assert_window_bound(grants: &[Instant], cap: usize, window: Duration) {
        for (i, start) in grants.iter().enumerate() {
            let inside = grants[i..]
                .iter()
                .take_while(|t| t.duration_since(*start) < window)
                .count();
            assert!(inside <= cap, "{} grants inside one window, cap {}", inside, cap);
        }
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        #[test]
        fn prop_any_window_holds_at_most_cap(
            cap in 1usize..5,
            gaps in proptest::collection::vec(0u64..30, 1..25),
        ) {
            let rt = tokio::runtime::Builder::new_current_thread()
                .enable_time()
                .start_paused(true)
                .build()
                .unwrap();

            let grants = rt.block_on(async {
                let limiter = RateLimiter::new(cap, Duration::from_secs(60));
                let mut grants = Vec::new();
                for gap in gaps {
                    tokio::time::advance(Duration::from_secs(gap)).await;
                    limiter.acquire().await;
                    grants.push(Instant::now());
                }
                grants
            });

            assert_window_bound(&grants, cap, Duration::from_secs(60));
        }
    }
}
