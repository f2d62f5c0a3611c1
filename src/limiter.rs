//! Per-host rate limiting
//!
//! Enforces a minimum interval between requests to the same host. The
//! per-host timestamp is guarded by its own async mutex and the lock is held
//! across the wait, so two concurrent workers targeting one host cannot both
//! observe a free turn. Different hosts proceed independently.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

/// Shared rate limiter keyed by destination host
///
/// Cheap to clone via `Arc`; every fetcher working on one capture holds a
/// reference to the same limiter.
pub struct HostRateLimiter {
    min_interval: Duration,
    hosts: Mutex<HashMap<String, Arc<Mutex<Option<Instant>>>>>,
}

impl HostRateLimiter {
    /// Creates a limiter enforcing `min_interval` between same-host requests
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            hosts: Mutex::new(HashMap::new()),
        }
    }

    /// Blocks until at least `min_interval` has elapsed since the last
    /// permitted request to `host`, then records this turn.
    pub async fn await_turn(&self, host: &str) {
        let slot = {
            let mut hosts = self.hosts.lock().await;
            hosts
                .entry(host.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(None)))
                .clone()
        };

        // Hold the per-host lock across the sleep so concurrent callers for
        // the same host serialize instead of racing the timestamp.
        let mut last = slot.lock().await;
        if let Some(prev) = *last {
            let elapsed = prev.elapsed();
            if elapsed < self.min_interval {
                tokio::time::sleep(self.min_interval - elapsed).await;
            }
        }
        *last = Some(Instant::now());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_first_turn_is_immediate() {
        let limiter = HostRateLimiter::new(Duration::from_millis(200));
        let start = Instant::now();
        limiter.await_turn("example.com").await;
        assert!(start.elapsed() < Duration::from_millis(100));
    }

    #[tokio::test]
    async fn test_second_turn_waits_min_interval() {
        let limiter = HostRateLimiter::new(Duration::from_millis(100));
        limiter.await_turn("example.com").await;
        let start = Instant::now();
        limiter.await_turn("example.com").await;
        assert!(start.elapsed() >= Duration::from_millis(90));
    }

    #[tokio::test]
    async fn test_hosts_are_independent() {
        let limiter = HostRateLimiter::new(Duration::from_millis(500));
        limiter.await_turn("a.example.com").await;
        let start = Instant::now();
        limiter.await_turn("b.example.com").await;
        assert!(start.elapsed() < Duration::from_millis(100));
    }

    #[tokio::test]
    async fn test_concurrent_same_host_callers_serialize() {
        let limiter = Arc::new(HostRateLimiter::new(Duration::from_millis(100)));
        let starts = Arc::new(Mutex::new(Vec::new()));

        let mut handles = Vec::new();
        for _ in 0..3 {
            let limiter = limiter.clone();
            let starts = starts.clone();
            handles.push(tokio::spawn(async move {
                limiter.await_turn("example.com").await;
                starts.lock().await.push(Instant::now());
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let mut times = starts.lock().await.clone();
        times.sort();
        for pair in times.windows(2) {
            assert!(
                pair[1].duration_since(pair[0]) >= Duration::from_millis(90),
                "permitted turns closer than the configured interval"
            );
        }
    }
}
