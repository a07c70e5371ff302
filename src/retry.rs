//! Bounded retry policy and the sleep seam used between attempts.

use std::time::Duration;

use async_trait::async_trait;

/// Fixed-backoff retry policy: at most `max_attempts` tries, `backoff` between them.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, backoff: Duration) -> Self {
        Self { max_attempts, backoff }
    }

    /// True when another attempt follows the (0-based) `attempt`.
    pub fn has_next(&self, attempt: u32) -> bool {
        attempt + 1 < self.max_attempts
    }
}

/// Blocking pause between attempts; injected so tests never wait on a real clock.
#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

/// Production sleeper backed by the tokio timer.
#[derive(Clone, Copy, Debug, Default)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::sync::Mutex;

    /// Returns immediately and remembers every requested pause.
    #[derive(Default)]
    pub struct RecordingSleeper {
        pub calls: Mutex<Vec<Duration>>,
    }

    impl RecordingSleeper {
        pub fn calls(&self) -> Vec<Duration> {
            self.calls.lock().expect("lock poisoned").clone()
        }
    }

    #[async_trait]
    impl Sleeper for RecordingSleeper {
        async fn sleep(&self, duration: Duration) {
            self.calls.lock().expect("lock poisoned").push(duration);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn has_next_is_bounded() {
        let p = RetryPolicy::new(3, Duration::from_secs(2));
        assert!(p.has_next(0));
        assert!(p.has_next(1));
        assert!(!p.has_next(2));
        assert!(!RetryPolicy::new(1, Duration::ZERO).has_next(0));
    }

    #[tokio::test(start_paused = true)]
    async fn tokio_sleeper_advances_virtual_clock() {
        let start = tokio::time::Instant::now();
        TokioSleeper.sleep(Duration::from_secs(2)).await;
        assert!(start.elapsed() >= Duration::from_secs(2));
    }
}
