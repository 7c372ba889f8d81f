//! Wall clock for production use.

use async_trait::async_trait;
use std::time::{Duration, Instant};

use crate::traits::Clock;

/// [`Clock`] backed by tokio's timer.
///
/// Tests use [`FakeClock`](crate::testing::FakeClock) instead, which records
/// sleeps and advances its own notion of now without waiting.
///
/// ```rust
/// use ccmp_relayer::providers::TokioClock;
/// use ccmp_relayer::traits::Clock;
///
/// let clock = TokioClock::new();
/// let before = clock.now();
/// assert!(clock.now() >= before);
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioClock;

impl TokioClock {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Clock for TokioClock {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }

    /// Read through tokio so paused test time is observed as well.
    fn now(&self) -> Instant {
        tokio::time::Instant::now().into_std()
    }
}
