//! Cooperative cancellation shared by every suspension point of the relay.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::watch;

use crate::error::{RelayError, Result};
use crate::traits::Clock;

/// Cloneable cancellation flag.
///
/// All clones observe the same flag. A child token is cancelled when its
/// parent is, but cancelling a child leaves the parent untouched, which is how
/// a single job is abandoned without stopping the whole service.
#[derive(Debug, Clone)]
pub struct CancelToken {
    /// Own flag first, followed by every ancestor's flag.
    flags: Vec<Arc<watch::Sender<bool>>>,
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

impl CancelToken {
    pub fn new() -> Self {
        let (sender, _) = watch::channel(false);
        Self {
            flags: vec![Arc::new(sender)],
        }
    }

    /// Token that is also cancelled whenever `self` is.
    pub fn child(&self) -> Self {
        let (sender, _) = watch::channel(false);
        let mut flags = Vec::with_capacity(self.flags.len() + 1);
        flags.push(Arc::new(sender));
        flags.extend(self.flags.iter().cloned());
        Self { flags }
    }

    pub fn cancel(&self) {
        self.flags[0].send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flags.iter().any(|flag| *flag.borrow())
    }

    /// Resolves once this token or one of its ancestors is cancelled.
    pub async fn cancelled(&self) {
        let waits = self.flags.iter().map(|flag| {
            let mut receiver = flag.subscribe();
            Box::pin(async move {
                // Senders live as long as the token, so this only returns on cancel.
                let _ = receiver.wait_for(|cancelled| *cancelled).await;
            })
        });
        futures::future::select_all(waits).await;
    }

    /// Fails with [`RelayError::Cancelled`] if the token is cancelled.
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(RelayError::Cancelled)
        } else {
            Ok(())
        }
    }

    /// Run `fut` unless the token fires first.
    pub async fn run<F, T>(&self, fut: F) -> Result<T>
    where
        F: std::future::Future<Output = Result<T>>,
    {
        tokio::select! {
            biased;
            _ = self.cancelled() => Err(RelayError::Cancelled),
            result = fut => result,
        }
    }

    /// Sleep on `clock` unless the token fires first.
    pub async fn sleep<C: Clock + ?Sized>(&self, clock: &C, duration: Duration) -> Result<()> {
        self.run(async {
            clock.sleep(duration).await;
            Ok(())
        })
        .await
    }
}

/// Point in time after which a job or poll loop gives up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Deadline(Option<Instant>);

impl Deadline {
    pub const NEVER: Deadline = Deadline(None);

    pub fn at(instant: Instant) -> Self {
        Self(Some(instant))
    }

    pub fn after<C: Clock + ?Sized>(clock: &C, timeout: Duration) -> Self {
        Self::at(clock.now() + timeout)
    }

    pub fn is_expired<C: Clock + ?Sized>(&self, clock: &C) -> bool {
        self.0.is_some_and(|deadline| clock.now() >= deadline)
    }

    /// Time left, or `None` for an unbounded deadline.
    pub fn remaining<C: Clock + ?Sized>(&self, clock: &C) -> Option<Duration> {
        self.0
            .map(|deadline| deadline.saturating_duration_since(clock.now()))
    }

    /// The earlier of two deadlines.
    pub fn min(self, other: Deadline) -> Deadline {
        match (self.0, other.0) {
            (Some(a), Some(b)) => Deadline(Some(a.min(b))),
            (Some(a), None) | (None, Some(a)) => Deadline(Some(a)),
            (None, None) => Deadline(None),
        }
    }
}
