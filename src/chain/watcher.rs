//! Following a gateway's routed-message logs by polling block ranges.

use alloy_primitives::{Address, B256};
use futures::Stream;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::RawLogEvent;
use crate::cancel::CancelToken;
use crate::error::{RelayError, Result};
use crate::traits::{ChainClient, Clock};

/// Polling parameters for a [`LogSubscription`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubscriptionConfig {
    /// Block to start from; `None` starts at the current head.
    pub start_block: Option<u64>,
    /// Blocks to stay behind the head, so shallow reorgs are not observed.
    pub confirmations: u64,
    /// Largest block range requested in one `eth_getLogs` call.
    pub max_block_range: u64,
    /// Delay between head checks once caught up, and after provider errors.
    pub poll_interval: Duration,
}

impl Default for SubscriptionConfig {
    fn default() -> Self {
        Self {
            start_block: None,
            confirmations: 0,
            max_block_range: 2_000,
            poll_interval: Duration::from_secs(2),
        }
    }
}

/// Infinite, restartable sequence of logs emitted by one contract.
///
/// The subscription keeps a cursor: the next block it has not yet read. The
/// cursor only moves after a block range was fetched successfully, so a
/// dropped connection replays from the last block seen instead of skipping
/// ahead. Persisting [`LogSubscription::cursor`] and passing it back as
/// `start_block` resumes across restarts.
pub struct LogSubscription<C: Clock> {
    client: Arc<dyn ChainClient>,
    clock: C,
    address: Address,
    topics: Vec<B256>,
    config: SubscriptionConfig,
    cursor: Option<u64>,
    buffer: VecDeque<RawLogEvent>,
}

impl<C: Clock> LogSubscription<C> {
    pub fn new(
        client: Arc<dyn ChainClient>,
        clock: C,
        address: Address,
        topics: Vec<B256>,
        config: SubscriptionConfig,
    ) -> Self {
        Self {
            client,
            clock,
            address,
            topics,
            cursor: config.start_block,
            config,
            buffer: VecDeque::new(),
        }
    }

    /// Next block that has not been read yet.
    pub fn cursor(&self) -> Option<u64> {
        self.cursor
    }

    /// Wait for the next log.
    ///
    /// Provider errors are logged and retried after `poll_interval`; the only
    /// way out is cancellation.
    pub async fn next(&mut self, cancel: &CancelToken) -> Result<RawLogEvent> {
        loop {
            if let Some(event) = self.buffer.pop_front() {
                return Ok(event);
            }

            cancel.check()?;

            match self.poll_once(cancel).await {
                Ok(true) => continue,
                Ok(false) => {}
                Err(RelayError::Cancelled) => return Err(RelayError::Cancelled),
                Err(e) => {
                    warn!(
                        chain_id = self.client.chain_id(),
                        cursor = ?self.cursor,
                        error = %e,
                        event = "log_poll_failed"
                    );
                }
            }

            cancel.sleep(&self.clock, self.config.poll_interval).await?;
        }
    }

    /// Fetch one block range. Returns whether the cursor moved.
    async fn poll_once(&mut self, cancel: &CancelToken) -> Result<bool> {
        let head = cancel.run(self.client.block_number()).await?;
        let safe_head = head.saturating_sub(self.config.confirmations);

        let from_block = match self.cursor {
            Some(cursor) => cursor,
            None => {
                info!(
                    chain_id = self.client.chain_id(),
                    gateway = %self.address,
                    start_block = safe_head,
                    event = "log_subscription_started"
                );
                self.cursor = Some(safe_head);
                safe_head
            }
        };

        if from_block > safe_head {
            return Ok(false);
        }

        let to_block = safe_head.min(from_block + self.config.max_block_range.max(1) - 1);
        let logs = cancel
            .run(
                self.client
                    .get_logs(self.address, &self.topics, from_block, to_block),
            )
            .await?;

        debug!(
            chain_id = self.client.chain_id(),
            from_block = from_block,
            to_block = to_block,
            log_count = logs.len(),
            event = "log_range_fetched"
        );

        self.buffer.extend(logs);
        self.cursor = Some(to_block + 1);
        Ok(true)
    }

    /// Adapt into a [`Stream`] that ends when `cancel` fires.
    pub fn into_stream(self, cancel: CancelToken) -> impl Stream<Item = RawLogEvent> + Send
    where
        C: 'static,
    {
        futures::stream::unfold((self, cancel), |(mut subscription, cancel)| async move {
            match subscription.next(&cancel).await {
                Ok(event) => Some((event, (subscription, cancel))),
                Err(_) => None,
            }
        })
    }
}
