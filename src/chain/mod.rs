//! Chain-side building blocks: the raw data the relay reads from and writes to
//! a chain, the per-chain registry and log following.

mod registry;
mod watcher;

pub use registry::{ChainHandle, ChainRegistry};
pub use watcher::{LogSubscription, SubscriptionConfig};

use alloy_primitives::{Address, Bytes, TxHash, B256};
use alloy_rpc_types::Log;
use std::time::Duration;
use tracing::{debug, warn, Instrument};

use crate::cancel::{CancelToken, Deadline};
use crate::error::{RelayError, Result};
use crate::spans;
use crate::traits::{ChainClient, Clock};

/// A log as returned by `eth_getLogs` or found in a receipt, reduced to what
/// the relay needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawLogEvent {
    pub address: Address,
    pub topics: Vec<B256>,
    pub data: Bytes,
    pub block_number: Option<u64>,
    pub transaction_hash: Option<TxHash>,
    pub log_index: Option<u64>,
}

impl RawLogEvent {
    /// Event selector, if the log has one.
    pub fn topic0(&self) -> Option<B256> {
        self.topics.first().copied()
    }
}

impl From<&Log> for RawLogEvent {
    fn from(log: &Log) -> Self {
        Self {
            address: log.address(),
            topics: log.topics().to_vec(),
            data: log.data().data.clone(),
            block_number: log.block_number,
            transaction_hash: log.transaction_hash,
            log_index: log.log_index,
        }
    }
}

/// Mined transaction as seen by the relay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxReceipt {
    pub transaction_hash: TxHash,
    pub block_number: u64,
    /// `false` if the transaction reverted
    pub success: bool,
    pub logs: Vec<RawLogEvent>,
}

impl TxReceipt {
    /// Logs emitted by `address` with the given event selector.
    pub fn logs_matching(
        &self,
        address: Address,
        topic0: B256,
    ) -> impl Iterator<Item = &RawLogEvent> + '_ {
        self.logs
            .iter()
            .filter(move |log| log.address == address && log.topic0() == Some(topic0))
    }
}

/// Fully encoded destination transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DestinationCall {
    pub chain_id: u64,
    /// Destination gateway
    pub to: Address,
    pub calldata: Bytes,
    pub gas_limit: Option<u64>,
    /// Legacy gas price in wei
    pub gas_price: Option<u128>,
}

/// Wait until `tx_hash` is buried under `confirmations` blocks.
///
/// A receipt at block `b` has `head - b + 1` confirmations. Missing receipts
/// and retryable RPC errors are polled through; a reverted receipt fails
/// immediately.
///
/// # Errors
///
/// - [`RelayError::TransactionReverted`] if the transaction was mined and reverted
/// - [`RelayError::ConfirmationTimeout`] once `deadline` passes
/// - [`RelayError::Cancelled`] if `cancel` fires
pub async fn wait_for_confirmations<C: Clock + ?Sized>(
    client: &dyn ChainClient,
    clock: &C,
    tx_hash: TxHash,
    confirmations: u64,
    poll_interval: Duration,
    deadline: Deadline,
    cancel: &CancelToken,
) -> Result<TxReceipt> {
    let required = confirmations.max(1);
    let span = spans::wait_for_confirmation(tx_hash, client.chain_id(), required);

    async move {
        loop {
            cancel.check()?;

            match cancel.run(client.get_receipt(tx_hash)).await {
                Ok(receipt) if !receipt.success => {
                    spans::record_error_with_context(
                        "TransactionReverted",
                        &format!("Transaction {tx_hash} reverted"),
                        Some(&format!("block {}", receipt.block_number)),
                    );
                    return Err(RelayError::TransactionReverted { tx_hash });
                }
                Ok(receipt) => {
                    let head = cancel.run(client.block_number()).await?;
                    let depth = (head + 1).saturating_sub(receipt.block_number);
                    debug!(
                        block_number = receipt.block_number,
                        head = head,
                        depth = depth,
                        required = required,
                        event = "confirmation_depth_checked"
                    );
                    if depth >= required {
                        return Ok(receipt);
                    }
                }
                Err(RelayError::NotFound { .. }) => {
                    debug!(event = "receipt_not_found");
                }
                Err(e) if e.is_retryable() => {
                    warn!(error = %e, event = "receipt_poll_failed");
                }
                Err(e) => return Err(e),
            }

            if deadline.is_expired(clock) {
                return Err(RelayError::ConfirmationTimeout {
                    tx_hash,
                    confirmations: required,
                });
            }

            let delay = deadline
                .remaining(clock)
                .map_or(poll_interval, |remaining| poll_interval.min(remaining));
            cancel.sleep(clock, delay).await?;
        }
    }
    .instrument(span)
    .await
}
