//! Core trait abstractions for the relay.
//!
//! Every external collaborator of the relay sits behind one of these traits:
//! chain RPC endpoints, the Wormhole guardian REST API, the Axelar GMP status
//! API, the Hyperlane destination mailbox and the clock. Production
//! implementations live in [`crate::providers`]; the fakes in
//! [`crate::testing`] drive the same code paths in tests, including slow
//! guardians, flaky RPC endpoints and reverted submissions.
//!
//! # Example: Implementing a Test Fake
//!
//! ```rust,ignore
//! use ccmp_relayer::traits::GuardianApi;
//! use ccmp_relayer::transport::VaaId;
//!
//! struct AlwaysSigned(Bytes);
//!
//! #[async_trait::async_trait]
//! impl GuardianApi for AlwaysSigned {
//!     async fn get_signed_vaa(&self, _id: &VaaId) -> Result<Option<Bytes>> {
//!         Ok(Some(self.0.clone()))
//!     }
//! }
//! ```

use alloy_primitives::{Address, Bytes, TxHash, B256};
use async_trait::async_trait;
use std::time::{Duration, Instant};

use crate::chain::{DestinationCall, RawLogEvent, TxReceipt};
use crate::error::Result;
use crate::transport::{ExecuteParams, GmpStatusResponse, VaaId};

/// RPC operations against a single chain.
///
/// One client exists per configured chain. Source chains use the read side
/// (logs, receipts, head), destination chains additionally use
/// [`ChainClient::submit`], which signs with the relayer account.
///
/// # Test Scenarios
///
/// Implementing this trait with fakes enables testing:
/// - Receipts that are not mined yet
/// - Provider disconnects while following logs
/// - Reverts with decoded custom errors
/// - Slow confirmation depth
#[async_trait]
pub trait ChainClient: Send + Sync {
    /// EIP-155 chain id this client talks to.
    fn chain_id(&self) -> u64;

    /// Current head block number.
    async fn block_number(&self) -> Result<u64>;

    /// Logs emitted by `address` whose first topic is one of `topics`, in
    /// the inclusive block range.
    async fn get_logs(
        &self,
        address: Address,
        topics: &[B256],
        from_block: u64,
        to_block: u64,
    ) -> Result<Vec<RawLogEvent>>;

    /// Receipt of a mined transaction.
    ///
    /// # Errors
    ///
    /// Fails with [`RelayError::NotFound`](crate::RelayError::NotFound) until
    /// the transaction is mined; callers poll.
    async fn get_receipt(&self, tx_hash: TxHash) -> Result<TxReceipt>;

    /// Sign and broadcast a destination call.
    ///
    /// # Errors
    ///
    /// - [`RelayError::ContractRevert`](crate::RelayError::ContractRevert) when
    ///   the node reports revert data, with the decoded reason
    /// - [`RelayError::TransientRpc`](crate::RelayError::TransientRpc) for
    ///   transport failures, which may be retried
    async fn submit(&self, call: &DestinationCall) -> Result<TxHash>;
}

/// Wormhole guardian network REST API.
#[async_trait]
pub trait GuardianApi: Send + Sync {
    /// Signed VAA for the given emitter and sequence.
    ///
    /// Returns `Ok(None)` while the guardians have not signed it yet.
    async fn get_signed_vaa(&self, id: &VaaId) -> Result<Option<Bytes>>;
}

/// Axelar GMP status API.
///
/// # Test Scenarios
///
/// - Status progressions (called → confirmed → approved → executed)
/// - Recoverable polling errors in between
/// - Terminal error statuses
#[async_trait]
pub trait AxelarGmpApi: Send + Sync {
    /// Current GMP status of the call emitted by `tx_hash`.
    async fn query_transaction_status(&self, tx_hash: TxHash) -> Result<GmpStatusResponse>;

    /// Parameters needed to execute the approved call on the destination.
    async fn query_execute_params(&self, tx_hash: TxHash) -> Result<ExecuteParams>;
}

/// Hyperlane destination mailbox.
#[async_trait]
pub trait DeliveryOracle: Send + Sync {
    /// Whether `message_id` has been processed by the mailbox.
    async fn is_delivered(&self, message_id: B256) -> Result<bool>;
}

/// Trait for time-based operations.
///
/// This trait abstracts sleep and time queries, enabling fast-forward testing
/// where tests can instantly advance through polling loops and timeouts without
/// actually waiting.
///
/// # Test Scenarios
///
/// Implementing this trait with fakes enables testing:
/// - Deadlines without waiting
/// - Poll interval correctness
/// - Retry backoff schedules
#[async_trait]
pub trait Clock: Send + Sync {
    /// Asynchronously sleeps for the given duration.
    async fn sleep(&self, duration: Duration);

    /// Returns the current instant in time.
    ///
    /// Used for deadlines and measuring elapsed time.
    fn now(&self) -> Instant;
}
