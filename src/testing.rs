//! Test utilities and fake implementations of the relay's collaborators.
//!
//! The fakes implement the traits in [`crate::traits`] with pre-configured
//! responses so the relay can be driven through slow guardians, flaky RPC
//! endpoints, reverted submissions and racing workers without any network.
//! They are used by the unit tests of this crate and by the integration tests
//! under `tests/`.

use alloy_primitives::{address, keccak256, Address, Bytes, LogData, TxHash, B256, U256};
use alloy_sol_types::SolEvent;
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crate::chain::{DestinationCall, RawLogEvent, TxReceipt};
use crate::codec::encode_routed_event;
use crate::contracts::hyperlane::Mailbox::DispatchId;
use crate::contracts::wormhole::LogMessagePublished;
use crate::protocol::{
    CrossChainMessage, EventLayout, FeePaymentMode, GasFeePaymentArgs, OperationType,
    PayloadOperation,
};
use crate::traits::{AxelarGmpApi, ChainClient, Clock, DeliveryOracle, GuardianApi};
use crate::transport::{ExecuteParams, GmpStatus, GmpStatusResponse, VaaId};
use crate::{RelayError, Result};

/// Gateway address used by [`sample_message`] on both chains.
pub const GATEWAY: Address = address!("404172100D6A428F5Eae378650f4259CC803de7c");

/// Source adaptor used by [`sample_message`].
pub const SOURCE_ADAPTOR: Address = address!("0Cc730c0a69e464F6c50a536Edfee10B8E5c4495");

/// Wormhole core bridge emitting [`wormhole_publish_log`] logs.
pub const WORMHOLE_CORE: Address = address!("0CBE91CF822c73C2315FB05100C2F714765d5c20");

pub const SAMPLE_SOURCE_CHAIN: u64 = 80001;
pub const SAMPLE_DESTINATION_CHAIN: u64 = 43113;

// ============================================================================
// Sample data
// ============================================================================

/// A message from Mumbai (80001) to Fuji (43113) in the given layout, routed
/// through `adaptor`.
pub fn sample_message(layout: EventLayout, adaptor: &str) -> CrossChainMessage {
    let (gas_fee_payment_args, payload) = match layout {
        EventLayout::Legacy => (
            None,
            vec![PayloadOperation::Tagged {
                operation_type: OperationType::Call,
                data: Bytes::from_static(&[0xde, 0xad, 0xbe, 0xef]),
            }],
        ),
        EventLayout::FeeBearing => (
            Some(GasFeePaymentArgs {
                mode: None,
                fee_token_address: Address::repeat_byte(0xfe),
                fee_amount: U256::from(1_000_000_000_000_000u64),
                fee_source_payload_index: None,
                relayer: Address::repeat_byte(0x8e),
            }),
            vec![
                PayloadOperation::Call {
                    to: Address::repeat_byte(0x7e),
                    calldata: Bytes::from_static(&[0xa9, 0x05, 0x9c, 0xbb, 0x01]),
                },
                PayloadOperation::Call {
                    to: Address::repeat_byte(0x7f),
                    calldata: Bytes::new(),
                },
            ],
        ),
        EventLayout::PayloadIndexedFee => (
            Some(GasFeePaymentArgs {
                mode: Some(FeePaymentMode::CutFromPayload),
                fee_token_address: Address::repeat_byte(0xfe),
                fee_amount: U256::from(250_000u64),
                fee_source_payload_index: Some(U256::ZERO),
                relayer: Address::repeat_byte(0x8e),
            }),
            vec![PayloadOperation::Tagged {
                operation_type: OperationType::TokenTransfer,
                data: Bytes::from_static(&[0x00, 0x01, 0x02]),
            }],
        ),
    };

    CrossChainMessage {
        layout,
        sender: Address::repeat_byte(0x5e),
        source_gateway: GATEWAY,
        source_adaptor: SOURCE_ADAPTOR,
        source_chain_id: SAMPLE_SOURCE_CHAIN,
        destination_gateway: GATEWAY,
        destination_chain_id: SAMPLE_DESTINATION_CHAIN,
        nonce: CrossChainMessage::compose_nonce(SAMPLE_SOURCE_CHAIN, 1),
        router_adaptor: adaptor.to_string(),
        gas_fee_payment_args,
        payload,
    }
}

fn raw_log(address: Address, data: LogData, tx_hash: Option<TxHash>) -> RawLogEvent {
    RawLogEvent {
        address,
        topics: data.topics().to_vec(),
        data: data.data,
        block_number: Some(100),
        transaction_hash: tx_hash,
        log_index: Some(0),
    }
}

/// The `CCMPMessageRouted` log the source gateway emits for `message`, mined
/// in block 100 by `tx_hash`.
pub fn routed_log(message: &CrossChainMessage, tx_hash: TxHash) -> Result<RawLogEvent> {
    Ok(raw_log(
        message.source_gateway,
        encode_routed_event(message)?,
        Some(tx_hash),
    ))
}

/// A successful receipt.
pub fn receipt_with_logs(tx_hash: TxHash, block_number: u64, logs: Vec<RawLogEvent>) -> TxReceipt {
    TxReceipt {
        transaction_hash: tx_hash,
        block_number,
        success: true,
        logs,
    }
}

/// Wormhole core bridge log announcing message `sequence` from `emitter`.
pub fn wormhole_publish_log(emitter: Address, sequence: u64) -> RawLogEvent {
    let event = LogMessagePublished {
        sender: emitter,
        sequence,
        nonce: 0,
        payload: Bytes::from_static(&[0x01]),
        consistencyLevel: 1,
    };
    raw_log(WORMHOLE_CORE, event.encode_log_data(), None)
}

/// Hyperlane mailbox log announcing `message_id`.
pub fn hyperlane_dispatch_log(mailbox: Address, message_id: B256) -> RawLogEvent {
    let event = DispatchId {
        messageId: message_id,
    };
    raw_log(mailbox, event.encode_log_data(), None)
}

// ============================================================================
// Fake Chain Client
// ============================================================================

#[derive(Debug)]
struct ChainState {
    receipts: HashMap<TxHash, TxReceipt>,
    block_numbers: VecDeque<u64>,
    logs: Vec<RawLogEvent>,
    log_queries: Vec<(u64, u64)>,
    failing_log_queries: usize,
    failing_receipt_queries: usize,
    submissions: Vec<DestinationCall>,
    submit_errors: VecDeque<RelayError>,
    auto_receipts: bool,
}

impl ChainState {
    /// Head as seen by the next `block_number` call, without consuming it.
    fn peek_head(&self) -> u64 {
        if let Some(head) = self.block_numbers.front() {
            return *head;
        }
        let receipt_blocks = self.receipts.values().map(|r| r.block_number);
        let log_blocks = self.logs.iter().filter_map(|l| l.block_number);
        receipt_blocks.chain(log_blocks).max().unwrap_or(0)
    }
}

/// A fake chain RPC endpoint.
///
/// This allows testing scenarios like:
/// - Receipts that appear only after some polls
/// - Heads advancing block by block
/// - `eth_getLogs` failures and replays
/// - Destination submissions that revert
///
/// Unless [`FakeChainClient::set_block_numbers`] is used, the head is the
/// highest block of any receipt or log the fake knows about. Successful
/// submissions get a successful receipt at the current head.
#[derive(Clone, Debug)]
pub struct FakeChainClient {
    chain_id: u64,
    state: Arc<Mutex<ChainState>>,
}

impl FakeChainClient {
    pub fn new(chain_id: u64) -> Self {
        Self {
            chain_id,
            state: Arc::new(Mutex::new(ChainState {
                receipts: HashMap::new(),
                block_numbers: VecDeque::new(),
                logs: Vec::new(),
                log_queries: Vec::new(),
                failing_log_queries: 0,
                failing_receipt_queries: 0,
                submissions: Vec::new(),
                submit_errors: VecDeque::new(),
                auto_receipts: true,
            })),
        }
    }

    pub fn add_receipt(&self, receipt: TxReceipt) {
        self.state
            .lock()
            .unwrap()
            .receipts
            .insert(receipt.transaction_hash, receipt);
    }

    /// Heads returned by successive `block_number` calls; the last one repeats.
    pub fn set_block_numbers(&self, heads: Vec<u64>) {
        self.state.lock().unwrap().block_numbers = heads.into();
    }

    pub fn add_log(&self, log: RawLogEvent) {
        self.state.lock().unwrap().logs.push(log);
    }

    /// Block ranges requested through `get_logs`, failed ones included.
    pub fn log_queries(&self) -> Vec<(u64, u64)> {
        self.state.lock().unwrap().log_queries.clone()
    }

    /// Make the next `count` `get_logs` calls fail with a transient error.
    pub fn fail_next_log_queries(&self, count: usize) {
        self.state.lock().unwrap().failing_log_queries = count;
    }

    /// Make the next `count` `get_receipt` calls fail with a transient error.
    pub fn fail_next_receipt_queries(&self, count: usize) {
        self.state.lock().unwrap().failing_receipt_queries = count;
    }

    /// Calls passed to `submit`, including rejected ones.
    pub fn submissions(&self) -> Vec<DestinationCall> {
        self.state.lock().unwrap().submissions.clone()
    }

    /// Queue an error for the next `submit` call.
    pub fn add_submit_error(&self, error: RelayError) {
        self.state.lock().unwrap().submit_errors.push_back(error);
    }

    /// Whether successful submissions get a receipt automatically.
    pub fn set_auto_receipts(&self, enabled: bool) {
        self.state.lock().unwrap().auto_receipts = enabled;
    }
}

#[async_trait]
impl ChainClient for FakeChainClient {
    fn chain_id(&self) -> u64 {
        self.chain_id
    }

    async fn block_number(&self) -> Result<u64> {
        let mut state = self.state.lock().unwrap();
        let head = state.peek_head();
        if state.block_numbers.len() > 1 {
            state.block_numbers.pop_front();
        }
        Ok(head)
    }

    async fn get_logs(
        &self,
        address: Address,
        topics: &[B256],
        from_block: u64,
        to_block: u64,
    ) -> Result<Vec<RawLogEvent>> {
        let mut state = self.state.lock().unwrap();
        state.log_queries.push((from_block, to_block));

        if state.failing_log_queries > 0 {
            state.failing_log_queries -= 1;
            return Err(RelayError::TransientRpc("connection reset".to_string()));
        }

        Ok(state
            .logs
            .iter()
            .filter(|log| log.address == address)
            .filter(|log| log.topic0().is_some_and(|topic| topics.contains(&topic)))
            .filter(|log| {
                log.block_number
                    .is_some_and(|block| (from_block..=to_block).contains(&block))
            })
            .cloned()
            .collect())
    }

    async fn get_receipt(&self, tx_hash: TxHash) -> Result<TxReceipt> {
        let mut state = self.state.lock().unwrap();
        if state.failing_receipt_queries > 0 {
            state.failing_receipt_queries -= 1;
            return Err(RelayError::TransientRpc("request timed out".to_string()));
        }

        state
            .receipts
            .get(&tx_hash)
            .cloned()
            .ok_or(RelayError::NotFound { tx_hash })
    }

    async fn submit(&self, call: &DestinationCall) -> Result<TxHash> {
        let mut state = self.state.lock().unwrap();
        state.submissions.push(call.clone());

        if let Some(error) = state.submit_errors.pop_front() {
            return Err(error);
        }

        let tx_hash = keccak256(format!("{}:{}", self.chain_id, state.submissions.len()));
        if state.auto_receipts {
            let block_number = state.peek_head();
            state
                .receipts
                .insert(tx_hash, receipt_with_logs(tx_hash, block_number, vec![]));
        }
        Ok(tx_hash)
    }
}

// ============================================================================
// Fake Guardian API
// ============================================================================

/// A fake Wormhole guardian endpoint.
///
/// VAAs are unsigned (`Ok(None)`) for a configured number of polls, then
/// returned. Unknown ids are never signed.
#[derive(Clone, Debug, Default)]
pub struct FakeGuardianApi {
    vaas: Arc<Mutex<HashMap<VaaId, (usize, Bytes)>>>,
    calls: Arc<Mutex<HashMap<VaaId, usize>>>,
}

impl FakeGuardianApi {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sign `vaa` after `misses` polls that find nothing.
    pub fn add_signed_after(&self, id: VaaId, misses: usize, vaa: Bytes) {
        self.vaas.lock().unwrap().insert(id, (misses, vaa));
    }

    pub fn call_count(&self, id: &VaaId) -> usize {
        self.calls.lock().unwrap().get(id).copied().unwrap_or(0)
    }

    pub fn total_calls(&self) -> usize {
        self.calls.lock().unwrap().values().sum()
    }
}

#[async_trait]
impl GuardianApi for FakeGuardianApi {
    async fn get_signed_vaa(&self, id: &VaaId) -> Result<Option<Bytes>> {
        let calls = {
            let mut calls = self.calls.lock().unwrap();
            let count = calls.entry(*id).or_insert(0);
            *count += 1;
            *count
        };

        Ok(self
            .vaas
            .lock()
            .unwrap()
            .get(id)
            .filter(|(misses, _)| calls > *misses)
            .map(|(_, vaa)| vaa.clone()))
    }
}

// ============================================================================
// Fake Axelar GMP API
// ============================================================================

/// A fake Axelarscan.
///
/// Status answers are consumed in order; a final `Ok` answer repeats. Once
/// the sequence is exhausted, or for unknown transactions, the status is
/// [`GmpStatus::CannotFetchStatus`].
#[derive(Clone, Debug, Default)]
pub struct FakeAxelarApi {
    statuses: Arc<Mutex<HashMap<TxHash, VecDeque<Result<GmpStatusResponse>>>>>,
    execute_params: Arc<Mutex<HashMap<TxHash, ExecuteParams>>>,
    status_calls: Arc<Mutex<HashMap<TxHash, usize>>>,
}

impl FakeAxelarApi {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_status_sequence(&self, tx_hash: TxHash, statuses: Vec<Result<GmpStatusResponse>>) {
        self.statuses
            .lock()
            .unwrap()
            .insert(tx_hash, statuses.into());
    }

    pub fn set_execute_params(&self, tx_hash: TxHash, params: ExecuteParams) {
        self.execute_params.lock().unwrap().insert(tx_hash, params);
    }

    pub fn status_calls(&self, tx_hash: TxHash) -> usize {
        self.status_calls
            .lock()
            .unwrap()
            .get(&tx_hash)
            .copied()
            .unwrap_or(0)
    }
}

#[async_trait]
impl AxelarGmpApi for FakeAxelarApi {
    async fn query_transaction_status(&self, tx_hash: TxHash) -> Result<GmpStatusResponse> {
        *self
            .status_calls
            .lock()
            .unwrap()
            .entry(tx_hash)
            .or_insert(0) += 1;

        let mut statuses = self.statuses.lock().unwrap();
        let Some(sequence) = statuses.get_mut(&tx_hash) else {
            return Ok(GmpStatusResponse::new(GmpStatus::CannotFetchStatus));
        };

        match sequence.front() {
            Some(Ok(last)) if sequence.len() == 1 => Ok(last.clone()),
            Some(_) => sequence
                .pop_front()
                .unwrap_or_else(|| Ok(GmpStatusResponse::new(GmpStatus::CannotFetchStatus))),
            None => Ok(GmpStatusResponse::new(GmpStatus::CannotFetchStatus)),
        }
    }

    async fn query_execute_params(&self, tx_hash: TxHash) -> Result<ExecuteParams> {
        self.execute_params
            .lock()
            .unwrap()
            .get(&tx_hash)
            .cloned()
            .ok_or(RelayError::AttestationNotFound)
    }
}

// ============================================================================
// Fake Delivery Oracle
// ============================================================================

/// A fake Hyperlane destination mailbox.
///
/// Messages are delivered after a configured number of negative answers;
/// unknown ids are never delivered.
#[derive(Clone, Debug, Default)]
pub struct FakeDeliveryOracle {
    deliveries: Arc<Mutex<HashMap<B256, usize>>>,
    calls: Arc<Mutex<HashMap<B256, usize>>>,
}

impl FakeDeliveryOracle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn deliver_after(&self, message_id: B256, misses: usize) {
        self.deliveries.lock().unwrap().insert(message_id, misses);
    }

    pub fn call_count(&self, message_id: B256) -> usize {
        self.calls
            .lock()
            .unwrap()
            .get(&message_id)
            .copied()
            .unwrap_or(0)
    }
}

#[async_trait]
impl DeliveryOracle for FakeDeliveryOracle {
    async fn is_delivered(&self, message_id: B256) -> Result<bool> {
        let calls = {
            let mut calls = self.calls.lock().unwrap();
            let count = calls.entry(message_id).or_insert(0);
            *count += 1;
            *count
        };

        Ok(self
            .deliveries
            .lock()
            .unwrap()
            .get(&message_id)
            .is_some_and(|misses| calls > *misses))
    }
}

// ============================================================================
// Fake Clock
// ============================================================================

/// A fake clock that allows fast-forwarding time in tests.
///
/// `sleep` returns immediately after moving the clock forward, so polling
/// loops and backoff schedules run instantly while deadlines still expire.
#[derive(Clone, Debug)]
pub struct FakeClock {
    current_time: Arc<Mutex<Instant>>,
    sleep_log: Arc<Mutex<Vec<Duration>>>,
}

impl Default for FakeClock {
    fn default() -> Self {
        Self {
            current_time: Arc::new(Mutex::new(Instant::now())),
            sleep_log: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

impl FakeClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fast-forward the clock by the given duration
    pub fn advance(&self, duration: Duration) {
        let mut time = self.current_time.lock().unwrap();
        *time += duration;
    }

    pub fn total_sleep_time(&self) -> Duration {
        self.sleep_log.lock().unwrap().iter().sum()
    }

    pub fn sleep_count(&self) -> usize {
        self.sleep_log.lock().unwrap().len()
    }

    /// Every sleep so far, in order.
    pub fn sleeps(&self) -> Vec<Duration> {
        self.sleep_log.lock().unwrap().clone()
    }

    pub fn clear_sleep_log(&self) {
        self.sleep_log.lock().unwrap().clear();
    }
}

#[async_trait]
impl Clock for FakeClock {
    async fn sleep(&self, duration: Duration) {
        self.sleep_log.lock().unwrap().push(duration);
        self.advance(duration);
        // Let other tasks run, as a real sleep would.
        tokio::task::yield_now().await;
    }

    fn now(&self) -> Instant {
        *self.current_time.lock().unwrap()
    }
}
