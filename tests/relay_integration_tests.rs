//! Integration tests for the relay using fake implementations
//!
//! Every external collaborator (chain RPC, guardians, Axelarscan, Hyperlane
//! mailboxes, the clock) is replaced by a fake from `ccmp_relayer::testing`,
//! so whole jobs run in milliseconds while polling schedules and deadlines
//! behave as they would against real networks.

use alloy_primitives::{keccak256, Address, Bytes, TxHash, B256};
use ccmp_relayer::codec::{decode_receive_call, DEPLOYED_FEE_BEARING_TOPIC};
use ccmp_relayer::providers::TokioClock;
use ccmp_relayer::testing::{
    hyperlane_dispatch_log, receipt_with_logs, routed_log, sample_message,
    wormhole_publish_log, FakeAxelarApi, FakeChainClient, FakeClock, FakeDeliveryOracle,
    FakeGuardianApi, GATEWAY, SAMPLE_DESTINATION_CHAIN, SAMPLE_SOURCE_CHAIN, SOURCE_ADAPTOR,
};
use ccmp_relayer::traits::{ChainClient, Clock};
use ccmp_relayer::transport::{
    AxelarFetcher, DeliveryOracles, ExecuteParams, FetchContext, GmpStatus, GmpStatusResponse,
    HyperlaneFetcher, PollingConfig, VaaId, WormholeFetcher,
};
use ccmp_relayer::{
    CancelToken, ChainHandle, ChainRegistry, ClaimOutcome, CrossChainMessage, Deadline,
    EventLayout, InMemoryNonceStore, JobState, NonceStore, RawLogEvent, RelayError,
    RelayOrchestrator, RelayService, RetryPolicy, TransportKind, TransportRegistry, TxReceipt,
    ALREADY_EXECUTED,
};
use rstest::rstest;
use std::sync::Arc;
use std::time::Duration;

const SOURCE: u64 = SAMPLE_SOURCE_CHAIN;
const DESTINATION: u64 = SAMPLE_DESTINATION_CHAIN;
const WORKERS: usize = 4;
const WORMHOLE_SEQUENCE: u64 = 7;

fn vaa() -> Bytes {
    Bytes::from_static(&[0x01, 0x00, 0x00, 0x00, 0x00, 0x01, 0xaa])
}

fn vaa_id() -> VaaId {
    // Mumbai is Wormhole chain 5
    VaaId::new(5, SOURCE_ADAPTOR, WORMHOLE_SEQUENCE)
}

fn hyperlane_message_id() -> B256 {
    B256::repeat_byte(0x4d)
}

fn execute_params() -> ExecuteParams {
    ExecuteParams {
        command_id: B256::repeat_byte(0xc0),
        source_chain: "Polygon".to_string(),
        source_address: SOURCE_ADAPTOR.to_string(),
    }
}

/// Fakes for both chains and all three transports.
struct Harness {
    source: FakeChainClient,
    destination: FakeChainClient,
    guardian: FakeGuardianApi,
    axelar: FakeAxelarApi,
    delivery: FakeDeliveryOracle,
    clock: FakeClock,
    store: Arc<InMemoryNonceStore>,
    chains: Arc<ChainRegistry>,
}

impl Harness {
    fn new() -> Self {
        let source = FakeChainClient::new(SOURCE);
        let destination = FakeChainClient::new(DESTINATION);
        let chains = ChainRegistry::new([
            ChainHandle::builder()
                .client(Arc::new(source.clone()))
                .gateway(GATEWAY)
                .workers(WORKERS)
                .build(),
            ChainHandle::builder()
                .client(Arc::new(destination.clone()))
                .gateway(GATEWAY)
                .workers(WORKERS)
                .build(),
        ]);

        Self {
            source,
            destination,
            guardian: FakeGuardianApi::new(),
            axelar: FakeAxelarApi::new(),
            delivery: FakeDeliveryOracle::new(),
            clock: FakeClock::new(),
            store: Arc::new(InMemoryNonceStore::new()),
            chains: Arc::new(chains),
        }
    }

    fn transports(&self, polling: PollingConfig) -> TransportRegistry {
        let mut oracles = DeliveryOracles::new();
        oracles.insert(DESTINATION, Arc::new(self.delivery.clone()));

        TransportRegistry::new()
            .with(Arc::new(
                WormholeFetcher::builder()
                    .guardian(Arc::new(self.guardian.clone()))
                    .clock(self.clock.clone())
                    .polling(polling)
                    .build(),
            ))
            .with(Arc::new(
                AxelarFetcher::builder()
                    .api(Arc::new(self.axelar.clone()))
                    .clock(self.clock.clone())
                    .polling(polling)
                    .build(),
            ))
            .with(Arc::new(
                HyperlaneFetcher::builder()
                    .oracles(oracles)
                    .clock(self.clock.clone())
                    .polling(polling)
                    .build(),
            ))
    }

    fn orchestrator(&self, transports: TransportRegistry) -> RelayOrchestrator<FakeClock> {
        self.orchestrator_with(transports, RetryPolicy::default(), None)
    }

    fn orchestrator_with(
        &self,
        transports: TransportRegistry,
        retry: RetryPolicy,
        job_timeout: Option<Duration>,
    ) -> RelayOrchestrator<FakeClock> {
        let store: Arc<dyn NonceStore> = self.store.clone();
        RelayOrchestrator::builder()
            .chains(Arc::clone(&self.chains))
            .transports(transports)
            .store(store)
            .clock(self.clock.clone())
            .retry(retry)
            .maybe_job_timeout(job_timeout)
            .build()
    }

    /// Mine the source transaction routing `message` and make its
    /// attestation available after `misses` unsuccessful polls.
    fn emit(&self, message: &CrossChainMessage, tx_hash: TxHash, misses: usize) -> RawLogEvent {
        let log = routed_log(message, tx_hash).unwrap();
        let mut logs = vec![log.clone()];

        match message.router_adaptor.parse::<TransportKind>().unwrap() {
            TransportKind::Wormhole => {
                logs.push(wormhole_publish_log(SOURCE_ADAPTOR, WORMHOLE_SEQUENCE));
                self.guardian.add_signed_after(vaa_id(), misses, vaa());
            }
            TransportKind::Axelar => {
                let mut statuses: Vec<_> = (0..misses)
                    .map(|_| Ok(GmpStatusResponse::new(GmpStatus::SourceGatewayConfirmed)))
                    .collect();
                statuses.push(Ok(GmpStatusResponse::new(
                    GmpStatus::DestinationGatewayApproved,
                )));
                self.axelar.add_status_sequence(tx_hash, statuses);
                self.axelar.set_execute_params(tx_hash, execute_params());
            }
            TransportKind::Hyperlane => {
                logs.push(hyperlane_dispatch_log(
                    Address::repeat_byte(0x3a),
                    hyperlane_message_id(),
                ));
                self.delivery.deliver_after(hyperlane_message_id(), misses);
            }
        }

        self.source.add_receipt(receipt_with_logs(tx_hash, 100, logs));
        log
    }

    fn available_workers(&self) -> usize {
        self.chains
            .get(DESTINATION)
            .unwrap()
            .workers()
            .available_permits()
    }
}

fn happy_path() -> Vec<JobState> {
    vec![
        JobState::Observed,
        JobState::AttestationPending,
        JobState::AttestationReady,
        JobState::Submitting,
        JobState::Confirmed,
    ]
}

#[rstest]
#[case::legacy_wormhole(EventLayout::Legacy, "wormhole")]
#[case::fee_bearing_axelar(EventLayout::FeeBearing, "axelar")]
#[case::payload_indexed_hyperlane(EventLayout::PayloadIndexedFee, "hyperlane")]
#[case::abacus_alias(EventLayout::Legacy, "abacus")]
#[tokio::test]
async fn test_relay_round_trip(#[case] layout: EventLayout, #[case] adaptor: &str) {
    let h = Harness::new();
    let orchestrator = h.orchestrator(h.transports(PollingConfig::default()));
    let message = sample_message(layout, adaptor);
    let tx_hash = TxHash::repeat_byte(0x11);
    let log = h.emit(&message, tx_hash, 0);

    let job = orchestrator
        .relay_log(SOURCE, &log, &CancelToken::new())
        .await
        .unwrap();

    assert_eq!(job.state(), JobState::Confirmed, "{:?}", job.last_error());
    assert_eq!(job.path(), happy_path());

    let submissions = h.destination.submissions();
    assert_eq!(submissions.len(), 1);
    assert_eq!(submissions[0].chain_id, DESTINATION);
    assert_eq!(submissions[0].to, GATEWAY);

    // The destination call carries exactly the routed message
    let call = decode_receive_call(layout, &submissions[0].calldata).unwrap();
    assert_eq!(call.message, message);
    assert_eq!(
        call.verification_data,
        job.attestation.as_ref().unwrap().verification_data()
    );

    let confirmation = h.store.confirmation(SOURCE, message.nonce).await.unwrap();
    assert_eq!(confirmation, job.destination_tx_hash);
    assert_eq!(h.available_workers(), WORKERS);
}

#[tokio::test]
async fn test_wormhole_vaa_forwarded_verbatim() {
    let h = Harness::new();
    let orchestrator = h.orchestrator(h.transports(PollingConfig::default()));
    let message = sample_message(EventLayout::FeeBearing, "wormhole");
    let log = h.emit(&message, TxHash::repeat_byte(0x12), 0);

    let job = orchestrator
        .relay_log(SOURCE, &log, &CancelToken::new())
        .await
        .unwrap();

    assert_eq!(job.state(), JobState::Confirmed);
    let call = decode_receive_call(
        EventLayout::FeeBearing,
        &h.destination.submissions()[0].calldata,
    )
    .unwrap();
    assert_eq!(call.verification_data, vaa());
    assert_eq!(call.allow_partial_execution, Some(false));
}

// Single-threaded so the jobs interleave at every poll and backoff.
#[tokio::test]
async fn test_racing_workers_submit_once() {
    let h = Harness::new();
    let orchestrator = Arc::new(h.orchestrator(h.transports(PollingConfig::default())));
    let message = sample_message(EventLayout::PayloadIndexedFee, "wormhole");
    let log = h.emit(&message, TxHash::repeat_byte(0x13), 2);

    let cancel = CancelToken::new();
    let workers: Vec<_> = (0..4)
        .map(|_| {
            let orchestrator = Arc::clone(&orchestrator);
            let log = log.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move { orchestrator.relay_log(SOURCE, &log, &cancel).await })
        })
        .collect();

    let mut states = Vec::new();
    for worker in workers {
        states.push(worker.await.unwrap().unwrap().state());
    }

    let confirmed = states.iter().filter(|s| **s == JobState::Confirmed).count();
    let skipped = states
        .iter()
        .filter(|s| **s == JobState::DuplicateSkipped)
        .count();
    assert_eq!(confirmed, 1, "{states:?}");
    assert_eq!(skipped, 3, "{states:?}");
    assert_eq!(h.destination.submissions().len(), 1);
    assert!(h.store.is_confirmed(SOURCE, message.nonce).await.unwrap());
}

#[tokio::test]
async fn test_nonce_released_by_owner_is_relayed() {
    let h = Harness::new();
    let orchestrator = Arc::new(h.orchestrator(h.transports(PollingConfig::default())));
    let message = sample_message(EventLayout::Legacy, "wormhole");
    let log = h.emit(&message, TxHash::repeat_byte(0x1a), 0);

    // Another worker owns the nonce when the job reaches the store
    let owner = h.store.try_claim(SOURCE, message.nonce).await.unwrap();
    assert_eq!(owner, ClaimOutcome::Claimed);

    let job = {
        let orchestrator = Arc::clone(&orchestrator);
        let log = log.clone();
        tokio::spawn(async move {
            orchestrator
                .relay_log(SOURCE, &log, &CancelToken::new())
                .await
        })
    };

    while h.clock.sleep_count() == 0 {
        tokio::task::yield_now().await;
    }
    // The owner gives up without confirming
    h.store.release(SOURCE, message.nonce).await.unwrap();

    let job = job.await.unwrap().unwrap();
    assert_eq!(job.state(), JobState::Confirmed);
    assert_eq!(h.destination.submissions().len(), 1);
    assert!(h.store.is_confirmed(SOURCE, message.nonce).await.unwrap());
    assert_eq!(h.clock.sleeps(), vec![Duration::from_secs(2)]);
    assert_eq!(
        job.path(),
        vec![
            JobState::Observed,
            JobState::AttestationPending,
            JobState::AttestationReady,
            JobState::Submitting,
            JobState::Confirmed,
        ]
    );
}

#[tokio::test]
async fn test_nonce_held_past_retry_budget_fails() {
    let h = Harness::new();
    let retry = RetryPolicy::default().with_max_attempts(3);
    let orchestrator =
        h.orchestrator_with(h.transports(PollingConfig::default()), retry, None);
    let message = sample_message(EventLayout::Legacy, "wormhole");
    let log = h.emit(&message, TxHash::repeat_byte(0x1b), 0);
    h.store.try_claim(SOURCE, message.nonce).await.unwrap();

    let job = orchestrator
        .relay_log(SOURCE, &log, &CancelToken::new())
        .await
        .unwrap();

    assert_eq!(job.state(), JobState::Failed);
    assert!(h.destination.submissions().is_empty());
    assert_eq!(
        h.clock.sleeps(),
        vec![Duration::from_secs(2), Duration::from_secs(4)]
    );
    let in_flight = RelayError::NonceInFlight {
        source_chain_id: SOURCE,
        nonce: message.nonce,
    };
    assert_eq!(job.last_error(), Some(in_flight.to_string().as_str()));
    // The claim still belongs to its owner
    assert_eq!(
        h.store.try_claim(SOURCE, message.nonce).await.unwrap(),
        ClaimOutcome::InFlight
    );
}

#[tokio::test]
async fn test_already_confirmed_nonce_is_skipped_before_fetching() {
    let h = Harness::new();
    let orchestrator = h.orchestrator(h.transports(PollingConfig::default()));
    let message = sample_message(EventLayout::Legacy, "wormhole");
    let log = h.emit(&message, TxHash::repeat_byte(0x14), 0);
    let earlier = TxHash::repeat_byte(0xee);
    h.store
        .mark_confirmed(SOURCE, message.nonce, earlier)
        .await
        .unwrap();

    let job = orchestrator
        .relay_log(SOURCE, &log, &CancelToken::new())
        .await
        .unwrap();

    assert_eq!(job.state(), JobState::DuplicateSkipped);
    assert_eq!(job.destination_tx_hash, Some(earlier));
    assert_eq!(h.guardian.total_calls(), 0);
    assert!(h.destination.submissions().is_empty());
}

#[rstest]
#[case::wormhole("wormhole")]
#[case::axelar("axelar")]
#[case::hyperlane("hyperlane")]
#[tokio::test]
async fn test_attestation_cached_after_success(#[case] adaptor: &str) {
    let h = Harness::new();
    let transports = h.transports(PollingConfig::default()).cached();
    let message = sample_message(EventLayout::Legacy, adaptor);
    let tx_hash = TxHash::repeat_byte(0x15);
    h.emit(&message, tx_hash, 1);

    let receipt = h.source.get_receipt(tx_hash).await.unwrap();
    let cancel = CancelToken::new();
    let ctx = FetchContext {
        message: &message,
        source_tx_hash: tx_hash,
        source_receipt: &receipt,
        deadline: Deadline::NEVER,
        cancel: &cancel,
    };
    let fetcher = transports.resolve(adaptor).unwrap();

    let first = fetcher.fetch_attestation(&ctx).await.unwrap();
    let calls_after_first = match fetcher.kind() {
        TransportKind::Wormhole => h.guardian.call_count(&vaa_id()),
        TransportKind::Axelar => h.axelar.status_calls(tx_hash),
        TransportKind::Hyperlane => h.delivery.call_count(hyperlane_message_id()),
    };
    let second = fetcher.fetch_attestation(&ctx).await.unwrap();
    let calls_after_second = match fetcher.kind() {
        TransportKind::Wormhole => h.guardian.call_count(&vaa_id()),
        TransportKind::Axelar => h.axelar.status_calls(tx_hash),
        TransportKind::Hyperlane => h.delivery.call_count(hyperlane_message_id()),
    };

    assert_eq!(first, second);
    assert_eq!(first.verification_data(), second.verification_data());
    assert_eq!(calls_after_first, 2);
    assert_eq!(calls_after_second, calls_after_first);
}

#[tokio::test]
async fn test_attestation_never_ready_fails_once_at_deadline() {
    let h = Harness::new();
    let orchestrator = h.orchestrator_with(
        h.transports(PollingConfig::wormhole()),
        RetryPolicy::default(),
        Some(Duration::from_secs(60)),
    );
    let message = sample_message(EventLayout::FeeBearing, "wormhole");
    let log = h.emit(&message, TxHash::repeat_byte(0x16), usize::MAX);

    let job = orchestrator
        .relay_log(SOURCE, &log, &CancelToken::new())
        .await
        .unwrap();

    assert_eq!(job.state(), JobState::Failed);
    let failures = job
        .history()
        .iter()
        .filter(|t| t.to == JobState::Failed)
        .count();
    assert_eq!(failures, 1);
    insta::assert_snapshot!(
        job.last_error().unwrap(),
        @"Timeout waiting for wormhole attestation"
    );

    assert_eq!(h.clock.total_sleep_time(), Duration::from_secs(60));
    assert_eq!(h.available_workers(), WORKERS);
    assert!(h.destination.submissions().is_empty());
    assert_eq!(
        h.store.try_claim(SOURCE, message.nonce).await.unwrap(),
        ClaimOutcome::Claimed
    );
}

#[tokio::test]
async fn test_attestation_polling_stops_at_uneven_deadline() {
    let h = Harness::new();
    let orchestrator = h.orchestrator_with(
        h.transports(PollingConfig::hyperlane()),
        RetryPolicy::default(),
        Some(Duration::from_secs(7)),
    );
    let message = sample_message(EventLayout::PayloadIndexedFee, "hyperlane");
    let log = h.emit(&message, TxHash::repeat_byte(0x1c), usize::MAX);

    let job = orchestrator
        .relay_log(SOURCE, &log, &CancelToken::new())
        .await
        .unwrap();

    assert_eq!(job.state(), JobState::Failed);
    assert_eq!(
        h.clock.sleeps(),
        vec![Duration::from_secs(5), Duration::from_secs(2)]
    );
    assert_eq!(h.delivery.call_count(hyperlane_message_id()), 3);
    assert_eq!(h.available_workers(), WORKERS);
}

#[tokio::test]
async fn test_attestation_timeouts_exhaust_retry_budget() {
    let h = Harness::new();
    let orchestrator = h.orchestrator_with(
        h.transports(PollingConfig::wormhole().with_max_attempts(5)),
        RetryPolicy::default().with_max_attempts(3),
        None,
    );
    let message = sample_message(EventLayout::Legacy, "wormhole");
    let log = h.emit(&message, TxHash::repeat_byte(0x17), usize::MAX);

    let job = orchestrator
        .relay_log(SOURCE, &log, &CancelToken::new())
        .await
        .unwrap();

    assert_eq!(job.state(), JobState::Failed);
    assert_eq!(job.history().last().unwrap().attempts, 3);
    assert_eq!(h.guardian.call_count(&vaa_id()), 15);
    // Three fetches of four 2s waits each, plus 2s and 4s of backoff
    assert_eq!(h.clock.total_sleep_time(), Duration::from_secs(30));
    assert_eq!(h.available_workers(), WORKERS);
}

#[tokio::test]
async fn test_deployed_topic_with_axelar_adaptor_uses_axelar() {
    let h = Harness::new();
    let orchestrator = h.orchestrator(h.transports(PollingConfig::default()));
    let message = sample_message(EventLayout::FeeBearing, "axelar");
    let tx_hash = TxHash::repeat_byte(0x18);
    let mut log = h.emit(&message, tx_hash, 0);
    log.topics[0] = DEPLOYED_FEE_BEARING_TOPIC;

    let decoded = orchestrator.codec().decode(&log).unwrap();
    assert_eq!(decoded.router_adaptor, "axelar");
    assert_eq!(decoded.layout, EventLayout::FeeBearing);

    let job = orchestrator
        .relay_log(SOURCE, &log, &CancelToken::new())
        .await
        .unwrap();

    assert_eq!(job.state(), JobState::Confirmed);
    assert_eq!(
        job.attestation.as_ref().unwrap().transport,
        TransportKind::Axelar
    );
    assert_eq!(h.axelar.status_calls(tx_hash), 1);
    assert_eq!(h.guardian.total_calls(), 0);
}

#[tokio::test]
async fn test_already_executed_revert_is_duplicate_not_failure() {
    let h = Harness::new();
    let orchestrator = h.orchestrator(h.transports(PollingConfig::default()));
    let message = sample_message(EventLayout::FeeBearing, "wormhole");
    let log = h.emit(&message, TxHash::repeat_byte(0x19), 0);
    h.destination.add_submit_error(RelayError::ContractRevert {
        reason: ALREADY_EXECUTED.to_string(),
        data: None,
    });

    let job = orchestrator
        .relay_log(SOURCE, &log, &CancelToken::new())
        .await
        .unwrap();

    assert_eq!(job.state(), JobState::DuplicateSkipped);
    assert_eq!(h.destination.submissions().len(), 1);
    assert_eq!(h.clock.sleep_count(), 0);
    assert!(!h.store.is_confirmed(SOURCE, message.nonce).await.unwrap());
    assert_eq!(
        h.store.try_claim(SOURCE, message.nonce).await.unwrap(),
        ClaimOutcome::Claimed
    );
}

#[tokio::test]
async fn test_other_reverts_are_fatal() {
    let h = Harness::new();
    let orchestrator = h.orchestrator(h.transports(PollingConfig::default()));
    let message = sample_message(EventLayout::Legacy, "wormhole");
    let log = h.emit(&message, TxHash::repeat_byte(0x1a), 0);
    h.destination.add_submit_error(RelayError::ContractRevert {
        reason: "VerificationFailed".to_string(),
        data: None,
    });

    let job = orchestrator
        .relay_log(SOURCE, &log, &CancelToken::new())
        .await
        .unwrap();

    assert_eq!(job.state(), JobState::Failed);
    assert_eq!(h.destination.submissions().len(), 1);
    assert_eq!(h.clock.sleep_count(), 0);
}

#[tokio::test]
async fn test_wormhole_vaa_signed_on_fourth_poll() {
    let h = Harness::new();
    let orchestrator = h.orchestrator(h.transports(PollingConfig::wormhole()));
    let message = sample_message(EventLayout::Legacy, "wormhole");
    let log = h.emit(&message, TxHash::repeat_byte(0x1b), 3);
    let start = h.clock.now();

    let job = orchestrator
        .relay_log(SOURCE, &log, &CancelToken::new())
        .await
        .unwrap();

    assert_eq!(job.state(), JobState::Confirmed);
    assert_eq!(h.guardian.call_count(&vaa_id()), 4);
    assert_eq!(h.clock.sleeps(), vec![Duration::from_secs(2); 3]);
    assert_eq!(h.clock.now() - start, Duration::from_secs(6));
}

#[tokio::test]
async fn test_reverted_submission_is_resubmitted() {
    let h = Harness::new();
    let orchestrator = h.orchestrator(h.transports(PollingConfig::default()));
    let message = sample_message(EventLayout::FeeBearing, "wormhole");
    let log = h.emit(&message, TxHash::repeat_byte(0x1c), 0);

    // Hashes the fake assigns to the first two submissions
    let first = keccak256(format!("{DESTINATION}:1"));
    let second = keccak256(format!("{DESTINATION}:2"));
    h.destination.set_auto_receipts(false);
    h.destination.add_receipt(TxReceipt {
        transaction_hash: first,
        block_number: 5,
        success: false,
        logs: vec![],
    });
    h.destination.add_receipt(receipt_with_logs(second, 6, vec![]));

    let job = orchestrator
        .relay_log(SOURCE, &log, &CancelToken::new())
        .await
        .unwrap();

    assert_eq!(job.state(), JobState::Confirmed);
    assert_eq!(job.destination_tx_hash, Some(second));
    assert_eq!(h.destination.submissions().len(), 2);
    assert_eq!(
        h.store.confirmation(SOURCE, message.nonce).await.unwrap(),
        Some(second)
    );
}

#[tokio::test]
async fn test_submission_waits_for_confirmation_depth() {
    let h = Harness::new();
    let chains = ChainRegistry::new([
        ChainHandle::builder()
            .client(Arc::new(h.source.clone()))
            .gateway(GATEWAY)
            .build(),
        ChainHandle::builder()
            .client(Arc::new(h.destination.clone()))
            .gateway(GATEWAY)
            .confirmations(3)
            .build(),
    ]);
    let store: Arc<dyn NonceStore> = h.store.clone();
    let orchestrator = RelayOrchestrator::builder()
        .chains(Arc::new(chains))
        .transports(h.transports(PollingConfig::default()))
        .store(store)
        .clock(h.clock.clone())
        .confirmation_poll_interval(Duration::from_secs(5))
        .build();
    let message = sample_message(EventLayout::Legacy, "wormhole");
    let log = h.emit(&message, TxHash::repeat_byte(0x1d), 0);
    // Submission lands in block 10; depth 3 is reached at head 12
    h.destination.set_block_numbers(vec![10, 11, 12]);

    let job = orchestrator
        .relay_log(SOURCE, &log, &CancelToken::new())
        .await
        .unwrap();

    assert_eq!(job.state(), JobState::Confirmed);
    assert_eq!(h.clock.sleeps(), vec![Duration::from_secs(5); 2]);
}

#[rstest]
#[case::unregistered_gateway("gateway")]
#[case::unsupported_adapter("adapter")]
#[case::unconfigured_destination("destination")]
#[tokio::test]
async fn test_precheck_failures_are_fatal(#[case] defect: &str) {
    let h = Harness::new();
    let orchestrator = h.orchestrator(h.transports(PollingConfig::default()));
    let mut message = sample_message(EventLayout::Legacy, "wormhole");
    match defect {
        "gateway" => message.destination_gateway = Address::repeat_byte(0x99),
        "adapter" => message.router_adaptor = "layerzero".to_string(),
        _ => message.destination_chain_id = 97,
    }
    let tx_hash = TxHash::repeat_byte(0x1e);
    let log = routed_log(&message, tx_hash).unwrap();
    h.source
        .add_receipt(receipt_with_logs(tx_hash, 100, vec![log.clone()]));

    let job = orchestrator
        .relay_log(SOURCE, &log, &CancelToken::new())
        .await
        .unwrap();

    assert_eq!(job.state(), JobState::Failed);
    assert_eq!(job.path(), vec![JobState::Observed, JobState::Failed]);
    assert_eq!(h.clock.sleep_count(), 0);
    assert_eq!(h.guardian.total_calls(), 0);
    assert!(h.destination.submissions().is_empty());
}

#[tokio::test]
async fn test_undecodable_log_is_dropped() {
    let h = Harness::new();
    let orchestrator = h.orchestrator(h.transports(PollingConfig::default()));
    let message = sample_message(EventLayout::Legacy, "wormhole");
    let mut log = routed_log(&message, TxHash::repeat_byte(0x1f)).unwrap();
    log.topics[0] = B256::repeat_byte(0x77);

    let err = orchestrator
        .relay_log(SOURCE, &log, &CancelToken::new())
        .await
        .unwrap_err();

    assert!(matches!(err, RelayError::Decode { .. }));
}

#[tokio::test]
async fn test_log_observed_on_wrong_chain_is_rejected() {
    let h = Harness::new();
    let orchestrator = h.orchestrator(h.transports(PollingConfig::default()));
    let message = sample_message(EventLayout::Legacy, "wormhole");
    let log = h.emit(&message, TxHash::repeat_byte(0x20), 0);

    let err = orchestrator
        .relay_log(DESTINATION, &log, &CancelToken::new())
        .await
        .unwrap_err();

    assert!(matches!(err, RelayError::InvalidMessage { .. }));
}

#[tokio::test]
async fn test_cancelled_job_fails_and_releases_worker() {
    let h = Harness::new();
    let orchestrator = h.orchestrator(h.transports(PollingConfig::default()));
    let message = sample_message(EventLayout::Legacy, "wormhole");
    let log = h.emit(&message, TxHash::repeat_byte(0x21), 0);
    let cancel = CancelToken::new();
    cancel.cancel();

    let job = orchestrator.relay_log(SOURCE, &log, &cancel).await.unwrap();

    assert_eq!(job.state(), JobState::Failed);
    assert_eq!(job.last_error(), Some("Operation cancelled"));
    assert_eq!(h.available_workers(), WORKERS);
}

#[tokio::test]
async fn test_transient_receipt_errors_are_retried() {
    let h = Harness::new();
    let orchestrator = h.orchestrator(h.transports(PollingConfig::default()));
    let message = sample_message(EventLayout::Legacy, "axelar");
    let log = h.emit(&message, TxHash::repeat_byte(0x22), 0);
    h.source.fail_next_receipt_queries(2);

    let job = orchestrator
        .relay_log(SOURCE, &log, &CancelToken::new())
        .await
        .unwrap();

    assert_eq!(job.state(), JobState::Confirmed);
    assert_eq!(job.history()[1].attempts, 2);
    // Backoff of 2s then 4s before the receipt is readable
    assert_eq!(
        h.clock.sleeps(),
        vec![Duration::from_secs(2), Duration::from_secs(4)]
    );
}

#[tokio::test(start_paused = true)]
async fn test_service_relays_observed_logs_until_cancelled() {
    let source = FakeChainClient::new(SOURCE);
    let destination = FakeChainClient::new(DESTINATION);
    let axelar = FakeAxelarApi::new();
    let clock = TokioClock::new();

    let message = sample_message(EventLayout::FeeBearing, "axelar");
    let tx_hash = TxHash::repeat_byte(0x23);
    let log = routed_log(&message, tx_hash).unwrap();
    source.add_log(log.clone());
    source.add_receipt(receipt_with_logs(tx_hash, 100, vec![log]));
    axelar.add_status_sequence(
        tx_hash,
        vec![Ok(GmpStatusResponse::new(
            GmpStatus::DestinationGatewayApproved,
        ))],
    );
    axelar.set_execute_params(tx_hash, execute_params());

    let store = Arc::new(InMemoryNonceStore::new());
    let store_handle: Arc<dyn NonceStore> = store.clone();
    let orchestrator = RelayOrchestrator::builder()
        .chains(Arc::new(ChainRegistry::new([
            ChainHandle::builder()
                .client(Arc::new(source.clone()))
                .gateway(GATEWAY)
                .build(),
            ChainHandle::builder()
                .client(Arc::new(destination.clone()))
                .gateway(GATEWAY)
                .build(),
        ])))
        .transports(TransportRegistry::new().with(Arc::new(
            AxelarFetcher::builder()
                .api(Arc::new(axelar.clone()))
                .clock(clock)
                .build(),
        )))
        .store(store_handle)
        .clock(clock)
        .build();

    let service = RelayService::builder()
        .orchestrator(Arc::new(orchestrator))
        .clock(clock)
        .build();
    let cancel = CancelToken::new();
    let running = {
        let cancel = cancel.clone();
        tokio::spawn(async move { service.run(&cancel).await })
    };

    while !store.is_confirmed(SOURCE, message.nonce).await.unwrap() {
        tokio::time::sleep(Duration::from_secs(1)).await;
    }
    cancel.cancel();

    let report = running.await.unwrap().unwrap();
    assert_eq!(report.confirmed, 1);
    assert_eq!(report.total(), 1);
    assert_eq!(destination.submissions().len(), 1);
}
