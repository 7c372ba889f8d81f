use std::sync::Arc;
use std::time::Duration;
use tokio::sync::OwnedSemaphorePermit;
use tracing::{error, info, warn, Instrument, Span};

use super::job::{JobState, RelayJob};
use super::retry::RetryPolicy;
use crate::cancel::{CancelToken, Deadline};
use crate::chain::{wait_for_confirmations, ChainRegistry, RawLogEvent};
use crate::codec::{self, EncodeOptions, MessageCodec};
use crate::error::{RelayError, Result};
use crate::spans;
use crate::store::{ClaimOutcome, NonceStore};
use crate::traits::Clock;
use crate::transport::{FetchContext, TransportRegistry};

/// Drives relay jobs through their state machine.
///
/// One orchestrator is shared by every job of the service. Per job it checks
/// the message against the chain configuration, fetches the attestation
/// from the transport named by the message, claims the nonce, submits
/// `receiveMessage` on the destination gateway and waits for confirmation
/// depth. Retryable errors repeat the current step with exponential backoff;
/// anything else ends the job.
///
/// # Example
///
/// ```rust,no_run
/// use ccmp_relayer::relay::RelayOrchestrator;
/// use ccmp_relayer::{CancelToken, ChainRegistry, InMemoryNonceStore, TransportRegistry};
/// use ccmp_relayer::providers::TokioClock;
/// use std::sync::Arc;
///
/// # async fn example(
/// #     chains: ChainRegistry,
/// #     transports: TransportRegistry,
/// #     log: ccmp_relayer::RawLogEvent,
/// # ) -> Result<(), ccmp_relayer::RelayError> {
/// let orchestrator = RelayOrchestrator::builder()
///     .chains(Arc::new(chains))
///     .transports(transports)
///     .store(Arc::new(InMemoryNonceStore::new()))
///     .clock(TokioClock::new())
///     .build();
///
/// let job = orchestrator.relay_log(80001, &log, &CancelToken::new()).await?;
/// println!("job ended in {}", job.state());
/// # Ok(())
/// # }
/// ```
pub struct RelayOrchestrator<C: Clock> {
    codec: MessageCodec,
    chains: Arc<ChainRegistry>,
    transports: TransportRegistry,
    store: Arc<dyn NonceStore>,
    clock: C,
    retry: RetryPolicy,
    job_timeout: Option<Duration>,
    confirmation_poll_interval: Duration,
    encode_options: EncodeOptions,
}

#[bon::bon]
impl<C: Clock> RelayOrchestrator<C> {
    #[builder]
    pub fn new(
        chains: Arc<ChainRegistry>,
        transports: TransportRegistry,
        store: Arc<dyn NonceStore>,
        clock: C,
        #[builder(default)] codec: MessageCodec,
        #[builder(default)] retry: RetryPolicy,
        /// Overall budget of a job, from observation to a terminal state
        job_timeout: Option<Duration>,
        #[builder(default = Duration::from_secs(3))] confirmation_poll_interval: Duration,
        #[builder(default)] encode_options: EncodeOptions,
    ) -> Self {
        Self {
            codec,
            chains,
            transports,
            store,
            clock,
            retry,
            job_timeout,
            confirmation_poll_interval,
            encode_options,
        }
    }
}

impl<C: Clock> RelayOrchestrator<C> {
    pub fn codec(&self) -> &MessageCodec {
        &self.codec
    }

    pub fn chains(&self) -> &ChainRegistry {
        &self.chains
    }

    /// Decode a routed-message log observed on `source_chain_id` and relay it.
    ///
    /// # Errors
    ///
    /// Only when no job can be built: [`RelayError::Decode`] for logs that do
    /// not decode, [`RelayError::InvalidMessage`] for a message claiming a
    /// different source chain than the one it was observed on. Every later
    /// failure is reported through the returned job's state.
    pub async fn relay_log(
        &self,
        source_chain_id: u64,
        log: &RawLogEvent,
        cancel: &CancelToken,
    ) -> Result<RelayJob> {
        let message = self
            .codec
            .decode_instrumented(source_chain_id, log)
            .await
            .inspect_err(|e| {
                error!(
                    chain_id = source_chain_id,
                    tx_hash = ?log.transaction_hash,
                    log_index = ?log.log_index,
                    error = %e,
                    event = "routed_log_dropped"
                );
            })?;

        let source_tx_hash = log
            .transaction_hash
            .ok_or_else(|| RelayError::decode("routed log carries no transaction hash"))?;

        if message.source_chain_id != source_chain_id {
            return Err(RelayError::InvalidMessage {
                reason: format!(
                    "message from chain {} observed on chain {source_chain_id}",
                    message.source_chain_id
                ),
            });
        }

        Ok(self.run(RelayJob::new(message, source_tx_hash), cancel).await)
    }

    /// Drive `job` until it reaches a terminal state.
    ///
    /// Holds a worker slot of the destination chain for the whole run and
    /// gives it back on return, whatever the outcome.
    pub async fn run(&self, mut job: RelayJob, cancel: &CancelToken) -> RelayJob {
        let span = spans::relay_job(
            job.message.source_chain_id,
            &job.message.nonce,
            job.message.destination_chain_id,
            &job.message.router_adaptor,
            job.source_tx_hash,
        );

        async move {
            let cancel = cancel.child();
            let deadline = self
                .job_timeout
                .map_or(Deadline::NEVER, |timeout| Deadline::after(&self.clock, timeout));

            let _permit = match self.acquire_worker(&job, &cancel).await {
                Ok(permit) => permit,
                Err(e) => {
                    self.fail(&mut job, e).await;
                    return job;
                }
            };

            info!(
                sender = %job.message.sender,
                layout = ?job.message.layout,
                event = "relay_job_started"
            );

            while !job.state().is_terminal() {
                let state = job.state();
                let step = match state {
                    JobState::Observed => self.precheck(&mut job).await,
                    JobState::AttestationPending => {
                        self.fetch_attestation(&mut job, deadline, &cancel).await
                    }
                    JobState::AttestationReady => self.claim_nonce(&mut job).await,
                    JobState::Submitting => self.submit(&mut job, deadline, &cancel).await,
                    JobState::Confirmed | JobState::Failed | JobState::DuplicateSkipped => break,
                };

                let error = match step {
                    Ok(()) => {
                        Span::current().record("state", job.state().as_str());
                        continue;
                    }
                    Err(e) => e,
                };

                if error.is_duplicate() {
                    self.skip_duplicate(&mut job, &error).await;
                    break;
                }

                job.record_error(&error);
                if !self.should_retry(&job, &error, deadline) {
                    self.fail(&mut job, error).await;
                    break;
                }

                let mut delay = self.retry.backoff(job.attempts());
                if let Some(remaining) = deadline.remaining(&self.clock) {
                    delay = delay.min(remaining);
                }
                warn!(
                    state = %state,
                    attempt = job.attempts(),
                    max_attempts = self.retry.max_attempts,
                    delay_secs = delay.as_secs(),
                    error = %error,
                    event = "relay_step_retry_scheduled"
                );

                if let Err(e) = cancel.sleep(&self.clock, delay).await {
                    self.fail(&mut job, e).await;
                }
            }

            Span::current().record("state", job.state().as_str());
            job
        }
        .instrument(span)
        .await
    }

    async fn acquire_worker(
        &self,
        job: &RelayJob,
        cancel: &CancelToken,
    ) -> Result<Option<OwnedSemaphorePermit>> {
        // An unknown destination fails the pre-check right after.
        let Ok(destination) = self.chains.get(job.message.destination_chain_id) else {
            return Ok(None);
        };

        let workers = destination.workers();
        let permit = cancel
            .run(async move {
                workers
                    .acquire_owned()
                    .await
                    .map_err(|_| RelayError::Cancelled)
            })
            .await?;
        Ok(Some(permit))
    }

    /// `Observed`: mirror the gateway's own checks so a doomed message never
    /// costs destination gas.
    async fn precheck(&self, job: &mut RelayJob) -> Result<()> {
        let message = &job.message;
        message.validate()?;
        self.chains
            .ensure_gateway(message.source_chain_id, message.source_gateway)?;
        self.chains.get(message.destination_chain_id)?;
        self.chains
            .ensure_gateway(message.destination_chain_id, message.destination_gateway)?;
        self.transports.resolve(&message.router_adaptor)?;

        let confirmation = self
            .store
            .confirmation(message.source_chain_id, message.nonce)
            .await?;
        if let Some(tx_hash) = confirmation {
            info!(
                destination_tx_hash = %tx_hash,
                event = "relay_job_already_confirmed"
            );
            job.destination_tx_hash = Some(tx_hash);
            job.transition(JobState::DuplicateSkipped);
            return Ok(());
        }

        job.transition(JobState::AttestationPending);
        Ok(())
    }

    /// `AttestationPending`: read the source receipt and ask the message's
    /// transport for its attestation.
    async fn fetch_attestation(
        &self,
        job: &mut RelayJob,
        deadline: Deadline,
        cancel: &CancelToken,
    ) -> Result<()> {
        let source = self.chains.get(job.message.source_chain_id)?;
        let receipt = cancel
            .run(source.client().get_receipt(job.source_tx_hash))
            .await?;
        let fetcher = self.transports.resolve(&job.message.router_adaptor)?;

        let ctx = FetchContext {
            message: &job.message,
            source_tx_hash: job.source_tx_hash,
            source_receipt: &receipt,
            deadline,
            cancel,
        };
        let record = fetcher.fetch_attestation(&ctx).await?;

        info!(
            transport = %record.transport,
            verification_data_length_bytes = record.verification_data().len(),
            event = "relay_job_attestation_ready"
        );
        job.attestation = Some(record);
        job.transition(JobState::AttestationReady);
        Ok(())
    }

    /// `AttestationReady`: re-check the store and take ownership of the nonce.
    ///
    /// A nonce held by another worker is retried like any transient error.
    async fn claim_nonce(&self, job: &mut RelayJob) -> Result<()> {
        let outcome = self
            .store
            .try_claim(job.message.source_chain_id, job.message.nonce)
            .await?;

        match outcome {
            ClaimOutcome::Claimed => {
                job.holds_claim = true;
                job.transition(JobState::Submitting);
            }
            ClaimOutcome::Confirmed(tx_hash) => {
                info!(
                    destination_tx_hash = %tx_hash,
                    event = "relay_job_already_confirmed"
                );
                job.destination_tx_hash = Some(tx_hash);
                job.transition(JobState::DuplicateSkipped);
            }
            ClaimOutcome::InFlight => {
                // The owner may still release it without confirming.
                info!(event = "relay_job_nonce_in_flight");
                return Err(RelayError::NonceInFlight {
                    source_chain_id: job.message.source_chain_id,
                    nonce: job.message.nonce,
                });
            }
        }
        Ok(())
    }

    /// `Submitting`: send `receiveMessage` unless a transaction is already
    /// out, then wait for its confirmation depth.
    async fn submit(
        &self,
        job: &mut RelayJob,
        deadline: Deadline,
        cancel: &CancelToken,
    ) -> Result<()> {
        let source_chain_id = job.message.source_chain_id;
        let nonce = job.message.nonce;
        let destination = self.chains.get(job.message.destination_chain_id)?;

        let tx_hash = match job.destination_tx_hash {
            Some(tx_hash) => tx_hash,
            None => {
                let attestation =
                    job.attestation
                        .as_ref()
                        .ok_or_else(|| RelayError::AttestationFailed {
                            reason: "job reached submission without an attestation".to_string(),
                        })?;
                let mut call = codec::encode(&job.message, attestation, self.encode_options)?;
                call.gas_limit = destination.gas_limit;
                call.gas_price = destination.gas_price;

                let span = spans::submit_message(
                    destination.chain_id,
                    &call.to,
                    &nonce,
                    attestation.verification_data().len(),
                );
                let tx_hash = async {
                    let result = cancel.run(destination.submit(&call)).await;
                    match &result {
                        Ok(tx_hash) => {
                            Span::current().record("tx_hash", tx_hash.to_string());
                            info!(tx_hash = %tx_hash, event = "receive_message_submitted");
                        }
                        Err(e) => spans::record_error(e),
                    }
                    result
                }
                .instrument(span)
                .await?;

                job.destination_tx_hash = Some(tx_hash);
                tx_hash
            }
        };

        let confirmed = wait_for_confirmations(
            destination.client(),
            &self.clock,
            tx_hash,
            destination.confirmations,
            self.confirmation_poll_interval,
            deadline,
            cancel,
        )
        .await;

        let receipt = match confirmed {
            Ok(receipt) => receipt,
            Err(e @ RelayError::TransactionReverted { .. }) => {
                // Mined and reverted, so a new submission cannot double-execute.
                job.destination_tx_hash = None;
                return Err(e);
            }
            Err(e) => return Err(e),
        };

        if let Err(e) = self
            .store
            .mark_confirmed(source_chain_id, nonce, tx_hash)
            .await
        {
            error!(
                error = %e,
                destination_tx_hash = %tx_hash,
                event = "nonce_store_write_failed"
            );
        }
        job.holds_claim = false;

        info!(
            destination_tx_hash = %tx_hash,
            block_number = receipt.block_number,
            event = "relay_job_confirmed"
        );
        job.transition(JobState::Confirmed);
        Ok(())
    }

    fn should_retry(&self, job: &RelayJob, error: &RelayError, deadline: Deadline) -> bool {
        let retryable =
            error.is_retryable() || matches!(error, RelayError::TransactionReverted { .. });
        retryable && self.retry.allows(job.attempts()) && !deadline.is_expired(&self.clock)
    }

    async fn release_claim(&self, job: &mut RelayJob) {
        if !job.holds_claim {
            return;
        }
        job.holds_claim = false;
        if let Err(e) = self
            .store
            .release(job.message.source_chain_id, job.message.nonce)
            .await
        {
            warn!(error = %e, event = "nonce_release_failed");
        }
    }

    async fn skip_duplicate(&self, job: &mut RelayJob, reason: &RelayError) {
        self.release_claim(job).await;
        job.note_error(reason);
        info!(
            state = %job.state(),
            reason = %reason,
            event = "relay_job_duplicate_skipped"
        );
        job.transition(JobState::DuplicateSkipped);
    }

    async fn fail(&self, job: &mut RelayJob, error: RelayError) {
        self.release_claim(job).await;
        job.note_error(&error);
        spans::record_error(&error);

        let message = &job.message;
        error!(
            source_chain_id = message.source_chain_id,
            destination_chain_id = message.destination_chain_id,
            nonce = %message.nonce,
            sender = %message.sender,
            router_adaptor = %message.router_adaptor,
            source_tx_hash = %job.source_tx_hash,
            destination_tx_hash = ?job.destination_tx_hash,
            state = %job.state(),
            attempts = job.attempts(),
            error = %error,
            error_kind = error.kind(),
            event = "relay_job_failed"
        );
        job.transition(JobState::Failed);
    }
}
