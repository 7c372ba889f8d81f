//! Long-running relay service: one log watcher per configured gateway and
//! one task per routed message.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::{JoinError, JoinSet};
use tracing::{error, info, Instrument};

use crate::cancel::CancelToken;
use crate::chain::{LogSubscription, RawLogEvent, SubscriptionConfig};
use crate::error::{RelayError, Result};
use crate::relay::{JobState, RelayJob, RelayOrchestrator};
use crate::spans;
use crate::traits::Clock;

/// Outcome counts of a service run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RelayReport {
    pub confirmed: usize,
    pub duplicates: usize,
    pub failed: usize,
    /// Logs that never became a job (undecodable, wrong chain)
    pub dropped: usize,
}

impl RelayReport {
    fn record(&mut self, finished: std::result::Result<Result<RelayJob>, JoinError>) {
        match finished {
            Ok(Ok(job)) => match job.state() {
                JobState::Confirmed => self.confirmed += 1,
                JobState::DuplicateSkipped => self.duplicates += 1,
                _ => self.failed += 1,
            },
            Ok(Err(_)) => self.dropped += 1,
            Err(e) => {
                error!(error = %e, event = "relay_task_panicked");
                self.failed += 1;
            }
        }
    }

    pub fn total(&self) -> usize {
        self.confirmed + self.duplicates + self.failed + self.dropped
    }
}

/// Watches every chain of the orchestrator's registry and relays each routed
/// message it observes.
pub struct RelayService<C: Clock + Clone + 'static> {
    orchestrator: Arc<RelayOrchestrator<C>>,
    clock: C,
    subscriptions: HashMap<u64, SubscriptionConfig>,
}

#[bon::bon]
impl<C: Clock + Clone + 'static> RelayService<C> {
    /// Chains missing from `subscriptions` use [`SubscriptionConfig::default`].
    #[builder]
    pub fn new(
        orchestrator: Arc<RelayOrchestrator<C>>,
        clock: C,
        #[builder(default)] subscriptions: HashMap<u64, SubscriptionConfig>,
    ) -> Self {
        Self {
            orchestrator,
            clock,
            subscriptions,
        }
    }
}

impl<C: Clock + Clone + 'static> RelayService<C> {
    /// Run until `cancel` fires, then wait for in-flight jobs to wind down.
    ///
    /// Jobs share the token, so they stop at their next suspension point and
    /// release any nonce they hold.
    ///
    /// # Errors
    ///
    /// [`RelayError::InvalidConfig`] if no chain is configured.
    pub async fn run(&self, cancel: &CancelToken) -> Result<RelayReport> {
        let chains = self.orchestrator.chains();
        if chains.is_empty() {
            return Err(RelayError::InvalidConfig("no chains configured".to_string()));
        }

        let topics = self.orchestrator.codec().topics().topics();
        let (sender, mut logs) = mpsc::unbounded_channel::<(u64, RawLogEvent)>();
        let mut watchers = JoinSet::new();

        for handle in chains.iter() {
            let chain_id = handle.chain_id;
            let gateway = handle.gateway;
            let config = self
                .subscriptions
                .get(&chain_id)
                .copied()
                .unwrap_or_default();
            let mut subscription = LogSubscription::new(
                handle.shared_client(),
                self.clock.clone(),
                gateway,
                topics.clone(),
                config,
            );
            let sender = sender.clone();
            let cancel = cancel.clone();

            watchers.spawn(
                async move {
                    while let Ok(log) = subscription.next(&cancel).await {
                        if sender.send((chain_id, log)).is_err() {
                            break;
                        }
                    }
                    info!(
                        cursor = ?subscription.cursor(),
                        event = "gateway_watch_stopped"
                    );
                }
                .instrument(spans::watch_gateway(chain_id, &gateway)),
            );
        }
        drop(sender);

        info!(
            chain_count = chains.len(),
            topic_count = topics.len(),
            event = "relay_service_started"
        );

        let mut report = RelayReport::default();
        let mut jobs = JoinSet::new();
        loop {
            tokio::select! {
                received = logs.recv() => match received {
                    Some((chain_id, log)) => {
                        let orchestrator = Arc::clone(&self.orchestrator);
                        let cancel = cancel.clone();
                        jobs.spawn(async move {
                            orchestrator.relay_log(chain_id, &log, &cancel).await
                        });
                    }
                    None => break,
                },
                Some(finished) = jobs.join_next(), if !jobs.is_empty() => {
                    report.record(finished);
                }
            }
        }

        while let Some(finished) = jobs.join_next().await {
            report.record(finished);
        }
        while let Some(finished) = watchers.join_next().await {
            if let Err(e) = finished {
                error!(error = %e, event = "gateway_watch_panicked");
            }
        }

        info!(
            confirmed = report.confirmed,
            duplicates = report.duplicates,
            failed = report.failed,
            dropped = report.dropped,
            event = "relay_service_stopped"
        );
        Ok(report)
    }
}
