//! Transport attestation fetchers
//!
//! Each transport proves delivery differently: Wormhole guardians sign a VAA,
//! Axelar approves the contract call on the destination gateway, Hyperlane
//! processes the message on the destination mailbox. The fetchers hide that
//! behind [`AttestationFetcher`] and [`TransportRegistry`] picks one from the
//! message's adaptor name.

mod axelar;
mod config;
mod hyperlane;
mod wormhole;

pub use axelar::{AxelarFetcher, ExecuteParams, GmpStatus, GmpStatusResponse};
pub use config::{
    PollingConfig, AXELARSCAN_MAINNET, AXELARSCAN_TESTNET, WORMHOLE_GUARDIAN_MAINNET,
    WORMHOLE_GUARDIAN_TESTNET,
};
pub use hyperlane::{DeliveryOracles, HyperlaneFetcher};
pub use wormhole::{wormhole_chain_id, VaaId, WormholeFetcher};

use alloy_primitives::TxHash;
use async_trait::async_trait;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, info, warn, Instrument};

use crate::cancel::{CancelToken, Deadline};
use crate::chain::TxReceipt;
use crate::error::{RelayError, Result};
use crate::protocol::{AttestationRecord, CrossChainMessage, TransportKind};
use crate::spans;
use crate::traits::Clock;

/// Everything a fetcher may look at for one message.
#[derive(Debug, Clone, Copy)]
pub struct FetchContext<'a> {
    pub message: &'a CrossChainMessage,
    pub source_tx_hash: TxHash,
    /// Receipt of the source transaction, holding the transport's own logs
    pub source_receipt: &'a TxReceipt,
    pub deadline: Deadline,
    pub cancel: &'a CancelToken,
}

/// Produces the attestation a destination gateway needs for a message.
///
/// # Errors
///
/// Implementations return [`RelayError::AttestationTimeout`] once the
/// context deadline or their attempt budget runs out, and
/// [`RelayError::Cancelled`] when the context's token fires.
#[async_trait]
pub trait AttestationFetcher: Send + Sync {
    fn kind(&self) -> TransportKind;

    async fn fetch_attestation(&self, ctx: &FetchContext<'_>) -> Result<AttestationRecord>;
}

/// Fetchers keyed by transport.
#[derive(Clone, Default)]
pub struct TransportRegistry {
    fetchers: HashMap<TransportKind, Arc<dyn AttestationFetcher>>,
}

impl fmt::Debug for TransportRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut kinds: Vec<_> = self.fetchers.keys().map(|kind| kind.as_str()).collect();
        kinds.sort_unstable();
        f.debug_struct("TransportRegistry")
            .field("transports", &kinds)
            .finish()
    }
}

impl TransportRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `fetcher` under its own [`AttestationFetcher::kind`],
    /// replacing any previous one.
    pub fn register(&mut self, fetcher: Arc<dyn AttestationFetcher>) {
        self.fetchers.insert(fetcher.kind(), fetcher);
    }

    pub fn with(mut self, fetcher: Arc<dyn AttestationFetcher>) -> Self {
        self.register(fetcher);
        self
    }

    /// Wrap every registered fetcher in a [`CachingFetcher`].
    pub fn cached(self) -> Self {
        Self {
            fetchers: self
                .fetchers
                .into_iter()
                .map(|(kind, fetcher)| {
                    let cached: Arc<dyn AttestationFetcher> = Arc::new(CachingFetcher::new(fetcher));
                    (kind, cached)
                })
                .collect(),
        }
    }

    pub fn get(&self, kind: TransportKind) -> Option<&Arc<dyn AttestationFetcher>> {
        self.fetchers.get(&kind)
    }

    /// Fetcher for an on-chain adaptor name.
    ///
    /// # Errors
    ///
    /// [`RelayError::UnsupportedAdapter`] if the name is unknown or no fetcher
    /// is registered for its transport.
    pub fn resolve(&self, adaptor_name: &str) -> Result<Arc<dyn AttestationFetcher>> {
        let kind: TransportKind = adaptor_name.parse()?;
        self.fetchers
            .get(&kind)
            .cloned()
            .ok_or_else(|| RelayError::UnsupportedAdapter {
                name: adaptor_name.to_string(),
            })
    }
}

/// Remembers successful attestations per `(source tx, transport)`.
///
/// Failures are not cached, so a retried job asks the inner fetcher again.
pub struct CachingFetcher {
    inner: Arc<dyn AttestationFetcher>,
    cache: Mutex<HashMap<(TxHash, TransportKind), AttestationRecord>>,
}

impl CachingFetcher {
    pub fn new(inner: Arc<dyn AttestationFetcher>) -> Self {
        Self {
            inner,
            cache: Mutex::new(HashMap::new()),
        }
    }

    pub fn cached(&self, source_tx_hash: TxHash) -> Option<AttestationRecord> {
        self.cache
            .lock()
            .ok()?
            .get(&(source_tx_hash, self.inner.kind()))
            .cloned()
    }
}

#[async_trait]
impl AttestationFetcher for CachingFetcher {
    fn kind(&self) -> TransportKind {
        self.inner.kind()
    }

    async fn fetch_attestation(&self, ctx: &FetchContext<'_>) -> Result<AttestationRecord> {
        if let Some(record) = self.cached(ctx.source_tx_hash) {
            debug!(
                transport = %self.kind(),
                source_tx_hash = %ctx.source_tx_hash,
                event = "attestation_cache_hit"
            );
            return Ok(record);
        }

        let record = self.inner.fetch_attestation(ctx).await?;
        if record.is_ready() {
            if let Ok(mut cache) = self.cache.lock() {
                cache.insert((ctx.source_tx_hash, self.kind()), record.clone());
            }
        }
        Ok(record)
    }
}

/// Fixed-interval polling shared by the fetchers.
///
/// `poll` returns `Ok(None)` while the attestation is pending. Retryable
/// errors are logged and polled through, anything else is returned. A rate
/// limit stretches the next wait to the server's `Retry-After`.
pub(crate) async fn poll_until_ready<C, F, Fut, T>(
    transport: TransportKind,
    clock: &C,
    polling: PollingConfig,
    ctx: &FetchContext<'_>,
    mut poll: F,
) -> Result<T>
where
    C: Clock + ?Sized,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Option<T>>>,
{
    let max_attempts = polling.max_attempts.unwrap_or(u32::MAX);

    for attempt in 1..=max_attempts {
        ctx.cancel.check()?;
        let mut delay = polling.poll_interval();

        let result = ctx
            .cancel
            .run(poll())
            .instrument(spans::poll_attestation(transport, attempt))
            .await;

        match result {
            Ok(Some(value)) => {
                info!(
                    transport = %transport,
                    attempt = attempt,
                    event = "attestation_ready"
                );
                return Ok(value);
            }
            Ok(None) => {
                debug!(
                    transport = %transport,
                    attempt = attempt,
                    event = "attestation_pending"
                );
            }
            Err(RelayError::RateLimitExceeded {
                retry_after_seconds,
            }) => {
                warn!(
                    transport = %transport,
                    attempt = attempt,
                    retry_after_seconds = retry_after_seconds,
                    event = "attestation_rate_limited"
                );
                delay = delay.max(Duration::from_secs(retry_after_seconds));
            }
            Err(e) if e.is_retryable() => {
                warn!(
                    transport = %transport,
                    attempt = attempt,
                    error = %e,
                    event = "attestation_poll_failed"
                );
            }
            Err(e) => {
                spans::record_error(&e);
                return Err(e);
            }
        }

        if ctx.deadline.is_expired(clock) || attempt == max_attempts {
            break;
        }

        let delay = ctx
            .deadline
            .remaining(clock)
            .map_or(delay, |remaining| delay.min(remaining));
        ctx.cancel.sleep(clock, delay).await?;
    }

    let error = RelayError::AttestationTimeout { transport };
    spans::record_error(&error);
    Err(error)
}
