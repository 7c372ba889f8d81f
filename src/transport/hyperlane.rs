//! Hyperlane (formerly Abacus) attestation: delivery on the destination
//! mailbox. Nothing is forwarded; the signal only gates submission.

use alloy_primitives::{Address, B256};
use alloy_sol_types::SolEvent;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, Instrument};

use super::{poll_until_ready, AttestationFetcher, FetchContext, PollingConfig};
use crate::chain::TxReceipt;
use crate::contracts::hyperlane::Mailbox::DispatchId;
use crate::error::{RelayError, Result};
use crate::protocol::{AttestationProof, AttestationRecord, TransportKind};
use crate::spans;
use crate::traits::{Clock, DeliveryOracle};

/// Delivery oracle per destination chain id.
pub type DeliveryOracles = HashMap<u64, Arc<dyn DeliveryOracle>>;

pub struct HyperlaneFetcher<C: Clock> {
    oracles: DeliveryOracles,
    mailboxes: HashMap<u64, Address>,
    clock: C,
    polling: PollingConfig,
}

#[bon::bon]
impl<C: Clock> HyperlaneFetcher<C> {
    /// `mailboxes` optionally pins the source mailbox per chain; without an
    /// entry any `DispatchId` log in the source receipt is accepted.
    #[builder]
    pub fn new(
        oracles: DeliveryOracles,
        clock: C,
        #[builder(default)] mailboxes: HashMap<u64, Address>,
        #[builder(default = PollingConfig::hyperlane())] polling: PollingConfig,
    ) -> Self {
        Self {
            oracles,
            mailboxes,
            clock,
            polling,
        }
    }
}

fn find_message_id(receipt: &TxReceipt, mailbox: Option<Address>) -> Result<B256> {
    receipt
        .logs
        .iter()
        .filter(|log| mailbox.is_none_or(|mailbox| log.address == mailbox))
        .find(|log| log.topic0() == Some(DispatchId::SIGNATURE_HASH))
        .and_then(|log| log.topics.get(1).copied())
        .ok_or_else(|| RelayError::AttestationFailed {
            reason: format!("no DispatchId log in {}", receipt.transaction_hash),
        })
}

#[async_trait]
impl<C: Clock> AttestationFetcher for HyperlaneFetcher<C> {
    fn kind(&self) -> TransportKind {
        TransportKind::Hyperlane
    }

    async fn fetch_attestation(&self, ctx: &FetchContext<'_>) -> Result<AttestationRecord> {
        let span = spans::fetch_attestation(
            TransportKind::Hyperlane,
            ctx.source_tx_hash,
            ctx.message.source_chain_id,
            ctx.message.destination_chain_id,
            self.polling.poll_interval_secs,
        );

        async move {
            let destination = ctx.message.destination_chain_id;
            let oracle = self
                .oracles
                .get(&destination)
                .ok_or(RelayError::ChainNotConfigured {
                    chain_id: destination,
                })
                .inspect_err(spans::record_error)?
                .as_ref();

            let message_id = find_message_id(
                ctx.source_receipt,
                self.mailboxes.get(&ctx.message.source_chain_id).copied(),
            )
            .inspect_err(spans::record_error)?;
            info!(
                message_id = %message_id,
                event = "hyperlane_delivery_polling_started"
            );

            poll_until_ready(
                TransportKind::Hyperlane,
                &self.clock,
                self.polling,
                ctx,
                move || async move {
                    let delivered = oracle.is_delivered(message_id).await?;
                    Ok(delivered.then_some(()))
                },
            )
            .await?;

            Ok(AttestationRecord::ready(
                TransportKind::Hyperlane,
                ctx.source_tx_hash,
                AttestationProof::Delivered { message_id },
            ))
        }
        .instrument(span)
        .await
    }
}
