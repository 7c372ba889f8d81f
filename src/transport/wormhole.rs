//! Wormhole attestation: a guardian-signed VAA.

use alloy_primitives::{hex, Address, Bytes, B256};
use alloy_sol_types::SolEvent;
use async_trait::async_trait;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::{info, Instrument};

use super::{poll_until_ready, AttestationFetcher, FetchContext, PollingConfig};
use crate::chain::TxReceipt;
use crate::contracts::wormhole::LogMessagePublished;
use crate::error::{RelayError, Result};
use crate::protocol::{AttestationProof, AttestationRecord, TransportKind};
use crate::spans;
use crate::traits::{Clock, GuardianApi};

/// Wormhole chain id of an EVM chain, for the chains gateways are deployed on.
///
/// ```rust
/// use ccmp_relayer::transport::wormhole_chain_id;
///
/// assert_eq!(wormhole_chain_id(43113), Some(6));
/// assert_eq!(wormhole_chain_id(31337), None);
/// ```
pub fn wormhole_chain_id(chain_id: u64) -> Option<u16> {
    match chain_id {
        1 | 5 => Some(2),
        56 | 97 => Some(4),
        137 | 80001 => Some(5),
        43114 | 43113 => Some(6),
        250 | 4002 => Some(10),
        42161 | 421613 => Some(23),
        10 | 420 => Some(24),
        8453 | 84531 => Some(30),
        _ => None,
    }
}

/// Key of a VAA in the guardian network.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VaaId {
    pub emitter_chain: u16,
    /// Emitting contract, left-padded to 32 bytes
    pub emitter_address: B256,
    pub sequence: u64,
}

impl VaaId {
    pub fn new(emitter_chain: u16, emitter: Address, sequence: u64) -> Self {
        Self {
            emitter_chain,
            emitter_address: emitter.into_word(),
            sequence,
        }
    }
}

impl fmt::Display for VaaId {
    /// `chain/emitter/sequence`, the path layout of the guardian REST API.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}/{}",
            self.emitter_chain,
            hex::encode(self.emitter_address),
            self.sequence
        )
    }
}

/// Polls the guardians for the VAA of the source adaptor's published message.
pub struct WormholeFetcher<C: Clock> {
    guardian: Arc<dyn GuardianApi>,
    clock: C,
    polling: PollingConfig,
    chain_ids: HashMap<u64, u16>,
    core_bridges: HashMap<u64, Address>,
}

#[bon::bon]
impl<C: Clock> WormholeFetcher<C> {
    /// `chain_ids` overrides [`wormhole_chain_id`]. When `core_bridges` has
    /// an entry for the source chain, only that contract's logs are read.
    #[builder]
    pub fn new(
        guardian: Arc<dyn GuardianApi>,
        clock: C,
        #[builder(default = PollingConfig::wormhole())] polling: PollingConfig,
        #[builder(default)] chain_ids: HashMap<u64, u16>,
        #[builder(default)] core_bridges: HashMap<u64, Address>,
    ) -> Self {
        Self {
            guardian,
            clock,
            polling,
            chain_ids,
            core_bridges,
        }
    }

    /// Locate the VAA the source transaction produced.
    pub fn vaa_id(&self, ctx: &FetchContext<'_>) -> Result<VaaId> {
        let chain_id = ctx.message.source_chain_id;
        let emitter_chain = self
            .chain_ids
            .get(&chain_id)
            .copied()
            .or_else(|| wormhole_chain_id(chain_id))
            .ok_or_else(|| {
                RelayError::InvalidConfig(format!("no Wormhole chain id for chain {chain_id}"))
            })?;

        let emitter = ctx.message.source_adaptor;
        let sequence = find_sequence(
            ctx.source_receipt,
            emitter,
            self.core_bridges.get(&chain_id).copied(),
        )?;

        Ok(VaaId::new(emitter_chain, emitter, sequence))
    }
}

/// Sequence of the first `LogMessagePublished` whose sender is `emitter`.
fn find_sequence(receipt: &TxReceipt, emitter: Address, core_bridge: Option<Address>) -> Result<u64> {
    let sender_topic = emitter.into_word();
    let log = receipt
        .logs
        .iter()
        .filter(|log| core_bridge.is_none_or(|bridge| log.address == bridge))
        .find(|log| {
            log.topic0() == Some(LogMessagePublished::SIGNATURE_HASH)
                && log.topics.get(1) == Some(&sender_topic)
        })
        .ok_or_else(|| RelayError::AttestationFailed {
            reason: format!(
                "no LogMessagePublished from {emitter} in {}",
                receipt.transaction_hash
            ),
        })?;

    let (sequence, _nonce, _payload, _consistency_level) =
        LogMessagePublished::abi_decode_data(&log.data)?;
    Ok(sequence)
}

#[async_trait]
impl<C: Clock> AttestationFetcher for WormholeFetcher<C> {
    fn kind(&self) -> TransportKind {
        TransportKind::Wormhole
    }

    async fn fetch_attestation(&self, ctx: &FetchContext<'_>) -> Result<AttestationRecord> {
        let span = spans::fetch_attestation(
            TransportKind::Wormhole,
            ctx.source_tx_hash,
            ctx.message.source_chain_id,
            ctx.message.destination_chain_id,
            self.polling.poll_interval_secs,
        );

        async move {
            let id = self.vaa_id(ctx).inspect_err(spans::record_error)?;
            info!(
                vaa_id = %id,
                event = "wormhole_vaa_polling_started"
            );

            let guardian = self.guardian.as_ref();
            let id_ref = &id;
            let vaa: Bytes = poll_until_ready(
                TransportKind::Wormhole,
                &self.clock,
                self.polling,
                ctx,
                move || guardian.get_signed_vaa(id_ref),
            )
            .await?;

            info!(
                vaa_id = %id,
                vaa_length_bytes = vaa.len(),
                event = "wormhole_vaa_signed"
            );

            Ok(AttestationRecord::ready(
                TransportKind::Wormhole,
                ctx.source_tx_hash,
                AttestationProof::Vaa(vaa),
            ))
        }
        .instrument(span)
        .await
    }
}
