//! Canonical cross-chain message envelope
//!
//! A [`CrossChainMessage`] is what the source gateway emits in its
//! `CCMPMessageRouted` event and what the destination gateway accepts in
//! `receiveMessage`. Several on-chain layouts exist (see [`EventLayout`]); the
//! envelope keeps track of which one it came from so it can be re-encoded
//! exactly.

use alloy_primitives::{Address, Bytes, U256};
use serde::{Deserialize, Serialize};

use crate::error::{RelayError, Result};

/// Number of low bits of a nonce that hold the per-chain sequence.
pub const NONCE_SEQUENCE_BITS: usize = 128;

/// On-chain layout of the routed-message event and of the matching
/// destination call.
///
/// The event carries no version field, so the layout is selected from the
/// event topic hash (see [`crate::codec::TopicRegistry`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventLayout {
    /// First gateway generation: no fee arguments, payload operations are
    /// tagged `{operation, data}`, destination call is
    /// `receiveMessage(message, verificationData)`.
    Legacy,
    /// Gateways with relayer fees: `gasFeePaymentArgs` is
    /// `{feeTokenAddress, feeAmount, relayer}`, payload operations are plain
    /// `{to, _calldata}` calls, destination call takes an extra
    /// `allowPartialExecution` flag.
    FeeBearing,
    /// Executor-based gateways: fee arguments gain a payment mode and the
    /// index of the payload operation funding the fee, payload operations are
    /// tagged `{operationType, data}`.
    PayloadIndexedFee,
}

impl EventLayout {
    pub const ALL: [EventLayout; 3] = [Self::Legacy, Self::FeeBearing, Self::PayloadIndexedFee];

    /// Whether the event and destination call carry `gasFeePaymentArgs`.
    pub const fn has_fee_args(self) -> bool {
        !matches!(self, Self::Legacy)
    }
}

/// Kind of a tagged payload operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationType {
    /// Arbitrary contract call on the destination chain
    Call,
    /// Token transfer or exit handled by the gateway executor
    TokenTransfer,
    /// Operation tag this relay does not interpret; carried through verbatim
    Other(u8),
}

impl From<u8> for OperationType {
    fn from(value: u8) -> Self {
        match value {
            0 => Self::Call,
            1 => Self::TokenTransfer,
            other => Self::Other(other),
        }
    }
}

impl From<OperationType> for u8 {
    fn from(value: OperationType) -> Self {
        match value {
            OperationType::Call => 0,
            OperationType::TokenTransfer => 1,
            OperationType::Other(other) => other,
        }
    }
}

/// One step of a message payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PayloadOperation {
    /// Plain call, used by the fee-bearing layout.
    Call { to: Address, calldata: Bytes },
    /// Tagged operation, used by the legacy and payload-indexed-fee layouts.
    Tagged {
        operation_type: OperationType,
        data: Bytes,
    },
}

impl PayloadOperation {
    /// Whether this operation can be encoded in `layout`.
    pub fn fits(&self, layout: EventLayout) -> bool {
        match self {
            Self::Call { .. } => layout == EventLayout::FeeBearing,
            Self::Tagged { .. } => layout != EventLayout::FeeBearing,
        }
    }
}

/// How the relayer fee is paid on the source chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FeePaymentMode {
    /// Fee is paid on top of the payload value
    ViaExtraTokens,
    /// Fee is deducted from the token transfer at `fee_source_payload_index`
    CutFromPayload,
    /// Mode value this relay does not interpret
    Other(u8),
}

impl From<u8> for FeePaymentMode {
    fn from(value: u8) -> Self {
        match value {
            0 => Self::ViaExtraTokens,
            1 => Self::CutFromPayload,
            other => Self::Other(other),
        }
    }
}

impl From<FeePaymentMode> for u8 {
    fn from(value: FeePaymentMode) -> Self {
        match value {
            FeePaymentMode::ViaExtraTokens => 0,
            FeePaymentMode::CutFromPayload => 1,
            FeePaymentMode::Other(other) => other,
        }
    }
}

/// Relayer fee terms attached to a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GasFeePaymentArgs {
    /// Only present in the payload-indexed-fee layout
    pub mode: Option<FeePaymentMode>,
    pub fee_token_address: Address,
    pub fee_amount: U256,
    /// Index of the payload operation that funds the fee in
    /// [`FeePaymentMode::CutFromPayload`] mode. Only present in the
    /// payload-indexed-fee layout.
    pub fee_source_payload_index: Option<U256>,
    pub relayer: Address,
}

impl GasFeePaymentArgs {
    fn fits(&self, layout: EventLayout) -> bool {
        let indexed = self.mode.is_some() && self.fee_source_payload_index.is_some();
        let plain = self.mode.is_none() && self.fee_source_payload_index.is_none();
        match layout {
            EventLayout::Legacy => false,
            EventLayout::FeeBearing => plain,
            EventLayout::PayloadIndexedFee => indexed,
        }
    }
}

/// Canonical envelope routed between chains.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrossChainMessage {
    pub layout: EventLayout,
    pub sender: Address,
    pub source_gateway: Address,
    pub source_adaptor: Address,
    pub source_chain_id: u64,
    pub destination_gateway: Address,
    pub destination_chain_id: u64,
    /// `source_chain_id * 2^128 + sequence`
    pub nonce: U256,
    /// Adaptor name exactly as emitted on chain
    pub router_adaptor: String,
    pub gas_fee_payment_args: Option<GasFeePaymentArgs>,
    pub payload: Vec<PayloadOperation>,
}

impl CrossChainMessage {
    /// Build a nonce the way gateways assign them.
    ///
    /// ```rust
    /// use ccmp_relayer::CrossChainMessage;
    /// use alloy_primitives::U256;
    ///
    /// let nonce = CrossChainMessage::compose_nonce(80001, 7);
    /// assert_eq!(nonce, (U256::from(80001u64) << 128) + U256::from(7u64));
    /// ```
    pub fn compose_nonce(source_chain_id: u64, sequence: u128) -> U256 {
        (U256::from(source_chain_id) << NONCE_SEQUENCE_BITS) | U256::from(sequence)
    }

    /// Sequence part of the nonce (low 128 bits).
    pub fn nonce_sequence(&self) -> U256 {
        let mask = (U256::from(1u8) << NONCE_SEQUENCE_BITS) - U256::from(1u8);
        self.nonce & mask
    }

    /// Chain id part of the nonce (high bits).
    pub fn nonce_chain_id(&self) -> U256 {
        self.nonce >> NONCE_SEQUENCE_BITS
    }

    /// Check the invariants that do not depend on chain configuration.
    pub fn validate(&self) -> Result<()> {
        if self.payload.is_empty() {
            return Err(RelayError::InvalidMessage {
                reason: "payload is empty".to_string(),
            });
        }

        if self.source_chain_id == self.destination_chain_id {
            return Err(RelayError::InvalidMessage {
                reason: format!(
                    "destination chain {} equals source chain",
                    self.destination_chain_id
                ),
            });
        }

        if let Some(op) = self.payload.iter().find(|op| !op.fits(self.layout)) {
            return Err(RelayError::InvalidMessage {
                reason: format!("{op:?} cannot be encoded in the {:?} layout", self.layout),
            });
        }

        match (&self.gas_fee_payment_args, self.layout.has_fee_args()) {
            (None, false) => Ok(()),
            (Some(args), true) if args.fits(self.layout) => Ok(()),
            (Some(_), _) => Err(RelayError::InvalidMessage {
                reason: format!("fee arguments do not match the {:?} layout", self.layout),
            }),
            (None, true) => Err(RelayError::InvalidMessage {
                reason: format!("{:?} layout requires fee arguments", self.layout),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::address;

    fn legacy_message() -> CrossChainMessage {
        CrossChainMessage {
            layout: EventLayout::Legacy,
            sender: address!("1000000000000000000000000000000000000001"),
            source_gateway: address!("404172100D6A428F5Eae378650f4259CC803de7c"),
            source_adaptor: address!("84fEe39095b18962b875588dF7F9Ad1bE87e8653"),
            source_chain_id: 80001,
            destination_gateway: address!("404172100D6A428F5Eae378650f4259CC803de7c"),
            destination_chain_id: 43113,
            nonce: CrossChainMessage::compose_nonce(80001, 42),
            router_adaptor: "wormhole".to_string(),
            gas_fee_payment_args: None,
            payload: vec![PayloadOperation::Tagged {
                operation_type: OperationType::Call,
                data: Bytes::from_static(&[0xde, 0xad]),
            }],
        }
    }

    #[test]
    fn test_nonce_parts() {
        let message = legacy_message();
        assert_eq!(message.nonce_sequence(), U256::from(42u64));
        assert_eq!(message.nonce_chain_id(), U256::from(80001u64));
    }

    #[test]
    fn test_valid_message() {
        assert!(legacy_message().validate().is_ok());
    }

    #[test]
    fn test_empty_payload_rejected() {
        let mut message = legacy_message();
        message.payload.clear();
        assert!(matches!(
            message.validate(),
            Err(RelayError::InvalidMessage { reason }) if reason.contains("empty")
        ));
    }

    #[test]
    fn test_same_chain_rejected() {
        let mut message = legacy_message();
        message.destination_chain_id = message.source_chain_id;
        assert!(message.validate().is_err());
    }

    #[test]
    fn test_mixed_layout_rejected() {
        let mut message = legacy_message();
        message.payload.push(PayloadOperation::Call {
            to: Address::ZERO,
            calldata: Bytes::new(),
        });
        assert!(message.validate().is_err());
    }

    #[test]
    fn test_fee_args_must_match_layout() {
        let mut message = legacy_message();
        let plain_fee = GasFeePaymentArgs {
            mode: None,
            fee_token_address: Address::ZERO,
            fee_amount: U256::from(1u64),
            fee_source_payload_index: None,
            relayer: Address::ZERO,
        };
        message.gas_fee_payment_args = Some(plain_fee.clone());
        assert!(message.validate().is_err(), "legacy layout has no fee");

        message.layout = EventLayout::PayloadIndexedFee;
        assert!(message.validate().is_err(), "indexed fee needs mode and index");

        message.gas_fee_payment_args = Some(GasFeePaymentArgs {
            mode: Some(FeePaymentMode::CutFromPayload),
            fee_source_payload_index: Some(U256::ZERO),
            ..plain_fee
        });
        assert!(message.validate().is_ok());

        message.gas_fee_payment_args = None;
        assert!(message.validate().is_err());
    }

    #[test]
    fn test_operation_type_round_trip() {
        for raw in [0u8, 1, 7] {
            assert_eq!(u8::from(OperationType::from(raw)), raw);
            assert_eq!(u8::from(FeePaymentMode::from(raw)), raw);
        }
        assert_eq!(OperationType::from(1), OperationType::TokenTransfer);
        assert_eq!(FeePaymentMode::from(1), FeePaymentMode::CutFromPayload);
    }
}
