//! Message envelope codec
//!
//! Turns `CCMPMessageRouted` logs into [`CrossChainMessage`]s and messages
//! plus attestations into `receiveMessage` calldata. The event has no version
//! field; [`TopicRegistry`] maps each known topic hash to the
//! [`EventLayout`] used to read the data.
//!
//! ```rust
//! use ccmp_relayer::codec::{TopicRegistry, DEPLOYED_FEE_BEARING_TOPIC};
//! use ccmp_relayer::EventLayout;
//!
//! let topics = TopicRegistry::default();
//! assert_eq!(topics.layout(&DEPLOYED_FEE_BEARING_TOPIC), Some(EventLayout::FeeBearing));
//! ```

use std::collections::HashMap;
use std::fmt::Display;

use alloy_primitives::{b256, keccak256, Address, Bytes, LogData, B256, U256};
use alloy_sol_types::{SolCall, SolEvent, SolValue};
use tracing::{debug, Instrument};

use crate::chain::{DestinationCall, RawLogEvent};
use crate::contracts::gateway::{fee_bearing, legacy, payload_indexed};
use crate::error::{RelayError, Result};
use crate::protocol::{
    AttestationRecord, CrossChainMessage, EventLayout, FeePaymentMode, GasFeePaymentArgs,
    OperationType, PayloadOperation, TransportKind,
};
use crate::spans;

/// Topic emitted by the fee-bearing gateways deployed on the public testnets.
///
/// It matches none of the computed layout selectors, fee-bearing included.
/// The mapping to [`EventLayout::FeeBearing`] follows the fields the deployed
/// indexer reads from these logs; the exact deployed signature is
/// unconfirmed. Suspect this entry first if such logs start failing to decode.
pub const DEPLOYED_FEE_BEARING_TOPIC: B256 =
    b256!("b163bf360fef1e41e4f6cecd0a3e58913c8abcbc45c112f1fb963f2ac9d047e5");

/// Number of topics on a routed-message log: selector, hash, sender and
/// destination chain id.
const ROUTED_TOPIC_COUNT: usize = 4;

/// Computed event selector of a layout.
pub fn signature_hash(layout: EventLayout) -> B256 {
    match layout {
        EventLayout::Legacy => legacy::CCMPMessageRouted::SIGNATURE_HASH,
        EventLayout::FeeBearing => fee_bearing::CCMPMessageRouted::SIGNATURE_HASH,
        EventLayout::PayloadIndexedFee => payload_indexed::CCMPMessageRouted::SIGNATURE_HASH,
    }
}

/// Topic hash → layout table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicRegistry {
    layouts: HashMap<B256, EventLayout>,
}

impl Default for TopicRegistry {
    /// Every layout's computed selector plus [`DEPLOYED_FEE_BEARING_TOPIC`].
    fn default() -> Self {
        let mut registry = Self::empty();
        for layout in EventLayout::ALL {
            registry.register(signature_hash(layout), layout);
        }
        registry.register(DEPLOYED_FEE_BEARING_TOPIC, EventLayout::FeeBearing);
        registry
    }
}

impl TopicRegistry {
    pub fn empty() -> Self {
        Self {
            layouts: HashMap::new(),
        }
    }

    /// Map `topic` to `layout`, returning the layout it replaced.
    pub fn register(&mut self, topic: B256, layout: EventLayout) -> Option<EventLayout> {
        self.layouts.insert(topic, layout)
    }

    pub fn with(mut self, topic: B256, layout: EventLayout) -> Self {
        self.register(topic, layout);
        self
    }

    pub fn layout(&self, topic: &B256) -> Option<EventLayout> {
        self.layouts.get(topic).copied()
    }

    /// Registered topics, sorted, for `eth_getLogs` filters.
    pub fn topics(&self) -> Vec<B256> {
        let mut topics: Vec<_> = self.layouts.keys().copied().collect();
        topics.sort();
        topics
    }
}

/// Options for building the destination call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EncodeOptions {
    /// Let the destination gateway continue past failing payload operations.
    /// Ignored by the legacy layout, whose `receiveMessage` has no such flag.
    pub allow_partial_execution: bool,
}

/// Arguments of a decoded `receiveMessage` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceiveMessageCall {
    pub message: CrossChainMessage,
    pub verification_data: Bytes,
    /// `None` for the legacy two-argument call
    pub allow_partial_execution: Option<bool>,
}

/// Decoder for routed-message logs.
#[derive(Debug, Clone, Default)]
pub struct MessageCodec {
    topics: TopicRegistry,
}

impl MessageCodec {
    pub fn new(topics: TopicRegistry) -> Self {
        Self { topics }
    }

    pub fn topics(&self) -> &TopicRegistry {
        &self.topics
    }

    /// Decode a `CCMPMessageRouted` log.
    ///
    /// # Errors
    ///
    /// [`RelayError::Decode`] with a `topic mismatch` reason when the selector
    /// is not registered, and a `malformed ABI` reason when the topics or data
    /// do not match the layout or a chain id does not fit in `u64`.
    pub fn decode(&self, log: &RawLogEvent) -> Result<CrossChainMessage> {
        let topic0 = log
            .topic0()
            .ok_or_else(|| RelayError::decode("topic mismatch: log has no topics"))?;
        let layout = self
            .topics
            .layout(&topic0)
            .ok_or_else(|| RelayError::decode(format!("topic mismatch: {topic0}")))?;

        if log.topics.len() != ROUTED_TOPIC_COUNT {
            return Err(malformed(format!(
                "expected {ROUTED_TOPIC_COUNT} topics, got {}",
                log.topics.len()
            )));
        }
        let sender = Address::from_word(log.topics[2]);
        let destination_chain_id = U256::from_be_bytes(log.topics[3].0);

        let message = match layout {
            EventLayout::Legacy => {
                let (
                    source_gateway,
                    source_adaptor,
                    source_chain_id,
                    destination_gateway,
                    nonce,
                    router_adaptor,
                    payload,
                ) = legacy::CCMPMessageRouted::abi_decode_data(&log.data).map_err(malformed)?;
                from_legacy(legacy::CCMPMessage {
                    sender,
                    sourceGateway: source_gateway,
                    sourceAdaptor: source_adaptor,
                    sourceChainId: source_chain_id,
                    destinationGateway: destination_gateway,
                    destinationChainId: destination_chain_id,
                    nonce,
                    routerAdaptor: router_adaptor,
                    payload,
                })?
            }
            EventLayout::FeeBearing => {
                let (
                    source_gateway,
                    source_adaptor,
                    source_chain_id,
                    destination_gateway,
                    nonce,
                    router_adaptor,
                    fee,
                    payload,
                ) = fee_bearing::CCMPMessageRouted::abi_decode_data(&log.data)
                    .map_err(malformed)?;
                from_fee_bearing(fee_bearing::CCMPMessage {
                    sender,
                    sourceGateway: source_gateway,
                    sourceAdaptor: source_adaptor,
                    sourceChainId: source_chain_id,
                    destinationGateway: destination_gateway,
                    destinationChainId: destination_chain_id,
                    nonce,
                    routerAdaptor: router_adaptor,
                    gasFeePaymentArgs: fee,
                    payload,
                })?
            }
            EventLayout::PayloadIndexedFee => {
                let (
                    source_gateway,
                    source_adaptor,
                    source_chain_id,
                    destination_gateway,
                    nonce,
                    router_adaptor,
                    fee,
                    payload,
                ) = payload_indexed::CCMPMessageRouted::abi_decode_data(&log.data)
                    .map_err(malformed)?;
                from_payload_indexed(payload_indexed::CCMPMessage {
                    sender,
                    sourceGateway: source_gateway,
                    sourceAdaptor: source_adaptor,
                    sourceChainId: source_chain_id,
                    destinationGateway: destination_gateway,
                    destinationChainId: destination_chain_id,
                    nonce,
                    routerAdaptor: router_adaptor,
                    gasFeePaymentArgs: fee,
                    payload,
                })?
            }
        };

        debug!(
            layout = ?layout,
            source_chain_id = message.source_chain_id,
            destination_chain_id = message.destination_chain_id,
            nonce = %message.nonce,
            router_adaptor = %message.router_adaptor,
            event = "routed_message_decoded"
        );

        Ok(message)
    }

    /// [`MessageCodec::decode`] inside a `decode_routed_message` span.
    pub async fn decode_instrumented(
        &self,
        chain_id: u64,
        log: &RawLogEvent,
    ) -> Result<CrossChainMessage> {
        let span = spans::decode_routed_message(chain_id, log.transaction_hash, log.log_index);
        async {
            let result = self.decode(log);
            if let Err(ref e) = result {
                spans::record_error(e);
            }
            result
        }
        .instrument(span)
        .await
    }
}

impl CrossChainMessage {
    /// Gateway message hash: keccak256 of the ABI-encoded message struct.
    pub fn message_hash(&self) -> Result<B256> {
        let encoded = match self.layout {
            EventLayout::Legacy => to_legacy(self)?.abi_encode(),
            EventLayout::FeeBearing => to_fee_bearing(self)?.abi_encode(),
            EventLayout::PayloadIndexedFee => to_payload_indexed(self)?.abi_encode(),
        };
        Ok(keccak256(encoded))
    }
}

/// Build the `receiveMessage` call delivering `message` with `attestation`.
///
/// # Errors
///
/// - [`RelayError::AttestationFailed`] if the attestation is not ready
/// - [`RelayError::InvalidMessage`] if the attestation belongs to another
///   transport or the message does not fit its layout
pub fn encode(
    message: &CrossChainMessage,
    attestation: &AttestationRecord,
    options: EncodeOptions,
) -> Result<DestinationCall> {
    if !attestation.is_ready() {
        return Err(RelayError::AttestationFailed {
            reason: format!(
                "{} attestation for {} is not ready",
                attestation.transport, attestation.source_tx_hash
            ),
        });
    }

    let transport: TransportKind = message.router_adaptor.parse()?;
    if transport != attestation.transport {
        return Err(RelayError::InvalidMessage {
            reason: format!(
                "message routed through {transport} but attestation is from {}",
                attestation.transport
            ),
        });
    }

    let verification_data = attestation.verification_data();
    let calldata = receive_message_calldata(message, verification_data, options)?;

    Ok(DestinationCall {
        chain_id: message.destination_chain_id,
        to: message.destination_gateway,
        calldata,
        gas_limit: None,
        gas_price: None,
    })
}

fn receive_message_calldata(
    message: &CrossChainMessage,
    verification_data: Bytes,
    options: EncodeOptions,
) -> Result<Bytes> {
    let calldata = match message.layout {
        EventLayout::Legacy => legacy::receiveMessageCall {
            message: to_legacy(message)?,
            verificationData: verification_data,
        }
        .abi_encode(),
        EventLayout::FeeBearing => fee_bearing::receiveMessageCall {
            message: to_fee_bearing(message)?,
            verificationData: verification_data,
            allowPartialExecution: options.allow_partial_execution,
        }
        .abi_encode(),
        EventLayout::PayloadIndexedFee => payload_indexed::receiveMessageCall {
            message: to_payload_indexed(message)?,
            verificationData: verification_data,
            allowPartialExecution: options.allow_partial_execution,
        }
        .abi_encode(),
    };
    Ok(calldata.into())
}

/// Decode `receiveMessage` calldata built for `layout`.
pub fn decode_receive_call(layout: EventLayout, calldata: &[u8]) -> Result<ReceiveMessageCall> {
    match layout {
        EventLayout::Legacy => {
            let call = legacy::receiveMessageCall::abi_decode(calldata).map_err(malformed)?;
            Ok(ReceiveMessageCall {
                message: from_legacy(call.message)?,
                verification_data: call.verificationData,
                allow_partial_execution: None,
            })
        }
        EventLayout::FeeBearing => {
            let call = fee_bearing::receiveMessageCall::abi_decode(calldata).map_err(malformed)?;
            Ok(ReceiveMessageCall {
                message: from_fee_bearing(call.message)?,
                verification_data: call.verificationData,
                allow_partial_execution: Some(call.allowPartialExecution),
            })
        }
        EventLayout::PayloadIndexedFee => {
            let call =
                payload_indexed::receiveMessageCall::abi_decode(calldata).map_err(malformed)?;
            Ok(ReceiveMessageCall {
                message: from_payload_indexed(call.message)?,
                verification_data: call.verificationData,
                allow_partial_execution: Some(call.allowPartialExecution),
            })
        }
    }
}

/// Log data a gateway would emit for `message`, selector included.
///
/// Used to replay messages through the relay and by the test fakes.
pub fn encode_routed_event(message: &CrossChainMessage) -> Result<LogData> {
    let hash = message.message_hash()?;
    let source_chain_id = U256::from(message.source_chain_id);
    let destination_chain_id = U256::from(message.destination_chain_id);

    let log = match message.layout {
        EventLayout::Legacy => {
            let m = to_legacy(message)?;
            legacy::CCMPMessageRouted {
                hash,
                sender: m.sender,
                sourceGateway: m.sourceGateway,
                sourceAdaptor: m.sourceAdaptor,
                sourceChainId: source_chain_id,
                destinationGateway: m.destinationGateway,
                destinationChainId: destination_chain_id,
                nonce: m.nonce,
                routerAdaptor: m.routerAdaptor,
                payload: m.payload,
            }
            .encode_log_data()
        }
        EventLayout::FeeBearing => {
            let m = to_fee_bearing(message)?;
            fee_bearing::CCMPMessageRouted {
                hash,
                sender: m.sender,
                sourceGateway: m.sourceGateway,
                sourceAdaptor: m.sourceAdaptor,
                sourceChainId: source_chain_id,
                destinationGateway: m.destinationGateway,
                destinationChainId: destination_chain_id,
                nonce: m.nonce,
                routerAdaptor: m.routerAdaptor,
                gasFeePaymentArgs: m.gasFeePaymentArgs,
                payload: m.payload,
            }
            .encode_log_data()
        }
        EventLayout::PayloadIndexedFee => {
            let m = to_payload_indexed(message)?;
            payload_indexed::CCMPMessageRouted {
                hash,
                sender: m.sender,
                sourceGateway: m.sourceGateway,
                sourceAdaptor: m.sourceAdaptor,
                sourceChainId: source_chain_id,
                destinationGateway: m.destinationGateway,
                destinationChainId: destination_chain_id,
                nonce: m.nonce,
                routerAdaptor: m.routerAdaptor,
                gasFeePaymentArgs: m.gasFeePaymentArgs,
                payload: m.payload,
            }
            .encode_log_data()
        }
    };
    Ok(log)
}

fn malformed(error: impl Display) -> RelayError {
    RelayError::decode(format!("malformed ABI: {error}"))
}

fn chain_id(value: U256, field: &str) -> Result<u64> {
    u64::try_from(value).map_err(|_| malformed(format!("{field} {value} does not fit in u64")))
}

fn layout_mismatch(message: &CrossChainMessage, what: &str) -> RelayError {
    RelayError::InvalidMessage {
        reason: format!("{what} cannot be encoded in the {:?} layout", message.layout),
    }
}

fn tagged_payload(message: &CrossChainMessage) -> Result<Vec<(u8, Bytes)>> {
    message
        .payload
        .iter()
        .map(|op| match op {
            PayloadOperation::Tagged {
                operation_type,
                data,
            } => Ok((u8::from(*operation_type), data.clone())),
            PayloadOperation::Call { .. } => Err(layout_mismatch(message, "plain call")),
        })
        .collect()
}

fn to_legacy(message: &CrossChainMessage) -> Result<legacy::CCMPMessage> {
    if message.gas_fee_payment_args.is_some() {
        return Err(layout_mismatch(message, "fee arguments"));
    }
    Ok(legacy::CCMPMessage {
        sender: message.sender,
        sourceGateway: message.source_gateway,
        sourceAdaptor: message.source_adaptor,
        sourceChainId: U256::from(message.source_chain_id),
        destinationGateway: message.destination_gateway,
        destinationChainId: U256::from(message.destination_chain_id),
        nonce: message.nonce,
        routerAdaptor: message.router_adaptor.clone(),
        payload: tagged_payload(message)?
            .into_iter()
            .map(|(operation, data)| legacy::CCMPMessagePayload { operation, data })
            .collect(),
    })
}

fn from_legacy(m: legacy::CCMPMessage) -> Result<CrossChainMessage> {
    Ok(CrossChainMessage {
        layout: EventLayout::Legacy,
        sender: m.sender,
        source_gateway: m.sourceGateway,
        source_adaptor: m.sourceAdaptor,
        source_chain_id: chain_id(m.sourceChainId, "sourceChainId")?,
        destination_gateway: m.destinationGateway,
        destination_chain_id: chain_id(m.destinationChainId, "destinationChainId")?,
        nonce: m.nonce,
        router_adaptor: m.routerAdaptor,
        gas_fee_payment_args: None,
        payload: m
            .payload
            .into_iter()
            .map(|p| PayloadOperation::Tagged {
                operation_type: OperationType::from(p.operation),
                data: p.data,
            })
            .collect(),
    })
}

fn to_fee_bearing(message: &CrossChainMessage) -> Result<fee_bearing::CCMPMessage> {
    let fee = match &message.gas_fee_payment_args {
        Some(fee) if fee.mode.is_none() && fee.fee_source_payload_index.is_none() => fee,
        _ => return Err(layout_mismatch(message, "fee arguments")),
    };
    let payload = message
        .payload
        .iter()
        .map(|op| match op {
            PayloadOperation::Call { to, calldata } => Ok(fee_bearing::CCMPMessagePayload {
                to: *to,
                _calldata: calldata.clone(),
            }),
            PayloadOperation::Tagged { .. } => Err(layout_mismatch(message, "tagged operation")),
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(fee_bearing::CCMPMessage {
        sender: message.sender,
        sourceGateway: message.source_gateway,
        sourceAdaptor: message.source_adaptor,
        sourceChainId: U256::from(message.source_chain_id),
        destinationGateway: message.destination_gateway,
        destinationChainId: U256::from(message.destination_chain_id),
        nonce: message.nonce,
        routerAdaptor: message.router_adaptor.clone(),
        gasFeePaymentArgs: fee_bearing::GasFeePaymentArgs {
            feeTokenAddress: fee.fee_token_address,
            feeAmount: fee.fee_amount,
            relayer: fee.relayer,
        },
        payload,
    })
}

fn from_fee_bearing(m: fee_bearing::CCMPMessage) -> Result<CrossChainMessage> {
    Ok(CrossChainMessage {
        layout: EventLayout::FeeBearing,
        sender: m.sender,
        source_gateway: m.sourceGateway,
        source_adaptor: m.sourceAdaptor,
        source_chain_id: chain_id(m.sourceChainId, "sourceChainId")?,
        destination_gateway: m.destinationGateway,
        destination_chain_id: chain_id(m.destinationChainId, "destinationChainId")?,
        nonce: m.nonce,
        router_adaptor: m.routerAdaptor,
        gas_fee_payment_args: Some(GasFeePaymentArgs {
            mode: None,
            fee_token_address: m.gasFeePaymentArgs.feeTokenAddress,
            fee_amount: m.gasFeePaymentArgs.feeAmount,
            fee_source_payload_index: None,
            relayer: m.gasFeePaymentArgs.relayer,
        }),
        payload: m
            .payload
            .into_iter()
            .map(|p| PayloadOperation::Call {
                to: p.to,
                calldata: p._calldata,
            })
            .collect(),
    })
}

fn to_payload_indexed(message: &CrossChainMessage) -> Result<payload_indexed::CCMPMessage> {
    let (mode, fee_source_payload_index, fee) = match &message.gas_fee_payment_args {
        Some(
            fee @ GasFeePaymentArgs {
                mode: Some(mode),
                fee_source_payload_index: Some(index),
                ..
            },
        ) => (*mode, *index, fee),
        _ => return Err(layout_mismatch(message, "fee arguments")),
    };

    Ok(payload_indexed::CCMPMessage {
        sender: message.sender,
        sourceGateway: message.source_gateway,
        sourceAdaptor: message.source_adaptor,
        sourceChainId: U256::from(message.source_chain_id),
        destinationGateway: message.destination_gateway,
        destinationChainId: U256::from(message.destination_chain_id),
        nonce: message.nonce,
        routerAdaptor: message.router_adaptor.clone(),
        gasFeePaymentArgs: payload_indexed::GasFeePaymentArgs {
            mode: u8::from(mode),
            feeTokenAddress: fee.fee_token_address,
            feeAmount: fee.fee_amount,
            feeSourcePayloadIndex: fee_source_payload_index,
            relayer: fee.relayer,
        },
        payload: tagged_payload(message)?
            .into_iter()
            .map(|(operation_type, data)| payload_indexed::CCMPMessagePayload {
                operationType: operation_type,
                data,
            })
            .collect(),
    })
}

fn from_payload_indexed(m: payload_indexed::CCMPMessage) -> Result<CrossChainMessage> {
    let fee = m.gasFeePaymentArgs;
    Ok(CrossChainMessage {
        layout: EventLayout::PayloadIndexedFee,
        sender: m.sender,
        source_gateway: m.sourceGateway,
        source_adaptor: m.sourceAdaptor,
        source_chain_id: chain_id(m.sourceChainId, "sourceChainId")?,
        destination_gateway: m.destinationGateway,
        destination_chain_id: chain_id(m.destinationChainId, "destinationChainId")?,
        nonce: m.nonce,
        router_adaptor: m.routerAdaptor,
        gas_fee_payment_args: Some(GasFeePaymentArgs {
            mode: Some(FeePaymentMode::from(fee.mode)),
            fee_token_address: fee.feeTokenAddress,
            fee_amount: fee.feeAmount,
            fee_source_payload_index: Some(fee.feeSourcePayloadIndex),
            relayer: fee.relayer,
        }),
        payload: m
            .payload
            .into_iter()
            .map(|p| PayloadOperation::Tagged {
                operation_type: OperationType::from(p.operationType),
                data: p.data,
            })
            .collect(),
    })
}
