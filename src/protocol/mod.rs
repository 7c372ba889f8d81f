//! CCMP protocol types
//!
//! The message envelope routed between gateways, the transports it can travel
//! over and the attestations those transports produce.

mod attestation;
mod message;
mod transport;

pub use attestation::{AttestationProof, AttestationRecord, AttestationStatus, AxelarVerification};
pub use message::{
    CrossChainMessage, EventLayout, FeePaymentMode, GasFeePaymentArgs, OperationType,
    PayloadOperation, NONCE_SEQUENCE_BITS,
};
pub use transport::TransportKind;
