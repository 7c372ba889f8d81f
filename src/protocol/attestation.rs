use alloy_primitives::{Bytes, TxHash, B256};
use alloy_sol_types::{sol, SolValue};

use super::TransportKind;

sol! {
    /// Verification data handed to the Axelar adaptor on the destination chain.
    struct AxelarVerification {
        bytes32 commandId;
        string sourceChain;
        string sourceAddress;
    }
}

/// Lifecycle of an attestation while a job waits on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttestationStatus {
    Pending,
    Ready,
    Error,
}

/// Transport-specific proof that the source event happened and is final.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttestationProof {
    /// Not yet available
    None,
    /// Guardian-signed Wormhole VAA
    Vaa(Bytes),
    /// Parameters of the approved Axelar contract call
    ExecuteParams {
        command_id: B256,
        source_chain: String,
        source_address: String,
    },
    /// Hyperlane delivered the message to the destination mailbox. There is
    /// nothing to forward; inclusion on the destination is the proof.
    Delivered { message_id: B256 },
}

/// Attestation for one `(source tx, transport)` pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttestationRecord {
    pub transport: TransportKind,
    pub source_tx_hash: TxHash,
    pub proof: AttestationProof,
    pub status: AttestationStatus,
}

impl AttestationRecord {
    /// Placeholder record for a job that has started waiting.
    pub fn pending(transport: TransportKind, source_tx_hash: TxHash) -> Self {
        Self {
            transport,
            source_tx_hash,
            proof: AttestationProof::None,
            status: AttestationStatus::Pending,
        }
    }

    /// Record carrying a usable proof.
    pub fn ready(transport: TransportKind, source_tx_hash: TxHash, proof: AttestationProof) -> Self {
        Self {
            transport,
            source_tx_hash,
            proof,
            status: AttestationStatus::Ready,
        }
    }

    pub fn is_ready(&self) -> bool {
        self.status == AttestationStatus::Ready
    }

    /// Bytes passed as `verificationData` to the destination gateway.
    ///
    /// Wormhole forwards the VAA, Axelar the ABI-encoded execute parameters and
    /// Hyperlane nothing at all.
    pub fn verification_data(&self) -> Bytes {
        match &self.proof {
            AttestationProof::Vaa(vaa) => vaa.clone(),
            AttestationProof::ExecuteParams {
                command_id,
                source_chain,
                source_address,
            } => AxelarVerification {
                commandId: *command_id,
                sourceChain: source_chain.clone(),
                sourceAddress: source_address.clone(),
            }
            .abi_encode_params()
            .into(),
            AttestationProof::Delivered { .. } | AttestationProof::None => Bytes::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pending_record() {
        let record = AttestationRecord::pending(TransportKind::Axelar, TxHash::ZERO);
        assert!(!record.is_ready());
        assert_eq!(record.proof, AttestationProof::None);
        assert!(record.verification_data().is_empty());
    }

    #[test]
    fn test_vaa_verification_data_is_vaa() {
        let vaa = Bytes::from_static(&[1, 0, 0, 0, 3]);
        let record = AttestationRecord::ready(
            TransportKind::Wormhole,
            TxHash::ZERO,
            AttestationProof::Vaa(vaa.clone()),
        );
        assert!(record.is_ready());
        assert_eq!(record.verification_data(), vaa);
    }

    #[test]
    fn test_execute_params_are_abi_encoded() {
        let record = AttestationRecord::ready(
            TransportKind::Axelar,
            TxHash::ZERO,
            AttestationProof::ExecuteParams {
                command_id: B256::repeat_byte(0xaa),
                source_chain: "Polygon".to_string(),
                source_address: "0x0Cc730c0a69e464F6c50a536Edfee10B8E5c4495".to_string(),
            },
        );

        let data = record.verification_data();
        let decoded = AxelarVerification::abi_decode_params(&data).unwrap();
        assert_eq!(decoded.commandId, B256::repeat_byte(0xaa));
        assert_eq!(decoded.sourceChain, "Polygon");
    }

    #[test]
    fn test_delivered_has_no_verification_data() {
        let record = AttestationRecord::ready(
            TransportKind::Hyperlane,
            TxHash::ZERO,
            AttestationProof::Delivered {
                message_id: B256::repeat_byte(1),
            },
        );
        assert!(record.verification_data().is_empty());
    }
}
