//! CCMP gateway bindings
//!
//! The gateway's routed-message event and `receiveMessage` entry point changed
//! shape twice. Each generation gets its own module so the generated struct
//! names do not collide; [`crate::codec`] picks one by topic hash.

use alloy_primitives::hex;
use alloy_sol_types::{sol, SolInterface};

/// Gateways without relayer fees.
pub mod legacy {
    use super::sol;

    sol! {
        #[derive(Debug, PartialEq, Eq)]
        struct CCMPMessagePayload {
            uint8 operation;
            bytes data;
        }

        #[derive(Debug, PartialEq, Eq)]
        struct CCMPMessage {
            address sender;
            address sourceGateway;
            address sourceAdaptor;
            uint256 sourceChainId;
            address destinationGateway;
            uint256 destinationChainId;
            uint256 nonce;
            string routerAdaptor;
            CCMPMessagePayload[] payload;
        }

        #[derive(Debug, PartialEq, Eq)]
        event CCMPMessageRouted(
            bytes32 indexed hash,
            address indexed sender,
            address sourceGateway,
            address sourceAdaptor,
            uint256 sourceChainId,
            address destinationGateway,
            uint256 indexed destinationChainId,
            uint256 nonce,
            string routerAdaptor,
            CCMPMessagePayload[] payload
        );

        function receiveMessage(CCMPMessage message, bytes verificationData) external returns (bool);
    }
}

/// Gateways that charge a relayer fee, with plain `{to, _calldata}` payloads.
pub mod fee_bearing {
    use super::sol;

    sol! {
        #[derive(Debug, PartialEq, Eq)]
        struct CCMPMessagePayload {
            address to;
            bytes _calldata;
        }

        #[derive(Debug, PartialEq, Eq)]
        struct GasFeePaymentArgs {
            address feeTokenAddress;
            uint256 feeAmount;
            address relayer;
        }

        #[derive(Debug, PartialEq, Eq)]
        struct CCMPMessage {
            address sender;
            address sourceGateway;
            address sourceAdaptor;
            uint256 sourceChainId;
            address destinationGateway;
            uint256 destinationChainId;
            uint256 nonce;
            string routerAdaptor;
            GasFeePaymentArgs gasFeePaymentArgs;
            CCMPMessagePayload[] payload;
        }

        #[derive(Debug, PartialEq, Eq)]
        event CCMPMessageRouted(
            bytes32 indexed hash,
            address indexed sender,
            address sourceGateway,
            address sourceAdaptor,
            uint256 sourceChainId,
            address destinationGateway,
            uint256 indexed destinationChainId,
            uint256 nonce,
            string routerAdaptor,
            GasFeePaymentArgs gasFeePaymentArgs,
            CCMPMessagePayload[] payload
        );

        function receiveMessage(
            CCMPMessage message,
            bytes verificationData,
            bool allowPartialExecution
        ) external returns (bool);
    }
}

/// Executor-based gateways: tagged payloads and fee payment modes.
pub mod payload_indexed {
    use super::sol;

    sol! {
        #[derive(Debug, PartialEq, Eq)]
        struct CCMPMessagePayload {
            uint8 operationType;
            bytes data;
        }

        #[derive(Debug, PartialEq, Eq)]
        struct GasFeePaymentArgs {
            uint8 mode;
            address feeTokenAddress;
            uint256 feeAmount;
            uint256 feeSourcePayloadIndex;
            address relayer;
        }

        #[derive(Debug, PartialEq, Eq)]
        struct CCMPMessage {
            address sender;
            address sourceGateway;
            address sourceAdaptor;
            uint256 sourceChainId;
            address destinationGateway;
            uint256 destinationChainId;
            uint256 nonce;
            string routerAdaptor;
            GasFeePaymentArgs gasFeePaymentArgs;
            CCMPMessagePayload[] payload;
        }

        #[derive(Debug, PartialEq, Eq)]
        event CCMPMessageRouted(
            bytes32 indexed hash,
            address indexed sender,
            address sourceGateway,
            address sourceAdaptor,
            uint256 sourceChainId,
            address destinationGateway,
            uint256 indexed destinationChainId,
            uint256 nonce,
            string routerAdaptor,
            GasFeePaymentArgs gasFeePaymentArgs,
            CCMPMessagePayload[] payload
        );

        function receiveMessage(
            CCMPMessage message,
            bytes verificationData,
            bool allowPartialExecution
        ) external returns (bool);
    }
}

sol! {
    /// Custom errors raised by every gateway generation.
    #[derive(Debug, PartialEq, Eq)]
    interface GatewayErrors {
        error UnsupportedAdapter(string adaptorName);
        error UnsupportedDestinationChain(uint256 destinationChainId);
        error InvalidPayload(string reason);
        error InvalidSource(uint256 sourceChainId, address sourceGateway);
        error WrongDestination(uint256 destinationChainId, address destinationGateway);
        error AlreadyExecuted(uint256 nonce);
        error VerificationFailed(string reason);
    }
}

use GatewayErrors::GatewayErrorsErrors;

/// Turn revert data returned by a node into a readable reason.
///
/// Gateway custom errors map to their bare name (`"AlreadyExecuted"`), so
/// callers can match on it. `Error(string)` and `Panic(uint256)` use the
/// standard formatting; anything else is returned as hex.
pub fn decode_revert_reason(data: &[u8]) -> String {
    if let Ok(error) = GatewayErrorsErrors::abi_decode(data) {
        let name = match error {
            GatewayErrorsErrors::UnsupportedAdapter(_) => "UnsupportedAdapter",
            GatewayErrorsErrors::UnsupportedDestinationChain(_) => "UnsupportedDestinationChain",
            GatewayErrorsErrors::InvalidPayload(_) => "InvalidPayload",
            GatewayErrorsErrors::InvalidSource(_) => "InvalidSource",
            GatewayErrorsErrors::WrongDestination(_) => "WrongDestination",
            GatewayErrorsErrors::AlreadyExecuted(_) => "AlreadyExecuted",
            GatewayErrorsErrors::VerificationFailed(_) => "VerificationFailed",
        };
        return name.to_string();
    }

    alloy_sol_types::decode_revert_reason(data)
        .unwrap_or_else(|| format!("unknown revert 0x{}", hex::encode(data)))
}
