//! Wormhole core bridge bindings
//!
//! Only the event the relay reads is bound: the source adaptor publishes one
//! `LogMessagePublished` per routed message, and its `sequence` keys the VAA.

use alloy_sol_types::sol;

sol! {
    #[derive(Debug, PartialEq, Eq)]
    event LogMessagePublished(
        address indexed sender,
        uint64 sequence,
        uint32 nonce,
        bytes payload,
        uint8 consistencyLevel
    );
}
