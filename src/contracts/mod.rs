//! Contract bindings
//!
//! Alloy-generated bindings for the contracts the relay reads from or calls:
//!
//! - [`gateway`]: CCMP gateway events, `receiveMessage` and custom errors
//! - [`wormhole`]: the core bridge event carrying the VAA sequence
//! - [`hyperlane`]: mailbox dispatch event and delivery check

pub mod gateway;
pub mod hyperlane;
pub mod wormhole;
