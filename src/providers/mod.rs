//! Production implementations of the traits in [`crate::traits`].
//!
//! These talk to real chain RPC endpoints, the Wormhole guardian REST API,
//! Axelarscan, Hyperlane mailboxes and the system clock. Tests use the fakes
//! in [`crate::testing`] instead.

mod alloy;
mod axelarscan;
mod guardian;
mod mailbox;
mod tokio_clock;

pub use self::alloy::AlloyChainClient;
pub use self::axelarscan::AxelarscanApi;
pub use self::guardian::GuardianRestApi;
pub use self::mailbox::MailboxDeliveryOracle;
pub use self::tokio_clock::TokioClock;
