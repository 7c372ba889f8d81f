//! # ccmp-relayer
//!
//! Off-chain relay core for CCMP, a cross-chain messaging protocol whose
//! gateways route messages over Axelar, Wormhole or Hyperlane (Abacus).
//!
//! The relay watches each configured gateway for `CCMPMessageRouted` events,
//! waits for the transport named by the message to attest it, and delivers
//! it by calling `receiveMessage` on the destination gateway, exactly once
//! per nonce.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use ccmp_relayer::providers::TokioClock;
//! use ccmp_relayer::relay::RelayOrchestrator;
//! use ccmp_relayer::{CancelToken, ChainRegistry, InMemoryNonceStore, RelayError, TransportRegistry};
//! use std::sync::Arc;
//!
//! # async fn example(
//! #     chains: ChainRegistry,
//! #     transports: TransportRegistry,
//! #     log: ccmp_relayer::RawLogEvent,
//! # ) -> Result<(), RelayError> {
//! let orchestrator = RelayOrchestrator::builder()
//!     .chains(Arc::new(chains))
//!     .transports(transports.cached())
//!     .store(Arc::new(InMemoryNonceStore::new()))
//!     .clock(TokioClock::new())
//!     .build();
//!
//! // Relay one routed-message log observed on Mumbai
//! let job = orchestrator.relay_log(80001, &log, &CancelToken::new()).await?;
//! println!("{} -> {}", job.message.nonce, job.state());
//! # Ok(())
//! # }
//! ```
//!
//! ## Public API
//!
//! - [`codec`]: routed-event decoding and `receiveMessage` encoding
//! - [`transport`]: attestation fetchers for Wormhole, Axelar and Hyperlane
//! - [`relay`]: the per-message state machine
//! - [`store`]: nonce deduplication
//! - [`service`]: log watchers feeding the orchestrator
//! - [`providers`]: production implementations of the [`traits`]
//! - [`testing`]: fakes of every external collaborator

pub mod cancel;
pub mod chain;
pub mod codec;
pub mod config;
mod contracts;
mod error;
mod protocol;
pub mod providers;
mod receipt_adapter;
pub mod relay;
pub mod service;
pub mod store;
pub mod testing;
pub mod traits;
pub mod transport;

pub use cancel::{CancelToken, Deadline};
pub use chain::{ChainHandle, ChainRegistry, DestinationCall, RawLogEvent, TxReceipt};
pub use codec::{EncodeOptions, MessageCodec, TopicRegistry};
pub use config::RelayerConfig;
pub use contracts::gateway::decode_revert_reason;
pub use contracts::hyperlane::MailboxContract;
pub use error::{RelayError, Result, ALREADY_EXECUTED};
pub use protocol::{
    AttestationProof, AttestationRecord, AttestationStatus, AxelarVerification,
    CrossChainMessage, EventLayout, FeePaymentMode, GasFeePaymentArgs, OperationType,
    PayloadOperation, TransportKind, NONCE_SEQUENCE_BITS,
};
pub use receipt_adapter::{ReceiptAdapter, UniversalReceiptAdapter};
pub use relay::{JobState, RelayJob, RelayOrchestrator, RetryPolicy};
pub use service::{RelayReport, RelayService};
pub use store::{ClaimOutcome, InMemoryNonceStore, JsonFileNonceStore, NonceStore};
pub use transport::{AttestationFetcher, TransportRegistry};

// Public module for advanced users who need custom instrumentation
pub mod spans;
