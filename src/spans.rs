//! OpenTelemetry span helpers for relay operations
//!
//! Static span names, structured attributes, and nothing else: the business
//! logic attaches these with [`tracing::Instrument`] so spawned job futures
//! stay `Send`.
//!
//! # Example
//!
//! ```rust,no_run
//! use ccmp_relayer::{spans, TransportKind};
//! use alloy_primitives::TxHash;
//! use tracing::Instrument;
//!
//! # async fn example() {
//! let span = spans::fetch_attestation(TransportKind::Wormhole, TxHash::ZERO, 80001, 43113, 2);
//! async {
//!     // custom attestation logic
//! }
//! .instrument(span)
//! .await;
//! # }
//! ```

use alloy_chains::Chain;
use alloy_primitives::{Address, TxHash, U256};
use tracing::Span;

use crate::protocol::TransportKind;

fn chain_name(chain_id: u64) -> String {
    Chain::from_id(chain_id).to_string()
}

/// Span covering one relay job from observation to a terminal state.
///
/// Parent: service task span
/// Children: every other relay span
#[inline]
pub fn relay_job(
    source_chain_id: u64,
    nonce: &U256,
    destination_chain_id: u64,
    transport: &str,
    source_tx_hash: TxHash,
) -> Span {
    tracing::info_span!(
        "ccmp_relayer.relay_job",
        source_chain = %chain_name(source_chain_id),
        destination_chain = %chain_name(destination_chain_id),
        nonce = %nonce,
        transport = transport,
        source_tx_hash = %source_tx_hash,
        state = tracing::field::Empty,
        error.type = tracing::field::Empty,
        error.message = tracing::field::Empty,
        error.source = tracing::field::Empty,
        error.context = tracing::field::Empty,
        otel.status_code = "OK",
    )
}

/// Span for decoding a routed-message log.
///
/// Parent: service task span
/// Children: None
#[inline]
pub fn decode_routed_message(chain_id: u64, tx_hash: Option<TxHash>, log_index: Option<u64>) -> Span {
    tracing::debug_span!(
        "ccmp_relayer.decode_routed_message",
        chain = %chain_name(chain_id),
        tx_hash = ?tx_hash,
        log_index = ?log_index,
    )
}

/// Span for waiting on a transport attestation.
///
/// Parent: ccmp_relayer.relay_job
/// Children: ccmp_relayer.poll_attestation (one per attempt)
#[inline]
pub fn fetch_attestation(
    transport: TransportKind,
    source_tx_hash: TxHash,
    source_chain_id: u64,
    destination_chain_id: u64,
    poll_interval_secs: u64,
) -> Span {
    tracing::info_span!(
        "ccmp_relayer.fetch_attestation",
        transport = %transport,
        source_tx_hash = %source_tx_hash,
        source_chain = %chain_name(source_chain_id),
        destination_chain = %chain_name(destination_chain_id),
        poll_interval_secs = poll_interval_secs,
        error.type = tracing::field::Empty,
        error.message = tracing::field::Empty,
        error.source = tracing::field::Empty,
        error.context = tracing::field::Empty,
        otel.status_code = "OK",
    )
}

/// Span for a single poll of an attestation source.
///
/// Parent: ccmp_relayer.fetch_attestation
/// Children: HTTP client or RPC spans
#[inline]
pub fn poll_attestation(transport: TransportKind, attempt: u32) -> Span {
    tracing::debug_span!(
        "ccmp_relayer.poll_attestation",
        transport = %transport,
        attempt = attempt,
    )
}

/// Span for submitting `receiveMessage` on the destination gateway.
///
/// Parent: ccmp_relayer.relay_job
/// Children: Provider RPC calls
#[inline]
pub fn submit_message(
    destination_chain_id: u64,
    gateway: &Address,
    nonce: &U256,
    verification_data_len: usize,
) -> Span {
    tracing::info_span!(
        "ccmp_relayer.submit_message",
        destination_chain = %chain_name(destination_chain_id),
        gateway = %gateway,
        nonce = %nonce,
        verification_data_length_bytes = verification_data_len,
        tx_hash = tracing::field::Empty,
        error.type = tracing::field::Empty,
        error.message = tracing::field::Empty,
        error.source = tracing::field::Empty,
        error.context = tracing::field::Empty,
        otel.status_code = "OK",
    )
}

/// Span for waiting on confirmation depth.
///
/// Parent: ccmp_relayer.relay_job
/// Children: Provider RPC calls (polling)
#[inline]
pub fn wait_for_confirmation(tx_hash: TxHash, chain_id: u64, required_confirmations: u64) -> Span {
    tracing::debug_span!(
        "ccmp_relayer.wait_for_confirmation",
        tx_hash = %tx_hash,
        chain = %chain_name(chain_id),
        required_confirmations = required_confirmations,
        error.type = tracing::field::Empty,
        error.message = tracing::field::Empty,
        error.context = tracing::field::Empty,
        otel.status_code = "OK",
    )
}

/// Span for following a gateway's logs on one chain.
///
/// Parent: None (long-lived service task)
/// Children: ccmp_relayer.relay_job
#[inline]
pub fn watch_gateway(chain_id: u64, gateway: &Address) -> Span {
    tracing::info_span!(
        "ccmp_relayer.watch_gateway",
        chain = %chain_name(chain_id),
        gateway = %gateway,
    )
}

/// Span for an HTTP request to an attestation API.
///
/// Parent: ccmp_relayer.poll_attestation
/// Children: None (HTTP client handles internal spans)
#[inline]
pub fn http_request(method: &str, url: &str) -> Span {
    tracing::trace_span!(
        "ccmp_relayer.http_request",
        http.method = method,
        http.url = url,
    )
}

/// Record error attributes on the current span.
///
/// Follows OpenTelemetry semantic conventions for error tracking:
/// - error.type: The error type/variant
/// - error.message: Human-readable error message
/// - error.source: The underlying cause, if any
///
/// # Example
///
/// ```rust,no_run
/// use ccmp_relayer::{spans, RelayError};
///
/// # fn example() -> Result<(), RelayError> {
/// let span = tracing::info_span!("ccmp_relayer.operation");
/// let _guard = span.enter();
///
/// let result = some_operation();
/// if let Err(ref e) = result {
///     spans::record_error(e);
/// }
/// result
/// # }
/// # fn some_operation() -> Result<(), RelayError> { Ok(()) }
/// ```
pub fn record_error(error: &crate::RelayError) {
    let current_span = tracing::Span::current();
    current_span.record("error.type", error.kind());
    current_span.record("error.message", error.to_string());
    current_span.record("otel.status_code", "ERROR");

    if let Some(source) = std::error::Error::source(error) {
        current_span.record("error.source", source.to_string());
    }
}

/// Record error attributes with custom context on the current span.
///
/// # Example
///
/// ```rust,no_run
/// use ccmp_relayer::spans;
///
/// # fn example() {
/// let span = tracing::info_span!("ccmp_relayer.operation");
/// let _guard = span.enter();
///
/// spans::record_error_with_context(
///     "ContractRevert",
///     "Destination gateway reverted with WrongDestination",
///     Some("nonce 0x13881"),
/// );
/// # }
/// ```
pub fn record_error_with_context(
    error_type: &str,
    error_message: &str,
    additional_context: Option<&str>,
) {
    let current_span = tracing::Span::current();
    current_span.record("error.type", error_type);
    current_span.record("error.message", error_message);
    current_span.record("otel.status_code", "ERROR");

    if let Some(context) = additional_context {
        current_span.record("error.context", context);
    }
}
