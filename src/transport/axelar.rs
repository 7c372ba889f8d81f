//! Axelar attestation: the approved contract call's execute parameters.

use alloy_primitives::{TxHash, B256};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, Instrument};

use super::{poll_until_ready, AttestationFetcher, FetchContext, PollingConfig};
use crate::error::{RelayError, Result};
use crate::protocol::{AttestationProof, AttestationRecord, TransportKind};
use crate::spans;
use crate::traits::{AxelarGmpApi, Clock};

/// GMP call status as reported by Axelarscan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GmpStatus {
    #[serde(rename = "source_gateway_called", alias = "called")]
    SourceGatewayCalled,
    #[serde(rename = "source_gateway_confirmed", alias = "confirmed")]
    SourceGatewayConfirmed,
    #[serde(rename = "destination_gateway_approved", alias = "approved")]
    DestinationGatewayApproved,
    #[serde(rename = "destination_executing", alias = "executing")]
    DestinationExecuting,
    #[serde(rename = "destination_executed", alias = "executed")]
    DestinationExecuted,
    #[serde(rename = "express_executed")]
    ExpressExecuted,
    #[serde(rename = "destination_execute_error", alias = "error")]
    DestinationExecuteError,
    #[serde(rename = "insufficient_fee")]
    InsufficientFee,
    #[serde(rename = "error_fetching_status")]
    UnknownError,
    #[serde(rename = "cannot_fetch_status", other)]
    CannotFetchStatus,
}

impl GmpStatus {
    /// Whether the call has been approved on the destination gateway, so
    /// execute parameters exist.
    ///
    /// Axelar's own executor failing (`DestinationExecuteError`) or an
    /// unknown error still leaves the approval in place.
    pub fn is_approved(self) -> bool {
        matches!(
            self,
            Self::DestinationGatewayApproved
                | Self::DestinationExecuting
                | Self::DestinationExecuted
                | Self::ExpressExecuted
                | Self::DestinationExecuteError
                | Self::UnknownError
        )
    }
}

/// Status answer for one source transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GmpStatusResponse {
    pub status: GmpStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl GmpStatusResponse {
    pub fn new(status: GmpStatus) -> Self {
        Self {
            status,
            error: None,
        }
    }
}

/// Parameters of an approved Axelar contract call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecuteParams {
    pub command_id: B256,
    pub source_chain: String,
    pub source_address: String,
}

/// Polls the GMP API until the call is approved, then reads its execute
/// parameters.
pub struct AxelarFetcher<C: Clock> {
    api: Arc<dyn AxelarGmpApi>,
    clock: C,
    polling: PollingConfig,
}

#[bon::bon]
impl<C: Clock> AxelarFetcher<C> {
    #[builder]
    pub fn new(
        api: Arc<dyn AxelarGmpApi>,
        clock: C,
        #[builder(default = PollingConfig::axelar())] polling: PollingConfig,
    ) -> Self {
        Self {
            api,
            clock,
            polling,
        }
    }
}

async fn poll_gmp(api: &dyn AxelarGmpApi, tx_hash: TxHash) -> Result<Option<ExecuteParams>> {
    let response = api.query_transaction_status(tx_hash).await?;
    debug!(
        status = ?response.status,
        api_error = ?response.error,
        event = "axelar_gmp_status"
    );

    if response.status == GmpStatus::InsufficientFee {
        // Stays stuck until someone tops up the gas payment.
        return Err(RelayError::AttestationFailed {
            reason: "insufficient_fee".to_string(),
        });
    }
    if !response.status.is_approved() {
        return Ok(None);
    }

    api.query_execute_params(tx_hash).await.map(Some)
}

#[async_trait]
impl<C: Clock> AttestationFetcher for AxelarFetcher<C> {
    fn kind(&self) -> TransportKind {
        TransportKind::Axelar
    }

    async fn fetch_attestation(&self, ctx: &FetchContext<'_>) -> Result<AttestationRecord> {
        let span = spans::fetch_attestation(
            TransportKind::Axelar,
            ctx.source_tx_hash,
            ctx.message.source_chain_id,
            ctx.message.destination_chain_id,
            self.polling.poll_interval_secs,
        );

        async move {
            let api = self.api.as_ref();
            let tx_hash = ctx.source_tx_hash;
            let params = poll_until_ready(
                TransportKind::Axelar,
                &self.clock,
                self.polling,
                ctx,
                move || poll_gmp(api, tx_hash),
            )
            .await?;

            info!(
                command_id = %params.command_id,
                source_chain = %params.source_chain,
                event = "axelar_call_approved"
            );

            Ok(AttestationRecord::ready(
                TransportKind::Axelar,
                tx_hash,
                AttestationProof::ExecuteParams {
                    command_id: params.command_id,
                    source_chain: params.source_chain,
                    source_address: params.source_address,
                },
            ))
        }
        .instrument(span)
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cancel::{CancelToken, Deadline};
    use crate::protocol::EventLayout;
    use crate::testing::{receipt_with_logs, sample_message, FakeAxelarApi, FakeClock};
    use rstest::rstest;

    fn params() -> ExecuteParams {
        ExecuteParams {
            command_id: B256::repeat_byte(0xc0),
            source_chain: "Avalanche".to_string(),
            source_address: "0x0Cc730c0a69e464F6c50a536Edfee10B8E5c4495".to_string(),
        }
    }

    #[rstest]
    #[case("\"source_gateway_called\"", GmpStatus::SourceGatewayCalled, false)]
    #[case("\"approved\"", GmpStatus::DestinationGatewayApproved, true)]
    #[case("\"destination_executed\"", GmpStatus::DestinationExecuted, true)]
    #[case("\"destination_execute_error\"", GmpStatus::DestinationExecuteError, true)]
    #[case("\"error_fetching_status\"", GmpStatus::UnknownError, true)]
    #[case("\"insufficient_fee\"", GmpStatus::InsufficientFee, false)]
    #[case("\"something_new\"", GmpStatus::CannotFetchStatus, false)]
    fn test_status_parsing(#[case] json: &str, #[case] status: GmpStatus, #[case] approved: bool) {
        let parsed: GmpStatus = serde_json::from_str(json).unwrap();
        assert_eq!(parsed, status);
        assert_eq!(parsed.is_approved(), approved);
    }

    #[tokio::test]
    async fn test_waits_for_approval() {
        let api = FakeAxelarApi::new();
        let clock = FakeClock::new();
        let message = sample_message(EventLayout::FeeBearing, "axelar");
        let tx_hash = TxHash::repeat_byte(0xa7);
        let receipt = receipt_with_logs(tx_hash, 50, vec![]);

        api.add_status_sequence(
            tx_hash,
            vec![
                Ok(GmpStatusResponse::new(GmpStatus::SourceGatewayCalled)),
                Err(RelayError::TransientRpc("connection reset".to_string())),
                Ok(GmpStatusResponse::new(GmpStatus::SourceGatewayConfirmed)),
                Ok(GmpStatusResponse::new(GmpStatus::DestinationGatewayApproved)),
            ],
        );
        api.set_execute_params(tx_hash, params());

        let fetcher = AxelarFetcher::builder()
            .api(Arc::new(api.clone()))
            .clock(clock.clone())
            .build();
        let cancel = CancelToken::new();
        let ctx = FetchContext {
            message: &message,
            source_tx_hash: tx_hash,
            source_receipt: &receipt,
            deadline: Deadline::NEVER,
            cancel: &cancel,
        };
        let record = fetcher.fetch_attestation(&ctx).await.unwrap();

        assert!(record.is_ready());
        assert_eq!(
            record.proof,
            AttestationProof::ExecuteParams {
                command_id: params().command_id,
                source_chain: params().source_chain,
                source_address: params().source_address,
            }
        );
        assert_eq!(api.status_calls(tx_hash), 4);
        assert_eq!(clock.sleep_count(), 3);
    }

    #[tokio::test]
    async fn test_terminal_api_error_is_returned() {
        let api = FakeAxelarApi::new();
        let clock = FakeClock::new();
        let message = sample_message(EventLayout::FeeBearing, "axelar");
        let tx_hash = TxHash::repeat_byte(0xa8);
        let receipt = receipt_with_logs(tx_hash, 50, vec![]);
        api.add_status_sequence(
            tx_hash,
            vec![Err(RelayError::AttestationFailed {
                reason: "HTTP 400".to_string(),
            })],
        );

        let fetcher = AxelarFetcher::builder()
            .api(Arc::new(api))
            .clock(clock.clone())
            .build();
        let cancel = CancelToken::new();
        let ctx = FetchContext {
            message: &message,
            source_tx_hash: tx_hash,
            source_receipt: &receipt,
            deadline: Deadline::NEVER,
            cancel: &cancel,
        };

        assert!(matches!(
            fetcher.fetch_attestation(&ctx).await,
            Err(RelayError::AttestationFailed { .. })
        ));
        assert_eq!(clock.sleep_count(), 0);
    }

    #[tokio::test]
    async fn test_insufficient_fee_stops_polling() {
        let api = FakeAxelarApi::new();
        let clock = FakeClock::new();
        let message = sample_message(EventLayout::FeeBearing, "axelar");
        let tx_hash = TxHash::repeat_byte(0xa9);
        let receipt = receipt_with_logs(tx_hash, 50, vec![]);
        api.add_status_sequence(
            tx_hash,
            vec![
                Ok(GmpStatusResponse::new(GmpStatus::SourceGatewayConfirmed)),
                Ok(GmpStatusResponse::new(GmpStatus::InsufficientFee)),
            ],
        );

        let fetcher = AxelarFetcher::builder()
            .api(Arc::new(api.clone()))
            .clock(clock.clone())
            .build();
        let cancel = CancelToken::new();
        let ctx = FetchContext {
            message: &message,
            source_tx_hash: tx_hash,
            source_receipt: &receipt,
            deadline: Deadline::NEVER,
            cancel: &cancel,
        };

        assert!(matches!(
            fetcher.fetch_attestation(&ctx).await,
            Err(RelayError::AttestationFailed { reason }) if reason == "insufficient_fee"
        ));
        assert_eq!(api.status_calls(tx_hash), 2);
        assert_eq!(clock.sleep_count(), 1);
    }
}
