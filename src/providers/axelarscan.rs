//! Axelarscan GMP API client.

use alloy_primitives::{TxHash, B256};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, instrument, trace, Instrument};

use crate::error::{RelayError, Result};
use crate::spans;
use crate::traits::AxelarGmpApi;
use crate::transport::{
    ExecuteParams, GmpStatus, GmpStatusResponse, AXELARSCAN_MAINNET, AXELARSCAN_TESTNET,
};

const DEFAULT_RETRY_AFTER_SECS: u64 = 30;

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    data: Vec<GmpRecord>,
}

#[derive(Debug, Deserialize)]
struct GmpRecord {
    status: GmpStatus,
    #[serde(default)]
    approved: Option<ApprovedEvent>,
    #[serde(default)]
    error: Option<Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApprovedEvent {
    return_values: ApprovedValues,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApprovedValues {
    command_id: B256,
    source_chain: String,
    source_address: String,
}

/// Queries the `searchGMP` method of the Axelarscan API.
#[derive(Debug, Clone)]
pub struct AxelarscanApi {
    base_url: String,
    client: Client,
}

impl AxelarscanApi {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            client: Client::new(),
        }
    }

    pub fn testnet() -> Self {
        Self::new(AXELARSCAN_TESTNET)
    }

    pub fn mainnet() -> Self {
        Self::new(AXELARSCAN_MAINNET)
    }

    /// First GMP record for `tx_hash`, or `None` if Axelarscan has not
    /// indexed the call yet.
    async fn search(&self, tx_hash: TxHash) -> Result<Option<GmpRecord>> {
        let span = spans::http_request("POST", &self.base_url);

        async {
            let response = self
                .client
                .post(&self.base_url)
                .json(&json!({ "method": "searchGMP", "txHash": tx_hash }))
                .send()
                .await?;
            let status = response.status();
            trace!(status_code = %status, "Received response from Axelarscan");

            if status == StatusCode::TOO_MANY_REQUESTS {
                let retry_after = response
                    .headers()
                    .get("retry-after")
                    .and_then(|h| h.to_str().ok())
                    .and_then(|s| s.parse::<u64>().ok())
                    .unwrap_or(DEFAULT_RETRY_AFTER_SECS);
                return Err(RelayError::RateLimitExceeded {
                    retry_after_seconds: retry_after,
                });
            }

            if status.is_client_error() {
                return Err(RelayError::AttestationFailed {
                    reason: format!("Axelarscan returned {status}"),
                });
            }

            response.error_for_status_ref()?;
            let body: SearchResponse = serde_json::from_str(&response.text().await?)?;
            Ok(body.data.into_iter().next())
        }
        .instrument(span)
        .await
    }
}

fn error_message(error: &Value) -> String {
    error
        .get("message")
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| error.to_string())
}

#[async_trait]
impl AxelarGmpApi for AxelarscanApi {
    #[instrument(skip(self), fields(tx_hash = %tx_hash))]
    async fn query_transaction_status(&self, tx_hash: TxHash) -> Result<GmpStatusResponse> {
        let Some(record) = self.search(tx_hash).await? else {
            debug!(event = "axelar_call_not_indexed");
            return Ok(GmpStatusResponse::new(GmpStatus::CannotFetchStatus));
        };

        Ok(GmpStatusResponse {
            status: record.status,
            error: record.error.as_ref().map(error_message),
        })
    }

    #[instrument(skip(self), fields(tx_hash = %tx_hash))]
    async fn query_execute_params(&self, tx_hash: TxHash) -> Result<ExecuteParams> {
        let approved = self
            .search(tx_hash)
            .await?
            .and_then(|record| record.approved)
            .ok_or(RelayError::AttestationNotFound)?;
        let values = approved.return_values;

        Ok(ExecuteParams {
            command_id: values.command_id,
            source_chain: values.source_chain,
            source_address: values.source_address,
        })
    }
}
