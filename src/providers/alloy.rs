//! Alloy-based [`ChainClient`] implementation.

use alloy_json_rpc::RpcError;
use alloy_network::{Network, TransactionBuilder};
use alloy_primitives::{Address, TxHash, B256};
use alloy_provider::Provider;
use alloy_rpc_types::{Filter, TransactionReceipt};
use alloy_transport::TransportErrorKind;
use async_trait::async_trait;
use std::marker::PhantomData;
use tracing::{debug, info, instrument, trace, warn};

use crate::chain::{DestinationCall, RawLogEvent, TxReceipt};
use crate::contracts::gateway::decode_revert_reason;
use crate::error::{RelayError, Result};
use crate::receipt_adapter::{ReceiptAdapter, UniversalReceiptAdapter};
use crate::traits::ChainClient;

/// Chain client wrapping an Alloy [`Provider`].
///
/// The provider must carry a wallet filler for [`ChainClient::submit`] to
/// sign with the relayer key; read-only providers work for source chains.
///
/// # Examples
///
/// ```rust,no_run
/// use ccmp_relayer::providers::AlloyChainClient;
/// use alloy_provider::ProviderBuilder;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let provider = ProviderBuilder::new()
///     .connect("https://api.avax-test.network/ext/bc/C/rpc")
///     .await?;
///
/// let client = AlloyChainClient::connect(provider).await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct AlloyChainClient<N, P>
where
    N: Network,
    P: Provider<N> + Clone,
{
    chain_id: u64,
    provider: P,
    _network: PhantomData<N>,
}

impl<N, P> AlloyChainClient<N, P>
where
    N: Network,
    P: Provider<N> + Clone,
{
    /// Wrap a provider for a chain whose id is already known.
    pub fn new(chain_id: u64, provider: P) -> Self {
        Self {
            chain_id,
            provider,
            _network: PhantomData,
        }
    }

    /// Wrap a provider, asking the node for its chain id.
    pub async fn connect(provider: P) -> Result<Self> {
        let chain_id = provider.get_chain_id().await.map_err(rpc_error)?;
        debug!(chain_id = chain_id, event = "chain_client_connected");
        Ok(Self::new(chain_id, provider))
    }

    pub fn inner(&self) -> &P {
        &self.provider
    }
}

/// Transport failures are retryable; node error responses carrying revert
/// data become [`RelayError::ContractRevert`].
fn rpc_error(error: RpcError<TransportErrorKind>) -> RelayError {
    if error.is_transport_error() {
        return RelayError::TransientRpc(error.to_string());
    }

    if let Some(payload) = error.as_error_resp() {
        if let Some(data) = payload.as_revert_data() {
            return RelayError::ContractRevert {
                reason: decode_revert_reason(&data),
                data: Some(data),
            };
        }
        if payload.message.contains("execution reverted") {
            return RelayError::ContractRevert {
                reason: payload.message.to_string(),
                data: None,
            };
        }
    }

    RelayError::Rpc(error)
}

#[async_trait]
impl<N, P> ChainClient for AlloyChainClient<N, P>
where
    N: Network<ReceiptResponse = TransactionReceipt>,
    P: Provider<N> + Clone + Send + Sync,
{
    fn chain_id(&self) -> u64 {
        self.chain_id
    }

    #[instrument(skip(self), fields(chain_id = self.chain_id))]
    async fn block_number(&self) -> Result<u64> {
        let block_number = self.provider.get_block_number().await.map_err(rpc_error)?;
        trace!(block_number = block_number, "Current block number retrieved");
        Ok(block_number)
    }

    #[instrument(skip(self, topics), fields(chain_id = self.chain_id, address = %address))]
    async fn get_logs(
        &self,
        address: Address,
        topics: &[B256],
        from_block: u64,
        to_block: u64,
    ) -> Result<Vec<RawLogEvent>> {
        let filter = Filter::new()
            .address(address)
            .event_signature(topics.to_vec())
            .from_block(from_block)
            .to_block(to_block);

        let logs = self.provider.get_logs(&filter).await.map_err(rpc_error)?;
        debug!(
            from_block = from_block,
            to_block = to_block,
            log_count = logs.len(),
            event = "logs_fetched"
        );
        Ok(logs.iter().map(RawLogEvent::from).collect())
    }

    #[instrument(skip(self), fields(chain_id = self.chain_id, tx_hash = %tx_hash))]
    async fn get_receipt(&self, tx_hash: TxHash) -> Result<TxReceipt> {
        let receipt = self
            .provider
            .get_transaction_receipt(tx_hash)
            .await
            .map_err(rpc_error)?
            .ok_or(RelayError::NotFound { tx_hash })?;

        Ok(ReceiptAdapter::<N>::to_tx_receipt(
            &UniversalReceiptAdapter,
            &receipt,
        ))
    }

    #[instrument(skip(self, call), fields(chain_id = self.chain_id, to = %call.to))]
    async fn submit(&self, call: &DestinationCall) -> Result<TxHash> {
        let mut request = N::TransactionRequest::default()
            .with_to(call.to)
            .with_input(call.calldata.clone())
            .with_chain_id(self.chain_id);
        if let Some(gas_limit) = call.gas_limit {
            request.set_gas_limit(gas_limit);
        }
        if let Some(gas_price) = call.gas_price {
            request.set_gas_price(gas_price);
        }

        let pending = self
            .provider
            .send_transaction(request)
            .await
            .map_err(rpc_error)
            .inspect_err(|e| warn!(error = %e, event = "destination_submit_rejected"))?;
        let tx_hash = *pending.tx_hash();

        info!(tx_hash = %tx_hash, event = "destination_tx_broadcast");
        Ok(tx_hash)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_json_rpc::ErrorPayload;
    use alloy_primitives::Bytes;
    use alloy_sol_types::SolError;

    use crate::contracts::gateway::GatewayErrors;

    fn error_response(message: &str, data: Option<&str>) -> RpcError<TransportErrorKind> {
        let payload: ErrorPayload = serde_json::from_value(serde_json::json!({
            "code": 3,
            "message": message,
            "data": data,
        }))
        .unwrap();
        RpcError::ErrorResp(payload)
    }

    #[test]
    fn test_custom_error_revert() {
        let data = Bytes::from(
            GatewayErrors::AlreadyExecuted {
                nonce: alloy_primitives::U256::from(7),
            }
            .abi_encode(),
        );
        let error = rpc_error(error_response(
            "execution reverted",
            Some(&data.to_string()),
        ));

        assert!(error.is_duplicate(), "{error}");
    }

    #[test]
    fn test_revert_without_data() {
        let error = rpc_error(error_response("execution reverted", None));
        assert!(matches!(error, RelayError::ContractRevert { data: None, .. }));
    }

    #[test]
    fn test_transport_error_is_transient() {
        let error = rpc_error(TransportErrorKind::backend_gone());
        assert!(matches!(error, RelayError::TransientRpc(_)));
        assert!(error.is_retryable());
    }

    #[test]
    fn test_other_node_error_is_kept() {
        let error = rpc_error(error_response("insufficient funds for gas", None));
        assert!(matches!(error, RelayError::Rpc(_)));
    }
}
