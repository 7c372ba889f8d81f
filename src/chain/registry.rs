use alloy_chains::Chain;
use alloy_primitives::{Address, TxHash};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tokio::sync::{Mutex, Semaphore};
use tracing::debug;

use super::DestinationCall;
use crate::error::{RelayError, Result};
use crate::traits::ChainClient;

/// Everything the relay knows about one configured chain.
///
/// The handle owns the two per-chain shared resources: the lock serializing
/// submissions from the relayer account, and the worker pool bounding how
/// many jobs target this chain at once.
pub struct ChainHandle {
    pub chain_id: u64,
    pub gateway: Address,
    pub confirmations: u64,
    pub gas_limit: Option<u64>,
    pub gas_price: Option<u128>,
    client: Arc<dyn ChainClient>,
    submit_lock: Mutex<()>,
    workers: Arc<Semaphore>,
}

impl fmt::Debug for ChainHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChainHandle")
            .field("chain_id", &self.chain_id)
            .field("gateway", &self.gateway)
            .field("confirmations", &self.confirmations)
            .field("available_workers", &self.workers.available_permits())
            .finish_non_exhaustive()
    }
}

#[bon::bon]
impl ChainHandle {
    #[builder]
    pub fn new(
        client: Arc<dyn ChainClient>,
        gateway: Address,
        #[builder(default = 1)] confirmations: u64,
        gas_limit: Option<u64>,
        gas_price: Option<u128>,
        #[builder(default = 4)] workers: usize,
    ) -> Self {
        Self {
            chain_id: client.chain_id(),
            gateway,
            confirmations,
            gas_limit,
            gas_price,
            client,
            submit_lock: Mutex::new(()),
            workers: Arc::new(Semaphore::new(workers.max(1))),
        }
    }

    pub fn client(&self) -> &dyn ChainClient {
        self.client.as_ref()
    }

    pub fn shared_client(&self) -> Arc<dyn ChainClient> {
        Arc::clone(&self.client)
    }

    /// Worker pool for jobs whose destination is this chain.
    pub fn workers(&self) -> Arc<Semaphore> {
        Arc::clone(&self.workers)
    }

    /// Human readable chain name for logs.
    pub fn name(&self) -> String {
        Chain::from_id(self.chain_id).to_string()
    }

    /// Submit a call signed by the relayer account.
    ///
    /// Submissions to the same chain never overlap, so the account nonce the
    /// provider assigns cannot collide between jobs.
    pub async fn submit(&self, call: &DestinationCall) -> Result<TxHash> {
        let _guard = self.submit_lock.lock().await;
        debug!(
            chain_id = self.chain_id,
            to = %call.to,
            calldata_len = call.calldata.len(),
            event = "submission_lock_acquired"
        );
        self.client.submit(call).await
    }
}

/// Immutable table of configured chains, keyed by chain id.
#[derive(Debug, Default)]
pub struct ChainRegistry {
    chains: HashMap<u64, Arc<ChainHandle>>,
}

impl ChainRegistry {
    pub fn new(handles: impl IntoIterator<Item = ChainHandle>) -> Self {
        Self {
            chains: handles
                .into_iter()
                .map(|handle| (handle.chain_id, Arc::new(handle)))
                .collect(),
        }
    }

    /// # Errors
    ///
    /// [`RelayError::ChainNotConfigured`] for unknown chain ids.
    pub fn get(&self, chain_id: u64) -> Result<&Arc<ChainHandle>> {
        self.chains
            .get(&chain_id)
            .ok_or(RelayError::ChainNotConfigured { chain_id })
    }

    /// Fails unless `gateway` is the registered gateway of `chain_id`.
    pub fn ensure_gateway(&self, chain_id: u64, gateway: Address) -> Result<()> {
        match self.chains.get(&chain_id) {
            Some(handle) if handle.gateway == gateway => Ok(()),
            _ => Err(RelayError::UnregisteredGateway {
                chain_id,
                gateway: gateway.to_string(),
            }),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<ChainHandle>> {
        self.chains.values()
    }

    pub fn len(&self) -> usize {
        self.chains.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chains.is_empty()
    }
}
