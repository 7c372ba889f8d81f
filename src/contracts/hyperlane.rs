//! Hyperlane mailbox bindings and wrapper
//!
//! The source mailbox announces each dispatched message with `DispatchId`; the
//! destination mailbox answers `delivered(id)` once a Hyperlane relayer has
//! processed it.

use alloy_network::Ethereum;
use alloy_primitives::{Address, B256};
use alloy_provider::Provider;
use alloy_sol_types::sol;
use tracing::debug;

use Mailbox::MailboxInstance;

sol! {
    #[allow(missing_docs)]
    #[sol(rpc)]
    interface Mailbox {
        #[derive(Debug, PartialEq, Eq)]
        event DispatchId(bytes32 indexed messageId);

        function delivered(bytes32 messageId) external view returns (bool);
    }
}

/// Destination mailbox wrapper
pub struct MailboxContract<P: Provider<Ethereum>> {
    instance: MailboxInstance<P>,
}

impl<P: Provider<Ethereum>> MailboxContract<P> {
    pub fn new(address: Address, provider: P) -> Self {
        debug!(
            contract_address = %address,
            event = "mailbox_contract_initialized"
        );
        Self {
            instance: MailboxInstance::new(address, provider),
        }
    }

    /// Whether the mailbox has processed `message_id`.
    pub async fn is_delivered(&self, message_id: B256) -> Result<bool, alloy_contract::Error> {
        let delivered = self.instance.delivered(message_id).call().await?;

        debug!(
            message_id = %message_id,
            delivered = delivered,
            event = "mailbox_delivery_checked"
        );

        Ok(delivered)
    }

    pub fn address(&self) -> Address {
        *self.instance.address()
    }
}
