//! Hyperlane delivery oracle backed by the destination mailbox contract.

use alloy_network::Ethereum;
use alloy_primitives::{Address, B256};
use alloy_provider::Provider;
use async_trait::async_trait;

use crate::contracts::hyperlane::MailboxContract;
use crate::error::Result;
use crate::traits::DeliveryOracle;

/// Answers [`DeliveryOracle::is_delivered`] with a `delivered(id)` view call.
///
/// ```rust,no_run
/// use ccmp_relayer::providers::MailboxDeliveryOracle;
/// use alloy_primitives::address;
/// use alloy_provider::ProviderBuilder;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let provider = ProviderBuilder::new().connect("http://localhost:8545").await?;
/// let oracle = MailboxDeliveryOracle::new(
///     address!("cc737a94fecaec165abcf12ded095bb13f037685"),
///     provider,
/// );
/// # Ok(())
/// # }
/// ```
pub struct MailboxDeliveryOracle<P: Provider<Ethereum>> {
    mailbox: MailboxContract<P>,
}

impl<P: Provider<Ethereum>> MailboxDeliveryOracle<P> {
    pub fn new(mailbox: Address, provider: P) -> Self {
        Self {
            mailbox: MailboxContract::new(mailbox, provider),
        }
    }

    pub fn mailbox(&self) -> Address {
        self.mailbox.address()
    }
}

#[async_trait]
impl<P: Provider<Ethereum>> DeliveryOracle for MailboxDeliveryOracle<P> {
    async fn is_delivered(&self, message_id: B256) -> Result<bool> {
        Ok(self.mailbox.is_delivered(message_id).await?)
    }
}
