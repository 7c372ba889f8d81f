//! Conversion of Alloy receipts into the relay's [`TxReceipt`].
//!
//! Every network whose `ReceiptResponse` is the standard
//! [`TransactionReceipt`] (Ethereum, OP Stack chains, Arbitrum, ...) is
//! handled by [`UniversalReceiptAdapter`].

use alloy_network::Network;
use alloy_rpc_types::{Log, TransactionReceipt};

use crate::chain::{RawLogEvent, TxReceipt};

/// Network-specific access to receipt contents.
pub trait ReceiptAdapter<N: Network> {
    fn logs<'a>(&self, receipt: &'a N::ReceiptResponse) -> &'a [Log];

    /// Reduce a receipt to what the relay reads: hash, block, status, logs.
    fn to_tx_receipt(&self, receipt: &N::ReceiptResponse) -> TxReceipt;
}

/// Adapter for every network using Alloy's [`TransactionReceipt`].
///
/// ```rust
/// use ccmp_relayer::UniversalReceiptAdapter;
///
/// let adapter = UniversalReceiptAdapter;
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct UniversalReceiptAdapter;

impl<N> ReceiptAdapter<N> for UniversalReceiptAdapter
where
    N: Network<ReceiptResponse = TransactionReceipt>,
{
    fn logs<'a>(&self, receipt: &'a TransactionReceipt) -> &'a [Log] {
        receipt.inner.logs()
    }

    fn to_tx_receipt(&self, receipt: &TransactionReceipt) -> TxReceipt {
        let logs = <Self as ReceiptAdapter<N>>::logs(self, receipt);
        TxReceipt {
            transaction_hash: receipt.transaction_hash,
            block_number: receipt.block_number.unwrap_or_default(),
            success: receipt.status(),
            logs: logs.iter().map(RawLogEvent::from).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_network::Ethereum;
    use alloy_primitives::{Address, B256};

    fn receipt_json(status: &str) -> serde_json::Value {
        serde_json::json!({
            "type": "0x2",
            "status": status,
            "cumulativeGasUsed": "0x5208",
            "logs": [{
                "address": "0x5300000000000000000000000000000000000053",
                "topics": ["0x1111111111111111111111111111111111111111111111111111111111111111"],
                "data": "0x",
                "blockHash": "0x2222222222222222222222222222222222222222222222222222222222222222",
                "blockNumber": "0x10",
                "transactionHash": "0x3333333333333333333333333333333333333333333333333333333333333333",
                "transactionIndex": "0x0",
                "logIndex": "0x4",
                "removed": false
            }],
            "logsBloom": format!("0x{}", "00".repeat(256)),
            "transactionHash": "0x3333333333333333333333333333333333333333333333333333333333333333",
            "transactionIndex": "0x0",
            "blockHash": "0x2222222222222222222222222222222222222222222222222222222222222222",
            "blockNumber": "0x10",
            "gasUsed": "0x5208",
            "effectiveGasPrice": "0x3b9aca00",
            "from": "0x0000000000000000000000000000000000000001",
            "to": "0x5300000000000000000000000000000000000053",
            "contractAddress": null
        })
    }

    #[test]
    fn test_to_tx_receipt() {
        let receipt: TransactionReceipt = serde_json::from_value(receipt_json("0x1")).unwrap();
        let converted = ReceiptAdapter::<Ethereum>::to_tx_receipt(&UniversalReceiptAdapter, &receipt);

        assert_eq!(converted.transaction_hash, B256::repeat_byte(0x33));
        assert_eq!(converted.block_number, 16);
        assert!(converted.success);
        assert_eq!(converted.logs.len(), 1);
        assert_eq!(
            converted.logs[0].address,
            "0x5300000000000000000000000000000000000053".parse::<Address>().unwrap()
        );
        assert_eq!(converted.logs[0].log_index, Some(4));
    }

    #[test]
    fn test_reverted_status() {
        let receipt: TransactionReceipt = serde_json::from_value(receipt_json("0x0")).unwrap();
        let converted = ReceiptAdapter::<Ethereum>::to_tx_receipt(&UniversalReceiptAdapter, &receipt);
        assert!(!converted.success);
    }
}
