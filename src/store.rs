//! Dedup/nonce store: which `(source_chain_id, nonce)` pairs have been
//! executed on their destination, and which are being submitted right now.
//!
//! The destination gateway rejects replayed nonces on its own, so the store is
//! there to save gas and keep logs clean rather than for safety. Every
//! operation is atomic per key; [`NonceStore::try_claim`] hands a nonce to
//! exactly one worker until that worker confirms or releases it.

use alloy_primitives::{TxHash, U256};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, info};

use crate::error::Result;

/// Answer to [`NonceStore::try_claim`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClaimOutcome {
    /// The caller now owns the nonce and must confirm or release it.
    Claimed,
    /// Another worker owns it.
    InFlight,
    /// Already executed by the given destination transaction.
    Confirmed(TxHash),
}

#[async_trait]
pub trait NonceStore: Send + Sync {
    /// Destination transaction that executed the nonce, if any.
    async fn confirmation(&self, source_chain_id: u64, nonce: U256) -> Result<Option<TxHash>>;

    async fn is_confirmed(&self, source_chain_id: u64, nonce: U256) -> Result<bool> {
        Ok(self.confirmation(source_chain_id, nonce).await?.is_some())
    }

    /// Take in-flight ownership of a nonce that is neither confirmed nor
    /// owned by someone else.
    async fn try_claim(&self, source_chain_id: u64, nonce: U256) -> Result<ClaimOutcome>;

    /// Give up ownership without confirming, so a later job may retry.
    async fn release(&self, source_chain_id: u64, nonce: U256) -> Result<()>;

    /// Record the nonce as executed. Clears any in-flight claim.
    async fn mark_confirmed(
        &self,
        source_chain_id: u64,
        nonce: U256,
        destination_tx_hash: TxHash,
    ) -> Result<()>;
}

type NonceKey = (u64, U256);

#[derive(Debug, Default)]
struct NonceTable {
    confirmed: HashMap<NonceKey, TxHash>,
    in_flight: HashSet<NonceKey>,
}

impl NonceTable {
    fn claim(&mut self, key: NonceKey) -> ClaimOutcome {
        if let Some(tx_hash) = self.confirmed.get(&key) {
            return ClaimOutcome::Confirmed(*tx_hash);
        }
        if self.in_flight.insert(key) {
            ClaimOutcome::Claimed
        } else {
            ClaimOutcome::InFlight
        }
    }

    fn confirm(&mut self, key: NonceKey, tx_hash: TxHash) {
        self.in_flight.remove(&key);
        self.confirmed.insert(key, tx_hash);
    }
}

/// Process-lifetime store.
#[derive(Debug, Default)]
pub struct InMemoryNonceStore {
    table: Mutex<NonceTable>,
}

impl InMemoryNonceStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn table(&self) -> MutexGuard<'_, NonceTable> {
        // The table stays consistent even if a holder panicked mid-update.
        self.table.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn confirmed_count(&self) -> usize {
        self.table().confirmed.len()
    }
}

#[async_trait]
impl NonceStore for InMemoryNonceStore {
    async fn confirmation(&self, source_chain_id: u64, nonce: U256) -> Result<Option<TxHash>> {
        Ok(self.table().confirmed.get(&(source_chain_id, nonce)).copied())
    }

    async fn try_claim(&self, source_chain_id: u64, nonce: U256) -> Result<ClaimOutcome> {
        let outcome = self.table().claim((source_chain_id, nonce));
        debug!(
            source_chain_id = source_chain_id,
            nonce = %nonce,
            outcome = ?outcome,
            event = "nonce_claim_attempted"
        );
        Ok(outcome)
    }

    async fn release(&self, source_chain_id: u64, nonce: U256) -> Result<()> {
        self.table().in_flight.remove(&(source_chain_id, nonce));
        Ok(())
    }

    async fn mark_confirmed(
        &self,
        source_chain_id: u64,
        nonce: U256,
        destination_tx_hash: TxHash,
    ) -> Result<()> {
        self.table()
            .confirm((source_chain_id, nonce), destination_tx_hash);
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ConfirmedEntry {
    source_chain_id: u64,
    nonce: U256,
    destination_tx_hash: TxHash,
}

/// Store whose confirmed set survives restarts.
///
/// Confirmed entries are kept in a JSON file that is rewritten in full on
/// every confirmation, through a temporary file and a rename so a crash never
/// leaves a truncated file behind. In-flight claims live in memory only.
#[derive(Debug)]
pub struct JsonFileNonceStore {
    path: PathBuf,
    memory: InMemoryNonceStore,
    write_lock: tokio::sync::Mutex<()>,
}

impl JsonFileNonceStore {
    /// Open the store at `path`, loading previous confirmations if the file
    /// exists.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let memory = InMemoryNonceStore::new();

        match tokio::fs::read(&path).await {
            Ok(contents) => {
                let entries: Vec<ConfirmedEntry> = serde_json::from_slice(&contents)?;
                let mut table = memory.table();
                for entry in &entries {
                    table
                        .confirmed
                        .insert((entry.source_chain_id, entry.nonce), entry.destination_tx_hash);
                }
                info!(
                    path = %path.display(),
                    confirmed = entries.len(),
                    event = "nonce_store_loaded"
                );
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), event = "nonce_store_created");
            }
            Err(e) => return Err(e.into()),
        }

        Ok(Self {
            path,
            memory,
            write_lock: tokio::sync::Mutex::new(()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn persist(&self) -> Result<()> {
        let _guard = self.write_lock.lock().await;

        let mut entries: Vec<ConfirmedEntry> = self
            .memory
            .table()
            .confirmed
            .iter()
            .map(|(&(source_chain_id, nonce), &destination_tx_hash)| ConfirmedEntry {
                source_chain_id,
                nonce,
                destination_tx_hash,
            })
            .collect();
        entries.sort_by_key(|entry| (entry.source_chain_id, entry.nonce));

        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, serde_json::to_vec_pretty(&entries)?).await?;
        tokio::fs::rename(&tmp, &self.path).await?;

        debug!(
            path = %self.path.display(),
            confirmed = entries.len(),
            event = "nonce_store_persisted"
        );
        Ok(())
    }
}

#[async_trait]
impl NonceStore for JsonFileNonceStore {
    async fn confirmation(&self, source_chain_id: u64, nonce: U256) -> Result<Option<TxHash>> {
        self.memory.confirmation(source_chain_id, nonce).await
    }

    async fn try_claim(&self, source_chain_id: u64, nonce: U256) -> Result<ClaimOutcome> {
        self.memory.try_claim(source_chain_id, nonce).await
    }

    async fn release(&self, source_chain_id: u64, nonce: U256) -> Result<()> {
        self.memory.release(source_chain_id, nonce).await
    }

    async fn mark_confirmed(
        &self,
        source_chain_id: u64,
        nonce: U256,
        destination_tx_hash: TxHash,
    ) -> Result<()> {
        self.memory
            .mark_confirmed(source_chain_id, nonce, destination_tx_hash)
            .await?;
        self.persist().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!(
            "ccmp-relayer-{}-{name}.json",
            std::process::id()
        ))
    }

    #[tokio::test]
    async fn test_claim_lifecycle() {
        let store = InMemoryNonceStore::new();
        let nonce = U256::from(7);

        assert_eq!(store.try_claim(80001, nonce).await.unwrap(), ClaimOutcome::Claimed);
        assert_eq!(store.try_claim(80001, nonce).await.unwrap(), ClaimOutcome::InFlight);
        // same nonce on another source chain is a different key
        assert_eq!(store.try_claim(97, nonce).await.unwrap(), ClaimOutcome::Claimed);

        store.release(80001, nonce).await.unwrap();
        assert_eq!(store.try_claim(80001, nonce).await.unwrap(), ClaimOutcome::Claimed);

        let tx = TxHash::repeat_byte(0xd0);
        store.mark_confirmed(80001, nonce, tx).await.unwrap();
        assert!(store.is_confirmed(80001, nonce).await.unwrap());
        assert_eq!(
            store.try_claim(80001, nonce).await.unwrap(),
            ClaimOutcome::Confirmed(tx)
        );
        assert!(!store.is_confirmed(97, nonce).await.unwrap());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_claims_have_one_winner() {
        let store = Arc::new(InMemoryNonceStore::new());
        let nonce = U256::from(42);

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let store = Arc::clone(&store);
                tokio::spawn(async move { store.try_claim(43113, nonce).await.unwrap() })
            })
            .collect();

        let mut claimed = 0;
        for handle in handles {
            if handle.await.unwrap() == ClaimOutcome::Claimed {
                claimed += 1;
            }
        }
        assert_eq!(claimed, 1);
    }

    #[tokio::test]
    async fn test_file_store_survives_reopen() {
        let path = temp_path("reopen");
        let _ = std::fs::remove_file(&path);
        let nonce = crate::CrossChainMessage::compose_nonce(1, 3);
        let tx = TxHash::repeat_byte(0xe1);

        {
            let store = JsonFileNonceStore::open(&path).await.unwrap();
            assert_eq!(store.try_claim(1, nonce).await.unwrap(), ClaimOutcome::Claimed);
            store.mark_confirmed(1, nonce, tx).await.unwrap();
            assert_eq!(store.try_claim(1, U256::from(9)).await.unwrap(), ClaimOutcome::Claimed);
        }

        let reopened = JsonFileNonceStore::open(&path).await.unwrap();
        assert_eq!(reopened.confirmation(1, nonce).await.unwrap(), Some(tx));
        // claims are not persisted
        assert_eq!(
            reopened.try_claim(1, U256::from(9)).await.unwrap(),
            ClaimOutcome::Claimed
        );
        assert!(!path.with_extension("json.tmp").exists());

        std::fs::remove_file(&path).unwrap();
    }

    #[tokio::test]
    async fn test_corrupt_file_is_an_error() {
        let path = temp_path("corrupt");
        std::fs::write(&path, b"{not json").unwrap();

        let result = JsonFileNonceStore::open(&path).await;
        assert!(matches!(result, Err(crate::RelayError::Json(_))));

        std::fs::remove_file(&path).unwrap();
    }
}
