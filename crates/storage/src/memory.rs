use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;
use warden_core::{Address, U256};

use crate::error::StorageError;
use crate::feed::{ChangeFeed, ChangeKind, StoreEvent};
use crate::record::{EntryMetadata, EntryPatch, StoredTransactionEntry};
use crate::traits::{now_rfc3339, TransactionStore};

type Tables = HashMap<Address, BTreeMap<U256, StoredTransactionEntry>>;

struct Inner {
    tables: RwLock<Tables>,
    feed: ChangeFeed,
}

/// Process-local store. Clones are handles onto the same tables and feed.
#[derive(Clone)]
pub struct MemoryStore {
    inner: Arc<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                tables: RwLock::new(HashMap::new()),
                feed: ChangeFeed::new(),
            }),
        }
    }

    fn publish(&self, contract: Address, kind: ChangeKind) {
        self.inner.feed.publish(StoreEvent { contract, kind });
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryStore").finish_non_exhaustive()
    }
}

#[async_trait]
impl TransactionStore for MemoryStore {
    async fn put(
        &self,
        contract: Address,
        tx_id: U256,
        payload: String,
        metadata: EntryMetadata,
    ) -> Result<StoredTransactionEntry, StorageError> {
        let entry = StoredTransactionEntry {
            contract,
            tx_id,
            payload,
            created_at: now_rfc3339(),
            metadata,
        };
        self.inner
            .tables
            .write()
            .await
            .entry(contract)
            .or_default()
            .insert(tx_id, entry.clone());
        tracing::debug!(contract = %contract, tx_id = %tx_id, "stored entry");
        self.publish(contract, ChangeKind::Put { tx_id });
        Ok(entry)
    }

    async fn get(
        &self,
        contract: Address,
    ) -> Result<BTreeMap<U256, StoredTransactionEntry>, StorageError> {
        Ok(self
            .inner
            .tables
            .read()
            .await
            .get(&contract)
            .cloned()
            .unwrap_or_default())
    }

    async fn remove(&self, contract: Address, tx_id: U256) -> Result<bool, StorageError> {
        let removed = {
            let mut tables = self.inner.tables.write().await;
            let removed = tables
                .get_mut(&contract)
                .and_then(|table| table.remove(&tx_id))
                .is_some();
            if tables.get(&contract).is_some_and(|t| t.is_empty()) {
                tables.remove(&contract);
            }
            removed
        };
        if removed {
            tracing::debug!(contract = %contract, tx_id = %tx_id, "removed entry");
            self.publish(contract, ChangeKind::Removed { tx_id });
        }
        Ok(removed)
    }

    async fn clear(&self, contract: Address) -> Result<usize, StorageError> {
        let count = self
            .inner
            .tables
            .write()
            .await
            .remove(&contract)
            .map(|table| table.len())
            .unwrap_or(0);
        tracing::debug!(contract = %contract, count, "cleared entries");
        self.publish(contract, ChangeKind::Cleared);
        Ok(count)
    }

    async fn update(
        &self,
        contract: Address,
        tx_id: U256,
        patch: EntryPatch,
    ) -> Result<StoredTransactionEntry, StorageError> {
        let updated = {
            let mut tables = self.inner.tables.write().await;
            let entry = tables
                .get_mut(&contract)
                .and_then(|table| table.get_mut(&tx_id))
                .ok_or_else(|| StorageError::EntryNotFound {
                    contract: contract.to_string(),
                    tx_id: tx_id.to_string(),
                })?;
            patch.apply(&mut entry.metadata);
            entry.clone()
        };
        self.publish(contract, ChangeKind::Updated { tx_id });
        Ok(updated)
    }

    async fn contracts(&self) -> Result<Vec<Address>, StorageError> {
        let mut contracts: Vec<Address> = self.inner.tables.read().await.keys().copied().collect();
        contracts.sort();
        Ok(contracts)
    }

    fn feed(&self) -> &ChangeFeed {
        &self.inner.feed
    }
}
