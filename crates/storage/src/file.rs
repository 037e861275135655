//! JSON-file backend: one file per contract under a store directory.
//!
//! Each file holds the contract's table keyed by decimal tx id. Writes go
//! to a temporary file that is renamed over the table, so readers never see
//! a half-written table. Handles opened on the same directory within one
//! process share a write lock and a change feed.

use std::collections::{BTreeMap, HashMap};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, OnceLock, Weak};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use warden_core::codec::parse_u256;
use warden_core::{Address, U256};

use crate::error::StorageError;
use crate::feed::{ChangeFeed, ChangeKind, StoreEvent};
use crate::record::{EntryMetadata, EntryPatch, StoredTransactionEntry};
use crate::traits::{now_rfc3339, TransactionStore};

#[derive(Debug, Serialize, Deserialize)]
struct ContractTable {
    contract: Address,
    entries: BTreeMap<String, StoredTransactionEntry>,
}

struct Shared {
    write_lock: tokio::sync::Mutex<()>,
    feed: ChangeFeed,
}

fn shared_for(dir: &Path) -> Arc<Shared> {
    static OPEN: OnceLock<Mutex<HashMap<PathBuf, Weak<Shared>>>> = OnceLock::new();
    let mut open = OPEN
        .get_or_init(|| Mutex::new(HashMap::new()))
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner());
    if let Some(shared) = open.get(dir).and_then(Weak::upgrade) {
        return shared;
    }
    let shared = Arc::new(Shared {
        write_lock: tokio::sync::Mutex::new(()),
        feed: ChangeFeed::new(),
    });
    open.retain(|_, weak| weak.strong_count() > 0);
    open.insert(dir.to_path_buf(), Arc::downgrade(&shared));
    shared
}

#[derive(Clone)]
pub struct JsonFileStore {
    dir: PathBuf,
    shared: Arc<Shared>,
}

impl JsonFileStore {
    /// Open (creating if needed) a store rooted at `dir`.
    pub fn open(dir: impl AsRef<Path>) -> Result<Self, StorageError> {
        std::fs::create_dir_all(dir.as_ref())?;
        let dir = std::fs::canonicalize(dir.as_ref())?;
        let shared = shared_for(&dir);
        Ok(Self { dir, shared })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn table_path(&self, contract: Address) -> PathBuf {
        self.dir.join(format!("{:x}.json", contract))
    }

    async fn read_table(
        &self,
        contract: Address,
    ) -> Result<BTreeMap<U256, StoredTransactionEntry>, StorageError> {
        let corrupt = |message: String| StorageError::Corrupt {
            contract: contract.to_string(),
            message,
        };
        let text = match tokio::fs::read_to_string(self.table_path(contract)).await {
            Ok(text) => text,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(BTreeMap::new()),
            Err(e) => return Err(e.into()),
        };
        let table: ContractTable =
            serde_json::from_str(&text).map_err(|e| corrupt(e.to_string()))?;
        table
            .entries
            .into_iter()
            .map(|(key, entry)| {
                let tx_id = parse_u256(&key).map_err(|e| corrupt(e.to_string()))?;
                Ok((tx_id, entry))
            })
            .collect()
    }

    async fn write_table(
        &self,
        contract: Address,
        entries: &BTreeMap<U256, StoredTransactionEntry>,
    ) -> Result<(), StorageError> {
        let path = self.table_path(contract);
        if entries.is_empty() {
            return match tokio::fs::remove_file(&path).await {
                Err(e) if e.kind() != ErrorKind::NotFound => Err(e.into()),
                _ => Ok(()),
            };
        }
        let table = ContractTable {
            contract,
            entries: entries
                .iter()
                .map(|(tx_id, entry)| (tx_id.to_string(), entry.clone()))
                .collect(),
        };
        let text = serde_json::to_string_pretty(&table).map_err(|e| StorageError::Corrupt {
            contract: contract.to_string(),
            message: e.to_string(),
        })?;
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, text).await?;
        tokio::fs::rename(&tmp, &path).await?;
        Ok(())
    }

    fn publish(&self, contract: Address, kind: ChangeKind) {
        self.shared.feed.publish(StoreEvent { contract, kind });
    }
}

impl std::fmt::Debug for JsonFileStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JsonFileStore")
            .field("dir", &self.dir)
            .finish()
    }
}

#[async_trait]
impl TransactionStore for JsonFileStore {
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
        {
            let _guard = self.shared.write_lock.lock().await;
            let mut table = self.read_table(contract).await?;
            table.insert(tx_id, entry.clone());
            self.write_table(contract, &table).await?;
        }
        tracing::debug!(contract = %contract, tx_id = %tx_id, dir = %self.dir.display(), "stored entry");
        self.publish(contract, ChangeKind::Put { tx_id });
        Ok(entry)
    }

    async fn get(
        &self,
        contract: Address,
    ) -> Result<BTreeMap<U256, StoredTransactionEntry>, StorageError> {
        self.read_table(contract).await
    }

    async fn remove(&self, contract: Address, tx_id: U256) -> Result<bool, StorageError> {
        let removed = {
            let _guard = self.shared.write_lock.lock().await;
            let mut table = self.read_table(contract).await?;
            let removed = table.remove(&tx_id).is_some();
            if removed {
                self.write_table(contract, &table).await?;
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
        let count = {
            let _guard = self.shared.write_lock.lock().await;
            let count = self.read_table(contract).await?.len();
            self.write_table(contract, &BTreeMap::new()).await?;
            count
        };
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
            let _guard = self.shared.write_lock.lock().await;
            let mut table = self.read_table(contract).await?;
            let entry = table
                .get_mut(&tx_id)
                .ok_or_else(|| StorageError::EntryNotFound {
                    contract: contract.to_string(),
                    tx_id: tx_id.to_string(),
                })?;
            patch.apply(&mut entry.metadata);
            let updated = entry.clone();
            self.write_table(contract, &table).await?;
            updated
        };
        self.publish(contract, ChangeKind::Updated { tx_id });
        Ok(updated)
    }

    async fn contracts(&self) -> Result<Vec<Address>, StorageError> {
        let mut contracts = Vec::new();
        let mut dir = tokio::fs::read_dir(&self.dir).await?;
        while let Some(item) = dir.next_entry().await? {
            let path = item.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            if let Ok(contract) = stem.parse::<Address>() {
                contracts.push(contract);
            }
        }
        contracts.sort();
        Ok(contracts)
    }

    fn feed(&self) -> &ChangeFeed {
        &self.shared.feed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conformance::run_conformance_suite;
    use warden_core::{Action, B256};

    #[tokio::test]
    async fn json_file_store_conformance() {
        let root = tempfile::TempDir::new().unwrap();
        let counter = std::sync::atomic::AtomicUsize::new(0);
        let report = run_conformance_suite(|| {
            let n = counter.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            let dir = root.path().join(format!("store-{n}"));
            async move { JsonFileStore::open(dir).unwrap() }
        })
        .await;
        assert!(report.failed == 0, "{report}");
    }

    #[tokio::test]
    async fn entries_survive_reopen() {
        let root = tempfile::TempDir::new().unwrap();
        let contract = Address::repeat_byte(0x42);
        {
            let store = JsonFileStore::open(root.path()).unwrap();
            store
                .put(
                    contract,
                    U256::MAX,
                    "{}".to_string(),
                    EntryMetadata::signed("MINT_TOKENS", B256::ZERO, Action::RequestAndApprove),
                )
                .await
                .unwrap();
        }
        let reopened = JsonFileStore::open(root.path()).unwrap();
        let table = reopened.get(contract).await.unwrap();
        assert_eq!(table.len(), 1);
        assert!(table.contains_key(&U256::MAX));
        assert_eq!(reopened.contracts().await.unwrap(), vec![contract]);
    }

    #[tokio::test]
    async fn separately_opened_handles_share_notifications() {
        let root = tempfile::TempDir::new().unwrap();
        let contract = Address::repeat_byte(0x42);
        let writer = JsonFileStore::open(root.path()).unwrap();
        let reader = JsonFileStore::open(root.path()).unwrap();
        let mut rx = reader.subscribe(contract);

        writer
            .put(
                contract,
                U256::from(1u64),
                "{}".to_string(),
                EntryMetadata::signed("MINT_TOKENS", B256::ZERO, Action::RequestAndApprove),
            )
            .await
            .unwrap();

        let event = rx.recv().await.unwrap();
        assert_eq!(
            event.kind,
            ChangeKind::Put {
                tx_id: U256::from(1u64)
            }
        );
        assert_eq!(reader.get(contract).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn corrupt_table_is_reported() {
        let root = tempfile::TempDir::new().unwrap();
        let contract = Address::repeat_byte(0x42);
        let store = JsonFileStore::open(root.path()).unwrap();
        std::fs::write(store.table_path(contract), "not json").unwrap();
        let err = store.get(contract).await.unwrap_err();
        assert!(matches!(err, StorageError::Corrupt { .. }));
    }
}
