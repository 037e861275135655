use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::broadcast;
use warden_core::{Address, U256};

use crate::error::StorageError;
use crate::feed::{ChangeFeed, StoreEvent, StoreListener};
use crate::record::{EntryMetadata, EntryPatch, StoredTransactionEntry};

/// The storage trait for signed-but-unconfirmed payloads.
///
/// A `TransactionStore` keeps one logical table per contract address,
/// keyed by transaction id. Each row holds the canonically serialized
/// signed payload and its [`EntryMetadata`].
///
/// ## Key semantics
///
/// At most one entry exists per (contract, tx id). `put` on an existing key
/// replaces the row (payload, metadata and timestamp); it never appends.
/// Concurrent puts are last-writer-wins and never disturb other keys.
///
/// ## Notification
///
/// Every successful mutation publishes exactly one [`StoreEvent`] on the
/// contract's channel in [`TransactionStore::feed`]. All handles over the
/// same backing store share one feed.
///
/// ## Thread Safety
///
/// Implementations must be `Send + Sync + 'static` so sessions can share
/// them across async task boundaries.
#[async_trait]
pub trait TransactionStore: Send + Sync + 'static {
    /// Insert or replace the entry for (contract, tx id).
    async fn put(
        &self,
        contract: Address,
        tx_id: U256,
        payload: String,
        metadata: EntryMetadata,
    ) -> Result<StoredTransactionEntry, StorageError>;

    /// Every entry stored for `contract`, keyed by tx id.
    async fn get(
        &self,
        contract: Address,
    ) -> Result<BTreeMap<U256, StoredTransactionEntry>, StorageError>;

    /// Remove one entry. Returns whether it existed.
    async fn remove(&self, contract: Address, tx_id: U256) -> Result<bool, StorageError>;

    /// Remove every entry for `contract`. Returns how many were removed.
    async fn clear(&self, contract: Address) -> Result<usize, StorageError>;

    /// Flip the broadcast flag and/or set the status of an existing entry.
    ///
    /// Returns `Err(StorageError::EntryNotFound)` if there is no such entry.
    async fn update(
        &self,
        contract: Address,
        tx_id: U256,
        patch: EntryPatch,
    ) -> Result<StoredTransactionEntry, StorageError>;

    /// Contracts with at least one stored entry.
    async fn contracts(&self) -> Result<Vec<Address>, StorageError>;

    /// The change feed shared by all handles over this store.
    fn feed(&self) -> &ChangeFeed;

    // ── Provided ──────────────────────────────────────────────────────────────

    /// Read a single entry.
    async fn get_entry(
        &self,
        contract: Address,
        tx_id: U256,
    ) -> Result<Option<StoredTransactionEntry>, StorageError> {
        Ok(self.get(contract).await?.remove(&tx_id))
    }

    fn subscribe(&self, contract: Address) -> broadcast::Receiver<StoreEvent> {
        self.feed().subscribe(contract)
    }

    fn add_listener(&self, contract: Address, listener: &Arc<dyn StoreListener>) {
        self.feed().add_listener(contract, listener)
    }
}

/// Current time as an RFC 3339 string, for `created_at`.
pub(crate) fn now_rfc3339() -> String {
    time::OffsetDateTime::now_utc()
        .format(&time::format_description::well_known::Rfc3339)
        .unwrap_or_default()
}
