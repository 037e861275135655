pub mod conformance;
mod error;
mod feed;
mod file;
mod memory;
mod record;
mod traits;

pub use error::StorageError;
pub use feed::{ChangeFeed, ChangeKind, StoreEvent, StoreListener};
pub use file::JsonFileStore;
pub use memory::MemoryStore;
pub use record::{EntryMetadata, EntryPatch, EntryStatus, StoredTransactionEntry};
pub use traits::TransactionStore;
