/// All errors that can be returned by a TransactionStore implementation.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// No entry stored under (contract, tx id).
    #[error("entry not found: {contract}/{tx_id}")]
    EntryNotFound { contract: String, tx_id: String },

    /// A persisted table could not be encoded or decoded.
    #[error("corrupt table for contract {contract}: {message}")]
    Corrupt { contract: String, message: String },

    /// A backend-specific storage error (I/O, locking, etc.).
    #[error("storage backend error: {0}")]
    Backend(String),
}

impl From<std::io::Error> for StorageError {
    fn from(e: std::io::Error) -> Self {
        StorageError::Backend(e.to_string())
    }
}
