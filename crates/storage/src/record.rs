use serde::{Deserialize, Serialize};
use warden_core::codec::u256_dec;
use warden_core::{Action, Address, B256, U256};

/// Where a stored payload is in its broadcast lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryStatus {
    /// Signed, not yet submitted.
    Signed,
    /// Submitted, but confirmation timed out. The outcome is not known.
    Unknown,
    /// Submitted and reverted.
    Failed,
}

impl EntryStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            EntryStatus::Signed => "signed",
            EntryStatus::Unknown => "unknown",
            EntryStatus::Failed => "failed",
        }
    }
}

/// Small descriptive record kept next to each payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntryMetadata {
    /// Registry identifier of the operation (e.g. `MINT_TOKENS`).
    pub operation: String,
    pub operation_type: B256,
    pub action: Action,
    pub broadcast: bool,
    pub status: EntryStatus,
}

impl EntryMetadata {
    /// Metadata for a freshly signed, unbroadcast payload.
    pub fn signed(operation: impl Into<String>, operation_type: B256, action: Action) -> Self {
        Self {
            operation: operation.into(),
            operation_type,
            action,
            broadcast: false,
            status: EntryStatus::Signed,
        }
    }
}

/// One signed-but-unconfirmed payload, keyed by (contract, tx id).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredTransactionEntry {
    pub contract: Address,
    #[serde(with = "u256_dec")]
    pub tx_id: U256,
    /// Canonically serialized signed meta-transaction.
    pub payload: String,
    /// RFC 3339 timestamp string.
    pub created_at: String,
    pub metadata: EntryMetadata,
}

/// The only mutations allowed on a stored entry.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EntryPatch {
    pub broadcast: Option<bool>,
    pub status: Option<EntryStatus>,
}

impl EntryPatch {
    pub fn broadcast(mut self, broadcast: bool) -> Self {
        self.broadcast = Some(broadcast);
        self
    }

    pub fn status(mut self, status: EntryStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn apply(&self, metadata: &mut EntryMetadata) {
        if let Some(broadcast) = self.broadcast {
            metadata.broadcast = broadcast;
        }
        if let Some(status) = self.status {
            metadata.status = status;
        }
    }
}
