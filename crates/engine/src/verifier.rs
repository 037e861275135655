//! The seams between the engine and the outside world.
//!
//! [`Verifier`] is the on-chain contract as the engine sees it: role reads,
//! record reads, parameter minting, payload construction and the write
//! entry points. [`Network`] answers the two questions pre-flight needs
//! from the connected node. Both are traits so sessions can run against a
//! live node or an in-memory contract.

use std::fmt;
use std::future::Future;
use std::pin::Pin;

use async_trait::async_trait;
use warden_core::{
    Action, Address, Bytes, ContractRoleSnapshot, ExecutionType, HandlerTarget, MetaTxParams,
    PaymentDetails, SignedMetaTransaction, TxRecord, UnsignedMetaTransaction, B256, U256,
};

pub type TxHash = B256;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum VerifierError {
    /// The call was refused before reaching the chain.
    #[error("rejected: {0}")]
    Rejected(String),

    /// The transaction (or its simulation) reverted. Carries whatever the
    /// node returned.
    #[error("reverted: {0}")]
    Reverted(String),

    #[error("transport error: {0}")]
    Transport(String),
}

/// Outcome of a confirmed transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxReceipt {
    pub hash: TxHash,
    /// Record created or touched by the transaction, when known.
    pub tx_id: Option<U256>,
}

type Confirmation = Pin<Box<dyn Future<Output = Result<TxReceipt, VerifierError>> + Send>>;

/// A submitted transaction: its hash now, its confirmation later.
pub struct PendingTx {
    pub hash: TxHash,
    confirmation: Confirmation,
}

impl PendingTx {
    pub fn new(
        hash: TxHash,
        confirmation: impl Future<Output = Result<TxReceipt, VerifierError>> + Send + 'static,
    ) -> Self {
        Self {
            hash,
            confirmation: Box::pin(confirmation),
        }
    }

    /// Wait for the transaction to be mined. A revert resolves to
    /// `Err(VerifierError::Reverted)`.
    pub async fn confirmed(self) -> Result<TxReceipt, VerifierError> {
        self.confirmation.await
    }
}

impl fmt::Debug for PendingTx {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingTx").field("hash", &self.hash).finish()
    }
}

/// What the builder asks the verifier to mint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetaTxParamsRequest {
    pub handler: HandlerTarget,
    pub deadline: U256,
    pub max_gas_price: U256,
    pub signer: Address,
}

/// A brand-new operation record, before the verifier assigns its id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewOperationRequest {
    pub requester: Address,
    pub target: Address,
    pub value: U256,
    pub gas_limit: U256,
    pub operation_type: B256,
    pub execution_type: ExecutionType,
    pub execution_options: Bytes,
    pub payment: PaymentDetails,
}

/// Contract entry point a signed payload is submitted to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryPoint {
    MultiPhaseApprove,
    MultiPhaseCancel,
    SinglePhaseRequestAndApprove,
}

impl EntryPoint {
    /// The workflow action this entry point performs.
    pub fn action(self) -> Action {
        match self {
            EntryPoint::MultiPhaseApprove => Action::Approve,
            EntryPoint::MultiPhaseCancel => Action::Cancel,
            EntryPoint::SinglePhaseRequestAndApprove => Action::RequestAndApprove,
        }
    }
}

/// A meta-transaction submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetaTxCall {
    pub entry: EntryPoint,
    pub handler: HandlerTarget,
    pub signed: SignedMetaTransaction,
}

#[async_trait]
pub trait Verifier: Send + Sync {
    /// Address of the contract this verifier fronts.
    fn contract(&self) -> Address;

    // ── Reads ────────────────────────────────────────────────────────────────

    async fn role_snapshot(&self) -> Result<ContractRoleSnapshot, VerifierError>;

    async fn transaction(&self, tx_id: U256) -> Result<TxRecord, VerifierError>;

    async fn pending_transactions(&self) -> Result<Vec<TxRecord>, VerifierError>;

    /// Operation-type hashes the contract understands, with their names.
    async fn supported_operation_types(&self) -> Result<Vec<(B256, String)>, VerifierError>;

    /// Next meta-transaction nonce the contract will accept from `signer`.
    async fn nonce(&self, signer: Address) -> Result<U256, VerifierError>;

    // ── Construction ─────────────────────────────────────────────────────────

    async fn mint_meta_tx_params(
        &self,
        request: MetaTxParamsRequest,
    ) -> Result<MetaTxParams, VerifierError>;

    /// Unsigned payload wrapping a new record.
    async fn build_new_operation(
        &self,
        request: NewOperationRequest,
        params: MetaTxParams,
    ) -> Result<UnsignedMetaTransaction, VerifierError>;

    /// Unsigned payload referencing an existing pending record.
    async fn build_existing_operation(
        &self,
        tx_id: U256,
        params: MetaTxParams,
    ) -> Result<UnsignedMetaTransaction, VerifierError>;

    // ── Writes ───────────────────────────────────────────────────────────────

    async fn request(
        &self,
        request: NewOperationRequest,
        from: Address,
    ) -> Result<PendingTx, VerifierError>;

    async fn approve(
        &self,
        operation_type: B256,
        tx_id: U256,
        from: Address,
    ) -> Result<PendingTx, VerifierError>;

    async fn cancel(
        &self,
        operation_type: B256,
        tx_id: U256,
        from: Address,
    ) -> Result<PendingTx, VerifierError>;

    async fn submit_meta_tx(
        &self,
        call: MetaTxCall,
        from: Address,
    ) -> Result<PendingTx, VerifierError>;

    /// Re-run a call without submitting it. `Err(Reverted(reason))` carries
    /// the decoded revert reason.
    async fn simulate_meta_tx(&self, call: &MetaTxCall, from: Address)
        -> Result<(), VerifierError>;
}

/// The connected node.
#[async_trait]
pub trait Network: Send + Sync {
    async fn chain_id(&self) -> Result<u64, VerifierError>;

    async fn gas_price(&self) -> Result<U256, VerifierError>;
}
