//! warden-core: the operation model shared by every Warden crate.
//!
//! Holds the data types that cross the verifier boundary (transaction
//! records, meta-transaction parameters, signed payloads), the canonical
//! JSON codec used wherever those types are serialized, EIP-712 hashing,
//! the operation registry, and the pure role/time-lock evaluator.
//!
//! Nothing in this crate performs I/O. The engine crate composes these
//! pieces with a verifier, a signer and a transaction store.

pub mod abi;
pub mod codec;
pub mod eip712;
pub mod error;
pub mod operations;
pub mod registry;
pub mod roles;
pub mod signature;
pub mod types;

// ── Convenience re-exports ───────────────────────────────────────────

pub use codec::{CanonicalCodec, CodecError};
pub use eip712::{meta_tx_digest, Eip712Domain, TypedData};
pub use error::{RegistryError, StatusTransitionError};
pub use operations::{CoreOperation, OperationArgs};
pub use registry::{
    ExecutionOptionsEncoder, HandlerBuilder, HandlerTarget, MultiPhaseRoles, MultiPhaseWorkflow,
    OperationDefinition, OperationId, OperationPlugin, OperationRegistry, SinglePhaseWorkflow,
    Workflow,
};
pub use roles::{can_execute_phase, is_time_lock_complete, time_lock_progress};
pub use signature::{recover_signer, sign_digest, SignatureError};
pub use types::{
    Action, ContractRoleSnapshot, ExecutionType, MetaTxParams, PaymentDetails, Phase, Role,
    RoleRequirement, SignedMetaTransaction, TxParams, TxRecord, TxStatus,
    UnsignedMetaTransaction, WorkflowShape,
};

pub use alloy_primitives::{keccak256, Address, Bytes, Selector, B256, U256};
