use alloy_primitives::{B256, U256};

use crate::types::{Action, TxStatus, WorkflowShape};

/// Errors raised while registering or resolving operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    /// No definition registered under this identifier.
    #[error("unknown operation '{0}'")]
    UnknownOperation(String),

    /// No definition registered under this operation-type hash.
    #[error("unknown operation type {0}")]
    UnknownOperationType(B256),

    /// The identifier is already bound to a different operation-type hash.
    #[error("operation '{id}' already registered with type {existing}, refusing {attempted}")]
    IdentifierConflict {
        id: String,
        existing: B256,
        attempted: B256,
    },

    /// The operation-type hash is already bound to another identifier.
    #[error("operation type {hash} already registered as '{existing}', refusing '{attempted}'")]
    HashConflict {
        hash: B256,
        existing: String,
        attempted: String,
    },

    /// A function of one workflow shape was invoked on the other.
    #[error("operation '{id}' is {actual}, but a {expected} function was invoked")]
    WrongWorkflowShape {
        id: String,
        expected: WorkflowShape,
        actual: WorkflowShape,
    },

    /// Neither the static table nor the plug-in supplies a handler selector.
    #[error("no handler selector for operation '{id}' action '{action}'")]
    MissingSelector { id: String, action: Action },

    /// Arguments do not match what the operation encodes.
    #[error("operation '{id}' cannot encode arguments: {message}")]
    ArgumentMismatch { id: String, message: String },

    /// A plug-in failed to produce its definitions.
    #[error("plug-in '{plugin}' failed to load: {message}")]
    PluginLoad { plugin: String, message: String },
}

/// A record was asked to move to a status its lifecycle does not allow.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("transaction {tx_id} cannot move from {from} to {to}")]
pub struct StatusTransitionError {
    pub tx_id: U256,
    pub from: TxStatus,
    pub to: TxStatus,
}
