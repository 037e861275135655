use warden_core::{
    Action, Address, CodecError, OperationId, Phase, RegistryError, RoleRequirement, Selector,
    WorkflowShape, U256,
};
use warden_storage::StorageError;

use crate::verifier::VerifierError;

/// Every failure a session can surface.
///
/// [`WardenError::classification`] gives a stable machine-readable string
/// for each variant so callers can render specific guidance.
#[derive(Debug, thiserror::Error)]
pub enum WardenError {
    #[error("invalid input: {0}")]
    Validation(String),

    #[error("no signer configured")]
    MissingSigner,

    #[error("no chain context configured")]
    MissingChainContext,

    #[error("configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error("{address} may not perform {phase} of {operation} (requires {required})")]
    Unauthorized {
        address: Address,
        phase: Phase,
        operation: OperationId,
        required: RoleRequirement,
    },

    #[error("time lock for transaction {tx_id} is {progress:.1}% complete")]
    TimeLockActive { tx_id: U256, progress: f64 },

    /// The verifier could not mint params or build the unsigned payload.
    #[error("could not {stage}: {source}")]
    ConstructionFailed {
        stage: &'static str,
        #[source]
        source: VerifierError,
    },

    /// A read from the verifier or network failed.
    #[error("verifier unavailable: {0}")]
    Verifier(#[source] VerifierError),

    /// Both typed-data and raw-hash signing failed.
    #[error("signing failed: {0}")]
    SigningFailed(String),

    #[error("payload expired at {deadline} (now {now})")]
    Expired { deadline: U256, now: u64 },

    #[error("live gas price {live} exceeds signed maximum {max}")]
    GasPriceExceeded { live: U256, max: U256 },

    #[error("connected address {connected} is not the broadcaster {expected}")]
    WrongBroadcaster { connected: Address, expected: Address },

    #[error("connected to chain {connected} but payload is signed for chain {signed}; switch networks")]
    NetworkMismatch { connected: u64, signed: U256 },

    #[error("{operation} is {shape} and has no {action} entry point")]
    InvalidAction {
        operation: OperationId,
        shape: WorkflowShape,
        action: Action,
    },

    /// The payload was signed for a different entry point than the one
    /// it is being dispatched to.
    #[error("payload was signed for handler {signed_selector} on {signed_contract}, but {action} of {operation} is handled by {expected_selector} on {expected_contract}")]
    HandlerMismatch {
        operation: OperationId,
        action: Action,
        signed_contract: Address,
        signed_selector: Selector,
        expected_contract: Address,
        expected_selector: Selector,
    },

    /// The signer's nonce has moved on since the payload was signed.
    #[error("payload nonce {signed} for {signer} is stale (contract expects {current}); sign a fresh payload")]
    StaleNonce {
        signer: Address,
        signed: U256,
        current: U256,
    },

    #[error("transaction reverted: {}", reason.as_deref().unwrap_or(raw))]
    Reverted { reason: Option<String>, raw: String },

    #[error("a {action} of {operation} is already in flight")]
    Busy {
        operation: OperationId,
        action: Action,
    },

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Codec(#[from] CodecError),
}

impl WardenError {
    /// Stable classification string for this error.
    pub fn classification(&self) -> &'static str {
        match self {
            WardenError::Validation(_)
            | WardenError::MissingSigner
            | WardenError::MissingChainContext
            | WardenError::Config(_) => "validation",
            WardenError::Registry(e) => match e {
                RegistryError::UnknownOperation(_) | RegistryError::UnknownOperationType(_) => {
                    "unknown_operation"
                }
                RegistryError::WrongWorkflowShape { .. } => "wrong_workflow_shape",
                RegistryError::MissingSelector { .. } => "missing_selector",
                RegistryError::IdentifierConflict { .. }
                | RegistryError::HashConflict { .. }
                | RegistryError::ArgumentMismatch { .. }
                | RegistryError::PluginLoad { .. } => "validation",
            },
            WardenError::Unauthorized { .. } => "unauthorized",
            WardenError::TimeLockActive { .. } => "time_lock_active",
            WardenError::ConstructionFailed { .. } => "construction_failed",
            WardenError::Verifier(_) => "verifier",
            WardenError::SigningFailed(_) => "signing_failed",
            WardenError::Expired { .. } => "expired",
            WardenError::GasPriceExceeded { .. } => "gas_price_exceeded",
            WardenError::WrongBroadcaster { .. } => "wrong_broadcaster",
            WardenError::NetworkMismatch { .. } => "network_mismatch",
            WardenError::InvalidAction { .. } | WardenError::HandlerMismatch { .. } => {
                "invalid_action"
            }
            WardenError::StaleNonce { .. } => "stale_nonce",
            WardenError::Reverted { .. } => "reverted",
            WardenError::Busy { .. } => "busy",
            WardenError::Storage(_) => "storage",
            WardenError::Codec(_) => "codec",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use warden_core::CoreOperation;

    #[test]
    fn registry_errors_keep_their_own_class() {
        let unknown = WardenError::from(RegistryError::UnknownOperation("X".into()));
        assert_eq!(unknown.classification(), "unknown_operation");

        let shape = WardenError::from(RegistryError::WrongWorkflowShape {
            id: "MINT_TOKENS".into(),
            expected: WorkflowShape::MultiPhase,
            actual: WorkflowShape::SinglePhase,
        });
        assert_eq!(shape.classification(), "wrong_workflow_shape");
    }

    #[test]
    fn broadcaster_message_names_both_addresses() {
        let err = WardenError::WrongBroadcaster {
            connected: Address::repeat_byte(0x01),
            expected: Address::repeat_byte(0x02),
        };
        let text = err.to_string();
        assert!(text.contains(&Address::repeat_byte(0x01).to_string()));
        assert!(text.contains(&Address::repeat_byte(0x02).to_string()));
        assert_eq!(err.classification(), "wrong_broadcaster");
    }

    #[test]
    fn revert_message_prefers_decoded_reason() {
        let decoded = WardenError::Reverted {
            reason: Some("OnlyBroadcaster".into()),
            raw: "execution reverted".into(),
        };
        assert_eq!(decoded.to_string(), "transaction reverted: OnlyBroadcaster");

        let raw = WardenError::Reverted {
            reason: None,
            raw: "execution reverted".into(),
        };
        assert_eq!(raw.to_string(), "transaction reverted: execution reverted");
    }

    #[test]
    fn busy_is_classified() {
        let err = WardenError::Busy {
            operation: CoreOperation::MintTokens.into(),
            action: Action::RequestAndApprove,
        };
        assert_eq!(err.classification(), "busy");
    }

    #[test]
    fn stale_nonce_names_both_nonces() {
        let err = WardenError::StaleNonce {
            signer: Address::repeat_byte(0x03),
            signed: U256::from(4u64),
            current: U256::from(5u64),
        };
        let text = err.to_string();
        assert!(text.contains("nonce 4"));
        assert!(text.contains("expects 5"));
        assert_eq!(err.classification(), "stale_nonce");
    }
}
