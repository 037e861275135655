//! Submitting signed payloads.
//!
//! Dispatch is gated by four pre-flight checks, always in this order:
//! broadcaster identity, deadline, gas ceiling, chain id. A payload that
//! fails any of them is never submitted. After routing, the payload's
//! signed handler must match the dispatched action and its nonce must be
//! the one the contract expects next; those rejections also happen before
//! anything is submitted.

use std::time::Duration;

use tracing::{debug, info, warn};
use warden_core::{
    Action, Address, ContractRoleSnapshot, HandlerTarget, MetaTxParams, OperationDefinition,
    SignedMetaTransaction, WorkflowShape, U256,
};

use crate::error::WardenError;
use crate::verifier::{
    EntryPoint, MetaTxCall, Network, PendingTx, TxHash, TxReceipt, Verifier, VerifierError,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    Confirmed(TxReceipt),
    /// The confirmation wait timed out. The transaction may still land.
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchReceipt {
    pub tx_hash: TxHash,
    pub outcome: DispatchOutcome,
}

impl DispatchReceipt {
    pub fn is_confirmed(&self) -> bool {
        matches!(self.outcome, DispatchOutcome::Confirmed(_))
    }
}

#[derive(Debug, Clone)]
pub struct Dispatcher {
    confirmation_timeout: Duration,
}

impl Dispatcher {
    pub fn new(confirmation_timeout: Duration) -> Self {
        Self {
            confirmation_timeout,
        }
    }

    /// Contract entry point for `action` on an operation of `shape`.
    pub fn entry_point(
        definition: &OperationDefinition,
        action: Action,
    ) -> Result<EntryPoint, WardenError> {
        match (definition.shape(), action) {
            (WorkflowShape::MultiPhase, Action::Approve) => Ok(EntryPoint::MultiPhaseApprove),
            (WorkflowShape::MultiPhase, Action::Cancel) => Ok(EntryPoint::MultiPhaseCancel),
            (WorkflowShape::SinglePhase, Action::RequestAndApprove) => {
                Ok(EntryPoint::SinglePhaseRequestAndApprove)
            }
            (shape, action) => Err(WardenError::InvalidAction {
                operation: definition.id.clone(),
                shape,
                action,
            }),
        }
    }

    /// Run the pre-flight checks against live chain state.
    pub async fn preflight(
        &self,
        network: &dyn Network,
        snapshot: &ContractRoleSnapshot,
        connected: Address,
        signed: &SignedMetaTransaction,
        now: u64,
    ) -> Result<(), WardenError> {
        if connected != snapshot.broadcaster {
            return Err(WardenError::WrongBroadcaster {
                connected,
                expected: snapshot.broadcaster,
            });
        }

        let deadline = signed.deadline();
        if U256::from(now) > deadline {
            return Err(WardenError::Expired { deadline, now });
        }

        let live = network.gas_price().await.map_err(WardenError::Verifier)?;
        if live > signed.max_gas_price() {
            return Err(WardenError::GasPriceExceeded {
                live,
                max: signed.max_gas_price(),
            });
        }

        let chain_id = network.chain_id().await.map_err(WardenError::Verifier)?;
        if U256::from(chain_id) != signed.chain_id() {
            return Err(WardenError::NetworkMismatch {
                connected: chain_id,
                signed: signed.chain_id(),
            });
        }
        Ok(())
    }

    /// Pre-flight, route, submit and wait.
    ///
    /// A revert is reported as [`WardenError::Reverted`] with the reason
    /// recovered by re-simulating the call, when the verifier can give one.
    #[allow(clippy::too_many_arguments)]
    pub async fn dispatch(
        &self,
        verifier: &dyn Verifier,
        network: &dyn Network,
        snapshot: &ContractRoleSnapshot,
        definition: &OperationDefinition,
        action: Action,
        signed: &SignedMetaTransaction,
        connected: Address,
        now: u64,
    ) -> Result<DispatchReceipt, WardenError> {
        self.preflight(network, snapshot, connected, signed, now)
            .await?;

        let record_type = signed.payload().tx_record.params.operation_type;
        if record_type != definition.operation_type {
            return Err(WardenError::Validation(format!(
                "payload carries operation type {}, expected {} for {}",
                record_type, definition.operation_type, definition.id
            )));
        }
        let entry = Self::entry_point(definition, action)?;

        let params = &signed.payload().params;
        let handler = definition.handler(action, snapshot.contract)?;
        check_handler(definition, action, handler, params)?;

        let current = verifier
            .nonce(params.signer)
            .await
            .map_err(WardenError::Verifier)?;
        if current != params.nonce {
            return Err(WardenError::StaleNonce {
                signer: params.signer,
                signed: params.nonce,
                current,
            });
        }

        let call = MetaTxCall {
            entry,
            handler,
            signed: signed.clone(),
        };

        let pending = match verifier.submit_meta_tx(call.clone(), connected).await {
            Ok(pending) => pending,
            Err(VerifierError::Reverted(raw)) => {
                return Err(self.revert(verifier, &call, connected, raw).await)
            }
            Err(e) => return Err(WardenError::Verifier(e)),
        };
        info!(
            contract = %snapshot.contract,
            operation = %definition.id,
            action = %action,
            tx_id = %signed.tx_id(),
            tx_hash = %pending.hash,
            "submitted meta-transaction"
        );

        match self.settle(pending).await {
            Ok(receipt) => Ok(receipt),
            Err(VerifierError::Reverted(raw)) => {
                Err(self.revert(verifier, &call, connected, raw).await)
            }
            Err(e) => Err(WardenError::Verifier(e)),
        }
    }

    /// Wait for `pending` up to the confirmation timeout.
    pub async fn settle(&self, pending: PendingTx) -> Result<DispatchReceipt, VerifierError> {
        let tx_hash = pending.hash;
        match tokio::time::timeout(self.confirmation_timeout, pending.confirmed()).await {
            Ok(Ok(receipt)) => {
                debug!(tx_hash = %tx_hash, "transaction confirmed");
                Ok(DispatchReceipt {
                    tx_hash,
                    outcome: DispatchOutcome::Confirmed(receipt),
                })
            }
            Ok(Err(e)) => Err(e),
            Err(_) => {
                warn!(
                    tx_hash = %tx_hash,
                    timeout_secs = self.confirmation_timeout.as_secs(),
                    "confirmation timed out, outcome unknown"
                );
                Ok(DispatchReceipt {
                    tx_hash,
                    outcome: DispatchOutcome::Unknown,
                })
            }
        }
    }

    async fn revert(
        &self,
        verifier: &dyn Verifier,
        call: &MetaTxCall,
        connected: Address,
        raw: String,
    ) -> WardenError {
        let reason = match verifier.simulate_meta_tx(call, connected).await {
            Err(VerifierError::Reverted(reason)) if !reason.is_empty() => Some(reason),
            Ok(()) => None,
            Err(e) => {
                debug!(error = %e, "could not recover revert reason");
                None
            }
        };
        warn!(
            tx_id = %call.signed.tx_id(),
            reason = reason.as_deref().unwrap_or("<unknown>"),
            "meta-transaction reverted"
        );
        WardenError::Reverted { reason, raw }
    }
}

/// The handler a payload was signed for must be the one `action` routes to.
fn check_handler(
    definition: &OperationDefinition,
    action: Action,
    expected: HandlerTarget,
    params: &MetaTxParams,
) -> Result<(), WardenError> {
    if params.handler_contract == expected.contract && params.handler_selector == expected.selector
    {
        return Ok(());
    }
    Err(WardenError::HandlerMismatch {
        operation: definition.id.clone(),
        action,
        signed_contract: params.handler_contract,
        signed_selector: params.handler_selector,
        expected_contract: expected.contract,
        expected_selector: expected.selector,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use warden_core::CoreOperation;

    #[test]
    fn routes_by_shape_and_action() {
        let transfer = CoreOperation::TransferOwnership.definition();
        let mint = CoreOperation::MintTokens.definition();

        assert_eq!(
            Dispatcher::entry_point(&transfer, Action::Approve).unwrap(),
            EntryPoint::MultiPhaseApprove
        );
        assert_eq!(
            Dispatcher::entry_point(&transfer, Action::Cancel).unwrap(),
            EntryPoint::MultiPhaseCancel
        );
        assert_eq!(
            Dispatcher::entry_point(&mint, Action::RequestAndApprove).unwrap(),
            EntryPoint::SinglePhaseRequestAndApprove
        );
    }

    #[test]
    fn mismatched_action_is_invalid() {
        let mint = CoreOperation::MintTokens.definition();
        let err = Dispatcher::entry_point(&mint, Action::Cancel).unwrap_err();
        assert_eq!(err.classification(), "invalid_action");

        let transfer = CoreOperation::TransferOwnership.definition();
        let err = Dispatcher::entry_point(&transfer, Action::RequestAndApprove).unwrap_err();
        assert_eq!(err.classification(), "invalid_action");
    }

    #[test]
    fn handler_must_match_dispatched_action() {
        let transfer = CoreOperation::TransferOwnership.definition();
        let contract = Address::repeat_byte(0xc0);
        let approve = transfer.handler(Action::Approve, contract).unwrap();
        let cancel = transfer.handler(Action::Cancel, contract).unwrap();
        let params = MetaTxParams {
            chain_id: U256::from(1u64),
            nonce: U256::ZERO,
            handler_contract: approve.contract,
            handler_selector: approve.selector,
            deadline: U256::MAX,
            max_gas_price: U256::MAX,
            signer: Address::ZERO,
        };

        assert!(check_handler(&transfer, Action::Approve, approve, &params).is_ok());
        let err = check_handler(&transfer, Action::Cancel, cancel, &params).unwrap_err();
        assert_eq!(err.classification(), "invalid_action");
        assert!(matches!(
            err,
            WardenError::HandlerMismatch { action: Action::Cancel, .. }
        ));
    }

    #[tokio::test]
    async fn settle_times_out_to_unknown() {
        let dispatcher = Dispatcher::new(Duration::from_millis(10));
        let pending = PendingTx::new(TxHash::repeat_byte(1), std::future::pending());
        let receipt = dispatcher.settle(pending).await.unwrap();
        assert_eq!(receipt.outcome, DispatchOutcome::Unknown);
        assert_eq!(receipt.tx_hash, TxHash::repeat_byte(1));
    }

    #[tokio::test]
    async fn settle_passes_reverts_through() {
        let dispatcher = Dispatcher::new(Duration::from_secs(1));
        let pending = PendingTx::new(TxHash::ZERO, async {
            Err(VerifierError::Reverted("0x".to_string()))
        });
        let err = dispatcher.settle(pending).await.unwrap_err();
        assert_eq!(err, VerifierError::Reverted("0x".to_string()));
    }
}
