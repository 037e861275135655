//! Core operations: the closed set every verifier contract understands.
//!
//! Each variant carries a static row: operation-type name (hashed into the
//! 32-byte identifier), workflow shape, role table, meta-tx handler
//! functions and the execution function run when the record completes.

use std::fmt;

use alloy_primitives::{keccak256, Address, Bytes, Selector, B256, U256};

use crate::abi::{encode_call, selector, AbiValue};
use crate::error::RegistryError;
use crate::registry::{
    MultiPhaseRoles, MultiPhaseWorkflow, OperationDefinition, OperationId, SinglePhaseWorkflow,
    Workflow,
};
use crate::types::{PaymentDetails, Role, RoleRequirement};

/// ABI tuple of a signed meta-transaction as handler functions take it:
/// `(TxRecord, MetaTxParams, bytes32 message, bytes signature, bytes data)`.
pub const META_TX_TUPLE: &str = "((uint256,uint256,uint8,(address,address,uint256,uint256,bytes32,uint8,bytes),bytes32,bytes,(address,uint256,address,uint256)),(uint256,uint256,address,bytes4,uint256,uint256,address),bytes32,bytes,bytes)";

/// Selector of a meta-tx handler function named `name`.
pub fn handler_selector(name: &str) -> Selector {
    selector(&format!("{}({})", name, META_TX_TUPLE))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CoreOperation {
    TransferOwnership,
    UpdateBroadcaster,
    UpdateRecovery,
    UpdateTimeLock,
    WithdrawEth,
    WithdrawToken,
    MintTokens,
    BurnTokens,
}

/// Typed arguments for a new operation record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperationArgs {
    /// No arguments; used by plug-ins whose verifier encodes its own options.
    None,
    NewOwner(Address),
    NewBroadcaster(Address),
    NewRecovery(Address),
    TimeLockPeriod(U256),
    WithdrawEth {
        recipient: Address,
        amount: U256,
    },
    WithdrawToken {
        token: Address,
        recipient: Address,
        amount: U256,
    },
    Mint {
        to: Address,
        amount: U256,
    },
    Burn {
        from: Address,
        amount: U256,
    },
    /// Pre-encoded execution options, passed through untouched.
    Encoded(Bytes),
}

impl OperationArgs {
    /// Funds the record releases on completion. Empty for everything but
    /// withdrawals.
    pub fn payment(&self) -> PaymentDetails {
        match self {
            OperationArgs::WithdrawEth { recipient, amount } => PaymentDetails {
                recipient: *recipient,
                native_token_amount: *amount,
                ..PaymentDetails::default()
            },
            OperationArgs::WithdrawToken {
                token,
                recipient,
                amount,
            } => PaymentDetails {
                recipient: *recipient,
                erc20_token_address: *token,
                erc20_token_amount: *amount,
                ..PaymentDetails::default()
            },
            _ => PaymentDetails::default(),
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            OperationArgs::None => "none",
            OperationArgs::NewOwner(_) => "new owner",
            OperationArgs::NewBroadcaster(_) => "new broadcaster",
            OperationArgs::NewRecovery(_) => "new recovery",
            OperationArgs::TimeLockPeriod(_) => "time-lock period",
            OperationArgs::WithdrawEth { .. } => "eth withdrawal",
            OperationArgs::WithdrawToken { .. } => "token withdrawal",
            OperationArgs::Mint { .. } => "mint",
            OperationArgs::Burn { .. } => "burn",
            OperationArgs::Encoded(_) => "encoded options",
        }
    }
}

struct Row {
    id: &'static str,
    type_name: &'static str,
    name: &'static str,
    description: &'static str,
    execution: &'static str,
}

impl CoreOperation {
    pub const ALL: [CoreOperation; 8] = [
        CoreOperation::TransferOwnership,
        CoreOperation::UpdateBroadcaster,
        CoreOperation::UpdateRecovery,
        CoreOperation::UpdateTimeLock,
        CoreOperation::WithdrawEth,
        CoreOperation::WithdrawToken,
        CoreOperation::MintTokens,
        CoreOperation::BurnTokens,
    ];

    fn row(self) -> Row {
        match self {
            CoreOperation::TransferOwnership => Row {
                id: "TRANSFER_OWNERSHIP",
                type_name: "OWNERSHIP_TRANSFER",
                name: "Transfer ownership",
                description: "Hand the owner role to the recovery address after the time lock",
                execution: "executeTransferOwnership(address)",
            },
            CoreOperation::UpdateBroadcaster => Row {
                id: "UPDATE_BROADCASTER",
                type_name: "BROADCASTER_UPDATE",
                name: "Update broadcaster",
                description: "Rotate the account allowed to submit meta-transactions",
                execution: "executeBroadcasterUpdate(address)",
            },
            CoreOperation::UpdateRecovery => Row {
                id: "UPDATE_RECOVERY",
                type_name: "RECOVERY_UPDATE",
                name: "Update recovery",
                description: "Rotate the emergency recovery address",
                execution: "executeRecoveryUpdate(address)",
            },
            CoreOperation::UpdateTimeLock => Row {
                id: "UPDATE_TIMELOCK",
                type_name: "TIMELOCK_UPDATE",
                name: "Update time lock",
                description: "Change the delay between request and approval",
                execution: "executeTimeLockUpdate(uint256)",
            },
            CoreOperation::WithdrawEth => Row {
                id: "WITHDRAW_ETH",
                type_name: "WITHDRAW_ETH",
                name: "Withdraw ETH",
                description: "Release native currency from the vault",
                execution: "executeWithdrawEth(address,uint256)",
            },
            CoreOperation::WithdrawToken => Row {
                id: "WITHDRAW_TOKEN",
                type_name: "WITHDRAW_TOKEN",
                name: "Withdraw token",
                description: "Release ERC-20 tokens from the vault",
                execution: "executeWithdrawToken(address,address,uint256)",
            },
            CoreOperation::MintTokens => Row {
                id: "MINT_TOKENS",
                type_name: "MINT_TOKENS",
                name: "Mint tokens",
                description: "Mint tokens to an account",
                execution: "executeMint(address,uint256)",
            },
            CoreOperation::BurnTokens => Row {
                id: "BURN_TOKENS",
                type_name: "BURN_TOKENS",
                name: "Burn tokens",
                description: "Burn tokens held by an account",
                execution: "executeBurn(address,uint256)",
            },
        }
    }

    pub fn as_str(self) -> &'static str {
        self.row().id
    }

    pub fn from_name(name: &str) -> Option<CoreOperation> {
        Self::ALL.into_iter().find(|op| op.as_str() == name)
    }

    pub fn type_name(self) -> &'static str {
        self.row().type_name
    }

    /// `keccak256(type_name)`.
    pub fn operation_type(self) -> B256 {
        keccak256(self.type_name().as_bytes())
    }

    pub fn execution_selector(self) -> Selector {
        selector(self.row().execution)
    }

    /// ABI-encode `args` as a call to this operation's execution function.
    pub fn encode_execution(self, args: &OperationArgs) -> Result<Bytes, RegistryError> {
        use AbiValue::{Address as A, Uint as U};

        let values = match (self, args) {
            (CoreOperation::TransferOwnership, OperationArgs::NewOwner(owner)) => vec![A(*owner)],
            (CoreOperation::UpdateBroadcaster, OperationArgs::NewBroadcaster(b)) => vec![A(*b)],
            (CoreOperation::UpdateRecovery, OperationArgs::NewRecovery(r)) => vec![A(*r)],
            (CoreOperation::UpdateTimeLock, OperationArgs::TimeLockPeriod(period)) => {
                if period.is_zero() {
                    return Err(self.mismatch("time-lock period must be positive"));
                }
                vec![U(*period)]
            }
            (CoreOperation::WithdrawEth, OperationArgs::WithdrawEth { recipient, amount }) => {
                vec![A(*recipient), U(*amount)]
            }
            (
                CoreOperation::WithdrawToken,
                OperationArgs::WithdrawToken {
                    token,
                    recipient,
                    amount,
                },
            ) => vec![A(*token), A(*recipient), U(*amount)],
            (CoreOperation::MintTokens, OperationArgs::Mint { to, amount }) => {
                vec![A(*to), U(*amount)]
            }
            (CoreOperation::BurnTokens, OperationArgs::Burn { from, amount }) => {
                vec![A(*from), U(*amount)]
            }
            (_, OperationArgs::Encoded(bytes)) => return Ok(bytes.clone()),
            (_, other) => {
                return Err(self.mismatch(&format!("unexpected {} arguments", other.kind())))
            }
        };
        Ok(encode_call(self.execution_selector(), &values))
    }

    fn mismatch(self, message: &str) -> RegistryError {
        RegistryError::ArgumentMismatch {
            id: self.as_str().to_string(),
            message: message.to_string(),
        }
    }

    /// The registry definition for this operation.
    pub fn definition(self) -> OperationDefinition {
        use RoleRequirement::{AnyOf, Single};

        let row = self.row();
        let owner = || Single(Role::Owner);
        let multi = |roles: MultiPhaseRoles, approve: &str, cancel: &str| {
            Workflow::MultiPhase(MultiPhaseWorkflow {
                roles,
                approve_selector: Some(handler_selector(approve)),
                cancel_selector: Some(handler_selector(cancel)),
                builder: None,
            })
        };
        let single = |handler: &str| {
            Workflow::SinglePhase(SinglePhaseWorkflow {
                sign_role: owner(),
                handler_selector: Some(handler_selector(handler)),
                options: None,
                builder: None,
            })
        };
        let owner_only = || MultiPhaseRoles {
            request: owner(),
            approve: owner(),
            cancel: owner(),
            meta_approve: owner(),
            meta_cancel: owner(),
        };

        let workflow = match self {
            CoreOperation::TransferOwnership => multi(
                MultiPhaseRoles {
                    request: Single(Role::Recovery),
                    approve: AnyOf(vec![Role::Owner, Role::Recovery]),
                    cancel: owner(),
                    meta_approve: owner(),
                    meta_cancel: owner(),
                },
                "transferOwnershipApprovalWithMetaTx",
                "transferOwnershipCancellationWithMetaTx",
            ),
            CoreOperation::UpdateBroadcaster => multi(
                owner_only(),
                "updateBroadcasterApprovalWithMetaTx",
                "updateBroadcasterCancellationWithMetaTx",
            ),
            CoreOperation::WithdrawEth | CoreOperation::WithdrawToken => multi(
                owner_only(),
                "approveWithdrawalWithMetaTx",
                "cancelWithdrawalWithMetaTx",
            ),
            CoreOperation::UpdateRecovery => single("updateRecoveryRequestAndApprove"),
            CoreOperation::UpdateTimeLock => single("updateTimeLockRequestAndApprove"),
            CoreOperation::MintTokens => single("mintWithMetaTx"),
            CoreOperation::BurnTokens => single("burnWithMetaTx"),
        };

        OperationDefinition {
            id: OperationId::Core(self),
            name: row.name.to_string(),
            description: row.description.to_string(),
            operation_type: self.operation_type(),
            execution_selector: self.execution_selector(),
            workflow,
        }
    }
}

impl fmt::Display for CoreOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Action, Phase, WorkflowShape};
    use std::collections::HashSet;

    #[test]
    fn names_round_trip() {
        for op in CoreOperation::ALL {
            assert_eq!(CoreOperation::from_name(op.as_str()), Some(op));
        }
        assert_eq!(CoreOperation::from_name("transfer_ownership"), None);
    }

    #[test]
    fn operation_types_are_distinct() {
        let hashes: HashSet<B256> = CoreOperation::ALL
            .iter()
            .map(|op| op.operation_type())
            .collect();
        assert_eq!(hashes.len(), CoreOperation::ALL.len());
        assert_eq!(
            CoreOperation::TransferOwnership.operation_type(),
            keccak256("OWNERSHIP_TRANSFER")
        );
    }

    #[test]
    fn withdrawals_share_handlers_but_not_execution() {
        let eth = CoreOperation::WithdrawEth.definition();
        let token = CoreOperation::WithdrawToken.definition();
        assert_eq!(
            eth.handler(Action::Approve, Address::ZERO).unwrap(),
            token.handler(Action::Approve, Address::ZERO).unwrap()
        );
        assert_ne!(eth.execution_selector, token.execution_selector);
    }

    #[test]
    fn ownership_transfer_role_table() {
        let def = CoreOperation::TransferOwnership.definition();
        assert_eq!(def.shape(), WorkflowShape::MultiPhase);
        assert_eq!(
            def.required_roles(Phase::Request),
            Some(RoleRequirement::Single(Role::Recovery))
        );
        assert!(def.required_roles(Phase::Approve).unwrap().permits(Role::Owner));
        assert!(def
            .required_roles(Phase::Approve)
            .unwrap()
            .permits(Role::Recovery));
        assert_eq!(
            def.required_roles(Phase::Broadcast),
            Some(RoleRequirement::Single(Role::Broadcaster))
        );
        assert_eq!(def.required_roles(Phase::RequestAndApprove), None);
    }

    #[test]
    fn mint_encodes_execution_call() {
        let to = Address::repeat_byte(0x0a);
        let options = CoreOperation::MintTokens
            .encode_execution(&OperationArgs::Mint {
                to,
                amount: U256::from(1000u64),
            })
            .unwrap();
        assert_eq!(
            &options[..4],
            selector("executeMint(address,uint256)").as_slice()
        );
        assert_eq!(options.len(), 4 + 64);
    }

    #[test]
    fn mismatched_arguments_are_rejected() {
        let err = CoreOperation::MintTokens
            .encode_execution(&OperationArgs::NewOwner(Address::ZERO))
            .unwrap_err();
        assert!(matches!(err, RegistryError::ArgumentMismatch { .. }));
        assert!(CoreOperation::UpdateTimeLock
            .encode_execution(&OperationArgs::TimeLockPeriod(U256::ZERO))
            .is_err());
    }

    #[test]
    fn payment_details_follow_withdrawal_args() {
        let recipient = Address::repeat_byte(0x0b);
        let token = Address::repeat_byte(0x0c);
        let eth = OperationArgs::WithdrawEth {
            recipient,
            amount: U256::from(5u64),
        }
        .payment();
        assert_eq!(eth.native_token_amount, U256::from(5u64));
        assert_eq!(eth.erc20_token_address, Address::ZERO);

        let erc20 = OperationArgs::WithdrawToken {
            token,
            recipient,
            amount: U256::from(9u64),
        }
        .payment();
        assert_eq!(erc20.erc20_token_address, token);
        assert!(erc20.native_token_amount.is_zero());

        assert!(OperationArgs::NewOwner(recipient).payment().is_empty());
    }
}
