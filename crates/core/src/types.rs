//! Operation data model: roles, phases, transaction records and
//! meta-transaction payloads.
//!
//! Field names serialize in camelCase so the JSON form lines up with the
//! verifier's struct layout. Every `uint256` goes through
//! [`crate::codec::u256_dec`] and is carried as a decimal string.

use std::fmt;

use alloy_primitives::{Address, Bytes, Selector, B256, U256};
use serde::{Deserialize, Serialize};

use crate::codec::u256_dec;
use crate::error::StatusTransitionError;

// ──────────────────────────────────────────────
// Roles and phases
// ──────────────────────────────────────────────

/// A privileged role held by exactly one address per contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Owner,
    Broadcaster,
    Recovery,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::Owner => "owner",
            Role::Broadcaster => "broadcaster",
            Role::Recovery => "recovery",
        }
    }

    /// The address currently holding this role in `snapshot`.
    pub fn holder(self, snapshot: &ContractRoleSnapshot) -> Address {
        match self {
            Role::Owner => snapshot.owner,
            Role::Broadcaster => snapshot.broadcaster,
            Role::Recovery => snapshot.recovery,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Role(s) required for a phase: a single role or any of a list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoleRequirement {
    Single(Role),
    AnyOf(Vec<Role>),
}

impl RoleRequirement {
    pub fn roles(&self) -> &[Role] {
        match self {
            RoleRequirement::Single(role) => std::slice::from_ref(role),
            RoleRequirement::AnyOf(roles) => roles,
        }
    }

    pub fn permits(&self, role: Role) -> bool {
        self.roles().contains(&role)
    }
}

impl fmt::Display for RoleRequirement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.roles().iter().map(|r| r.as_str()).collect();
        f.write_str(&names.join(" | "))
    }
}

/// A step of an operation's workflow that some role may perform.
///
/// The `Meta*` phases and `RequestAndApprove` are signing phases: the role
/// endorses a payload off-chain and the broadcaster submits it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Request,
    Approve,
    Cancel,
    MetaApprove,
    MetaCancel,
    RequestAndApprove,
    Broadcast,
}

impl Phase {
    pub fn as_str(self) -> &'static str {
        match self {
            Phase::Request => "request",
            Phase::Approve => "approve",
            Phase::Cancel => "cancel",
            Phase::MetaApprove => "meta_approve",
            Phase::MetaCancel => "meta_cancel",
            Phase::RequestAndApprove => "request_and_approve",
            Phase::Broadcast => "broadcast",
        }
    }

    pub fn is_cancellation(self) -> bool {
        matches!(self, Phase::Cancel | Phase::MetaCancel)
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a signed meta-transaction asks the contract to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    Approve,
    Cancel,
    RequestAndApprove,
}

impl Action {
    pub fn as_str(self) -> &'static str {
        match self {
            Action::Approve => "approve",
            Action::Cancel => "cancel",
            Action::RequestAndApprove => "request_and_approve",
        }
    }

    /// The phase whose role table governs who may sign this action.
    pub fn signing_phase(self) -> Phase {
        match self {
            Action::Approve => Phase::MetaApprove,
            Action::Cancel => Phase::MetaCancel,
            Action::RequestAndApprove => Phase::RequestAndApprove,
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Action {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "approve" => Ok(Action::Approve),
            "cancel" => Ok(Action::Cancel),
            "request_and_approve" => Ok(Action::RequestAndApprove),
            other => Err(format!("unknown action '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum WorkflowShape {
    MultiPhase,
    SinglePhase,
}

impl WorkflowShape {
    pub fn as_str(self) -> &'static str {
        match self {
            WorkflowShape::MultiPhase => "multi-phase",
            WorkflowShape::SinglePhase => "single-phase",
        }
    }

    /// Actions a signed payload of this shape may carry.
    pub fn supports(self, action: Action) -> bool {
        match self {
            WorkflowShape::MultiPhase => matches!(action, Action::Approve | Action::Cancel),
            WorkflowShape::SinglePhase => action == Action::RequestAndApprove,
        }
    }
}

impl fmt::Display for WorkflowShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ──────────────────────────────────────────────
// Contract state
// ──────────────────────────────────────────────

/// Role assignments and time-lock settings read from a contract.
///
/// Snapshots go stale as soon as a rotation completes; callers re-read
/// one before every authorization decision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContractRoleSnapshot {
    pub contract: Address,
    pub owner: Address,
    pub broadcaster: Address,
    pub recovery: Address,
    /// Time-lock period in seconds.
    pub time_lock_period: u64,
    pub chain_id: u64,
}

impl ContractRoleSnapshot {
    /// Roles held by `address`, in declaration order.
    pub fn roles_of(&self, address: Address) -> Vec<Role> {
        [Role::Owner, Role::Broadcaster, Role::Recovery]
            .into_iter()
            .filter(|role| role.holder(self) == address)
            .collect()
    }
}

/// Lifecycle status of a transaction record.
///
/// Encoded as the verifier's `uint8` discriminant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum TxStatus {
    Undefined = 0,
    Pending = 1,
    Cancelled = 2,
    Completed = 3,
    Failed = 4,
    Rejected = 5,
}

impl TxStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            TxStatus::Undefined => "undefined",
            TxStatus::Pending => "pending",
            TxStatus::Cancelled => "cancelled",
            TxStatus::Completed => "completed",
            TxStatus::Failed => "failed",
            TxStatus::Rejected => "rejected",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TxStatus::Cancelled | TxStatus::Completed | TxStatus::Failed | TxStatus::Rejected
        )
    }

    /// Status only moves forward: undefined -> pending -> one terminal state.
    pub fn can_transition_to(self, next: TxStatus) -> bool {
        match self {
            TxStatus::Undefined => next == TxStatus::Pending,
            TxStatus::Pending => next.is_terminal(),
            _ => false,
        }
    }
}

impl fmt::Display for TxStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<TxStatus> for u8 {
    fn from(status: TxStatus) -> u8 {
        status as u8
    }
}

impl TryFrom<u8> for TxStatus {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(TxStatus::Undefined),
            1 => Ok(TxStatus::Pending),
            2 => Ok(TxStatus::Cancelled),
            3 => Ok(TxStatus::Completed),
            4 => Ok(TxStatus::Failed),
            5 => Ok(TxStatus::Rejected),
            other => Err(format!("invalid transaction status {}", other)),
        }
    }
}

/// How the contract executes a record once approved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum ExecutionType {
    None = 0,
    /// `executionOptions` is a selector followed by ABI-encoded arguments.
    Standard = 1,
    /// `executionOptions` is opaque calldata forwarded as-is.
    Raw = 2,
}

impl From<ExecutionType> for u8 {
    fn from(kind: ExecutionType) -> u8 {
        kind as u8
    }
}

impl TryFrom<u8> for ExecutionType {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(ExecutionType::None),
            1 => Ok(ExecutionType::Standard),
            2 => Ok(ExecutionType::Raw),
            other => Err(format!("invalid execution type {}", other)),
        }
    }
}

// ──────────────────────────────────────────────
// Transaction records
// ──────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TxParams {
    pub requester: Address,
    pub target: Address,
    #[serde(with = "u256_dec")]
    pub value: U256,
    #[serde(with = "u256_dec")]
    pub gas_limit: U256,
    pub operation_type: B256,
    pub execution_type: ExecutionType,
    pub execution_options: Bytes,
}

/// Funds released when a record completes (vault withdrawals).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentDetails {
    pub recipient: Address,
    #[serde(with = "u256_dec")]
    pub native_token_amount: U256,
    pub erc20_token_address: Address,
    #[serde(with = "u256_dec")]
    pub erc20_token_amount: U256,
}

impl PaymentDetails {
    pub fn is_empty(&self) -> bool {
        self.native_token_amount.is_zero() && self.erc20_token_amount.is_zero()
    }
}

/// A pending (or historical) operation as the contract stores it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TxRecord {
    #[serde(with = "u256_dec")]
    pub tx_id: U256,
    /// Unix seconds after which the record may be approved.
    #[serde(with = "u256_dec")]
    pub release_time: U256,
    pub status: TxStatus,
    pub params: TxParams,
    pub message: B256,
    pub result: Bytes,
    pub payment: PaymentDetails,
}

impl TxRecord {
    /// Move the record to `next`, refusing any transition
    /// [`TxStatus::can_transition_to`] does not allow.
    pub fn transition(&mut self, next: TxStatus) -> Result<(), StatusTransitionError> {
        if !self.status.can_transition_to(next) {
            return Err(StatusTransitionError {
                tx_id: self.tx_id,
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        Ok(())
    }
}

// ──────────────────────────────────────────────
// Meta-transactions
// ──────────────────────────────────────────────

/// Verifier-minted parameters that scope a signature.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetaTxParams {
    #[serde(with = "u256_dec")]
    pub chain_id: U256,
    #[serde(with = "u256_dec")]
    pub nonce: U256,
    pub handler_contract: Address,
    pub handler_selector: Selector,
    /// Unix seconds; the payload is dead after this instant.
    #[serde(with = "u256_dec")]
    pub deadline: U256,
    #[serde(with = "u256_dec")]
    pub max_gas_price: U256,
    pub signer: Address,
}

/// A payload ready to be signed. `message` is the hash the verifier will
/// recompute on-chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnsignedMetaTransaction {
    pub tx_record: TxRecord,
    pub params: MetaTxParams,
    pub message: B256,
    pub data: Bytes,
}

impl UnsignedMetaTransaction {
    pub fn tx_id(&self) -> U256 {
        self.tx_record.tx_id
    }

    pub fn signer(&self) -> Address {
        self.params.signer
    }
}

/// An endorsed payload. Immutable: re-signing means building a fresh
/// unsigned payload with a new nonce and deadline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedMetaTransaction {
    #[serde(flatten)]
    payload: UnsignedMetaTransaction,
    signature: Bytes,
}

impl SignedMetaTransaction {
    pub fn new(payload: UnsignedMetaTransaction, signature: Bytes) -> Self {
        Self { payload, signature }
    }

    pub fn payload(&self) -> &UnsignedMetaTransaction {
        &self.payload
    }

    pub fn signature(&self) -> &Bytes {
        &self.signature
    }

    pub fn tx_id(&self) -> U256 {
        self.payload.tx_id()
    }

    pub fn deadline(&self) -> U256 {
        self.payload.params.deadline
    }

    pub fn chain_id(&self) -> U256 {
        self.payload.params.chain_id
    }

    pub fn max_gas_price(&self) -> U256 {
        self.payload.params.max_gas_price
    }

    pub fn into_parts(self) -> (UnsignedMetaTransaction, Bytes) {
        (self.payload, self.signature)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_only_moves_forward() {
        assert!(TxStatus::Undefined.can_transition_to(TxStatus::Pending));
        assert!(TxStatus::Pending.can_transition_to(TxStatus::Completed));
        assert!(TxStatus::Pending.can_transition_to(TxStatus::Cancelled));
        assert!(TxStatus::Pending.can_transition_to(TxStatus::Failed));
        assert!(TxStatus::Pending.can_transition_to(TxStatus::Rejected));
        assert!(!TxStatus::Pending.can_transition_to(TxStatus::Undefined));
        assert!(!TxStatus::Completed.can_transition_to(TxStatus::Pending));
        assert!(!TxStatus::Cancelled.can_transition_to(TxStatus::Completed));
    }

    #[test]
    fn terminal_record_refuses_further_transitions() {
        let mut record = TxRecord {
            tx_id: U256::from(3u64),
            release_time: U256::ZERO,
            status: TxStatus::Pending,
            params: TxParams {
                requester: Address::ZERO,
                target: Address::ZERO,
                value: U256::ZERO,
                gas_limit: U256::ZERO,
                operation_type: B256::ZERO,
                execution_type: ExecutionType::Standard,
                execution_options: Bytes::new(),
            },
            message: B256::ZERO,
            result: Bytes::new(),
            payment: PaymentDetails::default(),
        };

        record.transition(TxStatus::Cancelled).unwrap();
        assert_eq!(record.status, TxStatus::Cancelled);

        let err = record.transition(TxStatus::Completed).unwrap_err();
        assert_eq!(err.from, TxStatus::Cancelled);
        assert_eq!(err.to, TxStatus::Completed);
        assert_eq!(record.status, TxStatus::Cancelled);
        assert_eq!(
            err.to_string(),
            "transaction 3 cannot move from cancelled to completed"
        );
    }

    #[test]
    fn status_serializes_as_discriminant() {
        let json = serde_json::to_string(&TxStatus::Cancelled).unwrap();
        assert_eq!(json, "2");
        let back: TxStatus = serde_json::from_str("5").unwrap();
        assert_eq!(back, TxStatus::Rejected);
        assert!(serde_json::from_str::<TxStatus>("9").is_err());
    }

    #[test]
    fn shape_supports_matching_actions_only() {
        assert!(WorkflowShape::MultiPhase.supports(Action::Approve));
        assert!(WorkflowShape::MultiPhase.supports(Action::Cancel));
        assert!(!WorkflowShape::MultiPhase.supports(Action::RequestAndApprove));
        assert!(WorkflowShape::SinglePhase.supports(Action::RequestAndApprove));
        assert!(!WorkflowShape::SinglePhase.supports(Action::Cancel));
    }

    #[test]
    fn roles_of_reports_every_held_role() {
        let shared = Address::repeat_byte(0x11);
        let snapshot = ContractRoleSnapshot {
            contract: Address::repeat_byte(0xcc),
            owner: shared,
            broadcaster: Address::repeat_byte(0x22),
            recovery: shared,
            time_lock_period: 60,
            chain_id: 1,
        };
        assert_eq!(snapshot.roles_of(shared), vec![Role::Owner, Role::Recovery]);
        assert!(snapshot.roles_of(Address::ZERO).is_empty());
    }

    #[test]
    fn action_parses_from_snake_case() {
        assert_eq!("approve".parse::<Action>().unwrap(), Action::Approve);
        assert_eq!(
            "request_and_approve".parse::<Action>().unwrap(),
            Action::RequestAndApprove
        );
        assert!("execute".parse::<Action>().is_err());
    }
}
