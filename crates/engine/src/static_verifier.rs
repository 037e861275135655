//! An in-memory contract.
//!
//! `StaticVerifier` implements [`Verifier`] and [`Network`] over plain
//! state: role holders, transaction records, per-signer nonces and a gas
//! price. It verifies meta-transactions the way the contract does
//! (broadcaster, deadline, chain, gas ceiling, handler for the entry
//! point, nonce, message hash, signature, role, record state) and applies
//! role effects when an operation executes. Record status only moves along
//! [`TxStatus::can_transition_to`]. A handful of knobs let tests steer it: the gas
//! price and chain id the "node" reports, how confirmations behave, a
//! forced revert reason and an alternative hash encoding.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;
use warden_core::eip712::hash_tx_record;
use warden_core::{
    can_execute_phase, keccak256, meta_tx_digest, recover_signer, Address, Bytes,
    ContractRoleSnapshot, CoreOperation, Eip712Domain, MetaTxParams, OperationDefinition,
    OperationId, OperationRegistry, Phase, TxParams, TxRecord, TxStatus, UnsignedMetaTransaction,
    WorkflowShape, B256, U256,
};

use crate::clock::Clock;
use crate::config::DomainConfig;
use crate::verifier::{
    EntryPoint, MetaTxCall, MetaTxParamsRequest, Network, NewOperationRequest, PendingTx,
    TxReceipt, Verifier, VerifierError,
};

/// How submitted transactions confirm.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfirmationMode {
    Immediate,
    /// Confirm after the given delay.
    Delayed(Duration),
    /// Never confirm.
    Never,
}

struct State {
    roles: ContractRoleSnapshot,
    network_chain_id: u64,
    gas_price: U256,
    records: BTreeMap<U256, TxRecord>,
    next_tx_id: U256,
    nonces: HashMap<Address, U256>,
    extra_types: Vec<(B256, String)>,
    confirmation: ConfirmationMode,
    alternative_hash: bool,
    revert_reason: Option<String>,
    submissions: usize,
    issued: Vec<B256>,
}

impl State {
    fn allocate_tx_id(&mut self) -> U256 {
        let id = self.next_tx_id;
        self.next_tx_id += U256::from(1u64);
        id
    }

    fn nonce(&self, signer: Address) -> U256 {
        self.nonces.get(&signer).copied().unwrap_or(U256::ZERO)
    }
}

pub struct StaticVerifier {
    contract: Address,
    domain: DomainConfig,
    registry: OperationRegistry,
    clock: Arc<dyn Clock>,
    state: Mutex<State>,
}

impl StaticVerifier {
    /// A contract with `roles`, the core operations and a node on the
    /// same chain reporting a 1 gwei gas price.
    pub fn new(roles: ContractRoleSnapshot, clock: Arc<dyn Clock>) -> Self {
        Self {
            contract: roles.contract,
            domain: DomainConfig::default(),
            registry: OperationRegistry::with_core_operations(),
            clock,
            state: Mutex::new(State {
                network_chain_id: roles.chain_id,
                roles,
                gas_price: U256::from(1_000_000_000u64),
                records: BTreeMap::new(),
                next_tx_id: U256::from(1u64),
                nonces: HashMap::new(),
                extra_types: Vec::new(),
                confirmation: ConfirmationMode::Immediate,
                alternative_hash: false,
                revert_reason: None,
                submissions: 0,
                issued: Vec::new(),
            }),
        }
    }

    pub fn with_domain(mut self, domain: DomainConfig) -> Self {
        self.domain = domain;
        self
    }

    /// Replace the operations this contract understands.
    pub fn with_registry(mut self, registry: OperationRegistry) -> Self {
        self.registry = registry;
        self
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    // ── Knobs ────────────────────────────────────────────────────────────────

    pub fn set_gas_price(&self, price: U256) {
        self.state().gas_price = price;
    }

    /// Chain id the node reports, independent of the contract's own.
    pub fn set_network_chain_id(&self, chain_id: u64) {
        self.state().network_chain_id = chain_id;
    }

    pub fn set_confirmation(&self, mode: ConfirmationMode) {
        self.state().confirmation = mode;
    }

    /// Hash payloads with an encoding the client does not reproduce.
    pub fn set_alternative_hash(&self, enabled: bool) {
        self.state().alternative_hash = enabled;
    }

    /// Make every meta-transaction revert with `reason`.
    pub fn set_revert_reason(&self, reason: Option<String>) {
        self.state().revert_reason = reason;
    }

    /// Report an extra operation type from `supported_operation_types`.
    pub fn support_operation_type(&self, operation_type: B256, name: impl Into<String>) {
        self.state().extra_types.push((operation_type, name.into()));
    }

    // ── Inspection ───────────────────────────────────────────────────────────

    pub fn roles(&self) -> ContractRoleSnapshot {
        self.state().roles.clone()
    }

    pub fn record(&self, tx_id: U256) -> Option<TxRecord> {
        self.state().records.get(&tx_id).cloned()
    }

    pub fn nonce_of(&self, signer: Address) -> U256 {
        self.state().nonce(signer)
    }

    /// Transactions submitted so far, direct and meta.
    pub fn submissions(&self) -> usize {
        self.state().submissions
    }

    /// Message hashes handed out by the payload builders, in order.
    pub fn issued_messages(&self) -> Vec<B256> {
        self.state().issued.clone()
    }

    // ── Internals ────────────────────────────────────────────────────────────

    fn message_hash(&self, unsigned: &UnsignedMetaTransaction, alternative: bool) -> B256 {
        let domain = Eip712Domain {
            name: self.domain.name.clone(),
            version: self.domain.version.clone(),
            chain_id: unsigned.params.chain_id,
            verifying_contract: self.contract,
        };
        let digest = meta_tx_digest(&domain, unsigned);
        if alternative {
            keccak256([digest.as_slice(), b"packed"].concat())
        } else {
            digest
        }
    }

    fn unsigned(
        &self,
        state: &mut State,
        tx_record: TxRecord,
        params: MetaTxParams,
    ) -> UnsignedMetaTransaction {
        let mut unsigned = UnsignedMetaTransaction {
            tx_record,
            params,
            message: B256::ZERO,
            data: Bytes::new(),
        };
        unsigned.message = self.message_hash(&unsigned, state.alternative_hash);
        state.issued.push(unsigned.message);
        unsigned
    }

    fn definition(&self, operation_type: &B256) -> Result<Arc<OperationDefinition>, String> {
        self.registry
            .resolve_by_hash(operation_type)
            .map_err(|_| format!("unsupported operation type {}", operation_type))
    }

    fn pending(
        &self,
        state: &mut State,
        seed: B256,
        outcome: Result<Option<U256>, String>,
    ) -> PendingTx {
        state.submissions += 1;
        let hash = keccak256([&(state.submissions as u64).to_be_bytes()[..], seed.as_slice()].concat());
        let mode = state.confirmation;
        PendingTx::new(hash, async move {
            match mode {
                ConfirmationMode::Immediate => {}
                ConfirmationMode::Delayed(delay) => tokio::time::sleep(delay).await,
                ConfirmationMode::Never => std::future::pending::<()>().await,
            }
            match outcome {
                Ok(tx_id) => Ok(TxReceipt { hash, tx_id }),
                Err(_) => Err(VerifierError::Reverted(format!(
                    "transaction {} reverted",
                    hash
                ))),
            }
        })
    }

    /// Contract-side checks for a meta-transaction. `Err` is the revert
    /// reason.
    fn check_meta_tx(
        &self,
        state: &State,
        call: &MetaTxCall,
        from: Address,
    ) -> Result<Arc<OperationDefinition>, String> {
        let unsigned = call.signed.payload();
        let params = &unsigned.params;

        if from != state.roles.broadcaster {
            return Err("caller is not the broadcaster".to_string());
        }
        if U256::from(self.clock.now()) > params.deadline {
            return Err("meta-transaction expired".to_string());
        }
        if params.chain_id != U256::from(state.roles.chain_id) {
            return Err("chain id mismatch".to_string());
        }
        if state.gas_price > params.max_gas_price {
            return Err("gas price exceeds signed maximum".to_string());
        }
        let definition = self.definition(&unsigned.tx_record.params.operation_type)?;
        let expected = definition
            .handler(call.entry.action(), self.contract)
            .map_err(|_| format!("{} has no {} entry point", definition.id, call.entry.action()))?;
        if call.handler != expected
            || params.handler_contract != expected.contract
            || params.handler_selector != expected.selector
        {
            return Err("handler mismatch".to_string());
        }
        if params.nonce != state.nonce(params.signer) {
            return Err("invalid nonce".to_string());
        }
        if unsigned.message != self.message_hash(unsigned, state.alternative_hash) {
            return Err("message hash mismatch".to_string());
        }
        match recover_signer(unsigned.message, call.signed.signature()) {
            Ok(recovered) if recovered == params.signer => {}
            _ => return Err("invalid signature".to_string()),
        }

        let phase = match call.entry {
            EntryPoint::MultiPhaseApprove => Phase::MetaApprove,
            EntryPoint::MultiPhaseCancel => Phase::MetaCancel,
            EntryPoint::SinglePhaseRequestAndApprove => Phase::RequestAndApprove,
        };
        if !can_execute_phase(&definition, phase, params.signer, &state.roles) {
            return Err(format!("signer lacks the role for {}", phase));
        }

        let tx_id = unsigned.tx_id();
        match call.entry {
            EntryPoint::SinglePhaseRequestAndApprove => {
                if state.records.contains_key(&tx_id) {
                    return Err(format!("transaction {} already exists", tx_id));
                }
                if unsigned.tx_record.status != TxStatus::Pending {
                    return Err(format!("transaction {} is not pending", tx_id));
                }
            }
            EntryPoint::MultiPhaseApprove | EntryPoint::MultiPhaseCancel => {
                match state.records.get(&tx_id) {
                    Some(record)
                        if record.status == TxStatus::Pending
                            && record.params.operation_type == definition.operation_type => {}
                    _ => return Err(format!("transaction {} is not pending", tx_id)),
                }
            }
        }

        if let Some(reason) = &state.revert_reason {
            return Err(reason.clone());
        }
        Ok(definition)
    }

    /// Move `tx_id` to `next`. Effects apply only when it completes.
    fn settle_record(&self, state: &mut State, tx_id: U256, next: TxStatus) -> Result<(), String> {
        let record = state
            .records
            .get_mut(&tx_id)
            .ok_or_else(|| format!("unknown transaction {}", tx_id))?;
        record.transition(next).map_err(|e| e.to_string())?;
        if next == TxStatus::Completed {
            let record = record.clone();
            self.apply_effects(state, &record);
        }
        Ok(())
    }

    fn apply_effects(&self, state: &mut State, record: &TxRecord) {
        let Ok(definition) = self.registry.resolve_by_hash(&record.params.operation_type) else {
            return;
        };
        let OperationId::Core(op) = definition.id else {
            return;
        };
        let words: Vec<&[u8]> = record
            .params
            .execution_options
            .get(4..)
            .unwrap_or_default()
            .chunks_exact(32)
            .collect();
        let Some(first) = words.first() else {
            return;
        };
        let address = Address::from_slice(&first[12..]);
        match op {
            CoreOperation::TransferOwnership => state.roles.owner = address,
            CoreOperation::UpdateBroadcaster => state.roles.broadcaster = address,
            CoreOperation::UpdateRecovery => state.roles.recovery = address,
            CoreOperation::UpdateTimeLock => {
                state.roles.time_lock_period = U256::from_be_slice(first).saturating_to::<u64>()
            }
            _ => {}
        }
        debug!(tx_id = %record.tx_id, operation = %op, "applied operation effects");
    }

    fn new_record(&self, tx_id: U256, release_time: u64, request: NewOperationRequest) -> TxRecord {
        let mut record = TxRecord {
            tx_id,
            release_time: U256::from(release_time),
            status: TxStatus::Pending,
            params: TxParams {
                requester: request.requester,
                target: request.target,
                value: request.value,
                gas_limit: request.gas_limit,
                operation_type: request.operation_type,
                execution_type: request.execution_type,
                execution_options: request.execution_options,
            },
            message: B256::ZERO,
            result: Bytes::new(),
            payment: request.payment,
        };
        record.message = hash_tx_record(&record);
        record
    }
}

#[async_trait]
impl Verifier for StaticVerifier {
    fn contract(&self) -> Address {
        self.contract
    }

    async fn role_snapshot(&self) -> Result<ContractRoleSnapshot, VerifierError> {
        Ok(self.roles())
    }

    async fn transaction(&self, tx_id: U256) -> Result<TxRecord, VerifierError> {
        self.record(tx_id)
            .ok_or_else(|| VerifierError::Rejected(format!("unknown transaction {}", tx_id)))
    }

    async fn pending_transactions(&self) -> Result<Vec<TxRecord>, VerifierError> {
        Ok(self
            .state()
            .records
            .values()
            .filter(|r| r.status == TxStatus::Pending)
            .cloned()
            .collect())
    }

    async fn nonce(&self, signer: Address) -> Result<U256, VerifierError> {
        Ok(self.nonce_of(signer))
    }

    async fn supported_operation_types(&self) -> Result<Vec<(B256, String)>, VerifierError> {
        let mut types: Vec<(B256, String)> = self
            .registry
            .iter()
            .map(|d| (d.operation_type, d.id.to_string()))
            .collect();
        types.extend(self.state().extra_types.iter().cloned());
        Ok(types)
    }

    async fn mint_meta_tx_params(
        &self,
        request: MetaTxParamsRequest,
    ) -> Result<MetaTxParams, VerifierError> {
        let state = self.state();
        Ok(MetaTxParams {
            chain_id: U256::from(state.roles.chain_id),
            nonce: state.nonce(request.signer),
            handler_contract: request.handler.contract,
            handler_selector: request.handler.selector,
            deadline: request.deadline,
            max_gas_price: request.max_gas_price,
            signer: request.signer,
        })
    }

    async fn build_new_operation(
        &self,
        request: NewOperationRequest,
        params: MetaTxParams,
    ) -> Result<UnsignedMetaTransaction, VerifierError> {
        self.definition(&request.operation_type)
            .map_err(VerifierError::Rejected)?;
        let mut state = self.state();
        let tx_id = state.allocate_tx_id();
        let release = self.clock.now() + state.roles.time_lock_period;
        let record = self.new_record(tx_id, release, request);
        Ok(self.unsigned(&mut state, record, params))
    }

    async fn build_existing_operation(
        &self,
        tx_id: U256,
        params: MetaTxParams,
    ) -> Result<UnsignedMetaTransaction, VerifierError> {
        let mut state = self.state();
        let record = match state.records.get(&tx_id) {
            Some(record) if record.status == TxStatus::Pending => record.clone(),
            Some(record) => {
                return Err(VerifierError::Rejected(format!(
                    "transaction {} is {}",
                    tx_id, record.status
                )))
            }
            None => {
                return Err(VerifierError::Rejected(format!(
                    "unknown transaction {}",
                    tx_id
                )))
            }
        };
        Ok(self.unsigned(&mut state, record, params))
    }

    async fn request(
        &self,
        request: NewOperationRequest,
        from: Address,
    ) -> Result<PendingTx, VerifierError> {
        let definition = self
            .definition(&request.operation_type)
            .map_err(VerifierError::Rejected)?;
        if definition.shape() != WorkflowShape::MultiPhase {
            return Err(VerifierError::Rejected(format!(
                "{} cannot be requested on its own",
                definition.id
            )));
        }
        let mut state = self.state();
        if !can_execute_phase(&definition, Phase::Request, from, &state.roles) {
            return Err(VerifierError::Rejected(format!(
                "{} may not request {}",
                from, definition.id
            )));
        }
        let tx_id = state.allocate_tx_id();
        let release = self.clock.now() + state.roles.time_lock_period;
        let record = self.new_record(tx_id, release, request);
        let seed = record.message;
        state.records.insert(tx_id, record);
        Ok(self.pending(&mut state, seed, Ok(Some(tx_id))))
    }

    async fn approve(
        &self,
        operation_type: B256,
        tx_id: U256,
        from: Address,
    ) -> Result<PendingTx, VerifierError> {
        let definition = self
            .definition(&operation_type)
            .map_err(VerifierError::Rejected)?;
        let mut state = self.state();
        let record = pending_record(&state, tx_id, operation_type)?;
        if !can_execute_phase(&definition, Phase::Approve, from, &state.roles) {
            return Err(VerifierError::Rejected(format!(
                "{} may not approve {}",
                from, definition.id
            )));
        }
        if U256::from(self.clock.now()) < record.release_time {
            return Err(VerifierError::Rejected(
                "time lock has not elapsed".to_string(),
            ));
        }
        self.settle_record(&mut state, tx_id, TxStatus::Completed)
            .map_err(VerifierError::Rejected)?;
        Ok(self.pending(&mut state, record.message, Ok(Some(tx_id))))
    }

    async fn cancel(
        &self,
        operation_type: B256,
        tx_id: U256,
        from: Address,
    ) -> Result<PendingTx, VerifierError> {
        let definition = self
            .definition(&operation_type)
            .map_err(VerifierError::Rejected)?;
        let mut state = self.state();
        let record = pending_record(&state, tx_id, operation_type)?;
        if !can_execute_phase(&definition, Phase::Cancel, from, &state.roles) {
            return Err(VerifierError::Rejected(format!(
                "{} may not cancel {}",
                from, definition.id
            )));
        }
        self.settle_record(&mut state, tx_id, TxStatus::Cancelled)
            .map_err(VerifierError::Rejected)?;
        Ok(self.pending(&mut state, record.message, Ok(Some(tx_id))))
    }

    async fn submit_meta_tx(
        &self,
        call: MetaTxCall,
        from: Address,
    ) -> Result<PendingTx, VerifierError> {
        let mut state = self.state();
        let unsigned = call.signed.payload();
        let tx_id = unsigned.tx_id();

        let outcome = match self.check_meta_tx(&state, &call, from) {
            Ok(_) => {
                let creates = call.entry == EntryPoint::SinglePhaseRequestAndApprove;
                let next_status = match call.entry {
                    EntryPoint::MultiPhaseCancel => TxStatus::Cancelled,
                    _ => TxStatus::Completed,
                };
                if creates {
                    state.records.insert(tx_id, unsigned.tx_record.clone());
                }
                match self.settle_record(&mut state, tx_id, next_status) {
                    Ok(()) => {
                        let signer = unsigned.params.signer;
                        let next = state.nonce(signer) + U256::from(1u64);
                        state.nonces.insert(signer, next);
                        Ok(Some(tx_id))
                    }
                    // Reverts leave no trace.
                    Err(reason) => {
                        if creates {
                            state.records.remove(&tx_id);
                        }
                        Err(reason)
                    }
                }
            }
            Err(reason) => {
                debug!(tx_id = %tx_id, reason = %reason, "meta-transaction will revert");
                Err(reason)
            }
        };
        Ok(self.pending(&mut state, unsigned.message, outcome))
    }

    async fn simulate_meta_tx(
        &self,
        call: &MetaTxCall,
        from: Address,
    ) -> Result<(), VerifierError> {
        let state = self.state();
        self.check_meta_tx(&state, call, from)
            .map(|_| ())
            .map_err(VerifierError::Reverted)
    }
}

fn pending_record(state: &State, tx_id: U256, operation_type: B256) -> Result<TxRecord, VerifierError> {
    match state.records.get(&tx_id) {
        Some(record)
            if record.status == TxStatus::Pending
                && record.params.operation_type == operation_type =>
        {
            Ok(record.clone())
        }
        _ => Err(VerifierError::Rejected(format!(
            "transaction {} is not pending",
            tx_id
        ))),
    }
}

#[async_trait]
impl Network for StaticVerifier {
    async fn chain_id(&self) -> Result<u64, VerifierError> {
        Ok(self.state().network_chain_id)
    }

    async fn gas_price(&self) -> Result<U256, VerifierError> {
        Ok(self.state().gas_price)
    }
}
