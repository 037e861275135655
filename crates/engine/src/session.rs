//! Per-contract workflow session.
//!
//! A [`WardenSession`] binds one verifier (one contract) to a registry, an
//! optional signer and network, a transaction store and a clock. It is the
//! surface callers use: resolve operations, check permissions, build and
//! sign payloads, dispatch them and manage what is stored.
//!
//! Every authorization decision re-reads the role snapshot first, so a
//! rotation that completed since the last call is always observed.

use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, Mutex};

use tokio::sync::{broadcast, RwLock};
use tracing::{info, warn};
use warden_core::{
    can_execute_phase, time_lock_progress, Action, Address, CanonicalCodec, ContractRoleSnapshot,
    OperationDefinition, OperationId, OperationPlugin, OperationRegistry, Phase, RoleRequirement,
    SignedMetaTransaction, TxRecord, B256, U256,
};
use warden_storage::{
    EntryMetadata, EntryPatch, EntryStatus, StorageError, StoreEvent, StoredTransactionEntry,
    TransactionStore,
};

use crate::builder::{
    new_operation_request, MetaTxBuilder, MetaTxSubject, NewOperation, SigningOptions, SigningScheme,
};
use crate::clock::{Clock, SystemClock};
use crate::config::WardenConfig;
use crate::dispatcher::{DispatchOutcome, DispatchReceipt, Dispatcher};
use crate::error::WardenError;
use crate::signer::Signer;
use crate::verifier::{Network, PendingTx, Verifier, VerifierError};

/// A signed payload, as returned by [`WardenSession::build_and_sign`].
#[derive(Debug, Clone)]
pub struct SignedPayload {
    pub signed: SignedMetaTransaction,
    pub scheme: SigningScheme,
    /// The store row written for it.
    pub entry: StoredTransactionEntry,
}

/// A pending record with its registry identity and time-lock progress.
#[derive(Debug, Clone)]
pub struct PendingOperation {
    pub record: TxRecord,
    /// `None` when the record's operation type is not registered.
    pub operation: Option<OperationId>,
    pub progress: f64,
}

type FlightKey = (OperationId, Action, Option<U256>);

/// Marks a (operation, action, tx id) as in flight until dropped.
struct FlightGuard {
    keys: Arc<Mutex<HashSet<FlightKey>>>,
    key: FlightKey,
}

impl Drop for FlightGuard {
    fn drop(&mut self) {
        let mut keys = self.keys.lock().unwrap_or_else(|p| p.into_inner());
        keys.remove(&self.key);
    }
}

pub struct WardenSession {
    registry: RwLock<OperationRegistry>,
    verifier: Arc<dyn Verifier>,
    network: Option<Arc<dyn Network>>,
    signer: Option<Arc<dyn Signer>>,
    account: Option<Address>,
    store: Arc<dyn TransactionStore>,
    clock: Arc<dyn Clock>,
    builder: MetaTxBuilder,
    dispatcher: Dispatcher,
    in_flight: Arc<Mutex<HashSet<FlightKey>>>,
}

pub struct SessionBuilder {
    verifier: Arc<dyn Verifier>,
    store: Arc<dyn TransactionStore>,
    config: WardenConfig,
    registry: Option<OperationRegistry>,
    network: Option<Arc<dyn Network>>,
    signer: Option<Arc<dyn Signer>>,
    account: Option<Address>,
    clock: Option<Arc<dyn Clock>>,
}

impl SessionBuilder {
    pub fn config(mut self, config: WardenConfig) -> Self {
        self.config = config;
        self
    }

    /// Defaults to a registry with the core operations.
    pub fn registry(mut self, registry: OperationRegistry) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn network(mut self, network: Arc<dyn Network>) -> Self {
        self.network = Some(network);
        self
    }

    pub fn signer(mut self, signer: Arc<dyn Signer>) -> Self {
        self.signer = Some(signer);
        self
    }

    /// Connected address for direct calls and dispatch. Defaults to the
    /// signer's address.
    pub fn account(mut self, account: Address) -> Self {
        self.account = Some(account);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn build(self) -> WardenSession {
        WardenSession {
            registry: RwLock::new(
                self.registry
                    .unwrap_or_else(OperationRegistry::with_core_operations),
            ),
            verifier: self.verifier,
            network: self.network,
            signer: self.signer,
            account: self.account,
            store: self.store,
            clock: self.clock.unwrap_or_else(|| Arc::new(SystemClock)),
            builder: MetaTxBuilder::new(self.config.domain.clone(), self.config.metatx.clone()),
            dispatcher: Dispatcher::new(self.config.dispatch.confirmation_timeout()),
            in_flight: Arc::new(Mutex::new(HashSet::new())),
        }
    }
}

impl WardenSession {
    pub fn builder(verifier: Arc<dyn Verifier>, store: Arc<dyn TransactionStore>) -> SessionBuilder {
        SessionBuilder {
            verifier,
            store,
            config: WardenConfig::default(),
            registry: None,
            network: None,
            signer: None,
            account: None,
            clock: None,
        }
    }

    pub fn contract(&self) -> Address {
        self.verifier.contract()
    }

    fn account(&self) -> Result<Address, WardenError> {
        self.account
            .or_else(|| self.signer.as_ref().map(|s| s.address()))
            .ok_or(WardenError::MissingSigner)
    }

    fn claim(
        &self,
        operation: &OperationId,
        action: Action,
        tx_id: Option<U256>,
    ) -> Result<FlightGuard, WardenError> {
        let key = (operation.clone(), action, tx_id);
        let mut keys = self.in_flight.lock().unwrap_or_else(|p| p.into_inner());
        if !keys.insert(key.clone()) {
            return Err(WardenError::Busy {
                operation: operation.clone(),
                action,
            });
        }
        Ok(FlightGuard {
            keys: Arc::clone(&self.in_flight),
            key,
        })
    }

    // ── Registry ─────────────────────────────────────────────────────────────

    pub async fn resolve_operation(
        &self,
        operation: &OperationId,
    ) -> Result<Arc<OperationDefinition>, WardenError> {
        Ok(self.registry.read().await.resolve(operation)?)
    }

    pub async fn resolve_operation_type(
        &self,
        operation_type: &B256,
    ) -> Result<Arc<OperationDefinition>, WardenError> {
        Ok(self.registry.read().await.resolve_by_hash(operation_type)?)
    }

    pub async fn operations(&self) -> Vec<Arc<OperationDefinition>> {
        self.registry.read().await.iter().cloned().collect()
    }

    pub async fn register_plugin(&self, plugin: &dyn OperationPlugin) -> Result<usize, WardenError> {
        let count = self.registry.write().await.register_plugin(plugin).await?;
        info!(plugin = plugin.name(), count, "registered plug-in operations");
        Ok(count)
    }

    /// Cross-check the registry against the contract's operation types.
    /// Returns the types the contract reports that are not registered.
    pub async fn sync_supported_operations(&self) -> Result<Vec<(B256, String)>, WardenError> {
        let reported = self
            .verifier
            .supported_operation_types()
            .await
            .map_err(WardenError::Verifier)?;
        let registry = self.registry.read().await;
        let unknown: Vec<(B256, String)> = reported
            .into_iter()
            .filter(|(hash, _)| !registry.contains_hash(hash))
            .collect();
        for (hash, name) in &unknown {
            warn!(contract = %self.contract(), operation_type = %hash, name = %name, "contract supports an unregistered operation type");
        }
        Ok(unknown)
    }

    // ── Roles and time locks ────────────────────────────────────────────────

    pub async fn role_snapshot(&self) -> Result<ContractRoleSnapshot, WardenError> {
        self.verifier
            .role_snapshot()
            .await
            .map_err(WardenError::Verifier)
    }

    pub async fn can_execute_phase(
        &self,
        operation: &OperationId,
        phase: Phase,
        address: Address,
    ) -> Result<bool, WardenError> {
        let definition = self.resolve_operation(operation).await?;
        let snapshot = self.role_snapshot().await?;
        Ok(can_execute_phase(&definition, phase, address, &snapshot))
    }

    /// Time-lock progress of a record, in percent.
    pub async fn time_lock_progress(&self, tx_id: U256) -> Result<f64, WardenError> {
        let record = self
            .verifier
            .transaction(tx_id)
            .await
            .map_err(WardenError::Verifier)?;
        let snapshot = self.role_snapshot().await?;
        Ok(progress_of(&record, &snapshot, self.clock.now()))
    }

    pub async fn pending_transactions(&self) -> Result<Vec<PendingOperation>, WardenError> {
        let records = self
            .verifier
            .pending_transactions()
            .await
            .map_err(WardenError::Verifier)?;
        let snapshot = self.role_snapshot().await?;
        let now = self.clock.now();
        let registry = self.registry.read().await;
        Ok(records
            .into_iter()
            .map(|record| PendingOperation {
                operation: registry
                    .resolve_by_hash(&record.params.operation_type)
                    .ok()
                    .map(|d| d.id.clone()),
                progress: progress_of(&record, &snapshot, now),
                record,
            })
            .collect())
    }

    // ── Direct phases ────────────────────────────────────────────────────────

    /// Open a multi-phase operation from the connected account.
    pub async fn request(
        &self,
        operation: &OperationId,
        new: NewOperation,
    ) -> Result<DispatchReceipt, WardenError> {
        let from = self.account()?;
        let definition = self.resolve_operation(operation).await?;
        definition.multi_phase()?;
        let snapshot = self.role_snapshot().await?;
        authorize(&definition, Phase::Request, from, &snapshot)?;

        let request = new_operation_request(&definition, from, snapshot.contract, new)?;
        let pending = self
            .verifier
            .request(request, from)
            .await
            .map_err(WardenError::Verifier)?;
        info!(contract = %snapshot.contract, operation = %definition.id, "requested operation");
        self.settle(pending).await
    }

    /// Approve a pending record once its time lock has elapsed.
    pub async fn approve(
        &self,
        operation: &OperationId,
        tx_id: U256,
    ) -> Result<DispatchReceipt, WardenError> {
        let from = self.account()?;
        let definition = self.resolve_operation(operation).await?;
        definition.multi_phase()?;
        let snapshot = self.role_snapshot().await?;
        authorize(&definition, Phase::Approve, from, &snapshot)?;

        let record = self
            .verifier
            .transaction(tx_id)
            .await
            .map_err(WardenError::Verifier)?;
        let progress = progress_of(&record, &snapshot, self.clock.now());
        if progress < 100.0 {
            return Err(WardenError::TimeLockActive { tx_id, progress });
        }

        let pending = self
            .verifier
            .approve(definition.operation_type, tx_id, from)
            .await
            .map_err(WardenError::Verifier)?;
        info!(contract = %snapshot.contract, operation = %definition.id, tx_id = %tx_id, "approved operation");
        self.settle(pending).await
    }

    pub async fn cancel(
        &self,
        operation: &OperationId,
        tx_id: U256,
    ) -> Result<DispatchReceipt, WardenError> {
        let from = self.account()?;
        let definition = self.resolve_operation(operation).await?;
        definition.multi_phase()?;
        let snapshot = self.role_snapshot().await?;
        authorize(&definition, Phase::Cancel, from, &snapshot)?;

        let pending = self
            .verifier
            .cancel(definition.operation_type, tx_id, from)
            .await
            .map_err(WardenError::Verifier)?;
        info!(contract = %snapshot.contract, operation = %definition.id, tx_id = %tx_id, "cancelled operation");
        self.settle(pending).await
    }

    async fn settle(&self, pending: PendingTx) -> Result<DispatchReceipt, WardenError> {
        match self.dispatcher.settle(pending).await {
            Ok(receipt) => Ok(receipt),
            Err(VerifierError::Reverted(raw)) => Err(WardenError::Reverted { reason: None, raw }),
            Err(e) => Err(WardenError::Verifier(e)),
        }
    }

    // ── Meta-transactions ────────────────────────────────────────────────────

    /// Build, sign and store a payload for `action` on `operation`.
    pub async fn build_and_sign(
        &self,
        operation: &OperationId,
        action: Action,
        subject: MetaTxSubject,
        options: &SigningOptions,
    ) -> Result<SignedPayload, WardenError> {
        let signer = self.signer.as_ref().ok_or(WardenError::MissingSigner)?;
        if self.network.is_none() {
            return Err(WardenError::MissingChainContext);
        }
        let definition = self.resolve_operation(operation).await?;
        definition.handler(action, self.contract())?;

        let tx_key = match &subject {
            MetaTxSubject::Existing(tx_id) => Some(*tx_id),
            MetaTxSubject::New(_) => None,
        };
        let _guard = self.claim(&definition.id, action, tx_key)?;

        let snapshot = self.role_snapshot().await?;
        authorize(&definition, action.signing_phase(), signer.address(), &snapshot)?;

        let outcome = self
            .builder
            .build_and_sign(
                self.verifier.as_ref(),
                signer.as_ref(),
                &snapshot,
                &definition,
                action,
                subject,
                options,
                self.clock.now(),
            )
            .await?;
        let entry = self.put_entry(&definition, action, &outcome.signed).await?;
        Ok(SignedPayload {
            signed: outcome.signed,
            scheme: outcome.scheme,
            entry,
        })
    }

    /// Submit a signed payload from the connected account.
    ///
    /// On confirmation the stored entry is removed. On timeout it is kept
    /// and flagged as broadcast with status `unknown`; on revert it is
    /// flagged `failed`.
    pub async fn dispatch(
        &self,
        operation: &OperationId,
        action: Action,
        signed: &SignedMetaTransaction,
    ) -> Result<DispatchReceipt, WardenError> {
        let network = self
            .network
            .as_ref()
            .ok_or(WardenError::MissingChainContext)?;
        let connected = self.account()?;
        let definition = self.resolve_operation(operation).await?;
        let tx_id = signed.tx_id();
        let _guard = self.claim(&definition.id, action, Some(tx_id))?;

        let snapshot = self.role_snapshot().await?;
        let result = self
            .dispatcher
            .dispatch(
                self.verifier.as_ref(),
                network.as_ref(),
                &snapshot,
                &definition,
                action,
                signed,
                connected,
                self.clock.now(),
            )
            .await;

        let contract = self.contract();
        let store_result = match &result {
            Ok(receipt) => match receipt.outcome {
                DispatchOutcome::Confirmed(_) => {
                    self.store.remove(contract, tx_id).await.map(|_| ())
                }
                DispatchOutcome::Unknown => self.flag_entry(tx_id, EntryStatus::Unknown).await,
            },
            Err(WardenError::Reverted { .. }) => self.flag_entry(tx_id, EntryStatus::Failed).await,
            Err(_) => Ok(()),
        };
        if let Err(e) = store_result {
            warn!(contract = %contract, tx_id = %tx_id, error = %e, "could not update stored payload after dispatch");
        }
        result
    }

    /// Dispatch a payload previously stored by [`Self::build_and_sign`].
    pub async fn dispatch_stored(&self, tx_id: U256) -> Result<DispatchReceipt, WardenError> {
        let entry = self
            .store
            .get_entry(self.contract(), tx_id)
            .await?
            .ok_or_else(|| {
                WardenError::Validation(format!("no stored payload for transaction {}", tx_id))
            })?;
        let signed: SignedMetaTransaction = CanonicalCodec::decode(&entry.payload)?;
        let operation = entry
            .metadata
            .operation
            .parse::<OperationId>()
            .unwrap_or_else(|never| match never {});
        self.dispatch(&operation, entry.metadata.action, &signed).await
    }

    async fn flag_entry(&self, tx_id: U256, status: EntryStatus) -> Result<(), StorageError> {
        let patch = EntryPatch::default().broadcast(true).status(status);
        match self.store.update(self.contract(), tx_id, patch).await {
            Ok(_) | Err(StorageError::EntryNotFound { .. }) => Ok(()),
            Err(e) => Err(e),
        }
    }

    // ── Store ────────────────────────────────────────────────────────────────

    /// Store a signed payload under its tx id.
    pub async fn store_payload(
        &self,
        operation: &OperationId,
        action: Action,
        signed: &SignedMetaTransaction,
    ) -> Result<StoredTransactionEntry, WardenError> {
        let definition = self.resolve_operation(operation).await?;
        self.put_entry(&definition, action, signed).await
    }

    async fn put_entry(
        &self,
        definition: &OperationDefinition,
        action: Action,
        signed: &SignedMetaTransaction,
    ) -> Result<StoredTransactionEntry, WardenError> {
        let payload = CanonicalCodec::encode(signed)?;
        let metadata =
            EntryMetadata::signed(definition.id.to_string(), definition.operation_type, action);
        Ok(self
            .store
            .put(self.contract(), signed.tx_id(), payload, metadata)
            .await?)
    }

    pub async fn remove_stored(&self, tx_id: U256) -> Result<bool, WardenError> {
        Ok(self.store.remove(self.contract(), tx_id).await?)
    }

    pub async fn clear_stored(&self) -> Result<usize, WardenError> {
        Ok(self.store.clear(self.contract()).await?)
    }

    pub async fn list_stored(&self) -> Result<BTreeMap<U256, StoredTransactionEntry>, WardenError> {
        Ok(self.store.get(self.contract()).await?)
    }

    /// Change events for this session's contract.
    pub fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.store.subscribe(self.contract())
    }
}

fn authorize(
    definition: &OperationDefinition,
    phase: Phase,
    address: Address,
    snapshot: &ContractRoleSnapshot,
) -> Result<(), WardenError> {
    if can_execute_phase(definition, phase, address, snapshot) {
        return Ok(());
    }
    Err(WardenError::Unauthorized {
        address,
        phase,
        operation: definition.id.clone(),
        required: definition
            .required_roles(phase)
            .unwrap_or(RoleRequirement::AnyOf(Vec::new())),
    })
}

fn progress_of(record: &TxRecord, snapshot: &ContractRoleSnapshot, now: u64) -> f64 {
    time_lock_progress(
        record.release_time.saturating_to::<u64>(),
        snapshot.time_lock_period,
        now,
    )
}
