//! Operation registry.
//!
//! Maps an operation identifier to its definition: workflow shape, role
//! table, operation-type hash and selectors. Core operations form a closed
//! enum ([`CoreOperation`]); plug-ins extend the registry at runtime through
//! [`OperationPlugin`].
//!
//! A registry is an explicit value owned by a session. Two indices (by
//! identifier and by hash) are kept in lockstep: a definition is inserted
//! into both or neither.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use alloy_primitives::{Address, Bytes, Selector, B256};
use async_trait::async_trait;

use crate::error::RegistryError;
use crate::operations::{CoreOperation, OperationArgs};
use crate::types::{Action, Phase, Role, RoleRequirement, WorkflowShape};

// ──────────────────────────────────────────────
// Identifiers
// ──────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum OperationId {
    Core(CoreOperation),
    Plugin(String),
}

impl fmt::Display for OperationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OperationId::Core(op) => f.write_str(op.as_str()),
            OperationId::Plugin(name) => f.write_str(name),
        }
    }
}

impl FromStr for OperationId {
    type Err = std::convert::Infallible;

    /// Core names resolve to [`OperationId::Core`]; anything else is taken
    /// as a plug-in identifier.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match CoreOperation::from_name(s) {
            Some(op) => OperationId::Core(op),
            None => OperationId::Plugin(s.to_string()),
        })
    }
}

impl From<CoreOperation> for OperationId {
    fn from(op: CoreOperation) -> Self {
        OperationId::Core(op)
    }
}

// ──────────────────────────────────────────────
// Extension points
// ──────────────────────────────────────────────

/// Where a meta-transaction for an action is handled on-chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HandlerTarget {
    pub contract: Address,
    pub selector: Selector,
}

/// Plug-in supplied handler resolution that bypasses the generic selector
/// lookup (for instance when the handler lives on a separate token
/// contract).
pub trait HandlerBuilder: Send + Sync {
    /// `None` defers to the definition's selector table.
    fn handler(&self, action: Action, contract: Address) -> Option<HandlerTarget>;
}

/// Encodes plug-in execution options from caller arguments.
pub trait ExecutionOptionsEncoder: Send + Sync {
    fn encode(&self, args: &OperationArgs) -> Result<Bytes, String>;
}

/// A set of operations loaded at runtime.
#[async_trait]
pub trait OperationPlugin: Send + Sync {
    fn name(&self) -> &str;

    /// Produce the plug-in's definitions. May perform I/O.
    async fn definitions(&self) -> Result<Vec<OperationDefinition>, String>;
}

// ──────────────────────────────────────────────
// Workflows
// ──────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MultiPhaseRoles {
    pub request: RoleRequirement,
    pub approve: RoleRequirement,
    pub cancel: RoleRequirement,
    pub meta_approve: RoleRequirement,
    pub meta_cancel: RoleRequirement,
}

/// Request now, approve or cancel after the time lock.
#[derive(Clone)]
pub struct MultiPhaseWorkflow {
    pub roles: MultiPhaseRoles,
    /// Handler for `approve_by_meta_tx`.
    pub approve_selector: Option<Selector>,
    /// Handler for `cancel_by_meta_tx`.
    pub cancel_selector: Option<Selector>,
    pub builder: Option<Arc<dyn HandlerBuilder>>,
}

/// Request and approve collapsed into one signed payload.
#[derive(Clone)]
pub struct SinglePhaseWorkflow {
    pub sign_role: RoleRequirement,
    /// Handler for `request_and_approve_by_meta_tx`.
    pub handler_selector: Option<Selector>,
    pub options: Option<Arc<dyn ExecutionOptionsEncoder>>,
    pub builder: Option<Arc<dyn HandlerBuilder>>,
}

#[derive(Clone)]
pub enum Workflow {
    MultiPhase(MultiPhaseWorkflow),
    SinglePhase(SinglePhaseWorkflow),
}

impl fmt::Debug for MultiPhaseWorkflow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MultiPhaseWorkflow")
            .field("roles", &self.roles)
            .field("approve_selector", &self.approve_selector)
            .field("cancel_selector", &self.cancel_selector)
            .field("builder", &self.builder.is_some())
            .finish()
    }
}

impl fmt::Debug for SinglePhaseWorkflow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SinglePhaseWorkflow")
            .field("sign_role", &self.sign_role)
            .field("handler_selector", &self.handler_selector)
            .field("options", &self.options.is_some())
            .field("builder", &self.builder.is_some())
            .finish()
    }
}

impl fmt::Debug for Workflow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Workflow::MultiPhase(w) => w.fmt(f),
            Workflow::SinglePhase(w) => w.fmt(f),
        }
    }
}

// ──────────────────────────────────────────────
// OperationDefinition
// ──────────────────────────────────────────────

/// Immutable description of one operation.
#[derive(Debug, Clone)]
pub struct OperationDefinition {
    pub id: OperationId,
    pub name: String,
    pub description: String,
    /// 32-byte domain identifier understood by the verifier.
    pub operation_type: B256,
    /// Function the contract runs when the record executes.
    pub execution_selector: Selector,
    pub workflow: Workflow,
}

impl OperationDefinition {
    pub fn shape(&self) -> WorkflowShape {
        match self.workflow {
            Workflow::MultiPhase(_) => WorkflowShape::MultiPhase,
            Workflow::SinglePhase(_) => WorkflowShape::SinglePhase,
        }
    }

    pub fn multi_phase(&self) -> Result<&MultiPhaseWorkflow, RegistryError> {
        match &self.workflow {
            Workflow::MultiPhase(w) => Ok(w),
            Workflow::SinglePhase(_) => Err(self.wrong_shape(WorkflowShape::MultiPhase)),
        }
    }

    pub fn single_phase(&self) -> Result<&SinglePhaseWorkflow, RegistryError> {
        match &self.workflow {
            Workflow::SinglePhase(w) => Ok(w),
            Workflow::MultiPhase(_) => Err(self.wrong_shape(WorkflowShape::SinglePhase)),
        }
    }

    fn wrong_shape(&self, expected: WorkflowShape) -> RegistryError {
        RegistryError::WrongWorkflowShape {
            id: self.id.to_string(),
            expected,
            actual: self.shape(),
        }
    }

    /// Roles allowed to perform `phase`, or `None` when the phase does not
    /// exist in this workflow shape.
    pub fn required_roles(&self, phase: Phase) -> Option<RoleRequirement> {
        if phase == Phase::Broadcast {
            return Some(RoleRequirement::Single(Role::Broadcaster));
        }
        match &self.workflow {
            Workflow::MultiPhase(w) => match phase {
                Phase::Request => Some(w.roles.request.clone()),
                Phase::Approve => Some(w.roles.approve.clone()),
                Phase::Cancel => Some(w.roles.cancel.clone()),
                Phase::MetaApprove => Some(w.roles.meta_approve.clone()),
                Phase::MetaCancel => Some(w.roles.meta_cancel.clone()),
                _ => None,
            },
            Workflow::SinglePhase(w) => match phase {
                Phase::RequestAndApprove => Some(w.sign_role.clone()),
                _ => None,
            },
        }
    }

    /// Resolve the on-chain handler for a meta-transaction action.
    ///
    /// A plug-in builder wins when it answers; otherwise the selector table
    /// applies with `contract` as the handler.
    pub fn handler(&self, action: Action, contract: Address) -> Result<HandlerTarget, RegistryError> {
        let (builder, selector) = match &self.workflow {
            Workflow::MultiPhase(w) => {
                let selector = match action {
                    Action::Approve => w.approve_selector,
                    Action::Cancel => w.cancel_selector,
                    Action::RequestAndApprove => {
                        return Err(self.wrong_shape(WorkflowShape::SinglePhase))
                    }
                };
                (&w.builder, selector)
            }
            Workflow::SinglePhase(w) => {
                if action != Action::RequestAndApprove {
                    return Err(self.wrong_shape(WorkflowShape::MultiPhase));
                }
                (&w.builder, w.handler_selector)
            }
        };

        if let Some(target) = builder.as_ref().and_then(|b| b.handler(action, contract)) {
            return Ok(target);
        }
        selector
            .map(|selector| HandlerTarget { contract, selector })
            .ok_or_else(|| RegistryError::MissingSelector {
                id: self.id.to_string(),
                action,
            })
    }

    /// Execution options for a new record built from `args`.
    ///
    /// Core operations encode their own calldata. Plug-ins without an
    /// encoder produce empty options and leave encoding to the verifier.
    pub fn execution_options(&self, args: &OperationArgs) -> Result<Bytes, RegistryError> {
        if let OperationId::Core(op) = &self.id {
            return op.encode_execution(args);
        }
        let encoder = match &self.workflow {
            Workflow::SinglePhase(w) => w.options.as_ref(),
            Workflow::MultiPhase(_) => None,
        };
        match (encoder, args) {
            (Some(encoder), args) => {
                encoder
                    .encode(args)
                    .map_err(|message| RegistryError::ArgumentMismatch {
                        id: self.id.to_string(),
                        message,
                    })
            }
            (None, OperationArgs::Encoded(bytes)) => Ok(bytes.clone()),
            (None, _) => Ok(Bytes::new()),
        }
    }
}

// ──────────────────────────────────────────────
// OperationRegistry
// ──────────────────────────────────────────────

#[derive(Debug, Clone, Default)]
pub struct OperationRegistry {
    by_id: BTreeMap<OperationId, Arc<OperationDefinition>>,
    by_hash: HashMap<B256, OperationId>,
}

impl OperationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry pre-populated with every [`CoreOperation`].
    pub fn with_core_operations() -> Self {
        let mut registry = Self::new();
        for op in CoreOperation::ALL {
            // Core identifiers and hashes are distinct by construction.
            let _ = registry.register(op.definition());
        }
        registry
    }

    /// Register a definition.
    ///
    /// Re-registering the same identifier with the same hash is a no-op and
    /// keeps the first definition. Conflicting identifier or hash bindings
    /// are rejected without touching either index.
    pub fn register(&mut self, definition: OperationDefinition) -> Result<(), RegistryError> {
        if let Some(existing) = self.by_id.get(&definition.id) {
            if existing.operation_type == definition.operation_type {
                return Ok(());
            }
            return Err(RegistryError::IdentifierConflict {
                id: definition.id.to_string(),
                existing: existing.operation_type,
                attempted: definition.operation_type,
            });
        }
        if let Some(existing) = self.by_hash.get(&definition.operation_type) {
            return Err(RegistryError::HashConflict {
                hash: definition.operation_type,
                existing: existing.to_string(),
                attempted: definition.id.to_string(),
            });
        }

        self.by_hash
            .insert(definition.operation_type, definition.id.clone());
        self.by_id
            .insert(definition.id.clone(), Arc::new(definition));
        Ok(())
    }

    /// Load and register every definition a plug-in provides.
    ///
    /// All or nothing: if any definition conflicts, the error is returned
    /// and the registry is left exactly as it was.
    pub async fn register_plugin(
        &mut self,
        plugin: &dyn OperationPlugin,
    ) -> Result<usize, RegistryError> {
        let definitions =
            plugin
                .definitions()
                .await
                .map_err(|message| RegistryError::PluginLoad {
                    plugin: plugin.name().to_string(),
                    message,
                })?;
        let count = definitions.len();
        let mut staged = self.clone();
        for definition in definitions {
            staged.register(definition)?;
        }
        *self = staged;
        Ok(count)
    }

    pub fn resolve(&self, id: &OperationId) -> Result<Arc<OperationDefinition>, RegistryError> {
        self.by_id
            .get(id)
            .cloned()
            .ok_or_else(|| RegistryError::UnknownOperation(id.to_string()))
    }

    pub fn resolve_by_hash(&self, hash: &B256) -> Result<Arc<OperationDefinition>, RegistryError> {
        let id = self
            .by_hash
            .get(hash)
            .ok_or(RegistryError::UnknownOperationType(*hash))?;
        self.resolve(id)
    }

    pub fn all_of_shape(&self, shape: WorkflowShape) -> Vec<Arc<OperationDefinition>> {
        self.by_id
            .values()
            .filter(|d| d.shape() == shape)
            .cloned()
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<OperationDefinition>> {
        self.by_id.values()
    }

    pub fn contains_hash(&self, hash: &B256) -> bool {
        self.by_hash.contains_key(hash)
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }
}

// ──────────────────────────────────────────────
// Tests
// ──────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::abi::selector;
    use alloy_primitives::keccak256;

    fn plugin_definition(id: &str, type_name: &str) -> OperationDefinition {
        OperationDefinition {
            id: OperationId::Plugin(id.to_string()),
            name: id.to_string(),
            description: String::new(),
            operation_type: keccak256(type_name),
            execution_selector: selector("executePause()"),
            workflow: Workflow::SinglePhase(SinglePhaseWorkflow {
                sign_role: RoleRequirement::Single(Role::Owner),
                handler_selector: Some(selector("pauseWithMetaTx(bytes)")),
                options: None,
                builder: None,
            }),
        }
    }

    struct PausePlugin;

    #[async_trait]
    impl OperationPlugin for PausePlugin {
        fn name(&self) -> &str {
            "pause"
        }

        async fn definitions(&self) -> Result<Vec<OperationDefinition>, String> {
            Ok(vec![
                plugin_definition("PAUSE", "PAUSE_CONTRACT"),
                plugin_definition("UNPAUSE", "UNPAUSE_CONTRACT"),
            ])
        }
    }

    struct TokenHandler(Address);

    impl HandlerBuilder for TokenHandler {
        fn handler(&self, action: Action, _contract: Address) -> Option<HandlerTarget> {
            (action == Action::RequestAndApprove).then(|| HandlerTarget {
                contract: self.0,
                selector: selector("mintWithMetaTx(bytes)"),
            })
        }
    }

    #[test]
    fn every_core_operation_resolves_both_ways() {
        let registry = OperationRegistry::with_core_operations();
        assert_eq!(registry.len(), CoreOperation::ALL.len());
        for definition in registry.iter() {
            let by_id = registry.resolve(&definition.id).unwrap();
            let by_hash = registry.resolve_by_hash(&definition.operation_type).unwrap();
            assert!(Arc::ptr_eq(&by_id, &by_hash));
        }
    }

    #[test]
    fn unknown_identifier_is_an_error() {
        let registry = OperationRegistry::with_core_operations();
        let err = registry
            .resolve(&OperationId::Plugin("NOPE".into()))
            .unwrap_err();
        assert_eq!(err, RegistryError::UnknownOperation("NOPE".into()));
        assert!(registry.resolve_by_hash(&B256::ZERO).is_err());
    }

    #[test]
    fn re_registration_is_idempotent() {
        let mut registry = OperationRegistry::new();
        registry
            .register(plugin_definition("PAUSE", "PAUSE_CONTRACT"))
            .unwrap();
        registry
            .register(plugin_definition("PAUSE", "PAUSE_CONTRACT"))
            .unwrap();
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn conflicting_bindings_leave_indices_untouched() {
        let mut registry = OperationRegistry::new();
        registry
            .register(plugin_definition("PAUSE", "PAUSE_CONTRACT"))
            .unwrap();

        let err = registry
            .register(plugin_definition("PAUSE", "OTHER"))
            .unwrap_err();
        assert!(matches!(err, RegistryError::IdentifierConflict { .. }));

        let err = registry
            .register(plugin_definition("HALT", "PAUSE_CONTRACT"))
            .unwrap_err();
        assert!(matches!(err, RegistryError::HashConflict { .. }));

        assert_eq!(registry.len(), 1);
        assert!(registry.resolve(&OperationId::Plugin("HALT".into())).is_err());
        assert!(!registry.contains_hash(&keccak256("OTHER")));
    }

    #[tokio::test]
    async fn plugin_definitions_are_registered() {
        let mut registry = OperationRegistry::with_core_operations();
        let count = registry.register_plugin(&PausePlugin).await.unwrap();
        assert_eq!(count, 2);
        let pause = registry
            .resolve(&"PAUSE".parse::<OperationId>().unwrap())
            .unwrap();
        assert_eq!(pause.shape(), WorkflowShape::SinglePhase);
        assert_eq!(
            registry
                .resolve_by_hash(&keccak256("UNPAUSE_CONTRACT"))
                .unwrap()
                .id,
            OperationId::Plugin("UNPAUSE".into())
        );
    }

    #[test]
    fn all_of_shape_partitions_core_operations() {
        let registry = OperationRegistry::with_core_operations();
        let multi = registry.all_of_shape(WorkflowShape::MultiPhase);
        let single = registry.all_of_shape(WorkflowShape::SinglePhase);
        assert_eq!(multi.len() + single.len(), registry.len());
        assert!(multi
            .iter()
            .any(|d| d.id == OperationId::Core(CoreOperation::TransferOwnership)));
        assert!(single
            .iter()
            .any(|d| d.id == OperationId::Core(CoreOperation::MintTokens)));
    }

    #[test]
    fn shape_mismatch_fails_loudly() {
        let registry = OperationRegistry::with_core_operations();
        let transfer = registry
            .resolve(&CoreOperation::TransferOwnership.into())
            .unwrap();
        assert!(matches!(
            transfer.single_phase(),
            Err(RegistryError::WrongWorkflowShape { .. })
        ));
        assert!(matches!(
            transfer.handler(Action::RequestAndApprove, Address::ZERO),
            Err(RegistryError::WrongWorkflowShape { .. })
        ));

        let mint = registry.resolve(&CoreOperation::MintTokens.into()).unwrap();
        assert!(mint.multi_phase().is_err());
        assert!(mint.handler(Action::Approve, Address::ZERO).is_err());
    }

    #[test]
    fn missing_selector_names_operation_and_action() {
        let mut definition = plugin_definition("PAUSE", "PAUSE_CONTRACT");
        if let Workflow::SinglePhase(w) = &mut definition.workflow {
            w.handler_selector = None;
        }
        let err = definition
            .handler(Action::RequestAndApprove, Address::ZERO)
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "no handler selector for operation 'PAUSE' action 'request_and_approve'"
        );
    }

    #[test]
    fn plugin_builder_overrides_handler() {
        let token = Address::repeat_byte(0x70);
        let mut definition = plugin_definition("MINT_VIA_TOKEN", "MINT_VIA_TOKEN");
        if let Workflow::SinglePhase(w) = &mut definition.workflow {
            w.builder = Some(Arc::new(TokenHandler(token)));
        }
        let target = definition
            .handler(Action::RequestAndApprove, Address::repeat_byte(0x01))
            .unwrap();
        assert_eq!(target.contract, token);
        assert_eq!(target.selector, selector("mintWithMetaTx(bytes)"));
    }

    #[test]
    fn plugin_without_encoder_passes_encoded_args_through() {
        let definition = plugin_definition("PAUSE", "PAUSE_CONTRACT");
        assert!(definition
            .execution_options(&OperationArgs::None)
            .unwrap()
            .is_empty());
        let raw = Bytes::from(vec![1, 2, 3]);
        assert_eq!(
            definition
                .execution_options(&OperationArgs::Encoded(raw.clone()))
                .unwrap(),
            raw
        );
    }

    // ── Execution-option encoders ────────────────────────────────────────────

    /// Prefixes a tag byte to pre-encoded args and refuses anything else.
    struct TaggedEncoder;

    impl ExecutionOptionsEncoder for TaggedEncoder {
        fn encode(&self, args: &OperationArgs) -> Result<Bytes, String> {
            match args {
                OperationArgs::Encoded(raw) => {
                    Ok([&[0xee][..], raw.as_ref()].concat().into())
                }
                other => Err(format!("expected encoded args, got {:?}", other)),
            }
        }
    }

    fn encoded_plugin() -> OperationDefinition {
        let mut definition = plugin_definition("PAUSE", "PAUSE_CONTRACT");
        if let Workflow::SinglePhase(w) = &mut definition.workflow {
            w.options = Some(Arc::new(TaggedEncoder));
        }
        definition
    }

    #[test]
    fn plugin_encoder_shapes_execution_options() {
        let options = encoded_plugin()
            .execution_options(&OperationArgs::Encoded(Bytes::from(vec![1, 2])))
            .unwrap();
        assert_eq!(options, Bytes::from(vec![0xee, 1, 2]));
    }

    #[test]
    fn plugin_encoder_failure_is_argument_mismatch() {
        let err = encoded_plugin()
            .execution_options(&OperationArgs::NewOwner(Address::ZERO))
            .unwrap_err();
        match err {
            RegistryError::ArgumentMismatch { id, message } => {
                assert_eq!(id, "PAUSE");
                assert!(message.starts_with("expected encoded args"));
            }
            other => panic!("expected ArgumentMismatch, got {:?}", other),
        }
    }

    // ── Plug-in atomicity ────────────────────────────────────────────────────

    struct HalfConflictingPlugin;

    #[async_trait]
    impl OperationPlugin for HalfConflictingPlugin {
        fn name(&self) -> &str {
            "half-conflicting"
        }

        async fn definitions(&self) -> Result<Vec<OperationDefinition>, String> {
            Ok(vec![
                plugin_definition("RESUME", "RESUME_CONTRACT"),
                // Reuses the hash PAUSE is already bound to.
                plugin_definition("HALT", "PAUSE_CONTRACT"),
            ])
        }
    }

    #[tokio::test]
    async fn conflicting_plugin_registers_nothing() {
        let mut registry = OperationRegistry::new();
        registry
            .register(plugin_definition("PAUSE", "PAUSE_CONTRACT"))
            .unwrap();

        let err = registry
            .register_plugin(&HalfConflictingPlugin)
            .await
            .unwrap_err();
        assert!(matches!(err, RegistryError::HashConflict { .. }));

        assert_eq!(registry.len(), 1);
        assert!(registry
            .resolve(&OperationId::Plugin("RESUME".into()))
            .is_err());
        assert!(!registry.contains_hash(&keccak256("RESUME_CONTRACT")));
    }
}
