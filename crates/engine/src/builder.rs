//! Meta-transaction construction and signing.
//!
//! The builder resolves the handler, asks the verifier to mint parameters
//! and build the unsigned payload, recomputes the EIP-712 digest locally
//! and signs. When the local digest matches the verifier's hash the signer
//! is asked for a typed-data signature; otherwise (or if typed signing
//! fails) the verifier's hash is signed raw. Either way the signature
//! endorses the hash the verifier will check.

use tracing::{debug, info, warn};
use warden_core::{
    meta_tx_digest, recover_signer, Action, Address, ContractRoleSnapshot, Eip712Domain,
    ExecutionType, OperationArgs, OperationDefinition, OperationId, SignedMetaTransaction,
    TypedData, UnsignedMetaTransaction, U256,
};

use crate::config::{DomainConfig, MetaTxConfig};
use crate::error::WardenError;
use crate::signer::Signer;
use crate::verifier::{MetaTxParamsRequest, NewOperationRequest, Verifier};

/// Which primitive endorsed the payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SigningScheme {
    TypedData,
    RawHash,
}

/// Caller overrides for a single payload.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SigningOptions {
    /// Seconds from now until the payload expires.
    pub deadline_secs: Option<u64>,
    /// Requested gas ceiling in wei. Values under the floor are replaced
    /// by the floor.
    pub max_gas_price: Option<U256>,
}

/// Arguments for a payload that creates a new record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewOperation {
    pub args: OperationArgs,
    /// Call target; defaults to the contract itself.
    pub target: Option<Address>,
    pub value: U256,
    pub gas_limit: U256,
}

impl NewOperation {
    pub fn new(args: OperationArgs) -> Self {
        Self {
            args,
            target: None,
            value: U256::ZERO,
            gas_limit: U256::ZERO,
        }
    }
}

/// What the payload is about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MetaTxSubject {
    /// New-operation path (single-phase request-and-approve).
    New(NewOperation),
    /// Existing-operation path (multi-phase approve or cancel).
    Existing(U256),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignOutcome {
    pub signed: SignedMetaTransaction,
    pub scheme: SigningScheme,
}

#[derive(Debug, Clone)]
pub struct MetaTxBuilder {
    domain: DomainConfig,
    policy: MetaTxConfig,
}

impl MetaTxBuilder {
    pub fn new(domain: DomainConfig, policy: MetaTxConfig) -> Self {
        Self { domain, policy }
    }

    /// Absolute deadline for a payload built at `now`.
    pub fn deadline(&self, now: u64, requested_secs: Option<u64>) -> Result<U256, WardenError> {
        let secs = requested_secs.unwrap_or(self.policy.default_deadline_secs);
        if secs == 0 {
            return Err(WardenError::Validation(
                "deadline must be in the future".to_string(),
            ));
        }
        if secs > self.policy.max_deadline_secs {
            return Err(WardenError::Validation(format!(
                "deadline of {}s exceeds the allowed maximum of {}s",
                secs, self.policy.max_deadline_secs
            )));
        }
        Ok(U256::from(now) + U256::from(secs))
    }

    /// Signed gas ceiling: the caller's value, but never below the floor.
    pub fn gas_ceiling(&self, requested: Option<U256>) -> U256 {
        let floor = self.policy.min_gas_price;
        match requested {
            Some(price) if price < floor => {
                warn!(requested = %price, floor = %floor, "gas ceiling below protocol floor, using floor");
                floor
            }
            Some(price) => price,
            None => floor,
        }
    }

    fn domain_for(&self, unsigned: &UnsignedMetaTransaction, contract: Address) -> Eip712Domain {
        Eip712Domain {
            name: self.domain.name.clone(),
            version: self.domain.version.clone(),
            chain_id: unsigned.params.chain_id,
            verifying_contract: contract,
        }
    }

    /// Build and sign a payload for `action` on `definition`.
    ///
    /// `snapshot` must be freshly read; authorization is the caller's job.
    #[allow(clippy::too_many_arguments)]
    pub async fn build_and_sign(
        &self,
        verifier: &dyn Verifier,
        signer: &dyn Signer,
        snapshot: &ContractRoleSnapshot,
        definition: &OperationDefinition,
        action: Action,
        subject: MetaTxSubject,
        options: &SigningOptions,
        now: u64,
    ) -> Result<SignOutcome, WardenError> {
        // Shape first: the handler lookup reports WrongWorkflowShape.
        let handler = definition.handler(action, snapshot.contract)?;
        match (&subject, action) {
            (MetaTxSubject::New(_), Action::RequestAndApprove)
            | (MetaTxSubject::Existing(_), Action::Approve | Action::Cancel) => {}
            _ => {
                return Err(WardenError::Validation(format!(
                    "{} needs {}",
                    action,
                    if action == Action::RequestAndApprove {
                        "new operation arguments"
                    } else {
                        "an existing transaction id"
                    }
                )))
            }
        }

        let deadline = self.deadline(now, options.deadline_secs)?;
        let max_gas_price = self.gas_ceiling(options.max_gas_price);

        let params = verifier
            .mint_meta_tx_params(MetaTxParamsRequest {
                handler,
                deadline,
                max_gas_price,
                signer: signer.address(),
            })
            .await
            .map_err(|source| WardenError::ConstructionFailed {
                stage: "mint meta-transaction params",
                source,
            })?;
        debug!(nonce = %params.nonce, deadline = %params.deadline, "minted meta-tx params");

        let unsigned = match subject {
            MetaTxSubject::New(new) => {
                let request =
                    new_operation_request(definition, signer.address(), snapshot.contract, new)?;
                verifier.build_new_operation(request, params).await
            }
            MetaTxSubject::Existing(tx_id) => {
                verifier.build_existing_operation(tx_id, params).await
            }
        }
        .map_err(|source| WardenError::ConstructionFailed {
            stage: "build unsigned payload",
            source,
        })?;

        if unsigned.tx_record.params.operation_type != definition.operation_type {
            return Err(WardenError::Validation(format!(
                "transaction {} is not a {} record",
                unsigned.tx_id(),
                definition.id
            )));
        }

        let (signature, scheme) = self.sign(signer, snapshot.contract, &unsigned, &definition.id).await?;

        let recovered = recover_signer(unsigned.message, &signature)
            .map_err(|e| WardenError::SigningFailed(e.to_string()))?;
        if recovered != signer.address() {
            return Err(WardenError::SigningFailed(format!(
                "signature recovers to {}, expected {}",
                recovered,
                signer.address()
            )));
        }

        info!(
            contract = %snapshot.contract,
            operation = %definition.id,
            action = %action,
            tx_id = %unsigned.tx_id(),
            scheme = ?scheme,
            "signed meta-transaction"
        );
        Ok(SignOutcome {
            signed: SignedMetaTransaction::new(unsigned, signature),
            scheme,
        })
    }

    async fn sign(
        &self,
        signer: &dyn Signer,
        contract: Address,
        unsigned: &UnsignedMetaTransaction,
        operation: &OperationId,
    ) -> Result<(warden_core::Bytes, SigningScheme), WardenError> {
        let domain = self.domain_for(unsigned, contract);
        let local = meta_tx_digest(&domain, unsigned);

        let typed_error = if local == unsigned.message {
            match signer
                .sign_typed_data(&TypedData::new(domain, unsigned.clone()))
                .await
            {
                Ok(signature) => return Ok((signature, SigningScheme::TypedData)),
                Err(e) => {
                    warn!(operation = %operation, error = %e, "typed-data signing failed, signing raw hash");
                    Some(e.to_string())
                }
            }
        } else {
            warn!(
                operation = %operation,
                local = %local,
                verifier = %unsigned.message,
                "typed-data hash mismatch, signing raw hash"
            );
            None
        };

        match signer.sign_hash(unsigned.message).await {
            Ok(signature) => Ok((signature, SigningScheme::RawHash)),
            Err(raw) => Err(WardenError::SigningFailed(match typed_error {
                Some(typed) => format!("typed-data: {}; raw hash: {}", typed, raw),
                None => format!("raw hash: {}", raw),
            })),
        }
    }
}

/// The record a new operation asks the verifier to create.
pub(crate) fn new_operation_request(
    definition: &OperationDefinition,
    requester: Address,
    contract: Address,
    new: NewOperation,
) -> Result<NewOperationRequest, WardenError> {
    let execution_options = definition.execution_options(&new.args)?;
    let execution_type = match (&definition.id, &new.args) {
        (OperationId::Plugin(_), OperationArgs::Encoded(_)) => ExecutionType::Raw,
        _ => ExecutionType::Standard,
    };
    Ok(NewOperationRequest {
        requester,
        target: new.target.unwrap_or(contract),
        value: new.value,
        gas_limit: new.gas_limit,
        operation_type: definition.operation_type,
        execution_type,
        execution_options,
        payment: new.args.payment(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn builder() -> MetaTxBuilder {
        MetaTxBuilder::new(DomainConfig::default(), MetaTxConfig::default())
    }

    #[test]
    fn deadline_defaults_to_one_hour() {
        assert_eq!(
            builder().deadline(1_000, None).unwrap(),
            U256::from(1_000u64 + 3_600)
        );
    }

    #[test]
    fn deadline_above_bound_is_rejected() {
        let err = builder().deadline(0, Some(86_401)).unwrap_err();
        assert_eq!(err.classification(), "validation");
        assert!(builder().deadline(0, Some(86_400)).is_ok());
        assert!(builder().deadline(0, Some(0)).is_err());
    }

    #[test]
    fn low_gas_ceiling_is_replaced_by_floor() {
        let floor = MetaTxConfig::default().min_gas_price;
        let b = builder();
        assert_eq!(b.gas_ceiling(None), floor);
        assert_eq!(b.gas_ceiling(Some(floor - U256::from(1u64))), floor);
        assert_eq!(
            b.gas_ceiling(Some(floor + U256::from(1u64))),
            floor + U256::from(1u64)
        );
    }
}
