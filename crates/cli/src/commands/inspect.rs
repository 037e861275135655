use std::path::Path;

use warden_core::{
    meta_tx_digest, recover_signer, Address, CanonicalCodec, Eip712Domain, OperationRegistry,
    SignedMetaTransaction,
};
use warden_engine::WardenConfig;

use super::fail;
use crate::OutputFormat;

/// Decode a signed payload, recover its signer and compare the message
/// hash with a locally computed EIP-712 digest. Exits 1 when the signature
/// does not recover to the payload's signer.
pub(crate) fn cmd_inspect(
    path: &Path,
    contract: Option<Address>,
    config: &WardenConfig,
    output: OutputFormat,
    quiet: bool,
) {
    let text = match std::fs::read_to_string(path) {
        Ok(text) => text,
        Err(e) => fail(
            &format!("error reading file '{}': {}", path.display(), e),
            output,
            quiet,
        ),
    };
    let signed: SignedMetaTransaction = match CanonicalCodec::decode(&text) {
        Ok(signed) => signed,
        Err(e) => fail(
            &format!("error decoding payload '{}': {}", path.display(), e),
            output,
            quiet,
        ),
    };

    let unsigned = signed.payload();
    let params = &unsigned.params;
    let recovered = recover_signer(unsigned.message, signed.signature());
    let valid = matches!(recovered, Ok(address) if address == params.signer);

    let domain = Eip712Domain {
        name: config.domain.name.clone(),
        version: config.domain.version.clone(),
        chain_id: params.chain_id,
        verifying_contract: contract.unwrap_or(params.handler_contract),
    };
    let typed_match = meta_tx_digest(&domain, unsigned) == unsigned.message;

    let operation = OperationRegistry::with_core_operations()
        .resolve_by_hash(&unsigned.tx_record.params.operation_type)
        .map(|d| d.id.to_string())
        .unwrap_or_else(|_| "<unregistered>".to_string());
    let recovered_text = match &recovered {
        Ok(address) => address.to_string(),
        Err(e) => format!("<{}>", e),
    };

    match output {
        OutputFormat::Json => println!(
            "{}",
            serde_json::json!({
                "txId": signed.tx_id().to_string(),
                "operation": operation,
                "operationType": unsigned.tx_record.params.operation_type.to_string(),
                "signer": params.signer.to_string(),
                "recovered": recovered_text,
                "signatureValid": valid,
                "typedDataMatch": typed_match,
                "message": unsigned.message.to_string(),
                "chainId": params.chain_id.to_string(),
                "nonce": params.nonce.to_string(),
                "deadline": params.deadline.to_string(),
                "maxGasPrice": params.max_gas_price.to_string(),
            })
        ),
        OutputFormat::Text => {
            println!("tx id:          {}", signed.tx_id());
            println!("operation:      {}", operation);
            println!("signer:         {}", params.signer);
            println!("recovered:      {}", recovered_text);
            println!("signature:      {}", if valid { "valid" } else { "INVALID" });
            println!(
                "typed data:     {}",
                if typed_match { "matches" } else { "differs (raw-hash signature)" }
            );
            println!("chain id:       {}", params.chain_id);
            println!("nonce:          {}", params.nonce);
            println!("deadline:       {}", params.deadline);
            println!("max gas price:  {}", params.max_gas_price);
        }
    }

    if !valid {
        std::process::exit(1);
    }
}
