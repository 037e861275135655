//! End-to-end tests for the `warden` binary.
//!
//! Each test spawns the binary with `assert_cmd`, isolated from any
//! `WARDEN_CONFIG` in the caller's environment.

use assert_cmd::cargo::cargo_bin_cmd;
use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use std::path::Path;
use tempfile::TempDir;
use warden_core::{
    meta_tx_digest, Action, Address, Bytes, CanonicalCodec, CoreOperation, Eip712Domain,
    ExecutionType, MetaTxParams, PaymentDetails, SignedMetaTransaction, TxParams, TxRecord,
    TxStatus, UnsignedMetaTransaction, B256, U256,
};
use warden_engine::{LocalSigner, Signer as _};
use warden_storage::{EntryMetadata, JsonFileStore, TransactionStore};

const CHAIN_ID: u64 = 31337;

fn warden() -> Command {
    let mut cmd = cargo_bin_cmd!("warden");
    cmd.env_remove("WARDEN_CONFIG");
    cmd.env_remove("WARDEN_RPC_URL");
    cmd
}

fn contract() -> Address {
    Address::repeat_byte(0x11)
}

/// A mint payload signed over the default domain. With `forge` set the
/// payload names a different signer than the key that signed it.
fn write_payload(dir: &Path, forge: bool) -> (std::path::PathBuf, Address) {
    let signer = LocalSigner::random();
    let definition = CoreOperation::MintTokens.definition();
    let claimed = if forge {
        Address::repeat_byte(0x99)
    } else {
        signer.address()
    };

    let mut unsigned = UnsignedMetaTransaction {
        tx_record: TxRecord {
            tx_id: U256::from(7u64),
            release_time: U256::ZERO,
            status: TxStatus::Pending,
            params: TxParams {
                requester: claimed,
                target: contract(),
                value: U256::ZERO,
                gas_limit: U256::from(100_000u64),
                operation_type: definition.operation_type,
                execution_type: ExecutionType::Standard,
                execution_options: Bytes::new(),
            },
            message: B256::ZERO,
            result: Bytes::new(),
            payment: PaymentDetails::default(),
        },
        params: MetaTxParams {
            chain_id: U256::from(CHAIN_ID),
            nonce: U256::ZERO,
            handler_contract: contract(),
            handler_selector: definition.execution_selector,
            deadline: U256::from(1_700_003_600u64),
            max_gas_price: U256::from(2_000_000_000u64),
            signer: claimed,
        },
        message: B256::ZERO,
        data: Bytes::new(),
    };
    let domain = Eip712Domain::new("Warden", "1", CHAIN_ID, contract());
    unsigned.message = meta_tx_digest(&domain, &unsigned);

    let rt = tokio::runtime::Runtime::new().unwrap();
    let signature = rt.block_on(signer.sign_hash(unsigned.message)).unwrap();
    let signed = SignedMetaTransaction::new(unsigned, signature);

    let path = dir.join("payload.json");
    fs::write(&path, CanonicalCodec::encode_pretty(&signed).unwrap()).unwrap();
    (path, signer.address())
}

fn seed_store(dir: &Path) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    rt.block_on(async {
        let store = JsonFileStore::open(dir).unwrap();
        let operation_type = CoreOperation::MintTokens.definition().operation_type;
        for tx_id in [1u64, 2] {
            store
                .put(
                    contract(),
                    U256::from(tx_id),
                    "{}".to_string(),
                    EntryMetadata::signed("MINT_TOKENS", operation_type, Action::RequestAndApprove),
                )
                .await
                .unwrap();
        }
    });
}

// ──────────────────────────────────────────────
// 1. Help and registry listing
// ──────────────────────────────────────────────

#[test]
fn help_exits_0_with_description() {
    warden()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Multi-party approval workflows"));
}

#[test]
fn operations_lists_core_operations() {
    warden()
        .arg("operations")
        .assert()
        .success()
        .stdout(predicate::str::contains("MINT_TOKENS"))
        .stdout(predicate::str::contains("TRANSFER_OWNERSHIP"));
}

#[test]
fn operations_json_is_an_array() {
    let output = warden()
        .args(["--output", "json", "operations"])
        .output()
        .unwrap();
    assert!(output.status.success());
    let value: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    let ops = value.as_array().unwrap();
    assert!(ops.iter().any(|op| op["id"] == "MINT_TOKENS" && op["shape"] == "single-phase"));
}

// ──────────────────────────────────────────────
// 2. Time-lock progress
// ──────────────────────────────────────────────

#[test]
fn progress_halfway_through_lock() {
    warden()
        .args(["progress", "2000", "1000", "--now", "1500"])
        .assert()
        .success()
        .stdout(predicate::str::contains("50.0%"))
        .stdout(predicate::str::contains("500s remaining"));
}

#[test]
fn progress_json_after_release() {
    let output = warden()
        .args(["--output", "json", "progress", "2000", "1000", "--now", "2500"])
        .output()
        .unwrap();
    assert!(output.status.success());
    let value: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(value["complete"], true);
    assert_eq!(value["progress"], 100.0);
}

// ──────────────────────────────────────────────
// 3. Keygen
// ──────────────────────────────────────────────

#[test]
fn keygen_writes_key_files() {
    let dir = TempDir::new().unwrap();
    let prefix = dir.path().join("ops");
    warden()
        .args(["keygen", "--prefix", prefix.to_str().unwrap()])
        .assert()
        .success()
        .stdout(predicate::str::contains("Generated secp256k1 key"));

    let secret = dir.path().join("ops.secret");
    let signer = LocalSigner::read_key_file(&secret).unwrap();
    let addr: Address = fs::read_to_string(dir.path().join("ops.addr"))
        .unwrap()
        .trim()
        .parse()
        .unwrap();
    assert_eq!(addr, signer.address());

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mode = fs::metadata(&secret).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }
}

// ──────────────────────────────────────────────
// 4. Inspect
// ──────────────────────────────────────────────

#[test]
fn inspect_valid_payload() {
    let dir = TempDir::new().unwrap();
    let (path, signer) = write_payload(dir.path(), false);
    let output = warden()
        .args(["--output", "json", "inspect", path.to_str().unwrap()])
        .output()
        .unwrap();
    assert!(output.status.success());
    let value: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(value["signatureValid"], true);
    assert_eq!(value["typedDataMatch"], true);
    assert_eq!(value["operation"], "MINT_TOKENS");
    assert_eq!(value["txId"], "7");
    assert_eq!(value["recovered"], signer.to_string());
}

#[test]
fn inspect_other_domain_contract_reports_mismatch() {
    let dir = TempDir::new().unwrap();
    let (path, _) = write_payload(dir.path(), false);
    let other = Address::repeat_byte(0x22).to_string();
    warden()
        .args(["inspect", path.to_str().unwrap(), "--contract", &other])
        .assert()
        .success()
        .stdout(predicate::str::contains("differs"));
}

#[test]
fn inspect_forged_signer_exits_1() {
    let dir = TempDir::new().unwrap();
    let (path, _) = write_payload(dir.path(), true);
    warden()
        .args(["inspect", path.to_str().unwrap()])
        .assert()
        .failure()
        .code(1)
        .stdout(predicate::str::contains("INVALID"));
}

#[test]
fn inspect_missing_file_exits_1() {
    warden()
        .args(["inspect", "does/not/exist.json"])
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("error reading file"));
}

// ──────────────────────────────────────────────
// 5. Store
// ──────────────────────────────────────────────

#[test]
fn store_list_shows_seeded_entries() {
    let dir = TempDir::new().unwrap();
    seed_store(dir.path());
    let output = warden()
        .args(["--output", "json", "store", "--dir", dir.path().to_str().unwrap(), "list"])
        .output()
        .unwrap();
    assert!(output.status.success());
    let value: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    let entries = value.as_array().unwrap();
    assert_eq!(entries.len(), 2);
    assert!(entries.iter().all(|e| e["operation"] == "MINT_TOKENS" && e["status"] == "signed"));
}

#[test]
fn store_remove_then_clear() {
    let dir = TempDir::new().unwrap();
    seed_store(dir.path());
    let dir_arg = dir.path().to_str().unwrap();
    let contract = contract().to_string();

    warden()
        .args(["store", "--dir", dir_arg, "remove", &contract, "1"])
        .assert()
        .success()
        .stdout(predicate::str::contains("removed transaction 1"));

    warden()
        .args(["--output", "json", "store", "--dir", dir_arg, "clear", &contract])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"removed\":1"));

    let rt = tokio::runtime::Runtime::new().unwrap();
    let remaining = rt
        .block_on(async { JsonFileStore::open(dir.path()).unwrap().get(crate::contract()).await })
        .unwrap();
    assert!(remaining.is_empty());
}

#[test]
fn store_remove_rejects_bad_tx_id() {
    let dir = TempDir::new().unwrap();
    warden()
        .args([
            "store",
            "--dir",
            dir.path().to_str().unwrap(),
            "remove",
            &contract().to_string(),
            "seven",
        ])
        .assert()
        .failure();
}

// ──────────────────────────────────────────────
// 6. Configuration
// ──────────────────────────────────────────────

#[test]
fn invalid_config_exits_1() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("warden.toml");
    fs::write(&path, "[metatx]\ndefault_deadline_secs = 0\n").unwrap();
    warden()
        .args(["--config", path.to_str().unwrap(), "operations"])
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("default_deadline_secs must be positive"));
}

#[test]
fn config_store_dir_is_used() {
    let dir = TempDir::new().unwrap();
    let store_dir = dir.path().join("payloads");
    seed_store(&store_dir);
    let path = dir.path().join("warden.toml");
    fs::write(
        &path,
        format!("[store]\ndir = {:?}\n", store_dir.to_str().unwrap()),
    )
    .unwrap();
    warden()
        .env("WARDEN_CONFIG", &path)
        .args(["store", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("(2 stored)"));
}
