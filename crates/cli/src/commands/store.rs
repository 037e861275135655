use std::collections::BTreeMap;
use std::path::Path;

use warden_core::{Address, U256};
use warden_storage::{JsonFileStore, StorageError, StoredTransactionEntry, TransactionStore};

use super::{fail, runtime};
use crate::OutputFormat;

pub(crate) enum StoreAction {
    List(Option<Address>),
    Remove(Address, U256),
    Clear(Address),
}

pub(crate) fn cmd_store(dir: &Path, action: StoreAction, output: OutputFormat, quiet: bool) {
    let rt = runtime(output, quiet);
    if let Err(e) = rt.block_on(run(dir, action, output, quiet)) {
        fail(&e.to_string(), output, quiet);
    }
}

async fn run(
    dir: &Path,
    action: StoreAction,
    output: OutputFormat,
    quiet: bool,
) -> Result<(), StorageError> {
    let store = JsonFileStore::open(dir)?;
    tracing::debug!(dir = %dir.display(), "opened transaction store");

    match action {
        StoreAction::List(contract) => {
            let contracts = match contract {
                Some(contract) => vec![contract],
                None => store.contracts().await?,
            };
            let mut all = Vec::new();
            for contract in contracts {
                all.push((contract, store.get(contract).await?));
            }
            print_entries(&all, output);
        }
        StoreAction::Remove(contract, tx_id) => {
            let removed = store.remove(contract, tx_id).await?;
            match output {
                OutputFormat::Json => {
                    println!("{}", serde_json::json!({ "removed": removed }))
                }
                OutputFormat::Text if !quiet => {
                    if removed {
                        println!("removed transaction {} for {}", tx_id, contract);
                    } else {
                        println!("no stored payload for transaction {} on {}", tx_id, contract);
                    }
                }
                OutputFormat::Text => {}
            }
        }
        StoreAction::Clear(contract) => {
            let removed = store.clear(contract).await?;
            match output {
                OutputFormat::Json => {
                    println!("{}", serde_json::json!({ "removed": removed }))
                }
                OutputFormat::Text if !quiet => {
                    println!("removed {} stored payload(s) for {}", removed, contract)
                }
                OutputFormat::Text => {}
            }
        }
    }
    Ok(())
}

fn print_entries(
    all: &[(Address, BTreeMap<U256, StoredTransactionEntry>)],
    output: OutputFormat,
) {
    match output {
        OutputFormat::Json => {
            let entries: Vec<serde_json::Value> = all
                .iter()
                .flat_map(|(_, entries)| entries.values())
                .map(|entry| {
                    serde_json::json!({
                        "contract": entry.contract.to_string(),
                        "txId": entry.tx_id.to_string(),
                        "operation": entry.metadata.operation,
                        "action": entry.metadata.action.as_str(),
                        "status": entry.metadata.status.as_str(),
                        "broadcast": entry.metadata.broadcast,
                        "createdAt": entry.created_at,
                    })
                })
                .collect();
            println!("{}", serde_json::Value::Array(entries));
        }
        OutputFormat::Text => {
            for (contract, entries) in all {
                println!("{} ({} stored)", contract, entries.len());
                for entry in entries.values() {
                    println!(
                        "  {:>6}  {:<20} {:<20} {:<8} broadcast={}  {}",
                        entry.tx_id.to_string(),
                        entry.metadata.operation,
                        entry.metadata.action.as_str(),
                        entry.metadata.status.as_str(),
                        entry.metadata.broadcast,
                        entry.created_at
                    );
                }
            }
        }
    }
}
