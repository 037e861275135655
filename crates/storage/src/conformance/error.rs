use std::future::Future;

use warden_core::U256;

use super::{contract_a, metadata, payload, TestResult};
use crate::record::EntryPatch;
use crate::{StorageError, TransactionStore};

pub(super) async fn run_error_tests<S, F, Fut>(factory: &F) -> Vec<TestResult>
where
    S: TransactionStore + Clone,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let mut results = Vec::new();

    results.push(TestResult::from_result(
        "error",
        "update_missing_entry_not_found",
        update_missing_entry_not_found(factory).await,
    ));
    results.push(TestResult::from_result(
        "error",
        "update_not_found_has_correct_fields",
        update_not_found_has_correct_fields(factory).await,
    ));
    results.push(TestResult::from_result(
        "error",
        "get_unknown_contract_is_empty",
        get_unknown_contract_is_empty(factory).await,
    ));
    results.push(TestResult::from_result(
        "error",
        "clear_unknown_contract_is_zero",
        clear_unknown_contract_is_zero(factory).await,
    ));

    results
}

async fn update_missing_entry_not_found<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: TransactionStore + Clone,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let result = s
        .update(contract_a(), U256::from(99u64), EntryPatch::default().broadcast(true))
        .await;
    match result {
        Err(StorageError::EntryNotFound { .. }) => Ok(()),
        other => Err(format!("expected EntryNotFound, got {:?}", other)),
    }
}

async fn update_not_found_has_correct_fields<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: TransactionStore + Clone,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    // An entry under a different key must not satisfy the update.
    s.put(contract_a(), U256::from(1u64), payload("p"), metadata())
        .await
        .map_err(|e| e.to_string())?;
    let result = s
        .update(contract_a(), U256::from(2u64), EntryPatch::default())
        .await;
    match result {
        Err(StorageError::EntryNotFound { contract, tx_id }) => {
            if contract != contract_a().to_string() {
                return Err(format!("wrong contract in error: {contract}"));
            }
            if tx_id != "2" {
                return Err(format!("wrong tx id in error: {tx_id}"));
            }
            Ok(())
        }
        other => Err(format!("expected EntryNotFound, got {:?}", other)),
    }
}

async fn get_unknown_contract_is_empty<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: TransactionStore + Clone,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let table = s.get(contract_a()).await.map_err(|e| e.to_string())?;
    if !table.is_empty() {
        return Err(format!("expected empty table, got {} entries", table.len()));
    }
    let entry = s
        .get_entry(contract_a(), U256::ZERO)
        .await
        .map_err(|e| e.to_string())?;
    if entry.is_some() {
        return Err("expected no entry".to_string());
    }
    Ok(())
}

async fn clear_unknown_contract_is_zero<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: TransactionStore + Clone,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let cleared = s.clear(contract_a()).await.map_err(|e| e.to_string())?;
    if cleared != 0 {
        return Err(format!("expected 0 cleared, got {cleared}"));
    }
    Ok(())
}
