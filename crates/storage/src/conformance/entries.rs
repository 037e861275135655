use std::future::Future;

use warden_core::U256;

use super::{contract_a, contract_b, metadata, payload, TestResult};
use crate::TransactionStore;

pub(super) async fn run_entry_tests<S, F, Fut>(factory: &F) -> Vec<TestResult>
where
    S: TransactionStore + Clone,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let mut results = Vec::new();

    results.push(TestResult::from_result(
        "entries",
        "put_then_get_returns_one_entry",
        put_then_get_returns_one_entry(factory).await,
    ));
    results.push(TestResult::from_result(
        "entries",
        "second_put_replaces_payload",
        second_put_replaces_payload(factory).await,
    ));
    results.push(TestResult::from_result(
        "entries",
        "max_tx_id_round_trips",
        max_tx_id_round_trips(factory).await,
    ));
    results.push(TestResult::from_result(
        "entries",
        "contracts_are_isolated",
        contracts_are_isolated(factory).await,
    ));
    results.push(TestResult::from_result(
        "entries",
        "remove_deletes_only_that_key",
        remove_deletes_only_that_key(factory).await,
    ));
    results.push(TestResult::from_result(
        "entries",
        "clear_empties_only_that_contract",
        clear_empties_only_that_contract(factory).await,
    ));
    results.push(TestResult::from_result(
        "entries",
        "contracts_lists_non_empty_tables",
        contracts_lists_non_empty_tables(factory).await,
    ));

    results
}

// ── Test implementations ──────────────────────────────────────────────────────

/// A put followed by get returns exactly that entry.
async fn put_then_get_returns_one_entry<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: TransactionStore + Clone,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let tx_id = U256::from(7u64);
    s.put(contract_a(), tx_id, payload("one"), metadata())
        .await
        .map_err(|e| e.to_string())?;

    let table = s.get(contract_a()).await.map_err(|e| e.to_string())?;
    if table.len() != 1 {
        return Err(format!("expected 1 entry, got {}", table.len()));
    }
    let entry = table.get(&tx_id).ok_or("entry missing under its tx id")?;
    if entry.payload != payload("one") || entry.metadata != metadata() {
        return Err(format!("stored entry differs: {entry:?}"));
    }
    if entry.created_at.is_empty() {
        return Err("created_at not set".to_string());
    }
    Ok(())
}

/// A second put on the same key leaves one entry with the new payload.
async fn second_put_replaces_payload<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: TransactionStore + Clone,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let tx_id = U256::from(7u64);
    s.put(contract_a(), tx_id, payload("first"), metadata())
        .await
        .map_err(|e| e.to_string())?;
    s.put(contract_a(), tx_id, payload("second"), metadata())
        .await
        .map_err(|e| e.to_string())?;

    let table = s.get(contract_a()).await.map_err(|e| e.to_string())?;
    if table.len() != 1 {
        return Err(format!("expected 1 entry, got {}", table.len()));
    }
    match table.get(&tx_id) {
        Some(entry) if entry.payload == payload("second") => Ok(()),
        other => Err(format!("expected second payload, got {other:?}")),
    }
}

/// The largest possible tx id is stored and read back exactly.
async fn max_tx_id_round_trips<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: TransactionStore + Clone,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    s.put(contract_a(), U256::MAX, payload("max"), metadata())
        .await
        .map_err(|e| e.to_string())?;
    let entry = s
        .get_entry(contract_a(), U256::MAX)
        .await
        .map_err(|e| e.to_string())?
        .ok_or("entry for U256::MAX missing")?;
    if entry.tx_id != U256::MAX {
        return Err(format!("tx id changed to {}", entry.tx_id));
    }
    Ok(())
}

/// The same tx id under two contracts is two independent entries.
async fn contracts_are_isolated<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: TransactionStore + Clone,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let tx_id = U256::from(1u64);
    s.put(contract_a(), tx_id, payload("a"), metadata())
        .await
        .map_err(|e| e.to_string())?;
    s.put(contract_b(), tx_id, payload("b"), metadata())
        .await
        .map_err(|e| e.to_string())?;

    let a = s.get(contract_a()).await.map_err(|e| e.to_string())?;
    let b = s.get(contract_b()).await.map_err(|e| e.to_string())?;
    if a.get(&tx_id).map(|e| e.payload.as_str()) != Some(payload("a").as_str()) {
        return Err("contract A entry overwritten".to_string());
    }
    if b.get(&tx_id).map(|e| e.payload.as_str()) != Some(payload("b").as_str()) {
        return Err("contract B entry overwritten".to_string());
    }
    Ok(())
}

/// Removing one key leaves siblings; removing again reports absence.
async fn remove_deletes_only_that_key<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: TransactionStore + Clone,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    for i in 1..=3u64 {
        s.put(contract_a(), U256::from(i), payload("x"), metadata())
            .await
            .map_err(|e| e.to_string())?;
    }
    let removed = s
        .remove(contract_a(), U256::from(2u64))
        .await
        .map_err(|e| e.to_string())?;
    if !removed {
        return Err("remove reported missing entry".to_string());
    }
    let again = s
        .remove(contract_a(), U256::from(2u64))
        .await
        .map_err(|e| e.to_string())?;
    if again {
        return Err("second remove reported an entry".to_string());
    }

    let table = s.get(contract_a()).await.map_err(|e| e.to_string())?;
    let keys: Vec<U256> = table.keys().copied().collect();
    if keys != vec![U256::from(1u64), U256::from(3u64)] {
        return Err(format!("unexpected keys after remove: {keys:?}"));
    }
    Ok(())
}

/// Clear removes every entry of one contract and nothing else.
async fn clear_empties_only_that_contract<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: TransactionStore + Clone,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    for i in 1..=2u64 {
        s.put(contract_a(), U256::from(i), payload("a"), metadata())
            .await
            .map_err(|e| e.to_string())?;
    }
    s.put(contract_b(), U256::from(1u64), payload("b"), metadata())
        .await
        .map_err(|e| e.to_string())?;

    let cleared = s.clear(contract_a()).await.map_err(|e| e.to_string())?;
    if cleared != 2 {
        return Err(format!("expected 2 cleared, got {cleared}"));
    }
    if !s.get(contract_a()).await.map_err(|e| e.to_string())?.is_empty() {
        return Err("contract A not empty after clear".to_string());
    }
    if s.get(contract_b()).await.map_err(|e| e.to_string())?.len() != 1 {
        return Err("contract B affected by clear of A".to_string());
    }
    Ok(())
}

/// `contracts` lists contracts holding entries, sorted.
async fn contracts_lists_non_empty_tables<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: TransactionStore + Clone,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    s.put(contract_b(), U256::from(1u64), payload("b"), metadata())
        .await
        .map_err(|e| e.to_string())?;
    s.put(contract_a(), U256::from(1u64), payload("a"), metadata())
        .await
        .map_err(|e| e.to_string())?;
    s.remove(contract_b(), U256::from(1u64))
        .await
        .map_err(|e| e.to_string())?;

    let contracts = s.contracts().await.map_err(|e| e.to_string())?;
    if contracts != vec![contract_a()] {
        return Err(format!("expected only contract A, got {contracts:?}"));
    }
    Ok(())
}
