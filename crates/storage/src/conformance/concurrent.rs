use std::future::Future;
use std::sync::Arc;

use warden_core::U256;

use super::{contract_a, metadata, payload, TestResult};
use crate::{StorageError, TransactionStore};

/// Number of concurrent tasks to spawn in each test.
const N: usize = 10;

pub(super) async fn run_concurrent_tests<S, F, Fut>(factory: &F) -> Vec<TestResult>
where
    S: TransactionStore + Clone,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let mut results = Vec::new();

    results.push(TestResult::from_result(
        "concurrent",
        "concurrent_puts_same_key_leave_one_entry",
        concurrent_puts_same_key_leave_one_entry(factory).await,
    ));
    results.push(TestResult::from_result(
        "concurrent",
        "concurrent_puts_different_keys_all_survive",
        concurrent_puts_different_keys_all_survive(factory).await,
    ));

    results
}

// ── Same key: last writer wins ──────────────────────────────────────────────

/// N tasks put different payloads under one key. Exactly one entry remains
/// and its payload is one of the written ones.
async fn concurrent_puts_same_key_leave_one_entry<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: TransactionStore + Clone,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let storage = Arc::new(factory().await);
    let tx_id = U256::from(1u64);

    let mut handles = Vec::new();
    for i in 0..N {
        let s = storage.clone();
        handles.push(tokio::spawn(async move {
            s.put(contract_a(), tx_id, payload(&format!("w{i}")), metadata())
                .await
                .map(|_| ())
        }));
    }
    for handle in handles {
        handle
            .await
            .map_err(|e| format!("task panic: {e}"))?
            .map_err(|e: StorageError| format!("storage error: {e}"))?;
    }

    let table = storage.get(contract_a()).await.map_err(|e| e.to_string())?;
    if table.len() != 1 {
        return Err(format!("expected 1 entry, got {}", table.len()));
    }
    let written: Vec<String> = (0..N).map(|i| payload(&format!("w{i}"))).collect();
    match table.get(&tx_id) {
        Some(entry) if written.contains(&entry.payload) => Ok(()),
        other => Err(format!("unexpected surviving entry {other:?}")),
    }
}

// ── Different keys: no lost writes ──────────────────────────────────────────

/// N tasks put N different keys. Every key is present afterwards.
async fn concurrent_puts_different_keys_all_survive<S, F, Fut>(
    factory: &F,
) -> Result<(), String>
where
    S: TransactionStore + Clone,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let storage = Arc::new(factory().await);

    let mut handles = Vec::new();
    for i in 0..N {
        let s = storage.clone();
        handles.push(tokio::spawn(async move {
            s.put(contract_a(), U256::from(i), payload("p"), metadata())
                .await
                .map(|_| ())
        }));
    }
    for handle in handles {
        handle
            .await
            .map_err(|e| format!("task panic: {e}"))?
            .map_err(|e: StorageError| format!("storage error: {e}"))?;
    }

    let table = storage.get(contract_a()).await.map_err(|e| e.to_string())?;
    if table.len() != N {
        return Err(format!("expected {N} entries, got {}", table.len()));
    }
    for i in 0..N {
        if !table.contains_key(&U256::from(i)) {
            return Err(format!("entry {i} lost"));
        }
    }
    Ok(())
}
