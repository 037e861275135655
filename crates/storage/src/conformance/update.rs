use std::future::Future;

use warden_core::U256;

use super::{contract_a, metadata, payload, TestResult};
use crate::record::{EntryPatch, EntryStatus};
use crate::TransactionStore;

pub(super) async fn run_update_tests<S, F, Fut>(factory: &F) -> Vec<TestResult>
where
    S: TransactionStore + Clone,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let mut results = Vec::new();

    results.push(TestResult::from_result(
        "update",
        "update_flips_broadcast_flag",
        update_flips_broadcast_flag(factory).await,
    ));
    results.push(TestResult::from_result(
        "update",
        "update_sets_status_and_keeps_payload",
        update_sets_status_and_keeps_payload(factory).await,
    ));
    results.push(TestResult::from_result(
        "update",
        "empty_patch_changes_nothing",
        empty_patch_changes_nothing(factory).await,
    ));

    results
}

async fn update_flips_broadcast_flag<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: TransactionStore + Clone,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let tx_id = U256::from(3u64);
    s.put(contract_a(), tx_id, payload("p"), metadata())
        .await
        .map_err(|e| e.to_string())?;
    let updated = s
        .update(contract_a(), tx_id, EntryPatch::default().broadcast(true))
        .await
        .map_err(|e| e.to_string())?;
    if !updated.metadata.broadcast {
        return Err("returned entry not flagged as broadcast".to_string());
    }
    let stored = s
        .get_entry(contract_a(), tx_id)
        .await
        .map_err(|e| e.to_string())?
        .ok_or("entry vanished after update")?;
    if !stored.metadata.broadcast || stored.metadata.status != EntryStatus::Signed {
        return Err(format!("unexpected metadata {:?}", stored.metadata));
    }
    Ok(())
}

async fn update_sets_status_and_keeps_payload<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: TransactionStore + Clone,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let tx_id = U256::from(3u64);
    let original = s
        .put(contract_a(), tx_id, payload("p"), metadata())
        .await
        .map_err(|e| e.to_string())?;
    s.update(
        contract_a(),
        tx_id,
        EntryPatch::default()
            .broadcast(true)
            .status(EntryStatus::Unknown),
    )
    .await
    .map_err(|e| e.to_string())?;

    let stored = s
        .get_entry(contract_a(), tx_id)
        .await
        .map_err(|e| e.to_string())?
        .ok_or("entry vanished after update")?;
    if stored.metadata.status != EntryStatus::Unknown {
        return Err(format!("expected unknown, got {:?}", stored.metadata.status));
    }
    if stored.payload != original.payload || stored.created_at != original.created_at {
        return Err("update touched payload or timestamp".to_string());
    }
    if stored.metadata.operation != original.metadata.operation {
        return Err("update touched the operation name".to_string());
    }
    Ok(())
}

async fn empty_patch_changes_nothing<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: TransactionStore + Clone,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let tx_id = U256::from(4u64);
    let original = s
        .put(contract_a(), tx_id, payload("p"), metadata())
        .await
        .map_err(|e| e.to_string())?;
    let updated = s
        .update(contract_a(), tx_id, EntryPatch::default())
        .await
        .map_err(|e| e.to_string())?;
    if updated != original {
        return Err(format!("expected {original:?}, got {updated:?}"));
    }
    Ok(())
}
