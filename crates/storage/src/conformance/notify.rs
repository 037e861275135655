use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::broadcast::error::TryRecvError;
use warden_core::U256;

use super::{contract_a, contract_b, metadata, payload, TestResult};
use crate::feed::{ChangeKind, StoreEvent, StoreListener};
use crate::record::EntryPatch;
use crate::TransactionStore;

pub(super) async fn run_notify_tests<S, F, Fut>(factory: &F) -> Vec<TestResult>
where
    S: TransactionStore + Clone,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let mut results = Vec::new();

    results.push(TestResult::from_result(
        "notify",
        "every_mutation_emits_one_event",
        every_mutation_emits_one_event(factory).await,
    ));
    results.push(TestResult::from_result(
        "notify",
        "other_handle_observes_mutations",
        other_handle_observes_mutations(factory).await,
    ));
    results.push(TestResult::from_result(
        "notify",
        "all_listeners_are_notified",
        all_listeners_are_notified(factory).await,
    ));
    results.push(TestResult::from_result(
        "notify",
        "dropped_listener_is_released",
        dropped_listener_is_released(factory).await,
    ));
    results.push(TestResult::from_result(
        "notify",
        "events_are_scoped_to_contract",
        events_are_scoped_to_contract(factory).await,
    ));

    results
}

#[derive(Default)]
struct Counter(AtomicUsize);

impl StoreListener for Counter {
    fn on_change(&self, _event: &StoreEvent) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }
}

fn expect_event(
    rx: &mut tokio::sync::broadcast::Receiver<StoreEvent>,
    kind: ChangeKind,
) -> Result<(), String> {
    match rx.try_recv() {
        Ok(event) if event.kind == kind && event.contract == contract_a() => Ok(()),
        Ok(event) => Err(format!("expected {kind:?}, got {event:?}")),
        Err(e) => Err(format!("expected {kind:?}, got {e}")),
    }
}

/// put, update, remove and clear each publish exactly one event, in order.
async fn every_mutation_emits_one_event<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: TransactionStore + Clone,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let mut rx = s.subscribe(contract_a());
    let tx_id = U256::from(5u64);

    s.put(contract_a(), tx_id, payload("p"), metadata())
        .await
        .map_err(|e| e.to_string())?;
    s.update(contract_a(), tx_id, EntryPatch::default().broadcast(true))
        .await
        .map_err(|e| e.to_string())?;
    s.remove(contract_a(), tx_id)
        .await
        .map_err(|e| e.to_string())?;
    s.clear(contract_a()).await.map_err(|e| e.to_string())?;

    expect_event(&mut rx, ChangeKind::Put { tx_id })?;
    expect_event(&mut rx, ChangeKind::Updated { tx_id })?;
    expect_event(&mut rx, ChangeKind::Removed { tx_id })?;
    expect_event(&mut rx, ChangeKind::Cleared)?;
    match rx.try_recv() {
        Err(TryRecvError::Empty) => Ok(()),
        other => Err(format!("unexpected extra event: {other:?}")),
    }
}

/// A subscriber on one handle sees mutations made through another.
async fn other_handle_observes_mutations<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: TransactionStore + Clone,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let writer = factory().await;
    let reader = writer.clone();
    let mut rx = reader.subscribe(contract_a());

    writer
        .put(contract_a(), U256::from(1u64), payload("p"), metadata())
        .await
        .map_err(|e| e.to_string())?;
    expect_event(
        &mut rx,
        ChangeKind::Put {
            tx_id: U256::from(1u64),
        },
    )?;

    let seen = reader.get(contract_a()).await.map_err(|e| e.to_string())?;
    if seen.len() != 1 {
        return Err(format!("reader sees {} entries, expected 1", seen.len()));
    }
    Ok(())
}

/// Listeners registered on different handles are all called.
async fn all_listeners_are_notified<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: TransactionStore + Clone,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let other = s.clone();
    let first = Arc::new(Counter::default());
    let second = Arc::new(Counter::default());
    let first_dyn: Arc<dyn StoreListener> = first.clone();
    let second_dyn: Arc<dyn StoreListener> = second.clone();
    s.add_listener(contract_a(), &first_dyn);
    other.add_listener(contract_a(), &second_dyn);

    s.put(contract_a(), U256::from(1u64), payload("p"), metadata())
        .await
        .map_err(|e| e.to_string())?;
    other
        .remove(contract_a(), U256::from(1u64))
        .await
        .map_err(|e| e.to_string())?;

    let (a, b) = (
        first.0.load(Ordering::SeqCst),
        second.0.load(Ordering::SeqCst),
    );
    if a != 2 || b != 2 {
        return Err(format!("expected 2 calls each, got {a} and {b}"));
    }
    Ok(())
}

/// The store does not keep a dropped listener alive.
async fn dropped_listener_is_released<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: TransactionStore + Clone,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let counter = Arc::new(Counter::default());
    let listener: Arc<dyn StoreListener> = counter.clone();
    s.add_listener(contract_a(), &listener);
    drop(listener);
    drop(counter);

    s.put(contract_a(), U256::from(1u64), payload("p"), metadata())
        .await
        .map_err(|e| e.to_string())?;
    let live = s.feed().listener_count(contract_a());
    if live != 0 {
        return Err(format!("expected no live listeners, got {live}"));
    }
    Ok(())
}

/// A subscriber for one contract hears nothing about another.
async fn events_are_scoped_to_contract<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: TransactionStore + Clone,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let mut rx = s.subscribe(contract_a());
    s.put(contract_b(), U256::from(1u64), payload("p"), metadata())
        .await
        .map_err(|e| e.to_string())?;
    match rx.try_recv() {
        Err(TryRecvError::Empty) => Ok(()),
        other => Err(format!("contract A subscriber received {other:?}")),
    }
}
