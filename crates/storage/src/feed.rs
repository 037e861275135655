//! Per-contract change notification.
//!
//! Every store mutation publishes a [`StoreEvent`] on the channel of the
//! contract it touched. Consumers either hold a broadcast receiver
//! ([`ChangeFeed::subscribe`]) or register a [`StoreListener`], which is
//! held weakly: dropping the last `Arc` unregisters it.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use tokio::sync::broadcast;
use warden_core::{Address, U256};

const CHANNEL_CAPACITY: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeKind {
    Put { tx_id: U256 },
    Updated { tx_id: U256 },
    Removed { tx_id: U256 },
    Cleared,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreEvent {
    pub contract: Address,
    pub kind: ChangeKind,
}

pub trait StoreListener: Send + Sync {
    fn on_change(&self, event: &StoreEvent);
}

struct ContractChannel {
    sender: broadcast::Sender<StoreEvent>,
    listeners: Vec<Weak<dyn StoreListener>>,
}

impl ContractChannel {
    fn new() -> Self {
        let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self {
            sender,
            listeners: Vec::new(),
        }
    }
}

/// Publish/subscribe hub shared by every handle over one backing store.
#[derive(Default)]
pub struct ChangeFeed {
    channels: Mutex<HashMap<Address, ContractChannel>>,
}

impl ChangeFeed {
    pub fn new() -> Self {
        Self::default()
    }

    fn channels(&self) -> MutexGuard<'_, HashMap<Address, ContractChannel>> {
        // A panicking listener must not take the feed down with it.
        self.channels
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn subscribe(&self, contract: Address) -> broadcast::Receiver<StoreEvent> {
        self.channels()
            .entry(contract)
            .or_insert_with(ContractChannel::new)
            .sender
            .subscribe()
    }

    pub fn add_listener(&self, contract: Address, listener: &Arc<dyn StoreListener>) {
        self.channels()
            .entry(contract)
            .or_insert_with(ContractChannel::new)
            .listeners
            .push(Arc::downgrade(listener));
    }

    /// Deliver `event` to live listeners and subscribers. Listeners whose
    /// owner has gone away are pruned.
    pub fn publish(&self, event: StoreEvent) {
        let live: Vec<Arc<dyn StoreListener>> = {
            let mut channels = self.channels();
            let Some(channel) = channels.get_mut(&event.contract) else {
                return;
            };
            channel.listeners.retain(|weak| weak.strong_count() > 0);
            // No receivers is fine.
            let _ = channel.sender.send(event.clone());
            channel.listeners.iter().filter_map(Weak::upgrade).collect()
        };
        // Called outside the lock so listeners may touch the feed.
        for listener in live {
            listener.on_change(&event);
        }
    }

    /// Number of live listeners registered for `contract`.
    pub fn listener_count(&self, contract: Address) -> usize {
        self.channels()
            .get(&contract)
            .map(|c| c.listeners.iter().filter(|w| w.strong_count() > 0).count())
            .unwrap_or(0)
    }
}

impl std::fmt::Debug for ChangeFeed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChangeFeed")
            .field("contracts", &self.channels().len())
            .finish()
    }
}
