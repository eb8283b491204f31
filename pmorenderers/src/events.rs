use std::net::IpAddr;
use std::sync::{Arc, Mutex, PoisonError};

use crossbeam_channel::{Receiver, Sender, unbounded};

/// Lifecycle notifications of the association registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryEvent {
    Associated {
        address: IpAddr,
        profile: String,
        recognized: bool,
    },
    Upgraded {
        address: IpAddr,
        from: String,
        to: String,
    },
    Removed {
        address: IpAddr,
        uuid: Option<String>,
    },
}

#[derive(Clone, Default)]
pub struct RegistryEventBus {
    subscribers: Arc<Mutex<Vec<Sender<RegistryEvent>>>>,
}

impl RegistryEventBus {
    pub fn new() -> Self {
        Self {
            subscribers: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn subscribe(&self) -> Receiver<RegistryEvent> {
        let (tx, rx) = unbounded::<RegistryEvent>();
        {
            let mut subscribers = self.subscribers.lock().unwrap_or_else(PoisonError::into_inner);
            subscribers.push(tx);
        }
        rx
    }

    pub(crate) fn broadcast(&self, event: RegistryEvent) {
        let mut subscribers = self.subscribers.lock().unwrap_or_else(PoisonError::into_inner);
        subscribers.retain(|tx| tx.send(event.clone()).is_ok());
    }
}

impl std::fmt::Debug for RegistryEventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let count = self.subscribers.lock().unwrap_or_else(PoisonError::into_inner).len();
        f.debug_struct("RegistryEventBus").field("subscribers", &count).finish()
    }
}
