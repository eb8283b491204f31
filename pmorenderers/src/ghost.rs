//! Delayed removal of stale associations.
//!
//! Associations found invalid are not dropped right away: they are handed
//! to the [`GhostReaper`], which calls back after a grace delay. The
//! callback re-checks the live state before removing anything, and renewed
//! activity cancels the pending removal.

use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{RecvTimeoutError, Sender, unbounded};
use tracing::{debug, trace, warn};

use crate::association::DeviceAssociation;
use crate::errors::RendererError;

/// Tells whether a UPnP device is still reachable.
pub trait DeviceLocator: Send + Sync {
    fn locate(&self, uuid: &str) -> Option<IpAddr>;
}

/// UPnP devices currently announced on the network, by UUID.
#[derive(Debug, Default)]
pub struct UpnpDirectory {
    devices: RwLock<HashMap<String, IpAddr>>,
}

impl UpnpDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seen(&self, uuid: &str, address: IpAddr) {
        self.devices
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(uuid.to_string(), address);
    }

    pub fn lost(&self, uuid: &str) -> Option<IpAddr> {
        self.devices
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(uuid)
    }

    pub fn len(&self) -> usize {
        self.devices.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl DeviceLocator for UpnpDirectory {
    fn locate(&self, uuid: &str) -> Option<IpAddr> {
        self.devices
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(uuid)
            .copied()
    }
}

enum ReaperCommand {
    Schedule {
        association: Arc<DeviceAssociation>,
        deadline: Instant,
    },
    Cancel {
        address: IpAddr,
        id: u64,
    },
    Shutdown,
}

struct Pending {
    association: Arc<DeviceAssociation>,
    deadline: Instant,
}

pub struct GhostReaper {
    tx: Sender<ReaperCommand>,
    delay: Duration,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl std::fmt::Debug for GhostReaper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GhostReaper").field("delay", &self.delay).finish()
    }
}

impl GhostReaper {
    /// Starts the reaper thread. `on_expire` runs on that thread for every
    /// association whose delay elapsed without being cancelled.
    pub fn start<F>(delay: Duration, on_expire: F) -> Result<Self, RendererError>
    where
        F: Fn(Arc<DeviceAssociation>) + Send + 'static,
    {
        let (tx, rx) = unbounded::<ReaperCommand>();
        let name = "renderers-ghost-reaper".to_string();

        let handle = thread::Builder::new()
            .name(name.clone())
            .spawn(move || {
                let mut pending: Vec<Pending> = Vec::new();
                loop {
                    let next = pending.iter().map(|p| p.deadline).min();
                    let command = match next {
                        Some(deadline) => {
                            match rx.recv_timeout(deadline.saturating_duration_since(Instant::now())) {
                                Ok(command) => Some(command),
                                Err(RecvTimeoutError::Timeout) => None,
                                Err(RecvTimeoutError::Disconnected) => break,
                            }
                        }
                        None => match rx.recv() {
                            Ok(command) => Some(command),
                            Err(_) => break,
                        },
                    };

                    match command {
                        Some(ReaperCommand::Schedule {
                            association,
                            deadline,
                        }) => {
                            pending.retain(|p| !Arc::ptr_eq(&p.association, &association));
                            pending.push(Pending {
                                association,
                                deadline,
                            });
                        }
                        Some(ReaperCommand::Cancel { address, id }) => {
                            pending.retain(|p| !(p.association.address() == address && p.association.id() == id));
                        }
                        Some(ReaperCommand::Shutdown) => break,
                        None => {}
                    }

                    let now = Instant::now();
                    let (due, rest): (Vec<Pending>, Vec<Pending>) =
                        pending.drain(..).partition(|p| p.deadline <= now);
                    pending = rest;
                    for p in due {
                        trace!(address = %p.association.address(), "Ghost delay elapsed");
                        on_expire(p.association);
                    }
                }
                debug!(dropped = pending.len(), "Ghost reaper stopped");
            })
            .map_err(|e| RendererError::Thread(name, e))?;

        Ok(Self {
            tx,
            delay,
            handle: Mutex::new(Some(handle)),
        })
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    pub fn schedule(&self, association: Arc<DeviceAssociation>) {
        self.schedule_in(association, self.delay);
    }

    pub fn schedule_in(&self, association: Arc<DeviceAssociation>, delay: Duration) {
        debug!(address = %association.address(), delay_ms = delay.as_millis() as u64, "Scheduling ghost check");
        let command = ReaperCommand::Schedule {
            association,
            deadline: Instant::now() + delay,
        };
        if self.tx.send(command).is_err() {
            warn!("Ghost reaper is stopped, removal not scheduled");
        }
    }

    pub fn cancel(&self, association: &DeviceAssociation) {
        let _ = self.tx.send(ReaperCommand::Cancel {
            address: association.address(),
            id: association.id(),
        });
    }

    /// Stops the thread and waits for it. Pending removals are dropped.
    pub fn shutdown(&self) {
        let handle = self.handle.lock().unwrap_or_else(PoisonError::into_inner).take();
        if let Some(handle) = handle {
            let _ = self.tx.send(ReaperCommand::Shutdown);
            // Last owner released from the reaper thread itself
            if handle.thread().id() == thread::current().id() {
                return;
            }
            if handle.join().is_err() {
                warn!("Ghost reaper thread panicked");
            }
        }
    }
}

impl Drop for GhostReaper {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profile::{CapabilityProfile, ProfileHandle};
    use crossbeam_channel::unbounded;

    fn association(id: u64, address: &str) -> Arc<DeviceAssociation> {
        Arc::new(DeviceAssociation::new(
            id,
            address.parse().unwrap(),
            ProfileHandle::new(CapabilityProfile::builtin_default()),
            false,
        ))
    }

    #[test]
    fn test_fires_after_delay() {
        let (tx, rx) = unbounded();
        let reaper = GhostReaper::start(Duration::from_millis(20), move |a| {
            let _ = tx.send(a.id());
        })
        .unwrap();
        let started = Instant::now();
        reaper.schedule(association(1, "10.0.0.1"));
        assert_eq!(rx.recv_timeout(Duration::from_secs(2)).unwrap(), 1);
        assert!(started.elapsed() >= Duration::from_millis(20));
        reaper.shutdown();
    }

    #[test]
    fn test_cancel() {
        let (tx, rx) = unbounded();
        let reaper = GhostReaper::start(Duration::from_millis(50), move |a| {
            let _ = tx.send(a.id());
        })
        .unwrap();
        let first = association(1, "10.0.0.1");
        reaper.schedule(Arc::clone(&first));
        reaper.schedule(association(2, "10.0.0.2"));
        reaper.cancel(&first);
        assert_eq!(rx.recv_timeout(Duration::from_secs(2)).unwrap(), 2);
        assert!(rx.recv_timeout(Duration::from_millis(150)).is_err());
    }

    #[test]
    fn test_directory() {
        let directory = UpnpDirectory::new();
        let address: IpAddr = "10.0.0.3".parse().unwrap();
        directory.seen("abc", address);
        assert_eq!(directory.locate("abc"), Some(address));
        assert_eq!(directory.lost("abc"), Some(address));
        assert!(directory.locate("abc").is_none());
        assert!(directory.is_empty());
    }
}
