//! Registre des associations adresse → profil.
//!
//! Une seule association vivante par adresse. Toutes les opérations de
//! lecture-puis-écriture (`resolve`, `associate`, `bind_uuid`) se font sous
//! un unique verrou, si bien que deux résolutions simultanées d'une même
//! adresse partagent la même association. Les événements sont diffusés
//! après la libération du verrou.
//!
//! Les associations invalides ne sont jamais retirées immédiatement : elles
//! passent par le [`GhostReaper`], qui revérifie l'état au moment du retrait.

use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError, Weak};
use std::time::Duration;

use crossbeam_channel::Receiver;
use tracing::{debug, info, trace};

use crate::association::DeviceAssociation;
use crate::errors::RendererError;
use crate::events::{RegistryEvent, RegistryEventBus};
use crate::ghost::{DeviceLocator, GhostReaper};
use crate::overrides::OverrideSet;
use crate::profile::{ProfileHandle, UpnpMode};

#[derive(Debug, Default)]
struct RegistryState {
    by_address: HashMap<IpAddr, Arc<DeviceAssociation>>,
    by_uuid: HashMap<String, Arc<DeviceAssociation>>,
    uuid_address: HashMap<String, IpAddr>,
}

pub struct AddressAssociationRegistry {
    state: Mutex<RegistryState>,
    next_id: AtomicU64,
    default: Arc<ProfileHandle>,
    overrides: Arc<OverrideSet>,
    locator: Arc<dyn DeviceLocator>,
    events: RegistryEventBus,
    reaper: OnceLock<GhostReaper>,
}

impl std::fmt::Debug for AddressAssociationRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AddressAssociationRegistry")
            .field("associations", &self.len())
            .field("default", &self.default.name())
            .field("reaper", &self.reaper.get())
            .finish()
    }
}

impl AddressAssociationRegistry {
    /// Builds a registry without a reaper: invalid associations are then
    /// only marked inactive. See [`Self::start_ghost_reaper`].
    pub fn new(
        default: Arc<ProfileHandle>,
        overrides: Arc<OverrideSet>,
        locator: Arc<dyn DeviceLocator>,
    ) -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(RegistryState::default()),
            next_id: AtomicU64::new(1),
            default,
            overrides,
            locator,
            events: RegistryEventBus::new(),
            reaper: OnceLock::new(),
        })
    }

    /// Starts the reaper thread. It holds only a weak reference to the
    /// registry. Calling this twice keeps the first reaper.
    pub fn start_ghost_reaper(self: &Arc<Self>, delay: Duration) -> Result<(), RendererError> {
        if self.reaper.get().is_some() {
            return Ok(());
        }
        let registry: Weak<Self> = Arc::downgrade(self);
        let reaper = GhostReaper::start(delay, move |association| {
            if let Some(registry) = registry.upgrade() {
                registry.reap(association);
            }
        })?;
        if self.reaper.set(reaper).is_err() {
            debug!("Ghost reaper already started");
        }
        Ok(())
    }

    fn lock(&self) -> MutexGuard<'_, RegistryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn default_profile(&self) -> Arc<ProfileHandle> {
        Arc::clone(&self.default)
    }

    pub fn subscribe(&self) -> Receiver<RegistryEvent> {
        self.events.subscribe()
    }

    /// Binds `address` to `matched` (or to the default profile when
    /// nothing matched).
    ///
    /// A new association is recognized and loaded only when a profile
    /// matched. An existing one is rebound when it is not loaded yet or when
    /// `matched` has a strictly higher priority than its current profile;
    /// it is never downgraded. Every call marks the association active and
    /// cancels a pending removal.
    pub fn resolve(&self, address: IpAddr, matched: Option<Arc<ProfileHandle>>) -> Arc<DeviceAssociation> {
        let (association, event) = {
            let mut state = self.lock();
            let existing = state.by_address.get(&address).cloned();
            let (association, event) = match existing {
                None => {
                    let recognized = matched.is_some();
                    let profile = matched.unwrap_or_else(|| Arc::clone(&self.default));
                    let id = self.next_id.fetch_add(1, Ordering::Relaxed);
                    let association = Arc::new(DeviceAssociation::new(id, address, profile, recognized));
                    association.set_overrides(self.overrides.find(None, address));
                    state.by_address.insert(address, Arc::clone(&association));
                    let event = RegistryEvent::Associated {
                        address,
                        profile: association.base_profile().name().to_string(),
                        recognized,
                    };
                    (association, Some(event))
                }
                Some(existing) => {
                    let event = matched.and_then(|candidate| {
                        let current = existing.profile_handle();
                        let upgrade = !existing.is_loaded() || candidate.priority() > current.priority();
                        if !upgrade {
                            trace!(
                                %address,
                                current = %current.name(),
                                candidate = %candidate.name(),
                                "Keeping current binding"
                            );
                            return None;
                        }
                        let from = current.name();
                        let to = candidate.name();
                        existing.bind(candidate);
                        existing.set_loaded(true);
                        existing.set_recognized(true);
                        Some(RegistryEvent::Upgraded { address, from, to })
                    });
                    (existing, event)
                }
            };
            // Sous le verrou : `reap` relit l'état actif sous ce même verrou
            association.set_active(true);
            association.touch();
            (association, event)
        };

        if let Some(reaper) = self.reaper.get() {
            reaper.cancel(&association);
        }

        if let Some(event) = event {
            match &event {
                RegistryEvent::Associated {
                    profile, recognized, ..
                } => info!(%address, profile = %profile, recognized, "New renderer association"),
                RegistryEvent::Upgraded { from, to, .. } => {
                    info!(%address, from = %from, to = %to, "Renderer association upgraded")
                }
                RegistryEvent::Removed { .. } => {}
            }
            self.events.broadcast(event);
        }
        association
    }

    /// Marks an existing association as active again.
    pub fn touch(&self, association: &DeviceAssociation) {
        {
            let _state = self.lock();
            association.set_active(true);
            association.touch();
        }
        if let Some(reaper) = self.reaper.get() {
            reaper.cancel(association);
        }
    }

    /// Stores `association` for its address. A displaced association goes
    /// through ghost verification.
    pub fn associate(&self, association: Arc<DeviceAssociation>) -> Option<Arc<DeviceAssociation>> {
        let displaced = {
            let mut state = self.lock();
            if let Some(uuid) = association.uuid() {
                state.by_uuid.insert(uuid.clone(), Arc::clone(&association));
                state.uuid_address.insert(uuid, association.address());
            }
            state
                .by_address
                .insert(association.address(), Arc::clone(&association))
        };
        let displaced = displaced.filter(|d| !Arc::ptr_eq(d, &association));
        if let Some(d) = &displaced {
            debug!(address = %d.address(), "Association displaced");
            self.verify(d);
        }
        displaced
    }

    /// Indexes an association by UPnP UUID and attaches its device overrides.
    pub fn bind_uuid(&self, association: &Arc<DeviceAssociation>, uuid: &str) {
        association.set_uuid(uuid);
        if let Some(o) = self.overrides.find(Some(uuid), association.address()) {
            association.set_overrides(Some(o));
        }
        let displaced = {
            let mut state = self.lock();
            state.uuid_address.insert(uuid.to_string(), association.address());
            state.by_uuid.insert(uuid.to_string(), Arc::clone(association))
        };
        if let Some(d) = displaced.filter(|d| !Arc::ptr_eq(d, association)) {
            debug!(uuid, old = %d.address(), new = %association.address(), "UUID moved to a new association");
            self.verify(&d);
        }
    }

    pub fn get(&self, address: IpAddr) -> Option<Arc<DeviceAssociation>> {
        self.lock().by_address.get(&address).cloned()
    }

    pub fn get_by_uuid(&self, uuid: &str) -> Option<Arc<DeviceAssociation>> {
        self.lock().by_uuid.get(uuid).cloned()
    }

    pub fn address_of(&self, uuid: &str) -> Option<IpAddr> {
        self.lock().uuid_address.get(uuid).copied()
    }

    /// Every live association, by creation order.
    pub fn associations(&self) -> Vec<Arc<DeviceAssociation>> {
        let state = self.lock();
        let mut all: Vec<Arc<DeviceAssociation>> = state.by_address.values().cloned().collect();
        for a in state.by_uuid.values() {
            if !all.iter().any(|b| Arc::ptr_eq(a, b)) {
                all.push(Arc::clone(a));
            }
        }
        all.sort_by_key(|a| a.id());
        all
    }

    pub fn len(&self) -> usize {
        self.lock().by_address.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// An association stays valid while its control mode is blocked, while
    /// its UPnP device can be located, or, for a device never seen through
    /// UPnP, while it is still the one registered for its address.
    pub fn validate(&self, association: &Arc<DeviceAssociation>) -> bool {
        match self.validate_device(association) {
            Some(valid) => valid,
            None => Self::is_registered(&self.lock(), association),
        }
    }

    /// Verdict that does not depend on the registry state, if any.
    fn validate_device(&self, association: &DeviceAssociation) -> Option<bool> {
        if association.upnp_mode() == UpnpMode::Block {
            return Some(true);
        }
        association.uuid().map(|uuid| self.locator.locate(&uuid).is_some())
    }

    fn is_registered(state: &RegistryState, association: &Arc<DeviceAssociation>) -> bool {
        state
            .by_address
            .get(&association.address())
            .is_some_and(|current| Arc::ptr_eq(current, association))
    }

    /// Validates and, when invalid, deactivates the association and
    /// schedules its removal.
    pub fn verify(&self, association: &Arc<DeviceAssociation>) -> bool {
        if self.validate(association) {
            trace!(address = %association.address(), "Association still valid");
            return true;
        }
        association.set_active(false);
        match self.reaper.get() {
            Some(reaper) => reaper.schedule(Arc::clone(association)),
            None => debug!(address = %association.address(), "No ghost reaper, association left inactive"),
        }
        false
    }

    /// Removal at the end of the grace delay. Skipped if the association
    /// was used again or became valid in the meantime.
    ///
    /// `Removed` is broadcast only when an index actually dropped the
    /// association; a displaced one has nothing left to remove.
    pub fn reap(&self, association: Arc<DeviceAssociation>) {
        let address = association.address();
        let device = self.validate_device(&association);
        if device == Some(true) {
            debug!(%address, "Ghost revalidated, kept");
            return;
        }

        let uuid = association.uuid();
        let removed = {
            let mut state = self.lock();
            let registered = Self::is_registered(&state, &association);
            if association.is_active() || (device.is_none() && registered) {
                debug!(%address, "Ghost revalidated, kept");
                return;
            }

            let mut removed = false;
            if registered {
                state.by_address.remove(&address);
                removed = true;
            }
            if let Some(uuid) = uuid.as_deref() {
                if state
                    .by_uuid
                    .get(uuid)
                    .is_some_and(|a| Arc::ptr_eq(a, &association))
                {
                    state.by_uuid.remove(uuid);
                    state.uuid_address.remove(uuid);
                    removed = true;
                }
            }
            removed
        };

        if !removed {
            debug!(%address, uuid = ?uuid, "Ghost already displaced, nothing to remove");
            return;
        }
        info!(%address, uuid = ?uuid, "Removed ghost renderer association");
        self.events.broadcast(RegistryEvent::Removed { address, uuid });
    }

    pub fn shutdown(&self) {
        if let Some(reaper) = self.reaper.get() {
            reaper.shutdown();
        }
    }
}
