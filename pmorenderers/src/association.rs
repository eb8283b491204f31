//! Live binding between a peer address and a capability profile.

use std::net::IpAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::warn;

use crate::overrides::DeviceOverrides;
use crate::profile::{CapabilityProfile, ProfileHandle, UpnpMode};
use crate::profile_file::ProfileFile;
use crate::upnp::UpnpDetails;

/// Profile compiled with an override layer, valid while both inputs are the
/// same `Arc`s.
#[derive(Debug)]
struct EffectiveProfile {
    base: Arc<CapabilityProfile>,
    layer: Arc<ProfileFile>,
    profile: Arc<CapabilityProfile>,
}

#[derive(Debug)]
pub struct DeviceAssociation {
    id: u64,
    address: IpAddr,
    profile: RwLock<Arc<ProfileHandle>>,
    overrides: RwLock<Option<Arc<DeviceOverrides>>>,
    effective: Mutex<Option<EffectiveProfile>>,
    recognized: AtomicBool,
    loaded: AtomicBool,
    active: AtomicBool,
    uuid: RwLock<Option<String>>,
    upnp_details: RwLock<Option<UpnpDetails>>,
    identifiers: RwLock<Vec<String>>,
    first_seen: DateTime<Utc>,
    last_seen: RwLock<DateTime<Utc>>,
}

/// Serializable view of an association.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AssociationInfo {
    pub id: u64,
    pub address: IpAddr,
    pub name: String,
    pub profile: String,
    pub recognized: bool,
    pub loaded: bool,
    pub active: bool,
    pub uuid: Option<String>,
    pub override_file: Option<String>,
    pub identifiers: Vec<String>,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
}

impl DeviceAssociation {
    pub fn new(id: u64, address: IpAddr, profile: Arc<ProfileHandle>, recognized: bool) -> Self {
        let now = Utc::now();
        Self {
            id,
            address,
            profile: RwLock::new(profile),
            overrides: RwLock::new(None),
            effective: Mutex::new(None),
            recognized: AtomicBool::new(recognized),
            loaded: AtomicBool::new(recognized),
            active: AtomicBool::new(true),
            uuid: RwLock::new(None),
            upnp_details: RwLock::new(None),
            identifiers: RwLock::new(Vec::new()),
            first_seen: now,
            last_seen: RwLock::new(now),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn address(&self) -> IpAddr {
        self.address
    }

    pub fn profile_handle(&self) -> Arc<ProfileHandle> {
        Arc::clone(&self.profile.read().unwrap_or_else(PoisonError::into_inner))
    }

    /// Bound profile without the device overrides.
    pub fn base_profile(&self) -> Arc<CapabilityProfile> {
        self.profile_handle().load()
    }

    /// Bound profile with the device overrides applied, if any.
    pub fn profile(&self) -> Arc<CapabilityProfile> {
        let base = self.base_profile();
        let Some(overrides) = self.overrides() else {
            return base;
        };
        let layer = overrides.properties();

        let mut cache = self.effective.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(cached) = cache.as_ref() {
            if Arc::ptr_eq(&cached.base, &base) && Arc::ptr_eq(&cached.layer, &layer) {
                return Arc::clone(&cached.profile);
            }
        }
        match base.with_overrides(&layer) {
            Ok(profile) => {
                let profile = Arc::new(profile);
                *cache = Some(EffectiveProfile {
                    base,
                    layer,
                    profile: Arc::clone(&profile),
                });
                profile
            }
            Err(e) => {
                warn!(
                    address = %self.address,
                    file = %overrides.path().display(),
                    error = %e,
                    "Invalid device overrides, using the bound profile"
                );
                base
            }
        }
    }

    pub(crate) fn bind(&self, profile: Arc<ProfileHandle>) {
        *self.profile.write().unwrap_or_else(PoisonError::into_inner) = profile;
    }

    pub fn overrides(&self) -> Option<Arc<DeviceOverrides>> {
        self.overrides
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub(crate) fn set_overrides(&self, overrides: Option<Arc<DeviceOverrides>>) {
        *self.overrides.write().unwrap_or_else(PoisonError::into_inner) = overrides;
    }

    pub fn is_recognized(&self) -> bool {
        self.recognized.load(Ordering::Acquire)
    }

    pub(crate) fn set_recognized(&self, value: bool) {
        self.recognized.store(value, Ordering::Release);
    }

    /// Whether a profile has been matched for this device. An association
    /// bound to the default profile after a failed lookup stays unloaded so
    /// that a later lookup can still bind it.
    pub fn is_loaded(&self) -> bool {
        self.loaded.load(Ordering::Acquire)
    }

    pub(crate) fn set_loaded(&self, value: bool) {
        self.loaded.store(value, Ordering::Release);
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    pub(crate) fn set_active(&self, value: bool) {
        self.active.store(value, Ordering::Release);
    }

    pub fn uuid(&self) -> Option<String> {
        self.uuid.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub(crate) fn set_uuid(&self, uuid: &str) {
        *self.uuid.write().unwrap_or_else(PoisonError::into_inner) = Some(uuid.to_string());
    }

    pub fn upnp_details(&self) -> Option<UpnpDetails> {
        self.upnp_details
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn set_upnp_details(&self, details: UpnpDetails) {
        *self.upnp_details.write().unwrap_or_else(PoisonError::into_inner) = Some(details);
    }

    /// Headers recorded when the device was not recognized.
    pub fn identifiers(&self) -> Vec<String> {
        self.identifiers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn set_identifiers(&self, identifiers: Vec<String>) {
        *self.identifiers.write().unwrap_or_else(PoisonError::into_inner) = identifiers;
    }

    pub fn first_seen(&self) -> DateTime<Utc> {
        self.first_seen
    }

    pub fn last_seen(&self) -> DateTime<Utc> {
        *self.last_seen.read().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn touch(&self) {
        *self.last_seen.write().unwrap_or_else(PoisonError::into_inner) = Utc::now();
    }

    pub fn upnp_mode(&self) -> UpnpMode {
        self.profile().upnp_mode()
    }

    /// UUID when known, otherwise the address.
    pub fn device_id(&self) -> String {
        self.uuid().unwrap_or_else(|| self.address.to_string())
    }

    /// Name shown to users: the UPnP friendly name when known, else the
    /// profile name.
    pub fn display_name(&self) -> String {
        self.upnp_details()
            .and_then(|d| d.display_name())
            .unwrap_or_else(|| self.base_profile().name().to_string())
    }

    pub fn info(&self) -> AssociationInfo {
        AssociationInfo {
            id: self.id,
            address: self.address,
            name: self.display_name(),
            profile: self.base_profile().name().to_string(),
            recognized: self.is_recognized(),
            loaded: self.is_loaded(),
            active: self.is_active(),
            uuid: self.uuid(),
            override_file: self.overrides().map(|o| o.path().display().to_string()),
            identifiers: self.identifiers(),
            first_seen: self.first_seen,
            last_seen: self.last_seen(),
        }
    }
}
