use std::path::Path;
use std::sync::{Arc, PoisonError, RwLock};

use crate::profile::{CapabilityProfile, ProfileHandle};

/// Enabled profiles, in resolution order, plus the default profile.
///
/// The order is priority descending then case-insensitive name, recomputed
/// by [`ProfileCollection::resort`] after a reload changed a profile.
#[derive(Debug)]
pub struct ProfileCollection {
    enabled: RwLock<Vec<Arc<ProfileHandle>>>,
    default: Arc<ProfileHandle>,
    all_names: Vec<String>,
}

fn sorted(handles: Vec<Arc<ProfileHandle>>) -> Vec<Arc<ProfileHandle>> {
    let mut keyed: Vec<(Arc<CapabilityProfile>, Arc<ProfileHandle>)> =
        handles.into_iter().map(|h| (h.load(), h)).collect();
    keyed.sort_by(|(a, _), (b, _)| CapabilityProfile::ordering(a, b));
    keyed.into_iter().map(|(_, h)| h).collect()
}

impl ProfileCollection {
    pub fn new(enabled: Vec<Arc<ProfileHandle>>, default: Arc<ProfileHandle>, mut all_names: Vec<String>) -> Self {
        all_names.sort_by_key(|n| n.to_lowercase());
        Self {
            enabled: RwLock::new(sorted(enabled)),
            default,
            all_names,
        }
    }

    /// Snapshot of the enabled profiles in resolution order.
    pub fn enabled(&self) -> Vec<Arc<ProfileHandle>> {
        self.enabled
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn default_profile(&self) -> Arc<ProfileHandle> {
        Arc::clone(&self.default)
    }

    /// Names of every loaded profile, enabled or not.
    pub fn all_names(&self) -> &[String] {
        &self.all_names
    }

    pub fn len(&self) -> usize {
        self.enabled.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn resort(&self) {
        let mut enabled = self.enabled.write().unwrap_or_else(PoisonError::into_inner);
        let current = std::mem::take(&mut *enabled);
        *enabled = sorted(current);
    }

    /// Drops `handle` from the enabled profiles. Associations already bound
    /// to it keep it.
    pub fn disable(&self, handle: &Arc<ProfileHandle>) -> bool {
        let mut enabled = self.enabled.write().unwrap_or_else(PoisonError::into_inner);
        let before = enabled.len();
        enabled.retain(|h| !Arc::ptr_eq(h, handle));
        enabled.len() != before
    }

    pub fn find_by_path(&self, path: &Path) -> Option<Arc<ProfileHandle>> {
        let enabled = self.enabled.read().unwrap_or_else(PoisonError::into_inner);
        enabled
            .iter()
            .chain(std::iter::once(&self.default))
            .find(|h| h.file().as_deref() == Some(path))
            .cloned()
    }

    /// First enabled profile whose name contains `name`, ignoring case.
    pub fn by_name(&self, name: &str) -> Option<Arc<ProfileHandle>> {
        let needle = name.trim().to_lowercase();
        if needle.is_empty() {
            return None;
        }
        self.enabled()
            .into_iter()
            .find(|h| h.name().to_lowercase().contains(&needle))
    }
}
