//! Per-device override files.
//!
//! A `.conf` file carrying a `Device` key does not describe a class of
//! renderers but one device, identified by its UUID or its address. Its
//! properties are layered over the profile the device is bound to.

use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};

use tracing::debug;

use crate::profile::KEY_DEVICE_ID;
use crate::profile_file::ProfileFile;
use crate::upnp::normalize_udn;

#[derive(Debug)]
struct OverrideState {
    ids: Vec<String>,
    properties: Arc<ProfileFile>,
}

/// Normalized device id: canonical UUID, or the trimmed lower-cased value.
pub fn normalize_device_id(id: &str) -> String {
    let id = id.trim();
    match uuid::Uuid::parse_str(id.strip_prefix("uuid:").unwrap_or(id)) {
        Ok(_) => normalize_udn(id),
        Err(_) => id.to_lowercase(),
    }
}

fn device_ids(properties: &ProfileFile) -> Vec<String> {
    properties
        .get_list(KEY_DEVICE_ID, &[','])
        .iter()
        .map(|id| normalize_device_id(id))
        .collect()
}

#[derive(Debug)]
pub struct DeviceOverrides {
    path: PathBuf,
    state: RwLock<OverrideState>,
}

impl DeviceOverrides {
    /// Builds the layer, `None` when the file names no device.
    pub fn new(properties: ProfileFile, path: PathBuf) -> Option<Arc<Self>> {
        let ids = device_ids(&properties);
        if ids.is_empty() {
            return None;
        }
        Some(Arc::new(Self {
            path,
            state: RwLock::new(OverrideState {
                ids,
                properties: Arc::new(properties),
            }),
        }))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn ids(&self) -> Vec<String> {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .ids
            .clone()
    }

    pub fn properties(&self) -> Arc<ProfileFile> {
        Arc::clone(
            &self
                .state
                .read()
                .unwrap_or_else(PoisonError::into_inner)
                .properties,
        )
    }

    /// Swaps in freshly read properties. The ids follow the new `Device`
    /// value; a file that lost its `Device` key keeps its previous ids.
    pub fn replace(&self, properties: ProfileFile) {
        let ids = device_ids(&properties);
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        if !ids.is_empty() {
            state.ids = ids;
        }
        state.properties = Arc::new(properties);
    }

    pub fn matches(&self, id: &str) -> bool {
        let id = normalize_device_id(id);
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .ids
            .iter()
            .any(|known| *known == id)
    }
}

/// All override layers found at load time.
#[derive(Debug, Default)]
pub struct OverrideSet {
    entries: Vec<Arc<DeviceOverrides>>,
}

impl OverrideSet {
    pub fn new(entries: Vec<Arc<DeviceOverrides>>) -> Self {
        Self { entries }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<DeviceOverrides>> {
        self.entries.iter()
    }

    /// Layer for a device, looked up by UUID first, then by address.
    pub fn find(&self, uuid: Option<&str>, address: IpAddr) -> Option<Arc<DeviceOverrides>> {
        let by_uuid = uuid.and_then(|uuid| self.entries.iter().find(|o| o.matches(uuid)));
        let found = by_uuid.or_else(|| {
            let address = address.to_string();
            self.entries.iter().find(|o| o.matches(&address))
        });
        if let Some(o) = found {
            debug!(%address, file = %o.path().display(), "Device override found");
        }
        found.cloned()
    }

    pub fn find_by_path(&self, path: &Path) -> Option<Arc<DeviceOverrides>> {
        self.entries.iter().find(|o| o.path() == path).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn layer(text: &str) -> Option<Arc<DeviceOverrides>> {
        DeviceOverrides::new(ProfileFile::parse(text), PathBuf::from("/tmp/device.conf"))
    }

    #[test]
    fn test_ids_are_normalized() {
        let o = layer("Device = uuid:3E8A1C2B-0000-1000-8000-0024BE000000, 192.168.1.20").unwrap();
        assert_eq!(
            o.ids(),
            vec![
                "3e8a1c2b-0000-1000-8000-0024be000000".to_string(),
                "192.168.1.20".to_string()
            ]
        );
        assert!(o.matches("3E8A1C2B-0000-1000-8000-0024BE000000"));
        assert!(o.matches("192.168.1.20"));
        assert!(!o.matches("192.168.1.21"));
    }

    #[test]
    fn test_file_without_device_is_not_a_layer() {
        assert!(layer("RendererName = X").is_none());
        assert!(layer("Device = ").is_none());
    }

    #[test]
    fn test_find_prefers_uuid() {
        let by_address = layer("Device = 10.0.0.5").unwrap();
        let by_uuid = DeviceOverrides::new(
            ProfileFile::parse("Device = 3e8a1c2b-0000-1000-8000-0024be000000"),
            PathBuf::from("/tmp/uuid.conf"),
        )
        .unwrap();
        let set = OverrideSet::new(vec![by_address, by_uuid]);
        let address: IpAddr = "10.0.0.5".parse().unwrap();

        let found = set
            .find(Some("uuid:3e8a1c2b-0000-1000-8000-0024be000000"), address)
            .unwrap();
        assert_eq!(found.path(), Path::new("/tmp/uuid.conf"));

        let found = set.find(None, address).unwrap();
        assert_eq!(found.path(), Path::new("/tmp/device.conf"));
    }

    #[test]
    fn test_replace_updates_ids() {
        let o = layer("Device = 10.0.0.5\nVideo = false").unwrap();
        o.replace(ProfileFile::parse("Device = 10.0.0.6\nVideo = true"));
        assert!(o.matches("10.0.0.6"));
        assert!(o.properties().get_bool("Video", false));
    }
}
