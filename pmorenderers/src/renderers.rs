use std::fs;
use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::Receiver;
use pmoconfig::Config;
use pmoformats::MediaInfo;
use tracing::{debug, info, warn};

use crate::association::DeviceAssociation;
use crate::collection::ProfileCollection;
use crate::errors::{ProfileError, RendererError};
use crate::events::RegistryEvent;
use crate::ghost::UpnpDirectory;
use crate::headers::SortedHeaders;
use crate::loader::ProfileLoader;
use crate::overrides::OverrideSet;
use crate::profile::{CapabilityProfile, Negotiation, ProfileHandle};
use crate::registry::AddressAssociationRegistry;
use crate::reload::{self, FileWatcher, ReloadOutcome, ReloadWorker};
use crate::resolver::ProfileResolver;
use crate::template;
use crate::upnp::UpnpDetails;

/// Settings of a [`Renderers`] engine.
#[derive(Debug, Clone)]
pub struct RenderersOptions {
    pub loader: ProfileLoader,
    /// Directory receiving generated profile files.
    pub profile_dir: PathBuf,
    pub force_default: bool,
    pub ghost_grace_delay: Duration,
    /// `None` disables the file watcher.
    pub reload_poll_interval: Option<Duration>,
    pub audio_resample: bool,
}

impl RenderersOptions {
    pub fn from_config(config: &Config) -> Result<Self, RendererError> {
        let poll = config.get_reload_poll_interval_ms();
        Ok(Self {
            loader: ProfileLoader::from_config(config)?,
            profile_dir: config.get_profile_dir().map_err(RendererError::config)?,
            force_default: config.get_force_default(),
            ghost_grace_delay: Duration::from_millis(config.get_ghost_grace_delay_ms()),
            reload_poll_interval: (poll > 0).then(|| Duration::from_millis(poll)),
            audio_resample: config.get_audio_resample(),
        })
    }
}

/// Renderer identification engine.
///
/// Construction loads the profiles and starts the ghost reaper, the reload
/// worker and, if enabled, the file watcher. [`Renderers::shutdown`] (or
/// dropping the engine) stops them.
#[derive(Debug)]
pub struct Renderers {
    options: RenderersOptions,
    collection: Arc<ProfileCollection>,
    overrides: Arc<OverrideSet>,
    skipped: Vec<ProfileError>,
    resolver: ProfileResolver,
    directory: Arc<UpnpDirectory>,
    registry: Arc<AddressAssociationRegistry>,
    reload: ReloadWorker,
    watcher: Option<FileWatcher>,
}

impl Renderers {
    pub fn new(config: &Config) -> Result<Self, RendererError> {
        Self::with_options(RenderersOptions::from_config(config)?)
    }

    pub fn with_options(options: RenderersOptions) -> Result<Self, RendererError> {
        let loaded = options.loader.load();
        let collection = loaded.collection;
        let overrides = loaded.overrides;

        let resolver = ProfileResolver::new(Arc::clone(&collection), options.force_default);
        let directory = Arc::new(UpnpDirectory::new());
        let registry = AddressAssociationRegistry::new(
            collection.default_profile(),
            Arc::clone(&overrides),
            directory.clone(),
        );
        registry.start_ghost_reaper(options.ghost_grace_delay)?;

        let reload = ReloadWorker::start(Arc::clone(&collection), Arc::clone(&overrides), options.loader.clone())?;
        let watcher = match options.reload_poll_interval {
            Some(interval) => {
                let mut files: Vec<PathBuf> = collection
                    .enabled()
                    .iter()
                    .filter_map(|h| h.file())
                    .collect();
                files.extend(overrides.iter().map(|o| o.path().to_path_buf()));
                Some(FileWatcher::start(files, interval, reload.sender())?)
            }
            None => None,
        };

        info!(
            profiles = collection.len(),
            force_default = options.force_default,
            "Renderer engine started"
        );

        Ok(Self {
            options,
            collection,
            overrides,
            skipped: loaded.skipped,
            resolver,
            directory,
            registry,
            reload,
            watcher,
        })
    }

    /// Association for an HTTP peer.
    ///
    /// A peer already bound to a matched profile is returned as is.
    /// Otherwise the headers are matched against the profiles; when nothing
    /// matches, the identifying headers are kept on the association.
    pub fn identify(&self, address: IpAddr, headers: &SortedHeaders) -> Arc<DeviceAssociation> {
        if let Some(existing) = self.registry.get(address).filter(|a| a.is_loaded()) {
            self.registry.touch(&existing);
            return existing;
        }

        let matched = self.resolver.resolve_by_headers(headers);
        let recognized = matched.is_some();
        let association = self.registry.resolve(address, matched);
        if !recognized {
            let identifiers = headers.identifiers();
            if association.identifiers() != identifiers {
                info!(
                    %address,
                    identifiers = ?identifiers,
                    "Media renderer was not recognized, using the default profile"
                );
                association.set_identifiers(identifiers);
            }
        }
        association
    }

    /// Association for a device announced through UPnP.
    pub fn upnp_device_seen(&self, address: IpAddr, details: UpnpDetails) -> Arc<DeviceAssociation> {
        let uuid = details.uuid();
        if let Some(uuid) = uuid.as_deref() {
            self.directory.seen(uuid, address);
        }

        let matched = self.resolver.resolve_by_upnp_details(&details);
        if matched.is_none() {
            debug!(%address, details = %details.details_string(), "No profile matches UPnP details");
        }
        let association = self.registry.resolve(address, matched);
        association.set_upnp_details(details);
        if let Some(uuid) = uuid.as_deref() {
            self.registry.bind_uuid(&association, uuid);
        }
        association
    }

    /// A UPnP device left the network: its association is checked and, if
    /// nothing else keeps it valid, reaped after the grace delay.
    pub fn upnp_device_lost(&self, uuid: &str) {
        let uuid = crate::upnp::normalize_udn(uuid);
        self.directory.lost(&uuid);
        match self.registry.get_by_uuid(&uuid) {
            Some(association) => {
                self.registry.verify(&association);
            }
            None => debug!(uuid = %uuid, "Lost device has no association"),
        }
    }

    pub fn association(&self, address: IpAddr) -> Option<Arc<DeviceAssociation>> {
        self.registry.get(address)
    }

    pub fn association_by_uuid(&self, uuid: &str) -> Option<Arc<DeviceAssociation>> {
        self.registry.get_by_uuid(&crate::upnp::normalize_udn(uuid))
    }

    pub fn associations(&self) -> Vec<Arc<DeviceAssociation>> {
        self.registry.associations()
    }

    /// How a media item is served to the device at `address`, or `None`
    /// when the address has no association.
    pub fn negotiate(&self, address: IpAddr, media: &MediaInfo, source_mime: &str) -> Option<Negotiation> {
        self.registry
            .get(address)
            .map(|a| a.profile().negotiate(media, source_mime, self.options.audio_resample))
    }

    /// Enabled profiles in resolution order.
    pub fn profiles(&self) -> Vec<Arc<CapabilityProfile>> {
        self.collection.enabled().iter().map(|h| h.load()).collect()
    }

    pub fn all_profile_names(&self) -> &[String] {
        self.collection.all_names()
    }

    pub fn default_profile(&self) -> Arc<CapabilityProfile> {
        self.collection.default_profile().load()
    }

    /// Files that failed to load.
    pub fn skipped(&self) -> &[ProfileError] {
        &self.skipped
    }

    pub fn resolver(&self) -> &ProfileResolver {
        &self.resolver
    }

    pub fn registry(&self) -> &Arc<AddressAssociationRegistry> {
        &self.registry
    }

    pub fn resolve_by_name(&self, name: &str) -> Option<Arc<ProfileHandle>> {
        self.resolver.resolve_by_name(name)
    }

    pub fn subscribe(&self) -> Receiver<RegistryEvent> {
        self.registry.subscribe()
    }

    /// Queues a reload of one file on the reload worker.
    pub fn notify_file_changed(&self, path: &Path) {
        self.reload.notify(path);
    }

    /// Reloads one file on the calling thread.
    pub fn reload_file(&self, path: &Path) -> Result<ReloadOutcome, ProfileError> {
        reload::reload_file(&self.collection, &self.overrides, &self.options.loader, path)
    }

    /// Writes a renderer profile for the device at `address`, based on
    /// `reference` (a profile name) or on the profile it is bound to.
    pub fn generate_profile(&self, address: IpAddr, reference: Option<&str>) -> Result<PathBuf, RendererError> {
        let association = self
            .registry
            .get(address)
            .ok_or_else(|| RendererError::UnknownDevice(address.to_string()))?;
        let reference = match reference {
            Some(name) => self
                .resolver
                .resolve_by_name(name)
                .ok_or_else(|| RendererError::UnknownProfile(name.to_string()))?
                .load(),
            None => association.base_profile(),
        };
        let text = match reference.file() {
            Some(file) => match fs::read_to_string(file) {
                Ok(text) => text,
                Err(e) => {
                    warn!(file = %file.display(), error = %e, "Cannot read reference profile");
                    String::new()
                }
            },
            None => reference.properties().keys().fold(String::new(), |mut acc, key| {
                for value in reference.properties().get_all(key) {
                    acc.push_str(&format!("{key} = {value}\n"));
                }
                acc
            }),
        };

        let name = association.display_name();
        let lines = template::renderer_profile_lines(
            &name,
            &association.identifiers(),
            association.upnp_details().as_ref(),
            Some((&reference, &text)),
        );
        template::write_profile(&self.options.profile_dir, &template::profile_file_name(&name), &lines)
    }

    /// Writes a device file for the device at `address`.
    pub fn generate_device_file(&self, address: IpAddr) -> Result<PathBuf, RendererError> {
        let association = self
            .registry
            .get(address)
            .ok_or_else(|| RendererError::UnknownDevice(address.to_string()))?;
        let name = association.display_name();
        let lines = template::device_profile_lines(&name, &association.device_id(), &association.base_profile());
        let file_name = template::profile_file_name(&format!("{name}-{}", association.device_id()));
        template::write_profile(&self.options.profile_dir, &file_name, &lines)
    }

    /// Stops the background threads. Associations are kept in memory.
    pub fn shutdown(&self) {
        if let Some(watcher) = &self.watcher {
            watcher.shutdown();
        }
        self.reload.shutdown();
        self.registry.shutdown();
        debug!("Renderer engine stopped");
    }
}

impl Drop for Renderers {
    fn drop(&mut self) {
        self.shutdown();
    }
}
