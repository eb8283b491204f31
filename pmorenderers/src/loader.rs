//! Chargement des profils depuis les répertoires de configuration.
//!
//! Les répertoires sont parcourus dans l'ordre (profils utilisateur puis
//! profils livrés), chaque répertoire dans l'ordre des noms de fichiers.
//! Seuls les fichiers `.conf` sont lus. Un fichier illisible ou invalide
//! est ignoré avec un avertissement, les autres continuent.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use pmoconfig::{ALL_RENDERERS, Config};
use tracing::{debug, info, warn};

use crate::collection::ProfileCollection;
use crate::errors::{ProfileError, RendererError};
use crate::overrides::{DeviceOverrides, OverrideSet};
use crate::profile::{CapabilityProfile, KEY_DEVICE_ID, ProfileHandle};
use crate::profile_file::ProfileFile;

pub const PROFILE_EXTENSION: &str = "conf";

/// Result of a full load.
#[derive(Debug)]
pub struct LoadedProfiles {
    pub collection: Arc<ProfileCollection>,
    pub overrides: Arc<OverrideSet>,
    /// One diagnostic per skipped file.
    pub skipped: Vec<ProfileError>,
}

#[derive(Debug, Clone)]
pub struct ProfileLoader {
    dirs: Vec<PathBuf>,
    selected: Vec<String>,
    default_name: Option<String>,
}

fn conf_files(dir: &Path) -> Vec<PathBuf> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            debug!(directory = %dir.display(), error = %e, "Profile directory not readable");
            return Vec::new();
        }
    };
    let mut files: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| {
            path.is_file()
                && path
                    .extension()
                    .is_some_and(|ext| ext.eq_ignore_ascii_case(PROFILE_EXTENSION))
        })
        .collect();
    files.sort_by_key(|p| p.file_name().map(|n| n.to_ascii_lowercase()));
    files
}

impl ProfileLoader {
    pub fn new(dirs: Vec<PathBuf>, selected: Vec<String>, default_name: Option<String>) -> Self {
        Self {
            dirs,
            selected,
            default_name,
        }
    }

    pub fn from_config(config: &Config) -> Result<Self, RendererError> {
        let dirs = config.get_renderers_dirs().map_err(RendererError::config)?;
        Ok(Self::new(
            dirs,
            config.get_selected_renderers(),
            config.get_default_renderer(),
        ))
    }

    pub fn dirs(&self) -> &[PathBuf] {
        &self.dirs
    }

    /// A profile is enabled when its name, its group or `All renderers` is
    /// selected.
    pub fn is_selected(&self, profile: &CapabilityProfile) -> bool {
        self.selected.iter().any(|s| {
            s.eq_ignore_ascii_case(ALL_RENDERERS)
                || s.eq_ignore_ascii_case(profile.name())
                || s.eq_ignore_ascii_case(profile.group())
        })
    }

    /// Reads and compiles one renderer profile file. A device file is
    /// refused: it cannot take the place of a renderer profile.
    pub fn compile_file(path: &Path, rank: usize) -> Result<CapabilityProfile, ProfileError> {
        let properties = ProfileFile::load(path)?;
        if properties.contains_key(KEY_DEVICE_ID) {
            return Err(ProfileError::KindChanged(path.to_path_buf()));
        }
        Ok(CapabilityProfile::compile(properties, Some(path.to_path_buf()))?.with_rank(rank))
    }

    pub fn load(&self) -> LoadedProfiles {
        let mut seen = HashSet::new();
        let mut all_names = Vec::new();
        let mut enabled = Vec::new();
        let mut overrides = Vec::new();
        let mut skipped = Vec::new();
        let mut rank = 0;

        for dir in &self.dirs {
            for path in conf_files(dir) {
                let properties = match ProfileFile::load(&path) {
                    Ok(p) => p,
                    Err(e) => {
                        warn!(file = %path.display(), error = %e, "Skipping profile file");
                        skipped.push(e);
                        continue;
                    }
                };

                if properties.contains_key(KEY_DEVICE_ID) {
                    match DeviceOverrides::new(properties, path.clone()) {
                        Some(o) => {
                            debug!(file = %path.display(), ids = ?o.ids(), "Loaded device file");
                            overrides.push(o);
                        }
                        None => warn!(file = %path.display(), "Device file names no device, ignored"),
                    }
                    continue;
                }

                let profile = match CapabilityProfile::compile(properties, Some(path.clone())) {
                    Ok(p) => p,
                    Err(e) => {
                        warn!(file = %path.display(), error = %e, "Skipping profile file");
                        skipped.push(e);
                        continue;
                    }
                };

                if !seen.insert(profile.name().to_lowercase()) {
                    debug!(
                        profile = %profile.name(),
                        file = %path.display(),
                        "A profile with this name is already loaded, skipping"
                    );
                    continue;
                }

                all_names.push(profile.name().to_string());
                if self.is_selected(&profile) {
                    debug!(profile = %profile.name(), rank, priority = profile.priority(), "Enabled profile");
                    enabled.push(ProfileHandle::new(profile.with_rank(rank)));
                } else {
                    debug!(profile = %profile.name(), "Profile not selected");
                }
                rank += 1;
            }
        }

        let default = self.default_handle(&enabled);
        info!(
            enabled = enabled.len(),
            loaded = all_names.len(),
            devices = overrides.len(),
            skipped = skipped.len(),
            default = %default.name(),
            "Renderer profiles loaded"
        );

        LoadedProfiles {
            collection: Arc::new(ProfileCollection::new(enabled, default, all_names)),
            overrides: Arc::new(OverrideSet::new(overrides)),
            skipped,
        }
    }

    fn default_handle(&self, enabled: &[Arc<ProfileHandle>]) -> Arc<ProfileHandle> {
        if let Some(name) = self.default_name.as_deref() {
            if let Some(handle) = enabled.iter().find(|h| h.name().eq_ignore_ascii_case(name)) {
                return Arc::clone(handle);
            }
            warn!(profile = name, "Configured default renderer is not an enabled profile, using built-in default");
        }
        ProfileHandle::new(CapabilityProfile::builtin_default())
    }
}
