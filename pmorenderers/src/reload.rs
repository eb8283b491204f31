//! Hot reload of profile files.
//!
//! The [`FileWatcher`] polls the modification time of every loaded file and
//! posts [`ReloadMessage::ProfileFileChanged`]. A single [`ReloadWorker`]
//! thread consumes those messages, recompiles the file and swaps the new
//! state into the existing handle, so associations bound to the profile see
//! the change on their next read.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, SystemTime};

use crossbeam_channel::{RecvTimeoutError, Sender, bounded, unbounded};
use tracing::{debug, info, warn};

use crate::collection::ProfileCollection;
use crate::errors::{ProfileError, RendererError};
use crate::loader::ProfileLoader;
use crate::overrides::OverrideSet;
use crate::profile::KEY_DEVICE_ID;
use crate::profile_file::ProfileFile;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReloadMessage {
    ProfileFileChanged(PathBuf),
    Shutdown,
}

/// What a reload did with a changed file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReloadOutcome {
    Profile,
    /// The reloaded profile is no longer selected and left the enabled list.
    Disabled,
    DeviceFile,
    /// The file is not one of the loaded profiles.
    Ignored,
}

/// Reloads one file synchronously.
///
/// A file that no longer compiles, or that switched between renderer
/// profile and device file, leaves the previous state in place. A profile
/// renamed out of the selection is disabled; a profile renamed into it
/// needs a restart, like a new file.
pub fn reload_file(
    collection: &ProfileCollection,
    overrides: &OverrideSet,
    selection: &ProfileLoader,
    path: &Path,
) -> Result<ReloadOutcome, ProfileError> {
    if let Some(handle) = collection.find_by_path(path) {
        let rank = handle.load().rank();
        let profile = ProfileLoader::compile_file(path, rank)?;
        let selected = selection.is_selected(&profile);
        let previous = handle.replace(profile);
        if !selected && collection.disable(&handle) {
            info!(file = %path.display(), profile = %handle.name(), "Reloaded profile is not selected, disabled");
            return Ok(ReloadOutcome::Disabled);
        }
        collection.resort();
        info!(
            file = %path.display(),
            profile = %handle.name(),
            previous_priority = previous.priority(),
            priority = handle.priority(),
            "Profile reloaded"
        );
        return Ok(ReloadOutcome::Profile);
    }

    if let Some(device) = overrides.find_by_path(path) {
        let properties = ProfileFile::load(path)?;
        if !properties.contains_key(KEY_DEVICE_ID) {
            return Err(ProfileError::KindChanged(path.to_path_buf()));
        }
        device.replace(properties);
        info!(file = %path.display(), ids = ?device.ids(), "Device file reloaded");
        return Ok(ReloadOutcome::DeviceFile);
    }

    debug!(file = %path.display(), "Changed file is not a loaded profile");
    Ok(ReloadOutcome::Ignored)
}

pub struct ReloadWorker {
    tx: Sender<ReloadMessage>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl std::fmt::Debug for ReloadWorker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReloadWorker").finish_non_exhaustive()
    }
}

impl ReloadWorker {
    pub fn start(
        collection: Arc<ProfileCollection>,
        overrides: Arc<OverrideSet>,
        selection: ProfileLoader,
    ) -> Result<Self, RendererError> {
        let (tx, rx) = unbounded::<ReloadMessage>();
        let name = "renderers-reload-worker".to_string();

        let handle = thread::Builder::new()
            .name(name.clone())
            .spawn(move || {
                loop {
                    let message = match rx.recv() {
                        Ok(m) => m,
                        Err(_) => {
                            debug!("Reload channel closed, worker exiting");
                            break;
                        }
                    };
                    match message {
                        ReloadMessage::ProfileFileChanged(path) => {
                            if let Err(e) = reload_file(&collection, &overrides, &selection, &path) {
                                warn!(file = %path.display(), error = %e, "Reload failed, keeping previous profile");
                            }
                        }
                        ReloadMessage::Shutdown => break,
                    }
                }
            })
            .map_err(|e| RendererError::Thread(name, e))?;

        Ok(Self {
            tx,
            handle: Mutex::new(Some(handle)),
        })
    }

    pub fn sender(&self) -> Sender<ReloadMessage> {
        self.tx.clone()
    }

    pub fn notify(&self, path: &Path) {
        if self
            .tx
            .send(ReloadMessage::ProfileFileChanged(path.to_path_buf()))
            .is_err()
        {
            warn!(file = %path.display(), "Reload worker is stopped");
        }
    }

    pub fn shutdown(&self) {
        let handle = self.handle.lock().unwrap_or_else(PoisonError::into_inner).take();
        if let Some(handle) = handle {
            let _ = self.tx.send(ReloadMessage::Shutdown);
            if handle.join().is_err() {
                warn!("Reload worker thread panicked");
            }
        }
    }
}

impl Drop for ReloadWorker {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn modified(path: &Path) -> Option<SystemTime> {
    path.metadata().and_then(|m| m.modified()).ok()
}

/// Polls a fixed set of files for modification.
///
/// Files created after start are not watched.
pub struct FileWatcher {
    stop: Sender<()>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl std::fmt::Debug for FileWatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileWatcher").finish_non_exhaustive()
    }
}

impl FileWatcher {
    pub fn start(paths: Vec<PathBuf>, interval: Duration, target: Sender<ReloadMessage>) -> Result<Self, RendererError> {
        let (stop, stop_rx) = bounded::<()>(1);
        let name = "renderers-file-watcher".to_string();

        let handle = thread::Builder::new()
            .name(name.clone())
            .spawn(move || {
                let mut known: HashMap<PathBuf, Option<SystemTime>> = paths
                    .into_iter()
                    .map(|path| {
                        let mtime = modified(&path);
                        (path, mtime)
                    })
                    .collect();
                debug!(files = known.len(), interval_ms = interval.as_millis() as u64, "Watching profile files");

                loop {
                    match stop_rx.recv_timeout(interval) {
                        Err(RecvTimeoutError::Timeout) => {}
                        Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                    }
                    for (path, last) in known.iter_mut() {
                        let current = modified(path);
                        if current == *last {
                            continue;
                        }
                        *last = current;
                        if current.is_none() {
                            debug!(file = %path.display(), "Profile file disappeared");
                            continue;
                        }
                        debug!(file = %path.display(), "Profile file changed");
                        if target.send(ReloadMessage::ProfileFileChanged(path.clone())).is_err() {
                            return;
                        }
                    }
                }
            })
            .map_err(|e| RendererError::Thread(name, e))?;

        Ok(Self {
            stop,
            handle: Mutex::new(Some(handle)),
        })
    }

    pub fn shutdown(&self) {
        let handle = self.handle.lock().unwrap_or_else(PoisonError::into_inner).take();
        if let Some(handle) = handle {
            let _ = self.stop.try_send(());
            if handle.join().is_err() {
                warn!("File watcher thread panicked");
            }
        }
    }
}

impl Drop for FileWatcher {
    fn drop(&mut self) {
        self.shutdown();
    }
}
