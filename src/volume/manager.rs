// CLASSIFICATION: COMMUNITY
// Filename: manager.rs v0.9
// Author: Lukas Bower
// Date Modified: 2026-01-23

//! Volume manager façade.
//!
//! Orchestrates the registry, the storage driver, the namespacer, and
//! the stream codec. Layout on disk: `<volumes_dir>/<handle>/` holds the
//! `meta.json` sidecar next to the driver-assigned data root, so stream
//! operations never see manager bookkeeping.
//!
//! Mutations hold the volume's write lock for their whole filesystem
//! span. A mutation that fails midway poisons the volume: retagging is
//! not idempotent, so recovery by retry would shift already-translated
//! entries a second time. Poisoned volumes accept nothing but destroy.

use std::fs;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use log::{info, warn};

use crate::driver::Driver;
use crate::error::VolumeError;
use crate::stream::StreamCodec;
use crate::uidgid::{Direction, IdRange, Namespacer, Translator};
use crate::volume::registry::{VolumeEntry, VolumeRegistry};
use crate::volume::{Flavor, Properties, Strategy, Volume};
use crate::CancelToken;

const SIDECAR: &str = "meta.json";

/// Public operation surface over a single host's volumes.
pub struct VolumeManager {
    volumes_dir: PathBuf,
    registry: VolumeRegistry,
    driver: Box<dyn Driver>,
    namespacer: Namespacer,
    codec: StreamCodec,
    range: IdRange,
}

impl VolumeManager {
    /// Build a manager rooted at `volumes_dir`, creating it if absent.
    pub fn new(
        volumes_dir: PathBuf,
        driver: Box<dyn Driver>,
        range: IdRange,
    ) -> Result<Self, VolumeError> {
        fs::create_dir_all(&volumes_dir)?;
        let translator = Translator::new(range);
        Ok(VolumeManager {
            volumes_dir,
            registry: VolumeRegistry::new(),
            driver,
            namespacer: Namespacer::new(translator),
            codec: StreamCodec::new(translator),
            range,
        })
    }

    pub fn range(&self) -> &IdRange {
        &self.range
    }

    /// Provision a volume. COW children are retagged when their flavor
    /// differs from the parent's; empty volumes never need a retag.
    pub fn create_volume(
        &self,
        handle: &str,
        strategy: Strategy,
        flavor: Flavor,
        properties: Properties,
        cancel: &CancelToken,
    ) -> Result<Volume, VolumeError> {
        validate_handle(handle)?;
        match strategy {
            Strategy::Empty => self.create_empty(handle, flavor, properties),
            Strategy::Cow { ref parent } => {
                self.create_cow(handle, parent.clone(), flavor, properties, cancel)
            }
        }
    }

    fn create_empty(
        &self,
        handle: &str,
        flavor: Flavor,
        properties: Properties,
    ) -> Result<Volume, VolumeError> {
        let handle_dir = self.make_handle_dir(handle)?;
        let data = match self.driver.create_empty(&handle_dir) {
            Ok(p) => p,
            Err(e) => {
                let _ = fs::remove_dir_all(&handle_dir);
                return Err(e);
            }
        };
        let volume = Volume {
            handle: handle.to_owned(),
            path: data,
            flavor,
            strategy: Strategy::Empty,
            properties,
            poisoned: false,
        };
        self.publish(volume)
    }

    fn create_cow(
        &self,
        handle: &str,
        parent: String,
        flavor: Flavor,
        properties: Properties,
        cancel: &CancelToken,
    ) -> Result<Volume, VolumeError> {
        let parent_entry = self.registry.get(&parent).map_err(|e| match e {
            VolumeError::NotFound(h) => VolumeError::ParentMissing(h),
            other => other,
        })?;

        // Parent read lock held exactly as long as the snapshot takes;
        // the child is locked before it becomes visible.
        let parent_state = parent_entry.read()?;
        if parent_state.poisoned {
            return Err(VolumeError::PoisonedParent(parent));
        }
        let parent_flavor = parent_state.flavor;
        let parent_path = parent_state.path.clone();

        let handle_dir = self.make_handle_dir(handle)?;
        let data = match self.driver.create_cow(&handle_dir, &parent_path) {
            Ok(p) => p,
            Err(e) => {
                let _ = fs::remove_dir_all(&handle_dir);
                return Err(e);
            }
        };
        drop(parent_state);

        let volume = Volume {
            handle: handle.to_owned(),
            path: data.clone(),
            flavor,
            strategy: Strategy::Cow { parent },
            properties,
            poisoned: false,
        };
        let entry = VolumeEntry::new(volume);
        let mut guard = entry.write()?;
        if let Err(e) = self.registry.insert(handle, entry.clone()) {
            drop(guard);
            let _ = self.driver.destroy(&data);
            let _ = fs::remove_dir_all(&handle_dir);
            return Err(e);
        }

        let direction = parent_flavor.retag_direction(flavor);
        if direction != Direction::Identity {
            if let Err(e) = self.namespacer.retag(&data, direction, cancel) {
                guard.poisoned = true;
                self.persist_sidecar(&guard);
                warn!("volume {handle} poisoned during post-clone retag: {e}");
                return Err(e);
            }
        }
        self.write_sidecar(&guard)?;
        info!(
            "created volume {handle} ({:?}, cow of {:?})",
            flavor,
            guard.parent()
        );
        Ok(guard.clone())
    }

    /// Fetch a volume record by handle.
    pub fn lookup(&self, handle: &str) -> Result<Volume, VolumeError> {
        Ok(self.registry.get(handle)?.read()?.clone())
    }

    /// All volumes whose properties match every pair in `filter`.
    pub fn list(&self, filter: &Properties) -> Result<Vec<Volume>, VolumeError> {
        let mut out = Vec::new();
        for entry in self.registry.entries()? {
            let state = entry.read()?;
            if state.matches(filter) {
                out.push(state.clone());
            }
        }
        out.sort_by(|a, b| a.handle.cmp(&b.handle));
        Ok(out)
    }

    /// Convert a volume to `flavor`, retagging its whole tree in place.
    /// A no-op when the flavor already matches. Refused while COW
    /// children exist, since their snapshots reference the tree.
    pub fn set_flavor(
        &self,
        handle: &str,
        flavor: Flavor,
        cancel: &CancelToken,
    ) -> Result<(), VolumeError> {
        let entry = self.registry.get(handle)?;
        let mut guard = entry.write()?;
        if guard.poisoned {
            return Err(VolumeError::Poisoned(handle.to_owned()));
        }
        if guard.flavor == flavor {
            return Ok(());
        }
        if self.registry.has_children(handle)? {
            return Err(VolumeError::InUse(handle.to_owned()));
        }
        let direction = guard.flavor.retag_direction(flavor);
        if let Err(e) = self.namespacer.retag(&guard.path, direction, cancel) {
            guard.poisoned = true;
            self.persist_sidecar(&guard);
            warn!("volume {handle} poisoned during flavor conversion: {e}");
            return Err(e);
        }
        guard.flavor = flavor;
        self.write_sidecar(&guard)?;
        info!("converted volume {handle} to {flavor:?}");
        Ok(())
    }

    /// Attach or overwrite one property.
    pub fn set_property(&self, handle: &str, key: &str, value: &str) -> Result<(), VolumeError> {
        let entry = self.registry.get(handle)?;
        let mut guard = entry.write()?;
        if guard.poisoned {
            return Err(VolumeError::Poisoned(handle.to_owned()));
        }
        guard.properties.insert(key.to_owned(), value.to_owned());
        self.write_sidecar(&guard)
    }

    /// Stream the tree at `subpath` out as tar, wire ownership in host
    /// form. Runs under the volume's read lock; concurrent reads share.
    pub fn stream_out(
        &self,
        handle: &str,
        subpath: &Path,
        out: &mut dyn Write,
        cancel: &CancelToken,
    ) -> Result<(), VolumeError> {
        let entry = self.registry.get(handle)?;
        let guard = entry.read()?;
        if guard.poisoned {
            return Err(VolumeError::Poisoned(handle.to_owned()));
        }
        self.codec
            .pack(&guard.path, subpath, guard.flavor, out, cancel)
    }

    /// Consume a tar stream into `subpath`, translating wire ownership
    /// into the volume's stored form. Partial failure poisons.
    pub fn stream_in(
        &self,
        handle: &str,
        subpath: &Path,
        input: &mut dyn Read,
        cancel: &CancelToken,
    ) -> Result<(), VolumeError> {
        let entry = self.registry.get(handle)?;
        let mut guard = entry.write()?;
        if guard.poisoned {
            return Err(VolumeError::Poisoned(handle.to_owned()));
        }
        match self
            .codec
            .unpack(&guard.path, subpath, guard.flavor, input, cancel)
        {
            Ok(()) => Ok(()),
            Err(e) => {
                // Earlier entries of the stream may already be on disk,
                // so even input-level failures leave undefined state.
                guard.poisoned = true;
                self.persist_sidecar(&guard);
                warn!("volume {handle} poisoned during stream-in: {e}");
                Err(e)
            }
        }
    }

    /// Unregister and tear down a volume. Poisoned volumes are allowed
    /// here and only here. Refused while COW children exist.
    pub fn destroy(&self, handle: &str) -> Result<(), VolumeError> {
        let entry = self.registry.remove(handle)?;
        let guard = entry.write()?;
        self.driver.destroy(&guard.path)?;
        let handle_dir = self.volumes_dir.join(handle);
        if let Err(e) = fs::remove_dir_all(&handle_dir) {
            if e.kind() != std::io::ErrorKind::NotFound {
                return Err(VolumeError::backend(e));
            }
        }
        info!("destroyed volume {handle}");
        Ok(())
    }

    /// Rebuild the registry from on-disk sidecars. Returns how many
    /// volumes were recovered; unreadable sidecars are skipped loudly.
    pub fn recover(&self) -> Result<usize, VolumeError> {
        let mut recovered = 0usize;
        for dirent in fs::read_dir(&self.volumes_dir)? {
            let dirent = dirent?;
            let sidecar = dirent.path().join(SIDECAR);
            let raw = match fs::read(&sidecar) {
                Ok(raw) => raw,
                Err(_) => continue,
            };
            let volume: Volume = match serde_json::from_slice(&raw) {
                Ok(v) => v,
                Err(e) => {
                    warn!("skipping unreadable sidecar {}: {e}", sidecar.display());
                    continue;
                }
            };
            if !volume.path.is_dir() {
                warn!(
                    "skipping volume {} with missing data root {}",
                    volume.handle,
                    volume.path.display()
                );
                continue;
            }
            let handle = volume.handle.clone();
            match self.registry.insert(&handle, VolumeEntry::new(volume)) {
                Ok(()) => recovered += 1,
                Err(VolumeError::HandleExists(_)) => {}
                Err(e) => return Err(e),
            }
        }
        info!("recovered {recovered} volumes from {}", self.volumes_dir.display());
        Ok(recovered)
    }

    fn publish(&self, volume: Volume) -> Result<Volume, VolumeError> {
        let handle = volume.handle.clone();
        let data = volume.path.clone();
        self.write_sidecar(&volume)?;
        let record = volume.clone();
        if let Err(e) = self.registry.insert(&handle, VolumeEntry::new(volume)) {
            let _ = self.driver.destroy(&data);
            let _ = fs::remove_dir_all(self.volumes_dir.join(&handle));
            return Err(e);
        }
        info!("created volume {handle} ({:?}, empty)", record.flavor);
        Ok(record)
    }

    fn make_handle_dir(&self, handle: &str) -> Result<PathBuf, VolumeError> {
        let handle_dir = self.volumes_dir.join(handle);
        match fs::create_dir(&handle_dir) {
            Ok(()) => Ok(handle_dir),
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                Err(VolumeError::HandleExists(handle.to_owned()))
            }
            Err(e) => Err(VolumeError::backend(e)),
        }
    }

    fn write_sidecar(&self, volume: &Volume) -> Result<(), VolumeError> {
        let path = self.volumes_dir.join(&volume.handle).join(SIDECAR);
        let raw = serde_json::to_vec_pretty(volume)
            .map_err(|e| VolumeError::backend(std::io::Error::other(e)))?;
        fs::write(path, raw).map_err(VolumeError::backend)
    }

    /// Best-effort sidecar update on the poisoning path, where the
    /// original error must win.
    fn persist_sidecar(&self, volume: &Volume) {
        if let Err(e) = self.write_sidecar(volume) {
            warn!("could not persist sidecar for {}: {e}", volume.handle);
        }
    }
}

fn validate_handle(handle: &str) -> Result<(), VolumeError> {
    let ok = !handle.is_empty()
        && handle != "."
        && handle != ".."
        && handle
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
    if ok {
        Ok(())
    } else {
        Err(VolumeError::InvalidPath(PathBuf::from(handle)))
    }
}
