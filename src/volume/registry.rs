// CLASSIFICATION: COMMUNITY
// Filename: registry.rs v0.6
// Author: Lukas Bower
// Date Modified: 2026-01-22

//! In-memory handle registry.
//!
//! The map itself is guarded by a plain mutex held only for map edits
//! and scans. Each entry carries its own `RwLock`: structural mutations
//! (convert, stream-in, destroy) hold the write side for their whole
//! filesystem operation, reads share the read side. The COW parent
//! back-reference is duplicated outside the `RwLock` so the child scan
//! during destroy never touches per-volume locks.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::error::VolumeError;
use crate::volume::Volume;

/// A registered volume: immutable parent link plus guarded state.
#[derive(Debug)]
pub struct VolumeEntry {
    parent: Option<String>,
    state: RwLock<Volume>,
}

impl VolumeEntry {
    pub fn new(volume: Volume) -> Arc<Self> {
        Arc::new(VolumeEntry {
            parent: volume.parent().map(str::to_owned),
            state: RwLock::new(volume),
        })
    }

    pub fn parent(&self) -> Option<&str> {
        self.parent.as_deref()
    }

    pub fn read(&self) -> Result<RwLockReadGuard<'_, Volume>, VolumeError> {
        self.state.read().map_err(|_| VolumeError::LockPoisoned)
    }

    pub fn write(&self) -> Result<RwLockWriteGuard<'_, Volume>, VolumeError> {
        self.state.write().map_err(|_| VolumeError::LockPoisoned)
    }
}

/// Handle → volume map enforcing uniqueness and destruction ordering.
#[derive(Debug, Default)]
pub struct VolumeRegistry {
    volumes: Mutex<HashMap<String, Arc<VolumeEntry>>>,
}

impl VolumeRegistry {
    pub fn new() -> Self {
        VolumeRegistry::default()
    }

    /// Register `entry` under `handle`. Fails if the handle is taken.
    pub fn insert(&self, handle: &str, entry: Arc<VolumeEntry>) -> Result<(), VolumeError> {
        let mut map = self.lock()?;
        if map.contains_key(handle) {
            return Err(VolumeError::HandleExists(handle.to_owned()));
        }
        map.insert(handle.to_owned(), entry);
        Ok(())
    }

    pub fn get(&self, handle: &str) -> Result<Arc<VolumeEntry>, VolumeError> {
        self.lock()?
            .get(handle)
            .cloned()
            .ok_or_else(|| VolumeError::NotFound(handle.to_owned()))
    }

    /// Remove `handle` from the map, refusing while COW children exist.
    ///
    /// The caller still owns the returned entry and is expected to take
    /// its write lock before tearing down storage; once removed, no new
    /// operation can reach the volume.
    pub fn remove(&self, handle: &str) -> Result<Arc<VolumeEntry>, VolumeError> {
        let mut map = self.lock()?;
        if !map.contains_key(handle) {
            return Err(VolumeError::NotFound(handle.to_owned()));
        }
        if map
            .values()
            .any(|entry| entry.parent() == Some(handle))
        {
            return Err(VolumeError::HasChildren(handle.to_owned()));
        }
        // contains_key above makes this infallible.
        map.remove(handle)
            .ok_or_else(|| VolumeError::NotFound(handle.to_owned()))
    }

    /// True iff some registered volume names `handle` as its parent.
    pub fn has_children(&self, handle: &str) -> Result<bool, VolumeError> {
        Ok(self
            .lock()?
            .values()
            .any(|entry| entry.parent() == Some(handle)))
    }

    /// Snapshot of all registered entries, unordered.
    pub fn entries(&self) -> Result<Vec<Arc<VolumeEntry>>, VolumeError> {
        Ok(self.lock()?.values().cloned().collect())
    }

    pub fn len(&self) -> Result<usize, VolumeError> {
        Ok(self.lock()?.len())
    }

    pub fn is_empty(&self) -> Result<bool, VolumeError> {
        Ok(self.lock()?.is_empty())
    }

    fn lock(
        &self,
    ) -> Result<std::sync::MutexGuard<'_, HashMap<String, Arc<VolumeEntry>>>, VolumeError> {
        self.volumes.lock().map_err(|_| VolumeError::LockPoisoned)
    }
}
