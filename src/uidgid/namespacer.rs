// CLASSIFICATION: COMMUNITY
// Filename: namespacer.rs v0.5
// Author: Lukas Bower
// Date Modified: 2026-01-19

//! In-place ownership rewrite of a whole tree.
//!
//! `retag` drives the walker over a volume root and rewrites every
//! entry's `(uid, gid)` through the translator. Stats and chowns both
//! operate on the link itself, never the target. chown strips setuid
//! and setgid from regular files, so the recorded mode is written back
//! afterwards. The first failure aborts the walk with the partial state
//! left on disk; the manager poisons the volume rather than retrying,
//! because entries already rewritten would be shifted a second time.

use std::fs;
use std::os::unix::fs::{MetadataExt, PermissionsExt};
use std::path::Path;

use log::debug;
use nix::unistd::{fchownat, FchownatFlags, Gid, Uid};

use crate::error::VolumeError;
use crate::fs::{EntryKind, TreeWalker, WalkItem};
use crate::uidgid::{Direction, Translator};
use crate::CancelToken;

/// Rewrites tree ownership between privilege flavors.
#[derive(Clone, Copy, Debug)]
pub struct Namespacer {
    translator: Translator,
}

impl Namespacer {
    pub fn new(translator: Translator) -> Self {
        Namespacer { translator }
    }

    /// Retag every entry beneath `root` (inclusive) in `direction`.
    ///
    /// Honors `cancel` at entry boundaries. Any translation or chown
    /// failure aborts immediately; the caller owns poisoning.
    pub fn retag(
        &self,
        root: &Path,
        direction: Direction,
        cancel: &CancelToken,
    ) -> Result<(), VolumeError> {
        if direction == Direction::Identity {
            return Ok(());
        }
        let mut entries = 0usize;
        TreeWalker::new().walk(root, |item| {
            let entry = match item {
                WalkItem::Entry(e) => e,
                WalkItem::Failed { error, .. } => return Err(VolumeError::Io(error)),
            };
            if cancel.is_cancelled() {
                return Err(VolumeError::Cancelled);
            }
            let (uid, gid) = self
                .translator
                .apply(direction, entry.meta.uid(), entry.meta.gid())?;
            fchownat(
                None,
                &entry.path,
                Some(Uid::from_raw(uid)),
                Some(Gid::from_raw(gid)),
                FchownatFlags::NoFollowSymlink,
            )
            .map_err(|e| VolumeError::Io(e.into()))?;
            if entry.kind != EntryKind::Symlink {
                // chown dropped any setuid/setgid; put the mode back.
                let mode = entry.meta.mode() & 0o7777;
                fs::set_permissions(&entry.path, fs::Permissions::from_mode(mode))?;
            }
            entries += 1;
            Ok(())
        })?;
        debug!(
            "retagged {} entries under {} ({:?})",
            entries,
            root.display(),
            direction
        );
        Ok(())
    }
}
