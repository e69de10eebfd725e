// CLASSIFICATION: COMMUNITY
// Filename: naive.rs v0.4
// Author: Lukas Bower
// Date Modified: 2026-01-22

//! Deep-copy backend.
//!
//! Clones are full copies, so write isolation between parent and child
//! is trivial. Ownership, modes (including setuid/setgid), and symlink
//! target strings are carried verbatim; symlinks are copied as links,
//! never followed.

use std::fs;
use std::io;
use std::os::unix::fs::{symlink, MetadataExt, PermissionsExt};
use std::path::{Path, PathBuf};

use log::debug;

use crate::driver::Driver;
use crate::error::VolumeError;
use crate::fs::{
    chmod_fd, chown_fd, chown_nofollow, create_nofollow, open_nofollow, EntryKind, TreeWalker,
    WalkItem,
};

const DATA_DIR: &str = "volume";

/// Backend that materializes every volume as a plain directory tree.
#[derive(Debug, Default)]
pub struct NaiveDriver;

impl NaiveDriver {
    pub fn new() -> Self {
        NaiveDriver
    }
}

impl Driver for NaiveDriver {
    fn create_empty(&self, dest: &Path) -> Result<PathBuf, VolumeError> {
        let data = dest.join(DATA_DIR);
        fs::create_dir(&data).map_err(VolumeError::backend)?;
        Ok(data)
    }

    fn create_cow(&self, dest: &Path, parent: &Path) -> Result<PathBuf, VolumeError> {
        let data = dest.join(DATA_DIR);
        fs::create_dir(&data).map_err(VolumeError::backend)?;
        copy_tree(parent, &data).map_err(VolumeError::backend)?;
        Ok(data)
    }

    fn destroy(&self, data: &Path) -> Result<(), VolumeError> {
        match fs::remove_dir_all(data) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(VolumeError::backend(e)),
        }
    }
}

/// Copy `src` onto `dst` (both directories), preserving ownership and
/// the full mode field of every entry.
fn copy_tree(src: &Path, dst: &Path) -> io::Result<()> {
    let result = TreeWalker::new().walk(src, |item| {
        let entry = match item {
            WalkItem::Entry(e) => e,
            WalkItem::Failed { error, .. } => return Err(VolumeError::Io(error)),
        };
        let target = if entry.rel_path.as_os_str().is_empty() {
            dst.to_path_buf()
        } else {
            dst.join(&entry.rel_path)
        };
        let uid = entry.meta.uid();
        let gid = entry.meta.gid();
        let mode = entry.meta.mode() & 0o7777;
        match entry.kind {
            EntryKind::Dir => {
                if !target.is_dir() {
                    fs::create_dir(&target)?;
                }
                chown_nofollow(&target, uid, gid)?;
                fs::set_permissions(&target, fs::Permissions::from_mode(mode))?;
            }
            EntryKind::File => {
                let mut reader = open_nofollow(&entry.path)?;
                let mut writer = create_nofollow(&target)?;
                io::copy(&mut reader, &mut writer)?;
                chown_fd(&writer, uid, gid)?;
                chmod_fd(&writer, mode)?;
            }
            EntryKind::Symlink => {
                let link = fs::read_link(&entry.path)?;
                symlink(&link, &target)?;
                chown_nofollow(&target, uid, gid)?;
            }
            EntryKind::Other => {
                debug!("skipping special file {}", entry.path.display());
            }
        }
        Ok(())
    });
    match result {
        Ok(()) => Ok(()),
        Err(VolumeError::Io(e)) => Err(e),
        Err(other) => Err(io::Error::other(other)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn clone_is_isolated_from_parent() {
        let tmp = tempdir().unwrap();
        let parent_dir = tmp.path().join("parent");
        let child_dir = tmp.path().join("child");
        fs::create_dir_all(&parent_dir).unwrap();
        fs::create_dir_all(&child_dir).unwrap();

        let driver = NaiveDriver::new();
        let parent_data = driver.create_empty(&parent_dir).unwrap();
        fs::write(parent_data.join("shared"), b"original").unwrap();

        let child_data = driver.create_cow(&child_dir, &parent_data).unwrap();
        assert_eq!(fs::read(child_data.join("shared")).unwrap(), b"original");

        fs::write(child_data.join("shared"), b"mutated").unwrap();
        assert_eq!(fs::read(parent_data.join("shared")).unwrap(), b"original");
    }

    #[test]
    fn clone_preserves_modes_and_symlinks() {
        let tmp = tempdir().unwrap();
        let parent_dir = tmp.path().join("parent");
        let child_dir = tmp.path().join("child");
        fs::create_dir_all(&parent_dir).unwrap();
        fs::create_dir_all(&child_dir).unwrap();

        let driver = NaiveDriver::new();
        let parent_data = driver.create_empty(&parent_dir).unwrap();
        let file = parent_data.join("tool");
        fs::write(&file, b"x").unwrap();
        fs::set_permissions(&file, fs::Permissions::from_mode(0o2711)).unwrap();
        symlink("/nonexistent/target", parent_data.join("dangling")).unwrap();

        let child_data = driver.create_cow(&child_dir, &parent_data).unwrap();
        let copied = fs::symlink_metadata(child_data.join("tool")).unwrap();
        assert_eq!(copied.permissions().mode() & 0o7777, 0o2711);
        let link = fs::read_link(child_data.join("dangling")).unwrap();
        assert_eq!(link, PathBuf::from("/nonexistent/target"));
    }

    #[test]
    fn destroy_is_idempotent() {
        let tmp = tempdir().unwrap();
        let dir = tmp.path().join("vol");
        fs::create_dir_all(&dir).unwrap();
        let driver = NaiveDriver::new();
        let data = driver.create_empty(&dir).unwrap();
        driver.destroy(&data).unwrap();
        driver.destroy(&data).unwrap();
        assert!(!data.exists());
    }
}
