// CLASSIFICATION: COMMUNITY
// Filename: mod.rs v0.4
// Author: Lukas Bower
// Date Modified: 2026-01-19

//! Filesystem utilities: lexical path hygiene and the tree walker.
//!
//! Every relative path that crosses a volume boundary (stream entry
//! names, user-supplied subpaths, walker output) is cleaned here before
//! any syscall sees it. Cleaning is purely textual; the filesystem is
//! never consulted, so a hostile symlink cannot influence the result.

pub mod walker;

pub use walker::{Entry, EntryKind, TreeWalker, WalkItem};

use std::fs::{File, OpenOptions};
use std::io;
use std::os::fd::AsRawFd;
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Component, Path, PathBuf};

use nix::sys::stat::{fchmod, Mode};
use nix::unistd::{fchown, fchownat, FchownatFlags, Gid, Uid};

use crate::error::VolumeError;

/// Resolve `.` and `..` segments of a relative path textually.
///
/// Returns the cleaned path, or `InvalidPath` if a `..` segment would
/// climb above the root or the path is absolute. An empty result (e.g.
/// from `"."`) means the root itself.
pub fn clean_rel(path: &Path) -> Result<PathBuf, VolumeError> {
    let mut stack: Vec<&std::ffi::OsStr> = Vec::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::Normal(part) => stack.push(part),
            Component::ParentDir => {
                if stack.pop().is_none() {
                    return Err(VolumeError::InvalidPath(path.to_path_buf()));
                }
            }
            Component::RootDir | Component::Prefix(_) => {
                return Err(VolumeError::InvalidPath(path.to_path_buf()));
            }
        }
    }
    Ok(stack.iter().collect())
}

/// Join a cleaned relative path onto `root`, refusing escapes.
pub fn join_checked(root: &Path, rel: &Path) -> Result<PathBuf, VolumeError> {
    let cleaned = clean_rel(rel)?;
    if cleaned.as_os_str().is_empty() {
        Ok(root.to_path_buf())
    } else {
        Ok(root.join(cleaned))
    }
}

/// Open an existing file for reading, refusing to traverse a final
/// symlink component.
pub(crate) fn open_nofollow(path: &Path) -> io::Result<File> {
    OpenOptions::new()
        .read(true)
        .custom_flags(libc::O_NOFOLLOW)
        .open(path)
}

/// Create (or truncate) a regular file for writing, refusing to
/// traverse a final symlink component.
pub(crate) fn create_nofollow(path: &Path) -> io::Result<File> {
    OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .custom_flags(libc::O_NOFOLLOW)
        .open(path)
}

/// chown operating on the link itself for symlinks.
pub(crate) fn chown_nofollow(path: &Path, uid: u32, gid: u32) -> io::Result<()> {
    fchownat(
        None,
        path,
        Some(Uid::from_raw(uid)),
        Some(Gid::from_raw(gid)),
        FchownatFlags::NoFollowSymlink,
    )
    .map_err(io::Error::from)
}

/// chown through an already-open descriptor. Must run before any chmod
/// that carries setuid/setgid, since chown strips those bits on files.
pub(crate) fn chown_fd(file: &File, uid: u32, gid: u32) -> io::Result<()> {
    fchown(
        file.as_raw_fd(),
        Some(Uid::from_raw(uid)),
        Some(Gid::from_raw(gid)),
    )
    .map_err(io::Error::from)
}

/// chmod through an already-open descriptor, full 12-bit mode field.
pub(crate) fn chmod_fd(file: &File, mode: u32) -> io::Result<()> {
    fchmod(file.as_raw_fd(), Mode::from_bits_truncate(mode)).map_err(io::Error::from)
}
