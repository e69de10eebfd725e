// CLASSIFICATION: COMMUNITY
// Filename: walker.rs v0.6
// Author: Lukas Bower
// Date Modified: 2026-01-19

//! Pre-order tree walker that never leaves the root.
//!
//! Symlinks are yielded as entries and never traversed, so a hostile
//! link inside a volume cannot route an operation outside it. Per-entry
//! I/O failures are handed to the visitor, which decides whether the
//! walk continues.

use std::collections::HashSet;
use std::fs::Metadata;
use std::io;
use std::os::unix::fs::MetadataExt;
use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use crate::error::VolumeError;
use crate::fs::clean_rel;

/// Classification of a walked entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EntryKind {
    Dir,
    File,
    Symlink,
    /// Fifos, sockets, device nodes.
    Other,
}

/// A single visited entry. `rel_path` is empty for the walk root.
#[derive(Debug)]
pub struct Entry {
    pub rel_path: PathBuf,
    pub path: PathBuf,
    pub kind: EntryKind,
    pub meta: Metadata,
}

/// Item delivered to the visitor: a readable entry or a per-entry failure.
#[derive(Debug)]
pub enum WalkItem<'a> {
    Entry(&'a Entry),
    Failed { rel_path: PathBuf, error: io::Error },
}

/// Walks a subtree in pre-order, root first.
#[derive(Clone, Copy, Debug, Default)]
pub struct TreeWalker {
    stable: bool,
}

impl TreeWalker {
    pub fn new() -> Self {
        TreeWalker { stable: false }
    }

    /// Enable stable iteration: entries sorted by name and hard links
    /// reported once per `(dev, ino)`.
    pub fn stable(mut self, on: bool) -> Self {
        self.stable = on;
        self
    }

    /// Visit every entry beneath `root`, including `root` itself.
    ///
    /// The visitor aborts the walk by returning an error. Entries whose
    /// cleaned relative path would escape `root` abort unconditionally
    /// with `InvalidPath`.
    pub fn walk<F>(&self, root: &Path, mut visit: F) -> Result<(), VolumeError>
    where
        F: FnMut(WalkItem<'_>) -> Result<(), VolumeError>,
    {
        let mut seen: HashSet<(u64, u64)> = HashSet::new();
        let mut iter = WalkDir::new(root).follow_links(false);
        if self.stable {
            iter = iter.sort_by_file_name();
        }
        for item in iter {
            let dirent = match item {
                Ok(d) => d,
                Err(error) => {
                    let rel_path = error
                        .path()
                        .and_then(|p| p.strip_prefix(root).ok())
                        .map(Path::to_path_buf)
                        .unwrap_or_default();
                    visit(WalkItem::Failed {
                        rel_path,
                        error: error.into(),
                    })?;
                    continue;
                }
            };
            let rel = dirent
                .path()
                .strip_prefix(root)
                .map_err(|_| VolumeError::InvalidPath(dirent.path().to_path_buf()))?;
            let rel_path = clean_rel(rel)?;

            let meta = match dirent.metadata() {
                Ok(m) => m,
                Err(error) => {
                    visit(WalkItem::Failed {
                        rel_path,
                        error: error.into(),
                    })?;
                    continue;
                }
            };

            let file_type = dirent.file_type();
            let kind = if file_type.is_symlink() {
                EntryKind::Symlink
            } else if file_type.is_dir() {
                EntryKind::Dir
            } else if file_type.is_file() {
                EntryKind::File
            } else {
                EntryKind::Other
            };

            if self.stable && kind == EntryKind::File && meta.nlink() > 1 {
                if !seen.insert((meta.dev(), meta.ino())) {
                    continue;
                }
            }

            let entry = Entry {
                rel_path,
                path: dirent.path().to_path_buf(),
                kind,
                meta,
            };
            visit(WalkItem::Entry(&entry))?;
        }
        Ok(())
    }
}
