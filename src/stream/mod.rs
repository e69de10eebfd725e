// CLASSIFICATION: COMMUNITY
// Filename: mod.rs v0.8
// Author: Lukas Bower
// Date Modified: 2026-01-23

//! Tar codec with canonical wire ownership.
//!
//! Ownership on the wire is always the host representation, independent
//! of the volume's flavor: packing an unprivileged tree unshifts ids at
//! header-emit time, unpacking into an unprivileged tree shifts them at
//! disk-write time, and privileged volumes pass ids through untouched.
//! Modes cross the boundary verbatim, full 12-bit field included.
//!
//! Entry names and hard-link targets are cleaned lexically and must stay
//! inside the destination. Symlink target strings are inert data: they
//! are recorded and recreated but never resolved.

use std::fs;
use std::io::{self, Read, Write};
use std::os::unix::fs::{symlink, MetadataExt};
use std::path::{Path, PathBuf};

use log::debug;
use tar::{Archive, Builder, EntryType, Header};

use crate::error::VolumeError;
use crate::fs::{
    chmod_fd, chown_fd, chown_nofollow, clean_rel, create_nofollow, join_checked, open_nofollow,
    EntryKind, TreeWalker, WalkItem,
};
use crate::uidgid::Translator;
use crate::volume::Flavor;
use crate::CancelToken;

/// Packs and unpacks volume subtrees as uncompressed GNU tar.
#[derive(Clone, Copy, Debug)]
pub struct StreamCodec {
    translator: Translator,
}

impl StreamCodec {
    pub fn new(translator: Translator) -> Self {
        StreamCodec { translator }
    }

    /// Stream the tree at `root/subpath` into `out`.
    ///
    /// Archive names are relative to the subpath's parent, so streaming
    /// `foo` yields an entry named `foo` and streaming `.` yields `./`.
    pub fn pack<W: Write>(
        &self,
        root: &Path,
        subpath: &Path,
        flavor: Flavor,
        out: W,
        cancel: &CancelToken,
    ) -> Result<(), VolumeError> {
        let cleaned = clean_rel(subpath)?;
        let target = join_checked(root, &cleaned)?;
        let prefix: Option<PathBuf> = cleaned.file_name().map(PathBuf::from);
        let direction = flavor.wire_out_direction();

        let mut builder = Builder::new(out);
        TreeWalker::new().walk(&target, |item| {
            let entry = match item {
                WalkItem::Entry(e) => e,
                WalkItem::Failed { error, .. } => return Err(VolumeError::codec(error)),
            };
            if cancel.is_cancelled() {
                return Err(VolumeError::Cancelled);
            }
            let name = archive_name(&prefix, &entry.rel_path, entry.kind);
            let (uid, gid) =
                self.translator
                    .apply(direction, entry.meta.uid(), entry.meta.gid())?;

            let mut header = Header::new_gnu();
            header.set_mode(entry.meta.mode() & 0o7777);
            header.set_uid(u64::from(uid));
            header.set_gid(u64::from(gid));
            header.set_mtime(entry.meta.mtime().max(0) as u64);

            match entry.kind {
                EntryKind::Dir => {
                    header.set_entry_type(EntryType::Directory);
                    header.set_size(0);
                    if name == Path::new("./") {
                        // set_path strips the `.` component, which would
                        // leave an empty name; write the bytes directly.
                        if let Some(gnu) = header.as_gnu_mut() {
                            gnu.name[..2].copy_from_slice(b"./");
                        }
                        header.set_cksum();
                        builder
                            .append(&header, io::empty())
                            .map_err(VolumeError::codec)?;
                    } else {
                        builder
                            .append_data(&mut header, &name, io::empty())
                            .map_err(VolumeError::codec)?;
                    }
                }
                EntryKind::File => {
                    let file = open_nofollow(&entry.path).map_err(VolumeError::codec)?;
                    let len = file.metadata().map_err(VolumeError::codec)?.len();
                    header.set_entry_type(EntryType::Regular);
                    header.set_size(len);
                    builder
                        .append_data(&mut header, &name, file)
                        .map_err(VolumeError::codec)?;
                }
                EntryKind::Symlink => {
                    let link = fs::read_link(&entry.path).map_err(VolumeError::codec)?;
                    header.set_entry_type(EntryType::Symlink);
                    header.set_size(0);
                    builder
                        .append_link(&mut header, &name, link)
                        .map_err(VolumeError::codec)?;
                }
                EntryKind::Other => {
                    debug!("not archiving special file {}", entry.path.display());
                }
            }
            Ok(())
        })?;
        builder.finish().map_err(VolumeError::codec)
    }

    /// Consume a tar stream into `root/subpath`, overwriting collisions.
    ///
    /// A partial failure leaves whatever was already extracted in place;
    /// the caller decides whether that poisons the volume.
    pub fn unpack<R: Read>(
        &self,
        root: &Path,
        subpath: &Path,
        flavor: Flavor,
        input: R,
        cancel: &CancelToken,
    ) -> Result<(), VolumeError> {
        let dest_root = join_checked(root, subpath)?;
        fs::create_dir_all(&dest_root).map_err(VolumeError::codec)?;
        let direction = flavor.wire_in_direction();

        let mut archive = Archive::new(input);
        let entries = archive
            .entries()
            .map_err(|e| VolumeError::MalformedStream(e.to_string()))?;
        for entry in entries {
            if cancel.is_cancelled() {
                return Err(VolumeError::Cancelled);
            }
            let mut entry = entry.map_err(|e| VolumeError::MalformedStream(e.to_string()))?;
            let name = entry
                .path()
                .map_err(|e| VolumeError::MalformedStream(e.to_string()))?
                .into_owned();
            let rel = clean_rel(&name)?;
            let dest = if rel.as_os_str().is_empty() {
                dest_root.clone()
            } else {
                dest_root.join(&rel)
            };

            let header = entry.header();
            let mode = header
                .mode()
                .map_err(|e| VolumeError::MalformedStream(e.to_string()))?
                & 0o7777;
            let uid = wire_id(header.uid())?;
            let gid = wire_id(header.gid())?;
            let (uid, gid) = self.translator.apply(direction, uid, gid)?;

            match header.entry_type() {
                EntryType::Directory => {
                    replace_with_dir(&dest)?;
                    chown_nofollow(&dest, uid, gid).map_err(VolumeError::codec)?;
                    fs::set_permissions(&dest, perm(mode)).map_err(VolumeError::codec)?;
                }
                EntryType::Regular | EntryType::Continuous => {
                    prepare_slot(&dest)?;
                    let mut file = create_nofollow(&dest).map_err(VolumeError::codec)?;
                    io::copy(&mut entry, &mut file).map_err(VolumeError::codec)?;
                    chown_fd(&file, uid, gid).map_err(VolumeError::codec)?;
                    chmod_fd(&file, mode).map_err(VolumeError::codec)?;
                }
                EntryType::Symlink => {
                    let target = entry
                        .link_name()
                        .map_err(|e| VolumeError::MalformedStream(e.to_string()))?
                        .ok_or_else(|| {
                            VolumeError::MalformedStream(format!(
                                "symlink entry {} has no target",
                                name.display()
                            ))
                        })?
                        .into_owned();
                    prepare_slot(&dest)?;
                    symlink(&target, &dest).map_err(VolumeError::codec)?;
                    chown_nofollow(&dest, uid, gid).map_err(VolumeError::codec)?;
                }
                EntryType::Link => {
                    let target = entry
                        .link_name()
                        .map_err(|e| VolumeError::MalformedStream(e.to_string()))?
                        .ok_or_else(|| {
                            VolumeError::MalformedStream(format!(
                                "hard link entry {} has no target",
                                name.display()
                            ))
                        })?;
                    let original = join_checked(&dest_root, &target)?;
                    prepare_slot(&dest)?;
                    fs::hard_link(&original, &dest).map_err(VolumeError::codec)?;
                }
                other => {
                    debug!("ignoring {:?} entry {}", other, name.display());
                }
            }
        }
        Ok(())
    }
}

/// Wire name for an entry: the subpath's final component joined with the
/// walker-relative path. A bare directory subpath becomes `./`.
fn archive_name(prefix: &Option<PathBuf>, rel: &Path, kind: EntryKind) -> PathBuf {
    let base = match prefix {
        Some(p) => p.join(rel),
        None => rel.to_path_buf(),
    };
    if base.as_os_str().is_empty() {
        if kind == EntryKind::Dir {
            PathBuf::from("./")
        } else {
            // Unreachable for sane prefixes: a file subpath always has
            // a final component.
            PathBuf::from(".")
        }
    } else {
        base
    }
}

fn wire_id(raw: io::Result<u64>) -> Result<u32, VolumeError> {
    let id = raw.map_err(|e| VolumeError::MalformedStream(e.to_string()))?;
    u32::try_from(id).map_err(|_| VolumeError::IdentifierOutOfRange(id))
}

fn perm(mode: u32) -> fs::Permissions {
    use std::os::unix::fs::PermissionsExt;
    fs::Permissions::from_mode(mode)
}

/// Make room for a non-directory entry at `dest`: drop whatever sits
/// there (file, link, or tree) and ensure the parent directory exists.
fn prepare_slot(dest: &Path) -> Result<(), VolumeError> {
    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent).map_err(VolumeError::codec)?;
    }
    match fs::symlink_metadata(dest) {
        Ok(meta) if meta.is_dir() => fs::remove_dir_all(dest).map_err(VolumeError::codec),
        Ok(_) => fs::remove_file(dest).map_err(VolumeError::codec),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(VolumeError::codec(e)),
    }
}

/// Ensure `dest` is a real directory, replacing any other entry kind.
fn replace_with_dir(dest: &Path) -> Result<(), VolumeError> {
    match fs::symlink_metadata(dest) {
        Ok(meta) if meta.is_dir() => Ok(()),
        Ok(_) => {
            fs::remove_file(dest).map_err(VolumeError::codec)?;
            fs::create_dir_all(dest).map_err(VolumeError::codec)
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            fs::create_dir_all(dest).map_err(VolumeError::codec)
        }
        Err(e) => Err(VolumeError::codec(e)),
    }
}
