// CLASSIFICATION: COMMUNITY
// Filename: stream.rs v0.4
// Author: Lukas Bower
// Date Modified: 2026-01-24

//! Wire-form behavior of the stream codec through the manager: host
//! ownership on the wire regardless of flavor, translation on the way
//! back to disk, and mode preservation through full round trips.

use std::collections::BTreeMap;
use std::fs;
use std::os::unix::fs::{MetadataExt, PermissionsExt};
use std::path::{Path, PathBuf};

use serial_test::serial;
use tar::Archive;
use tempfile::tempdir;

use cohvault::driver::NaiveDriver;
use cohvault::fs::{TreeWalker, WalkItem};
use cohvault::{
    CancelToken, Flavor, IdRange, Properties, Strategy, Volume, VolumeError, VolumeManager,
};

const MAX_ID: u32 = 100_000;
const SUID_MODE: u32 = 0o4755;

fn root_or_skip() -> bool {
    if unsafe { libc::geteuid() } != 0 {
        eprintln!("skipping: requires root");
        return false;
    }
    true
}

fn manager(dir: &Path) -> VolumeManager {
    VolumeManager::new(
        dir.to_path_buf(),
        Box::new(NaiveDriver::new()),
        IdRange::new(MAX_ID, MAX_ID).unwrap(),
    )
    .unwrap()
}

fn create(m: &VolumeManager, handle: &str, strategy: Strategy, flavor: Flavor) -> Volume {
    m.create_volume(handle, strategy, flavor, Properties::new(), &CancelToken::new())
        .unwrap()
}

fn write_suid(volume: &Volume, name: &str) {
    let path = volume.path.join(name);
    fs::write(&path, name.as_bytes()).unwrap();
    fs::set_permissions(&path, fs::Permissions::from_mode(SUID_MODE)).unwrap();
}

/// (uid, gid, mode) per relative path, for whole-tree comparisons.
fn tree_ownership(root: &Path) -> BTreeMap<PathBuf, (u32, u32, u32)> {
    let mut out = BTreeMap::new();
    TreeWalker::new()
        .stable(true)
        .walk(root, |item| {
            if let WalkItem::Entry(e) = item {
                out.insert(
                    e.rel_path.clone(),
                    (e.meta.uid(), e.meta.gid(), e.meta.mode() & 0o7777),
                );
            }
            Ok(())
        })
        .unwrap();
    out
}

fn shifted_fixture(m: &VolumeManager) -> Volume {
    let base = create(m, "base", Strategy::Empty, Flavor::Privileged);
    write_suid(&base, "foo");
    fs::create_dir(base.path.join("nested")).unwrap();
    fs::set_permissions(
        &base.path.join("nested"),
        fs::Permissions::from_mode(0o2775),
    )
    .unwrap();
    write_suid(&base, "nested/bar");
    create(
        m,
        "shifted",
        Strategy::Cow { parent: "base".into() },
        Flavor::Unprivileged,
    )
}

#[test]
#[serial]
fn unprivileged_stream_out_is_canonical() {
    if !root_or_skip() {
        return;
    }
    let dir = tempdir().unwrap();
    let m = manager(dir.path());
    let shifted = shifted_fixture(&m);
    assert_eq!(
        fs::symlink_metadata(shifted.path.join("foo")).unwrap().uid(),
        MAX_ID
    );

    let mut buf = Vec::new();
    m.stream_out("shifted", Path::new("foo"), &mut buf, &CancelToken::new())
        .unwrap();

    let mut archive = Archive::new(buf.as_slice());
    let first = archive.entries().unwrap().next().unwrap().unwrap();
    let header = first.header();
    assert_eq!(first.path().unwrap(), Path::new("foo"));
    assert_eq!(header.uid().unwrap(), 0);
    assert_eq!(header.gid().unwrap(), 0);
    assert_eq!(header.mode().unwrap() & 0o7777, SUID_MODE);
}

#[test]
#[serial]
fn stream_into_privileged_keeps_host_ids() {
    if !root_or_skip() {
        return;
    }
    let dir = tempdir().unwrap();
    let m = manager(dir.path());
    shifted_fixture(&m);

    let mut buf = Vec::new();
    m.stream_out("shifted", Path::new("foo"), &mut buf, &CancelToken::new())
        .unwrap();

    let q = create(&m, "q", Strategy::Empty, Flavor::Privileged);
    m.stream_in("q", Path::new("."), &mut buf.as_slice(), &CancelToken::new())
        .unwrap();

    let meta = fs::symlink_metadata(q.path.join("foo")).unwrap();
    assert_eq!(meta.uid(), 0);
    assert_eq!(meta.gid(), 0);
    assert_eq!(meta.permissions().mode() & 0o7777, SUID_MODE);
}

#[test]
#[serial]
fn stream_into_unprivileged_applies_the_shift() {
    if !root_or_skip() {
        return;
    }
    let dir = tempdir().unwrap();
    let m = manager(dir.path());
    shifted_fixture(&m);

    let mut buf = Vec::new();
    m.stream_out("shifted", Path::new("foo"), &mut buf, &CancelToken::new())
        .unwrap();

    let u = create(&m, "u", Strategy::Empty, Flavor::Unprivileged);
    m.stream_in("u", Path::new("."), &mut buf.as_slice(), &CancelToken::new())
        .unwrap();

    let meta = fs::symlink_metadata(u.path.join("foo")).unwrap();
    assert_eq!(meta.uid(), MAX_ID);
    assert_eq!(meta.gid(), MAX_ID);
    assert_eq!(meta.permissions().mode() & 0o7777, SUID_MODE);
}

#[test]
#[serial]
fn same_flavor_round_trip_is_identical() {
    if !root_or_skip() {
        return;
    }
    let dir = tempdir().unwrap();
    let m = manager(dir.path());
    let shifted = shifted_fixture(&m);

    let mut buf = Vec::new();
    m.stream_out("shifted", Path::new("."), &mut buf, &CancelToken::new())
        .unwrap();

    let twin = create(&m, "twin", Strategy::Empty, Flavor::Unprivileged);
    m.stream_in("twin", Path::new("."), &mut buf.as_slice(), &CancelToken::new())
        .unwrap();

    assert_eq!(tree_ownership(&shifted.path), tree_ownership(&twin.path));
}

#[test]
#[serial]
fn modes_survive_clone_convert_and_round_trip() {
    if !root_or_skip() {
        return;
    }
    let dir = tempdir().unwrap();
    let m = manager(dir.path());
    let shifted = shifted_fixture(&m);

    let modes = |root: &Path| -> Vec<(PathBuf, u32)> {
        tree_ownership(root)
            .into_iter()
            .map(|(p, (_, _, mode))| (p, mode))
            .collect()
    };
    let original = modes(&shifted.path);

    m.set_flavor("shifted", Flavor::Privileged, &CancelToken::new())
        .unwrap();
    assert_eq!(modes(&shifted.path), original);
    m.set_flavor("shifted", Flavor::Unprivileged, &CancelToken::new())
        .unwrap();
    assert_eq!(modes(&shifted.path), original);

    let mut buf = Vec::new();
    m.stream_out("shifted", Path::new("."), &mut buf, &CancelToken::new())
        .unwrap();
    let twin = create(&m, "twin", Strategy::Empty, Flavor::Unprivileged);
    m.stream_in("twin", Path::new("."), &mut buf.as_slice(), &CancelToken::new())
        .unwrap();
    assert_eq!(modes(&twin.path), original);
}

#[test]
#[serial]
fn native_ownership_inside_unprivileged_volume_refuses_export() {
    if !root_or_skip() {
        return;
    }
    let dir = tempdir().unwrap();
    let m = manager(dir.path());

    // An empty unprivileged volume written to out-of-band holds native
    // ids, which violates its flavor; exporting surfaces that loudly.
    let u = create(&m, "u", Strategy::Empty, Flavor::Unprivileged);
    write_suid(&u, "foo");

    let mut buf = Vec::new();
    let err = m
        .stream_out("u", Path::new("foo"), &mut buf, &CancelToken::new())
        .unwrap_err();
    assert!(matches!(err, VolumeError::IdentifierOutOfRange(_)));
    // Reads never poison.
    assert!(!m.lookup("u").unwrap().poisoned);
}

#[test]
#[serial]
fn escaping_subpaths_are_rejected() {
    let dir = tempdir().unwrap();
    let m = manager(dir.path());
    create(&m, "base", Strategy::Empty, Flavor::Privileged);

    let mut buf = Vec::new();
    let err = m
        .stream_out(
            "base",
            Path::new("../escape"),
            &mut buf,
            &CancelToken::new(),
        )
        .unwrap_err();
    assert!(matches!(err, VolumeError::InvalidPath(_)));
}
