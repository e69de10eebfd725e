// CLASSIFICATION: COMMUNITY
// Filename: concurrency.rs v0.2
// Author: Lukas Bower
// Date Modified: 2026-01-24

//! Threaded smoke tests: independent handles make progress in
//! parallel, reads share a handle, and mutations serialize without
//! corrupting registry state.

use std::path::Path;
use std::sync::Arc;
use std::thread;

use serial_test::serial;
use tempfile::tempdir;

use cohvault::driver::NaiveDriver;
use cohvault::{CancelToken, Flavor, IdRange, Properties, Strategy, VolumeManager};

fn manager(dir: &Path) -> Arc<VolumeManager> {
    Arc::new(
        VolumeManager::new(
            dir.to_path_buf(),
            Box::new(NaiveDriver::new()),
            IdRange::new(1 << 30, 1 << 30).unwrap(),
        )
        .unwrap(),
    )
}

#[test]
#[serial]
fn independent_handles_progress_in_parallel() {
    let dir = tempdir().unwrap();
    let m = manager(dir.path());

    let mut workers = Vec::new();
    for i in 0..8 {
        let m = Arc::clone(&m);
        workers.push(thread::spawn(move || {
            let handle = format!("vol-{i}");
            let cancel = CancelToken::new();
            let volume = m
                .create_volume(
                    &handle,
                    Strategy::Empty,
                    Flavor::Privileged,
                    Properties::new(),
                    &cancel,
                )
                .unwrap();
            std::fs::write(volume.path.join("data"), handle.as_bytes()).unwrap();

            let mut buf = Vec::new();
            m.stream_out(&handle, Path::new("data"), &mut buf, &cancel)
                .unwrap();
            assert!(!buf.is_empty());
            m.destroy(&handle).unwrap();
        }));
    }
    for worker in workers {
        worker.join().unwrap();
    }
    assert!(m.list(&Properties::new()).unwrap().is_empty());
}

#[test]
#[serial]
fn concurrent_reads_share_a_handle() {
    let dir = tempdir().unwrap();
    let m = manager(dir.path());
    let volume = m
        .create_volume(
            "shared",
            Strategy::Empty,
            Flavor::Privileged,
            Properties::new(),
            &CancelToken::new(),
        )
        .unwrap();
    std::fs::write(volume.path.join("data"), b"payload").unwrap();

    let mut readers = Vec::new();
    for _ in 0..8 {
        let m = Arc::clone(&m);
        readers.push(thread::spawn(move || {
            let mut buf = Vec::new();
            m.stream_out("shared", Path::new("data"), &mut buf, &CancelToken::new())
                .unwrap();
            buf.len()
        }));
    }
    let lengths: Vec<usize> = readers.into_iter().map(|r| r.join().unwrap()).collect();
    assert!(lengths.windows(2).all(|w| w[0] == w[1]));
}

#[test]
#[serial]
fn mutations_serialize_per_handle() {
    let dir = tempdir().unwrap();
    let m = manager(dir.path());
    m.create_volume(
        "shared",
        Strategy::Empty,
        Flavor::Privileged,
        Properties::new(),
        &CancelToken::new(),
    )
    .unwrap();

    let mut writers = Vec::new();
    for i in 0..8 {
        let m = Arc::clone(&m);
        writers.push(thread::spawn(move || {
            m.set_property("shared", &format!("key-{i}"), "set").unwrap();
        }));
    }
    for writer in writers {
        writer.join().unwrap();
    }

    let volume = m.lookup("shared").unwrap();
    assert_eq!(volume.properties.len(), 8);
}
