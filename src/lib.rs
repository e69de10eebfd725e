// CLASSIFICATION: COMMUNITY
// Filename: lib.rs v0.9
// Author: Lukas Bower
// Date Modified: 2026-01-24

//! cohvault: host-local volume vault.
//!
//! Provisions directory trees ("volumes") for container-like workloads,
//! clones them copy-on-write, converts them between privileged and
//! unprivileged ownership flavors, and exchanges their contents as tar
//! streams with ownership always in host form on the wire.

/// Configuration loading
pub mod config;

/// Storage backend seam and the deep-copy driver
pub mod driver;

/// Error taxonomy
pub mod error;

/// Path hygiene and the tree walker
pub mod fs;

/// Tar codec with canonical wire ownership
pub mod stream;

/// Identity ranges, ownership translation, tree retagging
pub mod uidgid;

/// Volume records, registry, and the manager façade
pub mod volume;

/// Command-line adapter
pub mod cli;

pub use error::VolumeError;
pub use uidgid::{Direction, IdRange, Namespacer, Translator};
pub use volume::{Flavor, Properties, Strategy, Volume, VolumeManager};

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Cooperative cancellation for long-running operations.
///
/// Checked at entry boundaries by retag and both stream directions; a
/// cancelled mutation leaves its volume poisoned.
#[derive(Clone, Debug, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        CancelToken::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}
