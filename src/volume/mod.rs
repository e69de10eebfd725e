// CLASSIFICATION: COMMUNITY
// Filename: mod.rs v0.7
// Author: Lukas Bower
// Date Modified: 2026-01-22

//! Volume records and privilege flavors.

pub mod manager;
pub mod registry;

pub use manager::VolumeManager;
pub use registry::{VolumeEntry, VolumeRegistry};

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::uidgid::Direction;

/// Free-form key/value metadata attached to a volume.
pub type Properties = BTreeMap<String, String>;

/// Privilege flavor of a volume's on-disk ownership.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Flavor {
    /// Ownership stored natively (root as uid 0).
    Privileged,
    /// Ownership shifted into the host's reserved id range.
    Unprivileged,
}

impl Flavor {
    /// Translation applied when contents move from `self` to `to`.
    pub fn retag_direction(self, to: Flavor) -> Direction {
        match (self, to) {
            (Flavor::Privileged, Flavor::Unprivileged) => Direction::ToNamespace,
            (Flavor::Unprivileged, Flavor::Privileged) => Direction::ToHost,
            _ => Direction::Identity,
        }
    }

    /// Translation from stored form to the canonical wire form.
    pub fn wire_out_direction(self) -> Direction {
        match self {
            Flavor::Privileged => Direction::Identity,
            Flavor::Unprivileged => Direction::ToHost,
        }
    }

    /// Translation from the canonical wire form to stored form.
    pub fn wire_in_direction(self) -> Direction {
        match self {
            Flavor::Privileged => Direction::Identity,
            Flavor::Unprivileged => Direction::ToNamespace,
        }
    }
}

/// How a volume's initial contents were materialized. Immutable.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Strategy {
    Empty,
    Cow { parent: String },
}

/// A provisioned volume. Serialized verbatim as the `meta.json` sidecar.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Volume {
    pub handle: String,
    /// Absolute root of the data tree, assigned by the driver.
    pub path: PathBuf,
    pub flavor: Flavor,
    pub strategy: Strategy,
    #[serde(default)]
    pub properties: Properties,
    /// Set after a partially-applied mutation; only destroy is allowed.
    #[serde(default)]
    pub poisoned: bool,
}

impl Volume {
    /// COW parent back-reference, by handle. Never a pointer.
    pub fn parent(&self) -> Option<&str> {
        match &self.strategy {
            Strategy::Cow { parent } => Some(parent),
            Strategy::Empty => None,
        }
    }

    /// True iff every `(key, value)` in `filter` matches a property.
    pub fn matches(&self, filter: &Properties) -> bool {
        filter
            .iter()
            .all(|(k, v)| self.properties.get(k) == Some(v))
    }
}
