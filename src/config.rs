// CLASSIFICATION: COMMUNITY
// Filename: config.rs v0.4
// Author: Lukas Bower
// Date Modified: 2026-01-23

//! Vault configuration loading.
//!
//! Reads `/etc/cohvault.yaml` (or the file named by `COHVAULT_CONFIG`)
//! and falls back to defaults when no file is present. Identifier-range
//! fields pin the reserved uid/gid slot for constrained hosts; when
//! unset, the range is detected from the process id maps.

use std::io;
use std::path::{Path, PathBuf};

use log::warn;
use serde::Deserialize;

use crate::driver::{Driver, NaiveDriver};
use crate::uidgid::IdRange;

const DEFAULT_CONFIG_PATH: &str = "/etc/cohvault.yaml";
const CONFIG_PATH_ENV: &str = "COHVAULT_CONFIG";
const DEFAULT_VOLUMES_DIR: &str = "/var/lib/cohvault/volumes";

#[derive(Debug, Deserialize, PartialEq)]
pub struct VaultConfig {
    pub volumes_dir: Option<PathBuf>,
    pub driver: Option<String>,
    pub max_uid: Option<u32>,
    pub max_gid: Option<u32>,
}

impl Default for VaultConfig {
    fn default() -> Self {
        Self {
            volumes_dir: Some(PathBuf::from(DEFAULT_VOLUMES_DIR)),
            driver: Some("naive".into()),
            max_uid: None,
            max_gid: None,
        }
    }
}

impl VaultConfig {
    pub fn volumes_dir(&self) -> PathBuf {
        self.volumes_dir
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_VOLUMES_DIR))
    }

    /// Resolve the identity range: pinned fields win, anything unset is
    /// detected from the host id maps.
    pub fn id_range(&self) -> io::Result<IdRange> {
        match (self.max_uid, self.max_gid) {
            (Some(uid), Some(gid)) => IdRange::new(uid, gid),
            (uid, gid) => {
                let detected = IdRange::detect()?;
                IdRange::new(
                    uid.unwrap_or_else(|| detected.max_uid()),
                    gid.unwrap_or_else(|| detected.max_gid()),
                )
            }
        }
    }

    /// Instantiate the configured storage backend.
    pub fn build_driver(&self) -> io::Result<Box<dyn Driver>> {
        match self.driver.as_deref().unwrap_or("naive") {
            "naive" => Ok(Box::new(NaiveDriver::new())),
            other => Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("unknown driver {other:?}"),
            )),
        }
    }
}

fn load_config_file(path: &Path) -> io::Result<VaultConfig> {
    let data = std::fs::read_to_string(path)?;
    serde_yaml::from_str(&data).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
}

/// Load the active configuration, defaulting when no file exists.
pub fn load_active() -> VaultConfig {
    let path = std::env::var(CONFIG_PATH_ENV)
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH));
    match load_config_file(&path) {
        Ok(cfg) => cfg,
        Err(e) if e.kind() == io::ErrorKind::NotFound => VaultConfig::default(),
        Err(e) => {
            warn!("using default config, {} unreadable: {e}", path.display());
            VaultConfig::default()
        }
    }
}
