// CLASSIFICATION: COMMUNITY
// Filename: error.rs v0.3
// Author: Lukas Bower
// Date Modified: 2026-01-19

//! Error taxonomy for the volume vault.
//!
//! Registry-level variants (`HandleExists`, `NotFound`, ...) are fully
//! recoverable by the caller. Input variants abort the one operation that
//! received bad data. Infrastructure variants carry their `io::Error`
//! cause; the volume touched by a partially-applied mutation is marked
//! poisoned before the error is returned.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Errors surfaced by vault operations.
#[derive(Debug, Error)]
pub enum VolumeError {
    #[error("volume handle already exists: {0}")]
    HandleExists(String),

    #[error("no volume with handle: {0}")]
    NotFound(String),

    #[error("volume {0} still has live children")]
    HasChildren(String),

    #[error("volume {0} is in use")]
    InUse(String),

    #[error("parent volume missing: {0}")]
    ParentMissing(String),

    #[error("parent volume {0} is poisoned")]
    PoisonedParent(String),

    #[error("volume {0} is poisoned; only destroy is permitted")]
    Poisoned(String),

    #[error("invalid path: {}", .0.display())]
    InvalidPath(PathBuf),

    #[error("identifier out of range: {0}")]
    IdentifierOutOfRange(u64),

    #[error("malformed stream: {0}")]
    MalformedStream(String),

    #[error("operation cancelled")]
    Cancelled,

    #[error("registry lock poisoned")]
    LockPoisoned,

    #[error("backend failure: {source}")]
    BackendFailure {
        #[source]
        source: io::Error,
    },

    #[error("codec failure: {source}")]
    CodecFailure {
        #[source]
        source: io::Error,
    },

    #[error(transparent)]
    Io(#[from] io::Error),
}

impl VolumeError {
    /// Wrap an I/O failure from the storage backend.
    pub fn backend(source: io::Error) -> Self {
        VolumeError::BackendFailure { source }
    }

    /// Wrap an I/O failure from the stream codec.
    pub fn codec(source: io::Error) -> Self {
        VolumeError::CodecFailure { source }
    }
}
