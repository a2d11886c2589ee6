//! Layer store for layerwright.
//!
//! This crate owns the on-disk state of a layers directory: `StoreLayout` for
//! path conventions, `LayerStore` for reading and atomically persisting
//! `LayerRecord`s (lifecycle flags plus the cache fingerprint), and
//! `WriteAheadLog` for rolling back installs interrupted by a crash.

pub mod layout;
pub mod records;
pub mod wal;

pub use layout::{validate_layer_name, StoreLayout};
pub use records::{LayerFlags, LayerRecord, LayerStore, FINGERPRINT_KEY};
pub use wal::{RollbackStep, WalOpKind, WriteAheadLog};

use std::path::{Path, PathBuf};
use thiserror::Error;

/// Fsync a directory to ensure that a preceding `rename()` is durable.
///
/// POSIX does not guarantee a rename survives a crash until the parent
/// directory itself has been synced.
pub(crate) fn fsync_dir(dir: &Path) -> Result<(), StoreError> {
    std::fs::File::open(dir)
        .and_then(|f| f.sync_all())
        .map_err(StoreError::unwritable(dir))
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse layer content metadata at {}: {reason}", .path.display())]
    CorruptMetadata { path: PathBuf, reason: String },
    #[error("layer store is not writable at {}: {source}", .path.display())]
    Unwritable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("serialization error: {0}")]
    Serialization(String),
    #[error("invalid layer name: {0}")]
    InvalidName(String),
}

impl StoreError {
    /// Map an I/O error on `path` to [`StoreError::Unwritable`].
    pub(crate) fn unwritable(path: &Path) -> impl FnOnce(std::io::Error) -> Self + '_ {
        move |source| Self::Unwritable {
            path: path.to_path_buf(),
            source,
        }
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}

impl From<toml::ser::Error> for StoreError {
    fn from(e: toml::ser::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_error_display_invalid_name() {
        let e = StoreError::InvalidName("bad".to_owned());
        assert!(e.to_string().contains("invalid layer name"));
    }

    #[test]
    fn store_error_display_corrupt_metadata() {
        let e = StoreError::CorruptMetadata {
            path: PathBuf::from("/layers/pnpm.toml"),
            reason: "expected `=`".to_owned(),
        };
        let msg = e.to_string();
        assert!(msg.contains("failed to parse layer content metadata"));
        assert!(msg.contains("/layers/pnpm.toml"));
    }

    #[test]
    fn fsync_of_missing_dir_is_unwritable() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("gone");
        match fsync_dir(&missing) {
            Err(StoreError::Unwritable { path, .. }) => assert_eq!(path, missing),
            other => panic!("expected Unwritable, got {other:?}"),
        }
    }

    #[test]
    fn store_error_display_unwritable_keeps_io_message() {
        let e = StoreError::Unwritable {
            path: PathBuf::from("/layers"),
            source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "permission denied"),
        };
        assert!(e.to_string().contains("permission denied"));
    }
}
