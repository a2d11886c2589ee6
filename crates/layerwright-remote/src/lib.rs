//! Artifact retrieval for layerwright.
//!
//! [`ContentFetcher`] is the seam the provisioning engine installs through.
//! [`fetch::HttpFetcher`] downloads over HTTP(S) or reads `file://` URIs,
//! verifies the artifact checksum and installs it into a layer directory.
//! [`releases`] discovers upstream versions on GitHub and turns them into
//! catalog entries.

pub mod config;
pub mod fetch;
pub mod http;
pub mod mock;
pub mod releases;

pub use config::RemoteConfig;
pub use fetch::HttpFetcher;
pub use releases::{AssetStrategy, PlatformAsset, ReleaseClient};

use layerwright_schema::DependencyDescriptor;
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("remote I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("HTTP error: {0}")]
    Http(String),
    #[error("serialization error: {0}")]
    Serialization(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("remote config error: {0}")]
    Config(String),
    #[error("integrity failure for '{key}': expected {expected}, got {actual}")]
    IntegrityFailure {
        key: String,
        expected: String,
        actual: String,
    },
    #[error("unsupported checksum algorithm '{0}'")]
    UnsupportedAlgorithm(String),
    #[error("no source artifact '{asset}' for version {version}")]
    NoSourceArtifact { version: String, asset: String },
    #[error("invalid archive: {0}")]
    Archive(String),
}

/// Retrieves a dependency's artifact into a layer directory.
///
/// Implementations must leave `destination` either fully populated with a
/// verified artifact or return an error.
pub trait ContentFetcher {
    fn fetch(
        &self,
        descriptor: &DependencyDescriptor,
        destination: &Path,
    ) -> Result<(), RemoteError>;
}

impl<T: ContentFetcher + ?Sized> ContentFetcher for Arc<T> {
    fn fetch(
        &self,
        descriptor: &DependencyDescriptor,
        destination: &Path,
    ) -> Result<(), RemoteError> {
        (**self).fetch(descriptor, destination)
    }
}
