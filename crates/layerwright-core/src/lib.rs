//! Layer provisioning engine for layerwright.
//!
//! The [`Engine`] resolves a dependency from a catalog, decides whether the
//! layer already on disk can be reused by comparing its persisted fingerprint
//! with the resolved checksum, and otherwise installs the artifact through a
//! [`ContentFetcher`](layerwright_remote::ContentFetcher). Provenance is
//! regenerated on every build. The [`plan`] module turns build plan entries
//! into layer flags, and [`StoreLock`] serializes callers sharing a layers
//! directory.

pub mod concurrency;
pub mod config;
pub mod engine;
pub mod lifecycle;
pub mod plan;

pub use concurrency::StoreLock;
pub use config::{parse_source_date_epoch, parse_toggle, EngineConfig};
pub use engine::{BuildRequest, BuildResult, Engine};
pub use lifecycle::{validate_transition, ProvisionState};
pub use plan::{interpret, Requirement};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error(transparent)]
    Catalog(#[from] layerwright_schema::CatalogError),
    #[error(transparent)]
    Plan(#[from] layerwright_schema::PlanError),
    #[error(transparent)]
    Store(#[from] layerwright_store::StoreError),
    #[error(transparent)]
    Provenance(#[from] layerwright_provenance::ProvenanceError),
    #[error("failed to fetch dependency: {0}")]
    Fetch(#[from] layerwright_remote::RemoteError),
    #[error("failed to parse {name}: invalid value '{value}'")]
    InvalidToggle { name: String, value: String },
    #[error("invalid state transition: {from} -> {to}")]
    InvalidTransition { from: String, to: String },
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
