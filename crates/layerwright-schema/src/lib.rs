//! Dependency catalog, build plan, and identifier types for layerwright.
//!
//! This crate defines the schema layer: the `buildpack.toml`-style dependency
//! catalog (`Catalog`) and its resolution rules, the immutable
//! `DependencyDescriptor` produced by a lookup, the build plan handed over by
//! the surrounding build request (`BuildPlan`), and string newtypes for
//! identifiers and checksums.

pub mod catalog;
pub mod plan;
pub mod types;

pub use catalog::{
    parse_catalog_file, parse_catalog_str, Catalog, CatalogError, DependencyDescriptor, Deprecation,
};
pub use plan::{parse_plan_file, parse_plan_str, BuildPlan, PlanEntry, PlanError};
pub use types::{Checksum, DependencyId, StackId};
