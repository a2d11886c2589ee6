//! Provenance for installed layers.
//!
//! A [`ProvenanceGenerator`] turns a resolved dependency and its installed
//! directory into an [`SbomDocument`]; [`render`] serializes that document
//! into one of the supported [`SbomFormat`]s. [`legacy_bom`] produces the
//! flat bill-of-materials entries older pipelines consume.

pub mod document;
pub mod format;
pub mod legacy;
pub mod render;

pub use document::{ContentSummary, DefaultGenerator, ProvenanceGenerator, SbomDocument, SbomPackage};
pub use format::SbomFormat;
pub use legacy::{legacy_bom, BomChecksum, BomEntry, BomMetadata, LegacyBom};
pub use render::{render, render_all};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProvenanceError {
    #[error("unsupported SBOM format: '{0}'")]
    UnsupportedFormat(String),
    #[error("failed to scan layer contents: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to serialize SBOM: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// One rendered document, ready to be written beside the layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedDocument {
    pub format: SbomFormat,
    pub content: Vec<u8>,
}

impl RenderedDocument {
    pub fn extension(&self) -> &'static str {
        self.format.extension()
    }
}

/// Every document rendered for one layer in one build.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProvenanceBundle {
    documents: Vec<RenderedDocument>,
}

impl ProvenanceBundle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, document: RenderedDocument) {
        self.documents.push(document);
    }

    pub fn documents(&self) -> &[RenderedDocument] {
        &self.documents
    }

    pub fn get(&self, format: SbomFormat) -> Option<&RenderedDocument> {
        self.documents.iter().find(|d| d.format == format)
    }

    pub fn formats(&self) -> Vec<SbomFormat> {
        self.documents.iter().map(|d| d.format).collect()
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }
}
