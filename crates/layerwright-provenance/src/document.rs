use crate::ProvenanceError;
use chrono::{DateTime, Utc};
use layerwright_schema::{Checksum, DependencyDescriptor};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tracing::debug;

/// Tool name recorded as the document creator.
pub const TOOL_NAME: &str = "layerwright";

/// Format-neutral description of what one layer contains.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SbomDocument {
    pub created: DateTime<Utc>,
    pub tool_version: String,
    pub packages: Vec<SbomPackage>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SbomPackage {
    pub name: String,
    pub version: String,
    pub checksum: Checksum,
    pub uri: String,
    pub source: String,
    pub licenses: Vec<String>,
    pub purl: String,
    pub cpe: String,
    pub content: Option<ContentSummary>,
}

/// Digest over an installed directory's relative paths, modes and bytes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentSummary {
    pub digest: String,
    pub file_count: u64,
}

impl SbomPackage {
    pub fn from_descriptor(descriptor: &DependencyDescriptor) -> Self {
        Self {
            name: descriptor.name.clone(),
            version: descriptor.version.clone(),
            checksum: descriptor.checksum.clone(),
            uri: descriptor.uri.clone(),
            source: descriptor.source.clone(),
            licenses: descriptor.licenses.clone(),
            purl: descriptor.purl.clone(),
            cpe: descriptor.cpe.clone(),
            content: None,
        }
    }
}

/// Produces the provenance document for an installed layer.
pub trait ProvenanceGenerator {
    fn generate(
        &self,
        descriptor: &DependencyDescriptor,
        dir: &Path,
    ) -> Result<SbomDocument, ProvenanceError>;
}

/// Records the dependency package and a summary of the installed files.
pub struct DefaultGenerator {
    created: DateTime<Utc>,
}

impl DefaultGenerator {
    pub fn new(created: DateTime<Utc>) -> Self {
        Self { created }
    }
}

/// Stamps the Unix epoch so identical inputs render identical bytes.
impl Default for DefaultGenerator {
    fn default() -> Self {
        Self::new(DateTime::UNIX_EPOCH)
    }
}

impl ProvenanceGenerator for DefaultGenerator {
    fn generate(
        &self,
        descriptor: &DependencyDescriptor,
        dir: &Path,
    ) -> Result<SbomDocument, ProvenanceError> {
        let mut package = SbomPackage::from_descriptor(descriptor);
        package.content = Some(summarize_dir(dir)?);
        Ok(SbomDocument {
            created: self.created,
            tool_version: env!("CARGO_PKG_VERSION").to_owned(),
            packages: vec![package],
        })
    }
}

/// Deterministic blake3 digest of a directory tree.
///
/// Entries are visited in sorted order; symlinks are hashed by target and
/// not followed.
pub fn summarize_dir(dir: &Path) -> Result<ContentSummary, ProvenanceError> {
    let mut hasher = blake3::Hasher::new();
    let mut file_count = 0;
    hash_tree(dir, Path::new(""), &mut hasher, &mut file_count)?;
    let digest = format!("blake3:{}", hasher.finalize().to_hex());
    debug!("summarized {} ({file_count} files): {digest}", dir.display());
    Ok(ContentSummary { digest, file_count })
}

fn hash_tree(
    root: &Path,
    rel: &Path,
    hasher: &mut blake3::Hasher,
    file_count: &mut u64,
) -> Result<(), ProvenanceError> {
    let mut entries = fs::read_dir(root.join(rel))?.collect::<Result<Vec<_>, _>>()?;
    entries.sort_by_key(fs::DirEntry::file_name);

    for entry in entries {
        let rel_path = rel.join(entry.file_name());
        let meta = fs::symlink_metadata(entry.path())?;
        hasher.update(rel_path.to_string_lossy().as_bytes());
        hasher.update(&[0]);

        if meta.is_dir() {
            hasher.update(b"d");
            hash_tree(root, &rel_path, hasher, file_count)?;
        } else if meta.file_type().is_symlink() {
            hasher.update(b"l");
            hasher.update(fs::read_link(entry.path())?.to_string_lossy().as_bytes());
        } else {
            hasher.update(b"f");
            hasher.update(&mode_bits(&meta).to_le_bytes());
            let data = fs::read(entry.path())?;
            hasher.update(&(data.len() as u64).to_le_bytes());
            hasher.update(&data);
            *file_count += 1;
        }
        hasher.update(&[0]);
    }
    Ok(())
}

#[cfg(unix)]
fn mode_bits(meta: &fs::Metadata) -> u32 {
    use std::os::unix::fs::PermissionsExt;
    meta.permissions().mode() & 0o777
}

#[cfg(not(unix))]
fn mode_bits(_meta: &fs::Metadata) -> u32 {
    0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor() -> DependencyDescriptor {
        let mut d = DependencyDescriptor::new("pnpm", "8.6.0", "sha256:abc", "https://example.com/pnpm");
        d.licenses = vec!["MIT".to_owned()];
        d
    }

    #[test]
    fn summary_is_deterministic_and_content_sensitive() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("bin")).unwrap();
        fs::write(dir.path().join("bin").join("pnpm"), "v1").unwrap();
        fs::write(dir.path().join("README"), "readme").unwrap();

        let a = summarize_dir(dir.path()).unwrap();
        let b = summarize_dir(dir.path()).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.file_count, 2);
        assert!(a.digest.starts_with("blake3:"));

        fs::write(dir.path().join("bin").join("pnpm"), "v2").unwrap();
        assert_ne!(summarize_dir(dir.path()).unwrap().digest, a.digest);
    }

    #[test]
    fn empty_dir_summary() {
        let dir = tempfile::tempdir().unwrap();
        let s = summarize_dir(dir.path()).unwrap();
        assert_eq!(s.file_count, 0);
    }

    #[test]
    fn default_generator_records_package() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("pnpm"), "bin").unwrap();
        let created = DateTime::parse_from_rfc3339("2024-01-01T00:00:00Z")
            .unwrap()
            .with_timezone(&Utc);

        let doc = DefaultGenerator::new(created)
            .generate(&descriptor(), dir.path())
            .unwrap();
        assert_eq!(doc.created, created);
        assert_eq!(doc.packages.len(), 1);
        let pkg = &doc.packages[0];
        assert_eq!(pkg.name, "pnpm");
        assert_eq!(pkg.version, "8.6.0");
        assert_eq!(pkg.checksum, "sha256:abc".to_owned());
        assert_eq!(pkg.content.as_ref().unwrap().file_count, 1);
    }

    #[test]
    fn default_generator_stamps_unix_epoch() {
        let dir = tempfile::tempdir().unwrap();
        let doc = DefaultGenerator::default()
            .generate(&descriptor(), dir.path())
            .unwrap();
        assert_eq!(doc.created.timestamp(), 0);
    }

    #[test]
    fn missing_dir_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = DefaultGenerator::default()
            .generate(&descriptor(), &dir.path().join("absent"))
            .unwrap_err();
        assert!(matches!(err, ProvenanceError::Io(_)));
    }
}
