use crate::layout::{validate_layer_name, StoreLayout};
use crate::{fsync_dir, StoreError};
use layerwright_provenance::{ProvenanceBundle, SbomFormat};
use layerwright_schema::Checksum;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::debug;

/// Metadata key holding the cache fingerprint (the dependency checksum).
pub const FINGERPRINT_KEY: &str = "cache-checksum";

/// Which lifecycle phases the layer is made available to.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct LayerFlags {
    #[serde(default)]
    pub build: bool,
    #[serde(default)]
    pub launch: bool,
    #[serde(default)]
    pub cache: bool,
}

impl std::fmt::Display for LayerFlags {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "build={} launch={} cache={}",
            self.build, self.launch, self.cache
        )
    }
}

/// One dependency's layer: its directory, flags, metadata and provenance.
///
/// Only `flags` and `metadata` are persisted; `provenance` is regenerated
/// every build and written separately via [`LayerStore::write_provenance`].
#[derive(Debug, Clone, PartialEq)]
pub struct LayerRecord {
    pub name: String,
    pub path: PathBuf,
    pub flags: LayerFlags,
    pub metadata: toml::Table,
    pub provenance: ProvenanceBundle,
}

impl LayerRecord {
    pub fn empty(name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            flags: LayerFlags::default(),
            metadata: toml::Table::new(),
            provenance: ProvenanceBundle::default(),
        }
    }

    /// The persisted cache fingerprint, if present and a string.
    pub fn fingerprint(&self) -> Option<&str> {
        self.metadata.get(FINGERPRINT_KEY).and_then(toml::Value::as_str)
    }

    pub fn set_fingerprint(&mut self, checksum: &Checksum) {
        self.metadata.insert(
            FINGERPRINT_KEY.to_owned(),
            toml::Value::String(checksum.to_string()),
        );
    }
}

/// On-disk shape of `<name>.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct RecordFile {
    /// blake3 over the record serialized without this field. `None` for
    /// records written by other tools.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    checksum: Option<String>,
    #[serde(default)]
    types: LayerFlags,
    #[serde(default)]
    metadata: toml::Table,
}

impl RecordFile {
    fn compute_checksum(&self) -> Result<String, StoreError> {
        let mut copy = self.clone();
        copy.checksum = None;
        let content = toml::to_string(&copy)?;
        Ok(blake3::hash(content.as_bytes()).to_hex().to_string())
    }
}

pub struct LayerStore {
    layout: StoreLayout,
}

impl LayerStore {
    pub fn new(layout: StoreLayout) -> Self {
        Self { layout }
    }

    pub fn layout(&self) -> &StoreLayout {
        &self.layout
    }

    /// Read the persisted record for `name`.
    ///
    /// A missing record yields an empty one. A record that exists but cannot
    /// be read, parsed, or fails its embedded checksum is
    /// [`StoreError::CorruptMetadata`]: it cannot back a reuse decision.
    pub fn load(&self, name: &str) -> Result<LayerRecord, StoreError> {
        validate_layer_name(name)?;
        let path = self.layout.record_path(name);
        let mut record = LayerRecord::empty(name, self.layout.layer_path(name));

        let content = match fs::read_to_string(&path) {
            Ok(c) => c,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!("no persisted record for layer {name}");
                return Ok(record);
            }
            Err(e) => return Err(corrupt(&path, e.to_string())),
        };
        let file: RecordFile =
            toml::from_str(&content).map_err(|e| corrupt(&path, e.to_string()))?;

        if let Some(ref expected) = file.checksum {
            let actual = file.compute_checksum()?;
            if actual != *expected {
                return Err(corrupt(
                    &path,
                    format!("record checksum mismatch: expected {expected}, got {actual}"),
                ));
            }
        }

        record.flags = file.types;
        record.metadata = file.metadata;
        Ok(record)
    }

    /// Atomically write the record for `record.name`.
    pub fn persist(&self, record: &LayerRecord) -> Result<(), StoreError> {
        validate_layer_name(&record.name)?;
        self.layout.initialize()?;

        let mut file = RecordFile {
            checksum: None,
            types: record.flags,
            metadata: record.metadata.clone(),
        };
        file.checksum = Some(file.compute_checksum()?);
        let content = toml::to_string(&file)?;

        let dest = self.layout.record_path(&record.name);
        write_atomic(self.layout.root(), &dest, content.as_bytes())?;
        debug!("persisted layer record {}", dest.display());
        Ok(())
    }

    pub fn remove_record(&self, name: &str) -> Result<(), StoreError> {
        let path = self.layout.record_path(name);
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StoreError::Unwritable { path, source: e }),
        }
    }

    /// Remove and recreate the layer directory, returning its path.
    pub fn reset_dir(&self, name: &str) -> Result<PathBuf, StoreError> {
        validate_layer_name(name)?;
        let path = self.layout.layer_path(name);
        self.remove_dir(name)?;
        fs::create_dir_all(&path).map_err(StoreError::unwritable(&path))?;
        Ok(path)
    }

    pub fn remove_dir(&self, name: &str) -> Result<(), StoreError> {
        let path = self.layout.layer_path(name);
        match fs::remove_dir_all(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StoreError::Unwritable { path, source: e }),
        }
    }

    /// Write each rendered document next to the layer as `<name>.sbom.<ext>`.
    ///
    /// Documents of formats absent from the bundle are removed so that no
    /// file describes an earlier build.
    pub fn write_provenance(&self, record: &LayerRecord) -> Result<Vec<PathBuf>, StoreError> {
        validate_layer_name(&record.name)?;
        let mut written = Vec::new();
        for doc in record.provenance.documents() {
            let dest = self
                .layout
                .sbom_path(&record.name, doc.format.extension());
            write_atomic(self.layout.root(), &dest, &doc.content)?;
            written.push(dest);
        }
        for format in SbomFormat::ALL {
            if record.provenance.get(format).is_some() {
                continue;
            }
            let stale = self.layout.sbom_path(&record.name, format.extension());
            match fs::remove_file(&stale) {
                Ok(()) => debug!("removed stale {}", stale.display()),
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => return Err(StoreError::Unwritable { path: stale, source: e }),
            }
        }
        Ok(written)
    }

    /// Atomically write `file_name` into the layers root.
    pub fn write_root_file(&self, file_name: &str, content: &[u8]) -> Result<PathBuf, StoreError> {
        validate_layer_name(file_name)?;
        self.layout.initialize()?;
        let dest = self.layout.root().join(file_name);
        write_atomic(self.layout.root(), &dest, content)?;
        debug!("wrote {}", dest.display());
        Ok(dest)
    }
}

fn corrupt(path: &Path, reason: String) -> StoreError {
    StoreError::CorruptMetadata {
        path: path.to_path_buf(),
        reason,
    }
}

fn write_atomic(dir: &Path, dest: &Path, content: &[u8]) -> Result<(), StoreError> {
    let mut tmp = NamedTempFile::new_in(dir).map_err(StoreError::unwritable(dir))?;
    tmp.write_all(content)
        .map_err(StoreError::unwritable(dest))?;
    tmp.as_file()
        .sync_all()
        .map_err(StoreError::unwritable(dest))?;
    tmp.persist(dest).map_err(|e| StoreError::Unwritable {
        path: dest.to_path_buf(),
        source: e.error,
    })?;
    fsync_dir(dir)?;
    Ok(())
}
