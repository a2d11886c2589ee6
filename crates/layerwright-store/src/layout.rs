use crate::StoreError;
use std::fs;
use std::path::{Path, PathBuf};

const JOURNAL_DIR: &str = ".journal";
const LOCK_FILE: &str = ".lock";

/// Directory layout of a layers root.
///
/// Each layer owns `<root>/<name>/`, with its record beside it at
/// `<root>/<name>.toml` and rendered provenance at `<root>/<name>.sbom.<ext>`.
#[derive(Debug, Clone)]
pub struct StoreLayout {
    root: PathBuf,
}

impl StoreLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    #[inline]
    pub fn root(&self) -> &Path {
        &self.root
    }

    #[inline]
    pub fn layer_path(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }

    #[inline]
    pub fn record_path(&self, name: &str) -> PathBuf {
        self.root.join(format!("{name}.toml"))
    }

    #[inline]
    pub fn sbom_path(&self, name: &str, extension: &str) -> PathBuf {
        self.root.join(format!("{name}.sbom.{extension}"))
    }

    #[inline]
    pub fn journal_dir(&self) -> PathBuf {
        self.root.join(JOURNAL_DIR)
    }

    #[inline]
    pub fn lock_file(&self) -> PathBuf {
        self.root.join(LOCK_FILE)
    }

    /// Create the root directory. Idempotent.
    pub fn initialize(&self) -> Result<(), StoreError> {
        fs::create_dir_all(&self.root).map_err(StoreError::unwritable(&self.root))
    }
}

/// Layer names become path components, so they are restricted to a safe subset.
pub fn validate_layer_name(name: &str) -> Result<(), StoreError> {
    if name.is_empty() || name.len() > 64 {
        return Err(StoreError::InvalidName(
            "layer name must be 1-64 characters".to_owned(),
        ));
    }
    if name.starts_with('.') {
        return Err(StoreError::InvalidName(
            "layer name must not start with '.'".to_owned(),
        ));
    }
    if !name
        .bytes()
        .all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-' || b == b'.')
    {
        return Err(StoreError::InvalidName(
            "layer name must match [a-zA-Z0-9_.-]".to_owned(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_paths_are_correct() {
        let layout = StoreLayout::new("/layers/example");
        assert_eq!(layout.layer_path("pnpm"), PathBuf::from("/layers/example/pnpm"));
        assert_eq!(
            layout.record_path("pnpm"),
            PathBuf::from("/layers/example/pnpm.toml")
        );
        assert_eq!(
            layout.sbom_path("pnpm", "cdx.json"),
            PathBuf::from("/layers/example/pnpm.sbom.cdx.json")
        );
        assert_eq!(
            layout.journal_dir(),
            PathBuf::from("/layers/example/.journal")
        );
    }

    #[test]
    fn initialize_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let layout = StoreLayout::new(dir.path().join("nested").join("layers"));
        layout.initialize().unwrap();
        layout.initialize().unwrap();
        assert!(layout.root().is_dir());
    }

    #[test]
    fn validate_layer_name_accepts_common_names() {
        assert!(validate_layer_name("pnpm").is_ok());
        assert!(validate_layer_name("node_modules-1.2").is_ok());
    }

    #[test]
    fn validate_layer_name_rejects_bad_names() {
        assert!(validate_layer_name("").is_err());
        assert!(validate_layer_name(".journal").is_err());
        assert!(validate_layer_name("../escape").is_err());
        assert!(validate_layer_name("has/slash").is_err());
        assert!(validate_layer_name(&"x".repeat(65)).is_err());
    }
}
