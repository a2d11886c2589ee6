use crate::layout::StoreLayout;
use crate::StoreError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::PathBuf;
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

/// A single rollback step that undoes part of an install.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RollbackStep {
    /// Remove a layer directory that may be partially populated.
    RemoveDir(PathBuf),
    /// Remove a file, typically a layer record written mid-install.
    RemoveFile(PathBuf),
}

/// The type of mutating operation being tracked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WalOpKind {
    Install,
}

impl std::fmt::Display for WalOpKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WalOpKind::Install => write!(f, "install"),
        }
    }
}

/// A journal entry for an in-flight operation on one layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalEntry {
    pub op_id: String,
    pub kind: WalOpKind,
    pub layer: String,
    pub timestamp: String,
    pub rollback_steps: Vec<RollbackStep>,
}

/// Write-ahead journal for crash recovery.
///
/// An install opens an entry before touching the layer, appends rollback
/// steps as it goes, and removes the entry once the record is persisted.
/// Entries still present at startup belong to an interrupted install and
/// are rolled back.
pub struct WriteAheadLog {
    wal_dir: PathBuf,
}

impl WriteAheadLog {
    pub fn new(layout: &StoreLayout) -> Self {
        Self {
            wal_dir: layout.journal_dir(),
        }
    }

    pub fn initialize(&self) -> Result<(), StoreError> {
        fs::create_dir_all(&self.wal_dir).map_err(StoreError::unwritable(&self.wal_dir))
    }

    /// Begin a new entry. Returns the op id.
    pub fn begin(&self, kind: WalOpKind, layer: &str) -> Result<String, StoreError> {
        let now = chrono::Utc::now();
        let op_id = format!(
            "{}-{}",
            now.format("%Y%m%d%H%M%S%6f"),
            &blake3::hash(layer.as_bytes()).to_hex()[..8]
        );
        let entry = WalEntry {
            op_id: op_id.clone(),
            kind,
            layer: layer.to_owned(),
            timestamp: now.to_rfc3339(),
            rollback_steps: Vec::new(),
        };
        self.write_entry(&entry)?;
        debug!("journal begin: {kind} for {layer} (op_id={op_id})");
        Ok(op_id)
    }

    pub fn add_rollback_step(&self, op_id: &str, step: RollbackStep) -> Result<(), StoreError> {
        let mut entry = self.read_entry(op_id)?;
        entry.rollback_steps.push(step);
        self.write_entry(&entry)
    }

    /// Remove an entry after the operation completed.
    pub fn commit(&self, op_id: &str) -> Result<(), StoreError> {
        let path = self.entry_path(op_id);
        match fs::remove_file(&path) {
            Ok(()) => {
                debug!("journal commit: {op_id}");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StoreError::Unwritable { path, source: e }),
        }
    }

    /// Drop an entry without running its rollback steps. Used once the
    /// caller has already cleaned up after a failure.
    pub fn discard(&self, op_id: &str) {
        if let Err(e) = self.commit(op_id) {
            warn!("failed to discard journal entry {op_id}: {e}");
        }
    }

    pub fn list_incomplete(&self) -> Result<Vec<WalEntry>, StoreError> {
        if !self.wal_dir.exists() {
            return Ok(Vec::new());
        }
        let mut entries = Vec::new();
        for dir_entry in fs::read_dir(&self.wal_dir)? {
            let path = dir_entry?.path();
            if !path.extension().is_some_and(|e| e == "json") {
                continue;
            }
            match fs::read_to_string(&path)
                .map_err(|e| e.to_string())
                .and_then(|c| serde_json::from_str::<WalEntry>(&c).map_err(|e| e.to_string()))
            {
                Ok(entry) => entries.push(entry),
                Err(e) => {
                    warn!("dropping corrupt journal entry {}: {e}", path.display());
                    let _ = fs::remove_file(&path);
                }
            }
        }
        entries.sort_by(|a, b| a.timestamp.cmp(&b.timestamp));
        Ok(entries)
    }

    /// Roll back every incomplete entry. Returns how many were rolled back.
    pub fn recover(&self) -> Result<usize, StoreError> {
        let entries = self.list_incomplete()?;
        for entry in &entries {
            info!(
                "journal recovery: rolling back {} of layer {} (op_id={})",
                entry.kind, entry.layer, entry.op_id
            );
            rollback_entry(entry);
            let _ = fs::remove_file(self.entry_path(&entry.op_id));
        }
        if !entries.is_empty() {
            info!(
                "journal recovery complete: {} entries rolled back",
                entries.len()
            );
        }
        Ok(entries.len())
    }

    fn entry_path(&self, op_id: &str) -> PathBuf {
        self.wal_dir.join(format!("{op_id}.json"))
    }

    fn write_entry(&self, entry: &WalEntry) -> Result<(), StoreError> {
        self.initialize()?;
        let content = serde_json::to_string_pretty(entry)?;
        let dest = self.entry_path(&entry.op_id);
        let mut tmp =
            NamedTempFile::new_in(&self.wal_dir).map_err(StoreError::unwritable(&self.wal_dir))?;
        tmp.write_all(content.as_bytes())
            .map_err(StoreError::unwritable(&dest))?;
        tmp.as_file()
            .sync_all()
            .map_err(StoreError::unwritable(&dest))?;
        tmp.persist(&dest).map_err(|e| StoreError::Unwritable {
            path: dest.clone(),
            source: e.error,
        })?;
        crate::fsync_dir(&self.wal_dir)?;
        Ok(())
    }

    fn read_entry(&self, op_id: &str) -> Result<WalEntry, StoreError> {
        let content = fs::read_to_string(self.entry_path(op_id))?;
        Ok(serde_json::from_str(&content)?)
    }
}

fn rollback_entry(entry: &WalEntry) {
    for step in entry.rollback_steps.iter().rev() {
        match step {
            RollbackStep::RemoveDir(path) => {
                if path.exists() {
                    match fs::remove_dir_all(path) {
                        Ok(()) => debug!("journal rollback: removed dir {}", path.display()),
                        Err(e) => warn!(
                            "journal rollback: failed to remove dir {}: {e}",
                            path.display()
                        ),
                    }
                }
            }
            RollbackStep::RemoveFile(path) => {
                if path.exists() {
                    match fs::remove_file(path) {
                        Ok(()) => debug!("journal rollback: removed file {}", path.display()),
                        Err(e) => warn!(
                            "journal rollback: failed to remove file {}: {e}",
                            path.display()
                        ),
                    }
                }
            }
        }
    }
}
