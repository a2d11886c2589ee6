use crate::{ContentFetcher, RemoteError};
use layerwright_schema::DependencyDescriptor;
use std::path::Path;
use std::sync::Mutex;

/// In-process fetcher for tests and dry runs.
///
/// Writes `bin/<id>` containing `<id> <version>` and remembers every
/// descriptor it was asked for. A failing mock writes a partial file first,
/// so callers can check their cleanup.
#[derive(Default)]
pub struct MockFetcher {
    calls: Mutex<Vec<DependencyDescriptor>>,
    failure: Option<String>,
}

impl MockFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing(message: &str) -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            failure: Some(message.to_owned()),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().map_or(0, |c| c.len())
    }

    pub fn fetched(&self) -> Vec<DependencyDescriptor> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }
}

impl ContentFetcher for MockFetcher {
    fn fetch(
        &self,
        descriptor: &DependencyDescriptor,
        destination: &Path,
    ) -> Result<(), RemoteError> {
        self.calls
            .lock()
            .map_err(|e| RemoteError::Http(format!("mutex poisoned: {e}")))?
            .push(descriptor.clone());

        let bin = destination.join("bin");
        std::fs::create_dir_all(&bin)?;
        let target = bin.join(descriptor.id.as_str());

        if let Some(ref message) = self.failure {
            std::fs::write(&target, b"partial")?;
            return Err(RemoteError::Http(message.clone()));
        }

        std::fs::write(
            &target,
            format!("{} {}", descriptor.id, descriptor.version),
        )?;
        Ok(())
    }
}
