use crate::config::EngineConfig;
use crate::lifecycle::{validate_transition, ProvisionState};
use crate::plan::{interpret, Requirement};
use crate::CoreError;
use chrono::Utc;
use layerwright_provenance::{
    legacy_bom, render_all, LegacyBom, ProvenanceBundle, ProvenanceGenerator, SbomFormat,
};
use layerwright_remote::ContentFetcher;
use layerwright_schema::{
    parse_catalog_file, BuildPlan, DependencyDescriptor, DependencyId, Deprecation, StackId,
};
use layerwright_store::{
    LayerRecord, LayerStore, RollbackStep, StoreLayout, WalOpKind, WriteAheadLog,
};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Everything one build needs to provision one dependency layer.
#[derive(Debug, Clone)]
pub struct BuildRequest {
    pub dependency_id: DependencyId,
    pub stack: StackId,
    pub catalog_path: PathBuf,
    pub plan: BuildPlan,
    /// Requested provenance formats, by media type or short name.
    pub sbom_formats: Vec<String>,
}

/// Result of a successful provisioning run.
#[derive(Debug, Clone)]
pub struct BuildResult {
    pub layer: LayerRecord,
    pub legacy_bom: Option<LegacyBom>,
    pub resolved: DependencyDescriptor,
    pub cache_hit: bool,
}

/// Provisions dependency layers into a layers directory.
///
/// On construction the install journal is scanned and any install a
/// previous process left unfinished is rolled back, so no persisted
/// fingerprint can refer to a partially populated directory.
pub struct Engine {
    layout: StoreLayout,
    store: LayerStore,
    wal: WriteAheadLog,
    fetcher: Box<dyn ContentFetcher>,
    generator: Box<dyn ProvenanceGenerator>,
    config: EngineConfig,
}

struct Progress {
    state: ProvisionState,
}

impl Progress {
    fn advance(&mut self, to: ProvisionState) -> Result<(), CoreError> {
        validate_transition(self.state, to)?;
        debug!("provision state: {} -> {to}", self.state);
        self.state = to;
        Ok(())
    }
}

impl Engine {
    pub fn new(
        layers_root: impl Into<PathBuf>,
        fetcher: Box<dyn ContentFetcher>,
        generator: Box<dyn ProvenanceGenerator>,
        config: EngineConfig,
    ) -> Self {
        let layout = StoreLayout::new(layers_root);
        let store = LayerStore::new(layout.clone());
        let wal = WriteAheadLog::new(&layout);

        match wal.recover() {
            Ok(0) => {}
            Ok(n) => info!("rolled back {n} interrupted install(s)"),
            Err(e) => warn!("journal recovery failed: {e}"),
        }

        Self {
            layout,
            store,
            wal,
            fetcher,
            generator,
            config,
        }
    }

    pub fn layout(&self) -> &StoreLayout {
        &self.layout
    }

    pub fn store(&self) -> &LayerStore {
        &self.store
    }

    /// Pick the catalog entry for `id` on `stack` that satisfies
    /// `constraint`, warning if it is deprecated or about to be.
    pub fn resolve(
        &self,
        id: &str,
        stack: &str,
        catalog_path: &Path,
        constraint: Option<&str>,
    ) -> Result<DependencyDescriptor, CoreError> {
        let catalog = parse_catalog_file(catalog_path)?;
        let descriptor = catalog.resolve(id, constraint, stack)?;
        match descriptor.deprecation(Utc::now()) {
            Deprecation::Supported => {}
            Deprecation::Soon(date) => warn!(
                "{} {} will be deprecated after {}; migrate to a newer version",
                descriptor.name,
                descriptor.version,
                date.format("%Y-%m-%d")
            ),
            Deprecation::Past(date) => warn!(
                "{} {} is deprecated since {}; migrate to a newer version",
                descriptor.name,
                descriptor.version,
                date.format("%Y-%m-%d")
            ),
        }
        Ok(descriptor)
    }

    /// Read the persisted record for `name`. A missing record is empty; an
    /// unreadable one is an error.
    pub fn load_existing(&self, name: &str) -> Result<LayerRecord, CoreError> {
        Ok(self.store.load(name)?)
    }

    /// A cached layer is reusable only if its fingerprint is exactly the
    /// resolved checksum.
    pub fn decide_reuse(existing: &LayerRecord, resolved: &DependencyDescriptor) -> bool {
        existing.fingerprint() == Some(resolved.checksum.as_str())
    }

    pub fn provision(&self, request: &BuildRequest) -> Result<BuildResult, CoreError> {
        info!("Executing build process");
        let mut progress = Progress {
            state: ProvisionState::Uninitialized,
        };
        let result = self.provision_inner(request, &mut progress);
        if let Err(ref e) = result {
            let _ = progress.advance(ProvisionState::Failed);
            debug!("provisioning {} failed: {e}", request.dependency_id);
        }
        result
    }

    fn provision_inner(
        &self,
        request: &BuildRequest,
        progress: &mut Progress,
    ) -> Result<BuildResult, CoreError> {
        let formats = SbomFormat::parse_all(&request.sbom_formats)?;
        let requirement = interpret(&request.plan, &request.dependency_id)?;

        let descriptor = self.resolve(
            &request.dependency_id,
            &request.stack,
            &request.catalog_path,
            requirement.version.as_deref(),
        )?;
        progress.advance(ProvisionState::Resolved)?;
        debug!(
            "resolved {} {} ({})",
            descriptor.id, descriptor.version, descriptor.checksum
        );

        let name = descriptor.id.as_str();
        let existing = self.load_existing(name)?;

        let (layer, cache_hit) = if Self::decide_reuse(&existing, &descriptor) {
            progress.advance(ProvisionState::CacheHit)?;
            (self.reuse(existing, &descriptor, &requirement, &formats)?, true)
        } else {
            progress.advance(ProvisionState::CacheMiss)?;
            (self.install(&descriptor, &requirement, &formats)?, false)
        };
        progress.advance(ProvisionState::Provisioned)?;

        let legacy_bom = self.config.legacy_bom.then(|| {
            LegacyBom::for_phases(
                legacy_bom(std::slice::from_ref(&descriptor)),
                layer.flags.build,
                layer.flags.launch,
            )
        });

        Ok(BuildResult {
            layer,
            legacy_bom,
            resolved: descriptor,
            cache_hit,
        })
    }

    fn reuse(
        &self,
        mut record: LayerRecord,
        descriptor: &DependencyDescriptor,
        requirement: &Requirement,
        formats: &[SbomFormat],
    ) -> Result<LayerRecord, CoreError> {
        info!("Reusing cached layer {}", record.path.display());
        record.flags = requirement.flags;
        record.provenance = self.provenance(descriptor, &record.path, formats)?;
        Ok(record)
    }

    fn install(
        &self,
        descriptor: &DependencyDescriptor,
        requirement: &Requirement,
        formats: &[SbomFormat],
    ) -> Result<LayerRecord, CoreError> {
        let name = descriptor.id.as_str();
        info!("Installing {} {}", descriptor.name, descriptor.version);

        self.layout.initialize()?;
        self.wal.initialize()?;
        let op = self.wal.begin(WalOpKind::Install, name)?;

        match self.install_steps(&op, descriptor, requirement, formats) {
            Ok(record) => {
                self.wal.commit(&op)?;
                info!("Installed {} into {}", descriptor.name, record.path.display());
                Ok(record)
            }
            Err(e) => {
                warn!("install of {name} failed, removing partial layer: {e}");
                if let Err(cleanup) = self.store.remove_dir(name) {
                    warn!("failed to remove partial layer {name}: {cleanup}");
                }
                self.wal.discard(&op);
                Err(e)
            }
        }
    }

    fn install_steps(
        &self,
        op: &str,
        descriptor: &DependencyDescriptor,
        requirement: &Requirement,
        formats: &[SbomFormat],
    ) -> Result<LayerRecord, CoreError> {
        let name = descriptor.id.as_str();
        self.wal.add_rollback_step(
            op,
            RollbackStep::RemoveDir(self.layout.layer_path(name)),
        )?;
        self.wal.add_rollback_step(
            op,
            RollbackStep::RemoveFile(self.layout.record_path(name)),
        )?;

        self.store.remove_record(name)?;
        let dir = self.store.reset_dir(name)?;
        self.fetcher.fetch(descriptor, &dir)?;

        let mut record = LayerRecord::empty(name, dir);
        record.flags = requirement.flags;
        record.provenance = self.provenance(descriptor, &record.path, formats)?;
        record.set_fingerprint(&descriptor.checksum);
        self.store.persist(&record)?;
        Ok(record)
    }

    fn provenance(
        &self,
        descriptor: &DependencyDescriptor,
        dir: &Path,
        formats: &[SbomFormat],
    ) -> Result<ProvenanceBundle, CoreError> {
        if self.config.disable_sbom {
            debug!("SBOM generation disabled");
            return Ok(ProvenanceBundle::new());
        }
        if formats.is_empty() {
            return Ok(ProvenanceBundle::new());
        }
        info!("Generating SBOM for {}", dir.display());
        let mut document = self.generator.generate(descriptor, dir)?;
        document.created = self.config.created;
        Ok(render_all(&document, formats)?)
    }
}
