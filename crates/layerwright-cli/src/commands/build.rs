use super::{describe, json_pretty, spin_fail, spin_ok, spinner, EXIT_SUCCESS};
use layerwright_core::{
    parse_source_date_epoch, parse_toggle, BuildRequest, BuildResult, Engine, EngineConfig,
    StoreLock,
};
use layerwright_provenance::{BomEntry, DefaultGenerator, LegacyBom};
use layerwright_remote::HttpFetcher;
use layerwright_schema::{parse_plan_file, BuildPlan, DependencyId, PlanEntry, StackId};
use layerwright_store::{LayerStore, StoreLayout};
use serde::Serialize;
use std::path::{Path, PathBuf};

#[derive(Debug)]
pub struct BuildArgs {
    pub catalog: PathBuf,
    pub stack: String,
    pub plan: Option<PathBuf>,
    pub dependency: String,
    pub build: bool,
    pub launch: bool,
    pub sbom_formats: Vec<String>,
    pub legacy_sbom: bool,
    pub disable_sbom: Option<String>,
    pub source_date_epoch: Option<String>,
}

pub fn run(layers: &Path, args: &BuildArgs, json: bool) -> Result<u8, String> {
    let config = EngineConfig {
        disable_sbom: parse_toggle("BP_DISABLE_SBOM", args.disable_sbom.as_deref())
            .map_err(|e| describe(&e))?,
        legacy_bom: args.legacy_sbom,
        created: parse_source_date_epoch("SOURCE_DATE_EPOCH", args.source_date_epoch.as_deref())
            .map_err(|e| describe(&e))?
            .unwrap_or_default(),
    };
    let plan = match args.plan {
        Some(ref path) => parse_plan_file(path).map_err(|e| format!("plan error: {e}"))?,
        None => BuildPlan {
            entries: vec![PlanEntry::new(args.dependency.as_str())
                .with("build", args.build)
                .with("launch", args.launch)],
        },
    };
    let request = BuildRequest {
        dependency_id: DependencyId::new(args.dependency.as_str()),
        stack: StackId::new(args.stack.as_str()),
        catalog_path: args.catalog.clone(),
        plan,
        sbom_formats: args.sbom_formats.clone(),
    };

    let layout = StoreLayout::new(layers);
    let _lock = StoreLock::acquire(&layout.lock_file()).map_err(|e| format!("store lock: {e}"))?;

    let engine = Engine::new(
        layers,
        Box::new(HttpFetcher::new()),
        Box::new(DefaultGenerator::default()),
        config,
    );

    let pb = if json {
        None
    } else {
        Some(spinner(&format!("provisioning {}...", args.dependency)))
    };
    let result = match engine.provision(&request) {
        Ok(r) => {
            if let Some(ref pb) = pb {
                spin_ok(pb, if r.cache_hit { "layer reused" } else { "layer installed" });
            }
            r
        }
        Err(e) => {
            if let Some(ref pb) = pb {
                spin_fail(pb, "provisioning failed");
            }
            return Err(describe(&e));
        }
    };

    let sbom_files = engine
        .store()
        .write_provenance(&result.layer)
        .map_err(|e| format!("store error: {e}"))?;
    let bom_files = match result.legacy_bom {
        Some(ref bom) => write_legacy_bom(engine.store(), bom)?,
        None => Vec::new(),
    };

    report(&result, &sbom_files, &bom_files, json)?;
    Ok(EXIT_SUCCESS)
}

#[derive(Serialize)]
struct BomFile<'a> {
    bom: &'a [BomEntry],
}

/// Write `[[bom]]` entries to `build.toml` and `launch.toml` in the layers root.
fn write_legacy_bom(store: &LayerStore, bom: &LegacyBom) -> Result<Vec<PathBuf>, String> {
    let mut written = Vec::new();
    for (file, entries) in [("build.toml", &bom.build), ("launch.toml", &bom.launch)] {
        if entries.is_empty() {
            continue;
        }
        let content = toml::to_string(&BomFile { bom: entries })
            .map_err(|e| format!("failed to serialize legacy BOM: {e}"))?;
        let path = store
            .write_root_file(file, content.as_bytes())
            .map_err(|e| format!("store error: {e}"))?;
        written.push(path);
    }
    Ok(written)
}

fn report(
    result: &BuildResult,
    sbom_files: &[PathBuf],
    bom_files: &[PathBuf],
    json: bool,
) -> Result<(), String> {
    let layer = &result.layer;
    if json {
        let payload = serde_json::json!({
            "layer": layer.name,
            "path": layer.path,
            "dependency": result.resolved.id,
            "version": result.resolved.version,
            "checksum": result.resolved.checksum,
            "cache_hit": result.cache_hit,
            "flags": layer.flags,
            "sbom": sbom_files,
            "legacy_bom": bom_files,
        });
        println!("{}", json_pretty(&payload)?);
    } else {
        println!(
            "{} {} {} {}",
            if result.cache_hit { "reused" } else { "installed" },
            result.resolved.name,
            result.resolved.version,
            layer.path.display()
        );
        println!("checksum: {}", result.resolved.checksum);
        println!("flags:    {}", layer.flags);
        for path in sbom_files.iter().chain(bom_files) {
            println!("wrote:    {}", path.display());
        }
    }
    Ok(())
}
