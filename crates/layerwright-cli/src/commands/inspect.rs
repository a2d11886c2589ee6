use super::{colorize_flag, json_pretty, EXIT_SUCCESS};
use layerwright_provenance::SbomFormat;
use layerwright_store::{LayerStore, StoreLayout};
use std::path::Path;

pub fn run(layers: &Path, layer: &str, json: bool) -> Result<u8, String> {
    let layout = StoreLayout::new(layers);
    let store = LayerStore::new(layout.clone());
    let record = store.load(layer).map_err(|e| format!("store error: {e}"))?;

    let sbom: Vec<_> = SbomFormat::ALL
        .iter()
        .map(|f| layout.sbom_path(layer, f.extension()))
        .filter(|p| p.exists())
        .collect();

    if json {
        let payload = serde_json::json!({
            "layer": record.name,
            "path": record.path,
            "exists": record.path.is_dir(),
            "flags": record.flags,
            "fingerprint": record.fingerprint(),
            "metadata": record.metadata,
            "sbom": sbom,
        });
        println!("{}", json_pretty(&payload)?);
    } else {
        println!("layer:        {}", record.name);
        println!("path:         {}", record.path.display());
        println!("fingerprint:  {}", record.fingerprint().unwrap_or("(none)"));
        println!("build:        {}", colorize_flag(record.flags.build));
        println!("launch:       {}", colorize_flag(record.flags.launch));
        println!("cache:        {}", colorize_flag(record.flags.cache));
        for path in &sbom {
            println!("sbom:         {}", path.display());
        }
    }
    Ok(EXIT_SUCCESS)
}
