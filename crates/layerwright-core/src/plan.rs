use layerwright_schema::{BuildPlan, PlanEntry, PlanError};
use layerwright_store::LayerFlags;
use tracing::warn;

/// What the build plan asks of one dependency.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Requirement {
    pub flags: LayerFlags,
    /// Version constraint, if the plan entry names one.
    pub version: Option<String>,
}

/// Derive layer flags for `dependency_id` from the plan.
///
/// `build` and `launch` are read from the entry metadata; absent or
/// non-boolean values count as `false`. `cache` is set whenever the layer is
/// needed at all.
pub fn interpret(plan: &BuildPlan, dependency_id: &str) -> Result<Requirement, PlanError> {
    let entry = plan.entry(dependency_id)?;
    let build = flag(entry, "build");
    let launch = flag(entry, "launch");
    Ok(Requirement {
        flags: LayerFlags {
            build,
            launch,
            cache: build || launch,
        },
        version: entry.version().map(str::to_owned),
    })
}

fn flag(entry: &PlanEntry, key: &str) -> bool {
    match entry.metadata.get(key) {
        None => false,
        Some(toml::Value::Boolean(b)) => *b,
        Some(other) => {
            warn!(
                "plan entry '{}' has non-boolean '{key}' ({other}); treating as false",
                entry.name
            );
            false
        }
    }
}
