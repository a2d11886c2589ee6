use crate::types::{Checksum, DependencyId, StackId};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use thiserror::Error;

/// Window before a deprecation date in which resolution starts warning.
pub const DEPRECATION_WARNING_DAYS: i64 = 30;

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("failed to read catalog file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse catalog: {0}")]
    ParseToml(#[from] toml::de::Error),
    #[error("failed to serialize catalog: {0}")]
    SerializeToml(#[from] toml::ser::Error),
    #[error("catalog entry '{id}' {version} has neither 'checksum' nor 'sha256'")]
    MissingChecksum { id: String, version: String },
    #[error("invalid version constraint '{constraint}' for '{id}': {reason}")]
    InvalidConstraint {
        id: String,
        constraint: String,
        reason: String,
    },
    #[error(
        "failed to satisfy \"{id}\" dependency version constraint \"{constraint}\": \
         no compatible versions on \"{stack}\" stack. Supported versions are: [{}]",
        .supported.join(", ")
    )]
    NoMatch {
        id: String,
        constraint: String,
        stack: String,
        supported: Vec<String>,
    },
}

/// A resolved, checksummed descriptor of one installable artifact.
///
/// Produced once per catalog lookup and never mutated afterwards.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DependencyDescriptor {
    pub id: DependencyId,
    pub name: String,
    pub version: String,
    pub checksum: Checksum,
    pub uri: String,
    #[serde(default)]
    pub source: String,
    #[serde(default, rename = "source-checksum")]
    pub source_checksum: String,
    #[serde(default)]
    pub stacks: Vec<StackId>,
    #[serde(default)]
    pub licenses: Vec<String>,
    #[serde(default)]
    pub purl: String,
    #[serde(default)]
    pub cpe: String,
    /// RFC 3339 date after which the upstream version is unsupported.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deprecation_date: Option<String>,
    #[serde(default, rename = "strip-components")]
    pub strip_components: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Deprecation {
    Supported,
    Soon(DateTime<Utc>),
    Past(DateTime<Utc>),
}

impl DependencyDescriptor {
    /// A descriptor installable on any stack, with every optional field empty.
    pub fn new(
        id: impl Into<DependencyId>,
        version: impl Into<String>,
        checksum: impl Into<Checksum>,
        uri: impl Into<String>,
    ) -> Self {
        let id = id.into();
        Self {
            name: id.to_string(),
            id,
            version: version.into(),
            checksum: checksum.into(),
            uri: uri.into(),
            source: String::new(),
            source_checksum: String::new(),
            stacks: vec![StackId::new(StackId::ANY)],
            licenses: Vec::new(),
            purl: String::new(),
            cpe: String::new(),
            deprecation_date: None,
            strip_components: 0,
        }
    }

    /// Classify the descriptor's deprecation date relative to `now`.
    ///
    /// An unparsable date is treated as supported.
    pub fn deprecation(&self, now: DateTime<Utc>) -> Deprecation {
        let Some(raw) = self.deprecation_date.as_deref() else {
            return Deprecation::Supported;
        };
        let Some(date) = parse_date(raw) else {
            tracing::debug!("ignoring unparsable deprecation date '{raw}' on {}", self.id);
            return Deprecation::Supported;
        };
        if date <= now {
            Deprecation::Past(date)
        } else if date - now <= Duration::days(DEPRECATION_WARNING_DAYS) {
            Deprecation::Soon(date)
        } else {
            Deprecation::Supported
        }
    }

    pub fn supports_stack(&self, stack: &str) -> bool {
        self.stacks.iter().any(|s| s.matches(stack))
    }
}

fn parse_date(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    chrono::NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

/// Parsed dependency catalog.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Catalog {
    pub dependencies: Vec<DependencyDescriptor>,
    pub default_versions: BTreeMap<String, String>,
}

#[derive(Debug, Default, Deserialize, Serialize)]
struct CatalogFile {
    #[serde(default)]
    metadata: MetadataSection,
}

#[derive(Debug, Default, Deserialize, Serialize)]
struct MetadataSection {
    #[serde(default, rename = "default-versions")]
    default_versions: BTreeMap<String, String>,
    #[serde(default)]
    dependencies: Vec<RawDependency>,
}

/// On-disk catalog entry. Accepts the legacy `sha256` / `source_sha256`
/// fields and TOML datetimes for `deprecation_date`.
#[derive(Debug, Deserialize, Serialize)]
struct RawDependency {
    id: String,
    #[serde(default)]
    name: String,
    version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    checksum: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    sha256: Option<String>,
    uri: String,
    #[serde(default)]
    source: String,
    #[serde(default, rename = "source-checksum", skip_serializing_if = "Option::is_none")]
    source_checksum: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    source_sha256: Option<String>,
    #[serde(default)]
    stacks: Vec<String>,
    #[serde(default)]
    licenses: Vec<String>,
    #[serde(default)]
    purl: String,
    #[serde(default)]
    cpe: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    deprecation_date: Option<toml::Value>,
    #[serde(default, rename = "strip-components")]
    strip_components: usize,
}

impl RawDependency {
    fn into_descriptor(self) -> Result<DependencyDescriptor, CatalogError> {
        let checksum = match (self.checksum, self.sha256) {
            (Some(c), _) => c,
            (None, Some(sha)) => format!("sha256:{sha}"),
            (None, None) => {
                return Err(CatalogError::MissingChecksum {
                    id: self.id,
                    version: self.version,
                })
            }
        };
        let source_checksum = match (self.source_checksum, self.source_sha256) {
            (Some(c), _) => c,
            (None, Some(sha)) => format!("sha256:{sha}"),
            (None, None) => String::new(),
        };
        let deprecation_date = self.deprecation_date.map(|v| match v {
            toml::Value::String(s) => s,
            other => other.to_string(),
        });

        let name = if self.name.is_empty() {
            self.id.clone()
        } else {
            self.name
        };
        Ok(DependencyDescriptor {
            id: DependencyId::new(self.id),
            name,
            version: self.version,
            checksum: Checksum::new(checksum),
            uri: self.uri,
            source: self.source,
            source_checksum,
            stacks: self.stacks.into_iter().map(StackId::new).collect(),
            licenses: self.licenses,
            purl: self.purl,
            cpe: self.cpe,
            deprecation_date,
            strip_components: self.strip_components,
        })
    }

    fn from_descriptor(d: &DependencyDescriptor) -> Self {
        Self {
            id: d.id.to_string(),
            name: d.name.clone(),
            version: d.version.clone(),
            checksum: Some(d.checksum.to_string()),
            sha256: None,
            uri: d.uri.clone(),
            source: d.source.clone(),
            source_checksum: (!d.source_checksum.is_empty()).then(|| d.source_checksum.clone()),
            source_sha256: None,
            stacks: d.stacks.iter().map(ToString::to_string).collect(),
            licenses: d.licenses.clone(),
            purl: d.purl.clone(),
            cpe: d.cpe.clone(),
            deprecation_date: d.deprecation_date.clone().map(toml::Value::String),
            strip_components: d.strip_components,
        }
    }
}

impl Catalog {
    pub fn new(dependencies: Vec<DependencyDescriptor>) -> Self {
        Self {
            dependencies,
            default_versions: BTreeMap::new(),
        }
    }

    /// Find the highest-versioned entry for `id` installable on `stack`.
    ///
    /// `constraint` of `None` or `"default"` uses the catalog's default
    /// version for `id`, falling back to any version. A constraint that is
    /// itself a full version (`8.1.0`) matches that version exactly.
    pub fn resolve(
        &self,
        id: &str,
        constraint: Option<&str>,
        stack: &str,
    ) -> Result<DependencyDescriptor, CatalogError> {
        let constraint = match constraint {
            None | Some("" | "default") => self
                .default_versions
                .get(id)
                .map_or("*", String::as_str),
            Some(c) => c,
        };
        let matcher = VersionMatcher::parse(id, constraint)?;

        let mut candidates: Vec<(semver::Version, &DependencyDescriptor)> = self
            .dependencies
            .iter()
            .filter(|d| d.id == *id && d.supports_stack(stack))
            .filter_map(|d| match semver::Version::parse(&d.version) {
                Ok(v) => Some((v, d)),
                Err(e) => {
                    tracing::warn!("skipping {} entry with invalid version '{}': {e}", d.id, d.version);
                    None
                }
            })
            .filter(|(v, _)| matcher.matches(v))
            .collect();
        candidates.sort_by(|a, b| a.0.cmp(&b.0));

        match candidates.pop() {
            Some((_, d)) => Ok(d.clone()),
            None => {
                let mut supported: Vec<String> = self
                    .dependencies
                    .iter()
                    .filter(|d| d.id == *id && d.supports_stack(stack))
                    .map(|d| d.version.clone())
                    .collect();
                supported.sort();
                supported.dedup();
                Err(CatalogError::NoMatch {
                    id: id.to_owned(),
                    constraint: constraint.to_owned(),
                    stack: stack.to_owned(),
                    supported,
                })
            }
        }
    }

    /// Serialize back to the `[[metadata.dependencies]]` TOML layout.
    pub fn to_toml(&self) -> Result<String, CatalogError> {
        let file = CatalogFile {
            metadata: MetadataSection {
                default_versions: self.default_versions.clone(),
                dependencies: self
                    .dependencies
                    .iter()
                    .map(RawDependency::from_descriptor)
                    .collect(),
            },
        };
        Ok(toml::to_string_pretty(&file)?)
    }
}

enum VersionMatcher {
    Exact(semver::Version),
    Req(semver::VersionReq),
}

impl VersionMatcher {
    fn parse(id: &str, constraint: &str) -> Result<Self, CatalogError> {
        if let Ok(v) = semver::Version::parse(constraint) {
            return Ok(Self::Exact(v));
        }
        semver::VersionReq::parse(constraint)
            .map(Self::Req)
            .map_err(|e| CatalogError::InvalidConstraint {
                id: id.to_owned(),
                constraint: constraint.to_owned(),
                reason: e.to_string(),
            })
    }

    fn matches(&self, v: &semver::Version) -> bool {
        match self {
            Self::Exact(want) => want == v,
            Self::Req(req) => req.matches(v),
        }
    }
}

pub fn parse_catalog_str(input: &str) -> Result<Catalog, CatalogError> {
    let file: CatalogFile = toml::from_str(input)?;
    let dependencies = file
        .metadata
        .dependencies
        .into_iter()
        .map(RawDependency::into_descriptor)
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Catalog {
        dependencies,
        default_versions: file.metadata.default_versions,
    })
}

pub fn parse_catalog_file(path: impl AsRef<Path>) -> Result<Catalog, CatalogError> {
    let content = fs::read_to_string(path)?;
    parse_catalog_str(&content)
}

#[cfg(test)]
mod tests {
    use super::*;

    const CATALOG: &str = r#"
[metadata]
[metadata.default-versions]
pnpm = "8.*"

[[metadata.dependencies]]
id = "pnpm"
name = "pnpm"
version = "7.33.0"
checksum = "sha256:aaa"
uri = "https://example.com/pnpm-7.33.0"
stacks = ["io.buildpacks.stacks.jammy"]
licenses = ["MIT"]

[[metadata.dependencies]]
id = "pnpm"
name = "pnpm"
version = "8.1.0"
checksum = "sha256:bbb"
uri = "https://example.com/pnpm-8.1.0"
stacks = ["io.buildpacks.stacks.jammy", "io.buildpacks.stacks.bionic"]
deprecation_date = 2030-01-01T00:00:00Z

[[metadata.dependencies]]
id = "pnpm"
name = "pnpm"
version = "8.2.0"
sha256 = "ccc"
uri = "https://example.com/pnpm-8.2.0"
stacks = ["io.buildpacks.stacks.bionic"]

[[metadata.dependencies]]
id = "node"
name = "Node Engine"
version = "20.1.0"
checksum = "sha256:ddd"
uri = "https://example.com/node"
stacks = ["*"]
"#;

    fn catalog() -> Catalog {
        parse_catalog_str(CATALOG).expect("should parse")
    }

    #[test]
    fn parses_entries_and_defaults() {
        let c = catalog();
        assert_eq!(c.dependencies.len(), 4);
        assert_eq!(c.default_versions.get("pnpm").map(String::as_str), Some("8.*"));
    }

    #[test]
    fn legacy_sha256_becomes_prefixed_checksum() {
        let c = catalog();
        let d = c.dependencies.iter().find(|d| d.version == "8.2.0").unwrap();
        assert_eq!(d.checksum, Checksum::new("sha256:ccc"));
    }

    #[test]
    fn toml_datetime_deprecation_is_kept_as_string() {
        let c = catalog();
        let d = c.dependencies.iter().find(|d| d.version == "8.1.0").unwrap();
        assert_eq!(d.deprecation_date.as_deref(), Some("2030-01-01T00:00:00Z"));
    }

    #[test]
    fn resolve_default_picks_highest_on_stack() {
        let d = catalog()
            .resolve("pnpm", None, "io.buildpacks.stacks.jammy")
            .unwrap();
        assert_eq!(d.version, "8.1.0");
        let d = catalog()
            .resolve("pnpm", Some("default"), "io.buildpacks.stacks.bionic")
            .unwrap();
        assert_eq!(d.version, "8.2.0");
    }

    #[test]
    fn resolve_exact_version() {
        let d = catalog()
            .resolve("pnpm", Some("7.33.0"), "io.buildpacks.stacks.jammy")
            .unwrap();
        assert_eq!(d.checksum, Checksum::new("sha256:aaa"));
    }

    #[test]
    fn resolve_wildcard_stack() {
        let d = catalog().resolve("node", None, "some-stack").unwrap();
        assert_eq!(d.version, "20.1.0");
    }

    #[test]
    fn resolve_unknown_stack_fails() {
        let err = catalog()
            .resolve("pnpm", None, "io.buildpacks.stacks.unknown")
            .unwrap_err();
        assert!(matches!(err, CatalogError::NoMatch { .. }));
        assert!(err.to_string().contains("io.buildpacks.stacks.unknown"));
    }

    #[test]
    fn resolve_unsatisfied_constraint_lists_supported() {
        let err = catalog()
            .resolve("pnpm", Some("9.*"), "io.buildpacks.stacks.jammy")
            .unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("7.33.0"));
        assert!(msg.contains("8.1.0"));
    }

    #[test]
    fn resolve_invalid_constraint_fails() {
        let err = catalog()
            .resolve("pnpm", Some("not a version"), "io.buildpacks.stacks.jammy")
            .unwrap_err();
        assert!(matches!(err, CatalogError::InvalidConstraint { .. }));
    }

    #[test]
    fn rejects_entry_without_checksum() {
        let input = r#"
[[metadata.dependencies]]
id = "pnpm"
version = "8.1.0"
uri = "https://example.com"
"#;
        assert!(matches!(
            parse_catalog_str(input),
            Err(CatalogError::MissingChecksum { .. })
        ));
    }

    #[test]
    fn to_toml_reparses_identically() {
        let c = catalog();
        let text = c.to_toml().unwrap();
        let back = parse_catalog_str(&text).unwrap();
        assert_eq!(back, c);
    }

    #[test]
    fn deprecation_classification() {
        let now = DateTime::parse_from_rfc3339("2029-12-15T00:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let mut d = catalog()
            .resolve("pnpm", Some("8.1.0"), "io.buildpacks.stacks.jammy")
            .unwrap();
        assert!(matches!(d.deprecation(now), Deprecation::Soon(_)));

        d.deprecation_date = Some("2020-01-01".to_owned());
        assert!(matches!(d.deprecation(now), Deprecation::Past(_)));

        d.deprecation_date = None;
        assert_eq!(d.deprecation(now), Deprecation::Supported);
    }
}
