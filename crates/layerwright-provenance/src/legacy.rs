use crate::render::algorithm_name;
use layerwright_schema::DependencyDescriptor;
use serde::{Deserialize, Serialize};

/// Flat bill-of-materials entry consumed by pipelines that predate SBOM
/// documents.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BomEntry {
    pub name: String,
    pub metadata: BomMetadata,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BomMetadata {
    pub version: String,
    pub uri: String,
    pub checksum: BomChecksum,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub licenses: Vec<String>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub purl: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub cpe: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub source: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_checksum: Option<BomChecksum>,
    #[serde(default)]
    pub stacks: Vec<String>,
    #[serde(
        default,
        rename = "deprecation-date",
        skip_serializing_if = "Option::is_none"
    )]
    pub deprecation_date: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BomChecksum {
    pub algorithm: String,
    pub hash: String,
}

impl BomChecksum {
    fn parse(raw: &str) -> Self {
        let (algorithm, hash) = raw.split_once(':').unwrap_or(("sha256", raw));
        Self {
            algorithm: algorithm_name(algorithm),
            hash: hash.to_owned(),
        }
    }
}

/// Legacy entries split by the phases the layer is available in.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LegacyBom {
    pub build: Vec<BomEntry>,
    pub launch: Vec<BomEntry>,
}

impl LegacyBom {
    /// Attach `entries` to the build and/or launch phase.
    pub fn for_phases(entries: Vec<BomEntry>, build: bool, launch: bool) -> Self {
        Self {
            build: if build { entries.clone() } else { Vec::new() },
            launch: if launch { entries } else { Vec::new() },
        }
    }

    pub fn is_empty(&self) -> bool {
        self.build.is_empty() && self.launch.is_empty()
    }
}

pub fn legacy_bom(descriptors: &[DependencyDescriptor]) -> Vec<BomEntry> {
    descriptors
        .iter()
        .map(|d| BomEntry {
            name: d.name.clone(),
            metadata: BomMetadata {
                version: d.version.clone(),
                uri: d.uri.clone(),
                checksum: BomChecksum::parse(d.checksum.as_str()),
                licenses: d.licenses.clone(),
                purl: d.purl.clone(),
                cpe: d.cpe.clone(),
                source: d.source.clone(),
                source_checksum: (!d.source_checksum.is_empty())
                    .then(|| BomChecksum::parse(&d.source_checksum)),
                stacks: d.stacks.iter().map(ToString::to_string).collect(),
                deprecation_date: d.deprecation_date.clone(),
            },
        })
        .collect()
}
