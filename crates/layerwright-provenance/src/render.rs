use crate::document::{SbomDocument, SbomPackage, TOOL_NAME};
use crate::{ProvenanceBundle, ProvenanceError, RenderedDocument, SbomFormat};
use chrono::SecondsFormat;
use serde_json::{json, Value};
use tracing::debug;

const SPDX_NAMESPACE_BASE: &str = "https://layerwright.dev/spdx";
const SYFT_SCHEMA_VERSION: &str = "3.0.0";

/// Serialize `document` as `format`. Output is pretty-printed JSON and
/// depends only on the document.
pub fn render(document: &SbomDocument, format: SbomFormat) -> Result<Vec<u8>, ProvenanceError> {
    let value = match format {
        SbomFormat::CycloneDx => cyclonedx(document),
        SbomFormat::Spdx => spdx(document),
        SbomFormat::Syft => syft(document),
    };
    Ok(serde_json::to_vec_pretty(&value)?)
}

/// Render `document` once per format, in order.
pub fn render_all(
    document: &SbomDocument,
    formats: &[SbomFormat],
) -> Result<ProvenanceBundle, ProvenanceError> {
    let mut bundle = ProvenanceBundle::new();
    for &format in formats {
        let content = render(document, format)?;
        debug!("rendered {format} document ({} bytes)", content.len());
        bundle.push(RenderedDocument { format, content });
    }
    Ok(bundle)
}

fn timestamp(document: &SbomDocument) -> String {
    document.created.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Stable identity for a document, derived from its packages.
fn document_digest(document: &SbomDocument) -> blake3::Hash {
    let mut hasher = blake3::Hasher::new();
    for pkg in &document.packages {
        for field in [
            pkg.name.as_str(),
            pkg.version.as_str(),
            pkg.checksum.as_str(),
            pkg.uri.as_str(),
        ] {
            hasher.update(field.as_bytes());
            hasher.update(&[0]);
        }
        if let Some(ref content) = pkg.content {
            hasher.update(content.digest.as_bytes());
        }
    }
    hasher.finalize()
}

fn uuid_from_digest(digest: &blake3::Hash) -> String {
    let hex = digest.to_hex();
    format!(
        "{}-{}-{}-{}-{}",
        &hex[0..8],
        &hex[8..12],
        &hex[12..16],
        &hex[16..20],
        &hex[20..32]
    )
}

/// Hyphenated upper-case hash algorithm name, e.g. `SHA-256`.
pub(crate) fn algorithm_name(algorithm: &str) -> String {
    match algorithm.to_ascii_lowercase().replace('-', "").as_str() {
        "sha1" => "SHA-1".to_owned(),
        "sha256" => "SHA-256".to_owned(),
        "sha384" => "SHA-384".to_owned(),
        "sha512" => "SHA-512".to_owned(),
        other => other.to_ascii_uppercase(),
    }
}

fn non_empty(s: &str) -> Option<&str> {
    (!s.is_empty()).then_some(s)
}

fn cyclonedx(document: &SbomDocument) -> Value {
    let components: Vec<Value> = document
        .packages
        .iter()
        .map(|pkg| {
            let mut component = json!({
                "type": "application",
                "name": pkg.name,
                "version": pkg.version,
                "hashes": [{
                    "alg": algorithm_name(pkg.checksum.algorithm()),
                    "content": pkg.checksum.hash(),
                }],
                "licenses": pkg.licenses.iter()
                    .map(|l| json!({ "license": { "id": l } }))
                    .collect::<Vec<_>>(),
            });
            if let Some(purl) = non_empty(&pkg.purl) {
                component["purl"] = json!(purl);
            }
            if let Some(cpe) = non_empty(&pkg.cpe) {
                component["cpe"] = json!(cpe);
            }
            if let Some(ref content) = pkg.content {
                component["properties"] = json!([
                    { "name": "layerwright:content-digest", "value": content.digest },
                    { "name": "layerwright:file-count", "value": content.file_count.to_string() },
                ]);
            }
            component
        })
        .collect();

    json!({
        "bomFormat": "CycloneDX",
        "specVersion": "1.3",
        "serialNumber": format!("urn:uuid:{}", uuid_from_digest(&document_digest(document))),
        "version": 1,
        "metadata": {
            "timestamp": timestamp(document),
            "tools": [{
                "vendor": TOOL_NAME,
                "name": TOOL_NAME,
                "version": document.tool_version,
            }],
        },
        "components": components,
    })
}

fn spdx_algorithm(algorithm: &str) -> String {
    algorithm.to_ascii_uppercase().replace('-', "")
}

fn spdx_id(pkg: &SbomPackage) -> String {
    let sanitized: String = format!("{}-{}", pkg.name, pkg.version)
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '.' || c == '-' { c } else { '-' })
        .collect();
    format!("SPDXRef-Package-{sanitized}")
}

fn spdx(document: &SbomDocument) -> Value {
    let packages: Vec<Value> = document
        .packages
        .iter()
        .map(|pkg| {
            let declared = if pkg.licenses.is_empty() {
                "NOASSERTION".to_owned()
            } else {
                pkg.licenses.join(" AND ")
            };
            let mut refs = Vec::new();
            if let Some(cpe) = non_empty(&pkg.cpe) {
                refs.push(json!({
                    "referenceCategory": "SECURITY",
                    "referenceType": "cpe23Type",
                    "referenceLocator": cpe,
                }));
            }
            if let Some(purl) = non_empty(&pkg.purl) {
                refs.push(json!({
                    "referenceCategory": "PACKAGE_MANAGER",
                    "referenceType": "purl",
                    "referenceLocator": purl,
                }));
            }
            let mut package = json!({
                "SPDXID": spdx_id(pkg),
                "name": pkg.name,
                "versionInfo": pkg.version,
                "downloadLocation": non_empty(&pkg.uri).unwrap_or("NOASSERTION"),
                "filesAnalyzed": false,
                "licenseConcluded": "NOASSERTION",
                "licenseDeclared": declared,
                "copyrightText": "NOASSERTION",
                "checksums": [{
                    "algorithm": spdx_algorithm(pkg.checksum.algorithm()),
                    "checksumValue": pkg.checksum.hash(),
                }],
                "externalRefs": refs,
            });
            if let Some(ref content) = pkg.content {
                package["comment"] = json!(format!(
                    "installed content {} ({} files)",
                    content.digest, content.file_count
                ));
            }
            package
        })
        .collect();

    let name = document
        .packages
        .first()
        .map_or_else(|| TOOL_NAME.to_owned(), |p| format!("{}-{}", p.name, p.version));

    json!({
        "spdxVersion": "SPDX-2.2",
        "dataLicense": "CC0-1.0",
        "SPDXID": "SPDXRef-DOCUMENT",
        "name": name,
        "documentNamespace": format!(
            "{SPDX_NAMESPACE_BASE}/{name}-{}",
            document_digest(document).to_hex()
        ),
        "creationInfo": {
            "created": timestamp(document),
            "creators": [format!("Tool: {TOOL_NAME}-{}", document.tool_version)],
        },
        "packages": packages,
    })
}

fn syft(document: &SbomDocument) -> Value {
    let artifacts: Vec<Value> = document
        .packages
        .iter()
        .map(|pkg| {
            json!({
                "id": &uuid_from_digest(&blake3::hash(
                    format!("{}@{}", pkg.name, pkg.version).as_bytes()
                ))[..16],
                "name": pkg.name,
                "version": pkg.version,
                "type": "binary",
                "foundBy": TOOL_NAME,
                "locations": [],
                "licenses": pkg.licenses,
                "language": "",
                "cpes": non_empty(&pkg.cpe).into_iter().collect::<Vec<_>>(),
                "purl": pkg.purl,
                "metadataType": "LayerwrightDependency",
                "metadata": {
                    "checksum": pkg.checksum,
                    "uri": pkg.uri,
                    "source": pkg.source,
                    "content": pkg.content,
                },
            })
        })
        .collect();

    json!({
        "artifacts": artifacts,
        "artifactRelationships": [],
        "source": {
            "type": "directory",
            "target": document.packages.first().map_or("", |p| p.name.as_str()),
        },
        "descriptor": {
            "name": TOOL_NAME,
            "version": document.tool_version,
            "timestamp": timestamp(document),
        },
        "schema": {
            "version": SYFT_SCHEMA_VERSION,
            "url": format!(
                "https://raw.githubusercontent.com/anchore/syft/main/schema/json/schema-{SYFT_SCHEMA_VERSION}.json"
            ),
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::ContentSummary;
    use chrono::{DateTime, Utc};
    use layerwright_schema::Checksum;

    fn document() -> SbomDocument {
        SbomDocument {
            created: DateTime::parse_from_rfc3339("2024-03-01T12:00:00Z")
                .unwrap()
                .with_timezone(&Utc),
            tool_version: "0.1.0".to_owned(),
            packages: vec![SbomPackage {
                name: "pnpm".to_owned(),
                version: "8.6.0".to_owned(),
                checksum: Checksum::new("sha256:abc123"),
                uri: "https://example.com/pnpm-linux-x64".to_owned(),
                source: String::new(),
                licenses: vec!["MIT".to_owned()],
                purl: "pkg:generic/pnpm@8.6.0".to_owned(),
                cpe: "cpe:2.3:a:pnpm:pnpm:8.6.0:*:*:*:*:*:*:*".to_owned(),
                content: Some(ContentSummary {
                    digest: "blake3:00".to_owned(),
                    file_count: 1,
                }),
            }],
        }
    }

    fn parse(bytes: &[u8]) -> Value {
        serde_json::from_slice(bytes).unwrap()
    }

    #[test]
    fn cyclonedx_carries_version_and_checksum() {
        let v = parse(&render(&document(), SbomFormat::CycloneDx).unwrap());
        assert_eq!(v["bomFormat"], "CycloneDX");
        assert_eq!(v["specVersion"], "1.3");
        assert_eq!(v["metadata"]["timestamp"], "2024-03-01T12:00:00Z");
        let c = &v["components"][0];
        assert_eq!(c["version"], "8.6.0");
        assert_eq!(c["hashes"][0]["alg"], "SHA-256");
        assert_eq!(c["hashes"][0]["content"], "abc123");
        assert_eq!(c["licenses"][0]["license"]["id"], "MIT");
    }

    #[test]
    fn spdx_carries_version_and_checksum() {
        let v = parse(&render(&document(), SbomFormat::Spdx).unwrap());
        assert_eq!(v["spdxVersion"], "SPDX-2.2");
        let p = &v["packages"][0];
        assert_eq!(p["versionInfo"], "8.6.0");
        assert_eq!(p["checksums"][0]["algorithm"], "SHA256");
        assert_eq!(p["checksums"][0]["checksumValue"], "abc123");
        assert_eq!(p["externalRefs"][0]["referenceType"], "cpe23Type");
        assert!(v["documentNamespace"]
            .as_str()
            .unwrap()
            .starts_with("https://layerwright.dev/spdx/pnpm-8.6.0-"));
    }

    #[test]
    fn syft_carries_version_and_checksum() {
        let v = parse(&render(&document(), SbomFormat::Syft).unwrap());
        let a = &v["artifacts"][0];
        assert_eq!(a["version"], "8.6.0");
        assert_eq!(a["metadata"]["checksum"], "sha256:abc123");
        assert_eq!(v["schema"]["version"], SYFT_SCHEMA_VERSION);
    }

    #[test]
    fn rendering_is_deterministic() {
        for format in SbomFormat::ALL {
            assert_eq!(
                render(&document(), format).unwrap(),
                render(&document(), format).unwrap()
            );
        }
    }

    #[test]
    fn different_checksum_changes_identity() {
        let mut other = document();
        other.packages[0].checksum = Checksum::new("sha256:def456");
        let a = parse(&render(&document(), SbomFormat::Spdx).unwrap());
        let b = parse(&render(&other, SbomFormat::Spdx).unwrap());
        assert_ne!(a["documentNamespace"], b["documentNamespace"]);
    }

    #[test]
    fn render_all_preserves_order() {
        let bundle = render_all(&document(), &[SbomFormat::Syft, SbomFormat::CycloneDx]).unwrap();
        assert_eq!(bundle.formats(), vec![SbomFormat::Syft, SbomFormat::CycloneDx]);
    }

    #[test]
    fn render_all_with_no_formats_is_empty() {
        assert!(render_all(&document(), &[]).unwrap().is_empty());
    }
}
