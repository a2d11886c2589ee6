use crate::fetch::digest_hex;
use crate::http::HttpClient;
use crate::{RemoteConfig, RemoteError};
use layerwright_schema::{Catalog, Checksum, DependencyDescriptor, DependencyId, StackId};
use serde::Deserialize;
use tracing::{debug, info, warn};

const PER_PAGE: u32 = 100;

#[derive(Debug, Clone, Deserialize)]
pub struct Release {
    pub tag_name: String,
    #[serde(default)]
    pub prerelease: bool,
    #[serde(default)]
    pub draft: bool,
    #[serde(default)]
    pub assets: Vec<ReleaseAsset>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReleaseAsset {
    pub name: String,
    pub browser_download_url: String,
    /// `sha256:<hex>` when the upstream publishes one.
    #[serde(default)]
    pub digest: Option<String>,
}

/// One downloadable asset and the stacks it is built for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlatformAsset {
    pub asset: String,
    pub stacks: Vec<StackId>,
}

/// How to turn an upstream GitHub release into catalog entries.
///
/// A single-asset dependency has one [`PlatformAsset`]; a per-platform one
/// lists an asset per stack group. Every listed asset must exist on a
/// release for that version to be describable.
#[derive(Debug, Clone)]
pub struct AssetStrategy {
    pub dependency_id: DependencyId,
    /// `owner/repo`.
    pub repository: String,
    /// Oldest version that ships the assets.
    pub min_version: semver::Version,
    pub assets: Vec<PlatformAsset>,
    pub licenses: Vec<String>,
    pub cpe_vendor: String,
    pub strip_components: usize,
}

impl AssetStrategy {
    pub fn single(
        dependency_id: &str,
        repository: &str,
        min_version: semver::Version,
        asset: &str,
        stacks: &[&str],
    ) -> Self {
        Self::per_platform(
            dependency_id,
            repository,
            min_version,
            vec![PlatformAsset {
                asset: asset.to_owned(),
                stacks: stacks.iter().map(|s| StackId::new(*s)).collect(),
            }],
        )
    }

    pub fn per_platform(
        dependency_id: &str,
        repository: &str,
        min_version: semver::Version,
        assets: Vec<PlatformAsset>,
    ) -> Self {
        Self {
            dependency_id: DependencyId::new(dependency_id),
            repository: repository.to_owned(),
            min_version,
            assets,
            licenses: Vec::new(),
            cpe_vendor: dependency_id.to_owned(),
            strip_components: 0,
        }
    }

    /// The strategy for the pnpm standalone Linux binary.
    pub fn pnpm() -> Self {
        let mut strategy = Self::single(
            "pnpm",
            "pnpm/pnpm",
            semver::Version::new(5, 18, 10),
            "pnpm-linux-x64",
            &["io.buildpacks.stacks.bionic", "io.buildpacks.stacks.jammy"],
        );
        strategy.licenses = vec!["MIT".to_owned()];
        strategy.strip_components = 1;
        strategy
    }

    /// Build descriptors for one release. A missing asset is
    /// [`RemoteError::NoSourceArtifact`].
    pub fn describe(
        &self,
        version: &semver::Version,
        release: &Release,
        http: &HttpClient,
    ) -> Result<Vec<DependencyDescriptor>, RemoteError> {
        self.assets
            .iter()
            .map(|platform| {
                let asset = release
                    .assets
                    .iter()
                    .find(|a| a.name == platform.asset)
                    .ok_or_else(|| RemoteError::NoSourceArtifact {
                        version: version.to_string(),
                        asset: platform.asset.clone(),
                    })?;
                let checksum = match asset.digest {
                    Some(ref d) if !d.is_empty() => d.clone(),
                    _ => {
                        debug!("no published digest for {}, hashing download", asset.name);
                        let mut data = Vec::new();
                        http.download(&asset.browser_download_url, &mut data)?;
                        format!("sha256:{}", digest_hex("sha256", &mut data.as_slice())?)
                    }
                };
                Ok(self.descriptor(version, asset, &checksum, &platform.stacks))
            })
            .collect()
    }

    fn descriptor(
        &self,
        version: &semver::Version,
        asset: &ReleaseAsset,
        checksum: &str,
        stacks: &[StackId],
    ) -> DependencyDescriptor {
        let id = self.dependency_id.as_str();
        let mut d = DependencyDescriptor::new(
            id,
            version.to_string(),
            Checksum::new(checksum),
            asset.browser_download_url.clone(),
        );
        d.source = asset.browser_download_url.clone();
        d.source_checksum = checksum.to_owned();
        d.stacks = stacks.to_vec();
        d.licenses = self.licenses.clone();
        d.cpe = format!(
            "cpe:2.3:a:{}:{id}:{version}:*:*:*:*:*:*:*",
            self.cpe_vendor
        );
        d.purl = purl(id, &version.to_string(), checksum, &asset.browser_download_url);
        d.strip_components = self.strip_components;
        d
    }
}

fn purl(id: &str, version: &str, checksum: &str, download_url: &str) -> String {
    let hash = checksum.split_once(':').map_or(checksum, |(_, h)| h);
    format!(
        "pkg:generic/{id}@{version}?checksum={hash}&download_url={}",
        percent_encode(download_url)
    )
}

fn percent_encode(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for b in s.bytes() {
        if b.is_ascii_alphanumeric() || matches!(b, b'-' | b'.' | b'_' | b'~' | b'/' | b':') {
            out.push(b as char);
        } else {
            out.push_str(&format!("%{b:02X}"));
        }
    }
    out
}

/// Stable releases at or above `min`, oldest first. Drafts, prereleases and
/// tags that are not semver are skipped.
pub fn filter_versions<'a>(
    releases: &'a [Release],
    min: &semver::Version,
) -> Vec<(semver::Version, &'a Release)> {
    let mut versions: Vec<_> = releases
        .iter()
        .filter(|r| !r.draft && !r.prerelease)
        .filter_map(|r| {
            let tag = r.tag_name.strip_prefix('v').unwrap_or(&r.tag_name);
            match semver::Version::parse(tag) {
                Ok(v) => Some((v, r)),
                Err(e) => {
                    debug!("skipping tag '{}': {e}", r.tag_name);
                    None
                }
            }
        })
        .filter(|(v, _)| v.pre.is_empty() && v >= min)
        .collect();
    versions.sort_by(|a, b| a.0.cmp(&b.0));
    versions
}

/// Lists GitHub releases and generates catalog entries from them.
pub struct ReleaseClient {
    http: HttpClient,
    api_url: String,
}

impl ReleaseClient {
    pub fn new(config: &RemoteConfig) -> Self {
        Self {
            http: HttpClient::with_config(config),
            api_url: config.url.clone(),
        }
    }

    pub fn list_releases(&self, repository: &str) -> Result<Vec<Release>, RemoteError> {
        let mut url = Some(format!(
            "{}/repos/{repository}/releases?per_page={PER_PAGE}",
            self.api_url
        ));
        let mut releases = Vec::new();
        while let Some(current) = url {
            let (page, next): (Vec<Release>, _) = self.http.get_json(&current)?;
            releases.extend(page);
            url = next.map(|n| self.absolute(&n));
        }
        debug!("listed {} releases of {repository}", releases.len());
        Ok(releases)
    }

    fn absolute(&self, link: &str) -> String {
        if link.starts_with("http://") || link.starts_with("https://") {
            link.to_owned()
        } else {
            format!("{}{link}", self.api_url)
        }
    }

    /// Versions the strategy can describe, oldest first.
    pub fn versions(&self, strategy: &AssetStrategy) -> Result<Vec<semver::Version>, RemoteError> {
        let releases = self.list_releases(&strategy.repository)?;
        Ok(filter_versions(&releases, &strategy.min_version)
            .into_iter()
            .map(|(v, _)| v)
            .collect())
    }

    /// Build a catalog for every eligible version, or only `only` if given.
    ///
    /// When generating the whole catalog, versions without the expected
    /// assets are skipped with a warning. Asking for one such version is an
    /// error.
    pub fn generate(
        &self,
        strategy: &AssetStrategy,
        only: Option<&semver::Version>,
    ) -> Result<Catalog, RemoteError> {
        let releases = self.list_releases(&strategy.repository)?;
        let eligible = filter_versions(&releases, &strategy.min_version);

        if let Some(want) = only {
            let (version, release) = eligible
                .iter()
                .find(|(v, _)| v == want)
                .ok_or_else(|| {
                    RemoteError::NotFound(format!("{} version {want}", strategy.dependency_id))
                })?;
            return Ok(Catalog::new(strategy.describe(version, release, &self.http)?));
        }

        let mut dependencies = Vec::new();
        for (version, release) in &eligible {
            match strategy.describe(version, release, &self.http) {
                Ok(mut ds) => dependencies.append(&mut ds),
                Err(RemoteError::NoSourceArtifact { version, asset }) => {
                    warn!("skipping {version}: release has no '{asset}' asset");
                }
                Err(e) => return Err(e),
            }
        }
        dependencies.reverse();
        info!(
            "generated {} catalog entries for {}",
            dependencies.len(),
            strategy.dependency_id
        );
        Ok(Catalog::new(dependencies))
    }
}
