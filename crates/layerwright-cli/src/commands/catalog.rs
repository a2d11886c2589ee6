use super::{json_pretty, spin_fail, spin_ok, spinner, EXIT_SUCCESS};
use clap::Args;
use layerwright_remote::config::GITHUB_API_URL;
use layerwright_remote::{AssetStrategy, ReleaseClient, RemoteConfig};
use std::path::Path;

/// Where releases are listed and which dependency they belong to.
#[derive(Debug, Args)]
pub struct Upstream {
    /// Releases API endpoint.
    #[arg(long, env = "GITHUB_API_URL", default_value = GITHUB_API_URL)]
    pub api_url: String,
    /// Token for the releases API.
    #[arg(long, env = "GITHUB_TOKEN", hide_env_values = true)]
    pub github_token: Option<String>,
    /// Override the upstream `owner/repo`.
    #[arg(long)]
    pub repository: Option<String>,
    /// Override the oldest eligible version.
    #[arg(long)]
    pub min_version: Option<String>,
}

impl Upstream {
    fn strategy(&self) -> Result<AssetStrategy, String> {
        let mut strategy = AssetStrategy::pnpm();
        if let Some(ref repo) = self.repository {
            strategy.repository.clone_from(repo);
        }
        if let Some(ref min) = self.min_version {
            strategy.min_version = parse_version(min)?;
        }
        Ok(strategy)
    }

    fn client(&self) -> ReleaseClient {
        let config = RemoteConfig::new(&self.api_url).with_token(self.github_token.as_deref());
        ReleaseClient::new(&config)
    }
}

fn parse_version(raw: &str) -> Result<semver::Version, String> {
    semver::Version::parse(raw.trim_start_matches('v'))
        .map_err(|e| format!("invalid version '{raw}': {e}"))
}

pub fn versions(upstream: &Upstream, json: bool) -> Result<u8, String> {
    let strategy = upstream.strategy()?;
    let versions = upstream
        .client()
        .versions(&strategy)
        .map_err(|e| e.to_string())?;
    let versions: Vec<String> = versions.iter().rev().map(ToString::to_string).collect();

    if json {
        println!("{}", json_pretty(&versions)?);
    } else {
        for v in &versions {
            println!("{v}");
        }
    }
    Ok(EXIT_SUCCESS)
}

pub fn generate(
    upstream: &Upstream,
    version: Option<&str>,
    output: Option<&Path>,
    json: bool,
) -> Result<u8, String> {
    let strategy = upstream.strategy()?;
    let only = version.map(parse_version).transpose()?;

    let pb = if json || output.is_none() {
        None
    } else {
        Some(spinner(&format!("listing {} releases...", strategy.repository)))
    };
    let catalog = match upstream.client().generate(&strategy, only.as_ref()) {
        Ok(c) => {
            if let Some(ref pb) = pb {
                spin_ok(pb, &format!("{} catalog entries", c.dependencies.len()));
            }
            c
        }
        Err(e) => {
            if let Some(ref pb) = pb {
                spin_fail(pb, "catalog generation failed");
            }
            return Err(e.to_string());
        }
    };

    let content = catalog
        .to_toml()
        .map_err(|e| format!("catalog error: {e}"))?;
    match output {
        Some(path) => {
            std::fs::write(path, &content)
                .map_err(|e| format!("failed to write {}: {e}", path.display()))?;
            if json {
                let payload = serde_json::json!({
                    "output": path,
                    "entries": catalog.dependencies.len(),
                });
                println!("{}", json_pretty(&payload)?);
            }
        }
        None if json => println!("{}", json_pretty(&catalog.dependencies)?),
        None => print!("{content}"),
    }
    Ok(EXIT_SUCCESS)
}
