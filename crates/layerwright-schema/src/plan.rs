use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PlanError {
    #[error("failed to read build plan: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse build plan: {0}")]
    ParseToml(#[from] toml::de::Error),
    #[error("dependency '{0}' was not requested by the build plan")]
    NotRequested(String),
}

/// The build request's plan: one entry per dependency some earlier phase asked for.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
pub struct BuildPlan {
    #[serde(default)]
    pub entries: Vec<PlanEntry>,
}

/// A single requirement. `metadata` is free-form; the keys this workspace
/// reads are `build`, `launch` and `version`.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
pub struct PlanEntry {
    pub name: String,
    #[serde(default)]
    pub metadata: toml::Table,
}

impl BuildPlan {
    pub fn entry(&self, name: &str) -> Result<&PlanEntry, PlanError> {
        self.entries
            .iter()
            .find(|e| e.name == name)
            .ok_or_else(|| PlanError::NotRequested(name.to_owned()))
    }
}

impl PlanEntry {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            metadata: toml::Table::new(),
        }
    }

    #[must_use]
    pub fn with(mut self, key: &str, value: impl Into<toml::Value>) -> Self {
        self.metadata.insert(key.to_owned(), value.into());
        self
    }

    /// Requested version constraint, if the entry carries a string `version`.
    pub fn version(&self) -> Option<&str> {
        self.metadata.get("version").and_then(toml::Value::as_str)
    }
}

pub fn parse_plan_str(input: &str) -> Result<BuildPlan, PlanError> {
    Ok(toml::from_str(input)?)
}

pub fn parse_plan_file(path: impl AsRef<Path>) -> Result<BuildPlan, PlanError> {
    let content = fs::read_to_string(path)?;
    parse_plan_str(&content)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_plan_with_metadata() {
        let input = r#"
[[entries]]
name = "node"

[[entries]]
name = "pnpm"
[entries.metadata]
build = true
launch = false
version = "8.*"
"#;
        let plan = parse_plan_str(input).expect("should parse");
        assert_eq!(plan.entries.len(), 2);
        let entry = plan.entry("pnpm").unwrap();
        assert_eq!(entry.metadata.get("build"), Some(&toml::Value::Boolean(true)));
        assert_eq!(entry.version(), Some("8.*"));
    }

    #[test]
    fn entry_without_metadata() {
        let plan = parse_plan_str("[[entries]]\nname = \"pnpm\"\n").unwrap();
        let entry = plan.entry("pnpm").unwrap();
        assert!(entry.metadata.is_empty());
        assert_eq!(entry.version(), None);
    }

    #[test]
    fn missing_entry_is_not_requested() {
        let plan = BuildPlan {
            entries: vec![PlanEntry::new("node")],
        };
        assert!(matches!(plan.entry("pnpm"), Err(PlanError::NotRequested(_))));
    }

    #[test]
    fn empty_plan_parses() {
        let plan = parse_plan_str("").unwrap();
        assert!(plan.entries.is_empty());
    }
}
