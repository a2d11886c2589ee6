use crate::CoreError;
use chrono::{DateTime, Utc};

/// Switches that shape a build, resolved by the caller before the engine
/// runs. The engine never reads the process environment itself.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EngineConfig {
    /// Skip provenance generation entirely.
    pub disable_sbom: bool,
    /// Attach legacy bill-of-materials entries to the build result.
    pub legacy_bom: bool,
    /// Timestamp stamped into rendered documents. Defaults to the Unix
    /// epoch.
    pub created: DateTime<Utc>,
}

/// Parse a boolean toggle the way buildpack environments spell them.
///
/// Unset or empty is `false`. `1`/`t`/`true` and `0`/`f`/`false` are
/// accepted in any case; anything else is [`CoreError::InvalidToggle`].
pub fn parse_toggle(name: &str, value: Option<&str>) -> Result<bool, CoreError> {
    let Some(raw) = value.map(str::trim).filter(|v| !v.is_empty()) else {
        return Ok(false);
    };
    match raw.to_ascii_lowercase().as_str() {
        "1" | "t" | "true" => Ok(true),
        "0" | "f" | "false" => Ok(false),
        _ => Err(CoreError::InvalidToggle {
            name: name.to_owned(),
            value: raw.to_owned(),
        }),
    }
}

/// Parse `SOURCE_DATE_EPOCH`-style seconds into a document timestamp.
pub fn parse_source_date_epoch(
    name: &str,
    value: Option<&str>,
) -> Result<Option<DateTime<Utc>>, CoreError> {
    let Some(raw) = value.map(str::trim).filter(|v| !v.is_empty()) else {
        return Ok(None);
    };
    let invalid = || CoreError::InvalidToggle {
        name: name.to_owned(),
        value: raw.to_owned(),
    };
    let secs: i64 = raw.parse().map_err(|_| invalid())?;
    DateTime::from_timestamp(secs, 0).map(Some).ok_or_else(invalid)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn toggle_accepts_common_spellings() {
        for v in ["1", "t", "T", "true", "TRUE", "True"] {
            assert!(parse_toggle("BP_DISABLE_SBOM", Some(v)).unwrap(), "{v}");
        }
        for v in ["0", "f", "F", "false", "FALSE", ""] {
            assert!(!parse_toggle("BP_DISABLE_SBOM", Some(v)).unwrap(), "{v}");
        }
        assert!(!parse_toggle("BP_DISABLE_SBOM", None).unwrap());
    }

    #[test]
    fn toggle_rejects_garbage() {
        let err = parse_toggle("BP_DISABLE_SBOM", Some("not-a-bool")).unwrap_err();
        assert!(matches!(err, CoreError::InvalidToggle { ref name, .. } if name == "BP_DISABLE_SBOM"));
        assert!(err.to_string().contains("failed to parse BP_DISABLE_SBOM"));
    }

    #[test]
    fn source_date_epoch() {
        let t = parse_source_date_epoch("SOURCE_DATE_EPOCH", Some("1700000000"))
            .unwrap()
            .unwrap();
        assert_eq!(t.timestamp(), 1_700_000_000);
        assert_eq!(parse_source_date_epoch("SOURCE_DATE_EPOCH", None).unwrap(), None);
        assert!(parse_source_date_epoch("SOURCE_DATE_EPOCH", Some("yesterday")).is_err());
    }
}
