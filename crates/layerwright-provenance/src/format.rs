use crate::ProvenanceError;
use std::fmt;
use std::str::FromStr;

/// Supported SBOM output formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SbomFormat {
    /// CycloneDX 1.3 JSON.
    CycloneDx,
    /// SPDX 2.2 JSON.
    Spdx,
    /// Syft native JSON.
    Syft,
}

impl SbomFormat {
    pub const ALL: [SbomFormat; 3] = [Self::CycloneDx, Self::Spdx, Self::Syft];

    pub fn media_type(self) -> &'static str {
        match self {
            Self::CycloneDx => "application/vnd.cyclonedx+json",
            Self::Spdx => "application/spdx+json",
            Self::Syft => "application/vnd.syft+json",
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            Self::CycloneDx => "cdx.json",
            Self::Spdx => "spdx.json",
            Self::Syft => "syft.json",
        }
    }

    pub fn short_name(self) -> &'static str {
        match self {
            Self::CycloneDx => "cyclonedx",
            Self::Spdx => "spdx",
            Self::Syft => "syft",
        }
    }

    /// Parse every name in `names`, failing on the first unsupported one.
    pub fn parse_all<S: AsRef<str>>(names: &[S]) -> Result<Vec<Self>, ProvenanceError> {
        let mut formats = Vec::with_capacity(names.len());
        for name in names {
            let format = name.as_ref().parse()?;
            if !formats.contains(&format) {
                formats.push(format);
            }
        }
        Ok(formats)
    }
}

impl FromStr for SbomFormat {
    type Err = ProvenanceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        Self::ALL
            .into_iter()
            .find(|f| {
                trimmed == f.media_type() || trimmed.eq_ignore_ascii_case(f.short_name())
            })
            .ok_or_else(|| ProvenanceError::UnsupportedFormat(s.to_owned()))
    }
}

impl fmt::Display for SbomFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.media_type())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_media_types_and_short_names() {
        assert_eq!(
            "application/vnd.cyclonedx+json".parse::<SbomFormat>().unwrap(),
            SbomFormat::CycloneDx
        );
        assert_eq!("application/spdx+json".parse::<SbomFormat>().unwrap(), SbomFormat::Spdx);
        assert_eq!("SYFT".parse::<SbomFormat>().unwrap(), SbomFormat::Syft);
    }

    #[test]
    fn rejects_unknown_format() {
        let err = "random-format".parse::<SbomFormat>().unwrap_err();
        assert_eq!(err.to_string(), "unsupported SBOM format: 'random-format'");
    }

    #[test]
    fn parse_all_fails_on_any_unsupported_name() {
        let err = SbomFormat::parse_all(&["cyclonedx", "random-format", "spdx"]).unwrap_err();
        assert!(matches!(err, ProvenanceError::UnsupportedFormat(ref n) if n == "random-format"));
    }

    #[test]
    fn parse_all_deduplicates_preserving_order() {
        let formats =
            SbomFormat::parse_all(&["spdx", "application/spdx+json", "cyclonedx"]).unwrap();
        assert_eq!(formats, vec![SbomFormat::Spdx, SbomFormat::CycloneDx]);
    }

    #[test]
    fn display_is_media_type() {
        assert_eq!(SbomFormat::Syft.to_string(), "application/vnd.syft+json");
    }
}
