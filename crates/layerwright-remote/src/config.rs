use serde::{Deserialize, Serialize};

/// Default GitHub REST endpoint.
pub const GITHUB_API_URL: &str = "https://api.github.com";

/// Where upstream releases are listed, and the optional bearer token to
/// list them with.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteConfig {
    pub url: String,
    #[serde(default)]
    pub auth_token: Option<String>,
}

impl RemoteConfig {
    pub fn new(url: &str) -> Self {
        Self {
            url: url.trim_end_matches('/').to_owned(),
            auth_token: None,
        }
    }

    /// Attach a token. Empty tokens are ignored.
    #[must_use]
    pub fn with_token(mut self, token: Option<&str>) -> Self {
        self.auth_token = token.filter(|t| !t.is_empty()).map(str::to_owned);
        self
    }
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self::new(GITHUB_API_URL)
    }
}
