//! Remote and sync configuration.
//!
//! Remote settings come from the environment; sync tuning comes from
//! [`SyncOptions`], built in code.

use std::time::Duration;

use crate::error::{Error, Result};
use crate::util::{is_http_url, normalize_text_option};

pub const ENV_GITHUB_OWNER: &str = "LOREBOOK_GITHUB_OWNER";
pub const ENV_GITHUB_REPO: &str = "LOREBOOK_GITHUB_REPO";
pub const ENV_GITHUB_TOKEN: &str = "LOREBOOK_GITHUB_TOKEN";
pub const ENV_GITHUB_BRANCH: &str = "LOREBOOK_GITHUB_BRANCH";
pub const ENV_GITHUB_API_URL: &str = "LOREBOOK_GITHUB_API_URL";
pub const ENV_DOCUMENTS_DIR: &str = "LOREBOOK_DOCUMENTS_DIR";

pub const DEFAULT_API_URL: &str = "https://api.github.com";
pub const DEFAULT_DOCUMENTS_DIR: &str = "documents";

/// Coordinates of the Git repository that mirrors the local store
#[derive(Clone, PartialEq, Eq)]
pub struct RemoteConfig {
    pub owner: String,
    pub repo: String,
    pub token: String,
    pub branch: Option<String>,
    pub api_url: String,
    pub documents_dir: String,
}

impl std::fmt::Debug for RemoteConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteConfig")
            .field("owner", &self.owner)
            .field("repo", &self.repo)
            .field("token", &"<redacted>")
            .field("branch", &self.branch)
            .field("api_url", &self.api_url)
            .field("documents_dir", &self.documents_dir)
            .finish()
    }
}

impl RemoteConfig {
    /// Build a config with default API URL and documents directory
    pub fn new(
        owner: impl Into<String>,
        repo: impl Into<String>,
        token: impl Into<String>,
    ) -> Self {
        Self {
            owner: owner.into(),
            repo: repo.into(),
            token: token.into(),
            branch: None,
            api_url: DEFAULT_API_URL.to_string(),
            documents_dir: DEFAULT_DOCUMENTS_DIR.to_string(),
        }
    }

    /// Read the remote config from the process environment.
    ///
    /// Returns `Ok(None)` when no remote variable is set, and
    /// [`Error::Configuration`] when only some of the required ones are.
    pub fn from_env() -> Result<Option<Self>> {
        parse_config(|key| std::env::var(key).ok())
    }

    /// Base URL for repository-scoped API calls
    #[must_use]
    pub fn repo_url(&self) -> String {
        format!("{}/repos/{}/{}", self.api_url, self.owner, self.repo)
    }
}

fn parse_config(lookup: impl Fn(&str) -> Option<String>) -> Result<Option<RemoteConfig>> {
    let owner = normalize_text_option(lookup(ENV_GITHUB_OWNER));
    let repo = normalize_text_option(lookup(ENV_GITHUB_REPO));
    let token = normalize_text_option(lookup(ENV_GITHUB_TOKEN));
    let branch = normalize_text_option(lookup(ENV_GITHUB_BRANCH));
    let api_url = normalize_text_option(lookup(ENV_GITHUB_API_URL));
    let documents_dir = normalize_text_option(lookup(ENV_DOCUMENTS_DIR));

    if owner.is_none() && repo.is_none() && token.is_none() {
        return Ok(None);
    }

    let mut missing = Vec::new();
    if owner.is_none() {
        missing.push(ENV_GITHUB_OWNER);
    }
    if repo.is_none() {
        missing.push(ENV_GITHUB_REPO);
    }
    if token.is_none() {
        missing.push(ENV_GITHUB_TOKEN);
    }
    let (Some(owner), Some(repo), Some(token)) = (owner, repo, token) else {
        return Err(Error::Configuration(format!(
            "remote configuration is incomplete. Missing: {}",
            missing.join(", ")
        )));
    };

    let api_url = match api_url {
        Some(url) if is_http_url(&url) => url.trim_end_matches('/').to_string(),
        Some(url) => {
            return Err(Error::Configuration(format!(
                "{ENV_GITHUB_API_URL} must include http:// or https:// (got {url})"
            )));
        }
        None => DEFAULT_API_URL.to_string(),
    };

    let documents_dir = documents_dir
        .map(|dir| dir.trim_matches('/').to_string())
        .filter(|dir| !dir.is_empty())
        .unwrap_or_else(|| DEFAULT_DOCUMENTS_DIR.to_string());

    Ok(Some(RemoteConfig {
        owner,
        repo,
        token,
        branch,
        api_url,
        documents_dir,
    }))
}

/// Tuning knobs for a sync pass
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncOptions {
    /// Modifications within this window of the sync marker count as unchanged
    pub clock_tolerance: Duration,
    /// Extra attempts for an item that failed with a retryable error
    pub retry_attempts: u32,
    /// Delay before a retry when the remote gives no hint
    pub retry_backoff: Duration,
    /// Per-request timeout for the remote transport
    pub request_timeout: Duration,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            clock_tolerance: Duration::from_secs(1),
            retry_attempts: 2,
            retry_backoff: Duration::from_millis(500),
            request_timeout: Duration::from_secs(30),
        }
    }
}

impl SyncOptions {
    #[must_use]
    pub const fn with_clock_tolerance(mut self, tolerance: Duration) -> Self {
        self.clock_tolerance = tolerance;
        self
    }

    #[must_use]
    pub const fn with_retry(mut self, attempts: u32, backoff: Duration) -> Self {
        self.retry_attempts = attempts;
        self.retry_backoff = backoff;
        self
    }

    #[must_use]
    pub const fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Clock tolerance in milliseconds, saturating
    #[must_use]
    pub fn tolerance_ms(&self) -> i64 {
        i64::try_from(self.clock_tolerance.as_millis()).unwrap_or(i64::MAX)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn parse_from_map(map: &HashMap<&'static str, &'static str>) -> Result<Option<RemoteConfig>> {
        parse_config(|key| map.get(key).map(|value| (*value).to_string()))
    }

    #[test]
    fn parse_config_none_returns_none() {
        let map = HashMap::new();
        assert!(parse_from_map(&map).unwrap().is_none());
    }

    #[test]
    fn parse_config_requires_all_required_values() {
        let mut map = HashMap::new();
        map.insert(ENV_GITHUB_OWNER, "lore-keeper");

        let err = parse_from_map(&map).unwrap_err();
        match err {
            Error::Configuration(message) => {
                assert!(message.contains(ENV_GITHUB_REPO));
                assert!(message.contains(ENV_GITHUB_TOKEN));
                assert!(!message.contains(ENV_GITHUB_OWNER));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn parse_config_applies_defaults() {
        let mut map = HashMap::new();
        map.insert(ENV_GITHUB_OWNER, "lore-keeper");
        map.insert(ENV_GITHUB_REPO, "notes");
        map.insert(ENV_GITHUB_TOKEN, " ghp_secret ");

        let config = parse_from_map(&map).unwrap().unwrap();
        assert_eq!(config.token, "ghp_secret");
        assert_eq!(config.api_url, DEFAULT_API_URL);
        assert_eq!(config.documents_dir, DEFAULT_DOCUMENTS_DIR);
        assert_eq!(config.branch, None);
        assert_eq!(
            config.repo_url(),
            "https://api.github.com/repos/lore-keeper/notes"
        );
    }

    #[test]
    fn parse_config_normalizes_optional_values() {
        let mut map = HashMap::new();
        map.insert(ENV_GITHUB_OWNER, "lore-keeper");
        map.insert(ENV_GITHUB_REPO, "notes");
        map.insert(ENV_GITHUB_TOKEN, "ghp_secret");
        map.insert(ENV_GITHUB_BRANCH, "main");
        map.insert(ENV_GITHUB_API_URL, "https://ghe.example.com/api/v3/");
        map.insert(ENV_DOCUMENTS_DIR, "/lore/docs/");

        let config = parse_from_map(&map).unwrap().unwrap();
        assert_eq!(config.branch.as_deref(), Some("main"));
        assert_eq!(config.api_url, "https://ghe.example.com/api/v3");
        assert_eq!(config.documents_dir, "lore/docs");
    }

    #[test]
    fn parse_config_rejects_api_url_without_scheme() {
        let mut map = HashMap::new();
        map.insert(ENV_GITHUB_OWNER, "lore-keeper");
        map.insert(ENV_GITHUB_REPO, "notes");
        map.insert(ENV_GITHUB_TOKEN, "ghp_secret");
        map.insert(ENV_GITHUB_API_URL, "api.github.com");

        assert!(matches!(
            parse_from_map(&map),
            Err(Error::Configuration(_))
        ));
    }

    #[test]
    fn debug_output_redacts_token() {
        let config = RemoteConfig::new("o", "r", "ghp_secret");
        let rendered = format!("{config:?}");
        assert!(!rendered.contains("ghp_secret"));
    }

    #[test]
    fn sync_options_builder() {
        let options = SyncOptions::default()
            .with_clock_tolerance(Duration::from_millis(250))
            .with_retry(0, Duration::ZERO);
        assert_eq!(options.tolerance_ms(), 250);
        assert_eq!(options.retry_attempts, 0);
        assert_eq!(options.request_timeout, Duration::from_secs(30));
    }
}
