use anyhow::Context;
use async_trait::async_trait;
use octocrab::Octocrab;
use serde::Deserialize;
use std::env;
use std::fmt;
use std::str::FromStr;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::{CheckError, FetchError};

/// Environment variable consulted when the config carries no access token
pub const TOKEN_ENV_VAR: &str = "GITHUB_TOKEN";

/// Repository identifier split into owner and name
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RepoSlug {
    pub owner: String,
    pub name: String,
}

impl RepoSlug {
    /// Split on the first `/`. Both parts must be non-empty; any further
    /// slashes stay in the name.
    pub fn parse(slug: &str) -> Result<Self, CheckError> {
        match slug.split_once('/') {
            Some((owner, name)) if !owner.is_empty() && !name.is_empty() => Ok(Self {
                owner: owner.to_string(),
                name: name.to_string(),
            }),
            _ => Err(CheckError::InvalidSlug(slug.to_string())),
        }
    }
}

impl FromStr for RepoSlug {
    type Err = CheckError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for RepoSlug {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.name)
    }
}

/// Source of "latest release" information for repositories
#[async_trait]
pub trait ReleaseSource: Send + Sync {
    /// Tag name of the latest published release
    async fn latest_release_tag(&self, slug: &RepoSlug) -> Result<String, FetchError>;
}

/// GitHub authentication strategies
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthStrategy {
    /// Token from the configuration file
    ConfigToken,
    /// Token from the GITHUB_TOKEN environment variable
    EnvironmentToken,
    /// Unauthenticated access (low rate limit)
    Anonymous,
}

/// GitHub client wrapper used as the release source
pub struct GitHubClient {
    client: Octocrab,
    auth_strategy: AuthStrategy,
}

#[derive(Debug, Deserialize)]
struct LatestRelease {
    tag_name: String,
}

impl GitHubClient {
    /// Create a client against api.github.com
    pub fn new(config: &Config) -> anyhow::Result<Self> {
        Self::build(config, None)
    }

    /// Create a client against another API root (GitHub Enterprise, test servers)
    pub fn with_base_uri(config: &Config, base_uri: &str) -> anyhow::Result<Self> {
        Self::build(config, Some(base_uri))
    }

    fn build(config: &Config, base_uri: Option<&str>) -> anyhow::Result<Self> {
        let (auth_strategy, token) = Self::detect_authentication(config.access_token.as_deref());

        info!("Using authentication strategy: {:?}", auth_strategy);

        let mut builder = Octocrab::builder();
        if let Some(token) = token {
            builder = builder.personal_token(token);
        }
        if let Some(uri) = base_uri {
            builder = builder
                .base_uri(uri)
                .with_context(|| format!("Invalid GitHub API base URI: {}", uri))?;
        }

        let client = builder.build().context("Failed to create GitHub client")?;

        Ok(Self {
            client,
            auth_strategy,
        })
    }

    /// Pick the credential: config value first, then the environment, else anonymous
    pub fn detect_authentication(config_token: Option<&str>) -> (AuthStrategy, Option<String>) {
        if let Some(token) = config_token.filter(|t| !t.is_empty()) {
            return (AuthStrategy::ConfigToken, Some(token.to_string()));
        }

        match Self::try_environment_token() {
            Some(token) => (AuthStrategy::EnvironmentToken, Some(token)),
            None => (AuthStrategy::Anonymous, None),
        }
    }

    fn try_environment_token() -> Option<String> {
        debug!("Attempting environment variable authentication");

        let token = env::var(TOKEN_ENV_VAR).ok().filter(|t| !t.is_empty())?;

        if !token.starts_with("ghp_")
            && !token.starts_with("gho_")
            && !token.starts_with("ghs_")
            && !token.starts_with("github_pat_")
        {
            warn!("GITHUB_TOKEN doesn't look like a GitHub token (expected ghp_, gho_, ghs_ or github_pat_ prefix)");
        }

        Some(token)
    }

    pub fn auth_strategy(&self) -> AuthStrategy {
        self.auth_strategy
    }
}

#[async_trait]
impl ReleaseSource for GitHubClient {
    async fn latest_release_tag(&self, slug: &RepoSlug) -> Result<String, FetchError> {
        debug!("Fetching latest release for: {}", slug);

        let route = format!("/repos/{}/{}/releases/latest", slug.owner, slug.name);
        let release: LatestRelease = self
            .client
            .get(route, None::<&()>)
            .await
            .map_err(|e| classify_error(slug, e))?;

        Ok(release.tag_name)
    }
}

fn classify_error(slug: &RepoSlug, error: octocrab::Error) -> FetchError {
    match &error {
        octocrab::Error::GitHub { source, .. } if source.status_code.as_u16() == 404 => {
            FetchError::NotFound(slug.to_string())
        }
        _ => FetchError::Transport(error.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use quickcheck::TestResult;
    use quickcheck_macros::quickcheck;
    use serial_test::serial;
    use wiremock::matchers::{header_exists, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_parse_slug() {
        let slug = RepoSlug::parse("octocat/Hello-World").unwrap();
        assert_eq!(slug.owner, "octocat");
        assert_eq!(slug.name, "Hello-World");
        assert_eq!(slug.to_string(), "octocat/Hello-World");
    }

    #[test]
    fn test_parse_slug_keeps_extra_slashes_in_name() {
        let slug: RepoSlug = "a/b/c".parse().unwrap();
        assert_eq!(slug.owner, "a");
        assert_eq!(slug.name, "b/c");
    }

    #[test]
    fn test_parse_slug_rejects_malformed() {
        for input in ["no-slash", "", "/name", "owner/", "/"] {
            assert_matches!(
                RepoSlug::parse(input),
                Err(CheckError::InvalidSlug(s)) if s == input,
                "expected {:?} to be rejected",
                input
            );
        }
    }

    #[quickcheck]
    fn prop_owner_and_name_are_recovered(owner: String, name: String) -> TestResult {
        if owner.is_empty() || name.is_empty() || owner.contains('/') {
            return TestResult::discard();
        }

        let parsed = RepoSlug::parse(&format!("{}/{}", owner, name));
        TestResult::from_bool(matches!(parsed, Ok(s) if s.owner == owner && s.name == name))
    }

    #[quickcheck]
    fn prop_strings_without_slash_are_rejected(input: String) -> bool {
        let input = input.replace('/', "");
        RepoSlug::parse(&input).is_err()
    }

    #[test]
    #[serial]
    fn test_config_token_takes_precedence() {
        env::set_var(TOKEN_ENV_VAR, "ghp_from_env");

        let (strategy, token) = GitHubClient::detect_authentication(Some("ghp_from_config"));
        assert_eq!(strategy, AuthStrategy::ConfigToken);
        assert_eq!(token.as_deref(), Some("ghp_from_config"));

        env::remove_var(TOKEN_ENV_VAR);
    }

    #[test]
    #[serial]
    fn test_environment_token_fallback() {
        env::set_var(TOKEN_ENV_VAR, "ghp_from_env");

        let (strategy, token) = GitHubClient::detect_authentication(None);
        assert_eq!(strategy, AuthStrategy::EnvironmentToken);
        assert_eq!(token.as_deref(), Some("ghp_from_env"));

        let (strategy, _) = GitHubClient::detect_authentication(Some(""));
        assert_eq!(strategy, AuthStrategy::EnvironmentToken);

        env::remove_var(TOKEN_ENV_VAR);
    }

    #[test]
    #[serial]
    fn test_anonymous_without_any_token() {
        env::remove_var(TOKEN_ENV_VAR);

        let (strategy, token) = GitHubClient::detect_authentication(None);
        assert_eq!(strategy, AuthStrategy::Anonymous);
        assert!(token.is_none());
    }

    #[tokio::test]
    #[serial]
    async fn test_fetch_latest_release_tag() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/repos/octocat/Hello-World/releases/latest"))
            .and(header_exists("authorization"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": 1,
                "tag_name": "v1.0.0",
                "name": "First release",
                "draft": false,
                "prerelease": false
            })))
            .expect(1)
            .mount(&server)
            .await;

        let config = Config {
            access_token: Some("ghp_test".to_string()),
            ..Default::default()
        };
        let client = GitHubClient::with_base_uri(&config, &server.uri()).unwrap();
        assert_eq!(client.auth_strategy(), AuthStrategy::ConfigToken);

        let slug = RepoSlug::parse("octocat/Hello-World").unwrap();
        let tag = client.latest_release_tag(&slug).await.unwrap();
        assert_eq!(tag, "v1.0.0");
    }

    #[tokio::test]
    #[serial]
    async fn test_missing_release_is_not_found() {
        env::remove_var(TOKEN_ENV_VAR);

        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/repos/octocat/empty/releases/latest"))
            .respond_with(ResponseTemplate::new(404).set_body_json(serde_json::json!({
                "message": "Not Found",
                "documentation_url": "https://docs.github.com/rest/releases/releases#get-the-latest-release"
            })))
            .mount(&server)
            .await;

        let client = GitHubClient::with_base_uri(&Config::default(), &server.uri()).unwrap();
        assert_eq!(client.auth_strategy(), AuthStrategy::Anonymous);

        let slug = RepoSlug::parse("octocat/empty").unwrap();
        assert_matches!(
            client.latest_release_tag(&slug).await,
            Err(FetchError::NotFound(s)) if s == "octocat/empty"
        );
    }

    #[tokio::test]
    #[serial]
    async fn test_server_error_is_transport_failure() {
        env::remove_var(TOKEN_ENV_VAR);

        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/repos/octocat/Hello-World/releases/latest"))
            .respond_with(ResponseTemplate::new(500).set_body_json(serde_json::json!({
                "message": "Server Error"
            })))
            .mount(&server)
            .await;

        let client = GitHubClient::with_base_uri(&Config::default(), &server.uri()).unwrap();
        let slug = RepoSlug::parse("octocat/Hello-World").unwrap();
        assert_matches!(
            client.latest_release_tag(&slug).await,
            Err(FetchError::Transport(_))
        );
    }
}
