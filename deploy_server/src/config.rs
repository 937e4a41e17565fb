//! Deployment tracker configuration, loaded from environment variables.

use std::fmt;
use std::time::Duration;

pub const DEFAULT_GITHUB_API_URL: &str = "https://api.github.com";

#[derive(Clone)]
pub struct DeployConfig {
    /// GitHub login. Anonymous access when this or the token is empty.
    pub github_login: String,
    /// GitHub OAuth token for API calls. Never logged.
    pub github_oauth_token: String,
    /// Base URL of the GitHub REST API.
    pub github_api_url: String,
    /// Upper bound on a single source-control request.
    pub scm_timeout: Duration,
    /// Maximum pages fetched when walking a branch's history.
    pub branch_history_max_pages: u32,
    /// Maximum pooled database connections.
    pub db_max_connections: usize,
}

impl DeployConfig {
    pub fn from_env() -> Self {
        let github_login = std::env::var("GITHUB_LOGIN").unwrap_or_default();
        let github_oauth_token = std::env::var("GITHUB_OAUTH_TOKEN").unwrap_or_default();
        let github_api_url = std::env::var("GITHUB_API_URL")
            .ok()
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| DEFAULT_GITHUB_API_URL.to_string());
        let scm_timeout_secs = std::env::var("SCM_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(10);
        let branch_history_max_pages = std::env::var("SCM_BRANCH_HISTORY_MAX_PAGES")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(10);
        let db_max_connections = std::env::var("DB_MAX_CONNECTIONS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(10);

        let config = Self {
            github_login,
            github_oauth_token,
            github_api_url,
            scm_timeout: Duration::from_secs(scm_timeout_secs),
            branch_history_max_pages,
            db_max_connections,
        };

        if config.is_anonymous() {
            tracing::info!("GITHUB_LOGIN or GITHUB_OAUTH_TOKEN not set, using anonymous GitHub access");
        }

        config
    }

    /// True when GitHub should be queried without credentials.
    pub fn is_anonymous(&self) -> bool {
        self.github_login.is_empty() || self.github_oauth_token.is_empty()
    }
}

impl Default for DeployConfig {
    fn default() -> Self {
        Self {
            github_login: String::new(),
            github_oauth_token: String::new(),
            github_api_url: DEFAULT_GITHUB_API_URL.to_string(),
            scm_timeout: Duration::from_secs(10),
            branch_history_max_pages: 10,
            db_max_connections: 10,
        }
    }
}

impl fmt::Debug for DeployConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let token = if self.github_oauth_token.is_empty() {
            ""
        } else {
            "<redacted>"
        };
        f.debug_struct("DeployConfig")
            .field("github_login", &self.github_login)
            .field("github_oauth_token", &token)
            .field("github_api_url", &self.github_api_url)
            .field("scm_timeout", &self.scm_timeout)
            .field("branch_history_max_pages", &self.branch_history_max_pages)
            .field("db_max_connections", &self.db_max_connections)
            .finish()
    }
}
