//! Configuration: the `goliac.yaml` repository configuration and the
//! environment-driven runtime configuration, plus GitHub client
//! construction (App JWT or personal access token).

use jsonwebtoken::EncodingKey;
use octocrab::Octocrab;
use octocrab::models::{AppId, InstallationId};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

use crate::model::team::DEFAULT_OWNER_TEAM_SUFFIX;

/// Errors that can occur while assembling the configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Missing required configuration.
    #[error("missing required configuration: {0}")]
    MissingRequired(String),

    /// Invalid configuration value.
    #[error("invalid configuration: {0}")]
    Invalid(String),

    /// GitHub authentication error.
    #[error("GitHub authentication error: {0}")]
    GitHubAuth(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// A `{pattern, ruleset}` entry attaching an organization ruleset to every
/// repository matching the pattern.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct RulesetPattern {
    pub pattern: String,
    pub ruleset: String,
}

/// Per-category gates for destructive operations.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct DestructiveOperations {
    pub repositories: bool,
    pub teams: bool,
    pub users: bool,
    pub rulesets: bool,
}

/// User-directory synchronization settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct UserSyncConfig {
    /// Name of the user-sync plugin (`noop` by default).
    pub plugin: String,
}

impl Default for UserSyncConfig {
    fn default() -> Self {
        Self {
            plugin: "noop".to_string(),
        }
    }
}

/// Organization-wide visibility restrictions.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct VisibilityRules {
    pub forbid_public_repositories: bool,
    pub forbid_public_repositories_exclusions: Vec<String>,
}

/// The `goliac.yaml` document at the teams-repo root.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct RepositoryConfig {
    /// The organization admin team; never deleted by sync.
    pub admin_team: String,
    /// Maintain an `everyone` team containing every org user.
    pub everyone_team_enabled: bool,
    /// Organization ruleset attachments by repository pattern.
    pub rulesets: Vec<RulesetPattern>,
    /// Per-cycle maximum number of mutation commands.
    pub max_changesets: usize,
    /// Archive repositories removed from the declaration instead of
    /// deleting them.
    pub archive_on_delete: bool,
    /// Destructive-operation gates.
    pub destructive_operations: DestructiveOperations,
    /// User-directory synchronization settings.
    pub usersync: UserSyncConfig,
    /// Organization-wide visibility restrictions.
    pub visibility_rules: VisibilityRules,
    /// Enabled workflow names.
    pub workflows: Vec<String>,
}

impl Default for RepositoryConfig {
    fn default() -> Self {
        Self {
            admin_team: String::new(),
            everyone_team_enabled: false,
            rulesets: Vec::new(),
            max_changesets: 50,
            archive_on_delete: true,
            destructive_operations: DestructiveOperations::default(),
            usersync: UserSyncConfig::default(),
            visibility_rules: VisibilityRules::default(),
            workflows: Vec::new(),
        }
    }
}

impl RepositoryConfig {
    /// Decodes a `goliac.yaml` document.
    pub fn from_yaml(contents: &str) -> Result<Self, serde_yml::Error> {
        serde_yml::from_str(contents)
    }
}

/// Runtime knobs, all sourced from environment variables.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    /// GitHub App id (`GOLIAC_GITHUB_APP_ID`).
    pub github_app_id: Option<u64>,
    /// Path to the App private key PEM (`GOLIAC_GITHUB_APP_PRIVATE_KEY_FILE`).
    pub github_app_private_key_file: Option<PathBuf>,
    /// Personal access token (`GOLIAC_GITHUB_PERSONAL_ACCESS_TOKEN`).
    pub github_personal_access_token: Option<SecretString>,
    /// The managed organization (`GOLIAC_GITHUB_APP_ORGANIZATION`).
    pub github_app_organization: String,
    /// API endpoint (`GOLIAC_GITHUB_SERVER`).
    pub github_server: String,
    /// Remote cache TTL in seconds (`GOLIAC_GITHUB_CACHE_TTL`).
    pub github_cache_ttl: u64,
    /// Worker count for fan-out loads (`GOLIAC_GITHUB_CONCURRENT_THREADS`).
    pub github_concurrent_threads: usize,
    /// Manage repository/environment actions variables
    /// (`GOLIAC_MANAGE_GITHUB_ACTIONS_VARIABLES`).
    pub manage_github_actions_variables: bool,
    /// Seconds between reconciliations (`GOLIAC_SERVER_APPLY_INTERVAL`).
    pub server_apply_interval: u64,
    /// Clone URL of the teams repo (`GOLIAC_SERVER_GIT_REPOSITORY`).
    pub server_git_repository: String,
    /// Branch of the teams repo (`GOLIAC_SERVER_GIT_BRANCH`).
    pub server_git_branch: String,
    /// Suffix of synthetic owner teams (`GOLIAC_TEAM_OWNER_SUFFIX`).
    pub team_owner_suffix: String,
    /// Committer email (`GOLIAC_EMAIL`).
    pub email: String,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            github_app_id: None,
            github_app_private_key_file: None,
            github_personal_access_token: None,
            github_app_organization: String::new(),
            github_server: "https://api.github.com".to_string(),
            github_cache_ttl: 86400,
            github_concurrent_threads: 1,
            manage_github_actions_variables: false,
            server_apply_interval: 600,
            server_git_repository: String::new(),
            server_git_branch: "main".to_string(),
            team_owner_suffix: DEFAULT_OWNER_TEAM_SUFFIX.to_string(),
            email: "goliac@localhost".to_string(),
        }
    }
}

impl RuntimeConfig {
    /// Reads the configuration from the process environment.
    ///
    /// Either an App id + private key or a personal access token must be
    /// present, along with the organization name.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(app_id) = env_var("GOLIAC_GITHUB_APP_ID") {
            config.github_app_id = Some(app_id.parse().map_err(|_| {
                ConfigError::Invalid(format!("GOLIAC_GITHUB_APP_ID '{}' is not a number", app_id))
            })?);
        }
        config.github_app_private_key_file =
            env_var("GOLIAC_GITHUB_APP_PRIVATE_KEY_FILE").map(PathBuf::from);
        config.github_personal_access_token =
            env_var("GOLIAC_GITHUB_PERSONAL_ACCESS_TOKEN").map(SecretString::from);
        if let Some(org) = env_var("GOLIAC_GITHUB_APP_ORGANIZATION") {
            config.github_app_organization = org;
        }
        if let Some(server) = env_var("GOLIAC_GITHUB_SERVER") {
            config.github_server = server;
        }
        if let Some(ttl) = env_var("GOLIAC_GITHUB_CACHE_TTL") {
            config.github_cache_ttl = ttl.parse().map_err(|_| {
                ConfigError::Invalid(format!("GOLIAC_GITHUB_CACHE_TTL '{}' is not a number", ttl))
            })?;
        }
        if let Some(threads) = env_var("GOLIAC_GITHUB_CONCURRENT_THREADS") {
            let parsed: usize = threads.parse().map_err(|_| {
                ConfigError::Invalid(format!(
                    "GOLIAC_GITHUB_CONCURRENT_THREADS '{}' is not a number",
                    threads
                ))
            })?;
            config.github_concurrent_threads = parsed.max(1);
        }
        if let Some(flag) = env_var("GOLIAC_MANAGE_GITHUB_ACTIONS_VARIABLES") {
            config.manage_github_actions_variables = parse_bool(&flag);
        }
        if let Some(interval) = env_var("GOLIAC_SERVER_APPLY_INTERVAL") {
            config.server_apply_interval = interval.parse().map_err(|_| {
                ConfigError::Invalid(format!(
                    "GOLIAC_SERVER_APPLY_INTERVAL '{}' is not a number",
                    interval
                ))
            })?;
        }
        if let Some(repository) = env_var("GOLIAC_SERVER_GIT_REPOSITORY") {
            config.server_git_repository = repository;
        }
        if let Some(branch) = env_var("GOLIAC_SERVER_GIT_BRANCH") {
            config.server_git_branch = branch;
        }
        if let Some(suffix) = env_var("GOLIAC_TEAM_OWNER_SUFFIX") {
            config.team_owner_suffix = suffix;
        }
        if let Some(email) = env_var("GOLIAC_EMAIL") {
            config.email = email;
        }

        config.validate()?;
        Ok(config)
    }

    /// Checks the credential and organization requirements.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.github_app_organization.is_empty() {
            return Err(ConfigError::MissingRequired(
                "GOLIAC_GITHUB_APP_ORGANIZATION".to_string(),
            ));
        }
        let has_app = self.github_app_id.is_some() && self.github_app_private_key_file.is_some();
        let has_token = self.github_personal_access_token.is_some();
        if !has_app && !has_token {
            return Err(ConfigError::MissingRequired(
                "either GOLIAC_GITHUB_APP_ID + GOLIAC_GITHUB_APP_PRIVATE_KEY_FILE or GOLIAC_GITHUB_PERSONAL_ACCESS_TOKEN"
                    .to_string(),
            ));
        }
        Ok(())
    }

    /// Returns true when a custom (GitHub Enterprise Server) endpoint is
    /// configured.
    pub fn has_custom_server(&self) -> bool {
        self.github_server != "https://api.github.com"
    }
}

/// Creates an authenticated Octocrab client from the runtime configuration.
///
/// App credentials take precedence over a personal access token. App
/// authentication resolves the installation for the configured
/// organization; octocrab refreshes the installation token transparently.
pub async fn create_octocrab(config: &RuntimeConfig) -> Result<Octocrab, ConfigError> {
    let base_url = config.has_custom_server().then_some(config.github_server.as_str());

    if let (Some(app_id), Some(key_file)) =
        (config.github_app_id, config.github_app_private_key_file.as_ref())
    {
        let pem = std::fs::read(key_file)?;
        let key = EncodingKey::from_rsa_pem(&pem)
            .map_err(|e| ConfigError::GitHubAuth(format!("invalid private key: {}", e)))?;

        let mut builder = Octocrab::builder().app(AppId(app_id), key);
        if let Some(url) = base_url {
            builder = builder
                .base_uri(url)
                .map_err(|e| ConfigError::GitHubAuth(format!("invalid base URL: {}", e)))?;
        }
        let app_client = builder
            .build()
            .map_err(|e| ConfigError::GitHubAuth(format!("failed to create app client: {}", e)))?;

        // Resolve the installation for the managed organization.
        let installation: serde_json::Value = app_client
            .get(
                format!("/orgs/{}/installation", config.github_app_organization),
                None::<&()>,
            )
            .await
            .map_err(|e| {
                ConfigError::GitHubAuth(format!(
                    "no installation found for organization '{}': {}",
                    config.github_app_organization, e
                ))
            })?;
        let installation_id = installation["id"].as_u64().ok_or_else(|| {
            ConfigError::GitHubAuth("installation response carries no id".to_string())
        })?;

        app_client
            .installation(InstallationId(installation_id))
            .map_err(|e| ConfigError::GitHubAuth(format!("failed to scope installation: {}", e)))
    } else if let Some(token) = config.github_personal_access_token.as_ref() {
        let mut builder = Octocrab::builder();
        if let Some(url) = base_url {
            builder = builder
                .base_uri(url)
                .map_err(|e| ConfigError::GitHubAuth(format!("invalid base URL: {}", e)))?;
        }
        builder
            .personal_token(token.expose_secret().to_string())
            .build()
            .map_err(|e| ConfigError::GitHubAuth(format!("failed to build client: {}", e)))
    } else {
        Err(ConfigError::MissingRequired(
            "GitHub credentials".to_string(),
        ))
    }
}

fn env_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|value| !value.is_empty())
}

fn parse_bool(value: &str) -> bool {
    matches!(value.to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on")
}
