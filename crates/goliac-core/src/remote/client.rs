//! GitHub API trait abstraction.
//!
//! The remote mirror talks to GitHub through this trait, allowing the
//! octocrab-backed implementation to be swapped for an in-memory fake in
//! tests.

use async_trait::async_trait;
use thiserror::Error;

use super::types::{
    AssetTotals, EnvironmentMap, RemoteRepository, RemoteRuleset, RemoteTeam, RepoBoolProperty,
    RepoPermission, TeamRole, VariableMap, WireBypassActor,
};
use crate::model::repository::{BranchProtection, Visibility};
use std::collections::BTreeMap;

/// Errors from the GitHub API layer.
#[derive(Debug, Error)]
pub enum ApiError {
    /// GitHub answered with an error status.
    #[error("GitHub API error ({status}): {message}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Error detail.
        message: String,
    },

    /// Transport-level failure.
    #[error("network error: {0}")]
    Network(String),

    /// Unexpected response shape.
    #[error("failed to decode response: {0}")]
    Decode(String),

    /// A pagination loop exceeded the hard safety cap.
    #[error("pagination for {0} exceeded the iteration cap")]
    PaginationCap(&'static str),
}

impl ApiError {
    /// Creates a decode error.
    pub fn decode(message: impl Into<String>) -> Self {
        ApiError::Decode(message.into())
    }

    /// The HTTP status, when the failure came from GitHub.
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::Api { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Everything needed to create a repository in one command.
#[derive(Debug, Clone, Default)]
pub struct CreateRepositoryRequest {
    pub name: String,
    pub visibility: Visibility,
    pub allow_auto_merge: bool,
    pub delete_branch_on_merge: bool,
    pub allow_update_branch: bool,
    pub default_branch: String,
    /// Team slugs granted write access at creation.
    pub writers: Vec<String>,
    /// Team slugs granted read access at creation.
    pub readers: Vec<String>,
    /// `org/repo` source when forking.
    pub fork_from: Option<String>,
}

/// The GitHub surface the mirror consumes: bulk GraphQL listings,
/// pagination-heavy REST reads and all mutations.
#[async_trait]
pub trait GithubApi: Send + Sync {
    // --- reads ---------------------------------------------------------

    /// Logins of all organization members.
    async fn org_members(&self) -> Result<Vec<String>, ApiError>;

    /// All teams, without membership (loaded separately per team).
    async fn teams(&self) -> Result<Vec<RemoteTeam>, ApiError>;

    /// Member login → role for one team.
    async fn team_members(&self, slug: &str) -> Result<BTreeMap<String, TeamRole>, ApiError>;

    /// All repositories with flags, collaborators, rulesets and branch
    /// protections; team grants are loaded separately per repository.
    async fn repositories(&self) -> Result<Vec<RemoteRepository>, ApiError>;

    /// Team slug → permission for one repository.
    async fn repository_team_permissions(
        &self,
        repo: &str,
    ) -> Result<BTreeMap<String, RepoPermission>, ApiError>;

    /// Organization-scope rulesets.
    async fn org_rulesets(&self) -> Result<Vec<RemoteRuleset>, ApiError>;

    /// Installed GitHub App slug → app id.
    async fn app_installations(&self) -> Result<BTreeMap<String, u64>, ApiError>;

    /// Environments of a repository, with their variables. Secrets are
    /// never materialized.
    async fn environments(&self, repo: &str) -> Result<EnvironmentMap, ApiError>;

    /// Actions variables of a repository.
    async fn repository_variables(&self, repo: &str) -> Result<VariableMap, ApiError>;

    /// Organization-wide asset totals in a single query.
    async fn count_assets(&self) -> Result<AssetTotals, ApiError>;

    /// True on GitHub Enterprise (GHES ≥ 3.11 or an enterprise plan);
    /// gates organization rulesets.
    fn is_enterprise(&self) -> bool;

    // --- user mutations ------------------------------------------------

    async fn add_user_to_org(&self, login: &str) -> Result<(), ApiError>;
    async fn remove_user_from_org(&self, login: &str) -> Result<(), ApiError>;

    // --- team mutations ------------------------------------------------

    /// Creates a team and returns the observed record (id, slug).
    async fn create_team(&self, name: &str, members: &[String]) -> Result<RemoteTeam, ApiError>;
    async fn update_team_add_member(
        &self,
        slug: &str,
        login: &str,
        role: TeamRole,
    ) -> Result<(), ApiError>;
    async fn update_team_update_member(
        &self,
        slug: &str,
        login: &str,
        role: TeamRole,
    ) -> Result<(), ApiError>;
    async fn update_team_remove_member(&self, slug: &str, login: &str) -> Result<(), ApiError>;
    async fn update_team_set_parent(
        &self,
        slug: &str,
        parent_id: Option<u64>,
    ) -> Result<(), ApiError>;
    async fn delete_team(&self, slug: &str) -> Result<(), ApiError>;

    // --- repository mutations ------------------------------------------

    async fn create_repository(&self, request: &CreateRepositoryRequest) -> Result<(), ApiError>;
    async fn update_repository_add_team_access(
        &self,
        repo: &str,
        team_slug: &str,
        permission: RepoPermission,
    ) -> Result<(), ApiError>;
    async fn update_repository_update_team_access(
        &self,
        repo: &str,
        team_slug: &str,
        permission: RepoPermission,
    ) -> Result<(), ApiError>;
    async fn update_repository_remove_team_access(
        &self,
        repo: &str,
        team_slug: &str,
    ) -> Result<(), ApiError>;
    async fn update_repository_update_bool_property(
        &self,
        repo: &str,
        property: RepoBoolProperty,
        value: bool,
    ) -> Result<(), ApiError>;
    async fn update_repository_set_default_branch(
        &self,
        repo: &str,
        branch: &str,
    ) -> Result<(), ApiError>;
    async fn update_repository_set_visibility(
        &self,
        repo: &str,
        visibility: Visibility,
    ) -> Result<(), ApiError>;
    async fn update_repository_set_external_user(
        &self,
        repo: &str,
        login: &str,
        permission: RepoPermission,
    ) -> Result<(), ApiError>;
    async fn update_repository_remove_external_user(
        &self,
        repo: &str,
        login: &str,
    ) -> Result<(), ApiError>;
    async fn update_repository_remove_internal_user(
        &self,
        repo: &str,
        login: &str,
    ) -> Result<(), ApiError>;
    async fn rename_repository(&self, repo: &str, new_name: &str) -> Result<(), ApiError>;
    async fn delete_repository(&self, repo: &str) -> Result<(), ApiError>;

    // --- ruleset mutations ---------------------------------------------

    /// Creates an organization ruleset and returns its id.
    async fn add_org_ruleset(
        &self,
        ruleset: &RemoteRuleset,
        bypass_actors: &[WireBypassActor],
    ) -> Result<u64, ApiError>;
    async fn update_org_ruleset(
        &self,
        id: u64,
        ruleset: &RemoteRuleset,
        bypass_actors: &[WireBypassActor],
    ) -> Result<(), ApiError>;
    async fn delete_org_ruleset(&self, id: u64) -> Result<(), ApiError>;
    /// Creates a repository ruleset and returns its id.
    async fn add_repository_ruleset(
        &self,
        repo: &str,
        ruleset: &RemoteRuleset,
        bypass_actors: &[WireBypassActor],
    ) -> Result<u64, ApiError>;
    async fn update_repository_ruleset(
        &self,
        repo: &str,
        id: u64,
        ruleset: &RemoteRuleset,
        bypass_actors: &[WireBypassActor],
    ) -> Result<(), ApiError>;
    async fn delete_repository_ruleset(&self, repo: &str, id: u64) -> Result<(), ApiError>;

    // --- branch protection mutations -----------------------------------

    /// Creates a branch protection rule and returns its node id.
    async fn add_repository_branch_protection(
        &self,
        repo_node_id: &str,
        protection: &BranchProtection,
    ) -> Result<String, ApiError>;
    async fn update_repository_branch_protection(
        &self,
        rule_id: &str,
        protection: &BranchProtection,
    ) -> Result<(), ApiError>;
    async fn delete_repository_branch_protection(&self, rule_id: &str) -> Result<(), ApiError>;

    // --- environment and variable mutations ----------------------------

    async fn add_repository_environment(&self, repo: &str, environment: &str)
    -> Result<(), ApiError>;
    async fn delete_repository_environment(
        &self,
        repo: &str,
        environment: &str,
    ) -> Result<(), ApiError>;
    async fn add_repository_variable(
        &self,
        repo: &str,
        name: &str,
        value: &str,
    ) -> Result<(), ApiError>;
    async fn update_repository_variable(
        &self,
        repo: &str,
        name: &str,
        value: &str,
    ) -> Result<(), ApiError>;
    async fn delete_repository_variable(&self, repo: &str, name: &str) -> Result<(), ApiError>;
    async fn add_repository_environment_variable(
        &self,
        repo: &str,
        environment: &str,
        name: &str,
        value: &str,
    ) -> Result<(), ApiError>;
    async fn update_repository_environment_variable(
        &self,
        repo: &str,
        environment: &str,
        name: &str,
        value: &str,
    ) -> Result<(), ApiError>;
    async fn delete_repository_environment_variable(
        &self,
        repo: &str,
        environment: &str,
        name: &str,
    ) -> Result<(), ApiError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_error_display() {
        let err = ApiError::Api {
            status: 404,
            message: "Not Found".into(),
        };
        assert!(err.to_string().contains("404"));
        assert_eq!(err.status(), Some(404));
        assert_eq!(ApiError::Network("reset".into()).status(), None);
    }
}
