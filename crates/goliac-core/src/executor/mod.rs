//! The executor interface: the sink of mutation commands emitted by the
//! reconciliator.
//!
//! Executor methods are total. Failures are recorded into the shared
//! error collection so a pass can complete and report a single
//! end-of-cycle result.

mod apply;
mod recording;

pub use apply::GithubExecutor;
pub use recording::{RecordedCommands, RecordingExecutor};

use async_trait::async_trait;

use crate::errors::SyncError;
use crate::model::repository::{BranchProtection, Visibility};
use crate::remote::{
    CreateRepositoryRequest, RemoteRuleset, RepoBoolProperty, RepoPermission, TeamRole,
    WireBypassActor,
};

/// The command sink consumed by the reconciliator.
///
/// Methods mirror the mutation surface of the remote mirror, plus the
/// three transactional hooks bracketing a cycle.
#[async_trait]
pub trait ReconciliationExecutor: Send + Sync {
    /// Starts a command batch.
    async fn begin(&self, dry_run: bool);
    /// Ends the batch after a successful plan.
    async fn commit(&self, dry_run: bool);
    /// Aborts the batch after a fatal error.
    async fn rollback(&self, dry_run: bool, error: &SyncError);

    async fn add_user_to_org(&self, login: &str);
    async fn remove_user_from_org(&self, login: &str);

    async fn create_team(&self, name: &str, members: &[String]);
    async fn update_team_add_member(&self, slug: &str, login: &str, role: TeamRole);
    async fn update_team_update_member(&self, slug: &str, login: &str, role: TeamRole);
    async fn update_team_remove_member(&self, slug: &str, login: &str);
    async fn update_team_set_parent(&self, slug: &str, parent_id: Option<u64>);
    async fn delete_team(&self, slug: &str);

    async fn create_repository(&self, request: &CreateRepositoryRequest);
    async fn update_repository_add_team_access(
        &self,
        repo: &str,
        team_slug: &str,
        permission: RepoPermission,
    );
    async fn update_repository_update_team_access(
        &self,
        repo: &str,
        team_slug: &str,
        permission: RepoPermission,
    );
    async fn update_repository_remove_team_access(&self, repo: &str, team_slug: &str);
    async fn update_repository_update_bool_property(
        &self,
        repo: &str,
        property: RepoBoolProperty,
        value: bool,
    );
    async fn update_repository_set_default_branch(&self, repo: &str, branch: &str);
    async fn update_repository_set_visibility(&self, repo: &str, visibility: Visibility);
    async fn update_repository_set_external_user(
        &self,
        repo: &str,
        login: &str,
        permission: RepoPermission,
    );
    async fn update_repository_remove_external_user(&self, repo: &str, login: &str);
    async fn update_repository_remove_internal_user(&self, repo: &str, login: &str);
    async fn rename_repository(&self, repo: &str, new_name: &str);
    async fn delete_repository(&self, repo: &str);

    async fn add_org_ruleset(&self, ruleset: &RemoteRuleset, bypass_actors: &[WireBypassActor]);
    async fn update_org_ruleset(
        &self,
        id: u64,
        ruleset: &RemoteRuleset,
        bypass_actors: &[WireBypassActor],
    );
    async fn delete_org_ruleset(&self, name: &str, id: u64);
    async fn add_repository_ruleset(
        &self,
        repo: &str,
        ruleset: &RemoteRuleset,
        bypass_actors: &[WireBypassActor],
    );
    async fn update_repository_ruleset(
        &self,
        repo: &str,
        id: u64,
        ruleset: &RemoteRuleset,
        bypass_actors: &[WireBypassActor],
    );
    async fn delete_repository_ruleset(&self, repo: &str, name: &str, id: u64);

    async fn add_repository_branch_protection(&self, repo: &str, protection: &BranchProtection);
    async fn update_repository_branch_protection(
        &self,
        repo: &str,
        rule_id: &str,
        protection: &BranchProtection,
    );
    async fn delete_repository_branch_protection(&self, repo: &str, pattern: &str, rule_id: &str);

    async fn add_repository_environment(&self, repo: &str, environment: &str);
    async fn delete_repository_environment(&self, repo: &str, environment: &str);
    async fn add_repository_variable(&self, repo: &str, name: &str, value: &str);
    async fn update_repository_variable(&self, repo: &str, name: &str, value: &str);
    async fn delete_repository_variable(&self, repo: &str, name: &str);
    async fn add_repository_environment_variable(
        &self,
        repo: &str,
        environment: &str,
        name: &str,
        value: &str,
    );
    async fn update_repository_environment_variable(
        &self,
        repo: &str,
        environment: &str,
        name: &str,
        value: &str,
    );
    async fn delete_repository_environment_variable(
        &self,
        repo: &str,
        environment: &str,
        name: &str,
    );
}
