//! The applying executor: forwards every command to the remote mirror,
//! which talks to GitHub and updates its snapshot.

use async_trait::async_trait;
use log::{debug, warn};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use super::ReconciliationExecutor;
use crate::errors::{ErrorCollection, SyncError};
use crate::model::repository::{BranchProtection, Visibility};
use crate::remote::{
    ApiError, CreateRepositoryRequest, RemoteMirror, RemoteRuleset, RepoBoolProperty,
    RepoPermission, TeamRole, WireBypassActor,
};

/// Forwards commands to the remote mirror. Mutation failures are recorded
/// as warnings; the entity is re-diffed on the next cycle.
pub struct GithubExecutor {
    mirror: Arc<RemoteMirror>,
    errors: Arc<ErrorCollection>,
    dry_run: AtomicBool,
}

impl GithubExecutor {
    /// Creates an executor over the mirror, recording failures into the
    /// shared collection.
    pub fn new(mirror: Arc<RemoteMirror>, errors: Arc<ErrorCollection>) -> Self {
        Self {
            mirror,
            errors,
            dry_run: AtomicBool::new(false),
        }
    }

    fn dry(&self) -> bool {
        self.dry_run.load(Ordering::SeqCst)
    }

    fn record(&self, command: &str, result: Result<(), ApiError>) {
        if let Err(error) = result {
            warn!("{} failed: {}", command, error);
            self.errors
                .add(SyncError::mutation(command, error.to_string()));
        }
    }
}

#[async_trait]
impl ReconciliationExecutor for GithubExecutor {
    async fn begin(&self, dry_run: bool) {
        self.dry_run.store(dry_run, Ordering::SeqCst);
        debug!("executor batch begins (dry_run: {})", dry_run);
    }

    async fn commit(&self, dry_run: bool) {
        debug!("executor batch committed (dry_run: {})", dry_run);
    }

    async fn rollback(&self, dry_run: bool, error: &SyncError) {
        warn!("executor batch rolled back (dry_run: {}): {}", dry_run, error);
    }

    async fn add_user_to_org(&self, login: &str) {
        let result = self.mirror.add_user_to_org(self.dry(), login).await;
        self.record("addUserToOrg", result);
    }

    async fn remove_user_from_org(&self, login: &str) {
        let result = self.mirror.remove_user_from_org(self.dry(), login).await;
        self.record("removeUserFromOrg", result);
    }

    async fn create_team(&self, name: &str, members: &[String]) {
        let result = self.mirror.create_team(self.dry(), name, members).await;
        self.record("createTeam", result);
    }

    async fn update_team_add_member(&self, slug: &str, login: &str, role: TeamRole) {
        let result = self
            .mirror
            .update_team_add_member(self.dry(), slug, login, role)
            .await;
        self.record("updateTeamAddMember", result);
    }

    async fn update_team_update_member(&self, slug: &str, login: &str, role: TeamRole) {
        let result = self
            .mirror
            .update_team_update_member(self.dry(), slug, login, role)
            .await;
        self.record("updateTeamUpdateMember", result);
    }

    async fn update_team_remove_member(&self, slug: &str, login: &str) {
        let result = self
            .mirror
            .update_team_remove_member(self.dry(), slug, login)
            .await;
        self.record("updateTeamRemoveMember", result);
    }

    async fn update_team_set_parent(&self, slug: &str, parent_id: Option<u64>) {
        let result = self
            .mirror
            .update_team_set_parent(self.dry(), slug, parent_id)
            .await;
        self.record("updateTeamSetParent", result);
    }

    async fn delete_team(&self, slug: &str) {
        let result = self.mirror.delete_team(self.dry(), slug).await;
        self.record("deleteTeam", result);
    }

    async fn create_repository(&self, request: &CreateRepositoryRequest) {
        let result = self.mirror.create_repository(self.dry(), request).await;
        self.record("createRepository", result);
    }

    async fn update_repository_add_team_access(
        &self,
        repo: &str,
        team_slug: &str,
        permission: RepoPermission,
    ) {
        let result = self
            .mirror
            .update_repository_add_team_access(self.dry(), repo, team_slug, permission)
            .await;
        self.record("updateRepositoryAddTeamAccess", result);
    }

    async fn update_repository_update_team_access(
        &self,
        repo: &str,
        team_slug: &str,
        permission: RepoPermission,
    ) {
        let result = self
            .mirror
            .update_repository_update_team_access(self.dry(), repo, team_slug, permission)
            .await;
        self.record("updateRepositoryUpdateTeamAccess", result);
    }

    async fn update_repository_remove_team_access(&self, repo: &str, team_slug: &str) {
        let result = self
            .mirror
            .update_repository_remove_team_access(self.dry(), repo, team_slug)
            .await;
        self.record("updateRepositoryRemoveTeamAccess", result);
    }

    async fn update_repository_update_bool_property(
        &self,
        repo: &str,
        property: RepoBoolProperty,
        value: bool,
    ) {
        let result = self
            .mirror
            .update_repository_update_bool_property(self.dry(), repo, property, value)
            .await;
        self.record("updateRepositoryUpdateBoolProperty", result);
    }

    async fn update_repository_set_default_branch(&self, repo: &str, branch: &str) {
        let result = self
            .mirror
            .update_repository_set_default_branch(self.dry(), repo, branch)
            .await;
        self.record("updateRepositorySetDefaultBranch", result);
    }

    async fn update_repository_set_visibility(&self, repo: &str, visibility: Visibility) {
        let result = self
            .mirror
            .update_repository_set_visibility(self.dry(), repo, visibility)
            .await;
        self.record("updateRepositorySetVisibility", result);
    }

    async fn update_repository_set_external_user(
        &self,
        repo: &str,
        login: &str,
        permission: RepoPermission,
    ) {
        let result = self
            .mirror
            .update_repository_set_external_user(self.dry(), repo, login, permission)
            .await;
        self.record("updateRepositorySetExternalUser", result);
    }

    async fn update_repository_remove_external_user(&self, repo: &str, login: &str) {
        let result = self
            .mirror
            .update_repository_remove_external_user(self.dry(), repo, login)
            .await;
        self.record("updateRepositoryRemoveExternalUser", result);
    }

    async fn update_repository_remove_internal_user(&self, repo: &str, login: &str) {
        let result = self
            .mirror
            .update_repository_remove_internal_user(self.dry(), repo, login)
            .await;
        self.record("updateRepositoryRemoveInternalUser", result);
    }

    async fn rename_repository(&self, repo: &str, new_name: &str) {
        let result = self.mirror.rename_repository(self.dry(), repo, new_name).await;
        self.record("renameRepository", result);
    }

    async fn delete_repository(&self, repo: &str) {
        let result = self.mirror.delete_repository(self.dry(), repo).await;
        self.record("deleteRepository", result);
    }

    async fn add_org_ruleset(&self, ruleset: &RemoteRuleset, bypass_actors: &[WireBypassActor]) {
        let result = self
            .mirror
            .add_org_ruleset(self.dry(), ruleset, bypass_actors)
            .await;
        self.record("addRuleset", result);
    }

    async fn update_org_ruleset(
        &self,
        id: u64,
        ruleset: &RemoteRuleset,
        bypass_actors: &[WireBypassActor],
    ) {
        let result = self
            .mirror
            .update_org_ruleset(self.dry(), id, ruleset, bypass_actors)
            .await;
        self.record("updateRuleset", result);
    }

    async fn delete_org_ruleset(&self, name: &str, id: u64) {
        let result = self.mirror.delete_org_ruleset(self.dry(), name, id).await;
        self.record("deleteRuleset", result);
    }

    async fn add_repository_ruleset(
        &self,
        repo: &str,
        ruleset: &RemoteRuleset,
        bypass_actors: &[WireBypassActor],
    ) {
        let result = self
            .mirror
            .add_repository_ruleset(self.dry(), repo, ruleset, bypass_actors)
            .await;
        self.record("addRepositoryRuleset", result);
    }

    async fn update_repository_ruleset(
        &self,
        repo: &str,
        id: u64,
        ruleset: &RemoteRuleset,
        bypass_actors: &[WireBypassActor],
    ) {
        let result = self
            .mirror
            .update_repository_ruleset(self.dry(), repo, id, ruleset, bypass_actors)
            .await;
        self.record("updateRepositoryRuleset", result);
    }

    async fn delete_repository_ruleset(&self, repo: &str, name: &str, id: u64) {
        let result = self
            .mirror
            .delete_repository_ruleset(self.dry(), repo, name, id)
            .await;
        self.record("deleteRepositoryRuleset", result);
    }

    async fn add_repository_branch_protection(&self, repo: &str, protection: &BranchProtection) {
        let result = self
            .mirror
            .add_repository_branch_protection(self.dry(), repo, protection)
            .await;
        self.record("addRepositoryBranchProtection", result);
    }

    async fn update_repository_branch_protection(
        &self,
        repo: &str,
        rule_id: &str,
        protection: &BranchProtection,
    ) {
        let result = self
            .mirror
            .update_repository_branch_protection(self.dry(), repo, rule_id, protection)
            .await;
        self.record("updateRepositoryBranchProtection", result);
    }

    async fn delete_repository_branch_protection(&self, repo: &str, pattern: &str, rule_id: &str) {
        let result = self
            .mirror
            .delete_repository_branch_protection(self.dry(), repo, pattern, rule_id)
            .await;
        self.record("deleteRepositoryBranchProtection", result);
    }

    async fn add_repository_environment(&self, repo: &str, environment: &str) {
        let result = self
            .mirror
            .add_repository_environment(self.dry(), repo, environment)
            .await;
        self.record("addRepositoryEnvironment", result);
    }

    async fn delete_repository_environment(&self, repo: &str, environment: &str) {
        let result = self
            .mirror
            .delete_repository_environment(self.dry(), repo, environment)
            .await;
        self.record("deleteRepositoryEnvironment", result);
    }

    async fn add_repository_variable(&self, repo: &str, name: &str, value: &str) {
        let result = self
            .mirror
            .add_repository_variable(self.dry(), repo, name, value)
            .await;
        self.record("addRepositoryVariable", result);
    }

    async fn update_repository_variable(&self, repo: &str, name: &str, value: &str) {
        let result = self
            .mirror
            .update_repository_variable(self.dry(), repo, name, value)
            .await;
        self.record("updateRepositoryVariable", result);
    }

    async fn delete_repository_variable(&self, repo: &str, name: &str) {
        let result = self
            .mirror
            .delete_repository_variable(self.dry(), repo, name)
            .await;
        self.record("deleteRepositoryVariable", result);
    }

    async fn add_repository_environment_variable(
        &self,
        repo: &str,
        environment: &str,
        name: &str,
        value: &str,
    ) {
        let result = self
            .mirror
            .add_repository_environment_variable(self.dry(), repo, environment, name, value)
            .await;
        self.record("addRepositoryEnvironmentVariable", result);
    }

    async fn update_repository_environment_variable(
        &self,
        repo: &str,
        environment: &str,
        name: &str,
        value: &str,
    ) {
        let result = self
            .mirror
            .update_repository_environment_variable(self.dry(), repo, environment, name, value)
            .await;
        self.record("updateRepositoryEnvironmentVariable", result);
    }

    async fn delete_repository_environment_variable(
        &self,
        repo: &str,
        environment: &str,
        name: &str,
    ) {
        let result = self
            .mirror
            .delete_repository_environment_variable(self.dry(), repo, environment, name)
            .await;
        self.record("deleteRepositoryEnvironmentVariable", result);
    }
}
