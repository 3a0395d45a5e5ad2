//! The recording executor: appends every command to typed buckets and an
//! ordered log, for rendering a plan or asserting in tests.

use async_trait::async_trait;
use std::sync::Mutex;

use super::ReconciliationExecutor;
use crate::errors::SyncError;
use crate::model::repository::{BranchProtection, Visibility};
use crate::remote::{
    CreateRepositoryRequest, RemoteRuleset, RepoBoolProperty, RepoPermission, TeamRole,
    WireBypassActor,
};

/// Everything a cycle asked the executor to do.
#[derive(Debug, Clone, Default)]
pub struct RecordedCommands {
    pub begun: bool,
    pub committed: bool,
    pub rolled_back: bool,

    pub users_added: Vec<String>,
    pub users_removed: Vec<String>,

    /// (team name, member logins)
    pub teams_created: Vec<(String, Vec<String>)>,
    /// (team slug, login, role)
    pub team_members_added: Vec<(String, String, TeamRole)>,
    /// (team slug, login, role)
    pub team_members_updated: Vec<(String, String, TeamRole)>,
    /// (team slug, login)
    pub team_members_removed: Vec<(String, String)>,
    /// (team slug, parent id)
    pub team_parents_set: Vec<(String, Option<u64>)>,
    pub teams_deleted: Vec<String>,

    pub repositories_created: Vec<CreateRepositoryRequest>,
    /// (repo, team slug, permission)
    pub team_access_added: Vec<(String, String, RepoPermission)>,
    /// (repo, team slug, permission)
    pub team_access_updated: Vec<(String, String, RepoPermission)>,
    /// (repo, team slug)
    pub team_access_removed: Vec<(String, String)>,
    /// (repo, property, value)
    pub bool_properties: Vec<(String, RepoBoolProperty, bool)>,
    /// (repo, branch)
    pub default_branches: Vec<(String, String)>,
    /// (repo, visibility)
    pub visibilities: Vec<(String, Visibility)>,
    /// (repo, login, permission)
    pub external_users_set: Vec<(String, String, RepoPermission)>,
    /// (repo, login)
    pub external_users_removed: Vec<(String, String)>,
    /// (repo, login)
    pub internal_users_removed: Vec<(String, String)>,
    /// (old name, new name)
    pub repositories_renamed: Vec<(String, String)>,
    pub repositories_deleted: Vec<String>,

    pub org_rulesets_added: Vec<RemoteRuleset>,
    /// (id, ruleset)
    pub org_rulesets_updated: Vec<(u64, RemoteRuleset)>,
    /// (name, id)
    pub org_rulesets_deleted: Vec<(String, u64)>,
    /// (repo, ruleset)
    pub repo_rulesets_added: Vec<(String, RemoteRuleset)>,
    /// (repo, id, ruleset)
    pub repo_rulesets_updated: Vec<(String, u64, RemoteRuleset)>,
    /// (repo, name, id)
    pub repo_rulesets_deleted: Vec<(String, String, u64)>,

    /// (repo, protection)
    pub branch_protections_added: Vec<(String, BranchProtection)>,
    /// (repo, rule id, protection)
    pub branch_protections_updated: Vec<(String, String, BranchProtection)>,
    /// (repo, pattern)
    pub branch_protections_deleted: Vec<(String, String)>,

    /// (repo, environment)
    pub environments_added: Vec<(String, String)>,
    /// (repo, environment)
    pub environments_deleted: Vec<(String, String)>,
    /// (repo, name, value)
    pub variables_added: Vec<(String, String, String)>,
    /// (repo, name, value)
    pub variables_updated: Vec<(String, String, String)>,
    /// (repo, name)
    pub variables_deleted: Vec<(String, String)>,
    /// (repo, environment, name, value)
    pub environment_variables_added: Vec<(String, String, String, String)>,
    /// (repo, environment, name, value)
    pub environment_variables_updated: Vec<(String, String, String, String)>,
    /// (repo, environment, name)
    pub environment_variables_deleted: Vec<(String, String, String)>,

    /// Every command in emission order, rendered as one line each.
    pub log: Vec<String>,
}

impl RecordedCommands {
    /// Number of recorded commands (lifecycle hooks excluded).
    pub fn total(&self) -> usize {
        self.log.len()
    }
}

/// Records commands instead of applying them.
#[derive(Default)]
pub struct RecordingExecutor {
    commands: Mutex<RecordedCommands>,
}

impl RecordingExecutor {
    /// Creates an empty recorder.
    pub fn new() -> Self {
        Self::default()
    }

    /// A snapshot of everything recorded so far.
    pub fn commands(&self) -> RecordedCommands {
        self.commands.lock().expect("recorder poisoned").clone()
    }

    fn with<F: FnOnce(&mut RecordedCommands)>(&self, apply: F) {
        apply(&mut self.commands.lock().expect("recorder poisoned"));
    }
}

#[async_trait]
impl ReconciliationExecutor for RecordingExecutor {
    async fn begin(&self, _dry_run: bool) {
        self.with(|c| c.begun = true);
    }

    async fn commit(&self, _dry_run: bool) {
        self.with(|c| c.committed = true);
    }

    async fn rollback(&self, _dry_run: bool, _error: &SyncError) {
        self.with(|c| c.rolled_back = true);
    }

    async fn add_user_to_org(&self, login: &str) {
        self.with(|c| {
            c.log.push(format!("add_user_to_org {}", login));
            c.users_added.push(login.to_string());
        });
    }

    async fn remove_user_from_org(&self, login: &str) {
        self.with(|c| {
            c.log.push(format!("remove_user_from_org {}", login));
            c.users_removed.push(login.to_string());
        });
    }

    async fn create_team(&self, name: &str, members: &[String]) {
        self.with(|c| {
            c.log
                .push(format!("create_team {} [{}]", name, members.join(",")));
            c.teams_created.push((name.to_string(), members.to_vec()));
        });
    }

    async fn update_team_add_member(&self, slug: &str, login: &str, role: TeamRole) {
        self.with(|c| {
            c.log
                .push(format!("update_team_add_member {} {} {}", slug, login, role.as_str()));
            c.team_members_added
                .push((slug.to_string(), login.to_string(), role));
        });
    }

    async fn update_team_update_member(&self, slug: &str, login: &str, role: TeamRole) {
        self.with(|c| {
            c.log.push(format!(
                "update_team_update_member {} {} {}",
                slug,
                login,
                role.as_str()
            ));
            c.team_members_updated
                .push((slug.to_string(), login.to_string(), role));
        });
    }

    async fn update_team_remove_member(&self, slug: &str, login: &str) {
        self.with(|c| {
            c.log
                .push(format!("update_team_remove_member {} {}", slug, login));
            c.team_members_removed
                .push((slug.to_string(), login.to_string()));
        });
    }

    async fn update_team_set_parent(&self, slug: &str, parent_id: Option<u64>) {
        self.with(|c| {
            c.log
                .push(format!("update_team_set_parent {} {:?}", slug, parent_id));
            c.team_parents_set.push((slug.to_string(), parent_id));
        });
    }

    async fn delete_team(&self, slug: &str) {
        self.with(|c| {
            c.log.push(format!("delete_team {}", slug));
            c.teams_deleted.push(slug.to_string());
        });
    }

    async fn create_repository(&self, request: &CreateRepositoryRequest) {
        self.with(|c| {
            c.log.push(format!("create_repository {}", request.name));
            c.repositories_created.push(request.clone());
        });
    }

    async fn update_repository_add_team_access(
        &self,
        repo: &str,
        team_slug: &str,
        permission: RepoPermission,
    ) {
        self.with(|c| {
            c.log.push(format!(
                "update_repository_add_team_access {} {} {}",
                repo,
                team_slug,
                permission.as_rest()
            ));
            c.team_access_added
                .push((repo.to_string(), team_slug.to_string(), permission));
        });
    }

    async fn update_repository_update_team_access(
        &self,
        repo: &str,
        team_slug: &str,
        permission: RepoPermission,
    ) {
        self.with(|c| {
            c.log.push(format!(
                "update_repository_update_team_access {} {} {}",
                repo,
                team_slug,
                permission.as_rest()
            ));
            c.team_access_updated
                .push((repo.to_string(), team_slug.to_string(), permission));
        });
    }

    async fn update_repository_remove_team_access(&self, repo: &str, team_slug: &str) {
        self.with(|c| {
            c.log.push(format!(
                "update_repository_remove_team_access {} {}",
                repo, team_slug
            ));
            c.team_access_removed
                .push((repo.to_string(), team_slug.to_string()));
        });
    }

    async fn update_repository_update_bool_property(
        &self,
        repo: &str,
        property: RepoBoolProperty,
        value: bool,
    ) {
        self.with(|c| {
            c.log.push(format!(
                "update_repository_update_bool_property {} {} {}",
                repo,
                property.as_str(),
                value
            ));
            c.bool_properties.push((repo.to_string(), property, value));
        });
    }

    async fn update_repository_set_default_branch(&self, repo: &str, branch: &str) {
        self.with(|c| {
            c.log
                .push(format!("update_repository_set_default_branch {} {}", repo, branch));
            c.default_branches
                .push((repo.to_string(), branch.to_string()));
        });
    }

    async fn update_repository_set_visibility(&self, repo: &str, visibility: Visibility) {
        self.with(|c| {
            c.log.push(format!(
                "update_repository_set_visibility {} {}",
                repo,
                visibility.as_str()
            ));
            c.visibilities.push((repo.to_string(), visibility));
        });
    }

    async fn update_repository_set_external_user(
        &self,
        repo: &str,
        login: &str,
        permission: RepoPermission,
    ) {
        self.with(|c| {
            c.log.push(format!(
                "update_repository_set_external_user {} {} {}",
                repo,
                login,
                permission.as_rest()
            ));
            c.external_users_set
                .push((repo.to_string(), login.to_string(), permission));
        });
    }

    async fn update_repository_remove_external_user(&self, repo: &str, login: &str) {
        self.with(|c| {
            c.log.push(format!(
                "update_repository_remove_external_user {} {}",
                repo, login
            ));
            c.external_users_removed
                .push((repo.to_string(), login.to_string()));
        });
    }

    async fn update_repository_remove_internal_user(&self, repo: &str, login: &str) {
        self.with(|c| {
            c.log.push(format!(
                "update_repository_remove_internal_user {} {}",
                repo, login
            ));
            c.internal_users_removed
                .push((repo.to_string(), login.to_string()));
        });
    }

    async fn rename_repository(&self, repo: &str, new_name: &str) {
        self.with(|c| {
            c.log.push(format!("rename_repository {} {}", repo, new_name));
            c.repositories_renamed
                .push((repo.to_string(), new_name.to_string()));
        });
    }

    async fn delete_repository(&self, repo: &str) {
        self.with(|c| {
            c.log.push(format!("delete_repository {}", repo));
            c.repositories_deleted.push(repo.to_string());
        });
    }

    async fn add_org_ruleset(&self, ruleset: &RemoteRuleset, _bypass_actors: &[WireBypassActor]) {
        self.with(|c| {
            c.log.push(format!("add_org_ruleset {}", ruleset.name));
            c.org_rulesets_added.push(ruleset.clone());
        });
    }

    async fn update_org_ruleset(
        &self,
        id: u64,
        ruleset: &RemoteRuleset,
        _bypass_actors: &[WireBypassActor],
    ) {
        self.with(|c| {
            c.log.push(format!("update_org_ruleset {} {}", id, ruleset.name));
            c.org_rulesets_updated.push((id, ruleset.clone()));
        });
    }

    async fn delete_org_ruleset(&self, name: &str, id: u64) {
        self.with(|c| {
            c.log.push(format!("delete_org_ruleset {} {}", name, id));
            c.org_rulesets_deleted.push((name.to_string(), id));
        });
    }

    async fn add_repository_ruleset(
        &self,
        repo: &str,
        ruleset: &RemoteRuleset,
        _bypass_actors: &[WireBypassActor],
    ) {
        self.with(|c| {
            c.log
                .push(format!("add_repository_ruleset {} {}", repo, ruleset.name));
            c.repo_rulesets_added
                .push((repo.to_string(), ruleset.clone()));
        });
    }

    async fn update_repository_ruleset(
        &self,
        repo: &str,
        id: u64,
        ruleset: &RemoteRuleset,
        _bypass_actors: &[WireBypassActor],
    ) {
        self.with(|c| {
            c.log.push(format!(
                "update_repository_ruleset {} {} {}",
                repo, id, ruleset.name
            ));
            c.repo_rulesets_updated
                .push((repo.to_string(), id, ruleset.clone()));
        });
    }

    async fn delete_repository_ruleset(&self, repo: &str, name: &str, id: u64) {
        self.with(|c| {
            c.log
                .push(format!("delete_repository_ruleset {} {} {}", repo, name, id));
            c.repo_rulesets_deleted
                .push((repo.to_string(), name.to_string(), id));
        });
    }

    async fn add_repository_branch_protection(&self, repo: &str, protection: &BranchProtection) {
        self.with(|c| {
            c.log.push(format!(
                "add_repository_branch_protection {} {}",
                repo, protection.pattern
            ));
            c.branch_protections_added
                .push((repo.to_string(), protection.clone()));
        });
    }

    async fn update_repository_branch_protection(
        &self,
        repo: &str,
        rule_id: &str,
        protection: &BranchProtection,
    ) {
        self.with(|c| {
            c.log.push(format!(
                "update_repository_branch_protection {} {}",
                repo, protection.pattern
            ));
            c.branch_protections_updated.push((
                repo.to_string(),
                rule_id.to_string(),
                protection.clone(),
            ));
        });
    }

    async fn delete_repository_branch_protection(&self, repo: &str, pattern: &str, _rule_id: &str) {
        self.with(|c| {
            c.log.push(format!(
                "delete_repository_branch_protection {} {}",
                repo, pattern
            ));
            c.branch_protections_deleted
                .push((repo.to_string(), pattern.to_string()));
        });
    }

    async fn add_repository_environment(&self, repo: &str, environment: &str) {
        self.with(|c| {
            c.log
                .push(format!("add_repository_environment {} {}", repo, environment));
            c.environments_added
                .push((repo.to_string(), environment.to_string()));
        });
    }

    async fn delete_repository_environment(&self, repo: &str, environment: &str) {
        self.with(|c| {
            c.log.push(format!(
                "delete_repository_environment {} {}",
                repo, environment
            ));
            c.environments_deleted
                .push((repo.to_string(), environment.to_string()));
        });
    }

    async fn add_repository_variable(&self, repo: &str, name: &str, value: &str) {
        self.with(|c| {
            c.log
                .push(format!("add_repository_variable {} {}={}", repo, name, value));
            c.variables_added
                .push((repo.to_string(), name.to_string(), value.to_string()));
        });
    }

    async fn update_repository_variable(&self, repo: &str, name: &str, value: &str) {
        self.with(|c| {
            c.log.push(format!(
                "update_repository_variable {} {}={}",
                repo, name, value
            ));
            c.variables_updated
                .push((repo.to_string(), name.to_string(), value.to_string()));
        });
    }

    async fn delete_repository_variable(&self, repo: &str, name: &str) {
        self.with(|c| {
            c.log
                .push(format!("delete_repository_variable {} {}", repo, name));
            c.variables_deleted
                .push((repo.to_string(), name.to_string()));
        });
    }

    async fn add_repository_environment_variable(
        &self,
        repo: &str,
        environment: &str,
        name: &str,
        value: &str,
    ) {
        self.with(|c| {
            c.log.push(format!(
                "add_repository_environment_variable {} {} {}={}",
                repo, environment, name, value
            ));
            c.environment_variables_added.push((
                repo.to_string(),
                environment.to_string(),
                name.to_string(),
                value.to_string(),
            ));
        });
    }

    async fn update_repository_environment_variable(
        &self,
        repo: &str,
        environment: &str,
        name: &str,
        value: &str,
    ) {
        self.with(|c| {
            c.log.push(format!(
                "update_repository_environment_variable {} {} {}={}",
                repo, environment, name, value
            ));
            c.environment_variables_updated.push((
                repo.to_string(),
                environment.to_string(),
                name.to_string(),
                value.to_string(),
            ));
        });
    }

    async fn delete_repository_environment_variable(
        &self,
        repo: &str,
        environment: &str,
        name: &str,
    ) {
        self.with(|c| {
            c.log.push(format!(
                "delete_repository_environment_variable {} {} {}",
                repo, environment, name
            ));
            c.environment_variables_deleted.push((
                repo.to_string(),
                environment.to_string(),
                name.to_string(),
            ));
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn records_commands_in_order() {
        let recorder = RecordingExecutor::new();
        recorder.begin(true).await;
        recorder.add_user_to_org("alice").await;
        recorder.create_team("dev", &["alice".into()]).await;
        recorder.commit(true).await;

        let commands = recorder.commands();
        assert!(commands.begun);
        assert!(commands.committed);
        assert!(!commands.rolled_back);
        assert_eq!(commands.total(), 2);
        assert_eq!(commands.log[0], "add_user_to_org alice");
        assert_eq!(commands.users_added, vec!["alice"]);
        assert_eq!(commands.teams_created[0].0, "dev");
    }

    #[tokio::test]
    async fn rollback_is_recorded() {
        let recorder = RecordingExecutor::new();
        recorder.begin(false).await;
        recorder
            .rollback(false, &SyncError::policy("cap exceeded"))
            .await;
        assert!(recorder.commands().rolled_back);
    }
}
