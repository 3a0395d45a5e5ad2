//! An in-memory [`GithubApi`] fake for tests.
//!
//! Tests fill the fake with observed state, run the reconciliator against
//! a mirror over it, and assert on the emitted commands (or on the fake's
//! state after a live apply).

use async_trait::async_trait;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex};

use super::client::{ApiError, CreateRepositoryRequest, GithubApi};
use super::lazy::Lazy;
use super::types::{
    AssetTotals, EnvironmentMap, RemoteRepository, RemoteRuleset, RemoteTeam, RepoBoolProperty,
    RepoPermission, TeamRole, VariableMap, WireBypassActor,
};
use crate::model::repository::{BranchProtection, Visibility};
use crate::model::team::slugify;

#[derive(Default)]
struct FakeState {
    members: BTreeSet<String>,
    teams: BTreeMap<String, RemoteTeam>,
    repositories: BTreeMap<String, RemoteRepository>,
    org_rulesets: BTreeMap<String, RemoteRuleset>,
    apps: BTreeMap<String, u64>,
    environments: BTreeMap<String, EnvironmentMap>,
    variables: BTreeMap<String, VariableMap>,
    next_id: u64,
}

/// In-memory observed organization.
#[derive(Default)]
pub(crate) struct FakeGithub {
    enterprise: bool,
    state: Mutex<FakeState>,
}

impl FakeGithub {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enterprise() -> Self {
        Self {
            enterprise: true,
            ..Self::default()
        }
    }

    pub fn add_member(&self, login: &str) {
        self.state.lock().unwrap().members.insert(login.to_string());
    }

    pub fn add_team(&self, name: &str, members: &[(&str, TeamRole)]) -> u64 {
        let mut state = self.state.lock().unwrap();
        state.next_id += 1;
        let id = state.next_id;
        let slug = slugify(name);
        state.teams.insert(
            slug.clone(),
            RemoteTeam {
                id,
                name: name.to_string(),
                slug,
                parent_id: None,
                members: members
                    .iter()
                    .map(|(login, role)| (login.to_string(), *role))
                    .collect(),
            },
        );
        id
    }

    pub fn set_team_parent(&self, slug: &str, parent_id: Option<u64>) {
        let mut state = self.state.lock().unwrap();
        if let Some(team) = state.teams.get_mut(slug) {
            team.parent_id = parent_id;
        }
    }

    pub fn add_repository(&self, name: &str) -> u64 {
        let mut state = self.state.lock().unwrap();
        state.next_id += 1;
        let id = state.next_id;
        let mut record = RemoteRepository::synthetic(name);
        record.id = id;
        record.node_id = format!("R_{}", id);
        state.repositories.insert(name.to_string(), record);
        id
    }

    pub fn with_repository<F: FnOnce(&mut RemoteRepository)>(&self, name: &str, apply: F) {
        let mut state = self.state.lock().unwrap();
        if let Some(record) = state.repositories.get_mut(name) {
            apply(record);
        }
    }

    pub fn add_org_ruleset(&self, ruleset: RemoteRuleset) {
        let mut state = self.state.lock().unwrap();
        state.next_id += 1;
        let mut stored = ruleset;
        stored.id = Some(state.next_id);
        state.org_rulesets.insert(stored.name.clone(), stored);
    }

    pub fn add_app(&self, slug: &str, id: u64) {
        self.state.lock().unwrap().apps.insert(slug.to_string(), id);
    }

    pub fn set_environments(&self, repo: &str, environments: EnvironmentMap) {
        self.state
            .lock()
            .unwrap()
            .environments
            .insert(repo.to_string(), environments);
    }

    pub fn set_variables(&self, repo: &str, variables: VariableMap) {
        self.state
            .lock()
            .unwrap()
            .variables
            .insert(repo.to_string(), variables);
    }

    pub fn members(&self) -> BTreeSet<String> {
        self.state.lock().unwrap().members.clone()
    }

    pub fn team(&self, slug: &str) -> Option<RemoteTeam> {
        self.state.lock().unwrap().teams.get(slug).cloned()
    }

    pub fn repository_names(&self) -> BTreeSet<String> {
        self.state.lock().unwrap().repositories.keys().cloned().collect()
    }
}

#[async_trait]
impl GithubApi for FakeGithub {
    async fn org_members(&self) -> Result<Vec<String>, ApiError> {
        Ok(self.state.lock().unwrap().members.iter().cloned().collect())
    }

    async fn teams(&self) -> Result<Vec<RemoteTeam>, ApiError> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .teams
            .values()
            .map(|team| RemoteTeam {
                members: BTreeMap::new(),
                ..team.clone()
            })
            .collect())
    }

    async fn team_members(&self, slug: &str) -> Result<BTreeMap<String, TeamRole>, ApiError> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .teams
            .get(slug)
            .map(|team| team.members.clone())
            .unwrap_or_default())
    }

    async fn repositories(&self) -> Result<Vec<RemoteRepository>, ApiError> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .repositories
            .values()
            .map(|record| RemoteRepository {
                team_permissions: BTreeMap::new(),
                environments: Arc::new(Lazy::new()),
                variables: Arc::new(Lazy::new()),
                ..record.clone()
            })
            .collect())
    }

    async fn repository_team_permissions(
        &self,
        repo: &str,
    ) -> Result<BTreeMap<String, RepoPermission>, ApiError> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .repositories
            .get(repo)
            .map(|record| record.team_permissions.clone())
            .unwrap_or_default())
    }

    async fn org_rulesets(&self) -> Result<Vec<RemoteRuleset>, ApiError> {
        Ok(self.state.lock().unwrap().org_rulesets.values().cloned().collect())
    }

    async fn app_installations(&self) -> Result<BTreeMap<String, u64>, ApiError> {
        Ok(self.state.lock().unwrap().apps.clone())
    }

    async fn environments(&self, repo: &str) -> Result<EnvironmentMap, ApiError> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .environments
            .get(repo)
            .cloned()
            .unwrap_or_default())
    }

    async fn repository_variables(&self, repo: &str) -> Result<VariableMap, ApiError> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .variables
            .get(repo)
            .cloned()
            .unwrap_or_default())
    }

    async fn count_assets(&self) -> Result<AssetTotals, ApiError> {
        let state = self.state.lock().unwrap();
        Ok(AssetTotals {
            users: state.members.len(),
            teams: state.teams.len(),
            repositories: state.repositories.len(),
        })
    }

    fn is_enterprise(&self) -> bool {
        self.enterprise
    }

    async fn add_user_to_org(&self, login: &str) -> Result<(), ApiError> {
        self.state.lock().unwrap().members.insert(login.to_string());
        Ok(())
    }

    async fn remove_user_from_org(&self, login: &str) -> Result<(), ApiError> {
        self.state.lock().unwrap().members.remove(login);
        Ok(())
    }

    async fn create_team(&self, name: &str, members: &[String]) -> Result<RemoteTeam, ApiError> {
        let mut state = self.state.lock().unwrap();
        state.next_id += 1;
        let team = RemoteTeam {
            id: state.next_id,
            name: name.to_string(),
            slug: slugify(name),
            parent_id: None,
            members: members
                .iter()
                .map(|login| (login.clone(), TeamRole::Member))
                .collect(),
        };
        state.teams.insert(team.slug.clone(), team.clone());
        Ok(team)
    }

    async fn update_team_add_member(
        &self,
        slug: &str,
        login: &str,
        role: TeamRole,
    ) -> Result<(), ApiError> {
        let mut state = self.state.lock().unwrap();
        if let Some(team) = state.teams.get_mut(slug) {
            team.members.insert(login.to_string(), role);
        }
        Ok(())
    }

    async fn update_team_update_member(
        &self,
        slug: &str,
        login: &str,
        role: TeamRole,
    ) -> Result<(), ApiError> {
        self.update_team_add_member(slug, login, role).await
    }

    async fn update_team_remove_member(&self, slug: &str, login: &str) -> Result<(), ApiError> {
        let mut state = self.state.lock().unwrap();
        if let Some(team) = state.teams.get_mut(slug) {
            team.members.remove(login);
        }
        Ok(())
    }

    async fn update_team_set_parent(
        &self,
        slug: &str,
        parent_id: Option<u64>,
    ) -> Result<(), ApiError> {
        let mut state = self.state.lock().unwrap();
        if let Some(team) = state.teams.get_mut(slug) {
            team.parent_id = parent_id;
        }
        Ok(())
    }

    async fn delete_team(&self, slug: &str) -> Result<(), ApiError> {
        self.state.lock().unwrap().teams.remove(slug);
        Ok(())
    }

    async fn create_repository(&self, request: &CreateRepositoryRequest) -> Result<(), ApiError> {
        let mut state = self.state.lock().unwrap();
        state.next_id += 1;
        let id = state.next_id;
        let mut record = RemoteRepository::synthetic(&request.name);
        record.id = id;
        record.node_id = format!("R_{}", id);
        record.visibility = request.visibility;
        record.allow_auto_merge = request.allow_auto_merge;
        record.delete_branch_on_merge = request.delete_branch_on_merge;
        record.allow_update_branch = request.allow_update_branch;
        record.default_branch = request.default_branch.clone();
        for writer in &request.writers {
            record.team_permissions.insert(writer.clone(), RepoPermission::Write);
        }
        for reader in &request.readers {
            record.team_permissions.insert(reader.clone(), RepoPermission::Read);
        }
        state.repositories.insert(request.name.clone(), record);
        Ok(())
    }

    async fn update_repository_add_team_access(
        &self,
        repo: &str,
        team_slug: &str,
        permission: RepoPermission,
    ) -> Result<(), ApiError> {
        let mut state = self.state.lock().unwrap();
        if let Some(record) = state.repositories.get_mut(repo) {
            record.team_permissions.insert(team_slug.to_string(), permission);
        }
        Ok(())
    }

    async fn update_repository_update_team_access(
        &self,
        repo: &str,
        team_slug: &str,
        permission: RepoPermission,
    ) -> Result<(), ApiError> {
        self.update_repository_add_team_access(repo, team_slug, permission)
            .await
    }

    async fn update_repository_remove_team_access(
        &self,
        repo: &str,
        team_slug: &str,
    ) -> Result<(), ApiError> {
        let mut state = self.state.lock().unwrap();
        if let Some(record) = state.repositories.get_mut(repo) {
            record.team_permissions.remove(team_slug);
        }
        Ok(())
    }

    async fn update_repository_update_bool_property(
        &self,
        repo: &str,
        property: RepoBoolProperty,
        value: bool,
    ) -> Result<(), ApiError> {
        let mut state = self.state.lock().unwrap();
        if let Some(record) = state.repositories.get_mut(repo) {
            match property {
                RepoBoolProperty::Archived => record.archived = value,
                RepoBoolProperty::AllowAutoMerge => record.allow_auto_merge = value,
                RepoBoolProperty::DeleteBranchOnMerge => record.delete_branch_on_merge = value,
                RepoBoolProperty::AllowUpdateBranch => record.allow_update_branch = value,
            }
        }
        Ok(())
    }

    async fn update_repository_set_default_branch(
        &self,
        repo: &str,
        branch: &str,
    ) -> Result<(), ApiError> {
        let mut state = self.state.lock().unwrap();
        if let Some(record) = state.repositories.get_mut(repo) {
            record.default_branch = branch.to_string();
        }
        Ok(())
    }

    async fn update_repository_set_visibility(
        &self,
        repo: &str,
        visibility: Visibility,
    ) -> Result<(), ApiError> {
        let mut state = self.state.lock().unwrap();
        if let Some(record) = state.repositories.get_mut(repo) {
            record.visibility = visibility;
        }
        Ok(())
    }

    async fn update_repository_set_external_user(
        &self,
        repo: &str,
        login: &str,
        permission: RepoPermission,
    ) -> Result<(), ApiError> {
        let mut state = self.state.lock().unwrap();
        if let Some(record) = state.repositories.get_mut(repo) {
            record.outside_collaborators.insert(login.to_string(), permission);
        }
        Ok(())
    }

    async fn update_repository_remove_external_user(
        &self,
        repo: &str,
        login: &str,
    ) -> Result<(), ApiError> {
        let mut state = self.state.lock().unwrap();
        if let Some(record) = state.repositories.get_mut(repo) {
            record.outside_collaborators.remove(login);
        }
        Ok(())
    }

    async fn update_repository_remove_internal_user(
        &self,
        repo: &str,
        login: &str,
    ) -> Result<(), ApiError> {
        let mut state = self.state.lock().unwrap();
        if let Some(record) = state.repositories.get_mut(repo) {
            record.internal_collaborators.remove(login);
        }
        Ok(())
    }

    async fn rename_repository(&self, repo: &str, new_name: &str) -> Result<(), ApiError> {
        let mut state = self.state.lock().unwrap();
        if let Some(mut record) = state.repositories.remove(repo) {
            record.name = new_name.to_string();
            state.repositories.insert(new_name.to_string(), record);
        }
        Ok(())
    }

    async fn delete_repository(&self, repo: &str) -> Result<(), ApiError> {
        self.state.lock().unwrap().repositories.remove(repo);
        Ok(())
    }

    async fn add_org_ruleset(
        &self,
        ruleset: &RemoteRuleset,
        _bypass_actors: &[WireBypassActor],
    ) -> Result<u64, ApiError> {
        let mut state = self.state.lock().unwrap();
        state.next_id += 1;
        let id = state.next_id;
        let mut stored = ruleset.clone();
        stored.id = Some(id);
        state.org_rulesets.insert(stored.name.clone(), stored);
        Ok(id)
    }

    async fn update_org_ruleset(
        &self,
        id: u64,
        ruleset: &RemoteRuleset,
        _bypass_actors: &[WireBypassActor],
    ) -> Result<(), ApiError> {
        let mut state = self.state.lock().unwrap();
        let mut stored = ruleset.clone();
        stored.id = Some(id);
        state.org_rulesets.insert(stored.name.clone(), stored);
        Ok(())
    }

    async fn delete_org_ruleset(&self, id: u64) -> Result<(), ApiError> {
        let mut state = self.state.lock().unwrap();
        state.org_rulesets.retain(|_, ruleset| ruleset.id != Some(id));
        Ok(())
    }

    async fn add_repository_ruleset(
        &self,
        repo: &str,
        ruleset: &RemoteRuleset,
        _bypass_actors: &[WireBypassActor],
    ) -> Result<u64, ApiError> {
        let mut state = self.state.lock().unwrap();
        state.next_id += 1;
        let id = state.next_id;
        if let Some(record) = state.repositories.get_mut(repo) {
            let mut stored = ruleset.clone();
            stored.id = Some(id);
            record.rulesets.insert(stored.name.clone(), stored);
        }
        Ok(id)
    }

    async fn update_repository_ruleset(
        &self,
        repo: &str,
        id: u64,
        ruleset: &RemoteRuleset,
        _bypass_actors: &[WireBypassActor],
    ) -> Result<(), ApiError> {
        let mut state = self.state.lock().unwrap();
        if let Some(record) = state.repositories.get_mut(repo) {
            let mut stored = ruleset.clone();
            stored.id = Some(id);
            record.rulesets.insert(stored.name.clone(), stored);
        }
        Ok(())
    }

    async fn delete_repository_ruleset(&self, repo: &str, id: u64) -> Result<(), ApiError> {
        let mut state = self.state.lock().unwrap();
        if let Some(record) = state.repositories.get_mut(repo) {
            record.rulesets.retain(|_, ruleset| ruleset.id != Some(id));
        }
        Ok(())
    }

    async fn add_repository_branch_protection(
        &self,
        _repo_node_id: &str,
        _protection: &BranchProtection,
    ) -> Result<String, ApiError> {
        let mut state = self.state.lock().unwrap();
        state.next_id += 1;
        Ok(format!("BPR_{}", state.next_id))
    }

    async fn update_repository_branch_protection(
        &self,
        _rule_id: &str,
        _protection: &BranchProtection,
    ) -> Result<(), ApiError> {
        Ok(())
    }

    async fn delete_repository_branch_protection(&self, _rule_id: &str) -> Result<(), ApiError> {
        Ok(())
    }

    async fn add_repository_environment(
        &self,
        repo: &str,
        environment: &str,
    ) -> Result<(), ApiError> {
        let mut state = self.state.lock().unwrap();
        state
            .environments
            .entry(repo.to_string())
            .or_default()
            .entry(environment.to_string())
            .or_default();
        Ok(())
    }

    async fn delete_repository_environment(
        &self,
        repo: &str,
        environment: &str,
    ) -> Result<(), ApiError> {
        let mut state = self.state.lock().unwrap();
        if let Some(environments) = state.environments.get_mut(repo) {
            environments.remove(environment);
        }
        Ok(())
    }

    async fn add_repository_variable(
        &self,
        repo: &str,
        name: &str,
        value: &str,
    ) -> Result<(), ApiError> {
        let mut state = self.state.lock().unwrap();
        state
            .variables
            .entry(repo.to_string())
            .or_default()
            .insert(name.to_string(), value.to_string());
        Ok(())
    }

    async fn update_repository_variable(
        &self,
        repo: &str,
        name: &str,
        value: &str,
    ) -> Result<(), ApiError> {
        self.add_repository_variable(repo, name, value).await
    }

    async fn delete_repository_variable(&self, repo: &str, name: &str) -> Result<(), ApiError> {
        let mut state = self.state.lock().unwrap();
        if let Some(variables) = state.variables.get_mut(repo) {
            variables.remove(name);
        }
        Ok(())
    }

    async fn add_repository_environment_variable(
        &self,
        repo: &str,
        environment: &str,
        name: &str,
        value: &str,
    ) -> Result<(), ApiError> {
        let mut state = self.state.lock().unwrap();
        if let Some(environments) = state.environments.get_mut(repo)
            && let Some(variables) = environments.get_mut(environment)
        {
            variables.insert(name.to_string(), value.to_string());
        }
        Ok(())
    }

    async fn update_repository_environment_variable(
        &self,
        repo: &str,
        environment: &str,
        name: &str,
        value: &str,
    ) -> Result<(), ApiError> {
        self.add_repository_environment_variable(repo, environment, name, value)
            .await
    }

    async fn delete_repository_environment_variable(
        &self,
        repo: &str,
        environment: &str,
        name: &str,
    ) -> Result<(), ApiError> {
        let mut state = self.state.lock().unwrap();
        if let Some(environments) = state.environments.get_mut(repo)
            && let Some(variables) = environments.get_mut(environment)
        {
            variables.remove(name);
        }
        Ok(())
    }
}
