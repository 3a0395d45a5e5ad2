//! The remote mirror: a lazy, TTL-cached, in-memory snapshot of the live
//! GitHub organization.
//!
//! Accessors refresh one asset class on demand when its TTL expired.
//! Mutations update both GitHub (suppressed in dry-run) and the local
//! snapshot, so diffs later in the same cycle observe the new state.

pub mod client;
#[cfg(test)]
pub(crate) mod fake;
pub mod github;
pub mod graphql;
pub mod lazy;
pub mod types;

pub use client::{ApiError, CreateRepositoryRequest, GithubApi};
pub use github::OctocrabApi;
pub use types::{
    AssetTotals, EnvironmentMap, ProgressObserver, RemoteBranchProtection, RemoteRepository,
    RemoteRuleset, RemoteTeam, RepoBoolProperty, RepoPermission, TeamRole, VariableMap,
    WireBypassActor,
};

use futures::future::{BoxFuture, FutureExt};
use log::{debug, info};
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, RwLock, mpsc};

use crate::model::repository::{BranchProtection, Visibility};
use crate::model::team::slugify;

/// One asset class with its own expiry timestamp.
#[derive(Debug, Default)]
struct CachedAsset<T> {
    value: Option<T>,
    loaded_at: Option<Instant>,
}

impl<T: Clone> CachedAsset<T> {
    fn fresh_value(&self, ttl: Duration) -> Option<T> {
        match (&self.value, self.loaded_at) {
            (Some(value), Some(loaded_at)) if loaded_at.elapsed() < ttl => Some(value.clone()),
            _ => None,
        }
    }

    fn store(&mut self, value: T) {
        self.value = Some(value);
        self.loaded_at = Some(Instant::now());
    }

    fn expire(&mut self) {
        self.loaded_at = None;
    }
}

/// The in-memory mirror of the observed organization.
pub struct RemoteMirror {
    api: Arc<dyn GithubApi>,
    cache_ttl: Duration,
    workers: usize,
    observer: Option<Arc<dyn ProgressObserver>>,
    synthetic_ids: AtomicU64,
    users: RwLock<CachedAsset<BTreeSet<String>>>,
    teams: RwLock<CachedAsset<BTreeMap<String, RemoteTeam>>>,
    // Serializes team refreshes against high-fan-in dashboard queries.
    teams_refresh: Mutex<()>,
    repositories: RwLock<CachedAsset<BTreeMap<String, RemoteRepository>>>,
    rulesets: RwLock<CachedAsset<BTreeMap<String, RemoteRuleset>>>,
    app_ids: RwLock<CachedAsset<BTreeMap<String, u64>>>,
}

impl RemoteMirror {
    /// Creates a mirror over the given API with a cache TTL in seconds and
    /// a fan-out worker count (clamped to at least 1).
    pub fn new(api: Arc<dyn GithubApi>, cache_ttl_seconds: u64, workers: usize) -> Self {
        Self {
            api,
            cache_ttl: Duration::from_secs(cache_ttl_seconds),
            workers: workers.max(1),
            observer: None,
            synthetic_ids: AtomicU64::new(1_000_000_000),
            users: RwLock::new(CachedAsset::default()),
            teams: RwLock::new(CachedAsset::default()),
            teams_refresh: Mutex::new(()),
            repositories: RwLock::new(CachedAsset::default()),
            rulesets: RwLock::new(CachedAsset::default()),
            app_ids: RwLock::new(CachedAsset::default()),
        }
    }

    /// Attaches a progress observer, invoked after loaded batches.
    pub fn with_observer(mut self, observer: Arc<dyn ProgressObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    /// True on GitHub Enterprise; gates organization rulesets.
    pub fn is_enterprise(&self) -> bool {
        self.api.is_enterprise()
    }

    /// Organization-wide totals, reported to the observer.
    pub async fn count_assets(&self) -> Result<AssetTotals, ApiError> {
        let totals = self.api.count_assets().await?;
        if let Some(observer) = &self.observer {
            observer.expect(totals.total());
        }
        Ok(totals)
    }

    fn notify(&self, asset: &str, count: usize) {
        if let Some(observer) = &self.observer {
            observer.loaded(asset, count);
        }
    }

    fn next_synthetic_id(&self) -> u64 {
        self.synthetic_ids.fetch_add(1, Ordering::SeqCst)
    }

    // --- accessors -----------------------------------------------------

    /// Logins of the organization members.
    pub async fn users(&self) -> Result<BTreeSet<String>, ApiError> {
        if let Some(users) = self.users.read().await.fresh_value(self.cache_ttl) {
            return Ok(users);
        }
        let members: BTreeSet<String> = self.api.org_members().await?.into_iter().collect();
        self.notify("users", members.len());
        self.users.write().await.store(members.clone());
        Ok(members)
    }

    /// Teams by slug, membership included.
    pub async fn teams(&self) -> Result<BTreeMap<String, RemoteTeam>, ApiError> {
        if let Some(teams) = self.teams.read().await.fresh_value(self.cache_ttl) {
            return Ok(teams);
        }
        let _refresh = self.teams_refresh.lock().await;
        if let Some(teams) = self.teams.read().await.fresh_value(self.cache_ttl) {
            return Ok(teams);
        }

        let listed = self.api.teams().await?;
        let slugs: Vec<String> = listed.iter().map(|team| team.slug.clone()).collect();
        let api = self.api.clone();
        let memberships = fan_out(slugs, self.workers, move |slug| {
            let api = api.clone();
            async move {
                let members = api.team_members(&slug).await?;
                Ok((slug, members))
            }
            .boxed()
        })
        .await?;
        let mut members_by_slug: BTreeMap<String, BTreeMap<String, TeamRole>> =
            memberships.into_iter().collect();

        let mut teams = BTreeMap::new();
        for mut team in listed {
            if let Some(members) = members_by_slug.remove(&team.slug) {
                team.members = members;
            }
            teams.insert(team.slug.clone(), team);
        }
        info!("mirrored {} teams", teams.len());
        self.notify("teams", teams.len());
        self.teams.write().await.store(teams.clone());
        Ok(teams)
    }

    /// Repositories by name, team grants included.
    pub async fn repositories(&self) -> Result<BTreeMap<String, RemoteRepository>, ApiError> {
        if let Some(repos) = self.repositories.read().await.fresh_value(self.cache_ttl) {
            return Ok(repos);
        }

        let listed = self.api.repositories().await?;
        let names: Vec<String> = listed.iter().map(|repo| repo.name.clone()).collect();
        let api = self.api.clone();
        let grants = fan_out(names, self.workers, move |name| {
            let api = api.clone();
            async move {
                let permissions = api.repository_team_permissions(&name).await?;
                Ok((name, permissions))
            }
            .boxed()
        })
        .await?;
        let mut grants_by_name: BTreeMap<String, BTreeMap<String, RepoPermission>> =
            grants.into_iter().collect();

        let mut repositories = BTreeMap::new();
        for mut repo in listed {
            if let Some(permissions) = grants_by_name.remove(&repo.name) {
                repo.team_permissions = permissions;
            }
            repositories.insert(repo.name.clone(), repo);
        }
        info!("mirrored {} repositories", repositories.len());
        self.notify("repositories", repositories.len());
        self.repositories.write().await.store(repositories.clone());
        Ok(repositories)
    }

    /// Organization-scope rulesets by name.
    pub async fn org_rulesets(&self) -> Result<BTreeMap<String, RemoteRuleset>, ApiError> {
        if let Some(rulesets) = self.rulesets.read().await.fresh_value(self.cache_ttl) {
            return Ok(rulesets);
        }
        let listed = self.api.org_rulesets().await?;
        let rulesets: BTreeMap<String, RemoteRuleset> = listed
            .into_iter()
            .map(|ruleset| (ruleset.name.clone(), ruleset))
            .collect();
        self.notify("rulesets", rulesets.len());
        self.rulesets.write().await.store(rulesets.clone());
        Ok(rulesets)
    }

    /// Installed App slug → app id.
    pub async fn app_installations(&self) -> Result<BTreeMap<String, u64>, ApiError> {
        if let Some(apps) = self.app_ids.read().await.fresh_value(self.cache_ttl) {
            return Ok(apps);
        }
        let apps = self.api.app_installations().await?;
        self.app_ids.write().await.store(apps.clone());
        Ok(apps)
    }

    /// Environments of a repository, fetched lazily and memoized on the
    /// repository record.
    pub async fn environments(&self, repo: &str) -> Result<EnvironmentMap, ApiError> {
        let record = self
            .repositories()
            .await?
            .get(repo)
            .cloned()
            .ok_or_else(|| ApiError::decode(format!("unknown repository '{}'", repo)))?;
        let api = self.api.clone();
        let name = repo.to_string();
        record
            .environments
            .get_or_fetch(|| async move { api.environments(&name).await })
            .await
    }

    /// Actions variables of a repository, fetched lazily.
    pub async fn repository_variables(&self, repo: &str) -> Result<VariableMap, ApiError> {
        let record = self
            .repositories()
            .await?
            .get(repo)
            .cloned()
            .ok_or_else(|| ApiError::decode(format!("unknown repository '{}'", repo)))?;
        let api = self.api.clone();
        let name = repo.to_string();
        record
            .variables
            .get_or_fetch(|| async move { api.repository_variables(&name).await })
            .await
    }

    // --- cache control -------------------------------------------------

    /// Expires every asset class.
    pub async fn flush_cache(&self) {
        self.users.write().await.expire();
        self.teams.write().await.expire();
        self.repositories.write().await.expire();
        self.rulesets.write().await.expire();
        self.app_ids.write().await.expire();
        debug!("remote cache flushed");
    }

    /// Expires only users and teams, after a user-sync commit.
    pub async fn flush_cache_users_teams_only(&self) {
        self.users.write().await.expire();
        self.teams.write().await.expire();
        debug!("remote user/team cache flushed");
    }

    // --- snapshot helpers ----------------------------------------------

    async fn with_users<F: FnOnce(&mut BTreeSet<String>)>(&self, apply: F) {
        let mut guard = self.users.write().await;
        if let Some(users) = guard.value.as_mut() {
            apply(users);
        }
    }

    async fn with_teams<F: FnOnce(&mut BTreeMap<String, RemoteTeam>)>(&self, apply: F) {
        let mut guard = self.teams.write().await;
        if let Some(teams) = guard.value.as_mut() {
            apply(teams);
        }
    }

    async fn with_repositories<F: FnOnce(&mut BTreeMap<String, RemoteRepository>)>(
        &self,
        apply: F,
    ) {
        let mut guard = self.repositories.write().await;
        if let Some(repositories) = guard.value.as_mut() {
            apply(repositories);
        }
    }

    async fn with_rulesets<F: FnOnce(&mut BTreeMap<String, RemoteRuleset>)>(&self, apply: F) {
        let mut guard = self.rulesets.write().await;
        if let Some(rulesets) = guard.value.as_mut() {
            apply(rulesets);
        }
    }

    // --- user mutations ------------------------------------------------

    pub async fn add_user_to_org(&self, dry_run: bool, login: &str) -> Result<(), ApiError> {
        if !dry_run {
            self.api.add_user_to_org(login).await?;
        }
        self.with_users(|users| {
            users.insert(login.to_string());
        })
        .await;
        Ok(())
    }

    pub async fn remove_user_from_org(&self, dry_run: bool, login: &str) -> Result<(), ApiError> {
        if !dry_run {
            self.api.remove_user_from_org(login).await?;
        }
        self.with_users(|users| {
            users.remove(login);
        })
        .await;
        Ok(())
    }

    // --- team mutations ------------------------------------------------

    pub async fn create_team(
        &self,
        dry_run: bool,
        name: &str,
        members: &[String],
    ) -> Result<(), ApiError> {
        let team = if dry_run {
            RemoteTeam {
                id: self.next_synthetic_id(),
                name: name.to_string(),
                slug: slugify(name),
                parent_id: None,
                members: members
                    .iter()
                    .map(|login| (login.clone(), TeamRole::Member))
                    .collect(),
            }
        } else {
            self.api.create_team(name, members).await?
        };
        self.with_teams(|teams| {
            teams.insert(team.slug.clone(), team);
        })
        .await;
        Ok(())
    }

    pub async fn update_team_add_member(
        &self,
        dry_run: bool,
        slug: &str,
        login: &str,
        role: TeamRole,
    ) -> Result<(), ApiError> {
        if !dry_run {
            self.api.update_team_add_member(slug, login, role).await?;
        }
        self.with_teams(|teams| {
            if let Some(team) = teams.get_mut(slug) {
                team.members.insert(login.to_string(), role);
            }
        })
        .await;
        Ok(())
    }

    pub async fn update_team_update_member(
        &self,
        dry_run: bool,
        slug: &str,
        login: &str,
        role: TeamRole,
    ) -> Result<(), ApiError> {
        if !dry_run {
            self.api.update_team_update_member(slug, login, role).await?;
        }
        self.with_teams(|teams| {
            if let Some(team) = teams.get_mut(slug) {
                team.members.insert(login.to_string(), role);
            }
        })
        .await;
        Ok(())
    }

    pub async fn update_team_remove_member(
        &self,
        dry_run: bool,
        slug: &str,
        login: &str,
    ) -> Result<(), ApiError> {
        if !dry_run {
            self.api.update_team_remove_member(slug, login).await?;
        }
        self.with_teams(|teams| {
            if let Some(team) = teams.get_mut(slug) {
                team.members.remove(login);
            }
        })
        .await;
        Ok(())
    }

    pub async fn update_team_set_parent(
        &self,
        dry_run: bool,
        slug: &str,
        parent_id: Option<u64>,
    ) -> Result<(), ApiError> {
        if !dry_run {
            self.api.update_team_set_parent(slug, parent_id).await?;
        }
        self.with_teams(|teams| {
            if let Some(team) = teams.get_mut(slug) {
                team.parent_id = parent_id;
            }
        })
        .await;
        Ok(())
    }

    pub async fn delete_team(&self, dry_run: bool, slug: &str) -> Result<(), ApiError> {
        if !dry_run {
            self.api.delete_team(slug).await?;
        }
        self.with_teams(|teams| {
            teams.remove(slug);
        })
        .await;
        Ok(())
    }

    // --- repository mutations ------------------------------------------

    pub async fn create_repository(
        &self,
        dry_run: bool,
        request: &CreateRepositoryRequest,
    ) -> Result<(), ApiError> {
        if !dry_run {
            self.api.create_repository(request).await?;
        }
        let mut record = RemoteRepository::synthetic(&request.name);
        record.id = self.next_synthetic_id();
        record.visibility = request.visibility;
        record.allow_auto_merge = request.allow_auto_merge;
        record.delete_branch_on_merge = request.delete_branch_on_merge;
        record.allow_update_branch = request.allow_update_branch;
        record.default_branch = request.default_branch.clone();
        for writer in &request.writers {
            record
                .team_permissions
                .insert(writer.clone(), RepoPermission::Write);
        }
        for reader in &request.readers {
            record
                .team_permissions
                .insert(reader.clone(), RepoPermission::Read);
        }
        self.with_repositories(|repositories| {
            repositories.insert(request.name.clone(), record);
        })
        .await;
        Ok(())
    }

    pub async fn update_repository_add_team_access(
        &self,
        dry_run: bool,
        repo: &str,
        team_slug: &str,
        permission: RepoPermission,
    ) -> Result<(), ApiError> {
        if !dry_run {
            self.api
                .update_repository_add_team_access(repo, team_slug, permission)
                .await?;
        }
        self.with_repositories(|repositories| {
            if let Some(record) = repositories.get_mut(repo) {
                record
                    .team_permissions
                    .insert(team_slug.to_string(), permission);
            }
        })
        .await;
        Ok(())
    }

    pub async fn update_repository_update_team_access(
        &self,
        dry_run: bool,
        repo: &str,
        team_slug: &str,
        permission: RepoPermission,
    ) -> Result<(), ApiError> {
        if !dry_run {
            self.api
                .update_repository_update_team_access(repo, team_slug, permission)
                .await?;
        }
        self.with_repositories(|repositories| {
            if let Some(record) = repositories.get_mut(repo) {
                record
                    .team_permissions
                    .insert(team_slug.to_string(), permission);
            }
        })
        .await;
        Ok(())
    }

    pub async fn update_repository_remove_team_access(
        &self,
        dry_run: bool,
        repo: &str,
        team_slug: &str,
    ) -> Result<(), ApiError> {
        if !dry_run {
            self.api
                .update_repository_remove_team_access(repo, team_slug)
                .await?;
        }
        self.with_repositories(|repositories| {
            if let Some(record) = repositories.get_mut(repo) {
                record.team_permissions.remove(team_slug);
            }
        })
        .await;
        Ok(())
    }

    pub async fn update_repository_update_bool_property(
        &self,
        dry_run: bool,
        repo: &str,
        property: RepoBoolProperty,
        value: bool,
    ) -> Result<(), ApiError> {
        if !dry_run {
            self.api
                .update_repository_update_bool_property(repo, property, value)
                .await?;
        }
        self.with_repositories(|repositories| {
            if let Some(record) = repositories.get_mut(repo) {
                match property {
                    RepoBoolProperty::Archived => record.archived = value,
                    RepoBoolProperty::AllowAutoMerge => record.allow_auto_merge = value,
                    RepoBoolProperty::DeleteBranchOnMerge => {
                        record.delete_branch_on_merge = value
                    }
                    RepoBoolProperty::AllowUpdateBranch => record.allow_update_branch = value,
                }
            }
        })
        .await;
        Ok(())
    }

    pub async fn update_repository_set_default_branch(
        &self,
        dry_run: bool,
        repo: &str,
        branch: &str,
    ) -> Result<(), ApiError> {
        if !dry_run {
            self.api
                .update_repository_set_default_branch(repo, branch)
                .await?;
        }
        self.with_repositories(|repositories| {
            if let Some(record) = repositories.get_mut(repo) {
                record.default_branch = branch.to_string();
            }
        })
        .await;
        Ok(())
    }

    pub async fn update_repository_set_visibility(
        &self,
        dry_run: bool,
        repo: &str,
        visibility: Visibility,
    ) -> Result<(), ApiError> {
        if !dry_run {
            self.api
                .update_repository_set_visibility(repo, visibility)
                .await?;
        }
        self.with_repositories(|repositories| {
            if let Some(record) = repositories.get_mut(repo) {
                record.visibility = visibility;
            }
        })
        .await;
        Ok(())
    }

    pub async fn update_repository_set_external_user(
        &self,
        dry_run: bool,
        repo: &str,
        login: &str,
        permission: RepoPermission,
    ) -> Result<(), ApiError> {
        if !dry_run {
            self.api
                .update_repository_set_external_user(repo, login, permission)
                .await?;
        }
        self.with_repositories(|repositories| {
            if let Some(record) = repositories.get_mut(repo) {
                record
                    .outside_collaborators
                    .insert(login.to_string(), permission);
            }
        })
        .await;
        Ok(())
    }

    pub async fn update_repository_remove_external_user(
        &self,
        dry_run: bool,
        repo: &str,
        login: &str,
    ) -> Result<(), ApiError> {
        if !dry_run {
            self.api
                .update_repository_remove_external_user(repo, login)
                .await?;
        }
        self.with_repositories(|repositories| {
            if let Some(record) = repositories.get_mut(repo) {
                record.outside_collaborators.remove(login);
            }
        })
        .await;
        Ok(())
    }

    pub async fn update_repository_remove_internal_user(
        &self,
        dry_run: bool,
        repo: &str,
        login: &str,
    ) -> Result<(), ApiError> {
        if !dry_run {
            self.api
                .update_repository_remove_internal_user(repo, login)
                .await?;
        }
        self.with_repositories(|repositories| {
            if let Some(record) = repositories.get_mut(repo) {
                record.internal_collaborators.remove(login);
            }
        })
        .await;
        Ok(())
    }

    pub async fn rename_repository(
        &self,
        dry_run: bool,
        repo: &str,
        new_name: &str,
    ) -> Result<(), ApiError> {
        if !dry_run {
            self.api.rename_repository(repo, new_name).await?;
        }
        self.with_repositories(|repositories| {
            if let Some(mut record) = repositories.remove(repo) {
                record.name = new_name.to_string();
                repositories.insert(new_name.to_string(), record);
            }
        })
        .await;
        Ok(())
    }

    pub async fn delete_repository(&self, dry_run: bool, repo: &str) -> Result<(), ApiError> {
        if !dry_run {
            self.api.delete_repository(repo).await?;
        }
        self.with_repositories(|repositories| {
            repositories.remove(repo);
        })
        .await;
        Ok(())
    }

    // --- ruleset mutations ---------------------------------------------

    pub async fn add_org_ruleset(
        &self,
        dry_run: bool,
        ruleset: &RemoteRuleset,
        bypass_actors: &[WireBypassActor],
    ) -> Result<(), ApiError> {
        let id = if dry_run {
            self.next_synthetic_id()
        } else {
            self.api.add_org_ruleset(ruleset, bypass_actors).await?
        };
        let mut stored = ruleset.clone();
        stored.id = Some(id);
        self.with_rulesets(|rulesets| {
            rulesets.insert(stored.name.clone(), stored);
        })
        .await;
        Ok(())
    }

    pub async fn update_org_ruleset(
        &self,
        dry_run: bool,
        id: u64,
        ruleset: &RemoteRuleset,
        bypass_actors: &[WireBypassActor],
    ) -> Result<(), ApiError> {
        if !dry_run {
            self.api.update_org_ruleset(id, ruleset, bypass_actors).await?;
        }
        let mut stored = ruleset.clone();
        stored.id = Some(id);
        self.with_rulesets(|rulesets| {
            rulesets.insert(stored.name.clone(), stored);
        })
        .await;
        Ok(())
    }

    pub async fn delete_org_ruleset(&self, dry_run: bool, name: &str, id: u64) -> Result<(), ApiError> {
        if !dry_run {
            self.api.delete_org_ruleset(id).await?;
        }
        self.with_rulesets(|rulesets| {
            rulesets.remove(name);
        })
        .await;
        Ok(())
    }

    pub async fn add_repository_ruleset(
        &self,
        dry_run: bool,
        repo: &str,
        ruleset: &RemoteRuleset,
        bypass_actors: &[WireBypassActor],
    ) -> Result<(), ApiError> {
        let id = if dry_run {
            self.next_synthetic_id()
        } else {
            self.api
                .add_repository_ruleset(repo, ruleset, bypass_actors)
                .await?
        };
        let mut stored = ruleset.clone();
        stored.id = Some(id);
        self.with_repositories(|repositories| {
            if let Some(record) = repositories.get_mut(repo) {
                record.rulesets.insert(stored.name.clone(), stored);
            }
        })
        .await;
        Ok(())
    }

    pub async fn update_repository_ruleset(
        &self,
        dry_run: bool,
        repo: &str,
        id: u64,
        ruleset: &RemoteRuleset,
        bypass_actors: &[WireBypassActor],
    ) -> Result<(), ApiError> {
        if !dry_run {
            self.api
                .update_repository_ruleset(repo, id, ruleset, bypass_actors)
                .await?;
        }
        let mut stored = ruleset.clone();
        stored.id = Some(id);
        self.with_repositories(|repositories| {
            if let Some(record) = repositories.get_mut(repo) {
                record.rulesets.insert(stored.name.clone(), stored);
            }
        })
        .await;
        Ok(())
    }

    pub async fn delete_repository_ruleset(
        &self,
        dry_run: bool,
        repo: &str,
        name: &str,
        id: u64,
    ) -> Result<(), ApiError> {
        if !dry_run {
            self.api.delete_repository_ruleset(repo, id).await?;
        }
        self.with_repositories(|repositories| {
            if let Some(record) = repositories.get_mut(repo) {
                record.rulesets.remove(name);
            }
        })
        .await;
        Ok(())
    }

    // --- branch protection mutations -----------------------------------

    pub async fn add_repository_branch_protection(
        &self,
        dry_run: bool,
        repo: &str,
        protection: &BranchProtection,
    ) -> Result<(), ApiError> {
        let rule_id = if dry_run {
            format!("BPR_dryrun_{}", self.next_synthetic_id())
        } else {
            let node_id = self
                .repositories()
                .await?
                .get(repo)
                .map(|record| record.node_id.clone())
                .unwrap_or_default();
            self.api
                .add_repository_branch_protection(&node_id, protection)
                .await?
        };
        self.with_repositories(|repositories| {
            if let Some(record) = repositories.get_mut(repo) {
                record.branch_protections.insert(
                    protection.pattern.clone(),
                    RemoteBranchProtection {
                        id: rule_id,
                        protection: protection.clone(),
                    },
                );
            }
        })
        .await;
        Ok(())
    }

    pub async fn update_repository_branch_protection(
        &self,
        dry_run: bool,
        repo: &str,
        rule_id: &str,
        protection: &BranchProtection,
    ) -> Result<(), ApiError> {
        if !dry_run {
            self.api
                .update_repository_branch_protection(rule_id, protection)
                .await?;
        }
        self.with_repositories(|repositories| {
            if let Some(record) = repositories.get_mut(repo) {
                record.branch_protections.insert(
                    protection.pattern.clone(),
                    RemoteBranchProtection {
                        id: rule_id.to_string(),
                        protection: protection.clone(),
                    },
                );
            }
        })
        .await;
        Ok(())
    }

    pub async fn delete_repository_branch_protection(
        &self,
        dry_run: bool,
        repo: &str,
        pattern: &str,
        rule_id: &str,
    ) -> Result<(), ApiError> {
        if !dry_run {
            self.api.delete_repository_branch_protection(rule_id).await?;
        }
        self.with_repositories(|repositories| {
            if let Some(record) = repositories.get_mut(repo) {
                record.branch_protections.remove(pattern);
            }
        })
        .await;
        Ok(())
    }

    // --- environment and variable mutations ----------------------------

    pub async fn add_repository_environment(
        &self,
        dry_run: bool,
        repo: &str,
        environment: &str,
    ) -> Result<(), ApiError> {
        if !dry_run {
            self.api.add_repository_environment(repo, environment).await?;
        }
        self.mutate_environments(repo, |environments| {
            environments
                .entry(environment.to_string())
                .or_insert_with(BTreeMap::new);
        })
        .await;
        Ok(())
    }

    pub async fn delete_repository_environment(
        &self,
        dry_run: bool,
        repo: &str,
        environment: &str,
    ) -> Result<(), ApiError> {
        if !dry_run {
            self.api
                .delete_repository_environment(repo, environment)
                .await?;
        }
        self.mutate_environments(repo, |environments| {
            environments.remove(environment);
        })
        .await;
        Ok(())
    }

    pub async fn add_repository_variable(
        &self,
        dry_run: bool,
        repo: &str,
        name: &str,
        value: &str,
    ) -> Result<(), ApiError> {
        if !dry_run {
            self.api.add_repository_variable(repo, name, value).await?;
        }
        self.mutate_variables(repo, |variables| {
            variables.insert(name.to_string(), value.to_string());
        })
        .await;
        Ok(())
    }

    pub async fn update_repository_variable(
        &self,
        dry_run: bool,
        repo: &str,
        name: &str,
        value: &str,
    ) -> Result<(), ApiError> {
        if !dry_run {
            self.api.update_repository_variable(repo, name, value).await?;
        }
        self.mutate_variables(repo, |variables| {
            variables.insert(name.to_string(), value.to_string());
        })
        .await;
        Ok(())
    }

    pub async fn delete_repository_variable(
        &self,
        dry_run: bool,
        repo: &str,
        name: &str,
    ) -> Result<(), ApiError> {
        if !dry_run {
            self.api.delete_repository_variable(repo, name).await?;
        }
        self.mutate_variables(repo, |variables| {
            variables.remove(name);
        })
        .await;
        Ok(())
    }

    pub async fn add_repository_environment_variable(
        &self,
        dry_run: bool,
        repo: &str,
        environment: &str,
        name: &str,
        value: &str,
    ) -> Result<(), ApiError> {
        if !dry_run {
            self.api
                .add_repository_environment_variable(repo, environment, name, value)
                .await?;
        }
        self.mutate_environments(repo, |environments| {
            if let Some(variables) = environments.get_mut(environment) {
                variables.insert(name.to_string(), value.to_string());
            }
        })
        .await;
        Ok(())
    }

    pub async fn update_repository_environment_variable(
        &self,
        dry_run: bool,
        repo: &str,
        environment: &str,
        name: &str,
        value: &str,
    ) -> Result<(), ApiError> {
        if !dry_run {
            self.api
                .update_repository_environment_variable(repo, environment, name, value)
                .await?;
        }
        self.mutate_environments(repo, |environments| {
            if let Some(variables) = environments.get_mut(environment) {
                variables.insert(name.to_string(), value.to_string());
            }
        })
        .await;
        Ok(())
    }

    pub async fn delete_repository_environment_variable(
        &self,
        dry_run: bool,
        repo: &str,
        environment: &str,
        name: &str,
    ) -> Result<(), ApiError> {
        if !dry_run {
            self.api
                .delete_repository_environment_variable(repo, environment, name)
                .await?;
        }
        self.mutate_environments(repo, |environments| {
            if let Some(variables) = environments.get_mut(environment) {
                variables.remove(name);
            }
        })
        .await;
        Ok(())
    }

    /// Applies a change to a repository's loaded environment holder.
    async fn mutate_environments<F: FnOnce(&mut EnvironmentMap)>(&self, repo: &str, apply: F) {
        let record = {
            let guard = self.repositories.read().await;
            guard
                .value
                .as_ref()
                .and_then(|repositories| repositories.get(repo).cloned())
        };
        if let Some(record) = record {
            record.environments.mutate(apply).await;
        }
    }

    /// Applies a change to a repository's loaded variable holder.
    async fn mutate_variables<F: FnOnce(&mut VariableMap)>(&self, repo: &str, apply: F) {
        let record = {
            let guard = self.repositories.read().await;
            guard
                .value
                .as_ref()
                .and_then(|repositories| repositories.get(repo).cloned())
        };
        if let Some(record) = record {
            record.variables.mutate(apply).await;
        }
    }
}

/// Fan-out over a work list with N workers.
///
/// Workers pull items from a shared queue, push results to a collector
/// channel and report the first failure through a bounded error channel.
/// With one worker the items run sequentially on the caller's task.
pub(crate) async fn fan_out<I, O, F>(
    items: Vec<I>,
    workers: usize,
    run: F,
) -> Result<Vec<O>, ApiError>
where
    I: Send + 'static,
    O: Send + 'static,
    F: Fn(I) -> BoxFuture<'static, Result<O, ApiError>> + Send + Sync + 'static,
{
    if workers <= 1 || items.len() <= 1 {
        let mut results = Vec::with_capacity(items.len());
        for item in items {
            results.push(run(item).await?);
        }
        return Ok(results);
    }

    let queue = Arc::new(Mutex::new(items.into_iter().collect::<VecDeque<I>>()));
    let run = Arc::new(run);
    let (result_tx, mut result_rx) = mpsc::unbounded_channel();
    let (error_tx, mut error_rx) = mpsc::channel(1);

    let mut handles = Vec::with_capacity(workers);
    for _ in 0..workers {
        let queue = queue.clone();
        let run = run.clone();
        let result_tx = result_tx.clone();
        let error_tx = error_tx.clone();
        handles.push(tokio::spawn(async move {
            loop {
                let item = queue.lock().await.pop_front();
                let Some(item) = item else { break };
                match run(item).await {
                    Ok(output) => {
                        if result_tx.send(output).is_err() {
                            break;
                        }
                    }
                    Err(error) => {
                        // Only the first failure matters; try_send drops
                        // the rest without blocking the worker.
                        let _ = error_tx.try_send(error);
                        break;
                    }
                }
            }
        }));
    }
    drop(result_tx);
    drop(error_tx);

    let mut results = Vec::new();
    while let Some(output) = result_rx.recv().await {
        results.push(output);
    }
    for handle in handles {
        let _ = handle.await;
    }
    if let Some(error) = error_rx.recv().await {
        return Err(error);
    }
    Ok(results)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn fan_out_sequential_when_single_worker() {
        let results = fan_out(vec![1, 2, 3], 1, |item| async move { Ok::<_, ApiError>(item * 2) }.boxed())
            .await
            .unwrap();
        assert_eq!(results, vec![2, 4, 6]);
    }

    #[tokio::test]
    async fn fan_out_collects_all_results() {
        let mut results = fan_out(
            (0..20).collect::<Vec<u32>>(),
            4,
            |item| async move { Ok::<_, ApiError>(item + 100) }.boxed(),
        )
        .await
        .unwrap();
        results.sort();
        assert_eq!(results.len(), 20);
        assert_eq!(results[0], 100);
        assert_eq!(results[19], 119);
    }

    #[tokio::test]
    async fn fan_out_surfaces_first_error() {
        let result = fan_out(
            (0..10).collect::<Vec<u32>>(),
            3,
            |item| {
                async move {
                    if item == 5 {
                        Err(ApiError::Network("boom".into()))
                    } else {
                        Ok(item)
                    }
                }
                .boxed()
            },
        )
        .await;
        assert!(result.is_err());
    }

    #[test]
    fn cached_asset_expiry() {
        let mut asset = CachedAsset::<u32>::default();
        assert!(asset.fresh_value(Duration::from_secs(60)).is_none());
        asset.store(5);
        assert_eq!(asset.fresh_value(Duration::from_secs(60)), Some(5));
        asset.expire();
        assert!(asset.fresh_value(Duration::from_secs(60)).is_none());
    }

    #[tokio::test]
    async fn users_are_cached_until_flushed() {
        let api = Arc::new(fake::FakeGithub::new());
        api.add_member("alice");
        let mirror = RemoteMirror::new(api.clone(), 3600, 1);

        assert!(mirror.users().await.unwrap().contains("alice"));
        api.add_member("bob");
        // Still served from cache.
        assert!(!mirror.users().await.unwrap().contains("bob"));

        mirror.flush_cache().await;
        assert!(mirror.users().await.unwrap().contains("bob"));
    }

    #[tokio::test]
    async fn users_teams_flush_leaves_repositories_cached() {
        let api = Arc::new(fake::FakeGithub::new());
        api.add_team("dev", &[]);
        api.add_repository("svc");
        let mirror = RemoteMirror::new(api.clone(), 3600, 1);

        assert!(mirror.teams().await.unwrap().contains_key("dev"));
        assert!(mirror.repositories().await.unwrap().contains_key("svc"));

        let dev_id = api.team("dev").unwrap().id;
        api.set_team_parent("dev", Some(dev_id + 100));
        api.add_repository("svc2");

        mirror.flush_cache_users_teams_only().await;
        let teams = mirror.teams().await.unwrap();
        assert_eq!(teams["dev"].parent_id, Some(dev_id + 100));
        // Repositories were not flushed.
        assert!(!mirror.repositories().await.unwrap().contains_key("svc2"));
    }

    #[tokio::test]
    async fn environments_are_fetched_lazily_and_memoized() {
        let api = Arc::new(fake::FakeGithub::new());
        api.add_repository("svc");
        api.set_environments(
            "svc",
            BTreeMap::from([(
                "production".to_string(),
                BTreeMap::from([("REGION".to_string(), "eu-west-1".to_string())]),
            )]),
        );
        let mirror = RemoteMirror::new(api.clone(), 3600, 1);

        let environments = mirror.environments("svc").await.unwrap();
        assert_eq!(environments["production"]["REGION"], "eu-west-1");

        // Memoized: a change on the API side is not observed.
        api.set_environments("svc", EnvironmentMap::new());
        let environments = mirror.environments("svc").await.unwrap();
        assert!(environments.contains_key("production"));
    }

    #[tokio::test]
    async fn app_installations_are_cached() {
        let api = Arc::new(fake::FakeGithub::new());
        api.add_app("release-bot", 42);
        let mirror = RemoteMirror::new(api, 3600, 1);
        assert_eq!(mirror.app_installations().await.unwrap()["release-bot"], 42);
    }

    #[tokio::test]
    async fn dry_run_mutations_update_snapshot_only() {
        let api = Arc::new(fake::FakeGithub::new());
        let mirror = RemoteMirror::new(api.clone(), 3600, 1);

        // Load the snapshot, then mutate in dry-run.
        assert!(mirror.teams().await.unwrap().is_empty());
        mirror
            .create_team(true, "new", &["alice".to_string()])
            .await
            .unwrap();

        let teams = mirror.teams().await.unwrap();
        assert!(teams.contains_key("new"));
        assert_eq!(teams["new"].members["alice"], TeamRole::Member);
        // GitHub itself was not touched.
        assert!(api.team("new").is_none());
    }

    #[tokio::test]
    async fn rename_moves_the_snapshot_record() {
        let api = Arc::new(fake::FakeGithub::new());
        api.add_repository("old");
        let mirror = RemoteMirror::new(api.clone(), 3600, 1);

        assert!(mirror.repositories().await.unwrap().contains_key("old"));
        mirror.rename_repository(false, "old", "new").await.unwrap();

        let repositories = mirror.repositories().await.unwrap();
        assert!(!repositories.contains_key("old"));
        assert_eq!(repositories["new"].name, "new");
        assert!(api.repository_names().contains("new"));
    }
}
