//! The reconciliator: diffs the declared model against the observed
//! mirror and emits the minimal command stream to the executor.
//!
//! Passes run strictly in order (users, teams, repositories, repositories
//! to delete, organization rulesets); within a pass, commands are emitted
//! in deterministic name order. Destructive operations are gated per
//! category and the whole cycle is bounded by the change cap.

pub mod comparable;
mod cycle;

pub use cycle::{CycleState, ReconciliationRunner};

use log::{debug, info};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use crate::cancel::CancelFlag;
use crate::errors::{ErrorCollection, SyncError};
use crate::executor::ReconciliationExecutor;
use crate::model::team::{EVERYONE_TEAM_NAME, slugify};
use crate::model::{DeclaredModel, Team};
use crate::remote::{
    ApiError, CreateRepositoryRequest, RemoteMirror, RemoteRepository, RemoteRuleset,
    RepoBoolProperty, RepoPermission, TeamRole, WireBypassActor,
};
use comparable::RepoView;

/// What a reconciliation pass produced besides the command stream.
#[derive(Debug, Clone, Default)]
pub struct ReconcileOutcome {
    /// Number of commands emitted.
    pub commands: usize,
    /// Observed repositories slated for archiving instead of deletion.
    pub to_archive: BTreeSet<String>,
    /// Renames applied this cycle (old name → new name).
    pub repos_to_rename: BTreeMap<String, String>,
}

/// Counts emitted commands against the per-cycle cap.
struct CommandBudget {
    emitted: usize,
    max: usize,
}

impl CommandBudget {
    fn charge(&mut self) -> Result<(), SyncError> {
        if self.emitted >= self.max {
            return Err(SyncError::policy(format!(
                "change cap exceeded: more than {} mutations needed",
                self.max
            )));
        }
        self.emitted += 1;
        Ok(())
    }
}

/// A declared team projected for diffing: slug identity, member logins,
/// and the paired synthetic owner team.
struct TeamView {
    name: String,
    slug: String,
    members: BTreeMap<String, TeamRole>,
    parent_slug: Option<String>,
    externally_managed: bool,
    owner_team: Option<OwnerTeamView>,
}

struct OwnerTeamView {
    name: String,
    slug: String,
    members: BTreeMap<String, TeamRole>,
}

/// Bypass-actor resolution context (installed app ids, observed team ids).
struct ActorContext {
    app_ids: BTreeMap<String, u64>,
    team_ids: BTreeMap<String, u64>,
}

/// Diffs declared against observed state and emits commands.
pub struct Reconciliator {
    mirror: Arc<RemoteMirror>,
    executor: Arc<dyn ReconciliationExecutor>,
    teams_repo: String,
    owner_team_suffix: String,
    manage_actions_variables: bool,
    dry_run: bool,
}

impl Reconciliator {
    /// Creates a reconciliator emitting to the given executor.
    ///
    /// `teams_repo` is the name of the teams repository itself, which is
    /// never deleted.
    pub fn new(
        mirror: Arc<RemoteMirror>,
        executor: Arc<dyn ReconciliationExecutor>,
        teams_repo: impl Into<String>,
        owner_team_suffix: impl Into<String>,
    ) -> Self {
        Self {
            mirror,
            executor,
            teams_repo: teams_repo.into(),
            owner_team_suffix: owner_team_suffix.into(),
            manage_actions_variables: false,
            dry_run: false,
        }
    }

    /// Enables environment and actions-variable management.
    pub fn manage_actions_variables(mut self, enabled: bool) -> Self {
        self.manage_actions_variables = enabled;
        self
    }

    /// Suppresses GitHub writes; the mirror is still updated.
    pub fn dry_run(mut self, enabled: bool) -> Self {
        self.dry_run = enabled;
        self
    }

    /// Runs one full reconciliation: `begin`, the ordered passes, then
    /// `commit` (or `rollback` on any fatal error).
    pub async fn reconcile(
        &self,
        model: &DeclaredModel,
        errors: &ErrorCollection,
        cancel: &CancelFlag,
    ) -> Result<ReconcileOutcome, SyncError> {
        self.executor.begin(self.dry_run).await;

        let mut outcome = ReconcileOutcome::default();
        let mut budget = CommandBudget {
            emitted: 0,
            max: model.config.max_changesets,
        };
        let result = self
            .run_passes(model, errors, cancel, &mut budget, &mut outcome)
            .await;
        outcome.commands = budget.emitted;

        match result {
            Ok(()) if !errors.has_errors() => {
                info!("reconciliation emitted {} commands", outcome.commands);
                self.executor.commit(self.dry_run).await;
                Ok(outcome)
            }
            Ok(()) => {
                let error = errors
                    .first_error()
                    .unwrap_or_else(|| SyncError::policy("reconciliation failed"));
                self.executor.rollback(self.dry_run, &error).await;
                Err(error)
            }
            Err(error) => {
                errors.add_error(error.clone());
                self.executor.rollback(self.dry_run, &error).await;
                Err(error)
            }
        }
    }

    async fn run_passes(
        &self,
        model: &DeclaredModel,
        errors: &ErrorCollection,
        cancel: &CancelFlag,
        budget: &mut CommandBudget,
        outcome: &mut ReconcileOutcome,
    ) -> Result<(), SyncError> {
        self.checkpoint(errors, cancel)?;
        self.sync_users(model, budget).await?;
        self.checkpoint(errors, cancel)?;
        self.sync_teams(model, budget).await?;
        self.checkpoint(errors, cancel)?;
        let actors = self.actor_context().await?;
        self.sync_repositories(model, budget, outcome, &actors).await?;
        self.checkpoint(errors, cancel)?;
        self.sync_repositories_to_delete(model, budget, outcome).await?;
        self.checkpoint(errors, cancel)?;
        self.sync_org_rulesets(model, budget, outcome, &actors).await?;
        Ok(())
    }

    fn checkpoint(&self, errors: &ErrorCollection, cancel: &CancelFlag) -> Result<(), SyncError> {
        if cancel.is_cancelled() {
            return Err(SyncError::Cancelled);
        }
        if errors.has_errors() {
            return Err(errors
                .first_error()
                .unwrap_or_else(|| SyncError::policy("errors recorded")));
        }
        Ok(())
    }

    // --- pass 1: users --------------------------------------------------

    async fn sync_users(
        &self,
        model: &DeclaredModel,
        budget: &mut CommandBudget,
    ) -> Result<(), SyncError> {
        let observed = self.mirror.users().await.map_err(fetch("users"))?;
        let declared: BTreeSet<String> =
            model.managed_users().map(|user| user.github_id.clone()).collect();

        for login in &declared {
            if !observed.contains(login) {
                budget.charge()?;
                self.executor.add_user_to_org(login).await;
            }
        }
        if model.config.destructive_operations.users {
            for login in &observed {
                if !declared.contains(login) {
                    budget.charge()?;
                    self.executor.remove_user_from_org(login).await;
                }
            }
        }
        Ok(())
    }

    // --- pass 2: teams --------------------------------------------------

    async fn sync_teams(
        &self,
        model: &DeclaredModel,
        budget: &mut CommandBudget,
    ) -> Result<(), SyncError> {
        let observed = self.mirror.teams().await.map_err(fetch("teams"))?;
        let views = self.declared_team_views(model);
        let everyone = self.everyone_view(model);
        let mut created: BTreeSet<String> = BTreeSet::new();

        // 2a: create missing teams, each paired with its owner team.
        for view in &views {
            if !observed.contains_key(&view.slug) {
                budget.charge()?;
                self.executor
                    .create_team(&view.name, &member_list(&view.members))
                    .await;
                created.insert(view.slug.clone());
            }
            if let Some(owner) = &view.owner_team
                && !observed.contains_key(&owner.slug)
            {
                budget.charge()?;
                self.executor
                    .create_team(&owner.name, &member_list(&owner.members))
                    .await;
                created.insert(owner.slug.clone());
            }
        }
        if let Some(everyone) = &everyone
            && !observed.contains_key(EVERYONE_TEAM_NAME)
        {
            budget.charge()?;
            self.executor
                .create_team(EVERYONE_TEAM_NAME, &member_list(everyone))
                .await;
            created.insert(EVERYONE_TEAM_NAME.to_string());
        }

        // Re-read the snapshot: an applying executor has registered the
        // creations in the mirror, so freshly created teams take part in
        // the re-parenting pass within the same cycle.
        let observed = self.mirror.teams().await.map_err(fetch("teams"))?;

        // 2b: membership deltas. Teams created this cycle are already
        // complete; externally managed teams are left alone.
        for view in &views {
            if view.externally_managed {
                continue;
            }
            if !created.contains(&view.slug)
                && let Some(observed_team) = observed.get(&view.slug)
            {
                self.sync_team_members(&view.slug, &view.members, &observed_team.members, budget)
                    .await?;
            }
            if let Some(owner) = &view.owner_team
                && !created.contains(&owner.slug)
                && let Some(observed_team) = observed.get(&owner.slug)
            {
                self.sync_team_members(&owner.slug, &owner.members, &observed_team.members, budget)
                    .await?;
            }
        }
        if let Some(everyone) = &everyone
            && !created.contains(EVERYONE_TEAM_NAME)
            && let Some(observed_team) = observed.get(EVERYONE_TEAM_NAME)
        {
            self.sync_team_members(EVERYONE_TEAM_NAME, everyone, &observed_team.members, budget)
                .await?;
        }

        // 2c: re-parenting. A declared parent name is translated to the
        // observed team's numeric id; a parent that is still unresolvable
        // converges on the next cycle.
        for view in &views {
            let Some(observed_team) = observed.get(&view.slug) else {
                continue;
            };
            let declared_parent = match &view.parent_slug {
                Some(parent_slug) => match observed.get(parent_slug) {
                    Some(parent) => Some(parent.id),
                    None => continue,
                },
                None => None,
            };
            if observed_team.parent_id != declared_parent {
                budget.charge()?;
                self.executor
                    .update_team_set_parent(&view.slug, declared_parent)
                    .await;
            }
        }

        // 2d: delete observed teams absent from the declaration.
        if model.config.destructive_operations.teams {
            let mut keep: BTreeSet<String> = views.iter().map(|view| view.slug.clone()).collect();
            keep.extend(
                views
                    .iter()
                    .filter_map(|view| view.owner_team.as_ref().map(|owner| owner.slug.clone())),
            );
            if everyone.is_some() {
                keep.insert(EVERYONE_TEAM_NAME.to_string());
            }
            let base_slugs: BTreeSet<&str> = views.iter().map(|view| view.slug.as_str()).collect();
            let admin_slug = slugify(&model.config.admin_team);

            for slug in observed.keys() {
                if keep.contains(slug) || *slug == admin_slug {
                    continue;
                }
                // An owner team survives as long as its root team exists.
                if let Some(root) = slug.strip_suffix(&self.owner_team_suffix)
                    && base_slugs.contains(root)
                {
                    continue;
                }
                budget.charge()?;
                self.executor.delete_team(slug).await;
            }
        }
        Ok(())
    }

    async fn sync_team_members(
        &self,
        slug: &str,
        declared: &BTreeMap<String, TeamRole>,
        observed: &BTreeMap<String, TeamRole>,
        budget: &mut CommandBudget,
    ) -> Result<(), SyncError> {
        let mut current = observed.clone();
        for (login, role) in declared {
            match current.remove(login) {
                Some(observed_role) if observed_role != *role => {
                    budget.charge()?;
                    self.executor
                        .update_team_update_member(slug, login, *role)
                        .await;
                }
                Some(_) => {}
                None => {
                    budget.charge()?;
                    self.executor.update_team_add_member(slug, login, *role).await;
                }
            }
        }
        // Whatever remains is not declared anymore.
        for login in current.keys() {
            budget.charge()?;
            self.executor.update_team_remove_member(slug, login).await;
        }
        Ok(())
    }

    fn declared_team_views(&self, model: &DeclaredModel) -> Vec<TeamView> {
        let mut views: Vec<TeamView> = model
            .teams
            .values()
            .map(|team| {
                let members = logins(model, team.owners.iter().chain(team.members.iter()));
                let owner_team = (!team.externally_managed).then(|| {
                    let slug = format!("{}{}", team.slug(), self.owner_team_suffix);
                    OwnerTeamView {
                        name: slug.clone(),
                        slug,
                        members: logins(model, team.owners.iter()),
                    }
                });
                TeamView {
                    name: team.name.clone(),
                    slug: team.slug(),
                    members,
                    parent_slug: team.parent_team.as_ref().map(|parent| {
                        model
                            .teams
                            .get(parent)
                            .map(|team| team.slug())
                            .unwrap_or_else(|| slugify(parent))
                    }),
                    externally_managed: team.externally_managed,
                    owner_team,
                }
            })
            .collect();
        // Parents sort before children; lexical within one level.
        views.sort_by(|a, b| {
            team_depth(model, &a.name)
                .cmp(&team_depth(model, &b.name))
                .then_with(|| a.name.cmp(&b.name))
        });
        views
    }

    fn everyone_view(&self, model: &DeclaredModel) -> Option<BTreeMap<String, TeamRole>> {
        model
            .config
            .everyone_team_enabled
            .then(|| logins(model, model.managed_users().map(|user| &user.name)))
    }

    // --- pass 3: repositories -------------------------------------------

    async fn sync_repositories(
        &self,
        model: &DeclaredModel,
        budget: &mut CommandBudget,
        outcome: &mut ReconcileOutcome,
        actors: &ActorContext,
    ) -> Result<(), SyncError> {
        let observed = self.mirror.repositories().await.map_err(fetch("repositories"))?;

        for (name, repo) in &model.repositories {
            // Resolve the observed record, accepting a rename already
            // applied remotely but not yet reflected in the declaration.
            let (record, mut effective) = match observed.get(name) {
                Some(record) => (Some(record), name.clone()),
                None => match repo
                    .spec
                    .rename_to
                    .as_ref()
                    .and_then(|target| observed.get(target).map(|record| (record, target.clone())))
                {
                    Some((record, target)) => (Some(record), target),
                    None => (None, name.clone()),
                },
            };

            let Some(record) = record else {
                // Absent remotely. Archived repositories are not created
                // just to be archived.
                if repo.spec.archived {
                    continue;
                }
                budget.charge()?;
                self.executor
                    .create_repository(&create_request(repo, model))
                    .await;
                continue;
            };

            if let Some(target) = &repo.spec.rename_to
                && effective == *name
            {
                budget.charge()?;
                self.executor.rename_repository(name, target).await;
                outcome
                    .repos_to_rename
                    .insert(name.clone(), target.clone());
                effective = target.clone();
            }

            self.diff_repository(&effective, repo, record, model, budget, actors)
                .await?;
        }
        Ok(())
    }

    async fn diff_repository(
        &self,
        name: &str,
        repo: &crate::model::Repository,
        record: &RemoteRepository,
        model: &DeclaredModel,
        budget: &mut CommandBudget,
        actors: &ActorContext,
    ) -> Result<(), SyncError> {
        // Archiving is terminal: the owner keeps write access so the team
        // still sees the repository, and nothing else is reconciled.
        if repo.spec.archived {
            if !record.archived {
                budget.charge()?;
                self.executor
                    .update_repository_update_bool_property(name, RepoBoolProperty::Archived, true)
                    .await;
            }
            return Ok(());
        }
        if record.archived {
            budget.charge()?;
            self.executor
                .update_repository_update_bool_property(name, RepoBoolProperty::Archived, false)
                .await;
        }

        let declared = RepoView::declared(repo, model, self.manage_actions_variables);
        let observed = RepoView::observed(record, &self.mirror, self.manage_actions_variables)
            .await
            .map_err(fetch("repository details"))?;

        if declared.visibility != observed.visibility {
            budget.charge()?;
            self.executor
                .update_repository_set_visibility(name, declared.visibility)
                .await;
        }
        if declared.default_branch != observed.default_branch {
            budget.charge()?;
            self.executor
                .update_repository_set_default_branch(name, &declared.default_branch)
                .await;
        }
        for (property, declared_value, observed_value) in [
            (
                RepoBoolProperty::AllowAutoMerge,
                declared.allow_auto_merge,
                observed.allow_auto_merge,
            ),
            (
                RepoBoolProperty::DeleteBranchOnMerge,
                declared.delete_branch_on_merge,
                observed.delete_branch_on_merge,
            ),
            (
                RepoBoolProperty::AllowUpdateBranch,
                declared.allow_update_branch,
                observed.allow_update_branch,
            ),
        ] {
            if declared_value != observed_value {
                budget.charge()?;
                self.executor
                    .update_repository_update_bool_property(name, property, declared_value)
                    .await;
            }
        }

        // Team grants: a permission change is an explicit remove-then-add.
        for (slug, observed_permission) in &observed.team_grants {
            match declared.team_grants.get(slug) {
                None => {
                    budget.charge()?;
                    self.executor
                        .update_repository_remove_team_access(name, slug)
                        .await;
                }
                Some(permission) if permission != observed_permission => {
                    budget.charge()?;
                    self.executor
                        .update_repository_remove_team_access(name, slug)
                        .await;
                    budget.charge()?;
                    self.executor
                        .update_repository_add_team_access(name, slug, *permission)
                        .await;
                }
                Some(_) => {}
            }
        }
        for (slug, permission) in &declared.team_grants {
            if !observed.team_grants.contains_key(slug) {
                budget.charge()?;
                self.executor
                    .update_repository_add_team_access(name, slug, *permission)
                    .await;
            }
        }

        // Outside collaborators.
        for login in observed.external_users.keys() {
            if !declared.external_users.contains_key(login) {
                budget.charge()?;
                self.executor
                    .update_repository_remove_external_user(name, login)
                    .await;
            }
        }
        for (login, permission) in &declared.external_users {
            if observed.external_users.get(login) != Some(permission) {
                budget.charge()?;
                self.executor
                    .update_repository_set_external_user(name, login, *permission)
                    .await;
            }
        }

        // Access is team-based: stray direct collaborators are removed.
        for login in observed.internal_users.keys() {
            budget.charge()?;
            self.executor
                .update_repository_remove_internal_user(name, login)
                .await;
        }

        // Repository rulesets.
        for (ruleset_name, declared_ruleset) in &declared.rulesets {
            match observed.rulesets.get(ruleset_name) {
                None => {
                    budget.charge()?;
                    self.executor
                        .add_repository_ruleset(
                            name,
                            declared_ruleset,
                            &resolve_bypass_actors(declared_ruleset, actors),
                        )
                        .await;
                }
                Some(observed_ruleset)
                    if !declared_ruleset
                        .definition
                        .equivalent(&observed_ruleset.definition) =>
                {
                    budget.charge()?;
                    self.executor
                        .update_repository_ruleset(
                            name,
                            observed_ruleset.id.unwrap_or(0),
                            declared_ruleset,
                            &resolve_bypass_actors(declared_ruleset, actors),
                        )
                        .await;
                }
                Some(_) => {}
            }
        }
        if model.config.destructive_operations.rulesets {
            for (ruleset_name, observed_ruleset) in &observed.rulesets {
                if !declared.rulesets.contains_key(ruleset_name) {
                    budget.charge()?;
                    self.executor
                        .delete_repository_ruleset(
                            name,
                            ruleset_name,
                            observed_ruleset.id.unwrap_or(0),
                        )
                        .await;
                }
            }
        }

        // Branch protections, by pattern.
        for (pattern, (_, declared_protection)) in &declared.branch_protections {
            match observed.branch_protections.get(pattern) {
                None => {
                    budget.charge()?;
                    self.executor
                        .add_repository_branch_protection(name, declared_protection)
                        .await;
                }
                Some((rule_id, observed_protection))
                    if observed_protection != declared_protection =>
                {
                    budget.charge()?;
                    self.executor
                        .update_repository_branch_protection(
                            name,
                            rule_id.as_deref().unwrap_or_default(),
                            declared_protection,
                        )
                        .await;
                }
                Some(_) => {}
            }
        }
        for (pattern, (rule_id, _)) in &observed.branch_protections {
            if !declared.branch_protections.contains_key(pattern) {
                budget.charge()?;
                self.executor
                    .delete_repository_branch_protection(
                        name,
                        pattern,
                        rule_id.as_deref().unwrap_or_default(),
                    )
                    .await;
            }
        }

        // Environments and their variables.
        if let (Some(declared_envs), Some(observed_envs)) =
            (&declared.environments, &observed.environments)
        {
            for (environment, declared_vars) in declared_envs {
                match observed_envs.get(environment) {
                    None => {
                        budget.charge()?;
                        self.executor
                            .add_repository_environment(name, environment)
                            .await;
                        for (variable, value) in declared_vars {
                            budget.charge()?;
                            self.executor
                                .add_repository_environment_variable(
                                    name,
                                    environment,
                                    variable,
                                    value,
                                )
                                .await;
                        }
                    }
                    Some(observed_vars) => {
                        for (variable, value) in declared_vars {
                            match observed_vars.get(variable) {
                                None => {
                                    budget.charge()?;
                                    self.executor
                                        .add_repository_environment_variable(
                                            name,
                                            environment,
                                            variable,
                                            value,
                                        )
                                        .await;
                                }
                                Some(observed_value) if observed_value != value => {
                                    budget.charge()?;
                                    self.executor
                                        .update_repository_environment_variable(
                                            name,
                                            environment,
                                            variable,
                                            value,
                                        )
                                        .await;
                                }
                                Some(_) => {}
                            }
                        }
                        for variable in observed_vars.keys() {
                            if !declared_vars.contains_key(variable) {
                                budget.charge()?;
                                self.executor
                                    .delete_repository_environment_variable(
                                        name,
                                        environment,
                                        variable,
                                    )
                                    .await;
                            }
                        }
                    }
                }
            }
            for environment in observed_envs.keys() {
                if !declared_envs.contains_key(environment) {
                    budget.charge()?;
                    self.executor
                        .delete_repository_environment(name, environment)
                        .await;
                }
            }
        }

        // Repository actions variables.
        if let (Some(declared_vars), Some(observed_vars)) = (&declared.variables, &observed.variables)
        {
            for (variable, value) in declared_vars {
                match observed_vars.get(variable) {
                    None => {
                        budget.charge()?;
                        self.executor
                            .add_repository_variable(name, variable, value)
                            .await;
                    }
                    Some(observed_value) if observed_value != value => {
                        budget.charge()?;
                        self.executor
                            .update_repository_variable(name, variable, value)
                            .await;
                    }
                    Some(_) => {}
                }
            }
            for variable in observed_vars.keys() {
                if !declared_vars.contains_key(variable) {
                    budget.charge()?;
                    self.executor.delete_repository_variable(name, variable).await;
                }
            }
        }

        Ok(())
    }

    // --- pass 4: repositories to delete ---------------------------------

    async fn sync_repositories_to_delete(
        &self,
        model: &DeclaredModel,
        budget: &mut CommandBudget,
        outcome: &mut ReconcileOutcome,
    ) -> Result<(), SyncError> {
        let observed = self.mirror.repositories().await.map_err(fetch("repositories"))?;
        let mut declared: BTreeSet<String> = model.repositories.keys().cloned().collect();
        declared.extend(outcome.repos_to_rename.values().cloned());

        for (name, record) in &observed {
            if declared.contains(name) || *name == self.teams_repo {
                continue;
            }
            if model.config.archive_on_delete {
                if !record.archived {
                    budget.charge()?;
                    self.executor
                        .update_repository_update_bool_property(
                            name,
                            RepoBoolProperty::Archived,
                            true,
                        )
                        .await;
                }
                outcome.to_archive.insert(name.clone());
            } else if model.config.destructive_operations.repositories {
                budget.charge()?;
                self.executor.delete_repository(name).await;
            }
        }
        Ok(())
    }

    // --- pass 5: organization rulesets ----------------------------------

    async fn sync_org_rulesets(
        &self,
        model: &DeclaredModel,
        budget: &mut CommandBudget,
        outcome: &ReconcileOutcome,
        actors: &ActorContext,
    ) -> Result<(), SyncError> {
        if !self.mirror.is_enterprise() {
            debug!("organization rulesets skipped: not an enterprise endpoint");
            return Ok(());
        }
        let observed = self.mirror.org_rulesets().await.map_err(fetch("rulesets"))?;

        // Materialize the desired rulesets: each config entry attaches a
        // declared ruleset to every repository matching its pattern.
        let mut desired: BTreeMap<String, RemoteRuleset> = BTreeMap::new();
        for entry in &model.config.rulesets {
            let Some(ruleset) = model.rulesets.get(&entry.ruleset) else {
                continue;
            };
            let Ok(glob) = globset::Glob::new(&entry.pattern) else {
                continue;
            };
            let matcher = glob.compile_matcher();
            let matched: BTreeSet<String> = model
                .repositories
                .keys()
                .map(|name| {
                    outcome
                        .repos_to_rename
                        .get(name)
                        .cloned()
                        .unwrap_or_else(|| name.clone())
                })
                .filter(|name| matcher.is_match(name))
                .collect();
            desired
                .entry(ruleset.name.clone())
                .and_modify(|existing| existing.repositories.extend(matched.clone()))
                .or_insert_with(|| RemoteRuleset {
                    id: None,
                    name: ruleset.name.clone(),
                    definition: ruleset.definition.clone(),
                    repositories: matched,
                });
        }

        for (name, ruleset) in &desired {
            match observed.get(name) {
                None => {
                    budget.charge()?;
                    self.executor
                        .add_org_ruleset(ruleset, &resolve_bypass_actors(ruleset, actors))
                        .await;
                }
                Some(observed_ruleset) if !ruleset.equivalent(observed_ruleset) => {
                    budget.charge()?;
                    self.executor
                        .update_org_ruleset(
                            observed_ruleset.id.unwrap_or(0),
                            ruleset,
                            &resolve_bypass_actors(ruleset, actors),
                        )
                        .await;
                }
                Some(_) => {}
            }
        }
        if model.config.destructive_operations.rulesets {
            for (name, observed_ruleset) in &observed {
                if !desired.contains_key(name) {
                    budget.charge()?;
                    self.executor
                        .delete_org_ruleset(name, observed_ruleset.id.unwrap_or(0))
                        .await;
                }
            }
        }
        Ok(())
    }

    async fn actor_context(&self) -> Result<ActorContext, SyncError> {
        let app_ids = self
            .mirror
            .app_installations()
            .await
            .map_err(fetch("app installations"))?;
        let team_ids = self
            .mirror
            .teams()
            .await
            .map_err(fetch("teams"))?
            .into_values()
            .map(|team| (team.slug, team.id))
            .collect();
        Ok(ActorContext { app_ids, team_ids })
    }
}

/// Resolves bypass actors to wire ids: unknown apps are silently dropped,
/// team names are translated through their slugs.
fn resolve_bypass_actors(ruleset: &RemoteRuleset, actors: &ActorContext) -> Vec<WireBypassActor> {
    let mut resolved = Vec::new();
    for app in &ruleset.definition.bypass_apps {
        match actors.app_ids.get(&app.name) {
            Some(id) => resolved.push(WireBypassActor {
                actor_id: *id,
                actor_type: "Integration",
                bypass_mode: app.mode,
            }),
            None => debug!("dropping bypass app '{}': not installed", app.name),
        }
    }
    for team in &ruleset.definition.bypass_teams {
        let slug = slugify(&team.name);
        match actors.team_ids.get(&slug) {
            Some(id) => resolved.push(WireBypassActor {
                actor_id: *id,
                actor_type: "Team",
                bypass_mode: team.mode,
            }),
            None => debug!("dropping bypass team '{}': unknown slug", team.name),
        }
    }
    resolved
}

/// The create-repository request for a declared repository.
fn create_request(repo: &crate::model::Repository, model: &DeclaredModel) -> CreateRepositoryRequest {
    let view = RepoView::declared(repo, model, false);
    let mut writers = Vec::new();
    let mut readers = Vec::new();
    for (slug, permission) in &view.team_grants {
        match permission {
            RepoPermission::Read => readers.push(slug.clone()),
            _ => writers.push(slug.clone()),
        }
    }
    CreateRepositoryRequest {
        name: repo.name.clone(),
        visibility: repo.spec.visibility,
        allow_auto_merge: repo.spec.allow_auto_merge,
        delete_branch_on_merge: repo.spec.delete_branch_on_merge,
        allow_update_branch: repo.spec.allow_update_branch,
        default_branch: repo.default_branch().to_string(),
        writers,
        readers,
        fork_from: repo.spec.fork_from.clone(),
    }
}

fn fetch(asset: &'static str) -> impl FnOnce(ApiError) -> SyncError {
    move |error| SyncError::fetch(asset, error.to_string())
}

/// Declared user names → login map with a uniform member role.
fn logins<'a>(
    model: &DeclaredModel,
    names: impl Iterator<Item = &'a String>,
) -> BTreeMap<String, TeamRole> {
    names
        .filter_map(|name| model.managed_user(name))
        .map(|user| (user.github_id.clone(), TeamRole::Member))
        .collect()
}

fn member_list(members: &BTreeMap<String, TeamRole>) -> Vec<String> {
    members.keys().cloned().collect()
}

/// Depth of a team in the declared hierarchy, bounded against cycles.
fn team_depth(model: &DeclaredModel, name: &str) -> usize {
    let mut depth = 0;
    let mut current: Option<&Team> = model.teams.get(name);
    while let Some(team) = current
        && depth < crate::loader::MAX_TEAM_DEPTH
    {
        match &team.parent_team {
            Some(parent) => {
                depth += 1;
                current = model.teams.get(parent);
            }
            None => break,
        }
    }
    depth
}
