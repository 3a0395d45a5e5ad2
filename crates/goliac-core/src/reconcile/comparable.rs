//! The comparable repository view: declared and observed repositories
//! projected onto one shape, so the diff is a field-by-field walk.

use std::collections::BTreeMap;

use crate::model::DeclaredModel;
use crate::model::repository::{BranchProtection, Repository, Visibility};
use crate::model::team::{EVERYONE_TEAM_NAME, slugify};
use crate::remote::{
    ApiError, EnvironmentMap, RemoteMirror, RemoteRepository, RemoteRuleset, RepoPermission,
    VariableMap,
};

/// Both sides of a repository diff, in one shape.
#[derive(Debug, Clone, Default)]
pub struct RepoView {
    pub visibility: Visibility,
    pub archived: bool,
    pub allow_auto_merge: bool,
    pub delete_branch_on_merge: bool,
    pub allow_update_branch: bool,
    pub default_branch: String,
    /// Team slug → permission.
    pub team_grants: BTreeMap<String, RepoPermission>,
    /// Outside collaborator login → permission.
    pub external_users: BTreeMap<String, RepoPermission>,
    /// Direct (organization member) collaborator login → permission.
    pub internal_users: BTreeMap<String, RepoPermission>,
    /// Rulesets by name.
    pub rulesets: BTreeMap<String, RemoteRuleset>,
    /// Branch protections by pattern, with the remote rule id when known.
    pub branch_protections: BTreeMap<String, (Option<String>, BranchProtection)>,
    /// Environments with variables; `None` when unmanaged.
    pub environments: Option<EnvironmentMap>,
    /// Actions variables; `None` when unmanaged.
    pub variables: Option<VariableMap>,
}

impl RepoView {
    /// Projects a declared repository.
    ///
    /// The owning team is granted write access; with the everyone team
    /// enabled, every repository is readable by `everyone`.
    pub fn declared(
        repo: &Repository,
        model: &DeclaredModel,
        manage_variables: bool,
    ) -> Self {
        let mut team_grants = BTreeMap::new();
        for writer in &repo.spec.writers {
            team_grants.insert(team_slug(model, writer), RepoPermission::Write);
        }
        for reader in &repo.spec.readers {
            team_grants
                .entry(team_slug(model, reader))
                .or_insert(RepoPermission::Read);
        }
        if let Some(owner) = &repo.owner {
            team_grants.insert(team_slug(model, owner), RepoPermission::Write);
        }
        if model.config.everyone_team_enabled {
            team_grants
                .entry(EVERYONE_TEAM_NAME.to_string())
                .or_insert(RepoPermission::Read);
        }

        let mut external_users = BTreeMap::new();
        for writer in &repo.spec.external_user_writers {
            if let Some(user) = model.external_users.get(writer) {
                external_users.insert(user.github_id.clone(), RepoPermission::Write);
            }
        }
        for reader in &repo.spec.external_user_readers {
            if let Some(user) = model.external_users.get(reader) {
                external_users
                    .entry(user.github_id.clone())
                    .or_insert(RepoPermission::Read);
            }
        }

        let rulesets = repo
            .spec
            .rulesets
            .iter()
            .map(|ruleset| {
                (
                    ruleset.name.clone(),
                    RemoteRuleset {
                        id: None,
                        name: ruleset.name.clone(),
                        definition: ruleset.definition.clone(),
                        repositories: Default::default(),
                    },
                )
            })
            .collect();

        let branch_protections = repo
            .spec
            .branch_protections
            .iter()
            .map(|protection| (protection.pattern.clone(), (None, protection.clone())))
            .collect();

        let (environments, variables) = if manage_variables {
            let environments = repo
                .spec
                .environments
                .iter()
                .map(|environment| (environment.name.clone(), environment.variables.clone()))
                .collect();
            (Some(environments), Some(repo.spec.actions_variables.clone()))
        } else {
            (None, None)
        };

        Self {
            visibility: repo.spec.visibility,
            archived: repo.spec.archived,
            allow_auto_merge: repo.spec.allow_auto_merge,
            delete_branch_on_merge: repo.spec.delete_branch_on_merge,
            allow_update_branch: repo.spec.allow_update_branch,
            default_branch: repo.default_branch().to_string(),
            team_grants,
            external_users,
            internal_users: BTreeMap::new(),
            rulesets,
            branch_protections,
            environments,
            variables,
        }
    }

    /// Projects an observed repository record, triggering the lazy
    /// environment/variable sub-loads only when they are managed.
    pub async fn observed(
        record: &RemoteRepository,
        mirror: &RemoteMirror,
        manage_variables: bool,
    ) -> Result<Self, ApiError> {
        let (environments, variables) = if manage_variables {
            (
                Some(mirror.environments(&record.name).await?),
                Some(mirror.repository_variables(&record.name).await?),
            )
        } else {
            (None, None)
        };
        Ok(Self {
            visibility: record.visibility,
            archived: record.archived,
            allow_auto_merge: record.allow_auto_merge,
            delete_branch_on_merge: record.delete_branch_on_merge,
            allow_update_branch: record.allow_update_branch,
            default_branch: record.default_branch.clone(),
            team_grants: record.team_permissions.clone(),
            external_users: record.outside_collaborators.clone(),
            internal_users: record.internal_collaborators.clone(),
            rulesets: record.rulesets.clone(),
            branch_protections: record
                .branch_protections
                .iter()
                .map(|(pattern, protection)| {
                    (
                        pattern.clone(),
                        (Some(protection.id.clone()), protection.protection.clone()),
                    )
                })
                .collect(),
            environments,
            variables,
        })
    }
}

/// The slug of a declared team name, preferring the declared team record.
fn team_slug(model: &DeclaredModel, name: &str) -> String {
    model
        .teams
        .get(name)
        .map(|team| team.slug())
        .unwrap_or_else(|| slugify(name))
}
