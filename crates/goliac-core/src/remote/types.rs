//! Observed-model types: what the remote mirror knows about the live
//! organization.

use crate::model::repository::{BranchProtection, Visibility};
use crate::model::ruleset::{BypassMode, RulesetDefinition};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use super::lazy::Lazy;

/// Role of a user inside a team.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TeamRole {
    Member,
    Maintainer,
}

impl TeamRole {
    /// The wire representation used by the GitHub API.
    pub fn as_str(&self) -> &'static str {
        match self {
            TeamRole::Member => "member",
            TeamRole::Maintainer => "maintainer",
        }
    }
}

/// Normalized repository permission.
///
/// GitHub's REST permission vocabulary collapses to three levels:
/// `pull`/`triage` → read, `push`/`maintain` → write, `admin` → admin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Deserialize, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RepoPermission {
    Read,
    Write,
    Admin,
}

impl RepoPermission {
    /// Parses a REST permission string.
    pub fn from_rest(permission: &str) -> Option<Self> {
        match permission {
            "pull" | "triage" | "read" => Some(RepoPermission::Read),
            "push" | "maintain" | "write" => Some(RepoPermission::Write),
            "admin" => Some(RepoPermission::Admin),
            _ => None,
        }
    }

    /// The REST representation used when granting.
    pub fn as_rest(&self) -> &'static str {
        match self {
            RepoPermission::Read => "pull",
            RepoPermission::Write => "push",
            RepoPermission::Admin => "admin",
        }
    }
}

/// An observed team.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteTeam {
    /// Numeric team id.
    pub id: u64,
    /// Display name.
    pub name: String,
    /// GitHub slug; the identity used throughout the mirror.
    pub slug: String,
    /// Numeric id of the parent team, if any.
    pub parent_id: Option<u64>,
    /// Member login → role.
    pub members: BTreeMap<String, TeamRole>,
}

/// An observed branch protection rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteBranchProtection {
    /// GraphQL node id of the rule.
    pub id: String,
    /// The rule settings.
    pub protection: BranchProtection,
}

/// An observed ruleset (organization- or repository-scope).
///
/// Bypass actors are carried by name (app slug, team slug); numeric actor
/// ids are resolved only when talking to the API.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RemoteRuleset {
    /// Ruleset id; `None` for a ruleset materialized from the declaration
    /// that does not exist remotely yet.
    pub id: Option<u64>,
    /// Ruleset name.
    pub name: String,
    /// Enforcement, bypass actors, conditions and rules.
    pub definition: RulesetDefinition,
    /// Repositories targeted by an organization-scope ruleset.
    pub repositories: BTreeSet<String>,
}

impl RemoteRuleset {
    /// Equality used when diffing: definition equivalence plus the
    /// targeted repository set.
    pub fn equivalent(&self, other: &RemoteRuleset) -> bool {
        self.definition.equivalent(&other.definition) && self.repositories == other.repositories
    }
}

/// A bypass actor resolved to its numeric id, ready for the API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WireBypassActor {
    pub actor_id: u64,
    pub actor_type: &'static str,
    pub bypass_mode: BypassMode,
}

/// Environment name → variables.
pub type EnvironmentMap = BTreeMap<String, BTreeMap<String, String>>;

/// Variable name → value.
pub type VariableMap = BTreeMap<String, String>;

/// An observed repository.
#[derive(Debug, Clone)]
pub struct RemoteRepository {
    /// Numeric repository id.
    pub id: u64,
    /// GraphQL node id, needed for branch protection mutations.
    pub node_id: String,
    /// Repository name.
    pub name: String,
    pub visibility: Visibility,
    pub archived: bool,
    pub allow_auto_merge: bool,
    pub delete_branch_on_merge: bool,
    pub allow_update_branch: bool,
    /// Name of the default branch.
    pub default_branch: String,
    /// Team slug → permission, loaded by the fan-out stage.
    pub team_permissions: BTreeMap<String, RepoPermission>,
    /// Direct (organization member) collaborators.
    pub internal_collaborators: BTreeMap<String, RepoPermission>,
    /// Outside collaborators.
    pub outside_collaborators: BTreeMap<String, RepoPermission>,
    /// Repository-scope rulesets by name.
    pub rulesets: BTreeMap<String, RemoteRuleset>,
    /// Branch protections by pattern.
    pub branch_protections: BTreeMap<String, RemoteBranchProtection>,
    /// Environments and their variables, fetched on first access.
    pub environments: Arc<Lazy<EnvironmentMap>>,
    /// Repository actions variables, fetched on first access.
    pub variables: Arc<Lazy<VariableMap>>,
}

impl RemoteRepository {
    /// An empty repository record, as the mirror synthesizes after a
    /// dry-run create.
    pub fn synthetic(name: impl Into<String>) -> Self {
        Self {
            id: 0,
            node_id: String::new(),
            name: name.into(),
            visibility: Visibility::Private,
            archived: false,
            allow_auto_merge: false,
            delete_branch_on_merge: false,
            allow_update_branch: false,
            default_branch: "main".to_string(),
            team_permissions: BTreeMap::new(),
            internal_collaborators: BTreeMap::new(),
            outside_collaborators: BTreeMap::new(),
            rulesets: BTreeMap::new(),
            branch_protections: BTreeMap::new(),
            environments: Arc::new(Lazy::preloaded(EnvironmentMap::new())),
            variables: Arc::new(Lazy::preloaded(VariableMap::new())),
        }
    }
}

/// Mutable boolean repository properties.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepoBoolProperty {
    Archived,
    AllowAutoMerge,
    DeleteBranchOnMerge,
    AllowUpdateBranch,
}

impl RepoBoolProperty {
    /// The PATCH body key of the property.
    pub fn as_str(&self) -> &'static str {
        match self {
            RepoBoolProperty::Archived => "archived",
            RepoBoolProperty::AllowAutoMerge => "allow_auto_merge",
            RepoBoolProperty::DeleteBranchOnMerge => "delete_branch_on_merge",
            RepoBoolProperty::AllowUpdateBranch => "allow_update_branch",
        }
    }
}

/// Organization-wide asset totals, used to initialize progress reporting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AssetTotals {
    pub users: usize,
    pub teams: usize,
    pub repositories: usize,
}

impl AssetTotals {
    /// Sum over all asset classes.
    pub fn total(&self) -> usize {
        self.users + self.teams + self.repositories
    }
}

/// Callback invoked as paginated batches land, e.g. to feed a dashboard
/// progress bar.
pub trait ProgressObserver: Send + Sync {
    /// Announces the expected total across all asset classes.
    fn expect(&self, total: usize);
    /// Reports a loaded batch for one asset class.
    fn loaded(&self, asset: &str, count: usize);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn permission_normalization() {
        assert_eq!(RepoPermission::from_rest("pull"), Some(RepoPermission::Read));
        assert_eq!(RepoPermission::from_rest("triage"), Some(RepoPermission::Read));
        assert_eq!(RepoPermission::from_rest("push"), Some(RepoPermission::Write));
        assert_eq!(RepoPermission::from_rest("maintain"), Some(RepoPermission::Write));
        assert_eq!(RepoPermission::from_rest("admin"), Some(RepoPermission::Admin));
        assert_eq!(RepoPermission::from_rest("owner"), None);
    }

    #[test]
    fn permission_round_trip() {
        for permission in [RepoPermission::Read, RepoPermission::Write, RepoPermission::Admin] {
            assert_eq!(RepoPermission::from_rest(permission.as_rest()), Some(permission));
        }
    }

    #[test]
    fn ruleset_equivalence_includes_repositories() {
        let mut a = RemoteRuleset {
            id: Some(1),
            name: "default".into(),
            ..Default::default()
        };
        let mut b = a.clone();
        b.id = None;
        assert!(a.equivalent(&b));

        a.repositories.insert("svc".into());
        assert!(!a.equivalent(&b));
    }

    #[test]
    fn asset_totals_sum() {
        let totals = AssetTotals {
            users: 2,
            teams: 3,
            repositories: 5,
        };
        assert_eq!(totals.total(), 10);
    }
}
