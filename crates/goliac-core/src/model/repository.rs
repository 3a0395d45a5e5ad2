//! Repository entities: visibility, access grants, branch protections,
//! environments and actions variables.

use super::ruleset::RepositoryRuleset;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Repository visibility.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    Public,
    #[default]
    Private,
    Internal,
}

impl Visibility {
    /// The wire representation used by the GitHub API.
    pub fn as_str(&self) -> &'static str {
        match self {
            Visibility::Public => "public",
            Visibility::Private => "private",
            Visibility::Internal => "internal",
        }
    }
}

/// A legacy per-pattern branch protection.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct BranchProtection {
    pub pattern: String,
    pub requires_approving_reviews: bool,
    pub required_approving_review_count: u32,
    pub dismisses_stale_reviews: bool,
    pub requires_code_owner_reviews: bool,
    pub require_last_push_approval: bool,
    pub requires_status_checks: bool,
    pub requires_strict_status_checks: bool,
    pub required_status_check_contexts: Vec<String>,
    pub requires_conversation_resolution: bool,
    pub requires_commit_signatures: bool,
    pub requires_linear_history: bool,
    pub allows_force_pushes: bool,
    pub allows_deletions: bool,
}

/// A deployment environment carrying variables. Secrets are not managed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct Environment {
    pub name: String,
    #[serde(default)]
    pub variables: BTreeMap<String, String>,
}

/// The `spec` payload of a `kind: Repository` document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct RepositorySpec {
    pub visibility: Visibility,
    pub allow_auto_merge: bool,
    pub delete_branch_on_merge: bool,
    pub allow_update_branch: bool,
    pub archived: bool,
    pub default_branch_name: Option<String>,
    /// Teams with write access, by declared team name.
    pub writers: Vec<String>,
    /// Teams with read access, by declared team name.
    pub readers: Vec<String>,
    /// External users with write access, by declared user name.
    pub external_user_writers: Vec<String>,
    /// External users with read access, by declared user name.
    pub external_user_readers: Vec<String>,
    pub rulesets: Vec<RepositoryRuleset>,
    pub branch_protections: Vec<BranchProtection>,
    pub environments: Vec<Environment>,
    pub actions_variables: BTreeMap<String, String>,
    /// Requests an in-place rename to this name.
    pub rename_to: Option<String>,
    /// `org/repo` source to fork from at creation.
    pub fork_from: Option<String>,
}

/// A declared repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Repository {
    /// The repository name (file basename stem).
    pub name: String,
    /// The owning team name; `None` for repositories under `archived/`.
    pub owner: Option<String>,
    /// The declared payload.
    pub spec: RepositorySpec,
}

impl Repository {
    /// The declared default branch, falling back to `main`.
    pub fn default_branch(&self) -> &str {
        self.spec.default_branch_name.as_deref().unwrap_or("main")
    }
}

/// Applies the normalization GitHub performs on repository names: any
/// character outside `[A-Za-z0-9._-]` becomes `-`.
///
/// A declared name must survive this normalization unchanged.
pub fn normalize_repository_name(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '.' || c == '_' || c == '-' {
                c
            } else {
                '-'
            }
        })
        .collect()
}

/// Validates a `fork_from` source: `org/repo`, with an optional
/// `https://github.com/` prefix and `.git` suffix stripped first.
///
/// Returns the normalized `org/repo` value.
pub fn normalize_fork_source(source: &str) -> Result<String, String> {
    let stripped = source.strip_prefix("https://github.com/").unwrap_or(source);
    let stripped = stripped.strip_suffix(".git").unwrap_or(stripped);
    let re = regex::Regex::new("^[^/]+/[^/]+$").expect("fork source pattern");
    if re.is_match(stripped) {
        Ok(stripped.to_string())
    } else {
        Err(format!("'{}' is not of the form org/repo", source))
    }
}
