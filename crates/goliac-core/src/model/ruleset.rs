//! Ruleset entities: organization-scope ruleset documents and the inline
//! repository rulesets, sharing one definition shape.
//!
//! Rule parameters collapse into one tagged variant per rule type; equality
//! is implemented per tag (merge methods and status-check lists compare as
//! sets).

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Condition token matching every branch.
pub const CONDITION_ALL: &str = "~ALL";

/// Condition token matching the repository default branch.
pub const CONDITION_DEFAULT_BRANCH: &str = "~DEFAULT_BRANCH";

/// Enforcement level of a ruleset.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleEnforcement {
    /// Ruleset is disabled.
    Disabled,
    /// Ruleset is enforced.
    #[default]
    Active,
    /// Ruleset logs violations without blocking.
    Evaluate,
}

impl RuleEnforcement {
    /// The wire representation used by the GitHub API.
    pub fn as_str(&self) -> &'static str {
        match self {
            RuleEnforcement::Disabled => "disabled",
            RuleEnforcement::Active => "active",
            RuleEnforcement::Evaluate => "evaluate",
        }
    }
}

/// How a bypass actor may skip the ruleset.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BypassMode {
    /// Bypass is always allowed.
    #[default]
    Always,
    /// Bypass is allowed through pull requests only.
    PullRequest,
}

impl BypassMode {
    /// The wire representation used by the GitHub API.
    pub fn as_str(&self) -> &'static str {
        match self {
            BypassMode::Always => "always",
            BypassMode::PullRequest => "pull_request",
        }
    }
}

/// An app or team allowed to bypass a ruleset.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Deserialize, Serialize)]
pub struct BypassActor {
    /// App slug or team name.
    pub name: String,
    /// Bypass mode.
    #[serde(default)]
    pub mode: BypassMode,
}

/// Branch/tag patterns a ruleset applies to.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct RulesetConditions {
    /// Patterns to include (`~ALL` and `~DEFAULT_BRANCH` accepted).
    #[serde(default)]
    pub include: Vec<String>,
    /// Patterns to exclude.
    #[serde(default)]
    pub exclude: Vec<String>,
}

impl RulesetConditions {
    /// Set-compares both pattern lists.
    pub fn equivalent(&self, other: &RulesetConditions) -> bool {
        as_set(&self.include) == as_set(&other.include)
            && as_set(&self.exclude) == as_set(&other.exclude)
    }
}

/// Allowed pull-request merge methods.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize, Serialize,
)]
#[serde(rename_all = "UPPERCASE")]
pub enum MergeMethod {
    /// Merge commit.
    Merge,
    /// Squash merge.
    Squash,
    /// Rebase merge.
    Rebase,
}

impl MergeMethod {
    fn all() -> Vec<MergeMethod> {
        vec![MergeMethod::Merge, MergeMethod::Squash, MergeMethod::Rebase]
    }
}

/// Parameters of the `pull_request` rule.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct PullRequestParameters {
    pub required_approving_review_count: u32,
    pub dismiss_stale_reviews_on_push: bool,
    pub require_code_owner_review: bool,
    pub required_review_thread_resolution: bool,
    pub require_last_push_approval: bool,
    pub allowed_merge_methods: Vec<MergeMethod>,
}

impl Default for PullRequestParameters {
    fn default() -> Self {
        Self {
            required_approving_review_count: 0,
            dismiss_stale_reviews_on_push: false,
            require_code_owner_review: false,
            required_review_thread_resolution: false,
            require_last_push_approval: false,
            allowed_merge_methods: MergeMethod::all(),
        }
    }
}

/// Parameters of the `required_status_checks` rule.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct RequiredStatusChecksParameters {
    pub required_status_checks: Vec<String>,
    pub strict_required_status_checks_policy: bool,
}

/// Comparison operator of name-pattern rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PatternOperator {
    StartsWith,
    EndsWith,
    Contains,
    Regex,
}

impl PatternOperator {
    /// The wire representation used by the GitHub API.
    pub fn as_str(&self) -> &'static str {
        match self {
            PatternOperator::StartsWith => "starts_with",
            PatternOperator::EndsWith => "ends_with",
            PatternOperator::Contains => "contains",
            PatternOperator::Regex => "regex",
        }
    }
}

/// Parameters of the `branch_name_pattern` / `tag_name_pattern` rules.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct PatternParameters {
    pub operator: PatternOperator,
    pub pattern: String,
}

/// Merge-queue grouping strategy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum GroupingStrategy {
    /// Every queued entry must be green.
    #[default]
    Allgreen,
    /// Only the head of the queue must be green.
    Headgreen,
}

/// Parameters of the `merge_queue` rule.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct MergeQueueParameters {
    pub check_response_timeout_minutes: u32,
    pub grouping_strategy: GroupingStrategy,
    pub merge_method: MergeMethod,
    pub max_entries_to_build: u32,
    pub max_entries_to_merge: u32,
    pub min_entries_to_merge: u32,
    pub min_entries_to_merge_wait_minutes: u32,
}

impl Default for MergeQueueParameters {
    fn default() -> Self {
        Self {
            check_response_timeout_minutes: 10,
            grouping_strategy: GroupingStrategy::Allgreen,
            merge_method: MergeMethod::Merge,
            max_entries_to_build: 5,
            max_entries_to_merge: 5,
            min_entries_to_merge: 1,
            min_entries_to_merge_wait_minutes: 5,
        }
    }
}

/// A typed rule inside a ruleset.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Rule {
    RequiredSignatures,
    Creation,
    Update,
    Deletion,
    NonFastForward,
    RequiredLinearHistory,
    PullRequest {
        #[serde(default)]
        parameters: PullRequestParameters,
    },
    RequiredStatusChecks {
        #[serde(default)]
        parameters: RequiredStatusChecksParameters,
    },
    BranchNamePattern {
        parameters: PatternParameters,
    },
    TagNamePattern {
        parameters: PatternParameters,
    },
    MergeQueue {
        #[serde(default)]
        parameters: MergeQueueParameters,
    },
}

impl Rule {
    /// The rule type tag as it appears on the wire.
    pub fn kind(&self) -> &'static str {
        match self {
            Rule::RequiredSignatures => "required_signatures",
            Rule::Creation => "creation",
            Rule::Update => "update",
            Rule::Deletion => "deletion",
            Rule::NonFastForward => "non_fast_forward",
            Rule::RequiredLinearHistory => "required_linear_history",
            Rule::PullRequest { .. } => "pull_request",
            Rule::RequiredStatusChecks { .. } => "required_status_checks",
            Rule::BranchNamePattern { .. } => "branch_name_pattern",
            Rule::TagNamePattern { .. } => "tag_name_pattern",
            Rule::MergeQueue { .. } => "merge_queue",
        }
    }

    /// Rule-type-specific equality.
    ///
    /// Allowed merge methods and required status checks compare as sets;
    /// everything else compares structurally.
    pub fn equivalent(&self, other: &Rule) -> bool {
        match (self, other) {
            (
                Rule::PullRequest { parameters: a },
                Rule::PullRequest { parameters: b },
            ) => {
                a.required_approving_review_count == b.required_approving_review_count
                    && a.dismiss_stale_reviews_on_push == b.dismiss_stale_reviews_on_push
                    && a.require_code_owner_review == b.require_code_owner_review
                    && a.required_review_thread_resolution == b.required_review_thread_resolution
                    && a.require_last_push_approval == b.require_last_push_approval
                    && a.allowed_merge_methods.iter().collect::<BTreeSet<_>>()
                        == b.allowed_merge_methods.iter().collect::<BTreeSet<_>>()
            }
            (
                Rule::RequiredStatusChecks { parameters: a },
                Rule::RequiredStatusChecks { parameters: b },
            ) => {
                a.strict_required_status_checks_policy == b.strict_required_status_checks_policy
                    && as_set(&a.required_status_checks) == as_set(&b.required_status_checks)
            }
            (a, b) => a == b,
        }
    }

    /// Validates parameter constraints that serde cannot express.
    pub fn validate(&self) -> Result<(), String> {
        match self {
            Rule::BranchNamePattern { parameters } | Rule::TagNamePattern { parameters } => {
                if parameters.pattern.is_empty() {
                    return Err(format!("{}: pattern must not be empty", self.kind()));
                }
                if parameters.operator == PatternOperator::Regex {
                    regex::Regex::new(&format!("^(?:{})$", parameters.pattern))
                        .map_err(|e| format!("{}: invalid regex: {}", self.kind(), e))?;
                }
                Ok(())
            }
            Rule::PullRequest { parameters } => {
                if parameters.allowed_merge_methods.is_empty() {
                    return Err("pull_request: allowed_merge_methods must not be empty".into());
                }
                Ok(())
            }
            _ => Ok(()),
        }
    }
}

/// Set-compares two rule lists using per-tag equality.
pub fn rules_equivalent(a: &[Rule], b: &[Rule]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().all(|ra| b.iter().any(|rb| ra.equivalent(rb)))
        && b.iter().all(|rb| a.iter().any(|ra| ra.equivalent(rb)))
}

/// The shared shape of organization rulesets and inline repository rulesets.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct RulesetDefinition {
    #[serde(default)]
    pub enforcement: RuleEnforcement,
    #[serde(default)]
    pub bypass_apps: Vec<BypassActor>,
    #[serde(default)]
    pub bypass_teams: Vec<BypassActor>,
    #[serde(default)]
    pub conditions: RulesetConditions,
    #[serde(default)]
    pub rules: Vec<Rule>,
}

impl RulesetDefinition {
    /// Definition-level equality with rule-type-specific parameter
    /// comparison and set semantics for bypass actors and conditions.
    pub fn equivalent(&self, other: &RulesetDefinition) -> bool {
        self.enforcement == other.enforcement
            && self.bypass_apps.iter().collect::<BTreeSet<_>>()
                == other.bypass_apps.iter().collect::<BTreeSet<_>>()
            && self.bypass_teams.iter().collect::<BTreeSet<_>>()
                == other.bypass_teams.iter().collect::<BTreeSet<_>>()
            && self.conditions.equivalent(&other.conditions)
            && rules_equivalent(&self.rules, &other.rules)
    }

    /// Validates every rule of the definition.
    pub fn validate(&self) -> Result<(), String> {
        for rule in &self.rules {
            rule.validate()?;
        }
        Ok(())
    }
}

/// An organization-scope `kind: Ruleset` document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Ruleset {
    /// The ruleset name (file basename stem).
    pub name: String,
    /// The ruleset definition.
    pub definition: RulesetDefinition,
}

/// An inline ruleset declared on a repository.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct RepositoryRuleset {
    pub name: String,
    #[serde(flatten)]
    pub definition: RulesetDefinition,
}

fn as_set(items: &[String]) -> BTreeSet<&str> {
    items.iter().map(String::as_str).collect()
}
