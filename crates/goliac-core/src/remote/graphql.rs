//! GraphQL queries and response decoding for the bulk listings.
//!
//! Responses are decoded defensively from `serde_json::Value`: unknown
//! rule types or malformed nodes are skipped with a log line instead of
//! failing the whole listing.

use log::warn;
use serde_json::Value;
use std::collections::BTreeMap;

use super::types::{RemoteBranchProtection, RemoteRuleset, RepoPermission};
use crate::model::repository::BranchProtection;
use crate::model::ruleset::{
    BypassActor, BypassMode, GroupingStrategy, MergeMethod, MergeQueueParameters,
    PatternOperator, PatternParameters, PullRequestParameters, RequiredStatusChecksParameters,
    Rule, RuleEnforcement, RulesetConditions, RulesetDefinition,
};

/// Paginated organization member listing.
pub const ORG_MEMBERS_QUERY: &str = r#"
query($login: String!, $cursor: String) {
  organization(login: $login) {
    membersWithRole(first: 100, after: $cursor) {
      nodes { login }
      pageInfo { hasNextPage endCursor }
    }
  }
}
"#;

/// Paginated team listing with parent ids.
pub const TEAMS_QUERY: &str = r#"
query($login: String!, $cursor: String) {
  organization(login: $login) {
    teams(first: 100, after: $cursor) {
      nodes {
        databaseId
        name
        slug
        parentTeam { databaseId }
      }
      pageInfo { hasNextPage endCursor }
    }
  }
}
"#;

/// Paginated repository listing with flags, collaborators, rulesets and
/// branch protections.
pub const REPOSITORIES_QUERY: &str = r#"
query($login: String!, $cursor: String) {
  organization(login: $login) {
    repositories(first: 50, after: $cursor) {
      nodes {
        databaseId
        id
        name
        visibility
        isArchived
        autoMergeAllowed
        deleteBranchOnMerge
        allowUpdateBranch
        defaultBranchRef { name }
        direct: collaborators(affiliation: DIRECT, first: 100) {
          edges { permission node { login } }
        }
        outside: collaborators(affiliation: OUTSIDE, first: 100) {
          edges { permission node { login } }
        }
        rulesets(first: 50) {
          nodes {
            databaseId
            name
            enforcement
            conditions {
              refName { include exclude }
            }
            bypassActors(first: 100) {
              nodes {
                bypassMode
                actor {
                  __typename
                  ... on App { databaseId slug }
                  ... on Team { databaseId slug }
                }
              }
            }
            rules(first: 100) {
              nodes { type parameters }
            }
          }
        }
        branchProtectionRules(first: 50) {
          nodes {
            id
            pattern
            requiresApprovingReviews
            requiredApprovingReviewCount
            dismissesStaleReviews
            requiresCodeOwnerReviews
            requireLastPushApproval
            requiresStatusChecks
            requiresStrictStatusChecks
            requiredStatusCheckContexts
            requiresConversationResolution
            requiresCommitSignatures
            requiresLinearHistory
            allowsForcePushes
            allowsDeletions
          }
        }
      }
      pageInfo { hasNextPage endCursor }
    }
  }
}
"#;

/// Paginated organization ruleset listing.
pub const ORG_RULESETS_QUERY: &str = r#"
query($login: String!, $cursor: String) {
  organization(login: $login) {
    rulesets(first: 100, after: $cursor) {
      nodes {
        databaseId
        name
        enforcement
        conditions {
          refName { include exclude }
          repositoryName { include exclude }
        }
        bypassActors(first: 100) {
          nodes {
            bypassMode
            actor {
              __typename
              ... on App { databaseId slug }
              ... on Team { databaseId slug }
            }
          }
        }
        rules(first: 100) {
          nodes { type parameters }
        }
      }
      pageInfo { hasNextPage endCursor }
    }
  }
}
"#;

/// Organization-wide asset totals in one query.
pub const COUNT_ASSETS_QUERY: &str = r#"
query($login: String!) {
  organization(login: $login) {
    membersWithRole { totalCount }
    teams { totalCount }
    repositories { totalCount }
  }
}
"#;

/// Branch protection creation mutation.
pub const CREATE_BRANCH_PROTECTION_MUTATION: &str = r#"
mutation($input: CreateBranchProtectionRuleInput!) {
  createBranchProtectionRule(input: $input) {
    branchProtectionRule { id }
  }
}
"#;

/// Branch protection update mutation.
pub const UPDATE_BRANCH_PROTECTION_MUTATION: &str = r#"
mutation($input: UpdateBranchProtectionRuleInput!) {
  updateBranchProtectionRule(input: $input) {
    branchProtectionRule { id }
  }
}
"#;

/// Branch protection deletion mutation.
pub const DELETE_BRANCH_PROTECTION_MUTATION: &str = r#"
mutation($input: DeleteBranchProtectionRuleInput!) {
  deleteBranchProtectionRule(input: $input) {
    clientMutationId
  }
}
"#;

/// Cursor state of a paginated connection.
pub struct PageInfo {
    pub has_next_page: bool,
    pub end_cursor: Option<String>,
}

/// Reads the `pageInfo` object of a connection.
pub fn page_info(connection: &Value) -> PageInfo {
    PageInfo {
        has_next_page: connection["pageInfo"]["hasNextPage"]
            .as_bool()
            .unwrap_or(false),
        end_cursor: connection["pageInfo"]["endCursor"]
            .as_str()
            .map(str::to_owned),
    }
}

/// Decodes a collaborator connection into login → permission.
pub fn collaborators(connection: &Value) -> BTreeMap<String, RepoPermission> {
    let mut out = BTreeMap::new();
    if let Some(edges) = connection["edges"].as_array() {
        for edge in edges {
            let Some(login) = edge["node"]["login"].as_str() else {
                continue;
            };
            let Some(permission) = edge["permission"]
                .as_str()
                .and_then(|p| RepoPermission::from_rest(&p.to_ascii_lowercase()))
            else {
                continue;
            };
            out.insert(login.to_string(), permission);
        }
    }
    out
}

/// Decodes a branch protection rule node.
pub fn branch_protection_from_node(node: &Value) -> Option<RemoteBranchProtection> {
    let id = node["id"].as_str()?.to_string();
    let pattern = node["pattern"].as_str()?.to_string();
    let contexts = node["requiredStatusCheckContexts"]
        .as_array()
        .map(|items| {
            items
                .iter()
                .filter_map(|item| item.as_str().map(str::to_owned))
                .collect()
        })
        .unwrap_or_default();
    Some(RemoteBranchProtection {
        id,
        protection: BranchProtection {
            pattern,
            requires_approving_reviews: bool_field(node, "requiresApprovingReviews"),
            required_approving_review_count: node["requiredApprovingReviewCount"]
                .as_u64()
                .unwrap_or(0) as u32,
            dismisses_stale_reviews: bool_field(node, "dismissesStaleReviews"),
            requires_code_owner_reviews: bool_field(node, "requiresCodeOwnerReviews"),
            require_last_push_approval: bool_field(node, "requireLastPushApproval"),
            requires_status_checks: bool_field(node, "requiresStatusChecks"),
            requires_strict_status_checks: bool_field(node, "requiresStrictStatusChecks"),
            required_status_check_contexts: contexts,
            requires_conversation_resolution: bool_field(node, "requiresConversationResolution"),
            requires_commit_signatures: bool_field(node, "requiresCommitSignatures"),
            requires_linear_history: bool_field(node, "requiresLinearHistory"),
            allows_force_pushes: bool_field(node, "allowsForcePushes"),
            allows_deletions: bool_field(node, "allowsDeletions"),
        },
    })
}

/// Decodes a ruleset node (repository- or organization-scope).
pub fn ruleset_from_node(node: &Value) -> Option<RemoteRuleset> {
    let name = node["name"].as_str()?.to_string();
    let enforcement = match node["enforcement"].as_str()?.to_ascii_lowercase().as_str() {
        "disabled" => RuleEnforcement::Disabled,
        "active" => RuleEnforcement::Active,
        "evaluate" => RuleEnforcement::Evaluate,
        other => {
            warn!("ruleset {}: unknown enforcement '{}'", name, other);
            return None;
        }
    };

    let mut bypass_apps = Vec::new();
    let mut bypass_teams = Vec::new();
    if let Some(actors) = node["bypassActors"]["nodes"].as_array() {
        for actor in actors {
            let mode = match actor["bypassMode"].as_str() {
                Some("PULL_REQUEST") | Some("pull_request") => BypassMode::PullRequest,
                _ => BypassMode::Always,
            };
            let Some(slug) = actor["actor"]["slug"].as_str() else {
                continue;
            };
            let entry = BypassActor {
                name: slug.to_string(),
                mode,
            };
            match actor["actor"]["__typename"].as_str() {
                Some("App") => bypass_apps.push(entry),
                Some("Team") => bypass_teams.push(entry),
                _ => {}
            }
        }
    }

    let conditions = RulesetConditions {
        include: string_list(&node["conditions"]["refName"]["include"]),
        exclude: string_list(&node["conditions"]["refName"]["exclude"]),
    };
    let repositories = string_list(&node["conditions"]["repositoryName"]["include"])
        .into_iter()
        .collect();

    let mut rules = Vec::new();
    if let Some(rule_nodes) = node["rules"]["nodes"].as_array() {
        for rule_node in rule_nodes {
            if let Some(rule) = rule_from_node(rule_node) {
                rules.push(rule);
            }
        }
    }

    Some(RemoteRuleset {
        id: node["databaseId"].as_u64(),
        name,
        definition: RulesetDefinition {
            enforcement,
            bypass_apps,
            bypass_teams,
            conditions,
            rules,
        },
        repositories,
    })
}

/// Decodes a single typed rule node.
pub fn rule_from_node(node: &Value) -> Option<Rule> {
    let kind = node["type"].as_str()?.to_ascii_lowercase();
    let parameters = &node["parameters"];
    match kind.as_str() {
        "required_signatures" => Some(Rule::RequiredSignatures),
        "creation" => Some(Rule::Creation),
        "update" => Some(Rule::Update),
        "deletion" => Some(Rule::Deletion),
        "non_fast_forward" => Some(Rule::NonFastForward),
        "required_linear_history" => Some(Rule::RequiredLinearHistory),
        "pull_request" => Some(Rule::PullRequest {
            parameters: PullRequestParameters {
                required_approving_review_count: parameters["requiredApprovingReviewCount"]
                    .as_u64()
                    .unwrap_or(0) as u32,
                dismiss_stale_reviews_on_push: bool_field(parameters, "dismissStaleReviewsOnPush"),
                require_code_owner_review: bool_field(parameters, "requireCodeOwnerReview"),
                required_review_thread_resolution: bool_field(
                    parameters,
                    "requiredReviewThreadResolution",
                ),
                require_last_push_approval: bool_field(parameters, "requireLastPushApproval"),
                allowed_merge_methods: merge_methods(&parameters["allowedMergeMethods"]),
            },
        }),
        "required_status_checks" => {
            let checks = parameters["requiredStatusChecks"]
                .as_array()
                .map(|items| {
                    items
                        .iter()
                        .filter_map(|item| {
                            item["context"]
                                .as_str()
                                .or_else(|| item.as_str())
                                .map(str::to_owned)
                        })
                        .collect()
                })
                .unwrap_or_default();
            Some(Rule::RequiredStatusChecks {
                parameters: RequiredStatusChecksParameters {
                    required_status_checks: checks,
                    strict_required_status_checks_policy: bool_field(
                        parameters,
                        "strictRequiredStatusChecksPolicy",
                    ),
                },
            })
        }
        "branch_name_pattern" | "tag_name_pattern" => {
            let pattern_parameters = PatternParameters {
                operator: pattern_operator(parameters["operator"].as_str()?)?,
                pattern: parameters["pattern"].as_str()?.to_string(),
            };
            if kind == "branch_name_pattern" {
                Some(Rule::BranchNamePattern {
                    parameters: pattern_parameters,
                })
            } else {
                Some(Rule::TagNamePattern {
                    parameters: pattern_parameters,
                })
            }
        }
        "merge_queue" => Some(Rule::MergeQueue {
            parameters: MergeQueueParameters {
                check_response_timeout_minutes: parameters["checkResponseTimeoutMinutes"]
                    .as_u64()
                    .unwrap_or(10) as u32,
                grouping_strategy: match parameters["groupingStrategy"].as_str() {
                    Some("HEADGREEN") => GroupingStrategy::Headgreen,
                    _ => GroupingStrategy::Allgreen,
                },
                merge_method: merge_method(parameters["mergeMethod"].as_str().unwrap_or("MERGE"))
                    .unwrap_or(MergeMethod::Merge),
                max_entries_to_build: parameters["maxEntriesToBuild"].as_u64().unwrap_or(5) as u32,
                max_entries_to_merge: parameters["maxEntriesToMerge"].as_u64().unwrap_or(5) as u32,
                min_entries_to_merge: parameters["minEntriesToMerge"].as_u64().unwrap_or(1) as u32,
                min_entries_to_merge_wait_minutes: parameters["minEntriesToMergeWaitMinutes"]
                    .as_u64()
                    .unwrap_or(5) as u32,
            },
        }),
        other => {
            warn!("skipping unknown rule type '{}'", other);
            None
        }
    }
}

/// Builds the input object of the branch protection mutations.
pub fn branch_protection_input(protection: &BranchProtection) -> Value {
    serde_json::json!({
        "pattern": protection.pattern,
        "requiresApprovingReviews": protection.requires_approving_reviews,
        "requiredApprovingReviewCount": protection.required_approving_review_count,
        "dismissesStaleReviews": protection.dismisses_stale_reviews,
        "requiresCodeOwnerReviews": protection.requires_code_owner_reviews,
        "requireLastPushApproval": protection.require_last_push_approval,
        "requiresStatusChecks": protection.requires_status_checks,
        "requiresStrictStatusChecks": protection.requires_strict_status_checks,
        "requiredStatusCheckContexts": protection.required_status_check_contexts,
        "requiresConversationResolution": protection.requires_conversation_resolution,
        "requiresCommitSignatures": protection.requires_commit_signatures,
        "requiresLinearHistory": protection.requires_linear_history,
        "allowsForcePushes": protection.allows_force_pushes,
        "allowsDeletions": protection.allows_deletions,
    })
}

fn bool_field(node: &Value, key: &str) -> bool {
    node[key].as_bool().unwrap_or(false)
}

fn string_list(node: &Value) -> Vec<String> {
    node.as_array()
        .map(|items| {
            items
                .iter()
                .filter_map(|item| item.as_str().map(str::to_owned))
                .collect()
        })
        .unwrap_or_default()
}

fn merge_methods(node: &Value) -> Vec<MergeMethod> {
    let methods: Vec<MergeMethod> = node
        .as_array()
        .map(|items| {
            items
                .iter()
                .filter_map(|item| item.as_str().and_then(merge_method))
                .collect()
        })
        .unwrap_or_default();
    if methods.is_empty() {
        vec![MergeMethod::Merge, MergeMethod::Squash, MergeMethod::Rebase]
    } else {
        methods
    }
}

fn merge_method(value: &str) -> Option<MergeMethod> {
    match value.to_ascii_uppercase().as_str() {
        "MERGE" => Some(MergeMethod::Merge),
        "SQUASH" => Some(MergeMethod::Squash),
        "REBASE" => Some(MergeMethod::Rebase),
        _ => None,
    }
}

fn pattern_operator(value: &str) -> Option<PatternOperator> {
    match value.to_ascii_lowercase().as_str() {
        "starts_with" => Some(PatternOperator::StartsWith),
        "ends_with" => Some(PatternOperator::EndsWith),
        "contains" => Some(PatternOperator::Contains),
        "regex" => Some(PatternOperator::Regex),
        _ => None,
    }
}
