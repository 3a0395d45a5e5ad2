//! GitHub API implementation backed by octocrab.
//!
//! Bulk listings go through GraphQL with cursor pagination; mutations and
//! pagination-heavy per-entity reads go through REST. Every cursor loop is
//! bounded by [`MAX_PAGINATION_LOOPS`] to contain runaway queries.

use async_trait::async_trait;
use http::StatusCode;
use log::{debug, info, warn};
use octocrab::Octocrab;
use serde_json::{Value, json};
use std::collections::BTreeMap;
use std::sync::Arc;

use super::client::{ApiError, CreateRepositoryRequest, GithubApi};
use super::graphql;
use super::lazy::Lazy;
use super::types::{
    AssetTotals, EnvironmentMap, RemoteRepository, RemoteRuleset, RemoteTeam, RepoBoolProperty,
    RepoPermission, TeamRole, VariableMap, WireBypassActor,
};
use crate::model::repository::{BranchProtection, Visibility};
use crate::model::ruleset::Rule;

/// Hard safety cap on cursor/page loops.
pub const MAX_PAGINATION_LOOPS: usize = 100;

/// Minimum GitHub Enterprise Server version with organization rulesets.
const MIN_GHES_RULESET_VERSION: (u64, u64) = (3, 11);

/// The octocrab-backed [`GithubApi`] implementation.
pub struct OctocrabApi {
    client: Octocrab,
    org: String,
    enterprise: bool,
}

impl OctocrabApi {
    /// Wraps an authenticated client and probes the endpoint for
    /// enterprise capabilities.
    pub async fn connect(client: Octocrab, org: impl Into<String>) -> Self {
        let org = org.into();
        let enterprise = detect_enterprise(&client, &org).await;
        info!(
            "connected to organization {} (enterprise: {})",
            org, enterprise
        );
        Self {
            client,
            org,
            enterprise,
        }
    }

    /// Test/bench constructor with an explicit enterprise flag.
    pub fn with_enterprise(client: Octocrab, org: impl Into<String>, enterprise: bool) -> Self {
        Self {
            client,
            org: org.into(),
            enterprise,
        }
    }

    /// Runs a paginated GraphQL query, handing each connection object to
    /// the callback.
    async fn graphql_paginated(
        &self,
        query: &'static str,
        connection_key: &'static str,
        mut on_page: impl FnMut(&Value) + Send,
    ) -> Result<(), ApiError> {
        let mut cursor: Option<String> = None;
        for _ in 0..MAX_PAGINATION_LOOPS {
            let response: Value = self
                .client
                .graphql(&json!({
                    "query": query,
                    "variables": {"login": self.org, "cursor": cursor},
                }))
                .await
                .map_err(api_error)?;
            let connection = &response["data"]["organization"][connection_key];
            if connection.is_null() {
                return Err(ApiError::decode(format!(
                    "missing organization.{} in GraphQL response",
                    connection_key
                )));
            }
            on_page(connection);
            let info = graphql::page_info(connection);
            if !info.has_next_page {
                return Ok(());
            }
            cursor = info.end_cursor;
        }
        Err(ApiError::PaginationCap(connection_key))
    }

    /// Runs a page-numbered REST listing, collecting array items.
    ///
    /// `route` must not carry query parameters; `extra_query` is appended
    /// verbatim. When `items_key` is set, each page is an object wrapping
    /// the array under that key.
    async fn rest_paginated(
        &self,
        route: &str,
        extra_query: &str,
        items_key: Option<&str>,
        asset: &'static str,
    ) -> Result<Vec<Value>, ApiError> {
        let mut out = Vec::new();
        for page in 1..=MAX_PAGINATION_LOOPS {
            let url = format!("{}?per_page=100&page={}{}", route, page, extra_query);
            let response: Value = self.client.get(&url, None::<&()>).await.map_err(api_error)?;
            let items = match items_key {
                Some(key) => response[key].as_array().cloned().unwrap_or_default(),
                None => response.as_array().cloned().unwrap_or_default(),
            };
            let count = items.len();
            out.extend(items);
            if count < 100 {
                return Ok(out);
            }
        }
        Err(ApiError::PaginationCap(asset))
    }

    async fn put_unit(&self, route: String, body: Option<&Value>) -> Result<(), ApiError> {
        let response = self.client._put(route, body).await.map_err(api_error)?;
        octocrab::map_github_error(response).await.map_err(api_error)?;
        Ok(())
    }

    async fn patch_unit(&self, route: String, body: &Value) -> Result<(), ApiError> {
        let response = self
            .client
            ._patch(route, Some(body))
            .await
            .map_err(api_error)?;
        octocrab::map_github_error(response).await.map_err(api_error)?;
        Ok(())
    }

    async fn post_unit(&self, route: String, body: &Value) -> Result<(), ApiError> {
        let response = self
            .client
            ._post(route, Some(body))
            .await
            .map_err(api_error)?;
        octocrab::map_github_error(response).await.map_err(api_error)?;
        Ok(())
    }

    async fn delete_unit(&self, route: String) -> Result<(), ApiError> {
        let response = self
            .client
            ._delete(route, None::<&()>)
            .await
            .map_err(api_error)?;
        octocrab::map_github_error(response).await.map_err(api_error)?;
        Ok(())
    }

    /// Loads one membership role page set for a team.
    async fn members_with_role(
        &self,
        slug: &str,
        role: TeamRole,
    ) -> Result<Vec<String>, ApiError> {
        let route = format!("/orgs/{}/teams/{}/members", self.org, slug);
        let items = self
            .rest_paginated(&route, &format!("&role={}", role.as_str()), None, "team members")
            .await?;
        Ok(items
            .iter()
            .filter_map(|item| item["login"].as_str().map(str::to_owned))
            .collect())
    }

    /// The REST payload shared by ruleset create/update.
    fn ruleset_payload(
        &self,
        ruleset: &RemoteRuleset,
        bypass_actors: &[WireBypassActor],
        org_scope: bool,
    ) -> Value {
        let mut conditions = json!({
            "ref_name": {
                "include": ruleset.definition.conditions.include,
                "exclude": ruleset.definition.conditions.exclude,
            }
        });
        if org_scope {
            conditions["repository_name"] = json!({
                "include": ruleset.repositories.iter().collect::<Vec<_>>(),
                "exclude": [],
            });
        }
        json!({
            "name": ruleset.name,
            "target": "branch",
            "enforcement": ruleset.definition.enforcement.as_str(),
            "bypass_actors": bypass_actors
                .iter()
                .map(|actor| json!({
                    "actor_id": actor.actor_id,
                    "actor_type": actor.actor_type,
                    "bypass_mode": actor.bypass_mode.as_str(),
                }))
                .collect::<Vec<_>>(),
            "conditions": conditions,
            "rules": rules_payload(&ruleset.definition.rules),
        })
    }
}

/// Converts typed rules into the REST wire shape.
///
/// The only divergence from the serde representation is
/// `required_status_checks`, which the REST API wants as objects.
fn rules_payload(rules: &[Rule]) -> Vec<Value> {
    rules
        .iter()
        .map(|rule| match rule {
            Rule::RequiredStatusChecks { parameters } => json!({
                "type": "required_status_checks",
                "parameters": {
                    "required_status_checks": parameters
                        .required_status_checks
                        .iter()
                        .map(|context| json!({"context": context}))
                        .collect::<Vec<_>>(),
                    "strict_required_status_checks_policy":
                        parameters.strict_required_status_checks_policy,
                }
            }),
            other => serde_json::to_value(other).unwrap_or_else(|_| json!({})),
        })
        .collect()
}

/// Probes for GitHub Enterprise: a GHES `/api/v3` meta endpoint with an
/// installed version of at least 3.11, or an organization on the
/// `enterprise` plan.
async fn detect_enterprise(client: &Octocrab, org: &str) -> bool {
    if let Ok(meta) = client.get::<Value, _, _>("/api/v3", None::<&()>).await
        && let Some(version) = meta["installed_version"].as_str()
    {
        let mut parts = version.split('.').filter_map(|p| p.parse::<u64>().ok());
        let major = parts.next().unwrap_or(0);
        let minor = parts.next().unwrap_or(0);
        if (major, minor) >= MIN_GHES_RULESET_VERSION {
            return true;
        }
    }
    match client
        .get::<Value, _, _>(format!("/orgs/{}", org), None::<&()>)
        .await
    {
        Ok(organization) => organization["plan"]["name"]
            .as_str()
            .is_some_and(|plan| plan.eq_ignore_ascii_case("enterprise")),
        Err(e) => {
            warn!("enterprise probe failed for {}: {}", org, e);
            false
        }
    }
}

fn extract_status_code(error: &octocrab::Error) -> Option<StatusCode> {
    match error {
        octocrab::Error::GitHub { source, .. } => Some(source.status_code),
        _ => None,
    }
}

fn api_error(error: octocrab::Error) -> ApiError {
    match extract_status_code(&error) {
        Some(status) => ApiError::Api {
            status: status.as_u16(),
            message: error.to_string(),
        },
        None => ApiError::Network(error.to_string()),
    }
}

fn visibility_from_str(value: &str) -> Visibility {
    match value.to_ascii_lowercase().as_str() {
        "public" => Visibility::Public,
        "internal" => Visibility::Internal,
        _ => Visibility::Private,
    }
}

#[async_trait]
impl GithubApi for OctocrabApi {
    async fn org_members(&self) -> Result<Vec<String>, ApiError> {
        let mut members = Vec::new();
        self.graphql_paginated(graphql::ORG_MEMBERS_QUERY, "membersWithRole", |connection| {
            if let Some(nodes) = connection["nodes"].as_array() {
                for node in nodes {
                    if let Some(login) = node["login"].as_str() {
                        members.push(login.to_string());
                    }
                }
            }
        })
        .await?;
        debug!("fetched {} organization members", members.len());
        Ok(members)
    }

    async fn teams(&self) -> Result<Vec<RemoteTeam>, ApiError> {
        let mut teams = Vec::new();
        self.graphql_paginated(graphql::TEAMS_QUERY, "teams", |connection| {
            if let Some(nodes) = connection["nodes"].as_array() {
                for node in nodes {
                    let (Some(id), Some(name), Some(slug)) = (
                        node["databaseId"].as_u64(),
                        node["name"].as_str(),
                        node["slug"].as_str(),
                    ) else {
                        continue;
                    };
                    teams.push(RemoteTeam {
                        id,
                        name: name.to_string(),
                        slug: slug.to_string(),
                        parent_id: node["parentTeam"]["databaseId"].as_u64(),
                        members: BTreeMap::new(),
                    });
                }
            }
        })
        .await?;
        debug!("fetched {} teams", teams.len());
        Ok(teams)
    }

    async fn team_members(&self, slug: &str) -> Result<BTreeMap<String, TeamRole>, ApiError> {
        let mut members = BTreeMap::new();
        for login in self.members_with_role(slug, TeamRole::Maintainer).await? {
            members.insert(login, TeamRole::Maintainer);
        }
        for login in self.members_with_role(slug, TeamRole::Member).await? {
            members.insert(login, TeamRole::Member);
        }
        Ok(members)
    }

    async fn repositories(&self) -> Result<Vec<RemoteRepository>, ApiError> {
        let mut repositories = Vec::new();
        self.graphql_paginated(graphql::REPOSITORIES_QUERY, "repositories", |connection| {
            if let Some(nodes) = connection["nodes"].as_array() {
                for node in nodes {
                    let (Some(id), Some(node_id), Some(name)) = (
                        node["databaseId"].as_u64(),
                        node["id"].as_str(),
                        node["name"].as_str(),
                    ) else {
                        continue;
                    };
                    let mut rulesets = BTreeMap::new();
                    if let Some(ruleset_nodes) = node["rulesets"]["nodes"].as_array() {
                        for ruleset_node in ruleset_nodes {
                            if let Some(ruleset) = graphql::ruleset_from_node(ruleset_node) {
                                rulesets.insert(ruleset.name.clone(), ruleset);
                            }
                        }
                    }
                    let mut branch_protections = BTreeMap::new();
                    if let Some(protection_nodes) =
                        node["branchProtectionRules"]["nodes"].as_array()
                    {
                        for protection_node in protection_nodes {
                            if let Some(protection) =
                                graphql::branch_protection_from_node(protection_node)
                            {
                                branch_protections
                                    .insert(protection.protection.pattern.clone(), protection);
                            }
                        }
                    }
                    repositories.push(RemoteRepository {
                        id,
                        node_id: node_id.to_string(),
                        name: name.to_string(),
                        visibility: visibility_from_str(
                            node["visibility"].as_str().unwrap_or("private"),
                        ),
                        archived: node["isArchived"].as_bool().unwrap_or(false),
                        allow_auto_merge: node["autoMergeAllowed"].as_bool().unwrap_or(false),
                        delete_branch_on_merge: node["deleteBranchOnMerge"]
                            .as_bool()
                            .unwrap_or(false),
                        allow_update_branch: node["allowUpdateBranch"].as_bool().unwrap_or(false),
                        default_branch: node["defaultBranchRef"]["name"]
                            .as_str()
                            .unwrap_or("main")
                            .to_string(),
                        team_permissions: BTreeMap::new(),
                        internal_collaborators: graphql::collaborators(&node["direct"]),
                        outside_collaborators: graphql::collaborators(&node["outside"]),
                        rulesets,
                        branch_protections,
                        environments: Arc::new(Lazy::new()),
                        variables: Arc::new(Lazy::new()),
                    });
                }
            }
        })
        .await?;
        debug!("fetched {} repositories", repositories.len());
        Ok(repositories)
    }

    async fn repository_team_permissions(
        &self,
        repo: &str,
    ) -> Result<BTreeMap<String, RepoPermission>, ApiError> {
        let route = format!("/repos/{}/{}/teams", self.org, repo);
        let items = self.rest_paginated(&route, "", None, "repository teams").await?;
        let mut permissions = BTreeMap::new();
        for item in items {
            let (Some(slug), Some(permission)) = (
                item["slug"].as_str(),
                item["permission"]
                    .as_str()
                    .and_then(RepoPermission::from_rest),
            ) else {
                continue;
            };
            permissions.insert(slug.to_string(), permission);
        }
        Ok(permissions)
    }

    async fn org_rulesets(&self) -> Result<Vec<RemoteRuleset>, ApiError> {
        let mut rulesets = Vec::new();
        self.graphql_paginated(graphql::ORG_RULESETS_QUERY, "rulesets", |connection| {
            if let Some(nodes) = connection["nodes"].as_array() {
                for node in nodes {
                    if let Some(ruleset) = graphql::ruleset_from_node(node) {
                        rulesets.push(ruleset);
                    }
                }
            }
        })
        .await?;
        debug!("fetched {} organization rulesets", rulesets.len());
        Ok(rulesets)
    }

    async fn app_installations(&self) -> Result<BTreeMap<String, u64>, ApiError> {
        let route = format!("/orgs/{}/installations", self.org);
        let items = self
            .rest_paginated(&route, "", Some("installations"), "app installations")
            .await?;
        let mut installations = BTreeMap::new();
        for item in items {
            if let (Some(slug), Some(app_id)) =
                (item["app_slug"].as_str(), item["app_id"].as_u64())
            {
                installations.insert(slug.to_string(), app_id);
            }
        }
        Ok(installations)
    }

    async fn environments(&self, repo: &str) -> Result<EnvironmentMap, ApiError> {
        let route = format!("/repos/{}/{}/environments", self.org, repo);
        let items = self
            .rest_paginated(&route, "", Some("environments"), "environments")
            .await?;
        let mut environments = EnvironmentMap::new();
        for item in items {
            let Some(name) = item["name"].as_str() else {
                continue;
            };
            let variables_route = format!(
                "/repos/{}/{}/environments/{}/variables",
                self.org, repo, name
            );
            let variable_items = self
                .rest_paginated(&variables_route, "", Some("variables"), "environment variables")
                .await?;
            let mut variables = VariableMap::new();
            for variable in variable_items {
                if let (Some(var_name), Some(value)) =
                    (variable["name"].as_str(), variable["value"].as_str())
                {
                    variables.insert(var_name.to_string(), value.to_string());
                }
            }
            environments.insert(name.to_string(), variables);
        }
        Ok(environments)
    }

    async fn repository_variables(&self, repo: &str) -> Result<VariableMap, ApiError> {
        let route = format!("/repos/{}/{}/actions/variables", self.org, repo);
        let items = self
            .rest_paginated(&route, "", Some("variables"), "repository variables")
            .await?;
        let mut variables = VariableMap::new();
        for item in items {
            if let (Some(name), Some(value)) = (item["name"].as_str(), item["value"].as_str()) {
                variables.insert(name.to_string(), value.to_string());
            }
        }
        Ok(variables)
    }

    async fn count_assets(&self) -> Result<AssetTotals, ApiError> {
        let response: Value = self
            .client
            .graphql(&json!({
                "query": graphql::COUNT_ASSETS_QUERY,
                "variables": {"login": self.org},
            }))
            .await
            .map_err(api_error)?;
        let organization = &response["data"]["organization"];
        Ok(AssetTotals {
            users: organization["membersWithRole"]["totalCount"]
                .as_u64()
                .unwrap_or(0) as usize,
            teams: organization["teams"]["totalCount"].as_u64().unwrap_or(0) as usize,
            repositories: organization["repositories"]["totalCount"]
                .as_u64()
                .unwrap_or(0) as usize,
        })
    }

    fn is_enterprise(&self) -> bool {
        self.enterprise
    }

    async fn add_user_to_org(&self, login: &str) -> Result<(), ApiError> {
        self.put_unit(
            format!("/orgs/{}/memberships/{}", self.org, login),
            Some(&json!({"role": "member"})),
        )
        .await
    }

    async fn remove_user_from_org(&self, login: &str) -> Result<(), ApiError> {
        self.delete_unit(format!("/orgs/{}/memberships/{}", self.org, login))
            .await
    }

    async fn create_team(&self, name: &str, members: &[String]) -> Result<RemoteTeam, ApiError> {
        let created: Value = self
            .client
            .post(
                format!("/orgs/{}/teams", self.org),
                Some(&json!({"name": name, "privacy": "closed"})),
            )
            .await
            .map_err(api_error)?;
        let (Some(id), Some(slug)) = (created["id"].as_u64(), created["slug"].as_str()) else {
            return Err(ApiError::decode("team creation response carries no id/slug"));
        };
        let slug = slug.to_string();
        let mut team_members = BTreeMap::new();
        for login in members {
            self.update_team_add_member(&slug, login, TeamRole::Member)
                .await?;
            team_members.insert(login.clone(), TeamRole::Member);
        }
        Ok(RemoteTeam {
            id,
            name: name.to_string(),
            slug,
            parent_id: None,
            members: team_members,
        })
    }

    async fn update_team_add_member(
        &self,
        slug: &str,
        login: &str,
        role: TeamRole,
    ) -> Result<(), ApiError> {
        self.put_unit(
            format!("/orgs/{}/teams/{}/memberships/{}", self.org, slug, login),
            Some(&json!({"role": role.as_str()})),
        )
        .await
    }

    async fn update_team_update_member(
        &self,
        slug: &str,
        login: &str,
        role: TeamRole,
    ) -> Result<(), ApiError> {
        // Same endpoint as adding; GitHub flips the role in place.
        self.update_team_add_member(slug, login, role).await
    }

    async fn update_team_remove_member(&self, slug: &str, login: &str) -> Result<(), ApiError> {
        self.delete_unit(format!(
            "/orgs/{}/teams/{}/memberships/{}",
            self.org, slug, login
        ))
        .await
    }

    async fn update_team_set_parent(
        &self,
        slug: &str,
        parent_id: Option<u64>,
    ) -> Result<(), ApiError> {
        self.patch_unit(
            format!("/orgs/{}/teams/{}", self.org, slug),
            &json!({"parent_team_id": parent_id}),
        )
        .await
    }

    async fn delete_team(&self, slug: &str) -> Result<(), ApiError> {
        self.delete_unit(format!("/orgs/{}/teams/{}", self.org, slug))
            .await
    }

    async fn create_repository(&self, request: &CreateRepositoryRequest) -> Result<(), ApiError> {
        match &request.fork_from {
            Some(source) => {
                self.post_unit(
                    format!("/repos/{}/forks", source),
                    &json!({"organization": self.org, "name": request.name}),
                )
                .await?;
            }
            None => {
                self.post_unit(
                    format!("/orgs/{}/repos", self.org),
                    &json!({
                        "name": request.name,
                        "visibility": request.visibility.as_str(),
                        "private": request.visibility != Visibility::Public,
                        "allow_auto_merge": request.allow_auto_merge,
                        "delete_branch_on_merge": request.delete_branch_on_merge,
                        "allow_update_branch": request.allow_update_branch,
                        "auto_init": true,
                        "default_branch": request.default_branch,
                    }),
                )
                .await?;
            }
        }
        for writer in &request.writers {
            self.update_repository_add_team_access(&request.name, writer, RepoPermission::Write)
                .await?;
        }
        for reader in &request.readers {
            self.update_repository_add_team_access(&request.name, reader, RepoPermission::Read)
                .await?;
        }
        Ok(())
    }

    async fn update_repository_add_team_access(
        &self,
        repo: &str,
        team_slug: &str,
        permission: RepoPermission,
    ) -> Result<(), ApiError> {
        self.put_unit(
            format!(
                "/orgs/{}/teams/{}/repos/{}/{}",
                self.org, team_slug, self.org, repo
            ),
            Some(&json!({"permission": permission.as_rest()})),
        )
        .await
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
        self.delete_unit(format!(
            "/orgs/{}/teams/{}/repos/{}/{}",
            self.org, team_slug, self.org, repo
        ))
        .await
    }

    async fn update_repository_update_bool_property(
        &self,
        repo: &str,
        property: RepoBoolProperty,
        value: bool,
    ) -> Result<(), ApiError> {
        self.patch_unit(
            format!("/repos/{}/{}", self.org, repo),
            &json!({property.as_str(): value}),
        )
        .await
    }

    async fn update_repository_set_default_branch(
        &self,
        repo: &str,
        branch: &str,
    ) -> Result<(), ApiError> {
        self.patch_unit(
            format!("/repos/{}/{}", self.org, repo),
            &json!({"default_branch": branch}),
        )
        .await
    }

    async fn update_repository_set_visibility(
        &self,
        repo: &str,
        visibility: Visibility,
    ) -> Result<(), ApiError> {
        self.patch_unit(
            format!("/repos/{}/{}", self.org, repo),
            &json!({"visibility": visibility.as_str()}),
        )
        .await
    }

    async fn update_repository_set_external_user(
        &self,
        repo: &str,
        login: &str,
        permission: RepoPermission,
    ) -> Result<(), ApiError> {
        self.put_unit(
            format!("/repos/{}/{}/collaborators/{}", self.org, repo, login),
            Some(&json!({"permission": permission.as_rest()})),
        )
        .await
    }

    async fn update_repository_remove_external_user(
        &self,
        repo: &str,
        login: &str,
    ) -> Result<(), ApiError> {
        self.delete_unit(format!(
            "/repos/{}/{}/collaborators/{}",
            self.org, repo, login
        ))
        .await
    }

    async fn update_repository_remove_internal_user(
        &self,
        repo: &str,
        login: &str,
    ) -> Result<(), ApiError> {
        self.update_repository_remove_external_user(repo, login).await
    }

    async fn rename_repository(&self, repo: &str, new_name: &str) -> Result<(), ApiError> {
        self.patch_unit(
            format!("/repos/{}/{}", self.org, repo),
            &json!({"name": new_name}),
        )
        .await
    }

    async fn delete_repository(&self, repo: &str) -> Result<(), ApiError> {
        self.delete_unit(format!("/repos/{}/{}", self.org, repo)).await
    }

    async fn add_org_ruleset(
        &self,
        ruleset: &RemoteRuleset,
        bypass_actors: &[WireBypassActor],
    ) -> Result<u64, ApiError> {
        let created: Value = self
            .client
            .post(
                format!("/orgs/{}/rulesets", self.org),
                Some(&self.ruleset_payload(ruleset, bypass_actors, true)),
            )
            .await
            .map_err(api_error)?;
        created["id"]
            .as_u64()
            .ok_or_else(|| ApiError::decode("ruleset creation response carries no id"))
    }

    async fn update_org_ruleset(
        &self,
        id: u64,
        ruleset: &RemoteRuleset,
        bypass_actors: &[WireBypassActor],
    ) -> Result<(), ApiError> {
        self.put_unit(
            format!("/orgs/{}/rulesets/{}", self.org, id),
            Some(&self.ruleset_payload(ruleset, bypass_actors, true)),
        )
        .await
    }

    async fn delete_org_ruleset(&self, id: u64) -> Result<(), ApiError> {
        self.delete_unit(format!("/orgs/{}/rulesets/{}", self.org, id))
            .await
    }

    async fn add_repository_ruleset(
        &self,
        repo: &str,
        ruleset: &RemoteRuleset,
        bypass_actors: &[WireBypassActor],
    ) -> Result<u64, ApiError> {
        let created: Value = self
            .client
            .post(
                format!("/repos/{}/{}/rulesets", self.org, repo),
                Some(&self.ruleset_payload(ruleset, bypass_actors, false)),
            )
            .await
            .map_err(api_error)?;
        created["id"]
            .as_u64()
            .ok_or_else(|| ApiError::decode("ruleset creation response carries no id"))
    }

    async fn update_repository_ruleset(
        &self,
        repo: &str,
        id: u64,
        ruleset: &RemoteRuleset,
        bypass_actors: &[WireBypassActor],
    ) -> Result<(), ApiError> {
        self.put_unit(
            format!("/repos/{}/{}/rulesets/{}", self.org, repo, id),
            Some(&self.ruleset_payload(ruleset, bypass_actors, false)),
        )
        .await
    }

    async fn delete_repository_ruleset(&self, repo: &str, id: u64) -> Result<(), ApiError> {
        self.delete_unit(format!("/repos/{}/{}/rulesets/{}", self.org, repo, id))
            .await
    }

    async fn add_repository_branch_protection(
        &self,
        repo_node_id: &str,
        protection: &BranchProtection,
    ) -> Result<String, ApiError> {
        let mut input = graphql::branch_protection_input(protection);
        input["repositoryId"] = json!(repo_node_id);
        let response: Value = self
            .client
            .graphql(&json!({
                "query": graphql::CREATE_BRANCH_PROTECTION_MUTATION,
                "variables": {"input": input},
            }))
            .await
            .map_err(api_error)?;
        response["data"]["createBranchProtectionRule"]["branchProtectionRule"]["id"]
            .as_str()
            .map(str::to_owned)
            .ok_or_else(|| ApiError::decode("branch protection creation returned no id"))
    }

    async fn update_repository_branch_protection(
        &self,
        rule_id: &str,
        protection: &BranchProtection,
    ) -> Result<(), ApiError> {
        let mut input = graphql::branch_protection_input(protection);
        input["branchProtectionRuleId"] = json!(rule_id);
        let _: Value = self
            .client
            .graphql(&json!({
                "query": graphql::UPDATE_BRANCH_PROTECTION_MUTATION,
                "variables": {"input": input},
            }))
            .await
            .map_err(api_error)?;
        Ok(())
    }

    async fn delete_repository_branch_protection(&self, rule_id: &str) -> Result<(), ApiError> {
        let _: Value = self
            .client
            .graphql(&json!({
                "query": graphql::DELETE_BRANCH_PROTECTION_MUTATION,
                "variables": {"input": {"branchProtectionRuleId": rule_id}},
            }))
            .await
            .map_err(api_error)?;
        Ok(())
    }

    async fn add_repository_environment(
        &self,
        repo: &str,
        environment: &str,
    ) -> Result<(), ApiError> {
        self.put_unit(
            format!("/repos/{}/{}/environments/{}", self.org, repo, environment),
            None,
        )
        .await
    }

    async fn delete_repository_environment(
        &self,
        repo: &str,
        environment: &str,
    ) -> Result<(), ApiError> {
        self.delete_unit(format!(
            "/repos/{}/{}/environments/{}",
            self.org, repo, environment
        ))
        .await
    }

    async fn add_repository_variable(
        &self,
        repo: &str,
        name: &str,
        value: &str,
    ) -> Result<(), ApiError> {
        self.post_unit(
            format!("/repos/{}/{}/actions/variables", self.org, repo),
            &json!({"name": name, "value": value}),
        )
        .await
    }

    async fn update_repository_variable(
        &self,
        repo: &str,
        name: &str,
        value: &str,
    ) -> Result<(), ApiError> {
        self.patch_unit(
            format!("/repos/{}/{}/actions/variables/{}", self.org, repo, name),
            &json!({"name": name, "value": value}),
        )
        .await
    }

    async fn delete_repository_variable(&self, repo: &str, name: &str) -> Result<(), ApiError> {
        self.delete_unit(format!(
            "/repos/{}/{}/actions/variables/{}",
            self.org, repo, name
        ))
        .await
    }

    async fn add_repository_environment_variable(
        &self,
        repo: &str,
        environment: &str,
        name: &str,
        value: &str,
    ) -> Result<(), ApiError> {
        self.post_unit(
            format!(
                "/repos/{}/{}/environments/{}/variables",
                self.org, repo, environment
            ),
            &json!({"name": name, "value": value}),
        )
        .await
    }

    async fn update_repository_environment_variable(
        &self,
        repo: &str,
        environment: &str,
        name: &str,
        value: &str,
    ) -> Result<(), ApiError> {
        self.patch_unit(
            format!(
                "/repos/{}/{}/environments/{}/variables/{}",
                self.org, repo, environment, name
            ),
            &json!({"name": name, "value": value}),
        )
        .await
    }

    async fn delete_repository_environment_variable(
        &self,
        repo: &str,
        environment: &str,
        name: &str,
    ) -> Result<(), ApiError> {
        self.delete_unit(format!(
            "/repos/{}/{}/environments/{}/variables/{}",
            self.org, repo, environment, name
        ))
        .await
    }
}
