//! Repository loading from `archived/` and the `teams/` tree.

use super::{file_stem, is_hidden, is_yaml, read_document, rel_path, sorted_entries};
use crate::errors::{ErrorCollection, SyncError};
use crate::model::DeclaredModel;
use crate::model::repository::{
    Repository, RepositorySpec, Visibility, normalize_fork_source, normalize_repository_name,
};
use log::trace;
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use walkdir::WalkDir;

pub(super) fn load_repositories(root: &Path, model: &mut DeclaredModel, errors: &ErrorCollection) {
    load_archived(root, model, errors);
    load_owned(root, model, errors);

    let names: Vec<String> = model.repositories.keys().cloned().collect();
    for name in names {
        let repo = model.repositories[&name].clone();
        validate_repository(&repo, model, errors);
    }
}

/// Repositories under `archived/` are archived and ownerless.
fn load_archived(root: &Path, model: &mut DeclaredModel, errors: &ErrorCollection) {
    let archived_root = root.join("archived");
    if !archived_root.is_dir() {
        return;
    }
    for path in sorted_entries(&archived_root) {
        if path.is_dir() || is_hidden(&path) {
            continue;
        }
        if !is_yaml(&path) {
            errors.add_warning(SyncError::warning(rel_path(root, &path), "stray non-YAML file"));
            continue;
        }
        let Some(stem) = file_stem(&path) else { continue };
        let Some(doc) = read_document::<RepositorySpec>(root, &path, "Repository", &stem, errors)
        else {
            continue;
        };
        let mut spec = doc.spec;
        spec.archived = true;
        insert_repository(root, &path, doc.name, None, spec, model, errors);
    }
}

/// Repositories under `teams/` are owned by the nearest enclosing team.
fn load_owned(root: &Path, model: &mut DeclaredModel, errors: &ErrorCollection) {
    let teams_root = root.join("teams");
    if !teams_root.is_dir() {
        return;
    }

    // Directory path (relative to teams/) -> team name, for owner lookup.
    let team_paths: BTreeMap<String, String> = model
        .teams
        .iter()
        .map(|(name, team)| (team.path.clone(), name.clone()))
        .collect();

    let walker = WalkDir::new(&teams_root)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| !is_hidden(entry.path()));
    for entry in walker.filter_map(|entry| entry.ok()) {
        let path = entry.path();
        if !entry.file_type().is_file() {
            continue;
        }
        if path.file_name().is_some_and(|name| name == "team.yaml") {
            continue;
        }
        if !is_yaml(path) {
            errors.add_warning(SyncError::warning(rel_path(root, path), "stray non-YAML file"));
            continue;
        }
        let Some(stem) = file_stem(path) else { continue };
        let Some(doc) = read_document::<RepositorySpec>(root, path, "Repository", &stem, errors)
        else {
            continue;
        };

        let dir_rel = path
            .parent()
            .and_then(|parent| parent.strip_prefix(&teams_root).ok())
            .map(|rel| rel.to_string_lossy().replace('\\', "/"))
            .unwrap_or_default();
        let owner = nearest_team(&team_paths, &dir_rel);
        if owner.is_none() {
            errors.add_error(SyncError::validation(
                rel_path(root, path),
                "repository has no enclosing team",
            ));
            continue;
        }
        insert_repository(root, path, doc.name, owner, doc.spec, model, errors);
    }
}

/// The team owning a directory: the longest team path that is the
/// directory itself or one of its ancestors.
fn nearest_team(team_paths: &BTreeMap<String, String>, dir_rel: &str) -> Option<String> {
    let mut candidate = dir_rel.to_string();
    loop {
        if let Some(team) = team_paths.get(&candidate) {
            return Some(team.clone());
        }
        match candidate.rfind('/') {
            Some(idx) => candidate.truncate(idx),
            None => return None,
        }
    }
}

fn insert_repository(
    root: &Path,
    path: &Path,
    name: String,
    owner: Option<String>,
    spec: RepositorySpec,
    model: &mut DeclaredModel,
    errors: &ErrorCollection,
) {
    if model.repositories.contains_key(&name) {
        errors.add_error(SyncError::validation(
            rel_path(root, path),
            format!("duplicate repository '{}'", name),
        ));
        return;
    }
    trace!("loaded repository {} (owner: {:?})", name, owner);
    model
        .repositories
        .insert(name.clone(), Repository { name, owner, spec });
}

/// Repository validation (references, names, patterns).
fn validate_repository(repo: &Repository, model: &DeclaredModel, errors: &ErrorCollection) {
    let display = match &repo.owner {
        Some(owner) => format!(
            "teams/{}/{}.yaml",
            model.teams.get(owner).map(|t| t.path.as_str()).unwrap_or(owner),
            repo.name
        ),
        None => format!("archived/{}.yaml", repo.name),
    };

    if repo.spec.archived && repo.owner.is_some() {
        errors.add_error(SyncError::validation(
            &display,
            "archived repositories must live under archived/",
        ));
    }

    if normalize_repository_name(&repo.name) != repo.name {
        errors.add_error(SyncError::validation(
            &display,
            format!("repository name '{}' is not a valid GitHub name", repo.name),
        ));
    }
    if let Some(rename_to) = &repo.spec.rename_to
        && normalize_repository_name(rename_to) != *rename_to
    {
        errors.add_error(SyncError::validation(
            &display,
            format!("rename target '{}' is not a valid GitHub name", rename_to),
        ));
    }

    if repo.spec.visibility == Visibility::Public
        && model.config.visibility_rules.forbid_public_repositories
        && !model
            .config
            .visibility_rules
            .forbid_public_repositories_exclusions
            .iter()
            .any(|exclusion| exclusion == &repo.name)
    {
        errors.add_error(SyncError::validation(
            &display,
            "public repositories are forbidden by visibility rules",
        ));
    }

    for team in repo.spec.writers.iter().chain(repo.spec.readers.iter()) {
        if !model.teams.contains_key(team) {
            errors.add_error(SyncError::validation(
                &display,
                format!("unknown team '{}'", team),
            ));
        }
    }
    for user in repo
        .spec
        .external_user_writers
        .iter()
        .chain(repo.spec.external_user_readers.iter())
    {
        if !model.external_users.contains_key(user) {
            errors.add_error(SyncError::validation(
                &display,
                format!("unknown external user '{}'", user),
            ));
        }
    }

    let mut ruleset_names = BTreeSet::new();
    for ruleset in &repo.spec.rulesets {
        if !ruleset_names.insert(ruleset.name.as_str()) {
            errors.add_error(SyncError::validation(
                &display,
                format!("duplicate ruleset '{}'", ruleset.name),
            ));
        }
        if let Err(reason) = ruleset.definition.validate() {
            errors.add_error(SyncError::validation(&display, reason));
        }
    }

    let mut protection_patterns = BTreeSet::new();
    for protection in &repo.spec.branch_protections {
        if protection.pattern.is_empty() {
            errors.add_error(SyncError::validation(
                &display,
                "branch protection pattern must not be empty",
            ));
        } else if !protection_patterns.insert(protection.pattern.as_str()) {
            errors.add_error(SyncError::validation(
                &display,
                format!("duplicate branch protection '{}'", protection.pattern),
            ));
        }
    }

    let mut environment_names = BTreeSet::new();
    for environment in &repo.spec.environments {
        if !environment_names.insert(environment.name.as_str()) {
            errors.add_error(SyncError::validation(
                &display,
                format!("duplicate environment '{}'", environment.name),
            ));
        }
    }

    if let Some(fork_from) = &repo.spec.fork_from
        && let Err(reason) = normalize_fork_source(fork_from)
    {
        errors.add_error(SyncError::validation(&display, reason));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::team::Team;
    use crate::model::user::User;
    use std::fs;
    use tempfile::TempDir;

    fn write(dir: &Path, rel: &str, contents: &str) {
        let path = dir.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, contents).unwrap();
    }

    fn repo_yaml(name: &str, extra: &str) -> String {
        format!(
            "apiVersion: v1\nkind: Repository\nname: {}\nspec:\n{}",
            name, extra
        )
    }

    fn model_with_team(team: &str, path: &str) -> DeclaredModel {
        let mut model = DeclaredModel::default();
        model.teams.insert(
            team.to_string(),
            Team {
                name: team.to_string(),
                path: path.to_string(),
                parent_team: None,
                owners: vec![],
                members: vec![],
                externally_managed: false,
            },
        );
        model
    }

    #[test]
    fn assigns_nearest_enclosing_team() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "teams/platform/svc.yaml", &repo_yaml("svc", "  visibility: private\n"));
        let mut model = model_with_team("platform", "platform");
        let errors = ErrorCollection::new();
        load_repositories(dir.path(), &mut model, &errors);

        assert!(!errors.has_errors());
        assert_eq!(model.repositories["svc"].owner.as_deref(), Some("platform"));
    }

    #[test]
    fn archived_repositories_have_no_owner() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "archived/legacy.yaml", &repo_yaml("legacy", "  visibility: private\n"));
        let mut model = DeclaredModel::default();
        let errors = ErrorCollection::new();
        load_repositories(dir.path(), &mut model, &errors);

        assert!(!errors.has_errors());
        let repo = &model.repositories["legacy"];
        assert!(repo.owner.is_none());
        assert!(repo.spec.archived);
    }

    #[test]
    fn duplicate_repository_is_fatal() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "archived/dup.yaml", &repo_yaml("dup", "  visibility: private\n"));
        write(dir.path(), "teams/platform/dup.yaml", &repo_yaml("dup", "  visibility: private\n"));
        let mut model = model_with_team("platform", "platform");
        let errors = ErrorCollection::new();
        load_repositories(dir.path(), &mut model, &errors);
        assert!(errors.has_errors());
    }

    #[test]
    fn archived_under_teams_is_fatal() {
        let dir = TempDir::new().unwrap();
        write(
            dir.path(),
            "teams/platform/svc.yaml",
            &repo_yaml("svc", "  archived: true\n"),
        );
        let mut model = model_with_team("platform", "platform");
        let errors = ErrorCollection::new();
        load_repositories(dir.path(), &mut model, &errors);
        assert!(errors.has_errors());
    }

    #[test]
    fn unknown_writer_team_is_fatal() {
        let dir = TempDir::new().unwrap();
        write(
            dir.path(),
            "teams/platform/svc.yaml",
            &repo_yaml("svc", "  writers:\n    - ghosts\n"),
        );
        let mut model = model_with_team("platform", "platform");
        let errors = ErrorCollection::new();
        load_repositories(dir.path(), &mut model, &errors);
        assert!(errors.has_errors());
    }

    #[test]
    fn external_user_references_resolve() {
        let dir = TempDir::new().unwrap();
        write(
            dir.path(),
            "teams/platform/svc.yaml",
            &repo_yaml("svc", "  external_user_readers:\n    - contractor\n"),
        );
        let mut model = model_with_team("platform", "platform");
        model.external_users.insert(
            "contractor".into(),
            User {
                name: "contractor".into(),
                github_id: "contractor-gh".into(),
            },
        );
        let errors = ErrorCollection::new();
        load_repositories(dir.path(), &mut model, &errors);
        assert!(!errors.has_errors());
    }

    #[test]
    fn invalid_name_is_fatal() {
        let dir = TempDir::new().unwrap();
        write(
            dir.path(),
            "archived/bad name.yaml",
            "apiVersion: v1\nkind: Repository\nname: bad name\nspec: {}\n",
        );
        let mut model = DeclaredModel::default();
        let errors = ErrorCollection::new();
        load_repositories(dir.path(), &mut model, &errors);
        assert!(errors.has_errors());
    }

    #[test]
    fn invalid_fork_source_is_fatal() {
        let dir = TempDir::new().unwrap();
        write(
            dir.path(),
            "teams/platform/svc.yaml",
            &repo_yaml("svc", "  fork_from: not-a-repo\n"),
        );
        let mut model = model_with_team("platform", "platform");
        let errors = ErrorCollection::new();
        load_repositories(dir.path(), &mut model, &errors);
        assert!(errors.has_errors());
    }

    #[test]
    fn forbidden_public_visibility() {
        let dir = TempDir::new().unwrap();
        write(
            dir.path(),
            "teams/platform/svc.yaml",
            &repo_yaml("svc", "  visibility: public\n"),
        );
        let mut model = model_with_team("platform", "platform");
        model.config.visibility_rules.forbid_public_repositories = true;
        let errors = ErrorCollection::new();
        load_repositories(dir.path(), &mut model, &errors);
        assert!(errors.has_errors());

        // Excluded repositories may stay public.
        let mut model = model_with_team("platform", "platform");
        model.config.visibility_rules.forbid_public_repositories = true;
        model
            .config
            .visibility_rules
            .forbid_public_repositories_exclusions = vec!["svc".into()];
        let errors = ErrorCollection::new();
        load_repositories(dir.path(), &mut model, &errors);
        assert!(!errors.has_errors());
    }

    #[test]
    fn stray_file_warns() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "teams/platform/notes.txt", "scratch");
        let mut model = model_with_team("platform", "platform");
        let errors = ErrorCollection::new();
        load_repositories(dir.path(), &mut model, &errors);
        assert!(!errors.has_errors());
        assert!(errors.has_warnings());
    }

    #[test]
    fn duplicate_inline_ruleset_is_fatal() {
        let dir = TempDir::new().unwrap();
        write(
            dir.path(),
            "teams/platform/svc.yaml",
            &repo_yaml(
                "svc",
                "  rulesets:\n    - name: default\n    - name: default\n",
            ),
        );
        let mut model = model_with_team("platform", "platform");
        let errors = ErrorCollection::new();
        load_repositories(dir.path(), &mut model, &errors);
        assert!(errors.has_errors());
    }
}
