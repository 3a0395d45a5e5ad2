//! Team loading: depth-first walk of `teams/`, with the directory nesting
//! encoding the parent→child hierarchy.

use super::{MAX_TEAM_DEPTH, is_hidden, read_document, rel_path};
use crate::errors::{ErrorCollection, SyncError};
use crate::model::DeclaredModel;
use crate::model::team::{EVERYONE_TEAM_NAME, Team, TeamSpec};
use log::trace;
use std::collections::BTreeMap;
use std::path::Path;

pub(super) fn load_teams(
    root: &Path,
    model: &mut DeclaredModel,
    owner_team_suffix: &str,
    errors: &ErrorCollection,
) {
    let teams_root = root.join("teams");
    if !teams_root.is_dir() {
        return;
    }
    walk(root, &teams_root, None, "", 0, model, owner_team_suffix, errors);

    // Slugs must be collision-free within the declared set; two teams
    // folding to the same slug would fight over one GitHub team.
    let mut slugs: BTreeMap<String, String> = BTreeMap::new();
    for team in model.teams.values() {
        if let Some(existing) = slugs.insert(team.slug(), team.name.clone()) {
            errors.add_error(SyncError::validation(
                format!("teams/{}/team.yaml", team.path),
                format!(
                    "teams '{}' and '{}' collide on slug '{}'",
                    existing,
                    team.name,
                    team.slug()
                ),
            ));
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn walk(
    root: &Path,
    dir: &Path,
    enclosing_team: Option<&str>,
    rel: &str,
    depth: usize,
    model: &mut DeclaredModel,
    owner_team_suffix: &str,
    errors: &ErrorCollection,
) {
    if depth > MAX_TEAM_DEPTH {
        errors.add_error(SyncError::validation(
            format!("teams/{}", rel),
            format!("team nesting exceeds {} levels", MAX_TEAM_DEPTH),
        ));
        return;
    }

    let dir_name = dir
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    let team_file = dir.join("team.yaml");
    let mut current_team = enclosing_team.map(str::to_owned);

    if team_file.is_file() {
        // The envelope name must match the enclosing directory, which is
        // the team's identity on disk.
        if let Some(doc) = read_document::<TeamSpec>(root, &team_file, "Team", &dir_name, errors) {
            let display = rel_path(root, &team_file);
            if validate_team(&doc.name, &doc.spec, &display, model, owner_team_suffix, errors) {
                if !doc.spec.externally_managed && doc.spec.owners.len() < 2 {
                    errors.add_warning(SyncError::warning(
                        &display,
                        format!("team '{}' has fewer than two owners", doc.name),
                    ));
                }
                trace!("loaded team {} (parent: {:?})", doc.name, enclosing_team);
                model.teams.insert(
                    doc.name.clone(),
                    Team {
                        name: doc.name.clone(),
                        path: rel.to_string(),
                        parent_team: enclosing_team.map(str::to_owned),
                        owners: doc.spec.owners,
                        members: doc.spec.members,
                        externally_managed: doc.spec.externally_managed,
                    },
                );
                current_team = Some(doc.name);
            }
        }
    }

    for entry in super::sorted_entries(dir) {
        if !entry.is_dir() || is_hidden(&entry) {
            continue;
        }
        let child_name = entry
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let child_rel = if rel.is_empty() {
            child_name
        } else {
            format!("{}/{}", rel, child_name)
        };
        walk(
            root,
            &entry,
            current_team.as_deref(),
            &child_rel,
            depth + 1,
            model,
            owner_team_suffix,
            errors,
        );
    }
}

/// Validates a team document. Returns false when the team must be dropped.
fn validate_team(
    name: &str,
    spec: &TeamSpec,
    display: &str,
    model: &DeclaredModel,
    owner_team_suffix: &str,
    errors: &ErrorCollection,
) -> bool {
    if name == EVERYONE_TEAM_NAME {
        errors.add_error(SyncError::validation(
            display,
            format!("'{}' is a reserved team name", EVERYONE_TEAM_NAME),
        ));
        return false;
    }
    if !owner_team_suffix.is_empty() && name.ends_with(owner_team_suffix) {
        errors.add_error(SyncError::validation(
            display,
            format!("team names must not end in '{}'", owner_team_suffix),
        ));
        return false;
    }
    if model.teams.contains_key(name) {
        errors.add_error(SyncError::validation(
            display,
            format!("duplicate team '{}'", name),
        ));
        return false;
    }
    let mut valid = true;
    for reference in spec.owners.iter().chain(spec.members.iter()) {
        if model.managed_user(reference).is_none() {
            errors.add_error(SyncError::validation(
                display,
                format!("unknown user '{}'", reference),
            ));
            valid = false;
        }
    }
    valid
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::user::User;
    use std::fs;
    use tempfile::TempDir;

    fn write(dir: &Path, rel: &str, contents: &str) {
        let path = dir.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, contents).unwrap();
    }

    fn team_yaml(name: &str, owners: &[&str], members: &[&str]) -> String {
        let mut out = format!("apiVersion: v1\nkind: Team\nname: {}\nspec:\n  owners:\n", name);
        for owner in owners {
            out.push_str(&format!("    - {}\n", owner));
        }
        out.push_str("  members:\n");
        for member in members {
            out.push_str(&format!("    - {}\n", member));
        }
        out
    }

    fn model_with_users(names: &[&str]) -> DeclaredModel {
        let mut model = DeclaredModel::default();
        for name in names {
            model.users.insert(
                name.to_string(),
                User {
                    name: name.to_string(),
                    github_id: format!("{}-gh", name),
                },
            );
        }
        model
    }

    #[test]
    fn loads_nested_hierarchy() {
        let dir = TempDir::new().unwrap();
        write(
            dir.path(),
            "teams/platform/team.yaml",
            &team_yaml("platform", &["alice", "bob"], &[]),
        );
        write(
            dir.path(),
            "teams/platform/network/team.yaml",
            &team_yaml("network", &["alice", "bob"], &["carol"]),
        );

        let mut model = model_with_users(&["alice", "bob", "carol"]);
        let errors = ErrorCollection::new();
        load_teams(dir.path(), &mut model, "-goliac-owners", &errors);

        assert!(!errors.has_errors());
        assert_eq!(model.teams.len(), 2);
        assert_eq!(model.teams["platform"].parent_team, None);
        assert_eq!(
            model.teams["network"].parent_team.as_deref(),
            Some("platform")
        );
        assert_eq!(model.teams["network"].path, "platform/network");
    }

    #[test]
    fn unknown_member_is_fatal() {
        let dir = TempDir::new().unwrap();
        write(
            dir.path(),
            "teams/x/team.yaml",
            &team_yaml("x", &["alice", "ghost"], &[]),
        );
        let mut model = model_with_users(&["alice"]);
        let errors = ErrorCollection::new();
        load_teams(dir.path(), &mut model, "-goliac-owners", &errors);
        assert!(errors.has_errors());
        assert!(model.teams.is_empty());
    }

    #[test]
    fn single_owner_warns() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "teams/x/team.yaml", &team_yaml("x", &["alice"], &[]));
        let mut model = model_with_users(&["alice"]);
        let errors = ErrorCollection::new();
        load_teams(dir.path(), &mut model, "-goliac-owners", &errors);
        assert!(!errors.has_errors());
        assert!(errors.has_warnings());
        assert_eq!(model.teams.len(), 1);
    }

    #[test]
    fn reserved_names_rejected() {
        let dir = TempDir::new().unwrap();
        write(
            dir.path(),
            "teams/everyone/team.yaml",
            &team_yaml("everyone", &["alice", "bob"], &[]),
        );
        write(
            dir.path(),
            "teams/ops-goliac-owners/team.yaml",
            &team_yaml("ops-goliac-owners", &["alice", "bob"], &[]),
        );
        let mut model = model_with_users(&["alice", "bob"]);
        let errors = ErrorCollection::new();
        load_teams(dir.path(), &mut model, "-goliac-owners", &errors);
        assert_eq!(errors.errors().len(), 2);
        assert!(model.teams.is_empty());
    }

    #[test]
    fn name_must_match_directory() {
        let dir = TempDir::new().unwrap();
        write(
            dir.path(),
            "teams/actual/team.yaml",
            &team_yaml("other", &["alice", "bob"], &[]),
        );
        let mut model = model_with_users(&["alice", "bob"]);
        let errors = ErrorCollection::new();
        load_teams(dir.path(), &mut model, "-goliac-owners", &errors);
        assert!(errors.has_errors());
    }

    #[test]
    fn slug_collisions_are_fatal() {
        let dir = TempDir::new().unwrap();
        write(
            dir.path(),
            "teams/net ops/team.yaml",
            &team_yaml("net ops", &["alice", "bob"], &[]),
        );
        write(
            dir.path(),
            "teams/net-ops/team.yaml",
            &team_yaml("net-ops", &["alice", "bob"], &[]),
        );
        let mut model = model_with_users(&["alice", "bob"]);
        let errors = ErrorCollection::new();
        load_teams(dir.path(), &mut model, "-goliac-owners", &errors);
        assert!(errors.has_errors());
    }

    #[test]
    fn intermediate_directory_without_team_keeps_parent() {
        let dir = TempDir::new().unwrap();
        write(
            dir.path(),
            "teams/platform/team.yaml",
            &team_yaml("platform", &["alice", "bob"], &[]),
        );
        // A grouping directory without its own team.yaml.
        write(
            dir.path(),
            "teams/platform/squads/alpha/team.yaml",
            &team_yaml("alpha", &["alice", "bob"], &[]),
        );
        let mut model = model_with_users(&["alice", "bob"]);
        let errors = ErrorCollection::new();
        load_teams(dir.path(), &mut model, "-goliac-owners", &errors);
        assert!(!errors.has_errors());
        assert_eq!(model.teams["alpha"].parent_team.as_deref(), Some("platform"));
    }
}
