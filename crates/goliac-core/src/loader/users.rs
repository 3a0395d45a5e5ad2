//! User loading from `users/org`, `users/protected` and `users/external`.

use super::{file_stem, is_hidden, is_yaml, read_document, rel_path, sorted_entries};
use crate::errors::{ErrorCollection, SyncError};
use crate::model::DeclaredModel;
use crate::model::user::{User, UserSpec};
use log::trace;
use std::path::Path;

/// The three user buckets, in loading order.
const BUCKETS: &[(&str, Bucket)] = &[
    ("users/org", Bucket::Org),
    ("users/protected", Bucket::Protected),
    ("users/external", Bucket::External),
];

#[derive(Clone, Copy)]
enum Bucket {
    Org,
    Protected,
    External,
}

pub(super) fn load_users(root: &Path, model: &mut DeclaredModel, errors: &ErrorCollection) {
    for (dir, bucket) in BUCKETS {
        let dir_path = root.join(dir);
        if !dir_path.is_dir() {
            continue;
        }
        for path in sorted_entries(&dir_path) {
            if path.is_dir() || is_hidden(&path) {
                continue;
            }
            if !is_yaml(&path) {
                errors.add_warning(SyncError::warning(
                    rel_path(root, &path),
                    "stray non-YAML file",
                ));
                continue;
            }
            let Some(stem) = file_stem(&path) else {
                continue;
            };
            let Some(doc) = read_document::<UserSpec>(root, &path, "User", &stem, errors) else {
                continue;
            };
            let display = rel_path(root, &path);
            if doc.spec.github_id.is_empty() {
                errors.add_error(SyncError::validation(&display, "githubID must be set"));
                continue;
            }
            if model.users.contains_key(&doc.name)
                || model.protected_users.contains_key(&doc.name)
                || model.external_users.contains_key(&doc.name)
            {
                errors.add_error(SyncError::validation(
                    &display,
                    format!("duplicate user '{}'", doc.name),
                ));
                continue;
            }
            trace!("loaded user {} ({})", doc.name, doc.spec.github_id);
            let user = User::new(doc.name.clone(), doc.spec);
            match bucket {
                Bucket::Org => model.users.insert(doc.name, user),
                Bucket::Protected => model.protected_users.insert(doc.name, user),
                Bucket::External => model.external_users.insert(doc.name, user),
            };
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn write(dir: &Path, rel: &str, contents: &str) {
        let path = dir.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, contents).unwrap();
    }

    fn user_yaml(name: &str, github_id: &str) -> String {
        format!(
            "apiVersion: v1\nkind: User\nname: {}\nspec:\n  githubID: {}\n",
            name, github_id
        )
    }

    #[test]
    fn loads_all_three_buckets() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "users/org/alice.yaml", &user_yaml("alice", "a"));
        write(dir.path(), "users/protected/root.yaml", &user_yaml("root", "r"));
        write(dir.path(), "users/external/bot.yaml", &user_yaml("bot", "b"));

        let mut model = DeclaredModel::default();
        let errors = ErrorCollection::new();
        load_users(dir.path(), &mut model, &errors);

        assert_eq!(model.users.len(), 1);
        assert_eq!(model.protected_users.len(), 1);
        assert_eq!(model.external_users.len(), 1);
        assert!(!errors.has_errors());
    }

    #[test]
    fn skips_dotfiles_and_directories() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "users/org/.hidden.yaml", &user_yaml("hidden", "h"));
        fs::create_dir_all(dir.path().join("users/org/subdir")).unwrap();
        write(dir.path(), "users/org/alice.yaml", &user_yaml("alice", "a"));

        let mut model = DeclaredModel::default();
        let errors = ErrorCollection::new();
        load_users(dir.path(), &mut model, &errors);

        assert_eq!(model.users.len(), 1);
        assert!(!errors.has_errors());
        assert!(!errors.has_warnings());
    }

    #[test]
    fn empty_github_id_is_fatal() {
        let dir = TempDir::new().unwrap();
        write(
            dir.path(),
            "users/org/alice.yaml",
            "apiVersion: v1\nkind: User\nname: alice\nspec:\n  githubID: ''\n",
        );
        let mut model = DeclaredModel::default();
        let errors = ErrorCollection::new();
        load_users(dir.path(), &mut model, &errors);
        assert!(errors.has_errors());
        assert!(model.users.is_empty());
    }

    #[test]
    fn duplicate_across_buckets_is_fatal() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "users/org/alice.yaml", &user_yaml("alice", "a"));
        write(dir.path(), "users/external/alice.yaml", &user_yaml("alice", "a2"));

        let mut model = DeclaredModel::default();
        let errors = ErrorCollection::new();
        load_users(dir.path(), &mut model, &errors);
        assert!(errors.has_errors());
        assert_eq!(model.users.len(), 1);
        assert!(model.external_users.is_empty());
    }

    #[test]
    fn name_mismatch_is_fatal() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "users/org/alice.yaml", &user_yaml("bob", "b"));
        let mut model = DeclaredModel::default();
        let errors = ErrorCollection::new();
        load_users(dir.path(), &mut model, &errors);
        assert!(errors.has_errors());
    }

    #[test]
    fn stray_file_warns() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "users/org/readme.md", "not yaml");
        let mut model = DeclaredModel::default();
        let errors = ErrorCollection::new();
        load_users(dir.path(), &mut model, &errors);
        assert!(!errors.has_errors());
        assert!(errors.has_warnings());
    }
}
