//! The entity loader: walks the teams-repo working tree and produces the
//! declared model, accumulating validation errors and warnings.
//!
//! Loading is best-effort: every failure lands in the shared
//! [`ErrorCollection`], and a partial model is returned only when the
//! caller asked for continue-on-error.

mod repositories;
mod rulesets;
mod teams;
mod users;
mod workflows;

use crate::config::RepositoryConfig;
use crate::errors::{ErrorCollection, SyncError};
use crate::model::{DeclaredModel, Document};
use log::{debug, info};
use serde::de::DeserializeOwned;
use std::fs;
use std::path::Path;

/// Maximum nesting depth of the team hierarchy.
pub const MAX_TEAM_DEPTH: usize = 100;

/// Loads the declared model from a teams-repo working tree.
pub struct EntityLoader<'a> {
    root: &'a Path,
    owner_team_suffix: String,
}

impl<'a> EntityLoader<'a> {
    /// Creates a loader rooted at the teams-repo working tree.
    pub fn new(root: &'a Path, owner_team_suffix: impl Into<String>) -> Self {
        Self {
            root,
            owner_team_suffix: owner_team_suffix.into(),
        }
    }

    /// Loads and validates the whole declared model.
    ///
    /// Returns `None` when fatal errors were recorded, unless
    /// `continue_on_error` is set, in which case the best-effort partial
    /// model is returned.
    pub fn load(
        &self,
        errors: &ErrorCollection,
        continue_on_error: bool,
    ) -> Option<DeclaredModel> {
        info!("loading declared model from {}", self.root.display());

        // The repository configuration gates everything else; a missing
        // goliac.yaml is fatal.
        let config_path = self.root.join("goliac.yaml");
        let config = match fs::read_to_string(&config_path) {
            Ok(contents) => match RepositoryConfig::from_yaml(&contents) {
                Ok(config) => config,
                Err(e) => {
                    errors.add_error(SyncError::validation("goliac.yaml", e.to_string()));
                    return None;
                }
            },
            Err(e) => {
                errors.add_error(SyncError::validation(
                    "goliac.yaml",
                    format!("cannot read repository configuration: {}", e),
                ));
                return None;
            }
        };

        let mut model = DeclaredModel {
            config,
            ..Default::default()
        };

        users::load_users(self.root, &mut model, errors);
        teams::load_teams(self.root, &mut model, &self.owner_team_suffix, errors);
        repositories::load_repositories(self.root, &mut model, errors);
        rulesets::load_rulesets(self.root, &mut model, errors);
        workflows::load_workflows(self.root, &mut model, errors);
        self.cross_validate(&model, errors);

        debug!(
            "declared model: {} users, {} protected, {} external, {} teams, {} repositories, {} rulesets, {} workflows",
            model.users.len(),
            model.protected_users.len(),
            model.external_users.len(),
            model.teams.len(),
            model.repositories.len(),
            model.rulesets.len(),
            model.workflows.len(),
        );

        if errors.has_errors() && !continue_on_error {
            None
        } else {
            Some(model)
        }
    }

    /// Validates references between the repository configuration and the
    /// loaded entities.
    fn cross_validate(&self, model: &DeclaredModel, errors: &ErrorCollection) {
        if model.config.admin_team.is_empty() {
            errors.add_error(SyncError::validation(
                "goliac.yaml",
                "admin_team must be set",
            ));
        } else if !model.teams.contains_key(&model.config.admin_team) {
            errors.add_warning(SyncError::warning(
                "goliac.yaml",
                format!(
                    "admin_team '{}' is not declared under teams/",
                    model.config.admin_team
                ),
            ));
        }

        for entry in &model.config.rulesets {
            if !model.rulesets.contains_key(&entry.ruleset) {
                errors.add_error(SyncError::validation(
                    "goliac.yaml",
                    format!("ruleset '{}' is not declared under rulesets/", entry.ruleset),
                ));
            }
            if let Err(e) = globset::Glob::new(&entry.pattern) {
                errors.add_error(SyncError::validation(
                    "goliac.yaml",
                    format!("ruleset pattern '{}' is invalid: {}", entry.pattern, e),
                ));
            }
        }

        for workflow in &model.config.workflows {
            if !model.workflows.contains_key(workflow) {
                errors.add_error(SyncError::validation(
                    "goliac.yaml",
                    format!("workflow '{}' is not declared under workflows/", workflow),
                ));
            }
        }
    }
}

/// Reads and decodes a managed document, validating its envelope.
///
/// `expected_stem` is the identity the `name` field must carry (the file
/// stem, or the directory name for `team.yaml`). Returns `None` after
/// recording the failure.
fn read_document<T: DeserializeOwned + Default>(
    root: &Path,
    path: &Path,
    expected_kind: &str,
    expected_stem: &str,
    errors: &ErrorCollection,
) -> Option<Document<T>> {
    let display = rel_path(root, path);
    let contents = match fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(e) => {
            errors.add_error(SyncError::validation(&display, format!("cannot read: {}", e)));
            return None;
        }
    };
    let doc: Document<T> = match Document::from_yaml(&contents) {
        Ok(doc) => doc,
        Err(e) => {
            errors.add_error(SyncError::validation(&display, e.to_string()));
            return None;
        }
    };
    if let Err(reason) = doc.validate_envelope(expected_kind, expected_stem) {
        errors.add_error(SyncError::validation(&display, reason));
        return None;
    }
    Some(doc)
}

/// Path relative to the teams-repo root, with forward slashes.
fn rel_path(root: &Path, path: &Path) -> String {
    path.strip_prefix(root)
        .unwrap_or(path)
        .to_string_lossy()
        .replace('\\', "/")
}

/// The file basename without extension.
fn file_stem(path: &Path) -> Option<String> {
    path.file_stem().map(|s| s.to_string_lossy().into_owned())
}

/// Returns true for managed `.yaml` documents.
fn is_yaml(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext == "yaml")
}

/// Returns true for dot-files and dot-directories, which are skipped.
fn is_hidden(path: &Path) -> bool {
    path.file_name()
        .is_some_and(|name| name.to_string_lossy().starts_with('.'))
}

/// Directory entries sorted by name for deterministic traversal.
fn sorted_entries(dir: &Path) -> Vec<std::path::PathBuf> {
    let mut entries: Vec<_> = match fs::read_dir(dir) {
        Ok(entries) => entries
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .collect(),
        Err(_) => Vec::new(),
    };
    entries.sort();
    entries
}
