//! The declared model: typed entities parsed from the teams repository.
//!
//! Every managed file shares the same envelope (`apiVersion`, `kind`,
//! `name`) with the entity payload under `spec`. The loader builds a
//! [`DeclaredModel`] out of these documents; the reconciliator treats it as
//! a read-only input.

use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::collections::BTreeMap;

pub mod repository;
pub mod ruleset;
pub mod team;
pub mod user;
pub mod workflow;

pub use repository::{BranchProtection, Environment, Repository, Visibility};
pub use ruleset::{
    BypassActor, BypassMode, MergeMethod, Rule, RuleEnforcement, Ruleset, RulesetConditions,
    RulesetDefinition,
};
pub use team::{Team, slugify};
pub use user::User;
pub use workflow::{Workflow, WorkflowType};

use crate::config::RepositoryConfig;

/// The only supported document apiVersion.
pub const API_VERSION: &str = "v1";

/// The common `{apiVersion, kind, name, spec}` envelope of managed files.
#[derive(Debug, Clone, Deserialize)]
#[serde(bound(deserialize = "T: Deserialize<'de> + Default"))]
pub struct Document<T> {
    #[serde(rename = "apiVersion")]
    pub api_version: String,
    pub kind: String,
    pub name: String,
    #[serde(default)]
    pub spec: T,
}

impl<T: DeserializeOwned + Default> Document<T> {
    /// Decodes a document from YAML.
    pub fn from_yaml(contents: &str) -> Result<Self, serde_yml::Error> {
        serde_yml::from_str(contents)
    }

    /// Validates the envelope against the expected kind and file stem.
    ///
    /// The `name` field must equal the file's basename without extension;
    /// a mismatch is a fatal validation error.
    pub fn validate_envelope(&self, expected_kind: &str, stem: &str) -> Result<(), String> {
        if self.api_version != API_VERSION {
            return Err(format!(
                "unsupported apiVersion '{}' (expected '{}')",
                self.api_version, API_VERSION
            ));
        }
        if self.kind != expected_kind {
            return Err(format!(
                "unexpected kind '{}' (expected '{}')",
                self.kind, expected_kind
            ));
        }
        if self.name != stem {
            return Err(format!(
                "name '{}' does not match file name '{}'",
                self.name, stem
            ));
        }
        Ok(())
    }
}

/// The in-memory representation of the teams repository.
#[derive(Debug, Clone, Default)]
pub struct DeclaredModel {
    /// Managed organization users, by declared name.
    pub users: BTreeMap<String, User>,
    /// Managed users that the sync must never delete, by declared name.
    pub protected_users: BTreeMap<String, User>,
    /// Outside collaborators, by declared name.
    pub external_users: BTreeMap<String, User>,
    /// Teams by name.
    pub teams: BTreeMap<String, Team>,
    /// Repositories by name.
    pub repositories: BTreeMap<String, Repository>,
    /// Organization-scope rulesets by name.
    pub rulesets: BTreeMap<String, Ruleset>,
    /// Workflow definitions by name.
    pub workflows: BTreeMap<String, Workflow>,
    /// The repository configuration (`goliac.yaml`).
    pub config: RepositoryConfig,
}

impl DeclaredModel {
    /// Looks a managed (org or protected) user up by declared name.
    pub fn managed_user(&self, name: &str) -> Option<&User> {
        self.users.get(name).or_else(|| self.protected_users.get(name))
    }

    /// Iterates all managed users (org then protected).
    pub fn managed_users(&self) -> impl Iterator<Item = &User> {
        self.users.values().chain(self.protected_users.values())
    }

    /// Returns true if the declared name belongs to a protected user.
    pub fn is_protected(&self, name: &str) -> bool {
        self.protected_users.contains_key(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Default, Deserialize)]
    struct EmptySpec {}

    #[test]
    fn envelope_decodes() {
        let doc: Document<EmptySpec> =
            Document::from_yaml("apiVersion: v1\nkind: User\nname: alice\n").unwrap();
        assert_eq!(doc.api_version, "v1");
        assert_eq!(doc.kind, "User");
        assert_eq!(doc.name, "alice");
    }

    #[test]
    fn envelope_rejects_wrong_api_version() {
        let doc: Document<EmptySpec> =
            Document::from_yaml("apiVersion: v2\nkind: User\nname: alice\n").unwrap();
        let err = doc.validate_envelope("User", "alice").unwrap_err();
        assert!(err.contains("apiVersion"));
    }

    #[test]
    fn envelope_rejects_wrong_kind() {
        let doc: Document<EmptySpec> =
            Document::from_yaml("apiVersion: v1\nkind: Team\nname: alice\n").unwrap();
        assert!(doc.validate_envelope("User", "alice").is_err());
    }

    #[test]
    fn envelope_rejects_name_mismatch() {
        let doc: Document<EmptySpec> =
            Document::from_yaml("apiVersion: v1\nkind: User\nname: alice\n").unwrap();
        let err = doc.validate_envelope("User", "bob").unwrap_err();
        assert!(err.contains("does not match"));
    }

    #[test]
    fn managed_user_spans_both_buckets() {
        let mut model = DeclaredModel::default();
        model.users.insert(
            "alice".into(),
            User {
                name: "alice".into(),
                github_id: "alice-gh".into(),
            },
        );
        model.protected_users.insert(
            "root".into(),
            User {
                name: "root".into(),
                github_id: "root-gh".into(),
            },
        );

        assert!(model.managed_user("alice").is_some());
        assert!(model.managed_user("root").is_some());
        assert!(model.managed_user("ghost").is_none());
        assert!(model.is_protected("root"));
        assert!(!model.is_protected("alice"));
        assert_eq!(model.managed_users().count(), 2);
    }
}
